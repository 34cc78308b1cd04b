//! # Langbridge Host
//!
//! The seams between the language-services core and the editing host.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                      Editing Host                         │
//! │  ┌──────────────┐ ┌──────────────┐ ┌──────────────────┐  │
//! │  │ FeatureHost  │ │  MarkerSink  │ │  DocumentStore   │  │
//! │  └──────┬───────┘ └──────┬───────┘ └────────┬─────────┘  │
//! └─────────┼────────────────┼──────────────────┼────────────┘
//!           │ register       │ set_markers      │ events
//!           ▼                ▼                  ▼
//!     feature registry  validation pipeline  (langbridge-mode)
//! ```
//!
//! Everything here is deliberately small: the host owns rendering and
//! editing, the core owns orchestration, and these types are the contract
//! between the two.

pub mod dispose;
pub mod document;
pub mod event;
pub mod features;
pub mod markers;

pub use dispose::{Disposable, DisposableStore};
pub use document::{DocumentEvent, DocumentSnapshot, DocumentStore, DocumentUri, TextDocument};
pub use event::Emitter;
pub use features::{
    ColorInformation, CompletionItem, DocumentHighlight, DocumentLink, DocumentSymbol,
    FeatureHost, FeatureKind, FeatureProvider, FeatureRequest, FeatureResponse, FoldingRange,
    Hover, SelectionRange, TextEdit,
};
pub use markers::{Marker, MarkerSeverity, MarkerSink, MemoryMarkerSink};

/// Result type for host operations
pub type HostResult<T> = Result<T, HostError>;

/// Errors that can occur at the host boundary
#[derive(Debug, thiserror::Error)]
pub enum HostError {
    #[error("Document not open: {0}")]
    DocumentNotOpen(DocumentUri),

    #[error("Document already open: {0}")]
    DocumentAlreadyOpen(DocumentUri),
}
