//! Editor feature kinds, request/response shapes, and registration seams.
//!
//! ## Learning: One Trait, Many Features
//!
//! Hosts usually expose one registration function per feature kind
//! (completions, hovers, links, ...). The provider side of all of them is
//! identical: await the analysis proxy, forward the request, translate the
//! result. A single `FeatureProvider` trait over a request enum keeps that
//! shape in one place, and lets the feature registry reconcile the active
//! set as plain `(kind, handle)` pairs.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::dispose::Disposable;
use crate::document::DocumentUri;

/// One discrete editor capability that can be toggled on or off.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeatureKind {
    Completions,
    Hovers,
    DocumentHighlights,
    Links,
    DocumentSymbols,
    Rename,
    FoldingRanges,
    SelectionRanges,
    DocumentFormatting,
    Colors,
}

impl FeatureKind {
    /// Every host-registered feature kind, in registration order.
    pub const ALL: [FeatureKind; 10] = [
        FeatureKind::Completions,
        FeatureKind::Hovers,
        FeatureKind::DocumentHighlights,
        FeatureKind::Links,
        FeatureKind::DocumentSymbols,
        FeatureKind::Rename,
        FeatureKind::FoldingRanges,
        FeatureKind::SelectionRanges,
        FeatureKind::DocumentFormatting,
        FeatureKind::Colors,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            FeatureKind::Completions => "completions",
            FeatureKind::Hovers => "hovers",
            FeatureKind::DocumentHighlights => "document_highlights",
            FeatureKind::Links => "links",
            FeatureKind::DocumentSymbols => "document_symbols",
            FeatureKind::Rename => "rename",
            FeatureKind::FoldingRanges => "folding_ranges",
            FeatureKind::SelectionRanges => "selection_ranges",
            FeatureKind::DocumentFormatting => "document_formatting",
            FeatureKind::Colors => "colors",
        }
    }
}

impl std::fmt::Display for FeatureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// A completion suggestion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletionItem {
    pub label: String,
    pub detail: Option<String>,
}

/// Hover contents for a position.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Hover {
    pub contents: String,
    pub start: usize,
    pub end: usize,
}

/// One highlighted occurrence within a document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentHighlight {
    pub start: usize,
    pub end: usize,
}

/// A clickable link inside a document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentLink {
    pub start: usize,
    pub end: usize,
    pub target: String,
}

/// An entry in the symbol outline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentSymbol {
    pub name: String,
    pub start: usize,
    pub end: usize,
}

/// A single text replacement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextEdit {
    pub start: usize,
    pub end: usize,
    pub new_text: String,
}

/// A foldable line region.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FoldingRange {
    pub start_line: usize,
    pub end_line: usize,
}

/// Expanding selection ranges for one position, innermost first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectionRange {
    pub ranges: Vec<(usize, usize)>,
}

/// A detected color literal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColorInformation {
    pub start: usize,
    pub end: usize,
    pub red: u8,
    pub green: u8,
    pub blue: u8,
}

/// A host-initiated feature invocation.
#[derive(Debug, Clone)]
pub enum FeatureRequest {
    Completions { uri: DocumentUri, offset: usize },
    Hover { uri: DocumentUri, offset: usize },
    DocumentHighlights { uri: DocumentUri, offset: usize },
    Links { uri: DocumentUri },
    DocumentSymbols { uri: DocumentUri },
    Rename { uri: DocumentUri, offset: usize, new_name: String },
    FoldingRanges { uri: DocumentUri },
    SelectionRanges { uri: DocumentUri, offsets: Vec<usize> },
    DocumentFormatting { uri: DocumentUri },
    Colors { uri: DocumentUri },
}

impl FeatureRequest {
    pub fn kind(&self) -> FeatureKind {
        match self {
            FeatureRequest::Completions { .. } => FeatureKind::Completions,
            FeatureRequest::Hover { .. } => FeatureKind::Hovers,
            FeatureRequest::DocumentHighlights { .. } => FeatureKind::DocumentHighlights,
            FeatureRequest::Links { .. } => FeatureKind::Links,
            FeatureRequest::DocumentSymbols { .. } => FeatureKind::DocumentSymbols,
            FeatureRequest::Rename { .. } => FeatureKind::Rename,
            FeatureRequest::FoldingRanges { .. } => FeatureKind::FoldingRanges,
            FeatureRequest::SelectionRanges { .. } => FeatureKind::SelectionRanges,
            FeatureRequest::DocumentFormatting { .. } => FeatureKind::DocumentFormatting,
            FeatureRequest::Colors { .. } => FeatureKind::Colors,
        }
    }

    /// The document the request targets.
    pub fn uri(&self) -> &DocumentUri {
        match self {
            FeatureRequest::Completions { uri, .. }
            | FeatureRequest::Hover { uri, .. }
            | FeatureRequest::DocumentHighlights { uri, .. }
            | FeatureRequest::Links { uri }
            | FeatureRequest::DocumentSymbols { uri }
            | FeatureRequest::Rename { uri, .. }
            | FeatureRequest::FoldingRanges { uri }
            | FeatureRequest::SelectionRanges { uri, .. }
            | FeatureRequest::DocumentFormatting { uri }
            | FeatureRequest::Colors { uri } => uri,
        }
    }
}

/// The result shape matching each request variant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeatureResponse {
    Completions(Vec<CompletionItem>),
    Hover(Option<Hover>),
    DocumentHighlights(Vec<DocumentHighlight>),
    Links(Vec<DocumentLink>),
    DocumentSymbols(Vec<DocumentSymbol>),
    Edits(Vec<TextEdit>),
    FoldingRanges(Vec<FoldingRange>),
    SelectionRanges(Vec<SelectionRange>),
    Colors(Vec<ColorInformation>),
}

impl FeatureResponse {
    /// The no-result response for a feature kind.
    ///
    /// Providers degrade to this when the analysis proxy is unavailable
    /// instead of surfacing an error into the host UI.
    pub fn empty_for(kind: FeatureKind) -> Self {
        match kind {
            FeatureKind::Completions => FeatureResponse::Completions(Vec::new()),
            FeatureKind::Hovers => FeatureResponse::Hover(None),
            FeatureKind::DocumentHighlights => FeatureResponse::DocumentHighlights(Vec::new()),
            FeatureKind::Links => FeatureResponse::Links(Vec::new()),
            FeatureKind::DocumentSymbols => FeatureResponse::DocumentSymbols(Vec::new()),
            FeatureKind::Rename | FeatureKind::DocumentFormatting => {
                FeatureResponse::Edits(Vec::new())
            }
            FeatureKind::FoldingRanges => FeatureResponse::FoldingRanges(Vec::new()),
            FeatureKind::SelectionRanges => FeatureResponse::SelectionRanges(Vec::new()),
            FeatureKind::Colors => FeatureResponse::Colors(Vec::new()),
        }
    }

    /// Returns true if this is the empty response for its shape.
    pub fn is_empty(&self) -> bool {
        match self {
            FeatureResponse::Completions(items) => items.is_empty(),
            FeatureResponse::Hover(hover) => hover.is_none(),
            FeatureResponse::DocumentHighlights(items) => items.is_empty(),
            FeatureResponse::Links(items) => items.is_empty(),
            FeatureResponse::DocumentSymbols(items) => items.is_empty(),
            FeatureResponse::Edits(items) => items.is_empty(),
            FeatureResponse::FoldingRanges(items) => items.is_empty(),
            FeatureResponse::SelectionRanges(items) => items.is_empty(),
            FeatureResponse::Colors(items) => items.is_empty(),
        }
    }
}

/// Implementation of one registered feature.
///
/// Invoked by the host on the interaction thread; the implementation awaits
/// the analysis proxy and must never panic into the host.
#[async_trait]
pub trait FeatureProvider: Send + Sync {
    async fn provide(&self, request: FeatureRequest) -> FeatureResponse;
}

/// The host's feature-registration API.
///
/// Registration is undone exclusively through the returned disposable; after
/// `dispose` the host must never invoke the provider again.
pub trait FeatureHost: Send + Sync {
    fn register_provider(
        &self,
        mode_id: &str,
        kind: FeatureKind,
        provider: Arc<dyn FeatureProvider>,
    ) -> Disposable;
}
