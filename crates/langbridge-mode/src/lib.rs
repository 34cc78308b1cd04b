//! # Langbridge Mode
//!
//! Everything that turns the lower crates into a live language mode.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      activate_mode()                        │
//! │                                                             │
//! │  LanguageDefaults ──change──▶ WorkerManager.update_init     │
//! │   (options, extra     │                                     │
//! │    sources, toggles)  ├─────▶ FeatureRegistry.apply         │
//! │                       │        (dispose ▸ register)         │
//! │                       └─────▶ ValidationPipeline            │
//! │                                (debounce ▸ validate ▸       │
//! │  DocumentStore ──change────▶    markers)                    │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! [`LanguageDefaults`] is the single mutable configuration surface the
//! embedder talks to; everything downstream observes its change events and
//! reconciles itself.

pub mod defaults;
pub mod mode;
pub mod registry;
pub mod settings;
pub mod validate;

pub use defaults::{ConfigSnapshot, DiagnosticsOptions, FeatureToggles, LanguageDefaults};
pub use mode::{ModeContext, activate_mode};
pub use registry::{FeatureRegistry, WorkerBackedProvider};
pub use settings::{ModeSettings, SettingsError, TimingConfig};
pub use validate::ValidationPipeline;

/// Result type for mode operations
pub type ModeResult<T> = Result<T, ModeError>;

/// Errors from the mode layer
#[derive(Debug, thiserror::Error)]
pub enum ModeError {
    #[error("Extra source already registered at path: {0}")]
    DuplicateExtraSource(String),
}
