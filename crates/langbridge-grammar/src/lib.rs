//! # Langbridge Grammar
//!
//! Declarative lexical rule tables and the language contribution registry.
//!
//! The core never interprets these tables; it hands them to the host's
//! lexer engine through [`TokenizerHost`]. Languages are contributed up
//! front as cheap descriptors (id, extensions, aliases) and their grammar
//! packs are loaded lazily on first use.

pub mod contribution;
pub mod tables;

pub use contribution::{LanguageDescriptor, LanguageRegistry, PackLoader};
pub use tables::{
    AutoClosingPair, Bracket, CommentRule, Grammar, GrammarState, LanguageConfiguration,
    LanguagePack, TokenRule,
};

pub mod samples;

use langbridge_host::Disposable;
use std::sync::Arc;

/// Result type for grammar operations
pub type GrammarResult<T> = Result<T, GrammarError>;

/// Errors from the language registry
#[derive(Debug, thiserror::Error)]
pub enum GrammarError {
    #[error("Language already registered: {0}")]
    DuplicateLanguage(String),

    #[error("Unknown language: {0}")]
    UnknownLanguage(String),
}

/// The host's tokenizer-registration API.
///
/// The grammar and rich-edit configuration are opaque to the core; the host
/// lexer engine consumes them.
pub trait TokenizerHost: Send + Sync {
    fn set_tokens_provider(&self, mode_id: &str, grammar: Arc<Grammar>) -> Disposable;
    fn set_language_configuration(
        &self,
        mode_id: &str,
        configuration: LanguageConfiguration,
    ) -> Disposable;
}
