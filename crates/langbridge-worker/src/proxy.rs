//! The analysis proxy surface and its spawn seam.
//!
//! ## Learning: Async Traits and `dyn`
//!
//! `async fn` in traits is not object-safe yet, and the manager must hold
//! workers as `Arc<dyn AnalysisWorker>`. The `async_trait` macro rewrites
//! the methods to return boxed futures, which restores object safety at the
//! cost of one allocation per call — irrelevant next to a cross-context
//! round trip.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

use langbridge_host::{
    ColorInformation, CompletionItem, DocumentHighlight, DocumentLink, DocumentSnapshot,
    DocumentSymbol, DocumentUri, FoldingRange, Hover, MarkerSeverity, SelectionRange, TextEdit,
};

use crate::WorkerResult;

/// Options the analysis engine itself consumes.
///
/// Changing any of these invalidates a live worker; the manager respawns
/// with the new options on the next request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StructuralOptions {
    /// Compare identifiers case-sensitively
    pub case_sensitive: bool,

    /// Identifiers shorter than this never surface in completions
    pub min_identifier_len: usize,

    /// Words that introduce a declaration (symbols, duplicate checks)
    pub declaration_keywords: Vec<String>,

    /// Hard cap on diagnostics per document
    pub max_diagnostics: usize,
}

impl Default for StructuralOptions {
    fn default() -> Self {
        Self {
            case_sensitive: true,
            min_identifier_len: 1,
            declaration_keywords: ["let", "const", "var", "fn", "function", "def", "declare"]
                .into_iter()
                .map(String::from)
                .collect(),
            max_diagnostics: 100,
        }
    }
}

/// Everything a fresh worker needs at spawn time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerInit {
    pub mode_id: String,
    pub structural: StructuralOptions,
    /// Virtual sources visible to the engine, keyed by unique path
    pub extra_sources: BTreeMap<String, String>,
}

/// A document's state mirrored into the worker before a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceState {
    pub uri: DocumentUri,
    pub version: u64,
    pub text: String,
}

impl From<DocumentSnapshot> for ResourceState {
    fn from(snapshot: DocumentSnapshot) -> Self {
        Self {
            uri: snapshot.uri,
            version: snapshot.version,
            text: snapshot.text,
        }
    }
}

/// Which validation pass produced a diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiagnosticClass {
    Syntax,
    Semantic,
}

/// A single analysis finding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub class: DiagnosticClass,
    pub severity: MarkerSeverity,
    pub message: String,
    pub start: usize,
    pub end: usize,
}

/// The remote-callable analysis surface.
///
/// Every method is a suspension point: the call crosses into the background
/// context and the caller resumes on the interaction side when the response
/// arrives. Implementations may process requests one at a time; concurrent
/// callers are then served in arrival order.
#[async_trait]
pub trait AnalysisWorker: Send + Sync {
    /// Mirrors document states into the worker, replacing prior versions.
    async fn sync_resources(&self, resources: Vec<ResourceState>) -> WorkerResult<()>;

    /// Drops mirrored documents, e.g. after they are closed on the host side.
    async fn remove_resources(&self, uris: Vec<DocumentUri>) -> WorkerResult<()>;

    async fn completions(
        &self,
        uri: &DocumentUri,
        offset: usize,
    ) -> WorkerResult<Vec<CompletionItem>>;

    async fn hover(&self, uri: &DocumentUri, offset: usize) -> WorkerResult<Option<Hover>>;

    async fn document_highlights(
        &self,
        uri: &DocumentUri,
        offset: usize,
    ) -> WorkerResult<Vec<DocumentHighlight>>;

    async fn links(&self, uri: &DocumentUri) -> WorkerResult<Vec<DocumentLink>>;

    async fn document_symbols(&self, uri: &DocumentUri) -> WorkerResult<Vec<DocumentSymbol>>;

    async fn rename_edits(
        &self,
        uri: &DocumentUri,
        offset: usize,
        new_name: &str,
    ) -> WorkerResult<Vec<TextEdit>>;

    async fn folding_ranges(&self, uri: &DocumentUri) -> WorkerResult<Vec<FoldingRange>>;

    async fn selection_ranges(
        &self,
        uri: &DocumentUri,
        offsets: &[usize],
    ) -> WorkerResult<Vec<SelectionRange>>;

    async fn formatting_edits(&self, uri: &DocumentUri) -> WorkerResult<Vec<TextEdit>>;

    async fn colors(&self, uri: &DocumentUri) -> WorkerResult<Vec<ColorInformation>>;

    async fn diagnostics(&self, uri: &DocumentUri) -> WorkerResult<Vec<Diagnostic>>;

    /// Terminates the background context. Idempotent.
    fn dispose(&self);
}

/// The host's background execution context.
///
/// At most one live worker exists per mode instance; the manager enforces
/// that, the spawner only starts contexts.
#[async_trait]
pub trait WorkerSpawner: Send + Sync {
    async fn spawn(&self, init: WorkerInit) -> WorkerResult<Arc<dyn AnalysisWorker>>;
}
