//! Debounced document validation.
//!
//! ## Learning: Cancelling Timers, Not Work
//!
//! Per document the pipeline is a small state machine: Idle, Scheduled
//! (debounce timer armed), Running (remote call in flight). Re-scheduling
//! may abort a Scheduled timer, but a Running validation is never
//! force-cancelled: the remote call completes and its result is discarded
//! if the document version moved on. The trick that keeps abort safe is
//! that the timer task removes itself from the pending map in the same
//! critical section that decides it may run, so an abort can only ever hit
//! a task that is still sleeping or about to find itself superseded.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::{debug, warn};

use langbridge_host::{DocumentStore, DocumentUri, Marker, MarkerSink};
use langbridge_worker::{Diagnostic, DiagnosticClass, WorkerManager};

use crate::defaults::DiagnosticsOptions;

struct PendingValidation {
    generation: u64,
    handle: tokio::task::JoinHandle<()>,
}

struct PipelineInner {
    mode_id: String,
    manager: WorkerManager,
    documents: Arc<DocumentStore>,
    sink: Arc<dyn MarkerSink>,
    debounce: Duration,
    diagnostics: Mutex<DiagnosticsOptions>,
    pending: Mutex<HashMap<DocumentUri, PendingValidation>>,
    generation: AtomicU64,
}

/// Debounces edits into whole-document marker replacement.
#[derive(Clone)]
pub struct ValidationPipeline {
    inner: Arc<PipelineInner>,
}

impl ValidationPipeline {
    pub fn new(
        mode_id: impl Into<String>,
        manager: WorkerManager,
        documents: Arc<DocumentStore>,
        sink: Arc<dyn MarkerSink>,
        debounce: Duration,
        diagnostics: DiagnosticsOptions,
    ) -> Self {
        Self {
            inner: Arc::new(PipelineInner {
                mode_id: mode_id.into(),
                manager,
                documents,
                sink,
                debounce,
                diagnostics: Mutex::new(diagnostics),
                pending: Mutex::new(HashMap::new()),
                generation: AtomicU64::new(0),
            }),
        }
    }

    /// (Re-)arms the debounce timer for a document.
    ///
    /// A previously Scheduled validation for the same document is
    /// superseded; a Running one is left alone and discards itself.
    pub fn schedule(&self, uri: &DocumentUri) {
        let generation = self.inner.generation.fetch_add(1, Ordering::SeqCst) + 1;
        // The window starts at the change event, not at the first poll of
        // the timer task.
        let deadline = tokio::time::Instant::now() + self.inner.debounce;
        let inner = Arc::clone(&self.inner);
        let task_uri = uri.clone();

        // The map entry must be in place before the timer can fire, so the
        // lock is held across the spawn; the task blocks on it until then.
        let mut pending = self.inner.pending.lock();
        let handle = tokio::spawn(async move {
            tokio::time::sleep_until(deadline).await;
            {
                let mut pending = inner.pending.lock();
                match pending.get(&task_uri) {
                    // Removing the entry here marks the transition to
                    // Running; from now on no abort can reach this task.
                    Some(entry) if entry.generation == generation => {
                        pending.remove(&task_uri);
                    }
                    _ => return,
                }
            }
            inner.validate(&task_uri).await;
        });

        let superseded = pending.insert(uri.clone(), PendingValidation { generation, handle });
        if let Some(previous) = superseded {
            previous.handle.abort();
        }
    }

    /// Cancels any pending validation and clears the document's markers.
    pub fn cancel(&self, uri: &DocumentUri) {
        if let Some(entry) = self.inner.pending.lock().remove(uri) {
            entry.handle.abort();
        }
        self.inner
            .sink
            .set_markers(uri, &self.inner.mode_id, Vec::new());
    }

    /// Updates the pass filter and revalidates all open documents.
    pub fn set_diagnostics_options(&self, options: DiagnosticsOptions) {
        {
            let mut current = self.inner.diagnostics.lock();
            if *current == options {
                return;
            }
            *current = options;
        }
        debug!(mode = %self.inner.mode_id, "diagnostics options changed, revalidating");
        for uri in self.inner.documents.open_uris() {
            self.schedule(&uri);
        }
    }

    /// Cancels all pending work and clears markers for open documents.
    pub fn dispose(&self) {
        let pending: Vec<_> = self.inner.pending.lock().drain().collect();
        for (_, entry) in pending {
            entry.handle.abort();
        }
        for uri in self.inner.documents.open_uris() {
            self.inner
                .sink
                .set_markers(&uri, &self.inner.mode_id, Vec::new());
        }
    }
}

impl PipelineInner {
    async fn validate(&self, uri: &DocumentUri) {
        // Version captured at timer fire; the result is stamped with it.
        let Some(version) = self.documents.version(uri) else {
            return;
        };

        let lease = match self.manager.proxy(std::slice::from_ref(uri)).await {
            Ok(lease) => lease,
            Err(error) => {
                // Not cached; the next edit simply tries again.
                debug!(%uri, %error, "validation skipped, analysis unavailable");
                return;
            }
        };
        let diagnostics = match lease.diagnostics(uri).await {
            Ok(diagnostics) => diagnostics,
            Err(error) => {
                warn!(%uri, %error, "validation request failed");
                return;
            }
        };
        drop(lease);

        if self.documents.version(uri) != Some(version) {
            debug!(%uri, version, "discarding stale validation result");
            return;
        }

        let options = *self.diagnostics.lock();
        let markers: Vec<Marker> = diagnostics
            .into_iter()
            .filter(|diagnostic| match diagnostic.class {
                DiagnosticClass::Syntax => !options.no_syntax_validation,
                DiagnosticClass::Semantic => !options.no_semantic_validation,
            })
            .map(marker_of)
            .collect();
        self.sink.set_markers(uri, &self.mode_id, markers);
    }
}

fn marker_of(diagnostic: Diagnostic) -> Marker {
    Marker {
        severity: diagnostic.severity,
        message: diagnostic.message,
        start: diagnostic.start,
        end: diagnostic.end,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use langbridge_host::{
        ColorInformation, CompletionItem, DocumentHighlight, DocumentLink, DocumentSymbol,
        FoldingRange, Hover, MarkerSeverity, SelectionRange, TextEdit,
    };
    use langbridge_worker::{
        AnalysisWorker, ResourceState, WorkerError, WorkerInit, WorkerResult, WorkerSpawner,
        WorkerTiming,
    };
    use tokio::sync::Notify;

    /// A worker whose diagnostics call blocks until released.
    struct GatedWorker {
        gate: Arc<Notify>,
        gated: bool,
    }

    #[async_trait]
    impl AnalysisWorker for GatedWorker {
        async fn sync_resources(&self, _resources: Vec<ResourceState>) -> WorkerResult<()> {
            Ok(())
        }

        async fn remove_resources(&self, _uris: Vec<DocumentUri>) -> WorkerResult<()> {
            Ok(())
        }

        async fn completions(
            &self,
            _uri: &DocumentUri,
            _offset: usize,
        ) -> WorkerResult<Vec<CompletionItem>> {
            Ok(Vec::new())
        }

        async fn hover(&self, _uri: &DocumentUri, _offset: usize) -> WorkerResult<Option<Hover>> {
            Ok(None)
        }

        async fn document_highlights(
            &self,
            _uri: &DocumentUri,
            _offset: usize,
        ) -> WorkerResult<Vec<DocumentHighlight>> {
            Ok(Vec::new())
        }

        async fn links(&self, _uri: &DocumentUri) -> WorkerResult<Vec<DocumentLink>> {
            Ok(Vec::new())
        }

        async fn document_symbols(&self, _uri: &DocumentUri) -> WorkerResult<Vec<DocumentSymbol>> {
            Ok(Vec::new())
        }

        async fn rename_edits(
            &self,
            _uri: &DocumentUri,
            _offset: usize,
            _new_name: &str,
        ) -> WorkerResult<Vec<TextEdit>> {
            Ok(Vec::new())
        }

        async fn folding_ranges(&self, _uri: &DocumentUri) -> WorkerResult<Vec<FoldingRange>> {
            Ok(Vec::new())
        }

        async fn selection_ranges(
            &self,
            _uri: &DocumentUri,
            _offsets: &[usize],
        ) -> WorkerResult<Vec<SelectionRange>> {
            Ok(Vec::new())
        }

        async fn formatting_edits(&self, _uri: &DocumentUri) -> WorkerResult<Vec<TextEdit>> {
            Ok(Vec::new())
        }

        async fn colors(&self, _uri: &DocumentUri) -> WorkerResult<Vec<ColorInformation>> {
            Ok(Vec::new())
        }

        async fn diagnostics(&self, _uri: &DocumentUri) -> WorkerResult<Vec<Diagnostic>> {
            if self.gated {
                self.gate.notified().await;
            }
            Ok(vec![
                Diagnostic {
                    class: DiagnosticClass::Syntax,
                    severity: MarkerSeverity::Error,
                    message: "unbalanced".to_string(),
                    start: 0,
                    end: 1,
                },
                Diagnostic {
                    class: DiagnosticClass::Semantic,
                    severity: MarkerSeverity::Warning,
                    message: "duplicate".to_string(),
                    start: 2,
                    end: 3,
                },
            ])
        }

        fn dispose(&self) {}
    }

    struct GatedSpawner {
        gate: Arc<Notify>,
        gated: bool,
        fail: bool,
    }

    #[async_trait]
    impl WorkerSpawner for GatedSpawner {
        async fn spawn(&self, _init: WorkerInit) -> WorkerResult<Arc<dyn AnalysisWorker>> {
            if self.fail {
                return Err(WorkerError::ProxyUnavailable("down".to_string()));
            }
            Ok(Arc::new(GatedWorker {
                gate: Arc::clone(&self.gate),
                gated: self.gated,
            }))
        }
    }

    /// Records every whole-document replacement it receives.
    struct RecordingSink {
        calls: Mutex<Vec<(DocumentUri, usize)>>,
    }

    impl RecordingSink {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                calls: Mutex::new(Vec::new()),
            })
        }
    }

    impl MarkerSink for RecordingSink {
        fn set_markers(&self, uri: &DocumentUri, _owner: &str, markers: Vec<Marker>) {
            self.calls.lock().push((uri.clone(), markers.len()));
        }
    }

    struct Fixture {
        pipeline: ValidationPipeline,
        documents: Arc<DocumentStore>,
        sink: Arc<RecordingSink>,
        gate: Arc<Notify>,
    }

    fn fixture(gated: bool, fail: bool) -> Fixture {
        fixture_with_debounce(gated, fail, Duration::from_millis(400))
    }

    fn fixture_with_debounce(gated: bool, fail: bool, debounce: Duration) -> Fixture {
        let gate = Arc::new(Notify::new());
        let documents = Arc::new(DocumentStore::new());
        let sink = RecordingSink::new();
        let manager = WorkerManager::new(
            Arc::new(GatedSpawner {
                gate: Arc::clone(&gate),
                gated,
                fail,
            }),
            WorkerInit {
                mode_id: "demo".to_string(),
                structural: Default::default(),
                extra_sources: Default::default(),
            },
            Arc::clone(&documents),
            WorkerTiming::default(),
        );
        let pipeline = ValidationPipeline::new(
            "demo",
            manager,
            Arc::clone(&documents),
            sink.clone() as Arc<dyn MarkerSink>,
            debounce,
            DiagnosticsOptions::default(),
        );
        Fixture {
            pipeline,
            documents,
            sink,
            gate,
        }
    }

    async fn settle() {
        for _ in 0..20 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_validation_waits_out_the_debounce() {
        let f = fixture(false, false);
        let uri = DocumentUri::from("mem:a.txt");
        f.documents.open(uri.clone(), "demo", "((").unwrap();

        f.pipeline.schedule(&uri);
        tokio::time::advance(Duration::from_millis(399)).await;
        settle().await;
        assert!(f.sink.calls.lock().is_empty());

        tokio::time::advance(Duration::from_millis(2)).await;
        settle().await;
        let calls = f.sink.calls.lock();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0], (uri, 2));
    }

    #[tokio::test(start_paused = true)]
    async fn test_rapid_changes_coalesce_into_one_validation() {
        let f = fixture(false, false);
        let uri = DocumentUri::from("mem:a.txt");
        f.documents.open(uri.clone(), "demo", "x").unwrap();

        for _ in 0..5 {
            f.pipeline.schedule(&uri);
            tokio::time::advance(Duration::from_millis(100)).await;
        }
        settle().await;
        assert!(f.sink.calls.lock().is_empty(), "debounce window kept moving");

        tokio::time::advance(Duration::from_millis(400)).await;
        settle().await;
        assert_eq!(f.sink.calls.lock().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_result_discarded_by_version() {
        let f = fixture(true, false);
        let uri = DocumentUri::from("mem:a.txt");
        f.documents.open(uri.clone(), "demo", "v1").unwrap();

        f.pipeline.schedule(&uri);
        tokio::time::advance(Duration::from_millis(401)).await;
        settle().await;
        // Running, blocked on the gate. Edit the document underneath it.
        f.documents.set_text(&uri, "v2").unwrap();

        f.gate.notify_one();
        settle().await;
        assert!(
            f.sink.calls.lock().is_empty(),
            "result for an outdated version must be discarded"
        );

        // A fresh cycle against the current version publishes.
        f.pipeline.schedule(&uri);
        tokio::time::advance(Duration::from_millis(401)).await;
        settle().await;
        f.gate.notify_one();
        settle().await;
        assert_eq!(f.sink.calls.lock().len(), 1);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_zero_debounce_never_loses_a_cycle() {
        // With no quiet period the timer fires as soon as it is polled; the
        // pending entry must already be visible to it on another thread.
        let f = fixture_with_debounce(false, false, Duration::ZERO);
        let uris: Vec<DocumentUri> = (0..4)
            .map(|i| DocumentUri::from(format!("mem:{i}.txt").as_str()))
            .collect();
        for uri in &uris {
            f.documents.open(uri.clone(), "demo", "x").unwrap();
            f.pipeline.schedule(uri);
        }

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(f.sink.calls.lock().len(), uris.len());
    }

    #[tokio::test(start_paused = true)]
    async fn test_proxy_unavailable_skips_cycle_quietly() {
        let f = fixture(false, true);
        let uri = DocumentUri::from("mem:a.txt");
        f.documents.open(uri.clone(), "demo", "x").unwrap();

        f.pipeline.schedule(&uri);
        tokio::time::advance(Duration::from_millis(401)).await;
        settle().await;
        assert!(f.sink.calls.lock().is_empty(), "no markers, no panic");
    }

    #[tokio::test(start_paused = true)]
    async fn test_close_cancels_and_clears_markers() {
        let f = fixture(false, false);
        let uri = DocumentUri::from("mem:a.txt");
        f.documents.open(uri.clone(), "demo", "x").unwrap();

        f.pipeline.schedule(&uri);
        f.documents.close(&uri).unwrap();
        f.pipeline.cancel(&uri);

        tokio::time::advance(Duration::from_millis(500)).await;
        settle().await;
        let calls = f.sink.calls.lock();
        // Exactly the clearing replacement, never a validation result.
        assert_eq!(*calls, vec![(uri, 0)]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_diagnostics_options_filter_passes() {
        let f = fixture(false, false);
        let uri = DocumentUri::from("mem:a.txt");
        f.documents.open(uri.clone(), "demo", "x").unwrap();

        f.pipeline.set_diagnostics_options(DiagnosticsOptions {
            no_syntax_validation: true,
            no_semantic_validation: false,
        });
        tokio::time::advance(Duration::from_millis(401)).await;
        settle().await;

        let calls = f.sink.calls.lock();
        // The options change itself revalidated the open document, with
        // the syntax pass filtered out of the two-diagnostic result.
        assert_eq!(*calls, vec![(uri, 1)]);
    }
}
