//! In-process worker: the engine on a dedicated thread.
//!
//! ## Learning: Bridging Threads and Async
//!
//! The engine is synchronous and owns mutable state, so it lives on its own
//! OS thread and consumes a job queue. Each async call posts a closure over
//! a std `mpsc` channel and awaits a tokio `oneshot` for the result; the
//! thread never blocks the runtime, and the runtime never blocks the thread.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::mpsc;
use std::thread;
use tokio::sync::oneshot;
use tracing::debug;

use langbridge_host::{
    ColorInformation, CompletionItem, DocumentHighlight, DocumentLink, DocumentSymbol,
    DocumentUri, FoldingRange, Hover, SelectionRange, TextEdit,
};

use crate::engine::WordIndexEngine;
use crate::proxy::{AnalysisWorker, Diagnostic, ResourceState, WorkerInit, WorkerSpawner};
use crate::{WorkerError, WorkerResult};

enum Job {
    Run(Box<dyn FnOnce(&mut WordIndexEngine) + Send>),
    Shutdown,
}

/// An [`AnalysisWorker`] backed by a [`WordIndexEngine`] on its own thread.
pub struct LocalWorker {
    sender: Mutex<Option<mpsc::Sender<Job>>>,
    handle: Mutex<Option<thread::JoinHandle<()>>>,
}

impl LocalWorker {
    pub fn start(init: WorkerInit) -> WorkerResult<Arc<Self>> {
        let (sender, receiver) = mpsc::channel::<Job>();
        let mode_id = init.mode_id.clone();
        let handle = thread::Builder::new()
            .name(format!("analysis-{mode_id}"))
            .spawn(move || {
                debug!(mode = %init.mode_id, "analysis thread started");
                let mut engine = WordIndexEngine::new(init);
                while let Ok(job) = receiver.recv() {
                    match job {
                        Job::Run(job) => job(&mut engine),
                        Job::Shutdown => break,
                    }
                }
            })
            .map_err(|error| WorkerError::ProxyUnavailable(error.to_string()))?;

        Ok(Arc::new(Self {
            sender: Mutex::new(Some(sender)),
            handle: Mutex::new(Some(handle)),
        }))
    }

    async fn request<T, F>(&self, job: F) -> WorkerResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut WordIndexEngine) -> T + Send + 'static,
    {
        let (reply, response) = oneshot::channel();
        {
            let sender = self.sender.lock();
            let sender = sender.as_ref().ok_or(WorkerError::WorkerStopped)?;
            sender
                .send(Job::Run(Box::new(move |engine| {
                    let _ = reply.send(job(engine));
                })))
                .map_err(|_| WorkerError::WorkerStopped)?;
        }
        response.await.map_err(|_| WorkerError::WorkerStopped)
    }
}

#[async_trait]
impl AnalysisWorker for LocalWorker {
    async fn sync_resources(&self, resources: Vec<ResourceState>) -> WorkerResult<()> {
        self.request(move |engine| engine.sync(resources)).await
    }

    async fn remove_resources(&self, uris: Vec<DocumentUri>) -> WorkerResult<()> {
        self.request(move |engine| engine.remove(&uris)).await
    }

    async fn completions(
        &self,
        uri: &DocumentUri,
        offset: usize,
    ) -> WorkerResult<Vec<CompletionItem>> {
        let uri = uri.clone();
        self.request(move |engine| engine.completions(&uri, offset))
            .await
    }

    async fn hover(&self, uri: &DocumentUri, offset: usize) -> WorkerResult<Option<Hover>> {
        let uri = uri.clone();
        self.request(move |engine| engine.hover(&uri, offset)).await
    }

    async fn document_highlights(
        &self,
        uri: &DocumentUri,
        offset: usize,
    ) -> WorkerResult<Vec<DocumentHighlight>> {
        let uri = uri.clone();
        self.request(move |engine| engine.document_highlights(&uri, offset))
            .await
    }

    async fn links(&self, uri: &DocumentUri) -> WorkerResult<Vec<DocumentLink>> {
        let uri = uri.clone();
        self.request(move |engine| engine.links(&uri)).await
    }

    async fn document_symbols(&self, uri: &DocumentUri) -> WorkerResult<Vec<DocumentSymbol>> {
        let uri = uri.clone();
        self.request(move |engine| engine.document_symbols(&uri))
            .await
    }

    async fn rename_edits(
        &self,
        uri: &DocumentUri,
        offset: usize,
        new_name: &str,
    ) -> WorkerResult<Vec<TextEdit>> {
        let uri = uri.clone();
        let new_name = new_name.to_string();
        self.request(move |engine| engine.rename_edits(&uri, offset, &new_name))
            .await
    }

    async fn folding_ranges(&self, uri: &DocumentUri) -> WorkerResult<Vec<FoldingRange>> {
        let uri = uri.clone();
        self.request(move |engine| engine.folding_ranges(&uri))
            .await
    }

    async fn selection_ranges(
        &self,
        uri: &DocumentUri,
        offsets: &[usize],
    ) -> WorkerResult<Vec<SelectionRange>> {
        let uri = uri.clone();
        let offsets = offsets.to_vec();
        self.request(move |engine| engine.selection_ranges(&uri, &offsets))
            .await
    }

    async fn formatting_edits(&self, uri: &DocumentUri) -> WorkerResult<Vec<TextEdit>> {
        let uri = uri.clone();
        self.request(move |engine| engine.formatting_edits(&uri))
            .await
    }

    async fn colors(&self, uri: &DocumentUri) -> WorkerResult<Vec<ColorInformation>> {
        let uri = uri.clone();
        self.request(move |engine| engine.colors(&uri)).await
    }

    async fn diagnostics(&self, uri: &DocumentUri) -> WorkerResult<Vec<Diagnostic>> {
        let uri = uri.clone();
        self.request(move |engine| engine.diagnostics(&uri)).await
    }

    fn dispose(&self) {
        let sender = self.sender.lock().take();
        let Some(sender) = sender else {
            return;
        };
        let _ = sender.send(Job::Shutdown);
        // The loop breaks on the shutdown message, so this join is brief.
        if let Some(handle) = self.handle.lock().take() {
            let _ = handle.join();
        }
    }
}

/// Spawns [`LocalWorker`]s.
pub struct LocalSpawner;

#[async_trait]
impl WorkerSpawner for LocalSpawner {
    async fn spawn(&self, init: WorkerInit) -> WorkerResult<Arc<dyn AnalysisWorker>> {
        let worker = LocalWorker::start(init)?;
        Ok(worker)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn init() -> WorkerInit {
        WorkerInit {
            mode_id: "test".to_string(),
            structural: Default::default(),
            extra_sources: Default::default(),
        }
    }

    #[tokio::test]
    async fn test_round_trip_through_thread() {
        let worker = LocalWorker::start(init()).unwrap();
        let uri = DocumentUri::from("mem:a.txt");

        worker
            .sync_resources(vec![ResourceState {
                uri: uri.clone(),
                version: 1,
                text: "alpha beta alpha".to_string(),
            }])
            .await
            .unwrap();

        let highlights = worker.document_highlights(&uri, 0).await.unwrap();
        assert_eq!(highlights.len(), 2);
        worker.dispose();
    }

    #[tokio::test]
    async fn test_dispose_is_idempotent_and_stops_requests() {
        let worker = LocalWorker::start(init()).unwrap();
        worker.dispose();
        worker.dispose();

        let uri = DocumentUri::from("mem:a.txt");
        assert!(matches!(
            worker.links(&uri).await,
            Err(WorkerError::WorkerStopped)
        ));
    }

    #[tokio::test]
    async fn test_spawner_produces_live_worker() {
        let worker = LocalSpawner.spawn(init()).await.unwrap();
        let uri = DocumentUri::from("mem:a.txt");
        assert!(worker.completions(&uri, 0).await.unwrap().is_empty());
        worker.dispose();
    }
}
