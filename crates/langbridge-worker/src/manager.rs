//! Worker lifecycle: lazy spawn, reuse, invalidation, idle disposal.
//!
//! ## Learning: Coalescing Async Work with `Shared`
//!
//! When several feature requests arrive before the first spawn completes,
//! only one background context must be started. The manager stores the
//! in-flight spawn as a `Shared` future: every concurrent caller clones and
//! awaits the same future, and exactly one `WorkerSpawner::spawn` runs.
//!
//! ## Learning: Epochs over Cancellation
//!
//! A configuration change must not leak a worker that was mid-spawn when
//! the change landed. Rather than cancelling the spawn (which would race
//! the spawner), the manager tags each spawn with an epoch counter. When a
//! stale-epoch spawn completes, its worker is disposed on arrival and the
//! caller retries against the current configuration.

use futures::future::{BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;
use std::ops::Deref;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use langbridge_host::{DocumentStore, DocumentUri};

use crate::proxy::{AnalysisWorker, ResourceState, WorkerInit, WorkerSpawner};
use crate::{WorkerError, WorkerResult};

/// Timing knobs for the idle reaper.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkerTiming {
    /// A worker unused for this long is disposed
    pub idle_timeout: Duration,
    /// How often idleness is checked
    pub idle_check: Duration,
}

impl Default for WorkerTiming {
    fn default() -> Self {
        Self {
            idle_timeout: Duration::from_secs(120),
            idle_check: Duration::from_secs(30),
        }
    }
}

type SpawnOutcome = Result<Arc<dyn AnalysisWorker>, String>;
type SpawnFuture = Shared<BoxFuture<'static, SpawnOutcome>>;

struct State {
    init: WorkerInit,
    /// Bumped on every invalidation; spawns completing under an older
    /// epoch are disposed on arrival.
    epoch: u64,
    worker: Option<Arc<dyn AnalysisWorker>>,
    spawning: Option<(u64, SpawnFuture)>,
    /// Invalidated workers that still had active leases when retired.
    retired: Vec<Arc<dyn AnalysisWorker>>,
}

struct Inner {
    spawner: Arc<dyn WorkerSpawner>,
    documents: Arc<DocumentStore>,
    timing: WorkerTiming,
    state: Mutex<State>,
    /// Outstanding leases. Incremented under the state lock so the reaper
    /// (which also holds it) cannot evict between lookup and lease.
    active: AtomicUsize,
    last_used: Mutex<Instant>,
    spawn_count: AtomicU64,
    disposed: AtomicBool,
}

/// Owns the single background analysis worker for one mode instance.
///
/// Cheap to clone; clones share the same worker. Creating a manager spawns
/// its idle-reaper task and therefore requires a tokio runtime.
#[derive(Clone)]
pub struct WorkerManager {
    inner: Arc<Inner>,
}

impl WorkerManager {
    pub fn new(
        spawner: Arc<dyn WorkerSpawner>,
        init: WorkerInit,
        documents: Arc<DocumentStore>,
        timing: WorkerTiming,
    ) -> Self {
        let inner = Arc::new(Inner {
            spawner,
            documents,
            timing,
            state: Mutex::new(State {
                init,
                epoch: 0,
                worker: None,
                spawning: None,
                retired: Vec::new(),
            }),
            active: AtomicUsize::new(0),
            last_used: Mutex::new(Instant::now()),
            spawn_count: AtomicU64::new(0),
            disposed: AtomicBool::new(false),
        });
        Self::spawn_reaper(&inner);
        Self { inner }
    }

    /// Replaces the worker configuration.
    ///
    /// A no-op when the value is unchanged. Otherwise the current worker is
    /// retired (disposed immediately if idle, deferred past outstanding
    /// leases if not) and the next [`proxy`](Self::proxy) call spawns fresh.
    pub fn update_init(&self, init: WorkerInit) {
        let stale = {
            let mut state = self.inner.state.lock();
            if state.init == init {
                return;
            }
            debug!(mode = %init.mode_id, "worker configuration changed, invalidating");
            state.init = init;
            state.epoch += 1;
            state.spawning = None;
            match state.worker.take() {
                Some(worker) if self.inner.active.load(Ordering::SeqCst) > 0 => {
                    state.retired.push(worker);
                    None
                }
                other => other,
            }
        };
        if let Some(worker) = stale {
            worker.dispose();
        }
    }

    /// Obtains a lease on the worker, spawning one if none is live, and
    /// mirrors the given documents into it before returning.
    ///
    /// Spawn failures are returned as [`WorkerError::ProxyUnavailable`] and
    /// never cached; the next call retries from scratch.
    pub async fn proxy(&self, resources: &[DocumentUri]) -> WorkerResult<WorkerLease> {
        loop {
            if self.inner.disposed.load(Ordering::SeqCst) {
                return Err(WorkerError::ManagerDisposed);
            }

            enum Step {
                Ready(WorkerLease),
                Join(u64, SpawnFuture),
            }

            let step = {
                let mut state = self.inner.state.lock();
                if let Some(worker) = state.worker.clone() {
                    Step::Ready(self.lease_locked(worker))
                } else if let Some((epoch, future)) = state.spawning.clone() {
                    Step::Join(epoch, future)
                } else {
                    let epoch = state.epoch;
                    let init = state.init.clone();
                    let spawner = Arc::clone(&self.inner.spawner);
                    self.inner.spawn_count.fetch_add(1, Ordering::SeqCst);
                    let future: SpawnFuture = async move {
                        spawner.spawn(init).await.map_err(|error| error.to_string())
                    }
                    .boxed()
                    .shared();
                    state.spawning = Some((epoch, future.clone()));
                    Step::Join(epoch, future)
                }
            };

            let (epoch, future) = match step {
                Step::Ready(lease) => return self.sync_lease(lease, resources).await,
                Step::Join(epoch, future) => (epoch, future),
            };

            match future.await {
                Ok(worker) => {
                    let lease = {
                        let mut state = self.inner.state.lock();
                        if state.epoch != epoch {
                            // Configuration moved on while the spawn was in
                            // flight. Drop the stale worker and retry.
                            drop(state);
                            warn!("disposing worker spawned under a stale configuration");
                            worker.dispose();
                            continue;
                        }
                        state.spawning = None;
                        state.worker = Some(Arc::clone(&worker));
                        self.lease_locked(worker)
                    };
                    return self.sync_lease(lease, resources).await;
                }
                Err(message) => {
                    let mut state = self.inner.state.lock();
                    if state
                        .spawning
                        .as_ref()
                        .is_some_and(|(pending_epoch, _)| *pending_epoch == epoch)
                    {
                        state.spawning = None;
                    }
                    return Err(WorkerError::ProxyUnavailable(message));
                }
            }
        }
    }

    /// Must be called with the state lock held (or before the worker is
    /// visible to the reaper): pins the lease before the lock is released.
    fn lease_locked(&self, worker: Arc<dyn AnalysisWorker>) -> WorkerLease {
        self.inner.active.fetch_add(1, Ordering::SeqCst);
        *self.inner.last_used.lock() = Instant::now();
        WorkerLease {
            worker,
            inner: Arc::clone(&self.inner),
        }
    }

    async fn sync_lease(
        &self,
        lease: WorkerLease,
        resources: &[DocumentUri],
    ) -> WorkerResult<WorkerLease> {
        let states: Vec<ResourceState> = resources
            .iter()
            .filter_map(|uri| self.inner.documents.snapshot(uri).map(Into::into))
            .collect();
        if !states.is_empty() {
            lease.worker.sync_resources(states).await?;
        }
        Ok(lease)
    }

    /// Forwards document removals to the live worker, if any.
    ///
    /// Closing a document must not spawn a worker just to forget it, so
    /// this is a no-op while no worker is live; a fresh spawn only ever
    /// mirrors documents that are still open.
    pub fn retire_resources(&self, uris: Vec<DocumentUri>) {
        if uris.is_empty() {
            return;
        }
        let worker = self.inner.state.lock().worker.clone();
        if let Some(worker) = worker {
            tokio::spawn(async move {
                if let Err(error) = worker.remove_resources(uris).await {
                    debug!(%error, "resource removal not delivered");
                }
            });
        }
    }

    /// Disposes the current worker and rejects all future requests.
    pub fn dispose(&self) {
        if self.inner.disposed.swap(true, Ordering::SeqCst) {
            return;
        }
        let (worker, retired) = {
            let mut state = self.inner.state.lock();
            state.epoch += 1;
            state.spawning = None;
            let retired: Vec<_> = state.retired.drain(..).collect();
            (state.worker.take(), retired)
        };
        if let Some(worker) = worker {
            worker.dispose();
        }
        for worker in retired {
            worker.dispose();
        }
    }

    /// Number of spawns attempted so far.
    pub fn spawn_count(&self) -> u64 {
        self.inner.spawn_count.load(Ordering::SeqCst)
    }

    /// Whether a live worker is currently cached.
    pub fn has_worker(&self) -> bool {
        self.inner.state.lock().worker.is_some()
    }

    fn spawn_reaper(inner: &Arc<Inner>) {
        let weak: Weak<Inner> = Arc::downgrade(inner);
        let timing = inner.timing;
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(timing.idle_check);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let Some(inner) = weak.upgrade() else {
                    break;
                };
                if inner.disposed.load(Ordering::SeqCst) {
                    break;
                }
                let idle = {
                    // Lock order matches proxy: eviction and lease creation
                    // are mutually exclusive.
                    let mut state = inner.state.lock();
                    if inner.active.load(Ordering::SeqCst) != 0 {
                        continue;
                    }
                    if inner.last_used.lock().elapsed() < timing.idle_timeout {
                        continue;
                    }
                    state.worker.take()
                };
                if let Some(worker) = idle {
                    info!("disposing idle analysis worker");
                    worker.dispose();
                }
            }
        });
    }
}

/// A pinned reference to the live worker.
///
/// While any lease exists the idle reaper leaves the worker alone and
/// invalidated workers are kept until the last lease drops.
pub struct WorkerLease {
    worker: Arc<dyn AnalysisWorker>,
    inner: Arc<Inner>,
}

impl std::fmt::Debug for WorkerLease {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerLease")
            .field("active", &self.inner.active.load(Ordering::SeqCst))
            .finish()
    }
}

impl Deref for WorkerLease {
    type Target = dyn AnalysisWorker;

    fn deref(&self) -> &Self::Target {
        self.worker.as_ref()
    }
}

impl Drop for WorkerLease {
    fn drop(&mut self) {
        *self.inner.last_used.lock() = Instant::now();
        if self.inner.active.fetch_sub(1, Ordering::SeqCst) == 1 {
            let retired: Vec<_> = self.inner.state.lock().retired.drain(..).collect();
            for worker in retired {
                worker.dispose();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use langbridge_host::{
        ColorInformation, CompletionItem, DocumentHighlight, DocumentLink, DocumentSymbol,
        FoldingRange, Hover, SelectionRange, TextEdit,
    };

    struct TestWorker {
        disposed: AtomicBool,
        synced: Mutex<Vec<ResourceState>>,
        removed: Mutex<Vec<DocumentUri>>,
    }

    impl TestWorker {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                disposed: AtomicBool::new(false),
                synced: Mutex::new(Vec::new()),
                removed: Mutex::new(Vec::new()),
            })
        }

        fn is_disposed(&self) -> bool {
            self.disposed.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl AnalysisWorker for TestWorker {
        async fn sync_resources(&self, resources: Vec<ResourceState>) -> WorkerResult<()> {
            self.synced.lock().extend(resources);
            Ok(())
        }

        async fn remove_resources(&self, uris: Vec<DocumentUri>) -> WorkerResult<()> {
            self.removed.lock().extend(uris);
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

        async fn diagnostics(&self, _uri: &DocumentUri) -> WorkerResult<Vec<crate::Diagnostic>> {
            Ok(Vec::new())
        }

        fn dispose(&self) {
            self.disposed.store(true, Ordering::SeqCst);
        }
    }

    struct TestSpawner {
        spawned: Mutex<Vec<Arc<TestWorker>>>,
        failures_left: AtomicUsize,
        delay: Duration,
    }

    impl TestSpawner {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                spawned: Mutex::new(Vec::new()),
                failures_left: AtomicUsize::new(0),
                delay: Duration::ZERO,
            })
        }

        fn with_delay(delay: Duration) -> Arc<Self> {
            Arc::new(Self {
                spawned: Mutex::new(Vec::new()),
                failures_left: AtomicUsize::new(0),
                delay,
            })
        }

        fn failing_once() -> Arc<Self> {
            let spawner = Self::new();
            spawner.failures_left.store(1, Ordering::SeqCst);
            spawner
        }

        fn workers(&self) -> Vec<Arc<TestWorker>> {
            self.spawned.lock().clone()
        }
    }

    #[async_trait]
    impl WorkerSpawner for TestSpawner {
        async fn spawn(&self, _init: WorkerInit) -> WorkerResult<Arc<dyn AnalysisWorker>> {
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            if self
                .failures_left
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok()
            {
                return Err(WorkerError::ProxyUnavailable("boot failed".to_string()));
            }
            let worker = TestWorker::new();
            self.spawned.lock().push(Arc::clone(&worker));
            Ok(worker)
        }
    }

    fn init() -> WorkerInit {
        WorkerInit {
            mode_id: "test".to_string(),
            structural: crate::StructuralOptions::default(),
            extra_sources: Default::default(),
        }
    }

    fn manager_with(spawner: Arc<TestSpawner>) -> (WorkerManager, Arc<DocumentStore>) {
        let documents = Arc::new(DocumentStore::new());
        let manager = WorkerManager::new(spawner, init(), Arc::clone(&documents), WorkerTiming::default());
        (manager, documents)
    }

    async fn let_background_tasks_run() {
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_spawn_is_lazy_and_reused() {
        let spawner = TestSpawner::new();
        let (manager, _documents) = manager_with(Arc::clone(&spawner));
        assert_eq!(manager.spawn_count(), 0);

        let lease = manager.proxy(&[]).await.unwrap();
        drop(lease);
        let lease = manager.proxy(&[]).await.unwrap();
        drop(lease);

        assert_eq!(manager.spawn_count(), 1);
        assert_eq!(spawner.workers().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_requests_coalesce_into_one_spawn() {
        let spawner = TestSpawner::with_delay(Duration::from_millis(50));
        let (manager, _documents) = manager_with(Arc::clone(&spawner));

        let (a, b, c) = tokio::join!(manager.proxy(&[]), manager.proxy(&[]), manager.proxy(&[]));
        assert!(a.is_ok() && b.is_ok() && c.is_ok());
        assert_eq!(manager.spawn_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_config_change_disposes_and_respawns() {
        let spawner = TestSpawner::new();
        let (manager, _documents) = manager_with(Arc::clone(&spawner));

        drop(manager.proxy(&[]).await.unwrap());
        assert!(manager.has_worker());

        let mut changed = init();
        changed.structural.case_sensitive = false;
        manager.update_init(changed.clone());
        assert!(!manager.has_worker());
        assert!(spawner.workers()[0].is_disposed());

        // Same value again: no further invalidation, still lazy.
        manager.update_init(changed);
        assert_eq!(manager.spawn_count(), 1);

        drop(manager.proxy(&[]).await.unwrap());
        assert_eq!(manager.spawn_count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_spawn_failure_is_not_cached() {
        let spawner = TestSpawner::failing_once();
        let (manager, _documents) = manager_with(Arc::clone(&spawner));

        let error = manager.proxy(&[]).await.unwrap_err();
        assert!(matches!(error, WorkerError::ProxyUnavailable(_)));
        assert!(!manager.has_worker());

        // The next request retries from scratch and succeeds.
        assert!(manager.proxy(&[]).await.is_ok());
        assert_eq!(manager.spawn_count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_idle_worker_is_reaped() {
        let spawner = TestSpawner::new();
        let (manager, _documents) = manager_with(Arc::clone(&spawner));

        drop(manager.proxy(&[]).await.unwrap());
        assert!(manager.has_worker());

        tokio::time::advance(Duration::from_secs(121)).await;
        let_background_tasks_run().await;

        assert!(!manager.has_worker());
        assert!(spawner.workers()[0].is_disposed());

        // A later request simply spawns a fresh worker.
        drop(manager.proxy(&[]).await.unwrap());
        assert_eq!(manager.spawn_count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_active_lease_defers_eviction() {
        let spawner = TestSpawner::new();
        let (manager, _documents) = manager_with(Arc::clone(&spawner));

        let lease = manager.proxy(&[]).await.unwrap();
        tokio::time::advance(Duration::from_secs(300)).await;
        let_background_tasks_run().await;
        assert!(manager.has_worker(), "leased worker must not be evicted");

        drop(lease);
        tokio::time::advance(Duration::from_secs(300)).await;
        let_background_tasks_run().await;
        assert!(!manager.has_worker());
    }

    #[tokio::test(start_paused = true)]
    async fn test_invalidation_waits_for_outstanding_lease() {
        let spawner = TestSpawner::new();
        let (manager, _documents) = manager_with(Arc::clone(&spawner));

        let lease = manager.proxy(&[]).await.unwrap();
        let mut changed = init();
        changed.structural.max_diagnostics = 5;
        manager.update_init(changed);

        let old = &spawner.workers()[0];
        assert!(!old.is_disposed(), "retired worker disposed under a lease");
        drop(lease);
        assert!(old.is_disposed());
    }

    #[tokio::test(start_paused = true)]
    async fn test_mid_spawn_invalidation_discards_stale_worker() {
        let spawner = TestSpawner::with_delay(Duration::from_millis(50));
        let (manager, _documents) = manager_with(Arc::clone(&spawner));

        let request = {
            let manager = manager.clone();
            tokio::spawn(async move { manager.proxy(&[]).await.map(|lease| drop(lease)) })
        };
        let_background_tasks_run().await;

        let mut changed = init();
        changed.structural.case_sensitive = false;
        manager.update_init(changed);

        request.await.unwrap().unwrap();
        assert_eq!(manager.spawn_count(), 2);
        let workers = spawner.workers();
        assert!(workers[0].is_disposed(), "stale-epoch worker must be disposed");
        assert!(!workers[1].is_disposed());
    }

    #[tokio::test(start_paused = true)]
    async fn test_lease_mirrors_requested_documents() {
        let spawner = TestSpawner::new();
        let (manager, documents) = manager_with(Arc::clone(&spawner));

        let uri = DocumentUri::from("mem:a.txt");
        documents.open(uri.clone(), "plaintext", "hello").unwrap();

        drop(manager.proxy(std::slice::from_ref(&uri)).await.unwrap());
        let synced = spawner.workers()[0].synced.lock().clone();
        assert_eq!(synced.len(), 1);
        assert_eq!(synced[0].uri, uri);
        assert_eq!(synced[0].text, "hello");
    }

    #[tokio::test(start_paused = true)]
    async fn test_retired_resources_reach_the_worker() {
        let spawner = TestSpawner::new();
        let (manager, documents) = manager_with(Arc::clone(&spawner));

        let uri = DocumentUri::from("mem:a.txt");

        // Without a live worker there is nothing to forget and no spawn.
        manager.retire_resources(vec![uri.clone()]);
        let_background_tasks_run().await;
        assert_eq!(manager.spawn_count(), 0);

        documents.open(uri.clone(), "plaintext", "hello").unwrap();
        drop(manager.proxy(std::slice::from_ref(&uri)).await.unwrap());

        documents.close(&uri).unwrap();
        manager.retire_resources(vec![uri.clone()]);
        let_background_tasks_run().await;

        assert_eq!(*spawner.workers()[0].removed.lock(), vec![uri]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_disposed_manager_rejects_requests() {
        let spawner = TestSpawner::new();
        let (manager, _documents) = manager_with(Arc::clone(&spawner));

        drop(manager.proxy(&[]).await.unwrap());
        manager.dispose();
        assert!(spawner.workers()[0].is_disposed());

        assert!(matches!(
            manager.proxy(&[]).await,
            Err(WorkerError::ManagerDisposed)
        ));
    }
}
