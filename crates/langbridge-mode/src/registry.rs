//! Toggle-driven feature registration.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::debug;

use langbridge_host::{
    Disposable, FeatureHost, FeatureKind, FeatureProvider, FeatureRequest, FeatureResponse,
};
use langbridge_worker::{WorkerManager, WorkerResult};

/// A provider that forwards every request through the worker manager.
///
/// One instance serves all feature kinds; the request carries the kind.
/// When the proxy cannot be obtained the provider degrades to the empty
/// response rather than surfacing an error into the host UI.
pub struct WorkerBackedProvider {
    manager: WorkerManager,
}

impl WorkerBackedProvider {
    pub fn new(manager: WorkerManager) -> Self {
        Self { manager }
    }

    async fn call(&self, request: FeatureRequest) -> WorkerResult<FeatureResponse> {
        let uri = request.uri().clone();
        let lease = self.manager.proxy(std::slice::from_ref(&uri)).await?;
        Ok(match request {
            FeatureRequest::Completions { uri, offset } => {
                FeatureResponse::Completions(lease.completions(&uri, offset).await?)
            }
            FeatureRequest::Hover { uri, offset } => {
                FeatureResponse::Hover(lease.hover(&uri, offset).await?)
            }
            FeatureRequest::DocumentHighlights { uri, offset } => {
                FeatureResponse::DocumentHighlights(lease.document_highlights(&uri, offset).await?)
            }
            FeatureRequest::Links { uri } => FeatureResponse::Links(lease.links(&uri).await?),
            FeatureRequest::DocumentSymbols { uri } => {
                FeatureResponse::DocumentSymbols(lease.document_symbols(&uri).await?)
            }
            FeatureRequest::Rename {
                uri,
                offset,
                new_name,
            } => FeatureResponse::Edits(lease.rename_edits(&uri, offset, &new_name).await?),
            FeatureRequest::FoldingRanges { uri } => {
                FeatureResponse::FoldingRanges(lease.folding_ranges(&uri).await?)
            }
            FeatureRequest::SelectionRanges { uri, offsets } => {
                FeatureResponse::SelectionRanges(lease.selection_ranges(&uri, &offsets).await?)
            }
            FeatureRequest::DocumentFormatting { uri } => {
                FeatureResponse::Edits(lease.formatting_edits(&uri).await?)
            }
            FeatureRequest::Colors { uri } => FeatureResponse::Colors(lease.colors(&uri).await?),
        })
    }
}

#[async_trait]
impl FeatureProvider for WorkerBackedProvider {
    async fn provide(&self, request: FeatureRequest) -> FeatureResponse {
        let kind = request.kind();
        match self.call(request).await {
            Ok(response) => response,
            Err(error) => {
                debug!(%kind, %error, "feature degraded to empty result");
                FeatureResponse::empty_for(kind)
            }
        }
    }
}

/// Keeps the host's registered feature set equal to the enabled toggle set.
pub struct FeatureRegistry {
    mode_id: String,
    host: Arc<dyn FeatureHost>,
    provider: Arc<dyn FeatureProvider>,
    registered: Mutex<Vec<(FeatureKind, Disposable)>>,
}

impl FeatureRegistry {
    pub fn new(
        mode_id: impl Into<String>,
        host: Arc<dyn FeatureHost>,
        provider: Arc<dyn FeatureProvider>,
    ) -> Self {
        Self {
            mode_id: mode_id.into(),
            host,
            provider,
            registered: Mutex::new(Vec::new()),
        }
    }

    /// Reconciles the registered set with `enabled`.
    ///
    /// On any difference, all current registrations are disposed in reverse
    /// registration order and the enabled set is registered fresh. The lock
    /// is held throughout and nothing yields, so the host never observes a
    /// partially reconciled set.
    pub fn apply(&self, enabled: &BTreeSet<FeatureKind>) {
        let mut registered = self.registered.lock();
        let current: BTreeSet<FeatureKind> = registered.iter().map(|(kind, _)| *kind).collect();
        if current == *enabled {
            return;
        }
        debug!(mode = %self.mode_id, ?enabled, "reconciling feature registrations");

        while let Some((_, handle)) = registered.pop() {
            handle.dispose();
        }
        for kind in FeatureKind::ALL {
            if enabled.contains(&kind) {
                let handle =
                    self.host
                        .register_provider(&self.mode_id, kind, Arc::clone(&self.provider));
                registered.push((kind, handle));
            }
        }
    }

    /// The currently registered kinds, in registration order.
    pub fn active(&self) -> Vec<FeatureKind> {
        self.registered
            .lock()
            .iter()
            .map(|(kind, _)| *kind)
            .collect()
    }

    /// Disposes every registration, in reverse registration order.
    pub fn dispose(&self) {
        let mut registered = self.registered.lock();
        while let Some((_, handle)) = registered.pop() {
            handle.dispose();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct RecordingHost {
        log: Arc<Mutex<Vec<String>>>,
    }

    impl FeatureHost for RecordingHost {
        fn register_provider(
            &self,
            _mode_id: &str,
            kind: FeatureKind,
            _provider: Arc<dyn FeatureProvider>,
        ) -> Disposable {
            self.log.lock().push(format!("register {kind}"));
            let log = Arc::clone(&self.log);
            Disposable::new(move || log.lock().push(format!("dispose {kind}")))
        }
    }

    struct EchoProvider;

    #[async_trait]
    impl FeatureProvider for EchoProvider {
        async fn provide(&self, request: FeatureRequest) -> FeatureResponse {
            FeatureResponse::empty_for(request.kind())
        }
    }

    fn registry_with_log() -> (FeatureRegistry, Arc<Mutex<Vec<String>>>) {
        let log = Arc::new(Mutex::new(Vec::new()));
        let host = Arc::new(RecordingHost {
            log: Arc::clone(&log),
        });
        (
            FeatureRegistry::new("demo", host, Arc::new(EchoProvider)),
            log,
        )
    }

    #[test]
    fn test_registered_set_tracks_toggles() {
        let (registry, _log) = registry_with_log();

        let enabled: BTreeSet<_> = [FeatureKind::Completions, FeatureKind::Hovers].into();
        registry.apply(&enabled);
        assert_eq!(
            registry.active(),
            vec![FeatureKind::Completions, FeatureKind::Hovers]
        );

        let enabled: BTreeSet<_> = [FeatureKind::Hovers, FeatureKind::Links].into();
        registry.apply(&enabled);
        assert_eq!(
            registry.active(),
            vec![FeatureKind::Hovers, FeatureKind::Links]
        );
    }

    #[test]
    fn test_reconcile_disposes_in_reverse_then_registers() {
        let (registry, log) = registry_with_log();

        registry.apply(&[FeatureKind::Completions, FeatureKind::Hovers].into());
        log.lock().clear();

        registry.apply(&[FeatureKind::Completions].into());
        assert_eq!(
            *log.lock(),
            vec![
                "dispose hovers",
                "dispose completions",
                "register completions",
            ]
        );
    }

    #[test]
    fn test_unchanged_set_is_a_no_op() {
        let (registry, log) = registry_with_log();
        let enabled: BTreeSet<_> = [FeatureKind::Colors].into();

        registry.apply(&enabled);
        log.lock().clear();

        registry.apply(&enabled);
        assert!(log.lock().is_empty());
    }

    #[test]
    fn test_dispose_clears_everything() {
        let (registry, log) = registry_with_log();
        registry.apply(&[FeatureKind::Completions, FeatureKind::Rename].into());
        log.lock().clear();

        registry.dispose();
        assert_eq!(*log.lock(), vec!["dispose rename", "dispose completions"]);
        assert!(registry.active().is_empty());
    }
}
