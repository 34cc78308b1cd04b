//! Mode activation: wiring defaults, worker, features and validation.

use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, info};

use langbridge_grammar::{LanguageRegistry, TokenizerHost};
use langbridge_host::{
    Disposable, DisposableStore, DocumentEvent, DocumentStore, FeatureHost, FeatureProvider,
    MarkerSink,
};
use langbridge_worker::{WorkerManager, WorkerSpawner};

use crate::defaults::LanguageDefaults;
use crate::registry::{FeatureRegistry, WorkerBackedProvider};
use crate::settings::TimingConfig;
use crate::validate::ValidationPipeline;

/// Everything a mode needs from its embedder.
pub struct ModeContext {
    pub defaults: Arc<LanguageDefaults>,
    pub documents: Arc<DocumentStore>,
    pub features: Arc<dyn FeatureHost>,
    pub tokenizer: Arc<dyn TokenizerHost>,
    pub languages: Arc<LanguageRegistry>,
    pub markers: Arc<dyn MarkerSink>,
    pub spawner: Arc<dyn WorkerSpawner>,
    pub timing: TimingConfig,
}

/// Lexical grammar registration, toggled like a feature.
struct TokenRegistration {
    mode_id: String,
    tokenizer: Arc<dyn TokenizerHost>,
    languages: Arc<LanguageRegistry>,
    handles: Mutex<Vec<Disposable>>,
}

impl TokenRegistration {
    fn apply(&self, enabled: bool) {
        let mut handles = self.handles.lock();
        if enabled && handles.is_empty() {
            match self.languages.load(&self.mode_id) {
                Ok(pack) => {
                    handles.push(
                        self.tokenizer
                            .set_tokens_provider(&self.mode_id, Arc::new(pack.grammar.clone())),
                    );
                    handles.push(
                        self.tokenizer
                            .set_language_configuration(&self.mode_id, pack.configuration.clone()),
                    );
                }
                Err(error) => {
                    debug!(mode = %self.mode_id, %error, "no lexical grammar contributed")
                }
            }
        } else if !enabled {
            while let Some(handle) = handles.pop() {
                handle.dispose();
            }
        }
    }
}

/// Brings a language mode to life.
///
/// Spawns nothing up front: the analysis worker starts on the first feature
/// request or validation cycle. The returned disposable tears the whole
/// mode down; registrations are undone in reverse, the worker last.
pub fn activate_mode(context: ModeContext) -> Disposable {
    let ModeContext {
        defaults,
        documents,
        features,
        tokenizer,
        languages,
        markers,
        spawner,
        timing,
    } = context;
    let mode_id = defaults.mode_id().to_string();
    let snapshot = defaults.snapshot();
    info!(mode = %mode_id, "activating language mode");

    let manager = WorkerManager::new(
        spawner,
        snapshot.worker_init(),
        Arc::clone(&documents),
        timing.worker_timing(),
    );
    let provider: Arc<dyn FeatureProvider> = Arc::new(WorkerBackedProvider::new(manager.clone()));
    let registry = Arc::new(FeatureRegistry::new(&mode_id, features, provider));
    let pipeline = ValidationPipeline::new(
        &mode_id,
        manager.clone(),
        Arc::clone(&documents),
        markers,
        timing.debounce(),
        snapshot.diagnostics,
    );
    let tokens = Arc::new(TokenRegistration {
        mode_id: mode_id.clone(),
        tokenizer,
        languages,
        handles: Mutex::new(Vec::new()),
    });
    let validating = Arc::new(AtomicBool::new(snapshot.toggles.diagnostics));

    registry.apply(&snapshot.toggles.enabled());
    tokens.apply(snapshot.toggles.tokens);
    if snapshot.toggles.diagnostics {
        for uri in documents.open_uris() {
            pipeline.schedule(&uri);
        }
    }

    let document_sub = documents.on_document_event({
        let manager = manager.clone();
        let pipeline = pipeline.clone();
        let validating = Arc::clone(&validating);
        move |event| match event {
            DocumentEvent::Opened(uri) | DocumentEvent::Changed { uri, .. } => {
                if validating.load(Ordering::SeqCst) {
                    pipeline.schedule(uri);
                }
            }
            DocumentEvent::Closed(uri) => {
                pipeline.cancel(uri);
                // The worker's mirror must not keep serving identifiers
                // from a document the host no longer has open.
                manager.retire_resources(vec![uri.clone()]);
            }
        }
    });

    let defaults_sub = defaults.on_did_change({
        let manager = manager.clone();
        let registry = Arc::clone(&registry);
        let pipeline = pipeline.clone();
        let tokens = Arc::clone(&tokens);
        let validating = Arc::clone(&validating);
        let documents = Arc::clone(&documents);
        move |snapshot| {
            // Each consumer diffs the slice it cares about by value, so a
            // toggle flip never restarts the worker and an option change
            // never re-registers providers.
            manager.update_init(snapshot.worker_init());
            registry.apply(&snapshot.toggles.enabled());
            tokens.apply(snapshot.toggles.tokens);
            pipeline.set_diagnostics_options(snapshot.diagnostics);

            let was = validating.swap(snapshot.toggles.diagnostics, Ordering::SeqCst);
            if snapshot.toggles.diagnostics && !was {
                for uri in documents.open_uris() {
                    pipeline.schedule(&uri);
                }
            } else if !snapshot.toggles.diagnostics && was {
                for uri in documents.open_uris() {
                    pipeline.cancel(&uri);
                }
            }
        }
    });

    // dispose_all pops in reverse: subscriptions go first, then features,
    // tokens and validation, the worker last.
    let store = DisposableStore::new();
    store.push(Disposable::new({
        let manager = manager.clone();
        move || manager.dispose()
    }));
    store.push(Disposable::new({
        let pipeline = pipeline.clone();
        move || pipeline.dispose()
    }));
    store.push(Disposable::new({
        let tokens = Arc::clone(&tokens);
        move || tokens.apply(false)
    }));
    store.push(Disposable::new({
        let registry = Arc::clone(&registry);
        move || registry.dispose()
    }));
    store.push(document_sub);
    store.push(defaults_sub);
    store.into_disposable()
}
