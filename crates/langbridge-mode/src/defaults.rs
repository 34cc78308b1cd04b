//! The per-mode configuration store.
//!
//! ## Learning: Interior Mutability Behind `Arc`
//!
//! Every part of the system holds the same defaults store: the embedder
//! mutates it, the manager, registry and pipeline observe it. `Arc<Self>`
//! with a `parking_lot::Mutex` around the state gives shared ownership with
//! short, never-awaited critical sections. Change events are emitted after
//! the lock is released, so observers can re-enter the store freely.
//!
//! Observers receive a full [`ConfigSnapshot`] and diff the parts they care
//! about by value: a toggle flip must not restart the analysis worker, and
//! the store does not know who cares about what.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Weak};
use tracing::debug;
use uuid::Uuid;

use langbridge_host::{Disposable, Emitter, FeatureKind};
use langbridge_worker::{StructuralOptions, WorkerInit};

use crate::{ModeError, ModeResult};

/// Which validation passes to suppress.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DiagnosticsOptions {
    /// Skip the syntax pass entirely
    pub no_syntax_validation: bool,

    /// Skip the semantic pass entirely
    pub no_semantic_validation: bool,
}

/// Which capabilities a mode registers with the host.
///
/// `diagnostics` gates the validation pipeline and `tokens` the lexical
/// grammar; the rest map one-to-one onto [`FeatureKind`]s.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeatureToggles {
    pub completions: bool,
    pub hovers: bool,
    pub document_highlights: bool,
    pub links: bool,
    pub document_symbols: bool,
    pub rename: bool,
    pub folding_ranges: bool,
    pub selection_ranges: bool,
    pub document_formatting: bool,
    pub colors: bool,
    pub diagnostics: bool,
    pub tokens: bool,
}

impl Default for FeatureToggles {
    fn default() -> Self {
        Self {
            completions: true,
            hovers: true,
            document_highlights: true,
            links: true,
            document_symbols: true,
            rename: true,
            folding_ranges: true,
            selection_ranges: true,
            document_formatting: true,
            colors: true,
            diagnostics: true,
            tokens: true,
        }
    }
}

impl FeatureToggles {
    /// The set of provider kinds currently switched on.
    pub fn enabled(&self) -> BTreeSet<FeatureKind> {
        let mapping = [
            (self.completions, FeatureKind::Completions),
            (self.hovers, FeatureKind::Hovers),
            (self.document_highlights, FeatureKind::DocumentHighlights),
            (self.links, FeatureKind::Links),
            (self.document_symbols, FeatureKind::DocumentSymbols),
            (self.rename, FeatureKind::Rename),
            (self.folding_ranges, FeatureKind::FoldingRanges),
            (self.selection_ranges, FeatureKind::SelectionRanges),
            (self.document_formatting, FeatureKind::DocumentFormatting),
            (self.colors, FeatureKind::Colors),
        ];
        mapping
            .into_iter()
            .filter_map(|(on, kind)| on.then_some(kind))
            .collect()
    }

    /// All provider kinds off, diagnostics and tokens untouched.
    pub fn none(&self) -> Self {
        Self {
            completions: false,
            hovers: false,
            document_highlights: false,
            links: false,
            document_symbols: false,
            rename: false,
            folding_ranges: false,
            selection_ranges: false,
            document_formatting: false,
            colors: false,
            diagnostics: self.diagnostics,
            tokens: self.tokens,
        }
    }
}

/// A defensive copy of the store's full state at one point in time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigSnapshot {
    pub mode_id: String,
    pub structural: StructuralOptions,
    pub diagnostics: DiagnosticsOptions,
    pub toggles: FeatureToggles,
    pub extra_sources: BTreeMap<String, String>,
}

impl ConfigSnapshot {
    /// The slice of the snapshot the analysis worker is spawned from.
    ///
    /// Toggles and diagnostics options are deliberately absent: changing
    /// them must never invalidate a live worker.
    pub fn worker_init(&self) -> WorkerInit {
        WorkerInit {
            mode_id: self.mode_id.clone(),
            structural: self.structural.clone(),
            extra_sources: self.extra_sources.clone(),
        }
    }
}

struct DefaultsState {
    structural: StructuralOptions,
    diagnostics: DiagnosticsOptions,
    toggles: FeatureToggles,
    extra_sources: BTreeMap<String, String>,
}

/// The mutable configuration surface for one language mode.
///
/// Every mutating call replaces state wholesale and fires exactly one
/// synchronous change notification, in subscription order, after the
/// transition is complete.
pub struct LanguageDefaults {
    mode_id: String,
    state: Mutex<DefaultsState>,
    changes: Emitter<ConfigSnapshot>,
}

impl LanguageDefaults {
    pub fn new(mode_id: impl Into<String>) -> Arc<Self> {
        Self::with_options(mode_id, StructuralOptions::default(), DiagnosticsOptions::default())
    }

    pub fn with_options(
        mode_id: impl Into<String>,
        structural: StructuralOptions,
        diagnostics: DiagnosticsOptions,
    ) -> Arc<Self> {
        Arc::new(Self {
            mode_id: mode_id.into(),
            state: Mutex::new(DefaultsState {
                structural,
                diagnostics,
                toggles: FeatureToggles::default(),
                extra_sources: BTreeMap::new(),
            }),
            changes: Emitter::new(),
        })
    }

    pub fn mode_id(&self) -> &str {
        &self.mode_id
    }

    /// Replaces the analysis options.
    pub fn set_structural_options(&self, options: StructuralOptions) {
        self.state.lock().structural = options;
        self.notify();
    }

    /// Replaces the validation-pass options.
    pub fn set_diagnostics_options(&self, options: DiagnosticsOptions) {
        self.state.lock().diagnostics = options;
        self.notify();
    }

    /// Replaces the feature toggles.
    pub fn set_feature_toggles(&self, toggles: FeatureToggles) {
        self.state.lock().toggles = toggles;
        self.notify();
    }

    /// Adds a virtual source visible to the analysis worker.
    ///
    /// With no `path` a unique one is synthesized. The returned disposable
    /// removes the source; invoking it a second time is a no-op.
    pub fn add_extra_source(
        self: &Arc<Self>,
        content: impl Into<String>,
        path: Option<&str>,
    ) -> ModeResult<Disposable> {
        let path = {
            let mut state = self.state.lock();
            let path = match path {
                Some(path) => {
                    if state.extra_sources.contains_key(path) {
                        return Err(ModeError::DuplicateExtraSource(path.to_string()));
                    }
                    path.to_string()
                }
                None => format!("extra://{}/{}", self.mode_id, Uuid::new_v4()),
            };
            state.extra_sources.insert(path.clone(), content.into());
            path
        };
        debug!(mode = %self.mode_id, %path, "extra source added");
        self.notify();

        let defaults = Arc::downgrade(self);
        Ok(Disposable::new(move || {
            if let Some(defaults) = Weak::upgrade(&defaults) {
                defaults.remove_extra_source(&path);
            }
        }))
    }

    fn remove_extra_source(&self, path: &str) {
        let removed = self.state.lock().extra_sources.remove(path).is_some();
        if removed {
            debug!(mode = %self.mode_id, %path, "extra source removed");
            self.notify();
        }
    }

    /// The current state as a defensive copy.
    pub fn snapshot(&self) -> ConfigSnapshot {
        let state = self.state.lock();
        ConfigSnapshot {
            mode_id: self.mode_id.clone(),
            structural: state.structural.clone(),
            diagnostics: state.diagnostics,
            toggles: state.toggles,
            extra_sources: state.extra_sources.clone(),
        }
    }

    /// Subscribes to configuration changes.
    pub fn on_did_change(
        &self,
        handler: impl Fn(&ConfigSnapshot) + Send + Sync + 'static,
    ) -> Disposable {
        self.changes.subscribe(handler)
    }

    fn notify(&self) {
        // Snapshot after the transition, emit after the lock is gone.
        let snapshot = self.snapshot();
        self.changes.emit(&snapshot);
    }
}
