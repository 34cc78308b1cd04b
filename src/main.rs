//! # Langbridge - Language Services Bridge
//!
//! Demo binary: wires a full language mode against the in-process analysis
//! worker and walks it through the editor-side lifecycle.
//!
//! ## Quick Start
//!
//! ```bash
//! # Run the demo against the built-in sample document
//! cargo run
//!
//! # Run with a file
//! cargo run -- path/to/file.wl
//!
//! # Watch the lifecycle at debug level
//! cargo run -- -vv
//! ```

use clap::Parser;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use langbridge_grammar::{
    Grammar, LanguageConfiguration, LanguageDescriptor, LanguageRegistry, TokenizerHost, samples,
};
use langbridge_host::{
    Disposable, DocumentStore, DocumentUri, FeatureHost, FeatureKind, FeatureProvider,
    FeatureRequest, FeatureResponse, MarkerSink, MemoryMarkerSink,
};
use langbridge_mode::{
    FeatureToggles, LanguageDefaults, ModeContext, ModeSettings, activate_mode,
};
use langbridge_worker::{LocalSpawner, WorkerSpawner};

const MODE_ID: &str = "wordlang";

const SAMPLE: &str = "\
let greeting = \"hello\"
let greeting = \"again\"
fn render
color: #ff8800
docs: https://example.com/guide
(unbalanced
";

/// Langbridge - language services bridge demo
#[derive(Parser, Debug)]
#[command(name = "langbridge")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// File to analyze instead of the built-in sample
    #[arg(value_name = "FILE")]
    file: Option<PathBuf>,

    /// Settings file overriding the default location
    #[arg(short, long, value_name = "FILE")]
    settings: Option<PathBuf>,

    /// Verbose logging
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

/// Host surface that records registrations so the demo can invoke them.
#[derive(Default)]
struct ConsoleHost {
    providers: Mutex<HashMap<FeatureKind, Arc<dyn FeatureProvider>>>,
}

impl ConsoleHost {
    fn provider(&self, kind: FeatureKind) -> Option<Arc<dyn FeatureProvider>> {
        self.providers.lock().get(&kind).cloned()
    }
}

impl FeatureHost for ConsoleHost {
    fn register_provider(
        &self,
        mode_id: &str,
        kind: FeatureKind,
        provider: Arc<dyn FeatureProvider>,
    ) -> Disposable {
        tracing::info!(mode = mode_id, %kind, "provider registered");
        self.providers.lock().insert(kind, provider);
        Disposable::new(move || tracing::info!(%kind, "provider disposed"))
    }
}

impl TokenizerHost for ConsoleHost {
    fn set_tokens_provider(&self, mode_id: &str, grammar: Arc<Grammar>) -> Disposable {
        tracing::info!(mode = mode_id, states = grammar.states.len(), "tokens provider set");
        Disposable::noop()
    }

    fn set_language_configuration(
        &self,
        mode_id: &str,
        configuration: LanguageConfiguration,
    ) -> Disposable {
        tracing::info!(
            mode = mode_id,
            brackets = configuration.brackets.len(),
            "language configuration set"
        );
        Disposable::noop()
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let log_level = match args.verbose {
        0 => tracing::Level::INFO,
        1 => tracing::Level::DEBUG,
        _ => tracing::Level::TRACE,
    };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_level(true),
        )
        .with(tracing_subscriber::filter::LevelFilter::from_level(
            log_level,
        ))
        .init();

    tracing::info!("Starting Langbridge v{}", env!("CARGO_PKG_VERSION"));

    let settings = match &args.settings {
        Some(path) => ModeSettings::load_from(path)?,
        None => ModeSettings::load(),
    };

    let (uri, text) = match &args.file {
        Some(path) => (
            DocumentUri::new(path.display().to_string()),
            std::fs::read_to_string(path)?,
        ),
        None => (DocumentUri::from("mem:sample.wl"), SAMPLE.to_string()),
    };

    // Wire the mode.
    let defaults =
        LanguageDefaults::with_options(MODE_ID, settings.structural.clone(), settings.diagnostics);
    defaults.set_feature_toggles(settings.toggles);

    let languages = Arc::new(LanguageRegistry::new());
    languages.register(
        LanguageDescriptor {
            id: MODE_ID.to_string(),
            extensions: vec![".wl".to_string()],
            aliases: vec!["WordLang".to_string()],
        },
        Box::new(samples::xml_pack),
    )?;

    let documents = Arc::new(DocumentStore::new());
    let host = Arc::new(ConsoleHost::default());
    let markers = Arc::new(MemoryMarkerSink::new());

    let activation = activate_mode(ModeContext {
        defaults: Arc::clone(&defaults),
        documents: Arc::clone(&documents),
        features: host.clone() as Arc<dyn FeatureHost>,
        tokenizer: host.clone() as Arc<dyn TokenizerHost>,
        languages,
        markers: markers.clone() as Arc<dyn MarkerSink>,
        spawner: Arc::new(LocalSpawner) as Arc<dyn WorkerSpawner>,
        timing: settings.timing,
    });

    // A library the worker can see without any document being open.
    let _lib = defaults.add_extra_source("declare ambient_helper", Some("lib.wl"))?;

    documents.open(uri.clone(), MODE_ID, text)?;

    // Completions through the registered provider (first worker spawn).
    if let Some(provider) = host.provider(FeatureKind::Completions) {
        let response = provider
            .provide(FeatureRequest::Completions {
                uri: uri.clone(),
                offset: 0,
            })
            .await;
        if let FeatureResponse::Completions(items) = response {
            tracing::info!("completions: {}", serde_json::to_string_pretty(&items)?);
        }
    }

    if let Some(provider) = host.provider(FeatureKind::Hovers) {
        let response = provider
            .provide(FeatureRequest::Hover {
                uri: uri.clone(),
                offset: 4,
            })
            .await;
        if let FeatureResponse::Hover(Some(hover)) = response {
            tracing::info!("hover: {}", hover.contents);
        }
    }

    // Let the debounced validation cycle publish markers.
    tokio::time::sleep(settings.timing.debounce() + Duration::from_millis(200)).await;
    for marker in markers.get(&uri, MODE_ID) {
        tracing::info!(
            "{:?} [{}..{}]: {}",
            marker.severity,
            marker.start,
            marker.end,
            marker.message
        );
    }

    // Flip toggles: the registry reconciles without touching the worker.
    let toggles = FeatureToggles {
        colors: false,
        rename: false,
        ..settings.toggles
    };
    defaults.set_feature_toggles(toggles);

    activation.dispose();
    tracing::info!("mode deactivated");
    Ok(())
}
