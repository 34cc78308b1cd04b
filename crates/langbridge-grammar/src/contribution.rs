//! Language contribution registry.
//!
//! Descriptors are cheap and registered eagerly; the grammar pack behind a
//! language is built by a loader closure invoked at most once, the first
//! time anything asks for it.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

use crate::tables::LanguagePack;
use crate::{GrammarError, GrammarResult};

/// Identity of a contributed language.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LanguageDescriptor {
    pub id: String,
    /// File extensions including the leading dot, e.g. `.xml`
    pub extensions: Vec<String>,
    pub aliases: Vec<String>,
}

/// Builds a language pack on first use.
pub type PackLoader = Box<dyn Fn() -> LanguagePack + Send + Sync>;

struct RegisteredLanguage {
    descriptor: LanguageDescriptor,
    loader: Option<PackLoader>,
    loaded: Option<Arc<LanguagePack>>,
}

/// All contributed languages, with lazy pack loading.
#[derive(Default)]
pub struct LanguageRegistry {
    languages: Mutex<HashMap<String, RegisteredLanguage>>,
}

impl LanguageRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a language descriptor with its lazy pack loader.
    pub fn register(
        &self,
        descriptor: LanguageDescriptor,
        loader: PackLoader,
    ) -> GrammarResult<()> {
        let mut languages = self.languages.lock();
        if languages.contains_key(&descriptor.id) {
            return Err(GrammarError::DuplicateLanguage(descriptor.id));
        }
        tracing::debug!(id = %descriptor.id, "language registered");
        languages.insert(
            descriptor.id.clone(),
            RegisteredLanguage {
                descriptor,
                loader: Some(loader),
                loaded: None,
            },
        );
        Ok(())
    }

    /// Returns the descriptor for a language id.
    pub fn descriptor(&self, id: &str) -> Option<LanguageDescriptor> {
        self.languages
            .lock()
            .get(id)
            .map(|language| language.descriptor.clone())
    }

    /// Maps a file extension (with leading dot) to a language id.
    pub fn detect(&self, extension: &str) -> Option<String> {
        self.languages
            .lock()
            .values()
            .find(|language| {
                language
                    .descriptor
                    .extensions
                    .iter()
                    .any(|known| known == extension)
            })
            .map(|language| language.descriptor.id.clone())
    }

    /// Returns the pack for a language, invoking its loader on first call.
    pub fn load(&self, id: &str) -> GrammarResult<Arc<LanguagePack>> {
        let mut languages = self.languages.lock();
        let language = languages
            .get_mut(id)
            .ok_or_else(|| GrammarError::UnknownLanguage(id.to_string()))?;

        if let Some(pack) = &language.loaded {
            return Ok(Arc::clone(pack));
        }

        // Loader present exactly when nothing is loaded yet.
        let loader = match language.loader.take() {
            Some(loader) => loader,
            None => return Err(GrammarError::UnknownLanguage(id.to_string())),
        };
        tracing::debug!(id, "loading language pack");
        let pack = Arc::new(loader());
        language.loaded = Some(Arc::clone(&pack));
        Ok(pack)
    }

    /// Returns true if the language's pack has been built.
    pub fn is_loaded(&self, id: &str) -> bool {
        self.languages
            .lock()
            .get(id)
            .is_some_and(|language| language.loaded.is_some())
    }

    /// Returns all registered language ids.
    pub fn ids(&self) -> Vec<String> {
        self.languages.lock().keys().cloned().collect()
    }
}
