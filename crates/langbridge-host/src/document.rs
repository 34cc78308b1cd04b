//! Open-document model.
//!
//! The core never edits text; it watches documents the host opens, mutates
//! and closes. Versions are opaque monotonically increasing counters used
//! only for staleness comparison by the validation pipeline.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::dispose::Disposable;
use crate::event::Emitter;
use crate::{HostError, HostResult};

/// Identifier of a document resource.
///
/// Treated as an opaque key; hosts typically use file paths or URIs.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DocumentUri(String);

impl DocumentUri {
    pub fn new(uri: impl Into<String>) -> Self {
        Self(uri.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for DocumentUri {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for DocumentUri {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// A single open document.
#[derive(Debug, Clone)]
pub struct TextDocument {
    uri: DocumentUri,
    language_id: String,
    version: u64,
    text: String,
}

impl TextDocument {
    pub fn uri(&self) -> &DocumentUri {
        &self.uri
    }

    pub fn language_id(&self) -> &str {
        &self.language_id
    }

    /// Increments on every edit; never reused.
    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn text(&self) -> &str {
        &self.text
    }
}

/// Immutable copy of a document's state at one version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentSnapshot {
    pub uri: DocumentUri,
    pub version: u64,
    pub text: String,
}

/// Document lifecycle events.
#[derive(Debug, Clone)]
pub enum DocumentEvent {
    /// A document was opened
    Opened(DocumentUri),
    /// A document's content changed
    Changed { uri: DocumentUri, version: u64 },
    /// A document was closed
    Closed(DocumentUri),
}

/// Manages the set of open documents and their change events.
///
/// All mutation happens on the interaction thread; events fire synchronously
/// after the state transition, so observers never see a transition half-done.
pub struct DocumentStore {
    documents: Mutex<HashMap<DocumentUri, TextDocument>>,
    events: Emitter<DocumentEvent>,
}

impl DocumentStore {
    pub fn new() -> Self {
        Self {
            documents: Mutex::new(HashMap::new()),
            events: Emitter::new(),
        }
    }

    /// Opens a document at version 1.
    pub fn open(
        &self,
        uri: DocumentUri,
        language_id: impl Into<String>,
        text: impl Into<String>,
    ) -> HostResult<()> {
        {
            let mut documents = self.documents.lock();
            if documents.contains_key(&uri) {
                return Err(HostError::DocumentAlreadyOpen(uri));
            }
            documents.insert(
                uri.clone(),
                TextDocument {
                    uri: uri.clone(),
                    language_id: language_id.into(),
                    version: 1,
                    text: text.into(),
                },
            );
        }
        self.events.emit(&DocumentEvent::Opened(uri));
        Ok(())
    }

    /// Replaces a document's content, bumping its version.
    pub fn set_text(&self, uri: &DocumentUri, text: impl Into<String>) -> HostResult<u64> {
        let version = {
            let mut documents = self.documents.lock();
            let doc = documents
                .get_mut(uri)
                .ok_or_else(|| HostError::DocumentNotOpen(uri.clone()))?;
            doc.text = text.into();
            doc.version += 1;
            doc.version
        };
        self.events.emit(&DocumentEvent::Changed {
            uri: uri.clone(),
            version,
        });
        Ok(version)
    }

    /// Closes a document.
    pub fn close(&self, uri: &DocumentUri) -> HostResult<()> {
        {
            let mut documents = self.documents.lock();
            if documents.remove(uri).is_none() {
                return Err(HostError::DocumentNotOpen(uri.clone()));
            }
        }
        self.events.emit(&DocumentEvent::Closed(uri.clone()));
        Ok(())
    }

    /// Returns the current version of an open document.
    pub fn version(&self, uri: &DocumentUri) -> Option<u64> {
        self.documents.lock().get(uri).map(|doc| doc.version)
    }

    /// Returns the current text of an open document.
    pub fn text(&self, uri: &DocumentUri) -> Option<String> {
        self.documents.lock().get(uri).map(|doc| doc.text.clone())
    }

    /// Returns a consistent (uri, version, text) snapshot.
    pub fn snapshot(&self, uri: &DocumentUri) -> Option<DocumentSnapshot> {
        self.documents.lock().get(uri).map(|doc| DocumentSnapshot {
            uri: doc.uri.clone(),
            version: doc.version,
            text: doc.text.clone(),
        })
    }

    /// Returns the uris of all open documents.
    pub fn open_uris(&self) -> Vec<DocumentUri> {
        self.documents.lock().keys().cloned().collect()
    }

    /// Returns the number of open documents.
    pub fn len(&self) -> usize {
        self.documents.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.lock().is_empty()
    }

    /// Subscribes to open/change/close events.
    pub fn on_document_event(
        &self,
        handler: impl Fn(&DocumentEvent) + Send + Sync + 'static,
    ) -> Disposable {
        self.events.subscribe(handler)
    }
}

impl Default for DocumentStore {
    fn default() -> Self {
        Self::new()
    }
}
