//! Marker (diagnostics) surface.
//!
//! Markers are always whole-document replacements per owner key, never
//! deltas. The validation pipeline computes a complete list and hands it
//! over; an empty list clears the owner's markers for that document.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::document::DocumentUri;

/// Severity of a marker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MarkerSeverity {
    Hint,
    Info,
    Warning,
    Error,
}

/// A single squiggle: a message attached to an offset range.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Marker {
    pub severity: MarkerSeverity,
    pub message: String,
    /// Byte offset of the range start
    pub start: usize,
    /// Byte offset of the range end (exclusive)
    pub end: usize,
}

/// Where the core publishes diagnostics.
///
/// `set_markers` replaces the full marker list for `(uri, owner)`.
pub trait MarkerSink: Send + Sync {
    fn set_markers(&self, uri: &DocumentUri, owner: &str, markers: Vec<Marker>);
}

/// In-memory sink, usable as the host surface in tests and demos.
#[derive(Default)]
pub struct MemoryMarkerSink {
    markers: Mutex<HashMap<(DocumentUri, String), Vec<Marker>>>,
}

impl MemoryMarkerSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the current markers for a document and owner.
    pub fn get(&self, uri: &DocumentUri, owner: &str) -> Vec<Marker> {
        self.markers
            .lock()
            .get(&(uri.clone(), owner.to_string()))
            .cloned()
            .unwrap_or_default()
    }

    /// Returns how many times `set_markers` has stored a non-empty list.
    pub fn has_markers(&self, uri: &DocumentUri, owner: &str) -> bool {
        !self.get(uri, owner).is_empty()
    }
}

impl MarkerSink for MemoryMarkerSink {
    fn set_markers(&self, uri: &DocumentUri, owner: &str, markers: Vec<Marker>) {
        tracing::debug!(uri = %uri, owner, count = markers.len(), "markers replaced");
        self.markers
            .lock()
            .insert((uri.clone(), owner.to_string()), markers);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_markers_replaces_wholesale() {
        let sink = MemoryMarkerSink::new();
        let uri = DocumentUri::from("mem:a.txt");

        let marker = |message: &str| Marker {
            severity: MarkerSeverity::Error,
            message: message.to_string(),
            start: 0,
            end: 1,
        };

        sink.set_markers(&uri, "demo", vec![marker("first"), marker("second")]);
        assert_eq!(sink.get(&uri, "demo").len(), 2);

        sink.set_markers(&uri, "demo", vec![marker("third")]);
        let markers = sink.get(&uri, "demo");
        assert_eq!(markers.len(), 1);
        assert_eq!(markers[0].message, "third");

        sink.set_markers(&uri, "demo", Vec::new());
        assert!(!sink.has_markers(&uri, "demo"));
    }

    #[test]
    fn test_owners_are_independent() {
        let sink = MemoryMarkerSink::new();
        let uri = DocumentUri::from("mem:a.txt");

        sink.set_markers(
            &uri,
            "one",
            vec![Marker {
                severity: MarkerSeverity::Warning,
                message: "w".to_string(),
                start: 0,
                end: 0,
            }],
        );

        assert!(sink.has_markers(&uri, "one"));
        assert!(!sink.has_markers(&uri, "two"));
    }
}
