//! Document state tracking.
//!
//! Keeps the live contents of open documents so editing features see unsaved
//! edits. Each patch replaces a document's state wholesale, so concurrent
//! readers always get a consistent snapshot.

use std::sync::Arc;

use dashmap::DashMap;
use tower_lsp::lsp_types::{TextDocumentContentChangeEvent, Url};

use super::position::to_offset;

/// State of an open document.
#[derive(Debug, Clone)]
pub struct DocumentState {
    /// Full document text
    pub text: Arc<str>,
    /// Client version, if the client sent one
    pub version: Option<i32>,
}

impl DocumentState {
    /// Create a new document state.
    pub fn new(text: impl Into<Arc<str>>, version: Option<i32>) -> Self {
        Self {
            text: text.into(),
            version,
        }
    }
}

/// Open documents keyed by URI.
#[derive(Debug, Default)]
pub struct DocumentStore {
    documents: DashMap<Url, DocumentState>,
}

impl DocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an opened document, replacing any previous state.
    pub fn open(&self, uri: Url, text: &str, version: Option<i32>) {
        self.documents
            .insert(uri, DocumentState::new(text, version));
    }

    /// Forget a closed document.
    pub fn close(&self, uri: &Url) {
        self.documents.remove(uri);
    }

    /// Apply ordered content changes and record the new version.
    ///
    /// A change without a range replaces the whole document. Ranged changes
    /// are spliced in after clamping both ends into the current text. A
    /// document that was never opened starts out empty. The version is
    /// recorded even when there are no changes.
    pub fn apply_patch(
        &self,
        uri: &Url,
        version: Option<i32>,
        changes: &[TextDocumentContentChangeEvent],
    ) {
        let mut entry = self
            .documents
            .entry(uri.clone())
            .or_insert_with(|| DocumentState::new("", None));

        let text: Arc<str> = if changes.is_empty() {
            Arc::clone(&entry.text)
        } else {
            apply_changes(&entry.text, changes).into()
        };
        *entry = DocumentState::new(text, version);
    }

    /// Latest text of an open document.
    pub fn get_text(&self, uri: &Url) -> Option<Arc<str>> {
        self.documents.get(uri).map(|doc| Arc::clone(&doc.text))
    }

    /// Latest version of an open document.
    pub fn get_version(&self, uri: &Url) -> Option<i32> {
        self.documents.get(uri).and_then(|doc| doc.version)
    }

    /// Snapshot of an open document.
    pub fn get(&self, uri: &Url) -> Option<DocumentState> {
        self.documents.get(uri).map(|doc| doc.clone())
    }

    pub fn is_open(&self, uri: &Url) -> bool {
        self.documents.contains_key(uri)
    }
}

/// Apply content changes to `text` in order.
pub fn apply_changes(text: &str, changes: &[TextDocumentContentChangeEvent]) -> String {
    let mut text = text.to_string();
    for change in changes {
        match change.range {
            None => text = change.text.clone(),
            Some(range) => {
                let start = to_offset(&text, range.start);
                let end = to_offset(&text, range.end).max(start);
                text.replace_range(start..end, &change.text);
            }
        }
    }
    text
}

#[cfg(test)]
mod tests {
    use super::*;
    use tower_lsp::lsp_types::{Position, Range};

    fn uri() -> Url {
        Url::parse("file:///tmp/model.ili").unwrap()
    }

    fn ranged(start: (u32, u32), end: (u32, u32), text: &str) -> TextDocumentContentChangeEvent {
        TextDocumentContentChangeEvent {
            range: Some(Range::new(
                Position::new(start.0, start.1),
                Position::new(end.0, end.1),
            )),
            range_length: None,
            text: text.to_string(),
        }
    }

    fn full(text: &str) -> TextDocumentContentChangeEvent {
        TextDocumentContentChangeEvent {
            range: None,
            range_length: None,
            text: text.to_string(),
        }
    }

    #[test]
    fn test_open_and_close() {
        let store = DocumentStore::new();
        store.open(uri(), "MODEL A =", Some(1));
        assert_eq!(store.get_text(&uri()).as_deref(), Some("MODEL A ="));
        assert_eq!(store.get_version(&uri()), Some(1));

        store.close(&uri());
        assert!(store.get_text(&uri()).is_none());
        assert!(store.get_version(&uri()).is_none());
    }

    #[test]
    fn test_full_replace_discards_previous_text() {
        let store = DocumentStore::new();
        store.open(uri(), "old text\nmore", Some(1));
        store.apply_patch(&uri(), Some(2), &[full("new")]);
        assert_eq!(store.get_text(&uri()).as_deref(), Some("new"));
        assert_eq!(store.get_version(&uri()), Some(2));
    }

    #[test]
    fn test_ranged_change_matches_manual_splice() {
        let store = DocumentStore::new();
        let original = "CLASS Foo =\r\nEND Foo;";
        store.open(uri(), original, Some(1));
        store.apply_patch(&uri(), Some(2), &[ranged((0, 6), (0, 9), "Bar")]);

        let mut expected = original.to_string();
        expected.replace_range(6..9, "Bar");
        assert_eq!(store.get_text(&uri()).as_deref(), Some(expected.as_str()));
    }

    #[test]
    fn test_changes_apply_in_order() {
        let store = DocumentStore::new();
        store.open(uri(), "abc", None);
        store.apply_patch(
            &uri(),
            Some(5),
            &[ranged((0, 3), (0, 3), "d"), full("xyz"), ranged((0, 0), (0, 1), "")],
        );
        assert_eq!(store.get_text(&uri()).as_deref(), Some("yz"));
    }

    #[test]
    fn test_inverted_and_out_of_range_changes_are_clamped() {
        let store = DocumentStore::new();
        store.open(uri(), "abc\ndef", Some(1));
        // End before start collapses to an insertion at start.
        store.apply_patch(&uri(), Some(2), &[ranged((1, 2), (0, 1), "X")]);
        assert_eq!(store.get_text(&uri()).as_deref(), Some("abc\ndeXf"));
        // Positions far past the end append.
        store.apply_patch(&uri(), Some(3), &[ranged((40, 0), (50, 0), "!")]);
        assert_eq!(store.get_text(&uri()).as_deref(), Some("abc\ndeXf!"));
    }

    #[test]
    fn test_patch_on_unopened_document_starts_empty() {
        let store = DocumentStore::new();
        store.apply_patch(&uri(), Some(1), &[ranged((0, 0), (0, 0), "hello")]);
        assert_eq!(store.get_text(&uri()).as_deref(), Some("hello"));
    }

    #[test]
    fn test_empty_change_list_records_version() {
        let store = DocumentStore::new();
        store.open(uri(), "abc", Some(1));
        store.apply_patch(&uri(), Some(9), &[]);
        assert_eq!(store.get_text(&uri()).as_deref(), Some("abc"));
        assert_eq!(store.get_version(&uri()), Some(9));
    }
}
