//
// document_store.rs
//
// Per-URI document state and the text synchronization state machine
//

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;

use ropey::Rope;
use tower_lsp::lsp_types::{TextDocumentContentChangeEvent, TextDocumentSyncKind, Url};

use crate::error::DocumentError;
use crate::utf16::{self, CharPosition};

/// Revisions are unique across the whole process, so a `(uri, revision)` pair
/// never identifies two different contents even after a document is dropped
/// and re-created.
static NEXT_REVISION: AtomicU64 = AtomicU64::new(1);

fn next_revision() -> u64 {
    NEXT_REVISION.fetch_add(1, Ordering::Relaxed)
}

/// Canonicalize line endings to `\n`.
pub fn normalize_line_endings(text: &str) -> String {
    if !text.contains('\r') {
        return text.to_string();
    }
    text.replace("\r\n", "\n").replace('\r', "\n")
}

// ============================================================================
// Document State
// ============================================================================

/// Something that keeps a document alive.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Owner {
    /// The client has the document open.
    Editor,
    /// Another document imports it (as a resource).
    Document(Url),
}

#[derive(Debug, Clone)]
pub struct TextDocument {
    pub uri: Url,
    pub language_id: String,
    /// `None` while the document is only kept alive by references.
    pub version: Option<i32>,
    pub rope: Rope,
    pub opened_in_editor: bool,
    references: HashSet<Owner>,
    /// Bumped on every content mutation.
    pub revision: u64,
}

impl TextDocument {
    fn new(uri: Url, language_id: String, version: Option<i32>, text: &str) -> Self {
        Self {
            uri,
            language_id,
            version,
            rope: Rope::from_str(&normalize_line_endings(text)),
            opened_in_editor: false,
            references: HashSet::new(),
            revision: next_revision(),
        }
    }

    fn set_text(&mut self, text: &str) {
        self.rope = Rope::from_str(&normalize_line_endings(text));
        self.revision = next_revision();
    }

    fn text_equals(&self, normalized: &str) -> bool {
        self.rope.len_bytes() == normalized.len() && self.rope == normalized
    }

    pub fn references(&self) -> impl Iterator<Item = &Owner> {
        self.references.iter()
    }

    pub fn snapshot(&self) -> DocumentSnapshot {
        DocumentSnapshot {
            uri: self.uri.clone(),
            language_id: self.language_id.clone(),
            version: self.version,
            revision: self.revision,
            rope: self.rope.clone(),
        }
    }
}

/// Apply one ranged edit. The range is interpreted against the current
/// (pre-edit) content of `rope`.
fn apply_ranged(
    rope: &mut Rope,
    uri: &Url,
    range: tower_lsp::lsp_types::Range,
    text: &str,
) -> Result<(), DocumentError> {
    let invalid = |pos: tower_lsp::lsp_types::Position| DocumentError::InvalidPosition {
        uri: uri.clone(),
        line: pos.line,
        character: pos.character,
    };
    let start = utf16::position_from_wire(rope, range.start).ok_or_else(|| invalid(range.start))?;
    let end = utf16::position_from_wire(rope, range.end).ok_or_else(|| invalid(range.end))?;
    let (start, end) = if end < start { (end, start) } else { (start, end) };

    let start_idx = char_index(rope, start);
    let end_idx = char_index(rope, end);

    rope.remove(start_idx..end_idx);
    rope.insert(start_idx, &normalize_line_endings(text));
    Ok(())
}

fn char_index(rope: &Rope, pos: CharPosition) -> usize {
    utf16::char_offset(rope, pos).unwrap_or_else(|| rope.len_chars())
}

/// Immutable view of a document at one revision.
///
/// Cloning the rope is cheap and the snapshot needs no lock once taken.
#[derive(Debug, Clone)]
pub struct DocumentSnapshot {
    pub uri: Url,
    pub language_id: String,
    pub version: Option<i32>,
    pub revision: u64,
    pub rope: Rope,
}

impl DocumentSnapshot {
    pub fn text(&self) -> String {
        self.rope.to_string()
    }

    pub fn line(&self, line: usize) -> Option<String> {
        utf16::line_text(&self.rope, line)
    }
}

// ============================================================================
// Outcomes
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OpenOutcome {
    /// No entry existed before.
    pub created: bool,
    /// An existing entry had different content.
    pub changed: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseOutcome {
    /// The last owner was released and the document was dropped.
    Removed,
    /// Other owners keep the document alive.
    Retained,
    /// There was no such document.
    Unknown,
}

// ============================================================================
// Store
// ============================================================================

#[derive(Debug, Default)]
pub struct DocumentStore {
    documents: RwLock<HashMap<Url, TextDocument>>,
}

impl DocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, HashMap<Url, TextDocument>> {
        self.documents
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, HashMap<Url, TextDocument>> {
        self.documents
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Open a document in the editor.
    ///
    /// An existing (referenced or shadow) entry is reused; its content is only
    /// replaced when the normalized text differs.
    pub fn open(&self, uri: &Url, language_id: &str, text: &str, version: i32) -> OpenOutcome {
        let normalized = normalize_line_endings(text);
        let mut docs = self.write();
        let outcome = match docs.get_mut(uri) {
            Some(doc) => {
                let changed = !doc.text_equals(&normalized);
                if changed {
                    doc.set_text(&normalized);
                }
                doc.language_id = language_id.to_string();
                OpenOutcome {
                    created: false,
                    changed,
                }
            }
            None => {
                docs.insert(
                    uri.clone(),
                    TextDocument::new(uri.clone(), language_id.to_string(), None, &normalized),
                );
                OpenOutcome {
                    created: true,
                    changed: false,
                }
            }
        };
        if let Some(doc) = docs.get_mut(uri) {
            doc.version = Some(version);
            doc.opened_in_editor = true;
            doc.references.insert(Owner::Editor);
        }
        log::trace!("Opened {} (version {}, {:?})", uri, version, outcome);
        outcome
    }

    /// Apply the content changes of one `didChange` notification in order.
    ///
    /// Returns `true` if the text actually changed.
    pub fn apply_changes(
        &self,
        uri: &Url,
        version: i32,
        sync_kind: TextDocumentSyncKind,
        changes: Vec<TextDocumentContentChangeEvent>,
    ) -> Result<bool, DocumentError> {
        if sync_kind == TextDocumentSyncKind::NONE {
            return self.apply_none_change(uri);
        }
        if sync_kind == TextDocumentSyncKind::FULL {
            if let Some(change) = changes.iter().find(|c| c.range.is_some()) {
                return Err(DocumentError::InvalidChange {
                    uri: uri.clone(),
                    reason: format!(
                        "ranged change {:?} while synchronizing full documents",
                        change.range
                    ),
                });
            }
        }

        let mut docs = self.write();
        let doc = docs
            .get_mut(uri)
            .ok_or_else(|| DocumentError::NotOpened(uri.clone()))?;

        // Work on a copy so a bad change in the middle leaves the document untouched.
        let mut rope = doc.rope.clone();
        let before = rope.clone();
        for change in changes {
            match change.range {
                Some(range) => apply_ranged(&mut rope, uri, range, &change.text)?,
                None => rope = Rope::from_str(&normalize_line_endings(&change.text)),
            }
        }

        let changed = rope != before;
        doc.rope = rope;
        doc.version = Some(version);
        if changed {
            doc.revision = next_revision();
        }
        Ok(changed)
    }

    /// Replace the whole content.
    pub fn apply_full_change(&self, uri: &Url, version: i32, text: &str) -> Result<bool, DocumentError> {
        self.apply_changes(
            uri,
            version,
            TextDocumentSyncKind::FULL,
            vec![TextDocumentContentChangeEvent {
                range: None,
                range_length: None,
                text: text.to_string(),
            }],
        )
    }

    /// Apply one ranged edit given in wire coordinates.
    pub fn apply_incremental_change(
        &self,
        uri: &Url,
        version: i32,
        range: tower_lsp::lsp_types::Range,
        text: &str,
    ) -> Result<bool, DocumentError> {
        self.apply_changes(
            uri,
            version,
            TextDocumentSyncKind::INCREMENTAL,
            vec![TextDocumentContentChangeEvent {
                range: Some(range),
                range_length: None,
                text: text.to_string(),
            }],
        )
    }

    /// Synchronization mode "none": the content is left alone.
    pub fn apply_none_change(&self, uri: &Url) -> Result<bool, DocumentError> {
        if !self.read().contains_key(uri) {
            return Err(DocumentError::NotOpened(uri.clone()));
        }
        Ok(false)
    }

    /// Release `owner`'s hold on the document.
    pub fn close(&self, uri: &Url, owner: &Owner) -> CloseOutcome {
        let mut docs = self.write();
        let Some(doc) = docs.get_mut(uri) else {
            return CloseOutcome::Unknown;
        };
        doc.references.remove(owner);
        if *owner == Owner::Editor {
            doc.opened_in_editor = false;
        }
        if doc.references.is_empty() && !doc.opened_in_editor {
            docs.remove(uri);
            log::trace!("Dropped {}", uri);
            return CloseOutcome::Removed;
        }
        if !doc.opened_in_editor {
            doc.version = None;
        }
        CloseOutcome::Retained
    }

    /// Drop the document regardless of who still references it.
    pub fn force_close(&self, uri: &Url) -> bool {
        self.write().remove(uri).is_some()
    }

    /// Handle a save. When the client sent the text and it differs, it is
    /// applied as a full change first. Returns `true` if the text changed.
    pub fn save(&self, uri: &Url, text: Option<&str>) -> Result<bool, DocumentError> {
        let mut docs = self.write();
        let doc = docs
            .get_mut(uri)
            .ok_or_else(|| DocumentError::NotOpened(uri.clone()))?;
        let Some(text) = text else {
            return Ok(false);
        };
        let normalized = normalize_line_endings(text);
        if doc.text_equals(&normalized) {
            return Ok(false);
        }
        doc.set_text(&normalized);
        Ok(true)
    }

    /// Add `owner` as a reference to `uri`, loading the document with `load`
    /// if the store does not have it yet.
    pub fn reference<F>(
        &self,
        uri: &Url,
        owner: Owner,
        language_id: &str,
        load: F,
    ) -> std::io::Result<DocumentSnapshot>
    where
        F: FnOnce() -> std::io::Result<String>,
    {
        if let Some(doc) = self.write().get_mut(uri) {
            doc.references.insert(owner);
            return Ok(doc.snapshot());
        }

        // Read outside of the lock.
        let text = load()?;

        let mut docs = self.write();
        let doc = docs.entry(uri.clone()).or_insert_with(|| {
            TextDocument::new(uri.clone(), language_id.to_string(), None, &text)
        });
        doc.references.insert(owner);
        Ok(doc.snapshot())
    }

    pub fn contains(&self, uri: &Url) -> bool {
        self.read().contains_key(uri)
    }

    pub fn is_open_in_editor(&self, uri: &Url) -> bool {
        self.read().get(uri).is_some_and(|doc| doc.opened_in_editor)
    }

    pub fn get(&self, uri: &Url) -> Option<DocumentSnapshot> {
        self.read().get(uri).map(TextDocument::snapshot)
    }

    pub fn snapshot(&self, uri: &Url) -> Result<DocumentSnapshot, DocumentError> {
        self.get(uri)
            .ok_or_else(|| DocumentError::NotOpened(uri.clone()))
    }

    /// Snapshot that is at least as new as `version`.
    ///
    /// A newer document is served transparently; an older one is an error.
    pub fn snapshot_at_least(&self, uri: &Url, version: i32) -> Result<DocumentSnapshot, DocumentError> {
        let snapshot = self.snapshot(uri)?;
        match snapshot.version {
            Some(current) if current >= version => Ok(snapshot),
            current => Err(DocumentError::StaleVersion {
                uri: uri.clone(),
                requested: version,
                current,
            }),
        }
    }

    pub fn version(&self, uri: &Url) -> Option<i32> {
        self.read().get(uri).and_then(|doc| doc.version)
    }

    pub fn reference_count(&self, uri: &Url) -> usize {
        self.read().get(uri).map_or(0, |doc| doc.references.len())
    }

    pub fn uris(&self) -> Vec<Url> {
        self.read().keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }
}
