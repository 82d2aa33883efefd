//! Note use-case service.
//!
//! # Responsibility
//! - Bridge stored notes and the document editor (`open_for_editing`,
//!   `save`).
//! - Derive preview projections (`preview_text`, `preview_image`) from the
//!   document, never from raw HTML.
//! - Normalize and atomically replace note tags.
//!
//! # Invariants
//! - Stored content is always canonical editor HTML.
//! - `preview_text` holds at most 100 chars of whitespace-collapsed plain
//!   text; `preview_image` is the first media `src`.

use crate::document::{create_document, to_html, to_plain_text, Document, DocumentEditor};
use crate::model::note::{FolderId, Note, NoteId};
use crate::repo::note_repo::{normalize_note_limit, normalize_tags, NoteListQuery, NoteStore};
use crate::repo::{StoreError, StoreResult};
use log::info;
use once_cell::sync::Lazy;
use regex::Regex;
use thiserror::Error;

pub const PREVIEW_TEXT_CHARS: usize = 100;

static WHITESPACE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("valid ws regex"));

#[derive(Debug, Error)]
pub enum NoteServiceError {
    #[error("invalid tag: `{0}`")]
    InvalidTag(String),
    #[error("note not found: {0}")]
    NoteNotFound(NoteId),
    #[error(transparent)]
    Store(StoreError),
    #[error("inconsistent note state: {0}")]
    InconsistentState(&'static str),
}

impl From<StoreError> for NoteServiceError {
    fn from(value: StoreError) -> Self {
        match value {
            StoreError::NotFound { entity: "note", id } => Self::NoteNotFound(id),
            other => Self::Store(other),
        }
    }
}

/// Preview projection shown in note lists.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NotePreview {
    pub preview_text: Option<String>,
    pub preview_image: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotesListResult {
    /// Sorted by `updated_at DESC, uuid ASC`.
    pub items: Vec<Note>,
    /// Effective normalized limit used by the query.
    pub applied_limit: u32,
}

/// A stored note opened in an editor.
pub struct EditingSession {
    note: Note,
    editor: DocumentEditor,
    saved_version: u64,
}

impl EditingSession {
    pub fn note(&self) -> &Note {
        &self.note
    }

    pub fn editor(&self) -> &DocumentEditor {
        &self.editor
    }

    pub fn editor_mut(&mut self) -> &mut DocumentEditor {
        &mut self.editor
    }

    /// True when the document changed since it was opened or last saved.
    pub fn is_dirty(&self) -> bool {
        self.editor.version() != self.saved_version
    }
}

pub struct NoteService<S: NoteStore> {
    store: S,
}

impl<S: NoteStore> NoteService<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Creates a note; `html` is normalized through the document model.
    pub fn create_note(
        &self,
        title: impl Into<String>,
        html: &str,
        folder_id: Option<FolderId>,
    ) -> Result<Note, NoteServiceError> {
        let document = create_document(html);
        let preview = derive_preview(&document);
        let mut note = Note::new(title, to_html(&document));
        note.folder_id = folder_id;
        note.preview_text = preview.preview_text;
        note.preview_image = preview.preview_image;

        let id = self.store.create_note(&note)?;
        info!(
            "event=note_create module=service status=ok note_id={} content_len={}",
            id,
            note.content.len()
        );
        self.read_back(id, "created note not found in read-back")
    }

    pub fn get_note(&self, id: NoteId) -> StoreResult<Option<Note>> {
        self.store.get_note(id)
    }

    pub fn list_notes(&self, mut query: NoteListQuery) -> Result<NotesListResult, NoteServiceError> {
        let applied_limit = normalize_note_limit(query.limit);
        query.limit = Some(applied_limit);
        let items = self.store.list_notes(&query)?;
        Ok(NotesListResult {
            items,
            applied_limit,
        })
    }

    /// Loads a note and builds an editor over its stored HTML.
    pub fn open_for_editing(&self, id: NoteId) -> Result<EditingSession, NoteServiceError> {
        let note = self
            .store
            .get_note(id)?
            .ok_or(NoteServiceError::NoteNotFound(id))?;
        let editor = DocumentEditor::open(&note.content);
        let saved_version = editor.version();
        Ok(EditingSession {
            note,
            editor,
            saved_version,
        })
    }

    /// Serializes the session document, refreshes previews and persists it.
    pub fn save(&self, session: &mut EditingSession) -> Result<Note, NoteServiceError> {
        let preview = derive_preview(session.editor.document());
        let mut note = session.note.clone();
        note.content = session.editor.to_html();
        note.preview_text = preview.preview_text;
        note.preview_image = preview.preview_image;

        self.store.update_note(&note)?;
        let saved = self.read_back(note.id, "saved note not found in read-back")?;
        info!(
            "event=note_save module=service status=ok note_id={} version={} content_len={}",
            saved.id,
            session.editor.version(),
            saved.content.len()
        );
        session.note = saved.clone();
        session.saved_version = session.editor.version();
        Ok(saved)
    }

    pub fn rename(&self, id: NoteId, title: impl Into<String>) -> Result<Note, NoteServiceError> {
        let mut note = self.require(id)?;
        note.title = title.into();
        self.store.update_note(&note)?;
        self.read_back(id, "renamed note not found in read-back")
    }

    /// Moves a note into `folder_id`, or to the root when `None`.
    pub fn move_to_folder(
        &self,
        id: NoteId,
        folder_id: Option<FolderId>,
    ) -> Result<Note, NoteServiceError> {
        let mut note = self.require(id)?;
        note.folder_id = folder_id;
        self.store.update_note(&note)?;
        self.read_back(id, "moved note not found in read-back")
    }

    /// Atomically replaces the full tag set for one note.
    pub fn set_tags(&mut self, id: NoteId, tags: Vec<String>) -> Result<Note, NoteServiceError> {
        if let Some(blank) = tags.iter().find(|tag| tag.trim().is_empty()) {
            return Err(NoteServiceError::InvalidTag(blank.clone()));
        }
        self.store.set_note_tags(id, &normalize_tags(&tags))?;
        self.read_back(id, "note missing after tag replacement")
    }

    pub fn list_tags(&self) -> StoreResult<Vec<String>> {
        self.store.list_tags()
    }

    pub fn archive(&self, id: NoteId) -> Result<(), NoteServiceError> {
        Ok(self.store.archive_note(id)?)
    }

    pub fn restore(&self, id: NoteId) -> Result<(), NoteServiceError> {
        Ok(self.store.restore_note(id)?)
    }

    pub fn delete(&self, id: NoteId) -> Result<(), NoteServiceError> {
        Ok(self.store.soft_delete_note(id)?)
    }

    fn require(&self, id: NoteId) -> Result<Note, NoteServiceError> {
        self.store
            .get_note(id)?
            .ok_or(NoteServiceError::NoteNotFound(id))
    }

    fn read_back(&self, id: NoteId, context: &'static str) -> Result<Note, NoteServiceError> {
        self.store
            .get_note(id)?
            .ok_or(NoteServiceError::InconsistentState(context))
    }
}

/// Derives list previews from a document.
pub fn derive_preview(document: &Document) -> NotePreview {
    let plain = to_plain_text(document);
    let collapsed = WHITESPACE_RE.replace_all(&plain, " ");
    let trimmed = collapsed.trim();
    let preview_text =
        (!trimmed.is_empty()).then(|| trimmed.chars().take(PREVIEW_TEXT_CHARS).collect());
    let preview_image = document
        .media_nodes()
        .next()
        .map(|media| media.attrs.src.clone());

    NotePreview {
        preview_text,
        preview_image,
    }
}
