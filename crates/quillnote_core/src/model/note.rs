//! Note and folder records.
//!
//! # Responsibility
//! - Define the persisted shape of notes (HTML content plus metadata) and
//!   folders.
//! - Validate user-editable fields before they reach storage.
//!
//! # Invariants
//! - `content` is editor HTML; previews are derived from it, never edited.
//! - `color` is an opaque palette token chosen by the UI.
//! - A folder is never its own parent.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

pub type NoteId = Uuid;
pub type FolderId = Uuid;

pub const DEFAULT_NOTE_COLOR: &str = "bg-white";
pub const DEFAULT_FOLDER_COLOR: &str = "bg-blue-100";
pub const MAX_TITLE_CHARS: usize = 200;

static COLOR_TOKEN_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[#a-zA-Z0-9(),.%_\s-]{1,64}$").expect("valid color token regex"));

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NoteValidationError {
    #[error("title exceeds {} characters", MAX_TITLE_CHARS)]
    TitleTooLong,
    #[error("folder title must not be empty")]
    EmptyFolderTitle,
    #[error("invalid color token `{0}`")]
    InvalidColor(String),
    #[error("folder {0} cannot be its own parent")]
    SelfParent(FolderId),
}

/// One stored note.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Note {
    pub id: NoteId,
    pub title: String,
    /// Editor HTML.
    pub content: String,
    pub color: String,
    pub folder_id: Option<FolderId>,
    /// Lowercase, deduplicated, sorted.
    pub tags: Vec<String>,
    pub is_archived: bool,
    pub is_deleted: bool,
    pub preview_text: Option<String>,
    pub preview_image: Option<String>,
    /// Epoch milliseconds, assigned by storage.
    pub created_at: i64,
    /// Epoch milliseconds, assigned by storage.
    pub updated_at: i64,
}

impl Note {
    /// New note with a fresh id; timestamps are filled in on insert.
    pub fn new(title: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            title: title.into(),
            content: content.into(),
            color: DEFAULT_NOTE_COLOR.to_string(),
            folder_id: None,
            tags: Vec::new(),
            is_archived: false,
            is_deleted: false,
            preview_text: None,
            preview_image: None,
            created_at: 0,
            updated_at: 0,
        }
    }

    pub fn in_folder(mut self, folder_id: FolderId) -> Self {
        self.folder_id = Some(folder_id);
        self
    }

    pub fn with_color(mut self, color: impl Into<String>) -> Self {
        self.color = color.into();
        self
    }

    pub fn is_active(&self) -> bool {
        !self.is_deleted && !self.is_archived
    }

    pub fn validate(&self) -> Result<(), NoteValidationError> {
        if self.title.chars().count() > MAX_TITLE_CHARS {
            return Err(NoteValidationError::TitleTooLong);
        }
        validate_color(&self.color)
    }
}

/// One stored folder. Folders nest through `parent_folder_id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Folder {
    pub id: FolderId,
    pub title: String,
    pub color: String,
    pub parent_folder_id: Option<FolderId>,
    pub is_deleted: bool,
    pub created_at: i64,
    pub updated_at: i64,
}

impl Folder {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            title: title.into(),
            color: DEFAULT_FOLDER_COLOR.to_string(),
            parent_folder_id: None,
            is_deleted: false,
            created_at: 0,
            updated_at: 0,
        }
    }

    pub fn under(mut self, parent: FolderId) -> Self {
        self.parent_folder_id = Some(parent);
        self
    }

    pub fn validate(&self) -> Result<(), NoteValidationError> {
        let title = self.title.trim();
        if title.is_empty() {
            return Err(NoteValidationError::EmptyFolderTitle);
        }
        if title.chars().count() > MAX_TITLE_CHARS {
            return Err(NoteValidationError::TitleTooLong);
        }
        if self.parent_folder_id == Some(self.id) {
            return Err(NoteValidationError::SelfParent(self.id));
        }
        validate_color(&self.color)
    }
}

fn validate_color(color: &str) -> Result<(), NoteValidationError> {
    if COLOR_TOKEN_RE.is_match(color) {
        Ok(())
    } else {
        Err(NoteValidationError::InvalidColor(color.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::{Folder, Note, NoteValidationError, MAX_TITLE_CHARS};

    #[test]
    fn new_note_is_active_with_default_color() {
        let note = Note::new("Groceries", "<p>milk</p>");
        assert!(note.is_active());
        assert!(note.validate().is_ok());
    }

    #[test]
    fn rejects_markup_in_color_and_overlong_titles() {
        let note = Note::new("t", "").with_color("red\"><script>");
        assert!(matches!(
            note.validate(),
            Err(NoteValidationError::InvalidColor(_))
        ));

        let long = Note::new("x".repeat(MAX_TITLE_CHARS + 1), "");
        assert_eq!(long.validate(), Err(NoteValidationError::TitleTooLong));
    }

    #[test]
    fn folder_cannot_parent_itself() {
        let mut folder = Folder::new("Work");
        folder.parent_folder_id = Some(folder.id);
        assert_eq!(
            folder.validate(),
            Err(NoteValidationError::SelfParent(folder.id))
        );
        assert_eq!(
            Folder::new("  ").validate(),
            Err(NoteValidationError::EmptyFolderTitle)
        );
    }
}
