//! Core domain logic for QuillNote.
//! This crate is the single source of truth for editor, assist and storage
//! invariants; hosts only render and forward input.

pub mod assist;
pub mod config;
pub mod db;
pub mod document;
pub mod logging;
pub mod media;
pub mod model;
pub mod repo;
pub mod selection;
pub mod service;

pub use assist::{
    drive, ActionKind, AssistError, AssistPipeline, AssistState, BackendError, CompletionBackend,
    CompletionRequest, Generation, OllamaBackend, StreamEnd,
};
pub use config::{AssistSettings, ConfigError, CoreConfig};
pub use document::{
    create_document, DocumentEditor, EditError, MalformedContentError, Position, Range,
};
pub use logging::{default_log_level, init_logging, logging_status, LogSettings, LoggingError};
pub use media::{
    insert_uploaded_media, resolve_resize, Corner, LocalMediaStore, MediaNodeView, MediaStore,
    MediaSurface,
};
pub use model::note::{Folder, FolderId, Note, NoteId, NoteValidationError};
pub use repo::folder_repo::{FolderStore, SqliteFolderStore};
pub use repo::note_repo::{NoteListQuery, NoteStore, SqliteNoteStore};
pub use repo::{StoreError, StoreResult};
pub use selection::{ContextMenuHub, DefaultMenu, SelectionSource, SelectionTracker};
pub use service::note_service::{EditingSession, NoteService, NoteServiceError};

/// Minimal health-check API for host integration.
pub fn ping() -> &'static str {
    "pong"
}

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
