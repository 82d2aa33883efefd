//! Persistence contracts for notes and folders.
//!
//! # Responsibility
//! - Define store traits the service layer depends on.
//! - Keep SQL inside the SQLite implementations.
//!
//! # Invariants
//! - Write paths validate records before any SQL mutation.
//! - Read paths reject malformed persisted rows instead of masking them.

use crate::db::DbError;
use crate::model::note::NoteValidationError;
use rusqlite::Connection;
use std::time::{SystemTime, UNIX_EPOCH};
use thiserror::Error;
use uuid::Uuid;

pub mod folder_repo;
pub mod note_repo;

pub type StoreResult<T> = Result<T, StoreError>;

/// Error shared by every note/folder store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: Uuid },
    /// Raised by remote stores when the session is no longer valid; callers
    /// must re-authenticate before retrying.
    #[error("not authorized; sign in again")]
    Unauthorized,
    #[error("invalid data: {0}")]
    InvalidData(String),
    #[error(transparent)]
    Db(#[from] DbError),
}

impl StoreError {
    pub fn requires_reauth(&self) -> bool {
        matches!(self, Self::Unauthorized)
    }
}

impl From<rusqlite::Error> for StoreError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

impl From<NoteValidationError> for StoreError {
    fn from(value: NoteValidationError) -> Self {
        Self::InvalidData(value.to_string())
    }
}

/// Current wall clock in epoch milliseconds.
pub(crate) fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |elapsed| i64::try_from(elapsed.as_millis()).unwrap_or(i64::MAX))
}

pub(crate) fn parse_uuid(value: &str, column: &'static str) -> StoreResult<Uuid> {
    Uuid::parse_str(value)
        .map_err(|_| StoreError::InvalidData(format!("invalid uuid `{value}` in {column}")))
}

pub(crate) fn parse_optional_uuid(
    value: Option<String>,
    column: &'static str,
) -> StoreResult<Option<Uuid>> {
    value.as_deref().map(|text| parse_uuid(text, column)).transpose()
}

pub(crate) fn ensure_tables(conn: &Connection, tables: &[&'static str]) -> StoreResult<()> {
    for table in tables {
        let exists: i64 = conn.query_row(
            "SELECT EXISTS(
                SELECT 1
                FROM sqlite_master
                WHERE type = 'table' AND name = ?1
            );",
            [table],
            |row| row.get(0),
        )?;
        if exists != 1 {
            return Err(StoreError::InvalidData(format!(
                "missing required table `{table}`; was the connection migrated?"
            )));
        }
    }
    Ok(())
}

pub(crate) fn folder_is_active(conn: &Connection, folder_id: Uuid) -> StoreResult<bool> {
    let exists: i64 = conn.query_row(
        "SELECT EXISTS(
            SELECT 1 FROM folders WHERE uuid = ?1 AND is_deleted = 0
        );",
        [folder_id.to_string()],
        |row| row.get(0),
    )?;
    Ok(exists == 1)
}
