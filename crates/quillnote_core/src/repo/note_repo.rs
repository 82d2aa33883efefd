//! Note/tag store contract and SQLite implementation.
//!
//! # Responsibility
//! - Persist notes (HTML content plus metadata) and their tag links.
//! - Own tag-link replacement with atomic semantics.
//!
//! # Invariants
//! - Soft-deleted notes are invisible to `get_note` and `list_notes`.
//! - `set_note_tags` replaces the whole tag set in a single transaction.
//! - Tag names are persisted lowercase.
//! - Lists are ordered by `updated_at DESC, uuid ASC`.

use crate::model::note::{FolderId, Note, NoteId};
use crate::repo::{
    ensure_tables, folder_is_active, now_ms, parse_optional_uuid, parse_uuid, StoreError,
    StoreResult,
};
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, Row, Transaction, TransactionBehavior};
use std::collections::BTreeSet;

const NOTES_DEFAULT_LIMIT: u32 = 20;
const NOTES_LIMIT_MAX: u32 = 100;

const NOTE_SELECT_SQL: &str = "SELECT
    uuid,
    title,
    content,
    color,
    folder_uuid,
    is_archived,
    is_deleted,
    preview_text,
    preview_image,
    created_at,
    updated_at
FROM notes";

/// Query options for note lists.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NoteListQuery {
    /// Restrict to one folder; `None` lists every folder.
    pub folder_id: Option<FolderId>,
    pub include_archived: bool,
    /// Optional single-tag exact match filter.
    pub tag: Option<String>,
    /// Defaults to 20 and clamps to 100.
    pub limit: Option<u32>,
    pub offset: u32,
}

/// Persistence interface for notes and tags.
pub trait NoteStore {
    /// Inserts a note (and its tags) and returns its id.
    fn create_note(&self, note: &Note) -> StoreResult<NoteId>;
    /// Replaces title, content, color, folder and previews. Tags and
    /// lifecycle flags are left untouched.
    fn update_note(&self, note: &Note) -> StoreResult<()>;
    fn get_note(&self, id: NoteId) -> StoreResult<Option<Note>>;
    fn list_notes(&self, query: &NoteListQuery) -> StoreResult<Vec<Note>>;
    fn archive_note(&self, id: NoteId) -> StoreResult<()>;
    /// Clears both the archived and the deleted flag.
    fn restore_note(&self, id: NoteId) -> StoreResult<()>;
    fn soft_delete_note(&self, id: NoteId) -> StoreResult<()>;
    /// Replaces all tags for the note in one transaction.
    fn set_note_tags(&mut self, id: NoteId, tags: &[String]) -> StoreResult<()>;
    /// Returns all known tags sorted by name.
    fn list_tags(&self) -> StoreResult<Vec<String>>;
}

/// SQLite-backed note store.
pub struct SqliteNoteStore<'conn> {
    conn: &'conn mut Connection,
}

impl<'conn> SqliteNoteStore<'conn> {
    /// Wraps a migrated connection.
    pub fn try_new(conn: &'conn mut Connection) -> StoreResult<Self> {
        ensure_tables(conn, &["folders", "notes", "tags", "note_tags"])?;
        Ok(Self { conn })
    }
}

impl NoteStore for SqliteNoteStore<'_> {
    fn create_note(&self, note: &Note) -> StoreResult<NoteId> {
        note.validate()?;
        ensure_folder_target(self.conn, note.folder_id)?;

        let now = now_ms();
        let id_text = note.id.to_string();
        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)?;
        tx.execute(
            "INSERT INTO notes (
                uuid,
                title,
                content,
                color,
                folder_uuid,
                is_archived,
                is_deleted,
                preview_text,
                preview_image,
                created_at,
                updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?10);",
            params![
                id_text,
                note.title,
                note.content,
                note.color,
                note.folder_id.map(|id| id.to_string()),
                note.is_archived,
                note.is_deleted,
                note.preview_text,
                note.preview_image,
                now,
            ],
        )?;
        replace_tags(&tx, &id_text, &normalize_tags(&note.tags))?;
        tx.commit()?;
        Ok(note.id)
    }

    fn update_note(&self, note: &Note) -> StoreResult<()> {
        note.validate()?;
        ensure_folder_target(self.conn, note.folder_id)?;

        let changed = self.conn.execute(
            "UPDATE notes
             SET
                title = ?2,
                content = ?3,
                color = ?4,
                folder_uuid = ?5,
                preview_text = ?6,
                preview_image = ?7,
                updated_at = ?8
             WHERE uuid = ?1
               AND is_deleted = 0;",
            params![
                note.id.to_string(),
                note.title,
                note.content,
                note.color,
                note.folder_id.map(|id| id.to_string()),
                note.preview_text,
                note.preview_image,
                now_ms(),
            ],
        )?;
        if changed == 0 {
            return Err(not_found(note.id));
        }
        Ok(())
    }

    fn get_note(&self, id: NoteId) -> StoreResult<Option<Note>> {
        let mut stmt = self
            .conn
            .prepare(&format!("{NOTE_SELECT_SQL} WHERE uuid = ?1 AND is_deleted = 0;"))?;
        let mut rows = stmt.query([id.to_string()])?;
        match rows.next()? {
            Some(row) => {
                let mut note = note_from_row(row)?;
                note.tags = load_tags_for_note(self.conn, &note.id.to_string())?;
                Ok(Some(note))
            }
            None => Ok(None),
        }
    }

    fn list_notes(&self, query: &NoteListQuery) -> StoreResult<Vec<Note>> {
        let mut sql = format!("{NOTE_SELECT_SQL} WHERE is_deleted = 0");
        let mut bind_values: Vec<Value> = Vec::new();

        if !query.include_archived {
            sql.push_str(" AND is_archived = 0");
        }
        if let Some(folder_id) = query.folder_id {
            sql.push_str(" AND folder_uuid = ?");
            bind_values.push(Value::Text(folder_id.to_string()));
        }
        if let Some(tag) = query.tag.as_deref().and_then(normalize_tag) {
            sql.push_str(
                " AND EXISTS (
                    SELECT 1
                    FROM note_tags nt
                    INNER JOIN tags t ON t.id = nt.tag_id
                    WHERE nt.note_uuid = notes.uuid
                      AND t.name = ? COLLATE NOCASE
                )",
            );
            bind_values.push(Value::Text(tag));
        }

        sql.push_str(" ORDER BY updated_at DESC, uuid ASC LIMIT ?");
        bind_values.push(Value::Integer(i64::from(normalize_note_limit(query.limit))));
        if query.offset > 0 {
            sql.push_str(" OFFSET ?");
            bind_values.push(Value::Integer(i64::from(query.offset)));
        }

        let mut stmt = self.conn.prepare(&sql)?;
        let mut rows = stmt.query(params_from_iter(bind_values))?;
        let mut notes = Vec::new();
        while let Some(row) = rows.next()? {
            let mut note = note_from_row(row)?;
            note.tags = load_tags_for_note(self.conn, &note.id.to_string())?;
            notes.push(note);
        }
        Ok(notes)
    }

    fn archive_note(&self, id: NoteId) -> StoreResult<()> {
        let changed = self.conn.execute(
            "UPDATE notes
             SET is_archived = 1, updated_at = ?2
             WHERE uuid = ?1 AND is_deleted = 0;",
            params![id.to_string(), now_ms()],
        )?;
        if changed == 0 {
            return Err(not_found(id));
        }
        Ok(())
    }

    fn restore_note(&self, id: NoteId) -> StoreResult<()> {
        let changed = self.conn.execute(
            "UPDATE notes
             SET is_archived = 0, is_deleted = 0, updated_at = ?2
             WHERE uuid = ?1;",
            params![id.to_string(), now_ms()],
        )?;
        if changed == 0 {
            return Err(not_found(id));
        }
        Ok(())
    }

    fn soft_delete_note(&self, id: NoteId) -> StoreResult<()> {
        let changed = self.conn.execute(
            "UPDATE notes
             SET is_deleted = 1, updated_at = ?2
             WHERE uuid = ?1 AND is_deleted = 0;",
            params![id.to_string(), now_ms()],
        )?;
        if changed == 0 {
            return Err(not_found(id));
        }
        Ok(())
    }

    fn set_note_tags(&mut self, id: NoteId, tags: &[String]) -> StoreResult<()> {
        let id_text = id.to_string();
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;
        if !note_exists_in_tx(&tx, &id_text)? {
            return Err(not_found(id));
        }

        replace_tags(&tx, &id_text, &normalize_tags(tags))?;
        tx.execute(
            "UPDATE notes SET updated_at = ?2 WHERE uuid = ?1;",
            params![id_text, now_ms()],
        )?;
        tx.commit()?;
        Ok(())
    }

    fn list_tags(&self) -> StoreResult<Vec<String>> {
        let mut stmt = self
            .conn
            .prepare("SELECT name FROM tags ORDER BY name COLLATE NOCASE ASC;")?;
        let mut rows = stmt.query([])?;
        let mut tags = Vec::new();
        while let Some(row) = rows.next()? {
            let value: String = row.get("name")?;
            tags.push(value.to_lowercase());
        }
        Ok(tags)
    }
}

/// Normalizes a list limit: default 20, max 100.
pub fn normalize_note_limit(limit: Option<u32>) -> u32 {
    match limit {
        None | Some(0) => NOTES_DEFAULT_LIMIT,
        Some(value) => value.min(NOTES_LIMIT_MAX),
    }
}

/// Trims and lowercases one tag; blank tags are dropped.
pub fn normalize_tag(tag: &str) -> Option<String> {
    let trimmed = tag.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_lowercase())
    }
}

/// Normalizes, deduplicates and sorts tag values.
pub fn normalize_tags(tags: &[String]) -> Vec<String> {
    tags.iter()
        .filter_map(|tag| normalize_tag(tag))
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

fn not_found(id: NoteId) -> StoreError {
    StoreError::NotFound { entity: "note", id }
}

fn ensure_folder_target(conn: &Connection, folder_id: Option<FolderId>) -> StoreResult<()> {
    match folder_id {
        Some(folder_id) if !folder_is_active(conn, folder_id)? => Err(StoreError::NotFound {
            entity: "folder",
            id: folder_id,
        }),
        _ => Ok(()),
    }
}

fn note_from_row(row: &Row<'_>) -> StoreResult<Note> {
    let uuid_text: String = row.get("uuid")?;
    Ok(Note {
        id: parse_uuid(&uuid_text, "notes.uuid")?,
        title: row.get("title")?,
        content: row.get("content")?,
        color: row.get("color")?,
        folder_id: parse_optional_uuid(row.get("folder_uuid")?, "notes.folder_uuid")?,
        tags: Vec::new(),
        is_archived: row.get("is_archived")?,
        is_deleted: row.get("is_deleted")?,
        preview_text: row.get("preview_text")?,
        preview_image: row.get("preview_image")?,
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
    })
}

fn replace_tags(conn: &Connection, note_uuid: &str, tags: &[String]) -> StoreResult<()> {
    conn.execute("DELETE FROM note_tags WHERE note_uuid = ?1;", [note_uuid])?;
    for tag in tags {
        conn.execute("INSERT OR IGNORE INTO tags (name) VALUES (?1);", [tag])?;
        conn.execute(
            "INSERT OR IGNORE INTO note_tags (note_uuid, tag_id)
             SELECT ?1, id
             FROM tags
             WHERE name = ?2 COLLATE NOCASE;",
            params![note_uuid, tag],
        )?;
    }
    Ok(())
}

fn load_tags_for_note(conn: &Connection, note_uuid: &str) -> StoreResult<Vec<String>> {
    let mut stmt = conn.prepare(
        "SELECT t.name
         FROM note_tags nt
         INNER JOIN tags t ON t.id = nt.tag_id
         WHERE nt.note_uuid = ?1
         ORDER BY t.name COLLATE NOCASE ASC;",
    )?;
    let mut rows = stmt.query([note_uuid])?;
    let mut tags = Vec::new();
    while let Some(row) = rows.next()? {
        let value: String = row.get(0)?;
        tags.push(value.to_lowercase());
    }
    Ok(tags)
}

fn note_exists_in_tx(tx: &Transaction<'_>, note_uuid: &str) -> StoreResult<bool> {
    let exists: i64 = tx.query_row(
        "SELECT EXISTS(
            SELECT 1 FROM notes WHERE uuid = ?1 AND is_deleted = 0
        );",
        [note_uuid],
        |row| row.get(0),
    )?;
    Ok(exists == 1)
}

#[cfg(test)]
mod tests {
    use super::{normalize_note_limit, normalize_tags};
    use rstest::rstest;

    #[rstest]
    #[case(None, 20)]
    #[case(Some(0), 20)]
    #[case(Some(7), 7)]
    #[case(Some(500), 100)]
    fn limit_defaults_and_clamps(#[case] input: Option<u32>, #[case] expected: u32) {
        assert_eq!(normalize_note_limit(input), expected);
    }

    #[test]
    fn tags_are_lowercased_deduplicated_and_sorted() {
        let tags = vec![
            " Work ".to_string(),
            "work".to_string(),
            "".to_string(),
            "Ideas".to_string(),
        ];
        assert_eq!(normalize_tags(&tags), vec!["ideas", "work"]);
    }
}
