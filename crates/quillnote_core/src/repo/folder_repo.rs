//! Folder store contract and SQLite implementation.
//!
//! # Invariants
//! - The folder graph stays a forest: a folder never moves under itself or
//!   one of its descendants.
//! - Soft-deleting a folder tombstones its whole subtree and moves the
//!   notes it contained to the root, so no live note becomes unreachable.

use crate::model::note::{Folder, FolderId};
use crate::repo::{
    ensure_tables, folder_is_active, now_ms, parse_optional_uuid, parse_uuid, StoreError,
    StoreResult,
};
use log::info;
use rusqlite::{params, Connection, OptionalExtension, Row, Transaction, TransactionBehavior};

const FOLDER_SELECT_SQL: &str = "SELECT
    uuid,
    title,
    color,
    parent_uuid,
    is_deleted,
    created_at,
    updated_at
FROM folders";

pub trait FolderStore {
    fn create_folder(&self, folder: &Folder) -> StoreResult<FolderId>;
    /// Replaces title, color and parent.
    fn update_folder(&self, folder: &Folder) -> StoreResult<()>;
    fn get_folder(&self, id: FolderId) -> StoreResult<Option<Folder>>;
    /// Lists live children of `parent`, or root folders when `None`,
    /// ordered by title.
    fn list_folders(&self, parent: Option<FolderId>) -> StoreResult<Vec<Folder>>;
    fn soft_delete_folder(&self, id: FolderId) -> StoreResult<()>;
    /// Restores one folder; it is reattached to the root when its parent
    /// is still deleted.
    fn restore_folder(&self, id: FolderId) -> StoreResult<()>;
}

pub struct SqliteFolderStore<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteFolderStore<'conn> {
    pub fn try_new(conn: &'conn Connection) -> StoreResult<Self> {
        ensure_tables(conn, &["folders", "notes"])?;
        Ok(Self { conn })
    }
}

impl FolderStore for SqliteFolderStore<'_> {
    fn create_folder(&self, folder: &Folder) -> StoreResult<FolderId> {
        folder.validate()?;
        ensure_parent_target(self.conn, folder.parent_folder_id)?;

        self.conn.execute(
            "INSERT INTO folders (
                uuid,
                title,
                color,
                parent_uuid,
                is_deleted,
                created_at,
                updated_at
            ) VALUES (?1, ?2, ?3, ?4, 0, ?5, ?5);",
            params![
                folder.id.to_string(),
                folder.title.trim(),
                folder.color,
                folder.parent_folder_id.map(|id| id.to_string()),
                now_ms(),
            ],
        )?;
        Ok(folder.id)
    }

    fn update_folder(&self, folder: &Folder) -> StoreResult<()> {
        folder.validate()?;
        ensure_parent_target(self.conn, folder.parent_folder_id)?;
        if let Some(parent) = folder.parent_folder_id {
            if is_descendant(self.conn, parent, folder.id)? {
                return Err(StoreError::InvalidData(format!(
                    "folder {} cannot move under its descendant {parent}",
                    folder.id
                )));
            }
        }

        let changed = self.conn.execute(
            "UPDATE folders
             SET title = ?2, color = ?3, parent_uuid = ?4, updated_at = ?5
             WHERE uuid = ?1 AND is_deleted = 0;",
            params![
                folder.id.to_string(),
                folder.title.trim(),
                folder.color,
                folder.parent_folder_id.map(|id| id.to_string()),
                now_ms(),
            ],
        )?;
        if changed == 0 {
            return Err(not_found(folder.id));
        }
        Ok(())
    }

    fn get_folder(&self, id: FolderId) -> StoreResult<Option<Folder>> {
        let folder = self
            .conn
            .query_row(
                &format!("{FOLDER_SELECT_SQL} WHERE uuid = ?1 AND is_deleted = 0;"),
                [id.to_string()],
                |row| Ok(folder_from_row(row)),
            )
            .optional()?;
        folder.transpose()
    }

    fn list_folders(&self, parent: Option<FolderId>) -> StoreResult<Vec<Folder>> {
        let mut stmt = self.conn.prepare(&format!(
            "{FOLDER_SELECT_SQL}
             WHERE is_deleted = 0
               AND parent_uuid IS ?1
             ORDER BY title COLLATE NOCASE ASC, uuid ASC;"
        ))?;
        let mut rows = stmt.query([parent.map(|id| id.to_string())])?;
        let mut folders = Vec::new();
        while let Some(row) = rows.next()? {
            folders.push(folder_from_row(row)?);
        }
        Ok(folders)
    }

    fn soft_delete_folder(&self, id: FolderId) -> StoreResult<()> {
        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)?;
        if !folder_is_active(&tx, id)? {
            return Err(not_found(id));
        }

        let now = now_ms();
        let subtree = "WITH RECURSIVE subtree(uuid) AS (
                SELECT uuid FROM folders WHERE uuid = ?1
                UNION ALL
                SELECT child.uuid
                FROM folders child
                INNER JOIN subtree parent ON child.parent_uuid = parent.uuid
                WHERE child.is_deleted = 0
            )";
        let moved_notes = tx.execute(
            &format!(
                "{subtree}
                 UPDATE notes
                 SET folder_uuid = NULL, updated_at = ?2
                 WHERE folder_uuid IN (SELECT uuid FROM subtree);"
            ),
            params![id.to_string(), now],
        )?;
        let deleted_folders = tx.execute(
            &format!(
                "{subtree}
                 UPDATE folders
                 SET is_deleted = 1, updated_at = ?2
                 WHERE uuid IN (SELECT uuid FROM subtree);"
            ),
            params![id.to_string(), now],
        )?;
        tx.commit()?;

        info!(
            "event=folder_delete module=repo status=ok folders={} notes_moved={}",
            deleted_folders, moved_notes
        );
        Ok(())
    }

    fn restore_folder(&self, id: FolderId) -> StoreResult<()> {
        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)?;
        let parent: Option<Option<String>> = tx
            .query_row(
                "SELECT parent_uuid FROM folders WHERE uuid = ?1;",
                [id.to_string()],
                |row| row.get(0),
            )
            .optional()?;
        let Some(parent) = parent else {
            return Err(not_found(id));
        };
        let parent = match parse_optional_uuid(parent, "folders.parent_uuid")? {
            Some(parent) if folder_is_active(&tx, parent)? => Some(parent),
            _ => None,
        };

        tx.execute(
            "UPDATE folders
             SET is_deleted = 0, parent_uuid = ?2, updated_at = ?3
             WHERE uuid = ?1;",
            params![id.to_string(), parent.map(|parent| parent.to_string()), now_ms()],
        )?;
        tx.commit()?;
        Ok(())
    }
}

fn not_found(id: FolderId) -> StoreError {
    StoreError::NotFound {
        entity: "folder",
        id,
    }
}

fn ensure_parent_target(conn: &Connection, parent: Option<FolderId>) -> StoreResult<()> {
    match parent {
        Some(parent) if !folder_is_active(conn, parent)? => Err(not_found(parent)),
        _ => Ok(()),
    }
}

/// True when `candidate` is `ancestor` or lies somewhere below it.
fn is_descendant(conn: &Connection, candidate: FolderId, ancestor: FolderId) -> StoreResult<bool> {
    let found: i64 = conn.query_row(
        "WITH RECURSIVE lineage(uuid, parent_uuid) AS (
            SELECT uuid, parent_uuid FROM folders WHERE uuid = ?1
            UNION
            SELECT f.uuid, f.parent_uuid
            FROM folders f
            INNER JOIN lineage l ON f.uuid = l.parent_uuid
        )
        SELECT EXISTS(SELECT 1 FROM lineage WHERE uuid = ?2);",
        params![candidate.to_string(), ancestor.to_string()],
        |row| row.get(0),
    )?;
    Ok(found == 1)
}

fn folder_from_row(row: &Row<'_>) -> StoreResult<Folder> {
    let uuid_text: String = row.get("uuid")?;
    Ok(Folder {
        id: parse_uuid(&uuid_text, "folders.uuid")?,
        title: row.get("title")?,
        color: row.get("color")?,
        parent_folder_id: parse_optional_uuid(row.get("parent_uuid")?, "folders.parent_uuid")?,
        is_deleted: row.get("is_deleted")?,
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
    })
}
