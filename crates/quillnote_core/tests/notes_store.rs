use quillnote_core::db::{open_db, open_db_in_memory};
use quillnote_core::repo::StoreError;
use quillnote_core::{
    Folder, FolderStore, NoteListQuery, NoteService, NoteServiceError, NoteStore,
    SqliteFolderStore, SqliteNoteStore,
};
use rusqlite::params;

#[test]
fn create_derives_previews_and_stores_canonical_html() {
    let mut conn = open_db_in_memory().expect("db");
    let store = SqliteNoteStore::try_new(&mut conn).expect("store");
    let service = NoteService::new(store);

    let note = service
        .create_note(
            "Trip",
            "<h3>Day one</h3><img src=\"https://cdn.test/beach.png\"><b>Sunny</b>",
            None,
        )
        .expect("create");

    assert_eq!(
        note.preview_image.as_deref(),
        Some("https://cdn.test/beach.png")
    );
    assert_eq!(note.preview_text.as_deref(), Some("Day one Sunny"));
    assert!(note.content.starts_with("<h2>Day one</h2>"));
    assert!(note.created_at > 0);
    assert_eq!(note.created_at, note.updated_at);
}

#[test]
fn editing_session_saves_document_changes() {
    let mut conn = open_db_in_memory().expect("db");
    let store = SqliteNoteStore::try_new(&mut conn).expect("store");
    let service = NoteService::new(store);
    let created = service
        .create_note("Draft", "<p>hello</p>", None)
        .expect("create");

    let mut session = service.open_for_editing(created.id).expect("open");
    assert!(!session.is_dirty());
    session
        .editor_mut()
        .set_selection(quillnote_core::Range::caret(quillnote_core::Position::new(0, 5)))
        .expect("caret");
    session.editor_mut().insert_text(" world").expect("type");
    assert!(session.is_dirty());

    let saved = service.save(&mut session).expect("save");
    assert_eq!(saved.content, "<p>hello world</p>");
    assert_eq!(saved.preview_text.as_deref(), Some("hello world"));
    assert!(!session.is_dirty());
    assert_eq!(session.note(), &saved);
}

#[test]
fn list_orders_by_update_time_and_filters_archived() {
    let mut conn = open_db_in_memory().expect("db");
    let (first, second) = {
        let store = SqliteNoteStore::try_new(&mut conn).expect("store");
        let service = NoteService::new(store);
        let first = service.create_note("first", "<p>1</p>", None).expect("first");
        let second = service.create_note("second", "<p>2</p>", None).expect("second");
        (first.id, second.id)
    };

    conn.execute(
        "UPDATE notes SET updated_at = 2000 WHERE uuid = ?1;",
        params![first.to_string()],
    )
    .expect("touch first");
    conn.execute(
        "UPDATE notes SET updated_at = 1000 WHERE uuid = ?1;",
        params![second.to_string()],
    )
    .expect("touch second");

    let store = SqliteNoteStore::try_new(&mut conn).expect("store");
    let service = NoteService::new(store);
    let listed = service.list_notes(NoteListQuery::default()).expect("list");
    assert_eq!(listed.applied_limit, 20);
    let ids: Vec<_> = listed.items.iter().map(|note| note.id).collect();
    assert_eq!(ids, vec![first, second]);

    service.archive(first).expect("archive");
    let active = service.list_notes(NoteListQuery::default()).expect("list");
    assert_eq!(active.items.len(), 1);
    let everything = service
        .list_notes(NoteListQuery {
            include_archived: true,
            ..NoteListQuery::default()
        })
        .expect("list archived");
    assert_eq!(everything.items.len(), 2);
}

#[test]
fn soft_delete_hides_note_until_restored() {
    let mut conn = open_db_in_memory().expect("db");
    let store = SqliteNoteStore::try_new(&mut conn).expect("store");
    let service = NoteService::new(store);
    let note = service.create_note("gone", "<p>x</p>", None).expect("create");

    service.delete(note.id).expect("delete");
    assert!(service.get_note(note.id).expect("get").is_none());
    assert!(matches!(
        service.delete(note.id),
        Err(NoteServiceError::NoteNotFound(id)) if id == note.id
    ));

    service.restore(note.id).expect("restore");
    let back = service.get_note(note.id).expect("get").expect("visible");
    assert!(back.is_active());
}

#[test]
fn set_tags_replaces_full_set_with_lowercase_normalization() {
    let mut conn = open_db_in_memory().expect("db");
    let store = SqliteNoteStore::try_new(&mut conn).expect("store");
    let mut service = NoteService::new(store);
    let note = service.create_note("tagged", "<p>t</p>", None).expect("create");

    let first = service
        .set_tags(note.id, vec!["Work".into(), "work".into(), "Ideas".into()])
        .expect("first tags");
    assert_eq!(first.tags, vec!["ideas", "work"]);

    let second = service
        .set_tags(note.id, vec!["Home".into()])
        .expect("second tags");
    assert_eq!(second.tags, vec!["home"]);
    assert_eq!(
        service.list_tags().expect("tags"),
        vec!["home", "ideas", "work"]
    );

    let filtered = service
        .list_notes(NoteListQuery {
            tag: Some("HOME".to_string()),
            ..NoteListQuery::default()
        })
        .expect("filter");
    assert_eq!(filtered.items.len(), 1);

    assert!(matches!(
        service.set_tags(note.id, vec![" ".into()]),
        Err(NoteServiceError::InvalidTag(_))
    ));
}

#[test]
fn move_to_folder_requires_a_live_folder() {
    let mut conn = open_db_in_memory().expect("db");
    let folder = Folder::new("Work");
    {
        let folders = SqliteFolderStore::try_new(&conn).expect("folders");
        folders.create_folder(&folder).expect("folder");
    }

    let store = SqliteNoteStore::try_new(&mut conn).expect("store");
    let service = NoteService::new(store);
    let note = service.create_note("n", "<p>n</p>", None).expect("create");

    let moved = service
        .move_to_folder(note.id, Some(folder.id))
        .expect("move");
    assert_eq!(moved.folder_id, Some(folder.id));
    let in_folder = service
        .list_notes(NoteListQuery {
            folder_id: Some(folder.id),
            ..NoteListQuery::default()
        })
        .expect("list folder");
    assert_eq!(in_folder.items.len(), 1);

    let missing = Folder::new("nowhere");
    assert!(matches!(
        service.move_to_folder(note.id, Some(missing.id)),
        Err(NoteServiceError::Store(StoreError::NotFound {
            entity: "folder",
            ..
        }))
    ));
}

#[test]
fn deleting_a_folder_moves_its_notes_to_the_root() {
    let dir = tempfile::tempdir().expect("tempdir");
    let mut conn = open_db(dir.path().join("notes.db")).expect("db");
    let parent = Folder::new("Projects");
    let child = Folder::new("Rust").under(parent.id);
    {
        let folders = SqliteFolderStore::try_new(&conn).expect("folders");
        folders.create_folder(&parent).expect("parent");
        folders.create_folder(&child).expect("child");
    }

    let note_id = {
        let store = SqliteNoteStore::try_new(&mut conn).expect("store");
        let service = NoteService::new(store);
        service
            .create_note("deep", "<p>deep</p>", Some(child.id))
            .expect("create")
            .id
    };

    let folders = SqliteFolderStore::try_new(&conn).expect("folders");
    folders.soft_delete_folder(parent.id).expect("delete");
    assert!(folders.get_folder(child.id).expect("get").is_none());
    assert!(folders.list_folders(None).expect("roots").is_empty());

    let store = SqliteNoteStore::try_new(&mut conn).expect("store");
    let note = store.get_note(note_id).expect("get").expect("note survives");
    assert_eq!(note.folder_id, None);
}
