//! Media storage collaborator.
//!
//! Nodes only ever keep the URI a store returns; raw bytes never enter the
//! document.

use crate::document::{DocumentEditor, EditError, MediaAttrs, NewNode};
use log::{debug, info, warn};
use std::path::{Path, PathBuf};
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum MediaStoreError {
    #[error("media payload is empty")]
    Empty,
    #[error("unsupported media type `{0}`")]
    UnsupportedMime(String),
    #[error("`{0}` does not belong to this store")]
    ForeignUri(String),
    #[error("media storage io failed: {0}")]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Edit(#[from] EditError),
}

/// Persists image bytes and hands back a durable URI.
pub trait MediaStore {
    fn store(&self, bytes: &[u8], mime: &str) -> Result<String, MediaStoreError>;
    /// Deletes content previously returned by `store`.
    fn remove(&self, uri: &str) -> Result<(), MediaStoreError>;
}

/// Stores media as files under one directory, named by random UUID.
#[derive(Debug, Clone)]
pub struct LocalMediaStore {
    root: PathBuf,
}

impl LocalMediaStore {
    /// Creates the directory if needed.
    pub fn new(root: impl AsRef<Path>) -> Result<Self, MediaStoreError> {
        std::fs::create_dir_all(root.as_ref())?;
        let root = std::fs::canonicalize(root.as_ref())?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl MediaStore for LocalMediaStore {
    fn store(&self, bytes: &[u8], mime: &str) -> Result<String, MediaStoreError> {
        if bytes.is_empty() {
            return Err(MediaStoreError::Empty);
        }
        let extension = extension_for(mime)
            .ok_or_else(|| MediaStoreError::UnsupportedMime(mime.to_string()))?;
        let path = self.root.join(format!("{}.{extension}", Uuid::new_v4()));
        if let Err(err) = std::fs::write(&path, bytes) {
            warn!(
                "event=media_store module=media status=error bytes={} error={}",
                bytes.len(),
                err
            );
            return Err(err.into());
        }
        info!(
            "event=media_store module=media status=ok bytes={} extension={}",
            bytes.len(),
            extension
        );
        Ok(format!("file://{}", path.display()))
    }

    fn remove(&self, uri: &str) -> Result<(), MediaStoreError> {
        let path = uri
            .strip_prefix("file://")
            .map(Path::new)
            .filter(|path| path.parent() == Some(self.root.as_path()))
            .ok_or_else(|| MediaStoreError::ForeignUri(uri.to_string()))?;
        std::fs::remove_file(path)?;
        debug!("event=media_remove module=media status=ok");
        Ok(())
    }
}

/// Raster types accepted for upload. SVG is refused since it can carry script.
fn extension_for(mime: &str) -> Option<&'static str> {
    match mime.trim().to_ascii_lowercase().as_str() {
        "image/png" => Some("png"),
        "image/jpeg" | "image/jpg" => Some("jpg"),
        "image/gif" => Some("gif"),
        "image/webp" => Some("webp"),
        _ => None,
    }
}

/// Stores `bytes` and inserts a media node for them at the cursor.
///
/// Returns the stored URI. When the editor refuses the node the stored
/// content is removed again.
pub fn insert_uploaded_media(
    editor: &mut DocumentEditor,
    store: &dyn MediaStore,
    bytes: &[u8],
    mime: &str,
    alt: Option<&str>,
) -> Result<String, MediaStoreError> {
    let uri = store.store(bytes, mime)?;
    let mut attrs = MediaAttrs::new(uri.clone());
    attrs.alt = alt.map(str::to_string);
    if let Err(err) = editor.insert_node(NewNode::Media(attrs)) {
        if let Err(cleanup) = store.remove(&uri) {
            warn!(
                "event=media_remove module=media status=error error={}",
                cleanup
            );
        }
        return Err(err.into());
    }
    Ok(uri)
}

#[cfg(test)]
mod tests {
    use super::{insert_uploaded_media, LocalMediaStore, MediaStore, MediaStoreError};
    use crate::document::{DocumentEditor, EditError};
    use std::cell::RefCell;

    /// Store handing out URIs the editor refuses to embed.
    #[derive(Default)]
    struct UnsafeUriStore {
        removed: RefCell<Vec<String>>,
    }

    impl MediaStore for UnsafeUriStore {
        fn store(&self, _bytes: &[u8], _mime: &str) -> Result<String, MediaStoreError> {
            Ok("javascript:alert(1)".to_string())
        }

        fn remove(&self, uri: &str) -> Result<(), MediaStoreError> {
            self.removed.borrow_mut().push(uri.to_string());
            Ok(())
        }
    }

    #[test]
    fn stores_bytes_under_generated_name() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = LocalMediaStore::new(dir.path()).expect("store");
        let uri = store.store(&[0x89, b'P', b'N', b'G'], "image/png").expect("store");
        assert!(uri.starts_with("file://"));
        assert!(uri.ends_with(".png"));
        let path = uri.trim_start_matches("file://");
        assert_eq!(std::fs::read(path).expect("read back").len(), 4);
    }

    #[test]
    fn rejects_empty_and_svg_payloads() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = LocalMediaStore::new(dir.path()).expect("store");
        assert!(matches!(store.store(&[], "image/png"), Err(MediaStoreError::Empty)));
        assert!(matches!(
            store.store(b"<svg/>", "image/svg+xml"),
            Err(MediaStoreError::UnsupportedMime(_))
        ));
    }

    #[test]
    fn uploaded_media_lands_in_document() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = LocalMediaStore::new(dir.path()).expect("store");
        let mut editor = DocumentEditor::open("<p>hi</p>");
        let uri = insert_uploaded_media(&mut editor, &store, b"GIF89a", "image/gif", Some("cat"))
            .expect("insert");
        let node = editor.document().media_nodes().next().expect("media");
        assert_eq!(node.attrs.src, uri);
        assert_eq!(node.attrs.alt.as_deref(), Some("cat"));
    }

    #[test]
    fn refused_insert_removes_stored_content() {
        let store = UnsafeUriStore::default();
        let mut editor = DocumentEditor::open("<p>hi</p>");
        let err = insert_uploaded_media(&mut editor, &store, b"GIF89a", "image/gif", None)
            .expect_err("unsafe uri");
        assert!(matches!(
            err,
            MediaStoreError::Edit(EditError::UnsafeMediaSource)
        ));
        assert_eq!(*store.removed.borrow(), vec!["javascript:alert(1)".to_string()]);
        assert_eq!(editor.version(), 0);
    }

    #[test]
    fn remove_deletes_own_files_and_refuses_others() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = LocalMediaStore::new(dir.path()).expect("store");
        let uri = store.store(b"GIF89a", "image/gif").expect("store");
        store.remove(&uri).expect("remove");
        assert!(!std::path::Path::new(uri.trim_start_matches("file://")).exists());

        assert!(matches!(
            store.remove("file:///etc/hosts"),
            Err(MediaStoreError::ForeignUri(_))
        ));
        assert!(matches!(
            store.remove("https://cdn.test/a.png"),
            Err(MediaStoreError::ForeignUri(_))
        ));
    }
}
