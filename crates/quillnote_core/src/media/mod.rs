//! Resizable media node.
//!
//! `geometry` is the pure sizing algorithm; `node_view` applies it to a
//! rendering surface and commits through the editor; `storage` turns raw
//! uploads into durable URIs.

pub mod geometry;
pub mod node_view;
pub mod storage;

pub use geometry::{resolve_resize, Corner, GeometryError, ResizeFrame, ResizeGesture, MIN_MEDIA_EXTENT};
pub use node_view::{GestureEnd, MediaNodeView, MediaSurface, SurfaceError};
pub use storage::{insert_uploaded_media, LocalMediaStore, MediaStore, MediaStoreError};
