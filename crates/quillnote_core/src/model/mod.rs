//! Domain model for stored notes and folders.
//!
//! # Invariants
//! - Every note and folder is identified by a stable UUID.
//! - Deletion is a soft-delete tombstone, never a hard delete.

pub mod note;
