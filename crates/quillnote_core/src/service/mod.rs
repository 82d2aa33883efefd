//! Use-case services over the stores.
//!
//! Keeps callers decoupled from storage details.

pub mod note_service;
