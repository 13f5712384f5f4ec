//! Core traits and types for the OnedataFS contents manager.
//!
//! This crate defines the abstractions shared between the contents manager and
//! the storage adapters it runs on:
//! - `FsBackend`: the capability contract every filesystem adapter implements
//! - `ContentModel` / `SaveModel`: the typed content models exchanged with clients
//! - `CheckpointModel` / `CheckpointContent`: checkpoint records
//! - `Listing`: results of a listing together with the entries that were skipped
//! - `path`: API path normalization helpers

mod backend;
mod error;
mod listing;
mod model;
pub mod path;

pub use backend::{EntryInfo, EntryKind, FileHandle, FsBackend, OpenMode};
pub use error::BackendError;
pub use listing::{Listing, SkipReason, SkippedEntry};
pub use model::{
    CheckpointContent, CheckpointModel, Content, ContentFormat, ContentModel, ContentType,
    FileFormat, SaveModel, SnapshotKind,
};
