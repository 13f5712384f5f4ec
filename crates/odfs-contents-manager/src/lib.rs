//! Contents manager for notebooks, files and directories on a remote filesystem.
//!
//! [`ContentsManager`] exposes a Jupyter-style contents API over any
//! [`odfs_contents_core::FsBackend`]:
//! - `builder`: content models built from backend metadata and, on request, content
//! - `save`: the save pipeline (validate, pre-hook, write, re-read, post-hook)
//! - `checkpoints`: UUID-named snapshots kept in a hidden sibling directory
//! - `codec` / `document`: file content transcoding and the notebook format

mod builder;
pub mod checkpoints;
pub mod codec;
mod config;
pub mod document;
mod error;
mod hooks;
mod manager;
mod save;
mod writer;

pub use builder::ModelBuilder;
pub use checkpoints::{CheckpointManager, CheckpointName, SnapshotDelegate};
pub use config::{ManagerConfig, DEFAULT_CHECKPOINT_DIR, DEFAULT_DOCUMENT_EXTENSION};
pub use document::{DocumentCodec, DocumentError, NotebookCodec};
pub use error::{BoxError, ContentsError, ErrorClass};
pub use hooks::{PostSaveHook, PreSaveHook, SaveHook};
pub use manager::ContentsManager;
pub use writer::ContentWriter;
