use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::BackendError;

/// Kind of a backend entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    File,
    Directory,
}

/// Metadata about a single backend entry.
///
/// Timestamps are only filled in when details were requested and the backend
/// can provide them.
#[derive(Debug, Clone)]
pub struct EntryInfo {
    /// Final path segment
    pub name: String,
    /// File or directory
    pub kind: EntryKind,
    /// Size in bytes (None for directories or when unknown)
    pub size: Option<u64>,
    /// Creation time, if the backend tracks it
    pub created: Option<DateTime<Utc>>,
    /// Last modification time
    pub modified: Option<DateTime<Utc>>,
}

impl EntryInfo {
    pub fn is_dir(&self) -> bool {
        self.kind == EntryKind::Directory
    }
}

/// Mode used to open a file handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenMode {
    /// Read-only. The entry must exist.
    Read,
    /// Read-write, positioned at the start, creating the entry if absent.
    /// Existing content is not truncated.
    ReadWrite,
}

/// An open file on a backend.
///
/// The handle is released when dropped, so it never outlives the operation
/// that opened it, whichever way that operation exits.
#[async_trait]
pub trait FileHandle: Send {
    /// Read everything from the current position to the end.
    async fn read_to_end(&mut self) -> Result<Vec<u8>, BackendError>;

    /// Write all bytes at the current position and flush them to the backend.
    async fn write(&mut self, data: &[u8]) -> Result<(), BackendError>;
}

/// Capability contract of a filesystem backend.
///
/// Paths are normalized API paths: `/`-separated, relative to the backend
/// root, with the empty string naming the root itself (see [`crate::path`]).
#[async_trait]
pub trait FsBackend: Send + Sync {
    /// Short backend identifier used in logs.
    fn backend_name(&self) -> &'static str;

    /// True iff any entry is present at `path`, including one whose metadata
    /// cannot be resolved (e.g. a dangling symlink).
    async fn exists(&self, path: &str) -> Result<bool, BackendError>;

    /// True iff `path` is a directory. False for missing paths.
    async fn is_dir(&self, path: &str) -> Result<bool, BackendError>;

    /// True iff `path` is a regular file. False for missing paths.
    async fn is_file(&self, path: &str) -> Result<bool, BackendError>;

    /// Names of the immediate children of a directory, in no particular order.
    async fn list_dir(&self, path: &str) -> Result<Vec<String>, BackendError>;

    /// Metadata of an entry. Fails with `BackendError::NotFound` if absent.
    ///
    /// With `detail = false` only the name and kind are guaranteed.
    async fn get_info(&self, path: &str, detail: bool) -> Result<EntryInfo, BackendError>;

    /// Create a directory. Fails if the parent is missing or if `path` exists.
    async fn make_dir(&self, path: &str) -> Result<(), BackendError>;

    /// Remove a single file.
    async fn remove(&self, path: &str) -> Result<(), BackendError>;

    /// Remove a directory and everything below it.
    async fn remove_tree(&self, path: &str) -> Result<(), BackendError>;

    /// Move or rename an entry.
    async fn move_entry(&self, old_path: &str, new_path: &str) -> Result<(), BackendError>;

    /// Open a file handle.
    async fn open(&self, path: &str, mode: OpenMode) -> Result<Box<dyn FileHandle>, BackendError>;

    /// Create an empty file, truncating existing content when `truncate` is
    /// set. Returns true if a new entry was created.
    async fn create(&self, path: &str, truncate: bool) -> Result<bool, BackendError>;

    /// Best-effort correction of an entry's modification time.
    async fn set_modified_time(
        &self,
        path: &str,
        modified: DateTime<Utc>,
    ) -> Result<(), BackendError>;

    /// Read the whole content of a file.
    async fn read_all(&self, path: &str) -> Result<Vec<u8>, BackendError> {
        let mut handle = self.open(path, OpenMode::Read).await?;
        handle.read_to_end().await
    }

    /// Replace the whole content of a file, creating it if absent.
    async fn write_all(&self, path: &str, data: &[u8]) -> Result<(), BackendError> {
        self.create(path, true).await?;
        let mut handle = self.open(path, OpenMode::ReadWrite).await?;
        handle.write(data).await
    }
}
