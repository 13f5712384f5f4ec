use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::{DashMap, DashSet};
use odfs_contents_core::{path, BackendError, EntryInfo, EntryKind, FileHandle, FsBackend, OpenMode};
use tracing::debug;

/// A stored entry.
#[derive(Debug, Clone)]
enum Node {
    File {
        data: Vec<u8>,
        created: DateTime<Utc>,
        modified: DateTime<Utc>,
    },
    Directory {
        created: DateTime<Utc>,
        modified: DateTime<Utc>,
    },
}

/// Injected metadata fault.
#[derive(Debug, Clone)]
enum Fault {
    /// Listed by the parent, but does not exist (like a dangling symlink)
    Dangling,
    /// Exists, but metadata lookups fail
    Metadata(String),
}

/// Backend operations that can be made to fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Operation {
    ListDir,
    SetModifiedTime,
}

#[derive(Debug)]
struct Inner {
    /// Normalized path -> node. The root is stored under "".
    nodes: DashMap<String, Node>,
    faults: DashMap<String, Fault>,
    /// (path, operation) -> I/O error message
    failing: DashMap<(String, Operation), String>,
    /// Files whose truncation is silently skipped
    sticky: DashSet<String>,
    /// Last issued timestamp (nanoseconds since the epoch)
    clock: AtomicI64,
}

impl Inner {
    /// Next timestamp: wall clock, but strictly increasing across calls.
    fn tick(&self) -> DateTime<Utc> {
        let now = Utc::now().timestamp_nanos_opt().unwrap_or(0);
        let previous = self
            .clock
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |last| {
                Some(now.max(last + 1_000))
            })
            .unwrap_or(now);
        DateTime::from_timestamp_nanos(now.max(previous + 1_000))
    }

    fn check(&self, path: &str, operation: Operation) -> Result<(), BackendError> {
        match self.failing.get(&(path.to_string(), operation)) {
            Some(message) => Err(BackendError::Io(format!("{}: {}", path, message.value()))),
            None => Ok(()),
        }
    }

    fn kind_of(&self, path: &str) -> Option<EntryKind> {
        self.nodes.get(path).map(|node| match node.value() {
            Node::File { .. } => EntryKind::File,
            Node::Directory { .. } => EntryKind::Directory,
        })
    }

    fn require_parent_dir(&self, path: &str) -> Result<(), BackendError> {
        let parent = path::dirname(path);
        match self.kind_of(parent) {
            Some(EntryKind::Directory) => Ok(()),
            Some(EntryKind::File) => Err(BackendError::NotADirectory(parent.to_string())),
            None => Err(BackendError::NotFound(parent.to_string())),
        }
    }

    fn touch(&self, path: &str) {
        let now = self.tick();
        if let Some(mut node) = self.nodes.get_mut(path) {
            match node.value_mut() {
                Node::File { modified, .. } | Node::Directory { modified, .. } => *modified = now,
            }
        }
    }
}

/// In-memory backend.
///
/// Timestamps come from a clock that never repeats a value, so ordering by
/// modification time is deterministic. Faults can be injected to simulate
/// broken entries on a remote filesystem.
#[derive(Debug, Clone)]
pub struct MemoryFs {
    inner: Arc<Inner>,
}

impl Default for MemoryFs {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryFs {
    /// Create an empty backend containing only the root directory.
    pub fn new() -> Self {
        let inner = Inner {
            nodes: DashMap::new(),
            faults: DashMap::new(),
            failing: DashMap::new(),
            sticky: DashSet::new(),
            clock: AtomicI64::new(0),
        };
        let now = inner.tick();
        inner.nodes.insert(
            String::new(),
            Node::Directory {
                created: now,
                modified: now,
            },
        );
        Self {
            inner: Arc::new(inner),
        }
    }

    /// Add a name that shows up in its parent's listing but does not exist.
    pub fn add_broken_entry(&self, path: &str) -> Result<(), BackendError> {
        let path = path::normalize(path)?;
        self.inner.require_parent_dir(&path)?;
        self.inner.faults.insert(path, Fault::Dangling);
        Ok(())
    }

    /// Make metadata lookups of an existing entry fail with an I/O error.
    pub fn fail_metadata(&self, path: &str, message: &str) -> Result<(), BackendError> {
        let path = path::normalize(path)?;
        self.inner
            .faults
            .insert(path, Fault::Metadata(message.to_string()));
        Ok(())
    }

    /// Make directory listings of `path` fail with an I/O error.
    pub fn fail_list_dir(&self, path: &str, message: &str) -> Result<(), BackendError> {
        let path = path::normalize(path)?;
        self.inner
            .failing
            .insert((path, Operation::ListDir), message.to_string());
        Ok(())
    }

    /// Make modification-time updates of `path` fail with an I/O error.
    pub fn fail_set_modified_time(&self, path: &str, message: &str) -> Result<(), BackendError> {
        let path = path::normalize(path)?;
        self.inner
            .failing
            .insert((path, Operation::SetModifiedTime), message.to_string());
        Ok(())
    }

    /// Report success for truncating creates of `path` but keep its content,
    /// like a remote filesystem that drops the truncate.
    pub fn ignore_truncate(&self, path: &str) -> Result<(), BackendError> {
        let path = path::normalize(path)?;
        self.inner.sticky.insert(path);
        Ok(())
    }

    fn key(path: &str) -> Result<String, BackendError> {
        path::normalize(path)
    }

    fn is_dangling(&self, key: &str) -> bool {
        matches!(
            self.inner.faults.get(key).as_deref(),
            Some(Fault::Dangling)
        )
    }
}

#[async_trait]
impl FsBackend for MemoryFs {
    fn backend_name(&self) -> &'static str {
        "memory"
    }

    async fn exists(&self, path: &str) -> Result<bool, BackendError> {
        let key = Self::key(path)?;
        Ok(self.inner.kind_of(&key).is_some() || self.is_dangling(&key))
    }

    async fn is_dir(&self, path: &str) -> Result<bool, BackendError> {
        let key = Self::key(path)?;
        Ok(self.inner.kind_of(&key) == Some(EntryKind::Directory))
    }

    async fn is_file(&self, path: &str) -> Result<bool, BackendError> {
        let key = Self::key(path)?;
        Ok(self.inner.kind_of(&key) == Some(EntryKind::File))
    }

    async fn list_dir(&self, path: &str) -> Result<Vec<String>, BackendError> {
        let key = Self::key(path)?;
        self.inner.check(&key, Operation::ListDir)?;
        match self.inner.kind_of(&key) {
            Some(EntryKind::Directory) => {}
            Some(EntryKind::File) => return Err(BackendError::NotADirectory(key)),
            None => return Err(BackendError::NotFound(key)),
        }

        let is_child = |candidate: &str| !candidate.is_empty() && path::dirname(candidate) == key;

        let mut names: Vec<String> = self
            .inner
            .nodes
            .iter()
            .filter(|entry| is_child(entry.key()))
            .map(|entry| path::basename(entry.key()).to_string())
            .collect();

        names.extend(
            self.inner
                .faults
                .iter()
                .filter(|entry| matches!(entry.value(), Fault::Dangling) && is_child(entry.key()))
                .map(|entry| path::basename(entry.key()).to_string()),
        );

        Ok(names)
    }

    async fn get_info(&self, path: &str, detail: bool) -> Result<EntryInfo, BackendError> {
        let key = Self::key(path)?;

        if let Some(fault) = self.inner.faults.get(&key) {
            return Err(match fault.value() {
                Fault::Dangling => BackendError::NotFound(key.clone()),
                Fault::Metadata(message) => BackendError::Io(format!("{}: {}", key, message)),
            });
        }

        let node = self
            .inner
            .nodes
            .get(&key)
            .ok_or_else(|| BackendError::NotFound(key.clone()))?;

        let (kind, size, created, modified) = match node.value() {
            Node::File {
                data,
                created,
                modified,
            } => (EntryKind::File, Some(data.len() as u64), *created, *modified),
            Node::Directory { created, modified } => {
                (EntryKind::Directory, None, *created, *modified)
            }
        };

        Ok(EntryInfo {
            name: path::basename(&key).to_string(),
            kind,
            size,
            created: detail.then_some(created),
            modified: detail.then_some(modified),
        })
    }

    async fn make_dir(&self, path: &str) -> Result<(), BackendError> {
        let key = Self::key(path)?;
        if self.inner.kind_of(&key).is_some() {
            return Err(BackendError::AlreadyExists(key));
        }
        self.inner.require_parent_dir(&key)?;

        let now = self.inner.tick();
        self.inner.nodes.insert(
            key.clone(),
            Node::Directory {
                created: now,
                modified: now,
            },
        );
        self.inner.touch(path::dirname(&key));
        debug!("Created directory '{}'", key);
        Ok(())
    }

    async fn remove(&self, path: &str) -> Result<(), BackendError> {
        let key = Self::key(path)?;
        match self.inner.kind_of(&key) {
            Some(EntryKind::File) => {
                self.inner.nodes.remove(&key);
                self.inner.faults.remove(&key);
                self.inner.touch(path::dirname(&key));
                Ok(())
            }
            Some(EntryKind::Directory) => Err(BackendError::IsADirectory(key)),
            None if self.is_dangling(&key) => {
                self.inner.faults.remove(&key);
                Ok(())
            }
            None => Err(BackendError::NotFound(key)),
        }
    }

    async fn remove_tree(&self, path: &str) -> Result<(), BackendError> {
        let key = Self::key(path)?;
        match self.inner.kind_of(&key) {
            Some(EntryKind::Directory) => {}
            Some(EntryKind::File) => return Err(BackendError::NotADirectory(key)),
            None => return Err(BackendError::NotFound(key)),
        }

        let prefix = format!("{}/", key);
        let below = |candidate: &str| {
            if key.is_empty() {
                !candidate.is_empty()
            } else {
                candidate == key || candidate.starts_with(&prefix)
            }
        };
        self.inner.nodes.retain(|k, _| !below(k));
        self.inner.faults.retain(|k, _| !below(k));
        if !key.is_empty() {
            self.inner.touch(path::dirname(&key));
        }
        debug!("Removed tree '{}'", key);
        Ok(())
    }

    async fn move_entry(&self, old_path: &str, new_path: &str) -> Result<(), BackendError> {
        let old_key = Self::key(old_path)?;
        let new_key = Self::key(new_path)?;

        if self.inner.kind_of(&old_key).is_none() {
            return Err(BackendError::NotFound(old_key));
        }
        if self.inner.kind_of(&new_key).is_some() {
            return Err(BackendError::AlreadyExists(new_key));
        }
        if new_key.starts_with(&format!("{}/", old_key)) {
            return Err(BackendError::InvalidPath(new_key));
        }
        self.inner.require_parent_dir(&new_key)?;

        let prefix = format!("{}/", old_key);
        let moved: Vec<String> = self
            .inner
            .nodes
            .iter()
            .filter(|entry| entry.key() == &old_key || entry.key().starts_with(&prefix))
            .map(|entry| entry.key().clone())
            .collect();

        for key in moved {
            if let Some((_, node)) = self.inner.nodes.remove(&key) {
                let renamed = format!("{}{}", new_key, &key[old_key.len()..]);
                self.inner.nodes.insert(renamed, node);
            }
        }

        self.inner.touch(path::dirname(&old_key));
        self.inner.touch(path::dirname(&new_key));
        debug!("Moved '{}' to '{}'", old_key, new_key);
        Ok(())
    }

    async fn open(&self, path: &str, mode: OpenMode) -> Result<Box<dyn FileHandle>, BackendError> {
        let key = Self::key(path)?;
        match (self.inner.kind_of(&key), mode) {
            (Some(EntryKind::Directory), _) => return Err(BackendError::IsADirectory(key)),
            (Some(EntryKind::File), _) => {}
            (None, OpenMode::Read) => return Err(BackendError::NotFound(key)),
            (None, OpenMode::ReadWrite) => {
                self.create(&key, false).await?;
            }
        }

        Ok(Box::new(MemoryFileHandle {
            inner: self.inner.clone(),
            path: key,
            position: 0,
        }))
    }

    async fn create(&self, path: &str, truncate: bool) -> Result<bool, BackendError> {
        let key = Self::key(path)?;
        match self.inner.kind_of(&key) {
            Some(EntryKind::Directory) => Err(BackendError::IsADirectory(key)),
            Some(EntryKind::File) => {
                if truncate && !self.inner.sticky.contains(&key) {
                    let now = self.inner.tick();
                    if let Some(mut node) = self.inner.nodes.get_mut(&key) {
                        if let Node::File { data, modified, .. } = node.value_mut() {
                            data.clear();
                            *modified = now;
                        }
                    }
                }
                Ok(false)
            }
            None => {
                self.inner.require_parent_dir(&key)?;
                let now = self.inner.tick();
                self.inner.nodes.insert(
                    key.clone(),
                    Node::File {
                        data: Vec::new(),
                        created: now,
                        modified: now,
                    },
                );
                self.inner.faults.remove(&key);
                self.inner.touch(path::dirname(&key));
                Ok(true)
            }
        }
    }

    async fn set_modified_time(
        &self,
        path: &str,
        modified: DateTime<Utc>,
    ) -> Result<(), BackendError> {
        let key = Self::key(path)?;
        self.inner.check(&key, Operation::SetModifiedTime)?;
        let mut node = self
            .inner
            .nodes
            .get_mut(&key)
            .ok_or_else(|| BackendError::NotFound(key.clone()))?;
        match node.value_mut() {
            Node::File { modified: m, .. } | Node::Directory { modified: m, .. } => *m = modified,
        }
        Ok(())
    }
}

/// Open file on a [`MemoryFs`] backend.
struct MemoryFileHandle {
    inner: Arc<Inner>,
    path: String,
    position: usize,
}

#[async_trait]
impl FileHandle for MemoryFileHandle {
    async fn read_to_end(&mut self) -> Result<Vec<u8>, BackendError> {
        let node = self
            .inner
            .nodes
            .get(&self.path)
            .ok_or_else(|| BackendError::NotFound(self.path.clone()))?;
        match node.value() {
            Node::File { data, .. } => {
                let start = self.position.min(data.len());
                let out = data[start..].to_vec();
                self.position = data.len();
                Ok(out)
            }
            Node::Directory { .. } => Err(BackendError::IsADirectory(self.path.clone())),
        }
    }

    async fn write(&mut self, bytes: &[u8]) -> Result<(), BackendError> {
        let now = self.inner.tick();
        let mut node = self
            .inner
            .nodes
            .get_mut(&self.path)
            .ok_or_else(|| BackendError::NotFound(self.path.clone()))?;
        match node.value_mut() {
            Node::File { data, modified, .. } => {
                let end = self.position + bytes.len();
                if data.len() < end {
                    data.resize(end, 0);
                }
                data[self.position..end].copy_from_slice(bytes);
                self.position = end;
                *modified = now;
                Ok(())
            }
            Node::Directory { .. } => Err(BackendError::IsADirectory(self.path.clone())),
        }
    }
}
