use std::io::ErrorKind;
use std::path::PathBuf;
use std::time::SystemTime;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use odfs_contents_core::{path, BackendError, EntryInfo, EntryKind, FileHandle, FsBackend, OpenMode};
use tokio::fs;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tracing::{debug, instrument};

use crate::config::LocalFsConfig;

/// Backend over a directory tree on a mounted filesystem.
///
/// Every API path is resolved below the configured root; normalization
/// rejects `..` so nothing outside the root is reachable.
#[derive(Debug, Clone)]
pub struct LocalFs {
    root: PathBuf,
}

impl LocalFs {
    /// Validate the configuration and bind a backend to its root.
    pub fn new(config: LocalFsConfig) -> Result<Self, BackendError> {
        let root = config.root;
        let root_display = root.display().to_string();

        if !root.exists() {
            if !config.create_root {
                return Err(BackendError::NotFound(root_display));
            }
            std::fs::create_dir_all(&root).map_err(|e| BackendError::from_io(&root_display, e))?;
            debug!("Created backend root {}", root_display);
        }

        if !root.is_dir() {
            return Err(BackendError::NotADirectory(root_display));
        }

        Ok(Self { root })
    }

    /// The directory this backend is bound to.
    pub fn root(&self) -> &std::path::Path {
        &self.root
    }

    fn resolve(&self, api_path: &str) -> Result<PathBuf, BackendError> {
        let normalized = path::normalize(api_path)?;
        if normalized.is_empty() {
            Ok(self.root.clone())
        } else {
            Ok(self.root.join(normalized))
        }
    }

    async fn metadata(&self, api_path: &str) -> Result<Option<std::fs::Metadata>, BackendError> {
        let full = self.resolve(api_path)?;
        match fs::metadata(&full).await {
            Ok(meta) => Ok(Some(meta)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(BackendError::from_io(api_path, e)),
        }
    }
}

fn to_utc(time: std::io::Result<SystemTime>) -> Option<DateTime<Utc>> {
    time.ok().map(DateTime::<Utc>::from)
}

#[async_trait]
impl FsBackend for LocalFs {
    fn backend_name(&self) -> &'static str {
        "local"
    }

    /// Does not follow symlinks, so a dangling link still exists and can be
    /// removed or replaced.
    async fn exists(&self, path: &str) -> Result<bool, BackendError> {
        let full = self.resolve(path)?;
        match fs::symlink_metadata(&full).await {
            Ok(_) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(BackendError::from_io(path, e)),
        }
    }

    async fn is_dir(&self, path: &str) -> Result<bool, BackendError> {
        Ok(self
            .metadata(path)
            .await?
            .map(|m| m.is_dir())
            .unwrap_or(false))
    }

    async fn is_file(&self, path: &str) -> Result<bool, BackendError> {
        Ok(self
            .metadata(path)
            .await?
            .map(|m| m.is_file())
            .unwrap_or(false))
    }

    #[instrument(skip(self), level = "debug")]
    async fn list_dir(&self, path: &str) -> Result<Vec<String>, BackendError> {
        let full = self.resolve(path)?;
        let mut read_dir = fs::read_dir(&full)
            .await
            .map_err(|e| BackendError::from_io(path, e))?;

        let mut names = Vec::new();
        while let Some(entry) = read_dir
            .next_entry()
            .await
            .map_err(|e| BackendError::from_io(path, e))?
        {
            names.push(entry.file_name().to_string_lossy().to_string());
        }

        debug!("Listed {} entries in '{}'", names.len(), path);
        Ok(names)
    }

    async fn get_info(&self, path: &str, detail: bool) -> Result<EntryInfo, BackendError> {
        let meta = self
            .metadata(path)
            .await?
            .ok_or_else(|| BackendError::NotFound(path.to_string()))?;

        let kind = if meta.is_dir() {
            EntryKind::Directory
        } else {
            EntryKind::File
        };

        let (created, modified) = if detail {
            (to_utc(meta.created()), to_utc(meta.modified()))
        } else {
            (None, None)
        };

        Ok(EntryInfo {
            name: path::basename(path).to_string(),
            kind,
            size: (kind == EntryKind::File).then(|| meta.len()),
            created,
            modified,
        })
    }

    #[instrument(skip(self), level = "debug")]
    async fn make_dir(&self, path: &str) -> Result<(), BackendError> {
        let full = self.resolve(path)?;
        fs::create_dir(&full)
            .await
            .map_err(|e| BackendError::from_io(path, e))
    }

    #[instrument(skip(self), level = "debug")]
    async fn remove(&self, path: &str) -> Result<(), BackendError> {
        if self.is_dir(path).await? {
            return Err(BackendError::IsADirectory(path.to_string()));
        }
        let full = self.resolve(path)?;
        fs::remove_file(&full)
            .await
            .map_err(|e| BackendError::from_io(path, e))
    }

    #[instrument(skip(self), level = "debug")]
    async fn remove_tree(&self, path: &str) -> Result<(), BackendError> {
        let full = self.resolve(path)?;
        fs::remove_dir_all(&full)
            .await
            .map_err(|e| BackendError::from_io(path, e))
    }

    #[instrument(skip(self), level = "debug")]
    async fn move_entry(&self, old_path: &str, new_path: &str) -> Result<(), BackendError> {
        if self.exists(new_path).await? {
            return Err(BackendError::AlreadyExists(new_path.to_string()));
        }
        let from = self.resolve(old_path)?;
        let to = self.resolve(new_path)?;
        fs::rename(&from, &to)
            .await
            .map_err(|e| BackendError::from_io(old_path, e))
    }

    async fn open(&self, path: &str, mode: OpenMode) -> Result<Box<dyn FileHandle>, BackendError> {
        let full = self.resolve(path)?;
        let file = match mode {
            OpenMode::Read => fs::File::open(&full).await,
            OpenMode::ReadWrite => {
                fs::OpenOptions::new()
                    .read(true)
                    .write(true)
                    .create(true)
                    .truncate(false)
                    .open(&full)
                    .await
            }
        }
        .map_err(|e| BackendError::from_io(path, e))?;

        Ok(Box::new(LocalFileHandle {
            path: path.to_string(),
            file,
        }))
    }

    #[instrument(skip(self), level = "debug")]
    async fn create(&self, path: &str, truncate: bool) -> Result<bool, BackendError> {
        match self.metadata(path).await? {
            Some(meta) if meta.is_dir() => Err(BackendError::IsADirectory(path.to_string())),
            Some(_) => {
                if truncate {
                    let full = self.resolve(path)?;
                    fs::OpenOptions::new()
                        .write(true)
                        .truncate(true)
                        .open(&full)
                        .await
                        .map_err(|e| BackendError::from_io(path, e))?;
                }
                Ok(false)
            }
            None => {
                let full = self.resolve(path)?;
                fs::File::create(&full)
                    .await
                    .map_err(|e| BackendError::from_io(path, e))?;
                Ok(true)
            }
        }
    }

    async fn set_modified_time(
        &self,
        path: &str,
        modified: DateTime<Utc>,
    ) -> Result<(), BackendError> {
        let full = self.resolve(path)?;
        let api_path = path.to_string();
        tokio::task::spawn_blocking(move || {
            let file = std::fs::OpenOptions::new()
                .write(true)
                .open(&full)
                .map_err(|e| BackendError::from_io(&api_path, e))?;
            file.set_modified(SystemTime::from(modified))
                .map_err(|e| BackendError::from_io(&api_path, e))
        })
        .await
        .map_err(|e| BackendError::Io(format!("set_modified_time task failed: {}", e)))?
    }
}

/// Open file on a [`LocalFs`] backend.
struct LocalFileHandle {
    path: String,
    file: fs::File,
}

#[async_trait]
impl FileHandle for LocalFileHandle {
    async fn read_to_end(&mut self) -> Result<Vec<u8>, BackendError> {
        let mut buf = Vec::new();
        self.file
            .read_to_end(&mut buf)
            .await
            .map_err(|e| BackendError::from_io(&self.path, e))?;
        Ok(buf)
    }

    async fn write(&mut self, data: &[u8]) -> Result<(), BackendError> {
        self.file
            .write_all(data)
            .await
            .map_err(|e| BackendError::from_io(&self.path, e))?;
        self.file
            .flush()
            .await
            .map_err(|e| BackendError::from_io(&self.path, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn setup() -> (LocalFs, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let backend = LocalFs::new(LocalFsConfig::new(temp_dir.path())).unwrap();
        (backend, temp_dir)
    }

    #[test]
    fn test_missing_root_rejected_unless_created() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path().join("space1").join("work");

        let result = LocalFs::new(LocalFsConfig::new(&root));
        assert!(matches!(result, Err(BackendError::NotFound(_))));

        let backend = LocalFs::new(LocalFsConfig::new(&root).with_create_root(true)).unwrap();
        assert_eq!(backend.root(), root.as_path());
        assert!(root.is_dir());
    }

    #[tokio::test]
    async fn test_create_write_read() {
        let (backend, _temp_dir) = setup();

        assert!(!backend.exists("a.txt").await.unwrap());
        assert!(backend.create("a.txt", false).await.unwrap());
        assert!(backend.is_file("a.txt").await.unwrap());
        assert!(!backend.is_dir("a.txt").await.unwrap());

        backend.write_all("a.txt", b"hello").await.unwrap();
        assert_eq!(backend.read_all("a.txt").await.unwrap(), b"hello");

        let info = backend.get_info("a.txt", true).await.unwrap();
        assert_eq!(info.kind, EntryKind::File);
        assert_eq!(info.size, Some(5));
        assert!(info.modified.is_some());
    }

    #[tokio::test]
    async fn test_read_write_handle_does_not_truncate() {
        let (backend, _temp_dir) = setup();
        backend.write_all("a.txt", b"abcdef").await.unwrap();

        {
            let mut handle = backend.open("a.txt", OpenMode::ReadWrite).await.unwrap();
            handle.write(b"XY").await.unwrap();
        }

        assert_eq!(backend.read_all("a.txt").await.unwrap(), b"XYcdef");
    }

    #[tokio::test]
    async fn test_create_with_truncate() {
        let (backend, _temp_dir) = setup();
        backend.write_all("a.txt", b"abcdef").await.unwrap();

        assert!(!backend.create("a.txt", true).await.unwrap());
        assert!(backend.read_all("a.txt").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_directories() {
        let (backend, _temp_dir) = setup();

        backend.make_dir("d").await.unwrap();
        backend.write_all("d/x.txt", b"x").await.unwrap();
        assert!(backend.is_dir("d").await.unwrap());
        assert!(backend.make_dir("d").await.is_err());
        assert!(matches!(
            backend.make_dir("missing/child").await,
            Err(BackendError::NotFound(_))
        ));

        let names = backend.list_dir("d").await.unwrap();
        assert_eq!(names, vec!["x.txt".to_string()]);

        assert!(matches!(
            backend.remove("d").await,
            Err(BackendError::IsADirectory(_))
        ));
        backend.remove_tree("d").await.unwrap();
        assert!(!backend.exists("d").await.unwrap());
    }

    #[tokio::test]
    async fn test_move_refuses_existing_target() {
        let (backend, _temp_dir) = setup();
        backend.write_all("a.txt", b"a").await.unwrap();
        backend.write_all("b.txt", b"b").await.unwrap();

        assert!(matches!(
            backend.move_entry("a.txt", "b.txt").await,
            Err(BackendError::AlreadyExists(_))
        ));

        backend.move_entry("a.txt", "c.txt").await.unwrap();
        assert!(!backend.exists("a.txt").await.unwrap());
        assert_eq!(backend.read_all("c.txt").await.unwrap(), b"a");
    }

    #[tokio::test]
    async fn test_missing_entry_reports_not_found() {
        let (backend, _temp_dir) = setup();

        let err = backend.get_info("nope", true).await.unwrap_err();
        assert!(err.is_not_found());
        let err = backend.remove("nope").await.unwrap_err();
        assert!(err.is_not_found());
        assert!(backend.resolve("../escape").is_err());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_dangling_symlink_exists_and_can_be_removed() {
        let (backend, temp_dir) = setup();
        std::os::unix::fs::symlink(
            temp_dir.path().join("gone.txt"),
            temp_dir.path().join("link.txt"),
        )
        .unwrap();

        assert!(backend.exists("link.txt").await.unwrap());
        assert!(!backend.is_file("link.txt").await.unwrap());
        assert!(backend.get_info("link.txt", true).await.unwrap_err().is_not_found());

        backend.remove("link.txt").await.unwrap();
        assert!(!backend.exists("link.txt").await.unwrap());
    }

    #[tokio::test]
    async fn test_set_modified_time() {
        let (backend, _temp_dir) = setup();
        backend.write_all("a.txt", b"a").await.unwrap();

        let target = DateTime::parse_from_rfc3339("2020-01-02T03:04:05Z")
            .unwrap()
            .with_timezone(&Utc);
        backend.set_modified_time("a.txt", target).await.unwrap();

        let info = backend.get_info("a.txt", true).await.unwrap();
        assert_eq!(info.modified, Some(target));
    }
}
