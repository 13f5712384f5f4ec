use std::sync::Arc;

use chrono::Utc;
use odfs_contents_core::{FsBackend, OpenMode};
use serde_json::Value;
use tracing::{debug, instrument, warn};

use crate::document::DocumentCodec;
use crate::error::ContentsError;

/// Write path shared by the save pipeline and the checkpoint delegates.
#[derive(Clone)]
pub struct ContentWriter {
    backend: Arc<dyn FsBackend>,
    codec: Arc<dyn DocumentCodec>,
}

impl ContentWriter {
    pub fn new(backend: Arc<dyn FsBackend>, codec: Arc<dyn DocumentCodec>) -> Self {
        Self { backend, codec }
    }

    /// Write raw file bytes, creating the entry if absent.
    ///
    /// Without `truncate`, an existing file is updated in place: bytes past
    /// the end of `data` are left as they were.
    #[instrument(skip(self, data), level = "debug", fields(data_len = data.len()))]
    pub async fn write_file(
        &self,
        path: &str,
        data: &[u8],
        truncate: bool,
    ) -> Result<(), ContentsError> {
        let created = self.backend.create(path, truncate).await?;
        let mut handle = self.backend.open(path, OpenMode::ReadWrite).await?;
        handle.write(data).await?;
        debug!(created, "Wrote {} bytes to {}", data.len(), path);
        Ok(())
    }

    /// Serialize and write a document, replacing any previous content.
    #[instrument(skip(self, document), level = "debug")]
    pub async fn write_document(&self, path: &str, document: &Value) -> Result<(), ContentsError> {
        let bytes = self.codec.serialize(document)?;

        self.backend.create(path, true).await?;
        let leftover = self.backend.read_all(path).await?.len();
        if leftover != 0 {
            warn!(
                path,
                leftover, "Document still has content after truncation, writing anyway"
            );
        }

        {
            let mut handle = self.backend.open(path, OpenMode::ReadWrite).await?;
            handle.write(&bytes).await?;
        }

        // Backends with coarse clocks can report an mtime earlier than the
        // write, which clients read as "changed on disk".
        if let Err(e) = self.backend.set_modified_time(path, Utc::now()).await {
            warn!(path, "Failed to correct modification time: {}", e);
        }

        debug!("Wrote document {} ({} bytes)", path, bytes.len());
        Ok(())
    }

    /// Create a directory unless one already exists at `path`.
    #[instrument(skip(self), level = "debug")]
    pub async fn ensure_directory(&self, path: &str) -> Result<(), ContentsError> {
        if self.backend.is_dir(path).await? {
            return Ok(());
        }
        if self.backend.exists(path).await? {
            return Err(ContentsError::Conflict(format!(
                "{} already exists and is not a directory",
                path
            )));
        }
        self.backend.make_dir(path).await?;
        debug!("Created directory {}", path);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::NotebookCodec;
    use odfs_contents_local::MemoryFs;
    use serde_json::json;

    fn setup() -> (ContentWriter, Arc<MemoryFs>) {
        let fs = Arc::new(MemoryFs::new());
        let writer = ContentWriter::new(fs.clone(), Arc::new(NotebookCodec::default()));
        (writer, fs)
    }

    #[tokio::test]
    async fn test_write_file_without_truncate_updates_in_place() {
        let (writer, fs) = setup();
        writer.write_file("a.txt", b"hello world", false).await.unwrap();
        writer.write_file("a.txt", b"HELLO", false).await.unwrap();
        assert_eq!(fs.read_all("a.txt").await.unwrap(), b"HELLO world");
    }

    #[tokio::test]
    async fn test_write_file_with_truncate_replaces() {
        let (writer, fs) = setup();
        writer.write_file("a.txt", b"hello world", true).await.unwrap();
        writer.write_file("a.txt", b"HELLO", true).await.unwrap();
        assert_eq!(fs.read_all("a.txt").await.unwrap(), b"HELLO");
    }

    #[tokio::test]
    async fn test_write_document_replaces_longer_content() {
        let (writer, fs) = setup();
        let long = json!({"cells": [], "metadata": {"padding": "x".repeat(200)},
                          "nbformat": 4, "nbformat_minor": 5});
        let short = json!({"cells": [], "metadata": {}, "nbformat": 4, "nbformat_minor": 5});

        writer.write_document("n.ipynb", &long).await.unwrap();
        writer.write_document("n.ipynb", &short).await.unwrap();

        let stored = fs.read_all("n.ipynb").await.unwrap();
        assert_eq!(stored, NotebookCodec::default().serialize(&short).unwrap());
    }

    #[tokio::test]
    async fn test_write_document_continues_after_ignored_truncate() {
        let (writer, fs) = setup();
        let document = json!({"cells": [], "metadata": {}, "nbformat": 4, "nbformat_minor": 5});
        fs.write_all("n.ipynb", b"{}").await.unwrap();
        fs.ignore_truncate("n.ipynb").unwrap();

        writer.write_document("n.ipynb", &document).await.unwrap();

        let stored = fs.read_all("n.ipynb").await.unwrap();
        assert_eq!(stored, NotebookCodec::default().serialize(&document).unwrap());
    }

    #[tokio::test]
    async fn test_write_document_survives_mtime_failure() {
        let (writer, fs) = setup();
        let old = json!({"cells": [], "metadata": {"padding": "x".repeat(64)},
                         "nbformat": 4, "nbformat_minor": 5});
        let new = json!({"cells": [], "metadata": {}, "nbformat": 4, "nbformat_minor": 5});
        writer.write_document("n.ipynb", &old).await.unwrap();
        fs.fail_set_modified_time("n.ipynb", "read-only metadata").unwrap();

        writer.write_document("n.ipynb", &new).await.unwrap();

        let stored = fs.read_all("n.ipynb").await.unwrap();
        assert_eq!(stored, NotebookCodec::default().serialize(&new).unwrap());
        assert!(fs.set_modified_time("n.ipynb", Utc::now()).await.is_err());
    }

    #[tokio::test]
    async fn test_ensure_directory() {
        let (writer, fs) = setup();
        writer.ensure_directory("d").await.unwrap();
        writer.ensure_directory("d").await.unwrap();
        assert!(fs.is_dir("d").await.unwrap());

        fs.write_all("f", b"x").await.unwrap();
        let result = writer.ensure_directory("f").await;
        assert!(matches!(result, Err(ContentsError::Conflict(_))));
    }
}
