//! Checkpoint Manager: point-in-time snapshots of files and documents.
//!
//! A checkpoint of `dir/name` lives at `dir/<checkpoint_dir>/name.<id>`, where
//! `<id>` is a hyphenated UUID. All documents of a directory share one hidden
//! checkpoint directory; the owner's base name prefix tells them apart.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use odfs_contents_core::{
    path, BackendError, CheckpointContent, CheckpointModel, FileFormat, FsBackend, Listing,
    OpenMode, SkipReason, SnapshotKind,
};
use serde_json::Value;
use tracing::{debug, instrument, warn};
use uuid::Uuid;

use crate::codec;
use crate::document::DocumentCodec;
use crate::error::ContentsError;
use crate::writer::ContentWriter;

/// Length of a hyphenated UUID, the only accepted checkpoint id form.
const ID_LEN: usize = uuid::fmt::Hyphenated::LENGTH;

/// A parsed checkpoint file name: `<owner>.<id>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CheckpointName<'a> {
    pub owner: &'a str,
    pub id: &'a str,
}

impl<'a> CheckpointName<'a> {
    /// Parse a checkpoint file name. Anything but a non-empty owner followed
    /// by a dot and a hyphenated UUID is rejected.
    pub fn parse(file_name: &'a str) -> Option<Self> {
        let (owner, id) = file_name.rsplit_once('.')?;
        if owner.is_empty() || !is_checkpoint_id(id) {
            return None;
        }
        Some(Self { owner, id })
    }
}

/// Whether `id` has the form of a checkpoint id.
pub fn is_checkpoint_id(id: &str) -> bool {
    id.len() == ID_LEN && Uuid::parse_str(id).is_ok()
}

/// Reads and writes the content of one kind of snapshot.
#[async_trait]
pub trait SnapshotDelegate: Send + Sync {
    async fn write(&self, storage_path: &str, content: &CheckpointContent)
        -> Result<(), ContentsError>;

    async fn read(&self, storage_path: &str) -> Result<CheckpointContent, ContentsError>;
}

/// Snapshots of regular files, stored as raw bytes.
pub struct FileSnapshots {
    backend: Arc<dyn FsBackend>,
    writer: ContentWriter,
}

#[async_trait]
impl SnapshotDelegate for FileSnapshots {
    async fn write(
        &self,
        storage_path: &str,
        content: &CheckpointContent,
    ) -> Result<(), ContentsError> {
        let text = content.content.as_str().ok_or_else(|| {
            ContentsError::bad_request("File checkpoint content must be a string")
        })?;
        let format = content.format.unwrap_or(FileFormat::Text);
        let bytes = codec::encode_for_write(text, Some(format.as_str()))?;
        self.writer.write_file(storage_path, &bytes, true).await
    }

    async fn read(&self, storage_path: &str) -> Result<CheckpointContent, ContentsError> {
        let bytes = {
            let mut handle = self.backend.open(storage_path, OpenMode::Read).await?;
            handle.read_to_end().await?
        };
        let (content, format) = codec::decode_for_read(bytes, None)?;
        Ok(CheckpointContent {
            kind: SnapshotKind::File,
            content: Value::String(content),
            format: Some(format),
        })
    }
}

/// Snapshots of documents, stored in the document's own serialization.
pub struct DocumentSnapshots {
    backend: Arc<dyn FsBackend>,
    codec: Arc<dyn DocumentCodec>,
    writer: ContentWriter,
}

#[async_trait]
impl SnapshotDelegate for DocumentSnapshots {
    async fn write(
        &self,
        storage_path: &str,
        content: &CheckpointContent,
    ) -> Result<(), ContentsError> {
        self.writer
            .write_document(storage_path, &content.content)
            .await
    }

    async fn read(&self, storage_path: &str) -> Result<CheckpointContent, ContentsError> {
        let bytes = self.backend.read_all(storage_path).await?;
        let document = self.codec.parse(&bytes)?;
        Ok(CheckpointContent {
            kind: SnapshotKind::Document,
            content: document,
            format: None,
        })
    }
}

/// Creates, lists, retrieves, renames and deletes checkpoints.
pub struct CheckpointManager {
    backend: Arc<dyn FsBackend>,
    writer: ContentWriter,
    checkpoint_dir: String,
    files: FileSnapshots,
    documents: DocumentSnapshots,
}

impl CheckpointManager {
    pub fn new(
        backend: Arc<dyn FsBackend>,
        codec: Arc<dyn DocumentCodec>,
        writer: ContentWriter,
        checkpoint_dir: impl Into<String>,
    ) -> Self {
        Self {
            files: FileSnapshots {
                backend: backend.clone(),
                writer: writer.clone(),
            },
            documents: DocumentSnapshots {
                backend: backend.clone(),
                codec,
                writer: writer.clone(),
            },
            backend,
            writer,
            checkpoint_dir: checkpoint_dir.into(),
        }
    }

    fn delegate(&self, kind: SnapshotKind) -> &dyn SnapshotDelegate {
        match kind {
            SnapshotKind::File => &self.files,
            SnapshotKind::Document => &self.documents,
        }
    }

    /// Hidden checkpoint directory next to `owner_path`.
    pub fn checkpoint_dir_for(&self, owner_path: &str) -> String {
        path::join(path::dirname(owner_path), &self.checkpoint_dir)
    }

    /// Storage path of checkpoint `id` of `owner_path`.
    pub fn checkpoint_path(&self, owner_path: &str, id: &str) -> String {
        let name = format!("{}.{}", path::basename(owner_path), id);
        path::join(&self.checkpoint_dir_for(owner_path), &name)
    }

    fn resolve(&self, owner_path: &str, id: &str) -> Result<String, ContentsError> {
        if !is_checkpoint_id(id) {
            return Err(ContentsError::NotFound(format!(
                "checkpoint {} for {}",
                id, owner_path
            )));
        }
        Ok(self.checkpoint_path(owner_path, id))
    }

    /// Take a new snapshot of `owner_path`.
    #[instrument(skip(self, content), level = "debug", fields(kind = ?content.kind))]
    pub async fn create(
        &self,
        owner_path: &str,
        content: &CheckpointContent,
    ) -> Result<CheckpointModel, ContentsError> {
        self.writer
            .ensure_directory(&self.checkpoint_dir_for(owner_path))
            .await?;

        let id = Uuid::new_v4().to_string();
        let storage = self.checkpoint_path(owner_path, &id);
        self.delegate(content.kind).write(&storage, content).await?;

        let last_modified = match self.backend.get_info(&storage, true).await {
            Ok(info) => info.modified.unwrap_or_else(Utc::now),
            Err(e) => {
                warn!(path = %storage, "Checkpoint written but metadata unavailable: {}", e);
                Utc::now()
            }
        };

        debug!("Created checkpoint {} for {}", id, owner_path);
        Ok(CheckpointModel { id, last_modified })
    }

    /// Content of checkpoint `id` of `owner_path`.
    #[instrument(skip(self), level = "debug")]
    pub async fn get(
        &self,
        owner_path: &str,
        id: &str,
        kind: SnapshotKind,
    ) -> Result<CheckpointContent, ContentsError> {
        let storage = self.resolve(owner_path, id)?;
        if !self.backend.is_file(&storage).await? {
            return Err(ContentsError::NotFound(format!(
                "checkpoint {} for {}",
                id, owner_path
            )));
        }
        self.delegate(kind).read(&storage).await
    }

    /// Checkpoints of `owner_path`, oldest first.
    ///
    /// A missing checkpoint directory yields an empty listing. Entries of
    /// other owners are ignored; entries whose names cannot be parsed or whose
    /// metadata cannot be read are reported in `skipped`.
    #[instrument(skip(self), level = "debug")]
    pub async fn list(&self, owner_path: &str) -> Result<Listing<CheckpointModel>, ContentsError> {
        let dir = self.checkpoint_dir_for(owner_path);
        let mut listing = Listing::new();
        if !self.backend.is_dir(&dir).await? {
            return Ok(listing);
        }

        let owner = path::basename(owner_path);
        let owner_prefix = format!("{}.", owner);
        for file_name in self.backend.list_dir(&dir).await? {
            // The directory is shared by every entry of the parent.
            if !file_name.starts_with(&owner_prefix) {
                continue;
            }
            let storage = path::join(&dir, &file_name);
            let Some(parsed) = CheckpointName::parse(&file_name) else {
                warn!(path = %storage, "Skipping malformed checkpoint name");
                listing.skip(storage, SkipReason::MalformedName);
                continue;
            };
            if parsed.owner != owner {
                continue;
            }

            match self.backend.get_info(&storage, true).await {
                Ok(info) => listing.push(CheckpointModel {
                    id: parsed.id.to_string(),
                    last_modified: info.modified.unwrap_or_else(Utc::now),
                }),
                Err(BackendError::NotFound(_)) => {
                    warn!(path = %storage, "Skipping checkpoint that no longer exists");
                    listing.skip(storage, SkipReason::Missing);
                }
                Err(e) => {
                    warn!(path = %storage, "Skipping checkpoint with unreadable metadata: {}", e);
                    listing.skip(storage, SkipReason::Metadata(e.to_string()));
                }
            }
        }

        listing
            .items
            .sort_by(|a, b| (a.last_modified, &a.id).cmp(&(b.last_modified, &b.id)));

        debug!(
            "Listed {} checkpoints for {}",
            listing.items.len(),
            owner_path
        );
        Ok(listing)
    }

    /// Move checkpoint `id` from `old_owner` to `new_owner`.
    #[instrument(skip(self), level = "debug")]
    pub async fn rename(
        &self,
        id: &str,
        old_owner: &str,
        new_owner: &str,
    ) -> Result<(), ContentsError> {
        let old_storage = self.resolve(old_owner, id)?;
        let new_storage = self.resolve(new_owner, id)?;
        if path::dirname(old_owner) != path::dirname(new_owner) {
            self.writer
                .ensure_directory(&self.checkpoint_dir_for(new_owner))
                .await?;
        }
        self.backend.move_entry(&old_storage, &new_storage).await?;
        Ok(())
    }

    /// Move every checkpoint of `old_owner` to `new_owner`.
    pub async fn rename_all(&self, old_owner: &str, new_owner: &str) -> Result<(), ContentsError> {
        let listing = self.list(old_owner).await?;
        for checkpoint in &listing.items {
            self.rename(&checkpoint.id, old_owner, new_owner).await?;
        }
        Ok(())
    }

    /// Remove checkpoint `id` of `owner_path`.
    #[instrument(skip(self), level = "debug")]
    pub async fn delete(&self, owner_path: &str, id: &str) -> Result<(), ContentsError> {
        let storage = self.resolve(owner_path, id)?;
        self.backend.remove(&storage).await?;
        debug!("Deleted checkpoint {} for {}", id, owner_path);
        Ok(())
    }

    /// Remove every checkpoint of `owner_path`, logging individual failures.
    pub async fn delete_all(&self, owner_path: &str) -> Result<(), ContentsError> {
        let listing = self.list(owner_path).await?;
        for checkpoint in &listing.items {
            if let Err(e) = self.delete(owner_path, &checkpoint.id).await {
                warn!("Failed to delete checkpoint {}: {}", checkpoint.id, e);
            }
        }
        Ok(())
    }
}
