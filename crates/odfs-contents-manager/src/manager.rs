use std::sync::Arc;

use odfs_contents_core::{
    path, CheckpointContent, CheckpointModel, Content, ContentModel, ContentType, FsBackend,
    Listing, SaveModel, SnapshotKind,
};
use tracing::{debug, info, instrument, warn};

use crate::builder::ModelBuilder;
use crate::checkpoints::CheckpointManager;
use crate::config::ManagerConfig;
use crate::document::{DocumentCodec, NotebookCodec};
use crate::error::ContentsError;
use crate::hooks::{PostSaveHook, PreSaveHook, SaveHook};
use crate::writer::ContentWriter;

/// Jupyter-style contents API over a filesystem backend.
///
/// Maps backend entries to [`ContentModel`]s, saves submitted models and
/// manages checkpoints. Holds no state besides its components, so a single
/// instance can serve concurrent requests.
pub struct ContentsManager {
    pub(crate) backend: Arc<dyn FsBackend>,
    pub(crate) config: ManagerConfig,
    pub(crate) codec: Arc<dyn DocumentCodec>,
    pub(crate) builder: ModelBuilder,
    pub(crate) writer: ContentWriter,
    pub(crate) checkpoints: CheckpointManager,
    pub(crate) pre_save_hook: Option<PreSaveHook>,
    pub(crate) post_save_hook: Option<PostSaveHook>,
}

impl ContentsManager {
    /// Create a manager with the default notebook codec.
    pub fn new(backend: Arc<dyn FsBackend>, config: ManagerConfig) -> Result<Self, ContentsError> {
        config.validate()?;
        let codec: Arc<dyn DocumentCodec> =
            Arc::new(NotebookCodec::new(config.signing_secret.clone()));
        debug!(
            backend = backend.backend_name(),
            checkpoint_dir = %config.checkpoint_dir,
            "Creating contents manager"
        );
        Ok(Self::assemble(backend, config, codec))
    }

    fn assemble(
        backend: Arc<dyn FsBackend>,
        config: ManagerConfig,
        codec: Arc<dyn DocumentCodec>,
    ) -> Self {
        let writer = ContentWriter::new(backend.clone(), codec.clone());
        let builder = ModelBuilder::new(
            backend.clone(),
            codec.clone(),
            config.document_extension.clone(),
        );
        let checkpoints = CheckpointManager::new(
            backend.clone(),
            codec.clone(),
            writer.clone(),
            config.checkpoint_dir.clone(),
        );
        Self {
            backend,
            config,
            codec,
            builder,
            writer,
            checkpoints,
            pre_save_hook: None,
            post_save_hook: None,
        }
    }

    /// Replace the document codec.
    pub fn with_document_codec(self, codec: Arc<dyn DocumentCodec>) -> Self {
        let mut manager = Self::assemble(self.backend, self.config, codec);
        manager.pre_save_hook = self.pre_save_hook;
        manager.post_save_hook = self.post_save_hook;
        manager
    }

    pub fn with_pre_save_hook(mut self, hook: impl SaveHook<SaveModel> + 'static) -> Self {
        self.pre_save_hook = Some(Arc::new(hook));
        self
    }

    pub fn with_post_save_hook(mut self, hook: impl SaveHook<ContentModel> + 'static) -> Self {
        self.post_save_hook = Some(Arc::new(hook));
        self
    }

    pub fn config(&self) -> &ManagerConfig {
        &self.config
    }

    pub fn checkpoint_manager(&self) -> &CheckpointManager {
        &self.checkpoints
    }

    // =========================================================================
    // Models
    // =========================================================================

    /// Model of `path`, with content when `include_content` is set.
    #[instrument(skip(self), level = "debug")]
    pub async fn get(
        &self,
        path: &str,
        include_content: bool,
        content_type: Option<ContentType>,
        format: Option<&str>,
    ) -> Result<ContentModel, ContentsError> {
        let path = path::normalize(path)?;
        self.builder
            .get(&path, include_content, content_type, format)
            .await
    }

    pub async fn exists(&self, path: &str) -> Result<bool, ContentsError> {
        let path = path::normalize(path)?;
        Ok(self.backend.exists(&path).await?)
    }

    pub async fn file_exists(&self, path: &str) -> Result<bool, ContentsError> {
        let path = path::normalize(path)?;
        Ok(self.backend.is_file(&path).await?)
    }

    pub async fn dir_exists(&self, path: &str) -> Result<bool, ContentsError> {
        let path = path::normalize(path)?;
        Ok(self.backend.is_dir(&path).await?)
    }

    /// Whether `path` or one of its ancestors is hidden.
    pub fn is_hidden(&self, path: &str) -> Result<bool, ContentsError> {
        let path = path::normalize(path)?;
        Ok(path::is_hidden(&path))
    }

    // =========================================================================
    // Deletion, renaming and creation
    // =========================================================================

    /// Delete a file, document or directory tree, and its checkpoints.
    #[instrument(skip(self), level = "debug")]
    pub async fn delete(&self, path: &str) -> Result<(), ContentsError> {
        let path = path::normalize(path)?;
        if path.is_empty() {
            return Err(ContentsError::bad_request("Cannot delete root"));
        }
        if !self.backend.exists(&path).await? {
            return Err(ContentsError::NotFound(path));
        }

        if self.backend.is_dir(&path).await? {
            self.backend.remove_tree(&path).await?;
        } else {
            self.backend.remove(&path).await?;
        }
        if let Err(e) = self.checkpoints.delete_all(&path).await {
            warn!("Deleted {} but not its checkpoints: {}", path, e);
        }

        info!("Deleted {}", path);
        Ok(())
    }

    /// Rename an entry and carry its checkpoints along.
    ///
    /// Once the entry itself has moved the rename succeeds; checkpoints that
    /// cannot follow are logged and left behind.
    ///
    /// Only renames within one directory are part of the contract; moves
    /// across directories are passed to the backend as they are.
    #[instrument(skip(self), level = "debug")]
    pub async fn rename(&self, old_path: &str, new_path: &str) -> Result<ContentModel, ContentsError> {
        let old_path = path::normalize(old_path)?;
        let new_path = path::normalize(new_path)?;
        if old_path.is_empty() || new_path.is_empty() {
            return Err(ContentsError::bad_request("Cannot rename root"));
        }

        if old_path != new_path {
            if !self.backend.exists(&old_path).await? {
                return Err(ContentsError::NotFound(old_path));
            }
            if self.backend.exists(&new_path).await? {
                return Err(ContentsError::Conflict(format!(
                    "File already exists: {}",
                    new_path
                )));
            }

            self.backend.move_entry(&old_path, &new_path).await?;
            if let Err(e) = self.checkpoints.rename_all(&old_path, &new_path).await {
                warn!(
                    "Renamed {} to {} but not its checkpoints: {}",
                    old_path, new_path, e
                );
            }
            info!("Renamed {} to {}", old_path, new_path);
        }

        self.builder.get(&new_path, false, None, None).await
    }

    /// First free name derived from `filename` inside `dir`.
    ///
    /// `filename` itself is tried first, then `<stem><insert>1<ext>`,
    /// `<stem><insert>2<ext>`, and so on.
    pub async fn increment_filename(
        &self,
        filename: &str,
        dir: &str,
        insert: &str,
    ) -> Result<String, ContentsError> {
        let dir = path::normalize(dir)?;
        let (stem, ext) = path::split_extension(filename);
        let mut index = 0u32;
        loop {
            let name = if index == 0 {
                filename.to_string()
            } else {
                format!("{}{}{}{}", stem, insert, index, ext)
            };
            if !self.backend.exists(&path::join(&dir, &name)).await? {
                return Ok(name);
            }
            index += 1;
        }
    }

    /// Create a new untitled file, document or directory in `dir`.
    ///
    /// Without an explicit type, `ext` equal to the document extension makes
    /// a document and anything else a file.
    #[instrument(skip(self), level = "debug")]
    pub async fn new_untitled(
        &self,
        dir: &str,
        content_type: Option<ContentType>,
        ext: &str,
    ) -> Result<ContentModel, ContentsError> {
        let dir = path::normalize(dir)?;
        if !self.backend.is_dir(&dir).await? {
            return Err(ContentsError::NotFound(format!("No such directory: {}", dir)));
        }

        let content_type = content_type.unwrap_or(if ext == self.config.document_extension {
            ContentType::Document
        } else {
            ContentType::File
        });

        let (untitled, insert) = match content_type {
            ContentType::Directory => (self.config.untitled_directory.clone(), " "),
            ContentType::Document => (
                format!(
                    "{}{}",
                    self.config.untitled_document, self.config.document_extension
                ),
                "",
            ),
            ContentType::File => (format!("{}{}", self.config.untitled_file, ext), ""),
        };

        let name = self.increment_filename(&untitled, &dir, insert).await?;
        let model = SaveModel {
            content_type: Some(content_type.as_str().to_string()),
            ..Default::default()
        };
        self.new_entry(Some(model), &path::join(&dir, &name)).await
    }

    /// Create an entry at `path`, filling in empty content when none is given.
    pub async fn new_entry(
        &self,
        model: Option<SaveModel>,
        path: &str,
    ) -> Result<ContentModel, ContentsError> {
        let path = path::normalize(path)?;
        let mut model = model.unwrap_or_default();

        if model.content_type.is_none() {
            let content_type = if self.builder.has_document_extension(&path) {
                ContentType::Document
            } else {
                ContentType::File
            };
            model.content_type = Some(content_type.as_str().to_string());
        }

        if model.content.is_none() {
            match model.content_type.as_deref() {
                Some("notebook") | Some("document") => {
                    model.content = Some(self.codec.new_document());
                    model.format = Some("json".to_string());
                }
                Some("file") => {
                    model.content = Some(serde_json::Value::String(String::new()));
                    model.format = Some("text".to_string());
                }
                _ => {}
            }
        }

        self.save(model, &path).await
    }

    /// Copy a file or document.
    ///
    /// When `to` names an existing directory (or is omitted, meaning the
    /// source's own directory), the copy gets a free `<stem>-Copy<N><ext>`
    /// name inside it. Otherwise `to` is the target path.
    #[instrument(skip(self), level = "debug")]
    pub async fn copy(&self, from: &str, to: Option<&str>) -> Result<ContentModel, ContentsError> {
        let from = path::normalize(from)?;
        let model = self.builder.get(&from, true, None, None).await?;
        if model.content_type == ContentType::Directory {
            return Err(ContentsError::bad_request("Can't copy directories"));
        }

        let mut target = match to {
            Some(to) => path::normalize(to)?,
            None => path::dirname(&from).to_string(),
        };
        if self.backend.is_dir(&target).await? {
            let name = strip_copy_suffix(path::basename(&from));
            let free = self.increment_filename(&name, &target, "-Copy").await?;
            target = path::join(&target, &free);
        }

        debug!("Copying {} to {}", from, target);
        self.save(SaveModel::from(model), &target).await
    }

    /// Sign a document so its code cells are trusted on the next read.
    #[instrument(skip(self), level = "debug")]
    pub async fn trust_document(&self, path: &str) -> Result<(), ContentsError> {
        let path = path::normalize(path)?;
        let model = self
            .builder
            .get(&path, true, Some(ContentType::Document), None)
            .await?;
        let Some(Content::Document(mut document)) = model.content else {
            return Err(ContentsError::bad_request(format!(
                "{} is not a notebook",
                path
            )));
        };

        warn!("Trusting notebook {}", path);
        self.codec.sign(&mut document);
        self.writer.write_document(&path, &document).await
    }

    // =========================================================================
    // Checkpoints
    // =========================================================================

    fn snapshot_kind(&self, path: &str) -> SnapshotKind {
        if self.builder.has_document_extension(path) {
            SnapshotKind::Document
        } else {
            SnapshotKind::File
        }
    }

    /// Snapshot the current content of `path`.
    #[instrument(skip(self), level = "debug")]
    pub async fn create_checkpoint(&self, path: &str) -> Result<CheckpointModel, ContentsError> {
        let path = path::normalize(path)?;
        let model = self.builder.get(&path, true, None, None).await?;
        let format = model.format;
        let content = match model.content {
            Some(Content::Document(document)) => CheckpointContent {
                kind: SnapshotKind::Document,
                content: document,
                format: None,
            },
            Some(Content::Text(text)) => CheckpointContent {
                kind: SnapshotKind::File,
                content: serde_json::Value::String(text),
                format: format.and_then(|f| f.as_str().parse().ok()),
            },
            Some(Content::Entries(_)) | None => {
                return Err(ContentsError::bad_request(format!(
                    "Cannot checkpoint {} of type {}",
                    path, model.content_type
                )))
            }
        };
        self.checkpoints.create(&path, &content).await
    }

    /// Checkpoints of `path`, oldest first.
    pub async fn list_checkpoints(
        &self,
        path: &str,
    ) -> Result<Listing<CheckpointModel>, ContentsError> {
        let path = path::normalize(path)?;
        self.checkpoints.list(&path).await
    }

    /// Content of checkpoint `id` of `path`.
    pub async fn get_checkpoint(
        &self,
        path: &str,
        id: &str,
    ) -> Result<CheckpointContent, ContentsError> {
        let path = path::normalize(path)?;
        self.checkpoints
            .get(&path, id, self.snapshot_kind(&path))
            .await
    }

    /// Replace the content of `path` with checkpoint `id`.
    #[instrument(skip(self), level = "debug")]
    pub async fn restore_checkpoint(
        &self,
        path: &str,
        id: &str,
    ) -> Result<ContentModel, ContentsError> {
        let path = path::normalize(path)?;
        let content = self
            .checkpoints
            .get(&path, id, self.snapshot_kind(&path))
            .await?;
        info!("Restoring {} from checkpoint {}", path, id);
        self.save_with_truncate(SaveModel::from(content), &path, true)
            .await
    }

    pub async fn delete_checkpoint(&self, path: &str, id: &str) -> Result<(), ContentsError> {
        let path = path::normalize(path)?;
        self.checkpoints.delete(&path, id).await
    }
}

/// Drop a trailing `-Copy<N>` from a file name's stem.
fn strip_copy_suffix(name: &str) -> String {
    let (stem, ext) = path::split_extension(name);
    if let Some(idx) = stem.rfind("-Copy") {
        let digits = &stem[idx + "-Copy".len()..];
        if digits.chars().all(|c| c.is_ascii_digit()) {
            return format!("{}{}", &stem[..idx], ext);
        }
    }
    name.to_string()
}
