//! Save Pipeline: validate, pre-hook, write, re-read, post-hook.

use odfs_contents_core::{path, CheckpointContent, ContentModel, ContentType, SaveModel, SnapshotKind};
use serde_json::Value;
use tracing::{debug, error, info, instrument, warn};

use crate::codec;
use crate::error::ContentsError;
use crate::manager::ContentsManager;

impl ContentsManager {
    /// Save a model at `path` and return the stored entry's model.
    ///
    /// The returned model has no content; its metadata is read back from the
    /// backend after the write. A failing post-save hook is reported as
    /// [`ContentsError::PostHookFailed`] but the write stays in place.
    pub async fn save(&self, model: SaveModel, path: &str) -> Result<ContentModel, ContentsError> {
        self.save_with_truncate(model, path, self.config.truncate_file_writes)
            .await
    }

    #[instrument(skip(self, model), level = "debug", fields(content_type = ?model.content_type))]
    pub(crate) async fn save_with_truncate(
        &self,
        model: SaveModel,
        path: &str,
        truncate: bool,
    ) -> Result<ContentModel, ContentsError> {
        let path = path::normalize(path)?;

        let Some(type_name) = model.content_type.as_deref() else {
            return Err(ContentsError::bad_request("No file type provided"));
        };
        if model.content.is_none() && type_name != ContentType::Directory.as_str() {
            return Err(ContentsError::bad_request("No file content provided"));
        }

        info!("Saving file model {}", path);

        if let Some(hook) = &self.pre_save_hook {
            debug!("Running pre-save hook on {}", path);
            hook.run(&path, &model).map_err(ContentsError::Hook)?;
        }

        let content_type = type_name
            .parse::<ContentType>()
            .map_err(ContentsError::BadRequest)?;

        let written = match content_type {
            ContentType::Document => self.save_document(&path, &model).await,
            ContentType::File => self.save_file(&path, &model, truncate).await.map(|_| None),
            ContentType::Directory => self.writer.ensure_directory(&path).await.map(|_| None),
        };
        let validation_message = match written {
            Ok(message) => message,
            Err(e) if e.is_classified() => return Err(e),
            Err(e) => {
                error!("Error while saving file: {} {}", path, e);
                return Err(ContentsError::SaveFailed {
                    path,
                    source: Box::new(e),
                });
            }
        };

        if let Some(message) = &validation_message {
            warn!("Model validation message: {}", message);
        }

        let mut saved = self.builder.get(&path, false, None, None).await?;
        saved.message = validation_message;

        if let Some(hook) = &self.post_save_hook {
            debug!("Running post-save hook on {}", path);
            if let Err(e) = hook.run(&path, &saved) {
                error!("Post-save hook failed on {}: {:#}", path, e);
                return Err(ContentsError::PostHookFailed {
                    path,
                    source: e.into(),
                });
            }
        }

        Ok(saved)
    }

    async fn save_file(
        &self,
        path: &str,
        model: &SaveModel,
        truncate: bool,
    ) -> Result<(), ContentsError> {
        let content = match &model.content {
            Some(Value::String(content)) => content,
            _ => return Err(ContentsError::bad_request("File content must be a string")),
        };
        let bytes = codec::encode_for_write(content, model.format.as_deref())?;
        self.writer.write_file(path, &bytes, truncate).await
    }

    /// Sign and write a document. Returns its validation message, if any.
    ///
    /// A document saved for the first time gets a baseline checkpoint.
    async fn save_document(
        &self,
        path: &str,
        model: &SaveModel,
    ) -> Result<Option<String>, ContentsError> {
        let mut document = model.content.clone().unwrap_or(Value::Null);
        if !self.codec.check_and_sign(&mut document) {
            warn!("Notebook {} is not trusted", path);
        }

        let is_new = !self.backend.exists(path).await?;
        self.writer.write_document(path, &document).await?;

        if is_new && self.checkpoints.list(path).await?.items.is_empty() {
            let baseline = CheckpointContent {
                kind: SnapshotKind::Document,
                content: document.clone(),
                format: None,
            };
            let checkpoint = self.checkpoints.create(path, &baseline).await?;
            debug!("Created baseline checkpoint {} for {}", checkpoint.id, path);
        }

        Ok(self.codec.validate(&document))
    }
}
