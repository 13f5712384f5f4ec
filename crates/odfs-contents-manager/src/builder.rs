//! Content Model Builder: typed models from backend metadata and content.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use odfs_contents_core::{
    path, BackendError, Content, ContentFormat, ContentModel, ContentType, EntryInfo, FileFormat,
    FsBackend, Listing, OpenMode, SkipReason,
};
use tracing::{debug, instrument, warn};

use crate::codec::{self, CodecError};
use crate::document::DocumentCodec;
use crate::error::ContentsError;

/// Builds [`ContentModel`]s for paths on a backend.
#[derive(Clone)]
pub struct ModelBuilder {
    backend: Arc<dyn FsBackend>,
    codec: Arc<dyn DocumentCodec>,
    document_extension: String,
}

impl ModelBuilder {
    pub fn new(
        backend: Arc<dyn FsBackend>,
        codec: Arc<dyn DocumentCodec>,
        document_extension: impl Into<String>,
    ) -> Self {
        Self {
            backend,
            codec,
            document_extension: document_extension.into(),
        }
    }

    /// Whether a path carries the reserved document extension.
    pub fn has_document_extension(&self, path: &str) -> bool {
        path.ends_with(&self.document_extension)
    }

    /// Model for `path` with content suppressed.
    ///
    /// Metadata failures never fail the call: the model is degraded to
    /// `size = None` and `created = last_modified = now`.
    pub async fn build_base(&self, path: &str, content_type: ContentType) -> ContentModel {
        match self.backend.get_info(path, true).await {
            Ok(info) => Self::model_from_info(path, content_type, &info),
            Err(e) => {
                debug!(path, "Metadata unavailable, degrading model: {}", e);
                Self::degraded(path, content_type)
            }
        }
    }

    fn model_from_info(path: &str, content_type: ContentType, info: &EntryInfo) -> ContentModel {
        let mut model = Self::degraded(path, content_type);
        if let Some(modified) = info.modified {
            model.last_modified = modified;
            model.created = info.created.unwrap_or(modified);
        } else if let Some(created) = info.created {
            model.created = created;
        }
        model.size = if info.is_dir() { None } else { info.size };
        model
    }

    fn degraded(path: &str, content_type: ContentType) -> ContentModel {
        let now: DateTime<Utc> = Utc::now();
        ContentModel {
            name: path::basename(path).to_string(),
            path: path.to_string(),
            content_type,
            content: None,
            format: None,
            mimetype: None,
            size: None,
            created: now,
            last_modified: now,
            writable: true,
            message: None,
        }
    }

    /// Model of a directory, with its children when `include_content` is set.
    #[instrument(skip(self), level = "debug")]
    pub async fn build_directory(
        &self,
        path: &str,
        include_content: bool,
    ) -> Result<ContentModel, ContentsError> {
        if !self.backend.is_dir(path).await? {
            return Err(ContentsError::NotFound(path.to_string()));
        }

        let mut model = self.build_base(path, ContentType::Directory).await;
        if include_content {
            let listing = self.list_children(path).await?;
            model.content = Some(Content::Entries(listing.items));
            model.format = Some(ContentFormat::Json);
        }
        Ok(model)
    }

    /// Content-suppressed models of a directory's children, sorted by name.
    ///
    /// One metadata lookup per child. Children whose metadata cannot be read
    /// are left out and reported in the listing's `skipped` list.
    pub async fn list_children(&self, dir: &str) -> Result<Listing<ContentModel>, ContentsError> {
        let mut names = self.backend.list_dir(dir).await?;
        names.sort();

        let mut listing = Listing::new();
        for name in names {
            let child = path::join(dir, &name);
            match self.backend.get_info(&child, true).await {
                Ok(info) => {
                    let content_type = if info.is_dir() {
                        ContentType::Directory
                    } else if self.has_document_extension(&child) {
                        ContentType::Document
                    } else {
                        ContentType::File
                    };
                    let mut model = Self::model_from_info(&child, content_type, &info);
                    if content_type == ContentType::File {
                        model.mimetype = guess_mimetype(&child);
                    }
                    listing.push(model);
                }
                Err(BackendError::NotFound(_)) => {
                    warn!(path = %child, "Skipping entry that no longer exists");
                    listing.skip(child, SkipReason::Missing);
                }
                Err(e) => {
                    warn!(path = %child, "Skipping entry with unreadable metadata: {}", e);
                    listing.skip(child, SkipReason::Metadata(e.to_string()));
                }
            }
        }
        Ok(listing)
    }

    /// Model of a regular file, decoding content when requested.
    #[instrument(skip(self), level = "debug")]
    pub async fn build_file(
        &self,
        path: &str,
        include_content: bool,
        format: Option<&str>,
    ) -> Result<ContentModel, ContentsError> {
        let format = parse_file_format(format)?;

        let mut model = self.build_base(path, ContentType::File).await;
        model.mimetype = guess_mimetype(path);

        if include_content {
            if !self.backend.is_file(path).await? {
                return Err(ContentsError::bad_request(format!(
                    "Cannot read non-file {}",
                    path
                )));
            }
            let bytes = {
                let mut handle = self.backend.open(path, OpenMode::Read).await?;
                handle.read_to_end().await?
            };
            let (content, actual) = codec::decode_for_read(bytes, format).map_err(|e| match e {
                CodecError::InvalidEncoding => {
                    ContentsError::bad_request(format!("{} is not UTF-8 encoded", path))
                }
                other => other.into(),
            })?;

            model.content = Some(Content::Text(content));
            model.format = Some(actual.into());
            if model.mimetype.is_none() {
                model.mimetype = Some(actual.default_mimetype().to_string());
            }
        }
        Ok(model)
    }

    /// Model of a document, parsed and trust-marked when content is requested.
    #[instrument(skip(self), level = "debug")]
    pub async fn build_document(
        &self,
        path: &str,
        include_content: bool,
    ) -> Result<ContentModel, ContentsError> {
        let mut model = self.build_base(path, ContentType::Document).await;
        if include_content {
            let bytes = self.backend.read_all(path).await?;
            let mut document = self.codec.parse(&bytes).map_err(|e| {
                ContentsError::bad_request(format!("Unreadable notebook: {} {}", path, e))
            })?;
            self.codec.mark_trusted(&mut document);
            model.message = self.codec.validate(&document);
            model.content = Some(Content::Document(document));
            model.format = Some(ContentFormat::Json);
        }
        Ok(model)
    }

    /// Resolve the type of `path` and build its model.
    ///
    /// A directory is always a directory. Otherwise the path is a document if
    /// one was requested, or if no type was requested and it carries the
    /// document extension. Anything else is a file.
    pub async fn get(
        &self,
        path: &str,
        include_content: bool,
        requested: Option<ContentType>,
        format: Option<&str>,
    ) -> Result<ContentModel, ContentsError> {
        if !self.backend.exists(path).await? {
            return Err(ContentsError::NotFound(path.to_string()));
        }

        if self.backend.is_dir(path).await? {
            return match requested {
                None | Some(ContentType::Directory) => {
                    self.build_directory(path, include_content).await
                }
                Some(other) => Err(ContentsError::TypeMismatch(format!(
                    "{} is a directory, not a {}",
                    path, other
                ))),
            };
        }

        match requested {
            Some(ContentType::Directory) => Err(ContentsError::TypeMismatch(format!(
                "{} is not a directory",
                path
            ))),
            Some(ContentType::Document) => self.build_document(path, include_content).await,
            None if self.has_document_extension(path) => {
                self.build_document(path, include_content).await
            }
            _ => self.build_file(path, include_content, format).await,
        }
    }
}

fn parse_file_format(format: Option<&str>) -> Result<Option<FileFormat>, ContentsError> {
    format
        .map(|f| f.parse::<FileFormat>().map_err(ContentsError::BadRequest))
        .transpose()
}

fn guess_mimetype(path: &str) -> Option<String> {
    mime_guess::from_path(path).first_raw().map(str::to_string)
}
