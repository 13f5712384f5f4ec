use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Type of a content model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentType {
    File,
    Directory,
    /// A structured document (notebook). Serialized as `"notebook"`, which is
    /// what contents clients send and expect.
    #[serde(rename = "notebook", alias = "document")]
    Document,
}

impl ContentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContentType::File => "file",
            ContentType::Directory => "directory",
            ContentType::Document => "notebook",
        }
    }
}

impl fmt::Display for ContentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ContentType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "file" => Ok(ContentType::File),
            "directory" => Ok(ContentType::Directory),
            "notebook" | "document" => Ok(ContentType::Document),
            other => Err(format!("Unhandled contents type: {}", other)),
        }
    }
}

/// Wire format of a file's content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileFormat {
    Text,
    Base64,
}

impl FileFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            FileFormat::Text => "text",
            FileFormat::Base64 => "base64",
        }
    }

    /// MIME type used for files whose extension gives no hint.
    pub fn default_mimetype(&self) -> &'static str {
        match self {
            FileFormat::Text => "text/plain",
            FileFormat::Base64 => "application/octet-stream",
        }
    }
}

impl fmt::Display for FileFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FileFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "text" => Ok(FileFormat::Text),
            "base64" => Ok(FileFormat::Base64),
            other => Err(format!(
                "Must specify format of file contents as 'text' or 'base64', got '{}'",
                other
            )),
        }
    }
}

/// Format of a model's `content` field. A model without content has no format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentFormat {
    Text,
    Base64,
    Json,
}

impl ContentFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContentFormat::Text => "text",
            ContentFormat::Base64 => "base64",
            ContentFormat::Json => "json",
        }
    }
}

impl From<FileFormat> for ContentFormat {
    fn from(format: FileFormat) -> Self {
        match format {
            FileFormat::Text => ContentFormat::Text,
            FileFormat::Base64 => ContentFormat::Base64,
        }
    }
}

/// Content carried by a model when it was requested.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Content {
    /// File content, text or base64 depending on `format`
    Text(String),
    /// Directory listing of content-suppressed child models
    Entries(Vec<ContentModel>),
    /// Parsed structured document
    Document(serde_json::Value),
}

/// One filesystem entry as exposed to callers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentModel {
    pub name: String,
    pub path: String,
    #[serde(rename = "type")]
    pub content_type: ContentType,
    pub content: Option<Content>,
    pub format: Option<ContentFormat>,
    pub mimetype: Option<String>,
    pub size: Option<u64>,
    pub created: DateTime<Utc>,
    pub last_modified: DateTime<Utc>,
    pub writable: bool,
    /// Validation message attached to document models
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl ContentModel {
    /// The text payload of a file model, if content was included.
    pub fn text(&self) -> Option<&str> {
        match &self.content {
            Some(Content::Text(text)) => Some(text),
            _ => None,
        }
    }

    /// The child models of a directory model, if content was included.
    pub fn entries(&self) -> Option<&[ContentModel]> {
        match &self.content {
            Some(Content::Entries(entries)) => Some(entries),
            _ => None,
        }
    }

    /// The parsed document of a document model, if content was included.
    pub fn document(&self) -> Option<&serde_json::Value> {
        match &self.content {
            Some(Content::Document(doc)) => Some(doc),
            _ => None,
        }
    }
}

/// A model submitted by a caller for saving.
///
/// Fields are kept loose on purpose: presence and validity are checked by the
/// save pipeline, which rejects malformed models before any I/O.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SaveModel {
    #[serde(rename = "type", default)]
    pub content_type: Option<String>,
    #[serde(default)]
    pub content: Option<serde_json::Value>,
    #[serde(default)]
    pub format: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
}

impl SaveModel {
    /// A file model with explicit content format.
    pub fn file(content: impl Into<String>, format: FileFormat) -> Self {
        Self {
            content_type: Some(ContentType::File.as_str().to_string()),
            content: Some(serde_json::Value::String(content.into())),
            format: Some(format.as_str().to_string()),
            ..Default::default()
        }
    }

    /// A text file model.
    pub fn text(content: impl Into<String>) -> Self {
        Self::file(content, FileFormat::Text)
    }

    /// A document model.
    pub fn document(content: serde_json::Value) -> Self {
        Self {
            content_type: Some(ContentType::Document.as_str().to_string()),
            content: Some(content),
            format: Some("json".to_string()),
            ..Default::default()
        }
    }

    /// A directory model.
    pub fn directory() -> Self {
        Self {
            content_type: Some(ContentType::Directory.as_str().to_string()),
            ..Default::default()
        }
    }
}

impl From<ContentModel> for SaveModel {
    /// Resubmit a model fetched with content, e.g. to copy it elsewhere.
    fn from(model: ContentModel) -> Self {
        let content = match model.content {
            Some(Content::Text(text)) => Some(serde_json::Value::String(text)),
            Some(Content::Document(doc)) => Some(doc),
            Some(Content::Entries(_)) | None => None,
        };
        Self {
            content_type: Some(model.content_type.as_str().to_string()),
            content,
            format: model.format.map(|f| f.as_str().to_string()),
            ..Default::default()
        }
    }
}

impl From<CheckpointContent> for SaveModel {
    fn from(checkpoint: CheckpointContent) -> Self {
        match checkpoint.kind {
            SnapshotKind::File => Self {
                content_type: Some(ContentType::File.as_str().to_string()),
                content: Some(checkpoint.content),
                format: checkpoint.format.map(|f| f.as_str().to_string()),
                ..Default::default()
            },
            SnapshotKind::Document => Self::document(checkpoint.content),
        }
    }
}

/// Kind of content stored in a checkpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SnapshotKind {
    File,
    #[serde(rename = "notebook", alias = "document")]
    Document,
}

/// A checkpoint as reported to callers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckpointModel {
    pub id: String,
    pub last_modified: DateTime<Utc>,
}

/// Content of a checkpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckpointContent {
    #[serde(rename = "type")]
    pub kind: SnapshotKind,
    pub content: serde_json::Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<FileFormat>,
}
