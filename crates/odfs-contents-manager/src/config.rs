use crate::error::ContentsError;

/// Default name of the hidden per-directory checkpoint area.
pub const DEFAULT_CHECKPOINT_DIR: &str = ".ipynb_checkpoints";

/// Default extension reserved for structured documents.
pub const DEFAULT_DOCUMENT_EXTENSION: &str = ".ipynb";

/// Configuration for a [`crate::ContentsManager`].
#[derive(Debug, Clone)]
pub struct ManagerConfig {
    /// Name of the hidden sibling directory holding checkpoints
    pub checkpoint_dir: String,
    /// Extension that marks a path as a document when no type is requested
    pub document_extension: String,
    /// Base name for new untitled files
    pub untitled_file: String,
    /// Base name for new untitled directories
    pub untitled_directory: String,
    /// Base name for new untitled documents
    pub untitled_document: String,
    /// Truncate existing files before writing file content
    pub truncate_file_writes: bool,
    /// Key mixed into document signatures
    pub signing_secret: Vec<u8>,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            checkpoint_dir: DEFAULT_CHECKPOINT_DIR.to_string(),
            document_extension: DEFAULT_DOCUMENT_EXTENSION.to_string(),
            untitled_file: "untitled".to_string(),
            untitled_directory: "Untitled Folder".to_string(),
            untitled_document: "Untitled".to_string(),
            truncate_file_writes: false,
            signing_secret: Vec::new(),
        }
    }
}

impl ManagerConfig {
    /// Set the checkpoint directory name
    pub fn with_checkpoint_dir(mut self, name: impl Into<String>) -> Self {
        self.checkpoint_dir = name.into();
        self
    }

    /// Set the reserved document extension
    pub fn with_document_extension(mut self, ext: impl Into<String>) -> Self {
        self.document_extension = ext.into();
        self
    }

    /// Truncate existing files before file saves
    pub fn with_truncate_file_writes(mut self, truncate: bool) -> Self {
        self.truncate_file_writes = truncate;
        self
    }

    /// Set the document signing secret
    pub fn with_signing_secret(mut self, secret: impl Into<Vec<u8>>) -> Self {
        self.signing_secret = secret.into();
        self
    }

    /// Check the configuration before a manager is built from it.
    pub fn validate(&self) -> Result<(), ContentsError> {
        let dir = &self.checkpoint_dir;
        if dir.is_empty() || dir.contains('/') || dir == "." || dir == ".." {
            return Err(ContentsError::BadRequest(format!(
                "Checkpoint directory must be a single path segment, got '{}'",
                dir
            )));
        }

        let ext = &self.document_extension;
        if ext.len() < 2 || !ext.starts_with('.') || ext.contains('/') {
            return Err(ContentsError::BadRequest(format!(
                "Document extension must look like '.ext', got '{}'",
                ext
            )));
        }

        for name in [
            &self.untitled_file,
            &self.untitled_directory,
            &self.untitled_document,
        ] {
            if name.is_empty() || name.contains('/') {
                return Err(ContentsError::BadRequest(format!(
                    "Invalid untitled name '{}'",
                    name
                )));
            }
        }

        Ok(())
    }
}
