use std::path::PathBuf;

/// Configuration for a [`crate::LocalFs`] backend.
#[derive(Debug, Clone)]
pub struct LocalFsConfig {
    /// Directory that becomes the API root
    pub root: PathBuf,
    /// Create the root directory (and its parents) if it does not exist
    pub create_root: bool,
}

impl LocalFsConfig {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            create_root: false,
        }
    }

    /// Create the root on construction when it is missing.
    pub fn with_create_root(mut self, create_root: bool) -> Self {
        self.create_root = create_root;
        self
    }
}
