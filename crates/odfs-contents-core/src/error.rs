use thiserror::Error;

/// Errors reported by a filesystem backend.
#[derive(Debug, Error)]
pub enum BackendError {
    #[error("No such file or directory: {0}")]
    NotFound(String),

    #[error("Entry already exists: {0}")]
    AlreadyExists(String),

    #[error("Not a directory: {0}")]
    NotADirectory(String),

    #[error("Is a directory: {0}")]
    IsADirectory(String),

    #[error("Invalid path: {0}")]
    InvalidPath(String),

    #[error("I/O error: {0}")]
    Io(String),
}

impl BackendError {
    /// Whether the error means the entry does not exist.
    pub fn is_not_found(&self) -> bool {
        matches!(self, BackendError::NotFound(_))
    }

    /// Classify a `std::io::Error` raised while operating on `path`.
    pub fn from_io(path: &str, err: std::io::Error) -> Self {
        use std::io::ErrorKind;
        match err.kind() {
            ErrorKind::NotFound => BackendError::NotFound(path.to_string()),
            ErrorKind::AlreadyExists => BackendError::AlreadyExists(path.to_string()),
            _ => BackendError::Io(format!("{}: {}", path, err)),
        }
    }
}
