use odfs_contents_core::BackendError;
use thiserror::Error;

use crate::codec::CodecError;
use crate::document::DocumentError;

/// Boxed error kept as the cause of wrapped failures.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors returned by the contents manager.
#[derive(Debug, Error)]
pub enum ContentsError {
    #[error("No such file or directory: {0}")]
    NotFound(String),

    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    TypeMismatch(String),

    #[error("{0}")]
    Conflict(String),

    #[error("Unexpected error while saving file: {path} {source}")]
    SaveFailed {
        path: String,
        #[source]
        source: BoxError,
    },

    #[error("Unexpected error while running post hook save: {path} {source}")]
    PostHookFailed {
        path: String,
        #[source]
        source: BoxError,
    },

    /// A pre-save hook failure, passed through unchanged.
    #[error(transparent)]
    Hook(anyhow::Error),

    #[error(transparent)]
    Document(#[from] DocumentError),

    #[error(transparent)]
    Backend(#[from] BackendError),
}

/// Boundary classes callers translate into their own status scheme.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    NotFound,
    BadRequest,
    Internal,
}

impl ContentsError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        ContentsError::BadRequest(message.into())
    }

    /// Class of this error at the API boundary.
    pub fn class(&self) -> ErrorClass {
        match self {
            ContentsError::NotFound(_) => ErrorClass::NotFound,
            ContentsError::BadRequest(_)
            | ContentsError::TypeMismatch(_)
            | ContentsError::Conflict(_) => ErrorClass::BadRequest,
            ContentsError::Backend(BackendError::NotFound(_)) => ErrorClass::NotFound,
            ContentsError::Backend(BackendError::InvalidPath(_)) => ErrorClass::BadRequest,
            ContentsError::SaveFailed { .. }
            | ContentsError::PostHookFailed { .. }
            | ContentsError::Hook(_)
            | ContentsError::Document(_)
            | ContentsError::Backend(_) => ErrorClass::Internal,
        }
    }

    /// Whether this is one of the manager's own classified errors, as opposed
    /// to a raw backend or codec failure.
    pub fn is_classified(&self) -> bool {
        !matches!(
            self,
            ContentsError::Backend(_) | ContentsError::Document(_)
        )
    }
}

impl From<CodecError> for ContentsError {
    fn from(err: CodecError) -> Self {
        ContentsError::BadRequest(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_classes() {
        assert_eq!(
            ContentsError::NotFound("a".into()).class(),
            ErrorClass::NotFound
        );
        assert_eq!(
            ContentsError::TypeMismatch("a".into()).class(),
            ErrorClass::BadRequest
        );
        assert_eq!(
            ContentsError::Conflict("a".into()).class(),
            ErrorClass::BadRequest
        );
        assert_eq!(
            ContentsError::from(BackendError::NotFound("a".into())).class(),
            ErrorClass::NotFound
        );
        assert_eq!(
            ContentsError::from(BackendError::Io("boom".into())).class(),
            ErrorClass::Internal
        );
    }

    #[test]
    fn test_save_failed_keeps_cause() {
        let err = ContentsError::SaveFailed {
            path: "a/b.txt".to_string(),
            source: Box::new(BackendError::Io("disk full".into())),
        };
        let message = err.to_string();
        assert!(message.contains("a/b.txt"));
        assert!(message.contains("disk full"));
        assert!(std::error::Error::source(&err).is_some());
        assert_eq!(err.class(), ErrorClass::Internal);
    }
}
