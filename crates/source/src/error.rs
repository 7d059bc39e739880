//! Error types shared across the source model

use thiserror::Error;

use crate::generic::TemplateError;

/// Errors surfaced by data sources, buffers and the registry
#[derive(Error, Debug)]
pub enum SourceError {
    /// The requested format is not in the source's format list
    #[error("unsupported format")]
    UnsupportedFormat,

    /// Get called on a source without a snapshot operation
    #[error("get not supported, data source is watch-only")]
    NotGetable,

    /// Watch called on a source without a watch interface
    #[error("watch not supported, data source is get-only")]
    NotWatchable,

    /// A source with this name is already registered
    #[error("data source already defined: {0}")]
    AlreadyDefined(String),

    /// Write to a closed chunk buffer
    #[error("buffer closed")]
    BufferClosed,

    /// Put to a closed item buffer
    #[error("item buffer closed")]
    ItemBufferClosed,

    /// Every writer of a framed watch stream has been removed
    #[error("all watch stream writers done")]
    AllWritersDone,

    /// Item serialization failed
    #[error("marshaling error: {0}")]
    Marshal(#[from] serde_json::Error),

    /// Text template rendering failed
    #[error(transparent)]
    Template(#[from] TemplateError),

    /// I/O error from a sink or socket
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// More than one error from a fan-out operation
    #[error(transparent)]
    Multi(#[from] MultiError),
}

/// Result type for source operations
pub type Result<T> = std::result::Result<T, SourceError>;

/// Bundles more than one error into a single error.
#[derive(Error, Debug)]
pub struct MultiError(Vec<SourceError>);

impl MultiError {
    /// Fold a list of errors into at most one error: none for an empty list,
    /// the error itself for a single entry, a `MultiError` otherwise.
    pub fn as_error(mut errs: Vec<SourceError>) -> Option<SourceError> {
        match errs.len() {
            0 => None,
            1 => Some(errs.remove(0)),
            _ => Some(SourceError::Multi(MultiError(errs))),
        }
    }

    /// The bundled errors.
    pub fn errors(&self) -> &[SourceError] {
        &self.0
    }
}

impl std::fmt::Display for MultiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[")?;
        for (i, err) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{err}")?;
        }
        write!(f, "]")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_multi_error_empty() {
        assert!(MultiError::as_error(Vec::new()).is_none());
    }

    #[test]
    fn test_multi_error_single_unwraps() {
        let err = MultiError::as_error(vec![SourceError::BufferClosed]).unwrap();
        assert!(matches!(err, SourceError::BufferClosed));
    }

    #[test]
    fn test_multi_error_many() {
        let err = MultiError::as_error(vec![
            SourceError::BufferClosed,
            SourceError::ItemBufferClosed,
        ])
        .unwrap();
        assert_eq!(err.to_string(), "[buffer closed, item buffer closed]");
    }
}
