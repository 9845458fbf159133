//! Error types for mediameta-probe

use std::path::PathBuf;

/// A localized failure inside one element of a container.
///
/// Parse errors never abort an extraction on their own: the orchestrator
/// keeps every record produced before the error and reports a partial result.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("parse error at byte {position}: {detail}")]
pub struct ParseError {
    /// Absolute byte offset of the offending element.
    pub position: u64,
    /// Human-readable description.
    pub detail: String,
}

impl ParseError {
    /// Create a parse error at the given file offset.
    pub fn new(position: u64, detail: impl Into<String>) -> Self {
        Self {
            position,
            detail: detail.into(),
        }
    }
}

/// Why an extraction stopped before finishing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum Interrupt {
    /// The caller cancelled the extraction token.
    #[error("cancelled by caller")]
    Cancelled,
    /// The configured wall-clock budget elapsed.
    #[error("time budget exceeded")]
    DeadlineExceeded,
}

/// Errors that can occur while extracting metadata
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// File not found
    #[error("File not found: {0}")]
    FileNotFound(PathBuf),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The locator is not a local path or `file://` URL
    #[error("Invalid locator: {0}")]
    InvalidLocator(String),

    /// Structural failure while walking a container
    #[error(transparent)]
    Parse(#[from] ParseError),

    /// Cancellation or timeout observed at a suspension point
    #[error("Extraction interrupted: {0}")]
    Interrupted(Interrupt),

    /// Invalid configuration or mapping table
    #[error("Configuration error: {0}")]
    Config(String),
}

/// Result alias using the crate-level [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_error_display() {
        let err = ParseError::new(1024, "box size smaller than header");
        assert_eq!(
            err.to_string(),
            "parse error at byte 1024: box size smaller than header"
        );
    }

    #[test]
    fn parse_error_is_transparent() {
        let err = Error::from(ParseError::new(8, "bad magic"));
        assert_eq!(err.to_string(), "parse error at byte 8: bad magic");
    }

    #[test]
    fn interrupted_display() {
        let err = Error::Interrupted(Interrupt::DeadlineExceeded);
        assert_eq!(
            err.to_string(),
            "Extraction interrupted: time budget exceeded"
        );
        assert_eq!(Interrupt::Cancelled.to_string(), "cancelled by caller");
    }

    #[test]
    fn io_from_std() {
        let io_err = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        assert!(matches!(Error::from(io_err), Error::Io(_)));
    }
}
