//! Writer error types

use std::io;
use thiserror::Error;

use cdns_config::ConfigError;

/// Result type for writer operations
pub type Result<T> = std::result::Result<T, WriterError>;

/// Errors surfaced from the writer's entry points
#[derive(Debug, Error)]
pub enum WriterError {
    /// Failed to open, write, rename or close an output file
    #[error("I/O error: {0}")]
    Io(io::Error),

    /// The compression codec reported a failure
    #[error("compression error: {0}")]
    Compression(String),

    /// The configuration the writer was built with is unusable
    #[error("invalid argument: {0}")]
    InvalidArgument(#[from] ConfigError),
}

impl WriterError {
    pub fn compression(message: impl Into<String>) -> Self {
        Self::Compression(message.into())
    }
}

// Writer errors travel through `io::Write` plumbing wrapped in an
// `io::Error`; unwrap them again on the way out so the compression
// taxonomy survives the round trip.
impl From<io::Error> for WriterError {
    fn from(e: io::Error) -> Self {
        match e.get_ref() {
            Some(inner) if inner.is::<WriterError>() => match e.into_inner() {
                Some(boxed) => match boxed.downcast::<WriterError>() {
                    Ok(wrapped) => *wrapped,
                    Err(other) => WriterError::Io(io::Error::other(other)),
                },
                None => WriterError::Io(io::Error::other("error context lost")),
            },
            _ => WriterError::Io(e),
        }
    }
}

impl From<WriterError> for io::Error {
    fn from(e: WriterError) -> Self {
        match e {
            WriterError::Io(io) => io,
            other => io::Error::other(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_io_roundtrip_preserves_taxonomy() {
        let original = WriterError::compression("lzma status MemNeeded");
        let via_io: io::Error = original.into();
        let back: WriterError = via_io.into();
        assert!(matches!(back, WriterError::Compression(_)));
        assert!(back.to_string().contains("MemNeeded"));
    }

    #[test]
    fn test_plain_io_errors_stay_io() {
        let e: WriterError = io::Error::new(io::ErrorKind::NotFound, "gone").into();
        assert!(matches!(e, WriterError::Io(_)));
    }
}
