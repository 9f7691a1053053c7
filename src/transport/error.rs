//! Transport layer error types.

use std::io;

use thiserror::Error;

use super::frame::FrameError;

/// Errors raised while moving frames over a stream.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Wire decoding error.
    #[error("frame error: {0}")]
    Frame(#[from] FrameError),

    /// I/O error on the underlying stream.
    #[error("i/o error: {0}")]
    Io(#[from] io::Error),

    /// Header promised a payload beyond the configured ceiling.
    #[error("frame too large: {size} bytes exceeds the {max} byte limit")]
    FrameTooLarge {
        /// Declared payload size.
        size: usize,
        /// Configured ceiling.
        max: usize,
    },

    /// A configured send or idle timeout elapsed.
    #[error("transport operation timed out")]
    Timeout,
}

/// Result type for transport operations.
pub type TransportResult<T> = Result<T, TransportError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_error_conversion() {
        let err: TransportError = FrameError::BadMagic(*b"nope").into();
        assert!(matches!(err, TransportError::Frame(FrameError::BadMagic(_))));
    }

    #[test]
    fn test_io_error_conversion() {
        let err: TransportError = io::Error::from(io::ErrorKind::BrokenPipe).into();
        assert!(matches!(err, TransportError::Io(_)));
    }
}
