//! Error types for the codec layer.
//!
//! The taxonomy separates framing errors (the byte stream does not contain a
//! valid header), I/O errors from the underlying transport and EOF
//! conditions, which distinguish a clean close at a frame boundary from a
//! peer that disappeared mid-frame.
//!
//! Every framing error is fatal to the session that observes it: the byte
//! stream can no longer be trusted to be aligned on frame boundaries.

use std::io;

use thiserror::Error;

/// Framing-level errors detected while reading a frame header.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum FramingError {
    /// The header carries a version this implementation does not speak.
    #[error("unsupported protocol version: {version}")]
    UnsupportedVersion {
        /// Version byte found in the header.
        version: u8,
    },

    /// The header carries a frame type outside the defined range.
    #[error("unknown frame type: {type_id}")]
    UnknownFrameType {
        /// Type byte found in the header.
        type_id: u8,
    },

    /// A `Data` frame announces more payload than the codec accepts.
    #[error("frame exceeds max length: {size} > {max}")]
    OversizedFrame {
        /// Payload size announced by the header.
        size: usize,
        /// Maximum payload size accepted.
        max: usize,
    },
}

/// EOF handling variants distinguishing normal vs. premature closure.
#[derive(Clone, Copy, Debug, Error, PartialEq, Eq)]
pub enum EofError {
    /// Clean EOF at frame boundary.
    #[error("connection closed cleanly at frame boundary")]
    CleanClose,

    /// The peer closed the connection while a frame body was being read.
    #[error("premature EOF: {bytes_received} bytes of {expected} byte frame body received")]
    MidFrame {
        /// Body bytes received before EOF.
        bytes_received: usize,
        /// Body size announced by the header.
        expected: usize,
    },

    /// The peer closed the connection while a frame header was being read.
    #[error("premature EOF during header: {bytes_received} of {header_size} header bytes")]
    MidHeader {
        /// Header bytes received before EOF.
        bytes_received: usize,
        /// Expected header size.
        header_size: usize,
    },
}

/// Top-level codec error taxonomy.
///
/// # Examples
///
/// ```
/// use muxframe::codec::{CodecError, EofError, FramingError};
///
/// let err = CodecError::Framing(FramingError::UnknownFrameType { type_id: 9 });
/// assert_eq!(err.error_type(), "framing");
/// assert!(!err.is_clean_close());
///
/// assert!(CodecError::Eof(EofError::CleanClose).is_clean_close());
/// ```
#[derive(Debug, Error)]
pub enum CodecError {
    /// Framing layer error.
    #[error("framing error: {0}")]
    Framing(#[from] FramingError),

    /// Transport layer I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// End-of-stream handling.
    #[error("EOF: {0}")]
    Eof(#[from] EofError),
}

impl CodecError {
    /// Returns true if this error represents a clean connection close.
    #[must_use]
    pub fn is_clean_close(&self) -> bool { matches!(self, Self::Eof(EofError::CleanClose)) }

    /// Returns true if the peer sent bytes that do not form a valid frame.
    ///
    /// A truncated frame at EOF counts as malformed input, whereas a clean
    /// close or a transport failure does not.
    #[must_use]
    pub fn is_malformed(&self) -> bool {
        matches!(
            self,
            Self::Framing(_) | Self::Eof(EofError::MidFrame { .. } | EofError::MidHeader { .. })
        )
    }

    /// Returns the error category as a string for logging and metrics.
    ///
    /// # Returns
    ///
    /// One of: `"framing"`, `"io"`, or `"eof"`.
    #[must_use]
    pub fn error_type(&self) -> &'static str {
        match self {
            Self::Framing(_) => "framing",
            Self::Io(_) => "io",
            Self::Eof(_) => "eof",
        }
    }
}

impl From<CodecError> for io::Error {
    fn from(err: CodecError) -> Self {
        match err {
            CodecError::Io(e) => e,
            CodecError::Framing(e) => io::Error::new(io::ErrorKind::InvalidData, e),
            CodecError::Eof(e) => io::Error::new(io::ErrorKind::UnexpectedEof, e),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io;

    use rstest::rstest;

    use super::{CodecError, EofError, FramingError};

    #[rstest]
    #[case::framing(CodecError::Framing(FramingError::UnsupportedVersion { version: 3 }), true)]
    #[case::mid_header(
        CodecError::Eof(EofError::MidHeader { bytes_received: 5, header_size: 12 }),
        true
    )]
    #[case::clean(CodecError::Eof(EofError::CleanClose), false)]
    #[case::io(CodecError::Io(io::Error::other("reset")), false)]
    fn malformed_classification(#[case] err: CodecError, #[case] malformed: bool) {
        assert_eq!(err.is_malformed(), malformed);
    }

    #[rstest]
    #[case(CodecError::Framing(FramingError::UnknownFrameType { type_id: 7 }), io::ErrorKind::InvalidData)]
    #[case(CodecError::Eof(EofError::CleanClose), io::ErrorKind::UnexpectedEof)]
    #[case(CodecError::Io(io::Error::from(io::ErrorKind::BrokenPipe)), io::ErrorKind::BrokenPipe)]
    fn converts_into_io_error(#[case] err: CodecError, #[case] kind: io::ErrorKind) {
        assert_eq!(io::Error::from(err).kind(), kind);
    }
}
