//! Canonical error types for sessions and streams.
//!
//! Errors fall into two scopes. [`SessionError`] describes failures that end
//! a whole session: once recorded it is reported to every blocked and future
//! call on every stream of that session, which is why it is cheap to clone.
//! [`StreamError`] adds the failures that stay local to one stream or one
//! call.

use std::{io, sync::Arc};

use thiserror::Error;

use crate::{codec::FramingError, frame::ErrorCode};

/// Protocol violations committed by the peer.
///
/// Each of these is fatal: the session answers with
/// `GoAway(ProtocolError)` and terminates.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ProtocolViolation {
    /// The byte stream did not contain a valid frame.
    #[error(transparent)]
    Framing(#[from] FramingError),
    /// The peer sent more `Data` than the stream window allowed.
    #[error("stream {stream_id} received {length} bytes with only {available} bytes of window")]
    WindowViolation {
        /// Stream the frame addressed.
        stream_id: u32,
        /// Payload length of the offending frame.
        length: u32,
        /// Receive window remaining when it arrived.
        available: u32,
    },
    /// The peer opened a stream with an identifier it may not use.
    #[error("peer opened stream {0} with an invalid identifier")]
    InvalidStreamId(u32),
    /// The peer opened a stream that is already open.
    #[error("peer opened stream {0} twice")]
    DuplicateStream(u32),
    /// The connection ended in the middle of a frame.
    #[error("connection closed mid-frame")]
    TruncatedFrame,
}

/// Failures that terminate a session and every stream it carries.
#[derive(Clone, Debug, Error)]
pub enum SessionError {
    /// The session was closed locally or finished draining after a `GoAway`.
    #[error("session closed")]
    Closed,
    /// The underlying connection failed or was closed by the peer.
    #[error("connection error: {0}")]
    Connection(Arc<io::Error>),
    /// The peer violated the protocol.
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolViolation),
    /// The peer sent `GoAway`; no new streams may be opened.
    #[error("peer sent go away ({0})")]
    RemoteGoAway(ErrorCode),
    /// This side sent `GoAway`; no new streams may be opened.
    #[error("session is going away")]
    LocalGoAway,
    /// Every stream identifier for this side has been used.
    #[error("stream identifiers exhausted")]
    StreamsExhausted,
}

impl SessionError {
    /// Wrap an I/O failure of the underlying connection.
    #[must_use]
    pub fn connection(error: io::Error) -> Self { Self::Connection(Arc::new(error)) }

    /// `GoAway` code this error is announced with, if it is announced at all.
    ///
    /// Connection failures return `None` because nothing more can be sent.
    #[must_use]
    pub fn go_away_code(&self) -> Option<ErrorCode> {
        match self {
            Self::Protocol(_) => Some(ErrorCode::ProtocolError),
            Self::Connection(_) => None,
            Self::Closed | Self::RemoteGoAway(_) | Self::LocalGoAway | Self::StreamsExhausted => {
                Some(ErrorCode::Normal)
            }
        }
    }
}

/// Failures reported by [`Stream`](crate::stream::Stream) operations.
#[derive(Clone, Debug, Error)]
pub enum StreamError {
    /// The stream was reset by either side.
    #[error("stream reset")]
    Reset,
    /// A caller-supplied deadline elapsed; the stream remains usable.
    #[error("operation timed out")]
    Timeout,
    /// Writing after [`close_write`](crate::stream::Stream::close_write).
    #[error("stream is closed for writing")]
    WriteClosed,
    /// The peer finished the stream before `read_exact` filled its buffer.
    #[error("stream ended before the buffer was filled")]
    UnexpectedEof,
    /// The owning session terminated.
    #[error(transparent)]
    Session(#[from] SessionError),
}

impl StreamError {
    /// Returns true if the owning session has terminated.
    #[must_use]
    pub fn is_session_fatal(&self) -> bool { matches!(self, Self::Session(_)) }
}

impl From<StreamError> for io::Error {
    fn from(err: StreamError) -> Self {
        let kind = match &err {
            StreamError::Reset => io::ErrorKind::ConnectionReset,
            StreamError::Timeout => io::ErrorKind::TimedOut,
            StreamError::WriteClosed => io::ErrorKind::BrokenPipe,
            StreamError::UnexpectedEof => io::ErrorKind::UnexpectedEof,
            StreamError::Session(SessionError::Connection(inner)) => inner.kind(),
            StreamError::Session(_) => io::ErrorKind::ConnectionAborted,
        };
        io::Error::new(kind, err)
    }
}

/// Result alias for session-level operations.
pub type Result<T, E = SessionError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use std::io;

    use rstest::rstest;

    use super::{ProtocolViolation, SessionError, StreamError};
    use crate::frame::ErrorCode;

    #[rstest]
    #[case(SessionError::Protocol(ProtocolViolation::TruncatedFrame), Some(ErrorCode::ProtocolError))]
    #[case(SessionError::connection(io::Error::other("boom")), None)]
    #[case(SessionError::Closed, Some(ErrorCode::Normal))]
    fn go_away_code_follows_the_failure(
        #[case] err: SessionError,
        #[case] expected: Option<ErrorCode>,
    ) {
        assert_eq!(err.go_away_code(), expected);
    }

    #[test]
    fn connection_kind_survives_io_conversion() {
        let err = StreamError::from(SessionError::connection(io::Error::from(
            io::ErrorKind::BrokenPipe,
        )));
        assert!(err.is_session_fatal());
        assert_eq!(io::Error::from(err).kind(), io::ErrorKind::BrokenPipe);
    }

    #[rstest]
    #[case::reset(StreamError::Reset, io::ErrorKind::ConnectionReset)]
    #[case::timeout(StreamError::Timeout, io::ErrorKind::TimedOut)]
    #[case::write_closed(StreamError::WriteClosed, io::ErrorKind::BrokenPipe)]
    #[case::eof(StreamError::UnexpectedEof, io::ErrorKind::UnexpectedEof)]
    #[case::closed(StreamError::Session(SessionError::Closed), io::ErrorKind::ConnectionAborted)]
    fn stream_errors_map_to_io_kinds(#[case] err: StreamError, #[case] kind: io::ErrorKind) {
        assert_eq!(io::Error::from(err).kind(), kind);
    }
}
