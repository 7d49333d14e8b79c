#![doc(html_root_url = "https://docs.rs/muxframe/latest")]
//! Public API for the `muxframe` library.
//!
//! This crate multiplexes many independent, flow-controlled byte streams
//! over one ordered, reliable connection. A [`Session`] wraps any
//! `AsyncRead + AsyncWrite` transport; each [`Stream`] it opens or accepts
//! behaves like a bidirectional pipe with half-close and reset semantics.

pub mod codec;
pub mod config;
pub mod endpoint;
pub mod error;
pub mod frame;
pub mod metrics;
mod outbound;
pub mod session;
pub mod stream;

pub use codec::{CodecError, FrameCodec};
pub use config::{Config, ConfigBuilder, ConfigError};
pub use endpoint::{BackoffConfig, Dialer, EndpointError, Listener};
pub use error::{ProtocolViolation, Result, SessionError, StreamError};
pub use frame::{ErrorCode, Flags, Frame, FrameType};
pub use metrics::{Direction, ERRORS_TOTAL, FRAMES_PROCESSED, SESSIONS_ACTIVE, STREAMS_ACTIVE};
pub use session::{Mode, Session, SessionState, active_session_count};
pub use stream::{Stream, StreamState};
