//! Wire frames exchanged on a multiplexed connection.
//!
//! Every frame starts with a fixed 12-byte header in network byte order:
//!
//! ```text
//! offset 0:  version   u8
//! offset 1:  type      u8   (0=Data, 1=WindowUpdate, 2=Ping, 3=GoAway)
//! offset 2:  flags     u16  (SYN, ACK, FIN, RST)
//! offset 4:  stream id u32
//! offset 8:  length    u32
//! ```
//!
//! Only `Data` frames carry a body of `length` bytes. The other frame types
//! reuse the length field as a window delta, an opaque ping identifier or a
//! `GoAway` error code.

mod flags;

use bytes::{Buf, BufMut, Bytes, BytesMut};
pub use flags::Flags;

use crate::codec::FramingError;

/// The only protocol version currently understood.
pub const PROTOCOL_VERSION: u8 = 0;

/// Size of the fixed frame header in bytes.
pub const HEADER_LEN: usize = 12;

/// Window every stream starts with, in bytes, before any update is applied.
pub const INITIAL_STREAM_WINDOW: u32 = 256 * 1024;

/// Stream identifier reserved for session-level frames.
pub const SESSION_STREAM_ID: u32 = 0;

/// Discriminates the four frame kinds.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum FrameType {
    /// Stream payload bytes.
    Data = 0,
    /// Adds to the sender's view of a stream window.
    WindowUpdate = 1,
    /// Liveness check and round-trip measurement.
    Ping = 2,
    /// Session termination notice.
    GoAway = 3,
}

impl TryFrom<u8> for FrameType {
    type Error = FramingError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::Data),
            1 => Ok(Self::WindowUpdate),
            2 => Ok(Self::Ping),
            3 => Ok(Self::GoAway),
            other => Err(FramingError::UnknownFrameType { type_id: other }),
        }
    }
}

/// Reason carried by a `GoAway` frame.
///
/// Codes outside the defined range are preserved as [`ErrorCode::Other`] so a
/// newer peer's reason can still be reported.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    /// Orderly shutdown.
    Normal,
    /// The peer violated the protocol.
    ProtocolError,
    /// The sender hit an internal failure.
    InternalError,
    /// A code this implementation does not define.
    Other(u32),
}

impl From<u32> for ErrorCode {
    fn from(value: u32) -> Self {
        match value {
            0 => Self::Normal,
            1 => Self::ProtocolError,
            2 => Self::InternalError,
            other => Self::Other(other),
        }
    }
}

impl From<ErrorCode> for u32 {
    fn from(code: ErrorCode) -> Self {
        match code {
            ErrorCode::Normal => 0,
            ErrorCode::ProtocolError => 1,
            ErrorCode::InternalError => 2,
            ErrorCode::Other(value) => value,
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Normal => f.write_str("normal"),
            Self::ProtocolError => f.write_str("protocol error"),
            Self::InternalError => f.write_str("internal error"),
            Self::Other(value) => write!(f, "code {value}"),
        }
    }
}

/// A single decoded or ready-to-encode frame.
///
/// Frames are immutable values. For `Data` frames the length field is
/// derived from the body so the two can never disagree.
///
/// # Examples
///
/// ```
/// use bytes::{Bytes, BytesMut};
/// use muxframe::frame::{Flags, Frame, FrameType};
///
/// let frame = Frame::data(1, Flags::SYN, Bytes::from_static(b"hello"));
/// let mut buf = BytesMut::new();
/// frame.encode(&mut buf).expect("frame fits the header");
///
/// let decoded = Frame::decode(&mut buf, 1024)
///     .expect("valid frame")
///     .expect("complete frame");
/// assert_eq!(decoded.frame_type(), FrameType::Data);
/// assert_eq!(decoded.body().as_ref(), b"hello");
/// assert!(buf.is_empty());
/// ```
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Frame {
    frame_type: FrameType,
    flags: Flags,
    stream_id: u32,
    value: u32,
    body: Bytes,
}

impl Frame {
    /// Build a `Data` frame carrying `body`.
    #[must_use]
    pub fn data(stream_id: u32, flags: Flags, body: Bytes) -> Self {
        Self {
            frame_type: FrameType::Data,
            flags,
            stream_id,
            value: 0,
            body,
        }
    }

    /// Build a `WindowUpdate` frame adding `delta` bytes to the peer's window.
    #[must_use]
    pub fn window_update(stream_id: u32, flags: Flags, delta: u32) -> Self {
        Self::control(FrameType::WindowUpdate, flags, stream_id, delta)
    }

    /// Build a `Ping` frame carrying the opaque identifier `opaque`.
    #[must_use]
    pub fn ping(flags: Flags, opaque: u32) -> Self {
        Self::control(FrameType::Ping, flags, SESSION_STREAM_ID, opaque)
    }

    /// Build a `GoAway` frame announcing `code`.
    #[must_use]
    pub fn go_away(code: ErrorCode) -> Self {
        Self::control(FrameType::GoAway, Flags::NONE, SESSION_STREAM_ID, code.into())
    }

    fn control(frame_type: FrameType, flags: Flags, stream_id: u32, value: u32) -> Self {
        Self {
            frame_type,
            flags,
            stream_id,
            value,
            body: Bytes::new(),
        }
    }

    /// Protocol version written in the header.
    #[must_use]
    pub const fn version(&self) -> u8 { PROTOCOL_VERSION }

    /// Frame kind.
    #[must_use]
    pub const fn frame_type(&self) -> FrameType { self.frame_type }

    /// Lifecycle flags.
    #[must_use]
    pub const fn flags(&self) -> Flags { self.flags }

    /// Addressed stream, or [`SESSION_STREAM_ID`] for session frames.
    #[must_use]
    pub const fn stream_id(&self) -> u32 { self.stream_id }

    /// Header length field.
    ///
    /// For `Data` frames this is the body length (saturating at `u32::MAX`,
    /// which [`Frame::encode`] rejects); otherwise it is the delta, ping
    /// identifier or error code.
    #[must_use]
    pub fn length(&self) -> u32 {
        match self.frame_type {
            FrameType::Data => u32::try_from(self.body.len()).unwrap_or(u32::MAX),
            _ => self.value,
        }
    }

    /// Payload of a `Data` frame; empty for every other type.
    #[must_use]
    pub const fn body(&self) -> &Bytes { &self.body }

    /// Consume the frame and return its payload.
    #[must_use]
    pub fn into_body(self) -> Bytes { self.body }

    /// Window delta of a `WindowUpdate` frame.
    #[must_use]
    pub const fn delta(&self) -> u32 { self.value }

    /// Opaque identifier of a `Ping` frame.
    #[must_use]
    pub const fn opaque(&self) -> u32 { self.value }

    /// Error code of a `GoAway` frame.
    #[must_use]
    pub fn error_code(&self) -> ErrorCode { ErrorCode::from(self.value) }

    /// Number of bytes the frame occupies on the wire.
    #[must_use]
    pub fn encoded_len(&self) -> usize { HEADER_LEN + self.body.len() }

    /// Append the encoded header and body to `dst`.
    ///
    /// # Errors
    ///
    /// Returns [`FramingError::OversizedFrame`] if a `Data` body does not fit
    /// the 32-bit length field.
    pub fn encode(&self, dst: &mut BytesMut) -> Result<(), FramingError> {
        let length = match self.frame_type {
            FrameType::Data => {
                u32::try_from(self.body.len()).map_err(|_| FramingError::OversizedFrame {
                    size: self.body.len(),
                    max: u32::MAX as usize,
                })?
            }
            _ => self.value,
        };
        dst.reserve(self.encoded_len());
        dst.put_u8(PROTOCOL_VERSION);
        dst.put_u8(self.frame_type as u8);
        dst.put_u16(self.flags.bits());
        dst.put_u32(self.stream_id);
        dst.put_u32(length);
        dst.extend_from_slice(&self.body);
        Ok(())
    }

    /// Decode one frame from the front of `src`.
    ///
    /// Returns `Ok(None)` while the header, or the body of a `Data` frame, is
    /// still incomplete; nothing is consumed in that case. Bodies longer than
    /// `max_data_len` are rejected before any payload is buffered.
    ///
    /// # Errors
    ///
    /// Returns a [`FramingError`] for an unsupported version, an unknown
    /// frame type or an oversized `Data` body.
    pub fn decode(src: &mut BytesMut, max_data_len: usize) -> Result<Option<Self>, FramingError> {
        let Some(header) = src.get(..HEADER_LEN) else {
            return Ok(None);
        };
        let mut header = header;
        let version = header.get_u8();
        if version != PROTOCOL_VERSION {
            return Err(FramingError::UnsupportedVersion { version });
        }
        let frame_type = FrameType::try_from(header.get_u8())?;
        let flags = Flags::from_bits(header.get_u16());
        let stream_id = header.get_u32();
        let value = header.get_u32();

        if frame_type != FrameType::Data {
            src.advance(HEADER_LEN);
            return Ok(Some(Self::control(frame_type, flags, stream_id, value)));
        }

        let body_len = usize::try_from(value).unwrap_or(usize::MAX);
        if body_len > max_data_len {
            return Err(FramingError::OversizedFrame {
                size: body_len,
                max: max_data_len,
            });
        }
        let total = HEADER_LEN + body_len;
        if src.len() < total {
            src.reserve(total - src.len());
            return Ok(None);
        }
        src.advance(HEADER_LEN);
        let body = src.split_to(body_len).freeze();
        Ok(Some(Self::data(stream_id, flags, body)))
    }
}
