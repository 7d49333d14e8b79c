//! Tokio codec turning a byte stream into [`Frame`]s and back.
//!
//! [`FrameCodec`] wraps [`Frame::decode`] and [`Frame::encode`] so the
//! session can drive its halves of the connection through
//! [`tokio_util::codec::FramedRead`] and [`tokio_util::codec::FramedWrite`].
//! Partial input is buffered by the framed adapter and decoding is retried
//! once more bytes arrive.
//!
//! # Error Handling
//!
//! [`CodecError`] distinguishes framing errors, I/O errors and EOF
//! conditions. See the [`error`] module for details.

use bytes::BytesMut;
use tokio_util::codec::{Decoder, Encoder};

use crate::frame::{Frame, HEADER_LEN};

pub mod error;

pub use error::{CodecError, EofError, FramingError};

/// Frame codec with an upper bound on accepted `Data` payloads.
///
/// The bound keeps a malicious length field from forcing a large
/// allocation. A session configures it to its maximum stream window, since
/// a larger `Data` frame would be a window violation anyway.
///
/// # Examples
///
/// ```
/// use bytes::{Bytes, BytesMut};
/// use muxframe::{
///     codec::FrameCodec,
///     frame::{Flags, Frame},
/// };
/// use tokio_util::codec::{Decoder, Encoder};
///
/// let mut codec = FrameCodec::new(1024);
/// let mut buf = BytesMut::new();
/// codec
///     .encode(Frame::data(1, Flags::SYN, Bytes::from_static(b"hi")), &mut buf)
///     .expect("encode");
/// let frame = codec.decode(&mut buf).expect("decode").expect("complete");
/// assert_eq!(frame.body().as_ref(), b"hi");
/// ```
#[derive(Clone, Copy, Debug)]
pub struct FrameCodec {
    max_data_len: usize,
}

impl FrameCodec {
    /// Construct a codec accepting `Data` payloads of up to `max_data_len` bytes.
    #[must_use]
    pub const fn new(max_data_len: usize) -> Self { Self { max_data_len } }

    /// Return the largest accepted `Data` payload.
    #[must_use]
    pub const fn max_data_len(&self) -> usize { self.max_data_len }
}

impl Default for FrameCodec {
    fn default() -> Self { Self::new(crate::frame::INITIAL_STREAM_WINDOW as usize) }
}

impl Decoder for FrameCodec {
    type Item = Frame;
    type Error = CodecError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        Ok(Frame::decode(src, self.max_data_len)?)
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if src.is_empty() {
            return Ok(None);
        }
        match self.decode(src)? {
            Some(frame) => Ok(Some(frame)),
            None => Err(build_eof_error(src).into()),
        }
    }
}

/// Build the appropriate EOF error based on remaining buffer state.
///
/// - [`EofError::MidHeader`]: fewer than [`HEADER_LEN`] bytes were buffered.
/// - [`EofError::MidFrame`]: the header was complete but the `Data` body was truncated.
fn build_eof_error(src: &BytesMut) -> EofError {
    let bytes_received = src.len();
    let expected = src
        .get(8..HEADER_LEN)
        .and_then(|slice| <[u8; 4]>::try_from(slice).ok())
        .map(|bytes| u32::from_be_bytes(bytes) as usize);

    match expected {
        Some(expected) => EofError::MidFrame {
            bytes_received: bytes_received.saturating_sub(HEADER_LEN),
            expected,
        },
        None => EofError::MidHeader {
            bytes_received,
            header_size: HEADER_LEN,
        },
    }
}

impl Encoder<Frame> for FrameCodec {
    type Error = CodecError;

    fn encode(&mut self, item: Frame, dst: &mut BytesMut) -> Result<(), Self::Error> {
        item.encode(dst)?;
        tracing::trace!(
            frame_type = ?item.frame_type(),
            flags = ?item.flags(),
            stream_id = item.stream_id(),
            length = item.length(),
            "frame encoded"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use bytes::{Bytes, BytesMut};
    use rstest::{fixture, rstest};
    use tokio_util::codec::{Decoder, Encoder};

    use super::{CodecError, EofError, FrameCodec, FramingError};
    use crate::frame::{Flags, Frame, HEADER_LEN};

    #[fixture]
    #[allow(unused_braces)]
    fn codec() -> FrameCodec { FrameCodec::new(64) }

    fn encoded(codec: &mut FrameCodec, frame: Frame) -> BytesMut {
        let mut buf = BytesMut::new();
        codec.encode(frame, &mut buf).expect("encode");
        buf
    }

    #[rstest]
    fn eof_at_boundary_is_clean(mut codec: FrameCodec) {
        let mut buf = BytesMut::new();
        assert!(codec.decode_eof(&mut buf).expect("clean").is_none());
    }

    #[rstest]
    fn eof_mid_header_is_reported(mut codec: FrameCodec) {
        let mut buf = BytesMut::from(&[0u8, 1, 0][..]);
        let err = codec.decode_eof(&mut buf).expect_err("truncated header");
        assert!(matches!(
            err,
            CodecError::Eof(EofError::MidHeader {
                bytes_received: 3,
                header_size: HEADER_LEN,
            })
        ));
    }

    #[rstest]
    fn eof_mid_body_is_reported(mut codec: FrameCodec) {
        let full = encoded(
            &mut codec,
            Frame::data(1, Flags::NONE, Bytes::from_static(b"0123456789")),
        );
        let mut buf = BytesMut::from(&full[..HEADER_LEN + 4]);
        let err = codec.decode_eof(&mut buf).expect_err("truncated body");
        assert!(matches!(
            err,
            CodecError::Eof(EofError::MidFrame {
                bytes_received: 4,
                expected: 10,
            })
        ));
    }

    #[rstest]
    fn oversized_data_surfaces_as_framing_error(mut codec: FrameCodec) {
        let mut big = FrameCodec::new(1024);
        let mut buf = encoded(&mut big, Frame::data(1, Flags::NONE, Bytes::from(vec![0u8; 65])));
        let err = codec.decode(&mut buf).expect_err("oversized");
        assert!(matches!(
            err,
            CodecError::Framing(FramingError::OversizedFrame { size: 65, max: 64 })
        ));
    }

    #[rstest]
    fn frames_split_across_reads_are_reassembled(mut codec: FrameCodec) {
        let full = encoded(
            &mut codec,
            Frame::data(5, Flags::FIN, Bytes::from_static(b"split body")),
        );
        let mut buf = BytesMut::new();
        for chunk in full.chunks(5) {
            if let Some(frame) = codec.decode(&mut buf).expect("decode") {
                panic!("frame decoded too early: {frame:?}");
            }
            buf.extend_from_slice(chunk);
        }
        let frame = codec.decode(&mut buf).expect("decode").expect("complete");
        assert_eq!(frame.stream_id(), 5);
        assert_eq!(frame.body().as_ref(), b"split body");
    }
}
