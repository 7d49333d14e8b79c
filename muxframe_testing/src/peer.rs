//! A scripted peer that speaks raw frames to one session.

use std::time::Duration;

use futures::{SinkExt, StreamExt};
use muxframe::{CodecError, Config, Frame, FrameCodec, FrameType, Mode, Session};
use tokio::io::DuplexStream;
use tokio_util::codec::Framed;

use crate::pair::DUPLEX_CAPACITY;

/// How long [`RawPeer::recv`] waits before giving up.
const RECV_TIMEOUT: Duration = Duration::from_secs(5);

/// The far end of a session's connection, driven frame by frame.
pub struct RawPeer {
    framed: Framed<DuplexStream, FrameCodec>,
}

impl RawPeer {
    /// Start a session in `mode` and return it with a peer on the other end.
    ///
    /// The peer decodes frames up to `u32::MAX` bytes so it never rejects
    /// what the session sends.
    pub fn connect(mode: Mode, config: Config) -> (Session, Self) {
        let (session_io, peer_io) = tokio::io::duplex(DUPLEX_CAPACITY);
        let session = Session::new(session_io, config, mode);
        let framed = Framed::new(peer_io, FrameCodec::new(u32::MAX as usize));
        (session, Self { framed })
    }

    /// Send one frame.
    ///
    /// # Panics
    ///
    /// Panics if the session side has gone away.
    pub async fn send(&mut self, frame: Frame) {
        self.framed.send(frame).await.expect("peer send failed");
    }

    /// Write raw bytes, bypassing the codec.
    pub async fn send_raw(&mut self, bytes: &[u8]) {
        use tokio::io::AsyncWriteExt;
        let io = self.framed.get_mut();
        io.write_all(bytes).await.expect("peer raw write failed");
        io.flush().await.expect("peer raw flush failed");
    }

    /// Close the peer's write half so the session sees end of input.
    pub async fn shutdown_write(&mut self) {
        use tokio::io::AsyncWriteExt;
        self.framed
            .get_mut()
            .shutdown()
            .await
            .expect("peer shutdown failed");
    }

    /// Receive the next frame, or `None` once the session closed the
    /// connection.
    ///
    /// # Panics
    ///
    /// Panics on a decode error or if nothing arrives within five seconds.
    pub async fn recv(&mut self) -> Option<Frame> {
        match tokio::time::timeout(RECV_TIMEOUT, self.framed.next()).await {
            Ok(Some(Ok(frame))) => Some(frame),
            Ok(None | Some(Err(CodecError::Eof(_) | CodecError::Io(_)))) => None,
            Ok(Some(Err(err))) => panic!("peer decode failed: {err}"),
            Err(_) => panic!("no frame within {RECV_TIMEOUT:?}"),
        }
    }

    /// Receive frames until one of type `frame_type` arrives.
    ///
    /// # Panics
    ///
    /// Panics if the connection closes first.
    pub async fn recv_type(&mut self, frame_type: FrameType) -> Frame {
        loop {
            let frame = self
                .recv()
                .await
                .unwrap_or_else(|| panic!("connection closed before {frame_type:?}"));
            if frame.frame_type() == frame_type {
                return frame;
            }
        }
    }

    /// Drain frames until the session closes the connection.
    pub async fn recv_until_closed(&mut self) -> Vec<Frame> {
        let mut frames = Vec::new();
        while let Some(frame) = self.recv().await {
            frames.push(frame);
        }
        frames
    }
}
