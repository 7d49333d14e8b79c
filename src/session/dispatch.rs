//! The reader task: decode inbound frames and route them.

use std::{io, sync::Arc};

use futures::StreamExt;
use tokio::io::AsyncRead;
use tokio_util::codec::FramedRead;
use tracing::{debug, trace};

use super::shared::{FlushPolicy, Inbound, SessionShared};
use crate::{
    codec::{CodecError, EofError, FrameCodec},
    error::{ProtocolViolation, SessionError},
    frame::{Flags, Frame, FrameType},
    metrics::{self, Direction},
    stream::{
        StreamEvent,
        shared::{DataOutcome, Failure, StreamShared},
    },
};

pub(super) async fn run<R>(shared: Arc<SessionShared>, mut frames: FramedRead<R, FrameCodec>)
where
    R: AsyncRead + Unpin,
{
    loop {
        let next = tokio::select! {
            biased;
            () = shared.shutdown().cancelled() => return,
            next = frames.next() => next,
        };
        let frame = match next {
            Some(Ok(frame)) => frame,
            Some(Err(err)) => {
                read_failed(&shared, err).await;
                return;
            }
            None => {
                let eof = io::Error::new(io::ErrorKind::UnexpectedEof, "connection closed by peer");
                shared.terminate(SessionError::connection(eof), FlushPolicy::Discard);
                return;
            }
        };
        metrics::inc_frames(Direction::Inbound);
        trace!(
            frame_type = ?frame.frame_type(),
            flags = ?frame.flags(),
            stream_id = frame.stream_id(),
            length = frame.length(),
            "frame received"
        );
        match dispatch(&shared, frame) {
            Ok(None) => {}
            Ok(Some(reply)) => {
                if !queue_reply(&shared, reply).await {
                    return;
                }
            }
            Err(violation) => {
                shared.protocol_error(violation).await;
                return;
            }
        }
    }
}

/// Queue a reply owed to the peer, holding up further reads until the
/// control lane has room. Returns false once the session has terminated.
async fn queue_reply(shared: &SessionShared, reply: Frame) -> bool {
    tokio::select! {
        biased;
        () = shared.shutdown().cancelled() => false,
        queued = shared.send(reply) => queued.is_ok(),
    }
}

async fn read_failed(shared: &SessionShared, err: CodecError) {
    match err {
        CodecError::Framing(err) => shared.protocol_error(err.into()).await,
        CodecError::Eof(EofError::MidHeader { .. } | EofError::MidFrame { .. }) => {
            shared.protocol_error(ProtocolViolation::TruncatedFrame).await;
        }
        CodecError::Eof(EofError::CleanClose) => {
            let eof = io::Error::new(io::ErrorKind::UnexpectedEof, "connection closed by peer");
            shared.terminate(SessionError::connection(eof), FlushPolicy::Discard);
        }
        CodecError::Io(err) => {
            metrics::inc_errors("connection");
            shared.terminate(SessionError::connection(err), FlushPolicy::Discard);
        }
    }
}

/// Route one inbound frame.
///
/// Returns the frame owed to the peer in response, if any: a ping
/// acknowledgement or a reset refusing the stream.
///
/// # Errors
///
/// Returns a [`ProtocolViolation`] when the peer broke the protocol; the
/// caller tears the session down.
pub(super) fn dispatch(
    shared: &Arc<SessionShared>,
    frame: Frame,
) -> Result<Option<Frame>, ProtocolViolation> {
    match frame.frame_type() {
        FrameType::Data | FrameType::WindowUpdate => stream_frame(shared, frame),
        FrameType::Ping => Ok(ping(shared, &frame)),
        FrameType::GoAway => {
            shared.on_remote_go_away(frame.error_code());
            Ok(None)
        }
    }
}

fn ping(shared: &SessionShared, frame: &Frame) -> Option<Frame> {
    let flags = frame.flags();
    if flags.contains(Flags::SYN) {
        return Some(Frame::ping(Flags::ACK, frame.opaque()));
    }
    if flags.contains(Flags::ACK) {
        match shared.pings().resolve(frame.opaque()) {
            Some(rtt) => debug!(opaque = frame.opaque(), ?rtt, "ping acknowledged"),
            None => debug!(opaque = frame.opaque(), "ignoring unsolicited ping ack"),
        }
    }
    None
}

fn stream_frame(
    shared: &Arc<SessionShared>,
    frame: Frame,
) -> Result<Option<Frame>, ProtocolViolation> {
    let id = frame.stream_id();
    let stream = if frame.flags().contains(Flags::SYN) {
        match shared.register_inbound(id)? {
            Inbound::Accepted(stream) => stream,
            Inbound::Refused => return Ok(Some(reset(id))),
        }
    } else if let Some(stream) = shared.stream(id) {
        stream
    } else {
        debug!(
            stream_id = id,
            frame_type = ?frame.frame_type(),
            flags = ?frame.flags(),
            "dropping frame for unknown stream"
        );
        return Ok(None);
    };
    apply(shared, &stream, frame)
}

fn reset(id: u32) -> Frame {
    Frame::window_update(id, Flags::RST, 0)
}

/// Apply a stream frame to `stream`, waking its waiters.
fn apply(
    shared: &Arc<SessionShared>,
    stream: &StreamShared,
    frame: Frame,
) -> Result<Option<Frame>, ProtocolViolation> {
    let id = stream.id();
    let flags = frame.flags();
    if flags.contains(Flags::RST) {
        if stream.fail(Failure::Reset) {
            debug!(stream_id = id, "stream reset by peer");
        }
        shared.remove_stream(id);
        return Ok(None);
    }

    let mut detached = false;
    let closed = {
        let mut inner = stream.lock();
        if flags.contains(Flags::ACK) {
            inner.apply(StreamEvent::RecvAck);
        }
        match frame.frame_type() {
            FrameType::Data => {
                let length = frame.length();
                match inner.push_data(frame.into_body()) {
                    Ok(DataOutcome::Buffered) => {}
                    Ok(DataOutcome::AfterFin) => {
                        debug!(stream_id = id, length, "discarding data after FIN");
                    }
                    Ok(DataOutcome::Detached) => {
                        inner.fail(Failure::Reset);
                        detached = true;
                    }
                    Err(exceeded) => {
                        return Err(ProtocolViolation::WindowViolation {
                            stream_id: id,
                            length,
                            available: exceeded.available,
                        });
                    }
                }
            }
            _ => inner.send_window.grow(frame.delta()),
        }
        if flags.contains(Flags::FIN) {
            inner.apply(StreamEvent::RecvFin);
        }
        inner.state.is_closed()
    };
    stream.wake_all();

    if closed {
        shared.remove_stream(id);
    }
    if detached {
        debug!(stream_id = id, "resetting stream with no reader");
        return Ok(Some(reset(id)));
    }
    Ok(None)
}
