//! Bounded outbound frame queues shared by every producer of a session.
//!
//! Frames travel on one of two lanes. The control lane carries frames whose
//! relative order with stream data does not matter (plain window updates,
//! pings and `GoAway`); the stream lane carries `Data` frames and the
//! `SYN`/`ACK`/`FIN`/`RST` window updates that must stay ordered with them. The
//! session writer drains the control lane first so acknowledgements and
//! credit are never stuck behind bulk data.

use tokio::sync::mpsc;
use tracing::trace;

use crate::frame::{Frame, FrameType};

/// Lane a frame is queued on.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Lane {
    Control,
    Stream,
}

impl Lane {
    /// Choose the lane for `frame`.
    pub(crate) fn for_frame(frame: &Frame) -> Self {
        match frame.frame_type() {
            FrameType::Data => Self::Stream,
            FrameType::WindowUpdate if frame.flags().has_lifecycle() => Self::Stream,
            FrameType::WindowUpdate | FrameType::Ping | FrameType::GoAway => Self::Control,
        }
    }
}

/// The receiving side of the queues has gone away.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct QueueClosed;

/// Receiver ends of the outbound queues, owned by the session writer.
pub(crate) struct OutboundQueues {
    control_rx: mpsc::Receiver<Frame>,
    stream_rx: mpsc::Receiver<Frame>,
}

/// Cloneable producer handle for the outbound queues.
#[derive(Clone)]
pub(crate) struct OutboundHandle {
    control_tx: mpsc::Sender<Frame>,
    stream_tx: mpsc::Sender<Frame>,
}

/// Create a connected pair of queues and producer handle.
pub(crate) fn channel(
    control_capacity: usize,
    stream_capacity: usize,
) -> (OutboundQueues, OutboundHandle) {
    let (control_tx, control_rx) = mpsc::channel(control_capacity);
    let (stream_tx, stream_rx) = mpsc::channel(stream_capacity);
    (
        OutboundQueues {
            control_rx,
            stream_rx,
        },
        OutboundHandle {
            control_tx,
            stream_tx,
        },
    )
}

impl OutboundHandle {
    fn sender(&self, lane: Lane) -> &mpsc::Sender<Frame> {
        match lane {
            Lane::Control => &self.control_tx,
            Lane::Stream => &self.stream_tx,
        }
    }

    /// Queue `frame`, waiting for capacity on its lane.
    ///
    /// Capacity is reserved before the frame is handed over so a closed
    /// queue is reported without consuming the frame's window.
    pub(crate) async fn send(&self, frame: Frame) -> Result<(), QueueClosed> {
        let lane = Lane::for_frame(&frame);
        let permit = self.sender(lane).reserve().await.map_err(|_| QueueClosed)?;
        trace!(?lane, frame_type = ?frame.frame_type(), stream_id = frame.stream_id(), "frame queued");
        permit.send(frame);
        Ok(())
    }

    /// Queue `frame` without waiting; fails if its lane is full or closed.
    pub(crate) fn try_send(&self, frame: Frame) -> Result<(), QueueClosed> {
        let lane = Lane::for_frame(&frame);
        self.sender(lane).try_send(frame).map_err(|_| QueueClosed)
    }
}

impl OutboundQueues {
    /// Receive the next frame, preferring the control lane.
    ///
    /// Returns `None` when both lanes are closed and empty.
    pub(crate) async fn recv(&mut self) -> Option<Frame> {
        let mut control_closed = false;
        let mut stream_closed = false;
        loop {
            tokio::select! {
                biased;
                res = self.control_rx.recv(), if !control_closed => match res {
                    Some(frame) => return Some(frame),
                    None => control_closed = true,
                },
                res = self.stream_rx.recv(), if !stream_closed => match res {
                    Some(frame) => return Some(frame),
                    None => stream_closed = true,
                },
                else => return None,
            }
        }
    }

    /// Take a frame that is already queued, preferring the control lane.
    pub(crate) fn try_recv(&mut self) -> Option<Frame> {
        self.control_rx
            .try_recv()
            .or_else(|_| self.stream_rx.try_recv())
            .ok()
    }

    /// Take an already queued frame from a single lane.
    pub(crate) fn try_recv_lane(&mut self, lane: Lane) -> Option<Frame> {
        match lane {
            Lane::Control => self.control_rx.try_recv().ok(),
            Lane::Stream => self.stream_rx.try_recv().ok(),
        }
    }

    /// Close both receivers so producers stop waiting for capacity.
    ///
    /// Frames already queued remain available through [`try_recv`].
    ///
    /// [`try_recv`]: Self::try_recv
    pub(crate) fn close(&mut self) {
        self.control_rx.close();
        self.stream_rx.close();
    }
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;
    use rstest::rstest;
    use tokio::time::{Duration, timeout};

    use super::{Lane, channel};
    use crate::frame::{ErrorCode, Flags, Frame};

    #[rstest]
    #[case::data(Frame::data(1, Flags::NONE, Bytes::from_static(b"x")), Lane::Stream)]
    #[case::syn(Frame::window_update(1, Flags::SYN, 0), Lane::Stream)]
    #[case::fin(Frame::window_update(1, Flags::FIN, 0), Lane::Stream)]
    #[case::credit(Frame::window_update(1, Flags::NONE, 10), Lane::Control)]
    #[case::reset(Frame::window_update(1, Flags::RST, 0), Lane::Stream)]
    #[case::ping(Frame::ping(Flags::SYN, 1), Lane::Control)]
    #[case::go_away(Frame::go_away(ErrorCode::Normal), Lane::Control)]
    fn frames_are_routed_by_lane(#[case] frame: Frame, #[case] lane: Lane) {
        assert_eq!(Lane::for_frame(&frame), lane);
    }

    #[tokio::test]
    async fn control_lane_is_drained_first() {
        let (mut queues, handle) = channel(4, 4);
        handle
            .send(Frame::data(1, Flags::NONE, Bytes::from_static(b"a")))
            .await
            .expect("queue open");
        handle.send(Frame::ping(Flags::SYN, 7)).await.expect("queue open");

        let first = queues.recv().await.expect("frame");
        assert_eq!(first, Frame::ping(Flags::SYN, 7));
        let second = queues.recv().await.expect("frame");
        assert_eq!(second.body().as_ref(), b"a");
    }

    #[tokio::test]
    async fn full_lane_applies_backpressure() {
        let (mut queues, handle) = channel(1, 1);
        handle.send(Frame::ping(Flags::SYN, 1)).await.expect("queue open");
        let blocked = timeout(Duration::from_millis(20), handle.send(Frame::ping(Flags::SYN, 2))).await;
        assert!(blocked.is_err(), "second send should wait for capacity");
        assert!(handle.try_send(Frame::ping(Flags::SYN, 3)).is_err());

        assert!(queues.try_recv().is_some());
        handle.send(Frame::ping(Flags::SYN, 4)).await.expect("capacity freed");
    }

    #[tokio::test]
    async fn closed_queues_reject_producers() {
        let (mut queues, handle) = channel(2, 2);
        handle.send(Frame::ping(Flags::SYN, 1)).await.expect("queue open");
        queues.close();
        assert!(handle.send(Frame::ping(Flags::SYN, 2)).await.is_err());
        assert_eq!(queues.try_recv(), Some(Frame::ping(Flags::SYN, 1)));
        assert_eq!(queues.try_recv(), None);
    }
}
