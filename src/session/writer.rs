//! The single writer task of a session.
//!
//! Frames from every stream meet in the outbound queues and leave through
//! one `FramedWrite`, so frames never interleave on the wire. The loop
//! batches whatever is already queued before flushing. On shutdown the
//! queues are closed and drained according to the session's
//! [`FlushPolicy`].

use std::{io, sync::Arc, time::Duration};

use futures::SinkExt;
use log::warn;
use tokio::io::AsyncWrite;
use tokio_util::codec::FramedWrite;

use super::shared::{FlushPolicy, SessionShared};
use crate::{
    codec::{CodecError, FrameCodec},
    error::SessionError,
    frame::Frame,
    metrics::{self, Direction},
    outbound::{Lane, OutboundQueues},
};

/// Upper bound on frames written between flushes.
const MAX_BATCH: usize = 64;

/// Upper bound on the final drain once the session has terminated.
const FINAL_FLUSH_TIMEOUT: Duration = Duration::from_secs(5);

type Sink<W> = FramedWrite<W, FrameCodec>;

pub(super) async fn run<W>(shared: Arc<SessionShared>, mut queues: OutboundQueues, mut sink: Sink<W>)
where
    W: AsyncWrite + Unpin,
{
    loop {
        let next = tokio::select! {
            biased;
            () = shared.shutdown().cancelled() => None,
            frame = queues.recv() => frame,
        };
        let Some(frame) = next else {
            break;
        };
        // A graceful shutdown lets the batch in progress finish; anything
        // else abandons it.
        let written = tokio::select! {
            biased;
            res = write_batch(frame, &mut queues, &mut sink) => res,
            () = aborted(&shared) => break,
        };
        if let Err(err) = written {
            fail(&shared, err);
            return;
        }
    }

    queues.close();
    let policy = shared.flush_policy();
    let lanes: &[Lane] = match policy {
        FlushPolicy::Graceful => &[Lane::Control, Lane::Stream],
        FlushPolicy::Abort => &[Lane::Control],
        FlushPolicy::Discard => return,
    };
    match tokio::time::timeout(FINAL_FLUSH_TIMEOUT, drain(&mut queues, &mut sink, lanes)).await {
        Ok(Ok(())) => {}
        Ok(Err(err)) => tracing::debug!(error = %err, ?policy, "final flush failed"),
        Err(_) => tracing::debug!(?policy, "final flush timed out"),
    }
}

/// Resolves once the session terminated with anything but a graceful drain.
async fn aborted(shared: &SessionShared) {
    shared.shutdown().cancelled().await;
    if shared.flush_policy() == FlushPolicy::Graceful {
        std::future::pending::<()>().await;
    }
}

async fn write_batch<W>(
    first: Frame,
    queues: &mut OutboundQueues,
    sink: &mut Sink<W>,
) -> Result<(), CodecError>
where
    W: AsyncWrite + Unpin,
{
    sink.feed(first).await?;
    metrics::inc_frames(Direction::Outbound);
    for _ in 1..MAX_BATCH {
        let Some(frame) = queues.try_recv() else {
            break;
        };
        sink.feed(frame).await?;
        metrics::inc_frames(Direction::Outbound);
    }
    sink.flush().await
}

async fn drain<W>(
    queues: &mut OutboundQueues,
    sink: &mut Sink<W>,
    lanes: &[Lane],
) -> Result<(), CodecError>
where
    W: AsyncWrite + Unpin,
{
    for &lane in lanes {
        while let Some(frame) = queues.try_recv_lane(lane) {
            sink.feed(frame).await?;
            metrics::inc_frames(Direction::Outbound);
        }
    }
    sink.close().await
}

fn fail(shared: &SessionShared, err: CodecError) {
    warn!("session write failed: mode={:?}, error={err}", shared.mode());
    metrics::inc_errors("connection");
    let err = match err {
        CodecError::Io(err) => err,
        other => io::Error::other(other),
    };
    shared.terminate(SessionError::connection(err), FlushPolicy::Discard);
}
