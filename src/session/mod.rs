//! Sessions: one multiplexed connection and the streams it carries.
//!
//! A [`Session`] owns the connection through two tasks. The reader decodes
//! frames and dispatches them to streams or to session-level ping and
//! `GoAway` handling; the writer serialises every outbound frame. Both are
//! tracked by a [`TaskTracker`](tokio_util::task::TaskTracker) and stop
//! when the session terminates.

mod counter;
mod dispatch;
mod ping;
pub(crate) mod shared;
mod writer;

use std::{fmt, sync::Arc, time::Duration};

pub use counter::active_session_count;
use shared::{FlushPolicy, SessionShared};
use tokio::{
    io::{AsyncRead, AsyncWrite},
    sync::{Mutex, mpsc},
};
use tokio_util::codec::{FramedRead, FramedWrite};

use crate::{
    codec::FrameCodec,
    config::Config,
    error::{Result, SessionError},
    frame::{ErrorCode, Flags, Frame},
    outbound,
    stream::{Stream, StreamEvent, shared::StreamShared},
};

/// Which end of the connection a session is.
///
/// Clients open odd stream identifiers and servers even ones.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Mode {
    Client,
    Server,
}

impl Mode {
    /// First identifier this side allocates.
    #[must_use]
    pub const fn first_stream_id(self) -> u32 {
        match self {
            Self::Client => 1,
            Self::Server => 2,
        }
    }

    /// Returns true if `id` belongs to streams this side opens.
    #[must_use]
    pub const fn is_local_id(self, id: u32) -> bool {
        id != 0 && (id % 2 == 1) == matches!(self, Self::Client)
    }

    /// Returns true if `id` belongs to streams the peer opens.
    #[must_use]
    pub const fn is_peer_id(self, id: u32) -> bool { id != 0 && !self.is_local_id(id) }
}

/// Lifecycle of a session.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SessionState {
    /// Streams may be opened and accepted.
    Open,
    /// A `GoAway` was sent or received; existing streams drain.
    Closing,
    /// Terminated. Every stream has failed or finished.
    Closed,
}

/// A multiplexed connection.
///
/// Dropping the session sends `GoAway(Normal)` on a best-effort basis and
/// terminates it.
pub struct Session {
    shared: Arc<SessionShared>,
    accept_rx: Mutex<mpsc::Receiver<Arc<StreamShared>>>,
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("mode", &self.shared.mode())
            .field("state", &self.shared.state())
            .field("num_streams", &self.shared.num_streams())
            .finish_non_exhaustive()
    }
}

impl Session {
    /// Start a session over `io`.
    ///
    /// The reader and writer tasks are spawned on the current tokio runtime.
    ///
    /// # Panics
    ///
    /// Panics if called outside a tokio runtime.
    pub fn new<T>(io: T, config: Config, mode: Mode) -> Self
    where
        T: AsyncRead + AsyncWrite + Send + 'static,
    {
        let (queues, handle) =
            outbound::channel(config.control_queue_capacity(), config.stream_queue_capacity());
        let (accept_tx, accept_rx) = mpsc::channel(config.accept_backlog());
        let shared = Arc::new(SessionShared::new(mode, config, handle, accept_tx));

        let codec = FrameCodec::new(config.max_stream_window() as usize);
        let (read_half, write_half) = tokio::io::split(io);
        let tracker = shared.tracker();
        tracker.spawn(dispatch::run(
            Arc::clone(&shared),
            FramedRead::new(read_half, codec),
        ));
        tracker.spawn(writer::run(
            Arc::clone(&shared),
            queues,
            FramedWrite::new(write_half, codec),
        ));
        tracker.close();
        log::debug!("session started: mode={mode:?}");

        Self {
            shared,
            accept_rx: Mutex::new(accept_rx),
        }
    }

    /// Start a client session, which opens odd stream identifiers.
    pub fn client<T>(io: T, config: Config) -> Self
    where
        T: AsyncRead + AsyncWrite + Send + 'static,
    {
        Self::new(io, config, Mode::Client)
    }

    /// Start a server session, which opens even stream identifiers.
    pub fn server<T>(io: T, config: Config) -> Self
    where
        T: AsyncRead + AsyncWrite + Send + 'static,
    {
        Self::new(io, config, Mode::Server)
    }

    /// Open a new outbound stream.
    ///
    /// The `SYN` is sent immediately, carrying any window beyond the
    /// protocol default.
    ///
    /// # Errors
    ///
    /// - [`SessionError::LocalGoAway`] or [`SessionError::RemoteGoAway`]
    ///   once either side sent `GoAway`.
    /// - [`SessionError::StreamsExhausted`] when no identifiers remain.
    /// - The terminal error if the session has terminated.
    pub async fn open_stream(&self) -> Result<Stream> {
        let stream = self.shared.open_local()?;
        let id = stream.id();
        let handle = Stream::new(Arc::clone(&stream), Arc::clone(&self.shared));
        let syn = Frame::window_update(id, Flags::SYN, self.shared.config().window_extension());
        self.shared.send(syn).await?;
        Ok(handle)
    }

    /// Wait for the next stream opened by the peer and acknowledge it.
    ///
    /// # Errors
    ///
    /// Returns the terminal error once the session has terminated.
    pub async fn accept_stream(&self) -> Result<Stream> {
        let stream = {
            let mut rx = self.accept_rx.lock().await;
            tokio::select! {
                biased;
                () = self.shared.shutdown().cancelled() => None,
                next = rx.recv() => next,
            }
        };
        let Some(stream) = stream else {
            return Err(self.shared.closed_error());
        };

        let acknowledge = {
            let mut inner = stream.lock();
            inner.apply(StreamEvent::SendAck);
            inner.recv_window.extend(self.shared.config().window_extension());
            !inner.state.is_closed()
        };
        let id = stream.id();
        let handle = Stream::new(stream, Arc::clone(&self.shared));
        if acknowledge {
            let ack = Frame::window_update(id, Flags::ACK, self.shared.config().window_extension());
            self.shared.send(ack).await?;
        }
        Ok(handle)
    }

    /// Measure the round trip to the peer.
    ///
    /// # Errors
    ///
    /// Returns the terminal error if the session terminates before the reply
    /// arrives.
    pub async fn ping(&self) -> Result<Duration> {
        self.shared.ensure_running()?;
        let mut pending = self.shared.pings().register();
        self.shared
            .send(Frame::ping(Flags::SYN, pending.id()))
            .await?;
        tokio::select! {
            reply = pending.reply() => reply.ok_or_else(|| self.shared.closed_error()),
            () = self.shared.shutdown().cancelled() => Err(self.shared.closed_error()),
        }
    }

    /// Begin a graceful shutdown.
    ///
    /// Sends `GoAway(code)` and refuses new streams in both directions.
    /// Existing streams continue; the session terminates once they have all
    /// closed or the drain timeout elapses. Calling it again is a no-op.
    ///
    /// # Errors
    ///
    /// Returns the terminal error if the session has already terminated.
    pub async fn go_away(&self, code: ErrorCode) -> Result<()> {
        if !self.shared.begin_local_go_away()? {
            return Ok(());
        }
        log::info!(
            "sending GoAway: code={code}, mode={:?}, open_streams={}",
            self.shared.mode(),
            self.shared.num_streams()
        );
        self.shared.send(Frame::go_away(code)).await?;
        self.shared.settle();
        Ok(())
    }

    /// Terminate the session immediately.
    ///
    /// `GoAway(code)` is sent if the outbound queue has room. Every stream
    /// fails with [`SessionError::Closed`]. Use [`closed`](Self::closed) to
    /// wait for the connection to be released.
    pub fn close(&self, code: ErrorCode) {
        if self.shared.state() == SessionState::Closed {
            return;
        }
        self.shared.try_send(Frame::go_away(code));
        self.shared.terminate(SessionError::Closed, FlushPolicy::Abort);
    }

    /// Wait until the session has terminated and its tasks have finished.
    pub async fn closed(&self) {
        self.shared.shutdown().cancelled().await;
        self.shared.tracker().wait().await;
    }

    /// Returns true once the session has terminated.
    #[must_use]
    pub fn is_closed(&self) -> bool { self.shared.shutdown().is_cancelled() }

    #[must_use]
    pub fn state(&self) -> SessionState { self.shared.state() }

    /// Number of streams currently in the table.
    #[must_use]
    pub fn num_streams(&self) -> usize { self.shared.num_streams() }

    #[must_use]
    pub fn mode(&self) -> Mode { self.shared.mode() }

    #[must_use]
    pub fn config(&self) -> &Config { self.shared.config() }

    /// The code of the peer's `GoAway`, if one was received.
    #[must_use]
    pub fn remote_go_away(&self) -> Option<ErrorCode> { self.shared.remote_go_away() }

    /// Why the session terminated, once it has.
    #[must_use]
    pub fn terminal_error(&self) -> Option<SessionError> { self.shared.terminal_error() }
}

impl Drop for Session {
    fn drop(&mut self) { self.close(ErrorCode::Normal); }
}
