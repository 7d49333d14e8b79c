//! State shared by a session's handle, its tasks and its streams.

use std::{
    collections::HashMap,
    sync::{
        Arc,
        Mutex,
        MutexGuard,
        atomic::{AtomicU8, Ordering},
    },
    time::Duration,
};

use log::{info, warn};
use tokio::sync::mpsc;
use tokio_util::{sync::CancellationToken, task::TaskTracker};

use super::{Mode, SessionState, counter::ActiveSession, ping::PingTable};
use crate::{
    config::Config,
    error::{ProtocolViolation, SessionError},
    frame::{ErrorCode, Frame, SESSION_STREAM_ID},
    metrics,
    outbound::{OutboundHandle, QueueClosed},
    stream::{
        StreamEvent,
        shared::{Failure, StreamShared},
    },
};

/// How long a protocol violation waits to queue its `GoAway`.
const GO_AWAY_QUEUE_TIMEOUT: Duration = Duration::from_secs(1);

/// Result of registering a stream opened by the peer.
pub(crate) enum Inbound {
    Accepted(Arc<StreamShared>),
    /// Refused; the peer is owed an `RST`.
    Refused,
}

fn refuse(id: u32, reason: &'static str) {
    tracing::debug!(stream_id = id, reason, "refusing inbound stream");
    metrics::inc_errors("refused_stream");
}

/// What the writer still sends once the session has terminated.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub(crate) enum FlushPolicy {
    /// Drain both lanes so final `FIN`s and data reach the peer.
    Graceful = 0,
    /// Drain only the control lane, which carries the final `GoAway`.
    Abort = 1,
    /// The connection is gone; write nothing.
    Discard = 2,
}

impl FlushPolicy {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Graceful,
            1 => Self::Abort,
            _ => Self::Discard,
        }
    }
}

struct Table {
    streams: HashMap<u32, Arc<StreamShared>>,
    /// `None` once the identifier space is used up.
    next_id: Option<u32>,
    state: SessionState,
    terminal: Option<SessionError>,
    local_go_away: bool,
    remote_go_away: Option<ErrorCode>,
    drain_started: bool,
    active: Option<ActiveSession>,
}

pub(crate) struct SessionShared {
    mode: Mode,
    config: Config,
    outbound: OutboundHandle,
    accept_tx: mpsc::Sender<Arc<StreamShared>>,
    table: Mutex<Table>,
    flush: AtomicU8,
    pings: Arc<PingTable>,
    shutdown: CancellationToken,
    tracker: TaskTracker,
}

impl SessionShared {
    pub(crate) fn new(
        mode: Mode,
        config: Config,
        outbound: OutboundHandle,
        accept_tx: mpsc::Sender<Arc<StreamShared>>,
    ) -> Self {
        Self {
            mode,
            config,
            outbound,
            accept_tx,
            table: Mutex::new(Table {
                streams: HashMap::new(),
                next_id: Some(mode.first_stream_id()),
                state: SessionState::Open,
                terminal: None,
                local_go_away: false,
                remote_go_away: None,
                drain_started: false,
                active: Some(ActiveSession::new(mode)),
            }),
            flush: AtomicU8::new(FlushPolicy::Graceful as u8),
            pings: Arc::new(PingTable::default()),
            shutdown: CancellationToken::new(),
            tracker: TaskTracker::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Table> {
        self.table
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    pub(crate) fn mode(&self) -> Mode { self.mode }

    pub(crate) fn config(&self) -> &Config { &self.config }

    pub(crate) fn pings(&self) -> &Arc<PingTable> { &self.pings }

    pub(crate) fn shutdown(&self) -> &CancellationToken { &self.shutdown }

    pub(crate) fn tracker(&self) -> &TaskTracker { &self.tracker }

    pub(crate) fn flush_policy(&self) -> FlushPolicy {
        FlushPolicy::from_u8(self.flush.load(Ordering::Acquire))
    }

    pub(crate) fn state(&self) -> SessionState { self.lock().state }

    pub(crate) fn num_streams(&self) -> usize { self.lock().streams.len() }

    pub(crate) fn remote_go_away(&self) -> Option<ErrorCode> { self.lock().remote_go_away }

    pub(crate) fn terminal_error(&self) -> Option<SessionError> { self.lock().terminal.clone() }

    /// The terminal error, or [`SessionError::Closed`] if none was recorded.
    pub(crate) fn closed_error(&self) -> SessionError {
        self.terminal_error().unwrap_or(SessionError::Closed)
    }

    /// Fail with the terminal error if the session has already terminated.
    pub(crate) fn ensure_running(&self) -> Result<(), SessionError> {
        let table = self.lock();
        match (&table.state, &table.terminal) {
            (SessionState::Closed, Some(err)) => Err(err.clone()),
            (SessionState::Closed, None) => Err(SessionError::Closed),
            _ => Ok(()),
        }
    }

    /// Queue `frame`, waiting for queue capacity.
    pub(crate) async fn send(&self, frame: Frame) -> Result<(), SessionError> {
        self.outbound
            .send(frame)
            .await
            .map_err(|QueueClosed| self.closed_error())
    }

    /// Queue `frame` without waiting. Returns false if it was dropped.
    pub(crate) fn try_send(&self, frame: Frame) -> bool {
        let stream_id = frame.stream_id();
        let frame_type = frame.frame_type();
        let queued = self.outbound.try_send(frame).is_ok();
        if !queued {
            tracing::debug!(stream_id, ?frame_type, "outbound queue full or closed; frame dropped");
        }
        queued
    }

    pub(crate) fn stream(&self, id: u32) -> Option<Arc<StreamShared>> {
        self.lock().streams.get(&id).cloned()
    }

    /// Allocate and register a locally initiated stream in `SynSent`.
    pub(crate) fn open_local(&self) -> Result<Arc<StreamShared>, SessionError> {
        let mut table = self.lock();
        match table.state {
            SessionState::Closed => {
                return Err(table.terminal.clone().unwrap_or(SessionError::Closed));
            }
            SessionState::Closing if table.local_go_away => return Err(SessionError::LocalGoAway),
            SessionState::Closing => {
                return Err(SessionError::RemoteGoAway(
                    table.remote_go_away.unwrap_or(ErrorCode::Normal),
                ));
            }
            SessionState::Open => {}
        }
        let id = table.next_id.ok_or(SessionError::StreamsExhausted)?;
        table.next_id = id.checked_add(2);

        let stream = Arc::new(StreamShared::new(id));
        {
            let mut inner = stream.lock();
            inner.apply(StreamEvent::SendSyn);
            inner.recv_window.extend(self.config.window_extension());
        }
        table.streams.insert(id, Arc::clone(&stream));
        drop(table);
        metrics::inc_streams();
        tracing::debug!(stream_id = id, "opened stream");
        Ok(stream)
    }

    /// Register a stream opened by the peer's `SYN`.
    ///
    /// Returns [`Inbound::Refused`] when the session is closing or the
    /// accept backlog is full; the caller owes the peer a reset.
    ///
    /// # Errors
    ///
    /// Returns a [`ProtocolViolation`] for an identifier with the wrong
    /// parity or one that is already in use.
    pub(crate) fn register_inbound(&self, id: u32) -> Result<Inbound, ProtocolViolation> {
        if id == SESSION_STREAM_ID || !self.mode.is_peer_id(id) {
            return Err(ProtocolViolation::InvalidStreamId(id));
        }
        let mut table = self.lock();
        if table.streams.contains_key(&id) {
            return Err(ProtocolViolation::DuplicateStream(id));
        }
        if table.state != SessionState::Open {
            drop(table);
            refuse(id, "session is closing");
            return Ok(Inbound::Refused);
        }
        let stream = Arc::new(StreamShared::new(id));
        stream.lock().apply(StreamEvent::RecvSyn);
        if self.accept_tx.try_send(Arc::clone(&stream)).is_err() {
            drop(table);
            refuse(id, "accept backlog full");
            return Ok(Inbound::Refused);
        }
        table.streams.insert(id, Arc::clone(&stream));
        drop(table);
        metrics::inc_streams();
        tracing::debug!(stream_id = id, "accepted inbound stream");
        Ok(Inbound::Accepted(stream))
    }

    /// Remove a closed stream from the table.
    pub(crate) fn remove_stream(self: &Arc<Self>, id: u32) {
        let removed = self.lock().streams.remove(&id).is_some();
        if removed {
            metrics::dec_streams(1);
            tracing::debug!(stream_id = id, "stream removed");
            self.settle();
        }
    }

    /// Enter `Closing` because we sent `GoAway`.
    ///
    /// Returns false if a `GoAway` was already sent.
    pub(crate) fn begin_local_go_away(&self) -> Result<bool, SessionError> {
        let mut table = self.lock();
        if table.state == SessionState::Closed {
            return Err(table.terminal.clone().unwrap_or(SessionError::Closed));
        }
        if table.local_go_away {
            return Ok(false);
        }
        table.local_go_away = true;
        table.state = SessionState::Closing;
        Ok(true)
    }

    /// Enter `Closing` because the peer sent `GoAway`.
    pub(crate) fn on_remote_go_away(self: &Arc<Self>, code: ErrorCode) {
        {
            let mut table = self.lock();
            if table.state == SessionState::Closed {
                return;
            }
            table.remote_go_away = Some(code);
            table.state = SessionState::Closing;
            info!(
                "peer sent GoAway: code={code}, mode={:?}, open_streams={}",
                self.mode,
                table.streams.len()
            );
        }
        self.settle();
    }

    /// Finish a `Closing` session once its streams are gone, otherwise make
    /// sure the drain timer is running.
    pub(crate) fn settle(self: &Arc<Self>) {
        let drained = {
            let mut table = self.lock();
            if table.state != SessionState::Closing {
                return;
            }
            if !table.streams.is_empty() {
                if !table.drain_started {
                    table.drain_started = true;
                    drop(table);
                    self.start_drain_timer();
                }
                return;
            }
            table.remote_go_away.map_or(SessionError::Closed, SessionError::RemoteGoAway)
        };
        self.terminate(drained, FlushPolicy::Graceful);
    }

    fn start_drain_timer(self: &Arc<Self>) {
        let shared = Arc::clone(self);
        let timeout = self.config.go_away_drain_timeout();
        self.tracker.spawn(async move {
            tokio::select! {
                () = shared.shutdown.cancelled() => {}
                () = tokio::time::sleep(timeout) => {
                    warn!(
                        "GoAway drain timed out: mode={:?}, open_streams={}",
                        shared.mode,
                        shared.num_streams()
                    );
                    let err = shared
                        .remote_go_away()
                        .map_or(SessionError::Closed, SessionError::RemoteGoAway);
                    shared.terminate(err, FlushPolicy::Graceful);
                }
            }
        });
    }

    /// Announce a protocol violation and tear the session down.
    ///
    /// The `GoAway` is queued before termination so the writer's final
    /// flush carries it. Queueing waits for room on the control lane, but
    /// no longer than [`GO_AWAY_QUEUE_TIMEOUT`].
    pub(crate) async fn protocol_error(&self, violation: ProtocolViolation) {
        warn!("protocol violation: mode={:?}, error={violation}", self.mode);
        metrics::inc_errors("protocol");
        let err = SessionError::Protocol(violation);
        if let Some(code) = err.go_away_code() {
            let queued = self.send(Frame::go_away(code));
            match tokio::time::timeout(GO_AWAY_QUEUE_TIMEOUT, queued).await {
                Ok(Ok(())) => {}
                Ok(Err(closed)) => tracing::debug!(error = %closed, "GoAway not queued"),
                Err(_) => tracing::debug!("control lane stayed full; GoAway not queued"),
            }
        }
        self.terminate(err, FlushPolicy::Abort);
    }

    /// Terminate the session, failing every stream with `err`.
    ///
    /// Only the first call has any effect.
    pub(crate) fn terminate(&self, err: SessionError, flush: FlushPolicy) {
        let (streams, active) = {
            let mut table = self.lock();
            if table.state == SessionState::Closed {
                return;
            }
            table.state = SessionState::Closed;
            table.terminal = Some(err.clone());
            (std::mem::take(&mut table.streams), table.active.take())
        };
        self.flush.store(flush as u8, Ordering::Release);

        let count = streams.len();
        for stream in streams.into_values() {
            stream.fail(Failure::Session(err.clone()));
        }
        metrics::dec_streams(count);
        self.pings.clear();
        self.shutdown.cancel();
        drop(active);

        match &err {
            SessionError::Closed | SessionError::RemoteGoAway(ErrorCode::Normal) => info!(
                "session closed: mode={:?}, reason={err}, failed_streams={count}",
                self.mode
            ),
            _ => warn!(
                "session terminated: mode={:?}, reason={err}, failed_streams={count}",
                self.mode
            ),
        }
    }
}
