//! Per-stream state shared between the session reader and stream handles.
//!
//! Everything mutable lives behind one per-stream mutex that is never held
//! across an `.await`. Waiters park on [`Notify`] and re-check their
//! condition after every wake-up.

use std::{
    collections::VecDeque,
    sync::{Mutex, MutexGuard},
};

use bytes::{Buf, Bytes};
use tokio::{sync::Notify, time::Instant};

use super::{
    state::{StreamEvent, StreamState},
    window::{RecvWindow, SendWindow, WindowExceeded},
};
use crate::error::{SessionError, StreamError};

/// Why a stream stopped working before a graceful close.
#[derive(Clone, Debug)]
pub(crate) enum Failure {
    Reset,
    Session(SessionError),
}

impl From<Failure> for StreamError {
    fn from(failure: Failure) -> Self {
        match failure {
            Failure::Reset => StreamError::Reset,
            Failure::Session(err) => StreamError::Session(err),
        }
    }
}

pub(crate) struct StreamInner {
    pub(crate) state: StreamState,
    pub(crate) send_window: SendWindow,
    pub(crate) recv_window: RecvWindow,
    recv_buf: VecDeque<Bytes>,
    buffered: usize,
    failure: Option<Failure>,
    /// The handle was dropped; inbound data is answered with a reset.
    pub(crate) detached: bool,
    pub(crate) read_deadline: Option<Instant>,
    pub(crate) write_deadline: Option<Instant>,
}

/// Outcome of applying inbound `Data` to a stream.
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum DataOutcome {
    Buffered,
    /// The peer sent data after its own `FIN`; the payload was discarded.
    AfterFin,
    /// Nobody will read the data; the stream should be reset.
    Detached,
}

impl StreamInner {
    fn new() -> Self {
        Self {
            state: StreamState::Idle,
            send_window: SendWindow::default(),
            recv_window: RecvWindow::default(),
            recv_buf: VecDeque::new(),
            buffered: 0,
            failure: None,
            detached: false,
            read_deadline: None,
            write_deadline: None,
        }
    }

    /// Apply `event`, ignoring events that are invalid in the current state.
    ///
    /// Returns true if the state changed.
    pub(crate) fn apply(&mut self, event: StreamEvent) -> bool {
        match self.state.on(event) {
            Ok(next) => {
                let changed = next != self.state;
                self.state = next;
                changed
            }
            Err(err) => {
                tracing::debug!(%err, "ignoring stream event");
                false
            }
        }
    }

    /// Account for and buffer an inbound payload.
    pub(crate) fn push_data(&mut self, body: Bytes) -> Result<DataOutcome, WindowExceeded> {
        let len = u32::try_from(body.len()).unwrap_or(u32::MAX);
        self.recv_window.consume(len)?;
        if self.detached {
            return Ok(DataOutcome::Detached);
        }
        if self.state.is_read_closed() {
            return Ok(DataOutcome::AfterFin);
        }
        if !body.is_empty() {
            self.buffered += body.len();
            self.recv_buf.push_back(body);
        }
        Ok(DataOutcome::Buffered)
    }

    /// Force the stream closed, discarding buffered data.
    ///
    /// Returns false if it was already closed, in which case nothing changes.
    pub(crate) fn fail(&mut self, failure: Failure) -> bool {
        if self.state.is_closed() {
            return false;
        }
        self.state = StreamState::Closed;
        self.recv_buf.clear();
        self.buffered = 0;
        self.failure = Some(failure);
        true
    }

    /// The error every operation reports once the stream has failed.
    pub(crate) fn check(&self) -> Result<(), StreamError> {
        match &self.failure {
            Some(failure) => Err(failure.clone().into()),
            None => Ok(()),
        }
    }

    /// Bytes received and not yet read.
    pub(crate) fn buffered(&self) -> usize { self.buffered }

    /// Try to satisfy a read without waiting.
    ///
    /// Returns the number of bytes copied plus any window credit that is now
    /// due, `Ok((0, None))` at end of stream, or `None` if the caller has to
    /// wait.
    pub(crate) fn try_read(
        &mut self,
        buf: &mut [u8],
        threshold: u32,
    ) -> Option<Result<(usize, Option<u32>), StreamError>> {
        if let Err(err) = self.check() {
            return Some(Err(err));
        }
        if buf.is_empty() {
            return Some(Ok((0, None)));
        }
        if self.buffered > 0 {
            let copied = self.copy_out(buf);
            let credit = if self.state.is_read_closed() {
                None
            } else {
                self.recv_window.release(copied, threshold)
            };
            return Some(Ok((copied, credit)));
        }
        if self.state.is_read_closed() {
            return Some(Ok((0, None)));
        }
        None
    }

    fn copy_out(&mut self, buf: &mut [u8]) -> usize {
        let mut copied = 0;
        while copied < buf.len() {
            let Some(chunk) = self.recv_buf.front_mut() else {
                break;
            };
            let n = chunk.len().min(buf.len() - copied);
            buf[copied..copied + n].copy_from_slice(&chunk[..n]);
            chunk.advance(n);
            if chunk.is_empty() {
                self.recv_buf.pop_front();
            }
            copied += n;
        }
        self.buffered -= copied;
        copied
    }

    /// Try to reserve send window for up to `wanted` bytes without waiting.
    pub(crate) fn try_reserve(&mut self, wanted: usize) -> Option<Result<u32, StreamError>> {
        if let Err(err) = self.check() {
            return Some(Err(err));
        }
        if self.state.is_write_closed() {
            return Some(Err(StreamError::WriteClosed));
        }
        match self.send_window.take(wanted) {
            0 => None,
            granted => Some(Ok(granted)),
        }
    }
}

/// State of one stream plus the notifications its waiters park on.
pub(crate) struct StreamShared {
    id: u32,
    inner: Mutex<StreamInner>,
    readable: Notify,
    writable: Notify,
}

impl StreamShared {
    pub(crate) fn new(id: u32) -> Self {
        Self {
            id,
            inner: Mutex::new(StreamInner::new()),
            readable: Notify::new(),
            writable: Notify::new(),
        }
    }

    pub(crate) fn id(&self) -> u32 { self.id }

    /// Lock the stream state.
    ///
    /// A poisoned lock only means another thread panicked mid-update; the
    /// counters it guards are still coherent enough to fail the stream.
    pub(crate) fn lock(&self) -> MutexGuard<'_, StreamInner> {
        self.inner
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    pub(crate) fn readable(&self) -> &Notify { &self.readable }

    pub(crate) fn writable(&self) -> &Notify { &self.writable }

    /// Wake every parked reader and writer.
    pub(crate) fn wake_all(&self) {
        self.readable.notify_waiters();
        self.writable.notify_waiters();
    }

    /// Fail the stream with `failure` and wake all waiters.
    pub(crate) fn fail(&self, failure: Failure) -> bool {
        let changed = self.lock().fail(failure);
        self.wake_all();
        changed
    }
}

/// Send window taken by a write but not yet queued as `Data`.
///
/// Whatever is left when the guard drops goes back to the window, so a
/// write that times out, fails or is cancelled does not shrink it.
pub(crate) struct Reservation<'a> {
    stream: &'a StreamShared,
    unsent: u32,
}

impl<'a> Reservation<'a> {
    pub(crate) fn new(stream: &'a StreamShared, granted: u32) -> Self {
        Self {
            stream,
            unsent: granted,
        }
    }

    /// Record that `len` reserved bytes were queued.
    pub(crate) fn queued(&mut self, len: u32) { self.unsent = self.unsent.saturating_sub(len); }
}

impl Drop for Reservation<'_> {
    fn drop(&mut self) {
        if self.unsent == 0 {
            return;
        }
        self.stream.lock().send_window.grow(self.unsent);
        self.stream.writable().notify_waiters();
    }
}
