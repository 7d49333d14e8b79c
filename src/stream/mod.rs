//! Logical streams carried by a [`Session`](crate::session::Session).
//!
//! A [`Stream`] is a handle onto state owned by its session. Reads and
//! writes take `&self`, so one task may read while another writes. Both
//! suspend until data or window is available, the stream closes, or the
//! caller's deadline passes.

pub(crate) mod shared;
mod state;
pub mod window;

use std::{fmt, pin::Pin, sync::Arc};

use bytes::Bytes;
use shared::{Failure, Reservation, StreamShared};
pub use state::{StreamEvent, StreamState, TransitionError};
use tokio::{sync::futures::Notified, time::Instant};

use crate::{
    error::StreamError,
    frame::{Flags, Frame},
    session::shared::SessionShared,
};

/// A bidirectional stream within a session.
///
/// Dropping an open stream half-closes it; once its write side is closed
/// any further data from the peer is answered with a reset.
pub struct Stream {
    shared: Arc<StreamShared>,
    session: Arc<SessionShared>,
}

impl fmt::Debug for Stream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Stream")
            .field("id", &self.id())
            .field("state", &self.state())
            .finish()
    }
}

impl Stream {
    pub(crate) fn new(shared: Arc<StreamShared>, session: Arc<SessionShared>) -> Self {
        Self { shared, session }
    }

    /// Stream identifier; odd for client-opened streams, even otherwise.
    #[must_use]
    pub fn id(&self) -> u32 { self.shared.id() }

    #[must_use]
    pub fn state(&self) -> StreamState { self.shared.lock().state }

    /// Bound every subsequent [`read`](Self::read) wait by `deadline`.
    ///
    /// `None` removes the bound.
    pub fn set_read_deadline(&self, deadline: Option<Instant>) {
        self.shared.lock().read_deadline = deadline;
        self.shared.readable().notify_waiters();
    }

    /// Bound every subsequent wait for send window by `deadline`.
    ///
    /// `None` removes the bound.
    pub fn set_write_deadline(&self, deadline: Option<Instant>) {
        self.shared.lock().write_deadline = deadline;
        self.shared.writable().notify_waiters();
    }

    /// Read received bytes into `buf`.
    ///
    /// Waits while nothing is buffered and the peer has not finished.
    /// Returns `Ok(0)` at end of stream, once every byte sent before the
    /// peer's `FIN` has been read.
    ///
    /// # Errors
    ///
    /// - [`StreamError::Reset`] if either side reset the stream; buffered
    ///   data is discarded.
    /// - [`StreamError::Timeout`] if the read deadline passes first.
    /// - [`StreamError::Session`] once the session has terminated.
    pub async fn read(&self, buf: &mut [u8]) -> Result<usize, StreamError> {
        let threshold = self.session.config().window_update_threshold();
        loop {
            let readable = self.shared.readable().notified();
            tokio::pin!(readable);
            readable.as_mut().enable();

            let polled = {
                let mut inner = self.shared.lock();
                inner.try_read(buf, threshold).ok_or(inner.read_deadline)
            };
            match polled {
                Ok(ready) => {
                    let (read, credit) = ready?;
                    if let Some(delta) = credit {
                        self.grant(delta).await;
                    }
                    return Ok(read);
                }
                Err(deadline) => wait(readable, deadline).await?,
            }
        }
    }

    /// Fill `buf` completely.
    ///
    /// # Errors
    ///
    /// Returns [`StreamError::UnexpectedEof`] if the stream ends first, or
    /// any error [`read`](Self::read) reports.
    pub async fn read_exact(&self, mut buf: &mut [u8]) -> Result<(), StreamError> {
        while !buf.is_empty() {
            match self.read(buf).await? {
                0 => return Err(StreamError::UnexpectedEof),
                n => buf = &mut buf[n..],
            }
        }
        Ok(())
    }

    /// Write as much of `buf` as the peer's window allows.
    ///
    /// Waits while the window is exhausted. The accepted bytes are queued
    /// as `Data` frames no larger than the configured frame payload. The
    /// write deadline bounds both waits: for window, and for room in the
    /// outbound queue. If it passes after some frames were queued, the
    /// count queued so far is returned and the rest of the window is kept
    /// for the next write.
    ///
    /// # Errors
    ///
    /// - [`StreamError::WriteClosed`] after [`close_write`](Self::close_write).
    /// - [`StreamError::Reset`] if the stream was reset.
    /// - [`StreamError::Timeout`] if the write deadline passes before any
    ///   byte was queued.
    /// - [`StreamError::Session`] once the session has terminated.
    pub async fn write(&self, buf: &[u8]) -> Result<usize, StreamError> {
        if buf.is_empty() {
            return self.shared.lock().check().map(|()| 0);
        }
        let (granted, deadline) = loop {
            let writable = self.shared.writable().notified();
            tokio::pin!(writable);
            writable.as_mut().enable();

            let deadline = {
                let mut inner = self.shared.lock();
                if let Some(granted) = inner.try_reserve(buf.len()) {
                    break (granted?, inner.write_deadline);
                }
                inner.write_deadline
            };
            wait(writable, deadline).await?;
        };

        let mut reservation = Reservation::new(&self.shared, granted);
        let max_payload = self.session.config().max_frame_payload() as usize;
        let mut written = 0;
        for chunk in buf[..granted as usize].chunks(max_payload) {
            let frame = Frame::data(self.id(), Flags::NONE, Bytes::copy_from_slice(chunk));
            match queue_by(&self.session, frame, deadline).await {
                Ok(()) => {
                    // Chunks never exceed the u32 frame payload limit.
                    reservation.queued(u32::try_from(chunk.len()).unwrap_or(u32::MAX));
                    written += chunk.len();
                }
                Err(StreamError::Timeout) if written > 0 => break,
                Err(err) => return Err(err),
            }
        }
        Ok(written)
    }

    /// Write all of `buf`, waiting for window as often as needed.
    ///
    /// # Errors
    ///
    /// Returns any error [`write`](Self::write) reports. Bytes accepted
    /// before the error may already have been sent.
    pub async fn write_all(&self, mut buf: &[u8]) -> Result<(), StreamError> {
        while !buf.is_empty() {
            let written = self.write(buf).await?;
            buf = &buf[written..];
        }
        Ok(())
    }

    /// Half-close the stream: send `FIN` and refuse further writes.
    ///
    /// Reading continues until the peer finishes. Calling it twice is a
    /// no-op.
    ///
    /// # Errors
    ///
    /// Returns [`StreamError::Reset`] or the session's terminal error if the
    /// stream has already failed.
    pub async fn close_write(&self) -> Result<(), StreamError> {
        let id = self.id();
        let closed = {
            let mut inner = self.shared.lock();
            inner.check()?;
            if inner.state.is_write_closed() {
                return Ok(());
            }
            inner.apply(StreamEvent::SendFin);
            inner.state.is_closed()
        };
        self.shared.writable().notify_waiters();
        self.session
            .send(Frame::window_update(id, Flags::FIN, 0))
            .await?;
        if closed {
            self.session.remove_stream(id);
        }
        Ok(())
    }

    /// Abort the stream in both directions.
    ///
    /// Buffered data is discarded, pending calls fail with
    /// [`StreamError::Reset`] and the peer is sent `RST`. Resetting a closed
    /// stream does nothing.
    pub async fn reset(&self) {
        let id = self.id();
        if !self.shared.fail(Failure::Reset) {
            return;
        }
        self.session.remove_stream(id);
        if let Err(err) = self
            .session
            .send(Frame::window_update(id, Flags::RST, 0))
            .await
        {
            tracing::debug!(stream_id = id, error = %err, "reset not sent");
        }
    }

    /// Return window credit to the peer.
    async fn grant(&self, delta: u32) {
        let id = self.id();
        tracing::trace!(stream_id = id, delta, "granting window");
        if let Err(err) = self
            .session
            .send(Frame::window_update(id, Flags::NONE, delta))
            .await
        {
            tracing::debug!(stream_id = id, error = %err, "window update not sent");
        }
    }
}

impl Drop for Stream {
    fn drop(&mut self) {
        let id = self.id();
        {
            let mut inner = self.shared.lock();
            if inner.state.is_closed() {
                return;
            }
            inner.detached = true;
            if inner.state.is_write_closed() {
                return;
            }
        }
        if self.session.try_send(Frame::window_update(id, Flags::FIN, 0)) {
            let closed = {
                let mut inner = self.shared.lock();
                inner.apply(StreamEvent::SendFin);
                inner.state.is_closed()
            };
            if closed {
                self.session.remove_stream(id);
            }
        } else if self.shared.fail(Failure::Reset) {
            self.session.remove_stream(id);
            self.session.try_send(Frame::window_update(id, Flags::RST, 0));
        }
    }
}

/// Queue `frame` on the session, bounded by `deadline`.
async fn queue_by(
    session: &SessionShared,
    frame: Frame,
    deadline: Option<Instant>,
) -> Result<(), StreamError> {
    let send = session.send(frame);
    let queued = match deadline {
        Some(deadline) => tokio::time::timeout_at(deadline, send)
            .await
            .map_err(|_| StreamError::Timeout)?,
        None => send.await,
    };
    Ok(queued?)
}

/// Wait for `notified`, bounded by `deadline`.
async fn wait(notified: Pin<&mut Notified<'_>>, deadline: Option<Instant>) -> Result<(), StreamError> {
    match deadline {
        Some(deadline) => tokio::time::timeout_at(deadline, notified)
            .await
            .map_err(|_| StreamError::Timeout),
        None => {
            notified.await;
            Ok(())
        }
    }
}
