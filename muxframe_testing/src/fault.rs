//! I/O wrapper whose reads can be made to fail on demand.

use std::{
    io,
    pin::Pin,
    sync::{
        Arc,
        Mutex,
        atomic::{AtomicBool, Ordering},
    },
    task::{Context, Poll, Waker},
};

use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};

#[derive(Default)]
struct FaultState {
    tripped: AtomicBool,
    waker: Mutex<Option<Waker>>,
}

/// Trigger for a [`FaultyIo`].
#[derive(Clone, Default)]
pub struct FaultHandle(Arc<FaultState>);

impl FaultHandle {
    /// Make every subsequent read fail, waking a pending one.
    pub fn trip(&self) {
        self.0.tripped.store(true, Ordering::SeqCst);
        let waker = self
            .0
            .waker
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .take();
        if let Some(waker) = waker {
            waker.wake();
        }
    }

    fn is_tripped(&self) -> bool { self.0.tripped.load(Ordering::SeqCst) }

    fn register(&self, cx: &Context<'_>) {
        *self
            .0
            .waker
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner) = Some(cx.waker().clone());
    }
}

/// Wraps a transport; reads fail with an injected error once tripped.
pub struct FaultyIo<T> {
    inner: T,
    fault: FaultHandle,
}

impl<T> FaultyIo<T> {
    pub fn new(inner: T) -> (Self, FaultHandle) {
        let fault = FaultHandle::default();
        (
            Self {
                inner,
                fault: fault.clone(),
            },
            fault,
        )
    }
}

fn injected() -> io::Error { io::Error::new(io::ErrorKind::ConnectionReset, "injected read failure") }

impl<T: AsyncRead + Unpin> AsyncRead for FaultyIo<T> {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        if this.fault.is_tripped() {
            return Poll::Ready(Err(injected()));
        }
        this.fault.register(cx);
        match Pin::new(&mut this.inner).poll_read(cx, buf) {
            Poll::Pending if this.fault.is_tripped() => Poll::Ready(Err(injected())),
            other => other,
        }
    }
}

impl<T: AsyncWrite + Unpin> AsyncWrite for FaultyIo<T> {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        Pin::new(&mut self.get_mut().inner).poll_write(cx, buf)
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().inner).poll_flush(cx)
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().inner).poll_shutdown(cx)
    }
}
