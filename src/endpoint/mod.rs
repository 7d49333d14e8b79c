//! TCP endpoints that hand connected sockets to a [`Session`].
//!
//! [`Dialer`] opens client sessions; [`Listener`] accepts server sessions,
//! either one at a time or through [`Listener::run`], which drives an accept
//! loop with exponential back-off until shut down.

mod accept;
mod backoff;

use std::{io, net::SocketAddr, sync::Arc};

use accept::{AcceptLoopOptions, accept_loop};
pub use backoff::BackoffConfig;
use futures::Future;
use thiserror::Error;
use tokio::net::{TcpListener, TcpStream, ToSocketAddrs};
use tokio_util::{sync::CancellationToken, task::TaskTracker};

use crate::{
    config::Config,
    session::{Mode, Session},
};

/// Failures establishing a connection.
#[derive(Debug, Error)]
pub enum EndpointError {
    /// Connecting to the remote address failed.
    #[error("connect error: {0}")]
    Connect(#[source] io::Error),
    /// Binding the listening socket failed.
    #[error("bind error: {0}")]
    Bind(#[source] io::Error),
    /// Accepting a connection failed.
    #[error("accept error: {0}")]
    Accept(#[source] io::Error),
}

/// Opens client sessions over TCP.
#[derive(Clone, Copy, Debug, Default)]
pub struct Dialer {
    config: Config,
}

impl Dialer {
    #[must_use]
    pub fn new(config: Config) -> Self { Self { config } }

    /// Connect to `addr` and start a client session.
    ///
    /// # Errors
    ///
    /// Returns [`EndpointError::Connect`] if the TCP connection fails.
    pub async fn connect<A: ToSocketAddrs>(&self, addr: A) -> Result<Session, EndpointError> {
        let stream = TcpStream::connect(addr)
            .await
            .map_err(EndpointError::Connect)?;
        stream.set_nodelay(true).map_err(EndpointError::Connect)?;
        if let Ok(peer) = stream.peer_addr() {
            log::debug!("connected: peer={peer}");
        }
        Ok(Session::new(stream, self.config, Mode::Client))
    }
}

/// Accepts server sessions over TCP.
#[derive(Debug)]
pub struct Listener {
    listener: Arc<TcpListener>,
    config: Config,
    backoff: BackoffConfig,
}

impl Listener {
    /// Bind a listening socket on `addr`.
    ///
    /// # Errors
    ///
    /// Returns [`EndpointError::Bind`] if the socket cannot be bound.
    pub async fn bind<A: ToSocketAddrs>(addr: A, config: Config) -> Result<Self, EndpointError> {
        let listener = TcpListener::bind(addr).await.map_err(EndpointError::Bind)?;
        Ok(Self {
            listener: Arc::new(listener),
            config,
            backoff: BackoffConfig::default(),
        })
    }

    /// Replace the back-off used by [`run`](Self::run).
    #[must_use]
    pub fn backoff(mut self, backoff: BackoffConfig) -> Self {
        self.backoff = backoff.normalized();
        self
    }

    /// Address the listener is bound to.
    ///
    /// # Errors
    ///
    /// Returns the socket error if the address cannot be read.
    pub fn local_addr(&self) -> io::Result<SocketAddr> { self.listener.local_addr() }

    /// Accept one connection and start a server session on it.
    ///
    /// # Errors
    ///
    /// Returns [`EndpointError::Accept`] if accepting fails.
    pub async fn accept(&self) -> Result<(Session, SocketAddr), EndpointError> {
        let (stream, peer) = self.listener.accept().await.map_err(EndpointError::Accept)?;
        stream.set_nodelay(true).map_err(EndpointError::Accept)?;
        Ok((Session::new(stream, self.config, Mode::Server), peer))
    }

    /// Serve connections until `shutdown` is cancelled.
    ///
    /// Each accepted connection becomes a server [`Session`] handed to
    /// `handler` on its own task. Accept failures are retried with the
    /// configured back-off and never surface. Returns once the loop has
    /// stopped and every handler task has finished.
    pub async fn run<H, Fut>(self, shutdown: CancellationToken, handler: H)
    where
        H: Fn(Session, SocketAddr) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let tracker = TaskTracker::new();
        let local_addr = self.local_addr().ok();
        log::info!("listening: local_addr={local_addr:?}");
        accept_loop(
            self.listener,
            handler,
            AcceptLoopOptions {
                config: self.config,
                shutdown,
                tracker: tracker.clone(),
                backoff: self.backoff,
            },
        )
        .await;
        tracker.close();
        tracker.wait().await;
        log::info!("listener stopped: local_addr={local_addr:?}");
    }
}
