//! The listener accept loop.

use std::{io, net::SocketAddr, sync::Arc};

use async_trait::async_trait;
use futures::Future;
use log::warn;
use tokio::{
    net::{TcpListener, TcpStream},
    select,
    time::sleep,
};
use tokio_util::{sync::CancellationToken, task::TaskTracker};

use super::backoff::{Backoff, BackoffConfig};
use crate::{
    config::Config,
    session::{Mode, Session},
};

/// Source of incoming connections consumed by the accept loop.
///
/// Dropping a pending `accept()` future must not leak the connection.
#[async_trait]
pub(crate) trait AcceptListener: Send + Sync {
    async fn accept(&self) -> io::Result<(TcpStream, SocketAddr)>;
    fn local_addr(&self) -> io::Result<SocketAddr>;
}

#[async_trait]
impl AcceptListener for TcpListener {
    async fn accept(&self) -> io::Result<(TcpStream, SocketAddr)> {
        TcpListener::accept(self).await
    }

    fn local_addr(&self) -> io::Result<SocketAddr> { TcpListener::local_addr(self) }
}

pub(crate) struct AcceptLoopOptions {
    pub config: Config,
    pub shutdown: CancellationToken,
    pub tracker: TaskTracker,
    pub backoff: BackoffConfig,
}

/// Accept connections until `shutdown` is cancelled, running `handler` on
/// a server [`Session`] for each one.
///
/// Accept failures are logged and retried after an exponential back-off.
/// Handler tasks are spawned on `tracker`.
pub(crate) async fn accept_loop<L, H, Fut>(listener: Arc<L>, handler: H, options: AcceptLoopOptions)
where
    L: AcceptListener + 'static,
    H: Fn(Session, SocketAddr) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    let mut backoff = Backoff::new(options.backoff);
    loop {
        let accepted = select! {
            biased;
            () = options.shutdown.cancelled() => return,
            res = listener.accept() => res,
        };
        match accepted {
            Ok((stream, peer)) => {
                backoff.succeeded();
                if let Err(e) = stream.set_nodelay(true) {
                    warn!("failed to set TCP_NODELAY: error={e}, peer={peer}");
                }
                let session = Session::new(stream, options.config, Mode::Server);
                options.tracker.spawn(handler(session, peer));
            }
            Err(e) => {
                let delay = backoff.failed();
                let local_addr = listener.local_addr().ok();
                warn!("accept error: error={e:?}, local_addr={local_addr:?}, retry_in={delay:?}");
                select! {
                    biased;
                    () = options.shutdown.cancelled() => return,
                    () = sleep(delay) => {}
                }
            }
        }
    }
}
