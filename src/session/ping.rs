//! Outstanding ping bookkeeping.
//!
//! `PingTable` maps opaque ping ids to the instant they were issued. The
//! reader resolves entries when the matching `ACK` arrives; a
//! [`PendingPing`] guard removes its entry when the caller gives up.

use std::{
    sync::{
        Arc,
        atomic::{AtomicU32, Ordering},
    },
    time::Duration,
};

use dashmap::DashMap;
use tokio::{sync::oneshot, time::Instant};

struct Waiter {
    issued: Instant,
    tx: oneshot::Sender<Duration>,
}

/// Concurrent table of pings awaiting an acknowledgement.
#[derive(Default)]
pub(crate) struct PingTable {
    next_id: AtomicU32,
    pending: DashMap<u32, Waiter>,
}

impl PingTable {
    /// Register a new ping and return its id with a guard for the reply.
    pub(crate) fn register(self: &Arc<Self>) -> PendingPing {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = oneshot::channel();
        self.pending.insert(
            id,
            Waiter {
                issued: Instant::now(),
                tx,
            },
        );
        PendingPing {
            id,
            rx,
            table: Arc::clone(self),
        }
    }

    /// Complete the ping `id`, returning the measured round trip.
    ///
    /// Unknown or already resolved ids yield `None`.
    pub(crate) fn resolve(&self, id: u32) -> Option<Duration> {
        let (_, waiter) = self.pending.remove(&id)?;
        let rtt = waiter.issued.elapsed();
        // The caller may have stopped waiting; the RTT is still reported.
        let _ = waiter.tx.send(rtt);
        Some(rtt)
    }

    /// Drop every outstanding ping, waking their callers.
    pub(crate) fn clear(&self) { self.pending.clear(); }

    pub(crate) fn len(&self) -> usize { self.pending.len() }
}

/// A registered ping. Dropping it forgets the entry.
pub(crate) struct PendingPing {
    id: u32,
    rx: oneshot::Receiver<Duration>,
    table: Arc<PingTable>,
}

impl PendingPing {
    pub(crate) fn id(&self) -> u32 { self.id }

    /// Wait for the acknowledgement. `None` means the table was cleared.
    pub(crate) async fn reply(&mut self) -> Option<Duration> { (&mut self.rx).await.ok() }
}

impl Drop for PendingPing {
    fn drop(&mut self) { self.table.pending.remove(&self.id); }
}
