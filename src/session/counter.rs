//! Process-wide tally of sessions that have not terminated yet.

use std::sync::atomic::{AtomicUsize, Ordering};

use super::Mode;
use crate::metrics;

static LIVE_SESSIONS: AtomicUsize = AtomicUsize::new(0);

/// Held in the session table from construction until termination.
///
/// Dropping it removes the session from the tally and the sessions gauge.
#[derive(Debug)]
pub(super) struct ActiveSession {
    mode: Mode,
}

impl ActiveSession {
    pub(super) fn new(mode: Mode) -> Self {
        let live = LIVE_SESSIONS.fetch_add(1, Ordering::Relaxed) + 1;
        metrics::inc_sessions();
        log::debug!("session registered: mode={mode:?}, live_sessions={live}");
        Self { mode }
    }
}

impl Drop for ActiveSession {
    fn drop(&mut self) {
        let live = LIVE_SESSIONS.fetch_sub(1, Ordering::Relaxed) - 1;
        metrics::dec_sessions();
        log::debug!("session released: mode={:?}, live_sessions={live}", self.mode);
    }
}

/// Number of sessions in this process that have not terminated.
///
/// A session counts from [`Session::new`](super::Session::new) until it
/// terminates, not until its handle is dropped.
#[must_use]
pub fn active_session_count() -> usize { LIVE_SESSIONS.load(Ordering::Relaxed) }
