//! Metric helpers for `muxframe`.
//!
//! This module defines metric names and simple helper functions wrapping the
//! [`metrics`](https://docs.rs/metrics) crate. Without the `metrics` feature
//! the helpers compile to nothing.

#[cfg(feature = "metrics")]
use metrics::{counter, gauge};

/// Name of the gauge tracking live sessions.
pub const SESSIONS_ACTIVE: &str = "muxframe_sessions_active";
/// Name of the gauge tracking streams held in session tables.
pub const STREAMS_ACTIVE: &str = "muxframe_streams_active";
/// Name of the counter tracking frames read or written.
pub const FRAMES_PROCESSED: &str = "muxframe_frames_processed_total";
/// Name of the counter tracking session-fatal errors.
pub const ERRORS_TOTAL: &str = "muxframe_errors_total";

/// Direction of frame processing.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Direction {
    /// Frames read from the connection.
    Inbound,
    /// Frames written to the connection.
    Outbound,
}

impl Direction {
    /// Label value used for this direction.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Direction::Inbound => "inbound",
            Direction::Outbound => "outbound",
        }
    }
}

/// Increment the live sessions gauge.
pub fn inc_sessions() {
    #[cfg(feature = "metrics")]
    gauge!(SESSIONS_ACTIVE).increment(1.0);
}

/// Decrement the live sessions gauge.
pub fn dec_sessions() {
    #[cfg(feature = "metrics")]
    gauge!(SESSIONS_ACTIVE).decrement(1.0);
}

/// Increment the open streams gauge.
pub fn inc_streams() {
    #[cfg(feature = "metrics")]
    gauge!(STREAMS_ACTIVE).increment(1.0);
}

/// Decrement the open streams gauge by `count`.
#[cfg_attr(not(feature = "metrics"), expect(unused_variables, reason = "metrics disabled"))]
pub fn dec_streams(count: usize) {
    #[cfg(feature = "metrics")]
    {
        #[expect(clippy::cast_precision_loss, reason = "stream counts are small")]
        gauge!(STREAMS_ACTIVE).decrement(count as f64);
    }
}

/// Record a processed frame for the given direction.
#[cfg_attr(not(feature = "metrics"), expect(unused_variables, reason = "metrics disabled"))]
pub fn inc_frames(direction: Direction) {
    #[cfg(feature = "metrics")]
    counter!(FRAMES_PROCESSED, "direction" => direction.as_str()).increment(1);
}

/// Record a session-fatal error of the given kind.
#[cfg_attr(not(feature = "metrics"), expect(unused_variables, reason = "metrics disabled"))]
pub fn inc_errors(kind: &'static str) {
    #[cfg(feature = "metrics")]
    counter!(ERRORS_TOTAL, "kind" => kind).increment(1);
}
