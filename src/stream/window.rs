//! Flow-control window accounting.
//!
//! Both windows are plain counters: the send window tracks how many bytes
//! the peer will still accept, the receive window how many bytes this side
//! still accepts. Neither can go negative and increments saturate instead of
//! wrapping.

use crate::frame::INITIAL_STREAM_WINDOW;

/// The peer's remaining receive capacity, as tracked locally.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SendWindow(u32);

impl Default for SendWindow {
    fn default() -> Self { Self(INITIAL_STREAM_WINDOW) }
}

impl SendWindow {
    /// Bytes that may be sent right now.
    #[must_use]
    pub const fn available(self) -> u32 { self.0 }

    /// Reserve up to `wanted` bytes and return how many were granted.
    pub fn take(&mut self, wanted: usize) -> u32 {
        let granted = u32::try_from(wanted).unwrap_or(u32::MAX).min(self.0);
        self.0 -= granted;
        granted
    }

    /// Apply a `WindowUpdate` delta, saturating at `u32::MAX`.
    pub fn grow(&mut self, delta: u32) { self.0 = self.0.saturating_add(delta); }
}

/// This side's remaining receive capacity and the credit owed to the peer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RecvWindow {
    remaining: u32,
    uncredited: u32,
}

impl Default for RecvWindow {
    fn default() -> Self {
        Self {
            remaining: INITIAL_STREAM_WINDOW,
            uncredited: 0,
        }
    }
}

/// Returned when an inbound frame exceeds the receive window.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct WindowExceeded {
    /// Window left when the frame arrived.
    pub available: u32,
}

impl RecvWindow {
    /// Bytes the peer may still send.
    #[must_use]
    pub const fn remaining(self) -> u32 { self.remaining }

    /// Account for `len` received bytes.
    ///
    /// # Errors
    ///
    /// Returns [`WindowExceeded`] if `len` is larger than the remaining
    /// window; the window is left unchanged.
    pub fn consume(&mut self, len: u32) -> Result<(), WindowExceeded> {
        self.remaining = self.remaining.checked_sub(len).ok_or(WindowExceeded {
            available: self.remaining,
        })?;
        Ok(())
    }

    /// Advertise `delta` extra bytes immediately, as done when a stream opens
    /// with a larger window.
    pub fn extend(&mut self, delta: u32) { self.remaining = self.remaining.saturating_add(delta); }

    /// Record that the consumer read `len` bytes out of the buffer.
    ///
    /// Returns the delta to send in a `WindowUpdate` once the accumulated
    /// credit reaches `threshold`; the delta is added back to the window.
    pub fn release(&mut self, len: usize, threshold: u32) -> Option<u32> {
        let len = u32::try_from(len).unwrap_or(u32::MAX);
        self.uncredited = self.uncredited.saturating_add(len);
        if self.uncredited < threshold.max(1) {
            return None;
        }
        let delta = std::mem::take(&mut self.uncredited);
        self.extend(delta);
        Some(delta)
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::{RecvWindow, SendWindow, WindowExceeded};
    use crate::frame::INITIAL_STREAM_WINDOW;

    #[test]
    fn send_window_grants_at_most_what_is_left() {
        let mut window = SendWindow::default();
        assert_eq!(window.take(300_000), INITIAL_STREAM_WINDOW);
        assert_eq!(window.available(), 0);
        assert_eq!(window.take(10), 0);
        window.grow(37_856);
        assert_eq!(window.take(37_856), 37_856);
    }

    #[test]
    fn send_window_saturates() {
        let mut window = SendWindow::default();
        window.grow(u32::MAX);
        assert_eq!(window.available(), u32::MAX);
    }

    #[test]
    fn oversized_receive_is_rejected_without_change() {
        let mut window = RecvWindow::default();
        window.consume(INITIAL_STREAM_WINDOW - 4).expect("fits");
        assert_eq!(window.consume(10), Err(WindowExceeded { available: 4 }));
        assert_eq!(window.remaining(), 4);
    }

    #[test]
    fn credit_is_batched_until_threshold() {
        let mut window = RecvWindow::default();
        let threshold = INITIAL_STREAM_WINDOW / 2;
        window.consume(INITIAL_STREAM_WINDOW).expect("fits");
        assert_eq!(window.release(1000, threshold), None);
        assert_eq!(window.remaining(), 0);
        assert_eq!(
            window.release((threshold - 1000) as usize, threshold),
            Some(threshold)
        );
        assert_eq!(window.remaining(), threshold);
    }

    #[derive(Clone, Debug)]
    enum Op {
        Send(usize),
        Update(u32),
    }

    fn op() -> impl Strategy<Value = Op> {
        prop_oneof![
            (0usize..400_000).prop_map(Op::Send),
            any::<u32>().prop_map(Op::Update),
        ]
    }

    proptest! {
        #[test]
        fn send_window_never_over_grants(ops in proptest::collection::vec(op(), 0..64)) {
            let mut window = SendWindow::default();
            for op in ops {
                match op {
                    Op::Send(wanted) => {
                        let before = window.available();
                        let granted = window.take(wanted);
                        prop_assert!(granted <= before);
                        prop_assert_eq!(window.available(), before - granted);
                    }
                    Op::Update(delta) => {
                        let before = window.available();
                        window.grow(delta);
                        prop_assert!(window.available() >= before);
                    }
                }
            }
        }
    }
}
