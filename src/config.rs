//! Session configuration.
//!
//! [`Config`] holds the tunables shared by both ends of a session. Every
//! value has a sensible default; [`ConfigBuilder`] validates overrides so a
//! session never starts with settings the protocol cannot honour.

use std::time::Duration;

use static_assertions::const_assert;
use thiserror::Error;

use crate::frame::INITIAL_STREAM_WINDOW;

/// Default largest `Data` payload emitted in a single frame.
pub const DEFAULT_MAX_FRAME_PAYLOAD: u32 = 64 * 1024;
/// Default number of inbound streams waiting for [`accept_stream`].
///
/// [`accept_stream`]: crate::session::Session::accept_stream
pub const DEFAULT_ACCEPT_BACKLOG: usize = 256;
/// Default capacity of the control-frame outbound queue.
pub const DEFAULT_CONTROL_QUEUE_CAPACITY: usize = 64;
/// Default capacity of the stream-frame outbound queue.
pub const DEFAULT_STREAM_QUEUE_CAPACITY: usize = 64;
/// Default grace period for open streams after a `GoAway`.
pub const DEFAULT_GO_AWAY_DRAIN_TIMEOUT: Duration = Duration::from_secs(30);

const_assert!(DEFAULT_MAX_FRAME_PAYLOAD <= INITIAL_STREAM_WINDOW);

/// Errors returned when building a [`Config`].
#[derive(Clone, Copy, Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    /// The stream window is below the protocol's initial window.
    #[error("stream window {0} is smaller than the initial window {INITIAL_STREAM_WINDOW}")]
    WindowTooSmall(u32),
    /// The frame payload limit is zero.
    #[error("max frame payload must be non-zero")]
    ZeroFramePayload,
    /// A queue or backlog capacity is zero.
    #[error("{0} must be non-zero")]
    ZeroCapacity(&'static str),
}

/// Tunables for a [`Session`](crate::session::Session).
///
/// # Examples
///
/// ```
/// use muxframe::config::Config;
///
/// let config = Config::builder()
///     .max_stream_window(1024 * 1024)
///     .accept_backlog(16)
///     .build()
///     .expect("valid config");
/// assert_eq!(config.max_stream_window(), 1024 * 1024);
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Config {
    max_stream_window: u32,
    max_frame_payload: u32,
    accept_backlog: usize,
    control_queue_capacity: usize,
    stream_queue_capacity: usize,
    go_away_drain_timeout: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_stream_window: INITIAL_STREAM_WINDOW,
            max_frame_payload: DEFAULT_MAX_FRAME_PAYLOAD,
            accept_backlog: DEFAULT_ACCEPT_BACKLOG,
            control_queue_capacity: DEFAULT_CONTROL_QUEUE_CAPACITY,
            stream_queue_capacity: DEFAULT_STREAM_QUEUE_CAPACITY,
            go_away_drain_timeout: DEFAULT_GO_AWAY_DRAIN_TIMEOUT,
        }
    }
}

impl Config {
    /// Start building a configuration from the defaults.
    #[must_use]
    pub fn builder() -> ConfigBuilder { ConfigBuilder::default() }

    /// Receive window each stream grows to once opened.
    #[must_use]
    pub const fn max_stream_window(&self) -> u32 { self.max_stream_window }

    /// Largest `Data` payload written in one frame.
    #[must_use]
    pub const fn max_frame_payload(&self) -> u32 { self.max_frame_payload }

    /// Number of unaccepted inbound streams held before new ones are reset.
    #[must_use]
    pub const fn accept_backlog(&self) -> usize { self.accept_backlog }

    /// Capacity of the outbound queue for control frames.
    #[must_use]
    pub const fn control_queue_capacity(&self) -> usize { self.control_queue_capacity }

    /// Capacity of the outbound queue for stream frames.
    #[must_use]
    pub const fn stream_queue_capacity(&self) -> usize { self.stream_queue_capacity }

    /// Time open streams may keep running after a `GoAway`.
    #[must_use]
    pub const fn go_away_drain_timeout(&self) -> Duration { self.go_away_drain_timeout }

    /// Extra window advertised on top of [`INITIAL_STREAM_WINDOW`] when a
    /// stream opens.
    #[must_use]
    pub const fn window_extension(&self) -> u32 {
        self.max_stream_window.saturating_sub(INITIAL_STREAM_WINDOW)
    }

    /// Un-credited bytes a reader consumes before a `WindowUpdate` is sent.
    #[must_use]
    pub const fn window_update_threshold(&self) -> u32 { self.max_stream_window / 2 }
}

/// Consuming builder for [`Config`].
#[derive(Clone, Copy, Debug, Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Set the per-stream receive window. Must be at least
    /// [`INITIAL_STREAM_WINDOW`].
    #[must_use]
    pub fn max_stream_window(mut self, window: u32) -> Self {
        self.config.max_stream_window = window;
        self
    }

    /// Set the largest `Data` payload written in one frame.
    #[must_use]
    pub fn max_frame_payload(mut self, payload: u32) -> Self {
        self.config.max_frame_payload = payload;
        self
    }

    /// Set how many unaccepted inbound streams may queue up.
    #[must_use]
    pub fn accept_backlog(mut self, backlog: usize) -> Self {
        self.config.accept_backlog = backlog;
        self
    }

    /// Set the capacity of the control-frame queue.
    #[must_use]
    pub fn control_queue_capacity(mut self, capacity: usize) -> Self {
        self.config.control_queue_capacity = capacity;
        self
    }

    /// Set the capacity of the stream-frame queue.
    #[must_use]
    pub fn stream_queue_capacity(mut self, capacity: usize) -> Self {
        self.config.stream_queue_capacity = capacity;
        self
    }

    /// Set the grace period granted to open streams after a `GoAway`.
    #[must_use]
    pub fn go_away_drain_timeout(mut self, timeout: Duration) -> Self {
        self.config.go_away_drain_timeout = timeout;
        self
    }

    /// Validate the settings and produce a [`Config`].
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the window is smaller than the initial
    /// window or any size or capacity is zero.
    pub fn build(self) -> Result<Config, ConfigError> {
        let config = self.config;
        if config.max_stream_window < INITIAL_STREAM_WINDOW {
            return Err(ConfigError::WindowTooSmall(config.max_stream_window));
        }
        if config.max_frame_payload == 0 {
            return Err(ConfigError::ZeroFramePayload);
        }
        for (name, value) in [
            ("accept backlog", config.accept_backlog),
            ("control queue capacity", config.control_queue_capacity),
            ("stream queue capacity", config.stream_queue_capacity),
        ] {
            if value == 0 {
                return Err(ConfigError::ZeroCapacity(name));
            }
        }
        Ok(config)
    }
}
