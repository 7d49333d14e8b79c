//! Connected session pairs over in-memory pipes.

use muxframe::{Config, Session};
use rstest::fixture;

use crate::fault::{FaultHandle, FaultyIo};

/// Buffer size of each direction of the duplex pipe.
pub const DUPLEX_CAPACITY: usize = 1 << 20;

/// A client and a server session connected to each other.
///
/// # Panics
///
/// Panics if called outside a tokio runtime.
pub fn session_pair(config: Config) -> (Session, Session) {
    let (client_io, server_io) = tokio::io::duplex(DUPLEX_CAPACITY);
    (
        Session::client(client_io, config),
        Session::server(server_io, config),
    )
}

/// Like [`session_pair`], but the client's reads fail once the returned
/// handle is tripped.
pub fn faulty_session_pair(config: Config) -> (Session, Session, FaultHandle) {
    let (client_io, server_io) = tokio::io::duplex(DUPLEX_CAPACITY);
    let (client_io, fault) = FaultyIo::new(client_io);
    (
        Session::client(client_io, config),
        Session::server(server_io, config),
        fault,
    )
}

/// rstest fixture yielding a default-configured session pair.
#[allow(
    unused_braces,
    reason = "rustc false positive for single line rstest fixtures"
)]
#[fixture]
pub fn sessions() -> (Session, Session) { session_pair(Config::default()) }
