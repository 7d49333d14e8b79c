//! Utilities for exercising [`muxframe`] sessions in tests.
//!
//! Sessions run over in-memory `tokio::io::duplex` pipes. [`session_pair`]
//! connects a client and a server session; [`RawPeer`] puts a scripted
//! frame-level peer on the far end of a single session so tests can send
//! malformed or hostile traffic; [`FaultyIo`] injects read failures.
//!
//! ```rust
//! use muxframe::Config;
//! use muxframe_testing::session_pair;
//!
//! # async fn example() {
//! let (client, server) = session_pair(Config::default());
//! let outbound = client.open_stream().await.unwrap();
//! outbound.write_all(b"hi").await.unwrap();
//! let inbound = server.accept_stream().await.unwrap();
//! # }
//! ```

pub mod fault;
pub mod logging;
pub mod pair;
pub mod peer;

pub use fault::{FaultHandle, FaultyIo};
pub use logging::{LoggerHandle, logger};
pub use pair::{DUPLEX_CAPACITY, faulty_session_pair, session_pair, sessions};
pub use peer::RawPeer;
