//! Command line interface for the `muxframe` demonstration binary.
//!
//! Shared with the build script, which renders it as a man page, so it only
//! depends on `clap` and the standard library.

use std::net::SocketAddr;

use clap::{Parser, Subcommand};

/// Command line arguments for the `muxframe` binary.
#[derive(Debug, Parser)]
#[command(name = "muxframe", version, about = "Multiplexed stream sessions over TCP")]
pub struct Cli {
    /// Expose Prometheus metrics on this address.
    #[arg(long, global = true)]
    pub metrics_addr: Option<SocketAddr>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Accept sessions and echo every stream back to its sender.
    Serve {
        /// Address to listen on.
        #[arg(short, long, default_value = "127.0.0.1:7700")]
        bind: SocketAddr,
    },
    /// Measure round-trip times to a server.
    Ping {
        /// Server address.
        #[arg(short, long, default_value = "127.0.0.1:7700")]
        connect: SocketAddr,
        /// Number of pings to send.
        #[arg(short = 'n', long, default_value_t = 4)]
        count: u32,
        /// Milliseconds between pings.
        #[arg(short, long, default_value_t = 1000)]
        interval: u64,
    },
    /// Send bytes over one stream and verify the echo.
    Send {
        /// Server address.
        #[arg(short, long, default_value = "127.0.0.1:7700")]
        connect: SocketAddr,
        /// Number of bytes to send.
        #[arg(short, long, default_value_t = 1 << 20)]
        bytes: usize,
    },
}

#[cfg(test)]
mod tests {
    use clap::Parser;

    use super::{Cli, Command};

    #[test]
    fn parses_serve_address() {
        let cli = Cli::parse_from(["muxframe", "serve", "--bind", "0.0.0.0:9000"]);
        match cli.command {
            Command::Serve { bind } => assert_eq!(bind.port(), 9000),
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn ping_has_defaults() {
        let cli = Cli::parse_from(["muxframe", "ping"]);
        match cli.command {
            Command::Ping {
                count, interval, ..
            } => {
                assert_eq!(count, 4);
                assert_eq!(interval, 1000);
            }
            other => panic!("unexpected command: {other:?}"),
        }
        assert!(cli.metrics_addr.is_none());
    }

    #[test]
    fn metrics_flag_is_global() {
        let cli = Cli::parse_from([
            "muxframe",
            "send",
            "--bytes",
            "10",
            "--metrics-addr",
            "127.0.0.1:9100",
        ]);
        assert!(cli.metrics_addr.is_some());
        assert!(matches!(cli.command, Command::Send { bytes: 10, .. }));
    }
}
