//! Demonstration binary for `muxframe`.
//!
//! `serve` runs an echo server, `ping` measures round-trip times and `send`
//! pushes a payload through one stream and checks the echo.

mod cli;

use std::{net::SocketAddr, sync::Arc, time::Duration};

use clap::Parser;
use cli::{Cli, Command};
use muxframe::{Config, Dialer, ErrorCode, Listener, Session, Stream};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[tokio::main]
async fn main() -> Result<(), BoxError> {
    // Applications embedding the library should install their own subscriber.
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();
    if let Some(addr) = cli.metrics_addr {
        install_exporter(addr)?;
    }
    match cli.command {
        Command::Serve { bind } => serve(bind).await,
        Command::Ping {
            connect,
            count,
            interval,
        } => ping(connect, count, Duration::from_millis(interval)).await,
        Command::Send { connect, bytes } => send(connect, bytes).await,
    }
}

#[cfg(feature = "metrics")]
fn install_exporter(addr: SocketAddr) -> Result<(), BoxError> {
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()?;
    log::info!("metrics exporter listening: addr={addr}");
    Ok(())
}

#[cfg(not(feature = "metrics"))]
fn install_exporter(addr: SocketAddr) -> Result<(), BoxError> {
    log::warn!("built without the metrics feature; ignoring --metrics-addr {addr}");
    Ok(())
}

async fn serve(bind: SocketAddr) -> Result<(), BoxError> {
    let listener = Listener::bind(bind, Config::default()).await?;
    let shutdown = CancellationToken::new();
    let token = shutdown.clone();
    tokio::spawn(async move {
        let _ = tokio::signal::ctrl_c().await;
        token.cancel();
    });

    let stop = shutdown.clone();
    listener
        .run(shutdown, move |session, peer| {
            let stop = stop.clone();
            async move {
                log::info!("session opened: peer={peer}");
                echo_session(session, stop).await;
                log::info!("session finished: peer={peer}");
            }
        })
        .await;
    Ok(())
}

async fn echo_session(session: Session, stop: CancellationToken) {
    loop {
        let accepted = tokio::select! {
            () = stop.cancelled() => None,
            accepted = session.accept_stream() => Some(accepted),
        };
        match accepted {
            Some(Ok(stream)) => {
                tokio::spawn(echo_stream(stream));
            }
            Some(Err(err)) => {
                log::debug!("accept loop ended: {err}");
                break;
            }
            None => {
                if let Err(err) = session.go_away(ErrorCode::Normal).await {
                    log::debug!("go away not sent: {err}");
                }
                break;
            }
        }
    }
    session.closed().await;
}

async fn echo_stream(stream: Stream) {
    let mut buf = vec![0u8; 16 * 1024];
    loop {
        match stream.read(&mut buf).await {
            Ok(0) => break,
            Ok(n) => {
                if let Err(err) = stream.write_all(&buf[..n]).await {
                    log::debug!("echo write failed: stream_id={}, error={err}", stream.id());
                    return;
                }
            }
            Err(err) => {
                log::debug!("echo read failed: stream_id={}, error={err}", stream.id());
                return;
            }
        }
    }
    if let Err(err) = stream.close_write().await {
        log::debug!("echo close failed: stream_id={}, error={err}", stream.id());
    }
}

async fn ping(connect: SocketAddr, count: u32, interval: Duration) -> Result<(), BoxError> {
    let session = Dialer::new(Config::default()).connect(connect).await?;
    for seq in 0..count {
        if seq > 0 {
            tokio::time::sleep(interval).await;
        }
        let rtt = session.ping().await?;
        println!("ping {connect}: seq={seq} time={:.3}ms", rtt.as_secs_f64() * 1000.0);
    }
    session.go_away(ErrorCode::Normal).await?;
    session.closed().await;
    Ok(())
}

#[expect(
    clippy::cast_possible_truncation,
    clippy::cast_precision_loss,
    reason = "test pattern bytes and throughput display"
)]
async fn send(connect: SocketAddr, bytes: usize) -> Result<(), BoxError> {
    let session = Dialer::new(Config::default()).connect(connect).await?;
    let stream = Arc::new(session.open_stream().await?);
    let payload: Vec<u8> = (0..bytes).map(|i| (i % 251) as u8).collect();
    let started = Instant::now();

    let writer = {
        let stream = Arc::clone(&stream);
        let payload = payload.clone();
        tokio::spawn(async move {
            stream.write_all(&payload).await?;
            stream.close_write().await
        })
    };

    let mut echoed = Vec::with_capacity(bytes);
    let mut buf = vec![0u8; 64 * 1024];
    loop {
        let n = stream.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        echoed.extend_from_slice(&buf[..n]);
    }
    writer.await??;

    let elapsed = started.elapsed();
    if echoed != payload {
        return Err(format!("echo mismatch: sent {bytes} bytes, received {}", echoed.len()).into());
    }
    println!(
        "sent and verified {bytes} bytes in {:.3}s ({:.1} MiB/s)",
        elapsed.as_secs_f64(),
        bytes as f64 / (1024.0 * 1024.0) / elapsed.as_secs_f64().max(f64::EPSILON)
    );
    session.close(ErrorCode::Normal);
    session.closed().await;
    Ok(())
}
