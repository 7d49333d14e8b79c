//! Caller-supplied deadlines bound blocking reads and writes.

use std::time::Duration;

use muxframe::{Config, Flags, Frame, FrameType, Mode, StreamError, StreamState};
use muxframe_testing::{RawPeer, session_pair};
use tokio::time::Instant;

const WINDOW: usize = 256 * 1024;

/// Read frames until `total` bytes of `Data` have arrived.
async fn drain_data(peer: &mut RawPeer, total: usize) -> usize {
    let mut received = 0;
    while received < total {
        let frame = peer.recv().await.expect("connection open");
        if frame.frame_type() == FrameType::Data {
            received += frame.body().len();
        }
    }
    received
}

#[tokio::test(start_paused = true)]
async fn read_deadline_times_out_and_leaves_stream_usable() {
    let (client, server) = session_pair(Config::default());
    let outbound = client.open_stream().await.expect("open");
    let inbound = server.accept_stream().await.expect("accept");

    let start = Instant::now();
    inbound.set_read_deadline(Some(start + Duration::from_millis(100)));
    let mut buf = [0u8; 8];
    let err = inbound.read(&mut buf).await.expect_err("deadline");
    assert!(matches!(err, StreamError::Timeout));
    assert!(start.elapsed() >= Duration::from_millis(100));
    assert_eq!(inbound.state(), StreamState::Established);

    inbound.set_read_deadline(None);
    outbound.write_all(b"late").await.expect("write");
    let mut late = [0u8; 4];
    inbound.read_exact(&mut late).await.expect("read after timeout");
    assert_eq!(&late, b"late");
}

#[tokio::test(start_paused = true)]
async fn past_read_deadline_still_returns_buffered_data() {
    let (client, server) = session_pair(Config::default());
    let outbound = client.open_stream().await.expect("open");
    outbound.write_all(b"ready").await.expect("write");
    let inbound = server.accept_stream().await.expect("accept");

    let mut buf = [0u8; 5];
    inbound.read_exact(&mut buf).await.expect("read");
    outbound.write_all(b"more").await.expect("write");
    tokio::time::sleep(Duration::from_millis(10)).await;

    inbound.set_read_deadline(Some(Instant::now()));
    let mut more = [0u8; 4];
    assert_eq!(inbound.read(&mut more).await.expect("buffered"), 4);
    assert!(matches!(
        inbound.read(&mut more).await,
        Err(StreamError::Timeout)
    ));
}

#[tokio::test(start_paused = true)]
async fn write_deadline_bounds_the_wait_for_window() {
    let (client, server) = session_pair(Config::default());
    let outbound = client.open_stream().await.expect("open");
    let inbound = server.accept_stream().await.expect("accept");

    outbound.write_all(&vec![7u8; WINDOW]).await.expect("fill window");
    outbound.set_write_deadline(Some(Instant::now() + Duration::from_millis(50)));
    let err = outbound.write(b"x").await.expect_err("window exhausted");
    assert!(matches!(err, StreamError::Timeout));
    assert_eq!(outbound.state(), StreamState::Established);

    // Draining half the window sends the update that lets the writer go on.
    let mut half = vec![0u8; WINDOW / 2];
    inbound.read_exact(&mut half).await.expect("drain");
    outbound.set_write_deadline(None);
    assert_eq!(outbound.write(b"x").await.expect("window granted"), 1);
}

#[tokio::test(start_paused = true)]
async fn write_deadline_bounds_a_full_outbound_queue() {
    const GRANT: u32 = 2 * 1024 * 1024;
    let config = Config::builder()
        .stream_queue_capacity(1)
        .build()
        .expect("valid config");
    let (session, mut peer) = RawPeer::connect(Mode::Client, config);
    let stream = session.open_stream().await.expect("open");
    let syn = peer.recv().await.expect("SYN");
    assert!(syn.flags().contains(Flags::SYN));
    peer.send(Frame::window_update(stream.id(), Flags::ACK, GRANT))
        .await;
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert_eq!(stream.state(), StreamState::Established);

    // The peer is not reading, so the connection backs up long before the
    // window runs out.
    let window = WINDOW + GRANT as usize;
    stream.set_write_deadline(Some(Instant::now() + Duration::from_millis(100)));
    let written = stream.write(&vec![1u8; window]).await.expect("partial write");
    assert!(written > 0 && written < window, "wrote {written} of {window}");

    let err = stream.write(b"x").await.expect_err("queue still full");
    assert!(matches!(err, StreamError::Timeout));
    assert_eq!(stream.state(), StreamState::Established);

    // Window reserved but never queued was handed back, so once the peer
    // drains the connection the rest goes out without any new credit.
    stream.set_write_deadline(Some(Instant::now() + Duration::from_secs(1)));
    let remaining = vec![2u8; window - written];
    let (sent, received) = tokio::join!(
        stream.write_all(&remaining),
        drain_data(&mut peer, window)
    );
    sent.expect("refunded window suffices");
    assert_eq!(received, window);
}
