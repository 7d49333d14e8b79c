//! Window accounting against a scripted peer.

use std::time::Duration;

use bytes::Bytes;
use muxframe::{
    Config,
    ErrorCode,
    Flags,
    Frame,
    FrameType,
    Mode,
    ProtocolViolation,
    SessionError,
    StreamError,
    frame::INITIAL_STREAM_WINDOW,
};
use muxframe_testing::RawPeer;
use tokio::time::timeout;

/// Collect `Data` payload bytes for `stream_id` until `total` have arrived.
async fn recv_data(peer: &mut RawPeer, stream_id: u32, total: usize) -> usize {
    let mut received = 0;
    while received < total {
        let frame = peer.recv_type(FrameType::Data).await;
        assert_eq!(frame.stream_id(), stream_id);
        assert!(frame.body().len() <= 64 * 1024, "frame exceeds payload limit");
        received += frame.body().len();
    }
    received
}

#[tokio::test]
async fn sender_blocks_on_exhausted_window_until_update() {
    let (session, mut peer) = RawPeer::connect(Mode::Client, Config::default());
    let stream = session.open_stream().await.expect("open");
    let syn = peer.recv().await.expect("SYN");
    assert_eq!(syn.frame_type(), FrameType::WindowUpdate);
    assert_eq!(syn.flags(), Flags::SYN);
    assert_eq!(syn.stream_id(), 1);
    peer.send(Frame::window_update(1, Flags::ACK, 0)).await;

    let writer = tokio::spawn(async move {
        let payload = vec![7u8; 300_000];
        stream.write_all(&payload).await.map(|()| stream)
    });

    let first = recv_data(&mut peer, 1, INITIAL_STREAM_WINDOW as usize).await;
    assert_eq!(first, INITIAL_STREAM_WINDOW as usize);
    assert!(
        timeout(Duration::from_millis(100), peer.recv()).await.is_err(),
        "sender exceeded the advertised window"
    );
    assert!(!writer.is_finished());

    peer.send(Frame::window_update(1, Flags::NONE, 37_856)).await;
    let rest = recv_data(&mut peer, 1, 37_856).await;
    assert_eq!(rest, 37_856);
    let stream = timeout(Duration::from_secs(5), writer)
        .await
        .expect("writer finished")
        .expect("writer task")
        .expect("write_all");
    assert_eq!(stream.id(), 1);
}

#[tokio::test]
async fn reader_returns_credit_once_half_the_window_is_consumed() {
    let (session, mut peer) = RawPeer::connect(Mode::Client, Config::default());
    peer.send(Frame::window_update(2, Flags::SYN, 0)).await;
    let stream = session.accept_stream().await.expect("accept");
    assert_eq!(stream.id(), 2);
    let ack = peer.recv().await.expect("ACK");
    assert_eq!(ack.flags(), Flags::ACK);

    let chunk = Bytes::from(vec![1u8; 65_536]);
    for _ in 0..2 {
        peer.send(Frame::data(2, Flags::NONE, chunk.clone())).await;
    }
    let mut buf = vec![0u8; 131_072];
    stream.read_exact(&mut buf).await.expect("read");

    let update = peer.recv_type(FrameType::WindowUpdate).await;
    assert_eq!(update.stream_id(), 2);
    assert_eq!(update.flags(), Flags::NONE);
    assert_eq!(update.delta(), 131_072);
}

#[tokio::test]
async fn larger_configured_window_is_advertised_on_open() {
    let config = Config::builder()
        .max_stream_window(1024 * 1024)
        .build()
        .expect("valid config");
    let (session, mut peer) = RawPeer::connect(Mode::Server, config);
    let _stream = session.open_stream().await.expect("open");
    let syn = peer.recv().await.expect("SYN");
    assert_eq!(syn.stream_id(), 2);
    assert_eq!(syn.delta(), 1024 * 1024 - INITIAL_STREAM_WINDOW);
}

#[tokio::test]
async fn window_violation_sends_protocol_go_away() {
    let (session, mut peer) = RawPeer::connect(Mode::Client, Config::default());
    peer.send(Frame::window_update(2, Flags::SYN, 0)).await;
    let stream = session.accept_stream().await.expect("accept");

    let fill = Bytes::from(vec![0u8; (INITIAL_STREAM_WINDOW - 4) as usize]);
    peer.send(Frame::data(2, Flags::NONE, fill)).await;
    peer.send(Frame::data(2, Flags::NONE, Bytes::from_static(&[0u8; 10])))
        .await;

    let go_away = peer.recv_type(FrameType::GoAway).await;
    assert_eq!(go_away.error_code(), ErrorCode::ProtocolError);
    peer.recv_until_closed().await;

    timeout(Duration::from_secs(5), session.closed())
        .await
        .expect("session terminated");
    let expected = ProtocolViolation::WindowViolation {
        stream_id: 2,
        length: 10,
        available: 4,
    };
    assert!(matches!(
        session.terminal_error(),
        Some(SessionError::Protocol(ref v)) if *v == expected
    ));

    let mut buf = [0u8; 16];
    assert!(matches!(
        stream.read(&mut buf).await,
        Err(StreamError::Session(SessionError::Protocol(_)))
    ));
}
