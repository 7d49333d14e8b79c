//! Hostile or malformed peer traffic ends the session with a
//! `GoAway(ProtocolError)`.

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
    SessionState,
    codec::FramingError,
};
use muxframe_testing::{LoggerHandle, RawPeer, logger};
use rstest::rstest;

async fn expect_protocol_go_away(peer: &mut RawPeer) {
    let go_away = peer.recv_type(FrameType::GoAway).await;
    assert_eq!(go_away.error_code(), ErrorCode::ProtocolError);
    assert_eq!(go_away.stream_id(), 0);
    // The connection is released afterwards.
    let rest = peer.recv_until_closed().await;
    assert!(rest.iter().all(|f| f.frame_type() != FrameType::GoAway));
}

fn violation(err: Option<SessionError>) -> ProtocolViolation {
    match err {
        Some(SessionError::Protocol(violation)) => violation,
        other => panic!("expected a protocol error, got {other:?}"),
    }
}

#[rstest]
#[case::bad_version([1, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0], FramingError::UnsupportedVersion { version: 1 })]
#[case::unknown_type([0, 9, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0], FramingError::UnknownFrameType { type_id: 9 })]
#[tokio::test]
async fn malformed_headers_are_fatal(#[case] header: [u8; 12], #[case] expected: FramingError) {
    let (session, mut peer) = RawPeer::connect(Mode::Server, Config::default());
    peer.send_raw(&header).await;
    expect_protocol_go_away(&mut peer).await;
    session.closed().await;
    assert_eq!(session.state(), SessionState::Closed);
    assert_eq!(
        violation(session.terminal_error()),
        ProtocolViolation::Framing(expected)
    );
}

#[tokio::test]
async fn truncated_frame_is_fatal() {
    let (session, mut peer) = RawPeer::connect(Mode::Server, Config::default());
    // A Data header announcing 8 bytes, followed by only 3.
    peer.send_raw(&[0, 0, 0, 1, 0, 0, 0, 1, 0, 0, 0, 8, 1, 2, 3]).await;
    peer.shutdown_write().await;
    expect_protocol_go_away(&mut peer).await;
    session.closed().await;
    assert_eq!(
        violation(session.terminal_error()),
        ProtocolViolation::TruncatedFrame
    );
}

#[rstest]
#[case::wrong_parity(Mode::Server, 2, ProtocolViolation::InvalidStreamId(2))]
#[case::session_id(Mode::Server, 0, ProtocolViolation::InvalidStreamId(0))]
#[case::client_wrong_parity(Mode::Client, 1, ProtocolViolation::InvalidStreamId(1))]
#[tokio::test]
async fn invalid_stream_ids_are_fatal(
    #[case] mode: Mode,
    #[case] id: u32,
    #[case] expected: ProtocolViolation,
) {
    let (session, mut peer) = RawPeer::connect(mode, Config::default());
    peer.send(Frame::window_update(id, Flags::SYN, 0)).await;
    expect_protocol_go_away(&mut peer).await;
    session.closed().await;
    assert_eq!(violation(session.terminal_error()), expected);
}

#[rstest]
#[tokio::test]
async fn duplicate_syn_is_fatal_and_logged(mut logger: LoggerHandle) {
    let (session, mut peer) = RawPeer::connect(Mode::Server, Config::default());
    peer.send(Frame::window_update(1, Flags::SYN, 0)).await;
    peer.send(Frame::window_update(1, Flags::SYN, 0)).await;
    expect_protocol_go_away(&mut peer).await;
    session.closed().await;
    assert_eq!(
        violation(session.terminal_error()),
        ProtocolViolation::DuplicateStream(1)
    );
    assert!(logger.contains("protocol violation"));
}

#[tokio::test]
async fn frames_for_unknown_streams_are_ignored() {
    let (session, mut peer) = RawPeer::connect(Mode::Server, Config::default());
    peer.send(Frame::data(41, Flags::NONE, Bytes::from_static(b"stray")))
        .await;
    peer.send(Frame::window_update(43, Flags::FIN, 0)).await;

    // The session is still alive and serving new streams.
    peer.send(Frame::window_update(1, Flags::SYN, 0)).await;
    peer.send(Frame::data(1, Flags::NONE, Bytes::from_static(b"ok")))
        .await;
    let stream = session.accept_stream().await.expect("accept");
    assert_eq!(stream.id(), 1);
    let mut buf = [0u8; 2];
    stream.read_exact(&mut buf).await.expect("read");
    assert_eq!(&buf, b"ok");

    let ack = peer.recv_type(FrameType::WindowUpdate).await;
    assert_eq!(ack.stream_id(), 1);
    assert!(ack.flags().contains(Flags::ACK));
    assert_eq!(session.state(), SessionState::Open);
}

#[tokio::test]
async fn oversized_data_frame_is_fatal() {
    let (session, mut peer) = RawPeer::connect(Mode::Server, Config::default());
    peer.send(Frame::window_update(1, Flags::SYN, 0)).await;
    // The codec rejects a body larger than the receive window outright.
    let body = Bytes::from(vec![0u8; 300_000]);
    peer.send(Frame::data(1, Flags::NONE, body)).await;
    expect_protocol_go_away(&mut peer).await;
    session.closed().await;
    assert!(matches!(
        violation(session.terminal_error()),
        ProtocolViolation::Framing(FramingError::OversizedFrame { .. })
    ));
}
