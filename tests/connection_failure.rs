//! A failing transport terminates every stream deterministically.

use std::{io, sync::Arc, time::Duration};

use muxframe::{Config, Mode, SessionError, SessionState, StreamError};
use muxframe_testing::{RawPeer, faulty_session_pair};
use tokio::time::timeout;

const WAIT: Duration = Duration::from_secs(5);

fn is_connection_error(err: &StreamError) -> bool {
    matches!(err, StreamError::Session(SessionError::Connection(_)))
}

#[tokio::test]
async fn read_failure_unblocks_every_pending_operation() {
    let (client, server, fault) = faulty_session_pair(Config::default());
    let stream = Arc::new(client.open_stream().await.expect("open"));
    let _inbound = server.accept_stream().await.expect("accept");

    // The server never reads, so the writer stalls once the window is gone.
    let writer = {
        let stream = Arc::clone(&stream);
        tokio::spawn(async move { stream.write_all(&vec![0u8; 400_000]).await })
    };
    let reader = {
        let stream = Arc::clone(&stream);
        tokio::spawn(async move {
            let mut buf = [0u8; 16];
            stream.read(&mut buf).await
        })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(!writer.is_finished());
    assert!(!reader.is_finished());

    fault.trip();

    let write_err = timeout(WAIT, writer)
        .await
        .expect("writer unblocked")
        .expect("writer task")
        .expect_err("write fails");
    let read_err = timeout(WAIT, reader)
        .await
        .expect("reader unblocked")
        .expect("reader task")
        .expect_err("read fails");
    assert!(is_connection_error(&write_err), "{write_err:?}");
    assert!(is_connection_error(&read_err), "{read_err:?}");
    assert_eq!(io::Error::from(read_err).kind(), io::ErrorKind::ConnectionReset);

    timeout(WAIT, client.closed()).await.expect("client closed");
    assert_eq!(client.state(), SessionState::Closed);
    assert_eq!(client.num_streams(), 0);
    assert!(matches!(
        client.accept_stream().await,
        Err(SessionError::Connection(_))
    ));
    assert!(matches!(
        client.open_stream().await,
        Err(SessionError::Connection(_))
    ));
    assert!(matches!(client.ping().await, Err(SessionError::Connection(_))));
}

#[tokio::test]
async fn peer_disconnect_fails_streams_and_pending_pings() {
    let (session, mut peer) = RawPeer::connect(Mode::Client, Config::default());
    let stream = session.open_stream().await.expect("open");
    let _syn = peer.recv().await.expect("SYN");

    let (ping, ()) = tokio::join!(session.ping(), async {
        let _request = peer.recv().await.expect("ping request");
        drop(peer);
    });
    assert!(matches!(ping, Err(SessionError::Connection(_))));

    let mut buf = [0u8; 4];
    let err = stream.read(&mut buf).await.expect_err("stream failed");
    assert!(is_connection_error(&err));
    assert!(matches!(
        session.terminal_error(),
        Some(SessionError::Connection(ref e)) if e.kind() == io::ErrorKind::UnexpectedEof
    ));
}
