//! Integration tests for the framed TCP transport over a loopback socket.

use palisade_protocol::{ENVELOPE_HEADER_LEN, Envelope};
use palisade_transport::{Conn, ConnTimeouts, FramedTcp, TransportError};
use tokio::net::{TcpListener, TcpStream};

const MAX: usize = 1024;

/// Returns a connected (server, client) pair of framed conns with
/// independent size caps.
async fn conn_pair_with_caps(server_max: usize, client_max: usize) -> (FramedTcp, FramedTcp) {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");

    let client = TcpStream::connect(addr).await.expect("connect");
    let (server, _) = listener.accept().await.expect("accept");

    (
        FramedTcp::new(server, server_max, ConnTimeouts::default()),
        FramedTcp::new(client, client_max, ConnTimeouts::default()),
    )
}

async fn conn_pair(max: usize) -> (FramedTcp, FramedTcp) {
    conn_pair_with_caps(max, max).await
}

#[tokio::test]
async fn test_write_then_read_round_trips_envelope() {
    let (server, client) = conn_pair(MAX).await;

    let env = Envelope::new(1001, 7, 10001, b"payload".to_vec());
    client.write_envelope(&env).await.expect("write");

    let got = server.read_envelope().await.expect("read");
    assert_eq!(got, env);
}

#[tokio::test]
async fn test_frames_preserve_order_on_one_conn() {
    let (server, client) = conn_pair(MAX).await;

    for i in 0..10 {
        let env = Envelope::new(1001, i, 0, vec![i as u8]);
        client.write_envelope(&env).await.expect("write");
    }
    for i in 0..10 {
        let got = server.read_envelope().await.expect("read");
        assert_eq!(got.session_id, i);
        assert_eq!(got.payload, vec![i as u8]);
    }
}

#[tokio::test]
async fn test_envelope_of_exactly_max_size_succeeds() {
    let (server, client) = conn_pair(MAX).await;

    let payload = vec![0xAB; MAX - ENVELOPE_HEADER_LEN];
    let env = Envelope::new(1, 1, 0, payload);
    assert_eq!(env.encoded_len(), MAX);

    client.write_envelope(&env).await.expect("write at cap");
    let got = server.read_envelope().await.expect("read at cap");
    assert_eq!(got, env);
}

#[tokio::test]
async fn test_writer_refuses_envelope_one_byte_over_max() {
    let (_server, client) = conn_pair(MAX).await;

    let env = Envelope::new(1, 1, 0, vec![0xAB; MAX - ENVELOPE_HEADER_LEN + 1]);
    let err = client.write_envelope(&env).await.expect_err("over cap");
    assert!(matches!(
        err,
        TransportError::FrameTooLarge { len, max } if len == MAX + 1 && max == MAX
    ));
}

#[tokio::test]
async fn test_reader_fails_oversized_incoming_frame() {
    // The client's cap is twice the server's, so it can legally send a
    // frame the server must refuse on the length prefix alone.
    let (server, client) = conn_pair_with_caps(MAX, MAX * 2).await;

    let big = Envelope::new(1, 1, 0, vec![0; MAX]);
    client.write_envelope(&big).await.expect("client-side ok");

    let err = server.read_envelope().await.expect_err("too large");
    assert!(matches!(
        err,
        TransportError::FrameTooLarge { len, max }
            if len == MAX + ENVELOPE_HEADER_LEN && max == MAX
    ));
}

#[tokio::test]
async fn test_read_after_peer_close_returns_closed() {
    let (server, client) = conn_pair(MAX).await;

    client.close().await;
    drop(client);

    let err = server.read_envelope().await.expect_err("closed");
    assert!(matches!(err, TransportError::Closed));
}
