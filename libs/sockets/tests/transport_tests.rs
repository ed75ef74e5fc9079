use junction_sockets::{
    codec::{BincodeCodec, Codec, JsonCodec},
    create_socket,
    error::Error,
    transport::StreamSocket,
    ConnectionTarget, Socket, SocketClient, SocketKind, SocketRegistry,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
struct TestMessage {
    id: u32,
    data: String,
}

/// Helper to get a listening stream socket on an ephemeral port
async fn stream_listener() -> (Arc<dyn Socket>, String) {
    let sock = create_socket("tcp://127.0.0.1:0").unwrap();
    sock.listen().await.unwrap();
    let addr = sock.local_addr();
    (sock, addr)
}

#[test]
fn target_parses_components() {
    let target =
        ConnectionTarget::parse("wss://127.0.0.1:6668/stream?cert=cert.pem&key=key.pem").unwrap();
    assert_eq!(target.kind(), SocketKind::Framed);
    assert_eq!(target.host(), "127.0.0.1:6668");
    assert_eq!(target.path(), "/stream");
    assert_eq!(target.option("cert"), Some("cert.pem"));
    assert_eq!(target.option("key"), Some("key.pem"));

    let target = ConnectionTarget::parse("unix:///tmp/demo.sock").unwrap();
    assert_eq!(target.kind(), SocketKind::Local);
    assert_eq!(target.path(), "/tmp/demo.sock");

    let target = ConnectionTarget::parse("TCP://127.0.0.1:6666").unwrap();
    assert_eq!(target.kind(), SocketKind::Stream);
    assert_eq!(target.host(), "127.0.0.1:6666");

    // ws targets default to the root path
    let target = ConnectionTarget::parse("ws://127.0.0.1:6668").unwrap();
    assert_eq!(target.path(), "/");
}

#[test]
fn target_rejects_unknown_scheme() {
    assert!(ConnectionTarget::parse("http://127.0.0.1:80").is_err());
    assert!(ConnectionTarget::parse("127.0.0.1:6666").is_err());
    assert!(ConnectionTarget::parse("").is_err());
}

#[test]
fn registry_first_registration_wins() {
    let mut registry = SocketRegistry::builtin();
    let result = registry.register(SocketKind::Stream, StreamSocket::create);
    assert!(matches!(result, Err(Error::AlreadyRegistered(_))));

    let empty = SocketRegistry::empty();
    match empty.create("tcp://127.0.0.1:6666") {
        Err(Error::NotRegistered(kind)) => assert_eq!(kind, SocketKind::Stream),
        other => panic!("expected NotRegistered, got {:?}", other.map(|_| ())),
    }
}

#[test]
fn address_queries_before_connect() {
    let sock = create_socket("tcp://127.0.0.1:6666").unwrap();
    assert_eq!(sock.local_addr(), "127.0.0.1:6666");
    assert_eq!(sock.remote_addr(), "");
    assert_eq!(sock.kind(), SocketKind::Stream);
}

#[tokio::test]
async fn stream_ping_pong() {
    let (listener, addr) = stream_listener().await;

    // Spawn server
    tokio::spawn(async move {
        let peer = listener.accept().await.unwrap();
        let msg = peer.recv(0).await.unwrap();
        assert_eq!(msg.data, b"ping");
        peer.send(b"pong", None).await.unwrap();
    });

    // Client
    let client = SocketClient::connect(&format!("tcp://{addr}")).await.unwrap();
    client.send(b"ping").await.unwrap();
    let reply = client.recv(4).await.unwrap();
    assert_eq!(reply.data, b"pong");
    assert_eq!(reply.len(), 4);
}

#[tokio::test]
async fn stream_recv_exact_spans_partial_writes() {
    let (listener, addr) = stream_listener().await;

    // Spawn server that delivers "pong" in two writes
    tokio::spawn(async move {
        let peer = listener.accept().await.unwrap();
        peer.send(b"po", None).await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        peer.send(b"ng", None).await.unwrap();
    });

    let client = SocketClient::connect(&format!("tcp://{addr}")).await.unwrap();
    let reply = client.recv(4).await.unwrap();
    assert_eq!(reply.data, b"pong");
}

#[tokio::test]
async fn stream_recv_once_stops_at_one_read() {
    let (listener, addr) = stream_listener().await;

    // Spawn server that sends two chunks far apart
    tokio::spawn(async move {
        let peer = listener.accept().await.unwrap();
        peer.send(b"first", None).await.unwrap();
        tokio::time::sleep(Duration::from_millis(200)).await;
        peer.send(b"second", None).await.unwrap();
    });

    let client = SocketClient::connect(&format!("tcp://{addr}")).await.unwrap();

    // Give the first chunk time to arrive, then take one read only
    tokio::time::sleep(Duration::from_millis(50)).await;
    let msg = client.recv(0).await.unwrap();
    assert_eq!(msg.data, b"first");
}

#[tokio::test]
async fn double_close_fails_second_time() {
    let (listener, addr) = stream_listener().await;

    tokio::spawn(async move {
        let _peer = listener.accept().await.unwrap();
        tokio::time::sleep(Duration::from_secs(2)).await;
    });

    let client = SocketClient::connect(&format!("tcp://{addr}")).await.unwrap();
    client.close().await.unwrap();
    match client.close().await {
        Err(Error::AlreadyClosed) => {}
        other => panic!("expected AlreadyClosed, got {:?}", other.map(|_| ())),
    }
}

#[tokio::test]
async fn close_without_resource_fails() {
    let sock = create_socket("tcp://127.0.0.1:6666").unwrap();
    match sock.close().await {
        Err(Error::NotConnected) => {}
        other => panic!("expected NotConnected, got {:?}", other.map(|_| ())),
    }
}

#[tokio::test]
async fn recv_error_after_peer_disconnect() {
    let (listener, addr) = stream_listener().await;

    tokio::spawn(async move {
        let peer = listener.accept().await.unwrap();
        peer.close().await.unwrap();
    });

    let client = SocketClient::connect(&format!("tcp://{addr}")).await.unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;

    match client.recv(0).await {
        Err(Error::ConnectionClosed) => {}
        other => panic!("expected ConnectionClosed, got {:?}", other.map(|m| m.data)),
    }
}

#[tokio::test]
async fn datagram_send_requires_destination() {
    let client = SocketClient::bind("udp://127.0.0.1:0").await.unwrap();
    match client.send(b"ping").await {
        Err(Error::DestinationRequired) => {}
        other => panic!("expected DestinationRequired, got {:?}", other),
    }
}

#[tokio::test]
async fn datagram_connect_is_unsupported() {
    let sock = create_socket("udp://127.0.0.1:0").unwrap();
    assert!(matches!(sock.connect().await, Err(Error::Unsupported(_))));
    assert!(sock.accept().await.is_none());
}

#[tokio::test]
async fn datagram_ping_pong_with_reply_address() {
    let server = SocketClient::bind("udp://127.0.0.1:0").await.unwrap();
    let client = SocketClient::bind("udp://127.0.0.1:0").await.unwrap();
    let server_addr = server.local_addr();
    let client_addr = client.local_addr();

    // Scheme-prefixed destinations are accepted and stripped
    client
        .send_to(b"ping", &format!("udp://{server_addr}"))
        .await
        .unwrap();

    let msg = server.recv(0).await.unwrap();
    assert_eq!(msg.data, b"ping");
    assert_eq!(msg.from, client_addr);

    server.send_to(b"pong", &msg.from).await.unwrap();
    let reply = client.recv(0).await.unwrap();
    assert_eq!(reply.data, b"pong");
    assert_eq!(reply.from, server_addr);
}

#[tokio::test]
async fn local_ping_pong_cleans_stale_socket_file() {
    let socket_path = "/tmp/junction_test_local_pingpong.sock";

    // A stale file at the path must not block the bind
    std::fs::write(socket_path, b"stale").unwrap();

    let listener = create_socket(&format!("unix://{socket_path}")).unwrap();
    listener.listen().await.unwrap();

    tokio::spawn(async move {
        let peer = listener.accept().await.unwrap();
        let msg = peer.recv(0).await.unwrap();
        assert_eq!(msg.data, b"ping");
        assert_eq!(msg.from, socket_path);
        peer.send(b"pong", None).await.unwrap();
    });

    tokio::time::sleep(Duration::from_millis(50)).await;

    let client = SocketClient::connect(&format!("unix://{socket_path}"))
        .await
        .unwrap();
    client.send(b"ping").await.unwrap();
    let reply = client.recv(4).await.unwrap();
    assert_eq!(reply.data, b"pong");

    let _ = std::fs::remove_file(socket_path);
}

#[tokio::test]
#[should_panic(expected = ".sock")]
async fn local_path_without_sock_suffix_aborts() {
    let sock = create_socket("unix:///tmp/junction_test_bad_suffix.txt").unwrap();
    let _ = sock.listen().await;
}

#[tokio::test]
async fn codec_roundtrip_over_stream() {
    let (listener, addr) = stream_listener().await;

    // Spawn echo server
    tokio::spawn(async move {
        let peer = listener.accept().await.unwrap();
        let msg = peer.recv(0).await.unwrap();
        peer.send(&msg.data, None).await.unwrap();
    });

    let expected = TestMessage {
        id: 42,
        data: "test data".to_string(),
    };

    let client = SocketClient::connect(&format!("tcp://{addr}")).await.unwrap();
    client.send_encoded(&JsonCodec, &expected).await.unwrap();
    let response: TestMessage = client.recv_decoded(&JsonCodec, 0).await.unwrap();
    assert_eq!(response, expected);
}

#[test]
fn bincode_codec_roundtrip() {
    let msg = TestMessage {
        id: 7,
        data: "binary".to_string(),
    };
    let bytes = BincodeCodec.encode(&msg).unwrap();
    let decoded: TestMessage = BincodeCodec.decode(&bytes).unwrap();
    assert_eq!(decoded, msg);
}
