use std::sync::Arc;
use std::time::Duration;

use junction_sockets::{
    SockMessage, SocketClient, SocketHandler, SocketId, SocketKind, SocketServer,
};
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};

#[derive(Debug)]
enum Event {
    Accept(SocketId),
    Receive(SocketId, Vec<u8>, String),
    Close(SocketId),
}

/// Handler that records every callback and answers "ping" with "pong".
struct Recorder {
    events: UnboundedSender<Event>,
}

#[async_trait::async_trait]
impl SocketHandler for Recorder {
    async fn on_accept(&self, client: Arc<SocketClient>) {
        let _ = self.events.send(Event::Accept(client.id()));
    }

    async fn on_receive(&self, client: Arc<SocketClient>, msg: SockMessage) {
        let _ = self
            .events
            .send(Event::Receive(client.id(), msg.data.clone(), msg.from.clone()));
        if msg.data == b"ping" {
            let sent = if client.kind() == SocketKind::Datagram {
                client.send_to(b"pong", &msg.from).await
            } else {
                client.send(b"pong").await
            };
            sent.unwrap();
        }
    }

    async fn on_close(&self, client: Arc<SocketClient>) {
        let _ = self.events.send(Event::Close(client.id()));
    }
}

fn recorder() -> (Arc<Recorder>, UnboundedReceiver<Event>) {
    let (tx, rx) = unbounded_channel();
    (Arc::new(Recorder { events: tx }), rx)
}

/// Spawn `listen` and wait until the server has a bound address.
async fn start(server: &Arc<SocketServer>, handler: Arc<Recorder>) -> String {
    let listening = Arc::clone(server);
    tokio::spawn(async move { listening.listen(handler).await });
    for _ in 0..100 {
        let addr = server.local_addr();
        if !addr.is_empty() && !addr.ends_with(":0") {
            return addr;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("server did not bind");
}

async fn next_event(events: &mut UnboundedReceiver<Event>) -> Event {
    tokio::time::timeout(Duration::from_secs(2), events.recv())
        .await
        .expect("timed out waiting for event")
        .expect("event channel closed")
}

#[tokio::test]
async fn stream_server_orders_accept_receive_close() {
    let server = Arc::new(SocketServer::new("tcp://127.0.0.1:0").unwrap());
    let (handler, mut events) = recorder();
    let addr = start(&server, handler).await;

    let client = SocketClient::connect(&format!("tcp://{addr}")).await.unwrap();
    client.send(b"ping").await.unwrap();
    let reply = client.recv(4).await.unwrap();
    assert_eq!(reply.data, b"pong");

    client.close().await.unwrap();

    let accepted = match next_event(&mut events).await {
        Event::Accept(id) => id,
        other => panic!("expected accept first, got {other:?}"),
    };
    match next_event(&mut events).await {
        Event::Receive(id, data, _) => {
            assert_eq!(id, accepted);
            assert_eq!(data, b"ping");
        }
        other => panic!("expected receive second, got {other:?}"),
    }
    match next_event(&mut events).await {
        Event::Close(id) => assert_eq!(id, accepted),
        other => panic!("expected close last, got {other:?}"),
    }

    assert_eq!(server.client_count(), 0);
    server.close().await;
}

#[tokio::test]
async fn directory_tracks_adds_and_removals() {
    let server = Arc::new(SocketServer::new("tcp://127.0.0.1:0").unwrap());
    let (handler, mut events) = recorder();
    let addr = start(&server, handler).await;

    let a = SocketClient::connect(&format!("tcp://{addr}")).await.unwrap();
    let b = SocketClient::connect(&format!("tcp://{addr}")).await.unwrap();
    let c = SocketClient::connect(&format!("tcp://{addr}")).await.unwrap();
    for _ in 0..3 {
        match next_event(&mut events).await {
            Event::Accept(_) => {}
            other => panic!("expected accept, got {other:?}"),
        }
    }
    assert_eq!(server.client_count(), 3);
    assert_eq!(server.clients().len(), 3);

    a.close().await.unwrap();
    match next_event(&mut events).await {
        Event::Close(_) => {}
        other => panic!("expected close, got {other:?}"),
    }
    assert_eq!(server.client_count(), 2);

    server.close().await;
    assert_eq!(server.client_count(), 0);

    drop(b);
    drop(c);
}

#[tokio::test]
async fn server_close_is_idempotent() {
    let server = Arc::new(SocketServer::new("tcp://127.0.0.1:0").unwrap());
    let (handler, _events) = recorder();
    let listening = Arc::clone(&server);
    let listen_task =
        tokio::spawn(async move { listening.listen(handler).await });

    tokio::time::sleep(Duration::from_millis(50)).await;

    // A second close must be a harmless no-op, not a deadlock.
    server.close().await;
    server.close().await;

    tokio::time::timeout(Duration::from_secs(2), listen_task)
        .await
        .expect("listen did not return after close")
        .unwrap()
        .unwrap();
}

#[tokio::test]
async fn datagram_server_uses_one_synthetic_client() {
    let server = Arc::new(SocketServer::new("udp://127.0.0.1:0").unwrap());
    let (handler, mut events) = recorder();
    let addr = start(&server, handler).await;

    // The bound socket itself is the one client, accepted inline.
    match next_event(&mut events).await {
        Event::Accept(_) => {}
        other => panic!("expected accept, got {other:?}"),
    }
    assert_eq!(server.client_count(), 1);

    let client = SocketClient::bind("udp://127.0.0.1:0").await.unwrap();
    let client_addr = client.local_addr();
    client.send_to(b"ping", &addr).await.unwrap();

    match next_event(&mut events).await {
        Event::Receive(_, data, from) => {
            assert_eq!(data, b"ping");
            assert_eq!(from, client_addr);
        }
        other => panic!("expected receive, got {other:?}"),
    }

    let reply = client.recv(0).await.unwrap();
    assert_eq!(reply.data, b"pong");
    assert_eq!(reply.from, addr);

    // Still exactly one directory entry, and empty sends are rejected.
    assert_eq!(server.client_count(), 1);
    let synthetic = server.clients().pop().unwrap();
    assert!(server.send(&synthetic, b"", None).await.is_err());

    server.close().await;
}

#[tokio::test]
async fn framed_server_ping_pong() {
    let server = Arc::new(SocketServer::new("ws://127.0.0.1:0/echo").unwrap());
    let (handler, mut events) = recorder();
    let addr = start(&server, handler).await;

    let client = SocketClient::connect(&format!("ws://{addr}/echo"))
        .await
        .unwrap();
    client.send(b"ping").await.unwrap();

    let reply = client.recv(0).await.unwrap();
    assert_eq!(reply.data, b"pong");
    assert_eq!(reply.frame, Some(junction_sockets::FrameKind::Binary));

    match next_event(&mut events).await {
        Event::Accept(_) => {}
        other => panic!("expected accept, got {other:?}"),
    }
    match next_event(&mut events).await {
        Event::Receive(_, data, _) => assert_eq!(data, b"ping"),
        other => panic!("expected receive, got {other:?}"),
    }

    // Upgrades for unregistered paths are turned away.
    assert!(SocketClient::connect(&format!("ws://{addr}/other"))
        .await
        .is_err());

    server.close().await;
}
