use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use junction_core::{SocketKind, EVENT_QUEUE_SIZE};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::client::SocketClient;
use crate::error::{Error, Result};
use crate::message::SockMessage;
use crate::registry::SocketRegistry;
use crate::transport::{Socket, SocketId};

/// Application callbacks invoked by the server's internal tasks.
///
/// `on_accept` and `on_close` run on the single dispatch loop; blocking
/// them stalls accept/close delivery for every connection. `on_receive`
/// runs on the per-connection read loop and only stalls its own
/// connection.
#[async_trait::async_trait]
pub trait SocketHandler: Send + Sync {
    /// A connection was accepted and entered the directory.
    async fn on_accept(&self, client: Arc<SocketClient>);

    /// A message arrived on a live connection.
    async fn on_receive(&self, client: Arc<SocketClient>, msg: SockMessage);

    /// A connection ended and left the directory. Peer disconnects and
    /// transport errors both land here; there is no distinction.
    async fn on_close(&self, client: Arc<SocketClient>);
}

/// Transport-agnostic socket server.
///
/// Owns the listening socket, one accept task, one dispatch task, a read
/// task per live connection and the directory of active clients.
///
/// ```no_run
/// use std::sync::Arc;
/// use junction_sockets::{SocketClient, SocketHandler, SocketServer, SockMessage};
///
/// struct Echo;
///
/// #[async_trait::async_trait]
/// impl SocketHandler for Echo {
///     async fn on_accept(&self, _client: Arc<SocketClient>) {}
///     async fn on_receive(&self, client: Arc<SocketClient>, msg: SockMessage) {
///         let _ = client.send(&msg.data).await;
///     }
///     async fn on_close(&self, _client: Arc<SocketClient>) {}
/// }
///
/// # async fn example() -> junction_sockets::Result<()> {
/// let server = Arc::new(SocketServer::new("tcp://0.0.0.0:6666")?);
/// server.listen(Arc::new(Echo)).await?;
/// # Ok(())
/// # }
/// ```
pub struct SocketServer {
    url: String,
    sock: Arc<dyn Socket>,
    clients: parking_lot::Mutex<HashMap<SocketId, Arc<SocketClient>>>,
    cancel: CancellationToken,
    closed: AtomicBool,
}

impl SocketServer {
    /// Build a server for `url` with the builtin transports.
    pub fn new(url: &str) -> Result<Self> {
        Self::with_registry(&SocketRegistry::builtin(), url)
    }

    /// Build a server using an explicit registry.
    pub fn with_registry(registry: &SocketRegistry, url: &str) -> Result<Self> {
        let sock = registry.create(url)?;
        Ok(Self {
            url: url.to_string(),
            sock,
            clients: parking_lot::Mutex::new(HashMap::new()),
            cancel: CancellationToken::new(),
            closed: AtomicBool::new(false),
        })
    }

    /// Bind and serve until [`close`](Self::close) is called.
    ///
    /// Connection-oriented transports get an accept task feeding a
    /// bounded queue and a dispatch task consuming accept/close events.
    /// Datagram targets get exactly one synthetic client: the bound
    /// socket itself, with every peer distinguished by the message's
    /// `from` address.
    pub async fn listen(self: Arc<Self>, handler: Arc<dyn SocketHandler>) -> Result<()> {
        self.sock.listen().await?;
        info!(kind = %self.sock.kind(), addr = %self.sock.local_addr(), "listening");

        if self.sock.kind() == SocketKind::Datagram {
            let client = self.add_client(Arc::clone(&self.sock));
            handler.on_accept(client).await;
            let server = Arc::clone(&self);
            let sock = Arc::clone(&self.sock);
            tokio::spawn(async move { server.read_loop(sock, handler, None).await });
        } else {
            let (accepted_tx, mut accepted_rx) =
                mpsc::channel::<Arc<dyn Socket>>(EVENT_QUEUE_SIZE);
            let (closing_tx, mut closing_rx) = mpsc::channel::<SocketId>(EVENT_QUEUE_SIZE);

            // Accept task: raw transport accepts into the bounded queue.
            let server = Arc::clone(&self);
            tokio::spawn(async move {
                loop {
                    let accepted = tokio::select! {
                        _ = server.cancel.cancelled() => break,
                        accepted = server.sock.accept() => accepted,
                    };
                    match accepted {
                        Some(sock) => {
                            if accepted_tx.send(sock).await.is_err() {
                                break;
                            }
                        }
                        None if server.sock.is_closed() => break,
                        None => {}
                    }
                }
            });

            // Dispatch task: the single consumer of accept and close
            // events, which is what keeps them ordered per connection.
            let server = Arc::clone(&self);
            tokio::spawn(async move {
                loop {
                    tokio::select! {
                        _ = server.cancel.cancelled() => break,
                        accepted = accepted_rx.recv() => match accepted {
                            Some(sock) => {
                                debug!(id = %sock.id(), peer = %sock.remote_addr(), "connection accepted");
                                let client = server.add_client(Arc::clone(&sock));
                                handler.on_accept(client).await;
                                let reader = Arc::clone(&server);
                                let read_handler = Arc::clone(&handler);
                                let closing = Some(closing_tx.clone());
                                tokio::spawn(async move {
                                    reader.read_loop(sock, read_handler, closing).await
                                });
                            }
                            None => break,
                        },
                        closing = closing_rx.recv() => match closing {
                            Some(id) => server.evict(id, &handler).await,
                            None => break,
                        },
                    }
                }
            });
        }

        self.cancel.cancelled().await;
        Ok(())
    }

    /// Stop the server: close the listening socket, then close and evict
    /// every client. Safe to call more than once; repeated calls are
    /// no-ops.
    pub async fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.cancel.cancel();
        if let Err(e) = self.sock.close().await {
            debug!(error = %e, "listening socket close");
        }
        let drained: Vec<Arc<SocketClient>> =
            self.clients.lock().drain().map(|(_, client)| client).collect();
        for client in drained {
            let _ = client.socket().close().await;
        }
    }

    /// Close one client and drop it from the directory.
    pub async fn close_client(&self, client: &SocketClient) -> Result<()> {
        self.remove_client(client.id());
        client.socket().close().await
    }

    /// Send through a client's socket; empty payloads are rejected.
    pub async fn send(&self, client: &SocketClient, data: &[u8], to: Option<&str>) -> Result<usize> {
        if data.is_empty() {
            return Err(Error::Custom("send data length is 0".to_string()));
        }
        client.socket().send(data, to).await
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// The listening socket's bound address.
    pub fn local_addr(&self) -> String {
        self.sock.local_addr()
    }

    pub fn client_count(&self) -> usize {
        self.clients.lock().len()
    }

    /// Snapshot of all live clients.
    pub fn clients(&self) -> Vec<Arc<SocketClient>> {
        self.clients.lock().values().cloned().collect()
    }

    pub fn get_client(&self, id: SocketId) -> Option<Arc<SocketClient>> {
        self.clients.lock().get(&id).cloned()
    }

    async fn evict(&self, id: SocketId, handler: &Arc<dyn SocketHandler>) {
        if let Some(client) = self.remove_client(id) {
            // Eviction and close always travel together.
            let _ = client.socket().close().await;
            handler.on_close(client).await;
        }
    }

    /// One reader per socket; any receive error ends the connection.
    async fn read_loop(
        &self,
        sock: Arc<dyn Socket>,
        handler: Arc<dyn SocketHandler>,
        closing: Option<mpsc::Sender<SocketId>>,
    ) {
        loop {
            match sock.recv(0).await {
                // Zero-length reads are dropped, not delivered.
                Ok(msg) if msg.is_empty() => {}
                Ok(msg) => {
                    if let Some(client) = self.get_client(msg.origin) {
                        handler.on_receive(client, msg).await;
                    }
                }
                Err(e) => {
                    debug!(id = %sock.id(), error = %e, "read loop ended");
                    if let Some(closing) = &closing {
                        let _ = closing.send(sock.id()).await;
                    }
                    break;
                }
            }
        }
    }

    fn add_client(&self, sock: Arc<dyn Socket>) -> Arc<SocketClient> {
        let client = Arc::new(SocketClient::from_socket(sock));
        self.clients.lock().insert(client.id(), Arc::clone(&client));
        client
    }

    fn remove_client(&self, id: SocketId) -> Option<Arc<SocketClient>> {
        self.clients.lock().remove(&id)
    }
}
