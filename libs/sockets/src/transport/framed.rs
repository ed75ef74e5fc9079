use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use junction_core::{
    Scheme, SocketKind, ADMISSION_QUEUE_SIZE, OPTION_TLS_CERT, OPTION_TLS_KEY,
};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, Mutex};
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http::StatusCode;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{Connector, MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

use crate::error::{Error, Result};
use crate::message::{FrameKind, SockMessage};
use crate::target::ConnectionTarget;
use crate::transport::{Socket, SocketId};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// An upgraded connection waiting in the admission queue.
type Admission = (WsStream, String);

/// Message-framed transport over WebSocket.
///
/// The listening side runs an HTTP listener task that upgrades requests
/// on the target's path and feeds them into a bounded admission queue;
/// `accept` drains that queue. Sends are whole frames, never byte-stream
/// writes.
pub struct FramedSocket {
    id: SocketId,
    target: Option<ConnectionTarget>,
    admissions: Mutex<Option<mpsc::Receiver<Admission>>>,
    sink: Mutex<Option<SplitSink<WsStream, Message>>>,
    stream: Mutex<Option<SplitStream<WsStream>>>,
    local: Arc<parking_lot::Mutex<Option<String>>>,
    peer: parking_lot::Mutex<Option<String>>,
    closed: AtomicBool,
    cancel: CancellationToken,
}

impl FramedSocket {
    /// Registry constructor; also usable to assemble a custom registry.
    pub fn create(target: ConnectionTarget) -> Arc<dyn Socket> {
        Arc::new(Self {
            id: SocketId::next(),
            target: Some(target),
            admissions: Mutex::new(None),
            sink: Mutex::new(None),
            stream: Mutex::new(None),
            local: Arc::new(parking_lot::Mutex::new(None)),
            peer: parking_lot::Mutex::new(None),
            closed: AtomicBool::new(false),
            cancel: CancellationToken::new(),
        })
    }

    fn from_admission(target: Option<ConnectionTarget>, admission: Admission) -> Self {
        let (ws, peer) = admission;
        let (sink, stream) = ws.split();
        Self {
            id: SocketId::next(),
            target,
            admissions: Mutex::new(None),
            sink: Mutex::new(Some(sink)),
            stream: Mutex::new(Some(stream)),
            local: Arc::new(parking_lot::Mutex::new(None)),
            peer: parking_lot::Mutex::new(Some(peer)),
            closed: AtomicBool::new(false),
            cancel: CancellationToken::new(),
        }
    }

    fn target(&self) -> Result<&ConnectionTarget> {
        self.target
            .as_ref()
            .ok_or_else(|| Error::Custom("socket has no configured target".to_string()))
    }
}

#[async_trait::async_trait]
impl Socket for FramedSocket {
    /// Starts the HTTP listener on a background task and returns
    /// immediately; a bind failure surfaces only as `accept` never
    /// producing connections. TLS configuration problems (wss without
    /// usable `cert`/`key` options) are reported synchronously.
    async fn listen(&self) -> Result<()> {
        let target = self.target()?;
        let host = target.host().to_string();
        let route = target.path().to_string();
        let tls = match target.scheme() {
            Scheme::Wss => Some(build_tls_acceptor(target)?),
            _ => None,
        };

        let (admission_tx, admission_rx) = mpsc::channel(ADMISSION_QUEUE_SIZE);
        *self.admissions.lock().await = Some(admission_rx);

        let local = Arc::clone(&self.local);
        let cancel = self.cancel.clone();
        tokio::spawn(async move {
            let listener = match TcpListener::bind(&host).await {
                Ok(listener) => listener,
                Err(e) => {
                    error!(addr = %host, error = %e, "framed listener bind failed");
                    return;
                }
            };
            if let Ok(addr) = listener.local_addr() {
                *local.lock() = Some(addr.to_string());
            }
            loop {
                let accepted = tokio::select! {
                    _ = cancel.cancelled() => break,
                    accepted = listener.accept() => accepted,
                };
                let (stream, peer) = match accepted {
                    Ok(pair) => pair,
                    Err(e) => {
                        warn!(error = %e, "framed accept failed");
                        continue;
                    }
                };
                let admission_tx = admission_tx.clone();
                let tls = tls.clone();
                let route = route.clone();
                tokio::spawn(async move {
                    match upgrade(stream, tls, route).await {
                        // A full admission queue blocks further upgrades
                        // on the HTTP side.
                        Ok(ws) => {
                            let _ = admission_tx.send((ws, peer.to_string())).await;
                        }
                        Err(e) => debug!(peer = %peer, error = %e, "websocket upgrade rejected"),
                    }
                });
            }
        });
        Ok(())
    }

    async fn accept(&self) -> Option<Arc<dyn Socket>> {
        let mut guard = self.admissions.lock().await;
        let admissions = match guard.as_mut() {
            Some(admissions) => admissions,
            None => {
                warn!("accept called on a framed socket that is not listening");
                return None;
            }
        };
        let admitted = tokio::select! {
            _ = self.cancel.cancelled() => return None,
            admitted = admissions.recv() => admitted,
        }?;
        let sock = Self::from_admission(self.target.clone(), admitted);
        *sock.local.lock() = self.local.lock().clone();
        Some(Arc::new(sock))
    }

    async fn connect(&self) -> Result<()> {
        let target = self.target()?;
        let url = target.url();
        let (ws, _response) = match target.scheme() {
            Scheme::Wss => {
                // Peer certificates are not verified, matching the
                // dialer's permissive TLS posture on the server side.
                let connector = native_tls::TlsConnector::builder()
                    .danger_accept_invalid_certs(true)
                    .build()
                    .map_err(|e| Error::Tls(e.to_string()))?;
                tokio_tungstenite::connect_async_tls_with_config(
                    url.as_str(),
                    None,
                    false,
                    Some(Connector::NativeTls(connector)),
                )
                .await
                .map_err(|e| Error::WebSocket(e.to_string()))?
            }
            _ => tokio_tungstenite::connect_async(url.as_str())
                .await
                .map_err(|e| Error::WebSocket(e.to_string()))?,
        };

        let (local, peer) = stream_addrs(ws.get_ref());
        *self.local.lock() = local;
        *self.peer.lock() = peer;

        let (sink, stream) = ws.split();
        *self.sink.lock().await = Some(sink);
        *self.stream.lock().await = Some(stream);
        Ok(())
    }

    async fn send(&self, data: &[u8], _to: Option<&str>) -> Result<usize> {
        let mut guard = self.sink.lock().await;
        let sink = guard.as_mut().ok_or(Error::NotConnected)?;
        sink.send(Message::Binary(data.to_vec()))
            .await
            .map_err(|e| Error::WebSocket(e.to_string()))?;
        Ok(data.len())
    }

    /// Frames are never fragmented: the requested length is ignored and
    /// one whole inbound frame is returned.
    async fn recv(&self, _length: usize) -> Result<SockMessage> {
        let mut guard = self.stream.lock().await;
        let stream = guard.as_mut().ok_or(Error::NotConnected)?;
        loop {
            let next = tokio::select! {
                _ = self.cancel.cancelled() => return Err(Error::ConnectionClosed),
                next = stream.next() => next,
            };
            let message = match next {
                Some(Ok(message)) => message,
                Some(Err(e)) => return Err(Error::WebSocket(e.to_string())),
                None => return Err(Error::ConnectionClosed),
            };
            let from = self.remote_addr();
            match message {
                Message::Binary(data) => {
                    return Ok(SockMessage::framed(self.id, data, from, FrameKind::Binary))
                }
                Message::Text(text) => {
                    return Ok(SockMessage::framed(
                        self.id,
                        text.into_bytes(),
                        from,
                        FrameKind::Text,
                    ))
                }
                Message::Close(_) => return Err(Error::ConnectionClosed),
                // Control frames are answered by the protocol layer.
                Message::Ping(_) | Message::Pong(_) | Message::Frame(_) => continue,
            }
        }
    }

    async fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Err(Error::AlreadyClosed);
        }
        self.cancel.cancel();
        let mut released = false;
        if let Some(mut sink) = self.sink.lock().await.take() {
            // Initiates the close handshake; the peer sees a Close frame.
            let _ = sink.close().await;
            released = true;
        }
        if self.stream.lock().await.take().is_some() {
            released = true;
        }
        if self.admissions.lock().await.take().is_some() {
            released = true;
        }
        if !released {
            return Err(Error::NotConnected);
        }
        Ok(())
    }

    fn local_addr(&self) -> String {
        match self.local.lock().clone() {
            Some(addr) => addr,
            None => self
                .target
                .as_ref()
                .map(|t| t.host().to_string())
                .unwrap_or_default(),
        }
    }

    fn remote_addr(&self) -> String {
        self.peer.lock().clone().unwrap_or_default()
    }

    fn kind(&self) -> SocketKind {
        SocketKind::Framed
    }

    fn id(&self) -> SocketId {
        self.id
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

/// Perform the (optionally TLS) handshake and the HTTP upgrade, admitting
/// only requests for the registered path.
async fn upgrade(
    stream: TcpStream,
    tls: Option<Arc<tokio_native_tls::TlsAcceptor>>,
    route: String,
) -> Result<WsStream> {
    let maybe_tls = match tls {
        Some(acceptor) => {
            let tls_stream = acceptor
                .accept(stream)
                .await
                .map_err(|e| Error::Tls(e.to_string()))?;
            MaybeTlsStream::NativeTls(tls_stream)
        }
        None => MaybeTlsStream::Plain(stream),
    };
    tokio_tungstenite::accept_hdr_async(maybe_tls, move |req: &Request, resp: Response| {
        if req.uri().path() == route {
            Ok(resp)
        } else {
            let mut not_found = ErrorResponse::new(None);
            *not_found.status_mut() = StatusCode::NOT_FOUND;
            Err(not_found)
        }
    })
    .await
    .map_err(|e| Error::WebSocket(e.to_string()))
}

/// Load the `cert`/`key` PEM material named by the target's options.
fn build_tls_acceptor(target: &ConnectionTarget) -> Result<Arc<tokio_native_tls::TlsAcceptor>> {
    let cert_path = target
        .option(OPTION_TLS_CERT)
        .ok_or_else(|| Error::Tls("wss listen requires a cert option".to_string()))?;
    let key_path = target
        .option(OPTION_TLS_KEY)
        .ok_or_else(|| Error::Tls("wss listen requires a key option".to_string()))?;
    let cert_pem = std::fs::read(cert_path)?;
    let key_pem = std::fs::read(key_path)?;
    let identity = native_tls::Identity::from_pkcs8(&cert_pem, &key_pem)
        .map_err(|e| Error::Tls(e.to_string()))?;
    let acceptor =
        native_tls::TlsAcceptor::new(identity).map_err(|e| Error::Tls(e.to_string()))?;
    Ok(Arc::new(tokio_native_tls::TlsAcceptor::from(acceptor)))
}

fn stream_addrs(stream: &MaybeTlsStream<TcpStream>) -> (Option<String>, Option<String>) {
    let tcp = match stream {
        MaybeTlsStream::Plain(tcp) => tcp,
        MaybeTlsStream::NativeTls(tls) => tls.get_ref().get_ref().get_ref(),
        _ => return (None, None),
    };
    (
        tcp.local_addr().ok().map(|a| a.to_string()),
        tcp.peer_addr().ok().map(|a| a.to_string()),
    )
}
