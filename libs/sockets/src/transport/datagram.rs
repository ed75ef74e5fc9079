use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use junction_core::{SocketKind, PACK_FRAGMENT_MAX};
use tokio::net::UdpSocket;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::error::{Error, Result};
use crate::message::SockMessage;
use crate::target::ConnectionTarget;
use crate::transport::{resolve_addr, Socket, SocketId};

const SCHEME_SEP: &str = "://";

/// Connectionless datagram transport over UDP.
///
/// There is no per-peer connection: one bound socket serves every peer,
/// and each `send` names its destination explicitly.
pub struct DatagramSocket {
    id: SocketId,
    target: ConnectionTarget,
    conn: parking_lot::Mutex<Option<Arc<UdpSocket>>>,
    local: parking_lot::Mutex<Option<SocketAddr>>,
    send_lock: Mutex<()>,
    closed: AtomicBool,
    cancel: CancellationToken,
}

impl DatagramSocket {
    /// Registry constructor; also usable to assemble a custom registry.
    pub fn create(target: ConnectionTarget) -> Arc<dyn Socket> {
        Arc::new(Self {
            id: SocketId::next(),
            target,
            conn: parking_lot::Mutex::new(None),
            local: parking_lot::Mutex::new(None),
            send_lock: Mutex::new(()),
            closed: AtomicBool::new(false),
            cancel: CancellationToken::new(),
        })
    }

    fn conn(&self) -> Result<Arc<UdpSocket>> {
        self.conn.lock().clone().ok_or(Error::NotConnected)
    }
}

#[async_trait::async_trait]
impl Socket for DatagramSocket {
    async fn listen(&self) -> Result<()> {
        let addr = resolve_addr(self.target.host(), self.target.scheme()).await?;
        let conn = UdpSocket::bind(addr).await?;
        *self.local.lock() = conn.local_addr().ok();
        *self.conn.lock() = Some(Arc::new(conn));
        Ok(())
    }

    async fn accept(&self) -> Option<Arc<dyn Socket>> {
        warn!("accept is not supported on datagram sockets");
        None
    }

    async fn connect(&self) -> Result<()> {
        Err(Error::Unsupported(
            "connect is only valid for stream, local and framed sockets",
        ))
    }

    async fn send(&self, data: &[u8], to: Option<&str>) -> Result<usize> {
        let destination = to.ok_or(Error::DestinationRequired)?;
        let conn = self.conn()?;
        let _guard = self.send_lock.lock().await;

        // Accept either a bare address or a scheme-prefixed URL.
        let bare = match destination.find(SCHEME_SEP) {
            Some(idx) => &destination[idx + SCHEME_SEP.len()..],
            None => destination,
        };
        let addr = resolve_addr(bare, self.target.scheme()).await?;
        Ok(conn.send_to(data, addr).await?)
    }

    async fn recv(&self, _length: usize) -> Result<SockMessage> {
        let conn = self.conn()?;
        let mut buf = vec![0u8; PACK_FRAGMENT_MAX];
        let (n, peer) = tokio::select! {
            _ = self.cancel.cancelled() => return Err(Error::ConnectionClosed),
            received = conn.recv_from(&mut buf) => received?,
        };
        buf.truncate(n);
        Ok(SockMessage::new(self.id, buf, peer.to_string()))
    }

    async fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Err(Error::AlreadyClosed);
        }
        self.cancel.cancel();
        if self.conn.lock().take().is_none() {
            return Err(Error::NotConnected);
        }
        Ok(())
    }

    fn local_addr(&self) -> String {
        match *self.local.lock() {
            Some(addr) => addr.to_string(),
            None => self.target.host().to_string(),
        }
    }

    fn remote_addr(&self) -> String {
        String::new()
    }

    fn kind(&self) -> SocketKind {
        SocketKind::Datagram
    }

    fn id(&self) -> SocketId {
        self.id
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}
