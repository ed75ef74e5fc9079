use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use junction_core::{SocketKind, PACK_FRAGMENT_MAX};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::error::{Error, Result};
use crate::message::SockMessage;
use crate::target::ConnectionTarget;
use crate::transport::{resolve_addr, Socket, SocketId};

/// Connection-oriented stream transport over TCP.
///
/// One instance is either a listener (after `listen`), a connected peer
/// (after `connect` or when returned by `accept`), or closed.
pub struct StreamSocket {
    id: SocketId,
    target: Option<ConnectionTarget>,
    listener: Mutex<Option<TcpListener>>,
    reader: Mutex<Option<OwnedReadHalf>>,
    writer: Mutex<Option<OwnedWriteHalf>>,
    local: parking_lot::Mutex<Option<SocketAddr>>,
    peer: parking_lot::Mutex<Option<SocketAddr>>,
    closed: AtomicBool,
    cancel: CancellationToken,
}

impl StreamSocket {
    /// Registry constructor; also usable to assemble a custom registry.
    pub fn create(target: ConnectionTarget) -> Arc<dyn Socket> {
        Arc::new(Self::new(Some(target)))
    }

    fn new(target: Option<ConnectionTarget>) -> Self {
        Self {
            id: SocketId::next(),
            target,
            listener: Mutex::new(None),
            reader: Mutex::new(None),
            writer: Mutex::new(None),
            local: parking_lot::Mutex::new(None),
            peer: parking_lot::Mutex::new(None),
            closed: AtomicBool::new(false),
            cancel: CancellationToken::new(),
        }
    }

    /// Build a connected socket from an accepted stream.
    fn from_stream(stream: TcpStream, peer: SocketAddr) -> Self {
        let local = stream.local_addr().ok();
        let (read_half, write_half) = stream.into_split();
        Self {
            id: SocketId::next(),
            target: None,
            listener: Mutex::new(None),
            reader: Mutex::new(Some(read_half)),
            writer: Mutex::new(Some(write_half)),
            local: parking_lot::Mutex::new(local),
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
impl Socket for StreamSocket {
    async fn listen(&self) -> Result<()> {
        let target = self.target()?;
        let addr = resolve_addr(target.host(), target.scheme()).await?;
        let listener = TcpListener::bind(addr).await?;
        *self.local.lock() = listener.local_addr().ok();
        *self.listener.lock().await = Some(listener);
        Ok(())
    }

    async fn accept(&self) -> Option<Arc<dyn Socket>> {
        let guard = self.listener.lock().await;
        let listener = match guard.as_ref() {
            Some(listener) => listener,
            None => {
                warn!("accept called on a stream socket that is not listening");
                return None;
            }
        };
        let accepted = tokio::select! {
            _ = self.cancel.cancelled() => return None,
            accepted = listener.accept() => accepted,
        };
        match accepted {
            Ok((stream, peer)) => Some(Arc::new(Self::from_stream(stream, peer))),
            Err(e) => {
                warn!(error = %e, "stream accept failed");
                None
            }
        }
    }

    async fn connect(&self) -> Result<()> {
        let target = self.target()?;
        let addr = resolve_addr(target.host(), target.scheme()).await?;
        let stream = TcpStream::connect(addr).await?;
        *self.local.lock() = stream.local_addr().ok();
        *self.peer.lock() = stream.peer_addr().ok();
        let (read_half, write_half) = stream.into_split();
        *self.reader.lock().await = Some(read_half);
        *self.writer.lock().await = Some(write_half);
        Ok(())
    }

    async fn send(&self, data: &[u8], _to: Option<&str>) -> Result<usize> {
        let mut guard = self.writer.lock().await;
        let writer = guard.as_mut().ok_or(Error::NotConnected)?;
        writer.write_all(data).await?;
        Ok(data.len())
    }

    async fn recv(&self, length: usize) -> Result<SockMessage> {
        let mut guard = self.reader.lock().await;
        let reader = guard.as_mut().ok_or(Error::NotConnected)?;
        let data = tokio::select! {
            _ = self.cancel.cancelled() => return Err(Error::ConnectionClosed),
            read = read_some(reader, length) => read?,
        };
        Ok(SockMessage::new(self.id, data, self.remote_addr()))
    }

    async fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Err(Error::AlreadyClosed);
        }
        self.cancel.cancel();
        let mut released = false;
        if let Some(mut writer) = self.writer.lock().await.take() {
            let _ = writer.shutdown().await;
            released = true;
        }
        if self.reader.lock().await.take().is_some() {
            released = true;
        }
        if self.listener.lock().await.take().is_some() {
            released = true;
        }
        if !released {
            return Err(Error::NotConnected);
        }
        Ok(())
    }

    fn local_addr(&self) -> String {
        match *self.local.lock() {
            Some(addr) => addr.to_string(),
            None => self
                .target
                .as_ref()
                .map(|t| t.host().to_string())
                .unwrap_or_default(),
        }
    }

    fn remote_addr(&self) -> String {
        match *self.peer.lock() {
            Some(addr) => addr.to_string(),
            None => String::new(),
        }
    }

    fn kind(&self) -> SocketKind {
        SocketKind::Stream
    }

    fn id(&self) -> SocketId {
        self.id
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

/// One best-effort read (`length == 0`) or read-exactly-N (`length > 0`).
async fn read_some(reader: &mut OwnedReadHalf, length: usize) -> Result<Vec<u8>> {
    if length == 0 {
        let mut buf = vec![0u8; PACK_FRAGMENT_MAX];
        let n = reader.read(&mut buf).await?;
        if n == 0 {
            return Err(Error::ConnectionClosed);
        }
        buf.truncate(n);
        Ok(buf)
    } else {
        let mut buf = vec![0u8; length];
        reader.read_exact(&mut buf).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::UnexpectedEof {
                Error::ConnectionClosed
            } else {
                e.into()
            }
        })?;
        Ok(buf)
    }
}
