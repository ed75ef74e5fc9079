use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use junction_core::{SocketKind, LOCAL_SOCKET_SUFFIX, PACK_FRAGMENT_MAX};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::unix::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::error::{Error, Result};
use crate::message::SockMessage;
use crate::target::ConnectionTarget;
use crate::transport::{Socket, SocketId};

/// Unix domain stream transport.
///
/// Addresses are filesystem paths; both ends of a connection report the
/// socket path as their address.
pub struct LocalSocket {
    id: SocketId,
    target: ConnectionTarget,
    listener: Mutex<Option<UnixListener>>,
    reader: Mutex<Option<OwnedReadHalf>>,
    writer: Mutex<Option<OwnedWriteHalf>>,
    closed: AtomicBool,
    cancel: CancellationToken,
}

impl LocalSocket {
    /// Registry constructor; also usable to assemble a custom registry.
    pub fn create(target: ConnectionTarget) -> Arc<dyn Socket> {
        Arc::new(Self::new(target))
    }

    fn new(target: ConnectionTarget) -> Self {
        Self {
            id: SocketId::next(),
            target,
            listener: Mutex::new(None),
            reader: Mutex::new(None),
            writer: Mutex::new(None),
            closed: AtomicBool::new(false),
            cancel: CancellationToken::new(),
        }
    }

    fn from_stream(target: ConnectionTarget, stream: UnixStream) -> Self {
        let (read_half, write_half) = stream.into_split();
        Self {
            id: SocketId::next(),
            target,
            listener: Mutex::new(None),
            reader: Mutex::new(Some(read_half)),
            writer: Mutex::new(Some(write_half)),
            closed: AtomicBool::new(false),
            cancel: CancellationToken::new(),
        }
    }

    /// The configured socket path.
    ///
    /// # Panics
    ///
    /// Local socket paths must carry the `.sock` suffix; a violation is a
    /// fatal configuration error, not a recoverable one.
    fn sock_path(&self) -> &str {
        let path = self.target.path();
        if !path.ends_with(LOCAL_SOCKET_SUFFIX) {
            panic!("local socket path [{path}] must end in {LOCAL_SOCKET_SUFFIX}");
        }
        path
    }
}

#[async_trait::async_trait]
impl Socket for LocalSocket {
    async fn listen(&self) -> Result<()> {
        let path = self.sock_path();
        // Stale socket file from a previous run blocks the bind.
        if Path::new(path).exists() {
            std::fs::remove_file(path)?;
        }
        let listener = UnixListener::bind(path)?;
        *self.listener.lock().await = Some(listener);
        Ok(())
    }

    async fn accept(&self) -> Option<Arc<dyn Socket>> {
        let guard = self.listener.lock().await;
        let listener = match guard.as_ref() {
            Some(listener) => listener,
            None => {
                warn!("accept called on a local socket that is not listening");
                return None;
            }
        };
        let accepted = tokio::select! {
            _ = self.cancel.cancelled() => return None,
            accepted = listener.accept() => accepted,
        };
        match accepted {
            Ok((stream, _)) => Some(Arc::new(Self::from_stream(self.target.clone(), stream))),
            Err(e) => {
                warn!(error = %e, "local accept failed");
                None
            }
        }
    }

    async fn connect(&self) -> Result<()> {
        let stream = UnixStream::connect(self.sock_path()).await?;
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
        Ok(SockMessage::new(self.id, data, self.local_addr()))
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
        if let Some(listener) = self.listener.lock().await.take() {
            // The bound socket file outlives the listener otherwise.
            if let Ok(addr) = listener.local_addr() {
                if let Some(path) = addr.as_pathname() {
                    let _ = std::fs::remove_file(path);
                }
            }
            released = true;
        }
        if !released {
            return Err(Error::NotConnected);
        }
        Ok(())
    }

    fn local_addr(&self) -> String {
        self.sock_path().to_string()
    }

    fn remote_addr(&self) -> String {
        self.sock_path().to_string()
    }

    fn kind(&self) -> SocketKind {
        SocketKind::Local
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
