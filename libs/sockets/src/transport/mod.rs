use std::fmt;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use junction_core::{Scheme, SocketKind};

use crate::error::{Error, Result};
use crate::message::SockMessage;

pub mod datagram;
pub mod framed;
pub mod local;
pub mod stream;

pub use self::datagram::DatagramSocket;
pub use self::framed::FramedSocket;
pub use self::local::LocalSocket;
pub use self::stream::StreamSocket;

/// Process-unique socket identity.
///
/// Generated per socket instance; the server's client directory and
/// [`SockMessage::origin`] key on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SocketId(u64);

static NEXT_SOCKET_ID: AtomicU64 = AtomicU64::new(1);

impl SocketId {
    pub(crate) fn next() -> Self {
        SocketId(NEXT_SOCKET_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for SocketId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Capability contract shared by all transport variants.
///
/// A socket is either listening (can `accept`), connected (can
/// `send`/`recv`) or closed; datagram sockets skip the connected state and
/// serve every peer through the one bound socket.
///
/// `send` is safe for concurrent callers (each socket serializes writes
/// internally). `recv` assumes a single reader: the read side sits behind
/// a lock, so a second concurrent reader queues behind the first instead
/// of seeing interleaved bytes. The server enforces one read loop per
/// socket; application code holding a socket must do the same.
#[async_trait::async_trait]
pub trait Socket: Send + Sync {
    /// Bind to the target's host or path.
    async fn listen(&self) -> Result<()>;

    /// Wait for the next inbound connection.
    ///
    /// Returns `None` on any failure; connectionless variants always
    /// return `None`.
    async fn accept(&self) -> Option<Arc<dyn Socket>>;

    /// Establish an outbound connection. Not valid for datagram sockets.
    async fn connect(&self) -> Result<()>;

    /// Send a payload, returning the number of bytes written.
    ///
    /// Connection-oriented variants ignore `to`; datagram sockets require
    /// it.
    async fn send(&self, data: &[u8], to: Option<&str>) -> Result<usize>;

    /// Receive one message.
    ///
    /// With `length == 0`, performs exactly one underlying read and
    /// returns whatever arrived (capped at the fragment/datagram/frame
    /// boundary). With `length > 0` (stream/local only), blocks until
    /// exactly `length` bytes have accumulated. Any error, including peer
    /// disconnect, means the connection has ended.
    async fn recv(&self, length: usize) -> Result<SockMessage>;

    /// Close the socket, releasing the underlying resource exactly once.
    ///
    /// A second call fails with [`Error::AlreadyClosed`]; closing a socket
    /// that never held a resource fails with [`Error::NotConnected`].
    async fn close(&self) -> Result<()>;

    /// Local address: the configured host/path until a bind or connect
    /// succeeds, the live resolved address afterwards.
    fn local_addr(&self) -> String;

    /// Remote address of the live connection, empty when there is none.
    fn remote_addr(&self) -> String;

    fn kind(&self) -> SocketKind;

    fn id(&self) -> SocketId;

    fn is_closed(&self) -> bool;
}

/// Resolve `host:port` to one address of the scheme's address family.
pub(crate) async fn resolve_addr(host: &str, scheme: Scheme) -> Result<SocketAddr> {
    let mut candidates = tokio::net::lookup_host(host)
        .await
        .map_err(|_| Error::Resolve(host.to_string()))?;
    let found = candidates.find(|addr| {
        if scheme.is_ipv6() {
            addr.is_ipv6()
        } else if scheme.is_ipv4() {
            addr.is_ipv4()
        } else {
            true
        }
    });
    found.ok_or_else(|| Error::Resolve(host.to_string()))
}
