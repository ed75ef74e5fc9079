use std::sync::Arc;

use junction_core::SocketKind;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::codec::Codec;
use crate::error::Result;
use crate::message::SockMessage;
use crate::registry::SocketRegistry;
use crate::transport::{Socket, SocketId};

/// Thin per-connection handle over one socket.
///
/// Built by [`SocketClient::connect`]/[`SocketClient::bind`] on the
/// client side, or handed to [`SocketHandler`](crate::server::SocketHandler)
/// callbacks by the server for each accepted connection.
pub struct SocketClient {
    sock: Arc<dyn Socket>,
}

impl SocketClient {
    /// Connect to `url` using the builtin transports.
    ///
    /// Valid for stream, local and framed targets.
    pub async fn connect(url: &str) -> Result<Self> {
        Self::connect_with(&SocketRegistry::builtin(), url).await
    }

    /// Connect using an explicit registry.
    pub async fn connect_with(registry: &SocketRegistry, url: &str) -> Result<Self> {
        let sock = registry.create(url)?;
        sock.connect().await?;
        Ok(Self { sock })
    }

    /// Bind to a local address without connecting; the datagram-side
    /// entry point.
    pub async fn bind(url: &str) -> Result<Self> {
        Self::bind_with(&SocketRegistry::builtin(), url).await
    }

    /// Bind using an explicit registry.
    pub async fn bind_with(registry: &SocketRegistry, url: &str) -> Result<Self> {
        let sock = registry.create(url)?;
        sock.listen().await?;
        Ok(Self { sock })
    }

    pub(crate) fn from_socket(sock: Arc<dyn Socket>) -> Self {
        Self { sock }
    }

    /// The underlying socket.
    pub fn socket(&self) -> &Arc<dyn Socket> {
        &self.sock
    }

    /// Send to the connected peer.
    pub async fn send(&self, data: &[u8]) -> Result<usize> {
        self.sock.send(data, None).await
    }

    /// Send to an explicit destination (datagram sockets).
    pub async fn send_to(&self, data: &[u8], to: &str) -> Result<usize> {
        self.sock.send(data, Some(to)).await
    }

    /// Receive one message; `length == 0` means a single best-effort
    /// read, `length > 0` reads exactly that many bytes (stream/local).
    pub async fn recv(&self, length: usize) -> Result<SockMessage> {
        self.sock.recv(length).await
    }

    /// Encode a value with `codec` and send it.
    pub async fn send_encoded<C: Codec, T: Serialize>(&self, codec: &C, value: &T) -> Result<usize> {
        let data = codec.encode(value)?;
        self.send(&data).await
    }

    /// Receive one message and decode its payload with `codec`.
    pub async fn recv_decoded<C: Codec, T: DeserializeOwned>(
        &self,
        codec: &C,
        length: usize,
    ) -> Result<T> {
        let msg = self.recv(length).await?;
        codec.decode(&msg.data)
    }

    pub async fn close(&self) -> Result<()> {
        self.sock.close().await
    }

    pub fn local_addr(&self) -> String {
        self.sock.local_addr()
    }

    pub fn remote_addr(&self) -> String {
        self.sock.remote_addr()
    }

    pub fn kind(&self) -> SocketKind {
        self.sock.kind()
    }

    pub fn id(&self) -> SocketId {
        self.sock.id()
    }

    pub fn is_closed(&self) -> bool {
        self.sock.is_closed()
    }
}
