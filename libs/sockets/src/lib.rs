//! Junction Sockets - One socket contract over four transports
//!
//! Provides a single [`Socket`] capability contract implemented by TCP
//! stream, UDP datagram, Unix domain and WebSocket transports, so client
//! and server code stays transport-agnostic and the concrete transport is
//! chosen by the connection string alone (`tcp://`, `udp://`, `unix://`,
//! `ws://`/`wss://`).
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use junction_sockets::{SocketClient, SocketHandler, SocketServer, SockMessage};
//!
//! struct Pong;
//!
//! #[async_trait::async_trait]
//! impl SocketHandler for Pong {
//!     async fn on_accept(&self, client: Arc<SocketClient>) {
//!         println!("accepted [{}]", client.remote_addr());
//!     }
//!     async fn on_receive(&self, client: Arc<SocketClient>, msg: SockMessage) {
//!         if msg.data == b"ping" {
//!             let _ = client.send(b"pong").await;
//!         }
//!     }
//!     async fn on_close(&self, client: Arc<SocketClient>) {
//!         println!("closed [{}]", client.remote_addr());
//!     }
//! }
//!
//! # async fn example() -> junction_sockets::Result<()> {
//! // Server
//! let server = Arc::new(SocketServer::new("tcp://127.0.0.1:6666")?);
//! tokio::spawn({
//!     let server = Arc::clone(&server);
//!     async move { server.listen(Arc::new(Pong)).await }
//! });
//!
//! // Client
//! let client = SocketClient::connect("tcp://127.0.0.1:6666").await?;
//! client.send(b"ping").await?;
//! let reply = client.recv(4).await?;
//! assert_eq!(reply.data, b"pong");
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod codec;
pub mod error;
pub mod message;
pub mod registry;
pub mod server;
pub mod target;
pub mod transport;

// Re-exports for convenience
pub use client::SocketClient;
pub use error::{Error, Result};
pub use junction_core::{Scheme, SocketKind};
pub use message::{FrameKind, SockMessage};
pub use registry::{create_socket, SocketRegistry};
pub use server::{SocketHandler, SocketServer};
pub use target::ConnectionTarget;
pub use transport::{Socket, SocketId};
