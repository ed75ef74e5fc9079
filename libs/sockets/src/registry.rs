use std::collections::HashMap;
use std::sync::Arc;

use junction_core::SocketKind;
use tracing::error;

use crate::error::{Error, Result};
use crate::target::ConnectionTarget;
use crate::transport::{DatagramSocket, FramedSocket, LocalSocket, Socket, StreamSocket};

/// Constructor for one transport variant.
pub type SocketConstructor = fn(ConnectionTarget) -> Arc<dyn Socket>;

/// Explicit transport registry.
///
/// A plain value, built once by whoever owns the process entry point; no
/// global state is mutated at load time. [`SocketRegistry::builtin`]
/// registers the four bundled variants by name.
pub struct SocketRegistry {
    constructors: HashMap<SocketKind, SocketConstructor>,
}

impl SocketRegistry {
    /// A registry with no transports.
    pub fn empty() -> Self {
        Self {
            constructors: HashMap::new(),
        }
    }

    /// A registry with the four bundled transports.
    pub fn builtin() -> Self {
        let mut registry = Self::empty();
        let _ = registry.register(SocketKind::Stream, StreamSocket::create);
        let _ = registry.register(SocketKind::Datagram, DatagramSocket::create);
        let _ = registry.register(SocketKind::Local, LocalSocket::create);
        let _ = registry.register(SocketKind::Framed, FramedSocket::create);
        registry
    }

    /// Register a constructor for a transport kind.
    ///
    /// Re-registering an existing kind is an error; the first
    /// registration wins.
    pub fn register(&mut self, kind: SocketKind, constructor: SocketConstructor) -> Result<()> {
        if self.constructors.contains_key(&kind) {
            error!(%kind, "transport already registered");
            return Err(Error::AlreadyRegistered(kind));
        }
        self.constructors.insert(kind, constructor);
        Ok(())
    }

    /// Parse a connection string and construct the matching socket.
    pub fn create(&self, url: &str) -> Result<Arc<dyn Socket>> {
        let target = ConnectionTarget::parse(url)?;
        let kind = target.kind();
        let constructor = self
            .constructors
            .get(&kind)
            .ok_or(Error::NotRegistered(kind))?;
        Ok(constructor(target))
    }
}

impl Default for SocketRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}

/// Construct a socket from a connection string using the builtin registry.
pub fn create_socket(url: &str) -> Result<Arc<dyn Socket>> {
    SocketRegistry::builtin().create(url)
}
