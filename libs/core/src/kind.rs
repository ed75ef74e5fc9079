use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// The four transport variants behind the `Socket` contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SocketKind {
    /// Connection-oriented byte stream (TCP).
    Stream,
    /// Connectionless datagrams (UDP).
    Datagram,
    /// Unix domain stream socket.
    Local,
    /// Message-framed socket (WebSocket).
    Framed,
}

impl fmt::Display for SocketKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tag = match self {
            SocketKind::Stream => "stream",
            SocketKind::Datagram => "datagram",
            SocketKind::Local => "local",
            SocketKind::Framed => "framed",
        };
        write!(f, "{tag}")
    }
}

/// Recognized connection-string schemes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Scheme {
    Tcp,
    Tcp4,
    Tcp6,
    Udp,
    Udp4,
    Udp6,
    Unix,
    Ws,
    Wss,
}

impl Scheme {
    /// Parse a scheme tag. Unknown schemes are rejected outright.
    pub fn parse(s: &str) -> Result<Scheme> {
        match s {
            "tcp" => Ok(Scheme::Tcp),
            "tcp4" => Ok(Scheme::Tcp4),
            "tcp6" => Ok(Scheme::Tcp6),
            "udp" => Ok(Scheme::Udp),
            "udp4" => Ok(Scheme::Udp4),
            "udp6" => Ok(Scheme::Udp6),
            "unix" => Ok(Scheme::Unix),
            "ws" => Ok(Scheme::Ws),
            "wss" => Ok(Scheme::Wss),
            other => Err(Error::UnknownScheme(other.to_string())),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Scheme::Tcp => "tcp",
            Scheme::Tcp4 => "tcp4",
            Scheme::Tcp6 => "tcp6",
            Scheme::Udp => "udp",
            Scheme::Udp4 => "udp4",
            Scheme::Udp6 => "udp6",
            Scheme::Unix => "unix",
            Scheme::Ws => "ws",
            Scheme::Wss => "wss",
        }
    }

    /// The transport variant this scheme selects.
    pub fn kind(&self) -> SocketKind {
        match self {
            Scheme::Tcp | Scheme::Tcp4 | Scheme::Tcp6 => SocketKind::Stream,
            Scheme::Udp | Scheme::Udp4 | Scheme::Udp6 => SocketKind::Datagram,
            Scheme::Unix => SocketKind::Local,
            Scheme::Ws | Scheme::Wss => SocketKind::Framed,
        }
    }

    /// Whether the scheme pins the IPv6 address family.
    pub fn is_ipv6(&self) -> bool {
        matches!(self, Scheme::Tcp6 | Scheme::Udp6)
    }

    /// Whether the scheme pins the IPv4 address family.
    pub fn is_ipv4(&self) -> bool {
        matches!(self, Scheme::Tcp4 | Scheme::Udp4)
    }

    /// Whether the scheme demands TLS (wss).
    pub fn is_secure(&self) -> bool {
        matches!(self, Scheme::Wss)
    }
}

impl fmt::Display for Scheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scheme_maps_to_kind() {
        assert_eq!(Scheme::parse("tcp6").unwrap().kind(), SocketKind::Stream);
        assert_eq!(Scheme::parse("udp").unwrap().kind(), SocketKind::Datagram);
        assert_eq!(Scheme::parse("unix").unwrap().kind(), SocketKind::Local);
        assert_eq!(Scheme::parse("wss").unwrap().kind(), SocketKind::Framed);
    }

    #[test]
    fn unknown_scheme_is_rejected() {
        assert!(Scheme::parse("http").is_err());
        assert!(Scheme::parse("").is_err());
    }
}
