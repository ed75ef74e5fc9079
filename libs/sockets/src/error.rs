use junction_core::SocketKind;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Core(#[from] junction_core::Error),

    #[error("invalid connection target [{target}]: {reason}")]
    InvalidTarget { target: String, reason: String },

    #[error("cannot resolve address [{0}]")]
    Resolve(String),

    #[error("connection closed")]
    ConnectionClosed,

    #[error("socket already closed")]
    AlreadyClosed,

    #[error("socket is not connected")]
    NotConnected,

    #[error("destination address required for datagram send")]
    DestinationRequired,

    #[error("operation not supported: {0}")]
    Unsupported(&'static str),

    #[error("transport [{0}] already registered")]
    AlreadyRegistered(SocketKind),

    #[error("no transport registered for [{0}]")]
    NotRegistered(SocketKind),

    #[error("websocket error: {0}")]
    WebSocket(String),

    #[error("TLS error: {0}")]
    Tls(String),

    #[error("codec error: {0}")]
    Codec(String),

    #[error("{0}")]
    Custom(String),
}

impl Error {
    pub(crate) fn invalid_target(target: impl Into<String>, reason: impl ToString) -> Self {
        Self::InvalidTarget {
            target: target.into(),
            reason: reason.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
