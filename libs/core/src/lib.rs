//! Junction Core - Shared vocabulary for the junction socket layer
//!
//! Holds the types every other junction crate speaks: socket kinds,
//! connection-string schemes and the protocol constants.

pub mod error;
pub mod kind;

pub use error::{Error, Result};
pub use kind::{Scheme, SocketKind};

/// Upper bound for a single best-effort read, in bytes.
///
/// A `recv` without an explicit length returns at most this many bytes
/// from one underlying read.
pub const PACK_FRAGMENT_MAX: usize = 1500;

/// Capacity of the server's accepted/closing event channels.
pub const EVENT_QUEUE_SIZE: usize = 1000;

/// Capacity of the framed transport's admission queue between the HTTP
/// upgrade handler and `accept`.
pub const ADMISSION_QUEUE_SIZE: usize = 1000;

/// Query-string option carrying the TLS certificate path (framed only).
pub const OPTION_TLS_CERT: &str = "cert";

/// Query-string option carrying the TLS private key path (framed only).
pub const OPTION_TLS_KEY: &str = "key";

/// Required filename suffix for local (Unix domain) socket paths.
pub const LOCAL_SOCKET_SUFFIX: &str = ".sock";
