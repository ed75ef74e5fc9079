use std::collections::HashMap;

use junction_core::{Scheme, SocketKind};
use url::Url;

use crate::error::{Error, Result};

/// Parsed, immutable connection target.
///
/// Produced once per `connect`/`listen` call from a connection string of
/// the form `scheme://host[:port][/path][?opt=val&...]`. The input is
/// lower-cased before parsing, so option keys and hostnames are always
/// lowercase.
#[derive(Debug, Clone)]
pub struct ConnectionTarget {
    scheme: Scheme,
    host: String,
    path: String,
    options: HashMap<String, String>,
}

impl ConnectionTarget {
    /// Parse a connection string. Unknown schemes are rejected.
    pub fn parse(input: &str) -> Result<Self> {
        let lowered = input.trim().to_ascii_lowercase();
        let url = Url::parse(&lowered).map_err(|e| Error::invalid_target(input, e))?;
        let scheme = Scheme::parse(url.scheme())?;

        let host = match url.host_str() {
            Some(h) => match url.port_or_known_default() {
                Some(p) => format!("{h}:{p}"),
                None => h.to_string(),
            },
            None => String::new(),
        };

        let mut path = url.path().to_string();
        if path.is_empty() && scheme.kind() == SocketKind::Framed {
            path.push('/');
        }

        let options = url
            .query_pairs()
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();

        Ok(Self {
            scheme,
            host,
            path,
            options,
        })
    }

    pub fn scheme(&self) -> Scheme {
        self.scheme
    }

    /// The transport variant this target selects.
    pub fn kind(&self) -> SocketKind {
        self.scheme.kind()
    }

    /// `host:port` for network schemes, empty for `unix`.
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Filesystem path for `unix`, HTTP path for `ws`/`wss`.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Look up a query-string option.
    pub fn option(&self, key: &str) -> Option<&str> {
        self.options.get(key).map(String::as_str)
    }

    /// Reassemble the target as a dialable URL, without the query string.
    pub fn url(&self) -> String {
        format!("{}://{}{}", self.scheme.as_str(), self.host, self.path)
    }
}

impl std::fmt::Display for ConnectionTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.url())
    }
}
