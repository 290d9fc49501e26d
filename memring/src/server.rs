//! Server addresses and server list parsing.

use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result};

pub use ketama::DEFAULT_PORT;

/// Where a node lives and how to reach it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ServerAddr {
    Tcp { host: String, port: u16 },
    /// Write-only: requests are sent as single datagrams and never answered.
    Udp { host: String, port: u16 },
    Unix { path: String },
}

impl ServerAddr {
    /// Host name, IP literal, or socket path.
    pub fn host(&self) -> &str {
        match self {
            ServerAddr::Tcp { host, .. } | ServerAddr::Udp { host, .. } => host,
            ServerAddr::Unix { path } => path,
        }
    }

    /// Port, or zero for a unix socket.
    pub fn port(&self) -> u16 {
        match self {
            ServerAddr::Tcp { port, .. } | ServerAddr::Udp { port, .. } => *port,
            ServerAddr::Unix { .. } => 0,
        }
    }

    pub fn is_udp(&self) -> bool {
        matches!(self, ServerAddr::Udp { .. })
    }
}

impl fmt::Display for ServerAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServerAddr::Tcp { host, port } if host.contains(':') => write!(f, "[{host}]:{port}"),
            ServerAddr::Tcp { host, port } => write!(f, "{host}:{port}"),
            ServerAddr::Udp { host, port } if host.contains(':') => {
                write!(f, "udp:[{host}]:{port}")
            }
            ServerAddr::Udp { host, port } => write!(f, "udp:{host}:{port}"),
            ServerAddr::Unix { path } => f.write_str(path),
        }
    }
}

/// A server to add to the registry: address plus ketama weight.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ServerSpec {
    pub addr: ServerAddr,
    /// Relative share under weighted distribution. Zero counts as one.
    pub weight: u32,
}

impl ServerSpec {
    pub fn tcp(host: impl Into<String>, port: u16) -> Self {
        Self {
            addr: ServerAddr::Tcp {
                host: host.into(),
                port,
            },
            weight: 1,
        }
    }

    pub fn udp(host: impl Into<String>, port: u16) -> Self {
        Self {
            addr: ServerAddr::Udp {
                host: host.into(),
                port,
            },
            weight: 1,
        }
    }

    pub fn unix(path: impl Into<String>) -> Self {
        Self {
            addr: ServerAddr::Unix { path: path.into() },
            weight: 1,
        }
    }

    pub fn with_weight(mut self, weight: u32) -> Self {
        self.weight = weight;
        self
    }
}

impl FromStr for ServerSpec {
    type Err = Error;

    /// Parse `host[:port[:weight]]`, `[v6addr][:port[:weight]]` or an
    /// absolute unix socket path.
    fn from_str(entry: &str) -> Result<Self> {
        if entry.starts_with('/') {
            return Ok(ServerSpec::unix(entry));
        }

        let (host, rest) = match entry.strip_prefix('[') {
            Some(bracketed) => {
                let end = bracketed
                    .find(']')
                    .ok_or_else(|| invalid(entry, "unterminated '['"))?;
                (&bracketed[..end], &bracketed[end + 1..])
            }
            None => entry.split_at(entry.find(':').unwrap_or(entry.len())),
        };
        if host.is_empty() {
            return Err(invalid(entry, "missing host"));
        }

        let mut spec = ServerSpec::tcp(host, DEFAULT_PORT);
        if rest.is_empty() {
            return Ok(spec);
        }
        let Some(fields) = rest.strip_prefix(':') else {
            return Err(invalid(entry, "expected ':' after host"));
        };

        let mut fields = fields.split(':');
        if let Some(port) = fields.next() {
            spec = ServerSpec::tcp(host, port.parse().map_err(|_| invalid(entry, "bad port"))?);
        }
        if let Some(weight) = fields.next() {
            spec.weight = weight.parse().map_err(|_| invalid(entry, "bad weight"))?;
        }
        if fields.next().is_some() {
            return Err(invalid(entry, "too many ':' fields"));
        }
        Ok(spec)
    }
}

fn invalid(entry: &str, why: &str) -> Error {
    Error::InvalidConfig(format!("server {entry:?}: {why}"))
}

/// Parse a comma and/or whitespace separated server list, for example
/// `"cache1:11211:2, cache2, /var/run/memcached.sock"`.
pub fn parse_server_list(list: &str) -> Result<Vec<ServerSpec>> {
    list.split(|c: char| c == ',' || c.is_ascii_whitespace())
        .filter(|s| !s.is_empty())
        .map(str::parse)
        .collect()
}
