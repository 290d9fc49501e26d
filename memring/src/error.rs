use std::io;

use protocol_memcache::ParseError;

/// Broad class of an [`Error`], used to decide retry policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Invalid behavior combination or invalid key.
    Configuration,
    /// No servers, or the target server is backing off.
    Topology,
    /// Connect, send or receive failure, including timeouts.
    Network,
    /// Malformed or unexpected response.
    Protocol,
    /// The server rejected the command.
    Server,
    /// Buffer allocation failure.
    Resource,
}

/// Errors returned by the memring client.
///
/// Cache misses, failed `add`s and cas conflicts are not errors; they are
/// reported as [`Outcome`](crate::Outcome) values.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Key is empty, too long, or contains bytes the text protocol forbids.
    #[error("bad key: {0}")]
    BadKey(&'static str),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// No server is configured, or every server is ejected.
    #[error("no servers available")]
    NoServers,

    /// The server failed too often and is inside its retry window.
    #[error("server {0} is marked dead")]
    ServerMarkedDead(String),

    #[error("connect to {addr}: {source}")]
    Connect {
        addr: String,
        #[source]
        source: io::Error,
    },

    #[error("io error: {0}")]
    Io(#[from] io::Error),

    /// A poll wait exceeded its timeout.
    #[error("timed out")]
    Timeout,

    /// The peer closed the connection (zero-length read).
    #[error("connection closed")]
    ConnectionClosed,

    #[error("protocol error: {0}")]
    Protocol(#[from] ParseError),

    /// A well-formed reply that does not answer the command sent.
    #[error("unexpected response")]
    UnexpectedResponse,

    /// `ERROR`, `CLIENT_ERROR`, `SERVER_ERROR`, or a binary failure status.
    #[error("server error: {0}")]
    Server(String),

    #[error("not supported: {0}")]
    NotSupported(&'static str),

    #[error("request of {0} bytes does not fit in one UDP datagram")]
    DatagramTooLarge(usize),

    /// Some nodes of a multi-node operation failed. Data from the others was
    /// still returned.
    #[error("{failed} of {total} servers failed")]
    SomeErrors { failed: usize, total: usize },

    #[error("authentication failed: {0}")]
    AuthFailed(String),

    #[error("failed to allocate {0} bytes")]
    Allocation(usize),
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::BadKey(_) | Error::InvalidConfig(_) | Error::NotSupported(_) => {
                ErrorKind::Configuration
            }
            Error::NoServers | Error::ServerMarkedDead(_) | Error::SomeErrors { .. } => {
                ErrorKind::Topology
            }
            Error::Connect { .. }
            | Error::Io(_)
            | Error::Timeout
            | Error::ConnectionClosed
            | Error::DatagramTooLarge(_) => ErrorKind::Network,
            Error::Protocol(_) | Error::UnexpectedResponse => ErrorKind::Protocol,
            Error::Server(_) | Error::AuthFailed(_) => ErrorKind::Server,
            Error::Allocation(_) => ErrorKind::Resource,
        }
    }

    /// Whether the connection that produced this error must be dropped.
    pub(crate) fn is_fatal_to_connection(&self) -> bool {
        matches!(self.kind(), ErrorKind::Network | ErrorKind::Protocol)
            && !matches!(self, Error::DatagramTooLarge(_))
    }

    /// Whether this error counts as a server failure for backoff purposes.
    pub(crate) fn counts_as_failure(&self) -> bool {
        matches!(
            self,
            Error::Connect { .. } | Error::Io(_) | Error::Timeout | Error::ConnectionClosed
        )
    }
}

/// `io::Error` is not `Clone`; copies keep its kind and message.
impl Clone for Error {
    fn clone(&self) -> Self {
        fn copy_io(e: &io::Error) -> io::Error {
            io::Error::new(e.kind(), e.to_string())
        }
        match self {
            Error::BadKey(s) => Error::BadKey(s),
            Error::InvalidConfig(s) => Error::InvalidConfig(s.clone()),
            Error::NoServers => Error::NoServers,
            Error::ServerMarkedDead(s) => Error::ServerMarkedDead(s.clone()),
            Error::Connect { addr, source } => Error::Connect {
                addr: addr.clone(),
                source: copy_io(source),
            },
            Error::Io(e) => Error::Io(copy_io(e)),
            Error::Timeout => Error::Timeout,
            Error::ConnectionClosed => Error::ConnectionClosed,
            Error::Protocol(e) => Error::Protocol(e.clone()),
            Error::UnexpectedResponse => Error::UnexpectedResponse,
            Error::Server(s) => Error::Server(s.clone()),
            Error::NotSupported(s) => Error::NotSupported(s),
            Error::DatagramTooLarge(n) => Error::DatagramTooLarge(*n),
            Error::SomeErrors { failed, total } => Error::SomeErrors {
                failed: *failed,
                total: *total,
            },
            Error::AuthFailed(s) => Error::AuthFailed(s.clone()),
            Error::Allocation(n) => Error::Allocation(*n),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
