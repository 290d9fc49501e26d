//! Memcached cluster client.
//!
//! memring spreads keys over a set of memcached servers (modulo, ketama
//! consistent hashing, weighted ketama or random), speaks the text and
//! binary protocols over TCP, unix sockets or UDP, and drives every socket
//! with non-blocking IO bounded by `poll(2)` timeouts.
//!
//! Servers that keep failing are backed off for `retry_timeout`; with
//! `auto_eject_hosts` they also leave the continuum until the window ends.
//! Writes can be buffered and pipelined, replicated to the next servers on
//! the ring, or sent without waiting for a reply.
//!
//! All key and value parameters are byte slices; misses, refused stores and
//! cas conflicts come back as [`Outcome`]s rather than errors.
//!
//! # Example
//!
//! ```no_run
//! use memring::{Client, Config, Distribution, StoreOptions};
//!
//! fn example() -> Result<(), memring::Error> {
//!     let config = Config {
//!         distribution: Distribution::Consistent,
//!         ..Config::default()
//!     };
//!     let mut client = Client::with_config(config)?;
//!     client.add_server_list("10.0.0.1:11211, 10.0.0.2:11211")?;
//!
//!     client.set_with(b"hello", b"world", StoreOptions::default().exptime(60))?;
//!     let item = client.get(b"hello")?;
//!     assert_eq!(item.unwrap().value.as_ref(), b"world");
//!     Ok(())
//! }
//! ```

mod auth;
mod buffer;
mod client;
mod config;
mod connection;
mod error;
mod framing;
mod hooks;
pub mod metrics;
mod node;
mod registry;
mod result;
mod server;

pub use auth::{Authenticator, PlainAuthenticator, SaslChannel, SaslStep};
pub use client::{Client, StoreOptions};
pub use config::{
    Behavior, BehaviorValue, Config, Distribution, MAX_PREFIX_LEN, MIN_BUFFER_SIZE,
};
pub use error::{Error, ErrorKind, Result};
pub use hooks::{BufferAllocator, Callbacks, ReadThrough, SystemAllocator};
pub use ketama::HashAlgorithm;
pub use node::ServerInfo;
pub use result::{Item, MultiGet, Outcome};
pub use server::{DEFAULT_PORT, ServerAddr, ServerSpec, parse_server_list};
