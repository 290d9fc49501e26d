//! Client-side Memcache wire codec.
//!
//! This crate encodes requests and parses responses for both memcached wire
//! formats. It never touches a socket: requests are written into a
//! [`bytes::BytesMut`] as a *head* (command line or header + extras + key)
//! plus an optional *payload* (the value), so callers can hand the two parts
//! to a vectored or corked write without copying the value.
//!
//! # Features
//!
//! - `ascii` (default): ASCII text protocol support
//! - `binary`: Binary protocol support
//! - `full`: Both ASCII and binary protocols
//!
//! # ASCII Protocol
//!
//! ```
//! use bytes::BytesMut;
//! use protocol_memcache::{Reply, Request};
//!
//! let keys: [&[u8]; 1] = [b"mykey"];
//! let mut buf = BytesMut::new();
//! Request::get(&keys).encode(&mut buf);
//! assert_eq!(&buf[..], b"get mykey\r\n");
//!
//! let reply = Reply::parse_line(b"VALUE mykey 0 5").unwrap();
//! assert_eq!(reply.value_len(), Some(5));
//! ```
//!
//! # Binary Protocol
//!
//! The binary protocol uses fixed 24-byte headers. Enable with the `binary`
//! feature.
//!
//! ```ignore
//! use protocol_memcache::binary::BinaryRequest;
//!
//! let mut buf = bytes::BytesMut::new();
//! BinaryRequest::get(b"mykey").opaque(7).encode(&mut buf);
//! ```

mod error;
#[cfg(feature = "ascii")]
mod request;
#[cfg(feature = "ascii")]
mod response;
pub mod udp;
mod verb;

#[cfg(feature = "binary")]
pub mod binary;

pub use error::ParseError;
#[cfg(feature = "ascii")]
pub use request::{Request, StoreRequest};
#[cfg(feature = "ascii")]
pub use response::{Reply, find_crlf};
pub use verb::StoreVerb;

/// Largest value a reply may advertise, in either protocol.
pub const MAX_VALUE_LEN: usize = 128 * 1024 * 1024;

/// Longest key the text protocol accepts.
pub const MAX_TEXT_KEY_LEN: usize = 250;

/// Longest key the binary protocol can frame (16-bit key length).
pub const MAX_BINARY_KEY_LEN: usize = u16::MAX as usize;

/// Append the decimal form of `n` to `buf`.
pub(crate) fn put_decimal(buf: &mut bytes::BytesMut, mut n: u64) {
    let mut digits = [0u8; 20];
    let mut pos = digits.len();
    loop {
        pos -= 1;
        digits[pos] = b'0' + (n % 10) as u8;
        n /= 10;
        if n == 0 {
            break;
        }
    }
    buf.extend_from_slice(&digits[pos..]);
}
