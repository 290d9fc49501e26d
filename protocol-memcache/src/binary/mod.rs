//! Memcache binary protocol, client side.
//!
//! Every packet is a 24-byte header followed by extras, key and value.
//!
//! - Request magic: 0x80
//! - Response magic: 0x81
//!
//! Quiet opcodes suppress the response on success (stores, deletes) or on a
//! miss (gets), so a pipeline of quiet requests is terminated with a `NOOP`
//! whose response marks the end.
//!
//! ```
//! use bytes::BytesMut;
//! use protocol_memcache::binary::{BinaryRequest, RequestHeader, Opcode};
//!
//! let mut buf = BytesMut::new();
//! BinaryRequest::getk(b"mykey").quiet().opaque(1).encode(&mut buf);
//! let header = RequestHeader::parse(&buf).unwrap();
//! assert_eq!(header.opcode, Opcode::GetKQ);
//! ```

mod header;
mod request;
mod response;

pub use header::{
    BodyLayout, HEADER_SIZE, Opcode, REQUEST_MAGIC, RESPONSE_MAGIC, RequestHeader, ResponseHeader,
    Status,
};
pub use request::{BinaryRequest, NO_AUTO_CREATE};
pub use response::BinaryReply;

/// Detect if the data starts with a binary protocol response.
#[inline]
pub fn is_binary_response(data: &[u8]) -> bool {
    data.first() == Some(&RESPONSE_MAGIC)
}
