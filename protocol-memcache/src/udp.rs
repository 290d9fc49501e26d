//! UDP frame header.
//!
//! Every memcached datagram starts with 8 bytes: request id, sequence number,
//! total datagram count and a reserved zero field, all big-endian u16.

use bytes::{BufMut, BytesMut};

use crate::error::ParseError;

/// Size of the UDP frame header.
pub const FRAME_HEADER_SIZE: usize = 8;

/// Largest datagram the client sends, header included.
pub const MAX_DATAGRAM: usize = 1400;

/// Largest request body that fits in one datagram.
pub const MAX_DATAGRAM_PAYLOAD: usize = MAX_DATAGRAM - FRAME_HEADER_SIZE;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    pub request_id: u16,
    pub sequence: u16,
    pub total: u16,
}

impl FrameHeader {
    /// Header for a request that fits in a single datagram.
    pub fn single(request_id: u16) -> Self {
        Self {
            request_id,
            sequence: 0,
            total: 1,
        }
    }

    pub fn encode(&self, buf: &mut BytesMut) {
        buf.reserve(FRAME_HEADER_SIZE);
        buf.put_u16(self.request_id);
        buf.put_u16(self.sequence);
        buf.put_u16(self.total);
        buf.put_u16(0);
    }

    pub fn parse(data: &[u8]) -> Result<Self, ParseError> {
        let raw = data
            .first_chunk::<FRAME_HEADER_SIZE>()
            .ok_or(ParseError::Incomplete)?;
        Ok(Self {
            request_id: u16::from_be_bytes([raw[0], raw[1]]),
            sequence: u16::from_be_bytes([raw[2], raw[3]]),
            total: u16::from_be_bytes([raw[4], raw[5]]),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_header() {
        let mut buf = BytesMut::new();
        FrameHeader::single(0x0102).encode(&mut buf);
        assert_eq!(&buf[..], &[0x01, 0x02, 0, 0, 0, 1, 0, 0]);
        assert_eq!(FrameHeader::parse(&buf), Ok(FrameHeader::single(0x0102)));
        assert_eq!(FrameHeader::parse(&buf[..7]), Err(ParseError::Incomplete));
    }
}
