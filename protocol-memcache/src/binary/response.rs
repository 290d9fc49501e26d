//! Binary protocol response parsing.

use bytes::BytesMut;

use super::header::{HEADER_SIZE, Opcode, ResponseHeader, Status};
use crate::error::ParseError;

/// A parsed binary response packet. Borrowed from the receive buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BinaryReply<'a> {
    pub header: ResponseHeader,
    pub extras: &'a [u8],
    pub key: &'a [u8],
    pub value: &'a [u8],
}

impl<'a> BinaryReply<'a> {
    /// Parse one complete packet from the front of `data`.
    ///
    /// Returns the reply and the number of bytes consumed.
    pub fn parse(data: &'a [u8]) -> Result<(Self, usize), ParseError> {
        let header = ResponseHeader::parse(data)?;
        let layout = header.layout()?;
        let end = HEADER_SIZE + layout.total();
        if data.len() < end {
            return Err(ParseError::Incomplete);
        }
        Ok((Self::from_parts(header, &data[HEADER_SIZE..end])?, end))
    }

    /// Assemble a reply from an already parsed header and its body.
    pub fn from_parts(header: ResponseHeader, body: &'a [u8]) -> Result<Self, ParseError> {
        let (extras, key, value) = header.layout()?.split(body)?;
        Ok(Self {
            header,
            extras,
            key,
            value,
        })
    }

    #[inline]
    pub fn status(&self) -> Status {
        self.header.status
    }

    #[inline]
    pub fn opcode(&self) -> Opcode {
        self.header.opcode
    }

    /// Client flags of a GET response; zero when no extras were sent.
    pub fn flags(&self) -> u32 {
        match self.extras.first_chunk::<4>() {
            Some(raw) => u32::from_be_bytes(*raw),
            None => 0,
        }
    }

    /// New value of an INCREMENT/DECREMENT response.
    pub fn counter(&self) -> Result<u64, ParseError> {
        let raw = self
            .value
            .first_chunk::<8>()
            .filter(|_| self.value.len() == 8)
            .ok_or(ParseError::Protocol("counter value must be 8 bytes"))?;
        Ok(u64::from_be_bytes(*raw))
    }

    /// Encode this reply; body lengths in the header are recomputed.
    pub fn encode(&self, buf: &mut BytesMut) {
        let mut header = self.header;
        header.extras_length = self.extras.len() as u8;
        header.key_length = self.key.len() as u16;
        header.total_body_length = (self.extras.len() + self.key.len() + self.value.len()) as u32;
        header.encode(buf);
        buf.extend_from_slice(self.extras);
        buf.extend_from_slice(self.key);
        buf.extend_from_slice(self.value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reply<'a>(opcode: Opcode, extras: &'a [u8], key: &'a [u8], value: &'a [u8]) -> BytesMut {
        let mut buf = BytesMut::new();
        BinaryReply {
            header: ResponseHeader::new(opcode, Status::NoError),
            extras,
            key,
            value,
        }
        .encode(&mut buf);
        buf
    }

    #[test]
    fn test_parse_get_response() {
        let buf = reply(Opcode::GetK, &7u32.to_be_bytes(), b"key", b"hello");
        let (parsed, consumed) = BinaryReply::parse(&buf).unwrap();
        assert_eq!(consumed, buf.len());
        assert_eq!(parsed.opcode(), Opcode::GetK);
        assert_eq!(parsed.status(), Status::NoError);
        assert_eq!(parsed.flags(), 7);
        assert_eq!(parsed.key, b"key");
        assert_eq!(parsed.value, b"hello");
    }

    #[test]
    fn test_parse_incomplete_body() {
        let buf = reply(Opcode::Get, &0u32.to_be_bytes(), b"", b"hello");
        assert_eq!(
            BinaryReply::parse(&buf[..buf.len() - 1]),
            Err(ParseError::Incomplete)
        );
    }

    #[test]
    fn test_counter() {
        let buf = reply(Opcode::Increment, b"", b"", &42u64.to_be_bytes());
        let (parsed, _) = BinaryReply::parse(&buf).unwrap();
        assert_eq!(parsed.counter(), Ok(42));

        let buf = reply(Opcode::Increment, b"", b"", b"abc");
        let (parsed, _) = BinaryReply::parse(&buf).unwrap();
        assert!(parsed.counter().is_err());
    }

    #[test]
    fn test_flags_absent() {
        let buf = reply(Opcode::Set, b"", b"", b"");
        let (parsed, consumed) = BinaryReply::parse(&buf).unwrap();
        assert_eq!(consumed, HEADER_SIZE);
        assert_eq!(parsed.flags(), 0);
    }

    #[test]
    fn test_bad_lengths() {
        let mut header = ResponseHeader::new(Opcode::Get, Status::NoError);
        header.extras_length = 4;
        header.key_length = 4;
        header.total_body_length = 6;
        let mut buf = BytesMut::new();
        header.encode(&mut buf);
        buf.extend_from_slice(&[0; 6]);
        assert_eq!(BinaryReply::parse(&buf), Err(ParseError::BodyLength));
    }
}
