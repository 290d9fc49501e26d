//! Memcache binary protocol headers.
//!
//! The binary protocol uses fixed 24-byte headers for both requests and
//! responses. All multi-byte fields are big-endian.

use bytes::{BufMut, BytesMut};

use crate::MAX_VALUE_LEN;
use crate::error::ParseError;

/// Magic byte for binary request packets.
pub const REQUEST_MAGIC: u8 = 0x80;

/// Magic byte for binary response packets.
pub const RESPONSE_MAGIC: u8 = 0x81;

/// Header size for binary protocol.
pub const HEADER_SIZE: usize = 24;

/// Binary protocol opcodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Opcode {
    Get = 0x00,
    Set = 0x01,
    Add = 0x02,
    Replace = 0x03,
    Delete = 0x04,
    Increment = 0x05,
    Decrement = 0x06,
    Quit = 0x07,
    Flush = 0x08,
    GetQ = 0x09,
    Noop = 0x0A,
    Version = 0x0B,
    GetK = 0x0C,
    GetKQ = 0x0D,
    Append = 0x0E,
    Prepend = 0x0F,
    Stat = 0x10,
    SetQ = 0x11,
    AddQ = 0x12,
    ReplaceQ = 0x13,
    DeleteQ = 0x14,
    IncrementQ = 0x15,
    DecrementQ = 0x16,
    QuitQ = 0x17,
    FlushQ = 0x18,
    AppendQ = 0x19,
    PrependQ = 0x1A,
    Touch = 0x1C,
    SaslListMechs = 0x20,
    SaslAuth = 0x21,
    SaslStep = 0x22,
}

impl Opcode {
    /// Try to convert a byte to an opcode.
    pub fn from_u8(value: u8) -> Option<Self> {
        let op = match value {
            0x00 => Opcode::Get,
            0x01 => Opcode::Set,
            0x02 => Opcode::Add,
            0x03 => Opcode::Replace,
            0x04 => Opcode::Delete,
            0x05 => Opcode::Increment,
            0x06 => Opcode::Decrement,
            0x07 => Opcode::Quit,
            0x08 => Opcode::Flush,
            0x09 => Opcode::GetQ,
            0x0A => Opcode::Noop,
            0x0B => Opcode::Version,
            0x0C => Opcode::GetK,
            0x0D => Opcode::GetKQ,
            0x0E => Opcode::Append,
            0x0F => Opcode::Prepend,
            0x10 => Opcode::Stat,
            0x11 => Opcode::SetQ,
            0x12 => Opcode::AddQ,
            0x13 => Opcode::ReplaceQ,
            0x14 => Opcode::DeleteQ,
            0x15 => Opcode::IncrementQ,
            0x16 => Opcode::DecrementQ,
            0x17 => Opcode::QuitQ,
            0x18 => Opcode::FlushQ,
            0x19 => Opcode::AppendQ,
            0x1A => Opcode::PrependQ,
            0x1C => Opcode::Touch,
            0x20 => Opcode::SaslListMechs,
            0x21 => Opcode::SaslAuth,
            0x22 => Opcode::SaslStep,
            _ => return None,
        };
        Some(op)
    }

    /// Returns true if this is a "quiet" opcode (no response on success/miss).
    pub fn is_quiet(&self) -> bool {
        self.to_non_quiet() != *self
    }

    /// Returns the quiet version of this opcode, if one exists.
    pub fn to_quiet(&self) -> Opcode {
        match self {
            Opcode::Get => Opcode::GetQ,
            Opcode::GetK => Opcode::GetKQ,
            Opcode::Set => Opcode::SetQ,
            Opcode::Add => Opcode::AddQ,
            Opcode::Replace => Opcode::ReplaceQ,
            Opcode::Delete => Opcode::DeleteQ,
            Opcode::Increment => Opcode::IncrementQ,
            Opcode::Decrement => Opcode::DecrementQ,
            Opcode::Quit => Opcode::QuitQ,
            Opcode::Flush => Opcode::FlushQ,
            Opcode::Append => Opcode::AppendQ,
            Opcode::Prepend => Opcode::PrependQ,
            other => *other,
        }
    }

    /// Returns the non-quiet version of this opcode.
    pub fn to_non_quiet(&self) -> Opcode {
        match self {
            Opcode::GetQ => Opcode::Get,
            Opcode::GetKQ => Opcode::GetK,
            Opcode::SetQ => Opcode::Set,
            Opcode::AddQ => Opcode::Add,
            Opcode::ReplaceQ => Opcode::Replace,
            Opcode::DeleteQ => Opcode::Delete,
            Opcode::IncrementQ => Opcode::Increment,
            Opcode::DecrementQ => Opcode::Decrement,
            Opcode::QuitQ => Opcode::Quit,
            Opcode::FlushQ => Opcode::Flush,
            Opcode::AppendQ => Opcode::Append,
            Opcode::PrependQ => Opcode::Prepend,
            other => *other,
        }
    }
}

/// Response status codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum Status {
    NoError = 0x0000,
    KeyNotFound = 0x0001,
    KeyExists = 0x0002,
    ValueTooLarge = 0x0003,
    InvalidArguments = 0x0004,
    ItemNotStored = 0x0005,
    NonNumericValue = 0x0006,
    WrongVbucket = 0x0007,
    AuthError = 0x0008,
    AuthContinue = 0x0009,
    UnknownCommand = 0x0081,
    OutOfMemory = 0x0082,
    NotSupported = 0x0083,
    InternalError = 0x0084,
    Busy = 0x0085,
    TempFailure = 0x0086,
}

impl Status {
    /// Try to convert a u16 to a status.
    pub fn from_u16(value: u16) -> Option<Self> {
        let status = match value {
            0x0000 => Status::NoError,
            0x0001 => Status::KeyNotFound,
            0x0002 => Status::KeyExists,
            0x0003 => Status::ValueTooLarge,
            0x0004 => Status::InvalidArguments,
            0x0005 => Status::ItemNotStored,
            0x0006 => Status::NonNumericValue,
            0x0007 => Status::WrongVbucket,
            0x0008 => Status::AuthError,
            0x0009 => Status::AuthContinue,
            0x0081 => Status::UnknownCommand,
            0x0082 => Status::OutOfMemory,
            0x0083 => Status::NotSupported,
            0x0084 => Status::InternalError,
            0x0085 => Status::Busy,
            0x0086 => Status::TempFailure,
            _ => return None,
        };
        Some(status)
    }

    /// Returns true if this status indicates success.
    pub fn is_success(&self) -> bool {
        *self == Status::NoError
    }

    /// Returns true for statuses that describe the item rather than a failure:
    /// not found, exists and not stored.
    pub fn is_application(&self) -> bool {
        matches!(
            self,
            Status::KeyNotFound | Status::KeyExists | Status::ItemNotStored
        )
    }

    /// Returns the status as a short description.
    pub fn as_str(&self) -> &'static str {
        match self {
            Status::NoError => "no error",
            Status::KeyNotFound => "key not found",
            Status::KeyExists => "key exists",
            Status::ValueTooLarge => "value too large",
            Status::InvalidArguments => "invalid arguments",
            Status::ItemNotStored => "item not stored",
            Status::NonNumericValue => "incr/decr on non-numeric value",
            Status::WrongVbucket => "wrong vbucket",
            Status::AuthError => "authentication error",
            Status::AuthContinue => "authentication continue",
            Status::UnknownCommand => "unknown command",
            Status::OutOfMemory => "out of memory",
            Status::NotSupported => "not supported",
            Status::InternalError => "internal error",
            Status::Busy => "busy",
            Status::TempFailure => "temporary failure",
        }
    }
}

/// Read the fixed fields common to both headers.
fn read_common(data: &[u8], magic: u8) -> Result<(Opcode, [u8; HEADER_SIZE]), ParseError> {
    let Some(raw) = data.first_chunk::<HEADER_SIZE>() else {
        return Err(ParseError::Incomplete);
    };
    if raw[0] != magic {
        return Err(ParseError::InvalidMagic(raw[0]));
    }
    let opcode = Opcode::from_u8(raw[1]).ok_or(ParseError::UnknownOpcode(raw[1]))?;
    Ok((opcode, *raw))
}

fn be_u16(raw: &[u8; HEADER_SIZE], at: usize) -> u16 {
    u16::from_be_bytes([raw[at], raw[at + 1]])
}

fn be_u32(raw: &[u8; HEADER_SIZE], at: usize) -> u32 {
    u32::from_be_bytes([raw[at], raw[at + 1], raw[at + 2], raw[at + 3]])
}

fn be_u64(raw: &[u8; HEADER_SIZE], at: usize) -> u64 {
    let mut b = [0u8; 8];
    b.copy_from_slice(&raw[at..at + 8]);
    u64::from_be_bytes(b)
}

/// Binary protocol request header (24 bytes).
///
/// Format:
/// ```text
/// Byte/     0       |       1       |       2       |       3       |
///   +---------------+---------------+---------------+---------------+
///  0| Magic         | Opcode        | Key length                    |
///   +---------------+---------------+---------------+---------------+
///  4| Extras length | Data type     | vbucket id                    |
///   +---------------+---------------+---------------+---------------+
///  8| Total body length                                             |
///   +---------------+---------------+---------------+---------------+
/// 12| Opaque                                                        |
///   +---------------+---------------+---------------+---------------+
/// 16| CAS                                                           |
///   |                                                               |
///   +---------------+---------------+---------------+---------------+
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestHeader {
    pub opcode: Opcode,
    pub key_length: u16,
    pub extras_length: u8,
    pub vbucket_id: u16,
    /// extras_length + key_length + value length
    pub total_body_length: u32,
    /// Echoed back in the response.
    pub opaque: u32,
    pub cas: u64,
}

impl RequestHeader {
    /// Create a new request header with empty body.
    pub fn new(opcode: Opcode) -> Self {
        Self {
            opcode,
            key_length: 0,
            extras_length: 0,
            vbucket_id: 0,
            total_body_length: 0,
            opaque: 0,
            cas: 0,
        }
    }

    /// Parse a request header from the first 24 bytes of `data`.
    pub fn parse(data: &[u8]) -> Result<Self, ParseError> {
        let (opcode, raw) = read_common(data, REQUEST_MAGIC)?;
        Ok(Self {
            opcode,
            key_length: be_u16(&raw, 2),
            extras_length: raw[4],
            vbucket_id: be_u16(&raw, 6),
            total_body_length: be_u32(&raw, 8),
            opaque: be_u32(&raw, 12),
            cas: be_u64(&raw, 16),
        })
    }

    /// Append the 24 header bytes to `buf`.
    pub fn encode(&self, buf: &mut BytesMut) {
        buf.reserve(HEADER_SIZE);
        buf.put_u8(REQUEST_MAGIC);
        buf.put_u8(self.opcode as u8);
        buf.put_u16(self.key_length);
        buf.put_u8(self.extras_length);
        buf.put_u8(0);
        buf.put_u16(self.vbucket_id);
        buf.put_u32(self.total_body_length);
        buf.put_u32(self.opaque);
        buf.put_u64(self.cas);
    }

    /// Split the body lengths, checking they fit.
    pub fn layout(&self) -> Result<BodyLayout, ParseError> {
        BodyLayout::new(self.extras_length, self.key_length, self.total_body_length)
    }
}

/// Binary protocol response header (24 bytes).
///
/// Same layout as the request header with the vbucket field replaced by the
/// response status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResponseHeader {
    /// Echoed from the request.
    pub opcode: Opcode,
    pub key_length: u16,
    pub extras_length: u8,
    pub status: Status,
    pub total_body_length: u32,
    pub opaque: u32,
    pub cas: u64,
}

impl ResponseHeader {
    /// Create a new response header with the given opcode and status.
    pub fn new(opcode: Opcode, status: Status) -> Self {
        Self {
            opcode,
            key_length: 0,
            extras_length: 0,
            status,
            total_body_length: 0,
            opaque: 0,
            cas: 0,
        }
    }

    /// Parse a response header from the first 24 bytes of `data`.
    ///
    /// Unknown status codes are reported as [`Status::InternalError`].
    pub fn parse(data: &[u8]) -> Result<Self, ParseError> {
        let (opcode, raw) = read_common(data, RESPONSE_MAGIC)?;
        Ok(Self {
            opcode,
            key_length: be_u16(&raw, 2),
            extras_length: raw[4],
            status: Status::from_u16(be_u16(&raw, 6)).unwrap_or(Status::InternalError),
            total_body_length: be_u32(&raw, 8),
            opaque: be_u32(&raw, 12),
            cas: be_u64(&raw, 16),
        })
    }

    /// Append the 24 header bytes to `buf`.
    pub fn encode(&self, buf: &mut BytesMut) {
        buf.reserve(HEADER_SIZE);
        buf.put_u8(RESPONSE_MAGIC);
        buf.put_u8(self.opcode as u8);
        buf.put_u16(self.key_length);
        buf.put_u8(self.extras_length);
        buf.put_u8(0);
        buf.put_u16(self.status as u16);
        buf.put_u32(self.total_body_length);
        buf.put_u32(self.opaque);
        buf.put_u64(self.cas);
    }

    /// Split the body lengths, checking they fit.
    pub fn layout(&self) -> Result<BodyLayout, ParseError> {
        BodyLayout::new(self.extras_length, self.key_length, self.total_body_length)
    }
}

/// Lengths of the three body sections following a header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BodyLayout {
    pub extras: usize,
    pub key: usize,
    pub value: usize,
}

impl BodyLayout {
    /// Validate that extras and key fit inside the total body and the
    /// value stays within [`MAX_VALUE_LEN`].
    pub fn new(extras: u8, key: u16, total: u32) -> Result<Self, ParseError> {
        let extras = usize::from(extras);
        let key = usize::from(key);
        let value = (total as usize)
            .checked_sub(extras + key)
            .ok_or(ParseError::BodyLength)?;
        if value > MAX_VALUE_LEN {
            return Err(ParseError::ValueTooLarge(value));
        }
        Ok(Self { extras, key, value })
    }

    /// Total body length.
    #[inline]
    pub fn total(&self) -> usize {
        self.extras + self.key + self.value
    }

    /// Split a body of exactly [`total`](Self::total) bytes into
    /// `(extras, key, value)`.
    pub fn split<'b>(&self, body: &'b [u8]) -> Result<(&'b [u8], &'b [u8], &'b [u8]), ParseError> {
        if body.len() < self.total() {
            return Err(ParseError::Incomplete);
        }
        let (extras, rest) = body.split_at(self.extras);
        let (key, rest) = rest.split_at(self.key);
        Ok((extras, key, &rest[..self.value]))
    }
}
