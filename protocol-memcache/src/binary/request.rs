//! Client-side binary protocol request encoding.
//!
//! Extras are derived from the opcode when the request is encoded:
//!
//! | opcode                      | extras                               |
//! |-----------------------------|--------------------------------------|
//! | set / add / replace         | flags (4), expiration (4)            |
//! | increment / decrement       | delta (8), initial (8), expiration (4) |
//! | touch / flush               | expiration (4)                       |
//! | everything else             | none                                 |

use bytes::{BufMut, BytesMut};

use super::header::{HEADER_SIZE, Opcode, RequestHeader};

/// Expiration that tells the server not to auto-create a missing counter.
pub const NO_AUTO_CREATE: u32 = 0xffff_ffff;

/// A binary protocol request builder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BinaryRequest<'a> {
    opcode: Opcode,
    key: &'a [u8],
    value: &'a [u8],
    flags: u32,
    exptime: u32,
    delta: u64,
    initial: u64,
    cas: u64,
    opaque: u32,
}

impl<'a> BinaryRequest<'a> {
    fn new(opcode: Opcode, key: &'a [u8], value: &'a [u8]) -> Self {
        Self {
            opcode,
            key,
            value,
            flags: 0,
            exptime: 0,
            delta: 0,
            initial: 0,
            cas: 0,
            opaque: 0,
        }
    }

    /// GET request.
    pub fn get(key: &'a [u8]) -> Self {
        Self::new(Opcode::Get, key, b"")
    }

    /// GETK request; the response echoes the key, which multi-get relies on.
    pub fn getk(key: &'a [u8]) -> Self {
        Self::new(Opcode::GetK, key, b"")
    }

    /// Storage request for set, add, replace, append or prepend.
    pub fn store(opcode: Opcode, key: &'a [u8], value: &'a [u8]) -> Self {
        Self::new(opcode, key, value)
    }

    /// DELETE request.
    pub fn delete(key: &'a [u8]) -> Self {
        Self::new(Opcode::Delete, key, b"")
    }

    /// INCREMENT request that fails when the key is missing.
    pub fn increment(key: &'a [u8], delta: u64) -> Self {
        Self::arith(Opcode::Increment, key, delta, 0, NO_AUTO_CREATE)
    }

    /// DECREMENT request that fails when the key is missing.
    pub fn decrement(key: &'a [u8], delta: u64) -> Self {
        Self::arith(Opcode::Decrement, key, delta, 0, NO_AUTO_CREATE)
    }

    /// Counter request with an initial value. The server creates the counter
    /// with `initial` unless `exptime` is [`NO_AUTO_CREATE`].
    pub fn arith(opcode: Opcode, key: &'a [u8], delta: u64, initial: u64, exptime: u32) -> Self {
        let mut req = Self::new(opcode, key, b"");
        req.delta = delta;
        req.initial = initial;
        req.exptime = exptime;
        req
    }

    /// TOUCH request.
    pub fn touch(key: &'a [u8], exptime: u32) -> Self {
        Self::new(Opcode::Touch, key, b"").exptime(exptime)
    }

    /// FLUSH request with a delay in seconds.
    pub fn flush(delay: u32) -> Self {
        Self::new(Opcode::Flush, b"", b"").exptime(delay)
    }

    /// NOOP request, used to mark the end of a quiet pipeline.
    pub fn noop() -> Self {
        Self::new(Opcode::Noop, b"", b"")
    }

    /// VERSION request.
    pub fn version() -> Self {
        Self::new(Opcode::Version, b"", b"")
    }

    /// QUIT request.
    pub fn quit() -> Self {
        Self::new(Opcode::Quit, b"", b"")
    }

    /// SASL LIST MECHS request.
    pub fn sasl_list_mechs() -> Self {
        Self::new(Opcode::SaslListMechs, b"", b"")
    }

    /// SASL AUTH request: the mechanism travels as the key.
    pub fn sasl_auth(mechanism: &'a [u8], data: &'a [u8]) -> Self {
        Self::new(Opcode::SaslAuth, mechanism, data)
    }

    /// SASL STEP request.
    pub fn sasl_step(mechanism: &'a [u8], data: &'a [u8]) -> Self {
        Self::new(Opcode::SaslStep, mechanism, data)
    }

    /// Set the client flags of a storage request.
    pub fn flags(mut self, flags: u32) -> Self {
        self.flags = flags;
        self
    }

    /// Set the expiration.
    pub fn exptime(mut self, exptime: u32) -> Self {
        self.exptime = exptime;
        self
    }

    /// Only apply if the item's cas still matches.
    pub fn cas(mut self, cas: u64) -> Self {
        self.cas = cas;
        self
    }

    /// Tag the request; the response echoes the value.
    pub fn opaque(mut self, opaque: u32) -> Self {
        self.opaque = opaque;
        self
    }

    /// Switch to the quiet variant of the opcode, if it has one.
    pub fn quiet(mut self) -> Self {
        self.opcode = self.opcode.to_quiet();
        self
    }

    /// The opcode that will be sent.
    #[inline]
    pub fn opcode(&self) -> Opcode {
        self.opcode
    }

    /// The value section, sent after the head.
    #[inline]
    pub fn payload(&self) -> &'a [u8] {
        self.value
    }

    fn extras_len(&self) -> usize {
        match self.opcode.to_non_quiet() {
            Opcode::Set | Opcode::Add | Opcode::Replace => 8,
            Opcode::Increment | Opcode::Decrement => 20,
            Opcode::Touch | Opcode::Flush => 4,
            _ => 0,
        }
    }

    /// Length of header, extras and key.
    pub fn head_len(&self) -> usize {
        HEADER_SIZE + self.extras_len() + self.key.len()
    }

    /// Encode header, extras and key. The [`payload`](Self::payload) follows.
    ///
    /// The key must fit in 16 bits; callers validate key length first.
    pub fn encode_head(&self, buf: &mut BytesMut) {
        let extras_len = self.extras_len();
        let mut header = RequestHeader::new(self.opcode);
        header.key_length = self.key.len() as u16;
        header.extras_length = extras_len as u8;
        header.total_body_length = (extras_len + self.key.len() + self.value.len()) as u32;
        header.opaque = self.opaque;
        header.cas = self.cas;

        buf.reserve(self.head_len());
        header.encode(buf);
        match extras_len {
            8 => {
                buf.put_u32(self.flags);
                buf.put_u32(self.exptime);
            }
            20 => {
                buf.put_u64(self.delta);
                buf.put_u64(self.initial);
                buf.put_u32(self.exptime);
            }
            4 => buf.put_u32(self.exptime),
            _ => {}
        }
        buf.extend_from_slice(self.key);
    }

    /// Encode the complete packet.
    pub fn encode(&self, buf: &mut BytesMut) {
        self.encode_head(buf);
        buf.extend_from_slice(self.value);
    }
}
