//! Client-side request encoding for the Memcache ASCII protocol.
//!
//! A request is encoded as a command line (the *head*) and, for storage
//! commands, a data block (the *payload*) followed by `\r\n`.

use bytes::BytesMut;

use crate::put_decimal;
use crate::verb::StoreVerb;

const CRLF: &[u8] = b"\r\n";

/// A request builder for encoding Memcache commands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request<'a> {
    /// `get <key>*\r\n`
    Get { keys: &'a [&'a [u8]] },
    /// `gets <key>*\r\n`, values carry their cas token.
    Gets { keys: &'a [&'a [u8]] },
    /// `<verb> <key> <flags> <exptime> <bytes> [<cas>] [noreply]\r\n<data>\r\n`
    Store(StoreRequest<'a>),
    /// `delete <key> [noreply]\r\n`
    Delete { key: &'a [u8], noreply: bool },
    /// `incr <key> <delta> [noreply]\r\n`
    Incr {
        key: &'a [u8],
        delta: u64,
        noreply: bool,
    },
    /// `decr <key> <delta> [noreply]\r\n`
    Decr {
        key: &'a [u8],
        delta: u64,
        noreply: bool,
    },
    /// `touch <key> <exptime> [noreply]\r\n`
    Touch {
        key: &'a [u8],
        exptime: u32,
        noreply: bool,
    },
    /// `flush_all [delay] [noreply]\r\n`
    FlushAll { delay: u32, noreply: bool },
    /// `version\r\n`
    Version,
    /// `quit\r\n`
    Quit,
}

/// Builder for storage commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreRequest<'a> {
    pub verb: StoreVerb,
    pub key: &'a [u8],
    pub value: &'a [u8],
    pub flags: u32,
    pub exptime: u32,
    /// Only sent for [`StoreVerb::Cas`].
    pub cas: u64,
    pub noreply: bool,
}

impl<'a> StoreRequest<'a> {
    /// Set the opaque client flags stored alongside the value.
    #[inline]
    pub fn flags(mut self, flags: u32) -> Self {
        self.flags = flags;
        self
    }

    /// Set the expiration time.
    #[inline]
    pub fn exptime(mut self, exptime: u32) -> Self {
        self.exptime = exptime;
        self
    }

    /// Ask the server not to reply.
    #[inline]
    pub fn noreply(mut self, noreply: bool) -> Self {
        self.noreply = noreply;
        self
    }

    /// Finish building.
    #[inline]
    pub fn build(self) -> Request<'a> {
        Request::Store(self)
    }
}

impl<'a> From<StoreRequest<'a>> for Request<'a> {
    fn from(store: StoreRequest<'a>) -> Self {
        Request::Store(store)
    }
}

impl<'a> Request<'a> {
    /// Create a GET request for one or more keys.
    #[inline]
    pub fn get(keys: &'a [&'a [u8]]) -> Self {
        Request::Get { keys }
    }

    /// Create a GETS request for one or more keys.
    #[inline]
    pub fn gets(keys: &'a [&'a [u8]]) -> Self {
        Request::Gets { keys }
    }

    /// Start a storage request.
    #[inline]
    pub fn store(verb: StoreVerb, key: &'a [u8], value: &'a [u8]) -> StoreRequest<'a> {
        StoreRequest {
            verb,
            key,
            value,
            flags: 0,
            exptime: 0,
            cas: 0,
            noreply: false,
        }
    }

    /// Start a SET request.
    #[inline]
    pub fn set(key: &'a [u8], value: &'a [u8]) -> StoreRequest<'a> {
        Self::store(StoreVerb::Set, key, value)
    }

    /// Start a CAS request.
    #[inline]
    pub fn cas(key: &'a [u8], value: &'a [u8], cas: u64) -> StoreRequest<'a> {
        let mut req = Self::store(StoreVerb::Cas, key, value);
        req.cas = cas;
        req
    }

    /// Create a DELETE request.
    #[inline]
    pub fn delete(key: &'a [u8]) -> Self {
        Request::Delete {
            key,
            noreply: false,
        }
    }

    /// Create an INCR request.
    #[inline]
    pub fn incr(key: &'a [u8], delta: u64) -> Self {
        Request::Incr {
            key,
            delta,
            noreply: false,
        }
    }

    /// Create a DECR request.
    #[inline]
    pub fn decr(key: &'a [u8], delta: u64) -> Self {
        Request::Decr {
            key,
            delta,
            noreply: false,
        }
    }

    /// Create a TOUCH request.
    #[inline]
    pub fn touch(key: &'a [u8], exptime: u32) -> Self {
        Request::Touch {
            key,
            exptime,
            noreply: false,
        }
    }

    /// Create a FLUSH_ALL request. A zero delay flushes immediately.
    #[inline]
    pub fn flush_all(delay: u32) -> Self {
        Request::FlushAll {
            delay,
            noreply: false,
        }
    }

    /// Create a VERSION request.
    #[inline]
    pub fn version() -> Self {
        Request::Version
    }

    /// Create a QUIT request.
    #[inline]
    pub fn quit() -> Self {
        Request::Quit
    }

    /// Set `noreply` on commands that accept it. Others are unchanged.
    pub fn with_noreply(mut self, on: bool) -> Self {
        match &mut self {
            Request::Store(s) => s.noreply = on,
            Request::Delete { noreply, .. }
            | Request::Incr { noreply, .. }
            | Request::Decr { noreply, .. }
            | Request::Touch { noreply, .. }
            | Request::FlushAll { noreply, .. } => *noreply = on,
            Request::Get { .. } | Request::Gets { .. } | Request::Version | Request::Quit => {}
        }
        self
    }

    /// Whether the server will send a reply to this request.
    pub fn expects_reply(&self) -> bool {
        match self {
            Request::Store(s) => !s.noreply,
            Request::Delete { noreply, .. }
            | Request::Incr { noreply, .. }
            | Request::Decr { noreply, .. }
            | Request::Touch { noreply, .. }
            | Request::FlushAll { noreply, .. } => !noreply,
            // The server closes the connection.
            Request::Quit => false,
            Request::Get { .. } | Request::Gets { .. } | Request::Version => true,
        }
    }

    /// The data block of a storage command.
    #[inline]
    pub fn payload(&self) -> Option<&'a [u8]> {
        match self {
            Request::Store(s) => Some(s.value),
            _ => None,
        }
    }

    /// Encode the command line, including its `\r\n`.
    ///
    /// For storage commands the payload and its trailing `\r\n` must follow.
    pub fn encode_head(&self, buf: &mut BytesMut) {
        match self {
            Request::Get { keys } => encode_retrieval(buf, b"get", keys),
            Request::Gets { keys } => encode_retrieval(buf, b"gets", keys),
            Request::Store(s) => {
                buf.extend_from_slice(s.verb.as_bytes());
                buf.extend_from_slice(b" ");
                buf.extend_from_slice(s.key);
                buf.extend_from_slice(b" ");
                put_decimal(buf, u64::from(s.flags));
                buf.extend_from_slice(b" ");
                put_decimal(buf, u64::from(s.exptime));
                buf.extend_from_slice(b" ");
                put_decimal(buf, s.value.len() as u64);
                if s.verb == StoreVerb::Cas {
                    buf.extend_from_slice(b" ");
                    put_decimal(buf, s.cas);
                }
                finish_line(buf, s.noreply);
            }
            Request::Delete { key, noreply } => {
                buf.extend_from_slice(b"delete ");
                buf.extend_from_slice(key);
                finish_line(buf, *noreply);
            }
            Request::Incr {
                key,
                delta,
                noreply,
            } => encode_arith(buf, b"incr ", key, *delta, *noreply),
            Request::Decr {
                key,
                delta,
                noreply,
            } => encode_arith(buf, b"decr ", key, *delta, *noreply),
            Request::Touch {
                key,
                exptime,
                noreply,
            } => {
                buf.extend_from_slice(b"touch ");
                buf.extend_from_slice(key);
                buf.extend_from_slice(b" ");
                put_decimal(buf, u64::from(*exptime));
                finish_line(buf, *noreply);
            }
            Request::FlushAll { delay, noreply } => {
                buf.extend_from_slice(b"flush_all");
                if *delay != 0 {
                    buf.extend_from_slice(b" ");
                    put_decimal(buf, u64::from(*delay));
                }
                finish_line(buf, *noreply);
            }
            Request::Version => buf.extend_from_slice(b"version\r\n"),
            Request::Quit => buf.extend_from_slice(b"quit\r\n"),
        }
    }

    /// Encode the whole request (head, payload and trailer) into `buf`.
    pub fn encode(&self, buf: &mut BytesMut) {
        self.encode_head(buf);
        if let Some(value) = self.payload() {
            buf.extend_from_slice(value);
            buf.extend_from_slice(CRLF);
        }
    }

    /// Total encoded length of the request.
    pub fn encoded_len(&self) -> usize {
        let mut head = BytesMut::new();
        self.encode_head(&mut head);
        head.len() + self.payload().map_or(0, |v| v.len() + CRLF.len())
    }
}

fn encode_retrieval(buf: &mut BytesMut, cmd: &[u8], keys: &[&[u8]]) {
    buf.extend_from_slice(cmd);
    for key in keys {
        buf.extend_from_slice(b" ");
        buf.extend_from_slice(key);
    }
    buf.extend_from_slice(CRLF);
}

fn encode_arith(buf: &mut BytesMut, cmd: &[u8], key: &[u8], delta: u64, noreply: bool) {
    buf.extend_from_slice(cmd);
    buf.extend_from_slice(key);
    buf.extend_from_slice(b" ");
    put_decimal(buf, delta);
    finish_line(buf, noreply);
}

fn finish_line(buf: &mut BytesMut, noreply: bool) {
    if noreply {
        buf.extend_from_slice(b" noreply");
    }
    buf.extend_from_slice(CRLF);
}
