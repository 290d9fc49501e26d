//! Wire framing: turns client commands into protocol requests and reads the
//! replies back off a [`Connection`].
//!
//! Two framings exist, one per protocol, selected per call from
//! `Config::binary_protocol`. Both map server replies onto the same
//! [`Outcome`] values so callers never see which protocol was used.

mod binary;
mod text;

use bytes::BytesMut;
use protocol_memcache::StoreVerb;

use crate::connection::Connection;
use crate::error::Result;
use crate::result::{Outcome, PendingResult};

pub(crate) use binary::read_packet;

/// A command as issued by the client, before framing.
#[derive(Debug, Clone, Copy)]
pub(crate) enum Command<'a> {
    Get {
        keys: &'a [&'a [u8]],
        with_cas: bool,
    },
    Store {
        verb: StoreVerb,
        key: &'a [u8],
        value: &'a [u8],
        flags: u32,
        exptime: u32,
        cas: u64,
    },
    Delete {
        key: &'a [u8],
    },
    Arith {
        incr: bool,
        key: &'a [u8],
        delta: u64,
        /// `(initial, exptime)`: create the counter when missing.
        initial: Option<(u64, u32)>,
    },
    Touch {
        key: &'a [u8],
        exptime: u32,
    },
    Flush {
        delay: u32,
    },
    Version,
    Quit,
}

impl Command<'_> {
    /// The kind of reply this command gets.
    pub fn expect(&self) -> Expect {
        match self {
            Command::Get { .. } => Expect::Items,
            Command::Store { verb, .. } => Expect::Store(*verb),
            Command::Delete { .. } => Expect::Delete,
            Command::Arith { .. } => Expect::Arith,
            Command::Touch { .. } => Expect::Touch,
            Command::Flush { .. } => Expect::Flush,
            Command::Version => Expect::Version,
            Command::Quit => Expect::Nothing,
        }
    }
}

/// Reply kind owed for a command; kept in the per-node pending queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Expect {
    Items,
    Store(StoreVerb),
    Delete,
    Arith,
    Touch,
    Flush,
    Version,
    Nothing,
}

/// A decoded reply to a single-reply command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Response {
    Outcome(Outcome),
    Counter(u64),
    Version(String),
}

impl Response {
    pub fn outcome(&self) -> Outcome {
        match self {
            Response::Outcome(outcome) => *outcome,
            Response::Counter(_) | Response::Version(_) => Outcome::Success,
        }
    }
}

/// The bytes that follow the encoded head on the wire.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Frame<'a> {
    pub payload: &'a [u8],
    pub trailer: &'static [u8],
}

impl Frame<'static> {
    pub const EMPTY: Self = Frame {
        payload: b"",
        trailer: b"",
    };
}

pub(crate) trait Framing: Sync {
    /// Encode everything up to the value into `head`, returning the value
    /// and trailer the caller writes after it. `opaque` tags binary replies.
    fn encode<'a>(
        &self,
        cmd: &Command<'a>,
        quiet: bool,
        opaque: u32,
        head: &mut BytesMut,
    ) -> Result<Frame<'a>>;

    /// Whether the server answers `cmd` sent with `quiet`.
    fn answered(&self, cmd: &Command<'_>, quiet: bool) -> bool;

    /// Read the reply to a single-reply command.
    fn read_response(&self, conn: &mut Connection, expect: Expect, opaque: u32)
    -> Result<Response>;

    /// Read the replies to a fetch, handing each item to `sink` through
    /// the reusable `out` buffer.
    fn read_items(
        &self,
        conn: &mut Connection,
        opaque: u32,
        out: &mut PendingResult,
        sink: &mut dyn FnMut(&mut PendingResult),
    ) -> Result<()>;
}

static TEXT: text::TextFraming = text::TextFraming;
static BINARY: binary::BinaryFraming = binary::BinaryFraming;

pub(crate) fn for_protocol(binary: bool) -> &'static dyn Framing {
    if binary { &BINARY } else { &TEXT }
}
