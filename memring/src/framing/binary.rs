use bytes::{Bytes, BytesMut};
use protocol_memcache::StoreVerb;
use protocol_memcache::binary::{BinaryReply, BinaryRequest, HEADER_SIZE, Opcode, ResponseHeader, Status};
use tracing::trace;

use super::{Command, Expect, Frame, Framing, Response};
use crate::connection::Connection;
use crate::error::{Error, Result};
use crate::result::{Outcome, PendingResult};

pub(crate) struct BinaryFraming;

/// Read one complete response packet.
pub(crate) fn read_packet(conn: &mut Connection) -> Result<(ResponseHeader, Bytes)> {
    let raw = conn.read_exact(HEADER_SIZE)?;
    let header = ResponseHeader::parse(&raw)?;
    let body = conn.read_exact(header.layout()?.total())?;
    Ok((header, body))
}

impl Framing for BinaryFraming {
    fn encode<'a>(
        &self,
        cmd: &Command<'a>,
        quiet: bool,
        opaque: u32,
        head: &mut BytesMut,
    ) -> Result<Frame<'a>> {
        let request = match *cmd {
            Command::Get { keys, .. } => {
                for key in keys {
                    BinaryRequest::getk(key)
                        .quiet()
                        .opaque(opaque)
                        .encode(head);
                }
                BinaryRequest::noop().opaque(opaque).encode(head);
                return Ok(Frame::EMPTY);
            }
            Command::Store {
                verb,
                key,
                value,
                flags,
                exptime,
                cas,
            } => {
                let mut request = BinaryRequest::store(verb.opcode(), key, value)
                    .flags(flags)
                    .exptime(exptime);
                if verb == StoreVerb::Cas {
                    request = request.cas(cas);
                }
                request
            }
            Command::Delete { key } => BinaryRequest::delete(key),
            Command::Arith {
                incr,
                key,
                delta,
                initial,
            } => match (incr, initial) {
                (true, None) => BinaryRequest::increment(key, delta),
                (false, None) => BinaryRequest::decrement(key, delta),
                (incr, Some((initial, exptime))) => {
                    let opcode = if incr {
                        Opcode::Increment
                    } else {
                        Opcode::Decrement
                    };
                    BinaryRequest::arith(opcode, key, delta, initial, exptime)
                }
            },
            Command::Touch { key, exptime } => BinaryRequest::touch(key, exptime),
            Command::Flush { delay } => BinaryRequest::flush(delay),
            Command::Version => BinaryRequest::version(),
            Command::Quit => BinaryRequest::quit().quiet(),
        };

        let request = if quiet { request.quiet() } else { request };
        request.opaque(opaque).encode_head(head);
        Ok(Frame {
            payload: request.payload(),
            trailer: b"",
        })
    }

    fn answered(&self, cmd: &Command<'_>, quiet: bool) -> bool {
        match cmd {
            Command::Quit => false,
            // No quiet opcodes exist for these.
            Command::Get { .. } | Command::Touch { .. } | Command::Version => true,
            _ => !quiet,
        }
    }

    fn read_response(
        &self,
        conn: &mut Connection,
        expect: Expect,
        opaque: u32,
    ) -> Result<Response> {
        loop {
            let (header, body) = read_packet(conn)?;
            if header.opaque != opaque {
                // Failure report from an earlier quiet request.
                trace!(opaque = header.opaque, status = ?header.status, "skipping stray reply");
                continue;
            }
            let reply = BinaryReply::from_parts(header, &body)?;
            return map_reply(expect, &reply);
        }
    }

    fn read_items(
        &self,
        conn: &mut Connection,
        opaque: u32,
        out: &mut PendingResult,
        sink: &mut dyn FnMut(&mut PendingResult),
    ) -> Result<()> {
        // Keep reading to the NOOP even after an error so the stream stays
        // aligned; report the first error afterwards.
        let mut failure = None;
        loop {
            let (header, body) = read_packet(conn)?;
            if header.opaque != opaque {
                trace!(opaque = header.opaque, status = ?header.status, "skipping stray reply");
                continue;
            }
            match (header.opcode, header.status) {
                (Opcode::Noop, _) => break,
                (Opcode::Get | Opcode::GetQ | Opcode::GetK | Opcode::GetKQ, Status::NoError) => {
                    let layout = header.layout()?;
                    let reply = BinaryReply::from_parts(header, &body)?;
                    out.reset();
                    out.key.extend_from_slice(reply.key);
                    out.flags = reply.flags();
                    out.cas = Some(header.cas);
                    out.value = body.slice(layout.extras + layout.key..);
                    sink(out);
                }
                (Opcode::Get | Opcode::GetQ | Opcode::GetK | Opcode::GetKQ, Status::KeyNotFound) => {}
                (_, status) if !status.is_success() => {
                    failure.get_or_insert(status_error(status, &body));
                }
                _ => {
                    failure.get_or_insert(Error::UnexpectedResponse);
                }
            }
        }
        match failure {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

fn status_error(status: Status, message: &[u8]) -> Error {
    if message.is_empty() {
        Error::Server(status.as_str().to_string())
    } else {
        Error::Server(format!(
            "{}: {}",
            status.as_str(),
            String::from_utf8_lossy(message)
        ))
    }
}

/// Map a binary status onto the same outcomes the text protocol produces.
fn map_reply(expect: Expect, reply: &BinaryReply<'_>) -> Result<Response> {
    let outcome = match (reply.status(), expect) {
        (Status::NoError, Expect::Store(_)) => Outcome::Stored,
        (Status::NoError, Expect::Delete) => Outcome::Deleted,
        (Status::NoError, Expect::Touch | Expect::Flush) => Outcome::Success,
        (Status::NoError, Expect::Arith) => return Ok(Response::Counter(reply.counter()?)),
        (Status::NoError, Expect::Version) => {
            return Ok(Response::Version(
                String::from_utf8_lossy(reply.value).into_owned(),
            ));
        }
        (Status::NoError, Expect::Items | Expect::Nothing) => {
            return Err(Error::UnexpectedResponse);
        }
        (
            Status::KeyNotFound,
            Expect::Store(StoreVerb::Replace | StoreVerb::Append | StoreVerb::Prepend),
        ) => Outcome::NotStored,
        (Status::KeyNotFound, _) => Outcome::NotFound,
        (Status::KeyExists, Expect::Store(StoreVerb::Add)) => Outcome::NotStored,
        (Status::KeyExists, _) => Outcome::DataExists,
        (Status::ItemNotStored, _) => Outcome::NotStored,
        (status, _) => return Err(status_error(status, reply.value)),
    };
    Ok(Response::Outcome(outcome))
}
