use bytes::BytesMut;
use protocol_memcache::{ParseError, Reply, Request};

use super::{Command, Expect, Frame, Framing, Response};
use crate::connection::Connection;
use crate::error::{Error, Result};
use crate::result::{Outcome, PendingResult};

const CRLF: &[u8] = b"\r\n";

pub(crate) struct TextFraming;

impl Framing for TextFraming {
    fn encode<'a>(
        &self,
        cmd: &Command<'a>,
        quiet: bool,
        _opaque: u32,
        head: &mut BytesMut,
    ) -> Result<Frame<'a>> {
        let request = match *cmd {
            Command::Get { keys, with_cas } => {
                if with_cas {
                    Request::gets(keys)
                } else {
                    Request::get(keys)
                }
            }
            Command::Store {
                verb,
                key,
                value,
                flags,
                exptime,
                cas,
            } => {
                let mut store = Request::store(verb, key, value)
                    .flags(flags)
                    .exptime(exptime)
                    .noreply(quiet);
                store.cas = cas;
                store.build().encode_head(head);
                return Ok(Frame {
                    payload: value,
                    trailer: CRLF,
                });
            }
            Command::Delete { key } => Request::delete(key).with_noreply(quiet),
            Command::Arith {
                incr,
                key,
                delta,
                initial,
            } => {
                if initial.is_some() {
                    return Err(Error::NotSupported(
                        "counter initial values need the binary protocol",
                    ));
                }
                let request = if incr {
                    Request::incr(key, delta)
                } else {
                    Request::decr(key, delta)
                };
                request.with_noreply(quiet)
            }
            Command::Touch { key, exptime } => Request::touch(key, exptime).with_noreply(quiet),
            Command::Flush { delay } => Request::flush_all(delay).with_noreply(quiet),
            Command::Version => Request::version(),
            Command::Quit => Request::quit(),
        };
        request.encode_head(head);
        Ok(Frame::EMPTY)
    }

    fn answered(&self, cmd: &Command<'_>, quiet: bool) -> bool {
        match cmd {
            Command::Quit => false,
            Command::Get { .. } | Command::Version => true,
            _ => !quiet,
        }
    }

    fn read_response(
        &self,
        conn: &mut Connection,
        expect: Expect,
        _opaque: u32,
    ) -> Result<Response> {
        let line = conn.read_line()?;
        let reply = Reply::parse_line(&line)?;
        if reply.is_error() {
            return Err(server_error(&reply));
        }

        let outcome = match (expect, reply) {
            (Expect::Store(_), Reply::Stored) => Outcome::Stored,
            (Expect::Store(_), Reply::NotStored) => Outcome::NotStored,
            (Expect::Store(_), Reply::Exists) => Outcome::DataExists,
            (Expect::Store(_), Reply::NotFound) => Outcome::NotFound,
            (Expect::Delete, Reply::Deleted) => Outcome::Deleted,
            (Expect::Touch, Reply::Touched) => Outcome::Success,
            (Expect::Flush, Reply::Ok) => Outcome::Success,
            (Expect::Delete | Expect::Touch | Expect::Arith, Reply::NotFound) => {
                Outcome::NotFound
            }
            (Expect::Arith, Reply::Numeric(value)) => return Ok(Response::Counter(value)),
            (Expect::Version, Reply::Version(version)) => {
                return Ok(Response::Version(
                    String::from_utf8_lossy(version).into_owned(),
                ));
            }
            _ => return Err(Error::UnexpectedResponse),
        };
        Ok(Response::Outcome(outcome))
    }

    fn read_items(
        &self,
        conn: &mut Connection,
        _opaque: u32,
        out: &mut PendingResult,
        sink: &mut dyn FnMut(&mut PendingResult),
    ) -> Result<()> {
        loop {
            let line = conn.read_line()?;
            match Reply::parse_line(&line)? {
                Reply::Value {
                    key,
                    flags,
                    bytes,
                    cas,
                } => {
                    out.reset();
                    out.key.extend_from_slice(key);
                    out.flags = flags;
                    out.cas = cas;
                    let data = conn.read_exact(bytes + CRLF.len())?;
                    if !data.ends_with(CRLF) {
                        return Err(Error::Protocol(ParseError::Protocol(
                            "value not terminated by CRLF",
                        )));
                    }
                    out.value = data.slice(..bytes);
                    sink(out);
                }
                Reply::End => return Ok(()),
                reply if reply.is_error() => return Err(server_error(&reply)),
                _ => return Err(Error::UnexpectedResponse),
            }
        }
    }
}

fn server_error(reply: &Reply<'_>) -> Error {
    match reply {
        Reply::ClientError(msg) => {
            Error::Server(format!("CLIENT_ERROR {}", String::from_utf8_lossy(msg)))
        }
        Reply::ServerError(msg) => {
            Error::Server(format!("SERVER_ERROR {}", String::from_utf8_lossy(msg)))
        }
        _ => Error::Server("ERROR".to_string()),
    }
}
