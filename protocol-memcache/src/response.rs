//! Memcache ASCII response parsing.
//!
//! Responses are parsed one line at a time. A `VALUE` line only advertises
//! the data block; the caller reads `bytes + 2` more bytes (data plus `\r\n`)
//! before the next line.
//!
//! Reply lines:
//! - `VALUE <key> <flags> <bytes> [<cas>]` - one retrieved item
//! - `END` - end of a retrieval
//! - `STORED` / `NOT_STORED` / `EXISTS` / `NOT_FOUND` - storage outcomes
//! - `DELETED` / `TOUCHED` / `OK`
//! - `<digits>` - INCR/DECR result
//! - `VERSION <version>` / `STAT <name> <value>`
//! - `ERROR` / `CLIENT_ERROR <msg>` / `SERVER_ERROR <msg>`

use crate::MAX_VALUE_LEN;
use crate::error::ParseError;

/// A single parsed response line. Borrowed from the line buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reply<'a> {
    /// Header of a retrieved item; `bytes` of data and `\r\n` follow.
    Value {
        key: &'a [u8],
        flags: u32,
        bytes: usize,
        cas: Option<u64>,
    },
    End,
    Stored,
    NotStored,
    Exists,
    NotFound,
    Deleted,
    Touched,
    Ok,
    /// INCR/DECR result.
    Numeric(u64),
    Version(&'a [u8]),
    Stat {
        name: &'a [u8],
        value: &'a [u8],
    },
    /// Unknown command.
    Error,
    ClientError(&'a [u8]),
    ServerError(&'a [u8]),
}

impl<'a> Reply<'a> {
    /// Parse one response line, without its trailing `\r\n`.
    pub fn parse_line(line: &'a [u8]) -> Result<Self, ParseError> {
        let Some(&first) = line.first() else {
            return Err(ParseError::UnknownReply);
        };

        let reply = match first {
            b'V' if line.starts_with(b"VALUE ") => return parse_value(&line[6..]),
            b'V' if line.starts_with(b"VERSION ") => Reply::Version(&line[8..]),
            b'S' if line == b"STORED" => Reply::Stored,
            b'S' if line.starts_with(b"SERVER_ERROR") => Reply::ServerError(message(line, 12)),
            b'S' if line.starts_with(b"STAT ") => {
                let rest = &line[5..];
                let split = memchr::memchr(b' ', rest).unwrap_or(rest.len());
                Reply::Stat {
                    name: &rest[..split],
                    value: rest.get(split + 1..).unwrap_or_default(),
                }
            }
            b'D' if line == b"DELETED" => Reply::Deleted,
            b'N' if line == b"NOT_FOUND" => Reply::NotFound,
            b'N' if line == b"NOT_STORED" => Reply::NotStored,
            b'E' if line == b"END" => Reply::End,
            b'E' if line == b"ERROR" => Reply::Error,
            b'E' if line == b"EXISTS" => Reply::Exists,
            b'C' if line.starts_with(b"CLIENT_ERROR") => Reply::ClientError(message(line, 12)),
            b'O' if line == b"OK" => Reply::Ok,
            b'T' if line == b"TOUCHED" => Reply::Touched,
            b'0'..=b'9' => {
                // Older servers pad decremented values with spaces.
                let digits = line.trim_ascii_end();
                Reply::Numeric(parse_u64(digits)?)
            }
            _ => return Err(ParseError::UnknownReply),
        };
        Ok(reply)
    }

    /// Parse one line from the front of `data`.
    ///
    /// Returns the reply and the number of bytes consumed, including `\r\n`.
    pub fn parse(data: &'a [u8]) -> Result<(Self, usize), ParseError> {
        let end = find_crlf(data).ok_or(ParseError::Incomplete)?;
        Ok((Self::parse_line(&data[..end])?, end + 2))
    }

    /// For a `VALUE` line, the length of the data block that follows.
    #[inline]
    pub fn value_len(&self) -> Option<usize> {
        match self {
            Reply::Value { bytes, .. } => Some(*bytes),
            _ => None,
        }
    }

    /// Returns true for `ERROR`, `CLIENT_ERROR` and `SERVER_ERROR`.
    #[inline]
    pub fn is_error(&self) -> bool {
        matches!(
            self,
            Reply::Error | Reply::ClientError(_) | Reply::ServerError(_)
        )
    }

    /// Returns true if no further lines belong to this response.
    ///
    /// `VALUE` and `STAT` lines are followed by more lines up to `END`.
    #[inline]
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Reply::Value { .. } | Reply::Stat { .. })
    }
}

/// Find `\r\n` in data, returning the position of `\r`.
pub fn find_crlf(data: &[u8]) -> Option<usize> {
    let mut from = 0;
    while let Some(pos) = memchr::memchr(b'\r', &data[from..]) {
        let at = from + pos;
        match data.get(at + 1) {
            Some(b'\n') => return Some(at),
            Some(_) => from = at + 1,
            None => return None,
        }
    }
    None
}

fn message(line: &[u8], prefix: usize) -> &[u8] {
    line.get(prefix..).unwrap_or_default().trim_ascii_start()
}

/// Parse the remainder of `VALUE <key> <flags> <bytes> [<cas>]`.
fn parse_value(rest: &[u8]) -> Result<Reply<'_>, ParseError> {
    let mut parts = rest.split(|&b| b == b' ').filter(|p| !p.is_empty());
    let key = parts.next().ok_or(ParseError::Protocol("missing key"))?;
    let flags = parts.next().ok_or(ParseError::Protocol("missing flags"))?;
    let bytes = parts.next().ok_or(ParseError::Protocol("missing length"))?;
    let cas = parts.next().map(parse_u64).transpose()?;
    if parts.next().is_some() {
        return Err(ParseError::Protocol("trailing data on VALUE line"));
    }

    let flags = u32::try_from(parse_u64(flags)?).map_err(|_| ParseError::InvalidNumber)?;
    let bytes = usize::try_from(parse_u64(bytes)?).map_err(|_| ParseError::InvalidNumber)?;
    if bytes > MAX_VALUE_LEN {
        return Err(ParseError::ValueTooLarge(bytes));
    }

    Ok(Reply::Value {
        key,
        flags,
        bytes,
        cas,
    })
}

/// Parse a u64 from ASCII decimal.
fn parse_u64(data: &[u8]) -> Result<u64, ParseError> {
    if data.is_empty() || !data.iter().all(u8::is_ascii_digit) {
        return Err(ParseError::InvalidNumber);
    }
    data.iter().try_fold(0u64, |acc, &d| {
        acc.checked_mul(10)
            .and_then(|v| v.checked_add(u64::from(d - b'0')))
            .ok_or(ParseError::InvalidNumber)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_simple_lines() {
        let cases: &[(&[u8], Reply<'_>)] = &[
            (b"STORED", Reply::Stored),
            (b"NOT_STORED", Reply::NotStored),
            (b"EXISTS", Reply::Exists),
            (b"NOT_FOUND", Reply::NotFound),
            (b"DELETED", Reply::Deleted),
            (b"TOUCHED", Reply::Touched),
            (b"END", Reply::End),
            (b"OK", Reply::Ok),
            (b"ERROR", Reply::Error),
        ];
        for (line, expected) in cases {
            assert_eq!(Reply::parse_line(line).unwrap(), *expected);
        }
    }

    #[test]
    fn test_parse_value() {
        let reply = Reply::parse_line(b"VALUE mykey 42 5").unwrap();
        assert_eq!(
            reply,
            Reply::Value {
                key: b"mykey",
                flags: 42,
                bytes: 5,
                cas: None
            }
        );
        assert_eq!(reply.value_len(), Some(5));
        assert!(!reply.is_terminal());
    }

    #[test]
    fn test_parse_value_with_cas() {
        let reply = Reply::parse_line(b"VALUE k 0 0 12345").unwrap();
        assert_eq!(
            reply,
            Reply::Value {
                key: b"k",
                flags: 0,
                bytes: 0,
                cas: Some(12345)
            }
        );
    }

    #[test]
    fn test_parse_value_invalid() {
        assert_eq!(
            Reply::parse_line(b"VALUE k 0"),
            Err(ParseError::Protocol("missing length"))
        );
        assert_eq!(
            Reply::parse_line(b"VALUE k x 5"),
            Err(ParseError::InvalidNumber)
        );
        assert_eq!(
            Reply::parse_line(b"VALUE k 4294967296 5"),
            Err(ParseError::InvalidNumber)
        );
        assert_eq!(
            Reply::parse_line(b"VALUE k 0 5 1 extra"),
            Err(ParseError::Protocol("trailing data on VALUE line"))
        );
    }

    #[test]
    fn test_parse_value_too_large() {
        assert_eq!(
            Reply::parse_line(b"VALUE k 0 999999999999"),
            Err(ParseError::ValueTooLarge(999_999_999_999))
        );
    }

    #[test]
    fn test_parse_numeric() {
        assert_eq!(Reply::parse_line(b"42").unwrap(), Reply::Numeric(42));
        assert_eq!(Reply::parse_line(b"9   ").unwrap(), Reply::Numeric(9));
        assert_eq!(
            Reply::parse_line(b"18446744073709551615").unwrap(),
            Reply::Numeric(u64::MAX)
        );
        assert_eq!(
            Reply::parse_line(b"18446744073709551616"),
            Err(ParseError::InvalidNumber)
        );
    }

    #[test]
    fn test_parse_errors() {
        let reply = Reply::parse_line(b"SERVER_ERROR out of memory").unwrap();
        assert_eq!(reply, Reply::ServerError(b"out of memory"));
        assert!(reply.is_error());

        let reply = Reply::parse_line(b"CLIENT_ERROR bad data chunk").unwrap();
        assert_eq!(reply, Reply::ClientError(b"bad data chunk"));

        assert_eq!(
            Reply::parse_line(b"SERVER_ERROR").unwrap(),
            Reply::ServerError(b"")
        );
    }

    #[test]
    fn test_parse_version_and_stat() {
        assert_eq!(
            Reply::parse_line(b"VERSION 1.6.21").unwrap(),
            Reply::Version(b"1.6.21")
        );
        assert_eq!(
            Reply::parse_line(b"STAT pid 1234").unwrap(),
            Reply::Stat {
                name: b"pid",
                value: b"1234"
            }
        );
    }

    #[test]
    fn test_parse_unknown() {
        assert_eq!(Reply::parse_line(b""), Err(ParseError::UnknownReply));
        assert_eq!(Reply::parse_line(b"BOGUS"), Err(ParseError::UnknownReply));
        assert_eq!(Reply::parse_line(b"STOREDX"), Err(ParseError::UnknownReply));
    }

    #[test]
    fn test_parse_with_crlf() {
        let (reply, consumed) = Reply::parse(b"STORED\r\nEND\r\n").unwrap();
        assert_eq!(reply, Reply::Stored);
        assert_eq!(consumed, 8);
        assert_eq!(Reply::parse(b"STORED\r"), Err(ParseError::Incomplete));
    }

    #[test]
    fn test_find_crlf() {
        assert_eq!(find_crlf(b"abc\r\n"), Some(3));
        assert_eq!(find_crlf(b"a\rb\r\n"), Some(3));
        assert_eq!(find_crlf(b"abc\r"), None);
        assert_eq!(find_crlf(b"abc"), None);
    }
}
