//! SASL authentication over the binary protocol.
//!
//! The client does not implement any mechanism itself. An [`Authenticator`]
//! installed on the client drives the exchange through a [`SaslChannel`]
//! right after each connection is established.

use bytes::BytesMut;
use protocol_memcache::binary::{BinaryReply, BinaryRequest, Status};

use crate::connection::Connection;
use crate::error::{Error, Result};
use crate::framing::read_packet;
use crate::server::ServerAddr;

/// Runs a SASL exchange on a new connection.
pub trait Authenticator: Send + Sync {
    /// Authenticate to `server`. Any error closes the connection.
    fn authenticate(&self, server: &ServerAddr, channel: &mut SaslChannel<'_>) -> Result<()>;
}

/// Server answer to an auth or step request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SaslStep {
    /// Authentication succeeded; the payload is any final server data.
    Done(Vec<u8>),
    /// The server wants another step with this challenge.
    Continue(Vec<u8>),
}

/// The SASL requests available to an [`Authenticator`].
pub struct SaslChannel<'a> {
    conn: &'a mut Connection,
    opaque: u32,
}

impl<'a> SaslChannel<'a> {
    pub(crate) fn new(conn: &'a mut Connection) -> Self {
        Self { conn, opaque: 0 }
    }

    /// Mechanisms the server offers.
    pub fn list_mechanisms(&mut self) -> Result<Vec<String>> {
        let step = self.exchange(BinaryRequest::sasl_list_mechs())?;
        let (SaslStep::Done(raw) | SaslStep::Continue(raw)) = step;
        Ok(String::from_utf8_lossy(&raw)
            .split_ascii_whitespace()
            .map(str::to_string)
            .collect())
    }

    /// Start authenticating with `mechanism`.
    pub fn start(&mut self, mechanism: &str, data: &[u8]) -> Result<SaslStep> {
        self.exchange(BinaryRequest::sasl_auth(mechanism.as_bytes(), data))
    }

    /// Answer a challenge.
    pub fn step(&mut self, mechanism: &str, data: &[u8]) -> Result<SaslStep> {
        self.exchange(BinaryRequest::sasl_step(mechanism.as_bytes(), data))
    }

    fn exchange(&mut self, request: BinaryRequest<'_>) -> Result<SaslStep> {
        self.opaque = self.opaque.wrapping_add(1);
        let mut head = BytesMut::with_capacity(request.head_len());
        let request = request.opaque(self.opaque);
        request.encode_head(&mut head);
        self.conn.write(&[&head[..], request.payload()], true)?;

        let (header, body) = read_packet(self.conn)?;
        if header.opaque != self.opaque {
            return Err(Error::UnexpectedResponse);
        }
        let reply = BinaryReply::from_parts(header, &body)?;
        match reply.status() {
            Status::NoError => Ok(SaslStep::Done(reply.value.to_vec())),
            Status::AuthContinue => Ok(SaslStep::Continue(reply.value.to_vec())),
            Status::AuthError => Err(Error::AuthFailed(
                String::from_utf8_lossy(reply.value).into_owned(),
            )),
            status => Err(Error::Server(status.as_str().to_string())),
        }
    }
}

/// `PLAIN` mechanism with a fixed username and password.
#[derive(Debug, Clone)]
pub struct PlainAuthenticator {
    username: String,
    password: String,
}

impl PlainAuthenticator {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

impl Authenticator for PlainAuthenticator {
    fn authenticate(&self, _server: &ServerAddr, channel: &mut SaslChannel<'_>) -> Result<()> {
        let mut token = Vec::with_capacity(self.username.len() + self.password.len() + 2);
        token.push(0);
        token.extend_from_slice(self.username.as_bytes());
        token.push(0);
        token.extend_from_slice(self.password.as_bytes());
        match channel.start("PLAIN", &token)? {
            SaslStep::Done(_) => Ok(()),
            SaslStep::Continue(_) => Err(Error::AuthFailed(
                "PLAIN does not take a second step".to_string(),
            )),
        }
    }
}
