//! One server: its connection, failure accounting and pipelined replies.

use std::collections::VecDeque;
use std::time::Instant;

use bytes::BytesMut;
use tracing::{debug, trace, warn};

use crate::config::Config;
use crate::connection::{Connection, IoContext};
use crate::error::{Error, Result};
use crate::framing::{Command, Expect, Response};
use crate::metrics;
use crate::result::{Outcome, PendingResult};
use crate::server::{ServerAddr, ServerSpec};

/// How a command is sent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Mode {
    /// Flush and wait for the reply.
    Sync,
    /// Queue without flushing; the reply is read by a later drain.
    Buffered,
    /// Flush and never read a reply.
    Quiet,
}

/// A reply owed on the current connection.
#[derive(Debug, Clone, Copy)]
struct PendingReply {
    seq: u64,
    expect: Expect,
    opaque: u32,
}

/// Snapshot of a server's state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerInfo {
    pub addr: ServerAddr,
    pub weight: u32,
    pub connected: bool,
    /// Consecutive failures since the last successful connect.
    pub failures: u32,
    /// Connection attempts made over the client's lifetime.
    pub connect_attempts: u64,
    /// Buffered commands whose replies have not been read yet.
    pub pending: usize,
    /// Set while the server is backing off.
    pub next_retry: Option<Instant>,
}

#[derive(Debug)]
pub(crate) struct Node {
    spec: ServerSpec,
    conn: Option<Connection>,
    failures: u32,
    next_retry: Option<Instant>,
    connect_attempts: u64,
    pending: VecDeque<PendingReply>,
    completed: VecDeque<(u64, Result<Outcome>)>,
    /// Results discarded since the last collect.
    dropped: u64,
    bytes_since_drain: usize,
    head: BytesMut,
}

impl Node {
    pub fn new(spec: ServerSpec) -> Self {
        Self {
            spec,
            conn: None,
            failures: 0,
            next_retry: None,
            connect_attempts: 0,
            pending: VecDeque::new(),
            completed: VecDeque::new(),
            dropped: 0,
            bytes_since_drain: 0,
            head: BytesMut::new(),
        }
    }

    #[inline]
    pub fn addr(&self) -> &ServerAddr {
        &self.spec.addr
    }

    #[inline]
    pub fn spec(&self) -> &ServerSpec {
        &self.spec
    }

    pub fn set_weight(&mut self, weight: u32) {
        self.spec.weight = weight;
    }

    #[inline]
    pub fn next_retry(&self) -> Option<Instant> {
        self.next_retry
    }

    #[cfg(test)]
    pub fn set_next_retry(&mut self, at: Option<Instant>) {
        self.next_retry = at;
    }

    #[inline]
    pub fn is_connected(&self) -> bool {
        self.conn.is_some()
    }

    #[inline]
    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }

    pub fn info(&self) -> ServerInfo {
        ServerInfo {
            addr: self.spec.addr.clone(),
            weight: self.spec.weight,
            connected: self.conn.is_some(),
            failures: self.failures,
            connect_attempts: self.connect_attempts,
            pending: self.pending.len(),
            next_retry: self.next_retry,
        }
    }

    pub fn retune(&mut self, config: &Config) {
        if let Some(conn) = self.conn.as_mut() {
            conn.retune(config);
        }
    }

    /// Open the connection if needed. A server inside its retry window is
    /// refused without touching the network.
    fn ensure_connected(&mut self, ctx: &IoContext<'_>, now: Instant) -> Result<()> {
        if self.conn.is_some() {
            return Ok(());
        }
        if let Some(at) = self.next_retry
            && now < at
        {
            return Err(Error::ServerMarkedDead(self.spec.addr.to_string()));
        }

        self.connect_attempts += 1;
        match Connection::open(&self.spec.addr, ctx) {
            Ok(conn) => {
                debug!(server = %self.spec.addr, "connected");
                metrics::CONNECTIONS_OPENED.increment();
                self.conn = Some(conn);
                self.failures = 0;
                self.next_retry = None;
                self.bytes_since_drain = 0;
                Ok(())
            }
            Err(e) => {
                metrics::CONNECT_FAILURES.increment();
                Err(e)
            }
        }
    }

    /// Close the connection. Replies still owed are reported as `reason`.
    pub fn disconnect(&mut self, reason: &Error, config: &Config) {
        if self.conn.take().is_some() {
            debug!(server = %self.spec.addr, reason = %reason, "disconnected");
        }
        while let Some(pending) = self.pending.pop_front() {
            self.complete(pending.seq, Err(reason.clone()), config);
        }
        self.bytes_since_drain = 0;
    }

    /// Record a buffered result for the next collect, discarding the
    /// oldest once `buffered_result_limit` results are held.
    fn complete(&mut self, seq: u64, result: Result<Outcome>, config: &Config) {
        if self.completed.len() >= config.buffered_result_limit {
            self.completed.pop_front();
            self.dropped += 1;
            metrics::BUFFERED_RESULTS_DROPPED.increment();
            if self.dropped == 1 {
                warn!(
                    server = %self.spec.addr,
                    limit = config.buffered_result_limit,
                    "buffered results not collected, dropping the oldest"
                );
            }
        }
        self.completed.push_back((seq, result));
    }

    /// Apply an error to the node state and return the error to report.
    fn fail(&mut self, err: Error, config: &Config) -> Error {
        if err.is_fatal_to_connection() {
            self.disconnect(&err, config);
        }
        if !err.counts_as_failure() {
            return err;
        }

        self.failures += 1;
        if self.failures > config.server_failure_limit {
            self.next_retry = Some(Instant::now() + config.retry_timeout);
            metrics::SERVERS_EJECTED.increment();
            warn!(
                server = %self.spec.addr,
                failures = self.failures,
                retry_in = ?config.retry_timeout,
                error = %err,
                "server marked dead"
            );
            return Error::ServerMarkedDead(self.spec.addr.to_string());
        }
        err
    }

    /// Send one command and, in sync mode, read its reply.
    pub fn request(
        &mut self,
        ctx: &IoContext<'_>,
        cmd: &Command<'_>,
        mode: Mode,
        seq: u64,
    ) -> Result<Option<Response>> {
        let result = self.try_request(ctx, cmd, mode, seq);
        result.map_err(|e| self.fail(e, ctx.config))
    }

    fn try_request(
        &mut self,
        ctx: &IoContext<'_>,
        cmd: &Command<'_>,
        mode: Mode,
        seq: u64,
    ) -> Result<Option<Response>> {
        // Datagrams carry no replies.
        let mode = if self.spec.addr.is_udp() {
            Mode::Quiet
        } else {
            mode
        };
        self.ensure_connected(ctx, Instant::now())?;
        match mode {
            Mode::Buffered => self.purge_if_needed(ctx)?,
            Mode::Sync | Mode::Quiet => self.drain(ctx)?,
        }

        let opaque = seq as u32;
        let quiet = mode == Mode::Quiet;
        self.send(ctx, cmd, quiet, mode != Mode::Buffered, opaque)?;

        if self.spec.addr.is_udp() || !ctx.framing.answered(cmd, quiet) {
            return Ok(None);
        }
        match mode {
            Mode::Buffered => {
                self.pending.push_back(PendingReply {
                    seq,
                    expect: cmd.expect(),
                    opaque,
                });
                Ok(None)
            }
            Mode::Sync | Mode::Quiet => {
                let conn = self.conn.as_mut().ok_or(Error::ConnectionClosed)?;
                let response = ctx.framing.read_response(conn, cmd.expect(), opaque)?;
                self.bytes_since_drain = 0;
                Ok(Some(response))
            }
        }
    }

    /// Send a fetch and hand every returned item to `sink`.
    pub fn fetch(
        &mut self,
        ctx: &IoContext<'_>,
        cmd: &Command<'_>,
        seq: u64,
        out: &mut PendingResult,
        sink: &mut dyn FnMut(&mut PendingResult),
    ) -> Result<()> {
        let result = self.try_fetch(ctx, cmd, seq, out, sink);
        result.map_err(|e| self.fail(e, ctx.config))
    }

    fn try_fetch(
        &mut self,
        ctx: &IoContext<'_>,
        cmd: &Command<'_>,
        seq: u64,
        out: &mut PendingResult,
        sink: &mut dyn FnMut(&mut PendingResult),
    ) -> Result<()> {
        if self.spec.addr.is_udp() {
            return Err(Error::NotSupported("UDP servers only accept writes"));
        }
        self.ensure_connected(ctx, Instant::now())?;
        self.drain(ctx)?;
        let opaque = seq as u32;
        self.send(ctx, cmd, false, true, opaque)?;
        let conn = self.conn.as_mut().ok_or(Error::ConnectionClosed)?;
        ctx.framing.read_items(conn, opaque, out, sink)?;
        self.bytes_since_drain = 0;
        Ok(())
    }

    fn send(
        &mut self,
        ctx: &IoContext<'_>,
        cmd: &Command<'_>,
        quiet: bool,
        flush: bool,
        opaque: u32,
    ) -> Result<()> {
        self.head.clear();
        let frame = ctx.framing.encode(cmd, quiet, opaque, &mut self.head)?;
        let conn = self.conn.as_mut().ok_or(Error::ConnectionClosed)?;
        let parts = [&self.head[..], frame.payload, frame.trailer];
        let written = if conn.is_udp() {
            conn.send_datagram(&parts)?
        } else {
            conn.write(&parts, flush)?
        };
        self.bytes_since_drain += written;
        metrics::REQUESTS.increment();
        Ok(())
    }

    /// Drain before queueing once either watermark is reached, so the
    /// pending queue never exceeds `io_msg_watermark`.
    fn purge_if_needed(&mut self, ctx: &IoContext<'_>) -> Result<()> {
        let config = ctx.config;
        if self.pending.len() >= config.io_msg_watermark
            || self.bytes_since_drain >= config.io_bytes_watermark
        {
            metrics::PURGES.increment();
            trace!(
                server = %self.spec.addr,
                pending = self.pending.len(),
                bytes = self.bytes_since_drain,
                "watermark reached"
            );
            self.drain(ctx)?;
        }
        Ok(())
    }

    /// Flush and read every owed reply into the completed list.
    fn drain(&mut self, ctx: &IoContext<'_>) -> Result<()> {
        let Some(conn) = self.conn.as_mut() else {
            return Ok(());
        };
        conn.flush()?;
        if !self.pending.is_empty() {
            trace!(server = %self.spec.addr, count = self.pending.len(), "drain");
        }
        while let Some(pending) = self.pending.front().copied() {
            let conn = self.conn.as_mut().ok_or(Error::ConnectionClosed)?;
            match ctx
                .framing
                .read_response(conn, pending.expect, pending.opaque)
            {
                Ok(response) => {
                    self.pending.pop_front();
                    self.complete(pending.seq, Ok(response.outcome()), ctx.config);
                }
                Err(e) if e.is_fatal_to_connection() => return Err(e),
                Err(e) => {
                    self.pending.pop_front();
                    self.complete(pending.seq, Err(e), ctx.config);
                }
            }
        }
        self.bytes_since_drain = 0;
        Ok(())
    }

    /// Drain owed replies and return every result collected so far.
    pub fn collect(&mut self, ctx: &IoContext<'_>) -> Vec<(u64, Result<Outcome>)> {
        if self.conn.is_some()
            && let Err(e) = self.drain(ctx)
        {
            // The failed entries were moved to `completed` by the disconnect.
            self.fail(e, ctx.config);
        }
        if self.dropped > 0 {
            debug!(server = %self.spec.addr, dropped = self.dropped, "collected after drops");
            self.dropped = 0;
        }
        self.completed.drain(..).collect()
    }

    /// Send a quit and close the connection.
    pub fn quit(&mut self, ctx: &IoContext<'_>) {
        if self.conn.is_none() {
            return;
        }
        let _ = self.drain(ctx);
        if let Err(e) = self.send(ctx, &Command::Quit, true, true, 0) {
            trace!(server = %self.spec.addr, error = %e, "quit not sent");
        }
        if let Some(conn) = self.conn.as_mut() {
            conn.reset_buffers();
        }
        self.disconnect(&Error::ConnectionClosed, ctx.config);
    }
}
