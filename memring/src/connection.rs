//! Per-node socket and buffered IO.
//!
//! Sockets are opened blocking (bounded by the connect timeout), configured,
//! and then switched to non-blocking. Every wait afterwards is an explicit
//! `poll(2)` bounded by the send or receive timeout, so a call never blocks
//! longer than its configured bound.

use std::io::{self, Read, Write};
use std::net::{SocketAddr, TcpStream, ToSocketAddrs, UdpSocket};
use std::os::fd::{AsRawFd, RawFd};
use std::os::unix::net::UnixStream;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use protocol_memcache::ParseError;
use protocol_memcache::udp::{FRAME_HEADER_SIZE, FrameHeader, MAX_DATAGRAM_PAYLOAD};
use tracing::trace;

use crate::auth::{Authenticator, SaslChannel};
use crate::buffer::{ReadBuffer, WriteBuffer};
use crate::config::Config;
use crate::error::{Error, Result};
use crate::framing::Framing;
use crate::hooks::BufferAllocator;
use crate::metrics;
use crate::server::ServerAddr;

/// Everything a node needs from the client to open and drive a connection.
pub(crate) struct IoContext<'a> {
    pub config: &'a Config,
    pub allocator: &'a Arc<dyn BufferAllocator>,
    pub authenticator: Option<&'a dyn Authenticator>,
    pub framing: &'static dyn Framing,
}

enum Transport {
    Tcp(TcpStream),
    Unix(UnixStream),
    Udp(UdpSocket),
}

impl Transport {
    fn connect(addr: &ServerAddr, config: &Config) -> io::Result<Self> {
        let transport = match addr {
            ServerAddr::Tcp { host, port } => {
                let stream = connect_tcp(host, *port, config.connect_timeout)?;
                let fd = stream.as_raw_fd();
                if config.tcp_nodelay {
                    set_opt(fd, libc::IPPROTO_TCP, libc::TCP_NODELAY, 1 as libc::c_int)?;
                }
                if config.tcp_keepalive {
                    set_opt(fd, libc::SOL_SOCKET, libc::SO_KEEPALIVE, 1 as libc::c_int)?;
                }
                // Non-blocking sockets must not linger on close.
                let linger = libc::linger {
                    l_onoff: 1,
                    l_linger: 0,
                };
                set_opt(fd, libc::SOL_SOCKET, libc::SO_LINGER, linger)?;
                Transport::Tcp(stream)
            }
            ServerAddr::Unix { path } => Transport::Unix(UnixStream::connect(path)?),
            ServerAddr::Udp { host, port } => {
                let peer = resolve(host, *port)?
                    .next()
                    .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "no address"))?;
                let local: SocketAddr = if peer.is_ipv4() {
                    ([0, 0, 0, 0], 0).into()
                } else {
                    ([0u16; 8], 0).into()
                };
                let socket = UdpSocket::bind(local)?;
                socket.connect(peer)?;
                Transport::Udp(socket)
            }
        };

        let fd = transport.fd();
        if let Some(size) = config.socket_send_size {
            set_opt(fd, libc::SOL_SOCKET, libc::SO_SNDBUF, clamp_c_int(size))?;
        }
        if let Some(size) = config.socket_recv_size {
            set_opt(fd, libc::SOL_SOCKET, libc::SO_RCVBUF, clamp_c_int(size))?;
        }
        transport.set_nonblocking()?;
        Ok(transport)
    }

    fn fd(&self) -> RawFd {
        match self {
            Transport::Tcp(s) => s.as_raw_fd(),
            Transport::Unix(s) => s.as_raw_fd(),
            Transport::Udp(s) => s.as_raw_fd(),
        }
    }

    fn set_nonblocking(&self) -> io::Result<()> {
        match self {
            Transport::Tcp(s) => s.set_nonblocking(true),
            Transport::Unix(s) => s.set_nonblocking(true),
            Transport::Udp(s) => s.set_nonblocking(true),
        }
    }

    fn send(&mut self, data: &[u8]) -> io::Result<usize> {
        match self {
            Transport::Tcp(s) => s.write(data),
            Transport::Unix(s) => s.write(data),
            Transport::Udp(s) => s.send(data),
        }
    }

    fn recv(&mut self, dst: &mut [u8]) -> io::Result<usize> {
        match self {
            Transport::Tcp(s) => s.read(dst),
            Transport::Unix(s) => s.read(dst),
            Transport::Udp(s) => s.recv(dst),
        }
    }

    #[cfg(target_os = "linux")]
    fn set_cork(&self, on: bool) {
        if let Transport::Tcp(s) = self
            && let Err(e) = set_opt(
                s.as_raw_fd(),
                libc::IPPROTO_TCP,
                libc::TCP_CORK,
                libc::c_int::from(on),
            )
        {
            trace!(error = %e, "TCP_CORK not applied");
        }
    }

    #[cfg(not(target_os = "linux"))]
    fn set_cork(&self, _on: bool) {}
}

fn resolve(host: &str, port: u16) -> io::Result<std::vec::IntoIter<SocketAddr>> {
    (host, port).to_socket_addrs()
}

fn connect_tcp(host: &str, port: u16, timeout: Duration) -> io::Result<TcpStream> {
    let mut last = None;
    for addr in resolve(host, port)? {
        match TcpStream::connect_timeout(&addr, timeout) {
            Ok(stream) => return Ok(stream),
            Err(e) => last = Some(e),
        }
    }
    Err(last.unwrap_or_else(|| io::Error::new(io::ErrorKind::NotFound, "no address resolved")))
}

fn clamp_c_int(n: usize) -> libc::c_int {
    libc::c_int::try_from(n).unwrap_or(libc::c_int::MAX)
}

fn set_opt<T>(fd: RawFd, level: libc::c_int, name: libc::c_int, value: T) -> io::Result<()> {
    let rc = unsafe {
        libc::setsockopt(
            fd,
            level,
            name,
            &value as *const T as *const libc::c_void,
            std::mem::size_of::<T>() as libc::socklen_t,
        )
    };
    if rc < 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

/// Wait for `events` on `fd`. Returns the reported events, or `Timeout`.
fn poll_fd(fd: RawFd, events: libc::c_short, timeout: Duration) -> Result<libc::c_short> {
    let mut pfd = libc::pollfd {
        fd,
        events,
        revents: 0,
    };
    let millis = libc::c_int::try_from(timeout.as_millis()).unwrap_or(libc::c_int::MAX);
    loop {
        let rc = unsafe { libc::poll(&mut pfd, 1, millis) };
        match rc {
            0 => return Err(Error::Timeout),
            1.. => return Ok(pfd.revents),
            _ => {
                let err = io::Error::last_os_error();
                if err.kind() != io::ErrorKind::Interrupted {
                    return Err(Error::Io(err));
                }
            }
        }
    }
}

/// An open connection with its fixed-capacity buffers.
pub(crate) struct Connection {
    transport: Transport,
    read_buf: ReadBuffer,
    write_buf: WriteBuffer,
    allocator: Arc<dyn BufferAllocator>,
    send_wait: Duration,
    recv_wait: Duration,
    cork: bool,
    udp_request_id: u16,
}

impl Connection {
    /// Connect, configure and (if configured) authenticate.
    pub fn open(addr: &ServerAddr, ctx: &IoContext<'_>) -> Result<Self> {
        let config = ctx.config;
        let transport = Transport::connect(addr, config).map_err(|source| Error::Connect {
            addr: addr.to_string(),
            source,
        })?;

        let read = ctx
            .allocator
            .allocate(config.read_buffer_size)
            .ok_or(Error::Allocation(config.read_buffer_size))?;
        let write = ctx
            .allocator
            .allocate(config.write_buffer_size)
            .ok_or(Error::Allocation(config.write_buffer_size))?;

        metrics::CONNECTIONS_ACTIVE.increment();
        let mut conn = Connection {
            transport,
            read_buf: ReadBuffer::new(read, config.read_buffer_size),
            write_buf: WriteBuffer::new(write, config.write_buffer_size),
            allocator: Arc::clone(ctx.allocator),
            send_wait: config.send_wait(),
            recv_wait: config.recv_wait(),
            cork: config.tcp_cork,
            udp_request_id: rand::random(),
        };

        if let Some(auth) = ctx.authenticator {
            if !config.binary_protocol || conn.is_udp() {
                return Err(Error::NotSupported(
                    "SASL authentication requires the binary protocol over a stream socket",
                ));
            }
            auth.authenticate(addr, &mut SaslChannel::new(&mut conn))?;
        }
        Ok(conn)
    }

    /// Apply changed poll bounds and corking to an open connection.
    pub fn retune(&mut self, config: &Config) {
        self.send_wait = config.send_wait();
        self.recv_wait = config.recv_wait();
        self.cork = config.tcp_cork;
    }

    pub fn is_udp(&self) -> bool {
        matches!(self.transport, Transport::Udp(_))
    }

    /// Bytes received but not yet consumed by the codec.
    pub fn buffered_input(&self) -> usize {
        self.read_buf.len()
    }

    /// Append `parts` to the write buffer, flushing whenever it fills, and
    /// flush at the end if `flush` is set. Returns the bytes accepted.
    pub fn write(&mut self, parts: &[&[u8]], flush: bool) -> Result<usize> {
        let total = parts.iter().map(|p| p.len()).sum();
        let cork = self.cork && parts.iter().filter(|p| !p.is_empty()).count() > 1;
        if cork {
            self.transport.set_cork(true);
        }
        let result = self.write_parts(parts, flush);
        if cork {
            self.transport.set_cork(false);
        }
        result.map(|()| total)
    }

    fn write_parts(&mut self, parts: &[&[u8]], flush: bool) -> Result<()> {
        for part in parts {
            let mut rest = *part;
            while !rest.is_empty() {
                let n = self.write_buf.push(rest);
                rest = &rest[n..];
                if self.write_buf.remaining() == 0 {
                    self.flush()?;
                }
            }
        }
        if flush {
            self.flush()?;
        }
        Ok(())
    }

    /// Send everything in the write buffer.
    pub fn flush(&mut self) -> Result<()> {
        if !self.write_buf.is_empty() {
            trace!(bytes = self.write_buf.len(), "flush");
        }
        while !self.write_buf.is_empty() {
            match self.transport.send(self.write_buf.as_slice()) {
                Ok(0) => return Err(Error::ConnectionClosed),
                Ok(n) => {
                    metrics::BYTES_SENT.add(n as u64);
                    self.write_buf.consume(n);
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => self.wait_writable()?,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => return Err(Error::Io(e)),
            }
        }
        Ok(())
    }

    /// Block until the socket is writable. Replies that arrive meanwhile are
    /// pulled into the read buffer so a server blocked on its own send can
    /// make progress.
    fn wait_writable(&mut self) -> Result<()> {
        let mut events = libc::POLLOUT;
        if !self.read_buf.is_full() {
            events |= libc::POLLIN;
        }
        let revents = poll_fd(self.transport.fd(), events, self.send_wait)?;
        if revents & libc::POLLIN != 0 {
            self.recv_once()?;
        }
        if revents & (libc::POLLERR | libc::POLLNVAL) != 0 && revents & libc::POLLOUT == 0 {
            return Err(Error::ConnectionClosed);
        }
        Ok(())
    }

    /// One non-blocking recv into the read buffer. Returns zero when no data
    /// is available.
    fn recv_once(&mut self) -> Result<usize> {
        if self.read_buf.is_full() {
            return Ok(0);
        }
        let transport = &mut self.transport;
        match self.read_buf.fill_with(|dst| transport.recv(dst)) {
            Ok(0) => Err(Error::ConnectionClosed),
            Ok(n) => {
                metrics::BYTES_RECEIVED.add(n as u64);
                Ok(n)
            }
            Err(e)
                if e.kind() == io::ErrorKind::WouldBlock
                    || e.kind() == io::ErrorKind::Interrupted =>
            {
                Ok(0)
            }
            Err(e) => Err(Error::Io(e)),
        }
    }

    /// Receive at least one byte, polling for readability when none is
    /// immediately available.
    fn fill(&mut self) -> Result<()> {
        loop {
            if self.recv_once()? > 0 {
                return Ok(());
            }
            let revents = poll_fd(self.transport.fd(), libc::POLLIN, self.recv_wait)?;
            if revents & (libc::POLLERR | libc::POLLNVAL) != 0 && revents & libc::POLLIN == 0 {
                return Err(Error::ConnectionClosed);
            }
        }
    }

    /// Next `\r\n`-terminated line, without the terminator.
    pub fn read_line(&mut self) -> Result<Bytes> {
        loop {
            if let Some(line) = self.read_buf.take_line() {
                return Ok(line);
            }
            if self.read_buf.is_full() {
                return Err(Error::Protocol(ParseError::Protocol(
                    "reply line exceeds read buffer",
                )));
            }
            self.fill()?;
        }
    }

    /// Exactly `n` bytes. Larger than the read buffer is fine: the data is
    /// assembled across refills in a buffer from the allocator.
    pub fn read_exact(&mut self, n: usize) -> Result<Bytes> {
        if let Some(data) = self.read_buf.take_exact(n) {
            return Ok(data);
        }
        let mut out = self.allocator.allocate(n).ok_or(Error::Allocation(n))?;
        loop {
            let want = n - out.len();
            self.read_buf.take_into(&mut out, want);
            if out.len() == n {
                return Ok(out.freeze());
            }
            self.fill()?;
        }
    }

    /// Send one request as a single UDP datagram. Nothing is buffered.
    pub fn send_datagram(&mut self, parts: &[&[u8]]) -> Result<usize> {
        let body: usize = parts.iter().map(|p| p.len()).sum();
        if body > MAX_DATAGRAM_PAYLOAD {
            return Err(Error::DatagramTooLarge(body + FRAME_HEADER_SIZE));
        }
        let size = body + FRAME_HEADER_SIZE;
        let mut datagram = self.allocator.allocate(size).ok_or(Error::Allocation(size))?;
        self.udp_request_id = self.udp_request_id.wrapping_add(1);
        FrameHeader::single(self.udp_request_id).encode(&mut datagram);
        for part in parts {
            datagram.extend_from_slice(part);
        }

        loop {
            match self.transport.send(&datagram) {
                Ok(n) => {
                    metrics::BYTES_SENT.add(n as u64);
                    return Ok(body);
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                    poll_fd(self.transport.fd(), libc::POLLOUT, self.send_wait)?;
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => return Err(Error::Io(e)),
            }
        }
    }

    /// Drop unsent and unread bytes.
    pub fn reset_buffers(&mut self) {
        self.read_buf.clear();
        self.write_buf.clear();
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("udp", &self.is_udp())
            .field("buffered_input", &self.buffered_input())
            .finish()
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        metrics::CONNECTIONS_ACTIVE.decrement();
        metrics::CONNECTIONS_CLOSED.increment();
    }
}
