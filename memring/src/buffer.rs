//! Fixed-capacity connection buffers.
//!
//! Both buffers are backed by a [`BytesMut`] obtained from the client's
//! [`BufferAllocator`](crate::BufferAllocator) and never hold more than their
//! configured capacity. Consumed bytes are split off the front, so lines and
//! values handed to the codec are zero-copy views of received data.

use std::io;

use bytes::{Buf, Bytes, BytesMut};
use protocol_memcache::find_crlf;

/// Receive buffer with a read cursor at the front.
#[derive(Debug)]
pub(crate) struct ReadBuffer {
    buf: BytesMut,
    capacity: usize,
}

impl ReadBuffer {
    pub fn new(buf: BytesMut, capacity: usize) -> Self {
        Self { buf, capacity }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    #[inline]
    pub fn is_full(&self) -> bool {
        self.buf.len() >= self.capacity
    }

    /// Append received bytes. `recv` gets the free tail of the buffer and
    /// returns how many bytes it wrote.
    pub fn fill_with<F>(&mut self, recv: F) -> io::Result<usize>
    where
        F: FnOnce(&mut [u8]) -> io::Result<usize>,
    {
        let start = self.buf.len();
        let spare = self.capacity.saturating_sub(start);
        if spare == 0 {
            return Ok(0);
        }
        self.buf.resize(start + spare, 0);
        let result = recv(&mut self.buf[start..]);
        let filled = *result.as_ref().unwrap_or(&0);
        self.buf.truncate(start + filled.min(spare));
        result
    }

    /// Remove one `\r\n`-terminated line, returning it without the terminator.
    pub fn take_line(&mut self) -> Option<Bytes> {
        let end = find_crlf(&self.buf)?;
        let line = self.buf.split_to(end + 2).freeze();
        Some(line.slice(..end))
    }

    /// Move up to `n` buffered bytes into `out`, returning how many moved.
    pub fn take_into(&mut self, out: &mut BytesMut, n: usize) -> usize {
        let n = n.min(self.buf.len());
        out.extend_from_slice(&self.buf[..n]);
        self.buf.advance(n);
        n
    }

    /// Remove exactly `n` bytes if they are buffered.
    pub fn take_exact(&mut self, n: usize) -> Option<Bytes> {
        (self.buf.len() >= n).then(|| self.buf.split_to(n).freeze())
    }

    pub fn clear(&mut self) {
        self.buf.clear();
    }
}

/// Send buffer; bytes are appended at the back and drained from the front.
#[derive(Debug)]
pub(crate) struct WriteBuffer {
    buf: BytesMut,
    capacity: usize,
}

impl WriteBuffer {
    pub fn new(buf: BytesMut, capacity: usize) -> Self {
        Self { buf, capacity }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    #[inline]
    pub fn remaining(&self) -> usize {
        self.capacity.saturating_sub(self.buf.len())
    }

    /// Copy as much of `data` as fits, returning the number of bytes taken.
    pub fn push(&mut self, data: &[u8]) -> usize {
        let n = data.len().min(self.remaining());
        self.buf.extend_from_slice(&data[..n]);
        n
    }

    #[inline]
    pub fn as_slice(&self) -> &[u8] {
        &self.buf
    }

    /// Drop `n` sent bytes from the front.
    pub fn consume(&mut self, n: usize) {
        self.buf.advance(n);
    }

    pub fn clear(&mut self) {
        self.buf.clear();
    }
}
