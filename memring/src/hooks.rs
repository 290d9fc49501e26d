//! Caller-supplied hooks: lifecycle and trigger callbacks, and the buffer
//! allocator every connection and result buffer is obtained from.

use bytes::BytesMut;

use crate::client::Client;

/// A value produced by [`Callbacks::get_miss`] for read-through caching.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadThrough {
    pub value: Vec<u8>,
    pub flags: u32,
    pub exptime: u32,
}

/// Lifecycle and trigger callbacks.
///
/// Every method has an empty default, so implementors override only what
/// they need.
pub trait Callbacks: Send + Sync {
    /// The callbacks were installed on `client`.
    fn on_create(&self, _client: &Client) {}

    /// `clone` was made from `source`. Runs after the clone is complete.
    fn on_clone(&self, _source: &Client, _clone: &Client) {}

    /// `client` is being dropped. Runs before connections are closed.
    fn on_cleanup(&self, _client: &Client) {}

    /// A `get` missed. Returning a value stores it with `set` and returns it
    /// to the caller as if it had been found.
    fn get_miss(&self, _key: &[u8]) -> Option<ReadThrough> {
        None
    }

    /// A `delete` removed `key`.
    fn on_delete(&self, _key: &[u8]) {}
}

/// Source of every buffer the client allocates.
pub trait BufferAllocator: Send + Sync {
    /// Return an empty buffer with at least `capacity` bytes reserved, or
    /// `None` if the allocation is refused.
    fn allocate(&self, capacity: usize) -> Option<BytesMut>;
}

/// Allocator backed by the global heap.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemAllocator;

impl BufferAllocator for SystemAllocator {
    fn allocate(&self, capacity: usize) -> Option<BytesMut> {
        Some(BytesMut::with_capacity(capacity))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn system_allocator_reserves() {
        let buf = SystemAllocator.allocate(4096).unwrap();
        assert!(buf.is_empty());
        assert!(buf.capacity() >= 4096);
    }

    #[test]
    fn default_callbacks_do_nothing() {
        struct Quiet;
        impl Callbacks for Quiet {}
        assert_eq!(Quiet.get_miss(b"k"), None);
    }
}
