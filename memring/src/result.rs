//! Result values returned by the client verbs.

use bytes::{Bytes, BytesMut};

use crate::error::Error;
use crate::server::ServerAddr;

/// What the server decided. Misses, refused stores and cas conflicts are
/// outcomes, not errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Command applied (touch, flush, counters).
    Success,
    Stored,
    Deleted,
    NotFound,
    /// `add` on an existing key, or `replace`/`append`/`prepend` on a
    /// missing one.
    NotStored,
    /// `cas` token mismatch.
    DataExists,
    /// Queued in buffered mode; the real outcome is reported by
    /// [`Client::flush_buffers`](crate::Client::flush_buffers).
    Buffered,
}

impl Outcome {
    /// True for the outcomes that mean the command took effect.
    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Success | Outcome::Stored | Outcome::Deleted)
    }
}

/// A retrieved item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Item {
    /// Key without the client's key prefix.
    pub key: Bytes,
    pub value: Bytes,
    pub flags: u32,
    /// Data version, present for `gets` and for every binary-protocol fetch.
    pub cas: Option<u64>,
}

/// Result of a multi-key fetch that spans several servers.
#[derive(Debug, Default)]
pub struct MultiGet {
    /// Items found, in the order the servers returned them.
    pub items: Vec<Item>,
    /// Servers that could not be queried, with the reason.
    pub failures: Vec<(ServerAddr, Error)>,
}

impl MultiGet {
    /// Find a returned item by key.
    pub fn get(&self, key: &[u8]) -> Option<&Item> {
        self.items.iter().find(|item| item.key == key)
    }

    /// `Err(SomeErrors)` if any server failed, otherwise the items.
    pub fn into_result(self, servers_queried: usize) -> crate::Result<Vec<Item>> {
        if self.failures.is_empty() {
            Ok(self.items)
        } else {
            Err(Error::SomeErrors {
                failed: self.failures.len(),
                total: servers_queried,
            })
        }
    }
}

/// Reusable fetch buffer, refilled by the codec for every item.
///
/// Fields are cleared by [`reset`](Self::reset) before each fill so a fetch
/// never sees data from the previous one.
#[derive(Debug, Default)]
pub(crate) struct PendingResult {
    pub key: BytesMut,
    pub value: Bytes,
    pub flags: u32,
    pub cas: Option<u64>,
}

impl PendingResult {
    pub fn reset(&mut self) {
        self.key.clear();
        self.value = Bytes::new();
        self.flags = 0;
        self.cas = None;
    }

    /// Move the filled item out, stripping `prefix_len` bytes of key prefix,
    /// and reset.
    pub fn take(&mut self, prefix_len: usize) -> Item {
        let mut key = self.key.split().freeze();
        if key.len() >= prefix_len {
            key = key.slice(prefix_len..);
        }
        let item = Item {
            key,
            value: std::mem::take(&mut self.value),
            flags: self.flags,
            cas: self.cas,
        };
        self.reset();
        item
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn take_strips_prefix_and_resets() {
        let mut pending = PendingResult::default();
        pending.key.extend_from_slice(b"ns:user");
        pending.value = Bytes::from_static(b"alice");
        pending.flags = 3;
        pending.cas = Some(9);

        let item = pending.take(3);
        assert_eq!(&item.key[..], b"user");
        assert_eq!(&item.value[..], b"alice");
        assert_eq!(item.flags, 3);
        assert_eq!(item.cas, Some(9));

        assert!(pending.key.is_empty());
        assert!(pending.value.is_empty());
        assert_eq!(pending.flags, 0);
        assert_eq!(pending.cas, None);
    }

    #[test]
    fn multi_get_result() {
        let ok = MultiGet::default();
        assert!(ok.into_result(2).unwrap().is_empty());

        let failed = MultiGet {
            items: Vec::new(),
            failures: vec![(
                ServerAddr::Tcp {
                    host: "h".into(),
                    port: 1,
                },
                Error::Timeout,
            )],
        };
        assert!(matches!(
            failed.into_result(2),
            Err(Error::SomeErrors {
                failed: 1,
                total: 2
            })
        ));
    }

    #[test]
    fn success_outcomes() {
        assert!(Outcome::Stored.is_success());
        assert!(!Outcome::NotStored.is_success());
        assert!(!Outcome::Buffered.is_success());
    }
}
