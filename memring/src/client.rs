//! The client handle.
//!
//! A [`Client`] owns its configuration, its server list and one connection
//! per server. Every verb takes `&mut self`; share a client across threads
//! by cloning it (clones start disconnected) rather than by locking.

use std::borrow::Cow;
use std::collections::BTreeMap;
use std::sync::Arc;

use bytes::Bytes;
use protocol_memcache::StoreVerb;
use tracing::{debug, warn};

use crate::auth::Authenticator;
use crate::config::{Behavior, BehaviorValue, Config};
use crate::connection::IoContext;
use crate::error::{Error, Result};
use crate::framing::{self, Command, Response};
use crate::hooks::{BufferAllocator, Callbacks, SystemAllocator};
use crate::metrics;
use crate::node::{Mode, ServerInfo};
use crate::registry::Registry;
use crate::result::{Item, MultiGet, Outcome, PendingResult};
use crate::server::{ServerAddr, ServerSpec, parse_server_list};

/// Flags and expiration for a storage command.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StoreOptions {
    pub flags: u32,
    /// Seconds, or an absolute unix time for values over 30 days.
    pub exptime: u32,
}

impl StoreOptions {
    pub fn flags(mut self, flags: u32) -> Self {
        self.flags = flags;
        self
    }

    pub fn exptime(mut self, exptime: u32) -> Self {
        self.exptime = exptime;
        self
    }
}

/// Disjoint borrows of the client used while driving a node.
struct Parts<'a> {
    ctx: IoContext<'a>,
    registry: &'a mut Registry,
    fetch: &'a mut PendingResult,
}

/// A memcached cluster client.
pub struct Client {
    config: Config,
    registry: Registry,
    callbacks: Option<Arc<dyn Callbacks>>,
    allocator: Arc<dyn BufferAllocator>,
    authenticator: Option<Arc<dyn Authenticator>>,
    fetch: PendingResult,
    next_seq: u64,
}

impl Default for Client {
    fn default() -> Self {
        Self::new()
    }
}

impl Client {
    /// Client with the default configuration and no servers.
    pub fn new() -> Self {
        Self {
            config: Config::default(),
            registry: Registry::new(),
            callbacks: None,
            allocator: Arc::new(SystemAllocator),
            authenticator: None,
            fetch: PendingResult::default(),
            next_seq: 0,
        }
    }

    pub fn with_config(config: Config) -> Result<Self> {
        config.validate()?;
        let mut client = Self::new();
        client.config = config;
        Ok(client)
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn behavior(&self, behavior: Behavior) -> BehaviorValue {
        self.config.behavior(behavior)
    }

    /// Change one behavior. Routing changes rebuild the continuum on the
    /// next lookup; transport changes close every open connection.
    pub fn set_behavior(&mut self, behavior: Behavior, value: BehaviorValue) -> Result<()> {
        let mut next = self.config.clone();
        next.set_behavior(behavior, value)?;
        if behavior.affects_connections() {
            self.quit();
        }
        self.config = next;
        if behavior.affects_io_waits() {
            for node in self.registry.nodes_mut() {
                node.retune(&self.config);
            }
        }
        if behavior.affects_routing() {
            self.registry.invalidate();
        }
        debug!(?behavior, ?value, "behavior changed");
        Ok(())
    }

    /// Install lifecycle and trigger callbacks. `on_create` runs right away.
    pub fn set_callbacks(&mut self, callbacks: Arc<dyn Callbacks>) {
        self.callbacks = Some(Arc::clone(&callbacks));
        callbacks.on_create(self);
    }

    /// Allocator for buffers of connections opened from now on.
    pub fn set_allocator(&mut self, allocator: Arc<dyn BufferAllocator>) {
        self.allocator = allocator;
    }

    /// Authenticate every new connection. Requires the binary protocol.
    /// Open connections are closed so they re-authenticate.
    pub fn set_authenticator(&mut self, authenticator: Arc<dyn Authenticator>) {
        self.quit();
        self.authenticator = Some(authenticator);
    }

    // ── Servers ──────────────────────────────────────────────────────

    pub fn add_server(&mut self, host: &str, port: u16) -> Result<()> {
        self.add_spec(ServerSpec::tcp(host, port))
    }

    pub fn add_server_with_weight(&mut self, host: &str, port: u16, weight: u32) -> Result<()> {
        self.add_spec(ServerSpec::tcp(host, port).with_weight(weight))
    }

    /// Add a UDP server. UDP servers take writes only, and cannot be mixed
    /// with stream servers in one client.
    pub fn add_udp_server(&mut self, host: &str, port: u16) -> Result<()> {
        self.add_spec(ServerSpec::udp(host, port))
    }

    pub fn add_unix_socket(&mut self, path: &str) -> Result<()> {
        self.add_spec(ServerSpec::unix(path))
    }

    pub fn add_servers(&mut self, specs: impl IntoIterator<Item = ServerSpec>) -> Result<()> {
        for spec in specs {
            self.add_spec(spec)?;
        }
        Ok(())
    }

    /// Add every server of a `host[:port[:weight]]` list.
    pub fn add_server_list(&mut self, list: &str) -> Result<()> {
        self.add_servers(parse_server_list(list)?)
    }

    fn add_spec(&mut self, spec: ServerSpec) -> Result<()> {
        if let Some(first) = self.registry.nodes().first()
            && first.addr().is_udp() != spec.addr.is_udp()
        {
            return Err(Error::InvalidConfig(
                "UDP and stream servers cannot be mixed".to_string(),
            ));
        }
        if self.registry.position(&spec.addr).is_some() {
            return Err(Error::InvalidConfig(format!(
                "server {} already added",
                spec.addr
            )));
        }
        self.registry.add(spec);
        Ok(())
    }

    /// Remove a server, closing its connection. Keys it owned move to the
    /// remaining servers.
    pub fn remove_server(&mut self, addr: &ServerAddr) -> Result<()> {
        let mut node = self.registry.remove(addr)?;
        let parts = self.split();
        node.quit(&parts.ctx);
        Ok(())
    }

    pub fn set_server_weight(&mut self, addr: &ServerAddr, weight: u32) -> Result<()> {
        self.registry.set_weight(addr, weight)
    }

    pub fn server_count(&self) -> usize {
        self.registry.len()
    }

    pub fn servers(&self) -> Vec<ServerInfo> {
        self.registry.nodes().iter().map(|n| n.info()).collect()
    }

    /// The server that owns `key`.
    pub fn server_by_key(&mut self, key: &[u8]) -> Result<ServerAddr> {
        let wire = self.wire_key(key)?;
        let index = self.route(key, &wire)?;
        Ok(self.registry.nodes()[index].addr().clone())
    }

    // ── Retrieval ────────────────────────────────────────────────────

    /// Fetch one item. Misses return `None`, after consulting the
    /// `get_miss` callback if one is installed.
    pub fn get(&mut self, key: &[u8]) -> Result<Option<Item>> {
        self.fetch_one(key, false)
    }

    /// Like [`get`](Self::get), with the item's cas token.
    pub fn gets(&mut self, key: &[u8]) -> Result<Option<Item>> {
        self.fetch_one(key, true)
    }

    /// Fetch many keys with one request per server. Servers that fail are
    /// listed in [`MultiGet::failures`]; items from the others are kept.
    pub fn mget<K: AsRef<[u8]>>(&mut self, keys: &[K]) -> Result<MultiGet> {
        self.fetch_many(keys, false)
    }

    /// [`mget`](Self::mget) with cas tokens.
    pub fn mgets<K: AsRef<[u8]>>(&mut self, keys: &[K]) -> Result<MultiGet> {
        self.fetch_many(keys, true)
    }

    fn fetch_one(&mut self, key: &[u8], with_cas: bool) -> Result<Option<Item>> {
        let wire = self.wire_key(key)?;
        let primary = self.route(key, &wire)?;
        let order = if self.config.replicas > 0 {
            self.registry.read_order(primary, &self.config)
        } else {
            vec![primary]
        };

        let keys = [&wire[..]];
        let cmd = Command::Get {
            keys: &keys,
            with_cas,
        };
        let mut missed = false;
        let mut last_err = None;
        for index in order {
            match self.fetch_from(index, &cmd) {
                Ok(mut items) => {
                    if let Some(item) = items.pop() {
                        metrics::GET_HITS.increment();
                        return Ok(Some(item));
                    }
                    missed = true;
                }
                Err(e) => last_err = Some(e),
            }
        }
        if !missed && let Some(err) = last_err {
            return Err(err);
        }
        metrics::GET_MISSES.increment();
        self.read_through(key)
    }

    fn read_through(&mut self, key: &[u8]) -> Result<Option<Item>> {
        let Some(callbacks) = self.callbacks.clone() else {
            return Ok(None);
        };
        let Some(found) = callbacks.get_miss(key) else {
            return Ok(None);
        };
        let opts = StoreOptions {
            flags: found.flags,
            exptime: found.exptime,
        };
        if let Err(e) = self.set_with(key, &found.value, opts) {
            warn!(error = %e, "storing read-through value failed");
        }
        Ok(Some(Item {
            key: Bytes::copy_from_slice(key),
            value: Bytes::from(found.value),
            flags: found.flags,
            cas: None,
        }))
    }

    fn fetch_many<K: AsRef<[u8]>>(&mut self, keys: &[K], with_cas: bool) -> Result<MultiGet> {
        let mut groups: BTreeMap<usize, Vec<Cow<'_, [u8]>>> = BTreeMap::new();
        for key in keys {
            let key = key.as_ref();
            let wire = self.wire_key(key)?;
            let index = self.route(key, &wire)?;
            groups.entry(index).or_default().push(wire);
        }

        let mut result = MultiGet::default();
        for (index, wires) in &groups {
            let refs: Vec<&[u8]> = wires.iter().map(|w| &w[..]).collect();
            let cmd = Command::Get {
                keys: &refs,
                with_cas,
            };
            match self.fetch_from(*index, &cmd) {
                Ok(items) => result.items.extend(items),
                Err(e) => {
                    let addr = self.registry.nodes()[*index].addr().clone();
                    debug!(server = %addr, error = %e, "multi-get server failed");
                    result.failures.push((addr, e));
                }
            }
        }

        metrics::GET_HITS.add(result.items.len() as u64);
        metrics::GET_MISSES.add(keys.len().saturating_sub(result.items.len()) as u64);
        Ok(result)
    }

    fn fetch_from(&mut self, index: usize, cmd: &Command<'_>) -> Result<Vec<Item>> {
        let seq = self.next_seq();
        let prefix_len = self.config.key_prefix.len();
        let mut items = Vec::new();
        let parts = self.split();
        let result = parts.registry.node_mut(index).fetch(
            &parts.ctx,
            cmd,
            seq,
            parts.fetch,
            &mut |pending| items.push(pending.take(prefix_len)),
        );
        self.observe(&result);
        result.map(|()| items)
    }

    // ── Storage ──────────────────────────────────────────────────────

    pub fn set(&mut self, key: &[u8], value: &[u8]) -> Result<Outcome> {
        self.store(StoreVerb::Set, key, value, StoreOptions::default(), 0)
    }

    pub fn set_with(&mut self, key: &[u8], value: &[u8], opts: StoreOptions) -> Result<Outcome> {
        self.store(StoreVerb::Set, key, value, opts, 0)
    }

    /// Store only if the key is absent; otherwise `NotStored`.
    pub fn add(&mut self, key: &[u8], value: &[u8]) -> Result<Outcome> {
        self.store(StoreVerb::Add, key, value, StoreOptions::default(), 0)
    }

    pub fn add_with(&mut self, key: &[u8], value: &[u8], opts: StoreOptions) -> Result<Outcome> {
        self.store(StoreVerb::Add, key, value, opts, 0)
    }

    /// Store only if the key exists; otherwise `NotStored`.
    pub fn replace(&mut self, key: &[u8], value: &[u8]) -> Result<Outcome> {
        self.store(StoreVerb::Replace, key, value, StoreOptions::default(), 0)
    }

    pub fn replace_with(
        &mut self,
        key: &[u8],
        value: &[u8],
        opts: StoreOptions,
    ) -> Result<Outcome> {
        self.store(StoreVerb::Replace, key, value, opts, 0)
    }

    pub fn append(&mut self, key: &[u8], value: &[u8]) -> Result<Outcome> {
        self.store(StoreVerb::Append, key, value, StoreOptions::default(), 0)
    }

    pub fn prepend(&mut self, key: &[u8], value: &[u8]) -> Result<Outcome> {
        self.store(StoreVerb::Prepend, key, value, StoreOptions::default(), 0)
    }

    /// Store only if the item still has cas token `cas`. A stale token gives
    /// `DataExists`, a missing key `NotFound`.
    pub fn cas(&mut self, key: &[u8], value: &[u8], cas: u64) -> Result<Outcome> {
        self.store(StoreVerb::Cas, key, value, StoreOptions::default(), cas)
    }

    pub fn cas_with(
        &mut self,
        key: &[u8],
        value: &[u8],
        cas: u64,
        opts: StoreOptions,
    ) -> Result<Outcome> {
        self.store(StoreVerb::Cas, key, value, opts, cas)
    }

    fn store(
        &mut self,
        verb: StoreVerb,
        key: &[u8],
        value: &[u8],
        opts: StoreOptions,
        cas: u64,
    ) -> Result<Outcome> {
        let wire = self.wire_key(key)?;
        let cmd = Command::Store {
            verb,
            key: &wire,
            value,
            flags: opts.flags,
            exptime: opts.exptime,
            cas,
        };
        self.write(key, &wire, &cmd, true)
            .map(|response| response.outcome())
    }

    // ── Other writes ─────────────────────────────────────────────────

    pub fn delete(&mut self, key: &[u8]) -> Result<Outcome> {
        let wire = self.wire_key(key)?;
        let outcome = self
            .write(key, &wire, &Command::Delete { key: &wire }, true)?
            .outcome();
        if outcome.is_success()
            && let Some(callbacks) = &self.callbacks
        {
            callbacks.on_delete(key);
        }
        Ok(outcome)
    }

    /// Update the expiration of an existing item.
    pub fn touch(&mut self, key: &[u8], exptime: u32) -> Result<Outcome> {
        let wire = self.wire_key(key)?;
        let cmd = Command::Touch {
            key: &wire,
            exptime,
        };
        self.write(key, &wire, &cmd, true)
            .map(|response| response.outcome())
    }

    /// Add `delta` to a counter. `None` if the key does not exist.
    pub fn incr(&mut self, key: &[u8], delta: u64) -> Result<Option<u64>> {
        self.arith(true, key, delta, None)
    }

    /// Subtract `delta` from a counter, stopping at zero.
    pub fn decr(&mut self, key: &[u8], delta: u64) -> Result<Option<u64>> {
        self.arith(false, key, delta, None)
    }

    /// Like [`incr`](Self::incr), creating the counter at `initial` when
    /// missing. Binary protocol only.
    pub fn incr_with_initial(
        &mut self,
        key: &[u8],
        delta: u64,
        initial: u64,
        exptime: u32,
    ) -> Result<Option<u64>> {
        self.arith(true, key, delta, Some((initial, exptime)))
    }

    pub fn decr_with_initial(
        &mut self,
        key: &[u8],
        delta: u64,
        initial: u64,
        exptime: u32,
    ) -> Result<Option<u64>> {
        self.arith(false, key, delta, Some((initial, exptime)))
    }

    fn arith(
        &mut self,
        incr: bool,
        key: &[u8],
        delta: u64,
        initial: Option<(u64, u32)>,
    ) -> Result<Option<u64>> {
        let wire = self.wire_key(key)?;
        let cmd = Command::Arith {
            incr,
            key: &wire,
            delta,
            initial,
        };
        match self.write(key, &wire, &cmd, false)? {
            Response::Counter(value) => Ok(Some(value)),
            Response::Outcome(Outcome::NotFound) => Ok(None),
            _ => Err(Error::UnexpectedResponse),
        }
    }

    /// Send a single-key write to the key's owner, then to its replicas.
    ///
    /// `deferrable` writes honor buffered and no-reply modes; counters
    /// always wait for their value.
    fn write(
        &mut self,
        key: &[u8],
        wire: &[u8],
        cmd: &Command<'_>,
        deferrable: bool,
    ) -> Result<Response> {
        let primary = self.route(key, wire)?;
        let mode = match (deferrable, self.config.buffer_requests, self.config.no_reply) {
            (true, true, _) => Mode::Buffered,
            (true, false, true) => Mode::Quiet,
            _ => Mode::Sync,
        };
        let seq = self.next_seq();
        let parts = self.split();
        let result = parts.registry.node_mut(primary).request(&parts.ctx, cmd, mode, seq);
        self.observe(&result);

        let response = result?.unwrap_or(Response::Outcome(match mode {
            Mode::Buffered => Outcome::Buffered,
            Mode::Sync | Mode::Quiet => Outcome::Success,
        }));
        let outcome = response.outcome();
        if deferrable && (outcome.is_success() || outcome == Outcome::Buffered) {
            self.replicate(primary, cmd);
        }
        Ok(response)
    }

    /// Copy a successful write to the replicas. Replica failures are
    /// logged and otherwise ignored.
    fn replicate(&mut self, primary: usize, cmd: &Command<'_>) {
        if self.config.replicas == 0 {
            return;
        }
        for index in self.registry.replicas(primary, self.config.replicas) {
            let seq = self.next_seq();
            let parts = self.split();
            let node = parts.registry.node_mut(index);
            let result = node.request(&parts.ctx, cmd, Mode::Quiet, seq);
            if let Err(e) = &result {
                warn!(server = %node.addr(), error = %e, "replica write failed");
            }
            self.observe(&result);
        }
    }

    // ── Whole-cluster commands ───────────────────────────────────────

    /// Invalidate every item on every server after `delay` seconds.
    pub fn flush_all(&mut self, delay: u32) -> Result<()> {
        let mode = if self.config.no_reply {
            Mode::Quiet
        } else {
            Mode::Sync
        };
        let total = self.registry.len();
        let mut failed = 0;
        for index in 0..total {
            let seq = self.next_seq();
            let parts = self.split();
            let node = parts.registry.node_mut(index);
            if let Err(e) = node.request(&parts.ctx, &Command::Flush { delay }, mode, seq) {
                warn!(server = %node.addr(), error = %e, "flush_all failed");
                failed += 1;
            }
        }
        if failed > 0 {
            return Err(Error::SomeErrors { failed, total });
        }
        Ok(())
    }

    /// Server version strings.
    pub fn version(&mut self) -> Vec<(ServerAddr, Result<String>)> {
        let mut versions = Vec::with_capacity(self.registry.len());
        for index in 0..self.registry.len() {
            let seq = self.next_seq();
            let parts = self.split();
            let node = parts.registry.node_mut(index);
            let result = match node.request(&parts.ctx, &Command::Version, Mode::Sync, seq) {
                Ok(Some(Response::Version(version))) => Ok(version),
                Ok(None) => Err(Error::NotSupported("server does not reply")),
                Ok(Some(_)) => Err(Error::UnexpectedResponse),
                Err(e) => Err(e),
            };
            versions.push((node.addr().clone(), result));
        }
        versions
    }

    /// Send every buffered command and collect the outcomes, in the order
    /// the commands were issued.
    pub fn flush_buffers(&mut self) -> Vec<Result<Outcome>> {
        let mut collected = Vec::new();
        let parts = self.split();
        for node in parts.registry.nodes_mut() {
            collected.extend(node.collect(&parts.ctx));
        }
        collected.sort_by_key(|(seq, _)| *seq);
        collected.into_iter().map(|(_, result)| result).collect()
    }

    /// Close every connection, sending `quit` first. Unread buffered
    /// replies are dropped. The client stays usable and reconnects lazily.
    pub fn quit(&mut self) {
        let parts = self.split();
        for node in parts.registry.nodes_mut() {
            node.quit(&parts.ctx);
        }
    }

    // ── Internals ────────────────────────────────────────────────────

    fn next_seq(&mut self) -> u64 {
        self.next_seq = self.next_seq.wrapping_add(1);
        self.next_seq
    }

    fn split(&mut self) -> Parts<'_> {
        Parts {
            ctx: IoContext {
                config: &self.config,
                allocator: &self.allocator,
                authenticator: self.authenticator.as_deref(),
                framing: framing::for_protocol(self.config.binary_protocol),
            },
            registry: &mut self.registry,
            fetch: &mut self.fetch,
        }
    }

    /// Under auto-eject, a newly dead server changes the live set.
    fn observe<T>(&mut self, result: &Result<T>) {
        if self.config.auto_eject_hosts && matches!(result, Err(Error::ServerMarkedDead(_))) {
            self.registry.invalidate();
        }
    }

    fn route(&mut self, key: &[u8], wire: &[u8]) -> Result<usize> {
        let hash_key = if self.config.hash_with_prefix_key {
            wire
        } else {
            key
        };
        self.registry.route(hash_key, &self.config)
    }

    /// Validate `key` and prepend the key prefix.
    fn wire_key<'k>(&self, key: &'k [u8]) -> Result<Cow<'k, [u8]>> {
        let config = &self.config;
        if key.is_empty() {
            return Err(Error::BadKey("empty key"));
        }
        if config.key_prefix.len() + key.len() > config.max_key_len() {
            return Err(Error::BadKey("key too long"));
        }
        // Text framing cannot carry these bytes in a key; `verify_key`
        // extends the check to binary keys.
        if (config.verify_key || !config.binary_protocol)
            && key.iter().any(|&b| b <= b' ' || b == 0x7f)
        {
            return Err(Error::BadKey("key contains whitespace or control bytes"));
        }

        if config.key_prefix.is_empty() {
            Ok(Cow::Borrowed(key))
        } else {
            let mut wire = Vec::with_capacity(config.key_prefix.len() + key.len());
            wire.extend_from_slice(&config.key_prefix);
            wire.extend_from_slice(key);
            Ok(Cow::Owned(wire))
        }
    }
}

impl Clone for Client {
    /// Same configuration, servers and hooks; no open connections.
    fn clone(&self) -> Self {
        let mut registry = Registry::new();
        for node in self.registry.nodes() {
            registry.add(node.spec().clone());
        }
        let clone = Client {
            config: self.config.clone(),
            registry,
            callbacks: self.callbacks.clone(),
            allocator: Arc::clone(&self.allocator),
            authenticator: self.authenticator.clone(),
            fetch: PendingResult::default(),
            next_seq: 0,
        };
        if let Some(callbacks) = &self.callbacks {
            callbacks.on_clone(self, &clone);
        }
        clone
    }
}

impl Drop for Client {
    fn drop(&mut self) {
        if let Some(callbacks) = self.callbacks.clone() {
            callbacks.on_cleanup(self);
        }
        self.quit();
    }
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("config", &self.config)
            .field("servers", &self.registry.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use crate::hooks::ReadThrough;

    #[test]
    fn key_validation() {
        let mut client = Client::new();
        client.add_server("127.0.0.1", 11211).unwrap();

        assert!(matches!(client.get(b""), Err(Error::BadKey(_))));
        assert!(matches!(
            client.get(&[b'k'; 251]),
            Err(Error::BadKey("key too long"))
        ));
        assert!(matches!(client.set(b"a b", b"v"), Err(Error::BadKey(_))));
        assert!(matches!(client.set(b"a\nb", b"v"), Err(Error::BadKey(_))));
        assert!(matches!(client.get(b"k\x7f"), Err(Error::BadKey(_))));
    }

    #[test]
    fn binary_keys_checked_only_when_verifying() {
        let config = Config {
            binary_protocol: true,
            ..Config::default()
        };
        let mut client = Client::with_config(config).unwrap();
        assert!(client.wire_key(b"a b").is_ok());

        client
            .set_behavior(Behavior::VerifyKey, BehaviorValue::Bool(true))
            .unwrap();
        assert!(matches!(client.wire_key(b"a b"), Err(Error::BadKey(_))));
        assert!(matches!(client.wire_key(b"a\rb"), Err(Error::BadKey(_))));
        assert!(client.wire_key(b"ab").is_ok());
    }

    #[test]
    fn prefix_counts_toward_key_length() {
        let config = Config {
            key_prefix: b"app:".to_vec(),
            ..Config::default()
        };
        let client = Client::with_config(config).unwrap();
        assert!(client.wire_key(&[b'k'; 246]).is_ok());
        assert!(client.wire_key(&[b'k'; 247]).is_err());
        assert_eq!(&client.wire_key(b"user").unwrap()[..], b"app:user");
    }

    #[test]
    fn no_servers() {
        let mut client = Client::new();
        assert!(matches!(client.get(b"k"), Err(Error::NoServers)));
        assert!(matches!(client.server_by_key(b"k"), Err(Error::NoServers)));
    }

    #[test]
    fn server_list_management() {
        let mut client = Client::new();
        client
            .add_server_list("10.0.0.1:11211, 10.0.0.2:11212:3")
            .unwrap();
        assert_eq!(client.server_count(), 2);
        assert_eq!(client.servers()[1].weight, 3);

        assert!(client.add_server("10.0.0.1", 11211).is_err());
        assert!(client.add_udp_server("10.0.0.3", 11211).is_err());

        let addr = client.servers()[0].addr.clone();
        client.remove_server(&addr).unwrap();
        assert_eq!(client.server_count(), 1);
        assert_eq!(
            client.server_by_key(b"anything").unwrap().to_string(),
            "10.0.0.2:11212"
        );
    }

    #[test]
    fn invalid_behavior_leaves_config_unchanged() {
        let mut client = Client::new();
        client
            .set_behavior(Behavior::BufferRequests, BehaviorValue::Bool(true))
            .unwrap();
        assert!(
            client
                .set_behavior(Behavior::NoReply, BehaviorValue::Bool(true))
                .is_err()
        );
        assert_eq!(
            client.behavior(Behavior::NoReply),
            BehaviorValue::Bool(false)
        );
    }

    #[derive(Default)]
    struct Recorder {
        created: AtomicUsize,
        cloned: AtomicUsize,
        cleaned: AtomicUsize,
    }

    impl Callbacks for Recorder {
        fn on_create(&self, _client: &Client) {
            self.created.fetch_add(1, Ordering::SeqCst);
        }

        fn on_clone(&self, source: &Client, clone: &Client) {
            assert_eq!(source.server_count(), clone.server_count());
            self.cloned.fetch_add(1, Ordering::SeqCst);
        }

        fn on_cleanup(&self, _client: &Client) {
            self.cleaned.fetch_add(1, Ordering::SeqCst);
        }

        fn get_miss(&self, _key: &[u8]) -> Option<ReadThrough> {
            None
        }
    }

    #[test]
    fn lifecycle_callbacks() {
        let recorder = Arc::new(Recorder::default());
        let mut client = Client::new();
        client.add_server("127.0.0.1", 11211).unwrap();
        client.set_callbacks(recorder.clone());
        assert_eq!(recorder.created.load(Ordering::SeqCst), 1);

        let clone = client.clone();
        assert_eq!(recorder.cloned.load(Ordering::SeqCst), 1);
        assert_eq!(clone.server_count(), 1);
        assert!(!clone.servers()[0].connected);

        drop(clone);
        drop(client);
        assert_eq!(recorder.cleaned.load(Ordering::SeqCst), 2);
    }
}
