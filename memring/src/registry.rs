//! Server list and key routing.
//!
//! The registry owns every [`Node`] and the live view derived from them.
//! Consistent distributions route through a ketama [`Continuum`]; modulo
//! and random distributions index the live list directly. Node indices are
//! positions in the server list and are only meaningful until the next
//! topology change.

use std::time::Instant;

use ketama::{Continuum, Liveness, Member};
use rand::Rng;
use tracing::debug;

use crate::config::{Config, Distribution};
use crate::error::{Error, Result};
use crate::metrics;
use crate::node::Node;
use crate::server::{ServerAddr, ServerSpec};

#[derive(Debug, Default)]
pub(crate) struct Registry {
    nodes: Vec<Node>,
    continuum: Continuum,
    /// Indices of routable nodes, ascending.
    live: Vec<usize>,
    next_rebuild: Option<Instant>,
    dirty: bool,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn nodes_mut(&mut self) -> &mut [Node] {
        &mut self.nodes
    }

    pub fn node_mut(&mut self, index: usize) -> &mut Node {
        &mut self.nodes[index]
    }

    pub fn add(&mut self, spec: ServerSpec) -> usize {
        debug!(server = %spec.addr, weight = spec.weight, "server added");
        self.nodes.push(Node::new(spec));
        self.dirty = true;
        self.nodes.len() - 1
    }

    pub fn position(&self, addr: &ServerAddr) -> Option<usize> {
        self.nodes.iter().position(|n| n.addr() == addr)
    }

    /// Remove a server, returning its node so the caller can close it.
    pub fn remove(&mut self, addr: &ServerAddr) -> Result<Node> {
        let index = self
            .position(addr)
            .ok_or_else(|| Error::InvalidConfig(format!("unknown server {addr}")))?;
        self.dirty = true;
        debug!(server = %addr, "server removed");
        Ok(self.nodes.remove(index))
    }

    pub fn set_weight(&mut self, addr: &ServerAddr, weight: u32) -> Result<()> {
        let index = self
            .position(addr)
            .ok_or_else(|| Error::InvalidConfig(format!("unknown server {addr}")))?;
        self.nodes[index].set_weight(weight);
        self.dirty = true;
        Ok(())
    }

    /// Force a rebuild before the next lookup.
    pub fn invalidate(&mut self) {
        self.dirty = true;
    }

    fn refresh(&mut self, config: &Config, now: Instant) {
        let expired = self.next_rebuild.is_some_and(|at| at <= now);
        if self.dirty || expired {
            self.rebuild(config, now);
        }
    }

    /// Recompute the live list and, for consistent distributions, the
    /// continuum. Nodes in backoff are left out only with auto-eject on.
    pub fn rebuild(&mut self, config: &Config, now: Instant) {
        let members: Vec<Member<'_>> = self
            .nodes
            .iter()
            .map(|node| {
                let spec = node.spec();
                let mut member = Member::new(spec.addr.host(), spec.addr.port(), spec.weight);
                if config.auto_eject_hosts {
                    member.retry_at = node.next_retry();
                }
                member
            })
            .collect();

        let liveness = Liveness::of(&members, now);
        self.live = liveness.live;
        self.next_rebuild = liveness.next_change;
        self.continuum = match config.distribution.point_scheme() {
            Some(scheme) => Continuum::build(&members, scheme, config.continuum_hash, now),
            None => Continuum::empty(),
        };
        self.dirty = false;

        metrics::CONTINUUM_REBUILDS.increment();
        debug!(
            servers = self.nodes.len(),
            live = self.live.len(),
            points = self.continuum.point_count(),
            "continuum rebuilt"
        );
    }

    /// Owner of a key whose routing hash input is `hash_key`.
    pub fn route(&mut self, hash_key: &[u8], config: &Config) -> Result<usize> {
        if self.nodes.is_empty() {
            return Err(Error::NoServers);
        }
        self.refresh(config, Instant::now());
        if self.live.is_empty() {
            return Err(Error::NoServers);
        }

        match config.distribution {
            Distribution::Consistent | Distribution::ConsistentWeighted => self
                .continuum
                .route(config.hash.digest(hash_key))
                .ok_or(Error::NoServers),
            Distribution::Modulo => {
                let slot = config.hash.digest(hash_key) as usize % self.live.len();
                Ok(self.live[slot])
            }
            Distribution::Random => {
                let slot = rand::thread_rng().gen_range(0..self.live.len());
                Ok(self.live[slot])
            }
        }
    }

    /// Up to `count` replicas of `primary`: the live nodes that follow it
    /// in server-list order, wrapping around and never repeating.
    pub fn replicas(&self, primary: usize, count: usize) -> Vec<usize> {
        let Some(pos) = self.live.iter().position(|&i| i == primary) else {
            return Vec::new();
        };
        let count = count.min(self.live.len() - 1);
        (1..=count)
            .map(|i| self.live[(pos + i) % self.live.len()])
            .collect()
    }

    /// Nodes to try for a replicated read, in order.
    pub fn read_order(&self, primary: usize, config: &Config) -> Vec<usize> {
        let mut order = vec![primary];
        order.extend(self.replicas(primary, config.replicas));
        if config.randomize_replica_read && order.len() > 1 {
            let start = rand::thread_rng().gen_range(0..order.len());
            order.rotate_left(start);
        }
        order
    }
}
