//! Ketama consistent hash continuum.
//!
//! Provides the key hash functions and the sorted point table used to map a
//! key to one of many memcached nodes, compatible with libmemcached's ketama
//! distributions. Adding or removing a server remaps only ~1/N of keys.
//!
//! A [`Continuum`] is immutable. Topology or liveness changes produce a new
//! one via [`Continuum::build`]; callers swap it in whole.

pub mod hash;
mod md5;

use std::time::Instant;

pub use hash::HashAlgorithm;

/// Port that is left out of a node's canonical ring identity.
pub const DEFAULT_PORT: u16 = 11211;

/// Points per node for the unweighted ketama scheme.
pub const POINTS_PER_SERVER: usize = 100;

/// Points per weight class for the weighted (MD5) ketama scheme.
pub const POINTS_PER_SERVER_KETAMA: usize = 160;

/// How ring points are generated for each node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PointScheme {
    /// [`POINTS_PER_SERVER`] points per live node, one per digest of the
    /// continuum hash algorithm.
    #[default]
    Ketama,
    /// Points proportional to weight; each MD5 digest yields four points.
    KetamaWeighted,
}

impl PointScheme {
    /// Number of ring points produced by one digest.
    pub fn hash_block(&self) -> usize {
        match self {
            PointScheme::Ketama => 1,
            PointScheme::KetamaWeighted => 4,
        }
    }
}

/// A node as seen by the continuum builder.
#[derive(Debug, Clone, Copy)]
pub struct Member<'a> {
    pub host: &'a str,
    pub port: u16,
    pub weight: u32,
    /// When set and still in the future, the node is excluded from the ring.
    pub retry_at: Option<Instant>,
}

impl<'a> Member<'a> {
    pub fn new(host: &'a str, port: u16, weight: u32) -> Self {
        Member {
            host,
            port,
            weight,
            retry_at: None,
        }
    }

    fn is_live(&self, now: Instant) -> bool {
        self.retry_at.is_none_or(|at| at <= now)
    }

    /// Canonical identity string for point `index`: `host-i` on the default
    /// port, `host:port-i` otherwise.
    fn point_key(&self, index: usize) -> String {
        if self.port == DEFAULT_PORT {
            format!("{}-{index}", self.host)
        } else {
            format!("{}:{}-{index}", self.host, self.port)
        }
    }
}

/// Which members are live at `now`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Liveness {
    /// Indices of live members, in member order.
    pub live: Vec<usize>,
    /// Earliest future `retry_at`; the live set changes then.
    pub next_change: Option<Instant>,
}

impl Liveness {
    pub fn of(members: &[Member<'_>], now: Instant) -> Self {
        Liveness {
            live: members
                .iter()
                .enumerate()
                .filter(|(_, m)| m.is_live(now))
                .map(|(i, _)| i)
                .collect(),
            next_change: members
                .iter()
                .filter_map(|m| m.retry_at.filter(|&at| at > now))
                .min(),
        }
    }
}

/// Immutable, sorted table of `(hash, node_index)` points.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Continuum {
    points: Box<[(u32, u32)]>,
    live: Box<[usize]>,
    next_rebuild: Option<Instant>,
}

impl Continuum {
    /// Continuum with no points; every lookup misses.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Build the continuum for `members` as of `now`.
    ///
    /// Members whose `retry_at` lies in the future are left out, and the
    /// earliest such instant becomes [`next_rebuild`](Self::next_rebuild).
    /// `hash` generates points for [`PointScheme::Ketama`]; the weighted
    /// scheme always uses MD5.
    pub fn build(
        members: &[Member<'_>],
        scheme: PointScheme,
        hash: HashAlgorithm,
        now: Instant,
    ) -> Self {
        let Liveness {
            live,
            next_change: next_rebuild,
        } = Liveness::of(members, now);

        if live.is_empty() {
            return Continuum {
                points: Box::new([]),
                live: Box::new([]),
                next_rebuild,
            };
        }

        let total_weight: u64 = live
            .iter()
            .map(|&i| u64::from(members[i].weight.max(1)))
            .sum();
        let mut points = Vec::new();

        for &index in &live {
            let member = &members[index];
            match scheme {
                PointScheme::Ketama => {
                    for i in 0..POINTS_PER_SERVER {
                        let hash = hash.digest(member.point_key(i).as_bytes());
                        points.push((hash, index as u32));
                    }
                }
                PointScheme::KetamaWeighted => {
                    let count = weighted_points(member.weight.max(1), total_weight, live.len());
                    for i in 0..count / scheme.hash_block() {
                        let digest = md5::md5(member.point_key(i).as_bytes());
                        for part in digest.chunks_exact(4) {
                            let hash = u32::from_le_bytes([part[0], part[1], part[2], part[3]]);
                            points.push((hash, index as u32));
                        }
                    }
                }
            }
        }

        // Stable: equal hashes keep insertion order, never node order.
        points.sort_by_key(|&(hash, _)| hash);

        Continuum {
            points: points.into_boxed_slice(),
            live: live.into_boxed_slice(),
            next_rebuild,
        }
    }

    /// Node index owning `hash`: the first point at or after it, wrapping to
    /// the start of the ring. `None` when the continuum is empty.
    #[inline]
    pub fn route(&self, hash: u32) -> Option<usize> {
        if self.points.is_empty() {
            return None;
        }
        let idx = self.points.partition_point(|&(point, _)| point < hash);
        let idx = if idx == self.points.len() { 0 } else { idx };
        Some(self.points[idx].1 as usize)
    }

    /// Indices of the nodes that were live when this continuum was built,
    /// ascending.
    pub fn live_nodes(&self) -> &[usize] {
        &self.live
    }

    pub fn live_count(&self) -> usize {
        self.live.len()
    }

    /// Total number of points on the ring.
    pub fn point_count(&self) -> usize {
        self.points.len()
    }

    pub fn points(&self) -> &[(u32, u32)] {
        &self.points
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Earliest instant at which an excluded node becomes eligible again.
    pub fn next_rebuild(&self) -> Option<Instant> {
        self.next_rebuild
    }

    /// True once `now` has reached [`next_rebuild`](Self::next_rebuild).
    pub fn is_stale(&self, now: Instant) -> bool {
        self.next_rebuild.is_some_and(|at| at <= now)
    }
}

/// Ring points for one node under the weighted scheme, a multiple of four.
///
/// Single precision keeps the counts identical to libmemcached's.
fn weighted_points(weight: u32, total_weight: u64, live_count: usize) -> usize {
    let pct = weight as f32 / total_weight as f32;
    let groups = (pct * POINTS_PER_SERVER_KETAMA as f32 / 4.0 * live_count as f32
        + 0.000_000_000_1)
        .floor();
    groups as usize * 4
}
