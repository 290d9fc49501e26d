//! memring client metrics.
//!
//! Process-wide counters covering every client handle. Exposed through any
//! metriken exporter the application registers.

use metriken::{Counter, Gauge, metric};

// ── Connections ──────────────────────────────────────────────────

#[metric(
    name = "memring/connections/opened",
    description = "Connections established to cache servers"
)]
pub static CONNECTIONS_OPENED: Counter = Counter::new();

#[metric(
    name = "memring/connections/failed",
    description = "Connection attempts that failed"
)]
pub static CONNECT_FAILURES: Counter = Counter::new();

#[metric(
    name = "memring/connections/closed",
    description = "Connections closed after an error or on shutdown"
)]
pub static CONNECTIONS_CLOSED: Counter = Counter::new();

#[metric(
    name = "memring/connections/active",
    description = "Currently open connections"
)]
pub static CONNECTIONS_ACTIVE: Gauge = Gauge::new();

#[metric(
    name = "memring/servers/ejected",
    description = "Times a server entered its retry backoff"
)]
pub static SERVERS_EJECTED: Counter = Counter::new();

#[metric(
    name = "memring/continuum/rebuilds",
    description = "Continuum rebuilds"
)]
pub static CONTINUUM_REBUILDS: Counter = Counter::new();

// ── Bytes ────────────────────────────────────────────────────────

#[metric(name = "memring/bytes/sent", description = "Total bytes sent")]
pub static BYTES_SENT: Counter = Counter::new();

#[metric(name = "memring/bytes/received", description = "Total bytes received")]
pub static BYTES_RECEIVED: Counter = Counter::new();

// ── Requests ─────────────────────────────────────────────────────

#[metric(name = "memring/requests", description = "Commands issued")]
pub static REQUESTS: Counter = Counter::new();

#[metric(name = "memring/get/hit", description = "Keys found by get")]
pub static GET_HITS: Counter = Counter::new();

#[metric(name = "memring/get/miss", description = "Keys missed by get")]
pub static GET_MISSES: Counter = Counter::new();

#[metric(
    name = "memring/purges",
    description = "Drains forced by the message or byte watermark"
)]
pub static PURGES: Counter = Counter::new();

#[metric(
    name = "memring/buffered/dropped",
    description = "Buffered results discarded before flush_buffers collected them"
)]
pub static BUFFERED_RESULTS_DROPPED: Counter = Counter::new();
