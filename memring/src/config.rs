use std::time::Duration;

use ketama::HashAlgorithm;

use crate::error::{Error, Result};

/// How keys are mapped to servers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Distribution {
    /// `hash(key) % live_servers`.
    #[default]
    Modulo,
    /// Ketama continuum, 100 points per server.
    Consistent,
    /// Ketama continuum with points proportional to server weight.
    ConsistentWeighted,
    /// Uniform random server; for load spreading only.
    Random,
}

impl Distribution {
    pub(crate) fn point_scheme(&self) -> Option<ketama::PointScheme> {
        match self {
            Distribution::Consistent => Some(ketama::PointScheme::Ketama),
            Distribution::ConsistentWeighted => Some(ketama::PointScheme::KetamaWeighted),
            Distribution::Modulo | Distribution::Random => None,
        }
    }
}

/// Client configuration.
///
/// Defaults match libmemcached's, so a fleet mixing both clients agrees on
/// key ownership as long as the distribution settings match.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Key distribution policy.
    pub distribution: Distribution,
    /// Hash used to place a key on the ring (or pick the modulo slot).
    pub hash: HashAlgorithm,
    /// Hash used to generate unweighted continuum points.
    pub continuum_hash: HashAlgorithm,
    /// Extra copies written after the primary. Zero disables replication.
    pub replicas: usize,
    /// Start replicated reads at a random replica instead of the primary.
    pub randomize_replica_read: bool,
    /// Queue writes and return [`Outcome::Buffered`](crate::Outcome::Buffered)
    /// until [`flush_buffers`](crate::Client::flush_buffers) or a read.
    pub buffer_requests: bool,
    /// Send writes with `noreply` (text) or quiet opcodes (binary).
    pub no_reply: bool,
    /// Use the binary protocol.
    pub binary_protocol: bool,
    /// Also reject whitespace and control bytes in binary-protocol keys.
    /// Text-protocol keys are always checked.
    pub verify_key: bool,
    /// Leave failing servers out of the continuum during their retry window.
    pub auto_eject_hosts: bool,
    /// Prepended to every key on the wire.
    pub key_prefix: Vec<u8>,
    /// Include the prefix when hashing keys for routing.
    pub hash_with_prefix_key: bool,
    /// Bound on the TCP handshake.
    pub connect_timeout: Duration,
    /// Bound on every poll wait.
    pub poll_timeout: Duration,
    /// Poll bound while flushing. Falls back to `poll_timeout`.
    pub send_timeout: Option<Duration>,
    /// Poll bound while reading. Falls back to `poll_timeout`.
    pub recv_timeout: Option<Duration>,
    /// How long a failed server is left alone before the next attempt.
    pub retry_timeout: Duration,
    /// Consecutive failures tolerated before a server enters backoff.
    pub server_failure_limit: u32,
    /// Pending responses on one connection that force a drain.
    pub io_msg_watermark: usize,
    /// Bytes written since the last drain that force a drain.
    pub io_bytes_watermark: usize,
    /// Buffered results held per server until `flush_buffers` collects
    /// them. Past this, the oldest are discarded.
    pub buffered_result_limit: usize,
    /// Per-connection read buffer capacity.
    pub read_buffer_size: usize,
    /// Per-connection write buffer capacity.
    pub write_buffer_size: usize,
    pub tcp_nodelay: bool,
    pub tcp_keepalive: bool,
    /// Wrap multi-part writes in `TCP_CORK` (Linux only).
    pub tcp_cork: bool,
    /// `SO_SNDBUF`; `None` keeps the kernel default.
    pub socket_send_size: Option<usize>,
    /// `SO_RCVBUF`; `None` keeps the kernel default.
    pub socket_recv_size: Option<usize>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            distribution: Distribution::Modulo,
            hash: HashAlgorithm::Default,
            continuum_hash: HashAlgorithm::Md5,
            replicas: 0,
            randomize_replica_read: false,
            buffer_requests: false,
            no_reply: false,
            binary_protocol: false,
            verify_key: false,
            auto_eject_hosts: false,
            key_prefix: Vec::new(),
            hash_with_prefix_key: false,
            connect_timeout: Duration::from_millis(4000),
            poll_timeout: Duration::from_millis(5000),
            send_timeout: None,
            recv_timeout: None,
            retry_timeout: Duration::from_secs(2),
            server_failure_limit: 2,
            io_msg_watermark: 500,
            io_bytes_watermark: 65 * 1024,
            buffered_result_limit: 4096,
            read_buffer_size: 8192,
            write_buffer_size: 8192,
            tcp_nodelay: false,
            tcp_keepalive: false,
            tcp_cork: false,
            socket_send_size: None,
            socket_recv_size: None,
        }
    }
}

/// Longest accepted key prefix.
pub const MAX_PREFIX_LEN: usize = 128;

/// Smallest buffer capacity; a reply line must fit in the read buffer.
pub const MIN_BUFFER_SIZE: usize = 512;

impl Config {
    /// Validate configuration values. Returns an error if any value is out of range.
    pub fn validate(&self) -> Result<()> {
        if self.key_prefix.len() > MAX_PREFIX_LEN {
            return Err(Error::InvalidConfig(format!(
                "key_prefix must be at most {MAX_PREFIX_LEN} bytes"
            )));
        }
        if self.key_prefix.iter().any(|b| !b.is_ascii_graphic()) {
            return Err(Error::InvalidConfig(
                "key_prefix must not contain whitespace or control bytes".into(),
            ));
        }
        if self.read_buffer_size < MIN_BUFFER_SIZE || self.write_buffer_size < MIN_BUFFER_SIZE {
            return Err(Error::InvalidConfig(format!(
                "buffer sizes must be at least {MIN_BUFFER_SIZE} bytes"
            )));
        }
        if self.io_msg_watermark == 0 || self.io_bytes_watermark == 0 {
            return Err(Error::InvalidConfig("watermarks must be > 0".into()));
        }
        if self.buffered_result_limit == 0 {
            return Err(Error::InvalidConfig("buffered_result_limit must be > 0".into()));
        }
        if self.poll_timeout.is_zero() || self.connect_timeout.is_zero() {
            return Err(Error::InvalidConfig(
                "poll_timeout and connect_timeout must be > 0".into(),
            ));
        }
        if self.buffer_requests && self.no_reply {
            return Err(Error::InvalidConfig(
                "buffer_requests and no_reply are mutually exclusive".into(),
            ));
        }
        Ok(())
    }

    pub(crate) fn send_wait(&self) -> Duration {
        self.send_timeout.unwrap_or(self.poll_timeout)
    }

    pub(crate) fn recv_wait(&self) -> Duration {
        self.recv_timeout.unwrap_or(self.poll_timeout)
    }

    /// Longest key (prefix included) the selected protocol accepts.
    pub(crate) fn max_key_len(&self) -> usize {
        if self.binary_protocol {
            protocol_memcache::MAX_BINARY_KEY_LEN
        } else {
            protocol_memcache::MAX_TEXT_KEY_LEN
        }
    }
}

/// A tunable exposed through [`Client::set_behavior`](crate::Client::set_behavior).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Behavior {
    Distribution,
    Hash,
    ContinuumHash,
    Replicas,
    RandomizeReplicaRead,
    BufferRequests,
    NoReply,
    BinaryProtocol,
    VerifyKey,
    AutoEjectHosts,
    HashWithPrefixKey,
    ConnectTimeout,
    PollTimeout,
    SendTimeout,
    RecvTimeout,
    RetryTimeout,
    ServerFailureLimit,
    IoMsgWatermark,
    IoBytesWatermark,
    TcpNodelay,
    TcpKeepalive,
    TcpCork,
    SocketSendSize,
    SocketRecvSize,
}

impl Behavior {
    /// Whether changing this behavior alters key ownership.
    pub(crate) fn affects_routing(&self) -> bool {
        matches!(
            self,
            Behavior::Distribution
                | Behavior::Hash
                | Behavior::ContinuumHash
                | Behavior::AutoEjectHosts
        )
    }

    /// Whether open connections take the change in place.
    pub(crate) fn affects_io_waits(&self) -> bool {
        matches!(
            self,
            Behavior::PollTimeout
                | Behavior::SendTimeout
                | Behavior::RecvTimeout
                | Behavior::TcpCork
        )
    }

    /// Whether open connections must be re-established for the change to apply.
    pub(crate) fn affects_connections(&self) -> bool {
        matches!(
            self,
            Behavior::BinaryProtocol
                | Behavior::TcpNodelay
                | Behavior::TcpKeepalive
                | Behavior::SocketSendSize
                | Behavior::SocketRecvSize
        )
    }
}

/// Value of a [`Behavior`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BehaviorValue {
    Bool(bool),
    Number(u64),
    Duration(Duration),
    /// For timeouts and sizes that fall back to a default.
    OptionalDuration(Option<Duration>),
    OptionalSize(Option<usize>),
    Distribution(Distribution),
    Hash(HashAlgorithm),
}

impl Config {
    /// Read a behavior.
    pub fn behavior(&self, behavior: Behavior) -> BehaviorValue {
        use BehaviorValue as V;
        match behavior {
            Behavior::Distribution => V::Distribution(self.distribution),
            Behavior::Hash => V::Hash(self.hash),
            Behavior::ContinuumHash => V::Hash(self.continuum_hash),
            Behavior::Replicas => V::Number(self.replicas as u64),
            Behavior::RandomizeReplicaRead => V::Bool(self.randomize_replica_read),
            Behavior::BufferRequests => V::Bool(self.buffer_requests),
            Behavior::NoReply => V::Bool(self.no_reply),
            Behavior::BinaryProtocol => V::Bool(self.binary_protocol),
            Behavior::VerifyKey => V::Bool(self.verify_key),
            Behavior::AutoEjectHosts => V::Bool(self.auto_eject_hosts),
            Behavior::HashWithPrefixKey => V::Bool(self.hash_with_prefix_key),
            Behavior::ConnectTimeout => V::Duration(self.connect_timeout),
            Behavior::PollTimeout => V::Duration(self.poll_timeout),
            Behavior::SendTimeout => V::OptionalDuration(self.send_timeout),
            Behavior::RecvTimeout => V::OptionalDuration(self.recv_timeout),
            Behavior::RetryTimeout => V::Duration(self.retry_timeout),
            Behavior::ServerFailureLimit => V::Number(u64::from(self.server_failure_limit)),
            Behavior::IoMsgWatermark => V::Number(self.io_msg_watermark as u64),
            Behavior::IoBytesWatermark => V::Number(self.io_bytes_watermark as u64),
            Behavior::TcpNodelay => V::Bool(self.tcp_nodelay),
            Behavior::TcpKeepalive => V::Bool(self.tcp_keepalive),
            Behavior::TcpCork => V::Bool(self.tcp_cork),
            Behavior::SocketSendSize => V::OptionalSize(self.socket_send_size),
            Behavior::SocketRecvSize => V::OptionalSize(self.socket_recv_size),
        }
    }

    /// Write a behavior, validating the result. On error the config is
    /// left unchanged.
    pub fn set_behavior(&mut self, behavior: Behavior, value: BehaviorValue) -> Result<()> {
        use BehaviorValue as V;
        let mut next = self.clone();
        match (behavior, value) {
            (Behavior::Distribution, V::Distribution(d)) => next.distribution = d,
            (Behavior::Hash, V::Hash(h)) => next.hash = h,
            (Behavior::ContinuumHash, V::Hash(h)) => next.continuum_hash = h,
            (Behavior::Replicas, V::Number(n)) => next.replicas = to_usize(n)?,
            (Behavior::RandomizeReplicaRead, V::Bool(b)) => next.randomize_replica_read = b,
            (Behavior::BufferRequests, V::Bool(b)) => next.buffer_requests = b,
            (Behavior::NoReply, V::Bool(b)) => next.no_reply = b,
            (Behavior::BinaryProtocol, V::Bool(b)) => next.binary_protocol = b,
            (Behavior::VerifyKey, V::Bool(b)) => next.verify_key = b,
            (Behavior::AutoEjectHosts, V::Bool(b)) => next.auto_eject_hosts = b,
            (Behavior::HashWithPrefixKey, V::Bool(b)) => next.hash_with_prefix_key = b,
            (Behavior::ConnectTimeout, V::Duration(d)) => next.connect_timeout = d,
            (Behavior::PollTimeout, V::Duration(d)) => next.poll_timeout = d,
            (Behavior::SendTimeout, V::OptionalDuration(d)) => next.send_timeout = d,
            (Behavior::RecvTimeout, V::OptionalDuration(d)) => next.recv_timeout = d,
            (Behavior::RetryTimeout, V::Duration(d)) => next.retry_timeout = d,
            (Behavior::ServerFailureLimit, V::Number(n)) => {
                next.server_failure_limit = u32::try_from(n)
                    .map_err(|_| Error::InvalidConfig("server_failure_limit too large".into()))?
            }
            (Behavior::IoMsgWatermark, V::Number(n)) => next.io_msg_watermark = to_usize(n)?,
            (Behavior::IoBytesWatermark, V::Number(n)) => next.io_bytes_watermark = to_usize(n)?,
            (Behavior::TcpNodelay, V::Bool(b)) => next.tcp_nodelay = b,
            (Behavior::TcpKeepalive, V::Bool(b)) => next.tcp_keepalive = b,
            (Behavior::TcpCork, V::Bool(b)) => next.tcp_cork = b,
            (Behavior::SocketSendSize, V::OptionalSize(n)) => next.socket_send_size = n,
            (Behavior::SocketRecvSize, V::OptionalSize(n)) => next.socket_recv_size = n,
            (behavior, value) => {
                return Err(Error::InvalidConfig(format!(
                    "{value:?} is not a valid value for {behavior:?}"
                )));
            }
        }
        next.validate()?;
        *self = next;
        Ok(())
    }
}

fn to_usize(n: u64) -> Result<usize> {
    usize::try_from(n).map_err(|_| Error::InvalidConfig(format!("{n} out of range")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_valid() {
        Config::default().validate().unwrap();
    }

    #[test]
    fn validate_rejects() {
        let mut config = Config {
            key_prefix: vec![b'p'; MAX_PREFIX_LEN + 1],
            ..Config::default()
        };
        assert!(config.validate().is_err());

        config.key_prefix = b"has space".to_vec();
        assert!(config.validate().is_err());

        config.key_prefix = b"ns:".to_vec();
        config.validate().unwrap();

        config.read_buffer_size = 16;
        assert!(config.validate().is_err());
        config.read_buffer_size = 8192;

        config.buffer_requests = true;
        config.no_reply = true;
        assert!(config.validate().is_err());
    }

    #[test]
    fn behavior_round_trip() {
        let mut config = Config::default();
        config
            .set_behavior(
                Behavior::Distribution,
                BehaviorValue::Distribution(Distribution::ConsistentWeighted),
            )
            .unwrap();
        config
            .set_behavior(Behavior::Replicas, BehaviorValue::Number(2))
            .unwrap();
        config
            .set_behavior(
                Behavior::RetryTimeout,
                BehaviorValue::Duration(Duration::from_millis(250)),
            )
            .unwrap();

        assert_eq!(config.distribution, Distribution::ConsistentWeighted);
        assert_eq!(
            config.behavior(Behavior::Replicas),
            BehaviorValue::Number(2)
        );
        assert_eq!(
            config.behavior(Behavior::RetryTimeout),
            BehaviorValue::Duration(Duration::from_millis(250))
        );
    }

    #[test]
    fn behavior_type_mismatch_leaves_config_unchanged() {
        let mut config = Config::default();
        let err = config
            .set_behavior(Behavior::NoReply, BehaviorValue::Number(1))
            .unwrap_err();
        assert!(matches!(err, Error::InvalidConfig(_)));
        assert_eq!(config, Config::default());
    }

    #[test]
    fn behavior_validation_applies() {
        let mut config = Config::default();
        config
            .set_behavior(Behavior::BufferRequests, BehaviorValue::Bool(true))
            .unwrap();
        assert!(
            config
                .set_behavior(Behavior::NoReply, BehaviorValue::Bool(true))
                .is_err()
        );
        assert!(!config.no_reply);
    }

    #[test]
    fn key_limits_follow_protocol() {
        let mut config = Config::default();
        assert_eq!(config.max_key_len(), 250);
        config.binary_protocol = true;
        assert_eq!(config.max_key_len(), 65535);
    }
}
