//! Instance configuration.
//!
//! Everything an instance needs is supplied up front: its capacity, where to
//! listen, the static list of peers, its region name and an optional TTL.

use std::net::{Ipv4Addr, SocketAddr};
use std::time::Duration;

use anyhow::{Result, ensure};

/// Delivery attempts per peer before a write is dropped for that peer.
pub const DEFAULT_RETRY_ATTEMPTS: u32 = 9;

/// Fixed pause between delivery attempts.
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(5);

/// Writes buffered per peer before new ones are dropped.
pub const DEFAULT_PEER_QUEUE_DEPTH: usize = 1024;

/// Deliveries a single peer may have outstanding at once.
pub const DEFAULT_MAX_IN_FLIGHT: usize = 4;

/// How long the listener waits for a connected peer to finish its payload.
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(10);

/// Returns the loopback address for `port`.
pub fn localhost(port: u16) -> SocketAddr {
    SocketAddr::from((Ipv4Addr::LOCALHOST, port))
}

/// Retry schedule for delivering one write to one peer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_RETRY_ATTEMPTS,
            delay: DEFAULT_RETRY_DELAY,
        }
    }
}

/// Configuration for starting a [`crate::DistributedCache`].
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Maximum number of entries held locally (must be at least 1)
    pub capacity: usize,
    /// Address the replication listener binds to
    pub listen: SocketAddr,
    /// Sibling instances every local write is replicated to
    pub peers: Vec<SocketAddr>,
    /// Name stamped on outgoing writes
    pub region: String,
    /// Lifetime of an entry after its last write; `None` disables expiry
    pub ttl: Option<Duration>,
    pub retry: RetryPolicy,
    pub peer_queue_depth: usize,
    pub max_in_flight: usize,
    pub read_timeout: Duration,
}

impl CacheConfig {
    pub fn new(capacity: usize, listen: SocketAddr, region: impl Into<String>) -> Self {
        Self {
            capacity,
            listen,
            peers: Vec::new(),
            region: region.into(),
            ttl: None,
            retry: RetryPolicy::default(),
            peer_queue_depth: DEFAULT_PEER_QUEUE_DEPTH,
            max_in_flight: DEFAULT_MAX_IN_FLIGHT,
            read_timeout: DEFAULT_READ_TIMEOUT,
        }
    }

    pub fn with_peers(mut self, peers: impl IntoIterator<Item = SocketAddr>) -> Self {
        self.peers = peers.into_iter().collect();
        self
    }

    /// Replicates to instances listening on `ports` of this host.
    pub fn with_peer_ports(self, ports: &[u16]) -> Self {
        self.with_peers(ports.iter().copied().map(localhost))
    }

    /// Expires entries `ttl` after their last write. A zero `ttl` disables
    /// expiry.
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = (!ttl.is_zero()).then_some(ttl);
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_peer_queue_depth(mut self, depth: usize) -> Self {
        self.peer_queue_depth = depth;
        self
    }

    pub fn with_max_in_flight(mut self, max_in_flight: usize) -> Self {
        self.max_in_flight = max_in_flight;
        self
    }

    pub fn with_read_timeout(mut self, read_timeout: Duration) -> Self {
        self.read_timeout = read_timeout;
        self
    }

    /// Rejects configurations the cache cannot run with.
    pub fn validate(&self) -> Result<()> {
        ensure!(self.capacity >= 1, "capacity must be at least 1");
        ensure!(!self.region.trim().is_empty(), "region must not be empty");
        ensure!(
            self.retry.max_attempts >= 1,
            "retry policy needs at least one attempt"
        );
        ensure!(
            self.peer_queue_depth >= 1,
            "peer queue depth must be at least 1"
        );
        ensure!(
            self.max_in_flight >= 1,
            "max in-flight deliveries must be at least 1"
        );
        ensure!(
            !self.ttl.is_some_and(|ttl| ttl.is_zero()),
            "ttl must be greater than zero; leave it unset to disable expiry"
        );
        ensure!(
            !self.read_timeout.is_zero(),
            "read timeout must be greater than zero"
        );
        // Port 0 binds an ephemeral port, so it can never collide with a peer.
        ensure!(
            self.listen.port() == 0 || !self.peers.contains(&self.listen),
            "peer list contains this instance's own listen address {}",
            self.listen
        );
        Ok(())
    }
}
