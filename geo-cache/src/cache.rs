//! The region-local cache facade.

use std::borrow::Borrow;
use std::fmt::Debug;
use std::hash::Hash;
use std::net::SocketAddr;
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex};
use std::time::Instant;

use anyhow::{Context, Result};
use futures_util::future::join_all;
use serde::{Serialize, de::DeserializeOwned};
use tokio::{
    sync::{mpsc, watch},
    task::JoinHandle,
};
use tracing::{debug, error, info};

use crate::config::CacheConfig;
use crate::message::Message;
use crate::replication::{
    consumer::UpdateConsumer, listener::ReplicationListener, sender::ReplicationSender,
    shutdown_signal,
};
use crate::state::{self, CacheState};

/// Keys the cache can store and replicate.
pub trait CacheKey:
    Clone + Eq + Hash + Debug + Serialize + DeserializeOwned + Send + Sync + 'static
{
}

impl<T> CacheKey for T where
    T: Clone + Eq + Hash + Debug + Serialize + DeserializeOwned + Send + Sync + 'static
{
}

/// Values the cache can store and replicate.
pub trait CacheValue: Clone + Debug + Serialize + DeserializeOwned + Send + Sync + 'static {}

impl<T> CacheValue for T where
    T: Clone + Debug + Serialize + DeserializeOwned + Send + Sync + 'static
{
}

/// One region's cache instance.
///
/// Reads and writes are served from local memory. Every local write is
/// stamped with the next version for its key and pushed to all peers in the
/// background; writes arriving from peers are applied only when their
/// version is newer than the local one.
///
/// # Locking
///
/// A single mutex guards the store and the version table together. Reads,
/// local writes and the consumer's apply step each hold it for a short,
/// synchronous critical section. Network I/O and JSON encoding happen
/// outside of it. Finer-grained locking would let a key's version and value
/// drift apart, and caches here are small.
///
/// # Lifecycle
///
/// [`DistributedCache::start`] binds the listener and spawns the background
/// workers; [`DistributedCache::shutdown`] stops them and releases the
/// port. Dropping the cache without calling `shutdown` also stops the
/// workers, just without waiting for them.
pub struct DistributedCache<K, V> {
    state: Arc<Mutex<CacheState<K, V>>>,
    sender: ReplicationSender,
    region: String,
    local_addr: SocketAddr,
    shutdown_tx: watch::Sender<bool>,
    workers: Vec<JoinHandle<()>>,
}

impl<K, V> DistributedCache<K, V>
where
    K: CacheKey,
    V: CacheValue,
{
    /// Validates `config`, binds the replication listener and starts the
    /// listener, consumer and per-peer sender workers.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid or the listen
    /// address cannot be bound.
    pub async fn start(config: CacheConfig) -> Result<Self> {
        config.validate()?;
        let capacity =
            NonZeroUsize::new(config.capacity).context("capacity must be at least 1")?;

        let state = Arc::new(Mutex::new(CacheState::new(capacity, config.ttl)));
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        let listener =
            ReplicationListener::bind(config.listen, inbound_tx, config.read_timeout).await?;
        let local_addr = listener
            .local_addr()
            .context("failed to read replication listener address")?;

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let mut workers = vec![
            tokio::spawn(listener.run_until(shutdown_signal(shutdown_rx.clone()))),
            tokio::spawn(
                UpdateConsumer::new(Arc::clone(&state), inbound_rx)
                    .run_until(shutdown_signal(shutdown_rx.clone())),
            ),
        ];
        let (sender, dispatchers) = ReplicationSender::spawn(&config, &shutdown_rx);
        workers.extend(dispatchers);

        info!(
            region = %config.region,
            listen = %local_addr,
            peers = ?config.peers,
            capacity = config.capacity,
            ttl = ?config.ttl,
            "distributed cache started"
        );

        Ok(Self {
            state,
            sender,
            region: config.region,
            local_addr,
            shutdown_tx,
            workers,
        })
    }

    /// Returns the live value for `key`.
    ///
    /// Missing, evicted and expired keys all read as `None`. Reading never
    /// changes which entry is evicted next.
    pub fn get<Q>(&self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        state::lock(&self.state).read(key, Instant::now())
    }

    /// Stores `value` locally and queues it for every peer.
    ///
    /// The local write is complete when this returns. Replication happens in
    /// the background and its outcome never reaches the caller.
    pub fn set(&self, key: K, value: V) {
        let version =
            state::lock(&self.state).write_local(key.clone(), value.clone(), Instant::now());
        debug!(key = ?key, version, "stored local write");

        if self.sender.is_empty() {
            return;
        }
        let message = Message::set(key, value, version, self.region.as_str());
        match message.encode() {
            Ok(payload) => self.sender.replicate(payload),
            Err(err) => error!(key = ?message.key, error = ?err, "failed to encode write for replication"),
        }
    }

    /// Highest version recorded for `key`, including evicted keys.
    pub fn version<Q>(&self, key: &Q) -> Option<u64>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        state::lock(&self.state).version(key)
    }

    /// Number of live entries.
    pub fn len(&self) -> usize {
        state::lock(&self.state).len(Instant::now())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Live entries with their versions, oldest write first.
    pub fn snapshot(&self) -> Vec<(K, V, u64)> {
        state::lock(&self.state).snapshot(Instant::now())
    }

    pub fn region(&self) -> &str {
        &self.region
    }

    /// Address the replication listener is bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn peers(&self) -> Vec<SocketAddr> {
        self.sender.peers().collect()
    }

    /// Stops every background worker and waits for them to finish.
    ///
    /// The listening socket is closed, writes already queued from peers are
    /// applied, and deliveries still retrying are abandoned.
    pub async fn shutdown(mut self) {
        self.shutdown_tx.send_replace(true);
        let workers = std::mem::take(&mut self.workers);
        for result in join_all(workers).await {
            if let Err(err) = result {
                error!(error = ?err, "cache worker ended abnormally");
            }
        }
        info!(region = %self.region, "distributed cache stopped");
    }
}
