//! Region-local key-value cache with asynchronous peer replication.
//!
//! Each instance serves reads and writes from its own memory, so a region
//! never waits on another. Writes are pushed to sibling instances over TCP
//! in the background and every region converges on the newest version of
//! each key.
//!
//! # Architecture
//!
//! - **Store**: bounded map with write-order eviction and optional expiry
//! - **Version table**: per-key counters that order writes across regions
//! - **Listener task**: accepts one JSON message per inbound connection
//! - **Consumer task**: applies queued remote writes whose version is newer
//! - **Sender tasks**: one dispatcher per peer, delivering with retries
//!
//! The store and version table sit behind one mutex owned by
//! [`DistributedCache`]; all network work happens outside that lock.
//!
//! # Consistency
//!
//! Convergence is best effort. A write is delivered to each peer at most
//! once per attempt, attempts are bounded, and there is no backfill for a
//! peer that was down too long. Two regions writing the same key at the same
//! version concurrently is not resolved: whichever write a region applies
//! last wins there.
//!
//! # Modules
//!
//! - [`cache`]: the [`DistributedCache`] facade
//! - [`config`]: [`CacheConfig`] and [`RetryPolicy`]
//! - [`store`]: bounded, expiring storage
//! - [`version`]: per-key version counters
//! - [`message`]: JSON wire format
//! - [`replication`]: listener, consumer and sender workers
//! - [`console`]: line commands for the node binary
//! - [`cli`]: command-line arguments for the node binary

pub mod cache;
pub mod cli;
pub mod config;
pub mod console;
pub mod message;
pub mod replication;
pub mod state;
pub mod store;
pub mod version;

pub use cache::{CacheKey, CacheValue, DistributedCache};
pub use config::{CacheConfig, RetryPolicy};
pub use message::Message;
