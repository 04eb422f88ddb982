//! Network replication between regions.
//!
//! - [`listener`] accepts one message per inbound connection and queues it.
//! - [`consumer`] drains that queue and applies newer writes to local state.
//! - [`sender`] pushes local writes to every peer with bounded retries.
//!
//! Every worker watches the same shutdown channel. It flips to `true` on
//! [`crate::DistributedCache::shutdown`], and its sender is dropped with the
//! cache, so either event stops the workers.

pub mod consumer;
pub mod listener;
pub mod sender;

use tokio::sync::watch;

/// Resolves once shutdown is requested or the cache has been dropped.
pub(crate) async fn stopped(shutdown: &mut watch::Receiver<bool>) {
    let _ = shutdown.wait_for(|stop| *stop).await;
}

pub(crate) async fn shutdown_signal(mut shutdown: watch::Receiver<bool>) {
    stopped(&mut shutdown).await;
}
