//! The store and version table, guarded as one unit.
//!
//! Local writes and applied remote writes must bump the version and mutate
//! the store together, so both live behind the same mutex. The lock is a
//! `std::sync::Mutex`: every critical section is short and synchronous, and
//! none of them is held across an `.await`.

use std::borrow::Borrow;
use std::fmt::Debug;
use std::hash::Hash;
use std::num::NonZeroUsize;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use tracing::debug;

use crate::message::Message;
use crate::store::Store;
use crate::version::VersionTable;

/// Result of offering a remote write to the local state.
#[derive(Debug, PartialEq, Eq)]
pub enum ApplyOutcome<K> {
    /// The write was newer and is now stored; `evicted` names the entry it
    /// displaced, if any.
    Applied { evicted: Option<K> },
    /// The write was not newer than `current` and was dropped.
    Stale { current: u64 },
}

pub struct CacheState<K, V> {
    store: Store<K, V>,
    versions: VersionTable<K>,
    ttl: Option<Duration>,
}

impl<K, V> CacheState<K, V>
where
    K: Clone + Eq + Hash + Debug,
    V: Clone,
{
    pub fn new(capacity: NonZeroUsize, ttl: Option<Duration>) -> Self {
        Self {
            store: Store::new(capacity),
            versions: VersionTable::new(),
            ttl,
        }
    }

    /// Reads a live value; expired entries are swept first.
    pub fn read<Q>(&mut self, key: &Q, now: Instant) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.sweep(now);
        self.store.get(key).cloned()
    }

    /// Stores a local write and returns the version it was stamped with.
    pub fn write_local(&mut self, key: K, value: V, now: Instant) -> u64 {
        self.sweep(now);
        if let Some(evicted) = self.store.set(key.clone(), value, self.ttl, now) {
            debug!(key = ?evicted, "evicted oldest entry");
        }
        self.versions.next(key)
    }

    /// Applies a peer's write if its version is newer than ours.
    ///
    /// A stale write leaves both the value and its expiry untouched. The
    /// version is recorded only after the value is stored.
    pub fn apply_remote(&mut self, message: Message<K, V>, now: Instant) -> ApplyOutcome<K> {
        if let Some(current) = self.versions.current(&message.key) {
            if message.version <= current {
                return ApplyOutcome::Stale { current };
            }
        }

        self.sweep(now);
        let key = message.key.clone();
        let evicted = self.store.set(message.key, message.value, self.ttl, now);
        self.versions.accept(key, message.version);
        ApplyOutcome::Applied { evicted }
    }

    pub fn version<Q>(&self, key: &Q) -> Option<u64>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.versions.current(key)
    }

    pub fn len(&mut self, now: Instant) -> usize {
        self.sweep(now);
        self.store.len()
    }

    /// Live entries with their versions, oldest write first.
    pub fn snapshot(&mut self, now: Instant) -> Vec<(K, V, u64)> {
        self.sweep(now);
        self.store
            .iter()
            .map(|(key, entry)| {
                let version = self.versions.current(key).unwrap_or_default();
                (key.clone(), entry.value.clone(), version)
            })
            .collect()
    }

    fn sweep(&mut self, now: Instant) {
        if self.ttl.is_none() || self.store.is_empty() {
            return;
        }
        let removed = self.store.sweep_expired(now);
        if removed > 0 {
            debug!(removed, "swept expired entries");
        }
    }
}

/// Locks the shared state, recovering it if a previous holder panicked.
///
/// The state is never left half-updated by a panic in this crate, and the
/// update consumer must keep running, so poisoning is not treated as fatal.
pub fn lock<K, V>(state: &Mutex<CacheState<K, V>>) -> MutexGuard<'_, CacheState<K, V>> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}
