//! Per-key write versions.
//!
//! Versions order writes across regions without synchronized clocks. Each
//! local write takes `current + 1`; a remote write is applied only when its
//! version is strictly greater than what this instance has recorded.

use std::borrow::Borrow;
use std::collections::HashMap;
use std::hash::Hash;

/// Highest version seen for every key.
///
/// Entries are never removed, not even when the key is evicted or expires
/// from the store. A key that comes back must keep counting from where it
/// left off, otherwise a resurrected key would lose to stale peer updates.
#[derive(Debug)]
pub struct VersionTable<K> {
    versions: HashMap<K, u64>,
}

impl<K> Default for VersionTable<K> {
    fn default() -> Self {
        Self {
            versions: HashMap::new(),
        }
    }
}

impl<K> VersionTable<K>
where
    K: Eq + Hash,
{
    pub fn new() -> Self {
        Self::default()
    }

    /// Claims the version for a local write of `key`.
    pub fn next(&mut self, key: K) -> u64 {
        let version = self.versions.entry(key).or_insert(0);
        *version += 1;
        *version
    }

    /// Records `incoming` for `key` if it is newer than anything seen.
    ///
    /// Returns `false` for equal or lower versions; the caller drops those
    /// updates as stale or duplicate.
    pub fn accept(&mut self, key: K, incoming: u64) -> bool {
        match self.versions.get_mut(&key) {
            Some(current) if incoming <= *current => false,
            Some(current) => {
                *current = incoming;
                true
            }
            None => {
                self.versions.insert(key, incoming);
                true
            }
        }
    }

    pub fn current<Q>(&self, key: &Q) -> Option<u64>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.versions.get(key).copied()
    }
}
