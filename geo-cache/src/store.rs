//! Bounded in-memory storage with write-order eviction and expiry.
//!
//! The store knows nothing about locking or the network. The cache facade
//! wraps it in a mutex together with the [`crate::version::VersionTable`].

use std::borrow::Borrow;
use std::hash::Hash;
use std::num::NonZeroUsize;
use std::time::{Duration, Instant};

use lru::LruCache;

/// A stored value and the instant after which it is treated as absent.
#[derive(Debug, Clone, PartialEq)]
pub struct Entry<V> {
    pub value: V,
    /// `None` never expires.
    pub expires_at: Option<Instant>,
}

impl<V> Entry<V> {
    /// Stamps `value` to expire `ttl` after `now`.
    ///
    /// A deadline past the range of [`Instant`] is treated as no deadline.
    pub fn new(value: V, ttl: Option<Duration>, now: Instant) -> Self {
        Self {
            value,
            expires_at: ttl.and_then(|ttl| now.checked_add(ttl)),
        }
    }

    /// Returns true once `now` has reached the entry's expiry.
    pub fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

/// Key-value map holding at most `capacity` entries.
///
/// Eviction follows write order, not access order: reads never move an
/// entry, while overwriting a key re-appends it as the newest entry. When a
/// new key arrives at a full store, the entry written longest ago goes.
///
/// # Why `LruCache`?
///
/// An LRU list is a write-order list as long as only writes promote. Reads
/// go through [`LruCache::peek`], which leaves the order alone, and writes go
/// through [`LruCache::push`], which promotes and evicts in O(1).
pub struct Store<K, V> {
    entries: LruCache<K, Entry<V>>,
}

impl<K, V> Store<K, V>
where
    K: Clone + Eq + Hash,
{
    /// Creates an empty store bounded to `capacity` entries.
    pub fn new(capacity: NonZeroUsize) -> Self {
        Self {
            entries: LruCache::new(capacity),
        }
    }

    /// Looks up a value without touching eviction order.
    ///
    /// Expired entries are not filtered here; callers sweep first with
    /// [`Store::sweep_expired`].
    pub fn get<Q>(&self, key: &Q) -> Option<&V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.entries.peek(key).map(|entry| &entry.value)
    }

    pub fn entry<Q>(&self, key: &Q) -> Option<&Entry<V>>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.entries.peek(key)
    }

    /// Inserts or overwrites `key`, making it the most recently written.
    ///
    /// Inserting a new key into a full store evicts the oldest write, which
    /// is returned so the caller can log it. With a `ttl`, the entry expires
    /// at `now + ttl`.
    pub fn set(&mut self, key: K, value: V, ttl: Option<Duration>, now: Instant) -> Option<K> {
        let overwrite = self.entries.contains(&key);
        let displaced = self.entries.push(key, Entry::new(value, ttl, now));
        // On overwrite `push` hands back the old value under the same key.
        if overwrite {
            None
        } else {
            displaced.map(|(evicted, _)| evicted)
        }
    }

    /// Drops every entry whose expiry is at or before `now`.
    ///
    /// Returns the number of entries removed. Entries written without a TTL
    /// never expire, so a store that has never seen a TTL always returns 0.
    pub fn sweep_expired(&mut self, now: Instant) -> usize {
        let expired: Vec<K> = self
            .entries
            .iter()
            .filter(|(_, entry)| entry.is_expired(now))
            .map(|(key, _)| key.clone())
            .collect();

        for key in &expired {
            self.entries.pop(key);
        }
        expired.len()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterates entries from the oldest write to the newest.
    pub fn iter(&self) -> impl Iterator<Item = (&K, &Entry<V>)> + '_ {
        self.entries.iter().rev()
    }

    /// Keys from the oldest write to the newest.
    pub fn keys(&self) -> impl Iterator<Item = &K> + '_ {
        self.iter().map(|(key, _)| key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store(capacity: usize) -> Store<&'static str, u32> {
        Store::new(NonZeroUsize::new(capacity).expect("non-zero capacity"))
    }

    #[test]
    fn holds_up_to_capacity() {
        let now = Instant::now();
        let mut store = store(3);
        assert!(store.set("a", 1, None, now).is_none());
        assert!(store.set("b", 2, None, now).is_none());
        assert!(store.set("c", 3, None, now).is_none());

        assert_eq!(store.len(), 3);
        assert_eq!(store.get("a"), Some(&1));
        assert_eq!(store.get("b"), Some(&2));
        assert_eq!(store.get("c"), Some(&3));
        assert_eq!(store.get("d"), None);
    }

    #[test]
    fn evicts_oldest_write_when_full() {
        let now = Instant::now();
        let mut store = store(3);
        store.set("a", 1, None, now);
        store.set("b", 2, None, now);
        store.set("c", 3, None, now);

        assert_eq!(store.set("d", 4, None, now), Some("a"));
        assert_eq!(store.get("a"), None);
        assert_eq!(store.keys().copied().collect::<Vec<_>>(), vec!["b", "c", "d"]);

        assert_eq!(store.set("e", 5, None, now), Some("b"));
        assert_eq!(store.set("f", 6, None, now), Some("c"));
        assert_eq!(store.len(), 3);
    }

    #[test]
    fn reads_do_not_refresh_eviction_order() {
        let now = Instant::now();
        let mut store = store(2);
        store.set("a", 1, None, now);
        store.set("b", 2, None, now);

        for _ in 0..5 {
            assert_eq!(store.get("a"), Some(&1));
        }

        assert_eq!(store.set("c", 3, None, now), Some("a"));
    }

    #[test]
    fn overwrite_moves_key_to_newest() {
        let now = Instant::now();
        let mut store = store(3);
        store.set("a", 1, None, now);
        store.set("b", 2, None, now);
        store.set("c", 3, None, now);

        // Overwriting a present key never evicts.
        assert_eq!(store.set("a", 10, None, now), None);
        assert_eq!(store.len(), 3);
        assert_eq!(store.keys().copied().collect::<Vec<_>>(), vec!["b", "c", "a"]);

        assert_eq!(store.set("d", 4, None, now), Some("b"));
        assert_eq!(store.get("a"), Some(&10));
    }

    #[test]
    fn capacity_of_one_keeps_latest_write() {
        let now = Instant::now();
        let mut store = store(1);
        store.set("a", 1, None, now);
        assert_eq!(store.set("b", 2, None, now), Some("a"));
        assert_eq!(store.get("b"), Some(&2));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn sweep_removes_expired_entries_only() {
        let start = Instant::now();
        let ttl = Duration::from_secs(1);
        let mut store = store(3);
        store.set("short", 1, Some(ttl), start);
        store.set("forever", 2, None, start);
        store.set("later", 3, Some(ttl), start + Duration::from_millis(800));

        assert_eq!(store.sweep_expired(start + Duration::from_millis(500)), 0);
        assert_eq!(store.sweep_expired(start + ttl), 1);
        assert_eq!(store.get("short"), None);
        assert_eq!(store.get("forever"), Some(&2));
        assert_eq!(store.get("later"), Some(&3));

        assert_eq!(store.sweep_expired(start + Duration::from_secs(10)), 1);
        assert_eq!(store.keys().copied().collect::<Vec<_>>(), vec!["forever"]);
    }

    #[test]
    fn rewrite_restamps_expiry() {
        let start = Instant::now();
        let ttl = Duration::from_secs(1);
        let mut store = store(2);
        store.set("a", 1, Some(ttl), start);
        store.set("a", 2, Some(ttl), start + Duration::from_millis(900));

        assert_eq!(store.sweep_expired(start + Duration::from_millis(1500)), 0);
        let entry = store.entry("a").expect("entry present");
        assert_eq!(entry.value, 2);
        assert_eq!(entry.expires_at, Some(start + Duration::from_millis(1900)));
    }

    #[test]
    fn iter_walks_oldest_first() {
        let now = Instant::now();
        let mut store = store(3);
        store.set("x", 1, None, now);
        store.set("y", 2, None, now);
        store.set("x", 3, None, now);

        let seen: Vec<_> = store.iter().map(|(k, e)| (*k, e.value)).collect();
        assert_eq!(seen, vec![("y", 2), ("x", 3)]);
    }

    #[test]
    fn ttl_past_instant_range_never_expires() {
        let now = Instant::now();
        let mut store = store(2);
        store.set("a", 1, Some(Duration::MAX), now);

        assert_eq!(store.entry("a").map(|entry| entry.expires_at), Some(None));
        assert_eq!(store.sweep_expired(now + Duration::from_secs(86_400)), 0);
        assert_eq!(store.get("a"), Some(&1));
    }
}
