//! Lock-guarded map of expiring entries.
//!
//! Presence in the map does not imply freshness: an entry stays until a sweep
//! or an explicit removal reclaims it, so every read re-checks `expires_at`
//! against the injected clock.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

use super::clock::Clock;
use super::lock::{rw_read, rw_write};

const SOURCE: &str = "cache::store";

/// Stand-in horizon when `now + ttl` does not fit in an `Instant`.
const FAR_FUTURE: Duration = Duration::from_secs(100 * 365 * 24 * 60 * 60);

/// `start + ttl`, saturating to a far-future instant instead of panicking.
pub fn deadline(start: Instant, ttl: Duration) -> Instant {
    start
        .checked_add(ttl)
        .or_else(|| start.checked_add(FAR_FUTURE))
        .unwrap_or(start)
}

#[derive(Debug, Clone)]
pub struct Entry<V> {
    pub value: V,
    pub expires_at: Instant,
}

impl<V> Entry<V> {
    pub fn is_fresh(&self, now: Instant) -> bool {
        now < self.expires_at
    }
}

pub struct ExpiringMap<K, V> {
    entries: RwLock<HashMap<K, Entry<V>>>,
    clock: Arc<dyn Clock>,
}

impl<K, V> ExpiringMap<K, V>
where
    K: Eq + Hash,
{
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            clock,
        }
    }

    pub fn now(&self) -> Instant {
        self.clock.now()
    }

    /// Snapshot of the value when present and not yet expired.
    pub fn get(&self, key: &K) -> Option<V>
    where
        V: Clone,
    {
        let now = self.clock.now();
        rw_read(&self.entries, SOURCE, "get")
            .get(key)
            .filter(|entry| entry.is_fresh(now))
            .map(|entry| entry.value.clone())
    }

    /// Insert or overwrite with `expires_at = now + ttl`.
    pub fn insert(&self, key: K, value: V, ttl: Duration) {
        let expires_at = deadline(self.clock.now(), ttl);
        self.insert_until(key, value, expires_at);
    }

    /// Insert only if `admit` still holds once the write lock is taken.
    /// Returns whether the value was stored.
    pub fn insert_if(&self, key: K, value: V, ttl: Duration, admit: impl FnOnce() -> bool) -> bool {
        let expires_at = deadline(self.clock.now(), ttl);
        let mut guard = rw_write(&self.entries, SOURCE, "insert_if");
        if !admit() {
            return false;
        }
        guard.insert(key, Entry { value, expires_at });
        true
    }

    pub fn insert_until(&self, key: K, value: V, expires_at: Instant) {
        rw_write(&self.entries, SOURCE, "insert").insert(key, Entry { value, expires_at });
    }

    pub fn remove(&self, key: &K) -> Option<V> {
        rw_write(&self.entries, SOURCE, "remove")
            .remove(key)
            .map(|entry| entry.value)
    }

    /// Run `f` against the entry for `key` while holding the write lock.
    ///
    /// The closure sees expired entries too; it decides what to do with them by
    /// returning an [`EntryAction`].
    pub fn update<R>(
        &self,
        key: &K,
        f: impl FnOnce(&mut Entry<V>, Instant) -> (EntryAction, R),
    ) -> Option<R> {
        let now = self.clock.now();
        let mut guard = rw_write(&self.entries, SOURCE, "update");
        let entry = guard.get_mut(key)?;
        let (action, result) = f(entry, now);
        if matches!(action, EntryAction::Remove) {
            guard.remove(key);
        }
        Some(result)
    }

    /// Drop every entry with `expires_at <= now`, returning how many went away.
    pub fn sweep(&self) -> usize {
        let now = self.clock.now();
        let mut guard = rw_write(&self.entries, SOURCE, "sweep");
        let before = guard.len();
        guard.retain(|_, entry| entry.is_fresh(now));
        before - guard.len()
    }

    pub fn clear(&self) -> usize {
        let mut guard = rw_write(&self.entries, SOURCE, "clear");
        let removed = guard.len();
        guard.clear();
        removed
    }

    /// Stored entries, expired-but-unswept ones included.
    pub fn len(&self) -> usize {
        rw_read(&self.entries, SOURCE, "len").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryAction {
    Keep,
    Remove,
}
