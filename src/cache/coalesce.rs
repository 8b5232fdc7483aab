//! Read-through cache with per-key request coalescing.
//!
//! At most one compute future runs per key. Every other caller for that key
//! parks on the producer's slot and re-reads the map once the slot closes.

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::watch;
use tracing::{debug, warn};

use super::CacheError;
use super::clock::Clock;
use super::lock::mutex_lock;
use super::store::ExpiringMap;

const SOURCE: &str = "cache::coalesce";

/// How a value was obtained by [`CoalescingCache::get_or_compute`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CacheStatus {
    Hit,
    Miss,
    HitAfterWait,
}

impl CacheStatus {
    pub const fn as_str(self) -> &'static str {
        match self {
            CacheStatus::Hit => "HIT",
            CacheStatus::Miss => "MISS",
            CacheStatus::HitAfterWait => "HIT-AFTER-WAIT",
        }
    }
}

impl fmt::Display for CacheStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Slot table shared between the cache and live producer guards.
///
/// The channel never carries a value; closing it is the completion signal.
type Slots<K> = Mutex<HashMap<K, watch::Receiver<()>>>;

pub struct CoalescingCache<K, V> {
    name: &'static str,
    entries: ExpiringMap<K, V>,
    producers: Arc<Slots<K>>,
    generation: AtomicU64,
    max_wait_rounds: u32,
}

enum Claim<K>
where
    K: Eq + Hash + Clone,
{
    Ready,
    Wait(watch::Receiver<()>),
    Produce(ProducerGuard<K>),
}

/// Owns a producer slot. Dropping it removes the slot and closes the channel,
/// which wakes every waiter whether the producer finished, failed, panicked or
/// was cancelled.
struct ProducerGuard<K>
where
    K: Eq + Hash + Clone,
{
    key: K,
    slots: Arc<Slots<K>>,
    sender: Option<watch::Sender<()>>,
}

impl<K> Drop for ProducerGuard<K>
where
    K: Eq + Hash + Clone,
{
    fn drop(&mut self) {
        mutex_lock(&self.slots, SOURCE, "release").remove(&self.key);
        drop(self.sender.take());
    }
}

impl<K, V> CoalescingCache<K, V>
where
    K: Eq + Hash + Clone + fmt::Display,
    V: Clone,
{
    pub fn new(name: &'static str, clock: Arc<dyn Clock>, max_wait_rounds: u32) -> Self {
        Self {
            name,
            entries: ExpiringMap::new(clock),
            producers: Arc::new(Mutex::new(HashMap::new())),
            generation: AtomicU64::new(0),
            max_wait_rounds: max_wait_rounds.max(1),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Fresh value for `key`, if any. Never waits on producers.
    pub fn get(&self, key: &K) -> Option<V> {
        self.entries.get(key)
    }

    pub fn set(&self, key: K, value: V, ttl: Duration) {
        self.entries.insert(key, value, ttl);
    }

    pub fn invalidate(&self, key: &K) -> bool {
        self.entries.remove(key).is_some()
    }

    /// Drop every entry. Producers already running when this is called will
    /// not store their result: they re-check the generation under the map's
    /// write lock, which `clear` also takes.
    pub fn invalidate_all(&self) -> usize {
        self.generation.fetch_add(1, Ordering::AcqRel);
        self.entries.clear()
    }

    pub fn sweep(&self) -> usize {
        self.entries.sweep()
    }

    /// Stored entries, including expired ones not yet swept.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Keys with a producer currently running.
    pub fn in_flight(&self) -> usize {
        mutex_lock(&self.producers, SOURCE, "in_flight").len()
    }

    /// Return the cached value for `key`, or run `compute` as the sole producer
    /// for it.
    ///
    /// Callers arriving while a producer runs wait for it and re-read the map.
    /// If the producer stored nothing (it failed, was cancelled, or its result
    /// was invalidated) the waiter goes through the whole protocol again, at
    /// most `max_wait_rounds` times before giving up with
    /// [`CacheError::ProducerUnavailable`]. A compute error is returned only to
    /// the caller that ran it.
    pub async fn get_or_compute<F, Fut, E>(
        &self,
        key: K,
        ttl: Duration,
        compute: F,
    ) -> Result<(V, CacheStatus), CacheError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, E>>,
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        if let Some(value) = self.entries.get(&key) {
            return Ok((value, CacheStatus::Hit));
        }

        let mut compute = Some(compute);
        let mut waited = 0_u32;

        loop {
            match self.claim(&key) {
                Claim::Ready => {
                    if let Some(value) = self.entries.get(&key) {
                        let status = if waited == 0 {
                            CacheStatus::Hit
                        } else {
                            CacheStatus::HitAfterWait
                        };
                        return Ok((value, status));
                    }
                }
                Claim::Wait(mut slot) => {
                    debug!(
                        cache = self.name,
                        key = %key,
                        round = waited + 1,
                        "Waiting on in-flight producer"
                    );
                    // Err means the sender dropped, which is the only signal sent.
                    let _ = slot.changed().await;
                    waited += 1;

                    if let Some(value) = self.entries.get(&key) {
                        return Ok((value, CacheStatus::HitAfterWait));
                    }
                    if waited >= self.max_wait_rounds {
                        warn!(
                            cache = self.name,
                            key = %key,
                            attempts = waited,
                            "Producer left no value after every wait round"
                        );
                        return Err(CacheError::ProducerUnavailable {
                            key: key.to_string(),
                            attempts: waited,
                        });
                    }
                }
                Claim::Produce(guard) => {
                    let Some(compute) = compute.take() else {
                        return Err(CacheError::ProducerUnavailable {
                            key: key.to_string(),
                            attempts: waited,
                        });
                    };
                    let generation = self.generation.load(Ordering::Acquire);
                    let outcome = compute().await;
                    let value = match outcome {
                        Ok(value) => value,
                        Err(err) => {
                            drop(guard);
                            return Err(CacheError::FetchFailed(err.into()));
                        }
                    };

                    let stored = self.entries.insert_if(key.clone(), value.clone(), ttl, || {
                        self.generation.load(Ordering::Acquire) == generation
                    });
                    if !stored {
                        debug!(
                            cache = self.name,
                            key = %key,
                            "Discarding result produced across an invalidation"
                        );
                    }
                    drop(guard);
                    return Ok((value, CacheStatus::Miss));
                }
            }
        }
    }

    /// Decide this caller's role for `key` under the slot lock.
    fn claim(&self, key: &K) -> Claim<K> {
        let mut slots = mutex_lock(&self.producers, SOURCE, "claim");
        if let Some(slot) = slots.get(key) {
            return Claim::Wait(slot.clone());
        }
        // A producer may have stored and released between the caller's miss
        // and taking the slot lock.
        if self.entries.get(key).is_some() {
            return Claim::Ready;
        }

        let (sender, receiver) = watch::channel(());
        slots.insert(key.clone(), receiver);
        Claim::Produce(ProducerGuard {
            key: key.clone(),
            slots: Arc::clone(&self.producers),
            sender: Some(sender),
        })
    }
}
