//! Periodic reclamation of expired entries.

use std::sync::Arc;
use std::time::Duration;

use metrics::counter;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use super::coalesce::CoalescingCache;
use super::tokens::TokenStore;

const METRIC_SWEEP_REMOVED: &str = "folio_cache_sweep_removed_total";

/// Something holding expiring entries that can be swept.
pub trait Sweep: Send + Sync + 'static {
    fn name(&self) -> &'static str;

    /// Remove expired entries, returning how many were removed.
    fn sweep(&self) -> usize;
}

impl<K, V> Sweep for CoalescingCache<K, V>
where
    K: Eq + std::hash::Hash + Clone + std::fmt::Display + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    fn name(&self) -> &'static str {
        CoalescingCache::name(self)
    }

    fn sweep(&self) -> usize {
        CoalescingCache::sweep(self)
    }
}

impl Sweep for TokenStore {
    fn name(&self) -> &'static str {
        "auth_tokens"
    }

    fn sweep(&self) -> usize {
        TokenStore::sweep(self)
    }
}

/// Run `target.sweep()` every `period` until `shutdown` flips to true or its
/// sender goes away.
pub fn spawn_sweeper<T>(
    target: Arc<T>,
    period: Duration,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()>
where
    T: Sweep + ?Sized,
{
    tokio::spawn(async move {
        let name = target.name();
        let mut interval = tokio::time::interval(period);
        interval.tick().await; // Skip the first immediate tick

        info!(
            target: "folio::cache::sweeper",
            store = name,
            period_secs = period.as_secs(),
            "Sweeper started"
        );
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    let removed = target.sweep();
                    counter!(METRIC_SWEEP_REMOVED, "store" => name).increment(removed as u64);
                    debug!(
                        target: "folio::cache::sweeper",
                        store = name,
                        removed,
                        "Sweep pass finished"
                    );
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
        info!(target: "folio::cache::sweeper", store = name, "Sweeper stopped");
    })
}
