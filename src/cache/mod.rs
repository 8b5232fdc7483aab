//! In-process expiring state shared by request handlers.
//!
//! - [`CoalescingCache`]: read-through TTL cache that runs at most one compute
//!   per key and parks duplicate callers on it.
//! - [`TokenStore`]: short-lived auth tokens with sliding renewal.
//! - [`spawn_sweeper`]: periodic reclamation of expired entries for both.
//!
//! Expiry is always decided against an injected [`Clock`].

mod clock;
mod coalesce;
mod config;
mod keys;
mod lock;
mod store;
mod sweeper;
mod tokens;

use thiserror::Error;

pub use clock::{Clock, ManualClock, SystemClock};
pub use coalesce::{CacheStatus, CoalescingCache};
pub use config::CacheConfig;
pub use keys::ListingKey;
pub use store::{Entry, EntryAction, ExpiringMap};
pub use sweeper::{Sweep, spawn_sweeper};
pub use tokens::{
    DEFAULT_ENTROPY_BYTES, MIN_ENTROPY_BYTES, OsRandom, RandomSource, SequenceRandom, TokenPolicy,
    TokenStore,
};

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("fetch failed: {0}")]
    FetchFailed(#[source] Box<dyn std::error::Error + Send + Sync>),
    #[error("no producer stored a value for `{key}` after {attempts} attempt(s)")]
    ProducerUnavailable { key: String, attempts: u32 },
    #[error("secure random source unavailable: {0}")]
    RandomSourceUnavailable(String),
}
