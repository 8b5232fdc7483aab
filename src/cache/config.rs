//! Cache and token store tuning.

use std::time::Duration;

use super::tokens::{DEFAULT_ENTROPY_BYTES, TokenPolicy};

const DEFAULT_LISTING_TTL_SECS: u64 = 600;
const DEFAULT_LISTING_SWEEP_SECS: u64 = 300;
const DEFAULT_TOKEN_VALIDITY_SECS: u64 = 1800;
const DEFAULT_TOKEN_SWEEP_SECS: u64 = 1800;
const DEFAULT_MAX_WAIT_ROUNDS: u32 = 3;

#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Lifetime of a cached listing page.
    pub listing_ttl: Duration,
    /// Period of the listing cache sweeper.
    pub listing_sweep_interval: Duration,
    /// Sliding validity window of an auth token.
    pub token_validity: Duration,
    /// Period of the token sweeper.
    pub token_sweep_interval: Duration,
    pub token_entropy_bytes: usize,
    /// Absolute cap on a token's age regardless of renewals.
    pub token_max_lifetime: Option<Duration>,
    /// How many failed producers a waiter sits through before giving up.
    pub max_wait_rounds: u32,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            listing_ttl: Duration::from_secs(DEFAULT_LISTING_TTL_SECS),
            listing_sweep_interval: Duration::from_secs(DEFAULT_LISTING_SWEEP_SECS),
            token_validity: Duration::from_secs(DEFAULT_TOKEN_VALIDITY_SECS),
            token_sweep_interval: Duration::from_secs(DEFAULT_TOKEN_SWEEP_SECS),
            token_entropy_bytes: DEFAULT_ENTROPY_BYTES,
            token_max_lifetime: None,
            max_wait_rounds: DEFAULT_MAX_WAIT_ROUNDS,
        }
    }
}

impl From<&crate::config::CacheSettings> for CacheConfig {
    fn from(settings: &crate::config::CacheSettings) -> Self {
        Self {
            listing_ttl: Duration::from_secs(settings.listing_ttl_seconds.get()),
            listing_sweep_interval: Duration::from_secs(settings.listing_sweep_seconds.get()),
            token_validity: Duration::from_secs(settings.token_validity_seconds.get()),
            token_sweep_interval: Duration::from_secs(settings.token_sweep_seconds.get()),
            token_entropy_bytes: settings.token_entropy_bytes,
            token_max_lifetime: settings
                .token_max_lifetime_seconds
                .map(|secs| Duration::from_secs(secs.get())),
            max_wait_rounds: settings.max_wait_rounds.get(),
        }
    }
}

impl CacheConfig {
    pub fn token_policy(&self) -> TokenPolicy {
        TokenPolicy {
            validity: self.token_validity,
            entropy_bytes: self.token_entropy_bytes,
            max_lifetime: self.token_max_lifetime,
        }
    }
}
