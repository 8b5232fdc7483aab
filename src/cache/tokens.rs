//! Short-lived bearer tokens with sliding renewal.

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use rand::TryRngCore;
use rand::rngs::OsRng;

use super::CacheError;
use super::clock::Clock;
use super::lock::mutex_lock;
use super::store::{EntryAction, ExpiringMap, deadline};

pub const DEFAULT_ENTROPY_BYTES: usize = 32;
pub const MIN_ENTROPY_BYTES: usize = 16;

/// Source of cryptographically secure bytes for token issuance.
pub trait RandomSource: Send + Sync {
    fn fill(&self, dest: &mut [u8]) -> Result<(), String>;
}

/// Operating-system CSPRNG.
#[derive(Debug, Clone, Copy, Default)]
pub struct OsRandom;

impl RandomSource for OsRandom {
    fn fill(&self, dest: &mut [u8]) -> Result<(), String> {
        OsRng.try_fill_bytes(dest).map_err(|err| err.to_string())
    }
}

#[derive(Debug, Clone, Copy)]
pub struct TokenPolicy {
    pub validity: Duration,
    pub entropy_bytes: usize,
    pub max_lifetime: Option<Duration>,
}

impl Default for TokenPolicy {
    fn default() -> Self {
        Self {
            validity: Duration::from_secs(30 * 60),
            entropy_bytes: DEFAULT_ENTROPY_BYTES,
            max_lifetime: None,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Issued {
    at: Instant,
}

pub struct TokenStore {
    tokens: ExpiringMap<String, Issued>,
    random: Arc<dyn RandomSource>,
    policy: TokenPolicy,
}

impl TokenStore {
    pub fn new(policy: TokenPolicy, clock: Arc<dyn Clock>, random: Arc<dyn RandomSource>) -> Self {
        Self {
            tokens: ExpiringMap::new(clock),
            random,
            policy,
        }
    }

    pub fn validity(&self) -> Duration {
        self.policy.validity
    }

    /// Lifetime of a freshly issued token: the validity window, clamped by
    /// the lifetime cap when one is set.
    pub fn issued_window(&self) -> Duration {
        match self.policy.max_lifetime {
            Some(cap) => cap.min(self.policy.validity),
            None => self.policy.validity,
        }
    }

    pub fn issue(&self) -> Result<String, CacheError> {
        self.issue_with(self.policy.entropy_bytes)
    }

    /// Issue a token of `entropy_bytes` random bytes, hex encoded.
    ///
    /// Requests below [`MIN_ENTROPY_BYTES`] are raised to it. Nothing is stored
    /// when the random source fails.
    pub fn issue_with(&self, entropy_bytes: usize) -> Result<String, CacheError> {
        let mut bytes = vec![0_u8; entropy_bytes.max(MIN_ENTROPY_BYTES)];
        self.random
            .fill(&mut bytes)
            .map_err(CacheError::RandomSourceUnavailable)?;

        let token = hex::encode(bytes);
        let now = self.tokens.now();
        let expires_at = self.renewed_expiry(now, now);
        self.tokens
            .insert_until(token.clone(), Issued { at: now }, expires_at);
        Ok(token)
    }

    /// True when `token` is live. A live token has its expiry pushed a full
    /// validity window past now; a dead one is removed on the spot.
    pub fn validate(&self, token: &str) -> bool {
        self.renew(token).is_some()
    }

    /// Like [`validate`](Self::validate), returning how long the renewed
    /// token has left to live.
    pub fn renew(&self, token: &str) -> Option<Duration> {
        let max_lifetime = self.policy.max_lifetime;
        self.tokens
            .update(&token.to_owned(), |entry, now| {
                let too_old = max_lifetime
                    .is_some_and(|cap| now.saturating_duration_since(entry.value.at) >= cap);
                if !entry.is_fresh(now) || too_old {
                    return (EntryAction::Remove, None);
                }
                entry.expires_at = self.renewed_expiry(entry.value.at, now);
                let remaining = entry.expires_at.saturating_duration_since(now);
                (EntryAction::Keep, Some(remaining))
            })
            .flatten()
    }

    pub fn revoke(&self, token: &str) -> bool {
        self.tokens.remove(&token.to_owned()).is_some()
    }

    pub fn sweep(&self) -> usize {
        self.tokens.sweep()
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    fn renewed_expiry(&self, issued_at: Instant, now: Instant) -> Instant {
        let sliding = deadline(now, self.policy.validity);
        match self.policy.max_lifetime {
            Some(cap) => sliding.min(deadline(issued_at, cap)),
            None => sliding,
        }
    }
}

/// Test double: fills buffers with a counting byte sequence (`00 01 02 ...`)
/// that carries on across calls. It has no entropy and must never back a
/// store that issues real sessions; it exists so integration tests and
/// fixtures get reproducible tokens.
#[derive(Debug, Default)]
pub struct SequenceRandom {
    next: Mutex<u8>,
}

impl RandomSource for SequenceRandom {
    fn fill(&self, dest: &mut [u8]) -> Result<(), String> {
        let mut next = mutex_lock(&self.next, "cache::tokens", "fill");
        for byte in dest.iter_mut() {
            *byte = *next;
            *next = next.wrapping_add(1);
        }
        Ok(())
    }
}
