//! Time source used by every expiry decision in the cache layer.

use std::sync::Mutex;
use std::time::{Duration, Instant};

use super::lock::mutex_lock;

const SOURCE: &str = "cache::clock";

/// Monotonic time source.
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
}

/// Wall-clock backed by [`Instant::now`].
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Clock that only moves when told to.
///
/// Starts at the instant it was created and advances by explicit offsets, so
/// expiry boundaries can be hit exactly in tests.
#[derive(Debug)]
pub struct ManualClock {
    origin: Instant,
    offset: Mutex<Duration>,
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
            offset: Mutex::new(Duration::ZERO),
        }
    }

    pub fn advance(&self, by: Duration) {
        *mutex_lock(&self.offset, SOURCE, "advance") += by;
    }

    pub fn elapsed(&self) -> Duration {
        *mutex_lock(&self.offset, SOURCE, "elapsed")
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.origin + *mutex_lock(&self.offset, SOURCE, "now")
    }
}
