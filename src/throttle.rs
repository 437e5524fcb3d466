//! Minimum-interval request gate
//!
//! Providers with per-workflow rate limits get one shared throttle per
//! adapter kind. A send arriving sooner than the minimum interval after the
//! last accepted send is shed; the adapter drops it without any caller-visible
//! signal.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Sentinel for "no send accepted yet"
const NEVER: u64 = u64::MAX;

/// Best-effort minimum-interval gate shared across adapters of one kind
///
/// The last-accepted timestamp is a single atomic word updated with
/// compare-exchange, so two near-simultaneous sends cannot both pass the
/// check. Millisecond granularity is plenty for a load shedder.
#[derive(Debug)]
pub struct RequestThrottle {
    /// Time origin; timestamps are stored as milliseconds since this instant
    origin: Instant,

    /// Milliseconds since `origin` of the last accepted send, or [`NEVER`]
    last_accepted: AtomicU64,

    min_interval: Duration,
}

impl RequestThrottle {
    /// Create a throttle enforcing the given minimum interval between sends
    pub fn new(min_interval: Duration) -> Self {
        Self {
            origin: Instant::now(),
            last_accepted: AtomicU64::new(NEVER),
            min_interval,
        }
    }

    /// The configured minimum interval
    pub fn min_interval(&self) -> Duration {
        self.min_interval
    }

    /// Record a send attempt at the current time
    ///
    /// Returns `true` and advances the last-accepted timestamp when enough
    /// time has passed since the previous accepted send; returns `false` and
    /// leaves state untouched otherwise.
    pub fn should_accept(&self) -> bool {
        self.should_accept_at(self.origin.elapsed())
    }

    fn should_accept_at(&self, elapsed: Duration) -> bool {
        let now_ms = elapsed.as_millis() as u64;
        let min_ms = self.min_interval.as_millis() as u64;

        let mut last = self.last_accepted.load(Ordering::Relaxed);
        loop {
            if last != NEVER && now_ms.saturating_sub(last) < min_ms {
                return false;
            }
            match self.last_accepted.compare_exchange_weak(
                last,
                now_ms,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return true,
                Err(observed) => last = observed,
            }
        }
    }
}
