//! Leaky bucket rate limiter.
//!
//! Every admitted request occupies one unit of the bucket, and one unit drains
//! out per leak interval. A full bucket rejects (`allow`) or waits (`take`).

use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tracing::{debug, trace};

use super::clock::{Clock, SystemClock};
use super::limiter::Limiter;
use crate::error::{FloodgateError, Result};

const NANOS_PER_SEC: u128 = 1_000_000_000;

/// Retry step for `take` when the bucket never drains.
const NO_LEAK_RETRY: Duration = Duration::from_secs(1);

/// A discrete-capacity bucket draining one unit per fixed interval.
///
/// The bucket starts empty. A `requests_per_second` of zero disables draining
/// entirely, so once full the bucket stays full. A `capacity` of zero rejects
/// every request. A rate too high to give a non-zero leak interval (above
/// 1e9 per second) is rejected at construction.
#[derive(Debug)]
pub struct LeakyBucket {
    /// Maximum outstanding units
    capacity: u64,
    /// Time for one unit to drain; `None` means the bucket never drains
    leak_interval: Option<Duration>,
    clock: Arc<dyn Clock>,
    state: Mutex<LeakyBucketState>,
}

#[derive(Debug)]
struct LeakyBucketState {
    /// Occupied units, always within `[0, capacity]`
    tokens: u64,
    /// Anchor for drain computation; only moves by whole leak intervals
    last_leak: Instant,
}

impl LeakyBucket {
    /// Create a leaky bucket on the system clock.
    pub fn new(capacity: u64, requests_per_second: u32) -> Result<Self> {
        Self::with_clock(capacity, requests_per_second, SystemClock::shared())
    }

    /// Create a leaky bucket reading time from `clock`.
    pub fn with_clock(
        capacity: u64,
        requests_per_second: u32,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        let leak_interval = match requests_per_second {
            0 => None,
            rps => Some(Duration::from_secs(1) / rps),
        };
        if leak_interval.is_some_and(|interval| interval.is_zero()) {
            return Err(FloodgateError::InvalidConfig(format!(
                "leaky bucket rate {} exceeds timer resolution",
                requests_per_second
            )));
        }

        debug!(
            capacity,
            requests_per_second,
            leak_interval = ?leak_interval,
            "Creating leaky bucket"
        );

        let last_leak = clock.now();
        Ok(Self {
            capacity,
            leak_interval,
            clock,
            state: Mutex::new(LeakyBucketState {
                tokens: 0,
                last_leak,
            }),
        })
    }

    /// Admit one request if the bucket has room. Never blocks.
    pub fn allow(&self) -> bool {
        self.try_admit().is_ok()
    }

    /// Block until the request is admitted and return the admission time.
    ///
    /// Between attempts the lock is released and the caller sleeps one leak
    /// interval. There is no ordering among concurrent waiters, and a bucket
    /// with zero capacity never admits, so `take` on it never returns.
    pub fn take(&self) -> Instant {
        loop {
            match self.try_admit() {
                Ok(admitted) => return admitted,
                Err(wait) => {
                    debug!(wait = ?wait, "Leaky bucket full, waiting");
                    self.clock.sleep(wait);
                }
            }
        }
    }

    /// Like [`take`](Self::take), but suspends the task instead of the thread.
    pub async fn take_async(&self) -> Instant {
        loop {
            match self.try_admit() {
                Ok(admitted) => return admitted,
                Err(wait) => {
                    debug!(wait = ?wait, "Leaky bucket full, waiting");
                    self.clock.sleep_async(wait).await;
                }
            }
        }
    }

    /// Like [`take`](Self::take), but gives up once `timeout` has elapsed.
    pub fn take_timeout(&self, timeout: Duration) -> Option<Instant> {
        let deadline = self.clock.now() + timeout;
        loop {
            match self.try_admit() {
                Ok(admitted) => return Some(admitted),
                Err(wait) => {
                    let now = self.clock.now();
                    if now >= deadline {
                        trace!("Leaky bucket take timed out");
                        return None;
                    }
                    self.clock.sleep(wait.min(deadline - now));
                }
            }
        }
    }

    /// Occupied units after draining.
    pub fn tokens(&self) -> u64 {
        let mut state = self.state.lock();
        self.leak(&mut state, self.clock.now());
        state.tokens
    }

    /// Maximum outstanding units.
    pub fn capacity(&self) -> u64 {
        self.capacity
    }

    /// Time for one unit to drain, or `None` if the bucket never drains.
    pub fn leak_interval(&self) -> Option<Duration> {
        self.leak_interval
    }

    /// Drain, then admit if there is room.
    ///
    /// Returns the admission time, or how long to wait before retrying.
    fn try_admit(&self) -> std::result::Result<Instant, Duration> {
        let mut state = self.state.lock();
        let now = self.clock.now();
        self.leak(&mut state, now);

        if state.tokens >= self.capacity {
            trace!(tokens = state.tokens, capacity = self.capacity, "Leaky bucket rejected");
            return Err(self.leak_interval.unwrap_or(NO_LEAK_RETRY));
        }

        state.tokens += 1;
        trace!(tokens = state.tokens, capacity = self.capacity, "Leaky bucket admitted");
        Ok(now)
    }

    /// Drain whole intervals elapsed since the last leak.
    ///
    /// The anchor moves by exactly the drained intervals, so a partial
    /// interval carries over to the next call.
    fn leak(&self, state: &mut LeakyBucketState, now: Instant) {
        let Some(interval) = self.leak_interval else {
            return;
        };

        let elapsed = now.saturating_duration_since(state.last_leak).as_nanos();
        let interval_nanos = interval.as_nanos();
        let leaked = elapsed / interval_nanos;
        if leaked == 0 {
            return;
        }

        state.tokens = state
            .tokens
            .saturating_sub(u64::try_from(leaked).unwrap_or(u64::MAX));

        // drained <= elapsed, so the seconds always fit in a u64
        let drained = leaked * interval_nanos;
        state.last_leak += Duration::new(
            (drained / NANOS_PER_SEC) as u64,
            (drained % NANOS_PER_SEC) as u32,
        );

        trace!(leaked = leaked as u64, tokens = state.tokens, "Leaky bucket drained");
    }
}

impl Limiter for LeakyBucket {
    fn take(&self) -> Instant {
        LeakyBucket::take(self)
    }
}
