//! Blocking limiter trait shared by the pacing implementations.

use std::sync::Arc;
use std::time::Instant;

use super::clock::{Clock, SystemClock};

/// A limiter whose `take` blocks until the caller may proceed.
///
/// Implemented by the leaky bucket, the pacer and the no-op [`Unlimited`], so
/// callers can hold any of them behind `Arc<dyn Limiter>`.
pub trait Limiter: Send + Sync {
    /// Block until admitted and return the admission time.
    fn take(&self) -> Instant;
}

/// A limiter that admits everything immediately.
#[derive(Debug, Clone)]
pub struct Unlimited {
    clock: Arc<dyn Clock>,
}

impl Unlimited {
    /// Create an unlimited limiter on the system clock.
    pub fn new() -> Self {
        Self::with_clock(SystemClock::shared())
    }

    /// Create an unlimited limiter reporting time from `clock`.
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self { clock }
    }
}

impl Default for Unlimited {
    fn default() -> Self {
        Self::new()
    }
}

impl Limiter for Unlimited {
    fn take(&self) -> Instant {
        self.clock.now()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ratelimit::clock::ManualClock;
    use std::time::Duration;

    #[test]
    fn test_unlimited_never_waits() {
        let clock = ManualClock::new();
        let limiter = Unlimited::with_clock(Arc::new(clock.clone()));
        let start = clock.now();

        for _ in 0..1000 {
            assert_eq!(limiter.take(), start);
        }
    }

    #[test]
    fn test_unlimited_reports_current_time() {
        let clock = ManualClock::new();
        let limiter: Arc<dyn Limiter> = Arc::new(Unlimited::with_clock(Arc::new(clock.clone())));
        let start = clock.now();

        clock.advance(Duration::from_secs(2));
        assert_eq!(limiter.take() - start, Duration::from_secs(2));
    }
}
