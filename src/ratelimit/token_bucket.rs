//! Token bucket rate limiter.

use std::sync::Arc;
use std::time::Instant;

use parking_lot::Mutex;
use tracing::{debug, trace};

use super::clock::{Clock, SystemClock};
use crate::error::{FloodgateError, Result};

/// A continuous-capacity pool refilled in proportion to elapsed time.
///
/// The bucket starts full. Admission consumes a caller-chosen, possibly
/// fractional, cost; a request costing more than `max_tokens` can never
/// succeed. There is no blocking variant, callers that need to wait must poll.
#[derive(Debug)]
pub struct TokenBucket {
    /// Upper bound on stored tokens
    max_tokens: f64,
    /// Tokens added per second
    refill_rate: f64,
    clock: Arc<dyn Clock>,
    state: Mutex<TokenBucketState>,
}

#[derive(Debug)]
struct TokenBucketState {
    tokens: f64,
    last_refill: Instant,
}

impl TokenBucket {
    /// Create a full token bucket on the system clock.
    pub fn new(max_tokens: f64, refill_rate: f64) -> Result<Self> {
        Self::with_clock(max_tokens, refill_rate, SystemClock::shared())
    }

    /// Create a full token bucket reading time from `clock`.
    ///
    /// Both parameters must be finite and non-negative.
    pub fn with_clock(max_tokens: f64, refill_rate: f64, clock: Arc<dyn Clock>) -> Result<Self> {
        if !max_tokens.is_finite() || max_tokens < 0.0 {
            return Err(FloodgateError::InvalidConfig(format!(
                "max_tokens must be finite and non-negative, got {}",
                max_tokens
            )));
        }
        if !refill_rate.is_finite() || refill_rate < 0.0 {
            return Err(FloodgateError::InvalidConfig(format!(
                "refill_rate must be finite and non-negative, got {}",
                refill_rate
            )));
        }

        debug!(max_tokens, refill_rate, "Creating token bucket");

        let last_refill = clock.now();
        Ok(Self {
            max_tokens,
            refill_rate,
            clock,
            state: Mutex::new(TokenBucketState {
                tokens: max_tokens,
                last_refill,
            }),
        })
    }

    /// Consume `cost` tokens if that many are available. Never blocks.
    ///
    /// A rejected request leaves the stored tokens untouched. Negative or NaN
    /// costs are always rejected.
    pub fn allow(&self, cost: f64) -> bool {
        if cost.is_nan() || cost < 0.0 {
            trace!(cost, "Token bucket rejected invalid cost");
            return false;
        }

        let mut state = self.state.lock();
        self.refill(&mut state);

        if state.tokens >= cost {
            state.tokens -= cost;
            trace!(cost, tokens = state.tokens, "Token bucket admitted");
            true
        } else {
            trace!(cost, tokens = state.tokens, "Token bucket rejected");
            false
        }
    }

    /// Tokens currently available, after refilling.
    pub fn tokens(&self) -> f64 {
        let mut state = self.state.lock();
        self.refill(&mut state);
        state.tokens
    }

    /// Upper bound on stored tokens.
    pub fn max_tokens(&self) -> f64 {
        self.max_tokens
    }

    /// Tokens added per second.
    pub fn refill_rate(&self) -> f64 {
        self.refill_rate
    }

    fn refill(&self, state: &mut TokenBucketState) {
        let now = self.clock.now();
        let elapsed = now.saturating_duration_since(state.last_refill).as_secs_f64();

        state.tokens = (state.tokens + elapsed * self.refill_rate).min(self.max_tokens);
        state.last_refill = now;
    }
}
