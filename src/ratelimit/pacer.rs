//! Slack-aware pacing limiter.
//!
//! A [`Pacer`] spaces admissions `per / rate` apart. Time left unused while
//! callers were idle is banked as slack, up to `slack` requests, and can be
//! spent later as a short burst.

use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tracing::{debug, trace};

use super::clock::{Clock, SystemClock};
use super::limiter::Limiter;
use crate::error::{FloodgateError, Result};

/// Default number of requests that may be banked while idle.
pub const DEFAULT_SLACK: u32 = 10;

/// Default window the rate is expressed over.
pub const DEFAULT_PER: Duration = Duration::from_secs(1);

/// Options for a [`Pacer`].
#[derive(Debug, Clone)]
pub struct PacerConfig {
    clock: Arc<dyn Clock>,
    slack: u32,
    per: Duration,
}

impl Default for PacerConfig {
    fn default() -> Self {
        Self {
            clock: SystemClock::shared(),
            slack: DEFAULT_SLACK,
            per: DEFAULT_PER,
        }
    }
}

impl PacerConfig {
    /// Read time from `clock` instead of the system clock.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Bank at most `slack` unused requests for later bursts.
    pub fn with_slack(mut self, slack: u32) -> Self {
        self.slack = slack;
        self
    }

    /// Strict pacing: nothing is banked while idle.
    pub fn without_slack(self) -> Self {
        self.with_slack(0)
    }

    /// Express the rate over `per` instead of one second.
    ///
    /// `Pacer::with_config(2, PacerConfig::default().per(Duration::from_secs(60)))`
    /// admits two requests per minute.
    pub fn per(mut self, per: Duration) -> Self {
        self.per = per;
        self
    }

    /// Configured slack.
    pub fn slack(&self) -> u32 {
        self.slack
    }

    /// Configured window.
    pub fn window(&self) -> Duration {
        self.per
    }
}

/// Blocking limiter that paces admissions evenly.
#[derive(Debug)]
pub struct Pacer {
    per_request: Duration,
    /// Most negative balance allowed, in nanoseconds
    max_slack: i128,
    clock: Arc<dyn Clock>,
    state: Mutex<PacerState>,
}

#[derive(Debug, Default)]
struct PacerState {
    last: Option<Instant>,
    /// Pending wait in nanoseconds; negative values are banked slack
    sleep_for: i128,
}

impl Pacer {
    /// Create a pacer admitting `rate` requests per second with default slack.
    pub fn new(rate: u32) -> Result<Self> {
        Self::with_config(rate, PacerConfig::default())
    }

    /// Create a pacer admitting `rate` requests per `config.per`.
    pub fn with_config(rate: u32, config: PacerConfig) -> Result<Self> {
        if rate == 0 {
            return Err(FloodgateError::InvalidConfig(
                "pacer rate must be greater than 0".to_string(),
            ));
        }
        if config.per.is_zero() {
            return Err(FloodgateError::InvalidConfig(
                "pacer window must be greater than 0".to_string(),
            ));
        }

        let per_request = config.per / rate;
        let max_slack = -(i128::from(config.slack) * per_request.as_nanos() as i128);

        debug!(
            rate,
            per = ?config.per,
            slack = config.slack,
            per_request = ?per_request,
            "Creating pacer"
        );

        Ok(Self {
            per_request,
            max_slack,
            clock: config.clock,
            state: Mutex::new(PacerState::default()),
        })
    }

    /// Spacing between consecutive admissions.
    pub fn per_request(&self) -> Duration {
        self.per_request
    }
}

impl Limiter for Pacer {
    /// Block until the next slot and return it.
    ///
    /// The lock is held while sleeping, so concurrent callers are admitted one
    /// at a time.
    fn take(&self) -> Instant {
        let mut state = self.state.lock();
        let now = self.clock.now();

        let Some(last) = state.last else {
            state.last = Some(now);
            return now;
        };

        let since_last = now.saturating_duration_since(last).as_nanos() as i128;
        state.sleep_for += self.per_request.as_nanos() as i128 - since_last;
        if state.sleep_for < self.max_slack {
            state.sleep_for = self.max_slack;
        }

        if state.sleep_for > 0 {
            let wait = Duration::from_nanos(u64::try_from(state.sleep_for).unwrap_or(u64::MAX));
            trace!(wait = ?wait, "Pacer waiting for next slot");
            self.clock.sleep(wait);
            let admitted = now + wait;
            state.last = Some(admitted);
            state.sleep_for = 0;
            admitted
        } else {
            trace!(banked_nanos = state.sleep_for as i64, "Pacer admitted from slack");
            state.last = Some(now);
            now
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ratelimit::clock::ManualClock;

    fn manual_pacer(rate: u32, config: PacerConfig) -> (Pacer, ManualClock) {
        let clock = ManualClock::new();
        let pacer = Pacer::with_config(rate, config.with_clock(Arc::new(clock.clone()))).unwrap();
        (pacer, clock)
    }

    #[test]
    fn test_pacer_config_defaults() {
        let config = PacerConfig::default();
        assert_eq!(config.slack(), 10);
        assert_eq!(config.window(), Duration::from_secs(1));

        let strict = PacerConfig::default().without_slack().per(Duration::from_secs(60));
        assert_eq!(strict.slack(), 0);
        assert_eq!(strict.window(), Duration::from_secs(60));
    }

    #[test]
    fn test_pacer_spaces_requests_evenly() {
        let (pacer, clock) = manual_pacer(10, PacerConfig::default().without_slack());
        let start = clock.now();

        let offsets: Vec<Duration> = (0..4).map(|_| pacer.take() - start).collect();
        assert_eq!(
            offsets,
            vec![
                Duration::ZERO,
                Duration::from_millis(100),
                Duration::from_millis(200),
                Duration::from_millis(300),
            ]
        );
    }

    #[test]
    fn test_pacer_per_window() {
        let (pacer, clock) = manual_pacer(2, PacerConfig::default().per(Duration::from_secs(60)));
        let start = clock.now();

        assert_eq!(pacer.per_request(), Duration::from_secs(30));
        pacer.take();
        assert_eq!(pacer.take() - start, Duration::from_secs(30));
    }

    #[test]
    fn test_pacer_without_slack_does_not_burst_after_idle() {
        let (pacer, clock) = manual_pacer(10, PacerConfig::default().without_slack());

        pacer.take();
        clock.advance(Duration::from_secs(1));

        let resumed = pacer.take();
        assert_eq!(resumed, clock.now());
        assert_eq!(pacer.take() - resumed, Duration::from_millis(100));
    }

    #[test]
    fn test_pacer_slack_allows_burst_after_idle() {
        let (pacer, clock) = manual_pacer(10, PacerConfig::default());

        pacer.take();
        clock.advance(Duration::from_secs(1));
        let resumed = clock.now();

        // Ten slots were banked while idle
        for _ in 0..10 {
            assert_eq!(pacer.take(), resumed);
        }
        assert_eq!(pacer.take() - resumed, Duration::from_millis(100));
    }

    #[test]
    fn test_pacer_slack_is_capped() {
        let (pacer, clock) = manual_pacer(10, PacerConfig::default().with_slack(2));

        pacer.take();
        clock.advance(Duration::from_secs(60));
        let resumed = clock.now();

        // Clamped to two banked slots, plus the slot that elapsed normally
        for _ in 0..3 {
            assert_eq!(pacer.take(), resumed);
        }
        assert!(pacer.take() > resumed);
    }

    #[test]
    fn test_pacer_rejects_invalid_configuration() {
        assert!(matches!(Pacer::new(0), Err(FloodgateError::InvalidConfig(_))));
        assert!(matches!(
            Pacer::with_config(5, PacerConfig::default().per(Duration::ZERO)),
            Err(FloodgateError::InvalidConfig(_))
        ));
    }
}
