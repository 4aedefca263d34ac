//! Fixed-window throttle.
//!
//! A [`Throttle`] gates a callback behind a periodic tick firing every
//! `1s / limit`. Each successful [`Throttle::handle`] consumes one tick and
//! spawns the callback without waiting for it, so the throttle bounds how often
//! work starts, not how much of it runs at once.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{watch, Mutex};
use tokio::time::{Interval, MissedTickBehavior};
use tracing::{debug, trace};

use crate::error::{FloodgateError, Result};

type Task = Arc<dyn Fn() + Send + Sync>;

/// Tick-gated dispatcher with cooperative cancellation.
///
/// Clones share the same ticker, callback and cancellation state.
#[derive(Clone)]
pub struct Throttle {
    inner: Arc<ThrottleInner>,
}

struct ThrottleInner {
    period: Duration,
    /// `None` once the throttle has been cancelled
    ticker: Mutex<Option<Interval>>,
    /// Flips to `true` exactly once
    cancelled: watch::Sender<bool>,
    task: Task,
}

impl Throttle {
    /// Create a throttle running `task` at most `limit` times per second.
    ///
    /// Must be called from within a Tokio runtime; the ticker starts
    /// immediately and its first tick is ready at once. A `limit` of zero, or
    /// one too large to give a non-zero tick period, is rejected.
    pub fn new<F>(limit: u32, task: F) -> Result<Self>
    where
        F: Fn() + Send + Sync + 'static,
    {
        if limit == 0 {
            return Err(FloodgateError::InvalidConfig(
                "throttle limit must be greater than 0".to_string(),
            ));
        }

        let period = Duration::from_secs(1) / limit;
        if period.is_zero() {
            return Err(FloodgateError::InvalidConfig(format!(
                "throttle limit {} exceeds timer resolution",
                limit
            )));
        }

        if tokio::runtime::Handle::try_current().is_err() {
            return Err(FloodgateError::Runtime(
                "throttle must be created within a Tokio runtime".to_string(),
            ));
        }

        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        debug!(limit, period = ?period, "Creating throttle");

        let (cancelled, _) = watch::channel(false);
        Ok(Self {
            inner: Arc::new(ThrottleInner {
                period,
                ticker: Mutex::new(Some(ticker)),
                cancelled,
                task: Arc::new(task),
            }),
        })
    }

    /// Wait for the next tick and dispatch the callback.
    ///
    /// Returns [`FloodgateError::Canceled`] without waiting once the throttle
    /// has been cancelled, including while this call is still waiting for its
    /// tick. If a tick and cancellation are ready together either may win.
    pub async fn handle(&self) -> Result<()> {
        let mut cancelled = self.inner.cancelled.subscribe();
        if *cancelled.borrow_and_update() {
            self.stop_ticker();
            return Err(FloodgateError::Canceled);
        }

        tokio::select! {
            _ = cancelled.wait_for(|cancelled| *cancelled) => {
                trace!("Throttle handle observed cancellation");
                self.stop_ticker();
                Err(FloodgateError::Canceled)
            }
            _ = self.next_tick() => {
                trace!("Throttle tick, dispatching task");
                let task = Arc::clone(&self.inner.task);
                tokio::spawn(async move { task() });
                Ok(())
            }
        }
    }

    /// Stop the ticker and fail every pending and future `handle` call.
    ///
    /// Idempotent and never blocks. If a `handle` call currently holds the
    /// ticker, that call drops it when it observes the cancellation.
    pub fn cancel(&self) {
        let first = self.inner.cancelled.send_if_modified(|cancelled| {
            if *cancelled {
                false
            } else {
                *cancelled = true;
                true
            }
        });

        if first {
            debug!("Throttle cancelled");
        }
        self.stop_ticker();
    }

    /// Whether [`cancel`](Self::cancel) has been called.
    pub fn is_cancelled(&self) -> bool {
        *self.inner.cancelled.borrow()
    }

    /// Time between ticks.
    pub fn period(&self) -> Duration {
        self.inner.period
    }

    async fn next_tick(&self) {
        let mut ticker = self.inner.ticker.lock().await;
        match ticker.as_mut() {
            Some(ticker) => {
                ticker.tick().await;
            }
            None => std::future::pending().await,
        }
    }

    /// Drop the ticker unless another call is holding it.
    fn stop_ticker(&self) {
        if let Ok(mut ticker) = self.inner.ticker.try_lock() {
            if ticker.take().is_some() {
                trace!("Throttle ticker stopped");
            }
        }
    }

    #[cfg(test)]
    fn ticker_stopped(&self) -> bool {
        self.inner
            .ticker
            .try_lock()
            .map(|ticker| ticker.is_none())
            .unwrap_or(false)
    }
}

impl fmt::Debug for Throttle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Throttle")
            .field("period", &self.inner.period)
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}
