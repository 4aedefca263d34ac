//! Admission-control primitives.
//!
//! Three independent limiters, none of which depends on another:
//! - [`Throttle`]: gates a callback behind a periodic tick
//! - [`LeakyBucket`]: discrete units draining at a fixed interval
//! - [`TokenBucket`]: continuous tokens refilling with elapsed time
//!
//! [`Pacer`] and [`Unlimited`] round out the blocking [`Limiter`] family.

mod clock;
mod leaky_bucket;
mod limiter;
mod pacer;
mod throttle;
mod token_bucket;

pub use clock::{Clock, ManualClock, SystemClock};
pub use leaky_bucket::LeakyBucket;
pub use limiter::{Limiter, Unlimited};
pub use pacer::{Pacer, PacerConfig, DEFAULT_PER, DEFAULT_SLACK};
pub use throttle::Throttle;
pub use token_bucket::TokenBucket;
