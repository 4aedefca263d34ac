//! Floodgate - Admission Control Primitives
//!
//! This crate provides in-process rate limiters that decide, under concurrent
//! callers, whether and when an action may proceed: a fixed-window throttle,
//! a leaky bucket and a token bucket, plus a slack-aware pacer.

pub mod config;
pub mod error;
pub mod ratelimit;

pub use error::{FloodgateError, Result};
