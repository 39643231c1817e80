//! Reliability patterns for outbox delivery
//!
//! This module provides:
//! - [`BackoffPolicy`] - Capped exponential backoff and the dead-letter threshold

mod retry;

pub(crate) use retry::duration_millis;
pub use retry::BackoffPolicy;
