//! Reliability patterns for the pipeline
//!
//! This module provides:
//! - [`RetryPolicy`] - exponential backoff with jitter
//! - [`TaskTimeout`] - soft warning and hard limit per attempt

pub(crate) mod duration_millis;
mod retry;
mod timeout;

pub use retry::RetryPolicy;
pub use timeout::{TaskTimeout, TimeoutError};
