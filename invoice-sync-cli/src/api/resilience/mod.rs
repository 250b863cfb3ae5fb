//! Resilience layer for remote API calls
//!
//! A single retry/backoff policy applied at the remote-call boundary and
//! a semaphore-based limiter bounding in-flight calls per job.

pub mod concurrency;
pub mod retry;

pub use concurrency::ConcurrencyLimiter;
pub use retry::{RetryConfig, RetryPolicy};
