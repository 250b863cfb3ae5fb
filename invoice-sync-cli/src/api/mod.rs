//! Remote CRM invoice API
//!
//! A trait boundary over the five remote operations the engine needs,
//! a reqwest-backed production client, and the resilience layer (retry
//! policy and concurrency limiting) applied at the remote-call boundary.

pub mod client;
pub mod models;
pub mod resilience;

pub use client::{HttpInvoiceApi, RemoteInvoiceApi};
pub use models::{DocumentStatus, InvoiceLinePayload, InvoicePayload, RemoteErrorDetail};
pub use resilience::{ConcurrencyLimiter, RetryConfig, RetryPolicy};
