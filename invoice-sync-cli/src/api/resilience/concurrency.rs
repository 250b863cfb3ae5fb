//! Semaphore-based limiter bounding concurrent remote calls
//!
//! Each sync phase runs its items through this limiter so that at most
//! the configured number of remote calls is in flight at once.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use log::debug;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

/// Bounds in-flight remote calls. Cloning shares the underlying permits.
#[derive(Debug, Clone)]
pub struct ConcurrencyLimiter {
    semaphore: Arc<Semaphore>,
    max_in_flight: usize,
    acquired: Arc<AtomicU64>,
}

impl ConcurrencyLimiter {
    pub fn new(max_in_flight: usize) -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(max_in_flight.max(1))),
            max_in_flight: max_in_flight.max(1),
            acquired: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Acquire a permit, waiting if all workers are busy. The permit
    /// releases automatically when dropped.
    pub async fn acquire(&self) -> OwnedSemaphorePermit {
        if self.semaphore.available_permits() == 0 {
            debug!(
                "all {} workers busy, waiting for a permit",
                self.max_in_flight
            );
        }
        // acquire_owned only fails when the semaphore is closed, which
        // never happens here.
        let permit = self
            .semaphore
            .clone()
            .acquire_owned()
            .await
            .expect("semaphore closed");
        self.acquired.fetch_add(1, Ordering::Relaxed);
        permit
    }

    pub fn available_permits(&self) -> usize {
        self.semaphore.available_permits()
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight
    }

    /// Total permits handed out since creation.
    pub fn total_acquired(&self) -> u64 {
        self.acquired.load(Ordering::Relaxed)
    }
}
