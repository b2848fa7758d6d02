//! Concurrency gate bounding simultaneously running external commands.
//!
//! Backed by a tokio semaphore, which grants permits in FIFO order, so
//! commands that queue behind a full gate are serviced in submission order.

use std::sync::atomic::{AtomicUsize, Ordering};

use tokio::sync::{AcquireError, Semaphore, SemaphorePermit};
use tracing::debug;

/// Default number of external commands allowed to run at once
pub const DEFAULT_MAX_PARALLEL: usize = 4;

/// FIFO-fair permit pool with in-flight accounting
#[derive(Debug)]
pub struct ConcurrencyGate {
    semaphore: Semaphore,
    capacity: usize,
    in_flight: AtomicUsize,
    peak: AtomicUsize,
}

impl ConcurrencyGate {
    /// Create a gate with the given capacity (clamped to at least 1)
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            semaphore: Semaphore::new(capacity),
            capacity,
            in_flight: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of permits currently held
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Highest number of permits ever held at the same time
    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    /// Wait for a permit. The permit is returned to the gate when dropped.
    pub async fn acquire(&self) -> Result<GatePermit<'_>, AcquireError> {
        if self.semaphore.available_permits() == 0 {
            debug!(
                capacity = self.capacity,
                in_flight = self.in_flight(),
                "concurrency gate full, queueing"
            );
        }

        let permit = self.semaphore.acquire().await?;
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);

        Ok(GatePermit {
            _permit: permit,
            in_flight: &self.in_flight,
        })
    }
}

impl Default for ConcurrencyGate {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_PARALLEL)
    }
}

/// A granted unit of concurrency capacity
#[derive(Debug)]
pub struct GatePermit<'a> {
    _permit: SemaphorePermit<'a>,
    in_flight: &'a AtomicUsize,
}

impl Drop for GatePermit<'_> {
    fn drop(&mut self) {
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}
