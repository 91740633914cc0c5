//! Bounded worker pool
//!
//! A fixed number of slots backed by a semaphore. A slot is held for the
//! whole pipeline run and returned when the [`PoolSlot`] is dropped.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio_util::sync::CancellationToken;

#[derive(Debug, Default)]
struct Gauge {
    active: AtomicUsize,
    peak: AtomicUsize,
}

impl Gauge {
    fn enter(&self) {
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
    }

    fn leave(&self) {
        self.active.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Fixed-capacity pool of build slots
#[derive(Debug, Clone)]
pub struct BoundedPool {
    semaphore: Arc<Semaphore>,
    capacity: usize,
    gauge: Arc<Gauge>,
}

impl BoundedPool {
    /// Create a pool with `capacity` slots (at least one)
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            semaphore: Arc::new(Semaphore::new(capacity)),
            capacity,
            gauge: Arc::new(Gauge::default()),
        }
    }

    /// Wait for a free slot; `None` once `stop` is cancelled
    pub async fn acquire(&self, stop: &CancellationToken) -> Option<PoolSlot> {
        if stop.is_cancelled() {
            return None;
        }
        let permit = tokio::select! {
            biased;
            () = stop.cancelled() => return None,
            permit = self.semaphore.clone().acquire_owned() => permit.ok()?,
        };
        Some(self.slot(permit))
    }

    /// Take a slot without waiting
    pub fn try_acquire(&self) -> Option<PoolSlot> {
        let permit = self.semaphore.clone().try_acquire_owned().ok()?;
        Some(self.slot(permit))
    }

    fn slot(&self, permit: OwnedSemaphorePermit) -> PoolSlot {
        self.gauge.enter();
        PoolSlot {
            _permit: permit,
            gauge: Arc::clone(&self.gauge),
        }
    }

    /// Total number of slots
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Slots currently held
    pub fn active(&self) -> usize {
        self.gauge.active.load(Ordering::SeqCst)
    }

    /// Highest number of slots held at once
    pub fn peak(&self) -> usize {
        self.gauge.peak.load(Ordering::SeqCst)
    }

    /// Slots currently free
    pub fn available(&self) -> usize {
        self.semaphore.available_permits()
    }
}

/// A held pool slot, released on drop
#[derive(Debug)]
pub struct PoolSlot {
    _permit: OwnedSemaphorePermit,
    gauge: Arc<Gauge>,
}

impl Drop for PoolSlot {
    fn drop(&mut self) {
        self.gauge.leave();
    }
}
