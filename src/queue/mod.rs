//! Bounded admission control for in-flight audits.
//!
//! At most `max_concurrent` audits run at once. Waiters are served in
//! FIFO order; abandoning a waiting submission (dropping its future)
//! relinquishes its place in line. A stalled audit occupies its slot
//! until the engine's timeout fires, but cannot starve other slots.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::debug;

/// Process-wide audit admission queue.
pub struct AuditQueue {
    semaphore: Arc<Semaphore>,
    max_concurrent: usize,
    admitted: AtomicU64,
    rejected: AtomicU64,
}

/// An occupied queue slot; the slot frees when this drops.
pub struct QueuePermit {
    _permit: OwnedSemaphorePermit,
}

/// Queue occupancy snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueStats {
    pub max_concurrent: usize,
    pub in_flight: usize,
    pub admitted_total: u64,
    pub rejected_total: u64,
}

impl AuditQueue {
    pub fn new(max_concurrent: usize) -> Self {
        let max_concurrent = max_concurrent.max(1);
        Self {
            semaphore: Arc::new(Semaphore::new(max_concurrent)),
            max_concurrent,
            admitted: AtomicU64::new(0),
            rejected: AtomicU64::new(0),
        }
    }

    /// Wait for a slot. Tokio's semaphore queues waiters fairly, so
    /// admissions happen in submission order.
    pub async fn acquire(&self) -> QueuePermit {
        let permit = self
            .semaphore
            .clone()
            .acquire_owned()
            .await
            .expect("audit queue semaphore is never closed");
        self.admitted.fetch_add(1, Ordering::Relaxed);
        debug!(
            "Audit admitted ({} of {} slots in use)",
            self.in_flight(),
            self.max_concurrent
        );
        QueuePermit { _permit: permit }
    }

    /// Take a slot only if one is free right now.
    pub fn try_acquire(&self) -> Option<QueuePermit> {
        match self.semaphore.clone().try_acquire_owned() {
            Ok(permit) => {
                self.admitted.fetch_add(1, Ordering::Relaxed);
                Some(QueuePermit { _permit: permit })
            }
            Err(_) => {
                self.rejected.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    /// Number of audits currently holding slots.
    pub fn in_flight(&self) -> usize {
        self.max_concurrent - self.semaphore.available_permits()
    }

    pub fn stats(&self) -> QueueStats {
        QueueStats {
            max_concurrent: self.max_concurrent,
            in_flight: self.in_flight(),
            admitted_total: self.admitted.load(Ordering::Relaxed),
            rejected_total: self.rejected.load(Ordering::Relaxed),
        }
    }
}
