use std::sync::Arc;

use chrono::Duration;

use super::TRIM_LOCK_NAME;
use crate::db::{DbResult, LeaseRepo};

/// Margin added on top of the activation budget so the lease outlives any
/// batch still legitimately running.
const TTL_MARGIN_SECS: i64 = 60;

/// Advisory, non-blocking mutual exclusion for batch activations.
///
/// The lease is persisted, so it holds across processes. An activation that
/// dies without releasing leaves a lease that expires on its own after the
/// TTL; no manual recovery step exists or is needed.
#[derive(Clone)]
pub struct TrimLock {
    leases: Arc<dyn LeaseRepo>,
    ttl: Duration,
}

impl TrimLock {
    pub fn new(leases: Arc<dyn LeaseRepo>, max_runtime_secs: u64) -> Self {
        Self {
            leases,
            ttl: Duration::seconds(max_runtime_secs as i64 + TTL_MARGIN_SECS),
        }
    }

    /// Try to take the lease. Returns `false` without blocking when another
    /// activation holds it; callers skip their turn rather than wait.
    pub async fn acquire(&self) -> DbResult<bool> {
        self.leases.try_acquire(TRIM_LOCK_NAME, self.ttl).await
    }

    /// Drop the lease. Must run on every exit path of a batch that
    /// acquired it.
    pub async fn release(&self) -> DbResult<()> {
        self.leases.release(TRIM_LOCK_NAME).await
    }
}
