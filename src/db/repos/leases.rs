use async_trait::async_trait;
use chrono::Duration;

use crate::db::error::DbResult;

/// Named TTL leases used for advisory mutual exclusion.
///
/// A lease whose expiry has passed counts as absent; there is no separate
/// cleanup step for leases abandoned by a dead holder.
#[async_trait]
pub trait LeaseRepo: Send + Sync {
    /// Take the named lease for `ttl` if no live lease exists.
    ///
    /// Returns `false` without blocking when the lease is already held.
    async fn try_acquire(&self, name: &str, ttl: Duration) -> DbResult<bool>;

    /// Drop the named lease unconditionally.
    async fn release(&self, name: &str) -> DbResult<()>;
}
