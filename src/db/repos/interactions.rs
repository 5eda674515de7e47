use async_trait::async_trait;

use crate::{
    db::error::DbResult,
    models::{Interaction, NewInteraction},
};

#[async_trait]
pub trait InteractionRepo: Send + Sync {
    /// Insert a new interaction record.
    async fn create(&self, input: NewInteraction) -> DbResult<Interaction>;

    /// Count interactions with no owner.
    async fn count_anonymous(&self) -> DbResult<i64>;

    /// Count interactions attached to an identified owner.
    async fn count_owned(&self) -> DbResult<i64>;

    // ==================== Trim Operations ====================

    /// Delete up to `limit` anonymous interactions, oldest first by
    /// `updated_at` with `id` as the tie-break for rows sharing a
    /// timestamp. Owned interactions are never touched.
    ///
    /// Returns the number of rows actually deleted, which may be less
    /// than `limit` when fewer rows qualify.
    async fn delete_oldest_anonymous(&self, limit: u32) -> DbResult<u64>;
}
