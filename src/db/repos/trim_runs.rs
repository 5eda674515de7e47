use async_trait::async_trait;

use crate::{db::error::DbResult, models::TrimRun};

/// Store for the single trim-cycle run-state record.
///
/// The record replaces itself atomically on every update; its absence is
/// the idle state.
#[async_trait]
pub trait TrimRunRepo: Send + Sync {
    /// Fetch the current run state, if a cycle is in flight.
    async fn get(&self) -> DbResult<Option<TrimRun>>;

    /// Replace the run state.
    async fn put(&self, run: &TrimRun) -> DbResult<()>;

    /// Delete the run state, marking the cycle complete.
    async fn clear(&self) -> DbResult<()>;
}
