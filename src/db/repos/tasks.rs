use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::{db::error::DbResult, models::ScheduledTask};

/// Persistence for the scheduled-task queue.
///
/// Dispatch semantics live in `crate::scheduler`; this trait only covers
/// the rows.
#[async_trait]
pub trait ScheduledTaskRepo: Send + Sync {
    /// Queue a task that fires once at `run_at`.
    async fn insert_once(&self, name: &str, run_at: DateTime<Utc>) -> DbResult<ScheduledTask>;

    /// Queue a task that fires at `first_run_at` and every `interval_secs`
    /// after.
    async fn insert_recurring(
        &self,
        name: &str,
        interval_secs: i64,
        first_run_at: DateTime<Utc>,
    ) -> DbResult<ScheduledTask>;

    /// Delete every queued task with the given name. Returns rows removed.
    async fn cancel_all(&self, name: &str) -> DbResult<u64>;

    /// Count queued tasks with the given name.
    async fn count_pending(&self, name: &str) -> DbResult<i64>;

    /// Tasks whose `run_at` is at or before `now`, oldest first.
    async fn due(&self, now: DateTime<Utc>, limit: u32) -> DbResult<Vec<ScheduledTask>>;

    /// Delete a task by id. Returns whether the row was present; the
    /// dispatcher uses this as its claim on single-fire tasks.
    async fn delete(&self, id: Uuid) -> DbResult<bool>;

    /// Move a recurring task to its next fire time.
    async fn reschedule(&self, id: Uuid, next_run_at: DateTime<Utc>) -> DbResult<()>;
}
