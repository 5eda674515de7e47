//! Scheduled-task plumbing.
//!
//! Three pieces:
//!
//! - [`TaskScheduler`], the narrow scheduling interface the trim services
//!   consume (queue a one-shot, queue a recurrence, cancel by name).
//! - [`DbScheduler`], its implementation over the scheduled_tasks table.
//! - [`start_task_dispatcher`], the worker loop that polls for due tasks
//!   and fires the named handler at-least-once.
//!
//! Handlers are dispatched by task name. There is no ordering guarantee
//! across names, and tasks that come due together race; the trim lease
//! arbitrates the executor side of that race.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};

use crate::{
    db::{DbResult, ScheduledTaskRepo, SettingRepo},
    trim::{BatchExecutor, TRIM_BATCH_TASK, TRIM_CYCLE_TASK, TrimController},
};

/// Settings key holding the hour-of-day (0-23) for the daily trim trigger.
pub const TRIM_HOUR_SETTING: &str = "trim.hour";

/// Hour used when the setting is absent or malformed.
pub const DEFAULT_TRIM_HOUR: u32 = 3;

const SECS_PER_DAY: i64 = 24 * 60 * 60;

/// How many due tasks one dispatcher pass picks up.
const DISPATCH_BATCH: u32 = 32;

/// Scheduling operations consumed by the trim controller and executor.
#[async_trait]
pub trait TaskScheduler: Send + Sync {
    /// Queue a task that fires once at `run_at`.
    async fn schedule_once(&self, name: &str, run_at: DateTime<Utc>) -> DbResult<()>;

    /// Queue a task that fires at `first_run_at` and every `interval_secs`
    /// after.
    async fn schedule_recurring(
        &self,
        name: &str,
        interval_secs: i64,
        first_run_at: DateTime<Utc>,
    ) -> DbResult<()>;

    /// Remove every queued task with the given name. Returns rows removed.
    async fn cancel_all(&self, name: &str) -> DbResult<u64>;

    /// Whether any task with the given name is queued.
    async fn is_any_scheduled(&self, name: &str) -> DbResult<bool>;
}

/// [`TaskScheduler`] backed by the scheduled_tasks table.
pub struct DbScheduler {
    tasks: Arc<dyn ScheduledTaskRepo>,
}

impl DbScheduler {
    pub fn new(tasks: Arc<dyn ScheduledTaskRepo>) -> Self {
        Self { tasks }
    }
}

#[async_trait]
impl TaskScheduler for DbScheduler {
    async fn schedule_once(&self, name: &str, run_at: DateTime<Utc>) -> DbResult<()> {
        self.tasks.insert_once(name, run_at).await?;
        Ok(())
    }

    async fn schedule_recurring(
        &self,
        name: &str,
        interval_secs: i64,
        first_run_at: DateTime<Utc>,
    ) -> DbResult<()> {
        self.tasks
            .insert_recurring(name, interval_secs, first_run_at)
            .await?;
        Ok(())
    }

    async fn cancel_all(&self, name: &str) -> DbResult<u64> {
        self.tasks.cancel_all(name).await
    }

    async fn is_any_scheduled(&self, name: &str) -> DbResult<bool> {
        Ok(self.tasks.count_pending(name).await? > 0)
    }
}

/// Next timestamp strictly after `now` that falls at `hour` plus
/// `offset_minutes`. The hour is clamped to 0-23.
pub fn next_daily_run(hour: u32, offset_minutes: i64, now: DateTime<Utc>) -> DateTime<Utc> {
    let hour = hour.min(23);
    let base = now
        .date_naive()
        .and_hms_opt(hour, 0, 0)
        .expect("clamped hour is a valid time")
        .and_utc();

    let mut run_at = base + Duration::minutes(offset_minutes);
    if run_at <= now {
        run_at += Duration::days(1);
    }
    run_at
}

/// Read the configured daily trigger hour, clamped to 0-23. Absent or
/// malformed values degrade to [`DEFAULT_TRIM_HOUR`].
pub async fn trim_hour(settings: &dyn SettingRepo) -> DbResult<u32> {
    let value = settings.get(TRIM_HOUR_SETTING).await?;
    Ok(value
        .and_then(|v| v.trim().parse::<u32>().ok())
        .map(|hour| hour.min(23))
        .unwrap_or(DEFAULT_TRIM_HOUR))
}

/// Make sure the recurring daily trim trigger is queued.
///
/// Idempotent: an already-queued trigger is left alone, so restarts don't
/// stack up duplicate dailies.
pub async fn ensure_daily_trigger(
    scheduler: &dyn TaskScheduler,
    settings: &dyn SettingRepo,
    offset_minutes: i64,
) -> DbResult<()> {
    if scheduler.is_any_scheduled(TRIM_CYCLE_TASK).await? {
        return Ok(());
    }

    let hour = trim_hour(settings).await?;
    let first_run = next_daily_run(hour, offset_minutes, Utc::now());
    scheduler
        .schedule_recurring(TRIM_CYCLE_TASK, SECS_PER_DAY, first_run)
        .await?;

    tracing::info!(hour, first_run = %first_run, "daily trim trigger scheduled");
    Ok(())
}

/// Starts the dispatcher worker as a background task.
///
/// The worker polls for due tasks at the given interval and fires their
/// handlers. It runs indefinitely until the task is cancelled.
pub async fn start_task_dispatcher(
    tasks: Arc<dyn ScheduledTaskRepo>,
    controller: Arc<TrimController>,
    executor: Arc<BatchExecutor>,
    poll_interval: std::time::Duration,
) {
    tracing::info!(
        poll_secs = poll_interval.as_secs(),
        "starting task dispatcher"
    );

    loop {
        match dispatch_due(tasks.as_ref(), &controller, &executor).await {
            Ok(0) => {}
            Ok(count) => tracing::debug!(count, "dispatched scheduled tasks"),
            Err(e) => tracing::error!(error = %e, "error dispatching scheduled tasks"),
        }

        tokio::time::sleep(poll_interval).await;
    }
}

/// Fire every task currently due.
///
/// Single-fire tasks are claimed by deletion before dispatch, so a second
/// dispatcher sharing the table cannot double-fire them. Recurring tasks
/// are pushed to their next slot first for the same reason.
async fn dispatch_due(
    tasks: &dyn ScheduledTaskRepo,
    controller: &Arc<TrimController>,
    executor: &Arc<BatchExecutor>,
) -> DbResult<usize> {
    let now = Utc::now();
    let due = tasks.due(now, DISPATCH_BATCH).await?;

    let mut dispatched = 0;
    for task in due {
        match task.interval_secs {
            Some(interval_secs) => {
                let next = next_recurrence(task.run_at, interval_secs, now);
                tasks.reschedule(task.id, next).await?;
            }
            None => {
                if !tasks.delete(task.id).await? {
                    // Another dispatcher claimed it first.
                    continue;
                }
            }
        }

        dispatched += 1;
        spawn_handler(&task.name, controller, executor);
    }

    Ok(dispatched)
}

/// Advance a recurring task past `now` in whole intervals, so a dispatcher
/// that was down for days doesn't replay every missed slot.
fn next_recurrence(run_at: DateTime<Utc>, interval_secs: i64, now: DateTime<Utc>) -> DateTime<Utc> {
    let interval = interval_secs.max(1);
    let behind = (now - run_at).num_seconds();
    if behind < 0 {
        return run_at + Duration::seconds(interval);
    }
    let steps = behind / interval + 1;
    run_at + Duration::seconds(interval * steps)
}

fn spawn_handler(name: &str, controller: &Arc<TrimController>, executor: &Arc<BatchExecutor>) {
    match name {
        TRIM_CYCLE_TASK => {
            let controller = Arc::clone(controller);
            tokio::spawn(async move {
                match controller.start_cycle().await {
                    Ok(result) => tracing::debug!(
                        remaining = result.remaining,
                        scheduled = result.scheduled,
                        "daily trim trigger handled"
                    ),
                    Err(e) => tracing::error!(error = %e, "daily trim trigger failed"),
                }
            });
        }
        TRIM_BATCH_TASK => {
            let executor = Arc::clone(executor);
            tokio::spawn(async move {
                match executor.run_batch().await {
                    Ok(result) => tracing::debug!(
                        outcome = ?result.outcome,
                        deleted = result.deleted,
                        remaining = result.remaining,
                        "trim batch handled"
                    ),
                    Err(e) => tracing::error!(error = %e, "trim batch failed"),
                }
            });
        }
        other => tracing::warn!(task = other, "no handler registered for scheduled task"),
    }
}
