use std::sync::Arc;

use chrono::{Duration, Utc};
use serde::Serialize;

use super::{TRIM_BATCH_TASK, TrimLock};
use crate::{
    config::TrimConfig,
    db::{DbResult, InteractionRepo, TrimRunRepo},
    models::TrimRun,
    scheduler::TaskScheduler,
};

/// How a batch activation ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchOutcome {
    /// The lease was held by another activation; nothing was done.
    Skipped,
    /// One batch was deleted and the cycle continues.
    Trimmed,
    /// The population is at or under the target; the cycle is complete.
    TargetReached,
}

/// Result of one batch activation.
#[derive(Debug, Clone, Serialize)]
pub struct BatchRunResult {
    pub outcome: BatchOutcome,
    pub deleted: u64,
    pub remaining: u64,
    pub cap: u64,
    pub target: u64,
}

/// Performs one bounded unit of trim work under the trim lease.
///
/// Each call is an independent activation: it either does its one batch and
/// releases the lease, or fails to acquire and does nothing. Activations
/// are cheap and recur, so contention is skipped, never waited out.
pub struct BatchExecutor {
    interactions: Arc<dyn InteractionRepo>,
    trim_runs: Arc<dyn TrimRunRepo>,
    scheduler: Arc<dyn TaskScheduler>,
    lock: TrimLock,
    config: TrimConfig,
}

impl BatchExecutor {
    pub fn new(
        interactions: Arc<dyn InteractionRepo>,
        trim_runs: Arc<dyn TrimRunRepo>,
        scheduler: Arc<dyn TaskScheduler>,
        lock: TrimLock,
        config: TrimConfig,
    ) -> Self {
        Self {
            interactions,
            trim_runs,
            scheduler,
            lock,
            config,
        }
    }

    /// Run one batch activation.
    pub async fn run_batch(&self) -> DbResult<BatchRunResult> {
        if !self.lock.acquire().await? {
            tracing::debug!("trim lease held by another activation, skipping batch");
            return Ok(BatchRunResult {
                outcome: BatchOutcome::Skipped,
                deleted: 0,
                remaining: 0,
                cap: self.config.cap,
                target: self.config.target,
            });
        }

        let result = self.run_locked().await;

        // The lease goes away on every exit path, store errors included.
        if let Err(e) = self.lock.release().await {
            tracing::warn!(error = %e, "failed to release trim lease");
        }

        result
    }

    async fn run_locked(&self) -> DbResult<BatchRunResult> {
        let target = self.config.target as i64;

        let count = self.interactions.count_anonymous().await?;
        if count <= target {
            return self.complete_cycle(0, count).await;
        }

        // Clamp the final batch to the excess so the cycle lands on the
        // target instead of undershooting it.
        let limit = (self.config.batch_size as i64).min(count - target) as u32;
        let deleted = self.interactions.delete_oldest_anonymous(limit).await?;
        let remaining = self.interactions.count_anonymous().await?;

        if deleted > 0 {
            tracing::info!(deleted, remaining, "trimmed anonymous interactions");
        }

        if remaining <= target {
            return self.complete_cycle(deleted, remaining).await;
        }

        let now = Utc::now();
        let (started_at, scheduled_jobs) = match self.trim_runs.get().await? {
            Some(run) => (run.started_at, (run.scheduled_jobs - 1).max(0)),
            // A continuation fired with no run state on record; carry on as
            // a chain of one.
            None => (now, 0),
        };

        self.trim_runs
            .put(&TrimRun {
                started_at,
                remaining,
                scheduled_jobs,
                updated_at: now,
            })
            .await?;

        if scheduled_jobs == 0 {
            // The pre-computed chain ran out before the target was met —
            // counts drift when deletions fall short or new anonymous rows
            // arrive mid-cycle. One more trigger keeps the cycle alive.
            let run_at = now + Duration::seconds(self.config.spacing_secs);
            self.scheduler.schedule_once(TRIM_BATCH_TASK, run_at).await?;
            tracing::info!(
                remaining,
                "continuation chain exhausted before target, re-arming one batch"
            );
        }

        Ok(BatchRunResult {
            outcome: BatchOutcome::Trimmed,
            deleted,
            remaining: remaining.max(0) as u64,
            cap: self.config.cap,
            target: self.config.target,
        })
    }

    async fn complete_cycle(&self, deleted: u64, remaining: i64) -> DbResult<BatchRunResult> {
        self.trim_runs.clear().await?;
        self.scheduler.cancel_all(TRIM_BATCH_TASK).await?;

        tracing::info!(remaining, "trim cycle complete");

        Ok(BatchRunResult {
            outcome: BatchOutcome::TargetReached,
            deleted,
            remaining: remaining.max(0) as u64,
            cap: self.config.cap,
            target: self.config.target,
        })
    }
}
