use std::sync::Arc;

use chrono::{Duration, Utc};
use serde::Serialize;

use super::TRIM_BATCH_TASK;
use crate::{
    config::TrimConfig,
    db::{DbResult, InteractionRepo, TrimRunRepo},
    models::TrimRun,
    scheduler::TaskScheduler,
};

/// Result of a cycle-start activation.
#[derive(Debug, Clone, Serialize)]
pub struct TrimCycleResult {
    /// Rows deleted by this activation. Always 0: deletion happens in the
    /// batch continuations, never here.
    pub deleted: u64,
    /// Anonymous-record count observed.
    pub remaining: u64,
    pub cap: u64,
    pub target: u64,
    /// Continuation triggers scheduled for this cycle.
    pub scheduled: u64,
}

/// Operator-facing wrapper for a manually triggered cycle.
#[derive(Debug, Clone, Serialize)]
pub struct ManualTrimResponse {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<TrimCycleResult>,
}

/// Decides whether trimming is needed and fans the work out into
/// single-fire batch continuations.
pub struct TrimController {
    interactions: Arc<dyn InteractionRepo>,
    trim_runs: Arc<dyn TrimRunRepo>,
    scheduler: Arc<dyn TaskScheduler>,
    config: TrimConfig,
}

impl TrimController {
    pub fn new(
        interactions: Arc<dyn InteractionRepo>,
        trim_runs: Arc<dyn TrimRunRepo>,
        scheduler: Arc<dyn TaskScheduler>,
        config: TrimConfig,
    ) -> Self {
        Self {
            interactions,
            trim_runs,
            scheduler,
            config,
        }
    }

    /// Begin a trim cycle if the anonymous population exceeds the cap.
    ///
    /// Stray continuations from a crashed or superseded cycle are cleared
    /// first, so the chain scheduled here is the only one in flight.
    pub async fn start_cycle(&self) -> DbResult<TrimCycleResult> {
        self.scheduler.cancel_all(TRIM_BATCH_TASK).await?;

        let cap = self.config.cap;
        let target = self.config.target;

        let count = self.interactions.count_anonymous().await?;
        if count <= cap as i64 {
            self.trim_runs.clear().await?;
            tracing::debug!(
                anonymous = count,
                cap,
                "anonymous interaction log within cap, nothing to trim"
            );
            return Ok(TrimCycleResult {
                deleted: 0,
                remaining: count.max(0) as u64,
                cap,
                target,
                scheduled: 0,
            });
        }

        let rows_to_delete = (count.max(0) as u64).saturating_sub(target);
        let batches = rows_to_delete.div_ceil(self.config.batch_size as u64);

        let now = Utc::now();
        for i in 0..batches {
            // Spread the chain out so the triggers don't all fire in the
            // same instant; correctness does not depend on the spacing.
            let run_at = now + Duration::seconds(self.config.spacing_secs * (i as i64 + 1));
            self.scheduler.schedule_once(TRIM_BATCH_TASK, run_at).await?;
        }

        self.trim_runs
            .put(&TrimRun {
                started_at: now,
                remaining: count,
                scheduled_jobs: batches as i64,
                updated_at: now,
            })
            .await?;

        tracing::info!(
            anonymous = count,
            cap,
            target,
            batches,
            "trim cycle started"
        );

        Ok(TrimCycleResult {
            deleted: 0,
            remaining: count as u64,
            cap,
            target,
            scheduled: batches,
        })
    }

    /// Operator-initiated cycle start, outside the daily schedule.
    pub async fn manual_trigger(&self) -> ManualTrimResponse {
        match self.start_cycle().await {
            Ok(result) => {
                let message = if result.scheduled == 0 {
                    format!(
                        "{} anonymous interactions recorded, nothing to trim",
                        result.remaining
                    )
                } else {
                    format!(
                        "trim cycle started, {} batches scheduled",
                        result.scheduled
                    )
                };
                ManualTrimResponse {
                    success: true,
                    message,
                    result: Some(result),
                }
            }
            Err(e) => ManualTrimResponse {
                success: false,
                message: format!("trim cycle failed to start: {e}"),
                result: None,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::testing::{TrimHarness, small_config};
    use super::*;

    #[tokio::test]
    async fn test_start_cycle_noop_under_cap() {
        // cap 150, target 100
        let h = TrimHarness::new(small_config(), 120, 5);

        for _ in 0..3 {
            let result = h.controller.start_cycle().await.unwrap();
            assert_eq!(result.deleted, 0);
            assert_eq!(result.remaining, 120);
            assert_eq!(result.scheduled, 0);
        }

        // Idle state: no run state, no continuations, log untouched.
        assert!(h.trim_runs.current().is_none());
        assert_eq!(h.scheduler.scheduled(TRIM_BATCH_TASK), 0);
        assert_eq!(h.interactions.count_anonymous().await.unwrap(), 120);
    }

    #[tokio::test]
    async fn test_start_cycle_at_exact_cap_is_idle() {
        let h = TrimHarness::new(small_config(), 150, 0);
        let result = h.controller.start_cycle().await.unwrap();
        assert_eq!(result.scheduled, 0);
        assert!(h.trim_runs.current().is_none());
    }

    #[tokio::test]
    async fn test_start_cycle_schedules_batch_chain() {
        // 165 anonymous, target 100, batch 10 -> ceil(65 / 10) = 7 batches.
        let h = TrimHarness::new(small_config(), 165, 5);

        let result = h.controller.start_cycle().await.unwrap();
        assert_eq!(result.deleted, 0);
        assert_eq!(result.remaining, 165);
        assert_eq!(result.scheduled, 7);

        assert_eq!(h.scheduler.scheduled(TRIM_BATCH_TASK), 7);

        let run = h.trim_runs.current().expect("run state persisted");
        assert_eq!(run.remaining, 165);
        assert_eq!(run.scheduled_jobs, 7);

        // Nothing is deleted by the controller itself.
        assert_eq!(h.interactions.count_anonymous().await.unwrap(), 165);
    }

    #[tokio::test]
    async fn test_start_cycle_spaces_triggers_apart() {
        let h = TrimHarness::new(small_config(), 165, 0);
        h.controller.start_cycle().await.unwrap();

        let entries = h.scheduler.entries();
        assert_eq!(entries.len(), 7);
        for pair in entries.windows(2) {
            let gap = pair[1].run_at - pair[0].run_at;
            assert_eq!(gap.num_seconds(), small_config().spacing_secs);
        }
    }

    #[tokio::test]
    async fn test_start_cycle_clears_stray_continuations() {
        let h = TrimHarness::new(small_config(), 120, 0);

        // Leftovers from a cycle that never completed.
        h.scheduler
            .schedule_once(TRIM_BATCH_TASK, Utc::now())
            .await
            .unwrap();
        h.scheduler
            .schedule_once(TRIM_BATCH_TASK, Utc::now())
            .await
            .unwrap();

        h.controller.start_cycle().await.unwrap();
        assert_eq!(h.scheduler.scheduled(TRIM_BATCH_TASK), 0);
    }

    #[tokio::test]
    async fn test_start_cycle_concrete_scenario() {
        // 151500 over cap 150000 / target 100000 / batch 1000 -> 52 batches.
        let config = TrimConfig {
            cap: 150_000,
            target: 100_000,
            batch_size: 1000,
            ..small_config()
        };
        let h = TrimHarness::new(config, 151_500, 0);

        let result = h.controller.start_cycle().await.unwrap();
        assert_eq!(result.scheduled, 52);

        let run = h.trim_runs.current().unwrap();
        assert_eq!(run.remaining, 151_500);
        assert_eq!(run.scheduled_jobs, 52);
    }

    #[tokio::test]
    async fn test_manual_trigger_reports_success() {
        let h = TrimHarness::new(small_config(), 165, 0);
        let response = h.controller.manual_trigger().await;
        assert!(response.success);
        assert_eq!(response.result.unwrap().scheduled, 7);
    }

    #[tokio::test]
    async fn test_manual_trigger_reports_store_failure() {
        let h = TrimHarness::new(small_config(), 165, 0);
        h.interactions.set_failing("count unavailable");

        let response = h.controller.manual_trigger().await;
        assert!(!response.success);
        assert!(response.result.is_none());
    }
}
