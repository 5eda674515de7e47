//! End-to-end trim cycle tests over a real SQLite store.
//!
//! These wire the controller and executor to the production repositories,
//! the database-backed scheduler, and the persisted lease, then drive a
//! whole cycle the way scheduled activations would.

use std::sync::Arc;

use chrono::{Duration, Utc};
use uuid::Uuid;

use crate::{
    config::TrimConfig,
    db::{DbPool, tests::harness::create_test_db},
    models::NewInteraction,
    scheduler::{DbScheduler, TaskScheduler},
    trim::{
        BatchExecutor, BatchOutcome, TRIM_BATCH_TASK, TRIM_LOCK_NAME, TrimController, TrimLock,
    },
};

struct E2e {
    db: Arc<DbPool>,
    controller: TrimController,
    executor: BatchExecutor,
}

async fn setup(config: TrimConfig, anonymous: usize, owned: usize) -> E2e {
    let (db, _pool) = create_test_db().await;
    let db = Arc::new(db);

    let base = Utc::now() - Duration::days(7);
    for i in 0..anonymous {
        db.interactions()
            .create(NewInteraction {
                owner_id: None,
                kind: "page_view".to_string(),
                body: "{}".to_string(),
                updated_at: Some(base + Duration::seconds(i as i64)),
            })
            .await
            .unwrap();
    }
    for _ in 0..owned {
        db.interactions()
            .create(NewInteraction {
                owner_id: Some(Uuid::new_v4()),
                kind: "api_call".to_string(),
                body: "{}".to_string(),
                updated_at: Some(base),
            })
            .await
            .unwrap();
    }

    let scheduler: Arc<dyn TaskScheduler> = Arc::new(DbScheduler::new(db.scheduled_tasks()));
    let controller = TrimController::new(
        db.interactions(),
        db.trim_runs(),
        Arc::clone(&scheduler),
        config.clone(),
    );
    let lock = TrimLock::new(db.leases(), config.max_runtime_secs);
    let executor = BatchExecutor::new(
        db.interactions(),
        db.trim_runs(),
        scheduler,
        lock,
        config,
    );

    E2e {
        db,
        controller,
        executor,
    }
}

fn small_config() -> TrimConfig {
    TrimConfig {
        cap: 120,
        target: 100,
        batch_size: 10,
        max_runtime_secs: 60,
        schedule_offset_minutes: 30,
        spacing_secs: 0,
        poll_secs: 1,
    }
}

#[tokio::test]
async fn test_trim_cycle_converges_end_to_end() {
    let e2e = setup(small_config(), 130, 7).await;

    let started = e2e.controller.start_cycle().await.unwrap();
    assert_eq!(started.scheduled, 3);
    assert_eq!(
        e2e.db
            .scheduled_tasks()
            .count_pending(TRIM_BATCH_TASK)
            .await
            .unwrap(),
        3
    );

    let run = e2e.db.trim_runs().get().await.unwrap().expect("cycle open");
    assert_eq!(run.remaining, 130);
    assert_eq!(run.scheduled_jobs, 3);

    let mut activations = 0;
    loop {
        let result = e2e.executor.run_batch().await.unwrap();
        assert_ne!(result.outcome, BatchOutcome::Skipped);
        activations += 1;
        assert!(activations <= 10, "trim failed to converge");
        if result.outcome == BatchOutcome::TargetReached {
            break;
        }
    }

    assert_eq!(activations, 3);
    assert_eq!(e2e.db.interactions().count_anonymous().await.unwrap(), 100);
    assert_eq!(e2e.db.interactions().count_owned().await.unwrap(), 7);
    // The cycle left nothing behind: no run state, no queued continuations.
    assert!(e2e.db.trim_runs().get().await.unwrap().is_none());
    assert_eq!(
        e2e.db
            .scheduled_tasks()
            .count_pending(TRIM_BATCH_TASK)
            .await
            .unwrap(),
        0
    );
}

#[tokio::test]
async fn test_idle_cycle_end_to_end() {
    let e2e = setup(small_config(), 50, 2).await;

    let response = e2e.controller.manual_trigger().await;
    assert!(response.success);
    let result = response.result.unwrap();
    assert_eq!(result.scheduled, 0);
    assert_eq!(result.remaining, 50);

    assert!(e2e.db.trim_runs().get().await.unwrap().is_none());
    assert_eq!(
        e2e.db
            .scheduled_tasks()
            .count_pending(TRIM_BATCH_TASK)
            .await
            .unwrap(),
        0
    );
}

#[tokio::test]
async fn test_persisted_lease_blocks_second_activation() {
    let e2e = setup(small_config(), 130, 0).await;
    e2e.controller.start_cycle().await.unwrap();

    // Hold the lease the way a concurrent activation would.
    assert!(
        e2e.db
            .leases()
            .try_acquire(TRIM_LOCK_NAME, Duration::minutes(5))
            .await
            .unwrap()
    );

    let result = e2e.executor.run_batch().await.unwrap();
    assert_eq!(result.outcome, BatchOutcome::Skipped);
    assert_eq!(e2e.db.interactions().count_anonymous().await.unwrap(), 130);

    // Released, the next activation makes progress again.
    e2e.db.leases().release(TRIM_LOCK_NAME).await.unwrap();
    let result = e2e.executor.run_batch().await.unwrap();
    assert_eq!(result.outcome, BatchOutcome::Trimmed);
    assert_eq!(result.deleted, 10);
}

#[tokio::test]
async fn test_broken_chain_self_heals_end_to_end() {
    let e2e = setup(small_config(), 130, 0).await;
    e2e.controller.start_cycle().await.unwrap();

    // Wipe the queued continuations and the pending count, as if the
    // scheduler lost the chain.
    e2e.db
        .scheduled_tasks()
        .cancel_all(TRIM_BATCH_TASK)
        .await
        .unwrap();
    let mut run = e2e.db.trim_runs().get().await.unwrap().unwrap();
    run.scheduled_jobs = 0;
    e2e.db.trim_runs().put(&run).await.unwrap();

    let result = e2e.executor.run_batch().await.unwrap();
    assert_eq!(result.outcome, BatchOutcome::Trimmed);

    // Exactly one continuation was re-armed, so the cycle stays alive.
    assert_eq!(
        e2e.db
            .scheduled_tasks()
            .count_pending(TRIM_BATCH_TASK)
            .await
            .unwrap(),
        1
    );
}
