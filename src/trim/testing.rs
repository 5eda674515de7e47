//! In-memory fakes for the trim loop's collaborators.
//!
//! The fakes stand in for the repository traits so controller and executor
//! behavior can be tested without a database. Store methods yield to the
//! runtime before touching state, which is enough for joined activations to
//! interleave the way real I/O would.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;

use super::{BatchExecutor, TrimController, TrimLock};
use crate::{
    config::TrimConfig,
    db::{DbError, DbResult, InteractionRepo, LeaseRepo, TrimRunRepo},
    models::{Interaction, NewInteraction, TrimRun},
    scheduler::TaskScheduler,
};

/// A small threshold set so tests stay fast: cap 150, target 100, batch 10.
pub fn small_config() -> TrimConfig {
    TrimConfig {
        cap: 150,
        target: 100,
        batch_size: 10,
        max_runtime_secs: 60,
        schedule_offset_minutes: 30,
        spacing_secs: 60,
        poll_secs: 1,
    }
}

/// Interaction store over a mutex-guarded vec.
#[derive(Default)]
pub struct MemoryInteractions {
    rows: Mutex<Vec<Interaction>>,
    fail: Mutex<Option<String>>,
}

impl MemoryInteractions {
    /// Seed `anonymous` ownerless rows and `owned` rows with owners, with
    /// strictly increasing `updated_at` in insertion order.
    pub fn seeded(anonymous: usize, owned: usize) -> Self {
        let store = Self::default();
        {
            let mut rows = store.rows.lock().unwrap();
            let base = Utc::now() - Duration::days(30);
            for i in 0..anonymous {
                rows.push(Self::row(None, base + Duration::seconds(i as i64)));
            }
            for i in 0..owned {
                rows.push(Self::row(
                    Some(Uuid::new_v4()),
                    base + Duration::seconds((anonymous + i) as i64),
                ));
            }
        }
        store
    }

    fn row(owner_id: Option<Uuid>, updated_at: DateTime<Utc>) -> Interaction {
        Interaction {
            id: Uuid::new_v4(),
            owner_id,
            kind: "page_view".to_string(),
            body: "{}".to_string(),
            created_at: updated_at,
            updated_at,
        }
    }

    /// Make every subsequent call fail with the given message.
    pub fn set_failing(&self, message: &str) {
        *self.fail.lock().unwrap() = Some(message.to_string());
    }

    pub fn clear_failing(&self) {
        *self.fail.lock().unwrap() = None;
    }

    /// Copy of the current rows, in insertion order.
    pub fn snapshot(&self) -> Vec<Interaction> {
        self.rows.lock().unwrap().clone()
    }

    fn check(&self) -> DbResult<()> {
        match self.fail.lock().unwrap().as_ref() {
            Some(message) => Err(DbError::Internal(message.clone())),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl InteractionRepo for MemoryInteractions {
    async fn create(&self, input: NewInteraction) -> DbResult<Interaction> {
        tokio::task::yield_now().await;
        self.check()?;
        let now = Utc::now();
        let row = Interaction {
            id: Uuid::new_v4(),
            owner_id: input.owner_id,
            kind: input.kind,
            body: input.body,
            created_at: now,
            updated_at: input.updated_at.unwrap_or(now),
        };
        self.rows.lock().unwrap().push(row.clone());
        Ok(row)
    }

    async fn count_anonymous(&self) -> DbResult<i64> {
        tokio::task::yield_now().await;
        self.check()?;
        let rows = self.rows.lock().unwrap();
        Ok(rows.iter().filter(|r| r.owner_id.is_none()).count() as i64)
    }

    async fn count_owned(&self) -> DbResult<i64> {
        tokio::task::yield_now().await;
        self.check()?;
        let rows = self.rows.lock().unwrap();
        Ok(rows.iter().filter(|r| r.owner_id.is_some()).count() as i64)
    }

    async fn delete_oldest_anonymous(&self, limit: u32) -> DbResult<u64> {
        tokio::task::yield_now().await;
        self.check()?;
        let mut rows = self.rows.lock().unwrap();

        let mut victims: Vec<(DateTime<Utc>, Uuid)> = rows
            .iter()
            .filter(|r| r.owner_id.is_none())
            .map(|r| (r.updated_at, r.id))
            .collect();
        victims.sort();
        victims.truncate(limit as usize);

        let victim_ids: std::collections::HashSet<Uuid> =
            victims.into_iter().map(|(_, id)| id).collect();
        let before = rows.len();
        rows.retain(|r| !victim_ids.contains(&r.id));

        Ok((before - rows.len()) as u64)
    }
}

/// Single-slot run-state store.
#[derive(Default)]
pub struct MemoryTrimRuns {
    run: Mutex<Option<TrimRun>>,
}

impl MemoryTrimRuns {
    pub fn current(&self) -> Option<TrimRun> {
        self.run.lock().unwrap().clone()
    }

    /// Overwrite the run state directly, bypassing the trait.
    pub fn force(&self, run: TrimRun) {
        *self.run.lock().unwrap() = Some(run);
    }
}

#[async_trait]
impl TrimRunRepo for MemoryTrimRuns {
    async fn get(&self) -> DbResult<Option<TrimRun>> {
        tokio::task::yield_now().await;
        Ok(self.run.lock().unwrap().clone())
    }

    async fn put(&self, run: &TrimRun) -> DbResult<()> {
        tokio::task::yield_now().await;
        *self.run.lock().unwrap() = Some(run.clone());
        Ok(())
    }

    async fn clear(&self) -> DbResult<()> {
        tokio::task::yield_now().await;
        *self.run.lock().unwrap() = None;
        Ok(())
    }
}

/// What a fake scheduler recorded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedTask {
    pub name: String,
    pub run_at: DateTime<Utc>,
    pub interval_secs: Option<i64>,
}

/// Scheduler that records requests instead of firing anything.
#[derive(Default)]
pub struct MemoryScheduler {
    entries: Mutex<Vec<RecordedTask>>,
}

impl MemoryScheduler {
    /// Number of recorded entries with the given name.
    pub fn scheduled(&self, name: &str) -> usize {
        self.entries
            .lock()
            .unwrap()
            .iter()
            .filter(|e| e.name == name)
            .count()
    }

    /// All recorded entries, in scheduling order.
    pub fn entries(&self) -> Vec<RecordedTask> {
        self.entries.lock().unwrap().clone()
    }
}

#[async_trait]
impl TaskScheduler for MemoryScheduler {
    async fn schedule_once(&self, name: &str, run_at: DateTime<Utc>) -> DbResult<()> {
        self.entries.lock().unwrap().push(RecordedTask {
            name: name.to_string(),
            run_at,
            interval_secs: None,
        });
        Ok(())
    }

    async fn schedule_recurring(
        &self,
        name: &str,
        interval_secs: i64,
        first_run_at: DateTime<Utc>,
    ) -> DbResult<()> {
        self.entries.lock().unwrap().push(RecordedTask {
            name: name.to_string(),
            run_at: first_run_at,
            interval_secs: Some(interval_secs),
        });
        Ok(())
    }

    async fn cancel_all(&self, name: &str) -> DbResult<u64> {
        let mut entries = self.entries.lock().unwrap();
        let before = entries.len();
        entries.retain(|e| e.name != name);
        Ok((before - entries.len()) as u64)
    }

    async fn is_any_scheduled(&self, name: &str) -> DbResult<bool> {
        Ok(self.scheduled(name) > 0)
    }
}

/// Lease store with wall-clock TTL expiry.
#[derive(Default)]
pub struct MemoryLeases {
    held: Mutex<HashMap<String, DateTime<Utc>>>,
}

#[async_trait]
impl LeaseRepo for MemoryLeases {
    async fn try_acquire(&self, name: &str, ttl: Duration) -> DbResult<bool> {
        let mut held = self.held.lock().unwrap();
        let now = Utc::now();
        match held.get(name) {
            Some(expires_at) if *expires_at > now => Ok(false),
            _ => {
                held.insert(name.to_string(), now + ttl);
                Ok(true)
            }
        }
    }

    async fn release(&self, name: &str) -> DbResult<()> {
        self.held.lock().unwrap().remove(name);
        Ok(())
    }
}

/// A controller and executor wired to shared in-memory fakes.
pub struct TrimHarness {
    pub interactions: Arc<MemoryInteractions>,
    pub trim_runs: Arc<MemoryTrimRuns>,
    pub scheduler: Arc<MemoryScheduler>,
    pub leases: Arc<MemoryLeases>,
    pub controller: TrimController,
    pub executor: BatchExecutor,
}

impl TrimHarness {
    pub fn new(config: TrimConfig, anonymous: usize, owned: usize) -> Self {
        let interactions = Arc::new(MemoryInteractions::seeded(anonymous, owned));
        let trim_runs = Arc::new(MemoryTrimRuns::default());
        let scheduler = Arc::new(MemoryScheduler::default());
        let leases = Arc::new(MemoryLeases::default());

        let controller = TrimController::new(
            Arc::clone(&interactions) as Arc<dyn InteractionRepo>,
            Arc::clone(&trim_runs) as Arc<dyn TrimRunRepo>,
            Arc::clone(&scheduler) as Arc<dyn TaskScheduler>,
            config.clone(),
        );
        let lock = TrimLock::new(
            Arc::clone(&leases) as Arc<dyn LeaseRepo>,
            config.max_runtime_secs,
        );
        let executor = BatchExecutor::new(
            Arc::clone(&interactions) as Arc<dyn InteractionRepo>,
            Arc::clone(&trim_runs) as Arc<dyn TrimRunRepo>,
            Arc::clone(&scheduler) as Arc<dyn TaskScheduler>,
            lock,
            config,
        );

        Self {
            interactions,
            trim_runs,
            scheduler,
            leases,
            controller,
            executor,
        }
    }

    /// Append anonymous rows with strictly increasing `updated_at`,
    /// returning their ids oldest-first.
    pub async fn seed_anonymous(&self, count: usize) -> Vec<Uuid> {
        let base = Utc::now() - Duration::hours(1);
        let mut ids = Vec::with_capacity(count);
        for i in 0..count {
            let row = self
                .interactions
                .create(NewInteraction {
                    owner_id: None,
                    kind: "page_view".to_string(),
                    body: "{}".to_string(),
                    updated_at: Some(base + Duration::seconds(i as i64)),
                })
                .await
                .unwrap();
            ids.push(row.id);
        }
        ids
    }

    /// Take the named lease out from under the executor.
    pub async fn hold_lock(&self, name: &str) {
        assert!(
            self.leases
                .try_acquire(name, Duration::minutes(10))
                .await
                .unwrap()
        );
    }

    /// Overwrite the persisted `scheduled_jobs` counter.
    pub fn force_scheduled_jobs(&self, scheduled_jobs: i64) {
        let current = self.trim_runs.current().expect("run state present");
        self.trim_runs.force(TrimRun {
            scheduled_jobs,
            ..current
        });
    }
}
