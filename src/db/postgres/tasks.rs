use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Row};
use uuid::Uuid;

use crate::{
    db::{error::DbResult, repos::ScheduledTaskRepo},
    models::ScheduledTask,
};

pub struct PostgresScheduledTaskRepo {
    pool: PgPool,
}

impl PostgresScheduledTaskRepo {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn insert(
        &self,
        name: &str,
        run_at: DateTime<Utc>,
        interval_secs: Option<i64>,
    ) -> DbResult<ScheduledTask> {
        let id = Uuid::new_v4();
        let now = Utc::now();

        sqlx::query(
            r#"
            INSERT INTO scheduled_tasks (id, name, run_at, interval_secs, created_at)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(id)
        .bind(name)
        .bind(run_at)
        .bind(interval_secs)
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(ScheduledTask {
            id,
            name: name.to_string(),
            run_at,
            interval_secs,
            created_at: now,
        })
    }
}

#[async_trait]
impl ScheduledTaskRepo for PostgresScheduledTaskRepo {
    async fn insert_once(&self, name: &str, run_at: DateTime<Utc>) -> DbResult<ScheduledTask> {
        self.insert(name, run_at, None).await
    }

    async fn insert_recurring(
        &self,
        name: &str,
        interval_secs: i64,
        first_run_at: DateTime<Utc>,
    ) -> DbResult<ScheduledTask> {
        self.insert(name, first_run_at, Some(interval_secs)).await
    }

    async fn cancel_all(&self, name: &str) -> DbResult<u64> {
        let result = sqlx::query("DELETE FROM scheduled_tasks WHERE name = $1")
            .bind(name)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    async fn count_pending(&self, name: &str) -> DbResult<i64> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM scheduled_tasks WHERE name = $1")
                .bind(name)
                .fetch_one(&self.pool)
                .await?;
        Ok(count)
    }

    async fn due(&self, now: DateTime<Utc>, limit: u32) -> DbResult<Vec<ScheduledTask>> {
        let rows = sqlx::query(
            r#"
            SELECT id, name, run_at, interval_secs, created_at
            FROM scheduled_tasks
            WHERE run_at <= $1
            ORDER BY run_at ASC, id ASC
            LIMIT $2
            "#,
        )
        .bind(now)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| ScheduledTask {
                id: row.get("id"),
                name: row.get("name"),
                run_at: row.get("run_at"),
                interval_secs: row.get("interval_secs"),
                created_at: row.get("created_at"),
            })
            .collect())
    }

    async fn delete(&self, id: Uuid) -> DbResult<bool> {
        let result = sqlx::query("DELETE FROM scheduled_tasks WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn reschedule(&self, id: Uuid, next_run_at: DateTime<Utc>) -> DbResult<()> {
        sqlx::query("UPDATE scheduled_tasks SET run_at = $1 WHERE id = $2")
            .bind(next_run_at)
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
