use async_trait::async_trait;
use sqlx::{PgPool, Row};

use crate::{
    db::{error::DbResult, repos::TrimRunRepo},
    models::TrimRun,
};

pub struct PostgresTrimRunRepo {
    pool: PgPool,
}

impl PostgresTrimRunRepo {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TrimRunRepo for PostgresTrimRunRepo {
    async fn get(&self) -> DbResult<Option<TrimRun>> {
        let row = sqlx::query(
            "SELECT started_at, remaining, scheduled_jobs, updated_at FROM trim_runs WHERE id = 1",
        )
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|row| TrimRun {
            started_at: row.get("started_at"),
            remaining: row.get("remaining"),
            scheduled_jobs: row.get("scheduled_jobs"),
            updated_at: row.get("updated_at"),
        }))
    }

    async fn put(&self, run: &TrimRun) -> DbResult<()> {
        sqlx::query(
            r#"
            INSERT INTO trim_runs (id, started_at, remaining, scheduled_jobs, updated_at)
            VALUES (1, $1, $2, $3, $4)
            ON CONFLICT (id) DO UPDATE SET
                started_at = excluded.started_at,
                remaining = excluded.remaining,
                scheduled_jobs = excluded.scheduled_jobs,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(run.started_at)
        .bind(run.remaining)
        .bind(run.scheduled_jobs)
        .bind(run.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn clear(&self) -> DbResult<()> {
        sqlx::query("DELETE FROM trim_runs WHERE id = 1")
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
