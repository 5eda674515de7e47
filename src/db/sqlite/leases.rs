use async_trait::async_trait;
use chrono::{Duration, Utc};
use sqlx::SqlitePool;

use crate::db::{error::DbResult, repos::LeaseRepo};

pub struct SqliteLeaseRepo {
    pool: SqlitePool,
}

impl SqliteLeaseRepo {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl LeaseRepo for SqliteLeaseRepo {
    async fn try_acquire(&self, name: &str, ttl: Duration) -> DbResult<bool> {
        let now = Utc::now();
        let expires_at = now + ttl;

        // Single conditional upsert: insert wins when no row exists, the
        // DO UPDATE arm wins only when the existing lease has expired.
        // rows_affected is 0 exactly when a live lease blocked us.
        let result = sqlx::query(
            r#"
            INSERT INTO leases (name, expires_at)
            VALUES (?, ?)
            ON CONFLICT (name) DO UPDATE SET expires_at = excluded.expires_at
            WHERE leases.expires_at <= ?
            "#,
        )
        .bind(name)
        .bind(expires_at)
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn release(&self, name: &str) -> DbResult<()> {
        sqlx::query("DELETE FROM leases WHERE name = ?")
            .bind(name)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
