use async_trait::async_trait;
use chrono::Utc;
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::{
    db::{error::DbResult, repos::InteractionRepo},
    models::{Interaction, NewInteraction},
};

pub struct SqliteInteractionRepo {
    pool: SqlitePool,
}

impl SqliteInteractionRepo {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl InteractionRepo for SqliteInteractionRepo {
    async fn create(&self, input: NewInteraction) -> DbResult<Interaction> {
        let id = Uuid::new_v4();
        let now = Utc::now();
        let updated_at = input.updated_at.unwrap_or(now);

        sqlx::query(
            r#"
            INSERT INTO interactions (id, owner_id, kind, body, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(id.to_string())
        .bind(input.owner_id.map(|o| o.to_string()))
        .bind(&input.kind)
        .bind(&input.body)
        .bind(now)
        .bind(updated_at)
        .execute(&self.pool)
        .await?;

        Ok(Interaction {
            id,
            owner_id: input.owner_id,
            kind: input.kind,
            body: input.body,
            created_at: now,
            updated_at,
        })
    }

    async fn count_anonymous(&self) -> DbResult<i64> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM interactions WHERE owner_id IS NULL")
                .fetch_one(&self.pool)
                .await?;
        Ok(count)
    }

    async fn count_owned(&self) -> DbResult<i64> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM interactions WHERE owner_id IS NOT NULL")
                .fetch_one(&self.pool)
                .await?;
        Ok(count)
    }

    async fn delete_oldest_anonymous(&self, limit: u32) -> DbResult<u64> {
        // Batch delete via subquery so the ordering and limit apply to the
        // anonymous subset only.
        let result = sqlx::query(
            r#"
            DELETE FROM interactions
            WHERE id IN (
                SELECT id FROM interactions
                WHERE owner_id IS NULL
                ORDER BY updated_at ASC, id ASC
                LIMIT ?
            )
            "#,
        )
        .bind(limit as i64)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }
}
