use async_trait::async_trait;
use chrono::Utc;
use sqlx::PgPool;
use uuid::Uuid;

use crate::{
    db::{error::DbResult, repos::InteractionRepo},
    models::{Interaction, NewInteraction},
};

pub struct PostgresInteractionRepo {
    pool: PgPool,
}

impl PostgresInteractionRepo {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl InteractionRepo for PostgresInteractionRepo {
    async fn create(&self, input: NewInteraction) -> DbResult<Interaction> {
        let id = Uuid::new_v4();
        let now = Utc::now();
        let updated_at = input.updated_at.unwrap_or(now);

        sqlx::query(
            r#"
            INSERT INTO interactions (id, owner_id, kind, body, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(id)
        .bind(input.owner_id)
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
        // Efficient batched deletion using ctid, same shape as the SQLite
        // subquery variant.
        let result = sqlx::query(
            r#"
            DELETE FROM interactions
            WHERE ctid IN (
                SELECT ctid FROM interactions
                WHERE owner_id IS NULL
                ORDER BY updated_at ASC, id ASC
                LIMIT $1
            )
            "#,
        )
        .bind(limit as i64)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }
}
