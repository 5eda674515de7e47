//! Operator endpoints for the trim loop.

use axum::{Json, extract::State, response::IntoResponse};
use chrono::{DateTime, Utc};
use http::StatusCode;
use serde::Serialize;

use crate::{AppState, db::DbError, trim::TRIM_BATCH_TASK};

/// Trigger a trim cycle outside the daily schedule.
#[tracing::instrument(name = "admin.trim.trigger", skip(state))]
pub async fn trigger_trim(State(state): State<AppState>) -> impl IntoResponse {
    let response = state.controller.manual_trigger().await;
    let code = if response.success {
        StatusCode::OK
    } else {
        StatusCode::INTERNAL_SERVER_ERROR
    };
    (code, Json(response))
}

/// Trim cycle state, for inspection and debugging.
#[derive(Debug, Serialize)]
pub struct TrimStateResponse {
    /// Run state of the in-flight cycle; absent when idle.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub run: Option<TrimRunView>,
    /// Continuation triggers currently queued.
    pub pending_batches: i64,
}

#[derive(Debug, Serialize)]
pub struct TrimRunView {
    pub started_at: DateTime<Utc>,
    pub remaining: i64,
    pub scheduled_jobs: i64,
    pub updated_at: DateTime<Utc>,
}

/// Read the persisted run state and the queued continuation count.
#[tracing::instrument(name = "admin.trim.state", skip(state))]
pub async fn trim_state(
    State(state): State<AppState>,
) -> Result<Json<TrimStateResponse>, (StatusCode, String)> {
    let run = state.db.trim_runs().get().await.map_err(internal)?;
    let pending_batches = state
        .db
        .scheduled_tasks()
        .count_pending(TRIM_BATCH_TASK)
        .await
        .map_err(internal)?;

    Ok(Json(TrimStateResponse {
        run: run.map(|r| TrimRunView {
            started_at: r.started_at,
            remaining: r.remaining,
            scheduled_jobs: r.scheduled_jobs,
            updated_at: r.updated_at,
        }),
        pending_batches,
    }))
}

fn internal(e: DbError) -> (StatusCode, String) {
    (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
}
