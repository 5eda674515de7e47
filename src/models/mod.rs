//! Domain types shared across the service.

use chrono::{DateTime, Utc};
use uuid::Uuid;

/// A single logged interaction.
///
/// `owner_id` is `None` for anonymous interactions, which are the only
/// records eligible for trimming. Owned interactions are never deleted by
/// this service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Interaction {
    pub id: Uuid,
    pub owner_id: Option<Uuid>,
    /// Free-form interaction kind recorded by the producing application
    /// ("page_view", "api_call", ...).
    pub kind: String,
    /// Opaque payload; the trim loop never inspects it.
    pub body: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Input for inserting an interaction.
#[derive(Debug, Clone, Default)]
pub struct NewInteraction {
    pub owner_id: Option<Uuid>,
    pub kind: String,
    pub body: String,
    /// Explicit timestamp for backfills; `None` means now.
    pub updated_at: Option<DateTime<Utc>>,
}

/// Persisted state of the trim cycle currently in flight.
///
/// Stored as a single self-replacing row; absence is the idle state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrimRun {
    pub started_at: DateTime<Utc>,
    /// Anonymous-record count observed by the last activation.
    pub remaining: i64,
    /// Continuation triggers believed still pending.
    pub scheduled_jobs: i64,
    pub updated_at: DateTime<Utc>,
}

/// A queued scheduled task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduledTask {
    pub id: Uuid,
    pub name: String,
    pub run_at: DateTime<Utc>,
    /// Recurrence interval; `None` for single-fire tasks.
    pub interval_secs: Option<i64>,
    pub created_at: DateTime<Utc>,
}
