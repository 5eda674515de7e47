use uuid::Uuid;

use crate::db::error::{DbError, DbResult};

/// Parse a UUID stored as TEXT, mapping failures to an internal error.
pub fn parse_uuid(s: &str) -> DbResult<Uuid> {
    Uuid::parse_str(s).map_err(|e| DbError::Internal(format!("invalid uuid {s:?}: {e}")))
}
