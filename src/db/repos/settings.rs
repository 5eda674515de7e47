use async_trait::async_trait;

use crate::db::error::DbResult;

/// Key/value settings editable by operators at runtime.
#[async_trait]
pub trait SettingRepo: Send + Sync {
    async fn get(&self, key: &str) -> DbResult<Option<String>>;

    async fn set(&self, key: &str, value: &str) -> DbResult<()>;
}
