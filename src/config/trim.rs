use serde::{Deserialize, Serialize};

use super::ConfigError;

/// Retention trimming configuration.
///
/// Thresholds are plain configuration rather than compiled-in constants so
/// deployments can size them to their write volume and tests can exercise
/// small populations.
///
/// # Example
///
/// ```toml
/// [trim]
/// cap = 150000
/// target = 100000
/// batch_size = 1000
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TrimConfig {
    /// Anonymous-record count above which a trim cycle starts.
    /// Default: 150000
    #[serde(default = "default_cap")]
    pub cap: u64,

    /// Count a trim cycle reduces the log to.
    /// Default: 100000
    #[serde(default = "default_target")]
    pub target: u64,

    /// Rows deleted per batch activation.
    /// Default: 1000
    #[serde(default = "default_batch_size")]
    pub batch_size: u32,

    /// Soft execution budget per activation, in seconds. The trim lease
    /// outlives this by a fixed margin so an activation can never outrun
    /// its own lock.
    /// Default: 300
    #[serde(default = "default_max_runtime_secs")]
    pub max_runtime_secs: u64,

    /// Minutes past the configured hour for the daily trigger.
    /// Default: 30
    #[serde(default = "default_schedule_offset_minutes")]
    pub schedule_offset_minutes: i64,

    /// Spacing between pre-scheduled continuation triggers, in seconds.
    /// Spreads the chain out; correctness does not depend on it.
    /// Default: 60
    #[serde(default = "default_spacing_secs")]
    pub spacing_secs: i64,

    /// Dispatcher poll interval, in seconds.
    /// Default: 5
    #[serde(default = "default_poll_secs")]
    pub poll_secs: u64,
}

impl Default for TrimConfig {
    fn default() -> Self {
        Self {
            cap: default_cap(),
            target: default_target(),
            batch_size: default_batch_size(),
            max_runtime_secs: default_max_runtime_secs(),
            schedule_offset_minutes: default_schedule_offset_minutes(),
            spacing_secs: default_spacing_secs(),
            poll_secs: default_poll_secs(),
        }
    }
}

impl TrimConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.target > self.cap {
            return Err(ConfigError::Validation(
                "trim.target cannot exceed trim.cap".into(),
            ));
        }
        if self.batch_size == 0 {
            return Err(ConfigError::Validation(
                "trim.batch_size must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

fn default_cap() -> u64 {
    150_000
}

fn default_target() -> u64 {
    100_000
}

fn default_batch_size() -> u32 {
    1000
}

fn default_max_runtime_secs() -> u64 {
    300
}

fn default_schedule_offset_minutes() -> i64 {
    30
}

fn default_spacing_secs() -> i64 {
    60
}

fn default_poll_secs() -> u64 {
    5
}
