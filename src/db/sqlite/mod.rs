mod common;
mod interactions;
mod leases;
mod settings;
mod tasks;
mod trim_runs;

pub use interactions::SqliteInteractionRepo;
pub use leases::SqliteLeaseRepo;
pub use settings::SqliteSettingRepo;
pub use tasks::SqliteScheduledTaskRepo;
pub use trim_runs::SqliteTrimRunRepo;
