mod interactions;
mod leases;
mod settings;
mod tasks;
mod trim_runs;

pub use interactions::PostgresInteractionRepo;
pub use leases::PostgresLeaseRepo;
pub use settings::PostgresSettingRepo;
pub use tasks::PostgresScheduledTaskRepo;
pub use trim_runs::PostgresTrimRunRepo;
