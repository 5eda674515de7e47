#[cfg(feature = "database-sqlite")]
mod trim_e2e;
