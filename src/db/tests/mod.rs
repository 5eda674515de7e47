//! Repository tests against real databases.
//!
//! SQLite tests run against fast in-memory databases with the production
//! migrations applied, so the schema under test is the schema that ships.
