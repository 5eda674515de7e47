//! The retention trim control loop.
//!
//! Keeps the anonymous slice of the interaction log bounded without a
//! long-lived worker:
//!
//! 1. A daily trigger invokes [`TrimController::start_cycle`], which either
//!    no-ops (population within the cap) or fans the required work out into
//!    single-fire continuation triggers and persists run state.
//! 2. Each continuation invokes [`BatchExecutor::run_batch`], which deletes
//!    one bounded batch of the oldest anonymous records under the trim
//!    lease, updates run state, and stops the cycle once the population is
//!    back at the target.
//! 3. If the pre-computed chain runs out before the target is met, the last
//!    executor arms exactly one more continuation, so a cycle completes
//!    even when counts drift mid-flight or triggers are lost.
//!
//! Every activation runs to completion and releases its resources before
//! returning; there is no cross-activation critical section beyond the
//! lease's own TTL window.

mod controller;
mod executor;
mod lock;
#[cfg(test)]
pub(crate) mod testing;

pub use controller::{ManualTrimResponse, TrimController, TrimCycleResult};
pub use executor::{BatchExecutor, BatchOutcome, BatchRunResult};
pub use lock::TrimLock;

/// Task name of the recurring daily trigger.
pub const TRIM_CYCLE_TASK: &str = "interaction-trim";

/// Task name of single-fire batch continuations.
pub const TRIM_BATCH_TASK: &str = "interaction-trim-batch";

/// Name of the lease guarding batch execution.
pub const TRIM_LOCK_NAME: &str = "interaction-trim";
