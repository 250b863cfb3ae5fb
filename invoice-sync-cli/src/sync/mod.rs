//! Reconciliation engine
//!
//! Plans the minimal create/update/remove set from the parsed groups and
//! the stored links, resolves business codes against the local mirror,
//! executes the plan against the remote API in three bounded-concurrency
//! phases, and maps failures back to spreadsheet rows.

pub mod executor;
pub mod planner;
pub mod report;
pub mod resolver;
pub mod runner;
pub mod types;

pub use executor::SyncExecutor;
pub use planner::build_sync_plan;
pub use resolver::ReferenceMaps;
pub use runner::JobRunner;
pub use types::{ItemStatus, JobParams, RemovalMode, SyncOutcome, SyncPlan, SyncResultItem};
