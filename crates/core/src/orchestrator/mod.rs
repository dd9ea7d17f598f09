//! Batch orchestration: the entry point callers hand a list of tasks to.
//!
//! Picks the queue concurrency for the batch, short-circuits tasks that
//! only need a copy, drives the rest through format handlers and reports
//! per-task and per-batch results through callbacks.

mod config;
mod runner;
mod types;

pub use config::OrchestratorConfig;
pub use runner::{copy_file, should_copy_directly, BatchOrchestrator};
pub use types::{
    BatchCallbacks, BatchResult, BatchTask, OrchestratorError, Statistics, TaskFailure,
    TaskOutcome, TaskSuccess,
};
