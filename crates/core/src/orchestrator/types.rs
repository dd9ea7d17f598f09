//! Types for the batch orchestrator.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;

use crate::converter::TaskOptions;

/// Errors that can occur during orchestration.
#[derive(Debug, Error)]
pub enum OrchestratorError {
    /// A batch is already in progress on this orchestrator.
    #[error("a batch is already running")]
    AlreadyRunning,
}

/// One file the caller wants converted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchTask {
    pub src: PathBuf,
    /// Opaque caller identifier, echoed back in the result.
    #[serde(default, alias = "itemId")]
    pub item_id: String,
    #[serde(default)]
    pub options: TaskOptions,
}

impl BatchTask {
    pub fn new(src: impl Into<PathBuf>, item_id: impl Into<String>, options: TaskOptions) -> Self {
        Self {
            src: src.into(),
            item_id: item_id.into(),
            options,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskSuccess {
    pub source: PathBuf,
    pub output_path: PathBuf,
    pub task_id: String,
    pub final_file_name: String,
    /// The host library now holds the converted file and the output was removed.
    #[serde(default)]
    pub replaced_in_host: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskFailure {
    pub source: PathBuf,
    pub error: String,
    pub task_id: String,
}

/// What `on_task_complete` receives.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum TaskOutcome {
    Succeeded(TaskSuccess),
    Failed(TaskFailure),
}

impl TaskOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Succeeded(_))
    }

    pub fn task_id(&self) -> &str {
        match self {
            Self::Succeeded(s) => &s.task_id,
            Self::Failed(f) => &f.task_id,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Statistics {
    pub total: usize,
    pub successful: usize,
    pub failed: usize,
}

/// Final report of a batch, handed out exactly once.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchResult {
    /// In completion order.
    pub successful_tasks: Vec<TaskSuccess>,
    pub failed_tasks: Vec<TaskFailure>,
    pub statistics: Statistics,
    pub was_cancelled: bool,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl BatchResult {
    /// Result of a batch with nothing to do.
    pub fn empty() -> Self {
        let now = Utc::now();
        Self {
            successful_tasks: Vec::new(),
            failed_tasks: Vec::new(),
            statistics: Statistics::default(),
            was_cancelled: false,
            started_at: now,
            finished_at: now,
        }
    }

    /// Tasks that produced neither a success nor a failure.
    pub fn unaccounted(&self) -> usize {
        self.statistics
            .total
            .saturating_sub(self.statistics.successful + self.statistics.failed)
    }
}

type Callback<T> = Arc<dyn Fn(&T) + Send + Sync>;

/// Optional hooks invoked while a batch runs.
#[derive(Clone, Default)]
pub struct BatchCallbacks {
    pub(crate) on_task_complete: Option<Callback<TaskOutcome>>,
    pub(crate) on_progress: Option<Arc<dyn Fn(f64) + Send + Sync>>,
    pub(crate) on_error: Option<Callback<TaskFailure>>,
    pub(crate) on_complete: Option<Callback<BatchResult>>,
    pub(crate) on_cancelled: Option<Callback<BatchResult>>,
}

impl BatchCallbacks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fires once per task, after success or failure.
    pub fn on_task_complete(mut self, f: impl Fn(&TaskOutcome) + Send + Sync + 'static) -> Self {
        self.on_task_complete = Some(Arc::new(f));
        self
    }

    /// Overall batch percentage, 0 to 100.
    pub fn on_progress(mut self, f: impl Fn(f64) + Send + Sync + 'static) -> Self {
        self.on_progress = Some(Arc::new(f));
        self
    }

    pub fn on_error(mut self, f: impl Fn(&TaskFailure) + Send + Sync + 'static) -> Self {
        self.on_error = Some(Arc::new(f));
        self
    }

    pub fn on_complete(mut self, f: impl Fn(&BatchResult) + Send + Sync + 'static) -> Self {
        self.on_complete = Some(Arc::new(f));
        self
    }

    pub fn on_cancelled(mut self, f: impl Fn(&BatchResult) + Send + Sync + 'static) -> Self {
        self.on_cancelled = Some(Arc::new(f));
        self
    }
}

impl fmt::Debug for BatchCallbacks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BatchCallbacks")
            .field("on_task_complete", &self.on_task_complete.is_some())
            .field("on_progress", &self.on_progress.is_some())
            .field("on_error", &self.on_error.is_some())
            .field("on_complete", &self.on_complete.is_some())
            .field("on_cancelled", &self.on_cancelled.is_some())
            .finish()
    }
}
