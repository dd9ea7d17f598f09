//! Batch orchestrator implementation.
//!
//! Turns every task into a unit of work on a [`ConversionQueue`]: a plain
//! copy when nothing needs converting, otherwise a cancellable conversion
//! through the [`FormatHandler`] for the source extension.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;

use chrono::Utc;
use futures::FutureExt;
use tokio::sync::oneshot;
use tracing::{debug, error, info, warn};

use crate::converter::format::{extension_of, is_video_format, same_format};
use crate::converter::{ConvertError, ProgressSink, TargetSpec};
use crate::handler::{ConversionJob, ConversionServices, FormatHandler};
use crate::host::HostLibrary;
use crate::metrics;
use crate::queue::{ConversionQueue, Outcome, UnitOfWork};

use super::config::OrchestratorConfig;
use super::types::{
    BatchCallbacks, BatchResult, BatchTask, OrchestratorError, Statistics, TaskFailure,
    TaskOutcome, TaskSuccess,
};

/// Whether a task can be satisfied by copying the source byte for byte.
pub fn should_copy_directly(input_ext: &str, spec: &TargetSpec) -> bool {
    let same = spec.is_original_format() || same_format(input_ext, &spec.format);
    same && spec.size.is_original()
}

/// Copies `src` to `<dest_dir>/<file_name>.<ext>`, where `ext` is the
/// requested format or the source's own extension for "original".
pub async fn copy_file(src: &Path, dest_dir: &Path, spec: &TargetSpec) -> Result<PathBuf, ConvertError> {
    tokio::fs::create_dir_all(dest_dir).await?;
    let ext = if spec.is_original_format() {
        extension_of(src)
    } else {
        spec.format.clone()
    };
    let output_path = dest_dir.join(format!("{}.{}", spec.file_name, ext));
    tokio::fs::copy(src, &output_path).await?;
    Ok(output_path)
}

/// Per-batch bookkeeping shared by every unit of the batch.
struct BatchState {
    total: usize,
    completed: AtomicUsize,
    successes: Mutex<Vec<TaskSuccess>>,
    failures: Mutex<Vec<TaskFailure>>,
    callbacks: BatchCallbacks,
}

impl BatchState {
    fn new(total: usize, callbacks: BatchCallbacks) -> Self {
        Self {
            total,
            completed: AtomicUsize::new(0),
            successes: Mutex::new(Vec::new()),
            failures: Mutex::new(Vec::new()),
            callbacks,
        }
    }

    /// Rescales a task's percentage into the batch's.
    fn progress_sink(self: &Arc<Self>) -> ProgressSink {
        let Some(on_progress) = self.callbacks.on_progress.clone() else {
            return ProgressSink::none();
        };
        let state = Arc::clone(self);
        ProgressSink::new(move |percent| {
            let done = state.completed.load(Ordering::SeqCst) as f64;
            let overall = (done + percent.clamp(0.0, 100.0) / 100.0) / state.total as f64 * 100.0;
            on_progress(overall.min(100.0));
        })
    }

    fn record_success(&self, success: TaskSuccess) {
        debug!(task_id = %success.task_id, output = %success.output_path.display(), "Task succeeded");
        self.successes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(success.clone());
        self.finish_task(TaskOutcome::Succeeded(success));
    }

    fn record_failure(&self, failure: TaskFailure) {
        warn!(
            task_id = %failure.task_id,
            source = %failure.source.display(),
            error = %failure.error,
            "Task failed"
        );
        self.failures
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(failure.clone());
        if let Some(on_error) = &self.callbacks.on_error {
            on_error(&failure);
        }
        self.finish_task(TaskOutcome::Failed(failure));
    }

    fn finish_task(&self, outcome: TaskOutcome) {
        if let Some(on_task_complete) = &self.callbacks.on_task_complete {
            on_task_complete(&outcome);
        }
        let done = self.completed.fetch_add(1, Ordering::SeqCst) + 1;
        if let Some(on_progress) = &self.callbacks.on_progress {
            on_progress(done as f64 / self.total as f64 * 100.0);
        }
    }

    fn snapshot(&self, was_cancelled: bool, started_at: chrono::DateTime<Utc>) -> BatchResult {
        let successful_tasks = self
            .successes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        let failed_tasks = self
            .failures
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        BatchResult {
            statistics: Statistics {
                total: self.total,
                successful: successful_tasks.len(),
                failed: failed_tasks.len(),
            },
            successful_tasks,
            failed_tasks,
            was_cancelled,
            started_at,
            finished_at: Utc::now(),
        }
    }
}

/// Everything a unit needs, cloned into it at push time.
#[derive(Clone)]
struct TaskContext {
    services: Arc<ConversionServices>,
    host: Arc<dyn HostLibrary>,
    batch: Arc<BatchState>,
}

enum Prepared {
    Copy {
        dest_dir: PathBuf,
        spec: TargetSpec,
    },
    Convert {
        handler: FormatHandler,
        job: ConversionJob,
        replace_mode: bool,
    },
}

impl TaskContext {
    fn prepare(&self, task: &BatchTask) -> Result<Prepared, ConvertError> {
        let spec = task.options.to_spec()?;
        let dest_dir = task.options.output_dir()?.to_path_buf();
        let input_ext = extension_of(&task.src);

        if should_copy_directly(&input_ext, &spec) {
            return Ok(Prepared::Copy { dest_dir, spec });
        }

        let handler = FormatHandler::for_source(Arc::clone(&self.services), &task.src)?;
        let job = ConversionJob::new(&task.src, dest_dir, spec).with_progress(self.batch.progress_sink());
        Ok(Prepared::Convert {
            handler,
            job,
            replace_mode: task.options.replace_mode,
        })
    }

    fn failure(task: &BatchTask, err: &ConvertError) -> TaskFailure {
        TaskFailure {
            source: task.src.clone(),
            error: err.to_string(),
            task_id: task.item_id.clone(),
        }
    }

    /// Builds the queue unit for one task. Every path ends in exactly one
    /// recorded success or failure.
    fn unit(self, task: BatchTask) -> UnitOfWork {
        Box::new(move || match self.prepare(&task) {
            Err(e) => Outcome::Plain(
                async move {
                    self.batch.record_failure(Self::failure(&task, &e));
                }
                .boxed(),
            ),
            Ok(Prepared::Copy { dest_dir, spec }) => Outcome::Plain(
                async move {
                    match copy_file(&task.src, &dest_dir, &spec).await {
                        Ok(output_path) => {
                            metrics::DIRECT_COPIES.inc();
                            self.batch.record_success(TaskSuccess {
                                source: task.src.clone(),
                                output_path,
                                task_id: task.item_id.clone(),
                                final_file_name: spec.file_name.clone(),
                                replaced_in_host: false,
                            });
                        }
                        Err(e) => self.batch.record_failure(Self::failure(&task, &e)),
                    }
                }
                .boxed(),
            ),
            Ok(Prepared::Convert {
                handler,
                job,
                replace_mode,
            }) => {
                let final_file_name = job.spec.file_name.clone();
                let conversion = handler.convert_cancellable(job);
                let outcome = conversion.outcome;
                Outcome::Cancellable {
                    outcome: async move {
                        match outcome.await {
                            Ok(output) => {
                                let mut success = TaskSuccess {
                                    source: task.src.clone(),
                                    output_path: output.output_path,
                                    task_id: task.item_id.clone(),
                                    final_file_name,
                                    replaced_in_host: false,
                                };
                                if replace_mode {
                                    success.replaced_in_host = self.replace_in_host(&success).await;
                                }
                                self.batch.record_success(success);
                            }
                            Err(e) => self.batch.record_failure(Self::failure(&task, &e)),
                        }
                    }
                    .boxed(),
                    terminate: conversion.terminate,
                }
            }
        })
    }

    /// Swaps the host item's file for the converted output. Failures are
    /// logged and leave the output in place.
    async fn replace_in_host(&self, success: &TaskSuccess) -> bool {
        let item = match self.host.find_item_by_path(&success.source).await {
            Ok(Some(item)) => item,
            Ok(None) => {
                error!(source = %success.source.display(), "No host item matches the source file");
                return false;
            }
            Err(e) => {
                error!(source = %success.source.display(), error = %e, "Host lookup failed");
                return false;
            }
        };

        match self.host.replace_file(&item, &success.output_path).await {
            Ok(true) => {
                info!(item_id = %item.id, source = %success.source.display(), "Replaced file in host library");
                if let Err(e) = tokio::fs::remove_file(&success.output_path).await {
                    warn!(path = %success.output_path.display(), error = %e, "Failed to remove replaced output");
                }
                true
            }
            Ok(false) => {
                error!(item_id = %item.id, "Host library declined the replacement");
                false
            }
            Err(e) => {
                error!(item_id = %item.id, error = %e, "Host replace failed");
                false
            }
        }
    }
}

/// The batch currently accepting cancellation.
struct ActiveBatch {
    id: u64,
    queue: ConversionQueue,
}

/// Runs batches of conversions, one batch at a time.
///
/// Every batch gets its own queue, so a cancelled batch that is still
/// draining never shares state with the next one.
pub struct BatchOrchestrator {
    config: OrchestratorConfig,
    services: Arc<ConversionServices>,
    host: Arc<dyn HostLibrary>,
    active: Mutex<Option<ActiveBatch>>,
    next_batch: AtomicU64,
}

impl BatchOrchestrator {
    pub fn new(
        config: OrchestratorConfig,
        services: Arc<ConversionServices>,
        host: Arc<dyn HostLibrary>,
    ) -> Self {
        Self {
            config,
            services,
            host,
            active: Mutex::new(None),
            next_batch: AtomicU64::new(1),
        }
    }

    fn active(&self) -> MutexGuard<'_, Option<ActiveBatch>> {
        self.active.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Queue concurrency for a batch: the video setting when the first
    /// task targets a video format.
    pub fn concurrency_for(&self, tasks: &[BatchTask]) -> usize {
        let video = tasks
            .first()
            .and_then(|t| t.options.format.as_deref())
            .is_some_and(is_video_format);
        self.config.concurrency_for(video)
    }

    /// Converts every task and resolves once all of them settled or the
    /// batch was cancelled.
    pub async fn convert(
        &self,
        tasks: Vec<BatchTask>,
        callbacks: BatchCallbacks,
    ) -> Result<BatchResult, OrchestratorError> {
        if tasks.is_empty() {
            let result = BatchResult::empty();
            if let Some(on_complete) = &callbacks.on_complete {
                on_complete(&result);
            }
            return Ok(result);
        }

        let concurrency = self.concurrency_for(&tasks);
        let queue = ConversionQueue::new(concurrency);
        let batch_id = {
            let mut active = self.active();
            if active.is_some() {
                return Err(OrchestratorError::AlreadyRunning);
            }
            let id = self.next_batch.fetch_add(1, Ordering::SeqCst);
            *active = Some(ActiveBatch {
                id,
                queue: queue.clone(),
            });
            id
        };

        let started = Instant::now();
        let started_at = Utc::now();
        info!(batch = batch_id, tasks = tasks.len(), concurrency, "Starting batch conversion");

        let batch = Arc::new(BatchState::new(tasks.len(), callbacks));
        let (done_tx, done_rx) = oneshot::channel();
        let done_tx = Mutex::new(Some(done_tx));
        queue.on_all_complete(move || {
            if let Some(tx) = done_tx.lock().unwrap_or_else(PoisonError::into_inner).take() {
                let _ = tx.send(());
            }
        });

        let ctx = TaskContext {
            services: Arc::clone(&self.services),
            host: Arc::clone(&self.host),
            batch: Arc::clone(&batch),
        };
        queue.push_batch(tasks.into_iter().map(|task| ctx.clone().unit(task)));

        // The queue is owned by this call, so the sender only goes away
        // after firing.
        let _ = done_rx.await;

        let was_cancelled = queue.is_cancelled();
        let result = batch.snapshot(was_cancelled, started_at);
        {
            let mut active = self.active();
            if active.as_ref().is_some_and(|a| a.id == batch_id) {
                *active = None;
            }
        }

        let label = if was_cancelled { "cancelled" } else { "completed" };
        metrics::BATCHES_TOTAL.with_label_values(&[label]).inc();
        metrics::BATCH_DURATION
            .with_label_values(&[label])
            .observe(started.elapsed().as_secs_f64());
        info!(
            batch = batch_id,
            total = result.statistics.total,
            successful = result.statistics.successful,
            failed = result.statistics.failed,
            was_cancelled,
            "Batch conversion finished"
        );

        let callback = if was_cancelled {
            &batch.callbacks.on_cancelled
        } else {
            &batch.callbacks.on_complete
        };
        if let Some(callback) = callback {
            callback(&result);
        }
        Ok(result)
    }

    /// Cancels the running batch: queued tasks are dropped and in-flight
    /// conversions are terminated. The orchestrator is idle right away;
    /// the cancelled batch keeps draining on its own queue.
    pub fn cancel(&self) {
        let Some(active) = self.active().take() else {
            debug!("No batch to cancel");
            return;
        };
        info!(batch = active.id, "Cancelling batch conversion");
        active.queue.cancel();
    }

    pub fn is_running(&self) -> bool {
        self.active().is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::converter::{SizePolicy, SizeType, TaskOptions};
    use crate::host::NoopHost;
    use crate::testing::fixtures::source_file;
    use std::sync::atomic::AtomicBool;
    use crate::testing::{mock_services, MockBackends, MockBehavior, MockHost};
    use std::time::Duration;
    use tempfile::TempDir;

    fn options(format: &str, out: &Path, name: &str) -> TaskOptions {
        TaskOptions {
            format: Some(format.to_string()),
            output: Some(out.to_path_buf()),
            file_name: Some(name.to_string()),
            ..Default::default()
        }
    }

    fn resized(format: &str, out: &Path, name: &str) -> TaskOptions {
        TaskOptions {
            size_type: Some(SizeType::MaxWidth),
            size_value: Some(64),
            ..options(format, out, name)
        }
    }

    fn orchestrator(dir: &TempDir, host: Arc<dyn HostLibrary>) -> (BatchOrchestrator, MockBackends) {
        let (services, mocks) = mock_services(dir.path().join("tmp"));
        let orchestrator = BatchOrchestrator::new(OrchestratorConfig::default(), Arc::new(services), host);
        (orchestrator, mocks)
    }

    #[test]
    fn test_should_copy_directly() {
        let spec = TargetSpec::new("jpeg", "a");
        assert!(should_copy_directly("jpg", &spec));
        assert!(should_copy_directly("png", &TargetSpec::new("original", "a")));
        assert!(!should_copy_directly("png", &TargetSpec::new("jpg", "a")));
        assert!(!should_copy_directly(
            "jpg",
            &TargetSpec::new("jpg", "a").with_size(SizePolicy::MaxWidth(10))
        ));
        assert!(!should_copy_directly("mp4", &TargetSpec::new("webm", "a")));
    }

    #[tokio::test]
    async fn test_empty_batch_completes_immediately() {
        let dir = TempDir::new().unwrap();
        let (orchestrator, _) = orchestrator(&dir, Arc::new(NoopHost));
        let completed = Arc::new(AtomicBool::new(false));
        let flag = completed.clone();

        let result = orchestrator
            .convert(vec![], BatchCallbacks::new().on_complete(move |_| flag.store(true, Ordering::SeqCst)))
            .await
            .unwrap();
        assert_eq!(result.statistics.total, 0);
        assert!(completed.load(Ordering::SeqCst));
        assert!(!orchestrator.is_running());
    }

    #[tokio::test]
    async fn test_direct_copy_is_byte_identical_and_skips_backends() {
        let dir = TempDir::new().unwrap();
        let src = source_file(dir.path(), "photo.jpeg");
        let out = dir.path().join("out");
        let (orchestrator, mocks) = orchestrator(&dir, Arc::new(NoopHost));

        let result = orchestrator
            .convert(vec![BatchTask::new(&src, "t1", options("jpg", &out, "photo"))], BatchCallbacks::new())
            .await
            .unwrap();

        let success = &result.successful_tasks[0];
        assert_eq!(success.output_path, out.join("photo.jpg"));
        assert_eq!(std::fs::read(&src).unwrap(), std::fs::read(&success.output_path).unwrap());
        assert_eq!(mocks.total_calls(), 0);
    }

    #[tokio::test]
    async fn test_original_format_copy_keeps_extension() {
        let dir = TempDir::new().unwrap();
        let src = source_file(dir.path(), "scan.TIF");
        let out = dir.path().join("out");
        let (orchestrator, _) = orchestrator(&dir, Arc::new(NoopHost));

        let result = orchestrator
            .convert(vec![BatchTask::new(&src, "t1", options("original", &out, "scan-copy"))], BatchCallbacks::new())
            .await
            .unwrap();
        assert_eq!(result.successful_tasks[0].output_path, out.join("scan-copy.tif"));
    }

    #[tokio::test]
    async fn test_mixed_batch_accounts_for_every_task() {
        let dir = TempDir::new().unwrap();
        let out = dir.path().join("out");
        let (orchestrator, mocks) = orchestrator(&dir, Arc::new(NoopHost));
        mocks.transcode.set_behavior(MockBehavior::Fail("boom".into()));

        let tasks = vec![
            BatchTask::new(source_file(dir.path(), "a.png"), "a", resized("jpg", &out, "a")),
            BatchTask::new(source_file(dir.path(), "b.psd"), "b", resized("jpg", &out, "b")),
            BatchTask::new(source_file(dir.path(), "c.png"), "c", TaskOptions::default()),
            BatchTask::new(source_file(dir.path(), "d.exr"), "d", resized("png", &out, "d")),
        ];

        let completions = Arc::new(Mutex::new(Vec::new()));
        let errors = Arc::new(AtomicUsize::new(0));
        let (c, e) = (completions.clone(), errors.clone());
        let callbacks = BatchCallbacks::new()
            .on_task_complete(move |o| c.lock().unwrap().push(o.task_id().to_string()))
            .on_error(move |_| {
                e.fetch_add(1, Ordering::SeqCst);
            });

        let result = orchestrator.convert(tasks, callbacks).await.unwrap();
        assert_eq!(result.statistics.total, 4);
        assert_eq!(result.statistics.successful + result.statistics.failed, 4);
        assert_eq!(result.statistics.successful, 2);
        assert_eq!(errors.load(Ordering::SeqCst), 2);

        let mut ids = completions.lock().unwrap().clone();
        ids.sort();
        assert_eq!(ids, vec!["a", "b", "c", "d"]);

        let missing_format = result.failed_tasks.iter().find(|f| f.task_id == "c").unwrap();
        assert!(missing_format.error.contains("format"));
        assert!(!result.was_cancelled);
    }

    #[tokio::test]
    async fn test_progress_reaches_one_hundred() {
        let dir = TempDir::new().unwrap();
        let out = dir.path().join("out");
        let (orchestrator, _) = orchestrator(&dir, Arc::new(NoopHost));
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();

        let tasks = (0..2)
            .map(|i| {
                let name = format!("f{i}");
                BatchTask::new(source_file(dir.path(), &format!("{name}.png")), &name, resized("webp", &out, &name))
            })
            .collect();
        orchestrator
            .convert(tasks, BatchCallbacks::new().on_progress(move |p| sink.lock().unwrap().push(p)))
            .await
            .unwrap();

        let seen = seen.lock().unwrap();
        assert!(!seen.is_empty());
        assert!(seen.iter().all(|p| (0.0..=100.0).contains(p)));
        assert!(seen.iter().any(|p| (*p - 100.0).abs() < 1e-9));
    }

    #[tokio::test]
    async fn test_video_batch_runs_one_at_a_time() {
        let dir = TempDir::new().unwrap();
        let (orchestrator, _) = orchestrator(&dir, Arc::new(NoopHost));
        let tasks = vec![
            BatchTask::new("a.mov", "a", options("mp4", dir.path(), "a")),
            BatchTask::new("b.png", "b", options("jpg", dir.path(), "b")),
        ];
        assert_eq!(orchestrator.concurrency_for(&tasks), 1);
        assert_eq!(orchestrator.concurrency_for(&tasks[1..]), 8);
    }

    #[tokio::test]
    async fn test_replace_mode_swaps_host_file_and_removes_output() {
        let dir = TempDir::new().unwrap();
        let src = source_file(dir.path(), "photo.png");
        let out = dir.path().join("out");
        let host = Arc::new(MockHost::new());
        host.add_item("item-9", &src);
        let (orchestrator, _) = orchestrator(&dir, host.clone());

        let mut opts = resized("jpg", &out, "photo");
        opts.replace_mode = true;
        let result = orchestrator
            .convert(vec![BatchTask::new(&src, "t1", opts)], BatchCallbacks::new())
            .await
            .unwrap();

        let success = &result.successful_tasks[0];
        assert!(success.replaced_in_host);
        assert_eq!(host.replaced(), vec![("item-9".to_string(), out.join("photo.jpg"))]);
        assert!(!success.output_path.exists());
    }

    #[tokio::test]
    async fn test_replace_failure_keeps_conversion() {
        let dir = TempDir::new().unwrap();
        let src = source_file(dir.path(), "photo.png");
        let out = dir.path().join("out");
        let host = Arc::new(MockHost::new());
        host.add_item("item-9", &src);
        host.fail_replace("locked");
        let (orchestrator, _) = orchestrator(&dir, host);

        let mut opts = resized("jpg", &out, "photo");
        opts.replace_mode = true;
        let result = orchestrator
            .convert(vec![BatchTask::new(&src, "t1", opts)], BatchCallbacks::new())
            .await
            .unwrap();

        let success = &result.successful_tasks[0];
        assert!(!success.replaced_in_host);
        assert!(success.output_path.exists());
    }

    #[tokio::test]
    async fn test_replace_mode_ignored_for_direct_copy() {
        let dir = TempDir::new().unwrap();
        let src = source_file(dir.path(), "photo.png");
        let host = Arc::new(MockHost::new());
        host.add_item("item-9", &src);
        let (orchestrator, _) = orchestrator(&dir, host.clone());

        let mut opts = options("png", &dir.path().join("out"), "photo");
        opts.replace_mode = true;
        let result = orchestrator
            .convert(vec![BatchTask::new(&src, "t1", opts)], BatchCallbacks::new())
            .await
            .unwrap();
        assert!(!result.successful_tasks[0].replaced_in_host);
        assert!(host.replaced().is_empty());
    }

    #[tokio::test]
    async fn test_cancel_reports_cancelled_batch() {
        let dir = TempDir::new().unwrap();
        let out = dir.path().join("out");
        let (orchestrator, mocks) = orchestrator(&dir, Arc::new(NoopHost));
        mocks.transcode.set_behavior(MockBehavior::WaitForCancel);
        let orchestrator = Arc::new(orchestrator);

        let tasks: Vec<_> = (0..3)
            .map(|i| {
                let name = format!("clip{i}");
                BatchTask::new(source_file(dir.path(), &format!("{name}.mov")), &name, options("mp4", &out, &name))
            })
            .collect();

        let cancelled = Arc::new(AtomicBool::new(false));
        let flag = cancelled.clone();
        let runner = orchestrator.clone();
        let handle = tokio::spawn(async move {
            runner
                .convert(tasks, BatchCallbacks::new().on_cancelled(move |_| flag.store(true, Ordering::SeqCst)))
                .await
        });

        while mocks.transcode.call_count() == 0 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert!(orchestrator.is_running());
        orchestrator.cancel();
        assert!(!orchestrator.is_running());

        let result = handle.await.unwrap().unwrap();
        assert!(result.was_cancelled);
        assert!(cancelled.load(Ordering::SeqCst));
        assert_eq!(result.statistics.failed, 1);
        assert_eq!(result.unaccounted(), 2);
    }

    #[tokio::test]
    async fn test_orchestrator_reusable_after_cancel() {
        let dir = TempDir::new().unwrap();
        let out = dir.path().join("out");
        let (orchestrator, mocks) = orchestrator(&dir, Arc::new(NoopHost));
        mocks.transcode.set_behavior(MockBehavior::Delay(Duration::from_millis(200)));
        let orchestrator = Arc::new(orchestrator);

        let src = source_file(dir.path(), "clip.mov");
        let first = vec![BatchTask::new(&src, "1", options("mp4", &out, "first"))];
        let runner = orchestrator.clone();
        let handle = tokio::spawn(async move { runner.convert(first, BatchCallbacks::new()).await });
        while mocks.transcode.call_count() == 0 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        orchestrator.cancel();
        assert!(handle.await.unwrap().unwrap().was_cancelled);

        mocks.transcode.set_behavior(MockBehavior::Succeed);
        let second = vec![BatchTask::new(&src, "2", options("mp4", &out, "second"))];
        let result = orchestrator.convert(second, BatchCallbacks::new()).await.unwrap();
        assert!(!result.was_cancelled);
        assert_eq!(result.statistics.successful, 1);
    }
}
