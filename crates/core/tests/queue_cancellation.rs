//! Queue cancellation integration tests.
//!
//! These tests verify cancellation across the orchestrator and queue:
//! - In-flight conversions are terminated, queued ones never start
//! - Completion fires exactly once after cancellation
//! - The queue stays within its concurrency bound

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use tempfile::TempDir;
use tokio::sync::oneshot;

use convertino_core::{
    converter::Codec,
    testing::{fixtures::source_file, mock_services, MockBehavior},
    BatchCallbacks, BatchOrchestrator, BatchTask, ConversionQueue, NoopHost, OrchestratorConfig,
    OrchestratorError, Outcome, TaskOptions,
};

fn video_task(dir: &TempDir, i: usize) -> BatchTask {
    let name = format!("clip{i}");
    let options = TaskOptions {
        format: Some("mp4".to_string()),
        codec: Some(Codec::H264),
        quality: Some(50),
        output: Some(dir.path().join("out")),
        file_name: Some(name.clone()),
        ..Default::default()
    };
    BatchTask::new(source_file(dir.path(), &format!("{name}.mov")), name, options)
}

async fn wait_for(mut condition: impl FnMut() -> bool) {
    for _ in 0..400 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("condition not reached");
}

#[tokio::test]
async fn test_cancel_video_batch_after_first_task_starts() {
    let dir = TempDir::new().unwrap();
    let (services, mocks) = mock_services(dir.path().join("tmp"));
    mocks.transcode.set_behavior(MockBehavior::WaitForCancel);
    let orchestrator = Arc::new(BatchOrchestrator::new(
        OrchestratorConfig::default(),
        Arc::new(services),
        Arc::new(NoopHost),
    ));

    let tasks: Vec<_> = (0..5).map(|i| video_task(&dir, i)).collect();
    assert_eq!(orchestrator.concurrency_for(&tasks), 1);

    let task_completions = Arc::new(AtomicUsize::new(0));
    let counter = task_completions.clone();
    let runner = orchestrator.clone();
    let handle = tokio::spawn(async move {
        runner
            .convert(
                tasks,
                BatchCallbacks::new().on_task_complete(move |_| {
                    counter.fetch_add(1, Ordering::SeqCst);
                }),
            )
            .await
    });

    wait_for(|| mocks.transcode.call_count() == 1).await;
    orchestrator.cancel();
    orchestrator.cancel();

    let result = handle.await.unwrap().unwrap();
    assert!(result.was_cancelled);
    assert_eq!(result.successful_tasks.len() + result.failed_tasks.len(), 1);
    assert_eq!(result.unaccounted(), 4);
    assert_eq!(task_completions.load(Ordering::SeqCst), 1);
    assert_eq!(mocks.transcode.call_count(), 1);
}

#[tokio::test]
async fn test_new_batch_while_cancelled_batch_drains() {
    let dir = TempDir::new().unwrap();
    let (services, mocks) = mock_services(dir.path().join("tmp"));
    mocks
        .transcode
        .set_behavior(MockBehavior::SlowToStop(Duration::from_millis(100)));
    let orchestrator = Arc::new(BatchOrchestrator::new(
        OrchestratorConfig::default(),
        Arc::new(services),
        Arc::new(NoopHost),
    ));

    let first_cancelled = Arc::new(AtomicUsize::new(0));
    let first_completed = Arc::new(AtomicUsize::new(0));
    let (cancelled, completed) = (first_cancelled.clone(), first_completed.clone());
    let first: Vec<_> = (0..5).map(|i| video_task(&dir, i)).collect();
    let runner = orchestrator.clone();
    let first_handle = tokio::spawn(async move {
        runner
            .convert(
                first,
                BatchCallbacks::new()
                    .on_cancelled(move |_| {
                        cancelled.fetch_add(1, Ordering::SeqCst);
                    })
                    .on_complete(move |_| {
                        completed.fetch_add(1, Ordering::SeqCst);
                    }),
            )
            .await
    });

    wait_for(|| mocks.transcode.call_count() == 1).await;
    orchestrator.cancel();
    assert!(!orchestrator.is_running());

    // The first batch's only task is still stopping when the next one starts.
    mocks
        .transcode
        .set_behavior(MockBehavior::Delay(Duration::from_millis(300)));
    let second: Vec<_> = (5..7).map(|i| video_task(&dir, i)).collect();
    let runner = orchestrator.clone();
    let second_handle = tokio::spawn(async move { runner.convert(second, BatchCallbacks::new()).await });
    wait_for(|| orchestrator.is_running()).await;

    let first_result = first_handle.await.unwrap().unwrap();
    assert!(first_result.was_cancelled);
    assert_eq!(first_result.unaccounted(), 4);
    assert_eq!(first_cancelled.load(Ordering::SeqCst), 1);
    assert_eq!(first_completed.load(Ordering::SeqCst), 0);

    // The first batch finishing must not mark the second one idle.
    assert!(orchestrator.is_running());
    let third = vec![video_task(&dir, 9)];
    assert!(matches!(
        orchestrator.convert(third, BatchCallbacks::new()).await,
        Err(OrchestratorError::AlreadyRunning)
    ));

    let second_result = second_handle.await.unwrap().unwrap();
    assert!(!second_result.was_cancelled);
    assert_eq!(second_result.statistics.successful, 2);
    assert!(!orchestrator.is_running());
}

#[tokio::test]
async fn test_cancel_after_settlement_has_no_effect() {
    let queue = ConversionQueue::new(2);
    let (tx, rx) = oneshot::channel();
    let tx = std::sync::Mutex::new(Some(tx));
    let fired = Arc::new(AtomicUsize::new(0));
    let counter = fired.clone();
    queue.on_all_complete(move || {
        counter.fetch_add(1, Ordering::SeqCst);
        if let Some(tx) = tx.lock().unwrap().take() {
            let _ = tx.send(());
        }
    });

    queue.push(Box::new(|| Outcome::Plain(async {}.boxed())));
    rx.await.unwrap();
    queue.cancel();
    tokio::time::sleep(Duration::from_millis(20)).await;

    assert_eq!(fired.load(Ordering::SeqCst), 1);
    assert_eq!(queue.running(), 0);
}

#[tokio::test]
async fn test_running_never_exceeds_concurrency() {
    let queue = ConversionQueue::new(3);
    let live = Arc::new(AtomicUsize::new(0));
    let peak = Arc::new(AtomicUsize::new(0));
    let done = Arc::new(tokio::sync::Notify::new());
    let notify = done.clone();
    queue.on_all_complete(move || notify.notify_one());

    let units = (0..12).map(|_| {
        let (live, peak) = (live.clone(), peak.clone());
        Box::new(move || {
            Outcome::Plain(
                async move {
                    let now = live.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(10)).await;
                    live.fetch_sub(1, Ordering::SeqCst);
                }
                .boxed(),
            )
        }) as convertino_core::queue::UnitOfWork
    });
    queue.push_batch(units);
    assert!(queue.running() <= 3);

    done.notified().await;
    assert!(peak.load(Ordering::SeqCst) <= 3);
    assert_eq!(peak.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn test_cancelled_terminate_reaches_every_in_flight_unit() {
    let dir = TempDir::new().unwrap();
    let (services, mocks) = mock_services(dir.path().join("tmp"));
    mocks.raster.set_behavior(MockBehavior::WaitForCancel);
    let orchestrator = Arc::new(BatchOrchestrator::new(
        OrchestratorConfig::fixed(4),
        Arc::new(services),
        Arc::new(NoopHost),
    ));

    let tasks: Vec<_> = (0..4)
        .map(|i| {
            let options = TaskOptions {
                format: Some("jpg".to_string()),
                output: Some(dir.path().join("out")),
                file_name: Some(format!("p{i}")),
                ..Default::default()
            };
            BatchTask::new(source_file(dir.path(), &format!("p{i}.png")), format!("p{i}"), options)
        })
        .collect();

    let runner = orchestrator.clone();
    let handle = tokio::spawn(async move { runner.convert(tasks, BatchCallbacks::new()).await });
    wait_for(|| mocks.raster.call_count() == 4).await;
    orchestrator.cancel();

    let result = tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .expect("batch did not finish after cancel")
        .unwrap()
        .unwrap();
    assert!(result.was_cancelled);
    assert_eq!(result.statistics.failed, 4);
    assert!(result.failed_tasks.iter().all(|f| f.error.contains("cancelled")));
}
