//! Integration tests for full backoff runs.
//!
//! All tests run on a paused Tokio clock, so multi-second schedules finish
//! instantly.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::oneshot;

use exponential_backoff::{
    from_async, AsyncOperation, Attempt, BackoffConfig, BackoffPolicy, BackoffRegistry,
    BackoffState, Report,
};

/// Config used by the reference scenarios.
fn scenario_config() -> BackoffConfig {
    BackoffConfig::builder()
        .initial_interval_millis(2)
        .max_elapsed_time_millis(10_000)
        .multiplier(2.0)
        .randomization_factor(0.0)
        .build()
        .expect("valid config")
}

/// Operation that fails until a given attempt, counting invocations.
struct Flaky {
    succeed_on: u32,
    calls: Arc<AtomicU32>,
}

#[async_trait]
impl AsyncOperation for Flaky {
    async fn attempt(&self, attempt: Attempt) -> bool {
        self.calls.fetch_add(1, Ordering::SeqCst);
        tokio::task::yield_now().await;
        attempt.number >= self.succeed_on
    }
}

#[tokio::test(start_paused = true)]
async fn always_failing_operation_ends_failed() {
    let policy = BackoffPolicy::new(scenario_config());

    let state = policy
        .retry(|_: Attempt, report: Report| {
            tokio::spawn(async move {
                report.report(false);
            });
        })
        .await;

    assert_eq!(state, BackoffState::Failed);
    assert_eq!(policy.current_state(), BackoffState::Failed);
    assert!(policy.elapsed_time_millis() >= 10_000);
}

#[tokio::test(start_paused = true)]
async fn immediate_success_ends_succeeded_after_one_attempt() {
    let policy = BackoffPolicy::new(scenario_config());

    let state = policy
        .retry(|_: Attempt, report: Report| {
            report.report(true);
        })
        .await;

    assert_eq!(state, BackoffState::Succeeded);
    assert_eq!(policy.attempts(), 1);
    assert_eq!(policy.elapsed_time_millis(), 2);
}

#[tokio::test(start_paused = true)]
async fn async_operation_retries_until_success() {
    let calls = Arc::new(AtomicU32::new(0));
    let policy = BackoffPolicy::new(scenario_config());

    let state = policy
        .retry(from_async(Flaky {
            succeed_on: 4,
            calls: Arc::clone(&calls),
        }))
        .await;

    assert_eq!(state, BackoffState::Succeeded);
    assert_eq!(calls.load(Ordering::SeqCst), 4);
    assert_eq!(policy.attempts(), 4);
    // 2 + 4 + 8 + 16
    assert_eq!(policy.elapsed_time_millis(), 30);
}

#[tokio::test(start_paused = true)]
async fn completion_fires_once_across_many_attempts() {
    let notified = Arc::new(AtomicU32::new(0));
    let counter = Arc::clone(&notified);
    let (tx, rx) = oneshot::channel();

    let policy = BackoffPolicy::new(scenario_config());
    policy.algorithm_with(
        |attempt: Attempt, report: Report| {
            report.report(attempt.number == 8);
        },
        move |state| {
            counter.fetch_add(1, Ordering::SeqCst);
            let _ = tx.send(state);
        },
    );

    assert_eq!(rx.await.unwrap(), BackoffState::Succeeded);
    tokio::task::yield_now().await;
    assert_eq!(notified.load(Ordering::SeqCst), 1);
    assert_eq!(policy.attempts(), 8);
}

#[tokio::test(start_paused = true)]
async fn reset_after_failure_starts_fresh_run() {
    let policy = BackoffPolicy::new(scenario_config());
    let calls = Arc::new(AtomicU32::new(0));
    let counter = Arc::clone(&calls);

    let state = policy
        .retry(move |attempt: Attempt, report: Report| {
            counter.fetch_add(1, Ordering::SeqCst);
            // Only the second run's third attempt succeeds.
            let second_run = counter.load(Ordering::SeqCst) > 13;
            report.report(second_run && attempt.number == 3);
        })
        .await;
    assert_eq!(state, BackoffState::Failed);

    let (tx, rx) = oneshot::channel();
    policy.reset_with(move |state| {
        let _ = tx.send(state);
    });
    assert_eq!(policy.attempts(), 1);
    assert_eq!(rx.await.unwrap(), BackoffState::Succeeded);
    assert_eq!(policy.attempts(), 3);
    assert_eq!(policy.elapsed_time_millis(), 14);
}

#[tokio::test(start_paused = true)]
async fn config_file_drives_policy() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("backoff.toml");
    std::fs::write(
        &path,
        r#"
        initial_interval_millis = 10
        max_interval_millis = 40
        max_elapsed_time_millis = 200
        multiplier = 2.0
        randomization_factor = 0.0
        "#,
    )
    .unwrap();

    let config = BackoffConfig::from_file(&path).unwrap();
    let policy = BackoffPolicy::new(config);

    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
    let state = policy
        .retry(move |attempt: Attempt, report: Report| {
            let _ = tx.send(attempt.last_interval_millis);
            report.report(false);
        })
        .await;
    assert_eq!(state, BackoffState::Failed);

    let mut delays = Vec::new();
    while let Ok(delay) = rx.try_recv() {
        delays.push(delay);
    }
    // 10 + 20 + 40 + 40 + 40 + 40 = 190 < 200, the seventh attempt pushes past.
    assert_eq!(delays, vec![10, 20, 40, 40, 40, 40, 40]);
}

#[tokio::test(start_paused = true)]
async fn registry_stops_all_runs() {
    let mut registry = BackoffRegistry::new();
    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();

    for _ in 0..2 {
        let tx = tx.clone();
        registry.start(
            BackoffPolicy::new(scenario_config()),
            move |_: Attempt, report: Report| {
                let _ = tx.send(report);
            },
        );
    }

    let first = rx.recv().await.unwrap();
    let second = rx.recv().await.unwrap();
    assert_eq!(registry.stop_all(), vec![BackoffState::Stopped; 2]);

    assert_eq!(first.report(false), BackoffState::Stopped);
    assert_eq!(second.report(false), BackoffState::Stopped);
    tokio::task::yield_now().await;

    assert!(registry
        .instances()
        .iter()
        .all(|p| p.current_state() == BackoffState::Stopped));
    assert!(rx.try_recv().is_err());
}
