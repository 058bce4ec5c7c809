//! The exponential backoff state machine.
//!
//! A [`BackoffPolicy`] owns one run: its state, attempt counter, elapsed-time
//! budget and the last computed interval. Driving the run computes a delay,
//! sleeps on the Tokio timer, invokes the operation and waits for its report.
//! Failures loop back into the next delay computation inside the same task,
//! so a long run never grows the stack.
//!
//! `stop_execution` is advisory: it flips the state, and the run notices at
//! its next decision point. A timer that is already armed still fires and an
//! operation already in flight still reports.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use rand::rngs::StdRng;
use tokio::sync::oneshot;
use uuid::Uuid;

use crate::config::BackoffConfig;
use crate::operation::{Attempt, Report, RetryableOperation};
use crate::random;
use crate::state::BackoffState;

/// Callback notified once with the state a run ended in.
pub type Completion = Box<dyn FnOnce(BackoffState) + Send + 'static>;

/// Mutable state of a single run. Only touched under the policy's lock.
struct BackoffRun {
    state: BackoffState,
    attempts: u32,
    /// Base delay before jitter; `None` until the first attempt.
    last_interval_millis: Option<f64>,
    elapsed_time_millis: f64,
    saved_operation: Option<Arc<dyn RetryableOperation>>,
    /// Bumped by `reset` so a superseded task stops at its next decision point.
    generation: u64,
    rng: Option<StdRng>,
}

struct Inner {
    id: Uuid,
    config: BackoffConfig,
    run: Mutex<BackoffRun>,
}

/// An attempt whose delay has been computed and charged to the budget.
#[derive(Debug, Clone, Copy)]
struct Scheduled {
    attempt: u32,
    delay_millis: f64,
    elapsed_time_millis: f64,
}

enum Step {
    Scheduled(Scheduled),
    Finished(BackoffState),
}

/// Exponential backoff with jitter and an elapsed-time budget.
///
/// Cloning yields another handle to the same run.
///
/// # Examples
///
/// ```no_run
/// use exponential_backoff::{Attempt, BackoffConfig, BackoffPolicy, BackoffState, Report};
///
/// # async fn example() -> exponential_backoff::Result<()> {
/// let config = BackoffConfig::builder()
///     .initial_interval_millis(100)
///     .max_elapsed_time_millis(10_000)
///     .build()?;
/// let policy = BackoffPolicy::new(config);
///
/// let state = policy
///     .retry(|attempt: Attempt, report: Report| {
///         report.report(attempt.number >= 3);
///     })
///     .await;
/// assert_eq!(state, BackoffState::Succeeded);
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct BackoffPolicy {
    inner: Arc<Inner>,
}

impl BackoffPolicy {
    /// Creates a stopped policy that draws jitter from the thread-local RNG.
    pub fn new(config: BackoffConfig) -> Self {
        Self::build(config, None)
    }

    /// Creates a stopped policy that draws jitter from `rng`.
    pub fn with_rng(config: BackoffConfig, rng: StdRng) -> Self {
        Self::build(config, Some(rng))
    }

    fn build(config: BackoffConfig, rng: Option<StdRng>) -> Self {
        Self {
            inner: Arc::new(Inner {
                id: Uuid::new_v4(),
                config,
                run: Mutex::new(BackoffRun {
                    state: BackoffState::Stopped,
                    attempts: 0,
                    last_interval_millis: None,
                    elapsed_time_millis: 0.0,
                    saved_operation: None,
                    generation: 0,
                    rng,
                }),
            }),
        }
    }

    /// Unique identifier, used in log events.
    pub fn id(&self) -> Uuid {
        self.inner.id
    }

    /// Configuration this policy was built with.
    pub fn config(&self) -> &BackoffConfig {
        &self.inner.config
    }

    /// State of the run right now.
    pub fn current_state(&self) -> BackoffState {
        self.lock().state
    }

    /// Number of drive steps taken since the last reset.
    pub fn attempts(&self) -> u32 {
        self.lock().attempts
    }

    /// Cumulative delay charged to the budget since the last reset.
    pub fn elapsed_time_millis(&self) -> u64 {
        self.lock().elapsed_time_millis as u64
    }

    /// Last base delay before jitter, if an attempt was scheduled.
    pub fn last_interval_millis(&self) -> Option<u64> {
        self.lock().last_interval_millis.map(|v| v as u64)
    }

    /// Starts or continues the run with `operation`.
    ///
    /// Returns immediately with the resulting state. Must be called from
    /// within a Tokio runtime.
    pub fn algorithm(&self, operation: impl RetryableOperation) -> BackoffState {
        self.start(Arc::new(operation), None)
    }

    /// Like [`algorithm`](Self::algorithm), notifying `completion` once.
    ///
    /// The completion receives the state the run ends in. When the call
    /// starts no new work (the run is already in flight, stopped, or
    /// terminal) it is invoked right away with the current state.
    ///
    /// A call made while the run is in flight or terminal is not counted as
    /// an attempt. While in flight the operation is discarded; in a terminal
    /// state it replaces the one [`reset`](Self::reset) will restart.
    pub fn algorithm_with<F>(&self, operation: impl RetryableOperation, completion: F) -> BackoffState
    where
        F: FnOnce(BackoffState) + Send + 'static,
    {
        self.start(Arc::new(operation), Some(Box::new(completion)))
    }

    /// Runs `operation` to completion and returns the final state.
    pub async fn retry(&self, operation: impl RetryableOperation) -> BackoffState {
        let (tx, rx) = oneshot::channel();
        self.algorithm_with(operation, move |state| {
            let _ = tx.send(state);
        });
        match rx.await {
            Ok(state) => state,
            Err(_) => self.current_state(),
        }
    }

    /// Halts a running run. Returns `Stopped` if it was running, otherwise
    /// the unchanged state.
    pub fn stop_execution(&self) -> BackoffState {
        let mut run = self.lock();
        if run.state == BackoffState::Running {
            run.state = BackoffState::Stopped;
            tracing::info!(policy = %self.inner.id, attempts = run.attempts, "backoff stopped");
        }
        run.state
    }

    /// Restarts from zero with the last operation supplied.
    ///
    /// Does nothing while running or before the first attempt.
    pub fn reset(&self) -> BackoffState {
        self.restart(None)
    }

    /// Like [`reset`](Self::reset), notifying `completion` once.
    pub fn reset_with<F>(&self, completion: F) -> BackoffState
    where
        F: FnOnce(BackoffState) + Send + 'static,
    {
        self.restart(Some(Box::new(completion)))
    }

    fn start(
        &self,
        operation: Arc<dyn RetryableOperation>,
        completion: Option<Completion>,
    ) -> BackoffState {
        let gate = {
            let mut run = self.lock();
            if run.state == BackoffState::Running {
                tracing::debug!(policy = %self.inner.id, "run already in flight, ignoring");
                Err(run.state)
            } else {
                run.saved_operation = Some(Arc::clone(&operation));
                if run.state.is_terminal() {
                    Err(run.state)
                } else {
                    Ok(run.generation)
                }
            }
        };

        match gate {
            Ok(generation) => self.drive(operation, completion, generation),
            Err(state) => {
                notify(completion, state);
                state
            }
        }
    }

    fn restart(&self, completion: Option<Completion>) -> BackoffState {
        let restart = {
            let mut run = self.lock();
            match run.saved_operation.clone() {
                Some(operation) if run.state != BackoffState::Running && run.attempts != 0 => {
                    run.attempts = 0;
                    run.last_interval_millis = None;
                    run.elapsed_time_millis = 0.0;
                    run.state = BackoffState::Stopped;
                    run.generation += 1;
                    Ok((operation, run.generation))
                }
                _ => Err(run.state),
            }
        };

        match restart {
            Ok((operation, generation)) => {
                tracing::info!(policy = %self.inner.id, "backoff reset");
                self.drive(operation, completion, generation)
            }
            Err(state) => {
                notify(completion, state);
                state
            }
        }
    }

    /// Takes the first step synchronously and hands the rest of the run to a
    /// spawned task.
    fn drive(
        &self,
        operation: Arc<dyn RetryableOperation>,
        completion: Option<Completion>,
        generation: u64,
    ) -> BackoffState {
        match self.advance(generation) {
            Step::Finished(state) => {
                notify(completion, state);
                state
            }
            Step::Scheduled(first) => {
                let policy = self.clone();
                tokio::spawn(policy.run_chain(operation, completion, generation, first));
                BackoffState::Running
            }
        }
    }

    async fn run_chain(
        self,
        operation: Arc<dyn RetryableOperation>,
        completion: Option<Completion>,
        generation: u64,
        first: Scheduled,
    ) {
        let mut next = first;
        let state = loop {
            tokio::time::sleep(Duration::from_secs_f64(next.delay_millis / 1000.0)).await;

            // A reset during the wait hands the run to a newer task.
            if !self.is_current(generation) {
                break BackoffState::Stopped;
            }

            let attempt = Attempt {
                number: next.attempt,
                last_interval_millis: next.delay_millis as u64,
                elapsed_time_millis: next.elapsed_time_millis as u64,
            };
            let (tx, rx) = oneshot::channel();
            operation.run(attempt, Report::new(self.clone(), generation, tx));

            // A dropped report closes the channel and counts as a failure.
            let success = rx.await.unwrap_or(false);
            if success {
                break self.mark_succeeded(generation);
            }

            match self.advance(generation) {
                Step::Scheduled(scheduled) => next = scheduled,
                Step::Finished(state) => break state,
            }
        };

        tracing::info!(
            policy = %self.inner.id,
            state = %state,
            attempts = self.attempts(),
            elapsed_ms = self.elapsed_time_millis(),
            "backoff finished"
        );
        notify(completion, state);
    }

    /// One decision point: count the attempt, honor stop and the budget,
    /// then compute and charge the next delay.
    fn advance(&self, generation: u64) -> Step {
        let config = &self.inner.config;
        let mut run = self.lock();

        if run.generation != generation {
            return Step::Finished(BackoffState::Stopped);
        }

        run.attempts += 1;

        if run.attempts != 1 && run.state == BackoffState::Stopped {
            return Step::Finished(run.state);
        }

        // Checked against delays already charged; this attempt's delay is not counted yet.
        if !config.is_unbounded()
            && run.elapsed_time_millis >= config.max_elapsed_time_millis() as f64
        {
            run.state = BackoffState::Failed;
            return Step::Finished(run.state);
        }

        let initial = config.initial_interval_millis() as f64;
        let base = match run.last_interval_millis {
            Some(previous) if previous > 0.0 => previous * config.multiplier(),
            _ => initial,
        };
        run.last_interval_millis = Some(base);

        let spread = config.randomization_factor();
        let range = (1.0 - spread)..=(1.0 + spread);
        let factor = match run.rng.as_mut() {
            Some(rng) => random::within_with(rng, range),
            None => random::within(range),
        };

        // f64::min discards NaN, so an overflowed base still caps cleanly.
        let delay = (base * factor).min(config.max_interval_millis() as f64);
        run.elapsed_time_millis += delay;
        run.state = BackoffState::Running;

        tracing::debug!(
            policy = %self.inner.id,
            attempt = run.attempts,
            delay_ms = delay as u64,
            elapsed_ms = run.elapsed_time_millis as u64,
            "scheduling attempt"
        );

        Step::Scheduled(Scheduled {
            attempt: run.attempts,
            delay_millis: delay,
            elapsed_time_millis: run.elapsed_time_millis,
        })
    }

    fn is_current(&self, generation: u64) -> bool {
        self.lock().generation == generation
    }

    /// Applies a success report. Only a running run can succeed; a stopped or
    /// superseded one reports `Stopped`.
    pub(crate) fn mark_succeeded(&self, generation: u64) -> BackoffState {
        let mut run = self.lock();
        if run.generation != generation {
            return BackoffState::Stopped;
        }
        if run.state == BackoffState::Running {
            run.state = BackoffState::Succeeded;
        }
        run.state
    }

    fn lock(&self) -> MutexGuard<'_, BackoffRun> {
        self.inner.run.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl fmt::Debug for BackoffPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let run = self.lock();
        f.debug_struct("BackoffPolicy")
            .field("id", &self.inner.id)
            .field("config", &self.inner.config)
            .field("state", &run.state)
            .field("attempts", &run.attempts)
            .field("elapsed_time_millis", &run.elapsed_time_millis)
            .finish()
    }
}

fn notify(completion: Option<Completion>, state: BackoffState) {
    if let Some(completion) = completion {
        completion(state);
    }
}
