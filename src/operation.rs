//! The unit of work a backoff policy retries.
//!
//! The policy never knows what the work is. It hands the operation an
//! [`Attempt`] describing the schedule so far and a [`Report`] handle; the
//! operation does its work (inline, on another task, behind a network round
//! trip) and reports the outcome exactly once through that handle.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::oneshot;

use crate::policy::BackoffPolicy;
use crate::state::BackoffState;

/// Schedule information passed to each invocation of an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Attempt {
    /// 1-based attempt number within the current run.
    pub number: u32,
    /// Delay waited before this attempt, after jitter and capping.
    pub last_interval_millis: u64,
    /// Cumulative delay consumed by the run, including this attempt's.
    pub elapsed_time_millis: u64,
}

impl Attempt {
    pub fn last_interval(&self) -> Duration {
        Duration::from_millis(self.last_interval_millis)
    }

    pub fn elapsed_time(&self) -> Duration {
        Duration::from_millis(self.elapsed_time_millis)
    }
}

/// Single-use handle through which an operation reports its outcome.
///
/// Dropping a `Report` without calling [`report`](Self::report) counts as a
/// failed attempt.
pub struct Report {
    policy: BackoffPolicy,
    generation: u64,
    tx: Option<oneshot::Sender<bool>>,
}

impl Report {
    pub(crate) fn new(policy: BackoffPolicy, generation: u64, tx: oneshot::Sender<bool>) -> Self {
        Self {
            policy,
            generation,
            tx: Some(tx),
        }
    }

    /// Reports the attempt's outcome and returns the policy's state.
    ///
    /// On success the policy moves to `Succeeded` before this returns.
    pub fn report(mut self, success: bool) -> BackoffState {
        let state = if success {
            self.policy.mark_succeeded(self.generation)
        } else {
            self.policy.current_state()
        };
        if let Some(tx) = self.tx.take() {
            // The run may already be gone (stopped and reset); nothing to wake then.
            let _ = tx.send(success);
        }
        state
    }
}

impl Drop for Report {
    fn drop(&mut self) {
        if self.tx.is_some() {
            tracing::warn!(
                policy = %self.policy.id(),
                "operation dropped its report without reporting, treating as failure"
            );
        }
    }
}

impl fmt::Debug for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Report")
            .field("policy", &self.policy.id())
            .field("generation", &self.generation)
            .field("reported", &self.tx.is_none())
            .finish()
    }
}

/// Work that a [`BackoffPolicy`] retries until it succeeds.
///
/// Implementations must eventually call [`Report::report`] exactly once per
/// invocation, synchronously or from another task.
pub trait RetryableOperation: Send + Sync + 'static {
    /// Runs one attempt.
    fn run(&self, attempt: Attempt, report: Report);
}

impl<F> RetryableOperation for F
where
    F: Fn(Attempt, Report) + Send + Sync + 'static,
{
    fn run(&self, attempt: Attempt, report: Report) {
        self(attempt, report)
    }
}

/// Work expressed as an async function returning its outcome.
///
/// Wrap with [`from_async`] to hand it to a policy.
#[async_trait]
pub trait AsyncOperation: Send + Sync + 'static {
    /// Runs one attempt, returning true on success.
    async fn attempt(&self, attempt: Attempt) -> bool;
}

/// Adapter turning an [`AsyncOperation`] into a [`RetryableOperation`].
pub struct FromAsync<A> {
    inner: Arc<A>,
}

/// Wraps an [`AsyncOperation`] so each attempt runs on its own Tokio task.
pub fn from_async<A: AsyncOperation>(operation: A) -> FromAsync<A> {
    FromAsync {
        inner: Arc::new(operation),
    }
}

impl<A: AsyncOperation> RetryableOperation for FromAsync<A> {
    fn run(&self, attempt: Attempt, report: Report) {
        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move {
            let success = inner.attempt(attempt).await;
            report.report(success);
        });
    }
}
