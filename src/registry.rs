//! Caller-owned collection of started policies.

use uuid::Uuid;

use crate::operation::RetryableOperation;
use crate::policy::BackoffPolicy;
use crate::state::BackoffState;

/// Tracks the policies a caller has started so they can be stopped or
/// restarted together.
#[derive(Debug, Default)]
pub struct BackoffRegistry {
    instances: Vec<BackoffPolicy>,
}

impl BackoffRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts `policy` with `operation` and keeps a handle to it.
    pub fn start(
        &mut self,
        policy: BackoffPolicy,
        operation: impl RetryableOperation,
    ) -> BackoffState {
        let state = policy.algorithm(operation);
        tracing::debug!(policy = %policy.id(), state = %state, "registered backoff");
        self.instances.push(policy);
        state
    }

    /// Like [`start`](Self::start), notifying `completion` once.
    pub fn start_with<F>(
        &mut self,
        policy: BackoffPolicy,
        operation: impl RetryableOperation,
        completion: F,
    ) -> BackoffState
    where
        F: FnOnce(BackoffState) + Send + 'static,
    {
        let state = policy.algorithm_with(operation, completion);
        self.instances.push(policy);
        state
    }

    pub fn instances(&self) -> &[BackoffPolicy] {
        &self.instances
    }

    pub fn get(&self, id: Uuid) -> Option<&BackoffPolicy> {
        self.instances.iter().find(|p| p.id() == id)
    }

    pub fn len(&self) -> usize {
        self.instances.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instances.is_empty()
    }

    /// Stops every running policy; returns each policy's resulting state.
    pub fn stop_all(&self) -> Vec<BackoffState> {
        self.instances.iter().map(BackoffPolicy::stop_execution).collect()
    }

    /// Resets every policy that is not running.
    pub fn reset_all(&self) -> Vec<BackoffState> {
        self.instances.iter().map(BackoffPolicy::reset).collect()
    }

    /// Number of policies currently running.
    pub fn running(&self) -> usize {
        self.instances
            .iter()
            .filter(|p| p.current_state() == BackoffState::Running)
            .count()
    }
}
