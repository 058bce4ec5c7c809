//! Lifecycle states of a backoff run.

use std::fmt;

use serde::{Deserialize, Serialize};

/// State a [`BackoffPolicy`](crate::BackoffPolicy) is currently in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackoffState {
    /// Not started yet, or halted by `stop_execution`.
    #[default]
    Stopped,
    /// A delay is scheduled or the operation is in flight.
    Running,
    /// The elapsed-time budget ran out before the operation succeeded.
    Failed,
    /// The operation reported success.
    Succeeded,
}

impl BackoffState {
    /// Returns true for `Failed` and `Succeeded`.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Failed | Self::Succeeded)
    }
}

impl fmt::Display for BackoffState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Stopped => "stopped",
            Self::Running => "running",
            Self::Failed => "failed",
            Self::Succeeded => "succeeded",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_state_is_stopped() {
        assert_eq!(BackoffState::default(), BackoffState::Stopped);
    }

    #[test]
    fn only_failed_and_succeeded_are_terminal() {
        assert!(BackoffState::Failed.is_terminal());
        assert!(BackoffState::Succeeded.is_terminal());
        assert!(!BackoffState::Running.is_terminal());
        assert!(!BackoffState::Stopped.is_terminal());
    }

    #[test]
    fn state_serializes_lowercase() {
        assert_eq!(
            serde_json::to_string(&BackoffState::Succeeded).unwrap(),
            "\"succeeded\""
        );
        let parsed: BackoffState = serde_json::from_str("\"failed\"").unwrap();
        assert_eq!(parsed, BackoffState::Failed);
    }

    #[test]
    fn display_matches_serialized_name() {
        assert_eq!(BackoffState::Running.to_string(), "running");
        assert_eq!(BackoffState::Stopped.to_string(), "stopped");
    }
}
