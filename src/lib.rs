//! Exponential backoff - retry an unreliable operation with growing, jittered delays
//!
//! A [`BackoffPolicy`] re-invokes a [`RetryableOperation`] until it reports
//! success or the cumulative delay exceeds the configured budget. Every run
//! ends in one of the [`BackoffState`] values; errors are reserved for
//! invalid configuration.

pub mod config;
pub mod error;
pub mod operation;
pub mod policy;
pub mod random;
pub mod registry;
pub mod state;

pub use config::{
    BackoffConfig, BackoffConfigBuilder, Validate, ValidationResult,
    DEFAULT_INITIAL_INTERVAL_MILLIS, DEFAULT_MAX_ELAPSED_TIME_MILLIS, DEFAULT_MAX_INTERVAL_MILLIS,
    DEFAULT_MULTIPLIER, DEFAULT_RANDOMIZATION_FACTOR, UNBOUNDED_ELAPSED_TIME_MILLIS,
};
pub use error::{Error, Result};
pub use operation::{from_async, AsyncOperation, Attempt, FromAsync, Report, RetryableOperation};
pub use policy::{BackoffPolicy, Completion};
pub use registry::BackoffRegistry;
pub use state::BackoffState;
