//! Error types for the exponential backoff crate.
//!
//! Backoff outcomes are never errors: a run that gives up resolves to
//! [`BackoffState::Failed`](crate::BackoffState::Failed). Errors only arise
//! while building or loading a configuration.

use std::path::PathBuf;
use thiserror::Error;

/// Top-level error type.
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration failed validation.
    #[error("configuration error: {0}")]
    Config(String),

    /// The configuration file has an extension we cannot parse.
    #[error("unsupported configuration format: {0}")]
    UnsupportedFormat(PathBuf),

    /// IO error while reading a configuration file.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// TOML configuration could not be parsed.
    #[error("invalid TOML configuration: {0}")]
    Toml(#[from] toml::de::Error),

    /// YAML configuration could not be parsed.
    #[error("invalid YAML configuration: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// JSON configuration could not be parsed.
    #[error("invalid JSON configuration: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type alias for configuration operations.
pub type Result<T> = std::result::Result<T, Error>;
