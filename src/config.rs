//! Backoff configuration and its validation.
//!
//! A [`BackoffConfig`] is immutable once built. It can be assembled with the
//! fluent [`BackoffConfigBuilder`] or loaded from a TOML, YAML or JSON file;
//! every path runs the same [`Validate`] checks before handing out a config.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Default initial interval (0.5 seconds).
pub const DEFAULT_INITIAL_INTERVAL_MILLIS: u64 = 500;

/// Default elapsed-time budget (15 minutes).
pub const DEFAULT_MAX_ELAPSED_TIME_MILLIS: u64 = 900_000;

/// Default cap on a single delay (1 minute).
pub const DEFAULT_MAX_INTERVAL_MILLIS: u64 = 60_000;

/// Default multiplier (50% increase per attempt).
pub const DEFAULT_MULTIPLIER: f64 = 1.5;

/// Default randomization factor (delays vary between 50% below and 50% above the base).
pub const DEFAULT_RANDOMIZATION_FACTOR: f64 = 0.5;

/// Elapsed-time budget that never runs out.
pub const UNBOUNDED_ELAPSED_TIME_MILLIS: u64 = u64::MAX;

/// Validation result containing all found issues.
#[derive(Debug, Clone, Default)]
pub struct ValidationResult {
    /// List of validation errors (fatal).
    pub errors: Vec<String>,
    /// List of validation warnings (non-fatal).
    pub warnings: Vec<String>,
}

impl ValidationResult {
    /// Returns true if validation passed (no errors).
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    /// Adds an error to the result.
    pub fn add_error(&mut self, msg: impl Into<String>) {
        self.errors.push(msg.into());
    }

    /// Adds a warning to the result.
    pub fn add_warning(&mut self, msg: impl Into<String>) {
        self.warnings.push(msg.into());
    }

    /// Converts to a Result, failing if there are errors.
    pub fn into_result(self) -> Result<Vec<String>> {
        if self.is_valid() {
            Ok(self.warnings)
        } else {
            Err(Error::Config(self.errors.join("; ")))
        }
    }
}

/// Trait for validatable configuration types.
pub trait Validate {
    /// Validates the configuration and returns any issues found.
    fn validate(&self) -> ValidationResult;
}

/// Immutable parameters of an exponential backoff.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackoffConfig {
    #[serde(default = "default_initial_interval_millis")]
    initial_interval_millis: u64,
    #[serde(default = "default_max_elapsed_time_millis")]
    max_elapsed_time_millis: u64,
    #[serde(default = "default_max_interval_millis")]
    max_interval_millis: u64,
    #[serde(default = "default_multiplier")]
    multiplier: f64,
    #[serde(default = "default_randomization_factor")]
    randomization_factor: f64,
}

fn default_initial_interval_millis() -> u64 {
    DEFAULT_INITIAL_INTERVAL_MILLIS
}

fn default_max_elapsed_time_millis() -> u64 {
    DEFAULT_MAX_ELAPSED_TIME_MILLIS
}

fn default_max_interval_millis() -> u64 {
    DEFAULT_MAX_INTERVAL_MILLIS
}

fn default_multiplier() -> f64 {
    DEFAULT_MULTIPLIER
}

fn default_randomization_factor() -> f64 {
    DEFAULT_RANDOMIZATION_FACTOR
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            initial_interval_millis: DEFAULT_INITIAL_INTERVAL_MILLIS,
            max_elapsed_time_millis: DEFAULT_MAX_ELAPSED_TIME_MILLIS,
            max_interval_millis: DEFAULT_MAX_INTERVAL_MILLIS,
            multiplier: DEFAULT_MULTIPLIER,
            randomization_factor: DEFAULT_RANDOMIZATION_FACTOR,
        }
    }
}

impl BackoffConfig {
    /// Creates a builder seeded with the default values.
    pub fn builder() -> BackoffConfigBuilder {
        BackoffConfigBuilder::default()
    }

    /// Parses and validates a TOML document.
    pub fn from_toml_str(s: &str) -> Result<Self> {
        let config: Self = toml::from_str(s)?;
        config.validated()
    }

    /// Parses and validates a YAML document.
    pub fn from_yaml_str(s: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(s)?;
        config.validated()
    }

    /// Parses and validates a JSON document.
    pub fn from_json_str(s: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(s)?;
        config.validated()
    }

    /// Loads a configuration file, picking the parser from its extension.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase);
        let parse: fn(&str) -> Result<Self> = match ext.as_deref() {
            Some("toml") => Self::from_toml_str,
            Some("yaml") | Some("yml") => Self::from_yaml_str,
            Some("json") => Self::from_json_str,
            _ => return Err(Error::UnsupportedFormat(path.to_path_buf())),
        };
        let contents = std::fs::read_to_string(path)?;
        parse(&contents)
    }

    fn validated(self) -> Result<Self> {
        let warnings = self.validate().into_result()?;
        for warning in &warnings {
            tracing::warn!(warning = %warning, "backoff configuration");
        }
        Ok(self)
    }

    pub fn initial_interval_millis(&self) -> u64 {
        self.initial_interval_millis
    }

    pub fn max_elapsed_time_millis(&self) -> u64 {
        self.max_elapsed_time_millis
    }

    pub fn max_interval_millis(&self) -> u64 {
        self.max_interval_millis
    }

    pub fn multiplier(&self) -> f64 {
        self.multiplier
    }

    pub fn randomization_factor(&self) -> f64 {
        self.randomization_factor
    }

    /// Returns true when the elapsed-time budget never runs out.
    pub fn is_unbounded(&self) -> bool {
        self.max_elapsed_time_millis == UNBOUNDED_ELAPSED_TIME_MILLIS
    }

    pub fn initial_interval(&self) -> Duration {
        Duration::from_millis(self.initial_interval_millis)
    }

    pub fn max_interval(&self) -> Duration {
        Duration::from_millis(self.max_interval_millis)
    }

    /// The elapsed-time budget, or `None` when unbounded.
    pub fn max_elapsed_time(&self) -> Option<Duration> {
        (!self.is_unbounded()).then(|| Duration::from_millis(self.max_elapsed_time_millis))
    }
}

impl Validate for BackoffConfig {
    fn validate(&self) -> ValidationResult {
        let mut result = ValidationResult::default();

        if self.initial_interval_millis == 0 {
            result.add_error("initial_interval_millis must be greater than 0");
        }

        if self.max_interval_millis == 0 {
            result.add_error("max_interval_millis must be greater than 0");
        }

        if self.max_elapsed_time_millis == 0 {
            result.add_error("max_elapsed_time_millis must be greater than 0");
        }

        // NaN fails both comparisons, so test for the valid range
        if !(self.multiplier.is_finite() && self.multiplier > 1.0) {
            result.add_error(format!(
                "multiplier must be a finite value greater than 1.0, got {}",
                self.multiplier
            ));
        }

        if !(0.0..=1.0).contains(&self.randomization_factor) {
            result.add_error(format!(
                "randomization_factor must be within [0.0, 1.0], got {}",
                self.randomization_factor
            ));
        }

        if self.initial_interval_millis > self.max_interval_millis && self.max_interval_millis > 0 {
            result.add_warning(
                "initial_interval_millis exceeds max_interval_millis - every delay will be capped",
            );
        }

        if self.max_interval_millis > self.max_elapsed_time_millis && self.max_elapsed_time_millis > 0
        {
            result.add_warning(
                "max_interval_millis exceeds max_elapsed_time_millis - the budget may run out after a single capped delay",
            );
        }

        result
    }
}

/// Fluent builder for [`BackoffConfig`].
///
/// Unset fields keep their defaults; [`build`](Self::build) validates.
#[derive(Debug, Clone, Default)]
pub struct BackoffConfigBuilder {
    config: BackoffConfig,
}

impl BackoffConfigBuilder {
    /// Sets the first base delay.
    pub fn initial_interval_millis(mut self, millis: u64) -> Self {
        self.config.initial_interval_millis = millis;
        self
    }

    /// Sets the total delay budget after which the run fails.
    pub fn max_elapsed_time_millis(mut self, millis: u64) -> Self {
        self.config.max_elapsed_time_millis = millis;
        self
    }

    /// Removes the elapsed-time budget: the run only ends on success or stop.
    pub fn unbounded_elapsed_time(mut self) -> Self {
        self.config.max_elapsed_time_millis = UNBOUNDED_ELAPSED_TIME_MILLIS;
        self
    }

    /// Sets the cap applied to each delay.
    pub fn max_interval_millis(mut self, millis: u64) -> Self {
        self.config.max_interval_millis = millis;
        self
    }

    /// Sets the growth factor between consecutive base delays.
    pub fn multiplier(mut self, multiplier: f64) -> Self {
        self.config.multiplier = multiplier;
        self
    }

    /// Sets the jitter spread; a delay is scaled by a factor drawn from
    /// `[1 - factor, 1 + factor]`.
    pub fn randomization_factor(mut self, factor: f64) -> Self {
        self.config.randomization_factor = factor;
        self
    }

    /// Validates and returns the configuration.
    pub fn build(self) -> Result<BackoffConfig> {
        self.config.validated()
    }
}
