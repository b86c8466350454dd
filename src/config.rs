//! # Dispatcher Configuration
//!
//! Layered configuration loaded with the `config` crate: built-in defaults,
//! then an optional configuration file, then `PAPA_EVENTS_*` environment
//! variables (e.g. `PAPA_EVENTS_MAX_JOBS=50`).

use crate::error::{EventError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Prefix for environment variable overrides
pub const ENV_PREFIX: &str = "PAPA_EVENTS";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatcherConfig {
    /// Maximum number of handler invocations in flight at once
    pub max_jobs: usize,
    /// Default additional attempts for a failed handler invocation
    pub retries: u32,
    /// Delay between attempts of a failed invocation
    pub retry_delay_ms: u64,
    /// Per-invocation timeout; no timeout when unset
    pub handler_timeout_ms: Option<u64>,
    /// How long `stop` waits for in-flight handlers before abandoning them
    pub drain_timeout_ms: u64,
    /// Capacity of the dispatch outcome broadcast channel
    pub outcome_buffer: usize,
    /// Dead letters kept per use case; oldest are evicted first
    pub dead_letter_capacity: usize,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            max_jobs: 20,
            retries: 0,
            retry_delay_ms: 1000,
            handler_timeout_ms: None,
            drain_timeout_ms: 30_000,
            outcome_buffer: 1024,
            dead_letter_capacity: 1000,
        }
    }
}

impl DispatcherConfig {
    /// Load defaults overridden by `PAPA_EVENTS_*` environment variables
    pub fn from_env() -> Result<Self> {
        Self::load(None)
    }

    /// Load defaults, an optional file, then environment overrides
    pub fn load(path: Option<&Path>) -> Result<Self> {
        Self::load_with_environment(path, config::Environment::with_prefix(ENV_PREFIX))
    }

    pub(crate) fn load_with_environment(
        path: Option<&Path>,
        environment: config::Environment,
    ) -> Result<Self> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path));
        }

        let config: Self = builder
            .add_source(environment.try_parsing(true))
            .build()?
            .try_deserialize()?;

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_jobs == 0 {
            return Err(EventError::Configuration(
                "max_jobs must be greater than zero".to_string(),
            ));
        }
        if self.outcome_buffer == 0 {
            return Err(EventError::Configuration(
                "outcome_buffer must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    pub fn handler_timeout(&self) -> Option<Duration> {
        self.handler_timeout_ms.map(Duration::from_millis)
    }

    pub fn drain_timeout(&self) -> Duration {
        Duration::from_millis(self.drain_timeout_ms)
    }
}
