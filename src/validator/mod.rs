//! Client-side access validation: a long-lived validator for one tool that
//! polls, retries network failures with backoff and reports changes.

pub mod checker;
pub mod client;
pub mod remote;
pub mod state;

use std::time::Duration;

use serde::Deserialize;

use crate::utils::error::ToolpassError;

pub use checker::{AccessChecker, CheckError, LocalAccessChecker};
pub use client::ClientValidator;
pub use remote::RemoteAccessClient;
pub use state::{ValidationResult, ValidatorState, backoff_delay};

#[derive(Debug, Clone, Deserialize)]
pub struct ValidatorConfig {
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,

    /// Network attempts per validation before giving up.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    #[serde(default = "default_base_backoff_ms")]
    pub base_backoff_ms: u64,

    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,
}

impl Default for ValidatorConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: default_poll_interval_secs(),
            max_attempts: default_max_attempts(),
            base_backoff_ms: default_base_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
        }
    }
}

impl ValidatorConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn backoff(&self, attempt: u32) -> Duration {
        backoff_delay(
            attempt,
            Duration::from_millis(self.base_backoff_ms),
            Duration::from_millis(self.max_backoff_ms),
        )
    }

    pub fn validate(&self) -> Result<(), ToolpassError> {
        if self.poll_interval_secs == 0 {
            return Err(ToolpassError::ConfigError(
                "validator.poll_interval_secs must be positive".into(),
            ));
        }
        if self.max_attempts == 0 {
            return Err(ToolpassError::ConfigError(
                "validator.max_attempts must be at least 1".into(),
            ));
        }
        if self.base_backoff_ms > self.max_backoff_ms {
            return Err(ToolpassError::ConfigError(format!(
                "validator.base_backoff_ms ({}) exceeds max_backoff_ms ({})",
                self.base_backoff_ms, self.max_backoff_ms
            )));
        }
        Ok(())
    }
}

fn default_poll_interval_secs() -> u64 {
    300
}

fn default_max_attempts() -> u32 {
    3
}

fn default_base_backoff_ms() -> u64 {
    1000
}

fn default_max_backoff_ms() -> u64 {
    10_000
}
