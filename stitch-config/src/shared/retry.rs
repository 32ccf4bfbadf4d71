use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::shared::ValidationError;

/// Retry behavior for resumable source cursors.
///
/// Transient connection faults are retried with a fixed inter-attempt delay
/// up to `max_attempts`; exceeding the budget fails the stream.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct SourceRetryConfig {
    /// Maximum retry attempts per fetch before the stream fails.
    ///
    /// Default: 10
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Fixed delay between attempts, in milliseconds.
    ///
    /// Default: 100ms
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
    /// Emit a warning every this many consecutive failures.
    ///
    /// Default: 10
    #[serde(default = "default_warn_every")]
    pub warn_every: u32,
}

fn default_max_attempts() -> u32 {
    10
}

fn default_retry_delay_ms() -> u64 {
    100
}

fn default_warn_every() -> u32 {
    10
}

impl SourceRetryConfig {
    /// Returns the inter-attempt delay as a [`Duration`].
    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    /// Validates retry settings.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.max_attempts == 0 {
            return Err(ValidationError::MaxAttemptsZero);
        }
        Ok(())
    }
}

impl Default for SourceRetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            retry_delay_ms: default_retry_delay_ms(),
            warn_every: default_warn_every(),
        }
    }
}
