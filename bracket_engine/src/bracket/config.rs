//! Engine tuning knobs.

use log::warn;
use std::env;
use std::time::Duration;

/// Progression retry behaviour
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// Attempts per progression when a concurrent write is detected
    pub max_progress_attempts: u32,

    /// Pause between attempts in milliseconds
    pub retry_backoff_ms: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_progress_attempts: 3,
            retry_backoff_ms: 25,
        }
    }
}

impl EngineConfig {
    /// Load from the environment
    ///
    /// - `ENGINE_MAX_PROGRESS_ATTEMPTS` (default: 3, minimum 1)
    /// - `ENGINE_RETRY_BACKOFF_MS` (default: 25)
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let max_progress_attempts = match env::var("ENGINE_MAX_PROGRESS_ATTEMPTS") {
            Ok(raw) => match raw.parse::<u32>() {
                Ok(n) if n >= 1 => n,
                _ => {
                    warn!(
                        "Ignoring invalid ENGINE_MAX_PROGRESS_ATTEMPTS={:?}, using {}",
                        raw, defaults.max_progress_attempts
                    );
                    defaults.max_progress_attempts
                }
            },
            Err(_) => defaults.max_progress_attempts,
        };

        let retry_backoff_ms = match env::var("ENGINE_RETRY_BACKOFF_MS") {
            Ok(raw) => raw.parse().unwrap_or_else(|_| {
                warn!(
                    "Ignoring invalid ENGINE_RETRY_BACKOFF_MS={:?}, using {}",
                    raw, defaults.retry_backoff_ms
                );
                defaults.retry_backoff_ms
            }),
            Err(_) => defaults.retry_backoff_ms,
        };

        Self {
            max_progress_attempts,
            retry_backoff_ms,
        }
    }

    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }
}
