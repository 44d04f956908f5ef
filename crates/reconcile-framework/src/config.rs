//! # Engine Configuration
//!
//! Every timing knob of the engine lives here. All durations are milliseconds so
//! the configuration can be written as plain JSON:
//!
//! ```rust
//! use reconcile_framework::config::{Backoff, EngineConfig};
//!
//! let config = EngineConfig::from_json(r#"{
//!     "poll": { "interval_ms": 500, "timeout_ms": 60000,
//!               "backoff": { "kind": "exponential", "multiplier": 2.0 } },
//!     "max_provisioning_attempts": 3
//! }"#).unwrap();
//!
//! assert_eq!(config.poll.backoff, Backoff::Exponential { multiplier: 2.0 });
//! assert_eq!(config.max_passes, 20); // defaulted
//! ```

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// How the wait between consecutive attempts grows.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Backoff {
    #[default]
    Fixed,
    Linear,
    Exponential { multiplier: f64 },
}

impl Backoff {
    /// Delay before attempt `attempt` (0-indexed), capped at `max_ms`.
    pub fn delay(&self, base_ms: u64, max_ms: u64, attempt: u32) -> Duration {
        let ms = match *self {
            Backoff::Fixed => base_ms,
            Backoff::Linear => base_ms.saturating_mul(attempt as u64 + 1),
            Backoff::Exponential { multiplier } => {
                let factor = multiplier.max(1.0).powi(attempt.min(64) as i32);
                let scaled = base_ms as f64 * factor;
                if scaled.is_finite() && scaled < u64::MAX as f64 {
                    scaled as u64
                } else {
                    u64::MAX
                }
            }
        };
        Duration::from_millis(ms.min(max_ms.max(base_ms)))
    }
}

/// Polling of non-terminal provisioning states.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PollPolicy {
    pub interval_ms: u64,
    pub max_interval_ms: u64,
    /// Deadline of one poll run. Zero performs a single read.
    pub timeout_ms: u64,
    pub backoff: Backoff,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            interval_ms: 2_000,
            max_interval_ms: 30_000,
            timeout_ms: 20 * 60 * 1_000,
            backoff: Backoff::Fixed,
        }
    }
}

impl PollPolicy {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Wait before tick `tick` (0 is the wait after the first read).
    pub fn delay(&self, tick: u32) -> Duration {
        self.backoff
            .delay(self.interval_ms, self.max_interval_ms, tick)
    }
}

/// Retry of transient adapter failures within one remote call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Total attempts, including the first one.
    pub max_attempts: u32,
    pub interval_ms: u64,
    pub max_interval_ms: u64,
    pub backoff: Backoff,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 4,
            interval_ms: 500,
            max_interval_ms: 8_000,
            backoff: Backoff::Exponential { multiplier: 2.0 },
        }
    }
}

impl RetryPolicy {
    /// A policy that never retries.
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// Whether another attempt may follow `attempts` failed ones.
    pub fn should_retry(&self, attempts: u32) -> bool {
        attempts < self.max_attempts.max(1)
    }

    pub fn delay(&self, retry: u32) -> Duration {
        self.backoff
            .delay(self.interval_ms, self.max_interval_ms, retry)
    }
}

/// Top-level engine settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub poll: PollPolicy,
    pub transient_retry: RetryPolicy,
    /// How many timed-out provisioning polls an instance gets before it is marked
    /// errored. `None` keeps retrying on every pass.
    pub max_provisioning_attempts: Option<u32>,
    /// Upper bound on passes of one `converge` run.
    pub max_passes: u32,
    pub pass_interval_ms: u64,
    /// Read every ready instance before diffing it.
    pub refresh_before_plan: bool,
    pub channel_capacity: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            poll: PollPolicy::default(),
            transient_retry: RetryPolicy::default(),
            max_provisioning_attempts: Some(3),
            max_passes: 20,
            pass_interval_ms: 1_000,
            refresh_before_plan: false,
            channel_capacity: 32,
        }
    }
}

impl EngineConfig {
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.channel_capacity == 0 {
            return Err(ConfigError::Invalid(
                "channel_capacity must be greater than zero".to_string(),
            ));
        }
        if self.max_passes == 0 {
            return Err(ConfigError::Invalid(
                "max_passes must be greater than zero".to_string(),
            ));
        }
        if let Backoff::Exponential { multiplier } = self.poll.backoff {
            if multiplier.is_nan() || multiplier < 1.0 {
                return Err(ConfigError::Invalid(format!(
                    "poll backoff multiplier must be at least 1.0, got {multiplier}"
                )));
            }
        }
        if self.max_provisioning_attempts == Some(0) {
            return Err(ConfigError::Invalid(
                "max_provisioning_attempts must be at least 1 when set".to_string(),
            ));
        }
        Ok(())
    }

    pub fn pass_interval(&self) -> Duration {
        Duration::from_millis(self.pass_interval_ms)
    }
}
