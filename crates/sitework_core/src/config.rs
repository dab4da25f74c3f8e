//! Engine configuration.
//!
//! # Responsibility
//! - Hold reward, level and retry tunables in one injectable value.
//! - Load overrides from JSON supplied by the host application.
//!
//! # Invariants
//! - `level_size > 0`.
//! - `retry.max_attempts >= 1`; retries are always bounded.

use crate::logging::LogSettings;
use crate::model::experience::DEFAULT_LEVEL_SIZE;
use crate::model::work_item::{Priority, DEFAULT_XP_BASE, MAX_XP_BASE};
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::time::Duration;

const DEFAULT_MAX_ATTEMPTS: u32 = 5;
const DEFAULT_BACKOFF_MS: u64 = 10;
const MAX_BACKOFF_MS: u64 = 1_000;

/// Configuration load/validation error.
#[derive(Debug)]
pub enum ConfigError {
    Parse(serde_json::Error),
    Invalid(String),
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Parse(err) => write!(f, "invalid engine config json: {err}"),
            Self::Invalid(message) => write!(f, "invalid engine config: {message}"),
        }
    }
}

impl Error for ConfigError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Parse(err) => Some(err),
            Self::Invalid(_) => None,
        }
    }
}

impl From<serde_json::Error> for ConfigError {
    fn from(value: serde_json::Error) -> Self {
        Self::Parse(value)
    }
}

/// Top-level engine configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Experience points per level.
    pub level_size: i64,
    /// Reward base assigned to new work items that do not specify one.
    pub base_reward: i64,
    pub priority_bonus: PriorityBonus,
    pub retry: RetryPolicy,
    /// Handed to [`crate::init_logging`] by the host at startup.
    pub logging: LogSettings,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            level_size: DEFAULT_LEVEL_SIZE,
            base_reward: DEFAULT_XP_BASE,
            priority_bonus: PriorityBonus::default(),
            retry: RetryPolicy::default(),
            logging: LogSettings::default(),
        }
    }
}

impl EngineConfig {
    /// Parses a (possibly partial) JSON document over the defaults.
    pub fn from_json_str(raw: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.level_size <= 0 {
            return Err(ConfigError::Invalid(format!(
                "level_size must be positive, got {}",
                self.level_size
            )));
        }
        if !(0..=MAX_XP_BASE).contains(&self.base_reward) {
            return Err(ConfigError::Invalid(format!(
                "base_reward must be within 0..={MAX_XP_BASE}, got {}",
                self.base_reward
            )));
        }
        if self.retry.max_attempts == 0 {
            return Err(ConfigError::Invalid(
                "retry.max_attempts must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Bonus experience added on top of the reward base, per priority.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PriorityBonus {
    pub low: i64,
    pub medium: i64,
    pub high: i64,
    pub critical: i64,
}

impl Default for PriorityBonus {
    fn default() -> Self {
        Self {
            low: 0,
            medium: 10,
            high: 30,
            critical: 50,
        }
    }
}

impl PriorityBonus {
    pub fn for_priority(&self, priority: Priority) -> i64 {
        match priority {
            Priority::Low => self.low,
            Priority::Medium => self.medium,
            Priority::High => self.high,
            Priority::Critical => self.critical,
        }
    }
}

/// Bounded retry policy for optimistic single-document writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    /// Linear backoff step between attempts; zero disables sleeping.
    pub backoff_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            backoff_ms: DEFAULT_BACKOFF_MS,
        }
    }
}

impl RetryPolicy {
    /// Policy that never sleeps between attempts.
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            backoff_ms: 0,
        }
    }

    pub(crate) fn attempts(&self) -> u32 {
        self.max_attempts.max(1)
    }

    pub(crate) fn backoff(&self, attempt: u32) -> Duration {
        let millis = self
            .backoff_ms
            .saturating_mul(u64::from(attempt))
            .min(MAX_BACKOFF_MS);
        Duration::from_millis(millis)
    }
}
