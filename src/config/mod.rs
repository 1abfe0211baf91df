//! Configuration Management
//!
//! Loads engine options from TOML files. Every key is optional and falls back
//! to a documented default:
//! - Feature toggles (auto-recovery, circuit breakers, health checks, logging, notification)
//! - Concurrency and timeout limits
//! - Health polling interval and error retention
//! - Circuit breaker defaults for breakers created on demand

use crate::errors::SelfHealError;
use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default = "default_true")]
    pub enable_auto_recovery: bool,
    #[serde(default = "default_true")]
    pub enable_circuit_breakers: bool,
    #[serde(default = "default_true")]
    pub enable_health_checks: bool,
    #[serde(default = "default_true")]
    pub enable_error_logging: bool,
    #[serde(default = "default_true")]
    pub enable_notification: bool,
    /// Upper bound on recoveries executing at the same time
    #[serde(default = "default_max_concurrent_recoveries")]
    pub max_concurrent_recoveries: usize,
    /// Engine-wide timeout for a single recovery attempt
    #[serde(default = "default_recovery_timeout_ms")]
    pub recovery_timeout_ms: u64,
    #[serde(default = "default_health_check_interval_ms")]
    pub health_check_interval_ms: u64,
    /// How long resolved errors are kept before `purge_expired_errors` drops them
    #[serde(default = "default_error_retention_period_ms")]
    pub error_retention_period_ms: u64,
    #[serde(default = "default_notification_channels")]
    pub notification_channels: Vec<String>,

    #[serde(default)]
    pub circuit_breaker: CircuitBreakerDefaults,
}

/// Settings applied to circuit breakers created on demand
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CircuitBreakerDefaults {
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u32,
    #[serde(default = "default_breaker_recovery_timeout_ms")]
    pub recovery_timeout_ms: u64,
    /// Successes needed in half-open before the breaker closes again
    #[serde(default = "default_success_threshold")]
    pub success_threshold: u32,
}

impl Default for CircuitBreakerDefaults {
    fn default() -> Self {
        Self {
            failure_threshold: default_failure_threshold(),
            recovery_timeout_ms: default_breaker_recovery_timeout_ms(),
            success_threshold: default_success_threshold(),
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            enable_auto_recovery: true,
            enable_circuit_breakers: true,
            enable_health_checks: true,
            enable_error_logging: true,
            enable_notification: true,
            max_concurrent_recoveries: default_max_concurrent_recoveries(),
            recovery_timeout_ms: default_recovery_timeout_ms(),
            health_check_interval_ms: default_health_check_interval_ms(),
            error_retention_period_ms: default_error_retention_period_ms(),
            notification_channels: default_notification_channels(),
            circuit_breaker: CircuitBreakerDefaults::default(),
        }
    }
}

fn default_true() -> bool {
    true
}
fn default_max_concurrent_recoveries() -> usize {
    5
}
fn default_recovery_timeout_ms() -> u64 {
    30_000
}
fn default_health_check_interval_ms() -> u64 {
    30_000
}
fn default_error_retention_period_ms() -> u64 {
    24 * 60 * 60 * 1000
}
fn default_notification_channels() -> Vec<String> {
    vec!["console".to_string()]
}
fn default_failure_threshold() -> u32 {
    5
}
fn default_breaker_recovery_timeout_ms() -> u64 {
    60_000
}
fn default_success_threshold() -> u32 {
    3
}

impl EngineConfig {
    pub fn load(path: Option<&str>) -> anyhow::Result<Self> {
        let mut config: Self = match path {
            Some(p) => {
                let content = std::fs::read_to_string(p)
                    .with_context(|| format!("Failed to read config from {}", p))?;
                toml::from_str(&content).context("Failed to parse config")?
            }
            None => {
                let mut default_paths = vec![std::path::PathBuf::from("selfheal.toml")];
                if let Some(home) = dirs::home_dir() {
                    default_paths.push(home.join(".config/selfheal/config.toml"));
                }

                let mut loaded = None;
                for p in &default_paths {
                    if let Ok(content) = std::fs::read_to_string(p) {
                        loaded = Some(toml::from_str(&content).with_context(|| {
                            format!("Failed to parse config {}", p.display())
                        })?);
                        break;
                    }
                }
                loaded.unwrap_or_default()
            }
        };

        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(v) = std::env::var("SELFHEAL_AUTO_RECOVERY") {
            if let Ok(b) = v.parse::<bool>() {
                self.enable_auto_recovery = b;
            }
        }
        if let Ok(v) = std::env::var("SELFHEAL_MAX_CONCURRENT_RECOVERIES") {
            if let Ok(n) = v.parse::<usize>() {
                self.max_concurrent_recoveries = n;
            }
        }
        if let Ok(v) = std::env::var("SELFHEAL_RECOVERY_TIMEOUT_MS") {
            if let Ok(n) = v.parse::<u64>() {
                self.recovery_timeout_ms = n;
            }
        }
        if let Ok(v) = std::env::var("SELFHEAL_HEALTH_CHECK_INTERVAL_MS") {
            if let Ok(n) = v.parse::<u64>() {
                self.health_check_interval_ms = n;
            }
        }
    }

    /// Reject option combinations the engine cannot run with.
    pub fn validate(&self) -> Result<(), SelfHealError> {
        if self.max_concurrent_recoveries == 0 {
            return Err(SelfHealError::Config(
                "max_concurrent_recoveries must be greater than 0".into(),
            ));
        }
        if self.recovery_timeout_ms == 0 {
            return Err(SelfHealError::Config(
                "recovery_timeout_ms must be greater than 0".into(),
            ));
        }
        if self.health_check_interval_ms == 0 {
            return Err(SelfHealError::Config(
                "health_check_interval_ms must be greater than 0".into(),
            ));
        }
        if self.circuit_breaker.failure_threshold == 0 {
            return Err(SelfHealError::Config(
                "circuit_breaker.failure_threshold must be greater than 0".into(),
            ));
        }
        if self.circuit_breaker.success_threshold == 0 {
            return Err(SelfHealError::Config(
                "circuit_breaker.success_threshold must be greater than 0".into(),
            ));
        }
        Ok(())
    }

    pub fn recovery_timeout(&self) -> Duration {
        Duration::from_millis(self.recovery_timeout_ms)
    }

    pub fn health_check_interval(&self) -> Duration {
        Duration::from_millis(self.health_check_interval_ms)
    }

    pub fn error_retention_period(&self) -> Duration {
        Duration::from_millis(self.error_retention_period_ms)
    }

    pub fn to_toml(&self) -> anyhow::Result<String> {
        toml::to_string_pretty(self).context("Failed to serialize config")
    }
}
