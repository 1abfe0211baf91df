//! Circuit breakers gating recovery attempts per component or plugin
//!
//! Breakers never flip from open to half-open on a timer. The transition is
//! derived when an attempt starts and `next_attempt_time` has passed.

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::config::CircuitBreakerDefaults;
use crate::errors::RegistrationError;
use crate::self_healing::SystemError;

/// Circuit state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    Closed,   // Normal operation
    Open,     // Failing, recovery suppressed
    HalfOpen, // Probing whether the component came back
}

/// Breaker for one component or plugin
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CircuitBreaker {
    /// `component:<name>` or `plugin:<name>`
    pub id: String,
    pub state: CircuitState,
    pub failure_count: u32,
    pub failure_threshold: u32,
    pub recovery_timeout_ms: u64,
    /// Successes needed in half-open before closing
    pub success_threshold: u32,
    pub last_failure_time: Option<DateTime<Utc>>,
    pub next_attempt_time: Option<DateTime<Utc>>,
    pub request_count: u64,
    pub success_count: u32,
}

impl CircuitBreaker {
    pub fn new(id: &str, failure_threshold: u32, recovery_timeout: Duration) -> Self {
        Self {
            id: id.to_string(),
            state: CircuitState::Closed,
            failure_count: 0,
            failure_threshold,
            recovery_timeout_ms: recovery_timeout.as_millis() as u64,
            success_threshold: 3,
            last_failure_time: None,
            next_attempt_time: None,
            request_count: 0,
            success_count: 0,
        }
    }

    pub fn for_component(name: &str, failure_threshold: u32, recovery_timeout: Duration) -> Self {
        Self::new(&component_key(name), failure_threshold, recovery_timeout)
    }

    pub fn for_plugin(name: &str, failure_threshold: u32, recovery_timeout: Duration) -> Self {
        Self::new(&plugin_key(name), failure_threshold, recovery_timeout)
    }

    pub fn with_success_threshold(mut self, threshold: u32) -> Self {
        self.success_threshold = threshold;
        self
    }

    fn from_defaults(id: &str, defaults: &CircuitBreakerDefaults) -> Self {
        Self::new(
            id,
            defaults.failure_threshold,
            Duration::from_millis(defaults.recovery_timeout_ms),
        )
        .with_success_threshold(defaults.success_threshold)
    }

    pub fn recovery_timeout(&self) -> Duration {
        Duration::from_millis(self.recovery_timeout_ms)
    }

    fn open(&mut self, now: DateTime<Utc>) {
        let delta = chrono::Duration::from_std(self.recovery_timeout())
            .unwrap_or_else(|_| chrono::Duration::days(36_500));
        let old_state = self.state;
        self.state = CircuitState::Open;
        self.success_count = 0;
        self.next_attempt_time = Some(now.checked_add_signed(delta).unwrap_or(now));
        if old_state != CircuitState::Open {
            warn!(
                breaker = %self.id,
                old_state = ?old_state,
                failure_count = self.failure_count,
                "Circuit breaker opened"
            );
        }
    }

    fn close(&mut self) {
        self.state = CircuitState::Closed;
        self.failure_count = 0;
        self.success_count = 0;
        self.next_attempt_time = None;
        info!(breaker = %self.id, "Circuit breaker closed after successful recovery");
    }
}

pub fn component_key(name: &str) -> String {
    format!("component:{}", name)
}

pub fn plugin_key(name: &str) -> String {
    format!("plugin:{}", name)
}

/// Outcome of checking a breaker before a recovery attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakerGate {
    /// Closed, or no breaker applies
    Allowed,
    /// Half-open: the attempt is a trial
    Probe,
    /// Open and still cooling down
    Blocked { retry_at: DateTime<Utc> },
}

impl BreakerGate {
    pub fn permits(&self) -> bool {
        !matches!(self, BreakerGate::Blocked { .. })
    }
}

/// Count of breakers per state
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BreakerStateCounts {
    pub closed: usize,
    pub open: usize,
    pub half_open: usize,
}

/// Keyed table of circuit breakers
pub struct CircuitBreakerManager {
    breakers: RwLock<HashMap<String, CircuitBreaker>>,
    defaults: CircuitBreakerDefaults,
}

impl CircuitBreakerManager {
    pub fn new(defaults: CircuitBreakerDefaults) -> Self {
        Self {
            breakers: RwLock::new(HashMap::new()),
            defaults,
        }
    }

    /// Register or replace a breaker
    pub fn add(&self, breaker: CircuitBreaker) -> Result<(), RegistrationError> {
        let invalid = |reason: &str| RegistrationError::InvalidCircuitBreaker {
            id: breaker.id.clone(),
            reason: reason.to_string(),
        };
        if breaker.id.trim().is_empty() {
            return Err(invalid("id must not be empty"));
        }
        if breaker.failure_threshold == 0 {
            return Err(invalid("failure_threshold must be at least 1"));
        }
        if breaker.success_threshold == 0 {
            return Err(invalid("success_threshold must be at least 1"));
        }
        debug!(breaker = %breaker.id, "Circuit breaker registered");
        self.breakers.write().insert(breaker.id.clone(), breaker);
        Ok(())
    }

    pub fn remove(&self, id: &str) -> Result<CircuitBreaker, RegistrationError> {
        self.breakers
            .write()
            .remove(id)
            .ok_or_else(|| RegistrationError::UnknownCircuitBreaker { id: id.to_string() })
    }

    pub fn get(&self, id: &str) -> Option<CircuitBreaker> {
        self.breakers.read().get(id).cloned()
    }

    pub fn list(&self) -> Vec<CircuitBreaker> {
        let mut all: Vec<CircuitBreaker> = self.breakers.read().values().cloned().collect();
        all.sort_by(|a, b| a.id.cmp(&b.id));
        all
    }

    /// The breaker key an error maps to; plugins win over components.
    pub fn key_for(error: &SystemError) -> Option<String> {
        error
            .plugin
            .as_deref()
            .map(plugin_key)
            .or_else(|| error.component.as_deref().map(component_key))
    }

    /// Create a breaker with the configured defaults if none exists yet.
    pub fn ensure(&self, id: &str) {
        let mut breakers = self.breakers.write();
        if !breakers.contains_key(id) {
            debug!(breaker = %id, "Creating circuit breaker with defaults");
            breakers.insert(id.to_string(), CircuitBreaker::from_defaults(id, &self.defaults));
        }
    }

    pub fn check(&self, id: &str) -> BreakerGate {
        self.check_at(id, Utc::now())
    }

    /// Gate an attempt at `now`; an expired open breaker moves to half-open here.
    pub fn check_at(&self, id: &str, now: DateTime<Utc>) -> BreakerGate {
        let mut breakers = self.breakers.write();
        let Some(breaker) = breakers.get_mut(id) else {
            return BreakerGate::Allowed;
        };

        match breaker.state {
            CircuitState::Closed => BreakerGate::Allowed,
            CircuitState::HalfOpen => BreakerGate::Probe,
            CircuitState::Open => match breaker.next_attempt_time {
                Some(retry_at) if now < retry_at => BreakerGate::Blocked { retry_at },
                _ => {
                    breaker.state = CircuitState::HalfOpen;
                    breaker.success_count = 0;
                    info!(breaker = %breaker.id, "Circuit breaker half-open, allowing trial recovery");
                    BreakerGate::Probe
                }
            },
        }
    }

    pub fn record_success(&self, id: &str) {
        let mut breakers = self.breakers.write();
        let Some(breaker) = breakers.get_mut(id) else {
            return;
        };

        breaker.success_count = breaker.success_count.saturating_add(1);
        breaker.request_count = breaker.request_count.saturating_add(1);
        breaker.failure_count = breaker.failure_count.saturating_sub(1);
        debug!(breaker = %id, success_count = breaker.success_count, "Recovery success recorded");

        if breaker.state == CircuitState::HalfOpen
            && breaker.success_count >= breaker.success_threshold
        {
            breaker.close();
        }
    }

    pub fn record_failure(&self, id: &str) {
        self.record_failure_at(id, Utc::now())
    }

    pub fn record_failure_at(&self, id: &str, now: DateTime<Utc>) {
        let mut breakers = self.breakers.write();
        let Some(breaker) = breakers.get_mut(id) else {
            return;
        };

        breaker.failure_count = breaker.failure_count.saturating_add(1);
        breaker.request_count = breaker.request_count.saturating_add(1);
        breaker.last_failure_time = Some(now);
        debug!(breaker = %id, failure_count = breaker.failure_count, "Recovery failure recorded");

        if breaker.failure_count >= breaker.failure_threshold {
            breaker.open(now);
        }
    }

    pub fn state_counts(&self) -> BreakerStateCounts {
        let mut counts = BreakerStateCounts::default();
        for breaker in self.breakers.read().values() {
            match breaker.state {
                CircuitState::Closed => counts.closed += 1,
                CircuitState::Open => counts.open += 1,
                CircuitState::HalfOpen => counts.half_open += 1,
            }
        }
        counts
    }

    pub fn clear(&self) {
        self.breakers.write().clear();
    }
}

impl Default for CircuitBreakerManager {
    fn default() -> Self {
        Self::new(CircuitBreakerDefaults::default())
    }
}
