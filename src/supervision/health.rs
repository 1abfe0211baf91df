//! Health check system for monitoring component health
//!
//! Probes are polled on a shared tick. A check whose consecutive failures
//! reach its budget produces an error report that the engine feeds back into
//! the normal recovery path.

use chrono::{DateTime, Utc};
use futures::future::join_all;
use futures::FutureExt;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, error, warn};

use crate::errors::{panic_message, RegistrationError};
use crate::events::{EventBus, RecoveryEvent};
use crate::self_healing::{ErrorCategory, ErrorReport, ErrorSeverity};

/// Probe implemented by collaborators for one component
#[async_trait::async_trait]
pub trait HealthProbe: Send + Sync {
    async fn check(&self) -> HealthStatus;
}

/// Health status
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HealthStatus {
    /// Component is healthy
    Healthy,
    /// Component is degraded but functional
    Degraded { reason: String },
    /// Component is unhealthy
    Unhealthy { reason: String },
}

impl HealthStatus {
    pub fn is_healthy(&self) -> bool {
        !matches!(self, HealthStatus::Unhealthy { .. })
    }

    fn message(&self) -> Option<String> {
        match self {
            HealthStatus::Healthy => None,
            HealthStatus::Degraded { reason } | HealthStatus::Unhealthy { reason } => {
                Some(reason.clone())
            }
        }
    }
}

/// Adapter turning an async closure into a probe
pub struct FnProbe<F>(F);

#[async_trait::async_trait]
impl<F, Fut> HealthProbe for FnProbe<F>
where
    F: Fn() -> Fut + Send + Sync,
    Fut: Future<Output = HealthStatus> + Send,
{
    async fn check(&self) -> HealthStatus {
        (self.0)().await
    }
}

pub fn probe_fn<F, Fut>(f: F) -> Arc<dyn HealthProbe>
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = HealthStatus> + Send + 'static,
{
    Arc::new(FnProbe(f))
}

/// Health check result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthCheckResult {
    pub healthy: bool,
    pub response_time_ms: u64,
    pub message: Option<String>,
    pub timestamp: DateTime<Utc>,
}

/// A registered health check
#[derive(Clone)]
pub struct HealthCheck {
    pub id: String,
    pub component: String,
    pub check_interval: Duration,
    pub timeout: Duration,
    pub enabled: bool,
    pub max_consecutive_failures: u32,
    pub probe: Arc<dyn HealthProbe>,
}

impl HealthCheck {
    pub fn new(id: &str, component: &str, probe: Arc<dyn HealthProbe>) -> Self {
        Self {
            id: id.to_string(),
            component: component.to_string(),
            check_interval: Duration::from_secs(30),
            timeout: Duration::from_secs(5),
            enabled: true,
            max_consecutive_failures: 3,
            probe,
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.check_interval = interval;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_max_consecutive_failures(mut self, max: u32) -> Self {
        self.max_consecutive_failures = max;
        self
    }

    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }
}

impl std::fmt::Debug for HealthCheck {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HealthCheck")
            .field("id", &self.id)
            .field("component", &self.component)
            .field("check_interval", &self.check_interval)
            .field("timeout", &self.timeout)
            .field("enabled", &self.enabled)
            .field("max_consecutive_failures", &self.max_consecutive_failures)
            .finish_non_exhaustive()
    }
}

/// Read-only view of a check and its latest state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthCheckSnapshot {
    pub id: String,
    pub component: String,
    pub check_interval_ms: u64,
    pub timeout_ms: u64,
    pub enabled: bool,
    pub consecutive_failures: u32,
    pub max_consecutive_failures: u32,
    pub last_result: Option<HealthCheckResult>,
}

struct CheckEntry {
    check: HealthCheck,
    consecutive_failures: u32,
    last_result: Option<HealthCheckResult>,
    last_run: Option<Instant>,
}

impl CheckEntry {
    fn snapshot(&self) -> HealthCheckSnapshot {
        HealthCheckSnapshot {
            id: self.check.id.clone(),
            component: self.check.component.clone(),
            check_interval_ms: self.check.check_interval.as_millis() as u64,
            timeout_ms: self.check.timeout.as_millis() as u64,
            enabled: self.check.enabled,
            consecutive_failures: self.consecutive_failures,
            max_consecutive_failures: self.check.max_consecutive_failures,
            last_result: self.last_result.clone(),
        }
    }

    fn is_due(&self, now: Instant) -> bool {
        self.check.enabled
            && self
                .last_run
                .map(|t| now.duration_since(t) >= self.check.check_interval)
                .unwrap_or(true)
    }
}

/// Health check table plus the per-tick polling logic
#[derive(Default)]
pub struct HealthCheckScheduler {
    checks: RwLock<Vec<CheckEntry>>,
}

impl HealthCheckScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register or replace a check; replacing resets its failure count.
    pub fn add(&self, check: HealthCheck) -> Result<(), RegistrationError> {
        let invalid = |reason: &str| RegistrationError::InvalidHealthCheck {
            id: check.id.clone(),
            reason: reason.to_string(),
        };
        if check.id.trim().is_empty() {
            return Err(invalid("id cannot be empty"));
        }
        if check.timeout.is_zero() {
            return Err(invalid("timeout must be greater than 0"));
        }
        if check.max_consecutive_failures == 0 {
            return Err(invalid("max_consecutive_failures must be greater than 0"));
        }

        let entry = CheckEntry {
            check,
            consecutive_failures: 0,
            last_result: None,
            last_run: None,
        };
        let mut checks = self.checks.write();
        match checks.iter_mut().find(|e| e.check.id == entry.check.id) {
            Some(existing) => *existing = entry,
            None => checks.push(entry),
        }
        Ok(())
    }

    pub fn remove(&self, id: &str) -> Result<(), RegistrationError> {
        let mut checks = self.checks.write();
        let before = checks.len();
        checks.retain(|e| e.check.id != id);
        if checks.len() == before {
            return Err(RegistrationError::UnknownHealthCheck { id: id.to_string() });
        }
        Ok(())
    }

    pub fn get(&self, id: &str) -> Option<HealthCheckSnapshot> {
        self.checks
            .read()
            .iter()
            .find(|e| e.check.id == id)
            .map(CheckEntry::snapshot)
    }

    pub fn list(&self) -> Vec<HealthCheckSnapshot> {
        self.checks.read().iter().map(CheckEntry::snapshot).collect()
    }

    /// (healthy, unhealthy) counted over checks that have run at least once
    pub fn health_counts(&self) -> (usize, usize) {
        self.checks
            .read()
            .iter()
            .filter_map(|e| e.last_result.as_ref())
            .fold((0, 0), |(h, u), r| if r.healthy { (h + 1, u) } else { (h, u + 1) })
    }

    /// Run every due check once, returning reports for checks that just
    /// exhausted their failure budget.
    pub async fn run_tick(&self, events: &EventBus) -> Vec<ErrorReport> {
        self.run_tick_at(Instant::now(), events).await
    }

    /// Same as [`run_tick`](Self::run_tick) with due-ness judged at `now`,
    /// so a fixed-period caller can pass its own tick deadline.
    pub async fn run_tick_at(&self, now: Instant, events: &EventBus) -> Vec<ErrorReport> {
        let due: Vec<(String, Arc<dyn HealthProbe>, Duration)> = {
            let mut checks = self.checks.write();
            checks
                .iter_mut()
                .filter(|e| e.is_due(now))
                .map(|e| {
                    e.last_run = Some(now);
                    (e.check.id.clone(), Arc::clone(&e.check.probe), e.check.timeout)
                })
                .collect()
        };

        if due.is_empty() {
            return Vec::new();
        }
        debug!(count = due.len(), "Running health checks");

        let results = join_all(due.into_iter().map(|(id, probe, timeout)| async move {
            let result = run_probe(probe.as_ref(), timeout).await;
            (id, result)
        }))
        .await;

        results
            .into_iter()
            .filter_map(|(id, result)| self.record_result(&id, result, events))
            .collect()
    }

    fn record_result(
        &self,
        id: &str,
        result: HealthCheckResult,
        events: &EventBus,
    ) -> Option<ErrorReport> {
        let (component, failures, max, report) = {
            let mut checks = self.checks.write();
            // removed while the probe was running
            let entry = checks.iter_mut().find(|e| e.check.id == id)?;

            if result.healthy {
                entry.consecutive_failures = 0;
            } else {
                entry.consecutive_failures = entry.consecutive_failures.saturating_add(1);
            }
            entry.last_result = Some(result.clone());

            let max = entry.check.max_consecutive_failures;
            let report = (!result.healthy && entry.consecutive_failures == max)
                .then(|| budget_exhausted_report(entry, &result));
            (
                entry.check.component.clone(),
                entry.consecutive_failures,
                max,
                report,
            )
        };

        if !result.healthy {
            warn!(
                check = %id,
                component = %component,
                consecutive_failures = failures,
                max_consecutive_failures = max,
                message = result.message.as_deref().unwrap_or(""),
                "Health check failed"
            );
            events.emit(RecoveryEvent::HealthCheckFailed {
                check_id: id.to_string(),
                component: component.clone(),
                result: result.clone(),
                consecutive_failures: failures,
            });
        }
        events.emit(RecoveryEvent::HealthCheckCompleted {
            check_id: id.to_string(),
            component,
            result,
        });

        if report.is_some() {
            error!(check = %id, failures, "Health check exhausted its failure budget");
        }
        report
    }

    pub fn clear(&self) {
        self.checks.write().clear();
    }
}

async fn run_probe(probe: &dyn HealthProbe, timeout: Duration) -> HealthCheckResult {
    let start = Instant::now();
    let outcome =
        tokio::time::timeout(timeout, AssertUnwindSafe(probe.check()).catch_unwind()).await;
    let response_time_ms = start.elapsed().as_millis() as u64;

    match outcome {
        Ok(Ok(status)) => HealthCheckResult {
            healthy: status.is_healthy(),
            response_time_ms,
            message: status.message(),
            timestamp: Utc::now(),
        },
        Ok(Err(panic)) => {
            let reason = panic_message(panic.as_ref());
            error!(reason = %reason, "Health probe panicked");
            HealthCheckResult {
                healthy: false,
                response_time_ms,
                message: Some(format!("Health probe panicked: {}", reason)),
                timestamp: Utc::now(),
            }
        }
        Err(_) => HealthCheckResult {
            healthy: false,
            response_time_ms,
            message: Some(format!(
                "Health check timed out after {}ms",
                timeout.as_millis()
            )),
            timestamp: Utc::now(),
        },
    }
}

fn budget_exhausted_report(entry: &CheckEntry, result: &HealthCheckResult) -> ErrorReport {
    let check = &entry.check;
    let mut report = ErrorReport::new(
        ErrorCategory::System,
        ErrorSeverity::High,
        &format!(
            "Health check '{}' failed {} consecutive times",
            check.id, entry.consecutive_failures
        ),
    )
    .with_source("health-check")
    .with_component(&check.component)
    .with_context("health_check_id", serde_json::json!(check.id))
    .with_context(
        "consecutive_failures",
        serde_json::json!(entry.consecutive_failures),
    );
    if let Some(message) = &result.message {
        report = report.with_context("last_message", serde_json::json!(message));
    }
    report
}
