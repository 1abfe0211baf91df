//! Public surface of the recovery engine
//!
//! `ErrorRecoveryEngine` is a cheap `Clone` handle over shared state. Errors
//! come in through [`ErrorRecoveryEngine::report_error`], recovery runs on
//! spawned tasks, and the health loop feeds failing probes back through the
//! same entry point.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, error, info, warn};

use super::executor::{NoopHooks, RecoveryExecutor, RecoveryHooks, RecoveryOutcome};
use super::{
    builtin_strategies, ErrorReport, ErrorSeverity, ErrorStore, RecoveryStrategy,
    StrategyRegistry, SystemError,
};
use crate::config::EngineConfig;
use crate::errors::Result;
use crate::events::{EventBus, EventTopic, RecoveryEvent, SubscriptionId};
use crate::observability::telemetry::safe_log_text;
use crate::supervision::circuit_breaker::{BreakerStateCounts, CircuitBreaker, CircuitBreakerManager};
use crate::supervision::health::{HealthCheck, HealthCheckScheduler, HealthCheckSnapshot};

/// Snapshot returned by [`ErrorRecoveryEngine::get_statistics`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineStatistics {
    pub total_errors: usize,
    pub resolved_errors: usize,
    pub unresolved_errors: usize,
    pub active_recoveries: usize,
    pub healthy_checks: usize,
    pub unhealthy_checks: usize,
    pub circuit_breakers: BreakerStateCounts,
    pub errors_by_category: BTreeMap<String, usize>,
    pub errors_by_severity: BTreeMap<String, usize>,
}

struct EngineInner {
    config: EngineConfig,
    store: Arc<ErrorStore>,
    strategies: Arc<StrategyRegistry>,
    breakers: Arc<CircuitBreakerManager>,
    health: Arc<HealthCheckScheduler>,
    events: Arc<EventBus>,
    executor: Arc<RecoveryExecutor>,
    recoveries: Mutex<JoinSet<()>>,
    health_task: Mutex<Option<JoinHandle<()>>>,
    shut_down: AtomicBool,
}

/// Self-healing error recovery engine
#[derive(Clone)]
pub struct ErrorRecoveryEngine {
    inner: Arc<EngineInner>,
}

impl ErrorRecoveryEngine {
    /// Engine with no strategies whose actions only log.
    pub fn new(config: EngineConfig) -> Self {
        Self::with_hooks(config, Arc::new(NoopHooks))
    }

    /// Engine whose actions are carried out by `hooks`.
    pub fn with_hooks(config: EngineConfig, hooks: Arc<dyn RecoveryHooks>) -> Self {
        let store = Arc::new(ErrorStore::new());
        let strategies = Arc::new(StrategyRegistry::new());
        let breakers = Arc::new(CircuitBreakerManager::new(config.circuit_breaker.clone()));
        let health = Arc::new(HealthCheckScheduler::new());
        let events = Arc::new(EventBus::new());
        let executor = Arc::new(RecoveryExecutor::new(
            config.clone(),
            Arc::clone(&store),
            Arc::clone(&strategies),
            Arc::clone(&breakers),
            Arc::clone(&events),
            hooks,
        ));

        Self {
            inner: Arc::new(EngineInner {
                config,
                store,
                strategies,
                breakers,
                health,
                events,
                executor,
                recoveries: Mutex::new(JoinSet::new()),
                health_task: Mutex::new(None),
                shut_down: AtomicBool::new(false),
            }),
        }
    }

    /// Register the default strategy set.
    pub fn with_builtin_strategies(self) -> Self {
        for strategy in builtin_strategies() {
            let id = strategy.id.clone();
            if let Err(e) = self.inner.strategies.add(strategy) {
                warn!(strategy = %id, error = %e, "Failed to register built-in strategy");
            }
        }
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.inner.config
    }

    /// Start health polling if enabled. Calling it twice is a no-op.
    pub async fn initialize(&self) {
        if !self.inner.config.enable_health_checks {
            info!("Health checks disabled");
            return;
        }
        let mut task = self.inner.health_task.lock();
        if task.is_some() {
            return;
        }

        let period = self.inner.config.health_check_interval();
        let weak = Arc::downgrade(&self.inner);
        *task = Some(tokio::spawn(health_loop(weak, period)));
        info!(interval_ms = period.as_millis() as u64, "Error recovery engine initialized");
    }

    /// Store a new error and, when auto-recovery is on, start recovering it
    /// in the background. Returns the error id immediately.
    pub fn report_error(&self, report: ErrorReport) -> Result<String> {
        report.validate()?;
        let error = report.into_error();
        let id = error.id.clone();

        if self.inner.config.enable_error_logging {
            log_reported(&error);
        }
        self.inner.store.put(error.clone());
        self.inner
            .events
            .emit(RecoveryEvent::ErrorReported { error });

        if self.inner.config.enable_auto_recovery {
            self.spawn_recovery(id.clone());
        }
        Ok(id)
    }

    fn spawn_recovery(&self, error_id: String) {
        if self.inner.shut_down.load(Ordering::SeqCst) {
            debug!(error_id = %error_id, "Engine shut down, not recovering");
            return;
        }
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            warn!(error_id = %error_id, "No async runtime, skipping auto-recovery");
            return;
        };

        let executor = Arc::clone(&self.inner.executor);
        let mut recoveries = self.inner.recoveries.lock();
        // reap finished tasks so the set does not grow without bound
        while recoveries.try_join_next().is_some() {}
        recoveries.spawn_on(
            async move {
                let outcome = executor.recover_until_settled(&error_id).await;
                debug!(error_id = %error_id, ?outcome, "Recovery settled");
            },
            &handle,
        );
    }

    /// Make a single recovery attempt now, without the retry driver.
    pub async fn attempt_recovery(&self, error_id: &str) -> RecoveryOutcome {
        self.inner.executor.attempt_recovery(error_id).await
    }

    pub fn add_recovery_strategy(&self, strategy: RecoveryStrategy) -> Result<()> {
        let id = strategy.id.clone();
        self.inner.strategies.add(strategy)?;
        info!(strategy = %id, "Recovery strategy registered");
        Ok(())
    }

    pub fn remove_recovery_strategy(&self, id: &str) -> Result<RecoveryStrategy> {
        Ok(self.inner.strategies.remove(id)?)
    }

    pub fn get_recovery_strategies(&self) -> Vec<RecoveryStrategy> {
        self.inner.strategies.list()
    }

    pub fn add_health_check(&self, check: HealthCheck) -> Result<()> {
        let id = check.id.clone();
        self.inner.health.add(check)?;
        info!(check = %id, "Health check registered");
        Ok(())
    }

    pub fn remove_health_check(&self, id: &str) -> Result<()> {
        Ok(self.inner.health.remove(id)?)
    }

    pub fn get_health_checks(&self) -> Vec<HealthCheckSnapshot> {
        self.inner.health.list()
    }

    pub fn add_circuit_breaker(&self, breaker: CircuitBreaker) -> Result<()> {
        Ok(self.inner.breakers.add(breaker)?)
    }

    pub fn remove_circuit_breaker(&self, id: &str) -> Result<CircuitBreaker> {
        Ok(self.inner.breakers.remove(id)?)
    }

    pub fn get_circuit_breaker(&self, id: &str) -> Option<CircuitBreaker> {
        self.inner.breakers.get(id)
    }

    pub fn get_circuit_breakers(&self) -> Vec<CircuitBreaker> {
        self.inner.breakers.list()
    }

    pub fn get_error(&self, id: &str) -> Option<SystemError> {
        self.inner.store.get(id)
    }

    pub fn get_all_errors(&self) -> Vec<SystemError> {
        self.inner.store.list()
    }

    pub fn get_active_recoveries(&self) -> Vec<String> {
        self.inner.executor.active_recoveries()
    }

    pub fn get_statistics(&self) -> EngineStatistics {
        let errors = self.inner.store.list();
        let resolved = errors.iter().filter(|e| e.resolved).count();

        let mut errors_by_category = BTreeMap::new();
        let mut errors_by_severity = BTreeMap::new();
        for e in &errors {
            *errors_by_category
                .entry(e.category.as_str().to_string())
                .or_insert(0) += 1;
            *errors_by_severity
                .entry(e.severity.as_str().to_string())
                .or_insert(0) += 1;
        }

        let (healthy_checks, unhealthy_checks) = self.inner.health.health_counts();
        EngineStatistics {
            total_errors: errors.len(),
            resolved_errors: resolved,
            unresolved_errors: errors.len() - resolved,
            active_recoveries: self.inner.executor.active_count(),
            healthy_checks,
            unhealthy_checks,
            circuit_breakers: self.inner.breakers.state_counts(),
            errors_by_category,
            errors_by_severity,
        }
    }

    pub fn on<F>(&self, topic: EventTopic, handler: F) -> SubscriptionId
    where
        F: Fn(&RecoveryEvent) + Send + Sync + 'static,
    {
        self.inner.events.on(topic, handler)
    }

    pub fn off(&self, topic: EventTopic, id: SubscriptionId) -> bool {
        self.inner.events.off(topic, id)
    }

    /// Drop resolved errors older than the retention period.
    pub fn purge_expired_errors(&self) -> usize {
        let cutoff = chrono::Duration::from_std(self.inner.config.error_retention_period())
            .ok()
            .and_then(|retention| chrono::Utc::now().checked_sub_signed(retention));
        // a retention period too large to represent keeps everything
        let Some(cutoff) = cutoff else {
            return 0;
        };
        let purged = self.inner.store.purge_resolved_before(cutoff);
        if purged > 0 {
            info!(purged, "Purged expired errors");
        }
        purged
    }

    /// Run one health tick immediately, outside the periodic loop.
    pub async fn run_health_checks_now(&self) -> Vec<String> {
        let reports = self.inner.health.run_tick(&self.inner.events).await;
        self.report_all(reports)
    }

    fn report_all(&self, reports: Vec<ErrorReport>) -> Vec<String> {
        reports
            .into_iter()
            .filter_map(|report| match self.report_error(report) {
                Ok(id) => Some(id),
                Err(e) => {
                    error!(error = %e, "Failed to report health check failure");
                    None
                }
            })
            .collect()
    }

    /// Wait for every spawned recovery task to finish.
    pub async fn wait_idle(&self) {
        loop {
            let mut pending = std::mem::take(&mut *self.inner.recoveries.lock());
            if pending.is_empty() {
                return;
            }
            while let Some(joined) = pending.join_next().await {
                if let Err(e) = joined {
                    if e.is_panic() {
                        error!("Recovery task panicked");
                    }
                }
            }
        }
    }

    /// Stop polling, drain in-flight recoveries, then clear all state.
    pub async fn shutdown(&self) {
        if self.inner.shut_down.swap(true, Ordering::SeqCst) {
            return;
        }
        info!("Shutting down error recovery engine");

        if let Some(task) = self.inner.health_task.lock().take() {
            task.abort();
        }
        self.inner.executor.close();
        self.wait_idle().await;

        self.inner.store.clear();
        self.inner.strategies.clear();
        self.inner.breakers.clear();
        self.inner.health.clear();
        self.inner.events.clear();
        info!("Error recovery engine stopped");
    }

    pub fn is_shut_down(&self) -> bool {
        self.inner.shut_down.load(Ordering::SeqCst)
    }
}

async fn health_loop(engine: Weak<EngineInner>, period: Duration) {
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        let now = ticker.tick().await;
        let Some(inner) = engine.upgrade() else {
            return;
        };
        let reports = inner.health.run_tick_at(now, &inner.events).await;
        if !reports.is_empty() {
            ErrorRecoveryEngine { inner }.report_all(reports);
        }
    }
}

fn log_reported(error: &SystemError) {
    let message = safe_log_text(&error.message);
    match error.severity {
        ErrorSeverity::Critical | ErrorSeverity::High => error!(
            error_id = %error.id,
            category = %error.category,
            severity = %error.severity,
            source = %error.source,
            message = %message,
            "Error reported"
        ),
        ErrorSeverity::Medium => warn!(
            error_id = %error.id,
            category = %error.category,
            severity = %error.severity,
            source = %error.source,
            message = %message,
            "Error reported"
        ),
        ErrorSeverity::Low => info!(
            error_id = %error.id,
            category = %error.category,
            severity = %error.severity,
            source = %error.source,
            message = %message,
            "Error reported"
        ),
    }
}
