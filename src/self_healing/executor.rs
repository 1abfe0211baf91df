use chrono::{DateTime, Utc};
use futures::FutureExt;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

use super::{
    ActionKind, ErrorStore, RecoveryAction, RecoveryStrategy, StrategyRegistry, SystemError,
};
use crate::config::EngineConfig;
use crate::errors::{panic_message, RecoveryFailure};
use crate::events::{EventBus, RecoveryEvent};
use crate::observability::telemetry::{safe_log_text, track_recovery};
use crate::supervision::circuit_breaker::{BreakerGate, CircuitBreakerManager};

/// Failed attempts after which every further failure is escalated,
/// independent of the strategy's own retry budget.
pub const ESCALATION_THRESHOLD: u32 = 3;

/// Collaborator that actually restarts, reloads or rolls back a target.
#[async_trait::async_trait]
pub trait RecoveryHooks: Send + Sync {
    async fn perform(&self, action: &RecoveryAction, error: &SystemError) -> anyhow::Result<()>;
}

/// Hooks that only log; every action succeeds.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopHooks;

#[async_trait::async_trait]
impl RecoveryHooks for NoopHooks {
    async fn perform(&self, action: &RecoveryAction, error: &SystemError) -> anyhow::Result<()> {
        info!(
            error_id = %error.id,
            action = %action.kind,
            target = %action.target,
            "Recovery action performed"
        );
        Ok(())
    }
}

/// Why an attempt did not run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    NotFound,
    AlreadyResolved,
    InFlight,
    CircuitOpen { retry_at: DateTime<Utc> },
    NoStrategy,
    ShuttingDown,
}

/// Result of a single recovery attempt
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum RecoveryOutcome {
    Recovered {
        strategy_id: String,
        strategy_name: String,
    },
    Failed {
        strategy_id: String,
        reason: String,
        retry_count: u32,
    },
    Skipped {
        reason: SkipReason,
    },
}

impl RecoveryOutcome {
    fn skipped(reason: SkipReason) -> Self {
        RecoveryOutcome::Skipped { reason }
    }
}

/// Executor statistics
#[derive(Debug, Default)]
pub struct ExecutorStats {
    pub attempts: AtomicU64,
    pub successes: AtomicU64,
    pub failures: AtomicU64,
    pub skipped: AtomicU64,
}

/// Executor summary
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutorSummary {
    pub attempts: u64,
    pub successes: u64,
    pub failures: u64,
    pub skipped: u64,
    pub success_rate: f32,
}

/// Removes the in-flight marker however the attempt ends
struct InFlightGuard<'a> {
    set: &'a Mutex<HashSet<String>>,
    id: String,
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.set.lock().remove(&self.id);
    }
}

/// Runs strategies against stored errors
pub struct RecoveryExecutor {
    config: EngineConfig,
    store: Arc<ErrorStore>,
    strategies: Arc<StrategyRegistry>,
    breakers: Arc<CircuitBreakerManager>,
    events: Arc<EventBus>,
    hooks: Arc<dyn RecoveryHooks>,
    in_flight: Mutex<HashSet<String>>,
    /// Bounds recoveries executing at once to `max_concurrent_recoveries`
    admission: Semaphore,
    stats: ExecutorStats,
}

impl RecoveryExecutor {
    pub fn new(
        config: EngineConfig,
        store: Arc<ErrorStore>,
        strategies: Arc<StrategyRegistry>,
        breakers: Arc<CircuitBreakerManager>,
        events: Arc<EventBus>,
        hooks: Arc<dyn RecoveryHooks>,
    ) -> Self {
        Self {
            admission: Semaphore::new(config.max_concurrent_recoveries.max(1)),
            config,
            store,
            strategies,
            breakers,
            events,
            hooks,
            in_flight: Mutex::new(HashSet::new()),
            stats: ExecutorStats::default(),
        }
    }

    /// Ids of errors with an attempt currently in progress
    pub fn active_recoveries(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.in_flight.lock().iter().cloned().collect();
        ids.sort();
        ids
    }

    pub fn active_count(&self) -> usize {
        self.in_flight.lock().len()
    }

    /// The tighter of the engine-wide and strategy timeouts
    pub fn effective_timeout(&self, strategy: &RecoveryStrategy) -> Duration {
        self.config.recovery_timeout().min(strategy.timeout())
    }

    /// Stop admitting new attempts; queued ones are skipped.
    pub fn close(&self) {
        self.admission.close();
    }

    /// Make one recovery attempt for `error_id`.
    pub async fn attempt_recovery(&self, error_id: &str) -> RecoveryOutcome {
        let Some(error) = self.store.get(error_id) else {
            debug!(error_id, "Recovery requested for unknown error");
            return self.skip(SkipReason::NotFound);
        };
        if error.resolved {
            return self.skip(SkipReason::AlreadyResolved);
        }

        let _guard = {
            let mut in_flight = self.in_flight.lock();
            if !in_flight.insert(error_id.to_string()) {
                debug!(error_id, "Recovery already in progress");
                return self.skip(SkipReason::InFlight);
            }
            InFlightGuard {
                set: &self.in_flight,
                id: error_id.to_string(),
            }
        };

        let Ok(_permit) = self.admission.acquire().await else {
            return self.skip(SkipReason::ShuttingDown);
        };

        // re-read: another task may have resolved it while we waited
        let Some(error) = self.store.get(error_id) else {
            return self.skip(SkipReason::NotFound);
        };
        if error.resolved {
            return self.skip(SkipReason::AlreadyResolved);
        }

        // Match first so a breaker only turns half-open for an attempt that runs
        let Some(strategy) = self.strategies.best_match(&error) else {
            info!(
                error_id,
                category = %error.category,
                severity = %error.severity,
                "No recovery strategy matches"
            );
            return self.skip(SkipReason::NoStrategy);
        };

        let breaker = self.breaker_key(&error);
        if let Some(key) = &breaker {
            if let BreakerGate::Blocked { retry_at } = self.breakers.check(key) {
                info!(error_id, breaker = %key, %retry_at, "Circuit breaker open, skipping recovery");
                return self.skip(SkipReason::CircuitOpen { retry_at });
            }
        }

        self.stats.attempts.fetch_add(1, Ordering::Relaxed);
        let timeout = self.effective_timeout(&strategy);
        let result = track_recovery(error_id, &strategy.name, || async {
            match tokio::time::timeout(timeout, self.execute_recovery(&error, &strategy)).await {
                Ok(inner) => inner,
                Err(_) => Err(RecoveryFailure::Timeout {
                    timeout_ms: timeout.as_millis() as u64,
                }),
            }
        })
        .await;

        match result {
            Ok(()) => {
                self.stats.successes.fetch_add(1, Ordering::Relaxed);
                let resolved = self.store.get(error_id).unwrap_or(error);
                self.events.emit(RecoveryEvent::ErrorRecovered {
                    error: resolved,
                    strategy_id: strategy.id.clone(),
                    strategy_name: strategy.name.clone(),
                });
                RecoveryOutcome::Recovered {
                    strategy_id: strategy.id,
                    strategy_name: strategy.name,
                }
            }
            Err(failure) => self.handle_failure(error, &strategy, breaker.as_deref(), failure).await,
        }
    }

    /// Keep attempting with the same strategy until the error is resolved,
    /// skipped, or the strategy's retry budget is spent.
    pub async fn recover_until_settled(&self, error_id: &str) -> RecoveryOutcome {
        loop {
            let outcome = self.attempt_recovery(error_id).await;
            let RecoveryOutcome::Failed {
                strategy_id,
                retry_count,
                ..
            } = &outcome
            else {
                return outcome;
            };

            let budget = self
                .strategies
                .get(strategy_id)
                .map(|s| s.max_retries)
                .unwrap_or(0);
            if *retry_count >= budget {
                return outcome;
            }
        }
    }

    /// Run the strategy's actions in order, resolving the error on success.
    pub async fn execute_recovery(
        &self,
        error: &SystemError,
        strategy: &RecoveryStrategy,
    ) -> Result<(), RecoveryFailure> {
        if error.retry_count >= strategy.max_retries {
            return Err(RecoveryFailure::MaxRetriesExceeded {
                retries: error.retry_count,
                max_retries: strategy.max_retries,
            });
        }

        if error.retry_count > 0 {
            let delay = strategy.backoff_strategy.delay(error.retry_count);
            debug!(
                error_id = %error.id,
                delay_ms = delay.as_millis() as u64,
                "Backing off before retry"
            );
            tokio::time::sleep(delay).await;
        }

        for action in &strategy.actions {
            self.execute_action(action, error).await?;
        }

        self.store.mark_resolved(&error.id, &strategy.name);
        if let Some(key) = self.breaker_key(error) {
            self.breakers.record_success(&key);
        }
        info!(error_id = %error.id, strategy = %strategy.id, "Error recovered");
        Ok(())
    }

    async fn execute_action(
        &self,
        action: &RecoveryAction,
        error: &SystemError,
    ) -> Result<(), RecoveryFailure> {
        match action.kind {
            ActionKind::Notify => {
                if !self.config.enable_notification {
                    debug!(error_id = %error.id, "Notifications disabled, skipping notify action");
                    return Ok(());
                }
                self.events.emit(RecoveryEvent::ErrorNotify {
                    error: error.clone(),
                    action: action.clone(),
                    channels: self.config.notification_channels.clone(),
                });
            }
            ActionKind::Escalate => {
                self.events.emit(RecoveryEvent::ErrorEscalate {
                    error: error.clone(),
                    action: action.clone(),
                });
            }
            ActionKind::Restart
            | ActionKind::Reload
            | ActionKind::Rollback
            | ActionKind::Disable
            | ActionKind::Custom => {}
        }

        self.perform_hook(action, error)
            .await
            .map_err(|e| RecoveryFailure::ActionFailed {
                action: action.kind.to_string(),
                target: action.target.clone(),
                message: e.to_string(),
            })
    }

    /// Call the hook, turning a panic into an ordinary action error.
    async fn perform_hook(&self, action: &RecoveryAction, error: &SystemError) -> anyhow::Result<()> {
        match AssertUnwindSafe(self.hooks.perform(action, error))
            .catch_unwind()
            .await
        {
            Ok(result) => result,
            Err(panic) => {
                let reason = panic_message(panic.as_ref());
                warn!(
                    error_id = %error.id,
                    action = %action.kind,
                    target = %action.target,
                    reason = %reason,
                    "Recovery hook panicked"
                );
                Err(anyhow::anyhow!("hook panicked: {}", reason))
            }
        }
    }

    async fn handle_failure(
        &self,
        error: SystemError,
        strategy: &RecoveryStrategy,
        breaker: Option<&str>,
        failure: RecoveryFailure,
    ) -> RecoveryOutcome {
        self.stats.failures.fetch_add(1, Ordering::Relaxed);
        let retry_count = self
            .store
            .increment_retry(&error.id)
            .unwrap_or(error.retry_count.saturating_add(1));
        if let Some(key) = breaker {
            self.breakers.record_failure(key);
        }

        let reason = failure.to_string();
        warn!(
            error_id = %error.id,
            strategy = %strategy.id,
            retry_count,
            reason = safe_log_text(&reason).as_str(),
            "Recovery failed"
        );

        let current = self.store.get(&error.id).unwrap_or(error);
        self.events.emit(RecoveryEvent::ErrorRecoveryFailed {
            error: current.clone(),
            strategy_id: Some(strategy.id.clone()),
            reason: reason.clone(),
        });

        if retry_count >= ESCALATION_THRESHOLD {
            self.escalate(&current, &reason).await;
        }

        RecoveryOutcome::Failed {
            strategy_id: strategy.id.clone(),
            reason,
            retry_count,
        }
    }

    async fn escalate(&self, error: &SystemError, reason: &str) {
        let action = RecoveryAction::new(ActionKind::Escalate, "administrator")
            .with_param("reason", serde_json::json!(reason))
            .with_param("retry_count", serde_json::json!(error.retry_count));
        warn!(error_id = %error.id, retry_count = error.retry_count, "Escalating unrecovered error");

        self.events.emit(RecoveryEvent::ErrorEscalate {
            error: error.clone(),
            action: action.clone(),
        });
        if let Err(e) = self.perform_hook(&action, error).await {
            warn!(error_id = %error.id, error = %e, "Escalation hook failed");
        }
    }

    fn breaker_key(&self, error: &SystemError) -> Option<String> {
        if !self.config.enable_circuit_breakers {
            return None;
        }
        let key = CircuitBreakerManager::key_for(error)?;
        self.breakers.ensure(&key);
        Some(key)
    }

    fn skip(&self, reason: SkipReason) -> RecoveryOutcome {
        self.stats.skipped.fetch_add(1, Ordering::Relaxed);
        RecoveryOutcome::skipped(reason)
    }

    pub fn summary(&self) -> ExecutorSummary {
        let attempts = self.stats.attempts.load(Ordering::Relaxed);
        let successes = self.stats.successes.load(Ordering::Relaxed);
        ExecutorSummary {
            attempts,
            successes,
            failures: self.stats.failures.load(Ordering::Relaxed),
            skipped: self.stats.skipped.load(Ordering::Relaxed),
            success_rate: if attempts > 0 {
                successes as f32 / attempts as f32
            } else {
                0.0
            },
        }
    }
}
