//! Unit tests for the recovery engine
//!
//! Tests cover:
//! - Successful and exhausted recoveries end to end
//! - Resolved errors are never re-attempted
//! - Circuit breaker gating
//! - Health check feedback into error reporting
//! - Concurrency cap and in-flight tracking
//! - Registration errors and shutdown

use parking_lot::Mutex;
use selfheal::self_healing::{EngineStatistics, RecoveryHooks, RecoveryOutcome, SkipReason};
use selfheal::{
    probe_fn, ActionKind, BackoffStrategy, CircuitBreaker, CircuitState, ConditionOperator,
    EngineConfig, ErrorCategory, ErrorRecoveryEngine, ErrorReport, ErrorSeverity, EventTopic,
    HealthCheck, HealthProbe, HealthStatus, RecoveryAction, RecoveryCondition, RecoveryEvent,
    RecoveryStrategy, SelfHealError, SystemError,
};
use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

fn config() -> EngineConfig {
    EngineConfig {
        enable_health_checks: false,
        ..EngineConfig::default()
    }
}

fn plugin_load(plugin: &str) -> ErrorReport {
    ErrorReport::new(ErrorCategory::PluginLoad, ErrorSeverity::Medium, "load failed")
        .with_source("plugin-manager")
        .with_plugin(plugin)
}

fn count_topic(engine: &ErrorRecoveryEngine, topic: EventTopic) -> Arc<AtomicUsize> {
    let counter = Arc::new(AtomicUsize::new(0));
    let c = Arc::clone(&counter);
    engine.on(topic, move |_| {
        c.fetch_add(1, Ordering::SeqCst);
    });
    counter
}

/// Fails every action except notify and escalate.
struct BrokenHooks;

#[async_trait::async_trait]
impl RecoveryHooks for BrokenHooks {
    async fn perform(&self, action: &RecoveryAction, _: &SystemError) -> anyhow::Result<()> {
        match action.kind {
            ActionKind::Notify | ActionKind::Escalate => Ok(()),
            _ => anyhow::bail!("{} on {} refused", action.kind, action.target),
        }
    }
}

/// Panics on every action, escalation included.
struct PanickingHooks;

#[async_trait::async_trait]
impl RecoveryHooks for PanickingHooks {
    async fn perform(&self, _: &RecoveryAction, _: &SystemError) -> anyhow::Result<()> {
        panic!("hook bug")
    }
}

/// Succeeds after a delay, tracking how many actions overlap.
struct SlowHooks {
    delay: Duration,
    current: AtomicUsize,
    peak: AtomicUsize,
}

impl SlowHooks {
    fn new(delay: Duration) -> Self {
        Self {
            delay,
            current: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        }
    }
}

#[async_trait::async_trait]
impl RecoveryHooks for SlowHooks {
    async fn perform(&self, _: &RecoveryAction, _: &SystemError) -> anyhow::Result<()> {
        let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
        self.current.fetch_sub(1, Ordering::SeqCst);
        Ok(())
    }
}

// ============================================================================
// End-to-end recovery
// ============================================================================

mod recovery_tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_plugin_load_recovered_by_builtin() {
        let engine = ErrorRecoveryEngine::new(config()).with_builtin_strategies();
        let recovered = count_topic(&engine, EventTopic::ErrorRecovered);
        let reported = count_topic(&engine, EventTopic::ErrorReported);

        let id = engine.report_error(plugin_load("x")).unwrap();
        engine.wait_idle().await;

        let error = engine.get_error(&id).unwrap();
        assert!(error.resolved);
        assert!(error.resolved_at.is_some());
        assert_eq!(error.resolution_method.as_deref(), Some("Plugin Load Retry"));
        assert_eq!(error.retry_count, 0);
        assert_eq!(recovered.load(Ordering::SeqCst), 1);
        assert_eq!(reported.load(Ordering::SeqCst), 1);
        assert!(engine.get_active_recoveries().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_always_failing_reload_exhausts_and_escalates() {
        let engine = ErrorRecoveryEngine::with_hooks(config(), Arc::new(BrokenHooks))
            .with_builtin_strategies();
        let failed = count_topic(&engine, EventTopic::ErrorRecoveryFailed);
        let escalated = count_topic(&engine, EventTopic::ErrorEscalate);
        let recovered = count_topic(&engine, EventTopic::ErrorRecovered);

        let id = engine.report_error(plugin_load("x")).unwrap();
        engine.wait_idle().await;

        let error = engine.get_error(&id).unwrap();
        assert!(!error.resolved);
        assert_eq!(error.retry_count, 3);
        assert_eq!(failed.load(Ordering::SeqCst), 3);
        assert_eq!(escalated.load(Ordering::SeqCst), 1);
        assert_eq!(recovered.load(Ordering::SeqCst), 0);

        // three failures stay under the default threshold of five
        let breaker = engine.get_circuit_breaker("plugin:x").unwrap();
        assert_eq!(breaker.state, CircuitState::Closed);
        assert_eq!(breaker.failure_count, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_panicking_hook_is_retried_like_a_failure() {
        let engine = ErrorRecoveryEngine::with_hooks(config(), Arc::new(PanickingHooks))
            .with_builtin_strategies();
        let failed = count_topic(&engine, EventTopic::ErrorRecoveryFailed);
        let escalated = count_topic(&engine, EventTopic::ErrorEscalate);

        let id = engine.report_error(plugin_load("x")).unwrap();
        engine.wait_idle().await;

        let error = engine.get_error(&id).unwrap();
        assert!(!error.resolved);
        assert_eq!(error.retry_count, 3);
        assert_eq!(failed.load(Ordering::SeqCst), 3);
        assert_eq!(escalated.load(Ordering::SeqCst), 1);
        assert_eq!(
            engine.get_circuit_breaker("plugin:x").unwrap().failure_count,
            3
        );
        assert!(engine.get_active_recoveries().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_event_carries_strategy_and_reason() {
        let engine = ErrorRecoveryEngine::with_hooks(config(), Arc::new(BrokenHooks))
            .with_builtin_strategies();
        let reasons: Arc<Mutex<Vec<(Option<String>, String)>>> = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&reasons);
        engine.on(EventTopic::ErrorRecoveryFailed, move |event| {
            if let RecoveryEvent::ErrorRecoveryFailed {
                strategy_id,
                reason,
                ..
            } = event
            {
                sink.lock().push((strategy_id.clone(), reason.clone()));
            }
        });

        engine.report_error(plugin_load("x")).unwrap();
        engine.wait_idle().await;

        let reasons = reasons.lock();
        assert_eq!(reasons.len(), 3);
        assert_eq!(reasons[0].0.as_deref(), Some("plugin-load-retry"));
        assert_eq!(
            reasons[0].1,
            "Action 'reload' on 'plugin' failed: reload on plugin refused"
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_backoff_delays_between_attempts() {
        let engine = ErrorRecoveryEngine::with_hooks(config(), Arc::new(BrokenHooks))
            .with_builtin_strategies();
        let start = tokio::time::Instant::now();

        engine.report_error(plugin_load("x")).unwrap();
        engine.wait_idle().await;

        // exponential: 1s before the second attempt, 2s before the third
        assert!(start.elapsed() >= Duration::from_millis(3000));
    }

    #[tokio::test(start_paused = true)]
    async fn test_resolved_error_left_untouched() {
        let engine = ErrorRecoveryEngine::new(config()).with_builtin_strategies();
        let id = engine.report_error(plugin_load("x")).unwrap();
        engine.wait_idle().await;
        let before = engine.get_error(&id).unwrap();
        let recovered = count_topic(&engine, EventTopic::ErrorRecovered);

        let outcome = engine.attempt_recovery(&id).await;
        assert_eq!(
            outcome,
            RecoveryOutcome::Skipped {
                reason: SkipReason::AlreadyResolved
            }
        );
        assert_eq!(engine.get_error(&id).unwrap(), before);
        assert_eq!(recovered.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_attempt_on_unknown_id_is_skipped() {
        let engine = ErrorRecoveryEngine::new(config()).with_builtin_strategies();
        assert_eq!(
            engine.attempt_recovery("err_missing").await,
            RecoveryOutcome::Skipped {
                reason: SkipReason::NotFound
            }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_unmatched_error_is_left_unresolved() {
        let engine = ErrorRecoveryEngine::new(config()).with_builtin_strategies();
        let failed = count_topic(&engine, EventTopic::ErrorRecoveryFailed);

        let id = engine
            .report_error(ErrorReport::new(
                ErrorCategory::Database,
                ErrorSeverity::Low,
                "deadlock",
            ))
            .unwrap();
        engine.wait_idle().await;

        let error = engine.get_error(&id).unwrap();
        assert!(!error.resolved);
        assert_eq!(error.retry_count, 0);
        assert_eq!(failed.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_auto_recovery_disabled_only_stores() {
        let engine = ErrorRecoveryEngine::new(EngineConfig {
            enable_auto_recovery: false,
            ..config()
        })
        .with_builtin_strategies();

        let id = engine.report_error(plugin_load("x")).unwrap();
        engine.wait_idle().await;
        assert!(!engine.get_error(&id).unwrap().resolved);
    }

    #[tokio::test(start_paused = true)]
    async fn test_conditional_strategy_wins_on_priority() {
        let engine = ErrorRecoveryEngine::new(config()).with_builtin_strategies();
        engine
            .add_recovery_strategy(RecoveryStrategy {
                id: "gateway-failover".into(),
                name: "Gateway Failover".into(),
                description: "switch to the standby gateway on 503".into(),
                applicable_categories: vec![ErrorCategory::Network],
                applicable_severities: vec![ErrorSeverity::High],
                max_retries: 1,
                backoff_strategy: BackoffStrategy::Fixed,
                actions: vec![RecoveryAction::new(ActionKind::Custom, "gateway")
                    .with_param("mode", json!("standby"))],
                conditions: vec![RecoveryCondition::new(
                    "response.status",
                    ConditionOperator::Equals,
                    json!(503),
                )],
                priority: 50,
                timeout_ms: 5_000,
            })
            .unwrap();

        let matching = engine
            .report_error(
                ErrorReport::new(ErrorCategory::Network, ErrorSeverity::High, "bad gateway")
                    .with_context("response", json!({ "status": 503 })),
            )
            .unwrap();
        let other = engine
            .report_error(
                ErrorReport::new(ErrorCategory::Network, ErrorSeverity::High, "bad gateway")
                    .with_context("response", json!({ "status": 500 })),
            )
            .unwrap();
        engine.wait_idle().await;

        assert_eq!(
            engine.get_error(&matching).unwrap().resolution_method.as_deref(),
            Some("Gateway Failover")
        );
        assert_eq!(
            engine.get_error(&other).unwrap().resolution_method.as_deref(),
            Some("Network Retry")
        );
    }
}

// ============================================================================
// Circuit breakers
// ============================================================================

mod breaker_tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_open_breaker_blocks_further_attempts() {
        let engine = ErrorRecoveryEngine::with_hooks(config(), Arc::new(BrokenHooks))
            .with_builtin_strategies();
        engine
            .add_circuit_breaker(CircuitBreaker::for_plugin("x", 1, Duration::from_secs(60)))
            .unwrap();
        let failed = count_topic(&engine, EventTopic::ErrorRecoveryFailed);

        let first = engine.report_error(plugin_load("x")).unwrap();
        engine.wait_idle().await;
        // one failure opens the breaker and stops the retry driver
        assert_eq!(engine.get_error(&first).unwrap().retry_count, 1);
        assert_eq!(
            engine.get_circuit_breaker("plugin:x").unwrap().state,
            CircuitState::Open
        );

        let second = engine.report_error(plugin_load("x")).unwrap();
        engine.wait_idle().await;
        let error = engine.get_error(&second).unwrap();
        assert!(!error.resolved);
        assert_eq!(error.retry_count, 0);
        assert_eq!(failed.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_breaker_auto_created_from_defaults() {
        let engine = ErrorRecoveryEngine::new(EngineConfig {
            circuit_breaker: selfheal::config::CircuitBreakerDefaults {
                failure_threshold: 7,
                recovery_timeout_ms: 1_000,
                success_threshold: 2,
            },
            ..config()
        })
        .with_builtin_strategies();

        engine
            .report_error(
                ErrorReport::new(ErrorCategory::Memory, ErrorSeverity::High, "oom")
                    .with_component("indexer"),
            )
            .unwrap();
        engine.wait_idle().await;

        let breaker = engine.get_circuit_breaker("component:indexer").unwrap();
        assert_eq!(breaker.failure_threshold, 7);
        assert_eq!(breaker.success_threshold, 2);
        assert_eq!(breaker.success_count, 1);
        assert_eq!(engine.get_statistics().circuit_breakers.closed, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_breakers_disabled_creates_none() {
        let engine = ErrorRecoveryEngine::new(EngineConfig {
            enable_circuit_breakers: false,
            ..config()
        })
        .with_builtin_strategies();

        engine.report_error(plugin_load("x")).unwrap();
        engine.wait_idle().await;
        assert!(engine.get_circuit_breakers().is_empty());
    }

    #[test]
    fn test_remove_unknown_breaker_errors() {
        let engine = ErrorRecoveryEngine::new(config());
        assert!(matches!(
            engine.remove_circuit_breaker("plugin:ghost"),
            Err(SelfHealError::Registration(_))
        ));
    }
}

// ============================================================================
// Health feedback
// ============================================================================

mod health_feedback_tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_failing_probe_reports_system_error() {
        let engine = ErrorRecoveryEngine::new(EngineConfig {
            enable_health_checks: true,
            health_check_interval_ms: 1_000,
            ..EngineConfig::default()
        });
        let reported: Arc<Mutex<Vec<SystemError>>> = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&reported);
        engine.on(EventTopic::ErrorReported, move |event| {
            if let RecoveryEvent::ErrorReported { error } = event {
                sink.lock().push(error.clone());
            }
        });
        let check_failed = count_topic(&engine, EventTopic::HealthCheckFailed);

        let probe = probe_fn(|| async {
            HealthStatus::Unhealthy {
                reason: "connection refused".into(),
            }
        });
        engine
            .add_health_check(
                HealthCheck::new("db-ping", "database", probe)
                    .with_interval(Duration::from_secs(1))
                    .with_max_consecutive_failures(2),
            )
            .unwrap();

        engine.initialize().await;
        tokio::time::sleep(Duration::from_millis(1_500)).await;

        assert_eq!(check_failed.load(Ordering::SeqCst), 2);
        {
            let reported = reported.lock();
            assert_eq!(reported.len(), 1);
            let error = &reported[0];
            assert_eq!(error.category, ErrorCategory::System);
            assert_eq!(error.severity, ErrorSeverity::High);
            assert_eq!(error.component.as_deref(), Some("database"));
            assert_eq!(error.context.get("health_check_id"), Some(&json!("db-ping")));
            assert_eq!(error.context.get("consecutive_failures"), Some(&json!(2)));
        }

        let stats = engine.get_statistics();
        assert_eq!(stats.unhealthy_checks, 1);
        assert_eq!(stats.healthy_checks, 0);
        engine.shutdown().await;
    }

    struct PanickingProbe;

    #[async_trait::async_trait]
    impl HealthProbe for PanickingProbe {
        async fn check(&self) -> HealthStatus {
            panic!("probe bug")
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_panicking_probe_does_not_stop_polling() {
        let engine = ErrorRecoveryEngine::new(EngineConfig {
            enable_health_checks: true,
            health_check_interval_ms: 1_000,
            ..EngineConfig::default()
        });
        let runs = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&runs);
        engine
            .add_health_check(
                HealthCheck::new("broken", "cache", Arc::new(PanickingProbe))
                    .with_interval(Duration::from_secs(1)),
            )
            .unwrap();
        engine
            .add_health_check(
                HealthCheck::new(
                    "api",
                    "api",
                    probe_fn(move || {
                        counter.fetch_add(1, Ordering::SeqCst);
                        async { HealthStatus::Healthy }
                    }),
                )
                .with_interval(Duration::from_secs(1)),
            )
            .unwrap();

        engine.initialize().await;
        tokio::time::sleep(Duration::from_millis(5_500)).await;

        assert!(runs.load(Ordering::SeqCst) >= 5);
        let broken = engine
            .get_health_checks()
            .into_iter()
            .find(|c| c.id == "broken")
            .unwrap();
        assert!(broken.consecutive_failures >= 5);
        let message = broken.last_result.unwrap().message.unwrap();
        assert!(message.contains("probe bug"));
        engine.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_health_checks_disabled_never_poll() {
        let engine = ErrorRecoveryEngine::new(config());
        let runs = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&runs);
        engine
            .add_health_check(HealthCheck::new(
                "api",
                "api",
                probe_fn(move || {
                    counter.fetch_add(1, Ordering::SeqCst);
                    async { HealthStatus::Healthy }
                }),
            ))
            .unwrap();

        engine.initialize().await;
        tokio::time::sleep(Duration::from_secs(120)).await;
        assert_eq!(runs.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_run_health_checks_now() {
        let engine = ErrorRecoveryEngine::new(config());
        engine
            .add_health_check(
                HealthCheck::new(
                    "cache",
                    "cache",
                    probe_fn(|| async {
                        HealthStatus::Unhealthy {
                            reason: "evicted".into(),
                        }
                    }),
                )
                .with_interval(Duration::ZERO)
                .with_max_consecutive_failures(1),
            )
            .unwrap();

        let ids = engine.run_health_checks_now().await;
        assert_eq!(ids.len(), 1);
        assert_eq!(engine.get_error(&ids[0]).unwrap().source, "health-check");
    }
}

// ============================================================================
// Concurrency
// ============================================================================

mod concurrency_tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_max_concurrent_recoveries_enforced() {
        let hooks = Arc::new(SlowHooks::new(Duration::from_millis(200)));
        let engine = ErrorRecoveryEngine::with_hooks(
            EngineConfig {
                max_concurrent_recoveries: 2,
                ..config()
            },
            hooks.clone(),
        )
        .with_builtin_strategies();

        let ids: Vec<String> = (0..6)
            .map(|i| engine.report_error(plugin_load(&format!("p{}", i))).unwrap())
            .collect();
        engine.wait_idle().await;

        assert!(hooks.peak.load(Ordering::SeqCst) <= 2);
        for id in ids {
            assert!(engine.get_error(&id).unwrap().resolved);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_active_recoveries_tracked_while_running() {
        let engine = ErrorRecoveryEngine::with_hooks(
            config(),
            Arc::new(SlowHooks::new(Duration::from_secs(5))),
        )
        .with_builtin_strategies();

        let id = engine.report_error(plugin_load("x")).unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(engine.get_active_recoveries(), vec![id.clone()]);
        assert_eq!(engine.get_statistics().active_recoveries, 1);

        engine.wait_idle().await;
        assert!(engine.get_active_recoveries().is_empty());
        assert!(engine.get_error(&id).unwrap().resolved);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_drains_then_clears() {
        let engine = ErrorRecoveryEngine::with_hooks(
            config(),
            Arc::new(SlowHooks::new(Duration::from_secs(2))),
        )
        .with_builtin_strategies();
        let recovered = count_topic(&engine, EventTopic::ErrorRecovered);

        engine.report_error(plugin_load("x")).unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;
        engine.shutdown().await;

        assert_eq!(recovered.load(Ordering::SeqCst), 1);
        assert!(engine.get_all_errors().is_empty());
        assert!(engine.get_active_recoveries().is_empty());
        assert_eq!(
            engine.get_statistics(),
            EngineStatistics {
                total_errors: 0,
                resolved_errors: 0,
                unresolved_errors: 0,
                active_recoveries: 0,
                healthy_checks: 0,
                unhealthy_checks: 0,
                circuit_breakers: Default::default(),
                errors_by_category: Default::default(),
                errors_by_severity: Default::default(),
            }
        );
    }
}

// ============================================================================
// Registration and events
// ============================================================================

mod registration_tests {
    use super::*;

    #[test]
    fn test_unknown_action_type_rejected_on_load() {
        let raw = json!({
            "id": "teleport",
            "name": "Teleport",
            "applicable_categories": ["system"],
            "applicable_severities": ["low"],
            "max_retries": 1,
            "backoff_strategy": "fixed",
            "actions": [{ "type": "teleport", "target": "server" }],
            "timeout_ms": 1000
        });
        let parsed: Result<RecoveryStrategy, _> = serde_json::from_value(raw);
        let err = parsed.unwrap_err().to_string();
        assert!(err.contains("teleport"), "{}", err);
    }

    #[test]
    fn test_invalid_regex_rejected_at_registration() {
        let engine = ErrorRecoveryEngine::new(config());
        let mut strategy = selfheal::self_healing::builtin_strategies().remove(0);
        strategy.conditions = vec![RecoveryCondition::new(
            "path",
            ConditionOperator::Matches,
            json!("(unclosed"),
        )];
        assert!(matches!(
            engine.add_recovery_strategy(strategy),
            Err(SelfHealError::Registration(
                selfheal::RegistrationError::InvalidCondition { .. }
            ))
        ));
    }

    #[test]
    fn test_remove_unknown_strategy_errors() {
        let engine = ErrorRecoveryEngine::new(config());
        let err = engine.remove_recovery_strategy("missing").unwrap_err();
        assert_eq!(
            err.to_string(),
            "Registration error: Unknown recovery strategy 'missing'"
        );
    }

    #[test]
    fn test_off_stops_delivery() {
        let engine = ErrorRecoveryEngine::new(EngineConfig {
            enable_auto_recovery: false,
            ..config()
        });
        let counter = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&counter);
        let sub = engine.on(EventTopic::ErrorReported, move |_| {
            c.fetch_add(1, Ordering::SeqCst);
        });

        engine.report_error(plugin_load("x")).unwrap();
        assert!(engine.off(EventTopic::ErrorReported, sub));
        engine.report_error(plugin_load("x")).unwrap();
        assert_eq!(counter.load(Ordering::SeqCst), 1);
        assert!(!engine.off(EventTopic::ErrorReported, sub));
    }

    #[test]
    fn test_panicking_subscriber_does_not_break_reporting() {
        let engine = ErrorRecoveryEngine::new(EngineConfig {
            enable_auto_recovery: false,
            ..config()
        });
        engine.on(EventTopic::ErrorReported, |_| panic!("subscriber bug"));
        let later = count_topic(&engine, EventTopic::ErrorReported);

        assert!(engine.report_error(plugin_load("x")).is_ok());
        assert_eq!(later.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_purge_keeps_recent_and_unresolved() {
        let engine = ErrorRecoveryEngine::new(EngineConfig {
            enable_auto_recovery: false,
            ..config()
        });
        engine.report_error(plugin_load("x")).unwrap();
        assert_eq!(engine.purge_expired_errors(), 0);
        assert_eq!(engine.get_all_errors().len(), 1);
    }
}
