//! Selfheal - self-healing error recovery engine
//!
//! Collaborators report errors; the engine classifies them, picks a
//! recovery strategy and runs it, guarded by per-component circuit
//! breakers. Periodic health probes feed failures back into the same
//! pipeline, and every step is published on a typed event bus.
//!
//! # Quick Start
//!
//! ```ignore
//! use selfheal::{EngineConfig, ErrorRecoveryEngine, ErrorReport, ErrorCategory, ErrorSeverity};
//!
//! let engine = ErrorRecoveryEngine::new(EngineConfig::load(None)?).with_builtin_strategies();
//! engine.initialize().await;
//! let id = engine.report_error(
//!     ErrorReport::new(ErrorCategory::PluginLoad, ErrorSeverity::Medium, "load failed")
//!         .with_plugin("x"),
//! )?;
//! ```

pub mod cli;
pub mod config;
pub mod errors;
pub mod events;
pub mod observability;
pub mod self_healing;
pub mod supervision;

pub use config::EngineConfig;
pub use errors::{RecoveryFailure, RegistrationError, SelfHealError};
pub use events::{EventBus, EventTopic, RecoveryEvent, SubscriptionId};
pub use self_healing::{
    ActionKind, BackoffStrategy, ConditionOperator, EngineStatistics, ErrorCategory,
    ErrorRecoveryEngine, ErrorReport, ErrorSeverity, NoopHooks, RecoveryAction,
    RecoveryCondition, RecoveryHooks, RecoveryOutcome, RecoveryStrategy, SystemError,
};
pub use supervision::{
    probe_fn, CircuitBreaker, CircuitState, HealthCheck, HealthCheckResult, HealthProbe,
    HealthStatus,
};
