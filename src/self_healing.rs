//! Self-Healing System
//!
//! Accepts error reports from arbitrary subsystems, classifies them, picks a
//! remediation strategy and runs it, while circuit breakers protect failing
//! components and health probes feed new errors back in.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                   ErrorRecoveryEngine                        │
//! │  ┌───────────────┐  ┌───────────────┐  ┌───────────────┐   │
//! │  │ Error         │  │ Strategy      │  │ Recovery      │   │
//! │  │ Store         │  │ Registry      │  │ Executor      │   │
//! │  └───────────────┘  └───────────────┘  └───────────────┘   │
//! │           │                  │                  │           │
//! │  ┌───────────────┐  ┌───────────────┐  ┌───────────────┐   │
//! │  │ Circuit       │  │ Health Check  │  │ Event         │   │
//! │  │ Breakers      │  │ Scheduler     │  │ Bus           │   │
//! │  └───────────────┘  └───────────────┘  └───────────────┘   │
//! └─────────────────────────────────────────────────────────────┘
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

use crate::errors::{RegistrationError, SelfHealError};

pub mod engine;
pub mod executor;
pub mod store;
pub mod strategies;

pub use engine::{EngineStatistics, ErrorRecoveryEngine};
pub use executor::{NoopHooks, RecoveryExecutor, RecoveryHooks, RecoveryOutcome, SkipReason};
pub use store::ErrorStore;
pub use strategies::{builtin_strategies, StrategyRegistry};

/// Arbitrary key/value data attached to an error, addressed by dotted paths.
pub type ErrorContext = serde_json::Map<String, serde_json::Value>;

/// Base delay used by every backoff strategy
pub const BACKOFF_BASE: Duration = Duration::from_millis(1000);

// ============================================================================
// Classification
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorSeverity {
    Low,
    Medium,
    High,
    Critical,
}

impl ErrorSeverity {
    pub const ALL: [ErrorSeverity; 4] = [
        ErrorSeverity::Low,
        ErrorSeverity::Medium,
        ErrorSeverity::High,
        ErrorSeverity::Critical,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorSeverity::Low => "low",
            ErrorSeverity::Medium => "medium",
            ErrorSeverity::High => "high",
            ErrorSeverity::Critical => "critical",
        }
    }
}

impl std::fmt::Display for ErrorSeverity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ErrorSeverity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ErrorSeverity::ALL
            .iter()
            .find(|v| v.as_str().eq_ignore_ascii_case(s))
            .copied()
            .ok_or_else(|| format!("unknown severity '{}'", s))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ErrorCategory {
    PluginLoad,
    PluginExecution,
    Configuration,
    Network,
    Database,
    Memory,
    Security,
    System,
    Unknown,
}

impl ErrorCategory {
    pub const ALL: [ErrorCategory; 9] = [
        ErrorCategory::PluginLoad,
        ErrorCategory::PluginExecution,
        ErrorCategory::Configuration,
        ErrorCategory::Network,
        ErrorCategory::Database,
        ErrorCategory::Memory,
        ErrorCategory::Security,
        ErrorCategory::System,
        ErrorCategory::Unknown,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCategory::PluginLoad => "plugin-load",
            ErrorCategory::PluginExecution => "plugin-execution",
            ErrorCategory::Configuration => "configuration",
            ErrorCategory::Network => "network",
            ErrorCategory::Database => "database",
            ErrorCategory::Memory => "memory",
            ErrorCategory::Security => "security",
            ErrorCategory::System => "system",
            ErrorCategory::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ErrorCategory {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.replace('_', "-");
        ErrorCategory::ALL
            .iter()
            .find(|v| v.as_str().eq_ignore_ascii_case(&normalized))
            .copied()
            .ok_or_else(|| format!("unknown category '{}'", s))
    }
}

// ============================================================================
// Errors
// ============================================================================

/// An error tracked by the engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SystemError {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub severity: ErrorSeverity,
    pub category: ErrorCategory,
    pub message: String,
    #[serde(default)]
    pub context: ErrorContext,
    pub source: String,
    pub component: Option<String>,
    pub plugin: Option<String>,
    pub user_id: Option<String>,
    pub session_id: Option<String>,
    pub resolved: bool,
    pub resolved_at: Option<DateTime<Utc>>,
    pub resolution_method: Option<String>,
    pub retry_count: u32,
}

/// Everything a collaborator supplies when reporting an error
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorReport {
    pub severity: ErrorSeverity,
    pub category: ErrorCategory,
    pub message: String,
    #[serde(default)]
    pub context: ErrorContext,
    #[serde(default = "default_source")]
    pub source: String,
    #[serde(default)]
    pub component: Option<String>,
    #[serde(default)]
    pub plugin: Option<String>,
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub session_id: Option<String>,
}

fn default_source() -> String {
    "unknown".to_string()
}

impl ErrorReport {
    pub fn new(category: ErrorCategory, severity: ErrorSeverity, message: &str) -> Self {
        Self {
            severity,
            category,
            message: message.to_string(),
            context: ErrorContext::new(),
            source: default_source(),
            component: None,
            plugin: None,
            user_id: None,
            session_id: None,
        }
    }

    pub fn with_source(mut self, source: &str) -> Self {
        self.source = source.to_string();
        self
    }

    pub fn with_component(mut self, component: &str) -> Self {
        self.component = Some(component.to_string());
        self
    }

    pub fn with_plugin(mut self, plugin: &str) -> Self {
        self.plugin = Some(plugin.to_string());
        self
    }

    pub fn with_user(mut self, user_id: &str) -> Self {
        self.user_id = Some(user_id.to_string());
        self
    }

    pub fn with_session(mut self, session_id: &str) -> Self {
        self.session_id = Some(session_id.to_string());
        self
    }

    pub fn with_context(mut self, key: &str, value: serde_json::Value) -> Self {
        self.context.insert(key.to_string(), value);
        self
    }

    /// Reject reports that cannot be classified or attributed.
    pub fn validate(&self) -> Result<(), SelfHealError> {
        if self.message.trim().is_empty() {
            return Err(SelfHealError::InvalidReport(
                "message cannot be empty".into(),
            ));
        }
        if self.source.trim().is_empty() {
            return Err(SelfHealError::InvalidReport("source cannot be empty".into()));
        }
        Ok(())
    }

    /// Stamp identity and initial lifecycle state onto the report.
    pub fn into_error(self) -> SystemError {
        SystemError {
            id: format!("err_{}", uuid::Uuid::new_v4().simple()),
            timestamp: Utc::now(),
            severity: self.severity,
            category: self.category,
            message: self.message,
            context: self.context,
            source: self.source,
            component: self.component,
            plugin: self.plugin,
            user_id: self.user_id,
            session_id: self.session_id,
            resolved: false,
            resolved_at: None,
            resolution_method: None,
            retry_count: 0,
        }
    }
}

// ============================================================================
// Strategies
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackoffStrategy {
    Linear,
    Exponential,
    Fixed,
}

impl BackoffStrategy {
    /// Delay inserted before the attempt that follows `retry_count` failures.
    pub fn delay(&self, retry_count: u32) -> Duration {
        match self {
            Self::Linear => BACKOFF_BASE.saturating_mul(retry_count),
            Self::Exponential => {
                let factor = 1u32
                    .checked_shl(retry_count.saturating_sub(1))
                    .unwrap_or(u32::MAX);
                BACKOFF_BASE.saturating_mul(factor)
            }
            Self::Fixed => BACKOFF_BASE,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", try_from = "String")]
pub enum ActionKind {
    Restart,
    Reload,
    Rollback,
    Disable,
    Notify,
    Escalate,
    Custom,
}

impl ActionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionKind::Restart => "restart",
            ActionKind::Reload => "reload",
            ActionKind::Rollback => "rollback",
            ActionKind::Disable => "disable",
            ActionKind::Notify => "notify",
            ActionKind::Escalate => "escalate",
            ActionKind::Custom => "custom",
        }
    }
}

impl std::fmt::Display for ActionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ActionKind {
    type Err = RegistrationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "restart" => Ok(ActionKind::Restart),
            "reload" => Ok(ActionKind::Reload),
            "rollback" => Ok(ActionKind::Rollback),
            "disable" => Ok(ActionKind::Disable),
            "notify" => Ok(ActionKind::Notify),
            "escalate" => Ok(ActionKind::Escalate),
            "custom" => Ok(ActionKind::Custom),
            other => Err(RegistrationError::UnknownActionType {
                action: other.to_string(),
            }),
        }
    }
}

impl TryFrom<String> for ActionKind {
    type Error = RegistrationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// A single step of a strategy, delegated to a collaborator by `target`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecoveryAction {
    #[serde(rename = "type")]
    pub kind: ActionKind,
    pub target: String,
    #[serde(default)]
    pub params: HashMap<String, serde_json::Value>,
}

impl RecoveryAction {
    pub fn new(kind: ActionKind, target: &str) -> Self {
        Self {
            kind,
            target: target.to_string(),
            params: HashMap::new(),
        }
    }

    pub fn with_param(mut self, key: &str, value: serde_json::Value) -> Self {
        self.params.insert(key.to_string(), value);
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", try_from = "String")]
pub enum ConditionOperator {
    Equals,
    Contains,
    Matches,
    GreaterThan,
    LessThan,
    Exists,
}

impl std::str::FromStr for ConditionOperator {
    type Err = RegistrationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "equals" => Ok(ConditionOperator::Equals),
            "contains" => Ok(ConditionOperator::Contains),
            "matches" => Ok(ConditionOperator::Matches),
            "greater_than" => Ok(ConditionOperator::GreaterThan),
            "less_than" => Ok(ConditionOperator::LessThan),
            "exists" => Ok(ConditionOperator::Exists),
            other => Err(RegistrationError::UnknownOperator {
                operator: other.to_string(),
            }),
        }
    }
}

impl TryFrom<String> for ConditionOperator {
    type Error = RegistrationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// Predicate over `error.context`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecoveryCondition {
    /// Dotted path into the context, e.g. `memory.usage`
    pub field: String,
    pub operator: ConditionOperator,
    #[serde(default)]
    pub value: serde_json::Value,
}

impl RecoveryCondition {
    pub fn new(field: &str, operator: ConditionOperator, value: serde_json::Value) -> Self {
        Self {
            field: field.to_string(),
            operator,
            value,
        }
    }
}

/// A named, priority-ranked remediation recipe
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecoveryStrategy {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub applicable_categories: Vec<ErrorCategory>,
    pub applicable_severities: Vec<ErrorSeverity>,
    pub max_retries: u32,
    pub backoff_strategy: BackoffStrategy,
    pub actions: Vec<RecoveryAction>,
    #[serde(default)]
    pub conditions: Vec<RecoveryCondition>,
    #[serde(default)]
    pub priority: i32,
    pub timeout_ms: u64,
}

impl RecoveryStrategy {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn applies_to(&self, category: ErrorCategory, severity: ErrorSeverity) -> bool {
        self.applicable_categories.contains(&category)
            && self.applicable_severities.contains(&severity)
    }
}
