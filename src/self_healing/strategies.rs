//! Strategy registry and matching
//!
//! Strategies are matched on category, severity and every context condition,
//! then ranked by priority (highest first, registration order on ties).

use parking_lot::RwLock;
use regex::Regex;
use serde_json::Value;
use tracing::{debug, info};

use super::{
    ActionKind, BackoffStrategy, ConditionOperator, ErrorCategory, ErrorContext, ErrorSeverity,
    RecoveryAction, RecoveryCondition, RecoveryStrategy, SystemError,
};
use crate::errors::RegistrationError;

struct RegisteredStrategy {
    strategy: RecoveryStrategy,
    /// Compiled `matches` patterns, parallel to `strategy.conditions`
    patterns: Vec<Option<Regex>>,
}

impl RegisteredStrategy {
    fn matches(&self, error: &SystemError) -> bool {
        self.strategy.applies_to(error.category, error.severity)
            && self
                .strategy
                .conditions
                .iter()
                .zip(&self.patterns)
                .all(|(c, p)| evaluate_condition(c, &error.context, p.as_ref()))
    }
}

/// Keyed set of strategies in registration order
#[derive(Default)]
pub struct StrategyRegistry {
    strategies: RwLock<Vec<RegisteredStrategy>>,
}

impl StrategyRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a strategy; an existing id is replaced in place.
    pub fn add(&self, strategy: RecoveryStrategy) -> Result<(), RegistrationError> {
        let patterns = validate_strategy(&strategy)?;
        let entry = RegisteredStrategy { strategy, patterns };

        let mut strategies = self.strategies.write();
        match strategies
            .iter_mut()
            .find(|s| s.strategy.id == entry.strategy.id)
        {
            Some(existing) => {
                debug!(strategy = %entry.strategy.id, "Replacing recovery strategy");
                *existing = entry;
            }
            None => {
                info!(strategy = %entry.strategy.id, "Registered recovery strategy");
                strategies.push(entry);
            }
        }
        Ok(())
    }

    pub fn remove(&self, id: &str) -> Result<RecoveryStrategy, RegistrationError> {
        let mut strategies = self.strategies.write();
        let index = strategies
            .iter()
            .position(|s| s.strategy.id == id)
            .ok_or_else(|| RegistrationError::UnknownStrategy { id: id.to_string() })?;
        Ok(strategies.remove(index).strategy)
    }

    pub fn get(&self, id: &str) -> Option<RecoveryStrategy> {
        self.strategies
            .read()
            .iter()
            .find(|s| s.strategy.id == id)
            .map(|s| s.strategy.clone())
    }

    pub fn list(&self) -> Vec<RecoveryStrategy> {
        self.strategies
            .read()
            .iter()
            .map(|s| s.strategy.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.strategies.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Every applicable strategy, highest priority first.
    pub fn match_error(&self, error: &SystemError) -> Vec<RecoveryStrategy> {
        let mut matched: Vec<RecoveryStrategy> = self
            .strategies
            .read()
            .iter()
            .filter(|s| s.matches(error))
            .map(|s| s.strategy.clone())
            .collect();
        // stable sort keeps registration order on equal priority
        matched.sort_by(|a, b| b.priority.cmp(&a.priority));
        matched
    }

    /// The strategy the executor runs for this error, if any.
    pub fn best_match(&self, error: &SystemError) -> Option<RecoveryStrategy> {
        self.match_error(error).into_iter().next()
    }

    pub fn clear(&self) {
        self.strategies.write().clear();
    }
}

fn validate_strategy(strategy: &RecoveryStrategy) -> Result<Vec<Option<Regex>>, RegistrationError> {
    let invalid = |reason: &str| RegistrationError::InvalidStrategy {
        id: strategy.id.clone(),
        reason: reason.to_string(),
    };

    if strategy.id.trim().is_empty() {
        return Err(invalid("id cannot be empty"));
    }
    if strategy.name.trim().is_empty() {
        return Err(invalid("name cannot be empty"));
    }
    if strategy.applicable_categories.is_empty() {
        return Err(invalid("at least one category is required"));
    }
    if strategy.applicable_severities.is_empty() {
        return Err(invalid("at least one severity is required"));
    }
    if strategy.actions.is_empty() {
        return Err(invalid("at least one action is required"));
    }
    if strategy.timeout_ms == 0 {
        return Err(invalid("timeout must be greater than 0"));
    }
    if let Some(action) = strategy.actions.iter().find(|a| a.target.trim().is_empty()) {
        return Err(invalid(&format!("{} action has an empty target", action.kind)));
    }

    strategy
        .conditions
        .iter()
        .map(|c| {
            if c.field.trim().is_empty() {
                return Err(RegistrationError::InvalidCondition {
                    field: c.field.clone(),
                    reason: "field path cannot be empty".into(),
                });
            }
            if c.operator != ConditionOperator::Matches {
                return Ok(None);
            }
            let pattern = c.value.as_str().ok_or_else(|| RegistrationError::InvalidCondition {
                field: c.field.clone(),
                reason: "matches requires a string pattern".into(),
            })?;
            Regex::new(pattern)
                .map(Some)
                .map_err(|e| RegistrationError::InvalidCondition {
                    field: c.field.clone(),
                    reason: e.to_string(),
                })
        })
        .collect()
}

// ============================================================================
// Condition evaluation
// ============================================================================

/// Resolve a dotted path like `request.headers.host` inside the context.
/// Any missing intermediate key yields `None`.
pub fn lookup_path<'a>(context: &'a ErrorContext, path: &str) -> Option<&'a Value> {
    let mut segments = path.split('.');
    let mut current = context.get(segments.next()?)?;
    for segment in segments {
        current = match current {
            Value::Object(map) => map.get(segment)?,
            Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    Some(current)
}

/// Absent fields only satisfy nothing; `exists` is the one operator that
/// inspects absence directly.
pub fn evaluate_condition(
    condition: &RecoveryCondition,
    context: &ErrorContext,
    pattern: Option<&Regex>,
) -> bool {
    let actual = lookup_path(context, &condition.field);

    if condition.operator == ConditionOperator::Exists {
        return actual.is_some();
    }
    let Some(actual) = actual else {
        return false;
    };

    match condition.operator {
        ConditionOperator::Equals => values_equal(actual, &condition.value),
        ConditionOperator::Contains => match (actual, &condition.value) {
            (Value::String(haystack), Value::String(needle)) => haystack.contains(needle.as_str()),
            (Value::Array(items), expected) => items.iter().any(|i| values_equal(i, expected)),
            _ => false,
        },
        ConditionOperator::Matches => match (actual.as_str(), pattern) {
            (Some(text), Some(re)) => re.is_match(text),
            (Some(text), None) => condition
                .value
                .as_str()
                .and_then(|p| Regex::new(p).ok())
                .map(|re| re.is_match(text))
                .unwrap_or(false),
            _ => false,
        },
        ConditionOperator::GreaterThan => match (actual.as_f64(), condition.value.as_f64()) {
            (Some(a), Some(b)) => a > b,
            _ => false,
        },
        ConditionOperator::LessThan => match (actual.as_f64(), condition.value.as_f64()) {
            (Some(a), Some(b)) => a < b,
            _ => false,
        },
        ConditionOperator::Exists => true,
    }
}

fn values_equal(a: &Value, b: &Value) -> bool {
    match (a.as_f64(), b.as_f64()) {
        (Some(x), Some(y)) if a.is_number() && b.is_number() => x == y,
        _ => a == b,
    }
}

// ============================================================================
// Built-in strategies
// ============================================================================

/// Strategies every engine starts with when built via `with_builtin_strategies`.
pub fn builtin_strategies() -> Vec<RecoveryStrategy> {
    use ErrorSeverity::*;

    vec![
        RecoveryStrategy {
            id: "plugin-load-retry".into(),
            name: "Plugin Load Retry".into(),
            description: "Reload a plugin that failed to load".into(),
            applicable_categories: vec![ErrorCategory::PluginLoad],
            applicable_severities: vec![Low, Medium, High],
            max_retries: 3,
            backoff_strategy: BackoffStrategy::Exponential,
            actions: vec![RecoveryAction::new(ActionKind::Reload, "plugin")],
            conditions: vec![],
            priority: 10,
            timeout_ms: 30_000,
        },
        RecoveryStrategy {
            id: "plugin-execution-restart".into(),
            name: "Plugin Execution Restart".into(),
            description: "Restart a plugin whose execution failed and notify admins".into(),
            applicable_categories: vec![ErrorCategory::PluginExecution],
            applicable_severities: vec![Medium, High, Critical],
            max_retries: 2,
            backoff_strategy: BackoffStrategy::Linear,
            actions: vec![
                RecoveryAction::new(ActionKind::Restart, "plugin"),
                RecoveryAction::new(ActionKind::Notify, "admin"),
            ],
            conditions: vec![],
            priority: 8,
            timeout_ms: 60_000,
        },
        RecoveryStrategy {
            id: "configuration-rollback".into(),
            name: "Configuration Rollback".into(),
            description: "Roll back to the last known good configuration".into(),
            applicable_categories: vec![ErrorCategory::Configuration],
            applicable_severities: ErrorSeverity::ALL.to_vec(),
            max_retries: 1,
            backoff_strategy: BackoffStrategy::Fixed,
            actions: vec![
                RecoveryAction::new(ActionKind::Rollback, "configuration"),
                RecoveryAction::new(ActionKind::Notify, "admin"),
            ],
            conditions: vec![],
            priority: 9,
            timeout_ms: 15_000,
        },
        RecoveryStrategy {
            id: "memory-cleanup".into(),
            name: "Memory Cleanup".into(),
            description: "Free memory, then restart the affected component".into(),
            applicable_categories: vec![ErrorCategory::Memory],
            applicable_severities: vec![High, Critical],
            max_retries: 2,
            backoff_strategy: BackoffStrategy::Fixed,
            actions: vec![
                RecoveryAction::new(ActionKind::Custom, "garbage-collect"),
                RecoveryAction::new(ActionKind::Restart, "component"),
            ],
            conditions: vec![],
            priority: 7,
            timeout_ms: 45_000,
        },
        RecoveryStrategy {
            id: "network-retry".into(),
            name: "Network Retry".into(),
            description: "Re-establish the failed connection".into(),
            applicable_categories: vec![ErrorCategory::Network],
            applicable_severities: vec![Low, Medium, High],
            max_retries: 5,
            backoff_strategy: BackoffStrategy::Exponential,
            actions: vec![RecoveryAction::new(ActionKind::Custom, "reconnect")],
            conditions: vec![],
            priority: 5,
            timeout_ms: 20_000,
        },
        RecoveryStrategy {
            id: "security-escalation".into(),
            name: "Security Escalation".into(),
            description: "Disable the offending plugin and escalate to the security team".into(),
            applicable_categories: vec![ErrorCategory::Security],
            applicable_severities: ErrorSeverity::ALL.to_vec(),
            max_retries: 1,
            backoff_strategy: BackoffStrategy::Fixed,
            actions: vec![
                RecoveryAction::new(ActionKind::Disable, "plugin"),
                RecoveryAction::new(ActionKind::Escalate, "security-team"),
            ],
            conditions: vec![],
            priority: 100,
            timeout_ms: 10_000,
        },
    ]
}
