//! Event bus for recovery notifications
//!
//! Fan-out publish/subscribe over a fixed set of topics. Payloads are typed per
//! topic; a panicking subscriber is isolated and logged so the remaining
//! subscribers still run and the emitter never sees the failure.

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, error};

use crate::errors::panic_message;
use crate::self_healing::{RecoveryAction, SystemError};
use crate::supervision::health::HealthCheckResult;

/// Topics collaborators can subscribe to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventTopic {
    #[serde(rename = "error:reported")]
    ErrorReported,
    #[serde(rename = "error:recovered")]
    ErrorRecovered,
    #[serde(rename = "error:recovery_failed")]
    ErrorRecoveryFailed,
    #[serde(rename = "error:notify")]
    ErrorNotify,
    #[serde(rename = "error:escalate")]
    ErrorEscalate,
    #[serde(rename = "health:check_completed")]
    HealthCheckCompleted,
    #[serde(rename = "health:check_failed")]
    HealthCheckFailed,
}

impl EventTopic {
    pub const ALL: [EventTopic; 7] = [
        EventTopic::ErrorReported,
        EventTopic::ErrorRecovered,
        EventTopic::ErrorRecoveryFailed,
        EventTopic::ErrorNotify,
        EventTopic::ErrorEscalate,
        EventTopic::HealthCheckCompleted,
        EventTopic::HealthCheckFailed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EventTopic::ErrorReported => "error:reported",
            EventTopic::ErrorRecovered => "error:recovered",
            EventTopic::ErrorRecoveryFailed => "error:recovery_failed",
            EventTopic::ErrorNotify => "error:notify",
            EventTopic::ErrorEscalate => "error:escalate",
            EventTopic::HealthCheckCompleted => "health:check_completed",
            EventTopic::HealthCheckFailed => "health:check_failed",
        }
    }
}

impl std::fmt::Display for EventTopic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for EventTopic {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        EventTopic::ALL
            .iter()
            .find(|t| t.as_str() == s)
            .copied()
            .ok_or_else(|| format!("unknown event topic '{}'", s))
    }
}

/// Payload delivered to subscribers; one variant per topic
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "topic", rename_all = "snake_case")]
pub enum RecoveryEvent {
    ErrorReported {
        error: SystemError,
    },
    ErrorRecovered {
        error: SystemError,
        strategy_id: String,
        strategy_name: String,
    },
    ErrorRecoveryFailed {
        error: SystemError,
        strategy_id: Option<String>,
        reason: String,
    },
    ErrorNotify {
        error: SystemError,
        action: RecoveryAction,
        channels: Vec<String>,
    },
    ErrorEscalate {
        error: SystemError,
        action: RecoveryAction,
    },
    HealthCheckCompleted {
        check_id: String,
        component: String,
        result: HealthCheckResult,
    },
    HealthCheckFailed {
        check_id: String,
        component: String,
        result: HealthCheckResult,
        consecutive_failures: u32,
    },
}

impl RecoveryEvent {
    pub fn topic(&self) -> EventTopic {
        match self {
            RecoveryEvent::ErrorReported { .. } => EventTopic::ErrorReported,
            RecoveryEvent::ErrorRecovered { .. } => EventTopic::ErrorRecovered,
            RecoveryEvent::ErrorRecoveryFailed { .. } => EventTopic::ErrorRecoveryFailed,
            RecoveryEvent::ErrorNotify { .. } => EventTopic::ErrorNotify,
            RecoveryEvent::ErrorEscalate { .. } => EventTopic::ErrorEscalate,
            RecoveryEvent::HealthCheckCompleted { .. } => EventTopic::HealthCheckCompleted,
            RecoveryEvent::HealthCheckFailed { .. } => EventTopic::HealthCheckFailed,
        }
    }
}

/// Event handler callback type
pub type EventHandler = Arc<dyn Fn(&RecoveryEvent) + Send + Sync>;

/// Handle returned by `on`, used to unsubscribe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

struct Subscription {
    id: SubscriptionId,
    handler: EventHandler,
}

/// Event bus statistics
#[derive(Debug, Default)]
pub struct EventBusStats {
    pub events_emitted: AtomicU64,
    pub events_delivered: AtomicU64,
    pub handler_failures: AtomicU64,
}

/// Fan-out event bus keyed by topic
pub struct EventBus {
    subscriptions: RwLock<HashMap<EventTopic, Vec<Subscription>>>,
    next_id: AtomicU64,
    stats: EventBusStats,
}

impl EventBus {
    pub fn new() -> Self {
        Self {
            subscriptions: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            stats: EventBusStats::default(),
        }
    }

    /// Subscribe to a topic
    pub fn on<F>(&self, topic: EventTopic, handler: F) -> SubscriptionId
    where
        F: Fn(&RecoveryEvent) + Send + Sync + 'static,
    {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.subscriptions
            .write()
            .entry(topic)
            .or_default()
            .push(Subscription {
                id,
                handler: Arc::new(handler),
            });
        debug!(topic = %topic, "Subscriber added");
        id
    }

    /// Unsubscribe; returns false when the subscription was not found
    pub fn off(&self, topic: EventTopic, id: SubscriptionId) -> bool {
        let mut subs = self.subscriptions.write();
        let Some(list) = subs.get_mut(&topic) else {
            return false;
        };
        let before = list.len();
        list.retain(|s| s.id != id);
        before != list.len()
    }

    /// Deliver an event to every subscriber of its topic
    pub fn emit(&self, event: RecoveryEvent) {
        self.stats.events_emitted.fetch_add(1, Ordering::Relaxed);
        let topic = event.topic();

        // Handlers run outside the lock so they may subscribe or unsubscribe.
        let handlers: Vec<EventHandler> = self
            .subscriptions
            .read()
            .get(&topic)
            .map(|list| list.iter().map(|s| Arc::clone(&s.handler)).collect())
            .unwrap_or_default();

        for handler in handlers {
            match catch_unwind(AssertUnwindSafe(|| handler(&event))) {
                Ok(()) => {
                    self.stats.events_delivered.fetch_add(1, Ordering::Relaxed);
                }
                Err(panic) => {
                    self.stats.handler_failures.fetch_add(1, Ordering::Relaxed);
                    let reason = panic_message(panic.as_ref());
                    error!(topic = %topic, reason = %reason, "Event subscriber failed");
                }
            }
        }
    }

    pub fn subscriber_count(&self, topic: EventTopic) -> usize {
        self.subscriptions
            .read()
            .get(&topic)
            .map(|l| l.len())
            .unwrap_or(0)
    }

    pub fn clear(&self) {
        self.subscriptions.write().clear();
    }

    pub fn summary(&self) -> EventBusSummary {
        EventBusSummary {
            subscriptions: self.subscriptions.read().values().map(|v| v.len()).sum(),
            events_emitted: self.stats.events_emitted.load(Ordering::Relaxed),
            events_delivered: self.stats.events_delivered.load(Ordering::Relaxed),
            handler_failures: self.stats.handler_failures.load(Ordering::Relaxed),
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

/// Event bus summary
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventBusSummary {
    pub subscriptions: usize,
    pub events_emitted: u64,
    pub events_delivered: u64,
    pub handler_failures: u64,
}
