use thiserror::Error;

/// The central error type for the recovery engine.
///
/// Only misconfiguration and malformed reports surface to callers; failures
/// inside the recovery pipeline are recorded on the error itself and announced
/// through the event bus.
#[derive(Error, Debug)]
pub enum SelfHealError {
    #[error("Registration error: {0}")]
    Registration(#[from] RegistrationError),

    #[error("Recovery error: {0}")]
    Recovery(#[from] RecoveryFailure),

    #[error("Invalid error report: {0}")]
    InvalidReport(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistrationError {
    #[error("Unknown recovery strategy '{id}'")]
    UnknownStrategy { id: String },

    #[error("Invalid recovery strategy '{id}': {reason}")]
    InvalidStrategy { id: String, reason: String },

    #[error("Unknown recovery action type '{action}'")]
    UnknownActionType { action: String },

    #[error("Unknown condition operator '{operator}'")]
    UnknownOperator { operator: String },

    #[error("Invalid condition on '{field}': {reason}")]
    InvalidCondition { field: String, reason: String },

    #[error("Unknown health check '{id}'")]
    UnknownHealthCheck { id: String },

    #[error("Invalid health check '{id}': {reason}")]
    InvalidHealthCheck { id: String, reason: String },

    #[error("Unknown circuit breaker '{id}'")]
    UnknownCircuitBreaker { id: String },

    #[error("Invalid circuit breaker '{id}': {reason}")]
    InvalidCircuitBreaker { id: String, reason: String },
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RecoveryFailure {
    #[error("Max retries exceeded ({retries}/{max_retries})")]
    MaxRetriesExceeded { retries: u32, max_retries: u32 },

    #[error("Action '{action}' on '{target}' failed: {message}")]
    ActionFailed {
        action: String,
        target: String,
        message: String,
    },

    #[error("Recovery timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },
}

pub type Result<T> = std::result::Result<T, SelfHealError>;

pub const EXIT_SUCCESS: u8 = 0;
pub const EXIT_ERROR: u8 = 1;
pub const EXIT_CONFIG_ERROR: u8 = 2;
pub const EXIT_REGISTRATION_ERROR: u8 = 3;

/// Determine the appropriate process exit code for an error.
pub fn get_exit_code(e: &anyhow::Error) -> u8 {
    if let Some(err) = e.downcast_ref::<SelfHealError>() {
        return match err {
            SelfHealError::Config(_) => EXIT_CONFIG_ERROR,
            SelfHealError::Registration(_) => EXIT_REGISTRATION_ERROR,
            _ => EXIT_ERROR,
        };
    }

    if e.downcast_ref::<RegistrationError>().is_some() {
        return EXIT_REGISTRATION_ERROR;
    }

    EXIT_ERROR
}

/// Readable text for a caught panic payload.
pub fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string())
}
