//! Errors raised while running a macrostep.

use super::guard::GuardError;
use thiserror::Error;

/// Error returned by a side-effecting action.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{message}")]
pub struct ActionError {
    pub message: String,
}

impl ActionError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Steady-state failures surfaced by the macrostep loop.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ExecutionError {
    #[error("guard '{guard}' failed on '{event}': {source}")]
    Guard {
        guard: String,
        event: String,
        #[source]
        source: GuardError,
    },

    #[error("action '{action}' failed on '{event}': {source}")]
    Action {
        action: String,
        event: String,
        #[source]
        source: ActionError,
    },

    #[error("action '{action}' is not registered")]
    UnknownAction { action: String },

    #[error("service '{service}' is not registered")]
    UnknownService { service: String },

    #[error("delay '{delay}' is not registered")]
    UnknownDelay { delay: String },

    #[error("delay of event '{event}' is out of range")]
    DelayOverflow { event: String },

    #[error("macrostep exceeded {limit} microsteps on '{event}'")]
    MicrostepLimit { limit: usize, event: String },
}

impl ExecutionError {
    /// Returns a short code suitable for logs and error events.
    pub fn error_code(&self) -> &'static str {
        match self {
            ExecutionError::Guard { .. } => "GUARD_FAILED",
            ExecutionError::Action { .. } => "ACTION_FAILED",
            ExecutionError::UnknownAction { .. } => "UNKNOWN_ACTION",
            ExecutionError::UnknownService { .. } => "UNKNOWN_SERVICE",
            ExecutionError::UnknownDelay { .. } => "UNKNOWN_DELAY",
            ExecutionError::DelayOverflow { .. } => "DELAY_OVERFLOW",
            ExecutionError::MicrostepLimit { .. } => "MICROSTEP_LIMIT",
        }
    }
}
