//! Interpreter configuration.
//!
//! Every field has a default, so a partial JSON document is a valid
//! configuration:
//!
//! ```rust
//! use harel::config::{ErrorPolicy, InterpreterConfig};
//!
//! let config: InterpreterConfig = serde_json::from_str(r#"{ "error_policy": "fatal" }"#).unwrap();
//! assert_eq!(config.error_policy, ErrorPolicy::Fatal);
//! assert_eq!(config.max_microsteps, 1000);
//! ```

use serde::{Deserialize, Serialize};

/// What happens when an action fails during a macrostep.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorPolicy {
    /// Abandon the failing microstep and keep the last stable configuration
    #[default]
    Abort,
    /// Stop the interpreter
    Fatal,
}

/// What happens when a guard fails to evaluate.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GuardErrorPolicy {
    /// The guard counts as not passing; the error is still reported
    #[default]
    TreatAsFalse,
    /// The error aborts the macrostep like a failing action
    Propagate,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct InterpreterConfig {
    pub error_policy: ErrorPolicy,
    pub guard_errors: GuardErrorPolicy,
    /// Upper bound on microsteps per macrostep
    pub max_microsteps: usize,
}

impl Default for InterpreterConfig {
    fn default() -> Self {
        Self {
            error_policy: ErrorPolicy::Abort,
            guard_errors: GuardErrorPolicy::TreatAsFalse,
            max_microsteps: 1000,
        }
    }
}

impl InterpreterConfig {
    pub fn error_policy(mut self, policy: ErrorPolicy) -> Self {
        self.error_policy = policy;
        self
    }

    pub fn guard_errors(mut self, policy: GuardErrorPolicy) -> Self {
        self.guard_errors = policy;
        self
    }

    pub fn max_microsteps(mut self, limit: usize) -> Self {
        self.max_microsteps = limit;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_yields_defaults() {
        let config: InterpreterConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config, InterpreterConfig::default());
    }

    #[test]
    fn policies_use_snake_case() {
        let config = InterpreterConfig::default()
            .guard_errors(GuardErrorPolicy::Propagate)
            .max_microsteps(10);
        let json = serde_json::to_value(&config).unwrap();
        assert_eq!(json["guard_errors"], "propagate");
        assert_eq!(json["error_policy"], "abort");
        assert_eq!(json["max_microsteps"], 10);
    }
}
