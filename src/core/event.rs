//! Events and event descriptors.
//!
//! An [`Event`] is a name plus an arbitrary JSON payload. Transitions match
//! events through an [`EventDescriptor`], which is either an exact name, a
//! wildcard, or the eventless "always" marker.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Name of the event delivered with the initial microstep.
pub const INIT_EVENT: &str = "init";

/// An event flowing through a machine's mailbox.
///
/// # Example
///
/// ```rust
/// use harel::core::Event;
/// use serde_json::json;
///
/// let event = Event::with_data("DEPOSIT", json!({ "amount": 25 }));
/// assert_eq!(event.name, "DEPOSIT");
/// assert_eq!(event.data["amount"], 25);
///
/// let bare: Event = "RESET".into();
/// assert!(bare.data.is_null());
/// ```
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// Event type used for transition matching
    pub name: String,
    /// Free-form payload
    #[serde(default)]
    pub data: Value,
}

impl Event {
    /// Create an event without payload.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            data: Value::Null,
        }
    }

    /// Create an event carrying a payload.
    pub fn with_data(name: impl Into<String>, data: Value) -> Self {
        Self {
            name: name.into(),
            data,
        }
    }

    /// The event delivered while entering the initial configuration.
    pub fn init() -> Self {
        Self::new(INIT_EVENT)
    }

    /// Completion event for a compound or parallel node.
    pub fn done_state(node_id: &str, data: Value) -> Self {
        Self::with_data(format!("done.state.{node_id}"), data)
    }

    /// Completion event for an invoked or spawned actor.
    pub fn done_invoke(actor_id: &str, data: Value) -> Self {
        Self::with_data(format!("done.invoke.{actor_id}"), data)
    }

    /// Failure event for an invoked or spawned actor.
    pub fn error_platform(actor_id: &str, data: Value) -> Self {
        Self::with_data(format!("error.platform.{actor_id}"), data)
    }

    /// Name of the synthetic event used by `after` transitions.
    pub fn after_name(delay: &str, node_id: &str) -> String {
        format!("after({delay})#{node_id}")
    }
}

impl From<&str> for Event {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

impl From<String> for Event {
    fn from(name: String) -> Self {
        Self::new(name)
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

/// What a transition listens for.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum EventDescriptor {
    /// Exact event name
    Named(String),
    /// `prefix.*`: any event whose name starts with `prefix.`
    Prefix(String),
    /// `*`: any event
    Wildcard,
    /// Eventless transition, checked after every microstep
    Always,
}

impl EventDescriptor {
    /// Parse a descriptor from the form used in definitions.
    ///
    /// `"*"` is the wildcard, `"foo.*"` a prefix wildcard, anything else an
    /// exact name.
    pub fn parse(descriptor: &str) -> Self {
        if descriptor == "*" {
            Self::Wildcard
        } else if let Some(prefix) = descriptor.strip_suffix(".*") {
            Self::Prefix(prefix.to_string())
        } else {
            Self::Named(descriptor.to_string())
        }
    }

    pub fn is_exact(&self, name: &str) -> bool {
        matches!(self, Self::Named(n) if n == name)
    }

    /// Wildcard forms only; exact names are matched by [`is_exact`](Self::is_exact).
    pub fn is_wildcard_match(&self, name: &str) -> bool {
        match self {
            Self::Wildcard => true,
            Self::Prefix(prefix) => name
                .strip_prefix(prefix.as_str())
                .is_some_and(|rest| rest.starts_with('.')),
            Self::Named(_) | Self::Always => false,
        }
    }

    pub fn is_eventless(&self) -> bool {
        matches!(self, Self::Always)
    }
}

impl fmt::Display for EventDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Named(name) => f.write_str(name),
            Self::Prefix(prefix) => write!(f, "{prefix}.*"),
            Self::Wildcard => f.write_str("*"),
            Self::Always => f.write_str("(always)"),
        }
    }
}
