//! Action descriptors.
//!
//! Descriptors only say *what* should happen. Named actions are resolved
//! against the [`Registry`](crate::registry::Registry); the built-in kinds
//! (raise, send, cancel, log, spawn, stop) are interpreted by the microstep
//! engine and the interpreter.

use super::event::Event;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Identifier of an actor owned by an interpreter.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ActorId(pub String);

impl ActorId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for ActorId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for ActorId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl fmt::Display for ActorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Where a `send` action delivers its event.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SendTarget {
    /// The sending machine's own mailbox
    Myself,
    /// The machine that spawned or invoked this one
    Parent,
    /// An actor owned by the sending machine
    Actor(ActorId),
}

/// Delay of a scheduled send.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DelaySpec {
    Fixed(Duration),
    /// Looked up in the registry and computed from context and event
    Named(String),
}

impl DelaySpec {
    /// Label used in synthetic `after` event names.
    pub fn label(&self) -> String {
        match self {
            Self::Fixed(duration) => duration.as_millis().to_string(),
            Self::Named(name) => name.clone(),
        }
    }
}

/// A `send` action under construction.
///
/// # Example
///
/// ```rust
/// use harel::core::{ActionDescriptor, SendAction, SendTarget};
/// use std::time::Duration;
///
/// let ping = SendAction::new("PING")
///     .to("pinger")
///     .delay(Duration::from_millis(500))
///     .id("ping-timer");
/// assert_eq!(ping.target, SendTarget::Actor("pinger".into()));
///
/// let action: ActionDescriptor = ping.into();
/// assert!(matches!(action, ActionDescriptor::Send(_)));
/// ```
#[derive(Clone, Debug, PartialEq)]
pub struct SendAction {
    /// `None` forwards the event currently being processed
    pub event: Option<Event>,
    pub target: SendTarget,
    pub delay: Option<DelaySpec>,
    pub id: Option<String>,
}

impl SendAction {
    pub fn new(event: impl Into<Event>) -> Self {
        Self {
            event: Some(event.into()),
            target: SendTarget::Myself,
            delay: None,
            id: None,
        }
    }

    /// Forward the current event to an actor.
    pub fn forward(actor: impl Into<ActorId>) -> Self {
        Self {
            event: None,
            target: SendTarget::Actor(actor.into()),
            delay: None,
            id: None,
        }
    }

    pub fn to(mut self, actor: impl Into<ActorId>) -> Self {
        self.target = SendTarget::Actor(actor.into());
        self
    }

    pub fn to_parent(mut self) -> Self {
        self.target = SendTarget::Parent;
        self
    }

    pub fn delay(mut self, delay: Duration) -> Self {
        self.delay = Some(DelaySpec::Fixed(delay));
        self
    }

    pub fn delay_named(mut self, name: impl Into<String>) -> Self {
        self.delay = Some(DelaySpec::Named(name.into()));
        self
    }

    /// Send id used as cancellation key.
    pub fn id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }
}

/// Declarative description of an action attached to a node or transition.
#[derive(Clone, Debug, PartialEq)]
pub enum ActionDescriptor {
    /// Registry action: an assignment or an effect
    Named(String),
    /// Push an event onto the internal queue
    Raise(Event),
    Send(SendAction),
    /// Cancel scheduled sends with this id
    Cancel(String),
    /// Emit a log line
    Log(String),
    /// Start a registry service as a machine-owned actor
    Spawn { service: String, id: ActorId },
    /// Stop an owned actor
    Stop(ActorId),
}

impl ActionDescriptor {
    pub fn named(name: impl Into<String>) -> Self {
        Self::Named(name.into())
    }

    pub fn raise(event: impl Into<Event>) -> Self {
        Self::Raise(event.into())
    }

    pub fn send(event: impl Into<Event>) -> SendAction {
        SendAction::new(event)
    }

    pub fn forward_to(actor: impl Into<ActorId>) -> Self {
        Self::Send(SendAction::forward(actor))
    }

    pub fn cancel(id: impl Into<String>) -> Self {
        Self::Cancel(id.into())
    }

    pub fn log(label: impl Into<String>) -> Self {
        Self::Log(label.into())
    }

    pub fn spawn(service: impl Into<String>, id: impl Into<ActorId>) -> Self {
        Self::Spawn {
            service: service.into(),
            id: id.into(),
        }
    }

    pub fn stop(id: impl Into<ActorId>) -> Self {
        Self::Stop(id.into())
    }
}

impl From<&str> for ActionDescriptor {
    fn from(name: &str) -> Self {
        Self::Named(name.to_string())
    }
}

impl From<String> for ActionDescriptor {
    fn from(name: String) -> Self {
        Self::Named(name)
    }
}

impl From<SendAction> for ActionDescriptor {
    fn from(send: SendAction) -> Self {
        Self::Send(send)
    }
}
