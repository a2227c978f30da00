//! Resolved transition definitions.

use super::action::{ActionDescriptor, ActorId};
use super::event::EventDescriptor;
use super::node::NodeIndex;

/// Guard attached to a transition.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum GuardDescriptor {
    /// Registry guard evaluated against context and event
    Named(String),
    /// Passes when the node is in the active configuration
    InState(NodeIndex),
}

/// A transition candidate, fully resolved by the builder.
#[derive(Clone, Debug)]
pub struct TransitionDef {
    pub source: NodeIndex,
    pub event: EventDescriptor,
    pub guard: Option<GuardDescriptor>,
    pub actions: Vec<ActionDescriptor>,
    /// Empty for targetless transitions
    pub targets: Vec<NodeIndex>,
    pub internal: bool,
}

impl TransitionDef {
    pub fn is_targetless(&self) -> bool {
        self.targets.is_empty()
    }
}

/// Service invoked while a node is active.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InvokeDef {
    pub id: ActorId,
    /// Registry service name
    pub service: String,
    /// Forward every external event the machine receives
    pub auto_forward: bool,
}
