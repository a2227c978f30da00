//! State nodes of the definition tree.
//!
//! Every node has a kind drawn from a closed set; the resolver and the
//! microstep engine match on it exhaustively.

use super::action::ActionDescriptor;
use super::transition::{InvokeDef, TransitionDef};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Stable, user-visible node identifier (`machine.parent.child` by default).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(pub String);

impl NodeId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for NodeId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for NodeId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Position of a node in the tree.
///
/// Indices are assigned in pre-order, so comparing two indices compares the
/// nodes' document order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeIndex(pub(crate) usize);

impl NodeIndex {
    pub fn get(self) -> usize {
        self.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HistoryKind {
    Shallow,
    Deep,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    Atomic,
    Compound,
    Parallel,
    History(HistoryKind),
    Final,
}

impl NodeKind {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Atomic => "atomic",
            Self::Compound => "compound",
            Self::Parallel => "parallel",
            Self::History(HistoryKind::Shallow) => "shallow history",
            Self::History(HistoryKind::Deep) => "deep history",
            Self::Final => "final",
        }
    }
}

/// A node of the definition tree.
#[derive(Debug, Clone)]
pub struct StateNode {
    pub(crate) index: NodeIndex,
    pub(crate) id: NodeId,
    pub(crate) key: String,
    pub(crate) kind: NodeKind,
    pub(crate) parent: Option<NodeIndex>,
    pub(crate) children: Vec<NodeIndex>,
    pub(crate) initial: Option<NodeIndex>,
    pub(crate) depth: usize,
    pub(crate) transitions: Vec<TransitionDef>,
    pub(crate) entry: Vec<ActionDescriptor>,
    pub(crate) exit: Vec<ActionDescriptor>,
    pub(crate) invoke: Vec<InvokeDef>,
    /// Default targets of a history node
    pub(crate) history_default: Vec<NodeIndex>,
    pub(crate) data: Option<Value>,
    pub(crate) tags: Vec<String>,
}

impl StateNode {
    pub fn index(&self) -> NodeIndex {
        self.index
    }

    pub fn id(&self) -> &NodeId {
        &self.id
    }

    /// Key relative to the parent node.
    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn kind(&self) -> NodeKind {
        self.kind
    }

    pub fn parent(&self) -> Option<NodeIndex> {
        self.parent
    }

    pub fn children(&self) -> &[NodeIndex] {
        &self.children
    }

    pub fn initial(&self) -> Option<NodeIndex> {
        self.initial
    }

    /// Distance from the root.
    pub fn depth(&self) -> usize {
        self.depth
    }

    pub fn transitions(&self) -> &[TransitionDef] {
        &self.transitions
    }

    pub fn entry(&self) -> &[ActionDescriptor] {
        &self.entry
    }

    pub fn exit(&self) -> &[ActionDescriptor] {
        &self.exit
    }

    pub fn invocations(&self) -> &[InvokeDef] {
        &self.invoke
    }

    pub fn done_data(&self) -> Option<&Value> {
        self.data.as_ref()
    }

    pub fn tags(&self) -> &[String] {
        &self.tags
    }

    /// Atomic and final nodes are the leaves of a configuration.
    pub fn is_leaf(&self) -> bool {
        matches!(self.kind, NodeKind::Atomic | NodeKind::Final)
    }

    pub fn is_history(&self) -> bool {
        matches!(self.kind, NodeKind::History(_))
    }

    pub fn is_final(&self) -> bool {
        matches!(self.kind, NodeKind::Final)
    }
}
