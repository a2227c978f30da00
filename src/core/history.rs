//! History values.
//!
//! When a node with history children is exited, the resolver needs to know
//! what was active under it. [`HistoryValue`] records that per history node
//! and is consulted only when a transition re-enters through it.

use super::configuration::Configuration;
use super::node::{HistoryKind, NodeIndex, NodeKind};
use super::tree::StateTree;
use std::collections::{BTreeMap, BTreeSet};

/// Recorded history, keyed by history node.
///
/// Like the rest of the core, recording is pure: [`record_exit`](Self::record_exit)
/// returns a new value and leaves the original untouched.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct HistoryValue {
    entries: BTreeMap<NodeIndex, BTreeSet<NodeIndex>>,
}

impl HistoryValue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Nodes remembered by `history`, if it has been recorded.
    pub fn get(&self, history: NodeIndex) -> Option<&BTreeSet<NodeIndex>> {
        self.entries.get(&history)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (NodeIndex, &BTreeSet<NodeIndex>)> {
        self.entries.iter().map(|(&k, v)| (k, v))
    }

    pub(crate) fn insert(&mut self, history: NodeIndex, nodes: BTreeSet<NodeIndex>) {
        self.entries.insert(history, nodes);
    }

    /// Capture history for every history child of the exited nodes.
    ///
    /// `configuration` is the configuration *before* the exit. Shallow
    /// history remembers the active children of its parent, deep history the
    /// active leaves below it.
    pub fn record_exit(
        &self,
        tree: &StateTree,
        configuration: &Configuration,
        exited: &[NodeIndex],
    ) -> Self {
        let mut next = self.clone();
        for &node in exited {
            for &child in tree.node(node).children() {
                let NodeKind::History(kind) = tree.node(child).kind() else {
                    continue;
                };
                let remembered: BTreeSet<NodeIndex> = match kind {
                    HistoryKind::Shallow => tree
                        .node(node)
                        .children()
                        .iter()
                        .copied()
                        .filter(|&c| configuration.contains(c))
                        .collect(),
                    HistoryKind::Deep => configuration
                        .iter()
                        .filter(|&c| tree.node(c).is_leaf() && tree.is_descendant(c, node))
                        .collect(),
                };
                next.entries.insert(child, remembered);
            }
        }
        next
    }
}
