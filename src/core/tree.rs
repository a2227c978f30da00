//! The immutable definition tree.

use super::configuration::Configuration;
use super::node::{NodeId, NodeIndex, NodeKind, StateNode};
use super::transition::TransitionDef;
use std::collections::HashMap;

/// Immutable arena of state nodes, built once per machine definition.
///
/// Nodes are stored in pre-order: index 0 is the root and every node comes
/// before its descendants. Running instances share the tree behind an `Arc`.
#[derive(Debug, Clone)]
pub struct StateTree {
    machine_id: String,
    nodes: Vec<StateNode>,
    by_id: HashMap<NodeId, NodeIndex>,
}

impl StateTree {
    pub(crate) fn new(machine_id: String, nodes: Vec<StateNode>) -> Self {
        let mut by_id = HashMap::with_capacity(nodes.len());
        for node in &nodes {
            by_id.entry(node.id.clone()).or_insert(node.index);
        }
        Self {
            machine_id,
            nodes,
            by_id,
        }
    }

    pub fn machine_id(&self) -> &str {
        &self.machine_id
    }

    pub fn root(&self) -> NodeIndex {
        NodeIndex(0)
    }

    /// Node at `index`.
    ///
    /// Indices are only handed out by this tree, so lookups never miss.
    pub fn node(&self, index: NodeIndex) -> &StateNode {
        &self.nodes[index.0]
    }

    pub fn get(&self, id: &str) -> Option<&StateNode> {
        self.index_of(id).map(|index| self.node(index))
    }

    pub fn index_of(&self, id: &str) -> Option<NodeIndex> {
        self.by_id.get(&NodeId::from(id)).copied()
    }

    pub fn nodes(&self) -> impl Iterator<Item = &StateNode> {
        self.nodes.iter()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// All transitions in document order.
    pub fn transitions(&self) -> impl Iterator<Item = &TransitionDef> {
        self.nodes.iter().flat_map(|node| node.transitions.iter())
    }

    /// Proper ancestors, nearest first.
    pub fn ancestors(&self, index: NodeIndex) -> Ancestors<'_> {
        Ancestors {
            tree: self,
            next: self.node(index).parent,
        }
    }

    /// Whether `node` is a proper descendant of `ancestor`.
    pub fn is_descendant(&self, node: NodeIndex, ancestor: NodeIndex) -> bool {
        self.ancestors(node).any(|a| a == ancestor)
    }

    /// Whether `node` has completed in `configuration`.
    ///
    /// A compound node is complete when its active child is final; a
    /// parallel node when every region is complete. History children are
    /// not regions.
    pub fn is_in_final_state(&self, node: NodeIndex, configuration: &Configuration) -> bool {
        let state = self.node(node);
        match state.kind {
            NodeKind::Compound => state
                .children
                .iter()
                .any(|&child| configuration.contains(child) && self.node(child).is_final()),
            NodeKind::Parallel => state
                .children
                .iter()
                .filter(|&&child| !self.node(child).is_history())
                .all(|&child| self.is_in_final_state(child, configuration)),
            NodeKind::Final => configuration.contains(node),
            NodeKind::Atomic | NodeKind::History(_) => false,
        }
    }

    /// Nearest common ancestor that is compound (or the root) and contains
    /// every node in `nodes` as a proper descendant.
    pub(crate) fn least_common_compound_ancestor(&self, nodes: &[NodeIndex]) -> NodeIndex {
        let Some((&head, tail)) = nodes.split_first() else {
            return self.root();
        };
        self.ancestors(head)
            .find(|&ancestor| {
                let node = self.node(ancestor);
                (node.kind == NodeKind::Compound || node.parent.is_none())
                    && tail.iter().all(|&n| self.is_descendant(n, ancestor))
            })
            .unwrap_or_else(|| self.root())
    }
}

/// Iterator over proper ancestors, see [`StateTree::ancestors`].
pub struct Ancestors<'a> {
    tree: &'a StateTree,
    next: Option<NodeIndex>,
}

impl Iterator for Ancestors<'_> {
    type Item = NodeIndex;

    fn next(&mut self) -> Option<NodeIndex> {
        let current = self.next?;
        self.next = self.tree.node(current).parent;
        Some(current)
    }
}

#[cfg(test)]
mod tests {
    use crate::builder::StateBuilder;

    fn tree() -> crate::core::StateTree {
        StateBuilder::new()
            .initial("a")
            .state(
                "a",
                StateBuilder::new()
                    .initial("a1")
                    .state("a1", StateBuilder::new())
                    .state("a2", StateBuilder::new()),
            )
            .state(
                "p",
                StateBuilder::parallel()
                    .state("r1", StateBuilder::new().initial("x").state("x", StateBuilder::new()))
                    .state("r2", StateBuilder::new().initial("y").state("y", StateBuilder::new())),
            )
            .build("m")
            .unwrap()
    }

    #[test]
    fn nodes_are_stored_in_document_order() {
        let tree = tree();
        let ids: Vec<&str> = tree.nodes().map(|n| n.id().as_str()).collect();
        assert_eq!(
            ids,
            vec!["m", "m.a", "m.a.a1", "m.a.a2", "m.p", "m.p.r1", "m.p.r1.x", "m.p.r2", "m.p.r2.y"]
        );
    }

    #[test]
    fn depth_counts_from_root() {
        let tree = tree();
        assert_eq!(tree.get("m").unwrap().depth(), 0);
        assert_eq!(tree.get("m.p.r1.x").unwrap().depth(), 3);
    }

    #[test]
    fn ancestors_are_nearest_first() {
        let tree = tree();
        let x = tree.index_of("m.p.r1.x").unwrap();
        let ids: Vec<&str> = tree
            .ancestors(x)
            .map(|a| tree.node(a).id().as_str())
            .collect();
        assert_eq!(ids, vec!["m.p.r1", "m.p", "m"]);
    }

    #[test]
    fn lcca_skips_parallel_nodes() {
        let tree = tree();
        let x = tree.index_of("m.p.r1.x").unwrap();
        let y = tree.index_of("m.p.r2.y").unwrap();
        assert_eq!(tree.least_common_compound_ancestor(&[x, y]), tree.root());

        let a1 = tree.index_of("m.a.a1").unwrap();
        let a2 = tree.index_of("m.a.a2").unwrap();
        assert_eq!(
            tree.least_common_compound_ancestor(&[a1, a2]),
            tree.index_of("m.a").unwrap()
        );
    }
}
