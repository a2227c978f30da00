//! Active configurations and the configuration resolver.

use super::history::HistoryValue;
use super::node::{NodeId, NodeIndex, NodeKind};
use super::tree::StateTree;
use std::collections::BTreeSet;
use thiserror::Error;

/// The set of active nodes, ordered by document order.
///
/// A legal configuration contains the root, the parent of every member,
/// exactly one child of every active compound node, every region of every
/// active parallel node, and no history nodes.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Configuration {
    nodes: BTreeSet<NodeIndex>,
}

impl Configuration {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, node: NodeIndex) -> bool {
        self.nodes.contains(&node)
    }

    /// Members in document order.
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = NodeIndex> + '_ {
        self.nodes.iter().copied()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Active atomic and final nodes in document order.
    pub fn leaves<'a>(&'a self, tree: &'a StateTree) -> impl Iterator<Item = NodeIndex> + 'a {
        self.iter().filter(move |&n| tree.node(n).is_leaf())
    }

    pub fn ids(&self, tree: &StateTree) -> Vec<NodeId> {
        self.iter().map(|n| tree.node(n).id().clone()).collect()
    }

    pub(crate) fn remove(&mut self, node: NodeIndex) -> bool {
        self.nodes.remove(&node)
    }

    /// Check the configuration invariant against `tree`.
    pub fn is_legal(&self, tree: &StateTree) -> bool {
        if self.is_empty() || !self.contains(tree.root()) {
            return false;
        }
        self.iter().all(|n| {
            let node = tree.node(n);
            let parent_active = node.parent().is_none_or(|p| self.contains(p));
            let regions = node.children().iter().filter(|&&c| !tree.node(c).is_history());
            let children_ok = match node.kind() {
                NodeKind::Compound => regions.filter(|&&c| self.contains(c)).count() == 1,
                NodeKind::Parallel => regions.clone().all(|&c| self.contains(c)),
                NodeKind::Atomic | NodeKind::Final => true,
                NodeKind::History(_) => false,
            };
            parent_active && children_ok
        })
    }
}

impl FromIterator<NodeIndex> for Configuration {
    fn from_iter<I: IntoIterator<Item = NodeIndex>>(iter: I) -> Self {
        Self {
            nodes: iter.into_iter().collect(),
        }
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("unknown state node '{0}'")]
pub struct UnknownNode(pub String);

/// Compute the full legal configuration reached by activating `seeds`.
///
/// History nodes among the seeds are replaced by their recorded value, or
/// their default target, or their parent's initial child. Ancestors are
/// added, then every compound node without an active child enters its
/// `initial` and every parallel node enters all its regions. Resolving an
/// already-resolved configuration returns it unchanged.
///
/// # Example
///
/// ```rust
/// use harel::builder::StateBuilder;
/// use harel::core::{resolve, HistoryValue};
///
/// let tree = StateBuilder::new()
///     .initial("idle")
///     .state("idle", StateBuilder::new())
///     .state(
///         "busy",
///         StateBuilder::new()
///             .initial("loading")
///             .state("loading", StateBuilder::new())
///             .state("saving", StateBuilder::new()),
///     )
///     .build("job")
///     .unwrap();
///
/// let busy = tree.index_of("job.busy").unwrap();
/// let configuration = resolve(&tree, &[busy], &HistoryValue::new());
/// let ids: Vec<String> = configuration.ids(&tree).into_iter().map(|id| id.0).collect();
/// assert_eq!(ids, vec!["job", "job.busy", "job.busy.loading"]);
/// ```
pub fn resolve(tree: &StateTree, seeds: &[NodeIndex], history: &HistoryValue) -> Configuration {
    let mut targets = Vec::new();
    for &seed in seeds {
        push_entry_target(tree, seed, history, &mut targets);
    }

    let mut active = BTreeSet::new();
    for target in targets {
        active.insert(target);
        active.extend(tree.ancestors(target));
    }

    let mut pending: Vec<NodeIndex> = active.iter().copied().collect();
    while let Some(current) = pending.pop() {
        let node = tree.node(current);
        match node.kind() {
            NodeKind::Compound => {
                if node.children().iter().any(|c| active.contains(c)) {
                    continue;
                }
                let mut chosen = Vec::new();
                if let Some(initial) = node.initial() {
                    push_entry_target(tree, initial, history, &mut chosen);
                }
                for leaf in chosen {
                    let path = std::iter::once(leaf)
                        .chain(tree.ancestors(leaf).take_while(|&a| a != current));
                    for n in path {
                        if active.insert(n) {
                            pending.push(n);
                        }
                    }
                }
            }
            NodeKind::Parallel => {
                for &child in node.children() {
                    if !tree.node(child).is_history() && active.insert(child) {
                        pending.push(child);
                    }
                }
            }
            NodeKind::Atomic | NodeKind::Final | NodeKind::History(_) => {}
        }
    }

    Configuration { nodes: active }
}

/// Push the concrete nodes entered when `node` is targeted.
fn push_entry_target(
    tree: &StateTree,
    node: NodeIndex,
    history: &HistoryValue,
    out: &mut Vec<NodeIndex>,
) {
    let state = tree.node(node);
    if !state.is_history() {
        out.push(node);
        return;
    }

    if let Some(recorded) = history.get(node) {
        out.extend(recorded.iter().copied());
    } else if !state.history_default.is_empty() {
        for &target in &state.history_default {
            push_entry_target(tree, target, history, out);
        }
    } else if let Some(parent) = state.parent() {
        // Initial children are never history nodes, so this terminates.
        match tree.node(parent).initial() {
            Some(initial) => out.push(initial),
            None => out.push(parent),
        }
    }
}

impl StateTree {
    /// Resolve a configuration from node ids.
    pub fn resolve_ids<I, S>(&self, ids: I, history: &HistoryValue) -> Result<Configuration, UnknownNode>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let seeds = ids
            .into_iter()
            .map(|id| {
                self.index_of(id.as_ref())
                    .ok_or_else(|| UnknownNode(id.as_ref().to_string()))
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(resolve(self, &seeds, history))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::StateBuilder;
    use crate::core::node::HistoryKind;

    fn tree() -> StateTree {
        StateBuilder::new()
            .initial("off")
            .state("off", StateBuilder::new())
            .state(
                "on",
                StateBuilder::parallel()
                    .state(
                        "network",
                        StateBuilder::new()
                            .initial("offline")
                            .state("offline", StateBuilder::new())
                            .state("online", StateBuilder::new()),
                    )
                    .state(
                        "ui",
                        StateBuilder::new()
                            .initial("hidden")
                            .state("hist", StateBuilder::history(HistoryKind::Shallow))
                            .state("hidden", StateBuilder::new())
                            .state("shown", StateBuilder::new()),
                    ),
            )
            .build("app")
            .unwrap()
    }

    fn ids(tree: &StateTree, configuration: &Configuration) -> Vec<String> {
        configuration.ids(tree).into_iter().map(|id| id.0).collect()
    }

    #[test]
    fn resolving_root_enters_initial_path() {
        let tree = tree();
        let configuration = resolve(&tree, &[tree.root()], &HistoryValue::new());
        assert_eq!(ids(&tree, &configuration), vec!["app", "app.off"]);
        assert!(configuration.is_legal(&tree));
    }

    #[test]
    fn parallel_target_enters_every_region() {
        let tree = tree();
        let configuration = tree.resolve_ids(["app.on"], &HistoryValue::new()).unwrap();
        assert_eq!(
            ids(&tree, &configuration),
            vec!["app", "app.on", "app.on.network", "app.on.network.offline", "app.on.ui", "app.on.ui.hidden"]
        );
        assert!(configuration.is_legal(&tree));
    }

    #[test]
    fn explicit_descendant_wins_over_initial() {
        let tree = tree();
        let configuration = tree
            .resolve_ids(["app.on.network.online"], &HistoryValue::new())
            .unwrap();
        assert!(configuration.contains(tree.index_of("app.on.network.online").unwrap()));
        assert!(!configuration.contains(tree.index_of("app.on.network.offline").unwrap()));
        assert!(configuration.contains(tree.index_of("app.on.ui.hidden").unwrap()));
    }

    #[test]
    fn history_without_record_falls_back_to_initial() {
        let tree = tree();
        let configuration = tree
            .resolve_ids(["app.on.ui.hist"], &HistoryValue::new())
            .unwrap();
        assert!(configuration.contains(tree.index_of("app.on.ui.hidden").unwrap()));
        assert!(!configuration.contains(tree.index_of("app.on.ui.hist").unwrap()));
    }

    #[test]
    fn history_with_record_restores_it() {
        let tree = tree();
        let hist = tree.index_of("app.on.ui.hist").unwrap();
        let shown = tree.index_of("app.on.ui.shown").unwrap();
        let mut history = HistoryValue::new();
        history.insert(hist, [shown].into_iter().collect());

        let configuration = resolve(&tree, &[hist], &history);
        assert!(configuration.contains(shown));
        assert!(configuration.is_legal(&tree));
    }

    #[test]
    fn resolution_is_a_fixpoint() {
        let tree = tree();
        let once = tree
            .resolve_ids(["app.on.network.online"], &HistoryValue::new())
            .unwrap();
        let seeds: Vec<NodeIndex> = once.iter().collect();
        let twice = resolve(&tree, &seeds, &HistoryValue::new());
        assert_eq!(once, twice);
    }

    #[test]
    fn unknown_ids_are_reported() {
        let tree = tree();
        let err = tree.resolve_ids(["app.nowhere"], &HistoryValue::new()).unwrap_err();
        assert_eq!(err, UnknownNode("app.nowhere".to_string()));
    }

    #[test]
    fn conflicting_siblings_are_illegal() {
        let tree = tree();
        let configuration = tree
            .resolve_ids(["app.off", "app.on"], &HistoryValue::new())
            .unwrap();
        assert!(!configuration.is_legal(&tree));
    }
}
