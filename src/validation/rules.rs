//! Structural rules for definition trees.

use super::{all, DefinitionCheck};
use crate::builder::DefinitionProblem;
use crate::core::{NodeIndex, NodeKind, StateNode, StateTree, TransitionDef};
use stillwater::validation::Validation;

/// Check the tree's shape, accumulating every violation.
pub fn check_structure(tree: &StateTree) -> DefinitionCheck {
    let mut checks = Vec::new();
    for node in tree.nodes() {
        checks.push(check_children(tree, node));
        checks.push(check_history(tree, node));
        for transition in node.transitions() {
            checks.push(check_targets(tree, node, transition));
        }
    }
    all(checks)
}

fn check_children(tree: &StateTree, node: &StateNode) -> DefinitionCheck {
    let node_id = || node.id().to_string();
    match node.kind() {
        NodeKind::Final if !node.children().is_empty() => {
            Validation::fail(DefinitionProblem::FinalWithChildren { node: node_id() })
        }
        NodeKind::Final
            if node
                .parent()
                .is_some_and(|parent| tree.node(parent).kind() == NodeKind::Parallel) =>
        {
            Validation::fail(DefinitionProblem::FinalInParallel { node: node_id() })
        }
        NodeKind::History(_) if !node.children().is_empty() => {
            Validation::fail(DefinitionProblem::HistoryWithChildren { node: node_id() })
        }
        NodeKind::Parallel
            if node
                .children()
                .iter()
                .all(|&child| tree.node(child).is_history()) =>
        {
            Validation::fail(DefinitionProblem::EmptyParallel { node: node_id() })
        }
        _ => Validation::success(()),
    }
}

fn check_history(tree: &StateTree, node: &StateNode) -> DefinitionCheck {
    if !node.is_history() {
        return Validation::success(());
    }
    let Some(parent) = node.parent() else {
        return Validation::fail(DefinitionProblem::HistoryAtRoot {
            node: node.id().to_string(),
        });
    };
    let checks = node
        .history_default
        .iter()
        .map(|&target| {
            if tree.is_descendant(target, parent) && !tree.node(target).is_history() {
                Validation::success(())
            } else {
                Validation::fail(DefinitionProblem::InvalidHistoryTarget {
                    node: node.id().to_string(),
                    target: tree.node(target).id().to_string(),
                })
            }
        })
        .collect();
    all(checks)
}

/// Multiple targets must sit in different regions of a parallel state.
fn check_targets(tree: &StateTree, node: &StateNode, transition: &TransitionDef) -> DefinitionCheck {
    let targets = &transition.targets;
    let conflict = targets.iter().enumerate().any(|(i, &a)| {
        targets[i + 1..]
            .iter()
            .any(|&b| !orthogonal(tree, a, b))
    });
    if conflict {
        Validation::fail(DefinitionProblem::ConflictingTargets {
            node: node.id().to_string(),
            event: transition.event.to_string(),
        })
    } else {
        Validation::success(())
    }
}

fn orthogonal(tree: &StateTree, a: NodeIndex, b: NodeIndex) -> bool {
    if a == b || tree.is_descendant(a, b) || tree.is_descendant(b, a) {
        return false;
    }
    tree.ancestors(a)
        .find(|&ancestor| tree.is_descendant(b, ancestor))
        .is_some_and(|common| tree.node(common).kind() == NodeKind::Parallel)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::{StateBuilder, TransitionBuilder};
    use crate::core::HistoryKind;

    #[test]
    fn well_formed_tree_passes() {
        let tree = StateBuilder::new()
            .initial("a")
            .state("a", StateBuilder::new().on("GO", "b"))
            .state("b", StateBuilder::final_state())
            .build("m")
            .unwrap();
        assert!(check_structure(&tree).is_success());
    }

    #[test]
    fn multi_target_into_parallel_regions_is_allowed() {
        let tree = StateBuilder::new()
            .initial("idle")
            .state(
                "idle",
                StateBuilder::new().on("GO", TransitionBuilder::to_all(["#m.p.left.l2", "#m.p.right.r2"])),
            )
            .state(
                "p",
                StateBuilder::parallel()
                    .state("left", StateBuilder::new().initial("l1").state("l1", StateBuilder::new()).state("l2", StateBuilder::new()))
                    .state("right", StateBuilder::new().initial("r1").state("r1", StateBuilder::new()).state("r2", StateBuilder::new())),
            )
            .build("m")
            .unwrap();
        assert!(check_structure(&tree).is_success());
    }

    #[test]
    fn multi_target_into_one_region_conflicts() {
        let result = StateBuilder::new()
            .initial("a")
            .state("a", StateBuilder::new().on("GO", TransitionBuilder::to_all(["b", "c"])))
            .state("b", StateBuilder::new())
            .state("c", StateBuilder::new())
            .build("m");

        assert_eq!(
            result.unwrap_err().problems(),
            &[DefinitionProblem::ConflictingTargets {
                node: "m.a".into(),
                event: "GO".into(),
            }]
        );
    }

    #[test]
    fn history_default_must_stay_inside_parent() {
        let result = StateBuilder::new()
            .initial("p")
            .state(
                "p",
                StateBuilder::new()
                    .initial("x")
                    .state("h", StateBuilder::history(HistoryKind::Deep).target("#m.q"))
                    .state("x", StateBuilder::new()),
            )
            .state("q", StateBuilder::new())
            .build("m");

        assert_eq!(
            result.unwrap_err().problems(),
            &[DefinitionProblem::InvalidHistoryTarget {
                node: "m.p.h".into(),
                target: "m.q".into(),
            }]
        );
    }

    #[test]
    fn final_region_of_parallel_is_rejected() {
        let result = StateBuilder::new()
            .initial("p")
            .state(
                "p",
                StateBuilder::parallel()
                    .state("f", StateBuilder::final_state())
                    .state("b", StateBuilder::new().initial("b1").state("b1", StateBuilder::new())),
            )
            .build("m");
        assert_eq!(
            result.unwrap_err().problems(),
            &[DefinitionProblem::FinalInParallel { node: "m.p.f".into() }]
        );
    }

    #[test]
    fn empty_parallel_is_rejected() {
        let result = StateBuilder::new()
            .initial("p")
            .state("p", StateBuilder::parallel())
            .build("m");
        assert_eq!(
            result.unwrap_err().problems(),
            &[DefinitionProblem::EmptyParallel { node: "m.p".into() }]
        );
    }
}
