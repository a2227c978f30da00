//! Transition selection.
//!
//! For every active leaf the selector walks the leaf and its ancestors,
//! deepest first, and picks the first transition in document order whose
//! guard passes. Ancestors of a node that already selected a transition are
//! never examined. The resulting set is then filtered so that no two
//! transitions exit the same node.

use super::configuration::Configuration;
use super::error::ExecutionError;
use super::event::Event;
use super::microstep::exit_set;
use super::node::{NodeIndex, StateNode};
use super::transition::{GuardDescriptor, TransitionDef};
use super::tree::StateTree;
use crate::config::GuardErrorPolicy;
use crate::core::GuardError;
use crate::registry::Registry;
use std::collections::BTreeSet;

/// Outcome of one selection pass.
#[derive(Debug, Default)]
pub struct Selection<'t> {
    /// Enabled, conflict-free transitions in selection order
    pub transitions: Vec<&'t TransitionDef>,
    /// Guard failures that were treated as "not enabled"
    pub guard_errors: Vec<ExecutionError>,
}

impl Selection<'_> {
    pub fn is_empty(&self) -> bool {
        self.transitions.is_empty()
    }
}

/// Select the transitions enabled by `event`.
///
/// With `eventless` set only "always" transitions are considered; the event
/// is then the one that started the macrostep and is visible to guards.
pub fn select_transitions<'t, C>(
    tree: &'t StateTree,
    registry: &Registry<C>,
    policy: GuardErrorPolicy,
    configuration: &Configuration,
    context: &C,
    event: &Event,
    eventless: bool,
) -> Result<Selection<'t>, ExecutionError> {
    let mut enabled: Vec<&'t TransitionDef> = Vec::new();
    let mut guard_errors = Vec::new();

    for leaf in configuration.leaves(tree) {
        let path = std::iter::once(leaf).chain(tree.ancestors(leaf));
        'walk: for node in path {
            for transition in candidates(tree.node(node), event, eventless) {
                let passed = match evaluate_guard(registry, configuration, transition, context, event) {
                    Ok(passed) => passed,
                    Err(err) => match policy {
                        GuardErrorPolicy::Propagate => return Err(err),
                        GuardErrorPolicy::TreatAsFalse => {
                            tracing::warn!("{err}; treating guard as failed");
                            guard_errors.push(err);
                            false
                        }
                    },
                };
                if passed {
                    if !enabled.iter().any(|t| std::ptr::eq(*t, transition)) {
                        enabled.push(transition);
                    }
                    break 'walk;
                }
            }
        }
    }

    Ok(Selection {
        transitions: remove_conflicts(tree, configuration, enabled),
        guard_errors,
    })
}

/// Candidates of one node: exact names first, then wildcards, each group in
/// document order.
fn candidates<'t: 'e, 'e>(
    node: &'t StateNode,
    event: &'e Event,
    eventless: bool,
) -> Box<dyn Iterator<Item = &'t TransitionDef> + 'e> {
    let transitions = node.transitions();
    if eventless {
        return Box::new(transitions.iter().filter(|t| t.event.is_eventless()));
    }
    let exact = transitions.iter().filter(move |t| t.event.is_exact(&event.name));
    let wildcard = transitions
        .iter()
        .filter(move |t| t.event.is_wildcard_match(&event.name));
    Box::new(exact.chain(wildcard))
}

fn evaluate_guard<C>(
    registry: &Registry<C>,
    configuration: &Configuration,
    transition: &TransitionDef,
    context: &C,
    event: &Event,
) -> Result<bool, ExecutionError> {
    match &transition.guard {
        None => Ok(true),
        Some(GuardDescriptor::InState(node)) => Ok(configuration.contains(*node)),
        Some(GuardDescriptor::Named(name)) => {
            let result = match registry.get_guard(name) {
                Some(guard) => guard.check(context, event),
                None => Err(GuardError::new("guard is not registered")),
            };
            result.map_err(|source| ExecutionError::Guard {
                guard: name.clone(),
                event: event.name.clone(),
                source,
            })
        }
    }
}

/// Drop transitions whose exit sets intersect an earlier selection, unless
/// the later one originates from a descendant and preempts it.
fn remove_conflicts<'t>(
    tree: &StateTree,
    configuration: &Configuration,
    enabled: Vec<&'t TransitionDef>,
) -> Vec<&'t TransitionDef> {
    let mut filtered: Vec<(&'t TransitionDef, BTreeSet<NodeIndex>)> = Vec::new();
    for candidate in enabled {
        let exits = exit_set(tree, configuration, candidate);
        let mut preempted = false;
        let mut displaced = Vec::new();
        for (position, (selected, selected_exits)) in filtered.iter().enumerate() {
            if exits.is_disjoint(selected_exits) {
                continue;
            }
            if tree.is_descendant(candidate.source, selected.source) {
                displaced.push(position);
            } else {
                preempted = true;
                break;
            }
        }
        if !preempted {
            for position in displaced.into_iter().rev() {
                filtered.remove(position);
            }
            filtered.push((candidate, exits));
        }
    }
    filtered.into_iter().map(|(t, _)| t).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::{StateBuilder, TransitionBuilder};
    use crate::core::{resolve, HistoryValue};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[derive(Clone, Debug, Default)]
    struct Ctx {
        allowed: bool,
    }

    fn configuration(tree: &StateTree, ids: &[&str]) -> Configuration {
        let seeds: Vec<NodeIndex> = ids.iter().map(|id| tree.index_of(id).unwrap()).collect();
        resolve(tree, &seeds, &HistoryValue::new())
    }

    fn targets(tree: &StateTree, selection: &Selection<'_>) -> Vec<String> {
        selection
            .transitions
            .iter()
            .flat_map(|t| t.targets.iter().map(|&n| tree.node(n).id().to_string()))
            .collect()
    }

    #[test]
    fn descendant_transition_shadows_ancestor_and_skips_its_guard() {
        let evaluated = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&evaluated);
        let registry = Registry::<Ctx>::new().guard("outer", move |_: &Ctx, _: &Event| {
            counter.fetch_add(1, Ordering::SeqCst);
            true
        });
        let tree = StateBuilder::new()
            .initial("parent")
            .state(
                "parent",
                StateBuilder::new()
                    .initial("child")
                    .on("GO", TransitionBuilder::to("elsewhere").guard("outer"))
                    .state("child", StateBuilder::new().on("GO", "sibling"))
                    .state("sibling", StateBuilder::new()),
            )
            .state("elsewhere", StateBuilder::new())
            .build("m")
            .unwrap();
        let config = configuration(&tree, &["m.parent.child"]);

        let selection = select_transitions(
            &tree,
            &registry,
            GuardErrorPolicy::TreatAsFalse,
            &config,
            &Ctx::default(),
            &Event::new("GO"),
            false,
        )
        .unwrap();

        assert_eq!(targets(&tree, &selection), vec!["m.parent.sibling"]);
        assert_eq!(evaluated.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn first_passing_candidate_in_document_order_wins() {
        let registry = Registry::<Ctx>::new().guard("allowed", |c: &Ctx, _: &Event| c.allowed);
        let tree = StateBuilder::new()
            .initial("a")
            .state(
                "a",
                StateBuilder::new()
                    .on("GO", TransitionBuilder::to("b").guard("allowed"))
                    .on("GO", "c"),
            )
            .state("b", StateBuilder::new())
            .state("c", StateBuilder::new())
            .build("m")
            .unwrap();
        let config = configuration(&tree, &["m.a"]);
        let go = Event::new("GO");

        let blocked = select_transitions(&tree, &registry, GuardErrorPolicy::TreatAsFalse, &config, &Ctx { allowed: false }, &go, false).unwrap();
        assert_eq!(targets(&tree, &blocked), vec!["m.c"]);

        let open = select_transitions(&tree, &registry, GuardErrorPolicy::TreatAsFalse, &config, &Ctx { allowed: true }, &go, false).unwrap();
        assert_eq!(targets(&tree, &open), vec!["m.b"]);
    }

    #[test]
    fn exact_names_beat_wildcards() {
        let registry = Registry::<Ctx>::new();
        let tree = StateBuilder::new()
            .initial("a")
            .state("a", StateBuilder::new().on("*", "wild").on("GO", "exact"))
            .state("wild", StateBuilder::new())
            .state("exact", StateBuilder::new())
            .build("m")
            .unwrap();
        let config = configuration(&tree, &["m.a"]);

        let go = select_transitions(&tree, &registry, GuardErrorPolicy::TreatAsFalse, &config, &Ctx::default(), &Event::new("GO"), false).unwrap();
        assert_eq!(targets(&tree, &go), vec!["m.exact"]);

        let other = select_transitions(&tree, &registry, GuardErrorPolicy::TreatAsFalse, &config, &Ctx::default(), &Event::new("OTHER"), false).unwrap();
        assert_eq!(targets(&tree, &other), vec!["m.wild"]);
    }

    #[test]
    fn parallel_regions_fire_together() {
        let registry = Registry::<Ctx>::new();
        let tree = StateBuilder::parallel()
            .state("left", StateBuilder::new().initial("l1").state("l1", StateBuilder::new().on("FLIP", "l2")).state("l2", StateBuilder::new()))
            .state("right", StateBuilder::new().initial("r1").state("r1", StateBuilder::new().on("FLIP", "r2")).state("r2", StateBuilder::new()))
            .build("m")
            .unwrap();
        let config = configuration(&tree, &["m"]);

        let selection = select_transitions(&tree, &registry, GuardErrorPolicy::TreatAsFalse, &config, &Ctx::default(), &Event::new("FLIP"), false).unwrap();
        assert_eq!(targets(&tree, &selection), vec!["m.left.l2", "m.right.r2"]);
    }

    #[test]
    fn conflicting_region_transitions_keep_the_first() {
        let registry = Registry::<Ctx>::new();
        let tree = StateBuilder::new()
            .initial("p")
            .state(
                "p",
                StateBuilder::parallel()
                    .state("left", StateBuilder::new().initial("l1").state("l1", StateBuilder::new().on("QUIT", "#m.done")))
                    .state("right", StateBuilder::new().initial("r1").state("r1", StateBuilder::new().on("QUIT", "#m.other"))),
            )
            .state("done", StateBuilder::new())
            .state("other", StateBuilder::new())
            .build("m")
            .unwrap();
        let config = configuration(&tree, &["m.p"]);

        let selection = select_transitions(&tree, &registry, GuardErrorPolicy::TreatAsFalse, &config, &Ctx::default(), &Event::new("QUIT"), false).unwrap();
        assert_eq!(targets(&tree, &selection), vec!["m.done"]);
    }

    #[test]
    fn failing_guard_is_treated_as_false_or_propagated() {
        let registry = Registry::<Ctx>::new()
            .fallible_guard("broken", |_: &Ctx, _: &Event| Err(GuardError::new("boom")));
        let tree = StateBuilder::new()
            .initial("a")
            .state("a", StateBuilder::new().on("GO", TransitionBuilder::to("b").guard("broken")))
            .state("b", StateBuilder::new())
            .build("m")
            .unwrap();
        let config = configuration(&tree, &["m.a"]);
        let go = Event::new("GO");

        let selection = select_transitions(&tree, &registry, GuardErrorPolicy::TreatAsFalse, &config, &Ctx::default(), &go, false).unwrap();
        assert!(selection.is_empty());
        assert_eq!(selection.guard_errors.len(), 1);

        let err = select_transitions(&tree, &registry, GuardErrorPolicy::Propagate, &config, &Ctx::default(), &go, false).unwrap_err();
        assert!(matches!(err, ExecutionError::Guard { .. }));
    }

    #[test]
    fn eventless_pass_ignores_named_transitions() {
        let registry = Registry::<Ctx>::new();
        let tree = StateBuilder::new()
            .initial("a")
            .state("a", StateBuilder::new().on("GO", "b").always("c"))
            .state("b", StateBuilder::new())
            .state("c", StateBuilder::new())
            .build("m")
            .unwrap();
        let config = configuration(&tree, &["m.a"]);

        let selection = select_transitions(&tree, &registry, GuardErrorPolicy::TreatAsFalse, &config, &Ctx::default(), &Event::new("GO"), true).unwrap();
        assert_eq!(targets(&tree, &selection), vec!["m.c"]);
    }
}
