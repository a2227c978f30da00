//! Checks that every name used by a tree is registered.

use super::{all, DefinitionCheck};
use crate::builder::DefinitionProblem;
use crate::core::{ActionDescriptor, DelaySpec, GuardDescriptor, StateNode, StateTree};
use crate::registry::Registry;
use stillwater::validation::Validation;

/// Check guard, action, service and delay names against `registry`.
pub fn check_references<C>(tree: &StateTree, registry: &Registry<C>) -> DefinitionCheck {
    let mut checks = Vec::new();
    for node in tree.nodes() {
        let actions = node
            .entry()
            .iter()
            .chain(node.exit())
            .chain(node.transitions().iter().flat_map(|t| t.actions.iter()));
        for action in actions {
            checks.push(check_action(node, registry, action));
        }
        for transition in node.transitions() {
            if let Some(GuardDescriptor::Named(guard)) = &transition.guard {
                checks.push(if registry.has_guard(guard) {
                    Validation::success(())
                } else {
                    Validation::fail(DefinitionProblem::UnknownGuard {
                        node: node.id().to_string(),
                        guard: guard.clone(),
                    })
                });
            }
        }
        for invocation in node.invocations() {
            checks.push(check_service(node, registry, &invocation.service));
        }
    }
    all(checks)
}

fn check_action<C>(node: &StateNode, registry: &Registry<C>, action: &ActionDescriptor) -> DefinitionCheck {
    match action {
        ActionDescriptor::Named(name) if !registry.has_action(name) => {
            Validation::fail(DefinitionProblem::UnknownAction {
                node: node.id().to_string(),
                action: name.clone(),
            })
        }
        ActionDescriptor::Send(send) => match &send.delay {
            Some(DelaySpec::Named(delay)) if !registry.has_delay(delay) => {
                Validation::fail(DefinitionProblem::UnknownDelay {
                    node: node.id().to_string(),
                    delay: delay.clone(),
                })
            }
            _ => Validation::success(()),
        },
        ActionDescriptor::Spawn { service, .. } => check_service(node, registry, service),
        _ => Validation::success(()),
    }
}

fn check_service<C>(node: &StateNode, registry: &Registry<C>, service: &str) -> DefinitionCheck {
    if registry.has_service(service) {
        Validation::success(())
    } else {
        Validation::fail(DefinitionProblem::UnknownService {
            node: node.id().to_string(),
            service: service.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::{InvokeBuilder, StateBuilder, TransitionBuilder};
    use crate::core::{ActionDescriptor, Event};
    use std::time::Duration;

    fn problems(check: DefinitionCheck) -> Vec<DefinitionProblem> {
        match check {
            Validation::Success(_) => Vec::new(),
            Validation::Failure(errors) => errors.iter().cloned().collect(),
        }
    }

    fn tree() -> StateTree {
        StateBuilder::new()
            .initial("a")
            .state(
                "a",
                StateBuilder::new()
                    .entry("track")
                    .entry(ActionDescriptor::send("PING").delay_named("backoff"))
                    .invoke(InvokeBuilder::new("worker"))
                    .on("GO", TransitionBuilder::to("b").guard("ready")),
            )
            .state("b", StateBuilder::new().after_named("slow", "a"))
            .build("m")
            .unwrap()
    }

    #[test]
    fn missing_names_are_all_reported() {
        let found = problems(check_references(&tree(), &Registry::<()>::new()));
        assert_eq!(
            found,
            vec![
                DefinitionProblem::UnknownAction { node: "m.a".into(), action: "track".into() },
                DefinitionProblem::UnknownDelay { node: "m.a".into(), delay: "backoff".into() },
                DefinitionProblem::UnknownGuard { node: "m.a".into(), guard: "ready".into() },
                DefinitionProblem::UnknownService { node: "m.a".into(), service: "worker".into() },
                DefinitionProblem::UnknownDelay { node: "m.b".into(), delay: "slow".into() },
            ]
        );
    }

    #[test]
    fn complete_registry_passes() {
        let registry = Registry::<()>::new()
            .action("track", |_| Ok(()))
            .delay("backoff", |_: &(), _: &Event| Duration::from_millis(10))
            .delay("slow", |_: &(), _: &Event| Duration::from_secs(1))
            .guard("ready", |_: &(), _: &Event| true)
            .service("worker", crate::interpreter::callback(|_, _| Ok(crate::interpreter::CallbackHandle::default())));
        assert!(check_references(&tree(), &registry).is_success());
    }
}
