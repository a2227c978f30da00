//! The microstep engine.
//!
//! A microstep applies one conflict-free set of transitions: it computes
//! which nodes are exited and entered, records history, applies assignment
//! actions to the context and plans every other action for the interpreter.
//! Nothing here performs a side effect; the result describes what should
//! happen and the caller decides whether to commit it.

use super::action::{ActionDescriptor, ActorId, DelaySpec, SendTarget};
use super::configuration::{resolve, Configuration};
use super::error::ExecutionError;
use super::event::Event;
use super::history::HistoryValue;
use super::node::{NodeIndex, NodeKind};
use super::transition::TransitionDef;
use super::tree::StateTree;
use crate::registry::{ActionImpl, Registry};
use serde_json::Value;
use std::cmp::Reverse;
use std::collections::BTreeSet;
use std::time::Duration;

/// An action the interpreter has to execute after a microstep commits.
#[derive(Clone, Debug, PartialEq)]
pub enum PlannedAction {
    /// Registry effect, run with the post-assignment context
    Effect { name: String },
    Send {
        event: Event,
        target: SendTarget,
        delay: Option<Duration>,
        id: Option<String>,
        /// Node whose exit cancels a delayed send
        owner: NodeIndex,
    },
    Cancel { id: String },
    Log { label: String },
    Spawn {
        service: String,
        id: ActorId,
        /// Set for invocations, which live exactly as long as their node
        owner: Option<NodeIndex>,
        auto_forward: bool,
    },
    Stop { id: ActorId },
    /// Cancel every delayed send owned by an exited node
    CancelOwned { owner: NodeIndex },
}

/// Everything a committed microstep changes.
#[derive(Clone, Debug)]
pub struct MicrostepResult<C> {
    pub configuration: Configuration,
    pub context: C,
    pub history: HistoryValue,
    /// Exited nodes, deepest first
    pub exited: Vec<NodeIndex>,
    /// Entered nodes, shallowest first
    pub entered: Vec<NodeIndex>,
    pub exit_actions: Vec<PlannedAction>,
    pub transition_actions: Vec<PlannedAction>,
    pub entry_actions: Vec<PlannedAction>,
    /// `raise` actions and completion events, in planning order
    pub raised_events: Vec<Event>,
    pub done: bool,
    pub done_data: Option<Value>,
}

impl<C> MicrostepResult<C> {
    /// All planned actions in execution order.
    pub fn actions(&self) -> impl Iterator<Item = &PlannedAction> {
        self.exit_actions
            .iter()
            .chain(&self.transition_actions)
            .chain(&self.entry_actions)
    }

    pub fn spawn_requests(&self) -> impl Iterator<Item = &PlannedAction> {
        self.actions()
            .filter(|a| matches!(a, PlannedAction::Spawn { .. }))
    }

    pub fn stop_requests(&self) -> impl Iterator<Item = &PlannedAction> {
        self.actions()
            .filter(|a| matches!(a, PlannedAction::Stop { .. }))
    }
}

/// Node whose descendants a transition exits, `None` when it exits nothing.
pub fn transition_domain(tree: &StateTree, transition: &TransitionDef) -> Option<NodeIndex> {
    if transition.is_targetless() {
        return None;
    }
    let source = transition.source;
    let stays_inside = transition
        .targets
        .iter()
        .all(|&target| tree.is_descendant(target, source));
    if transition.internal && tree.node(source).kind() == NodeKind::Compound && stays_inside {
        return Some(source);
    }
    let mut nodes = Vec::with_capacity(transition.targets.len() + 1);
    nodes.push(source);
    nodes.extend_from_slice(&transition.targets);
    Some(tree.least_common_compound_ancestor(&nodes))
}

/// Active nodes a transition would exit.
pub fn exit_set(
    tree: &StateTree,
    configuration: &Configuration,
    transition: &TransitionDef,
) -> BTreeSet<NodeIndex> {
    match transition_domain(tree, transition) {
        None => BTreeSet::new(),
        Some(domain) => configuration
            .iter()
            .filter(|&n| tree.is_descendant(n, domain))
            .collect(),
    }
}

/// Walks action descriptors, applying assignments and planning the rest.
struct Planner<'a, C> {
    tree: &'a StateTree,
    registry: &'a Registry<C>,
    event: &'a Event,
    context: C,
    raised: Vec<Event>,
}

impl<C> Planner<'_, C> {
    fn plan(
        &mut self,
        descriptors: &[ActionDescriptor],
        owner: NodeIndex,
        out: &mut Vec<PlannedAction>,
    ) -> Result<(), ExecutionError> {
        for descriptor in descriptors {
            match descriptor {
                ActionDescriptor::Named(name) => match self.registry.get_action(name) {
                    Some(ActionImpl::Assign(assign)) => {
                        self.context = assign(&self.context, self.event);
                    }
                    Some(ActionImpl::Effect(_)) => {
                        out.push(PlannedAction::Effect { name: name.clone() });
                    }
                    None => {
                        return Err(ExecutionError::UnknownAction {
                            action: name.clone(),
                        })
                    }
                },
                ActionDescriptor::Raise(event) => self.raised.push(event.clone()),
                ActionDescriptor::Send(send) => {
                    let event = send.event.clone().unwrap_or_else(|| self.event.clone());
                    let delay = match &send.delay {
                        None => None,
                        Some(DelaySpec::Fixed(delay)) => Some(*delay),
                        Some(DelaySpec::Named(name)) => {
                            let compute = self.registry.get_delay(name).ok_or_else(|| {
                                ExecutionError::UnknownDelay {
                                    delay: name.clone(),
                                }
                            })?;
                            Some(compute(&self.context, self.event))
                        }
                    };
                    out.push(PlannedAction::Send {
                        event,
                        target: send.target.clone(),
                        delay,
                        id: send.id.clone(),
                        owner,
                    });
                }
                ActionDescriptor::Cancel(id) => out.push(PlannedAction::Cancel { id: id.clone() }),
                ActionDescriptor::Log(label) => out.push(PlannedAction::Log {
                    label: label.clone(),
                }),
                ActionDescriptor::Spawn { service, id } => out.push(PlannedAction::Spawn {
                    service: service.clone(),
                    id: id.clone(),
                    owner: None,
                    auto_forward: false,
                }),
                ActionDescriptor::Stop(id) => out.push(PlannedAction::Stop { id: id.clone() }),
            }
        }
        Ok(())
    }

    /// Exit actions, invocation stops and timer cancellation for one node.
    fn plan_exit(&mut self, node: NodeIndex, out: &mut Vec<PlannedAction>) -> Result<(), ExecutionError> {
        let state = self.tree.node(node);
        self.plan(state.exit(), self.tree.root(), out)?;
        for invocation in state.invocations() {
            out.push(PlannedAction::Stop {
                id: invocation.id.clone(),
            });
        }
        out.push(PlannedAction::CancelOwned { owner: node });
        Ok(())
    }

    /// Entry actions followed by the node's invocations.
    fn plan_entry(&mut self, node: NodeIndex, out: &mut Vec<PlannedAction>) -> Result<(), ExecutionError> {
        let state = self.tree.node(node);
        self.plan(state.entry(), node, out)?;
        for invocation in state.invocations() {
            out.push(PlannedAction::Spawn {
                service: invocation.service.clone(),
                id: invocation.id.clone(),
                owner: Some(node),
                auto_forward: invocation.auto_forward,
            });
        }
        Ok(())
    }
}

/// Apply `transitions` to the configuration.
///
/// Assignments run against `context` as they are encountered; the returned
/// result carries the updated context and the planned side effects.
pub fn step<C: Clone>(
    tree: &StateTree,
    registry: &Registry<C>,
    configuration: &Configuration,
    context: &C,
    history: &HistoryValue,
    event: &Event,
    transitions: &[&TransitionDef],
) -> Result<MicrostepResult<C>, ExecutionError> {
    let mut exiting = BTreeSet::new();
    for transition in transitions {
        exiting.extend(exit_set(tree, configuration, transition));
    }
    let mut exited: Vec<NodeIndex> = exiting.into_iter().collect();
    exited.sort_by_key(|&n| (Reverse(tree.node(n).depth()), Reverse(n)));

    let history = history.record_exit(tree, configuration, &exited);
    let mut remaining = configuration.clone();
    for &node in &exited {
        remaining.remove(node);
    }

    let mut planner = Planner {
        tree,
        registry,
        event,
        context: context.clone(),
        raised: Vec::new(),
    };

    let mut exit_actions = Vec::new();
    for &node in &exited {
        planner.plan_exit(node, &mut exit_actions)?;
    }

    let mut transition_actions = Vec::new();
    for transition in transitions {
        let owner = transition_domain(tree, transition).unwrap_or(transition.source);
        planner.plan(&transition.actions, owner, &mut transition_actions)?;
    }

    let mut seeds: Vec<NodeIndex> = remaining.iter().collect();
    for transition in transitions {
        seeds.extend_from_slice(&transition.targets);
    }
    let next = if transitions.iter().all(|t| t.is_targetless()) {
        remaining.clone()
    } else {
        resolve(tree, &seeds, &history)
    };

    finish(planner, next, &remaining, history, exited, exit_actions, transition_actions)
}

/// Enter the initial configuration of `tree`.
pub fn enter_initial<C: Clone>(
    tree: &StateTree,
    registry: &Registry<C>,
    context: &C,
    history: &HistoryValue,
    event: &Event,
) -> Result<MicrostepResult<C>, ExecutionError> {
    let planner = Planner {
        tree,
        registry,
        event,
        context: context.clone(),
        raised: Vec::new(),
    };
    let next = resolve(tree, &[tree.root()], history);
    finish(
        planner,
        next,
        &Configuration::new(),
        history.clone(),
        Vec::new(),
        Vec::new(),
        Vec::new(),
    )
}

/// Exit every active node, deepest first.
///
/// Used when an interpreter is stopped. The returned configuration is empty.
pub fn exit_all<C: Clone>(
    tree: &StateTree,
    registry: &Registry<C>,
    configuration: &Configuration,
    context: &C,
    history: &HistoryValue,
    event: &Event,
) -> Result<MicrostepResult<C>, ExecutionError> {
    let mut exited: Vec<NodeIndex> = configuration.iter().collect();
    exited.sort_by_key(|&n| (Reverse(tree.node(n).depth()), Reverse(n)));

    let mut planner = Planner {
        tree,
        registry,
        event,
        context: context.clone(),
        raised: Vec::new(),
    };
    let mut exit_actions = Vec::new();
    for &node in &exited {
        planner.plan_exit(node, &mut exit_actions)?;
    }

    Ok(MicrostepResult {
        configuration: Configuration::new(),
        context: planner.context,
        history: history.clone(),
        exited,
        entered: Vec::new(),
        exit_actions,
        transition_actions: Vec::new(),
        entry_actions: Vec::new(),
        raised_events: Vec::new(),
        done: false,
        done_data: None,
    })
}

/// Actions that bring a restored configuration back to life.
///
/// Entry actions are not replayed. Only the delayed sends declared on entry
/// (which include `after` timers) and the invocations of active nodes are
/// planned again, shallowest node first.
pub fn resume<C: Clone>(
    tree: &StateTree,
    registry: &Registry<C>,
    configuration: &Configuration,
    context: &C,
    event: &Event,
) -> Result<Vec<PlannedAction>, ExecutionError> {
    let mut active: Vec<NodeIndex> = configuration.iter().collect();
    active.sort_by_key(|&n| (tree.node(n).depth(), n));

    let mut planner = Planner {
        tree,
        registry,
        event,
        context: context.clone(),
        raised: Vec::new(),
    };
    let mut out = Vec::new();
    for node in active {
        let state = tree.node(node);
        let timers: Vec<ActionDescriptor> = state
            .entry()
            .iter()
            .filter(|a| matches!(a, ActionDescriptor::Send(send) if send.delay.is_some()))
            .cloned()
            .collect();
        planner.plan(&timers, node, &mut out)?;
        for invocation in state.invocations() {
            out.push(PlannedAction::Spawn {
                service: invocation.service.clone(),
                id: invocation.id.clone(),
                owner: Some(node),
                auto_forward: invocation.auto_forward,
            });
        }
    }
    Ok(out)
}

/// Plan entry for `next` minus `remaining` and compute completion events.
fn finish<C>(
    mut planner: Planner<'_, C>,
    next: Configuration,
    remaining: &Configuration,
    history: HistoryValue,
    exited: Vec<NodeIndex>,
    exit_actions: Vec<PlannedAction>,
    transition_actions: Vec<PlannedAction>,
) -> Result<MicrostepResult<C>, ExecutionError> {
    let tree = planner.tree;
    debug_assert!(next.is_legal(tree), "resolver produced an illegal configuration");

    let mut entered: Vec<NodeIndex> = next.iter().filter(|&n| !remaining.contains(n)).collect();
    entered.sort_by_key(|&n| (tree.node(n).depth(), n));

    let mut entry_actions = Vec::new();
    let mut done = false;
    let mut done_data = None;
    // Parallel nodes completed by this microstep, innermost first. Their
    // events follow every region-level event.
    let mut completed: Vec<NodeIndex> = Vec::new();
    for &node in &entered {
        planner.plan_entry(node, &mut entry_actions)?;

        let state = tree.node(node);
        if !state.is_final() {
            continue;
        }
        let Some(parent) = state.parent() else {
            continue;
        };
        if parent == tree.root() {
            done = true;
            done_data = state.done_data().cloned();
            continue;
        }
        if tree.node(parent).kind() != NodeKind::Compound {
            continue;
        }
        let data = state.done_data().cloned().unwrap_or(Value::Null);
        planner
            .raised
            .push(Event::done_state(tree.node(parent).id().as_str(), data));
        for ancestor in tree.ancestors(parent) {
            if tree.node(ancestor).kind() != NodeKind::Parallel || !tree.is_in_final_state(ancestor, &next) {
                break;
            }
            if !completed.contains(&ancestor) {
                completed.push(ancestor);
            }
        }
    }
    for ancestor in completed {
        if ancestor == tree.root() {
            done = true;
        } else {
            planner
                .raised
                .push(Event::done_state(tree.node(ancestor).id().as_str(), Value::Null));
        }
    }

    Ok(MicrostepResult {
        configuration: next,
        context: planner.context,
        history,
        exited,
        entered,
        exit_actions,
        transition_actions,
        entry_actions,
        raised_events: planner.raised,
        done,
        done_data,
    })
}
