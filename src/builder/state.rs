//! Builder for state nodes and the lowering into a [`StateTree`].

use super::error::{DefinitionError, DefinitionProblem};
use super::invoke::InvokeBuilder;
use super::transition::{GuardSpec, TransitionBuilder};
use crate::core::{
    ActionDescriptor, ActorId, DelaySpec, Event, EventDescriptor, GuardDescriptor, HistoryKind,
    InvokeDef, NodeId, NodeIndex, NodeKind, SendAction, StateNode, StateTree, TransitionDef,
};
use crate::validation;
use serde_json::Value;
use std::collections::HashMap;
use std::time::Duration;
use stillwater::validation::Validation;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
enum Shape {
    /// Atomic without children, compound with them
    #[default]
    Auto,
    Parallel,
    Final,
    History(HistoryKind),
}

#[derive(Clone, Debug, PartialEq)]
enum On {
    Event(String),
    Always,
    After(DelaySpec),
    Done,
}

/// Fluent builder for a state and its subtree.
///
/// Children are kept in declaration order, which is the document order used
/// for every tie-break at runtime.
///
/// # Example
///
/// ```rust
/// use harel::builder::StateBuilder;
/// use harel::core::NodeKind;
/// use std::time::Duration;
///
/// let tree = StateBuilder::new()
///     .initial("green")
///     .state("green", StateBuilder::new().after(Duration::from_secs(30), "yellow"))
///     .state("yellow", StateBuilder::new().after(Duration::from_secs(5), "red"))
///     .state(
///         "red",
///         StateBuilder::new()
///             .initial("walk")
///             .on("TIMER", "green")
///             .state("walk", StateBuilder::new().on("COUNTDOWN", "wait"))
///             .state("wait", StateBuilder::new()),
///     )
///     .build("light")
///     .unwrap();
///
/// assert_eq!(tree.get("light.red").unwrap().kind(), NodeKind::Compound);
/// assert_eq!(tree.get("light.red.walk").unwrap().kind(), NodeKind::Atomic);
/// ```
#[derive(Clone, Debug, Default, PartialEq)]
pub struct StateBuilder {
    shape: Shape,
    id: Option<String>,
    initial: Option<String>,
    children: Vec<(String, StateBuilder)>,
    transitions: Vec<(On, TransitionBuilder)>,
    entry: Vec<ActionDescriptor>,
    exit: Vec<ActionDescriptor>,
    invoke: Vec<InvokeBuilder>,
    history_target: Vec<String>,
    data: Option<Value>,
    tags: Vec<String>,
}

impl StateBuilder {
    /// An atomic state, or a compound one once children are added.
    pub fn new() -> Self {
        Self::default()
    }

    /// A state whose children are all active at once.
    pub fn parallel() -> Self {
        Self {
            shape: Shape::Parallel,
            ..Self::default()
        }
    }

    pub fn final_state() -> Self {
        Self {
            shape: Shape::Final,
            ..Self::default()
        }
    }

    pub fn history(kind: HistoryKind) -> Self {
        Self {
            shape: Shape::History(kind),
            ..Self::default()
        }
    }

    /// Override the default `machine.path.to.state` id.
    pub fn id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Key of the child entered by default.
    pub fn initial(mut self, key: impl Into<String>) -> Self {
        self.initial = Some(key.into());
        self
    }

    pub fn state(mut self, key: impl Into<String>, child: StateBuilder) -> Self {
        self.children.push((key.into(), child));
        self
    }

    /// Add a transition for `event` (`"*"` and `"prefix.*"` are wildcards).
    pub fn on(mut self, event: impl Into<String>, transition: impl Into<TransitionBuilder>) -> Self {
        self.transitions
            .push((On::Event(event.into()), transition.into()));
        self
    }

    /// Add an eventless transition.
    pub fn always(mut self, transition: impl Into<TransitionBuilder>) -> Self {
        self.transitions.push((On::Always, transition.into()));
        self
    }

    /// Add a transition taken once `delay` has elapsed in this state.
    pub fn after(mut self, delay: Duration, transition: impl Into<TransitionBuilder>) -> Self {
        self.transitions
            .push((On::After(DelaySpec::Fixed(delay)), transition.into()));
        self
    }

    /// Like [`after`](Self::after), with the delay computed by a registry delay.
    pub fn after_named(mut self, delay: impl Into<String>, transition: impl Into<TransitionBuilder>) -> Self {
        self.transitions
            .push((On::After(DelaySpec::Named(delay.into())), transition.into()));
        self
    }

    /// Add a transition taken when this state completes.
    pub fn on_done(mut self, transition: impl Into<TransitionBuilder>) -> Self {
        self.transitions.push((On::Done, transition.into()));
        self
    }

    pub fn entry(mut self, action: impl Into<ActionDescriptor>) -> Self {
        self.entry.push(action.into());
        self
    }

    pub fn exit(mut self, action: impl Into<ActionDescriptor>) -> Self {
        self.exit.push(action.into());
        self
    }

    pub fn invoke(mut self, invoke: InvokeBuilder) -> Self {
        self.invoke.push(invoke);
        self
    }

    /// Default target of a history state, used until history is recorded.
    pub fn target(mut self, target: impl Into<String>) -> Self {
        self.history_target.push(target.into());
        self
    }

    /// Done data of a final state.
    pub fn data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }

    pub fn tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.push(tag.into());
        self
    }

    /// Resolve every reference and build the immutable tree.
    ///
    /// Returns every problem found, not just the first one.
    pub fn build(self, machine_id: impl Into<String>) -> Result<StateTree, DefinitionError> {
        let machine_id = machine_id.into();
        let mut flat = Vec::new();
        flatten(&self, String::new(), machine_id.clone(), None, 0, &mut flat);

        let mut lowering = Lowering {
            by_id: HashMap::new(),
            problems: Vec::new(),
            flat,
        };
        for (index, node) in lowering.flat.iter().enumerate() {
            if lowering.by_id.insert(node.id.clone(), index).is_some() {
                lowering.problems.push(DefinitionProblem::DuplicateId {
                    id: node.id.clone(),
                });
            }
        }
        // First declaration wins for lookups
        for (index, node) in lowering.flat.iter().enumerate().rev() {
            lowering.by_id.insert(node.id.clone(), index);
        }

        let nodes: Vec<StateNode> = (0..lowering.flat.len())
            .map(|index| lowering.lower(index))
            .collect();
        let tree = StateTree::new(machine_id, nodes);

        let mut checks: Vec<validation::DefinitionCheck> = lowering
            .problems
            .into_iter()
            .map(Validation::fail)
            .collect();
        checks.push(validation::check_structure(&tree));
        validation::into_result(validation::all(checks))?;
        Ok(tree)
    }
}

/// A builder node with its position in the pre-order walk.
struct Flat<'a> {
    builder: &'a StateBuilder,
    key: String,
    id: String,
    parent: Option<usize>,
    depth: usize,
    children: Vec<usize>,
}

fn flatten<'a>(
    builder: &'a StateBuilder,
    key: String,
    path: String,
    parent: Option<usize>,
    depth: usize,
    out: &mut Vec<Flat<'a>>,
) -> usize {
    let index = out.len();
    out.push(Flat {
        builder,
        key,
        id: builder.id.clone().unwrap_or_else(|| path.clone()),
        parent,
        depth,
        children: Vec::new(),
    });
    for (child_key, child) in &builder.children {
        let child_index = flatten(
            child,
            child_key.clone(),
            format!("{path}.{child_key}"),
            Some(index),
            depth + 1,
            out,
        );
        out[index].children.push(child_index);
    }
    index
}

struct Lowering<'a> {
    flat: Vec<Flat<'a>>,
    by_id: HashMap<String, usize>,
    problems: Vec<DefinitionProblem>,
}

impl Lowering<'_> {
    fn kind(&self, index: usize) -> NodeKind {
        let node = &self.flat[index];
        match node.builder.shape {
            Shape::Auto if node.children.is_empty() => NodeKind::Atomic,
            Shape::Auto => NodeKind::Compound,
            Shape::Parallel => NodeKind::Parallel,
            Shape::Final => NodeKind::Final,
            Shape::History(kind) => NodeKind::History(kind),
        }
    }

    fn descend(&self, from: usize, path: &str) -> Option<usize> {
        path.split('.').try_fold(from, |current, segment| {
            self.flat[current]
                .children
                .iter()
                .copied()
                .find(|&child| self.flat[child].key == segment)
        })
    }

    /// Resolve a target string written on `source`.
    fn resolve_target(&self, source: usize, target: &str) -> Option<usize> {
        if let Some(id) = target.strip_prefix('#') {
            return self.by_id.get(id).copied();
        }
        if let Some(path) = target.strip_prefix('.') {
            return self.descend(source, path);
        }
        let base = self.flat[source].parent.unwrap_or(source);
        self.descend(base, target)
    }

    fn lower(&mut self, index: usize) -> StateNode {
        let flat = &self.flat[index];
        let builder = flat.builder;
        let id = flat.id.clone();
        let kind = self.kind(index);

        let initial = if kind == NodeKind::Compound {
            self.lower_initial(index)
        } else {
            None
        };

        let mut entry = builder.entry.clone();
        let mut exit = builder.exit.clone();
        let mut transitions = Vec::new();
        for (on, spec) in &builder.transitions {
            let event = match on {
                On::Event(name) => EventDescriptor::parse(name),
                On::Always => EventDescriptor::Always,
                On::Done => EventDescriptor::Named(format!("done.state.{id}")),
                On::After(delay) => {
                    let name = Event::after_name(&delay.label(), &id);
                    let mut send = SendAction::new(name.as_str()).id(name.as_str());
                    send.delay = Some(delay.clone());
                    entry.push(ActionDescriptor::Send(send));
                    exit.push(ActionDescriptor::cancel(name.as_str()));
                    EventDescriptor::Named(name)
                }
            };
            if let Some(transition) = self.lower_transition(index, event, spec) {
                transitions.push(transition);
            }
        }

        let mut invoke = Vec::with_capacity(builder.invoke.len());
        for (n, spec) in builder.invoke.iter().enumerate() {
            let actor = spec
                .id
                .clone()
                .unwrap_or_else(|| format!("{id}:invocation[{n}]"));
            let outcomes = [
                (&spec.on_done, format!("done.invoke.{actor}")),
                (&spec.on_error, format!("error.platform.{actor}")),
            ];
            for (outcome, event) in outcomes {
                if let Some(spec) = outcome {
                    if let Some(transition) =
                        self.lower_transition(index, EventDescriptor::Named(event), spec)
                    {
                        transitions.push(transition);
                    }
                }
            }
            invoke.push(InvokeDef {
                id: ActorId::new(actor),
                service: spec.service.clone(),
                auto_forward: spec.auto_forward,
            });
        }

        let mut history_default = Vec::new();
        for target in &builder.history_target {
            match self.resolve_target(index, target) {
                Some(resolved) => history_default.push(NodeIndex(resolved)),
                None => self.problems.push(DefinitionProblem::UnresolvedTarget {
                    node: id.clone(),
                    target: target.clone(),
                }),
            }
        }

        let flat = &self.flat[index];
        StateNode {
            index: NodeIndex(index),
            id: NodeId(id),
            key: flat.key.clone(),
            kind,
            parent: flat.parent.map(NodeIndex),
            children: flat.children.iter().copied().map(NodeIndex).collect(),
            initial,
            depth: flat.depth,
            transitions,
            entry,
            exit,
            invoke,
            history_default,
            data: builder.data.clone(),
            tags: builder.tags.clone(),
        }
    }

    fn lower_initial(&mut self, index: usize) -> Option<NodeIndex> {
        let flat = &self.flat[index];
        let Some(key) = &flat.builder.initial else {
            self.problems.push(DefinitionProblem::MissingInitial {
                node: flat.id.clone(),
            });
            return None;
        };
        let child = flat
            .children
            .iter()
            .copied()
            .find(|&child| self.flat[child].key == *key);
        match child {
            Some(child) if !matches!(self.kind(child), NodeKind::History(_)) => Some(NodeIndex(child)),
            _ => {
                self.problems.push(DefinitionProblem::InvalidInitial {
                    node: flat.id.clone(),
                    initial: key.clone(),
                });
                None
            }
        }
    }

    fn lower_transition(
        &mut self,
        source: usize,
        event: EventDescriptor,
        spec: &TransitionBuilder,
    ) -> Option<TransitionDef> {
        let node = self.flat[source].id.clone();
        let mut targets = Vec::with_capacity(spec.targets.len());
        let mut resolved = true;
        for target in &spec.targets {
            match self.resolve_target(source, target) {
                Some(index) => targets.push(NodeIndex(index)),
                None => {
                    resolved = false;
                    self.problems.push(DefinitionProblem::UnresolvedTarget {
                        node: node.clone(),
                        target: target.clone(),
                    });
                }
            }
        }

        let guard = match &spec.guard {
            None => None,
            Some(GuardSpec::Named(name)) => Some(GuardDescriptor::Named(name.clone())),
            Some(GuardSpec::InState(reference)) => {
                let id = reference.strip_prefix('#').unwrap_or(reference);
                match self.by_id.get(id) {
                    Some(&index) => Some(GuardDescriptor::InState(NodeIndex(index))),
                    None => {
                        resolved = false;
                        self.problems.push(DefinitionProblem::UnresolvedStateReference {
                            node,
                            reference: reference.clone(),
                        });
                        None
                    }
                }
            }
        };

        resolved.then(|| TransitionDef {
            source: NodeIndex(source),
            event,
            guard,
            actions: spec.actions.clone(),
            targets,
            internal: spec.is_internal(),
        })
    }
}
