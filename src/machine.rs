//! Validated machines and the pure transition API.

use crate::builder::DefinitionError;
use crate::config::InterpreterConfig;
use crate::core::{
    run_macrostep, Event, ExecutionError, MachineState, PlannedAction, StateTree, StateValue,
    Trigger,
};
use crate::interpreter::Interpreter;
use crate::registry::Registry;
use crate::validation::{check_references, into_result};
use std::fmt;
use std::sync::Arc;

/// A definition tree bound to its registry, initial context and configuration.
///
/// Machines are immutable and cheap to clone; every [`Interpreter`] started
/// from one shares its tree and registry.
pub struct Machine<C> {
    tree: Arc<StateTree>,
    registry: Arc<Registry<C>>,
    context: C,
    config: InterpreterConfig,
}

impl<C: Clone> Clone for Machine<C> {
    fn clone(&self) -> Self {
        Self {
            tree: Arc::clone(&self.tree),
            registry: Arc::clone(&self.registry),
            context: self.context.clone(),
            config: self.config.clone(),
        }
    }
}

/// Result of a pure transition.
#[derive(Clone, Debug)]
pub struct MachineStep<C> {
    pub state: MachineState<C>,
    /// Side effects the macrostep planned, in execution order
    pub actions: Vec<PlannedAction>,
    /// Error that ended the macrostep early
    pub error: Option<ExecutionError>,
    pub changed: bool,
}

impl<C: Clone + Send + 'static> Machine<C> {
    /// Bind a built tree to its registry.
    ///
    /// Fails when the tree references a guard, action, service or delay the
    /// registry does not provide.
    pub fn new(
        tree: StateTree,
        registry: Registry<C>,
        context: C,
        config: InterpreterConfig,
    ) -> Result<Self, DefinitionError> {
        into_result(check_references(&tree, &registry))?;
        Ok(Self {
            tree: Arc::new(tree),
            registry: Arc::new(registry),
            context,
            config,
        })
    }

    pub fn tree(&self) -> &StateTree {
        &self.tree
    }

    pub fn registry(&self) -> &Registry<C> {
        &self.registry
    }

    /// The initial context.
    pub fn context(&self) -> &C {
        &self.context
    }

    pub fn config(&self) -> &InterpreterConfig {
        &self.config
    }

    /// The same machine with a different initial context.
    pub fn with_context(&self, context: C) -> Self {
        Self {
            tree: Arc::clone(&self.tree),
            registry: Arc::clone(&self.registry),
            context,
            config: self.config.clone(),
        }
    }

    /// Enter the initial configuration without executing any effect.
    pub fn initial_state(&self) -> MachineStep<C> {
        self.run(MachineState::unstarted(self.context.clone()), Trigger::Start)
    }

    /// Process `event` from `state` without executing any effect.
    ///
    /// Runs a whole macrostep, including eventless transitions and raised
    /// events. Effects, sends, spawns and the other side effects are
    /// returned in [`MachineStep::actions`] instead of being performed. A
    /// state that is already done is returned unchanged.
    ///
    /// ```rust
    /// use harel::builder::{MachineBuilder, StateBuilder};
    /// use harel::core::Event;
    ///
    /// let machine = MachineBuilder::new("door")
    ///     .definition(
    ///         StateBuilder::new()
    ///             .initial("closed")
    ///             .state("closed", StateBuilder::new().on("OPEN", "open"))
    ///             .state("open", StateBuilder::new().on("CLOSE", "closed")),
    ///     )
    ///     .context(())
    ///     .build()
    ///     .unwrap();
    ///
    /// let initial = machine.initial_state().state;
    /// let next = machine.transition(&initial, Event::new("OPEN"));
    /// assert!(next.changed);
    /// assert!(machine.value(&next.state).matches("open"));
    /// ```
    pub fn transition(&self, state: &MachineState<C>, event: impl Into<Event>) -> MachineStep<C> {
        let event = event.into();
        if state.done {
            return MachineStep {
                state: state.clone(),
                actions: Vec::new(),
                error: None,
                changed: false,
            };
        }
        self.run(state.clone(), Trigger::Event(&event))
    }

    /// Tree-shaped view of a state's configuration.
    pub fn value(&self, state: &MachineState<C>) -> StateValue {
        StateValue::from_configuration(&self.tree, &state.configuration)
    }

    /// Start an interpreter for this machine. It still has to be started.
    pub fn interpret(&self) -> Interpreter<C> {
        Interpreter::new(self.clone())
    }

    fn run(&self, mut state: MachineState<C>, trigger: Trigger<'_>) -> MachineStep<C> {
        let mut actions = Vec::new();
        let report = run_macrostep(
            &self.tree,
            &self.registry,
            &self.config,
            &mut state,
            trigger,
            |result, _| {
                actions.extend(result.actions().cloned());
                Ok(())
            },
        );
        MachineStep {
            changed: report.changed(),
            error: report.error,
            state,
            actions,
        }
    }
}

impl<C> fmt::Debug for Machine<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Machine")
            .field("id", &self.tree.machine_id())
            .field("nodes", &self.tree.len())
            .field("registry", &self.registry)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
