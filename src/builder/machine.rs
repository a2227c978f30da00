//! Builder for complete machines.

use crate::builder::error::{DefinitionError, DefinitionProblem};
use crate::builder::state::StateBuilder;
use crate::config::InterpreterConfig;
use crate::core::{ActionError, Event, GuardError};
use crate::interpreter::{ActionScope, ServiceLogic};
use crate::machine::Machine;
use crate::registry::Registry;
use std::time::Duration;

/// Builder for constructing machines with a fluent API.
///
/// # Example
///
/// ```rust
/// use harel::builder::{MachineBuilder, StateBuilder, TransitionBuilder};
/// use harel::core::Event;
///
/// #[derive(Clone, Debug, Default, PartialEq)]
/// struct Clicks {
///     count: u32,
/// }
///
/// let machine = MachineBuilder::new("toggle")
///     .definition(
///         StateBuilder::new()
///             .initial("off")
///             .state("off", StateBuilder::new().on("TOGGLE", TransitionBuilder::to("on").action("count")))
///             .state("on", StateBuilder::new().on("TOGGLE", "off")),
///     )
///     .context(Clicks::default())
///     .assign("count", |c: &Clicks, _: &Event| Clicks { count: c.count + 1 })
///     .build()
///     .unwrap();
///
/// let step = machine.transition(&machine.initial_state().state, Event::new("TOGGLE"));
/// assert_eq!(step.state.context.count, 1);
/// ```
pub struct MachineBuilder<C> {
    id: String,
    definition: Option<StateBuilder>,
    context: Option<C>,
    registry: Registry<C>,
    config: InterpreterConfig,
}

impl<C: Clone + Send + 'static> MachineBuilder<C> {
    /// Create a builder for a machine with the given id.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            definition: None,
            context: None,
            registry: Registry::new(),
            config: InterpreterConfig::default(),
        }
    }

    /// Set the root state (required).
    pub fn definition(mut self, root: StateBuilder) -> Self {
        self.definition = Some(root);
        self
    }

    /// Set the initial context (required).
    pub fn context(mut self, context: C) -> Self {
        self.context = Some(context);
        self
    }

    /// Replace the registry wholesale.
    pub fn registry(mut self, registry: Registry<C>) -> Self {
        self.registry = registry;
        self
    }

    pub fn config(mut self, config: InterpreterConfig) -> Self {
        self.config = config;
        self
    }

    pub fn guard<F>(mut self, name: impl Into<String>, predicate: F) -> Self
    where
        F: Fn(&C, &Event) -> bool + Send + Sync + 'static,
    {
        self.registry = self.registry.guard(name, predicate);
        self
    }

    pub fn fallible_guard<F>(mut self, name: impl Into<String>, predicate: F) -> Self
    where
        F: Fn(&C, &Event) -> Result<bool, GuardError> + Send + Sync + 'static,
    {
        self.registry = self.registry.fallible_guard(name, predicate);
        self
    }

    pub fn assign<F>(mut self, name: impl Into<String>, assigner: F) -> Self
    where
        F: Fn(&C, &Event) -> C + Send + Sync + 'static,
    {
        self.registry = self.registry.assign(name, assigner);
        self
    }

    pub fn action<F>(mut self, name: impl Into<String>, effect: F) -> Self
    where
        F: Fn(&ActionScope<'_, C>) -> Result<(), ActionError> + Send + Sync + 'static,
    {
        self.registry = self.registry.action(name, effect);
        self
    }

    pub fn service<S>(mut self, name: impl Into<String>, service: S) -> Self
    where
        S: ServiceLogic<C> + 'static,
    {
        self.registry = self.registry.service(name, service);
        self
    }

    pub fn delay<F>(mut self, name: impl Into<String>, delay: F) -> Self
    where
        F: Fn(&C, &Event) -> Duration + Send + Sync + 'static,
    {
        self.registry = self.registry.delay(name, delay);
        self
    }

    /// Build the machine.
    ///
    /// Fails with every problem found in the definition and its registry
    /// references.
    pub fn build(self) -> Result<Machine<C>, DefinitionError> {
        let mut missing = Vec::new();
        if self.definition.is_none() {
            missing.push(DefinitionProblem::MissingDefinition);
        }
        if self.context.is_none() {
            missing.push(DefinitionProblem::MissingContext);
        }
        let (Some(definition), Some(context)) = (self.definition, self.context) else {
            return Err(DefinitionError::Invalid { problems: missing });
        };

        let tree = definition.build(self.id)?;
        Machine::new(tree, self.registry, context, self.config)
    }
}
