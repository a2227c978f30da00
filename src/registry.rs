//! Named implementations referenced by a definition tree.
//!
//! Definitions refer to guards, actions, services and delays by name. The
//! [`Registry`] maps those names to code and is checked against the tree
//! when a [`Machine`](crate::Machine) is constructed, so a dangling
//! reference is a construction error rather than a runtime surprise.

use crate::core::{ActionError, Event, Guard, GuardError};
use crate::interpreter::{ActionScope, ServiceLogic};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Pure context update: returns the next context.
pub type Assigner<C> = Arc<dyn Fn(&C, &Event) -> C + Send + Sync>;

/// Side-effecting action executed by the interpreter.
pub type Effect<C> = Arc<dyn Fn(&ActionScope<'_, C>) -> Result<(), ActionError> + Send + Sync>;

/// Computes a named delay from context and event.
pub type DelayFn<C> = Arc<dyn Fn(&C, &Event) -> Duration + Send + Sync>;

/// Implementation behind a named action.
pub enum ActionImpl<C> {
    /// Applied immediately by the microstep engine
    Assign(Assigner<C>),
    /// Collected and executed by the interpreter
    Effect(Effect<C>),
}

impl<C> Clone for ActionImpl<C> {
    fn clone(&self) -> Self {
        match self {
            Self::Assign(f) => Self::Assign(Arc::clone(f)),
            Self::Effect(f) => Self::Effect(Arc::clone(f)),
        }
    }
}

/// Named guards, actions, services and delays for one machine.
///
/// # Example
///
/// ```rust
/// use harel::registry::Registry;
/// use harel::core::Event;
///
/// #[derive(Clone)]
/// struct Counter {
///     count: u32,
/// }
///
/// let registry = Registry::<Counter>::new()
///     .guard("below_limit", |c: &Counter, _: &Event| c.count < 10)
///     .assign("increment", |c: &Counter, _: &Event| Counter { count: c.count + 1 })
///     .action("notify", |scope| {
///         println!("count is {}", scope.context().count);
///         Ok(())
///     });
///
/// assert!(registry.has_guard("below_limit"));
/// assert!(registry.has_action("increment"));
/// assert!(!registry.has_service("fetch"));
/// ```
pub struct Registry<C> {
    guards: HashMap<String, Guard<C>>,
    actions: HashMap<String, ActionImpl<C>>,
    services: HashMap<String, Arc<dyn ServiceLogic<C>>>,
    delays: HashMap<String, DelayFn<C>>,
}

impl<C: 'static> Registry<C> {
    pub fn new() -> Self {
        Self {
            guards: HashMap::new(),
            actions: HashMap::new(),
            services: HashMap::new(),
            delays: HashMap::new(),
        }
    }

    /// Register an infallible guard.
    pub fn guard<F>(mut self, name: impl Into<String>, predicate: F) -> Self
    where
        F: Fn(&C, &Event) -> bool + Send + Sync + 'static,
    {
        self.guards.insert(name.into(), Guard::new(predicate));
        self
    }

    /// Register a guard that may fail to evaluate.
    pub fn fallible_guard<F>(mut self, name: impl Into<String>, predicate: F) -> Self
    where
        F: Fn(&C, &Event) -> Result<bool, GuardError> + Send + Sync + 'static,
    {
        self.guards.insert(name.into(), Guard::fallible(predicate));
        self
    }

    /// Register an assignment action.
    pub fn assign<F>(mut self, name: impl Into<String>, assigner: F) -> Self
    where
        F: Fn(&C, &Event) -> C + Send + Sync + 'static,
    {
        self.actions
            .insert(name.into(), ActionImpl::Assign(Arc::new(assigner)));
        self
    }

    /// Register a side-effecting action.
    pub fn action<F>(mut self, name: impl Into<String>, effect: F) -> Self
    where
        F: Fn(&ActionScope<'_, C>) -> Result<(), ActionError> + Send + Sync + 'static,
    {
        self.actions
            .insert(name.into(), ActionImpl::Effect(Arc::new(effect)));
        self
    }

    /// Register a service that can be invoked or spawned.
    pub fn service<S>(mut self, name: impl Into<String>, service: S) -> Self
    where
        S: ServiceLogic<C> + 'static,
    {
        self.services.insert(name.into(), Arc::new(service));
        self
    }

    /// Register a delay computed from context and event.
    pub fn delay<F>(mut self, name: impl Into<String>, delay: F) -> Self
    where
        F: Fn(&C, &Event) -> Duration + Send + Sync + 'static,
    {
        self.delays.insert(name.into(), Arc::new(delay));
        self
    }
}

impl<C> Registry<C> {
    pub fn get_guard(&self, name: &str) -> Option<&Guard<C>> {
        self.guards.get(name)
    }

    pub fn get_action(&self, name: &str) -> Option<&ActionImpl<C>> {
        self.actions.get(name)
    }

    pub fn get_service(&self, name: &str) -> Option<&Arc<dyn ServiceLogic<C>>> {
        self.services.get(name)
    }

    pub fn get_delay(&self, name: &str) -> Option<&DelayFn<C>> {
        self.delays.get(name)
    }

    pub fn has_guard(&self, name: &str) -> bool {
        self.guards.contains_key(name)
    }

    pub fn has_action(&self, name: &str) -> bool {
        self.actions.contains_key(name)
    }

    pub fn has_service(&self, name: &str) -> bool {
        self.services.contains_key(name)
    }

    pub fn has_delay(&self, name: &str) -> bool {
        self.delays.contains_key(name)
    }
}

impl<C: 'static> Default for Registry<C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C> fmt::Debug for Registry<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut guards: Vec<&String> = self.guards.keys().collect();
        let mut actions: Vec<&String> = self.actions.keys().collect();
        let mut services: Vec<&String> = self.services.keys().collect();
        guards.sort();
        actions.sort();
        services.sort();
        f.debug_struct("Registry")
            .field("guards", &guards)
            .field("actions", &actions)
            .field("services", &services)
            .finish_non_exhaustive()
    }
}
