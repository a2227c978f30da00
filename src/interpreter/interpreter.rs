//! The imperative shell around the macrostep loop.

use super::actor::{Actor, ActorArena, ActorEntry, ActorStatus};
use super::mailbox::{ActorSender, Envelope, Mailbox};
use super::scheduler::{Clock, ScheduleKey, ScheduledEvent, Scheduler, SystemClock};
use super::scope::ActionScope;
use super::service::ServiceRequest;
use crate::checkpoint::{Checkpoint, CheckpointError};
use crate::config::ErrorPolicy;
use crate::core::{
    exit_all, resume, run_macrostep, ActorId, Event, ExecutionError, MachineState,
    MicrostepResult, NodeId, PlannedAction, SendTarget, StateValue, Trigger,
};
use crate::machine::Machine;
use crate::registry::{ActionImpl, Registry};
use serde::Serialize;
use serde_json::{json, Value};
use std::any::Any;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

/// Lifecycle of an interpreter. Stopping is irreversible.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InterpreterStatus {
    NotStarted,
    Running,
    Stopped,
}

/// Handle returned by [`Interpreter::subscribe`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

/// Immutable view of an interpreter after a macrostep.
#[derive(Clone, Debug, Serialize)]
pub struct Snapshot<C> {
    pub value: StateValue,
    /// Every active node, in document order
    pub configuration: Vec<NodeId>,
    pub context: C,
    /// Event that triggered the macrostep
    pub event: Option<Event>,
    /// Whether the macrostep took at least one transition
    pub changed: bool,
    pub done: bool,
    /// Union of the tags of the active nodes
    pub tags: BTreeSet<String>,
}

impl<C> Snapshot<C> {
    /// Whether the dotted key path is active, e.g. `"on.network.online"`.
    pub fn matches(&self, path: &str) -> bool {
        self.value.matches(path)
    }

    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.contains(tag)
    }
}

type Listener<C> = Box<dyn FnMut(&Snapshot<C>) + Send>;
type ErrorListener = Box<dyn FnMut(&ExecutionError) + Send>;
type DoneListener = Box<dyn FnMut(&Value) + Send>;

/// Everything an interpreter owns besides the machine and its state.
struct Runtime<C> {
    id: ActorId,
    session: Uuid,
    status: InterpreterStatus,
    actors: ActorArena,
    scheduler: Scheduler,
    clock: Arc<dyn Clock>,
    mailbox: Mailbox,
    parent: Option<ActorSender>,
    failure: Option<ExecutionError>,
    last_error: Option<ExecutionError>,
    last_event: Option<Event>,
    last_changed: bool,
    listeners: Vec<(SubscriptionId, Listener<C>)>,
    error_listeners: Vec<ErrorListener>,
    done_listeners: Vec<DoneListener>,
    next_subscription: u64,
}

/// A running instance of a [`Machine`].
///
/// The interpreter owns the configuration, context and history, the actors
/// it spawned and its delayed events. Events are queued in its mailbox and
/// processed one macrostep at a time; events produced while a macrostep is
/// running (by effects, listeners or actors) wait for the next one.
///
/// # Example
///
/// ```rust
/// use harel::builder::{MachineBuilder, StateBuilder};
///
/// let machine = MachineBuilder::new("light")
///     .definition(
///         StateBuilder::new()
///             .initial("green")
///             .state("green", StateBuilder::new().on("TIMER", "yellow"))
///             .state("yellow", StateBuilder::new().on("TIMER", "red"))
///             .state("red", StateBuilder::new()),
///     )
///     .context(())
///     .build()
///     .unwrap();
///
/// let mut light = machine.interpret();
/// light.start();
/// light.send("TIMER");
/// assert!(light.snapshot().matches("yellow"));
/// ```
pub struct Interpreter<C> {
    machine: Machine<C>,
    state: MachineState<C>,
    runtime: Runtime<C>,
}

impl<C: Clone + Send + 'static> Interpreter<C> {
    pub fn new(machine: Machine<C>) -> Self {
        let id = ActorId::new(machine.tree().machine_id());
        let state = MachineState::unstarted(machine.context().clone());
        Self {
            machine,
            state,
            runtime: Runtime {
                id,
                session: Uuid::new_v4(),
                status: InterpreterStatus::NotStarted,
                actors: ActorArena::default(),
                scheduler: Scheduler::new(),
                clock: Arc::new(SystemClock::new()),
                mailbox: Mailbox::new(),
                parent: None,
                failure: None,
                last_error: None,
                last_event: None,
                last_changed: false,
                listeners: Vec::new(),
                error_listeners: Vec::new(),
                done_listeners: Vec::new(),
                next_subscription: 0,
            },
        }
    }

    /// Child interpreter started by a machine service.
    pub(crate) fn spawned(
        machine: Machine<C>,
        id: ActorId,
        parent: ActorSender,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let mut child = Self::new(machine);
        child.runtime.id = id;
        child.runtime.parent = Some(parent);
        child.runtime.clock = clock;
        child
    }

    /// Use `clock` for delayed events instead of the system clock.
    pub fn with_clock(mut self, clock: impl Clock + 'static) -> Self {
        self.runtime.clock = Arc::new(clock);
        self
    }

    /// Override the actor id, which defaults to the machine id.
    pub fn with_id(mut self, id: impl Into<ActorId>) -> Self {
        self.runtime.id = id.into();
        self
    }

    /// Enter the initial configuration and start processing events.
    ///
    /// Does nothing if the interpreter was already started or stopped. If
    /// the initial microstep cannot be committed the interpreter fails
    /// regardless of the error policy.
    pub fn start(&mut self) {
        if self.runtime.status != InterpreterStatus::NotStarted {
            tracing::debug!(machine = %self.runtime.id, "start ignored, interpreter already started");
            return;
        }
        self.runtime.status = InterpreterStatus::Running;
        tracing::info!(
            machine = %self.runtime.id,
            session = %self.runtime.session,
            "interpreter started"
        );
        self.macrostep(Trigger::Start);
        self.drain();
    }

    /// Queue an event and process the mailbox.
    ///
    /// Events sent to an interpreter that is not running are dropped.
    pub fn send(&mut self, event: impl Into<Event>) {
        let event = event.into();
        if self.runtime.status != InterpreterStatus::Running {
            tracing::debug!(
                machine = %self.runtime.id,
                event = %event,
                status = ?self.runtime.status,
                "event dropped, interpreter is not running"
            );
            return;
        }
        self.runtime.mailbox.push(event);
        self.drain();
    }

    /// Exit every active node, stop all actors and cancel all delayed events.
    ///
    /// Exit actions run deepest first. Failures are reported to the error
    /// listeners and do not prevent the remaining exit actions.
    pub fn stop(&mut self) {
        match self.runtime.status {
            InterpreterStatus::Stopped => return,
            InterpreterStatus::NotStarted => {
                self.runtime.status = InterpreterStatus::Stopped;
                return;
            }
            InterpreterStatus::Running => {}
        }

        let event = Event::new("stop");
        let Interpreter {
            machine,
            state,
            runtime,
        } = self;
        let registry = machine.registry();
        match exit_all(
            machine.tree(),
            registry,
            &state.configuration,
            &state.context,
            &state.history,
            &event,
        ) {
            Ok(result) => {
                for action in result.actions() {
                    if let Err(err) = runtime.perform(registry, action, &result.context, &event) {
                        runtime.report(&err);
                    }
                }
                state.context = result.context;
            }
            Err(err) => runtime.report(&err),
        }
        self.halt();
        tracing::info!(machine = %self.runtime.id, "interpreter stopped");
    }

    /// Deliver due delayed events and results of child actors.
    ///
    /// Child actors are polled first, then every delayed event due on the
    /// clock is delivered in deadline order, each followed by draining the
    /// mailbox.
    pub fn poll(&mut self) {
        if self.runtime.status != InterpreterStatus::Running {
            return;
        }
        for entry in self.runtime.actors.iter_mut() {
            entry.actor.poll();
        }
        let now = self.runtime.clock.now();
        while self.runtime.status == InterpreterStatus::Running {
            let Some(due) = self.runtime.scheduler.pop_due(now) else {
                break;
            };
            tracing::debug!(machine = %self.runtime.id, event = %due.event, "delayed event due");
            self.runtime.deliver(&due.target, due.event);
            self.drain();
        }
        self.drain();
    }

    /// Time until the next delayed event is due, if one is pending.
    pub fn next_timeout(&self) -> Option<Duration> {
        self.runtime
            .scheduler
            .next_deadline()
            .map(|deadline| deadline.saturating_sub(self.runtime.clock.now()))
    }

    /// Delayed events waiting for their deadline, earliest first.
    pub fn scheduled(&self) -> impl Iterator<Item = &ScheduledEvent> {
        self.runtime.scheduler.iter()
    }

    /// A handle for queueing events from listeners, effects or other threads.
    pub fn sender(&self) -> ActorSender {
        self.runtime.mailbox.sender(None)
    }

    pub fn snapshot(&self) -> Snapshot<C> {
        let tree = self.machine.tree();
        let tags = self
            .state
            .configuration
            .iter()
            .flat_map(|n| tree.node(n).tags().iter().cloned())
            .collect();
        Snapshot {
            value: StateValue::from_configuration(tree, &self.state.configuration),
            configuration: self.state.configuration.ids(tree),
            context: self.state.context.clone(),
            event: self.runtime.last_event.clone(),
            changed: self.runtime.last_changed,
            done: self.state.done,
            tags,
        }
    }

    /// Call `listener` after every macrostep that took a transition.
    pub fn subscribe<F>(&mut self, listener: F) -> SubscriptionId
    where
        F: FnMut(&Snapshot<C>) + Send + 'static,
    {
        self.runtime.next_subscription += 1;
        let id = SubscriptionId(self.runtime.next_subscription);
        self.runtime.listeners.push((id, Box::new(listener)));
        id
    }

    /// Returns whether the subscription existed.
    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let before = self.runtime.listeners.len();
        self.runtime.listeners.retain(|(sub, _)| *sub != id);
        before != self.runtime.listeners.len()
    }

    /// Call `listener` for every execution error, fatal or not.
    pub fn on_error<F>(&mut self, listener: F)
    where
        F: FnMut(&ExecutionError) + Send + 'static,
    {
        self.runtime.error_listeners.push(Box::new(listener));
    }

    /// Call `listener` with the done data once a top-level final state is reached.
    pub fn on_done<F>(&mut self, listener: F)
    where
        F: FnMut(&Value) + Send + 'static,
    {
        self.runtime.done_listeners.push(Box::new(listener));
    }

    pub fn id(&self) -> &ActorId {
        &self.runtime.id
    }

    pub fn status(&self) -> InterpreterStatus {
        self.runtime.status
    }

    pub fn machine(&self) -> &Machine<C> {
        &self.machine
    }

    pub fn state(&self) -> &MachineState<C> {
        &self.state
    }

    pub fn context(&self) -> &C {
        &self.state.context
    }

    /// The most recent execution error.
    pub fn last_error(&self) -> Option<&ExecutionError> {
        self.runtime.last_error.as_ref()
    }

    /// Whether the interpreter was stopped by a fatal error.
    pub fn is_failed(&self) -> bool {
        self.runtime.failure.is_some()
    }

    pub fn failure(&self) -> Option<&ExecutionError> {
        self.runtime.failure.as_ref()
    }

    /// An actor owned by this interpreter.
    pub fn actor(&self, id: &ActorId) -> Option<&dyn Actor> {
        self.runtime.actors.get(id)
    }

    pub fn actor_ids(&self) -> Vec<ActorId> {
        self.runtime.actors.ids()
    }

    /// A machine-backed child, if `id` names one with context type `C2`.
    pub fn child<C2: Clone + Send + 'static>(&self, id: &ActorId) -> Option<&Interpreter<C2>> {
        self.runtime
            .actors
            .get(id)?
            .as_any()
            .downcast_ref::<Interpreter<C2>>()
    }

    /// Capture the current state.
    pub fn checkpoint(&self) -> Checkpoint<C> {
        Checkpoint::capture(self.machine.tree(), &self.state)
    }

    /// Start from a checkpoint instead of the initial configuration.
    ///
    /// Entry actions are not run again. Invocations and delayed entry sends
    /// of the active nodes are restarted, with delays counted from now.
    pub fn restore(&mut self, checkpoint: Checkpoint<C>) -> Result<(), CheckpointError> {
        if self.runtime.status != InterpreterStatus::NotStarted {
            return Err(CheckpointError::ValidationFailed(
                "interpreter has already been started".to_string(),
            ));
        }
        let restored = checkpoint.into_state(self.machine.tree())?;
        let event = Event::init();
        let actions = resume(
            self.machine.tree(),
            self.machine.registry(),
            &restored.configuration,
            &restored.context,
            &event,
        )
        .map_err(|e| CheckpointError::ValidationFailed(e.to_string()))?;

        self.state = restored;
        self.runtime.status = InterpreterStatus::Running;
        self.runtime.last_event = Some(event.clone());
        tracing::info!(
            machine = %self.runtime.id,
            session = %self.runtime.session,
            done = self.state.done,
            "interpreter restored from checkpoint"
        );
        if self.state.done {
            self.halt();
            return Ok(());
        }

        let Interpreter {
            machine,
            state,
            runtime,
        } = self;
        for action in &actions {
            if let Err(err) = runtime.perform(machine.registry(), action, &state.context, &event) {
                runtime.report(&err);
            }
        }
        self.drain();
        Ok(())
    }

    /// Process mailbox envelopes until it is empty or the interpreter halts.
    fn drain(&mut self) {
        while self.runtime.status == InterpreterStatus::Running {
            let Some(envelope) = self.runtime.mailbox.try_recv() else {
                break;
            };
            self.process(envelope);
        }
    }

    fn process(&mut self, envelope: Envelope) {
        let Envelope { origin, event } = envelope;
        match origin {
            Some(origin) if !self.runtime.actors.contains(&origin) => {
                tracing::debug!(
                    machine = %self.runtime.id,
                    actor = %origin,
                    event = %event,
                    "event from a stopped actor dropped"
                );
                return;
            }
            Some(_) => {}
            None => self.runtime.forward(&event),
        }
        self.macrostep(Trigger::Event(&event));
    }

    fn macrostep(&mut self, trigger: Trigger<'_>) {
        let event = match trigger {
            Trigger::Start => Event::init(),
            Trigger::Event(event) => event.clone(),
        };

        let Interpreter {
            machine,
            state,
            runtime,
        } = self;
        let registry = machine.registry();
        let report = run_macrostep(
            machine.tree(),
            registry,
            machine.config(),
            state,
            trigger,
            |result, event| runtime.execute(registry, result, event),
        );

        let changed = report.changed();
        for err in &report.guard_errors {
            runtime.report(err);
        }
        runtime.last_event = Some(event);
        runtime.last_changed = changed;

        if let Some(err) = report.error {
            runtime.report(&err);
            let unstarted = self.state.configuration.is_empty();
            if self.machine.config().error_policy == ErrorPolicy::Fatal || unstarted {
                self.fail(err);
                return;
            }
        }

        if changed {
            let snapshot = self.snapshot();
            for (_, listener) in &mut self.runtime.listeners {
                listener(&snapshot);
            }
        }

        if self.state.done {
            self.finish();
        }
    }

    /// Top-level final state reached.
    fn finish(&mut self) {
        let data = self.state.done_data.clone().unwrap_or(Value::Null);
        tracing::info!(machine = %self.runtime.id, "machine reached its final state");
        for listener in &mut self.runtime.done_listeners {
            listener(&data);
        }
        if let Some(parent) = &self.runtime.parent {
            parent.resolve(data);
        }
        self.halt();
    }

    fn fail(&mut self, err: ExecutionError) {
        tracing::warn!(machine = %self.runtime.id, error = %err, "interpreter failed");
        if let Some(parent) = &self.runtime.parent {
            parent.reject(json!({
                "code": err.error_code(),
                "message": err.to_string(),
            }));
        }
        self.runtime.failure = Some(err);
        self.halt();
    }

    fn halt(&mut self) {
        self.runtime.status = InterpreterStatus::Stopped;
        self.runtime.actors.stop_all();
        let cancelled = self.runtime.scheduler.cancel_all();
        if cancelled > 0 {
            tracing::debug!(machine = %self.runtime.id, cancelled, "pending delayed events cancelled");
        }
    }
}

impl<C> Runtime<C> {
    /// Execute every planned action of a microstep, stopping at the first failure.
    fn execute(
        &mut self,
        registry: &Registry<C>,
        result: &MicrostepResult<C>,
        event: &Event,
    ) -> Result<(), ExecutionError> {
        for action in result.actions() {
            self.perform(registry, action, &result.context, event)?;
        }
        Ok(())
    }

    fn perform(
        &mut self,
        registry: &Registry<C>,
        action: &PlannedAction,
        context: &C,
        event: &Event,
    ) -> Result<(), ExecutionError> {
        match action {
            PlannedAction::Effect { name } => {
                let Some(ActionImpl::Effect(effect)) = registry.get_action(name) else {
                    return Err(ExecutionError::UnknownAction {
                        action: name.clone(),
                    });
                };
                let sender = self.mailbox.sender(None);
                let scope = ActionScope {
                    context,
                    event,
                    sender: &sender,
                    parent: self.parent.as_ref(),
                };
                effect(&scope).map_err(|source| ExecutionError::Action {
                    action: name.clone(),
                    event: event.name.clone(),
                    source,
                })
            }
            PlannedAction::Send {
                event: sent,
                target,
                delay,
                id,
                owner,
            } => {
                match delay {
                    Some(delay) => {
                        let deadline = self
                            .clock
                            .now()
                            .checked_add(*delay)
                            .ok_or_else(|| ExecutionError::DelayOverflow {
                                event: sent.name.clone(),
                            })?;
                        tracing::debug!(
                            machine = %self.id,
                            event = %sent,
                            delay_ms = delay.as_millis() as u64,
                            "delayed event scheduled"
                        );
                        self.scheduler.schedule(ScheduledEvent {
                            event: sent.clone(),
                            target: target.clone(),
                            key: ScheduleKey {
                                owner: *owner,
                                id: id.clone(),
                            },
                            deadline,
                        });
                    }
                    None => self.deliver(target, sent.clone()),
                }
                Ok(())
            }
            PlannedAction::Cancel { id } => {
                self.scheduler.cancel_id(id);
                Ok(())
            }
            PlannedAction::CancelOwned { owner } => {
                self.scheduler.cancel_owner(*owner);
                Ok(())
            }
            PlannedAction::Log { label } => {
                tracing::info!(machine = %self.id, event = %event, "{label}");
                Ok(())
            }
            PlannedAction::Spawn {
                service,
                id,
                auto_forward,
                ..
            } => {
                let logic = registry
                    .get_service(service)
                    .ok_or_else(|| ExecutionError::UnknownService {
                        service: service.clone(),
                    })?;
                let sender = self.mailbox.sender(Some(id.clone()));
                let request = ServiceRequest {
                    id: id.clone(),
                    context,
                    event,
                    sender: sender.clone(),
                    clock: Arc::clone(&self.clock),
                };
                match logic.start(request) {
                    Ok(actor) => {
                        tracing::debug!(machine = %self.id, actor = %id, service = %service, "actor started");
                        self.actors.insert(ActorEntry {
                            actor,
                            auto_forward: *auto_forward,
                        });
                    }
                    Err(err) => {
                        tracing::warn!(machine = %self.id, actor = %id, error = %err, "service failed to start");
                        // Keep the id known so the failure event is not dropped.
                        self.actors.insert(ActorEntry {
                            actor: Box::new(FailedActor { id: id.clone() }),
                            auto_forward: false,
                        });
                        sender.reject(Value::String(err.message));
                    }
                }
                Ok(())
            }
            PlannedAction::Stop { id } => {
                match self.actors.remove(id) {
                    Some(mut entry) => {
                        entry.actor.stop();
                        tracing::debug!(machine = %self.id, actor = %id, "actor stopped");
                    }
                    None => tracing::debug!(machine = %self.id, actor = %id, "stop of unknown actor ignored"),
                }
                Ok(())
            }
        }
    }

    fn deliver(&mut self, target: &SendTarget, event: Event) {
        match target {
            SendTarget::Myself => self.mailbox.push(event),
            SendTarget::Parent => match &self.parent {
                Some(parent) => {
                    if !parent.send(event) {
                        tracing::warn!(machine = %self.id, "parent is gone, event dropped");
                    }
                }
                None => tracing::warn!(machine = %self.id, event = %event, "no parent to send to, event dropped"),
            },
            SendTarget::Actor(id) => match self.actors.get_mut(id) {
                Some(actor) => actor.send(event),
                None => tracing::warn!(machine = %self.id, actor = %id, event = %event, "send to unknown actor dropped"),
            },
        }
    }

    /// Pass an external event on to auto-forwarding invocations.
    fn forward(&mut self, event: &Event) {
        for entry in self.actors.iter_mut().filter(|e| e.auto_forward) {
            entry.actor.send(event.clone());
        }
    }

    fn report(&mut self, err: &ExecutionError) {
        tracing::warn!(machine = %self.id, code = err.error_code(), error = %err, "execution error");
        self.last_error = Some(err.clone());
        for listener in &mut self.error_listeners {
            listener(err);
        }
    }
}

/// Placeholder for a service whose start failed.
struct FailedActor {
    id: ActorId,
}

impl Actor for FailedActor {
    fn id(&self) -> &ActorId {
        &self.id
    }

    fn send(&mut self, _event: Event) {}

    fn stop(&mut self) {}

    fn status(&self) -> ActorStatus {
        ActorStatus::Stopped
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl<C: Clone + Send + 'static> Actor for Interpreter<C> {
    fn id(&self) -> &ActorId {
        &self.runtime.id
    }

    fn send(&mut self, event: Event) {
        Interpreter::send(self, event);
    }

    fn stop(&mut self) {
        Interpreter::stop(self);
    }

    fn status(&self) -> ActorStatus {
        match self.runtime.status {
            InterpreterStatus::NotStarted => ActorStatus::Starting,
            InterpreterStatus::Running => ActorStatus::Running,
            InterpreterStatus::Stopped => ActorStatus::Stopped,
        }
    }

    fn poll(&mut self) {
        Interpreter::poll(self);
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
