//! Services: the things an interpreter can invoke or spawn.
//!
//! A [`ServiceLogic`] starts an [`Actor`] when its state is entered (or a
//! `spawn` action runs). Results come back as events through the
//! [`ActorSender`] in the [`ServiceRequest`]: `done.invoke.<id>` on success
//! and `error.platform.<id>` on failure.
//!
//! Adapters are provided for the common shapes:
//!
//! - [`callback`]: long-lived, receives events, sends events at will
//! - [`promise`]: a single result computed on start
//! - [`observable`]: a finite stream of events, then completion
//! - [`future`]: an async computation on the current tokio runtime
//! - [`machine`] / [`machine_with`]: a child statechart

use super::actor::{Actor, ActorStatus};
use super::interpreter::Interpreter;
use super::mailbox::ActorSender;
use super::scheduler::Clock;
use crate::core::{ActionError, ActorId, Event};
use crate::machine::Machine;
use serde_json::Value;
use std::any::Any;
use std::marker::PhantomData;
use std::sync::Arc;

/// Everything a service gets when it starts.
pub struct ServiceRequest<'a, C> {
    pub id: ActorId,
    /// Context of the starting machine, after the microstep's assignments
    pub context: &'a C,
    /// Event that caused the start
    pub event: &'a Event,
    /// Posts into the starting machine's mailbox, tagged with `id`
    pub sender: ActorSender,
    pub(crate) clock: Arc<dyn Clock>,
}

impl<C> ServiceRequest<'_, C> {
    /// Clock of the starting interpreter, for services that keep time.
    pub fn clock(&self) -> Arc<dyn Clock> {
        Arc::clone(&self.clock)
    }
}

/// Starts actors for a registry service.
pub trait ServiceLogic<C>: Send + Sync {
    fn start(&self, request: ServiceRequest<'_, C>) -> Result<Box<dyn Actor>, ActionError>;
}

/// An actor that has already delivered everything it will deliver.
struct SettledActor {
    id: ActorId,
}

impl Actor for SettledActor {
    fn id(&self) -> &ActorId {
        &self.id
    }

    fn send(&mut self, event: Event) {
        tracing::debug!(actor = %self.id, event = %event, "settled actor ignores event");
    }

    fn stop(&mut self) {}

    fn status(&self) -> ActorStatus {
        ActorStatus::Stopped
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

type Receive = Box<dyn FnMut(Event) + Send>;
type Cancel = Box<dyn FnOnce() + Send>;

/// Hooks returned by a callback service.
#[derive(Default)]
pub struct CallbackHandle {
    on_receive: Option<Receive>,
    on_cancel: Option<Cancel>,
}

impl CallbackHandle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Called for every event sent to the actor.
    pub fn on_receive<F>(mut self, receive: F) -> Self
    where
        F: FnMut(Event) + Send + 'static,
    {
        self.on_receive = Some(Box::new(receive));
        self
    }

    /// Called once when the actor is stopped.
    pub fn on_cancel<F>(mut self, cancel: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        self.on_cancel = Some(Box::new(cancel));
        self
    }
}

struct CallbackActor {
    id: ActorId,
    handle: CallbackHandle,
    status: ActorStatus,
}

impl Actor for CallbackActor {
    fn id(&self) -> &ActorId {
        &self.id
    }

    fn send(&mut self, event: Event) {
        if self.status != ActorStatus::Running {
            return;
        }
        if let Some(receive) = self.handle.on_receive.as_mut() {
            receive(event);
        }
    }

    fn stop(&mut self) {
        self.status = ActorStatus::Stopped;
        if let Some(cancel) = self.handle.on_cancel.take() {
            cancel();
        }
    }

    fn status(&self) -> ActorStatus {
        self.status
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

pub struct CallbackService<C, F> {
    logic: F,
    _context: PhantomData<fn(&C)>,
}

/// A long-lived service driven by a callback.
///
/// The callback gets a sender for posting events to the machine and returns
/// the hooks for receiving events and cleaning up.
///
/// ```rust
/// use harel::interpreter::{callback, CallbackHandle};
///
/// let ticker = callback(|_: &(), sender| {
///     sender.send("TICK");
///     Ok(CallbackHandle::new().on_receive(move |event| {
///         println!("ticker got {}", event.name);
///     }))
/// });
/// # let _ = ticker;
/// ```
pub fn callback<C, F>(logic: F) -> CallbackService<C, F>
where
    F: Fn(&C, ActorSender) -> Result<CallbackHandle, ActionError> + Send + Sync + 'static,
{
    CallbackService {
        logic,
        _context: PhantomData,
    }
}

impl<C, F> ServiceLogic<C> for CallbackService<C, F>
where
    F: Fn(&C, ActorSender) -> Result<CallbackHandle, ActionError> + Send + Sync + 'static,
{
    fn start(&self, request: ServiceRequest<'_, C>) -> Result<Box<dyn Actor>, ActionError> {
        let handle = (self.logic)(request.context, request.sender)?;
        Ok(Box::new(CallbackActor {
            id: request.id,
            handle,
            status: ActorStatus::Running,
        }))
    }
}

pub struct PromiseService<C, F> {
    logic: F,
    _context: PhantomData<fn(&C)>,
}

/// A service computing a single result when started.
///
/// `Ok` becomes `done.invoke.<id>` and `Err` becomes `error.platform.<id>`,
/// each carrying the value as payload. The result is delivered through the
/// mailbox, after the macrostep that started the service.
pub fn promise<C, F>(logic: F) -> PromiseService<C, F>
where
    F: Fn(&C, &Event) -> Result<Value, Value> + Send + Sync + 'static,
{
    PromiseService {
        logic,
        _context: PhantomData,
    }
}

impl<C, F> ServiceLogic<C> for PromiseService<C, F>
where
    F: Fn(&C, &Event) -> Result<Value, Value> + Send + Sync + 'static,
{
    fn start(&self, request: ServiceRequest<'_, C>) -> Result<Box<dyn Actor>, ActionError> {
        match (self.logic)(request.context, request.event) {
            Ok(data) => request.sender.resolve(data),
            Err(data) => request.sender.reject(data),
        };
        Ok(Box::new(SettledActor { id: request.id }))
    }
}

pub struct ObservableService<C, F> {
    logic: F,
    _context: PhantomData<fn(&C)>,
}

/// A service emitting a finite sequence of events, then completing.
pub fn observable<C, F, I>(logic: F) -> ObservableService<C, F>
where
    F: Fn(&C, &Event) -> I + Send + Sync + 'static,
    I: IntoIterator<Item = Event>,
{
    ObservableService {
        logic,
        _context: PhantomData,
    }
}

impl<C, F, I> ServiceLogic<C> for ObservableService<C, F>
where
    F: Fn(&C, &Event) -> I + Send + Sync + 'static,
    I: IntoIterator<Item = Event>,
{
    fn start(&self, request: ServiceRequest<'_, C>) -> Result<Box<dyn Actor>, ActionError> {
        for event in (self.logic)(request.context, request.event) {
            request.sender.send(event);
        }
        request.sender.complete();
        Ok(Box::new(SettledActor { id: request.id }))
    }
}

#[cfg(feature = "tokio")]
pub use self::futures::{future, FutureService};

#[cfg(feature = "tokio")]
mod futures {
    use super::*;
    use std::future::Future;
    use tokio::task::JoinHandle;

    struct FutureActor {
        id: ActorId,
        task: JoinHandle<()>,
        stopped: bool,
    }

    impl Actor for FutureActor {
        fn id(&self) -> &ActorId {
            &self.id
        }

        fn send(&mut self, event: Event) {
            tracing::debug!(actor = %self.id, event = %event, "future actor ignores event");
        }

        fn stop(&mut self) {
            if !self.stopped {
                self.stopped = true;
                self.task.abort();
            }
        }

        fn status(&self) -> ActorStatus {
            if self.stopped || self.task.is_finished() {
                ActorStatus::Stopped
            } else {
                ActorStatus::Running
            }
        }

        fn as_any(&self) -> &dyn Any {
            self
        }
    }

    pub struct FutureService<C, F> {
        logic: F,
        _context: PhantomData<fn(&C)>,
    }

    /// A service backed by a future spawned on the current tokio runtime.
    ///
    /// Stopping the actor aborts the task. Started outside a runtime, the
    /// service fails immediately with `error.platform.<id>`.
    pub fn future<C, F, Fut>(logic: F) -> FutureService<C, F>
    where
        F: Fn(&C, &Event) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value, Value>> + Send + 'static,
    {
        FutureService {
            logic,
            _context: PhantomData,
        }
    }

    impl<C, F, Fut> ServiceLogic<C> for FutureService<C, F>
    where
        F: Fn(&C, &Event) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value, Value>> + Send + 'static,
    {
        fn start(&self, request: ServiceRequest<'_, C>) -> Result<Box<dyn Actor>, ActionError> {
            let runtime = match tokio::runtime::Handle::try_current() {
                Ok(runtime) => runtime,
                Err(err) => {
                    tracing::warn!(actor = %request.id, "cannot start future service: {err}");
                    request
                        .sender
                        .reject(Value::String("no tokio runtime available".into()));
                    return Ok(Box::new(SettledActor { id: request.id }));
                }
            };
            let work = (self.logic)(request.context, request.event);
            let sender = request.sender;
            let task = runtime.spawn(async move {
                match work.await {
                    Ok(data) => sender.resolve(data),
                    Err(data) => sender.reject(data),
                };
            });
            Ok(Box::new(FutureActor {
                id: request.id,
                task,
                stopped: false,
            }))
        }
    }
}

type ContextMap<C, C2> = Arc<dyn Fn(&C, &Event) -> C2 + Send + Sync>;

pub struct MachineService<C, C2> {
    machine: Machine<C2>,
    map: Option<ContextMap<C, C2>>,
}

/// A child statechart started with the machine's own initial context.
///
/// The child shares the parent's clock. Reaching a top-level final state
/// sends `done.invoke.<id>` with the done data to the parent; a fatal error
/// sends `error.platform.<id>`. Events the child sends to its parent arrive
/// in the parent's mailbox.
pub fn machine<C, C2>(machine: Machine<C2>) -> MachineService<C, C2>
where
    C2: Clone + Send + Sync + 'static,
{
    MachineService { machine, map: None }
}

/// A child statechart whose context is computed from the parent's.
pub fn machine_with<C, C2, F>(machine: Machine<C2>, map: F) -> MachineService<C, C2>
where
    C2: Clone + Send + Sync + 'static,
    F: Fn(&C, &Event) -> C2 + Send + Sync + 'static,
{
    MachineService {
        machine,
        map: Some(Arc::new(map)),
    }
}

impl<C, C2> ServiceLogic<C> for MachineService<C, C2>
where
    C2: Clone + Send + Sync + 'static,
{
    fn start(&self, request: ServiceRequest<'_, C>) -> Result<Box<dyn Actor>, ActionError> {
        let machine = match &self.map {
            Some(map) => self.machine.with_context(map(request.context, request.event)),
            None => self.machine.clone(),
        };
        let mut child = Interpreter::spawned(machine, request.id, request.sender, request.clock);
        child.start();
        Ok(Box::new(child))
    }
}
