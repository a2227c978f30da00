//! The actor runtime.
//!
//! [`Interpreter`] executes what the pure core plans: it runs effects, owns
//! spawned actors, schedules delayed events on a [`Clock`] and feeds its
//! mailbox through the macrostep loop one event at a time.

mod actor;
#[allow(clippy::module_inception)]
mod interpreter;
mod mailbox;
mod scheduler;
mod scope;
mod service;

pub use actor::{Actor, ActorStatus};
pub use interpreter::{Interpreter, InterpreterStatus, Snapshot, SubscriptionId};
pub use mailbox::{ActorSender, Envelope};
pub use scheduler::{Clock, ManualClock, ScheduleKey, ScheduledEvent, Scheduler, SystemClock};
pub use scope::ActionScope;
#[cfg(feature = "tokio")]
pub use service::{future, FutureService};
pub use service::{
    callback, machine, machine_with, observable, promise, CallbackHandle, CallbackService,
    MachineService, ObservableService, PromiseService, ServiceLogic, ServiceRequest,
};
