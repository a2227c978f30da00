//! Core statechart types and algorithms.
//!
//! This module contains the pure part of the interpreter:
//! - The immutable definition tree and its nodes
//! - The configuration resolver and history values
//! - Transition selection, the microstep engine and the macrostep loop
//!
//! Nothing in this module performs side effects. Assignments produce new
//! contexts and every other action is returned as a [`PlannedAction`] for
//! the imperative shell in [`crate::interpreter`] to execute.

mod action;
mod configuration;
mod error;
mod event;
mod guard;
mod history;
mod macrostep;
mod microstep;
mod node;
mod selector;
mod transition;
mod tree;
mod value;

pub use action::{ActionDescriptor, ActorId, DelaySpec, SendAction, SendTarget};
pub use configuration::{resolve, Configuration, UnknownNode};
pub use error::{ActionError, ExecutionError};
pub use event::{Event, EventDescriptor, INIT_EVENT};
pub use guard::{Guard, GuardError};
pub use history::HistoryValue;
pub use macrostep::{run_macrostep, MachineState, MacrostepReport, Trigger};
pub use microstep::{
    enter_initial, exit_all, exit_set, resume, step, transition_domain, MicrostepResult,
    PlannedAction,
};
pub use node::{HistoryKind, NodeId, NodeIndex, NodeKind, StateNode};
pub use selector::{select_transitions, Selection};
pub use transition::{GuardDescriptor, InvokeDef, TransitionDef};
pub use tree::{Ancestors, StateTree};
pub use value::StateValue;
