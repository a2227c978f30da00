//! Builder API for statechart definitions.
//!
//! [`StateBuilder`] describes a tree of states, [`TransitionBuilder`] and
//! [`InvokeBuilder`] the transitions and services attached to them, and
//! [`MachineBuilder`] ties a definition to its context, registry and
//! interpreter configuration. Target strings and state references are
//! resolved once, when the tree is built; the runtime only ever sees
//! resolved node indices.

pub mod error;
pub mod invoke;
pub mod machine;
pub mod state;
pub mod transition;

pub use error::{DefinitionError, DefinitionProblem};
pub use invoke::InvokeBuilder;
pub use machine::MachineBuilder;
pub use state::StateBuilder;
pub use transition::TransitionBuilder;
