//! Validation of machine definitions.
//!
//! Definitions are checked with Stillwater's `Validation` type so that a
//! broken definition reports *every* problem at once instead of failing on
//! the first one. Two passes exist:
//!
//! - [`check_structure`]: the tree on its own (node kinds, history states,
//!   multi-target transitions)
//! - [`check_references`]: the tree against a [`Registry`](crate::registry::Registry)
//!   (guards, actions, services and delays referenced by name)
//!
//! # Example
//!
//! ```rust
//! use harel::builder::{DefinitionProblem, StateBuilder, TransitionBuilder};
//! use harel::registry::Registry;
//! use harel::validation::{check_references, into_result};
//!
//! let tree = StateBuilder::new()
//!     .initial("idle")
//!     .state("idle", StateBuilder::new().on("GO", TransitionBuilder::to("busy").guard("ready").action("start")))
//!     .state("busy", StateBuilder::new())
//!     .build("job")
//!     .unwrap();
//!
//! let err = into_result(check_references(&tree, &Registry::<()>::new())).unwrap_err();
//! assert_eq!(err.problems().len(), 2);
//! assert!(err.problems().contains(&DefinitionProblem::UnknownGuard {
//!     node: "job.idle".into(),
//!     guard: "ready".into(),
//! }));
//! ```

mod references;
mod rules;

pub use references::check_references;
pub use rules::check_structure;

use crate::builder::{DefinitionError, DefinitionProblem};
use stillwater::validation::Validation;
use stillwater::NonEmptyVec;

/// Outcome of a definition check.
pub type DefinitionCheck = Validation<(), NonEmptyVec<DefinitionProblem>>;

/// Turn accumulated problems into a [`DefinitionError`].
pub fn into_result(check: DefinitionCheck) -> Result<(), DefinitionError> {
    match check {
        Validation::Success(()) => Ok(()),
        Validation::Failure(problems) => Err(DefinitionError::Invalid {
            problems: problems.iter().cloned().collect(),
        }),
    }
}

/// Combine checks, keeping every failure.
pub(crate) fn all(checks: Vec<DefinitionCheck>) -> DefinitionCheck {
    Validation::all_vec(checks).map(|_| ())
}
