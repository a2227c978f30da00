//! Definition errors reported by the builders.

use std::fmt;
use thiserror::Error;

/// One thing wrong with a machine definition.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DefinitionProblem {
    #[error("state id '{id}' is used more than once")]
    DuplicateId { id: String },

    #[error("compound state '{node}' has no initial state. Call .initial(key)")]
    MissingInitial { node: String },

    #[error("initial state '{initial}' of '{node}' is not a child state")]
    InvalidInitial { node: String, initial: String },

    #[error("parallel state '{node}' has no regions")]
    EmptyParallel { node: String },

    #[error("final state '{node}' cannot have children")]
    FinalWithChildren { node: String },

    #[error("final state '{node}' cannot be a region of a parallel state")]
    FinalInParallel { node: String },

    #[error("history state '{node}' cannot have children")]
    HistoryWithChildren { node: String },

    #[error("history state '{node}' needs a parent state")]
    HistoryAtRoot { node: String },

    #[error("default target '{target}' of history state '{node}' is outside its parent")]
    InvalidHistoryTarget { node: String, target: String },

    #[error("target '{target}' of a transition on '{node}' does not resolve to a state")]
    UnresolvedTarget { node: String, target: String },

    #[error("in-state reference '{reference}' on '{node}' does not resolve to a state")]
    UnresolvedStateReference { node: String, reference: String },

    #[error("transition on '{event}' from '{node}' targets states that cannot be active together")]
    ConflictingTargets { node: String, event: String },

    #[error("guard '{guard}' used by '{node}' is not registered")]
    UnknownGuard { node: String, guard: String },

    #[error("action '{action}' used by '{node}' is not registered")]
    UnknownAction { node: String, action: String },

    #[error("service '{service}' used by '{node}' is not registered")]
    UnknownService { node: String, service: String },

    #[error("delay '{delay}' used by '{node}' is not registered")]
    UnknownDelay { node: String, delay: String },

    #[error("no state definition given. Call .definition(state)")]
    MissingDefinition,

    #[error("no initial context given. Call .context(value)")]
    MissingContext,
}

/// A machine definition that cannot be built, with every problem found.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DefinitionError {
    #[error("invalid machine definition: {}", ProblemList(.problems))]
    Invalid { problems: Vec<DefinitionProblem> },
}

impl DefinitionError {
    pub fn problems(&self) -> &[DefinitionProblem] {
        match self {
            DefinitionError::Invalid { problems } => problems,
        }
    }
}

impl From<DefinitionProblem> for DefinitionError {
    fn from(problem: DefinitionProblem) -> Self {
        DefinitionError::Invalid {
            problems: vec![problem],
        }
    }
}

struct ProblemList<'a>(&'a [DefinitionProblem]);

impl fmt::Display for ProblemList<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, problem) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str("; ")?;
            }
            write!(f, "{problem}")?;
        }
        Ok(())
    }
}
