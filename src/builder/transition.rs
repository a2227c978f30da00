//! Builder for transitions.

use crate::core::ActionDescriptor;

/// Guard as written in a definition, before state references are resolved.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) enum GuardSpec {
    Named(String),
    InState(String),
}

/// Fluent builder for a single transition.
///
/// Targets are strings resolved when the tree is built: `#id` names a state
/// by id, `.child.path` is relative to the source state, anything else is a
/// sibling path relative to the source's parent. A `&str` converts into a
/// plain transition to that target.
///
/// # Example
///
/// ```rust
/// use harel::builder::{StateBuilder, TransitionBuilder};
/// use harel::core::ActionDescriptor;
///
/// let tree = StateBuilder::new()
///     .initial("idle")
///     .state(
///         "idle",
///         StateBuilder::new().on(
///             "SUBMIT",
///             TransitionBuilder::to("saving")
///                 .guard("form_valid")
///                 .action(ActionDescriptor::log("submitting")),
///         ),
///     )
///     .state("saving", StateBuilder::new())
///     .build("form")
///     .unwrap();
///
/// let idle = tree.get("form.idle").unwrap();
/// assert_eq!(idle.transitions().len(), 1);
/// ```
#[derive(Clone, Debug, Default, PartialEq)]
pub struct TransitionBuilder {
    pub(crate) targets: Vec<String>,
    pub(crate) guard: Option<GuardSpec>,
    pub(crate) actions: Vec<ActionDescriptor>,
    /// Explicit choice; `None` falls back to the `.child` rule
    pub(crate) internal: Option<bool>,
}

impl TransitionBuilder {
    /// Transition to a single target.
    pub fn to(target: impl Into<String>) -> Self {
        Self {
            targets: vec![target.into()],
            ..Self::default()
        }
    }

    /// Transition to several targets in different parallel regions.
    pub fn to_all<I, S>(targets: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            targets: targets.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    /// Transition that runs its actions without leaving the source.
    pub fn targetless() -> Self {
        Self::default()
    }

    /// Require a registry guard to pass.
    pub fn guard(mut self, name: impl Into<String>) -> Self {
        self.guard = Some(GuardSpec::Named(name.into()));
        self
    }

    /// Require a state (by id, with or without a leading `#`) to be active.
    pub fn in_state(mut self, id: impl Into<String>) -> Self {
        self.guard = Some(GuardSpec::InState(id.into()));
        self
    }

    pub fn action(mut self, action: impl Into<ActionDescriptor>) -> Self {
        self.actions.push(action.into());
        self
    }

    /// Do not exit a compound source when every target is its descendant.
    ///
    /// Targets written as `.child` are internal without calling this.
    pub fn internal(mut self) -> Self {
        self.internal = Some(true);
        self
    }

    /// Exit and re-enter the source even when every target is written as
    /// `.child`.
    pub fn external(mut self) -> Self {
        self.internal = Some(false);
        self
    }

    pub(crate) fn is_internal(&self) -> bool {
        self.internal
            .unwrap_or_else(|| !self.targets.is_empty() && self.targets.iter().all(|t| t.starts_with('.')))
    }
}

impl From<&str> for TransitionBuilder {
    fn from(target: &str) -> Self {
        Self::to(target)
    }
}

impl From<String> for TransitionBuilder {
    fn from(target: String) -> Self {
        Self::to(target)
    }
}
