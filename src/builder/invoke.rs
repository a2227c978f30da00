//! Builder for invoked services.

use super::transition::TransitionBuilder;

/// A service started when its state is entered and stopped when it is exited.
///
/// `on_done` and `on_error` become transitions on `done.invoke.<id>` and
/// `error.platform.<id>`. Without an explicit id the invocation is named
/// `<state id>:invocation[<n>]`.
///
/// # Example
///
/// ```rust
/// use harel::builder::{InvokeBuilder, StateBuilder};
///
/// let tree = StateBuilder::new()
///     .initial("loading")
///     .state(
///         "loading",
///         StateBuilder::new().invoke(
///             InvokeBuilder::new("fetch_user")
///                 .id("fetcher")
///                 .on_done("ready")
///                 .on_error("failed"),
///         ),
///     )
///     .state("ready", StateBuilder::new())
///     .state("failed", StateBuilder::new())
///     .build("profile")
///     .unwrap();
///
/// let loading = tree.get("profile.loading").unwrap();
/// assert_eq!(loading.invocations()[0].id.as_str(), "fetcher");
/// assert_eq!(loading.transitions().len(), 2);
/// ```
#[derive(Clone, Debug, PartialEq)]
pub struct InvokeBuilder {
    pub(crate) service: String,
    pub(crate) id: Option<String>,
    pub(crate) on_done: Option<TransitionBuilder>,
    pub(crate) on_error: Option<TransitionBuilder>,
    pub(crate) auto_forward: bool,
}

impl InvokeBuilder {
    /// Invoke the registry service `service`.
    pub fn new(service: impl Into<String>) -> Self {
        Self {
            service: service.into(),
            id: None,
            on_done: None,
            on_error: None,
            auto_forward: false,
        }
    }

    pub fn id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn on_done(mut self, transition: impl Into<TransitionBuilder>) -> Self {
        self.on_done = Some(transition.into());
        self
    }

    pub fn on_error(mut self, transition: impl Into<TransitionBuilder>) -> Self {
        self.on_error = Some(transition.into());
        self
    }

    /// Forward every external event the machine receives to this actor.
    pub fn auto_forward(mut self) -> Self {
        self.auto_forward = true;
        self
    }
}
