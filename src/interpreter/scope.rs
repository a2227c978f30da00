//! What an effect can see and do.

use super::mailbox::ActorSender;
use crate::core::Event;

/// Arguments of a registry effect.
///
/// Effects see the context after every assignment of the microstep that
/// planned them. They cannot change it; anything they want the machine to
/// react to must be sent as an event, which is processed after the current
/// macrostep.
pub struct ActionScope<'a, C> {
    pub(crate) context: &'a C,
    pub(crate) event: &'a Event,
    pub(crate) sender: &'a ActorSender,
    pub(crate) parent: Option<&'a ActorSender>,
}

impl<'a, C> ActionScope<'a, C> {
    pub fn context(&self) -> &'a C {
        self.context
    }

    /// The event being processed.
    pub fn event(&self) -> &'a Event {
        self.event
    }

    /// Queue an event for this machine.
    pub fn send_self(&self, event: impl Into<Event>) {
        self.sender.send(event);
    }

    /// Send an event to the machine that owns this one.
    ///
    /// Returns `false` for a top-level machine.
    pub fn send_parent(&self, event: impl Into<Event>) -> bool {
        self.parent.is_some_and(|parent| parent.send(event))
    }

    /// A handle that outlives the effect, e.g. for work finished later.
    pub fn sender(&self) -> ActorSender {
        self.sender.clone()
    }
}
