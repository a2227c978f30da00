//! Actors and the arena that owns them.

use crate::core::{ActorId, Event};
use std::any::Any;
use std::fmt;

/// Lifecycle of an actor.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ActorStatus {
    Starting,
    Running,
    Stopped,
}

/// A unit of execution with its own lifecycle, owned by an interpreter.
///
/// Machine-backed actors are child [`Interpreter`](super::Interpreter)s;
/// service adapters implement this trait for callbacks, promises,
/// observables and futures. Results flow back to the owner through the
/// [`ActorSender`](super::ActorSender) the actor was started with.
pub trait Actor: Send {
    fn id(&self) -> &ActorId;

    /// Deliver an event. Actors that do not accept events ignore it.
    fn send(&mut self, event: Event);

    /// Stop the actor. Must be idempotent.
    fn stop(&mut self);

    fn status(&self) -> ActorStatus;

    /// Give the actor a chance to deliver due work, e.g. delayed events.
    fn poll(&mut self) {}

    fn as_any(&self) -> &dyn Any;
}

pub(crate) struct ActorEntry {
    pub(crate) actor: Box<dyn Actor>,
    pub(crate) auto_forward: bool,
}

/// Actors owned by one interpreter, in spawn order.
#[derive(Default)]
pub(crate) struct ActorArena {
    entries: Vec<ActorEntry>,
}

impl ActorArena {
    /// Insert an actor, stopping any previous actor with the same id.
    pub(crate) fn insert(&mut self, entry: ActorEntry) {
        if let Some(mut previous) = self.remove(entry.actor.id()) {
            previous.actor.stop();
        }
        self.entries.push(entry);
    }

    pub(crate) fn remove(&mut self, id: &ActorId) -> Option<ActorEntry> {
        let position = self.entries.iter().position(|e| e.actor.id() == id)?;
        Some(self.entries.remove(position))
    }

    pub(crate) fn contains(&self, id: &ActorId) -> bool {
        self.entries.iter().any(|e| e.actor.id() == id)
    }

    pub(crate) fn get(&self, id: &ActorId) -> Option<&dyn Actor> {
        self.entries
            .iter()
            .find(|e| e.actor.id() == id)
            .map(|e| e.actor.as_ref())
    }

    pub(crate) fn get_mut(&mut self, id: &ActorId) -> Option<&mut (dyn Actor + 'static)> {
        self.entries
            .iter_mut()
            .find(|e| e.actor.id() == id)
            .map(|e| e.actor.as_mut())
    }

    pub(crate) fn iter_mut(&mut self) -> impl Iterator<Item = &mut ActorEntry> {
        self.entries.iter_mut()
    }

    pub(crate) fn ids(&self) -> Vec<ActorId> {
        self.entries.iter().map(|e| e.actor.id().clone()).collect()
    }

    /// Stop every actor but keep them for inspection.
    pub(crate) fn stop_all(&mut self) {
        for entry in &mut self.entries {
            entry.actor.stop();
        }
    }
}

impl fmt::Debug for ActorArena {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.entries.iter().map(|e| (e.actor.id(), e.actor.status())))
            .finish()
    }
}
