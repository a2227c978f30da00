//! Interpreter mailboxes.
//!
//! Every event reaching an interpreter from outside the current macrostep
//! goes through its mailbox: external sends, sends to self, results of
//! services and events from child actors. The mailbox is FIFO and is drained
//! one macrostep per event.

use crate::core::{ActorId, Event};
use serde_json::Value;
use std::sync::mpsc::{self, Receiver, Sender};

/// An event plus the actor that produced it.
#[derive(Clone, Debug, PartialEq)]
pub struct Envelope {
    /// `None` for events that do not come from an owned actor
    pub origin: Option<ActorId>,
    pub event: Event,
}

/// Cloneable handle for posting events into an interpreter's mailbox.
///
/// Handles given to services carry the service's actor id, which lets the
/// interpreter drop events from actors it has already stopped.
#[derive(Clone, Debug)]
pub struct ActorSender {
    origin: Option<ActorId>,
    tx: Sender<Envelope>,
}

impl ActorSender {
    /// Post an event. Returns `false` when the receiving interpreter is gone.
    pub fn send(&self, event: impl Into<Event>) -> bool {
        self.tx
            .send(Envelope {
                origin: self.origin.clone(),
                event: event.into(),
            })
            .is_ok()
    }

    /// Report successful completion as `done.invoke.<id>`.
    pub fn resolve(&self, data: Value) -> bool {
        match &self.origin {
            Some(id) => self.send(Event::done_invoke(id.as_str(), data)),
            None => false,
        }
    }

    /// Report failure as `error.platform.<id>`.
    pub fn reject(&self, data: Value) -> bool {
        match &self.origin {
            Some(id) => self.send(Event::error_platform(id.as_str(), data)),
            None => false,
        }
    }

    /// Completion without data.
    pub fn complete(&self) -> bool {
        self.resolve(Value::Null)
    }

    pub fn origin(&self) -> Option<&ActorId> {
        self.origin.as_ref()
    }
}

pub(crate) struct Mailbox {
    tx: Sender<Envelope>,
    rx: Receiver<Envelope>,
}

impl Mailbox {
    pub(crate) fn new() -> Self {
        let (tx, rx) = mpsc::channel();
        Self { tx, rx }
    }

    pub(crate) fn sender(&self, origin: Option<ActorId>) -> ActorSender {
        ActorSender {
            origin,
            tx: self.tx.clone(),
        }
    }

    pub(crate) fn push(&self, event: Event) {
        // The receiver lives as long as `self`, so this cannot fail.
        let _ = self.tx.send(Envelope {
            origin: None,
            event,
        });
    }

    pub(crate) fn try_recv(&self) -> Option<Envelope> {
        self.rx.try_recv().ok()
    }
}
