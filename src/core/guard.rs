//! Guard predicates for controlling transitions.
//!
//! Guards are pure boolean functions over context and event. They decide
//! whether a transition is enabled without side effects, and may fail with
//! a [`GuardError`] when they cannot decide.

use super::event::Event;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// Error raised by a fallible guard.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{message}")]
pub struct GuardError {
    pub message: String,
}

impl GuardError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

type Predicate<C> = dyn Fn(&C, &Event) -> Result<bool, GuardError> + Send + Sync;

/// Pure predicate that determines if a transition can be taken.
///
/// # Example
///
/// ```rust
/// use harel::core::{Event, Guard};
///
/// #[derive(Clone)]
/// struct Wallet {
///     balance: u32,
/// }
///
/// let can_pay = Guard::new(|w: &Wallet, event: &Event| {
///     event.data["amount"].as_u64().is_some_and(|amount| amount <= w.balance as u64)
/// });
///
/// let pay = Event::with_data("PAY", serde_json::json!({ "amount": 5 }));
/// assert!(can_pay.check(&Wallet { balance: 10 }, &pay).unwrap());
/// assert!(!can_pay.check(&Wallet { balance: 1 }, &pay).unwrap());
/// ```
pub struct Guard<C> {
    predicate: Arc<Predicate<C>>,
}

impl<C> Guard<C> {
    /// Create a guard from an infallible predicate.
    ///
    /// The predicate must be deterministic and side-effect free.
    pub fn new<F>(predicate: F) -> Self
    where
        F: Fn(&C, &Event) -> bool + Send + Sync + 'static,
    {
        Self {
            predicate: Arc::new(move |context, event| Ok(predicate(context, event))),
        }
    }

    /// Create a guard that may fail to evaluate.
    pub fn fallible<F>(predicate: F) -> Self
    where
        F: Fn(&C, &Event) -> Result<bool, GuardError> + Send + Sync + 'static,
    {
        Self {
            predicate: Arc::new(predicate),
        }
    }

    /// Evaluate the guard.
    pub fn check(&self, context: &C, event: &Event) -> Result<bool, GuardError> {
        (self.predicate)(context, event)
    }
}

impl<C> Clone for Guard<C> {
    fn clone(&self) -> Self {
        Self {
            predicate: Arc::clone(&self.predicate),
        }
    }
}

impl<C> fmt::Debug for Guard<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Guard").finish_non_exhaustive()
    }
}
