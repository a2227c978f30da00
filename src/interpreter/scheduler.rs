//! Clocks and the delayed-event scheduler.

use crate::core::{Event, NodeIndex, SendTarget};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Monotonic time source for delayed events.
pub trait Clock: Send + Sync {
    /// Time elapsed since an arbitrary, fixed origin.
    fn now(&self) -> Duration;
}

/// Wall-clock time measured from the moment the clock was created.
#[derive(Clone, Copy, Debug)]
pub struct SystemClock {
    origin: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now(&self) -> Duration {
        self.origin.elapsed()
    }
}

/// A clock that only moves when told to.
///
/// Clones share the same time, so a test can keep one handle and give the
/// other to an interpreter.
///
/// ```rust
/// use harel::interpreter::{Clock, ManualClock};
/// use std::time::Duration;
///
/// let clock = ManualClock::new();
/// let shared = clock.clone();
/// clock.advance(Duration::from_millis(250));
/// assert_eq!(shared.now(), Duration::from_millis(250));
/// ```
#[derive(Clone, Debug, Default)]
pub struct ManualClock {
    nanos: Arc<AtomicU64>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Move the clock forward. Saturates instead of wrapping.
    pub fn advance(&self, by: Duration) {
        let by = nanos(by);
        // fetch_update only fails when the closure returns None
        let _ = self
            .nanos
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |now| Some(now.saturating_add(by)));
    }

    pub fn set(&self, to: Duration) {
        self.nanos.store(nanos(to), Ordering::SeqCst);
    }
}

fn nanos(duration: Duration) -> u64 {
    u64::try_from(duration.as_nanos()).unwrap_or(u64::MAX)
}

impl Clock for ManualClock {
    fn now(&self) -> Duration {
        Duration::from_nanos(self.nanos.load(Ordering::SeqCst))
    }
}

/// Cancellation key of a delayed event.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ScheduleKey {
    /// Node whose exit cancels the event
    pub owner: NodeIndex,
    /// Send id, if the action named one
    pub id: Option<String>,
}

/// An event waiting for its deadline.
#[derive(Clone, Debug, PartialEq)]
pub struct ScheduledEvent {
    pub event: Event,
    pub target: SendTarget,
    pub key: ScheduleKey,
    pub deadline: Duration,
}

/// Delayed events ordered by deadline, ties in scheduling order.
#[derive(Default)]
pub struct Scheduler {
    queue: BTreeMap<(Duration, u64), ScheduledEvent>,
    seq: u64,
}

impl Scheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Schedule an event. An earlier event with the same owner and id is
    /// replaced.
    pub fn schedule(&mut self, scheduled: ScheduledEvent) {
        if scheduled.key.id.is_some() {
            let key = scheduled.key.clone();
            self.queue.retain(|_, pending| pending.key != key);
        }
        self.seq += 1;
        self.queue.insert((scheduled.deadline, self.seq), scheduled);
    }

    /// Cancel every event sent with `id`. Returns how many were removed.
    pub fn cancel_id(&mut self, id: &str) -> usize {
        self.cancel_where(|pending| pending.key.id.as_deref() == Some(id))
    }

    /// Cancel every event owned by `owner`.
    pub fn cancel_owner(&mut self, owner: NodeIndex) -> usize {
        self.cancel_where(|pending| pending.key.owner == owner)
    }

    pub fn cancel_all(&mut self) -> usize {
        let removed = self.queue.len();
        self.queue.clear();
        removed
    }

    fn cancel_where(&mut self, matches: impl Fn(&ScheduledEvent) -> bool) -> usize {
        let before = self.queue.len();
        self.queue.retain(|_, pending| !matches(pending));
        before - self.queue.len()
    }

    /// Remove and return the earliest event due at `now`.
    pub fn pop_due(&mut self, now: Duration) -> Option<ScheduledEvent> {
        let entry = self.queue.first_entry()?;
        if entry.get().deadline > now {
            return None;
        }
        Some(entry.remove())
    }

    pub fn next_deadline(&self) -> Option<Duration> {
        self.queue.values().next().map(|pending| pending.deadline)
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ScheduledEvent> {
        self.queue.values()
    }
}

impl fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.queue.values()).finish()
    }
}
