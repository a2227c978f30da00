//! The macrostep loop.
//!
//! A macrostep processes one trigger to quiescence: the first microstep
//! handles the trigger itself, then eventless transitions are taken until
//! none is enabled, then the next internal event (a `raise` or a completion
//! event) is dequeued, and so on until both are exhausted or the machine is
//! done.

use super::configuration::Configuration;
use super::error::ExecutionError;
use super::event::Event;
use super::history::HistoryValue;
use super::microstep::{enter_initial, step, MicrostepResult};
use super::selector::select_transitions;
use super::tree::StateTree;
use crate::config::InterpreterConfig;
use crate::registry::Registry;
use serde_json::Value;
use std::collections::VecDeque;

/// The mutable part of a running machine.
#[derive(Clone, Debug, PartialEq)]
pub struct MachineState<C> {
    pub configuration: Configuration,
    pub context: C,
    pub history: HistoryValue,
    /// The root reached a final state
    pub done: bool,
    pub done_data: Option<Value>,
}

impl<C> MachineState<C> {
    /// A state that has not entered any node yet.
    pub fn unstarted(context: C) -> Self {
        Self {
            configuration: Configuration::new(),
            context,
            history: HistoryValue::new(),
            done: false,
            done_data: None,
        }
    }
}

/// What starts a macrostep.
#[derive(Clone, Copy, Debug)]
pub enum Trigger<'e> {
    /// Enter the initial configuration
    Start,
    Event(&'e Event),
}

/// Summary of one macrostep.
#[derive(Debug, Default)]
pub struct MacrostepReport {
    /// Committed microsteps
    pub microsteps: usize,
    /// Guard failures treated as "not enabled"
    pub guard_errors: Vec<ExecutionError>,
    /// Error that ended the macrostep early
    pub error: Option<ExecutionError>,
    /// Last event a microstep was taken for
    pub last_event: Option<Event>,
}

impl MacrostepReport {
    /// Whether at least one transition was taken.
    pub fn changed(&self) -> bool {
        self.microsteps > 0
    }
}

/// Run one macrostep against `state`.
///
/// `commit` sees every microstep before it is applied. Returning an error
/// abandons that microstep: the configuration keeps its previous value while
/// the microstep's context assignments stay applied, and the macrostep
/// ends with the error recorded in the report.
pub fn run_macrostep<C, F>(
    tree: &StateTree,
    registry: &Registry<C>,
    config: &InterpreterConfig,
    state: &mut MachineState<C>,
    trigger: Trigger<'_>,
    mut commit: F,
) -> MacrostepReport
where
    C: Clone,
    F: FnMut(&MicrostepResult<C>, &Event) -> Result<(), ExecutionError>,
{
    let mut report = MacrostepReport::default();
    let mut internal: VecDeque<Event> = VecDeque::new();

    let mut current = match trigger {
        Trigger::Start => Event::init(),
        Trigger::Event(event) => event.clone(),
    };

    let first = match trigger {
        Trigger::Start => enter_initial(tree, registry, &state.context, &state.history, &current),
        Trigger::Event(_) => {
            match select(tree, registry, config, state, &current, false, &mut report) {
                Ok(Some(result)) => Ok(result),
                Ok(None) => {
                    tracing::debug!(event = %current, "no enabled transition");
                    return report;
                }
                Err(err) => Err(err),
            }
        }
    };
    if !apply(first, state, &current, &mut internal, &mut report, &mut commit) {
        return report;
    }

    while !state.done {
        if report.microsteps >= config.max_microsteps {
            report.error = Some(ExecutionError::MicrostepLimit {
                limit: config.max_microsteps,
                event: current.name.clone(),
            });
            return report;
        }

        let result = match select(tree, registry, config, state, &current, true, &mut report) {
            Ok(Some(result)) => Ok(result),
            Ok(None) => {
                let Some(next) = internal.pop_front() else {
                    break;
                };
                current = next;
                match select(tree, registry, config, state, &current, false, &mut report) {
                    Ok(Some(result)) => Ok(result),
                    Ok(None) => continue,
                    Err(err) => Err(err),
                }
            }
            Err(err) => Err(err),
        };
        if !apply(result, state, &current, &mut internal, &mut report, &mut commit) {
            return report;
        }
    }

    report
}

/// Select for `event` and compute the microstep, `None` when nothing is enabled.
fn select<C: Clone>(
    tree: &StateTree,
    registry: &Registry<C>,
    config: &InterpreterConfig,
    state: &MachineState<C>,
    event: &Event,
    eventless: bool,
    report: &mut MacrostepReport,
) -> Result<Option<MicrostepResult<C>>, ExecutionError> {
    let selection = select_transitions(
        tree,
        registry,
        config.guard_errors,
        &state.configuration,
        &state.context,
        event,
        eventless,
    )?;
    report.guard_errors.extend(selection.guard_errors);
    if selection.transitions.is_empty() {
        return Ok(None);
    }
    step(
        tree,
        registry,
        &state.configuration,
        &state.context,
        &state.history,
        event,
        &selection.transitions,
    )
    .map(Some)
}

/// Commit a computed microstep; returns whether the macrostep may continue.
fn apply<C, F>(
    result: Result<MicrostepResult<C>, ExecutionError>,
    state: &mut MachineState<C>,
    event: &Event,
    internal: &mut VecDeque<Event>,
    report: &mut MacrostepReport,
    commit: &mut F,
) -> bool
where
    F: FnMut(&MicrostepResult<C>, &Event) -> Result<(), ExecutionError>,
{
    let result = match result {
        Ok(result) => result,
        Err(err) => {
            report.error = Some(err);
            return false;
        }
    };

    if let Err(err) = commit(&result, event) {
        state.context = result.context;
        report.error = Some(err);
        return false;
    }

    tracing::debug!(
        event = %event,
        exited = result.exited.len(),
        entered = result.entered.len(),
        "microstep committed"
    );
    state.configuration = result.configuration;
    state.context = result.context;
    state.history = result.history;
    if result.done {
        state.done = true;
        state.done_data = result.done_data;
    }
    internal.extend(result.raised_events);
    report.microsteps += 1;
    report.last_event = Some(event.clone());
    true
}
