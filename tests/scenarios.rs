//! End-to-end scenarios run through the interpreter.

use harel::builder::{InvokeBuilder, MachineBuilder, StateBuilder, TransitionBuilder};
use harel::checkpoint::Checkpoint;
use harel::config::{ErrorPolicy, GuardErrorPolicy, InterpreterConfig};
use harel::core::{ActionDescriptor, ActionError, ActorId, Event, GuardError, HistoryKind};
use harel::interpreter::{self, ActorStatus, CallbackHandle, InterpreterStatus, ManualClock};
use harel::registry::Registry;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

type Log = Arc<Mutex<Vec<String>>>;

/// A registry whose effects append their own name to a shared log.
fn recording<C: 'static>(names: &[&'static str]) -> (Registry<C>, Log) {
    let log: Log = Arc::default();
    let mut registry = Registry::new();
    for &name in names {
        let sink = Arc::clone(&log);
        registry = registry.action(name, move |_| {
            sink.lock().unwrap().push(name.to_string());
            Ok(())
        });
    }
    (registry, log)
}

fn take(log: &Log) -> Vec<String> {
    std::mem::take(&mut *log.lock().unwrap())
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
struct Job {
    name: Option<String>,
}

#[test]
fn start_then_stop_returns_to_idle_with_initial_context() {
    let machine = MachineBuilder::new("job")
        .definition(
            StateBuilder::new()
                .initial("idle")
                .state("idle", StateBuilder::new().on("START", TransitionBuilder::to("running").action("claim")))
                .state("running", StateBuilder::new().on("STOP", TransitionBuilder::to("idle").action("release"))),
        )
        .context(Job::default())
        .assign("claim", |_: &Job, _: &Event| Job { name: Some("backup".into()) })
        .assign("release", |_: &Job, _: &Event| Job::default())
        .build()
        .unwrap();
    let mut job = machine.interpret();
    job.start();

    job.send("START");
    assert!(job.snapshot().matches("running"));
    assert_eq!(job.context().name.as_deref(), Some("backup"));

    job.send("STOP");
    let snapshot = job.snapshot();
    assert!(snapshot.matches("idle"));
    assert_eq!(snapshot.context, *machine.context());
}

#[test]
fn parallel_region_is_untouched_by_sibling_transition() {
    let (registry, log) = recording::<()>(&["enter_detail", "exit_detail", "enter_online"]);
    let machine = MachineBuilder::new("app")
        .definition(
            StateBuilder::new()
                .initial("main")
                .state(
                    "main",
                    StateBuilder::parallel()
                        .state(
                            "network",
                            StateBuilder::new()
                                .initial("offline")
                                .state("offline", StateBuilder::new().on("CONNECT", "online"))
                                .state("online", StateBuilder::new().entry("enter_online")),
                        )
                        .state(
                            "ui",
                            StateBuilder::new()
                                .initial("list")
                                .state("list", StateBuilder::new().on("OPEN", "detail"))
                                .state("detail", StateBuilder::new().entry("enter_detail").exit("exit_detail")),
                        ),
                ),
        )
        .context(())
        .registry(registry)
        .build()
        .unwrap();
    let mut app = machine.interpret();
    app.start();
    app.send("OPEN");
    take(&log);

    app.send("CONNECT");

    let snapshot = app.snapshot();
    assert!(snapshot.matches("main.network.online"));
    assert!(snapshot.matches("main.ui.detail"));
    assert_eq!(take(&log), vec!["enter_online"]);
}

fn request_machine() -> harel::Machine<()> {
    MachineBuilder::new("request")
        .definition(
            StateBuilder::new()
                .initial("waiting")
                .state(
                    "waiting",
                    StateBuilder::new()
                        .after(Duration::from_millis(1000), "timed_out")
                        .on("RESPOND", "responded"),
                )
                .state("timed_out", StateBuilder::new())
                .state("responded", StateBuilder::new()),
        )
        .context(())
        .build()
        .unwrap()
}

#[test]
fn after_timer_never_fires_once_its_state_is_left() {
    let clock = ManualClock::new();
    let mut request = request_machine().interpret().with_clock(clock.clone());
    request.start();
    assert_eq!(request.scheduled().count(), 1);

    clock.advance(Duration::from_millis(999));
    request.poll();
    assert!(request.snapshot().matches("waiting"));

    request.send("RESPOND");
    assert_eq!(request.scheduled().count(), 0);
    clock.advance(Duration::from_millis(5000));
    request.poll();
    assert!(request.snapshot().matches("responded"));
}

#[test]
fn after_timer_fires_when_due() {
    let clock = ManualClock::new();
    let mut request = request_machine().interpret().with_clock(clock.clone());
    request.start();

    clock.advance(Duration::from_millis(1000));
    request.poll();

    assert!(request.snapshot().matches("timed_out"));
}

#[derive(Clone, Debug)]
struct Parent {
    counter: ActorId,
}

#[test]
fn spawned_counter_is_reachable_through_context_and_stops_with_parent() {
    let counter = MachineBuilder::new("counter")
        .definition(
            StateBuilder::new()
                .initial("active")
                .state("active", StateBuilder::new().on("INC", TransitionBuilder::targetless().action("inc"))),
        )
        .context(0u32)
        .assign("inc", |n: &u32, _: &Event| n + 1)
        .build()
        .unwrap();
    let parent = MachineBuilder::new("parent")
        .definition(
            StateBuilder::new().initial("running").state(
                "running",
                StateBuilder::new()
                    .entry(ActionDescriptor::spawn("counter", "counter-1"))
                    .on("INC", TransitionBuilder::targetless().action(ActionDescriptor::forward_to("counter-1"))),
            ),
        )
        .context(Parent {
            counter: ActorId::new("counter-1"),
        })
        .service("counter", interpreter::machine(counter))
        .build()
        .unwrap();
    let mut app = parent.interpret();
    app.start();

    for _ in 0..3 {
        app.send("INC");
    }

    let id = app.context().counter.clone();
    let child = app.child::<u32>(&id).unwrap();
    assert_eq!(child.context(), &3);
    assert_eq!(child.status(), InterpreterStatus::Running);

    app.stop();
    assert_eq!(app.actor(&id).unwrap().status(), ActorStatus::Stopped);
}

#[test]
fn descendant_transition_wins_and_ancestor_guard_is_not_evaluated() {
    let evaluations = Arc::new(AtomicUsize::new(0));
    let counted = Arc::clone(&evaluations);
    let machine = MachineBuilder::new("m")
        .definition(
            StateBuilder::new()
                .initial("p")
                .state(
                    "p",
                    StateBuilder::new()
                        .initial("c")
                        .on("X", TransitionBuilder::to("elsewhere").guard("ancestor_guard"))
                        .state("c", StateBuilder::new().on("X", "d"))
                        .state("d", StateBuilder::new()),
                )
                .state("elsewhere", StateBuilder::new()),
        )
        .context(())
        .guard("ancestor_guard", move |_: &(), _: &Event| {
            counted.fetch_add(1, Ordering::SeqCst);
            true
        })
        .build()
        .unwrap();
    let mut interpreter = machine.interpret();
    interpreter.start();

    interpreter.send("X");

    assert!(interpreter.snapshot().matches("p.d"));
    assert_eq!(evaluations.load(Ordering::SeqCst), 0);
}

#[test]
fn sibling_transition_runs_only_leaf_actions() {
    let (registry, log) = recording::<()>(&["enter_p", "exit_p", "exit_a", "enter_b"]);
    let machine = MachineBuilder::new("m")
        .definition(
            StateBuilder::new().initial("x").state(
                "x",
                StateBuilder::new().initial("p").state(
                    "p",
                    StateBuilder::new()
                        .initial("a")
                        .entry("enter_p")
                        .exit("exit_p")
                        .state("a", StateBuilder::new().exit("exit_a").on("GO", "b"))
                        .state("b", StateBuilder::new().entry("enter_b")),
                ),
            ),
        )
        .context(())
        .registry(registry)
        .build()
        .unwrap();
    let mut interpreter = machine.interpret();
    interpreter.start();
    assert_eq!(take(&log), vec!["enter_p"]);

    interpreter.send("GO");

    assert_eq!(take(&log), vec!["exit_a", "enter_b"]);
    assert!(interpreter.snapshot().matches("x.p.b"));
}

#[test]
fn deep_history_restores_the_exact_descendants() {
    let machine = MachineBuilder::new("player")
        .definition(
            StateBuilder::new()
                .initial("off")
                .state("off", StateBuilder::new().on("POWER", "on").on("RESUME", "#player.on.playback.hist"))
                .state(
                    "on",
                    StateBuilder::parallel()
                        .on("POWER", "off")
                        .state(
                            "playback",
                            StateBuilder::new()
                                .initial("stopped")
                                .state("hist", StateBuilder::history(HistoryKind::Deep))
                                .state("stopped", StateBuilder::new().on("PLAY", "playing"))
                                .state(
                                    "playing",
                                    StateBuilder::new()
                                        .initial("normal")
                                        .state("normal", StateBuilder::new().on("FF", "fast"))
                                        .state("fast", StateBuilder::new()),
                                ),
                        )
                        .state(
                            "volume",
                            StateBuilder::new()
                                .initial("low")
                                .state("low", StateBuilder::new().on("UP", "high"))
                                .state("high", StateBuilder::new()),
                        ),
                ),
        )
        .context(())
        .build()
        .unwrap();
    let mut player = machine.interpret();
    player.start();
    for event in ["POWER", "PLAY", "FF", "UP", "POWER"] {
        player.send(event);
    }
    assert!(player.snapshot().matches("off"));

    player.send("RESUME");

    let snapshot = player.snapshot();
    assert!(snapshot.matches("on.playback.playing.fast"));
    assert!(snapshot.matches("on.volume.low"));
}

#[test]
fn guard_errors_follow_the_configured_policy() {
    let build = |policy: GuardErrorPolicy| {
        MachineBuilder::new("m")
            .definition(
                StateBuilder::new()
                    .initial("a")
                    .state(
                        "a",
                        StateBuilder::new()
                            .on("CHECK", TransitionBuilder::to("b").guard("flaky"))
                            .on("CHECK", "c"),
                    )
                    .state("b", StateBuilder::new())
                    .state("c", StateBuilder::new()),
            )
            .context(())
            .fallible_guard("flaky", |_: &(), _: &Event| Err(GuardError::new("sensor offline")))
            .config(InterpreterConfig::default().guard_errors(policy))
            .build()
            .unwrap()
    };

    let mut lenient = build(GuardErrorPolicy::TreatAsFalse).interpret();
    lenient.start();
    lenient.send("CHECK");
    assert!(lenient.snapshot().matches("c"));
    assert_eq!(lenient.last_error().map(|e| e.error_code()), Some("GUARD_FAILED"));

    let mut strict = build(GuardErrorPolicy::Propagate).interpret();
    strict.start();
    strict.send("CHECK");
    assert!(strict.snapshot().matches("a"));
    assert_eq!(strict.status(), InterpreterStatus::Running);
    assert_eq!(strict.last_error().map(|e| e.error_code()), Some("GUARD_FAILED"));
}

fn loader(service: Registry<Job>) -> harel::Machine<Job> {
    MachineBuilder::new("loader")
        .definition(
            StateBuilder::new()
                .initial("loading")
                .state(
                    "loading",
                    StateBuilder::new().invoke(
                        InvokeBuilder::new("fetch")
                            .id("fetch")
                            .on_done(TransitionBuilder::to("ready").action("store"))
                            .on_error("failed"),
                    ),
                )
                .state("ready", StateBuilder::new())
                .state("failed", StateBuilder::new()),
        )
        .context(Job::default())
        .registry(service.assign("store", |_: &Job, event: &Event| Job {
            name: event.data["name"].as_str().map(str::to_string),
        }))
        .build()
        .unwrap()
}

#[test]
fn resolved_promise_takes_the_done_transition() {
    let machine = loader(Registry::new().service(
        "fetch",
        interpreter::promise(|_: &Job, _: &Event| Ok(json!({ "name": "Ada" }))),
    ));
    let mut interpreter = machine.interpret();
    interpreter.start();

    assert!(interpreter.snapshot().matches("ready"));
    assert_eq!(interpreter.context().name.as_deref(), Some("Ada"));
}

#[test]
fn rejected_promise_is_an_ordinary_event() {
    let machine = loader(Registry::new().service(
        "fetch",
        interpreter::promise(|_: &Job, _: &Event| Err(json!("not found"))),
    ));
    let mut interpreter = machine.interpret();
    interpreter.start();

    assert!(interpreter.snapshot().matches("failed"));
    assert!(interpreter.last_error().is_none());
    assert_eq!(interpreter.status(), InterpreterStatus::Running);
}

#[test]
fn failing_service_start_reports_error_platform() {
    let machine = loader(Registry::new().service(
        "fetch",
        interpreter::callback(|_: &Job, _| Err(ActionError::new("no socket"))),
    ));
    let mut interpreter = machine.interpret();
    interpreter.start();

    assert!(interpreter.snapshot().matches("failed"));
}

#[test]
fn callback_service_talks_both_ways_and_is_cancelled_on_exit() {
    let cancelled = Arc::new(AtomicUsize::new(0));
    let flag = Arc::clone(&cancelled);
    let machine = MachineBuilder::new("socket")
        .definition(
            StateBuilder::new()
                .initial("connected")
                .state(
                    "connected",
                    StateBuilder::new()
                        .invoke(InvokeBuilder::new("socket").id("socket"))
                        .on("PING", TransitionBuilder::targetless().action(ActionDescriptor::forward_to("socket")))
                        .on("PONG", "answered"),
                )
                .state("answered", StateBuilder::new()),
        )
        .context(())
        .service(
            "socket",
            interpreter::callback(move |_: &(), sender| {
                let flag = Arc::clone(&flag);
                Ok(CallbackHandle::new()
                    .on_receive(move |event| {
                        if event.name == "PING" {
                            sender.send("PONG");
                        }
                    })
                    .on_cancel(move || {
                        flag.fetch_add(1, Ordering::SeqCst);
                    }))
            }),
        )
        .build()
        .unwrap();
    let mut interpreter = machine.interpret();
    interpreter.start();

    interpreter.send("PING");

    assert!(interpreter.snapshot().matches("answered"));
    assert_eq!(cancelled.load(Ordering::SeqCst), 1);
    assert!(interpreter.actor(&ActorId::new("socket")).is_none());
}

#[test]
fn observable_items_arrive_before_completion() {
    let machine = MachineBuilder::new("feed")
        .definition(
            StateBuilder::new()
                .initial("reading")
                .state(
                    "reading",
                    StateBuilder::new()
                        .invoke(InvokeBuilder::new("feed").id("feed").on_done("complete"))
                        .on("ITEM", TransitionBuilder::targetless().action("count")),
                )
                .state("complete", StateBuilder::new()),
        )
        .context(0u32)
        .assign("count", |n: &u32, _: &Event| n + 1)
        .service(
            "feed",
            interpreter::observable(|_: &u32, _: &Event| (0..3).map(|i| Event::with_data("ITEM", json!(i)))),
        )
        .build()
        .unwrap();
    let mut interpreter = machine.interpret();
    interpreter.start();

    assert!(interpreter.snapshot().matches("complete"));
    assert_eq!(interpreter.context(), &3);
}

fn job_machine() -> harel::Machine<u32> {
    MachineBuilder::new("job")
        .definition(
            StateBuilder::new()
                .initial("working")
                .state(
                    "working",
                    StateBuilder::new()
                        .on("FINISH", "done")
                        .on("BREAK", TransitionBuilder::targetless().action("explode")),
                )
                .state("done", StateBuilder::final_state().data(json!({ "items": 7 }))),
        )
        .context(0u32)
        .action("explode", |_| Err(ActionError::new("disk full")))
        .config(InterpreterConfig::default().error_policy(ErrorPolicy::Fatal))
        .build()
        .unwrap()
}

fn supervisor() -> harel::Machine<Option<u64>> {
    MachineBuilder::new("supervisor")
        .definition(
            StateBuilder::new()
                .initial("supervising")
                .state(
                    "supervising",
                    StateBuilder::new().invoke(
                        InvokeBuilder::new("job")
                            .id("job")
                            .auto_forward()
                            .on_done(TransitionBuilder::to("finished").action("record"))
                            .on_error("crashed"),
                    ),
                )
                .state("finished", StateBuilder::new())
                .state("crashed", StateBuilder::new()),
        )
        .context(None)
        .assign("record", |_: &Option<u64>, event: &Event| event.data["items"].as_u64())
        .service("job", interpreter::machine(job_machine()))
        .build()
        .unwrap()
}

#[test]
fn child_machine_completion_reaches_the_parent() {
    let mut interpreter = supervisor().interpret();
    interpreter.start();

    interpreter.send("FINISH");

    assert!(interpreter.snapshot().matches("finished"));
    assert_eq!(interpreter.context(), &Some(7));
}

#[test]
fn fatal_child_failure_reaches_the_parent() {
    let mut interpreter = supervisor().interpret();
    interpreter.start();

    interpreter.send("BREAK");

    assert!(interpreter.snapshot().matches("crashed"));
    assert!(!interpreter.is_failed());
}

#[test]
fn checkpoint_restore_skips_entry_actions_and_restarts_timers() {
    let starts = Arc::new(AtomicUsize::new(0));
    let started = Arc::clone(&starts);
    let (registry, log) = recording::<Job>(&["announce"]);
    let machine = MachineBuilder::new("upload")
        .definition(
            StateBuilder::new()
                .initial("editing")
                .state("editing", StateBuilder::new().on("SUBMIT", TransitionBuilder::to("waiting").action("name")))
                .state(
                    "waiting",
                    StateBuilder::new()
                        .entry("announce")
                        .invoke(InvokeBuilder::new("progress"))
                        .after(Duration::from_millis(1000), "expired"),
                )
                .state("expired", StateBuilder::new()),
        )
        .context(Job::default())
        .registry(
            registry
                .assign("name", |_: &Job, _: &Event| Job { name: Some("report.pdf".into()) })
                .service(
                    "progress",
                    interpreter::callback(move |_: &Job, _| {
                        started.fetch_add(1, Ordering::SeqCst);
                        Ok(CallbackHandle::new())
                    }),
                ),
        )
        .build()
        .unwrap();

    let mut original = machine.interpret();
    original.start();
    original.send("SUBMIT");
    let json = original.checkpoint().to_json().unwrap();
    original.stop();
    assert_eq!(take(&log), vec!["announce"]);

    let clock = ManualClock::new();
    let mut restored = machine.interpret().with_clock(clock.clone());
    restored.restore(Checkpoint::from_json(&json).unwrap()).unwrap();

    assert!(restored.snapshot().matches("waiting"));
    assert_eq!(restored.context().name.as_deref(), Some("report.pdf"));
    assert!(take(&log).is_empty());
    assert_eq!(starts.load(Ordering::SeqCst), 2);

    clock.advance(Duration::from_millis(1000));
    restored.poll();
    assert!(restored.snapshot().matches("expired"));
}

#[test]
fn future_service_without_runtime_fails_immediately() {
    let machine = loader(Registry::new().service(
        "fetch",
        interpreter::future(|_: &Job, _: &Event| async { Ok::<_, serde_json::Value>(json!({ "name": "never" })) }),
    ));
    let mut interpreter = machine.interpret();
    interpreter.start();

    assert!(interpreter.snapshot().matches("failed"));
}

#[tokio::test]
async fn future_service_resolves_on_the_runtime() {
    let machine = loader(Registry::new().service(
        "fetch",
        interpreter::future(|_: &Job, _: &Event| async {
            tokio::time::sleep(Duration::from_millis(5)).await;
            Ok::<_, serde_json::Value>(json!({ "name": "Grace" }))
        }),
    ));
    let mut interpreter = machine.interpret();
    interpreter.start();
    assert!(interpreter.snapshot().matches("loading"));

    for _ in 0..200 {
        if interpreter.snapshot().matches("ready") {
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
        interpreter.poll();
    }

    assert!(interpreter.snapshot().matches("ready"));
    assert_eq!(interpreter.context().name.as_deref(), Some("Grace"));
}

#[test]
fn parallel_completion_runs_its_done_handler_once() {
    let machine = MachineBuilder::new("m")
        .definition(
            StateBuilder::new()
                .initial("idle")
                .state("idle", StateBuilder::new().on("GO", "both"))
                .state(
                    "both",
                    StateBuilder::parallel()
                        .on_done(TransitionBuilder::targetless().action("count"))
                        .state("h", StateBuilder::history(HistoryKind::Shallow))
                        .state("one", StateBuilder::new().initial("z").state("z", StateBuilder::final_state()))
                        .state("two", StateBuilder::new().initial("z").state("z", StateBuilder::final_state())),
                ),
        )
        .context(0u32)
        .assign("count", |n: &u32, _: &Event| n + 1)
        .build()
        .unwrap();
    let mut interpreter = machine.interpret();
    interpreter.start();

    interpreter.send("GO");

    assert_eq!(interpreter.context(), &1);
}
