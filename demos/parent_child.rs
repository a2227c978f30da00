//! Parent and Child Actors
//!
//! A download manager invokes a child machine per file. The child reports
//! progress to its parent and completes with a summary.
//!
//! Key concepts:
//! - Invoking a machine as a child actor
//! - Reporting to the parent with `SendAction::to_parent`
//! - `done.invoke` data flowing back through `on_done`
//! - Checkpointing the parent
//!
//! Run with: cargo run --example parent_child

use harel::builder::{InvokeBuilder, MachineBuilder, StateBuilder, TransitionBuilder};
use harel::core::{Event, SendAction};
use harel::interpreter;
use serde::{Deserialize, Serialize};
use serde_json::json;

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
struct Manager {
    progress_events: u32,
    bytes: u64,
}

fn main() {
    println!("=== Parent and Child Actors ===\n");

    let download = MachineBuilder::new("download")
        .definition(
            StateBuilder::new()
                .initial("fetching")
                .state(
                    "fetching",
                    StateBuilder::new().on(
                        "CHUNK",
                        TransitionBuilder::targetless()
                            .action("receive")
                            .action(SendAction::new("PROGRESS").to_parent()),
                    ),
                )
                .state("complete", StateBuilder::final_state().data(json!({ "bytes": 3072 })))
                .on("EOF", "complete"),
        )
        .context(0u64)
        .assign("receive", |n: &u64, _: &Event| n + 1024)
        .build()
        .unwrap();

    let manager = MachineBuilder::new("manager")
        .definition(
            StateBuilder::new()
                .initial("downloading")
                .state(
                    "downloading",
                    StateBuilder::new()
                        .invoke(
                            InvokeBuilder::new("download")
                                .id("file-1")
                                .auto_forward()
                                .on_done(TransitionBuilder::to("idle").action("record")),
                        )
                        .on("PROGRESS", TransitionBuilder::targetless().action("tick")),
                )
                .state("idle", StateBuilder::new()),
        )
        .context(Manager::default())
        .assign("tick", |m: &Manager, _: &Event| Manager {
            progress_events: m.progress_events + 1,
            ..m.clone()
        })
        .assign("record", |m: &Manager, event: &Event| Manager {
            bytes: event.data["bytes"].as_u64().unwrap_or_default(),
            ..m.clone()
        })
        .service("download", interpreter::machine(download))
        .build()
        .unwrap();

    let mut app = manager.interpret();
    app.start();

    for _ in 0..3 {
        app.send("CHUNK");
    }
    if let Some(child) = app.child::<u64>(&"file-1".into()) {
        println!("Child has received {} bytes", child.context());
    }
    println!("Parent saw {} progress events", app.context().progress_events);

    let checkpoint = app.checkpoint().to_json_pretty().unwrap();
    println!("\nCheckpoint while downloading:\n{checkpoint}\n");

    app.send("EOF");
    println!("State: {}", app.snapshot().value);
    println!("Bytes reported by the child: {}", app.context().bytes);

    app.stop();
    println!("\n=== Example Complete ===");
}
