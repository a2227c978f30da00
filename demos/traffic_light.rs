//! Traffic Light Statechart
//!
//! A timed traffic light with a nested pedestrian signal and an
//! emergency override.
//!
//! Key concepts:
//! - `after` transitions driven by a manual clock
//! - Nested states under `red`
//! - An override handled by the root from any state
//!
//! Run with: cargo run --example traffic_light

use harel::builder::{MachineBuilder, StateBuilder};
use harel::interpreter::ManualClock;
use std::time::Duration;

fn main() {
    println!("=== Traffic Light Statechart ===\n");

    let machine = MachineBuilder::new("light")
        .definition(
            StateBuilder::new()
                .initial("green")
                .on("EMERGENCY", "#light.flashing")
                .state("green", StateBuilder::new().after(Duration::from_secs(30), "yellow"))
                .state("yellow", StateBuilder::new().after(Duration::from_secs(5), "red"))
                .state(
                    "red",
                    StateBuilder::new()
                        .initial("walk")
                        .tag("stopped")
                        .state("walk", StateBuilder::new().after(Duration::from_secs(20), "wait"))
                        .state("wait", StateBuilder::new().after(Duration::from_secs(10), "#light.green")),
                )
                .state("flashing", StateBuilder::new().on("RESET", "green")),
        )
        .context(())
        .build()
        .unwrap();

    let clock = ManualClock::new();
    let mut light = machine.interpret().with_clock(clock.clone());
    light.subscribe(|snapshot| {
        let stopped = if snapshot.has_tag("stopped") { " (traffic stopped)" } else { "" };
        println!("  -> {}{stopped}", snapshot.value);
    });

    light.start();
    println!("Initial state: {}\n", light.snapshot().value);

    println!("Driving the clock in 5 second steps:");
    for _ in 0..13 {
        clock.advance(Duration::from_secs(5));
        light.poll();
    }

    println!("\nEmergency override:");
    light.send("EMERGENCY");
    println!("Pending timers: {}", light.scheduled().count());
    light.send("RESET");

    light.stop();
    println!("\n=== Example Complete ===");
}
