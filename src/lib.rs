//! Harel: a hierarchical statechart interpreter
//!
//! Harel runs statecharts with nested and parallel states, history, guarded
//! and eventless transitions, delayed events and child actors. It follows a
//! "pure core, imperative shell" split:
//!
//! - [`core`] holds the definition tree and the pure algorithms: resolving
//!   configurations, selecting transitions and computing microsteps and
//!   macrosteps. Assignments produce new contexts; everything else is
//!   returned as a planned action.
//! - [`interpreter`] executes planned actions, owns actors and delayed
//!   events, and feeds events through the macrostep loop.
//!
//! # Core Concepts
//!
//! - **Definition**: an immutable tree built with [`builder::StateBuilder`]
//! - **Registry**: named guards, actions, services and delays
//! - **Machine**: a validated definition bound to its registry and context
//! - **Interpreter**: a running machine with a mailbox and actors
//!
//! # Example
//!
//! ```rust
//! use harel::builder::{MachineBuilder, StateBuilder, TransitionBuilder};
//! use harel::core::Event;
//!
//! #[derive(Clone, Debug, Default)]
//! struct Player {
//!     tracks_played: u32,
//! }
//!
//! let machine = MachineBuilder::new("player")
//!     .definition(
//!         StateBuilder::new()
//!             .initial("stopped")
//!             .state("stopped", StateBuilder::new().on("PLAY", "playing"))
//!             .state(
//!                 "playing",
//!                 StateBuilder::new()
//!                     .on("NEXT", TransitionBuilder::targetless().action("count"))
//!                     .on("STOP", "stopped"),
//!             ),
//!     )
//!     .context(Player::default())
//!     .assign("count", |p: &Player, _: &Event| Player { tracks_played: p.tracks_played + 1 })
//!     .build()
//!     .unwrap();
//!
//! let mut player = machine.interpret();
//! player.start();
//! player.send("PLAY");
//! player.send("NEXT");
//! player.send("NEXT");
//!
//! let snapshot = player.snapshot();
//! assert!(snapshot.matches("playing"));
//! assert_eq!(snapshot.context.tracks_played, 2);
//! ```

pub mod builder;
pub mod checkpoint;
pub mod config;
pub mod core;
pub mod interpreter;
pub mod machine;
pub mod registry;
pub mod validation;

// Re-export commonly used types
pub use builder::{MachineBuilder, StateBuilder, TransitionBuilder};
pub use checkpoint::Checkpoint;
pub use config::InterpreterConfig;
pub use core::{ActionDescriptor, Event, SendAction};
pub use interpreter::{Interpreter, Snapshot};
pub use machine::{Machine, MachineStep};
pub use registry::Registry;
