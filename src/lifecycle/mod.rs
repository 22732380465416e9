//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (app.rs):
//!     Build container → init subsystems → mark ready → run
//!
//! Running (app.rs):
//!     Spawn listener → bound → start queue/scheduler → wait for signal
//!
//! Shutdown (shutdown.rs):
//!     Signal received → stop accepting → drain → hooks → close subsystems
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT or ShutdownHandle → exactly one termination event
//! ```
//!
//! # Design Decisions
//! - State only moves forward (state.rs)
//! - Shutdown hooks are frozen once the app runs
//! - Drain and each subsystem close have a deadline

pub mod app;
pub mod context;
pub mod shutdown;
pub mod signals;
pub mod state;

pub use app::{App, DrainOutcome, ShutdownReport};
pub use context::AppContext;
pub use shutdown::{Shutdown, ShutdownHooks};
pub use signals::{ShutdownHandle, ShutdownSignal};
pub use state::LifecycleState;
