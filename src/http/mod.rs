//! HTTP listener subsystem.
//!
//! # Data Flow
//! ```text
//! App code registers routes (Initializing)
//!     → server.rs spawns the listener task (Running)
//!     → bound address reported to the controller → go-live
//!     → request.rs (request ID, span) → limits.rs → handlers
//!     → shutdown broadcast → graceful drain
//! ```

pub mod handlers;
pub mod limits;
pub mod request;
pub mod server;

pub use request::X_REQUEST_ID;
pub use server::{HttpServer, ListenerTask};
