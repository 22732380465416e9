//! Application lifecycle orchestrator.
//!
//! Boots a service from a configuration snapshot, initializes the enabled
//! subsystems in dependency order, serves HTTP until a termination signal,
//! then drains and tears everything down.
//!
//! # Architecture Overview
//!
//! ```text
//!     environment / config file
//!              │
//!              ▼
//!     ┌──────────────┐      ┌──────────────────────────────────────────┐
//!     │    config    │─────▶│                container                 │
//!     │   snapshot   │      │  document store · queue · search · cache │
//!     └──────────────┘      │  mailer · listener · scheduler · broker  │
//!                           └──────────────────┬───────────────────────┘
//!                                              │ SubsystemProvider
//!                                              ▼
//!     ┌──────────────┐      ┌──────────────────────────────────────────┐
//!     │  lifecycle   │─────▶│ run: listen → go-live → wait for signal  │
//!     │     App      │      │      → drain → hooks → close             │
//!     └──────────────┘      └──────────────────────────────────────────┘
//!
//!     Cross-cutting: observability (tracing, metrics) · error
//! ```

pub mod config;
pub mod container;
pub mod error;
pub mod http;
pub mod lifecycle;
pub mod observability;
pub mod subsystem;

pub use config::schema::AppSettings;
pub use error::{AppError, InitError, UsageError};
pub use http::HttpServer;
pub use lifecycle::{App, AppContext, ShutdownReport};
pub use subsystem::memory::InMemoryProvider;
pub use subsystem::provider::SubsystemProvider;
