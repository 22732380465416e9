//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! defaults (schema.rs)
//!     → config file layer (loader.rs, optional)
//!     → environment layer (loader.rs)
//!     → AppSettings (immutable snapshot)
//!     → shared via Arc to the container and controller
//!
//! On subsystem init:
//!     validation.rs checks the enabled subsystem's slice
//! ```
//!
//! # Design Decisions
//! - Snapshot is immutable once loaded; no hot reload
//! - All fields have defaults so an empty environment still runs
//! - Malformed values fall back to defaults; validation happens at init

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{
    load, load_from_env, load_with_diagnostics, ConfigDiagnostic, ConfigError, ConfigKey, ConfigSource, EnvSource,
    FileSource, MapSource,
};
pub use schema::AppSettings;
pub use schema::Environment;
pub use schema::FeatureFlags;
pub use schema::HttpSettings;
