//! Structured logging.
//!
//! # Responsibilities
//! - Initialize logging subsystem
//! - Configure log level from settings and environment
//!
//! # Design Decisions
//! - Uses tracing crate for structured logging
//! - JSON format for production, pretty format for development
//! - `RUST_LOG` overrides the configured level

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::schema::{AppIdentity, ObservabilitySettings};

/// Install the global subscriber.
///
/// Returns `false` if a subscriber was already installed (tests, embedding).
pub fn init_logging(identity: &AppIdentity, settings: &ObservabilitySettings) -> bool {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&settings.log_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let registry = tracing_subscriber::registry().with(filter);

    let installed = if identity.env.is_production() {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_current_span(true))
            .try_init()
            .is_ok()
    } else {
        registry.with(tracing_subscriber::fmt::layer().pretty()).try_init().is_ok()
    };

    if installed {
        tracing::debug!(env = %identity.env, level = %settings.log_level, "Logging initialized");
    }
    installed
}

/// Root span carried by every component of one app instance.
pub fn app_span(identity: &AppIdentity) -> tracing::Span {
    tracing::info_span!(
        "app",
        app = %identity.name,
        version = %identity.version,
        env = %identity.env,
    )
}
