//! Built-in `GET /healthz` handler.
//!
//! Answers 200 with the app identity while the lifecycle state is
//! `Running` and 503 otherwise.

use axum::{extract::State, http::StatusCode, Json};
use serde::Serialize;

use crate::config::schema::AppIdentity;
use crate::lifecycle::state::{LifecycleState, StateCell};

#[derive(Clone)]
pub struct HealthState {
    identity: AppIdentity,
    state: StateCell,
}

impl HealthState {
    pub fn new(identity: AppIdentity, state: StateCell) -> Self {
        Self { identity, state }
    }
}

#[derive(Debug, Serialize)]
pub struct HealthReport {
    pub name: String,
    pub version: String,
    pub env: String,
    pub state: &'static str,
}

/// Liveness probe. 503 unless the app is running.
pub async fn healthz(State(health): State<HealthState>) -> (StatusCode, Json<HealthReport>) {
    let state = health.state.get();
    let status = if state == LifecycleState::Running {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (
        status,
        Json(HealthReport {
            name: health.identity.name.clone(),
            version: health.identity.version.clone(),
            env: health.identity.env.to_string(),
            state: state.as_str(),
        }),
    )
}
