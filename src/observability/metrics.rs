//! Metrics collection and exposition.
//!
//! # Metrics
//! - `app_lifecycle_state` (gauge): 0=uninitialized .. 4=stopped
//! - `app_subsystem_init_total` (counter): by subsystem, outcome
//! - `app_subsystem_teardown_total` (counter): by subsystem, outcome
//! - `app_shutdown_duration_seconds` (histogram): signal to stopped
//! - `app_listener_drain_total` (counter): by outcome
//! - `app_queue_jobs_total` (counter): by topic, outcome
//! - `app_http_rejected_total` (counter): by reason
//!
//! # Design Decisions
//! - Recording is a no-op until an exporter is installed
//! - Exporter is opt-in (`METRICS_ENABLED`)

use std::net::SocketAddr;
use std::time::Duration;

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

use crate::lifecycle::state::LifecycleState;
use crate::subsystem::SubsystemKind;

/// Install the Prometheus exporter with an HTTP scrape endpoint.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    tracing::info!(address = %addr, "Metrics exporter listening");
    Ok(())
}

pub fn record_state(state: LifecycleState) {
    gauge!("app_lifecycle_state").set(state as u8 as f64);
}

pub fn record_subsystem_init(kind: SubsystemKind, ok: bool) {
    let outcome = if ok { "ok" } else { "error" };
    counter!("app_subsystem_init_total", "subsystem" => kind.as_str(), "outcome" => outcome).increment(1);
}

pub fn record_teardown(kind: SubsystemKind, outcome: &'static str) {
    counter!("app_subsystem_teardown_total", "subsystem" => kind.as_str(), "outcome" => outcome).increment(1);
}

pub fn record_drain(outcome: &'static str) {
    counter!("app_listener_drain_total", "outcome" => outcome).increment(1);
}

pub fn record_shutdown(elapsed: Duration) {
    histogram!("app_shutdown_duration_seconds").record(elapsed.as_secs_f64());
}

pub fn record_job(topic: &str, ok: bool) {
    let outcome = if ok { "ok" } else { "error" };
    counter!("app_queue_jobs_total", "topic" => topic.to_string(), "outcome" => outcome).increment(1);
}

pub fn record_rejected(reason: &'static str) {
    counter!("app_http_rejected_total", "reason" => reason).increment(1);
}
