//! Liveness and scrape endpoints
//!
//! - `/healthz` - process is up; reports build version, uptime and live viewers
//! - `/metrics` - Prometheus text exposition of the agentboard registry

use axum::{
    Json, Router,
    extract::State,
    http::{StatusCode, header},
    response::{IntoResponse, Response},
    routing::get,
};
use prometheus::TextEncoder;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tracing::warn;

use crate::metrics::Metrics;

const PROMETHEUS_CONTENT_TYPE: &str = "text/plain; version=0.0.4";

/// Body of `/healthz`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_seconds: u64,
    /// Live-channel viewers currently attached
    pub viewers: u64,
}

#[derive(Clone)]
pub struct HealthState {
    metrics: Arc<Metrics>,
    started: Instant,
}

impl HealthState {
    /// Uptime is counted from this call.
    pub fn new(metrics: Arc<Metrics>) -> Self {
        Self {
            metrics,
            started: Instant::now(),
        }
    }

    fn report(&self) -> HealthResponse {
        HealthResponse {
            status: "ok".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            uptime_seconds: self.started.elapsed().as_secs(),
            viewers: self.metrics.viewers_connected.get().max(0.0) as u64,
        }
    }
}

pub fn health_router(state: HealthState) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/metrics", get(scrape))
        .with_state(state)
}

async fn healthz(State(state): State<HealthState>) -> Json<HealthResponse> {
    Json(state.report())
}

async fn scrape(State(state): State<HealthState>) -> Response {
    let families = state.metrics.registry().gather();
    match TextEncoder::new().encode_to_string(&families) {
        Ok(body) => ([(header::CONTENT_TYPE, PROMETHEUS_CONTENT_TYPE)], body).into_response(),
        Err(e) => {
            warn!(error = %e, "Metrics encoding failed");
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response()
        }
    }
}
