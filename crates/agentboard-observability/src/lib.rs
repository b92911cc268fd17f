//! Agentboard Observability
//!
//! This crate provides observability features:
//! - Structured logging
//! - Metrics collection (Prometheus)
//! - Health endpoints

pub mod health;
pub mod logging;
pub mod metrics;

pub use health::{HealthResponse, HealthState, health_router};
pub use logging::{LoggingConfig, init_logging};
pub use metrics::Metrics;
