//! Metrics collection with Prometheus
//!
//! Live channel metrics for the dashboard server:
//! - Connected viewers
//! - Broadcasts sent, by message kind
//! - Viewers dropped, by disconnect reason
//! - Snapshot polls, by outcome, and how long each poll took

use prometheus::{CounterVec, Gauge, Histogram, HistogramOpts, Opts, Registry};
use std::sync::Arc;

/// Metrics collector for the dashboard server
#[derive(Clone)]
pub struct Metrics {
    registry: Arc<Registry>,

    /// Viewers currently attached to the live channel
    pub viewers_connected: Gauge,
    /// Messages delivered to viewers (initial, update, heartbeat)
    pub broadcasts_total: CounterVec,
    /// Viewers removed from the live channel
    pub viewers_dropped_total: CounterVec,

    /// Change monitor polls (changed, unchanged, missing, stale)
    pub snapshot_polls_total: CounterVec,
    /// Time spent stat-ing, reading and parsing the snapshot
    pub snapshot_poll_duration_seconds: Histogram,
}

impl Metrics {
    /// Create a new metrics collector with its own registry
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let viewers_connected = Gauge::with_opts(Opts::new(
            "agentboard_viewers_connected",
            "Number of viewers attached to the live channel",
        ))?;

        let broadcasts_total = CounterVec::new(
            Opts::new(
                "agentboard_broadcasts_total",
                "Messages queued to viewers by kind",
            ),
            &["kind"],
        )?;

        let viewers_dropped_total = CounterVec::new(
            Opts::new(
                "agentboard_viewers_dropped_total",
                "Viewers removed from the live channel by reason",
            ),
            &["reason"],
        )?;

        let snapshot_polls_total = CounterVec::new(
            Opts::new(
                "agentboard_snapshot_polls_total",
                "Snapshot change checks by outcome",
            ),
            &["outcome"],
        )?;

        let snapshot_poll_duration_seconds = Histogram::with_opts(
            HistogramOpts::new(
                "agentboard_snapshot_poll_duration_seconds",
                "Snapshot change check duration in seconds",
            )
            .buckets(vec![0.0001, 0.0005, 0.001, 0.005, 0.01, 0.05, 0.1, 0.5]),
        )?;

        registry.register(Box::new(viewers_connected.clone()))?;
        registry.register(Box::new(broadcasts_total.clone()))?;
        registry.register(Box::new(viewers_dropped_total.clone()))?;
        registry.register(Box::new(snapshot_polls_total.clone()))?;
        registry.register(Box::new(snapshot_poll_duration_seconds.clone()))?;

        Ok(Self {
            registry: Arc::new(registry),
            viewers_connected,
            broadcasts_total,
            viewers_dropped_total,
            snapshot_polls_total,
            snapshot_poll_duration_seconds,
        })
    }

    /// Get the Prometheus registry for exporting metrics
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn viewer_attached(&self) {
        self.viewers_connected.inc();
    }

    /// Record a viewer leaving the channel for `reason`
    pub fn viewer_detached(&self, reason: &str) {
        self.viewers_connected.dec();
        self.viewers_dropped_total
            .with_label_values(&[reason])
            .inc();
    }

    /// Record `count` messages of `kind` queued in one fan-out
    pub fn record_broadcast(&self, kind: &str, count: usize) {
        if count > 0 {
            self.broadcasts_total
                .with_label_values(&[kind])
                .inc_by(count as f64);
        }
    }

    pub fn record_poll(&self, outcome: &str, duration_secs: f64) {
        self.snapshot_polls_total
            .with_label_values(&[outcome])
            .inc();
        self.snapshot_poll_duration_seconds.observe(duration_secs);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_creation() {
        let metrics = Metrics::new().unwrap();
        assert!(!metrics.registry().gather().is_empty());
    }

    #[test]
    fn test_viewer_gauge_tracks_attach_and_detach() {
        let metrics = Metrics::new().unwrap();
        metrics.viewer_attached();
        metrics.viewer_attached();
        metrics.viewer_detached("lagging");

        assert_eq!(metrics.viewers_connected.get(), 1.0);
        assert_eq!(
            metrics
                .viewers_dropped_total
                .with_label_values(&["lagging"])
                .get(),
            1.0
        );
    }

    #[test]
    fn test_record_broadcast_counts_recipients() {
        let metrics = Metrics::new().unwrap();
        metrics.record_broadcast("update", 3);
        metrics.record_broadcast("update", 0);
        metrics.record_broadcast("heartbeat", 1);

        assert_eq!(
            metrics.broadcasts_total.with_label_values(&["update"]).get(),
            3.0
        );
        assert_eq!(
            metrics
                .broadcasts_total
                .with_label_values(&["heartbeat"])
                .get(),
            1.0
        );
    }

    #[test]
    fn test_record_poll() {
        let metrics = Metrics::new().unwrap();
        metrics.record_poll("unchanged", 0.0002);
        metrics.record_poll("changed", 0.004);

        assert_eq!(
            metrics
                .snapshot_polls_total
                .with_label_values(&["changed"])
                .get(),
            1.0
        );
        assert_eq!(metrics.snapshot_poll_duration_seconds.get_sample_count(), 2);
    }

    #[test]
    fn test_independent_registries() {
        // Each collector owns its registry, so tests can build several
        let first = Metrics::new().unwrap();
        let second = Metrics::new().unwrap();
        first.viewer_attached();
        assert_eq!(second.viewers_connected.get(), 0.0);
    }
}
