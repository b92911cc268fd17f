//! Metrics store configuration

use agentboard_core::AggregationRules;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Where the snapshot lives and how much history it keeps
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Snapshot file path
    #[serde(default = "default_path")]
    pub path: PathBuf,

    /// Project name recorded in freshly created snapshots
    #[serde(default = "default_project_name")]
    pub project_name: String,

    /// Bound on the global recent-events log
    #[serde(default = "default_max_recent_events")]
    pub max_recent_events: usize,

    /// Bound on the session summary log
    #[serde(default = "default_max_sessions")]
    pub max_sessions: usize,

    /// Move an unparseable snapshot aside before `ingest` overwrites it
    #[serde(default = "default_quarantine_corrupt")]
    pub quarantine_corrupt: bool,

    #[serde(default)]
    pub aggregation: AggregationRules,
}

fn default_path() -> PathBuf {
    PathBuf::from(".agentboard/dashboard.json")
}

fn default_project_name() -> String {
    "agentboard".to_string()
}

fn default_max_recent_events() -> usize {
    100
}

fn default_max_sessions() -> usize {
    50
}

fn default_quarantine_corrupt() -> bool {
    true
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: default_path(),
            project_name: default_project_name(),
            max_recent_events: default_max_recent_events(),
            max_sessions: default_max_sessions(),
            quarantine_corrupt: default_quarantine_corrupt(),
            aggregation: AggregationRules::default(),
        }
    }
}

impl StoreConfig {
    /// Default configuration for a snapshot at `path`
    pub fn at(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            ..Default::default()
        }
    }

    pub fn with_project_name(mut self, name: impl Into<String>) -> Self {
        self.project_name = name.into();
        self
    }

    pub fn with_max_recent_events(mut self, max: usize) -> Self {
        self.max_recent_events = max;
        self
    }

    pub fn with_max_sessions(mut self, max: usize) -> Self {
        self.max_sessions = max;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_from_empty_document() {
        let config: StoreConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config.path, PathBuf::from(".agentboard/dashboard.json"));
        assert_eq!(config.max_recent_events, 100);
        assert_eq!(config.max_sessions, 50);
        assert!(config.quarantine_corrupt);
        assert_eq!(config.aggregation, AggregationRules::default());
    }

    #[test]
    fn test_partial_aggregation_overrides() {
        let config: StoreConfig =
            serde_json::from_str(r#"{"aggregation": {"base_xp": 20}}"#).unwrap();
        assert_eq!(config.aggregation.base_xp, 20);
        assert_eq!(config.aggregation.recent_event_capacity, 20);
    }
}
