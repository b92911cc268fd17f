use agentboard_observability::LoggingConfig;
use agentboard_storage::StoreConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default)]
    pub store: StoreConfig,

    #[serde(default)]
    pub broadcast: BroadcastConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Live channel timing and backpressure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BroadcastConfig {
    /// How often the change monitor is polled
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Full-state update sent even when nothing changed
    #[serde(default = "default_heartbeat_interval_ms")]
    pub heartbeat_interval_ms: u64,

    /// Messages a viewer may fall behind before it is dropped
    #[serde(default = "default_viewer_queue_capacity")]
    pub viewer_queue_capacity: usize,

    /// Close a viewer that sent nothing (not even a ping) for this long
    #[serde(default = "default_idle_timeout_secs")]
    pub idle_timeout_secs: u64,

    /// Close a viewer whose socket write stalls for this long
    #[serde(default = "default_write_timeout_ms")]
    pub write_timeout_ms: u64,

    /// Poll early when the OS reports a change to the snapshot
    #[serde(default = "default_true")]
    pub watch_filesystem: bool,

    /// Delay before re-reading a snapshot that failed to parse
    #[serde(default = "default_monitor_retry_delay_ms")]
    pub monitor_retry_delay_ms: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            store: StoreConfig::default(),
            broadcast: BroadcastConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for BroadcastConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
            heartbeat_interval_ms: default_heartbeat_interval_ms(),
            viewer_queue_capacity: default_viewer_queue_capacity(),
            idle_timeout_secs: default_idle_timeout_secs(),
            write_timeout_ms: default_write_timeout_ms(),
            watch_filesystem: true,
            monitor_retry_delay_ms: default_monitor_retry_delay_ms(),
        }
    }
}

impl BroadcastConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat_interval_ms.max(1))
    }

    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }

    pub fn write_timeout(&self) -> Duration {
        Duration::from_millis(self.write_timeout_ms)
    }

    pub fn monitor_retry_delay(&self) -> Duration {
        Duration::from_millis(self.monitor_retry_delay_ms)
    }
}

impl ServerConfig {
    pub fn from_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)?;

        let mut config: ServerConfig = if path.extension().and_then(|s| s.to_str()) == Some("toml") {
            toml::from_str(&contents)?
        } else {
            // Default to YAML
            serde_yaml::from_str(&contents)?
        };

        config.expand_paths();
        Ok(config)
    }

    /// Merge environment variables into config (env vars take precedence)
    pub fn merge_env(&mut self) {
        if let Ok(val) = std::env::var("AGENTBOARD_STORE") {
            self.store.path = PathBuf::from(val);
        }

        if let Ok(val) = std::env::var("AGENTBOARD_PROJECT") {
            self.store.project_name = val;
        }

        if let Ok(val) = std::env::var("AGENTBOARD_LOG_LEVEL") {
            self.logging.level = val;
        }

        if let Ok(val) = std::env::var("AGENTBOARD_PORT")
            && let Ok(port) = val.parse::<u16>()
        {
            self.port = port;
        }

        if let Ok(val) = std::env::var("AGENTBOARD_HOST") {
            self.host = val;
        }

        self.expand_paths();
    }

    /// Expand a leading `~` in the snapshot path
    pub fn expand_paths(&mut self) {
        let raw = self.store.path.to_string_lossy();
        if raw.starts_with('~') {
            let expanded = shellexpand::tilde(&raw).to_string();
            self.store.path = PathBuf::from(expanded);
        }
    }
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8090
}

fn default_poll_interval_ms() -> u64 {
    5_000
}

fn default_heartbeat_interval_ms() -> u64 {
    30_000
}

fn default_viewer_queue_capacity() -> usize {
    16
}

fn default_idle_timeout_secs() -> u64 {
    300
}

fn default_write_timeout_ms() -> u64 {
    5_000
}

fn default_monitor_retry_delay_ms() -> u64 {
    50
}

fn default_true() -> bool {
    true
}
