//! Structured logging setup

use serde::{Deserialize, Serialize};
use tracing::Level;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// trace, debug, info, warn or error
    #[serde(default = "default_level")]
    pub level: String,

    /// Emit one JSON object per line instead of human-readable text
    #[serde(default)]
    pub json: bool,
}

fn default_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_level(),
            json: false,
        }
    }
}

impl LoggingConfig {
    /// Parsed level; unknown names fall back to INFO
    pub fn level(&self) -> Level {
        match self.level.to_lowercase().as_str() {
            "trace" => Level::TRACE,
            "debug" => Level::DEBUG,
            "info" => Level::INFO,
            "warn" => Level::WARN,
            "error" => Level::ERROR,
            _ => Level::INFO,
        }
    }

    /// `RUST_LOG` wins over the configured level when set
    pub fn env_filter(&self) -> EnvFilter {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            let mut filter = EnvFilter::new(self.level().to_string());
            // The file watcher backend is chatty at debug
            match "notify=warn".parse() {
                Ok(directive) => filter = filter.add_directive(directive),
                Err(e) => tracing::warn!("Failed to set notify log filter: {}", e),
            }
            filter
        })
    }
}

/// Install the global tracing subscriber.
///
/// Logs go to stderr so commands that print JSON keep stdout clean.
pub fn init_logging(config: &LoggingConfig) -> Result<(), tracing::subscriber::SetGlobalDefaultError> {
    let builder = FmtSubscriber::builder()
        .with_env_filter(config.env_filter())
        .with_writer(std::io::stderr);

    if config.json {
        tracing::subscriber::set_global_default(builder.json().finish())
    } else {
        tracing::subscriber::set_global_default(builder.finish())
    }
}
