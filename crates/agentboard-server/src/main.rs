//! Agentboard server and recorder
//!
//! Usage:
//! ```bash
//! # Serve the live dashboard channel (default command)
//! agentboard --config agentboard.yaml
//!
//! # Record one finished agent invocation
//! echo '{"agent_name":"coding","status":"success","started_at":"2026-01-05T10:00:00Z",
//!        "ended_at":"2026-01-05T10:00:05Z","duration_seconds":5.0}' | agentboard record --event -
//!
//! # Print the current snapshot
//! agentboard snapshot
//! ```
//!
//! Watch it live:
//! ```bash
//! websocat ws://127.0.0.1:8090/ws
//! ```

use agentboard_core::{AgentEvent, Result as CoreResult};
use agentboard_observability::init_logging;
use agentboard_server::{BroadcastServer, ServerConfig};
use agentboard_storage::{FileMetricsStore, LoadStatus, MetricsStore};
use anyhow::Context;
use clap::{Parser, Subcommand};
use std::io::Read;
use std::path::PathBuf;
use tokio::net::TcpListener;
use tracing::{info, warn};

/// Agentboard - live scoreboard for autonomous agents
#[derive(Parser)]
#[command(name = "agentboard")]
#[command(about = "Agent metrics store and live dashboard server", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Path to configuration file (YAML or TOML)
    #[arg(
        short,
        long,
        value_name = "FILE",
        env = "AGENTBOARD_CONFIG",
        global = true
    )]
    config: Option<PathBuf>,

    /// Snapshot file (overrides config and AGENTBOARD_STORE)
    #[arg(short, long, value_name = "FILE", global = true)]
    store: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the live channel server (default if no command specified)
    Serve {
        #[arg(long)]
        host: Option<String>,

        #[arg(short, long)]
        port: Option<u16>,
    },
    /// Fold one AgentEvent JSON document into the snapshot
    Record {
        /// Event file, or `-` for stdin
        #[arg(short, long, value_name = "FILE", default_value = "-")]
        event: String,
    },
    /// Print the current snapshot as JSON
    Snapshot {
        /// Single-line output
        #[arg(long)]
        compact: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => ServerConfig::from_file(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => ServerConfig::default(),
    };
    config.merge_env();
    if let Some(store) = cli.store {
        config.store.path = store;
        config.expand_paths();
    }

    init_logging(&config.logging)?;

    match cli.command.unwrap_or(Commands::Serve {
        host: None,
        port: None,
    }) {
        Commands::Serve { host, port } => {
            if let Some(host) = host {
                config.host = host;
            }
            if let Some(port) = port {
                config.port = port;
            }
            serve(config).await
        }
        Commands::Record { event } => record(config, &event).await,
        Commands::Snapshot { compact } => snapshot(config, compact),
    }
}

async fn serve(config: ServerConfig) -> anyhow::Result<()> {
    info!("🚀 Initializing Agentboard");
    info!("   Snapshot: {}", config.store.path.display());

    let addr = format!("{}:{}", config.host, config.port);
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;

    let server = BroadcastServer::new(config)?;
    info!("   State:    http://{}/api/state", addr);
    info!("   Health:   http://{}/healthz", addr);
    info!("   Metrics:  http://{}/metrics", addr);

    server.serve(listener, shutdown_signal()).await
}

async fn record(config: ServerConfig, source: &str) -> anyhow::Result<()> {
    let raw = if source == "-" {
        let mut buf = String::new();
        std::io::stdin().read_to_string(&mut buf)?;
        buf
    } else {
        std::fs::read_to_string(source).with_context(|| format!("Failed to read {}", source))?
    };
    let event = parse_event(&raw).context("Invalid event document")?;
    let agent = event.agent_name.clone();

    let store = FileMetricsStore::new(config.store);
    let state = tokio::task::spawn_blocking(move || store.ingest(event)).await??;

    if let Some(profile) = state.agent(&agent) {
        println!(
            "{}: level {} ({} xp), {}/{} successful, streak {}",
            agent,
            profile.level,
            profile.xp,
            profile.successful_invocations,
            profile.total_invocations,
            profile.current_streak
        );
    }
    Ok(())
}

fn parse_event(raw: &str) -> CoreResult<AgentEvent> {
    let event: AgentEvent = serde_json::from_str(raw)?;
    event.validate()?;
    Ok(event)
}

fn snapshot(config: ServerConfig, compact: bool) -> anyhow::Result<()> {
    let store = FileMetricsStore::new(config.store);
    let (state, status) = store.load_with_status();
    match status {
        LoadStatus::Loaded => {}
        LoadStatus::Missing => info!("No snapshot yet at {}", store.path().display()),
        LoadStatus::Corrupt(reason) => warn!("Snapshot corrupt, showing empty state: {}", reason),
        LoadStatus::Unreadable(reason) => warn!("Snapshot unreadable, showing empty state: {}", reason),
    }

    let json = if compact {
        serde_json::to_string(&state)?
    } else {
        serde_json::to_string_pretty(&state)?
    };
    println!("{}", json);
    Ok(())
}

async fn shutdown_signal() {
    use tokio::signal;

    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_event_fills_defaults() {
        let event = parse_event(
            r#"{"agent_name":"coding","status":"success",
                "started_at":"2026-01-05T10:00:00Z","ended_at":"2026-01-05T10:00:05Z",
                "duration_seconds":5.0,"event_id":"evt-1"}"#,
        )
        .unwrap();
        assert_eq!(event.agent_name, "coding");
        assert_eq!(event.total_tokens, 0);
        assert!(event.artifacts.is_empty());
    }

    #[test]
    fn test_parse_event_rejects_invalid() {
        assert!(parse_event("not json").is_err());
        assert!(
            parse_event(
                r#"{"agent_name":"","status":"success",
                    "started_at":"2026-01-05T10:00:00Z","ended_at":"2026-01-05T10:00:05Z",
                    "duration_seconds":5.0,"event_id":"evt-1"}"#
            )
            .is_err()
        );
    }

    #[test]
    fn test_cli_defaults_to_serve() {
        let cli = Cli::parse_from(["agentboard"]);
        assert!(cli.command.is_none());

        let cli = Cli::parse_from(["agentboard", "record", "--event", "event.json"]);
        assert!(matches!(cli.command, Some(Commands::Record { event }) if event == "event.json"));
    }
}
