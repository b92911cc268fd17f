//! Agentboard broadcast server
//!
//! Watches the dashboard snapshot written by agent processes and pushes the
//! full state to every connected viewer over a WebSocket live channel.
//!
//! - `GET /ws` - live channel (`initial`, then `update` on change or heartbeat)
//! - `GET /api/state` - current state, one shot
//! - `GET /healthz`, `GET /metrics`

pub mod broadcaster;
pub mod config;
pub mod hub;
pub mod messages;
pub mod routes;

pub use broadcaster::Broadcaster;
pub use config::{BroadcastConfig, ServerConfig};
pub use hub::{BroadcastHub, DisconnectReason, Subscription, ViewerPhase};
pub use messages::{LiveMessage, PING, PONG, ViewerMessage};
pub use routes::{AppState, router};

use agentboard_core::DashboardState;
use agentboard_observability::Metrics;
use agentboard_storage::{ChangeMonitor, SnapshotWatcher};
use axum::Router;
use std::future::Future;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::{mpsc, watch};
use tracing::{info, warn};

/// Server process: change monitor, broadcaster and HTTP router
pub struct BroadcastServer {
    config: ServerConfig,
    hub: Arc<BroadcastHub>,
    metrics: Arc<Metrics>,
    monitor: ChangeMonitor,
}

impl BroadcastServer {
    /// Prime the hub with whatever snapshot is on disk right now.
    pub fn new(config: ServerConfig) -> anyhow::Result<Self> {
        let metrics = Arc::new(Metrics::new()?);
        let mut monitor = ChangeMonitor::new(&config.store.path)
            .with_retry_delay(config.broadcast.monitor_retry_delay());

        let initial = monitor
            .poll()
            .unwrap_or_else(|| DashboardState::new(config.store.project_name.as_str()));
        info!(
            path = %config.store.path.display(),
            agents = initial.agents.len(),
            "Loaded initial snapshot"
        );

        let hub = Arc::new(BroadcastHub::new(
            initial,
            config.broadcast.viewer_queue_capacity,
            metrics.clone(),
        ));

        Ok(Self {
            config,
            hub,
            metrics,
            monitor,
        })
    }

    pub fn hub(&self) -> Arc<BroadcastHub> {
        self.hub.clone()
    }

    pub fn metrics(&self) -> Arc<Metrics> {
        self.metrics.clone()
    }

    pub fn router(&self) -> Router {
        router(AppState {
            hub: self.hub.clone(),
            metrics: self.metrics.clone(),
            config: Arc::new(self.config.broadcast.clone()),
        })
    }

    /// Serve on `listener` until `shutdown` resolves.
    pub async fn serve<F>(self, listener: TcpListener, shutdown: F) -> anyhow::Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let router = self.router();
        let (stop_tx, stop_rx) = watch::channel(false);
        tokio::spawn(async move {
            shutdown.await;
            let _ = stop_tx.send(true);
        });

        // Watcher must outlive the broadcaster
        let (wake, _watcher) = if self.config.broadcast.watch_filesystem {
            let (tx, rx) = mpsc::channel(1);
            match SnapshotWatcher::spawn(&self.config.store.path, tx) {
                Ok(watcher) => (Some(rx), Some(watcher)),
                Err(e) => {
                    warn!("Filesystem watch unavailable, polling only: {}", e);
                    (None, None)
                }
            }
        } else {
            (None, None)
        };

        let broadcaster = Broadcaster::new(
            self.hub.clone(),
            self.monitor,
            self.metrics.clone(),
            self.config.broadcast.clone(),
        );
        let broadcast_task = tokio::spawn(broadcaster.run(wake, stopped(stop_rx.clone())));

        info!("📊 Agentboard live channel on ws://{}/ws", listener.local_addr()?);
        axum::serve(listener, router)
            .with_graceful_shutdown(stopped(stop_rx))
            .await?;

        broadcast_task.await?;
        info!("Server stopped");
        Ok(())
    }
}

async fn stopped(mut rx: watch::Receiver<bool>) {
    // Sender dropped also counts as stop
    let _ = rx.wait_for(|stop| *stop).await;
}
