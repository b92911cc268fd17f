//! Tick loop driving the change monitor and heartbeats

use crate::config::BroadcastConfig;
use crate::hub::BroadcastHub;
use agentboard_observability::Metrics;
use agentboard_storage::{ChangeMonitor, MonitorOutcome};
use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;
use tokio::sync::mpsc;
use tokio::time::{MissedTickBehavior, interval};
use tracing::{debug, error, info};

pub struct Broadcaster {
    hub: Arc<BroadcastHub>,
    monitor: Arc<Mutex<ChangeMonitor>>,
    metrics: Arc<Metrics>,
    config: BroadcastConfig,
}

impl Broadcaster {
    pub fn new(
        hub: Arc<BroadcastHub>,
        monitor: ChangeMonitor,
        metrics: Arc<Metrics>,
        config: BroadcastConfig,
    ) -> Self {
        Self {
            hub,
            monitor: Arc::new(Mutex::new(monitor)),
            metrics,
            config,
        }
    }

    /// Poll the snapshot once and publish it if it changed.
    ///
    /// The read happens on the blocking pool; a slow disk delays this tick,
    /// never the viewers' sockets.
    pub async fn tick(&self) -> bool {
        let monitor = self.monitor.clone();
        let started = Instant::now();
        let outcome = tokio::task::spawn_blocking(move || {
            monitor
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .check()
        })
        .await;

        let outcome = match outcome {
            Ok(outcome) => outcome,
            Err(e) => {
                error!("Snapshot poll task failed: {}", e);
                return false;
            }
        };
        self.metrics
            .record_poll(outcome.label(), started.elapsed().as_secs_f64());

        match outcome {
            MonitorOutcome::Changed(state) => match self.hub.publish(*state) {
                Ok(delivered) => {
                    debug!(viewers = delivered, "Published snapshot change");
                    true
                }
                Err(e) => {
                    error!("Failed to serialize snapshot update: {}", e);
                    false
                }
            },
            _ => false,
        }
    }

    /// Run until `shutdown` resolves.
    ///
    /// `wake` carries filesystem notifications; each one triggers an early
    /// poll. The poll interval alone is enough for correctness.
    pub async fn run<F>(self, mut wake: Option<mpsc::Receiver<()>>, shutdown: F)
    where
        F: Future<Output = ()> + Send,
    {
        let mut poll = interval(self.config.poll_interval());
        poll.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let mut heartbeat = interval(self.config.heartbeat_interval());
        heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick fires immediately; viewers just got their initial state
        heartbeat.tick().await;

        tokio::pin!(shutdown);
        info!(
            poll_ms = self.config.poll_interval_ms,
            heartbeat_ms = self.config.heartbeat_interval_ms,
            "Broadcaster started"
        );

        loop {
            tokio::select! {
                _ = &mut shutdown => break,
                _ = poll.tick() => {
                    self.tick().await;
                }
                woke = recv_wake(&mut wake) => {
                    if woke {
                        self.tick().await;
                        // Next scheduled poll is a full interval away again
                        poll.reset();
                    } else {
                        debug!("Snapshot watcher stopped, polling only");
                        wake = None;
                    }
                }
                _ = heartbeat.tick() => {
                    if let Err(e) = self.hub.heartbeat() {
                        error!("Failed to serialize heartbeat: {}", e);
                    }
                }
            }
        }

        self.hub.close_all();
        info!("Broadcaster stopped");
    }
}

/// Pending forever when there is no watcher
async fn recv_wake(wake: &mut Option<mpsc::Receiver<()>>) -> bool {
    match wake {
        Some(rx) => rx.recv().await.is_some(),
        None => std::future::pending().await,
    }
}
