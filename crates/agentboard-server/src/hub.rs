//! Viewer registry and fan-out
//!
//! Every viewer owns a bounded queue. Fan-out only ever uses `try_send`, so
//! a slow viewer fills its own queue and gets dropped; it never holds up the
//! broadcast for anyone else.

use crate::messages::LiveMessage;
use agentboard_core::DashboardState;
use agentboard_observability::Metrics;
use axum::extract::ws::{Message, Utf8Bytes};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::sync::{Arc, PoisonError, RwLock};
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Where a registered viewer stands. The hub only learns of a viewer once
/// its upgrade completes, so it starts `Active`. There is no way back from
/// `Closed`; a reconnect is a new viewer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewerPhase {
    /// Registered and receiving broadcasts
    Active,
    Closed,
}

/// Why a viewer left the broadcast set
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisconnectReason {
    /// Viewer sent a close frame or the stream ended
    Closed,
    /// A socket write failed or timed out
    WriteError,
    /// Malformed frame or transport error on read
    ProtocolError,
    /// Nothing received within the idle timeout
    IdleTimeout,
    /// Queue full, viewer fell too far behind
    Lagging,
    /// Server is shutting down
    Shutdown,
}

impl DisconnectReason {
    pub fn as_str(self) -> &'static str {
        match self {
            DisconnectReason::Closed => "closed",
            DisconnectReason::WriteError => "write_error",
            DisconnectReason::ProtocolError => "protocol_error",
            DisconnectReason::IdleTimeout => "idle_timeout",
            DisconnectReason::Lagging => "lagging",
            DisconnectReason::Shutdown => "shutdown",
        }
    }
}

struct ViewerHandle {
    tx: mpsc::Sender<Message>,
    connected_at: DateTime<Utc>,
}

/// Receiving half handed to the connection task
pub struct Subscription {
    pub id: Uuid,
    pub rx: mpsc::Receiver<Message>,
}

pub struct BroadcastHub {
    viewers: DashMap<Uuid, ViewerHandle>,
    /// Last published state. The write lock is held across a publish so an
    /// attach sees either the old state and every later update, or the new
    /// state and no stale update.
    current: RwLock<Arc<DashboardState>>,
    queue_capacity: usize,
    metrics: Arc<Metrics>,
}

impl BroadcastHub {
    pub fn new(initial: DashboardState, queue_capacity: usize, metrics: Arc<Metrics>) -> Self {
        Self {
            viewers: DashMap::new(),
            current: RwLock::new(Arc::new(initial)),
            // Room for at least the initial message
            queue_capacity: queue_capacity.max(1),
            metrics,
        }
    }

    /// Current state for the pull endpoint
    pub fn snapshot(&self) -> Arc<DashboardState> {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn viewer_count(&self) -> usize {
        self.viewers.len()
    }

    pub fn phase(&self, id: &Uuid) -> ViewerPhase {
        if self.viewers.contains_key(id) {
            ViewerPhase::Active
        } else {
            ViewerPhase::Closed
        }
    }

    /// Register a viewer. Its queue already holds the `initial` message.
    pub fn attach(&self) -> serde_json::Result<Subscription> {
        let current = self.current.read().unwrap_or_else(PoisonError::into_inner);
        let text = LiveMessage::initial(&current).to_text()?;

        let (tx, rx) = mpsc::channel(self.queue_capacity);
        // Fresh channel with capacity >= 1, cannot be full
        let _ = tx.try_send(Message::Text(text.into()));

        let id = Uuid::new_v4();
        self.viewers.insert(
            id,
            ViewerHandle {
                tx,
                connected_at: Utc::now(),
            },
        );
        drop(current);

        self.metrics.viewer_attached();
        self.metrics.record_broadcast("initial", 1);
        info!(viewer = %id, viewers = self.viewers.len(), "Viewer attached");

        Ok(Subscription { id, rx })
    }

    /// Remove a viewer. Returns false if it was already gone.
    pub fn detach(&self, id: &Uuid, reason: DisconnectReason) -> bool {
        let Some((_, handle)) = self.viewers.remove(id) else {
            return false;
        };

        self.metrics.viewer_detached(reason.as_str());
        let connected_secs = (Utc::now() - handle.connected_at).num_seconds();
        match reason {
            DisconnectReason::Closed | DisconnectReason::Shutdown => {
                info!(viewer = %id, reason = reason.as_str(), connected_secs, "Viewer detached")
            }
            _ => warn!(viewer = %id, reason = reason.as_str(), connected_secs, "Viewer dropped"),
        }
        true
    }

    /// Replace the current state and push it to every viewer.
    ///
    /// Returns the number of viewers the update was queued for.
    pub fn publish(&self, state: DashboardState) -> serde_json::Result<usize> {
        let mut current = self.current.write().unwrap_or_else(PoisonError::into_inner);
        let text = LiveMessage::update(&state, Utc::now()).to_text()?;
        *current = Arc::new(state);
        let delivered = self.fan_out(text, "update");
        drop(current);
        Ok(delivered)
    }

    /// Re-send the current state so viewers can tell a quiet board from a
    /// dead connection.
    pub fn heartbeat(&self) -> serde_json::Result<usize> {
        let current = self.current.read().unwrap_or_else(PoisonError::into_inner);
        let text = LiveMessage::update(&current, Utc::now()).to_text()?;
        let delivered = self.fan_out(text, "heartbeat");
        drop(current);
        Ok(delivered)
    }

    /// Drop every viewer; their connection tasks see the queue close.
    pub fn close_all(&self) {
        let ids: Vec<Uuid> = self.viewers.iter().map(|entry| *entry.key()).collect();
        for id in ids {
            self.detach(&id, DisconnectReason::Shutdown);
        }
    }

    fn fan_out(&self, text: String, kind: &str) -> usize {
        // Serialized once, shared by every queue
        let payload = Utf8Bytes::from(text);
        let mut delivered = 0;
        let mut dropped = Vec::new();

        for entry in self.viewers.iter() {
            match entry.value().tx.try_send(Message::Text(payload.clone())) {
                Ok(()) => delivered += 1,
                Err(TrySendError::Full(_)) => dropped.push((*entry.key(), DisconnectReason::Lagging)),
                Err(TrySendError::Closed(_)) => dropped.push((*entry.key(), DisconnectReason::Closed)),
            }
        }

        // Removal after iteration; removing while a shard guard is held deadlocks
        for (id, reason) in dropped {
            self.detach(&id, reason);
        }

        self.metrics.record_broadcast(kind, delivered);
        debug!(kind, delivered, "Broadcast queued");
        delivered
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messages::ViewerMessage;
    use agentboard_core::{AgentEvent, EventStatus, fold};

    fn hub(capacity: usize) -> BroadcastHub {
        let metrics = Arc::new(Metrics::new().unwrap());
        BroadcastHub::new(DashboardState::new("demo"), capacity, metrics)
    }

    fn state_with(agent: &str) -> DashboardState {
        let mut state = DashboardState::new("demo");
        let event = AgentEvent::new(agent, EventStatus::Success, Utc::now(), 3.0);
        state.agents.insert(agent.to_string(), fold(None, &event));
        state.recompute_totals();
        state
    }

    fn decode(message: Message) -> ViewerMessage {
        match message {
            Message::Text(text) => ViewerMessage::parse(text.as_str()).unwrap(),
            other => panic!("expected text frame, got {:?}", other),
        }
    }

    #[test]
    fn test_attach_queues_initial_first() {
        let hub = hub(4);
        let mut sub = hub.attach().unwrap();
        assert_eq!(hub.phase(&sub.id), ViewerPhase::Active);

        hub.publish(state_with("coding")).unwrap();

        let first = decode(sub.rx.try_recv().unwrap());
        assert!(matches!(first, ViewerMessage::Initial { .. }));
        assert!(first.data().agents.is_empty());

        let second = decode(sub.rx.try_recv().unwrap());
        assert!(matches!(second, ViewerMessage::Update { .. }));
        assert_eq!(second.data().agents["coding"].total_invocations, 1);
    }

    #[test]
    fn test_late_viewer_sees_latest_state_in_initial() {
        let hub = hub(4);
        hub.publish(state_with("review")).unwrap();

        let mut sub = hub.attach().unwrap();
        let first = decode(sub.rx.try_recv().unwrap());
        assert!(matches!(first, ViewerMessage::Initial { .. }));
        assert!(first.data().agent("review").is_some());
        assert!(sub.rx.try_recv().is_err());
    }

    #[test]
    fn test_slow_viewer_dropped_others_unaffected() {
        let hub = hub(2);
        let slow = hub.attach().unwrap();
        let mut fast = hub.attach().unwrap();

        // Slow viewer never drains: initial + one update fill its queue
        for _ in 0..3 {
            hub.publish(state_with("coding")).unwrap();
            while fast.rx.try_recv().is_ok() {}
        }

        assert_eq!(hub.phase(&slow.id), ViewerPhase::Closed);
        assert_eq!(hub.phase(&fast.id), ViewerPhase::Active);
        assert_eq!(hub.viewer_count(), 1);
        assert_eq!(
            hub.metrics
                .viewers_dropped_total
                .with_label_values(&["lagging"])
                .get(),
            1.0
        );
    }

    #[test]
    fn test_closed_receiver_removed_on_next_broadcast() {
        let hub = hub(4);
        let sub = hub.attach().unwrap();
        let id = sub.id;
        drop(sub);

        assert_eq!(hub.heartbeat().unwrap(), 0);
        assert_eq!(hub.phase(&id), ViewerPhase::Closed);
    }

    #[test]
    fn test_heartbeat_resends_current_state() {
        let hub = hub(4);
        hub.publish(state_with("coding")).unwrap();
        let mut sub = hub.attach().unwrap();
        sub.rx.try_recv().unwrap();

        assert_eq!(hub.heartbeat().unwrap(), 1);
        let beat = decode(sub.rx.try_recv().unwrap());
        assert!(matches!(beat, ViewerMessage::Update { .. }));
        assert_eq!(beat.data(), hub.snapshot().as_ref());
    }

    #[test]
    fn test_detach_is_idempotent() {
        let hub = hub(4);
        let sub = hub.attach().unwrap();
        assert!(hub.detach(&sub.id, DisconnectReason::Closed));
        assert!(!hub.detach(&sub.id, DisconnectReason::WriteError));
        assert_eq!(hub.metrics.viewers_connected.get(), 0.0);
    }

    #[test]
    fn test_close_all_ends_subscriptions() {
        let hub = hub(4);
        let mut sub = hub.attach().unwrap();
        hub.close_all();

        // Initial is still buffered, then the queue reports closed
        assert!(sub.rx.try_recv().is_ok());
        assert!(matches!(
            sub.rx.try_recv(),
            Err(mpsc::error::TryRecvError::Disconnected)
        ));
        assert_eq!(hub.viewer_count(), 0);
    }
}
