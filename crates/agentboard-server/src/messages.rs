//! Live channel wire format
//!
//! Server to viewer:
//! - `{"type": "initial", "data": <DashboardState>}` once, right after the handshake
//! - `{"type": "update", "data": <DashboardState>, "timestamp": "<RFC 3339>"}` on
//!   every change and every heartbeat
//!
//! Viewers may send the literal text `ping` and get `pong` back.

use agentboard_core::DashboardState;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const PING: &str = "ping";
pub const PONG: &str = "pong";

/// Outgoing message, borrowing the state it carries
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum LiveMessage<'a> {
    Initial {
        data: &'a DashboardState,
    },
    Update {
        data: &'a DashboardState,
        timestamp: DateTime<Utc>,
    },
}

impl<'a> LiveMessage<'a> {
    pub fn initial(data: &'a DashboardState) -> Self {
        LiveMessage::Initial { data }
    }

    pub fn update(data: &'a DashboardState, timestamp: DateTime<Utc>) -> Self {
        LiveMessage::Update { data, timestamp }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            LiveMessage::Initial { .. } => "initial",
            LiveMessage::Update { .. } => "update",
        }
    }

    pub fn to_text(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

/// Decoded form of [`LiveMessage`] for clients
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ViewerMessage {
    Initial {
        data: DashboardState,
    },
    Update {
        data: DashboardState,
        timestamp: DateTime<Utc>,
    },
}

impl ViewerMessage {
    pub fn parse(text: &str) -> serde_json::Result<Self> {
        serde_json::from_str(text)
    }

    pub fn data(&self) -> &DashboardState {
        match self {
            ViewerMessage::Initial { data } | ViewerMessage::Update { data, .. } => data,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;

    #[test]
    fn test_initial_shape() {
        let state = DashboardState::new("demo");
        let text = LiveMessage::initial(&state).to_text().unwrap();
        let value: Value = serde_json::from_str(&text).unwrap();

        assert_eq!(value["type"], "initial");
        assert_eq!(value["data"]["project_name"], "demo");
        assert!(value.get("timestamp").is_none());
    }

    #[test]
    fn test_update_shape_carries_timestamp() {
        let state = DashboardState::new("demo");
        let now = Utc::now();
        let message = LiveMessage::update(&state, now);
        assert_eq!(message.kind(), "update");

        let decoded = ViewerMessage::parse(&message.to_text().unwrap()).unwrap();
        match decoded {
            ViewerMessage::Update { data, timestamp } => {
                assert_eq!(data, state);
                assert_eq!(timestamp, now);
            }
            other => panic!("expected update, got {:?}", other),
        }
    }

    #[test]
    fn test_unknown_type_rejected() {
        assert!(ViewerMessage::parse(r#"{"type":"diff","data":{}}"#).is_err());
    }
}
