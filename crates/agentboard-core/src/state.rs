//! The persisted dashboard snapshot

use crate::event::AgentEvent;
use crate::profile::AgentProfile;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Current snapshot format version
pub const SNAPSHOT_VERSION: u32 = 1;

/// Summary of one session, keyed by session id
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionSummary {
    pub session_id: String,
    pub task_id: String,
    /// Agents that reported events in this session, in first-seen order
    pub agents: Vec<String>,
    pub invocations: u64,
    pub successes: u64,
    pub total_tokens: u64,
    pub total_cost_usd: f64,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
}

impl SessionSummary {
    fn from_event(event: &AgentEvent) -> Self {
        Self {
            session_id: event.session_id.clone(),
            task_id: event.task_id.clone(),
            started_at: Some(event.started_at),
            ended_at: Some(event.ended_at),
            ..Default::default()
        }
    }

    fn absorb(&mut self, event: &AgentEvent) {
        if !self.agents.iter().any(|a| a == &event.agent_name) {
            self.agents.push(event.agent_name.clone());
        }
        if self.task_id.is_empty() {
            self.task_id = event.task_id.clone();
        }
        self.invocations += 1;
        if event.status.is_success() {
            self.successes += 1;
        }
        self.total_tokens = self.total_tokens.saturating_add(event.token_count());
        self.total_cost_usd += event.cost_usd;
        self.started_at = Some(match self.started_at {
            Some(start) => start.min(event.started_at),
            None => event.started_at,
        });
        self.ended_at = Some(match self.ended_at {
            Some(end) => end.max(event.ended_at),
            None => event.ended_at,
        });
    }
}

/// Canonical snapshot of everything the dashboard shows.
///
/// Unknown fields are ignored on load so older readers keep working when
/// newer writers add fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DashboardState {
    #[serde(default = "default_version")]
    pub version: u32,
    #[serde(default)]
    pub project_name: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,

    // Project-wide totals, each the sum over `agents`
    #[serde(default)]
    pub total_sessions: u64,
    #[serde(default)]
    pub total_tokens: u64,
    #[serde(default)]
    pub total_cost_usd: f64,
    #[serde(default)]
    pub total_duration_seconds: f64,

    #[serde(default)]
    pub agents: BTreeMap<String, AgentProfile>,
    /// Recent events, oldest first
    #[serde(default)]
    pub events: Vec<AgentEvent>,
    /// Recent sessions, least recently active first
    #[serde(default)]
    pub sessions: Vec<SessionSummary>,
}

fn default_version() -> u32 {
    SNAPSHOT_VERSION
}

impl DashboardState {
    /// Empty state for a project
    pub fn new(project_name: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            version: SNAPSHOT_VERSION,
            project_name: project_name.into(),
            created_at: now,
            updated_at: now,
            total_sessions: 0,
            total_tokens: 0,
            total_cost_usd: 0.0,
            total_duration_seconds: 0.0,
            agents: BTreeMap::new(),
            events: Vec::new(),
            sessions: Vec::new(),
        }
    }

    /// Recompute the project totals as the sum over all agent profiles.
    pub fn recompute_totals(&mut self) {
        let profiles = self.agents.values();
        self.total_sessions = profiles.clone().map(|p| p.sessions).sum();
        self.total_tokens = profiles
            .clone()
            .fold(0u64, |acc, p| acc.saturating_add(p.total_tokens));
        self.total_cost_usd = profiles.clone().map(|p| p.total_cost_usd).sum();
        self.total_duration_seconds = profiles.map(|p| p.total_duration_seconds).sum();
    }

    /// Append an event to the recent log, evicting the oldest beyond `max_events`.
    pub fn push_event(&mut self, event: AgentEvent, max_events: usize) {
        self.events.push(event);
        trim_front(&mut self.events, max_events);
    }

    /// Fold an event into its session summary and move it to the newest slot.
    ///
    /// Events without a session id are not summarised.
    pub fn record_session(&mut self, event: &AgentEvent, max_sessions: usize) {
        if event.session_id.is_empty() {
            return;
        }
        let mut summary = match self
            .sessions
            .iter()
            .position(|s| s.session_id == event.session_id)
        {
            Some(idx) => self.sessions.remove(idx),
            None => SessionSummary::from_event(event),
        };
        summary.absorb(event);
        self.sessions.push(summary);
        trim_front(&mut self.sessions, max_sessions);
    }

    pub fn agent(&self, name: &str) -> Option<&AgentProfile> {
        self.agents.get(name)
    }
}

/// Drop the oldest entries so that at most `max` remain.
fn trim_front<T>(items: &mut Vec<T>, max: usize) {
    if items.len() > max {
        let excess = items.len() - max;
        items.drain(..excess);
    }
}
