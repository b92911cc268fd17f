//! Agent invocation events
//!
//! An [`AgentEvent`] is created once by the caller when an agent invocation
//! completes and is never mutated afterwards.

use crate::error::{Error, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Outcome of a single invocation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventStatus {
    Success,
    Failure,
    Timeout,
}

impl EventStatus {
    pub fn is_success(self) -> bool {
        matches!(self, EventStatus::Success)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            EventStatus::Success => "success",
            EventStatus::Failure => "failure",
            EventStatus::Timeout => "timeout",
        }
    }
}

impl std::fmt::Display for EventStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kind of artifact referenced by an event (`commit:<sha>`, `file:<path>`, ...)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactKind {
    Commit,
    PullRequest,
    File,
    Test,
    Review,
}

impl ArtifactKind {
    /// Classify a free-form artifact reference by its prefix.
    ///
    /// Returns `None` for references without a recognised prefix.
    pub fn classify(artifact: &str) -> Option<Self> {
        let (prefix, _) = artifact.split_once(':')?;
        match prefix {
            "commit" => Some(ArtifactKind::Commit),
            "pr" => Some(ArtifactKind::PullRequest),
            "file" => Some(ArtifactKind::File),
            "test" => Some(ArtifactKind::Test),
            "review" => Some(ArtifactKind::Review),
            _ => None,
        }
    }
}

/// One completed agent invocation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentEvent {
    /// Unique event identifier, generated when the document omits it
    #[serde(default = "generate_event_id")]
    pub event_id: String,

    /// Name of the agent that ran
    pub agent_name: String,

    /// Session the invocation belongs to
    #[serde(default)]
    pub session_id: String,

    /// Task or ticket identifier
    #[serde(default)]
    pub task_id: String,

    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,

    /// Wall-clock duration in seconds
    #[serde(default)]
    pub duration_seconds: f64,

    pub status: EventStatus,

    #[serde(default)]
    pub input_tokens: u64,
    #[serde(default)]
    pub output_tokens: u64,
    #[serde(default)]
    pub total_tokens: u64,

    /// Estimated cost in USD
    #[serde(default)]
    pub cost_usd: f64,

    /// Free-form artifact references such as `commit:<sha>` or `file:<path>`
    #[serde(default)]
    pub artifacts: Vec<String>,

    /// Error message, empty on success
    #[serde(default)]
    pub error_message: String,

    /// Model identifier used for the invocation
    #[serde(default)]
    pub model: String,
}

fn generate_event_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

impl AgentEvent {
    /// Build a minimal event with a generated identifier.
    ///
    /// `ended_at` is `started_at + duration_seconds`; token and cost fields
    /// start at zero.
    pub fn new(
        agent_name: impl Into<String>,
        status: EventStatus,
        started_at: DateTime<Utc>,
        duration_seconds: f64,
    ) -> Self {
        let millis = (duration_seconds.max(0.0) * 1000.0).round() as i64;
        Self {
            event_id: generate_event_id(),
            agent_name: agent_name.into(),
            session_id: String::new(),
            task_id: String::new(),
            started_at,
            ended_at: started_at + chrono::Duration::milliseconds(millis),
            duration_seconds: duration_seconds.max(0.0),
            status,
            input_tokens: 0,
            output_tokens: 0,
            total_tokens: 0,
            cost_usd: 0.0,
            artifacts: Vec::new(),
            error_message: String::new(),
            model: String::new(),
        }
    }

    pub fn with_session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = session_id.into();
        self
    }

    pub fn with_task(mut self, task_id: impl Into<String>) -> Self {
        self.task_id = task_id.into();
        self
    }

    /// Set token counts; `total_tokens` becomes `input + output`, saturating.
    pub fn with_tokens(mut self, input_tokens: u64, output_tokens: u64) -> Self {
        self.input_tokens = input_tokens;
        self.output_tokens = output_tokens;
        self.total_tokens = input_tokens.saturating_add(output_tokens);
        self
    }

    pub fn with_cost(mut self, cost_usd: f64) -> Self {
        self.cost_usd = cost_usd;
        self
    }

    pub fn with_artifact(mut self, artifact: impl Into<String>) -> Self {
        self.artifacts.push(artifact.into());
        self
    }

    pub fn with_error(mut self, message: impl Into<String>) -> Self {
        self.error_message = message.into();
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Check the structural invariants callers must uphold before ingesting.
    pub fn validate(&self) -> Result<()> {
        if self.event_id.trim().is_empty() {
            return Err(Error::InvalidEvent("event_id cannot be empty".into()));
        }
        if self.agent_name.trim().is_empty() {
            return Err(Error::InvalidEvent("agent_name cannot be empty".into()));
        }
        if self.ended_at < self.started_at {
            return Err(Error::InvalidEvent(format!(
                "event {} ends before it starts",
                self.event_id
            )));
        }
        if !self.duration_seconds.is_finite() || self.duration_seconds < 0.0 {
            return Err(Error::InvalidEvent(format!(
                "event {} has invalid duration {}",
                self.event_id, self.duration_seconds
            )));
        }
        Ok(())
    }

    /// Token count to account for this event.
    ///
    /// Falls back to `input + output` when the caller left `total_tokens` at zero.
    pub fn token_count(&self) -> u64 {
        if self.total_tokens == 0 {
            self.input_tokens.saturating_add(self.output_tokens)
        } else {
            self.total_tokens
        }
    }
}
