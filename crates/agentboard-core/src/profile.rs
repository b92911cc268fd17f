//! Cumulative per-agent statistics

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Timestamped outcome kept for the trailing-day window
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OutcomeMark {
    pub ended_at: DateTime<Utc>,
    pub success: bool,
}

/// Derived cumulative statistics for one agent.
///
/// Profiles are owned by the metrics store and only ever replaced by the
/// result of [`crate::aggregate::fold`]. Rates are recomputed from the
/// counters on every fold and `level` always follows `xp` through the
/// level curve.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentProfile {
    pub agent_name: String,

    // Invocation counters
    pub total_invocations: u64,
    pub successful_invocations: u64,
    pub failed_invocations: u64,
    /// Timeouts are neither successes nor failures
    pub timeout_invocations: u64,

    // Resource totals
    pub total_tokens: u64,
    pub total_cost_usd: f64,
    pub total_duration_seconds: f64,

    // Derived rates
    pub success_rate: f64,
    pub avg_duration_seconds: f64,
    pub avg_tokens_per_call: f64,
    pub cost_per_success: f64,

    // Artifact counters
    pub commits: u64,
    pub pull_requests: u64,
    pub files_modified: u64,
    pub tests_written: u64,
    pub reviews: u64,

    // Progression
    pub xp: u64,
    pub level: u32,
    pub current_streak: u64,
    pub best_streak: u64,
    /// Unlocked achievement ids in unlock order
    pub achievements: Vec<String>,
    pub strengths: Vec<String>,
    pub weaknesses: Vec<String>,

    /// Most recent event ids, oldest first
    pub recent_events: Vec<String>,
    /// Outcomes inside the trailing-day window, oldest first
    pub recent_outcomes: Vec<OutcomeMark>,
    /// UTC day on which the perfect-day bonus was last awarded
    pub last_perfect_day: Option<NaiveDate>,

    /// Number of distinct consecutive sessions this agent took part in
    pub sessions: u64,
    pub last_session_id: String,

    /// Message of the most recent failure, if any
    pub last_error: String,
    pub first_seen: Option<DateTime<Utc>>,
    pub last_active: Option<DateTime<Utc>>,
}

impl AgentProfile {
    /// Fresh profile with all counters at zero
    pub fn new(agent_name: impl Into<String>) -> Self {
        Self {
            agent_name: agent_name.into(),
            level: 1,
            ..Default::default()
        }
    }

    pub fn has_achievement(&self, id: &str) -> bool {
        self.achievements.iter().any(|a| a == id)
    }

    /// Recompute the ratio fields from the counters.
    pub(crate) fn recompute_rates(&mut self) {
        self.success_rate = if self.total_invocations == 0 {
            0.0
        } else {
            self.successful_invocations as f64 / self.total_invocations as f64
        };
        self.cost_per_success = if self.successful_invocations == 0 {
            0.0
        } else {
            self.total_cost_usd / self.successful_invocations as f64
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_profile_starts_at_level_one() {
        let profile = AgentProfile::new("review");
        assert_eq!(profile.agent_name, "review");
        assert_eq!(profile.level, 1);
        assert_eq!(profile.total_invocations, 0);
        assert!(profile.achievements.is_empty());
    }

    #[test]
    fn test_rates_with_zero_counters() {
        let mut profile = AgentProfile::new("review");
        profile.recompute_rates();
        assert_eq!(profile.success_rate, 0.0);
        assert_eq!(profile.cost_per_success, 0.0);
    }

    #[test]
    fn test_partial_record_fills_defaults() {
        let profile: AgentProfile =
            serde_json::from_str(r#"{"agent_name": "docs", "xp": 120}"#).unwrap();
        assert_eq!(profile.xp, 120);
        assert_eq!(profile.best_streak, 0);
        assert!(profile.last_active.is_none());
    }
}
