//! Aggregation engine
//!
//! [`fold`] is the single place where an [`AgentProfile`] changes: it takes
//! the prior profile (or none) and one [`AgentEvent`] and returns the next
//! profile. It performs no I/O and every update is O(1) in the number of
//! past events, apart from the bounded recent-event and trailing-day lists.

use crate::achievements::newly_unlocked;
use crate::event::{AgentEvent, ArtifactKind, EventStatus};
use crate::profile::{AgentProfile, OutcomeMark};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Highest reachable level
pub const MAX_LEVEL: u32 = 100;

/// Tunable constants for the fold
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AggregationRules {
    /// XP for every successful event
    pub base_xp: u64,
    /// Extra XP for a success faster than `fast_threshold_seconds`
    pub fast_bonus_xp: u64,
    pub fast_threshold_seconds: f64,
    /// Extra XP for the agent's very first invocation
    pub first_invocation_xp: u64,
    /// Extra XP when the streak lands exactly on a milestone
    pub streak_bonus_xp: u64,
    pub streak_milestones: Vec<u64>,
    /// Extra XP, once per UTC day, for an all-success trailing day
    pub perfect_day_xp: u64,
    pub perfect_day_min_events: usize,
    /// Capacity of `AgentProfile::recent_events`
    pub recent_event_capacity: usize,
    /// Capacity of the trailing-day outcome window
    pub outcome_window_capacity: usize,
    /// Invocations required before strength/weakness tags are assigned
    pub tag_min_invocations: u64,
}

impl Default for AggregationRules {
    fn default() -> Self {
        Self {
            base_xp: 10,
            fast_bonus_xp: 5,
            fast_threshold_seconds: 30.0,
            first_invocation_xp: 50,
            streak_bonus_xp: 25,
            streak_milestones: vec![5, 10, 25, 50, 100],
            perfect_day_xp: 100,
            perfect_day_min_events: 5,
            recent_event_capacity: 20,
            outcome_window_capacity: 256,
            tag_min_invocations: 5,
        }
    }
}

/// Cumulative XP required to reach `level`.
///
/// Level 1 is free; level `n` needs `50 * n * (n - 1)`.
pub fn xp_for_level(level: u32) -> u64 {
    let n = u64::from(level.clamp(1, MAX_LEVEL));
    50 * n * (n - 1)
}

/// Highest level whose threshold `xp` meets.
pub fn level_for_xp(xp: u64) -> u32 {
    let mut level = 1;
    while level < MAX_LEVEL && xp_for_level(level + 1) <= xp {
        level += 1;
    }
    level
}

/// Fold one event into a profile using the default rules.
pub fn fold(prior: Option<AgentProfile>, event: &AgentEvent) -> AgentProfile {
    fold_with(&AggregationRules::default(), prior, event)
}

/// Fold one event into a profile.
///
/// A missing prior profile is seeded from the event's agent name. The event
/// id is not checked against earlier ones; de-duplication belongs to the
/// caller.
pub fn fold_with(
    rules: &AggregationRules,
    prior: Option<AgentProfile>,
    event: &AgentEvent,
) -> AgentProfile {
    let mut profile = prior.unwrap_or_else(|| AgentProfile::new(event.agent_name.as_str()));
    let first_invocation = profile.total_invocations == 0;
    let success = event.status.is_success();

    profile.total_invocations += 1;
    match event.status {
        EventStatus::Success => profile.successful_invocations += 1,
        EventStatus::Failure => profile.failed_invocations += 1,
        EventStatus::Timeout => profile.timeout_invocations += 1,
    }

    // Running means, updated in place
    let tokens = event.token_count();
    let n = profile.total_invocations as f64;
    profile.total_tokens = profile.total_tokens.saturating_add(tokens);
    profile.total_cost_usd += event.cost_usd;
    profile.total_duration_seconds += event.duration_seconds;
    profile.avg_duration_seconds += (event.duration_seconds - profile.avg_duration_seconds) / n;
    profile.avg_tokens_per_call += (tokens as f64 - profile.avg_tokens_per_call) / n;
    profile.recompute_rates();
    count_artifacts(&mut profile, event);

    if success {
        profile.current_streak += 1;
        profile.best_streak = profile.best_streak.max(profile.current_streak);
    } else {
        profile.current_streak = 0;
    }

    if !event.session_id.is_empty() && event.session_id != profile.last_session_id {
        profile.sessions += 1;
        profile.last_session_id = event.session_id.clone();
    }

    let gained = award_xp(rules, &mut profile, event, first_invocation);
    profile.xp = profile.xp.saturating_add(gained);
    profile.level = level_for_xp(profile.xp).max(profile.level);

    for achievement in newly_unlocked(&profile, event) {
        debug!(
            agent = %profile.agent_name,
            achievement = achievement.id(),
            "Achievement unlocked"
        );
        profile.achievements.push(achievement.id().to_string());
    }

    profile.recent_events.push(event.event_id.clone());
    trim_front(&mut profile.recent_events, rules.recent_event_capacity);

    profile.last_active = Some(event.ended_at);
    profile.first_seen.get_or_insert(event.started_at);
    if event.status == EventStatus::Failure {
        profile.last_error = event.error_message.clone();
    }

    assign_tags(rules, &mut profile);
    profile
}

fn count_artifacts(profile: &mut AgentProfile, event: &AgentEvent) {
    for artifact in &event.artifacts {
        match ArtifactKind::classify(artifact) {
            Some(ArtifactKind::Commit) => profile.commits += 1,
            Some(ArtifactKind::PullRequest) => profile.pull_requests += 1,
            Some(ArtifactKind::File) => profile.files_modified += 1,
            Some(ArtifactKind::Test) => profile.tests_written += 1,
            Some(ArtifactKind::Review) => profile.reviews += 1,
            None => {}
        }
    }
}

/// XP earned by this event. Also maintains the trailing-day window, which
/// the perfect-day bonus reads.
fn award_xp(
    rules: &AggregationRules,
    profile: &mut AgentProfile,
    event: &AgentEvent,
    first_invocation: bool,
) -> u64 {
    let success = event.status.is_success();
    let mut xp = 0;

    if first_invocation {
        xp += rules.first_invocation_xp;
    }
    if success {
        xp += rules.base_xp;
        if event.duration_seconds < rules.fast_threshold_seconds {
            xp += rules.fast_bonus_xp;
        }
        if rules.streak_milestones.contains(&profile.current_streak) {
            xp += rules.streak_bonus_xp;
        }
    }

    if update_day_window(rules, profile, event) {
        xp += rules.perfect_day_xp;
    }
    xp
}

/// Record the event in the trailing-day window and report whether it
/// completes a perfect day not yet rewarded.
fn update_day_window(
    rules: &AggregationRules,
    profile: &mut AgentProfile,
    event: &AgentEvent,
) -> bool {
    let cutoff = event.ended_at - chrono::Duration::hours(24);
    profile.recent_outcomes.push(OutcomeMark {
        ended_at: event.ended_at,
        success: event.status.is_success(),
    });
    profile.recent_outcomes.retain(|mark| mark.ended_at > cutoff);
    trim_front(&mut profile.recent_outcomes, rules.outcome_window_capacity);

    let today = event.ended_at.date_naive();
    let perfect = event.status.is_success()
        && profile.recent_outcomes.len() >= rules.perfect_day_min_events
        && profile.recent_outcomes.iter().all(|mark| mark.success)
        && profile.last_perfect_day != Some(today);
    if perfect {
        profile.last_perfect_day = Some(today);
    }
    perfect
}

fn assign_tags(rules: &AggregationRules, profile: &mut AgentProfile) {
    profile.strengths.clear();
    profile.weaknesses.clear();
    if profile.total_invocations < rules.tag_min_invocations {
        return;
    }

    if profile.success_rate >= 0.9 {
        profile.strengths.push("reliable".into());
    }
    if profile.avg_duration_seconds < 30.0 {
        profile.strengths.push("fast".into());
    }
    if profile.avg_tokens_per_call < 2_000.0 {
        profile.strengths.push("frugal".into());
    }

    if profile.success_rate < 0.5 {
        profile.weaknesses.push("error_prone".into());
    }
    if profile.avg_duration_seconds > 300.0 {
        profile.weaknesses.push("slow".into());
    }
    if profile.avg_tokens_per_call > 20_000.0 {
        profile.weaknesses.push("token_hungry".into());
    }
}

fn trim_front<T>(items: &mut Vec<T>, max: usize) {
    if items.len() > max {
        let excess = items.len() - max;
        items.drain(..excess);
    }
}
