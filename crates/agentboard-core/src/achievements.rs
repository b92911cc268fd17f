//! Closed set of achievements
//!
//! Each achievement is a pure predicate over the freshly folded profile and
//! the event that triggered the fold. Predicates are evaluated in the order
//! of [`Achievement::ALL`] and never depend on each other's outcome.

use crate::event::AgentEvent;
use crate::profile::AgentProfile;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Achievement {
    FirstBlood,
    OnARoll,
    Unstoppable,
    Legendary,
    SpeedDemon,
    Marathoner,
    Centurion,
    Perfectionist,
    Comeback,
    Committer,
    TokenTitan,
    PerfectDay,
}

impl Achievement {
    /// Every achievement, in evaluation order
    pub const ALL: [Achievement; 12] = [
        Achievement::FirstBlood,
        Achievement::OnARoll,
        Achievement::Unstoppable,
        Achievement::Legendary,
        Achievement::SpeedDemon,
        Achievement::Marathoner,
        Achievement::Centurion,
        Achievement::Perfectionist,
        Achievement::Comeback,
        Achievement::Committer,
        Achievement::TokenTitan,
        Achievement::PerfectDay,
    ];

    /// Stable identifier stored in profiles
    pub fn id(self) -> &'static str {
        match self {
            Achievement::FirstBlood => "first_blood",
            Achievement::OnARoll => "on_a_roll",
            Achievement::Unstoppable => "unstoppable",
            Achievement::Legendary => "legendary",
            Achievement::SpeedDemon => "speed_demon",
            Achievement::Marathoner => "marathoner",
            Achievement::Centurion => "centurion",
            Achievement::Perfectionist => "perfectionist",
            Achievement::Comeback => "comeback",
            Achievement::Committer => "committer",
            Achievement::TokenTitan => "token_titan",
            Achievement::PerfectDay => "perfect_day",
        }
    }

    pub fn from_id(id: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|a| a.id() == id)
    }

    pub fn description(self) -> &'static str {
        match self {
            Achievement::FirstBlood => "First successful invocation",
            Achievement::OnARoll => "5 successes in a row",
            Achievement::Unstoppable => "10 successes in a row",
            Achievement::Legendary => "25 successes in a row",
            Achievement::SpeedDemon => "Succeeded in under 10 seconds",
            Achievement::Marathoner => "Succeeded on a run of 30 minutes or more",
            Achievement::Centurion => "100 invocations",
            Achievement::Perfectionist => "Perfect record over at least 20 invocations",
            Achievement::Comeback => "Succeeded right after a failure",
            Achievement::Committer => "10 commits",
            Achievement::TokenTitan => "One million tokens processed",
            Achievement::PerfectDay => "A full day without a single miss",
        }
    }

    /// Whether the predicate holds for `profile` after folding `event`.
    pub fn is_satisfied(self, profile: &AgentProfile, event: &AgentEvent) -> bool {
        let success = event.status.is_success();
        match self {
            Achievement::FirstBlood => success && profile.successful_invocations >= 1,
            Achievement::OnARoll => profile.current_streak >= 5,
            Achievement::Unstoppable => profile.current_streak >= 10,
            Achievement::Legendary => profile.current_streak >= 25,
            Achievement::SpeedDemon => success && event.duration_seconds < 10.0,
            Achievement::Marathoner => success && event.duration_seconds >= 1800.0,
            Achievement::Centurion => profile.total_invocations >= 100,
            Achievement::Perfectionist => {
                profile.total_invocations >= 20
                    && profile.successful_invocations == profile.total_invocations
            }
            Achievement::Comeback => {
                success && profile.current_streak == 1 && profile.failed_invocations >= 1
            }
            Achievement::Committer => profile.commits >= 10,
            Achievement::TokenTitan => profile.total_tokens >= 1_000_000,
            Achievement::PerfectDay => {
                profile.last_perfect_day == Some(event.ended_at.date_naive())
            }
        }
    }
}

/// Achievements that become unlocked by this fold.
///
/// Achievements already present on the profile are skipped without
/// evaluating their predicate.
pub fn newly_unlocked(profile: &AgentProfile, event: &AgentEvent) -> Vec<Achievement> {
    Achievement::ALL
        .into_iter()
        .filter(|a| !profile.has_achievement(a.id()))
        .filter(|a| a.is_satisfied(profile, event))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::EventStatus;
    use chrono::Utc;

    #[test]
    fn test_ids_round_trip_and_are_unique() {
        let mut seen = std::collections::HashSet::new();
        for achievement in Achievement::ALL {
            assert!(seen.insert(achievement.id()));
            assert_eq!(Achievement::from_id(achievement.id()), Some(achievement));
        }
        assert_eq!(Achievement::from_id("nonexistent"), None);
    }

    #[test]
    fn test_streak_thresholds() {
        let event = AgentEvent::new("coding", EventStatus::Success, Utc::now(), 60.0);
        let mut profile = AgentProfile::new("coding");
        profile.total_invocations = 10;
        profile.successful_invocations = 10;
        profile.current_streak = 10;

        let unlocked = newly_unlocked(&profile, &event);
        assert!(unlocked.contains(&Achievement::FirstBlood));
        assert!(unlocked.contains(&Achievement::OnARoll));
        assert!(unlocked.contains(&Achievement::Unstoppable));
        assert!(!unlocked.contains(&Achievement::Legendary));
    }

    #[test]
    fn test_unlocked_achievements_are_skipped() {
        let event = AgentEvent::new("coding", EventStatus::Success, Utc::now(), 3.0);
        let mut profile = AgentProfile::new("coding");
        profile.total_invocations = 1;
        profile.successful_invocations = 1;
        profile.current_streak = 1;
        profile.achievements.push("first_blood".into());

        let unlocked = newly_unlocked(&profile, &event);
        assert_eq!(unlocked, vec![Achievement::SpeedDemon]);
    }

    #[test]
    fn test_comeback_requires_prior_failure() {
        let event = AgentEvent::new("coding", EventStatus::Success, Utc::now(), 60.0);
        let mut profile = AgentProfile::new("coding");
        profile.total_invocations = 2;
        profile.successful_invocations = 1;
        profile.current_streak = 1;
        assert!(!Achievement::Comeback.is_satisfied(&profile, &event));

        profile.failed_invocations = 1;
        assert!(Achievement::Comeback.is_satisfied(&profile, &event));
    }

    #[test]
    fn test_failures_do_not_unlock_success_achievements() {
        let event = AgentEvent::new("coding", EventStatus::Failure, Utc::now(), 1.0);
        let mut profile = AgentProfile::new("coding");
        profile.total_invocations = 1;
        profile.failed_invocations = 1;

        assert!(newly_unlocked(&profile, &event).is_empty());
    }
}
