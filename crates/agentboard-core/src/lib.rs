//! Agentboard Core Types and Aggregation
//!
//! This crate provides the fundamental types used throughout Agentboard:
//! - Agent invocation events and the profiles derived from them
//! - The persisted dashboard snapshot
//! - The aggregation fold that turns one event into an updated profile
//! - The closed set of achievements and the level curve

pub mod achievements;
pub mod aggregate;
pub mod error;
pub mod event;
pub mod profile;
pub mod state;

pub use achievements::Achievement;
pub use aggregate::{AggregationRules, fold, fold_with, level_for_xp, xp_for_level};
pub use error::{Error, Result};
pub use event::{AgentEvent, ArtifactKind, EventStatus};
pub use profile::{AgentProfile, OutcomeMark};
pub use state::{DashboardState, SNAPSHOT_VERSION, SessionSummary};
