//! Storage trait definitions

use agentboard_core::{AgentEvent, DashboardState};
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Corrupt snapshot at {path}: {reason}")]
    CorruptSnapshot { path: PathBuf, reason: String },

    #[error("Failed to write snapshot {path}: {source}")]
    WriteFailure {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid event: {0}")]
    InvalidEvent(String),

    #[error("Watcher error: {0}")]
    Watcher(String),
}

pub type StorageResult<T> = Result<T, StorageError>;

/// Store owning the canonical dashboard snapshot
pub trait MetricsStore: Send + Sync {
    /// Read the persisted snapshot.
    ///
    /// Never fails: a missing or unparseable file yields a fresh empty state.
    fn load(&self) -> DashboardState;

    /// Persist the snapshot atomically, refreshing `updated_at` first.
    fn save(&self, state: &mut DashboardState) -> StorageResult<()>;

    /// Load, fold the event into its agent profile, recompute totals, save,
    /// and return the new state.
    ///
    /// A snapshot that exists but cannot be read fails with `Io` and is left
    /// untouched. Calls on the same store are serialized. Separate processes racing
    /// `ingest` can both start from the same base state; whichever rename
    /// lands last wins.
    fn ingest(&self, event: AgentEvent) -> StorageResult<DashboardState>;
}
