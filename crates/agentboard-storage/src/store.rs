//! File-backed metrics store

use crate::atomic_writer::AtomicWriter;
use crate::config::StoreConfig;
use crate::traits::{MetricsStore, StorageError, StorageResult};
use agentboard_core::{AgentEvent, DashboardState, fold_with};
use chrono::Utc;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};
use tracing::{debug, info, warn};

/// How a `load` obtained its state
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadStatus {
    /// Parsed from the snapshot file
    Loaded,
    /// No snapshot yet; the state is fresh
    Missing,
    /// The snapshot exists but could not be read; the state is fresh
    Unreadable(String),
    /// The snapshot was read but did not parse; the state is fresh
    Corrupt(String),
}

/// Metrics store persisting a single JSON snapshot.
///
/// There is no cross-process lock: every save is an atomic rename, so
/// readers never see a torn file, but two processes ingesting at once can
/// overwrite each other's update.
pub struct FileMetricsStore {
    config: StoreConfig,
    ingest_lock: Mutex<()>,
}

impl FileMetricsStore {
    pub fn new(config: StoreConfig) -> Self {
        Self {
            config,
            ingest_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.config.path
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Read and parse the snapshot file.
    ///
    /// Returns `Ok(None)` when the file does not exist.
    pub fn read_snapshot(&self) -> StorageResult<Option<DashboardState>> {
        let bytes = match std::fs::read(&self.config.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(StorageError::Io(e)),
        };

        decode_snapshot(&bytes)
            .map(Some)
            .map_err(|e| StorageError::CorruptSnapshot {
                path: self.config.path.clone(),
                reason: e.to_string(),
            })
    }

    /// Load the snapshot and report where it came from.
    pub fn load_with_status(&self) -> (DashboardState, LoadStatus) {
        match self.read_snapshot() {
            Ok(Some(state)) => (state, LoadStatus::Loaded),
            Ok(None) => {
                debug!(path = %self.config.path.display(), "No snapshot yet, starting fresh");
                (self.fresh_state(), LoadStatus::Missing)
            }
            Err(e @ StorageError::CorruptSnapshot { .. }) => {
                warn!(
                    path = %self.config.path.display(),
                    error = %e,
                    "Snapshot corrupt, falling back to empty state"
                );
                (self.fresh_state(), LoadStatus::Corrupt(e.to_string()))
            }
            Err(e) => {
                warn!(
                    path = %self.config.path.display(),
                    error = %e,
                    "Snapshot unreadable, falling back to empty state"
                );
                (self.fresh_state(), LoadStatus::Unreadable(e.to_string()))
            }
        }
    }

    fn fresh_state(&self) -> DashboardState {
        DashboardState::new(self.config.project_name.as_str())
    }

    /// Copy a corrupt snapshot aside so the next save does not destroy it.
    ///
    /// The original stays in place until a save replaces it.
    fn quarantine(&self) -> StorageResult<PathBuf> {
        let mut target = self.config.path.as_os_str().to_owned();
        target.push(format!(".corrupt-{}", Utc::now().timestamp()));
        let target = PathBuf::from(target);
        std::fs::copy(&self.config.path, &target)?;
        Ok(target)
    }
}

impl MetricsStore for FileMetricsStore {
    fn load(&self) -> DashboardState {
        self.load_with_status().0
    }

    fn save(&self, state: &mut DashboardState) -> StorageResult<()> {
        state.updated_at = Utc::now();
        let content = serde_json::to_vec_pretty(state)
            .map_err(|e| StorageError::Serialization(format!("Failed to serialize snapshot: {}", e)))?;

        let path = self.config.path.clone();
        let write_failure = |source| StorageError::WriteFailure {
            path: path.clone(),
            source,
        };

        let mut writer = AtomicWriter::new(&self.config.path).map_err(write_failure)?;
        writer.write(&content).map_err(write_failure)?;
        writer.commit().map_err(write_failure)?;

        debug!(path = %self.config.path.display(), bytes = content.len(), "Snapshot saved");
        Ok(())
    }

    fn ingest(&self, event: AgentEvent) -> StorageResult<DashboardState> {
        event
            .validate()
            .map_err(|e| StorageError::InvalidEvent(e.to_string()))?;

        // The guard protects no data, only the load-modify-save sequence
        let _guard = self
            .ingest_lock
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        // An unreadable file is not a reason to reset; leave it alone
        let mut state = match self.read_snapshot() {
            Ok(Some(state)) => state,
            Ok(None) => self.fresh_state(),
            Err(e @ StorageError::CorruptSnapshot { .. }) => {
                warn!(error = %e, "Snapshot corrupt, starting from empty state");
                if self.config.quarantine_corrupt {
                    match self.quarantine() {
                        Ok(copy) => warn!(to = %copy.display(), "Quarantined corrupt snapshot"),
                        Err(e) => warn!(error = %e, "Failed to quarantine corrupt snapshot"),
                    }
                }
                self.fresh_state()
            }
            Err(e) => return Err(e),
        };

        let agent = event.agent_name.clone();
        let prior = state.agents.remove(&agent);
        let profile = fold_with(&self.config.aggregation, prior, &event);
        let (level, xp) = (profile.level, profile.xp);
        state.agents.insert(agent.clone(), profile);

        state.record_session(&event, self.config.max_sessions);
        state.push_event(event, self.config.max_recent_events);
        state.recompute_totals();

        self.save(&mut state)?;
        info!(agent = %agent, level, xp, "Event ingested");
        Ok(state)
    }
}

/// Parse snapshot bytes
pub(crate) fn decode_snapshot(bytes: &[u8]) -> Result<DashboardState, serde_json::Error> {
    serde_json::from_slice(bytes)
}
