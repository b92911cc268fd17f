//! Snapshot change detection for read-only processes
//!
//! The monitor compares a cheap metadata fingerprint on every poll and only
//! reads and parses the file when the fingerprint moved. A content digest
//! filters out rewrites that did not change anything.
//!
//! Timestamps can be coarse, so a fingerprint whose mtime falls within
//! `RACY_WINDOW` of the last read is not trusted and the file is re-hashed.

use crate::store::decode_snapshot;
use agentboard_core::DashboardState;
use sha2::{Digest, Sha256};
use std::fs::Metadata;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tracing::{debug, warn};

/// Writes landing this close to a read may share its mtime tick
const RACY_WINDOW: Duration = Duration::from_secs(2);

/// Metadata proxy for "the file changed"
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Fingerprint {
    pub modified: Option<SystemTime>,
    pub len: u64,
    /// Inode number; an atomic save usually produces a new one
    pub inode: u64,
    /// Inode change time (seconds, nanoseconds); moves on every rename
    pub changed: Option<(i64, i64)>,
}

impl Fingerprint {
    fn from_metadata(metadata: &Metadata) -> Self {
        let (inode, changed) = inode_of(metadata);
        Self {
            modified: metadata.modified().ok(),
            len: metadata.len(),
            inode,
            changed,
        }
    }

    /// True when a later write could carry the same mtime as this one.
    fn is_racy(&self, read_at: SystemTime) -> bool {
        match self.modified {
            Some(modified) => match read_at.duration_since(modified) {
                Ok(age) => age < RACY_WINDOW,
                Err(_) => true,
            },
            None => true,
        }
    }

    /// Fingerprint of the file at `path`, or `None` when it does not exist.
    pub fn of(path: &Path) -> std::io::Result<Option<Self>> {
        match std::fs::metadata(path) {
            Ok(metadata) => Ok(Some(Self::from_metadata(&metadata))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        }
    }
}

#[cfg(unix)]
fn inode_of(metadata: &Metadata) -> (u64, Option<(i64, i64)>) {
    use std::os::unix::fs::MetadataExt;
    (metadata.ino(), Some((metadata.ctime(), metadata.ctime_nsec())))
}

#[cfg(not(unix))]
fn inode_of(_metadata: &Metadata) -> (u64, Option<(i64, i64)>) {
    (0, None)
}

/// Result of one poll
#[derive(Debug, Clone)]
pub enum MonitorOutcome {
    /// A new snapshot was parsed
    Changed(Box<DashboardState>),
    /// Fingerprint or content unchanged
    Unchanged,
    /// No snapshot file
    Missing,
    /// The read raced a writer or the file is unparseable; retried once
    Stale,
}

impl MonitorOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            MonitorOutcome::Changed(_) => "changed",
            MonitorOutcome::Unchanged => "unchanged",
            MonitorOutcome::Missing => "missing",
            MonitorOutcome::Stale => "stale",
        }
    }

    pub fn into_state(self) -> Option<DashboardState> {
        match self {
            MonitorOutcome::Changed(state) => Some(*state),
            _ => None,
        }
    }
}

/// Watches the snapshot file on behalf of a process that never writes it
pub struct ChangeMonitor {
    path: PathBuf,
    retry_delay: Duration,
    last_fingerprint: Option<Fingerprint>,
    /// Wall clock at the read that produced `last_fingerprint`
    last_read_at: Option<SystemTime>,
    last_digest: Option<[u8; 32]>,
    /// Fingerprint of a file that failed to parse twice
    failed_fingerprint: Option<Fingerprint>,
    last_state: Option<DashboardState>,
}

impl ChangeMonitor {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            retry_delay: Duration::from_millis(50),
            last_fingerprint: None,
            last_read_at: None,
            last_digest: None,
            failed_fingerprint: None,
            last_state: None,
        }
    }

    /// Delay before the single retry after a failed parse
    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Last successfully parsed snapshot
    pub fn current(&self) -> Option<&DashboardState> {
        self.last_state.as_ref()
    }

    /// Fresh state if the snapshot changed since the last poll.
    pub fn poll(&mut self) -> Option<DashboardState> {
        self.check().into_state()
    }

    /// Poll and report why nothing was returned.
    pub fn check(&mut self) -> MonitorOutcome {
        let fingerprint = match Fingerprint::of(&self.path) {
            Ok(Some(fingerprint)) => fingerprint,
            Ok(None) => {
                if self.last_fingerprint.take().is_some() {
                    debug!(path = %self.path.display(), "Snapshot disappeared");
                }
                self.last_digest = None;
                self.failed_fingerprint = None;
                return MonitorOutcome::Missing;
            }
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "Failed to stat snapshot");
                return MonitorOutcome::Stale;
            }
        };

        if self.failed_fingerprint == Some(fingerprint) {
            return MonitorOutcome::Unchanged;
        }
        if self.last_fingerprint == Some(fingerprint) && !self.fingerprint_is_racy() {
            return MonitorOutcome::Unchanged;
        }

        let read_at = SystemTime::now();
        match self.read_snapshot() {
            Some((fingerprint, digest, state)) => {
                self.last_fingerprint = Some(fingerprint);
                self.last_read_at = Some(read_at);
                self.failed_fingerprint = None;
                if self.last_digest == Some(digest) {
                    return MonitorOutcome::Unchanged;
                }
                self.last_digest = Some(digest);
                self.last_state = Some(state.clone());
                MonitorOutcome::Changed(Box::new(state))
            }
            None => {
                debug!(path = %self.path.display(), "Snapshot read raced a writer, skipping this tick");
                self.failed_fingerprint = Fingerprint::of(&self.path).ok().flatten();
                MonitorOutcome::Stale
            }
        }
    }

    fn fingerprint_is_racy(&self) -> bool {
        match (self.last_fingerprint, self.last_read_at) {
            (Some(fingerprint), Some(read_at)) => fingerprint.is_racy(read_at),
            _ => false,
        }
    }

    /// Read and parse the snapshot, retrying once on failure.
    fn read_snapshot(&self) -> Option<(Fingerprint, [u8; 32], DashboardState)> {
        match self.read_once() {
            Ok(read) => Some(read),
            Err(first) => {
                debug!(error = %first, "Snapshot parse failed, retrying once");
                std::thread::sleep(self.retry_delay);
                self.read_once().ok()
            }
        }
    }

    fn read_once(&self) -> Result<(Fingerprint, [u8; 32], DashboardState), String> {
        let mut file = std::fs::File::open(&self.path).map_err(|e| e.to_string())?;
        // Metadata of the opened handle matches the bytes read even if a
        // rename lands meanwhile
        let metadata = file.metadata().map_err(|e| e.to_string())?;
        let mut bytes = Vec::with_capacity(metadata.len() as usize);
        file.read_to_end(&mut bytes).map_err(|e| e.to_string())?;
        let digest: [u8; 32] = Sha256::digest(&bytes).into();
        let state = decode_snapshot(&bytes).map_err(|e| e.to_string())?;
        Ok((Fingerprint::from_metadata(&metadata), digest, state))
    }
}
