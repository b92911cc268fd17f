//! Filesystem wake-ups for the snapshot file
//!
//! Purely an accelerator: the broadcaster still polls on its interval, the
//! watcher only lets it poll early when the OS reports a change.

use crate::traits::{StorageError, StorageResult};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// Sends `()` on `wake` whenever the snapshot file is created, modified or
/// replaced. Dropping the watcher stops it.
pub struct SnapshotWatcher {
    path: PathBuf,
    _watcher: RecommendedWatcher,
}

impl SnapshotWatcher {
    /// Watch the parent directory of `path`.
    ///
    /// Atomic saves replace the file by rename, which drops a watch placed on
    /// the file itself, so the directory is watched and events are filtered
    /// by file name.
    pub fn spawn(path: impl Into<PathBuf>, wake: mpsc::Sender<()>) -> StorageResult<Self> {
        let path = path.into();
        let file_name = path
            .file_name()
            .map(|name| name.to_os_string())
            .ok_or_else(|| StorageError::Watcher(format!("{} has no file name", path.display())))?;
        let dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        std::fs::create_dir_all(&dir)?;

        let mut watcher = RecommendedWatcher::new(
            move |res: Result<Event, notify::Error>| match res {
                Ok(event) => {
                    if is_snapshot_change(&event, &file_name) {
                        // Full means a wake-up is already pending
                        let _ = wake.try_send(());
                    }
                }
                Err(e) => warn!("File watch error: {}", e),
            },
            notify::Config::default(),
        )
        .map_err(|e| StorageError::Watcher(e.to_string()))?;

        watcher
            .watch(&dir, RecursiveMode::NonRecursive)
            .map_err(|e| StorageError::Watcher(e.to_string()))?;
        debug!(path = %path.display(), "Watching snapshot directory");

        Ok(Self {
            path,
            _watcher: watcher,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

fn is_snapshot_change(event: &Event, file_name: &OsString) -> bool {
    matches!(
        event.kind,
        EventKind::Create(_) | EventKind::Modify(_) | EventKind::Remove(_)
    ) && event
        .paths
        .iter()
        .any(|p| p.file_name() == Some(file_name.as_os_str()))
}
