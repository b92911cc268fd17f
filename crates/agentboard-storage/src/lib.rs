//! Agentboard Storage
//!
//! This crate owns the on-disk dashboard snapshot:
//! - Atomic snapshot writes (temp file + rename)
//! - The metrics store (load / save / ingest)
//! - Change detection for processes that only read the snapshot
//! - Filesystem wake-ups for the change monitor

pub mod atomic_writer;
pub mod config;
pub mod monitor;
pub mod store;
pub mod traits;
pub mod watcher;

pub use config::StoreConfig;
pub use monitor::{ChangeMonitor, Fingerprint, MonitorOutcome};
pub use store::{FileMetricsStore, LoadStatus};
pub use traits::{MetricsStore, StorageError, StorageResult};
pub use watcher::SnapshotWatcher;
