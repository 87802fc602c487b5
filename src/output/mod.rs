//! Derived outputs
//!
//! This module handles the artifacts built from the checkpoint:
//! - The SQLite snapshot, refreshed periodically during a crawl
//! - Checkpoint statistics for `--stats`

mod snapshot;
pub mod stats;

pub use snapshot::{SnapshotError, SnapshotWriter, SNAPSHOT_SCHEMA};
pub use stats::{compute_statistics, load_statistics, print_statistics, CheckpointStatistics};
