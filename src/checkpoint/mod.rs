//! Checkpoint module for durable crawl progress
//!
//! This module handles everything the crawl writes as its source of truth:
//! - The append-only CSV row log and its fallback locations
//! - Reading the log back to estimate where to resume
//! - The skip log of pages given up on

mod csv;
mod skip_log;
mod store;
mod traits;

pub use csv::{encode_row, parse as parse_csv};
pub use skip_log::{SkipEntry, SkipLog};
pub use store::CsvCheckpoint;
pub use traits::{
    estimated_cursor, page_of, CheckpointError, CheckpointResult, CheckpointSnapshot, RowSink,
    SnapshotLoader,
};
