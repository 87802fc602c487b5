//! Checkpoint traits and error types
//!
//! The controller only talks to persistence through two narrow seams: a
//! [`RowSink`] that appends rows durably and a [`SnapshotLoader`] that reads
//! back what was written so the resume position can be computed.

use crate::state::Record;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors that can occur while persisting rows
#[derive(Debug, Error)]
pub enum CheckpointError {
    #[error("IO error on {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("No writable checkpoint location (tried {tried:?})")]
    NoWritableLocation { tried: Vec<PathBuf> },

    #[error("Malformed checkpoint data: {0}")]
    Malformed(String),
}

/// Result type for checkpoint operations
pub type CheckpointResult<T> = Result<T, CheckpointError>;

/// Everything previously persisted, plus the arithmetic resume estimate
#[derive(Debug, Clone, Default)]
pub struct CheckpointSnapshot {
    /// Records in insertion order
    pub records: Vec<Record>,

    /// floor(len / page_size) + 1, or 1 when empty
    pub estimated_cursor: u32,

    /// Page size the estimate was computed with
    pub page_size: u32,
}

impl CheckpointSnapshot {
    pub fn new(records: Vec<Record>, page_size: u32) -> Self {
        let estimated_cursor = estimated_cursor(records.len(), page_size);
        Self {
            records,
            estimated_cursor,
            page_size,
        }
    }

    pub fn empty(page_size: u32) -> Self {
        Self::new(Vec::new(), page_size)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// The last record carrying an identifier, with its zero-based position
    pub fn last_identified(&self) -> Option<(usize, &str)> {
        self.records
            .iter()
            .enumerate()
            .rev()
            .find_map(|(pos, record)| record.identifier().map(|id| (pos, id)))
    }

    /// Page expected to hold the record at `position`, assuming stable ordering
    pub fn page_of(&self, position: usize) -> u32 {
        page_of(position, self.page_size)
    }

    /// All non-blank identifiers in the checkpoint
    pub fn identifiers(&self) -> impl Iterator<Item = &str> {
        self.records.iter().filter_map(Record::identifier)
    }
}

/// Arithmetic resume cursor: floor(len / page_size) + 1
pub fn estimated_cursor(len: usize, page_size: u32) -> u32 {
    let page_size = page_size.max(1) as usize;
    (len / page_size) as u32 + 1
}

/// One-based page holding the zero-based `position`
pub fn page_of(position: usize, page_size: u32) -> u32 {
    let page_size = page_size.max(1) as usize;
    (position / page_size) as u32 + 1
}

/// Durable, ordered, append-only row output
pub trait RowSink {
    /// Appends rows after making sure the header exists exactly once
    ///
    /// Duplicate rows are written as given; suppressing them is not the
    /// sink's job.
    fn append(&mut self, records: &[Record]) -> CheckpointResult<()>;

    /// Where the next append will land
    fn location(&self) -> &Path;
}

/// Reader for previously persisted rows
pub trait SnapshotLoader {
    /// Reads every persisted row; failures yield an empty snapshot
    fn load(&self) -> CheckpointSnapshot;

    /// Reads every row written so far, wherever the writes landed
    ///
    /// Differs from [`load`](Self::load) only for sinks that can move their
    /// writes to another location mid-run.
    fn load_written(&self) -> CheckpointSnapshot {
        self.load()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(id: &str) -> Record {
        Record::from_cells(vec!["p", "a", "d", "c", id, "ap", "m", "2020"])
    }

    #[test]
    fn test_estimated_cursor() {
        assert_eq!(estimated_cursor(0, 10), 1);
        assert_eq!(estimated_cursor(9, 10), 1);
        assert_eq!(estimated_cursor(10, 10), 2);
        assert_eq!(estimated_cursor(25, 10), 3);
    }

    #[test]
    fn test_page_of() {
        assert_eq!(page_of(0, 10), 1);
        assert_eq!(page_of(9, 10), 1);
        assert_eq!(page_of(10, 10), 2);
    }

    #[test]
    fn test_last_identified_skips_blank_tail() {
        let snapshot = CheckpointSnapshot::new(
            vec![record("REG-001"), record("REG-002"), record(" ")],
            10,
        );
        assert_eq!(snapshot.last_identified(), Some((1, "REG-002")));
        assert_eq!(snapshot.identifiers().count(), 2);
    }

    #[test]
    fn test_empty_snapshot() {
        let snapshot = CheckpointSnapshot::empty(10);
        assert!(snapshot.is_empty());
        assert_eq!(snapshot.estimated_cursor, 1);
        assert_eq!(snapshot.last_identified(), None);
    }
}
