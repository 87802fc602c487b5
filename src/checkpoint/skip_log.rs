//! Durable log of pages given up on
//!
//! One tab-separated line per skipped page: RFC 3339 timestamp, page
//! number, reason. The file is append-only and meant for manual review.

use crate::checkpoint::traits::{CheckpointError, CheckpointResult};
use chrono::{DateTime, Utc};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

/// A page recorded as skipped
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkipEntry {
    pub skipped_at: DateTime<Utc>,
    pub page: u32,
    pub reason: String,
}

/// Append-only skip log file
#[derive(Debug, Clone)]
pub struct SkipLog {
    path: PathBuf,
}

impl SkipLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Appends one entry and syncs it to disk
    pub fn record(&self, page: u32, reason: &str) -> CheckpointResult<SkipEntry> {
        let entry = SkipEntry {
            skipped_at: Utc::now(),
            page,
            reason: reason.replace(['\t', '\n', '\r'], " "),
        };

        let io_err = |source| CheckpointError::Io {
            path: self.path.clone(),
            source,
        };

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(io_err)?;
            }
        }

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(io_err)?;
        writeln!(
            file,
            "{}\t{}\t{}",
            entry.skipped_at.to_rfc3339(),
            entry.page,
            entry.reason
        )
        .map_err(io_err)?;
        file.sync_data().map_err(io_err)?;

        Ok(entry)
    }

    /// Reads all entries; a missing file means no pages were skipped
    ///
    /// Lines that do not parse are ignored.
    pub fn entries(&self) -> CheckpointResult<Vec<SkipEntry>> {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(source) => {
                return Err(CheckpointError::Io {
                    path: self.path.clone(),
                    source,
                })
            }
        };

        Ok(content.lines().filter_map(parse_line).collect())
    }
}

fn parse_line(line: &str) -> Option<SkipEntry> {
    let mut parts = line.splitn(3, '\t');
    let skipped_at = DateTime::parse_from_rfc3339(parts.next()?)
        .ok()?
        .with_timezone(&Utc);
    let page = parts.next()?.trim().parse().ok()?;
    let reason = parts.next().unwrap_or("").to_string();
    Some(SkipEntry {
        skipped_at,
        page,
        reason,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_missing_log_has_no_entries() {
        let dir = TempDir::new().unwrap();
        let log = SkipLog::new(dir.path().join("skipped.log"));
        assert!(log.entries().unwrap().is_empty());
    }

    #[test]
    fn test_record_and_read_back() {
        let dir = TempDir::new().unwrap();
        let log = SkipLog::new(dir.path().join("nested/skipped.log"));

        log.record(17, "table container missing").unwrap();
        log.record(42, "timed out\twaiting\nfor rows").unwrap();

        let entries = log.entries().unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].page, 17);
        assert_eq!(entries[0].reason, "table container missing");
        assert_eq!(entries[1].page, 42);
        assert_eq!(entries[1].reason, "timed out waiting for rows");
    }

    #[test]
    fn test_garbage_lines_are_ignored() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("skipped.log");
        fs::write(&path, "not a timestamp\t3\tx\n2024-05-01T10:00:00+00:00\t9\tslow\n").unwrap();
        let entries = SkipLog::new(&path).entries().unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].page, 9);
    }
}
