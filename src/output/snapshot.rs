//! SQLite snapshot of the checkpoint
//!
//! A denormalized, read-only convenience copy of the CSV checkpoint and the
//! skip log. It is rebuilt from scratch each time and never read back by
//! the crawler; the CSV stays the source of truth.

use crate::checkpoint::{CheckpointSnapshot, SkipEntry};
use crate::state::FIELD_COUNT;
use chrono::Utc;
use rusqlite::{params, Connection};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors that can occur while writing a snapshot
#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// SQL schema for the snapshot database
pub const SNAPSHOT_SCHEMA: &str = r#"
CREATE TABLE records (
    position INTEGER PRIMARY KEY,
    page INTEGER NOT NULL,
    product_name TEXT NOT NULL,
    active_ingredient TEXT NOT NULL,
    dosage_form TEXT NOT NULL,
    product_category TEXT NOT NULL,
    registration_number TEXT NOT NULL,
    applicant TEXT NOT NULL,
    manufacturer TEXT NOT NULL,
    approval_date TEXT NOT NULL
);

CREATE INDEX idx_records_registration ON records(registration_number);
CREATE INDEX idx_records_page ON records(page);

CREATE TABLE skipped_pages (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    page INTEGER NOT NULL,
    skipped_at TEXT NOT NULL,
    reason TEXT NOT NULL
);

CREATE TABLE snapshot_meta (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
);
"#;

/// Materializes snapshots at a fixed path
#[derive(Debug, Clone)]
pub struct SnapshotWriter {
    path: PathBuf,
}

impl SnapshotWriter {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| "snapshot.db".into());
        name.push(".tmp");
        self.path.with_file_name(name)
    }

    /// Writes a fresh snapshot and swaps it into place
    ///
    /// # Arguments
    ///
    /// * `snapshot` - The checkpoint contents
    /// * `skipped` - Entries of the skip log
    ///
    /// # Returns
    ///
    /// The number of records written
    pub fn write(
        &self,
        snapshot: &CheckpointSnapshot,
        skipped: &[SkipEntry],
    ) -> Result<usize, SnapshotError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let temp = self.temp_path();
        if temp.exists() {
            fs::remove_file(&temp)?;
        }

        {
            let mut conn = Connection::open(&temp)?;
            conn.execute_batch("PRAGMA journal_mode = DELETE; PRAGMA synchronous = NORMAL;")?;
            conn.execute_batch(SNAPSHOT_SCHEMA)?;

            let tx = conn.transaction()?;
            {
                let mut insert = tx.prepare(
                    "INSERT INTO records (position, page, product_name, active_ingredient, dosage_form,
                        product_category, registration_number, applicant, manufacturer, approval_date)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                )?;
                for (position, record) in snapshot.records.iter().enumerate() {
                    let f = record.fields();
                    insert.execute(params![
                        position as i64 + 1,
                        snapshot.page_of(position),
                        f[0],
                        f[1],
                        f[2],
                        f[3],
                        f[4],
                        f[5],
                        f[6],
                        f[7],
                    ])?;
                }

                let mut insert_skip = tx.prepare(
                    "INSERT INTO skipped_pages (page, skipped_at, reason) VALUES (?1, ?2, ?3)",
                )?;
                for entry in skipped {
                    insert_skip.execute(params![
                        entry.page,
                        entry.skipped_at.to_rfc3339(),
                        entry.reason
                    ])?;
                }

                let mut insert_meta =
                    tx.prepare("INSERT INTO snapshot_meta (key, value) VALUES (?1, ?2)")?;
                for (key, value) in [
                    ("created_at", Utc::now().to_rfc3339()),
                    ("record_count", snapshot.len().to_string()),
                    ("page_size", snapshot.page_size.to_string()),
                    ("estimated_cursor", snapshot.estimated_cursor.to_string()),
                    ("field_count", FIELD_COUNT.to_string()),
                ] {
                    insert_meta.execute(params![key, value])?;
                }
            }
            tx.commit()?;
        }

        fs::rename(&temp, &self.path)?;
        tracing::debug!(
            "Snapshot with {} records written to {}",
            snapshot.len(),
            self.path.display()
        );
        Ok(snapshot.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::Record;

    fn record(i: usize) -> Record {
        Record::from_cells(vec![
            format!("Product {}", i),
            "Ingredient".to_string(),
            "Tablet".to_string(),
            "Drugs".to_string(),
            format!("REG-{:03}", i),
            "Applicant".to_string(),
            "Maker".to_string(),
            "2020-01-01".to_string(),
        ])
    }

    #[test]
    fn test_write_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let writer = SnapshotWriter::new(dir.path().join("out/harvest.snapshot.db"));
        let snapshot = CheckpointSnapshot::new((1..=25).map(record).collect(), 10);
        let skipped = vec![SkipEntry {
            skipped_at: Utc::now(),
            page: 4,
            reason: "table missing".to_string(),
        }];

        assert_eq!(writer.write(&snapshot, &skipped).unwrap(), 25);
        assert!(!writer.temp_path().exists());

        let conn = Connection::open(writer.path()).unwrap();
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM records", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 25);

        let (page, reg): (u32, String) = conn
            .query_row(
                "SELECT page, registration_number FROM records WHERE position = 21",
                [],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .unwrap();
        assert_eq!(page, 3);
        assert_eq!(reg, "REG-021");

        let reason: String = conn
            .query_row("SELECT reason FROM skipped_pages WHERE page = 4", [], |row| {
                row.get(0)
            })
            .unwrap();
        assert_eq!(reason, "table missing");

        let cursor: String = conn
            .query_row(
                "SELECT value FROM snapshot_meta WHERE key = 'estimated_cursor'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(cursor, "3");
    }

    #[test]
    fn test_rewrite_replaces_previous_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let writer = SnapshotWriter::new(dir.path().join("harvest.snapshot.db"));

        writer
            .write(&CheckpointSnapshot::new((1..=5).map(record).collect(), 10), &[])
            .unwrap();
        writer
            .write(&CheckpointSnapshot::new((1..=12).map(record).collect(), 10), &[])
            .unwrap();

        let conn = Connection::open(writer.path()).unwrap();
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM records", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 12);
    }
}
