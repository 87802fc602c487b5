//! CSV checkpoint store
//!
//! The checkpoint is a plain CSV file with the fixed eight-column header,
//! appended to after every page. When the primary file cannot be written
//! (locked by a spreadsheet program, read-only mount) the store moves to a
//! backup file next to it, then to the system temp directory, and keeps
//! writing there for the rest of the run.

use crate::checkpoint::csv::{encode_row, parse};
use crate::checkpoint::traits::{
    CheckpointError, CheckpointResult, CheckpointSnapshot, RowSink, SnapshotLoader,
};
use crate::state::{Record, HEADER};
use std::fs::{self, File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

/// Append-only CSV checkpoint with fallback locations
#[derive(Debug)]
pub struct CsvCheckpoint {
    primary: PathBuf,
    fallbacks: Vec<PathBuf>,
    active: usize,
    page_size: u32,
}

impl CsvCheckpoint {
    /// Creates a store writing to `path`
    ///
    /// Fallbacks are `<stem>_backup.<ext>` beside the file, then the same
    /// file name in the system temp directory.
    pub fn new(path: impl Into<PathBuf>, page_size: u32) -> Self {
        let primary = path.into();
        let fallbacks = default_fallbacks(&primary);
        Self {
            primary,
            fallbacks,
            active: 0,
            page_size,
        }
    }

    /// Creates a store with an explicit fallback list
    pub fn with_fallbacks(path: impl Into<PathBuf>, fallbacks: Vec<PathBuf>, page_size: u32) -> Self {
        Self {
            primary: path.into(),
            fallbacks,
            active: 0,
            page_size,
        }
    }

    pub fn primary(&self) -> &Path {
        &self.primary
    }

    pub fn page_size(&self) -> u32 {
        self.page_size
    }

    /// Returns true once writes have moved off the primary file
    pub fn is_using_fallback(&self) -> bool {
        self.active > 0
    }

    /// Fallback files that already hold data
    pub fn stale_fallbacks(&self) -> Vec<&Path> {
        self.fallbacks
            .iter()
            .filter(|path| fs::metadata(path).map(|m| m.is_file() && m.len() > 0).unwrap_or(false))
            .map(PathBuf::as_path)
            .collect()
    }

    fn candidates(&self) -> impl Iterator<Item = &PathBuf> {
        std::iter::once(&self.primary).chain(self.fallbacks.iter())
    }

    fn candidate(&self, index: usize) -> &Path {
        if index == 0 {
            &self.primary
        } else {
            &self.fallbacks[index - 1]
        }
    }

    /// Reads the checkpoint, propagating errors
    ///
    /// [`SnapshotLoader::load`] wraps this and turns failures into an empty
    /// snapshot.
    pub fn try_load(&self) -> CheckpointResult<CheckpointSnapshot> {
        let records = read_records(&self.primary)?;
        Ok(CheckpointSnapshot::new(records, self.page_size))
    }

    fn write_to(path: &Path, records: &[Record]) -> std::io::Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let mut file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(path)?;
        let mut buffer = String::new();
        if trim_torn_tail(&mut file, path)? == 0 {
            buffer.push_str(&encode_row(&HEADER));
        }
        for record in records {
            buffer.push_str(&encode_row(record.fields()));
        }
        file.write_all(buffer.as_bytes())?;
        file.flush()?;
        file.sync_data()?;
        Ok(())
    }
}

/// Reads every record of one checkpoint file
///
/// A missing file has no records. An unterminated last row is the remains
/// of an interrupted append and is ignored.
fn read_records(path: &Path) -> CheckpointResult<Vec<Record>> {
    let mut content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(source) => {
            return Err(CheckpointError::Io {
                path: path.to_path_buf(),
                source,
            })
        }
    };

    if !content.is_empty() && !content.ends_with('\n') {
        let keep = content.rfind('\n').map_or(0, |i| i + 1);
        tracing::warn!(
            "Ignoring unterminated last row of {} ({} bytes)",
            path.display(),
            content.len() - keep
        );
        content.truncate(keep);
    }

    let mut rows = parse(&content).map_err(CheckpointError::Malformed)?.into_iter();
    let mut records = Vec::new();

    if let Some(first) = rows.next() {
        if is_header(&first) {
            tracing::debug!("Checkpoint header found in {}", path.display());
        } else {
            tracing::warn!(
                "Checkpoint {} does not start with the expected header; treating first row as data",
                path.display()
            );
            records.push(Record::from_cells(first));
        }
    }
    records.extend(rows.map(Record::from_cells));
    Ok(records)
}

/// Cuts an unterminated last row off `file` and returns the remaining length
///
/// Rows are written one page at a time, so a torn row belongs to a page
/// that was never fully checkpointed and will be fetched again.
fn trim_torn_tail(file: &mut File, path: &Path) -> std::io::Result<u64> {
    let len = file.metadata()?.len();
    if len == 0 {
        return Ok(0);
    }

    let mut last = [0u8; 1];
    file.seek(SeekFrom::End(-1))?;
    file.read_exact(&mut last)?;
    if last[0] == b'\n' {
        return Ok(len);
    }

    let mut content = Vec::with_capacity(len as usize);
    file.seek(SeekFrom::Start(0))?;
    file.read_to_end(&mut content)?;
    let keep = content
        .iter()
        .rposition(|&b| b == b'\n')
        .map_or(0, |i| i + 1) as u64;

    tracing::warn!(
        "Dropping {} bytes of an interrupted write at the end of {}",
        len - keep,
        path.display()
    );
    file.set_len(keep)?;
    Ok(keep)
}

impl SnapshotLoader for CsvCheckpoint {
    fn load(&self) -> CheckpointSnapshot {
        match self.try_load() {
            Ok(snapshot) => {
                tracing::info!(
                    "Loaded {} records from {} (estimated cursor: page {})",
                    snapshot.len(),
                    self.primary.display(),
                    snapshot.estimated_cursor
                );
                for fallback in self.stale_fallbacks() {
                    tracing::warn!(
                        "Fallback checkpoint {} holds rows from an earlier run and is not read on resume; merge it into {}",
                        fallback.display(),
                        self.primary.display()
                    );
                }
                snapshot
            }
            Err(e) => {
                tracing::warn!("Could not read checkpoint, starting fresh: {}", e);
                CheckpointSnapshot::empty(self.page_size)
            }
        }
    }

    fn load_written(&self) -> CheckpointSnapshot {
        let mut snapshot = self.load();
        if !self.is_using_fallback() {
            return snapshot;
        }

        let fallback = self.candidate(self.active);
        match read_records(fallback) {
            Ok(records) => {
                tracing::debug!(
                    "Adding {} records from fallback checkpoint {}",
                    records.len(),
                    fallback.display()
                );
                let mut all = std::mem::take(&mut snapshot.records);
                all.extend(records);
                snapshot = CheckpointSnapshot::new(all, self.page_size);
            }
            Err(e) => {
                tracing::warn!("Could not read fallback checkpoint {}: {}", fallback.display(), e);
            }
        }
        snapshot
    }
}

impl RowSink for CsvCheckpoint {
    fn append(&mut self, records: &[Record]) -> CheckpointResult<()> {
        let total = 1 + self.fallbacks.len();
        for index in self.active..total {
            let path = self.candidate(index).to_path_buf();
            match Self::write_to(&path, records) {
                Ok(()) => {
                    if index != self.active {
                        tracing::warn!(
                            "Checkpoint writes moved to fallback location {}; merge it into {} before the next run",
                            path.display(),
                            self.primary.display()
                        );
                        self.active = index;
                    }
                    return Ok(());
                }
                Err(e) => {
                    tracing::warn!("Failed to write checkpoint to {}: {}", path.display(), e);
                }
            }
        }

        Err(CheckpointError::NoWritableLocation {
            tried: self.candidates().skip(self.active).cloned().collect(),
        })
    }

    fn location(&self) -> &Path {
        self.candidate(self.active)
    }
}

fn is_header(row: &[String]) -> bool {
    row.len() >= HEADER.len()
        && row
            .iter()
            .zip(HEADER.iter())
            .all(|(cell, name)| cell.trim() == *name)
}

fn default_fallbacks(primary: &Path) -> Vec<PathBuf> {
    let stem = primary
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "checkpoint".to_string());
    let ext = primary
        .extension()
        .map(|e| e.to_string_lossy().into_owned())
        .unwrap_or_else(|| "csv".to_string());

    let backup = primary.with_file_name(format!("{}_backup.{}", stem, ext));
    let temp = std::env::temp_dir().join(format!("{}.{}", stem, ext));
    vec![backup, temp]
}
