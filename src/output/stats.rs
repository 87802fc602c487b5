//! Statistics over the checkpoint and skip log
//!
//! This module provides functionality for summarizing what a checkpoint
//! holds without starting a crawl.

use crate::checkpoint::{CheckpointSnapshot, CsvCheckpoint, SkipEntry, SkipLog};
use crate::HarvestError;
use std::collections::HashMap;
use std::path::PathBuf;

/// Checkpoint statistics summary
#[derive(Debug, Clone)]
pub struct CheckpointStatistics {
    /// Where the records were read from
    pub checkpoint_path: PathBuf,

    /// Total number of records
    pub total_records: usize,

    /// Rows per page used for the estimate
    pub page_size: u32,

    /// Page a plain restart would resume at
    pub estimated_cursor: u32,

    /// Number of distinct non-blank identifiers
    pub distinct_identifiers: usize,

    /// Records without an identifier
    pub blank_identifiers: usize,

    /// Identifiers that occur more than once, with their counts
    pub duplicate_identifiers: Vec<(String, usize)>,

    /// Pages recorded as skipped
    pub skipped_pages: Vec<SkipEntry>,
}

/// Computes statistics from already loaded data
pub fn compute_statistics(
    checkpoint_path: PathBuf,
    snapshot: &CheckpointSnapshot,
    skipped_pages: Vec<SkipEntry>,
) -> CheckpointStatistics {
    let mut counts: HashMap<&str, usize> = HashMap::new();
    for id in snapshot.identifiers() {
        *counts.entry(id).or_insert(0) += 1;
    }

    let mut duplicate_identifiers: Vec<(String, usize)> = counts
        .iter()
        .filter(|(_, count)| **count > 1)
        .map(|(id, count)| (id.to_string(), *count))
        .collect();
    duplicate_identifiers.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));

    CheckpointStatistics {
        checkpoint_path,
        total_records: snapshot.len(),
        page_size: snapshot.page_size,
        estimated_cursor: snapshot.estimated_cursor,
        distinct_identifiers: counts.len(),
        blank_identifiers: snapshot.len() - counts.values().sum::<usize>(),
        duplicate_identifiers,
        skipped_pages,
    }
}

/// Loads statistics from the checkpoint and skip log files
///
/// # Returns
///
/// * `Ok(CheckpointStatistics)` - Successfully loaded statistics
/// * `Err(HarvestError)` - A file exists but could not be read
pub fn load_statistics(
    store: &CsvCheckpoint,
    skip_log: &SkipLog,
) -> Result<CheckpointStatistics, HarvestError> {
    let snapshot = store.try_load()?;
    let skipped = skip_log.entries()?;
    Ok(compute_statistics(
        store.primary().to_path_buf(),
        &snapshot,
        skipped,
    ))
}

/// Prints statistics to stdout in a formatted manner
pub fn print_statistics(stats: &CheckpointStatistics) {
    println!("=== Checkpoint Statistics ===\n");

    println!("Overview:");
    println!("  Checkpoint: {}", stats.checkpoint_path.display());
    println!("  Total records: {}", stats.total_records);
    println!(
        "  Estimated resume page: {} ({} rows per page)",
        stats.estimated_cursor, stats.page_size
    );
    println!();

    println!("Identifiers:");
    println!("  Distinct: {}", stats.distinct_identifiers);
    println!("  Blank: {}", stats.blank_identifiers);
    println!("  Duplicated: {}", stats.duplicate_identifiers.len());
    for (id, count) in stats.duplicate_identifiers.iter().take(10) {
        println!("    - {} ({}x)", id, count);
    }
    println!();

    if stats.skipped_pages.is_empty() {
        println!("Skipped Pages: none");
    } else {
        println!("Skipped Pages ({}):", stats.skipped_pages.len());
        for entry in &stats.skipped_pages {
            println!(
                "  - page {} at {}: {}",
                entry.page,
                entry.skipped_at.format("%Y-%m-%d %H:%M:%S"),
                entry.reason
            );
        }
    }
}
