//! Shared helpers for the integration tests

#![allow(dead_code)]

use greenbook_harvest::checkpoint::{CsvCheckpoint, SnapshotLoader};
use greenbook_harvest::session::MemoryTable;
use greenbook_harvest::{Config, Record};
use std::path::Path;

/// `count` synthetic records for `page`, identified `REG-001`, `REG-002`, ...
pub fn records(page: u32, count: u32) -> Vec<Record> {
    (1..=count)
        .map(|i| {
            let n = (page - 1) * 10 + i;
            Record::from_cells(vec![
                format!("Product {}", n),
                "Paracetamol".to_string(),
                "Tablet".to_string(),
                "Drugs".to_string(),
                format!("REG-{:03}", n),
                "Acme Pharma Ltd".to_string(),
                "Acme Manufacturing".to_string(),
                "2021-03-04".to_string(),
            ])
        })
        .collect()
}

/// A table with `pages` full pages of ten records
pub fn table(pages: u32) -> MemoryTable {
    MemoryTable::new((1..=pages).map(|page| records(page, 10)).collect())
}

/// DOM mode, no waiting, every output file inside `dir`
pub fn fast_config(dir: &Path, end_page: u32) -> Config {
    let mut config = Config::default();
    config.api.enabled = false;
    config.crawler.end_page = end_page;
    config.crawler.wait_timeout_secs = 0;
    config.crawler.poll_interval_ms = 1;
    config.crawler.settle_ms = 0;
    config.crawler.retry_delay_ms = 0;
    config.session.launch_backoff_ms = 1;
    config.output.checkpoint_path = dir.join("greenbook.csv");
    config.output.start_page_file = dir.join("start_page.txt");
    config.output.debug_dir = dir.join("debug");
    config
}

/// Everything currently in the checkpoint
pub fn checkpointed(config: &Config) -> Vec<Record> {
    CsvCheckpoint::new(config.output.checkpoint_path.clone(), config.crawler.page_size)
        .load()
        .records
}

pub fn identifiers(records: &[Record]) -> Vec<String> {
    records
        .iter()
        .filter_map(|r| r.identifier().map(str::to_string))
        .collect()
}

/// `REG-<from>` through `REG-<to>`
pub fn expected_ids(from: u32, to: u32) -> Vec<String> {
    (from..=to).map(|n| format!("REG-{:03}", n)).collect()
}
