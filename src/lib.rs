//! Greenbook-Harvest: a resumable extractor for paginated, script-rendered tables
//!
//! This crate walks every page of a DataTables-style web table, either by
//! driving a live browser view or by querying the table's backend endpoint
//! directly, and appends each page's rows to a durable CSV checkpoint. A run
//! can be killed at any point and restarted without losing or duplicating rows.

pub mod checkpoint;
pub mod config;
pub mod crawler;
pub mod extract;
pub mod navigator;
pub mod output;
pub mod retry;
pub mod session;
pub mod state;

use thiserror::Error;

/// Main error type for harvest operations
#[derive(Debug, Error)]
pub enum HarvestError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Checkpoint error: {0}")]
    Checkpoint(#[from] checkpoint::CheckpointError),

    #[error("Session error: {0}")]
    Session(#[from] session::SessionError),

    #[error("Session could not be created after {attempts} attempts: {last}")]
    SessionUnavailable {
        attempts: u32,
        last: session::SessionError,
    },

    #[error("Navigation failed: {0}")]
    Navigation(#[from] navigator::NavigationError),

    #[error("Extraction error: {0}")]
    Extract(#[from] extract::ExtractError),

    #[error("Snapshot error: {0}")]
    Snapshot(#[from] output::SnapshotError),

    #[error("HTTP client error: {0}")]
    Reqwest(#[from] reqwest::Error),

    #[error("URL parse error: {0}")]
    UrlParse(#[from] ::url::ParseError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid URL in config: {0}")]
    InvalidUrl(String),

    #[error("Invalid selector in config: {0}")]
    InvalidSelector(String),
}

/// Result type alias for harvest operations
pub type Result<T> = std::result::Result<T, HarvestError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Rows per remote page unless configured otherwise
pub const DEFAULT_PAGE_SIZE: u32 = 10;

// Re-export commonly used types
pub use config::Config;
pub use crawler::{CrawlController, CrawlReport, FinishReason};
pub use state::{CrawlPhase, CrawlState, Mode, Record, HEADER};
