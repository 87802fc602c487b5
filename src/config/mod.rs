//! Configuration module for Greenbook-Harvest
//!
//! This module handles loading, parsing, and validating TOML configuration
//! files, and resolving the start page override.
//!
//! # Example
//!
//! ```no_run
//! use greenbook_harvest::config::load_config;
//! use std::path::Path;
//!
//! let config = load_config(Path::new("harvest.toml")).unwrap();
//! println!("Harvesting {} up to page {}", config.site.url, config.crawler.end_page);
//! ```

mod parser;
mod start;
mod types;
mod validation;

// Re-export types
pub use types::{
    ApiConfig, ApiMethod, Config, CrawlerConfig, OutputConfig, SessionConfig, SiteConfig,
};

// Re-export parser functions
pub use parser::{compute_config_hash, load_config, load_config_with_hash, parse_config};
pub use start::{
    resolve_start_page, start_page_override, StartPage, StartPageSource, START_PAGE_ENV,
};
pub use validation::validate;
