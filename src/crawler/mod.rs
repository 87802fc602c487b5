//! Crawl orchestration
//!
//! This module contains the core crawling logic:
//! - The resume locator, which finds where a previous run stopped
//! - The crawl controller state machine
//!
//! # Example
//!
//! ```no_run
//! use greenbook_harvest::config::load_config;
//! use greenbook_harvest::crawler::{CrawlController, RunOptions};
//! use greenbook_harvest::session::ChromeFactory;
//! use std::path::Path;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = load_config(Path::new("harvest.toml"))?;
//! let factory = ChromeFactory::new(
//!     config.site.clone(),
//!     config.session.clone(),
//!     config.crawler.wait_timeout(),
//!     config.crawler.poll_interval(),
//! );
//! let mut controller = CrawlController::from_config(config, Box::new(factory), RunOptions::default());
//! let report = controller.run().await?;
//! println!("{} records appended", report.records_appended);
//! # Ok(())
//! # }
//! ```

mod controller;
mod locator;

pub use controller::{CancelToken, CrawlController, CrawlReport, FinishReason, RunOptions};
pub use locator::{candidate_pages, ExtractorProbe, PageProbe, ResumeLocator};
