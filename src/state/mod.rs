//! State module for rows and crawl progress
//!
//! # Components
//!
//! - `Record`: one normalized row of the remote table
//! - `CrawlState`: the page cursor and per-page failure counts of a run
//! - `CrawlPhase`: the phases of the controller state machine

mod crawl_state;
mod record;

// Re-export main types
pub use crawl_state::{CrawlPhase, CrawlState, Mode};
pub use record::{normalize_text, Record, FIELD_COUNT, HEADER, IDENTIFIER_COLUMN};
