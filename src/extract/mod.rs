//! Row extraction
//!
//! Two interchangeable ways to turn a page number into records:
//!
//! - `DomExtractor`: reads the rendered table of the live view
//! - `ApiExtractor`: queries the table's backend endpoint directly
//!
//! Both normalize every cell with [`normalize_text`](crate::state::normalize_text),
//! so for the same underlying data they yield identical records.

mod api;
mod detect;
mod dom;

pub use api::{build_http_client, parse_response, ApiExtractor, ApiPage};
pub use detect::{
    discover_live, discover_static, find_ajax_url, probe, resolve_endpoint, select_extractor,
};
pub use dom::{DomExtractor, TableSelectors};

use crate::session::{SessionError, SessionSupervisor};
use crate::state::{Mode, Record};
use async_trait::async_trait;
use thiserror::Error;

/// Errors that can occur while extracting a page
#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("Table not found on page {page}")]
    MissingTable { page: u32 },

    #[error("Session error: {0}")]
    Session(#[from] SessionError),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Endpoint returned HTTP {0}")]
    Status(u16),

    #[error("Backend session expired (HTTP {0})")]
    SessionExpired(u16),

    #[error("Malformed response: {0}")]
    Malformed(String),
}

impl ExtractError {
    /// Returns true if the live view is gone and must be recreated
    pub fn is_session_lost(&self) -> bool {
        matches!(self, Self::Session(e) if e.is_lost())
    }

    /// Returns true if fresh session credentials may fix the failure
    pub fn needs_renewal(&self) -> bool {
        matches!(self, Self::SessionExpired(_))
    }
}

/// Records read from one page
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExtractedPage {
    pub records: Vec<Record>,

    /// The source signalled there is nothing after this page
    pub exhausted: bool,

    /// Total row count reported by the source, if any
    pub total_records: Option<u64>,
}

impl ExtractedPage {
    pub fn new(records: Vec<Record>) -> Self {
        Self {
            records,
            ..Default::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Turns a page number into records
#[async_trait]
pub trait Extractor: Send {
    /// Which crawl mode this extractor implements
    fn mode(&self) -> Mode;

    /// Reads one page
    ///
    /// The DOM variant reads whatever the live view currently shows, so the
    /// caller must have navigated there first. The API variant queries the
    /// page by offset and ignores the view.
    async fn extract_page(
        &mut self,
        sessions: &mut SessionSupervisor,
        page: u32,
    ) -> Result<ExtractedPage, ExtractError>;

    /// Refreshes credentials after the session was recreated or expired
    async fn renew(&mut self, _sessions: &mut SessionSupervisor) -> Result<(), ExtractError> {
        Ok(())
    }

    /// HTML to keep for debugging a failed page, if the extractor has any
    async fn debug_snapshot(&mut self, sessions: &mut SessionSupervisor) -> Option<String> {
        match sessions.current() {
            Some(session) => session.content().await.ok(),
            None => None,
        }
    }
}
