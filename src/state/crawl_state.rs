//! In-memory crawl state and controller phases
//!
//! Nothing here is persisted. On restart the state is rebuilt from the
//! checkpoint, which is the only durable source of truth.
use std::collections::HashMap;
use std::fmt;

/// How rows are obtained from the remote table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Mode {
    /// Drive the rendered view page by page and read the table body
    Interactive,

    /// Query the table's backend endpoint with explicit offsets
    DirectApi,
}

impl Mode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Interactive => "interactive",
            Self::DirectApi => "direct-api",
        }
    }

    /// Returns true if pages must be reached by navigating a live view
    pub fn needs_navigation(&self) -> bool {
        matches!(self, Self::Interactive)
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Phases of the crawl controller state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CrawlPhase {
    Init,
    Resuming,
    Navigating,
    Extracting,
    Checkpointing,
    Advancing,
    Finishing,
    Done,
}

impl CrawlPhase {
    /// Returns true once the controller has nothing left to do
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done)
    }
}

/// Mutable cursor over the remote pages
#[derive(Debug, Clone)]
pub struct CrawlState {
    current_page: u32,
    end_page: u32,
    consecutive_failures: HashMap<u32, u32>,
    mode: Mode,
}

impl CrawlState {
    /// Creates a state positioned at `start_page` (clamped to at least 1)
    pub fn new(start_page: u32, end_page: u32, mode: Mode) -> Self {
        Self {
            current_page: start_page.max(1),
            end_page,
            consecutive_failures: HashMap::new(),
            mode,
        }
    }

    pub fn current_page(&self) -> u32 {
        self.current_page
    }

    pub fn end_page(&self) -> u32 {
        self.end_page
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    /// Lowers the end page when the remote reports fewer pages
    ///
    /// The end page never grows, so a user-supplied bound is always honored.
    pub fn clamp_end_page(&mut self, last_page: u32) {
        if last_page < self.end_page {
            self.end_page = last_page.max(1);
        }
    }

    /// Moves to the next page; the cursor never moves backwards
    pub fn advance(&mut self) -> u32 {
        self.consecutive_failures.remove(&self.current_page);
        self.current_page += 1;
        self.current_page
    }

    /// Returns true when the cursor has passed the end page
    pub fn is_past_end(&self) -> bool {
        self.current_page > self.end_page
    }

    /// Records a failed extraction of the current page and returns the count
    pub fn record_failure(&mut self) -> u32 {
        let count = self
            .consecutive_failures
            .entry(self.current_page)
            .or_insert(0);
        *count += 1;
        *count
    }

    /// Clears the failure count of the current page after a success
    pub fn clear_failures(&mut self) {
        self.consecutive_failures.remove(&self.current_page);
    }
}
