use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Main configuration structure for Greenbook-Harvest
///
/// Every key has a default, so an empty file (or no file) is valid.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub site: SiteConfig,
    pub crawler: CrawlerConfig,
    pub session: SessionConfig,
    pub api: ApiConfig,
    pub output: OutputConfig,
}

/// The table page and the selectors used to read it
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct SiteConfig {
    /// Start URL of the table view
    pub url: String,

    /// The table container
    pub table_selector: String,

    /// Data rows inside the table body
    pub row_selector: String,

    /// Cells inside a row
    pub cell_selector: String,

    /// The highlighted page number in the pagination bar
    pub active_selector: String,

    /// An enabled "next" control
    pub next_selector: String,

    /// Every link in the pagination bar
    pub page_link_selector: String,
}

impl Default for SiteConfig {
    fn default() -> Self {
        Self {
            url: "https://greenbook.nafdac.gov.ng/".to_string(),
            table_selector: "table.dataTable".to_string(),
            row_selector: "table.dataTable tbody tr".to_string(),
            cell_selector: "td".to_string(),
            active_selector: "li.page-item.active".to_string(),
            next_selector: "li.page-item.next:not(.disabled) a".to_string(),
            page_link_selector: "li.page-item a".to_string(),
        }
    }
}

/// Crawl loop behavior
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct CrawlerConfig {
    /// Rows per remote page
    pub page_size: u32,

    /// Last page to fetch (inclusive)
    pub end_page: u32,

    /// Upper bound for any single wait on the remote view (seconds)
    pub wait_timeout_secs: u64,

    /// Interval between checks while waiting (milliseconds)
    pub poll_interval_ms: u64,

    /// Pause after a paging action before verifying it (milliseconds)
    pub settle_ms: u64,

    /// Consecutive extraction failures before a page is skipped
    pub max_page_failures: u32,

    /// Consecutive empty pages that mean the data is exhausted
    pub empty_page_limit: u32,

    /// Maximum number of pages the resume locator inspects
    pub resume_probe_limit: u32,

    /// Pages between snapshot refreshes
    pub snapshot_every: u32,

    /// Pause before retrying a page in place (milliseconds)
    pub retry_delay_ms: u64,

    /// Attempts per navigation strategy before falling through
    pub strategy_attempts: u32,

    /// Consecutive stuck navigation attempts before reloading
    pub stuck_threshold: u32,
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            page_size: crate::DEFAULT_PAGE_SIZE,
            end_page: 876,
            wait_timeout_secs: 20,
            poll_interval_ms: 250,
            settle_ms: 500,
            max_page_failures: 3,
            empty_page_limit: 2,
            resume_probe_limit: 50,
            snapshot_every: 50,
            retry_delay_ms: 1000,
            strategy_attempts: 3,
            stuck_threshold: 5,
        }
    }
}

impl CrawlerConfig {
    pub fn wait_timeout(&self) -> Duration {
        Duration::from_secs(self.wait_timeout_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn settle(&self) -> Duration {
        Duration::from_millis(self.settle_ms)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }
}

/// Browser session behavior
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct SessionConfig {
    /// Run the browser without a window
    pub headless: bool,

    /// Launch attempts before giving up
    pub launch_retries: u32,

    /// Delay before the second launch attempt (milliseconds, doubles per attempt)
    pub launch_backoff_ms: u64,

    pub window_width: u32,
    pub window_height: u32,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            headless: true,
            launch_retries: 3,
            launch_backoff_ms: 2000,
            window_width: 1920,
            window_height: 1080,
        }
    }
}

/// HTTP method for backend queries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApiMethod {
    #[default]
    Get,
    Post,
}

/// Direct backend querying
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct ApiConfig {
    /// Try to detect and use the backend endpoint
    pub enabled: bool,

    /// Skip the browser and discover the endpoint from the static page
    pub force: bool,

    pub method: ApiMethod,

    /// Fixed endpoint instead of discovery
    pub endpoint: Option<String>,

    /// JSON keys of keyed-object rows, in header order
    pub columns: Option<Vec<String>>,

    pub request_timeout_secs: u64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            force: false,
            method: ApiMethod::Get,
            endpoint: None,
            columns: None,
            request_timeout_secs: 30,
        }
    }
}

/// Output locations
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct OutputConfig {
    /// The CSV checkpoint, the source of truth
    pub checkpoint_path: PathBuf,

    /// Defaults to `<checkpoint stem>.skipped.log`
    pub skip_log_path: Option<PathBuf>,

    /// Defaults to `<checkpoint stem>.snapshot.db`
    pub snapshot_path: Option<PathBuf>,

    /// Sidecar file holding a start page override
    pub start_page_file: PathBuf,

    /// Materialize the snapshot database
    pub export_snapshot: bool,

    /// Where `--debug-dump` writes page HTML
    pub debug_dir: PathBuf,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            checkpoint_path: PathBuf::from("nafdac_greenbook.csv"),
            skip_log_path: None,
            snapshot_path: None,
            start_page_file: PathBuf::from("start_page.txt"),
            export_snapshot: true,
            debug_dir: PathBuf::from("debug"),
        }
    }
}

impl OutputConfig {
    pub fn skip_log_path(&self) -> PathBuf {
        self.skip_log_path
            .clone()
            .unwrap_or_else(|| sibling(&self.checkpoint_path, "skipped.log"))
    }

    pub fn snapshot_path(&self) -> PathBuf {
        self.snapshot_path
            .clone()
            .unwrap_or_else(|| sibling(&self.checkpoint_path, "snapshot.db"))
    }
}

/// `<dir>/<stem>.<suffix>` next to `path`
fn sibling(path: &Path, suffix: &str) -> PathBuf {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "checkpoint".to_string());
    path.with_file_name(format!("{}.{}", stem, suffix))
}
