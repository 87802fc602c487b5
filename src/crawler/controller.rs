//! Crawl controller
//!
//! The top-level loop. One page at a time it moves through
//! `Navigating → Extracting → Checkpointing → Advancing`, and a page's
//! records are durably appended before the next page is touched. Failures
//! are classified and routed to retry-in-place, skip-page or abort.

use crate::checkpoint::{CheckpointSnapshot, CsvCheckpoint, RowSink, SkipLog, SnapshotLoader};
use crate::config::{Config, StartPage};
use crate::crawler::locator::{ExtractorProbe, ResumeLocator};
use crate::extract::{select_extractor, ExtractError, ExtractedPage, Extractor};
use crate::navigator::{Navigator, NavigatorConfig};
use crate::output::SnapshotWriter;
use crate::retry::RetryConfig;
use crate::session::{SessionFactory, SessionSupervisor};
use crate::state::{CrawlPhase, CrawlState, Mode};
use crate::HarvestError;
use std::collections::HashSet;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

/// Per-run choices that do not belong in the configuration file
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Explicit start page; bypasses the resume locator
    pub start: Option<StartPage>,

    /// Overrides `crawler.end-page`
    pub end_page: Option<u32>,

    /// Skip the snapshot export
    pub checkpoint_only: bool,

    /// Save the page HTML of failed extractions
    pub debug_dump: bool,
}

/// Cooperative cancellation, honored at page boundaries
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Why a crawl stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FinishReason {
    /// The cursor passed the end page
    EndPageReached,
    /// The source ran out of rows
    Exhausted,
    /// Cancellation was requested
    Cancelled,
}

impl fmt::Display for FinishReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FinishReason::EndPageReached => write!(f, "end page reached"),
            FinishReason::Exhausted => write!(f, "data exhausted"),
            FinishReason::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// Summary of a finished crawl
#[derive(Debug, Clone, PartialEq)]
pub struct CrawlReport {
    pub mode: Mode,
    pub start_page: u32,
    /// Last page whose records were checkpointed
    pub last_page: Option<u32>,
    pub pages_checkpointed: u32,
    pub records_appended: usize,
    pub duplicates_dropped: usize,
    pub skipped_pages: Vec<u32>,
    pub session_recoveries: u32,
    pub finish_reason: FinishReason,
}

/// Everything that lives for one run
struct Run {
    state: CrawlState,
    extractor: Box<dyn Extractor>,
    seen: HashSet<String>,
    pending: Option<ExtractedPage>,
    empty_streak: u32,
    finish: Option<FinishReason>,
    generation: u64,
    baseline_records: usize,
    started: Instant,
    report: CrawlReport,
}

/// Orchestrates session, navigator, extractor and checkpoint
pub struct CrawlController<S = CsvCheckpoint> {
    config: Config,
    options: RunOptions,
    sessions: SessionSupervisor,
    navigator: Navigator,
    store: S,
    skip_log: SkipLog,
    snapshots: Option<SnapshotWriter>,
    extractor: Option<Box<dyn Extractor>>,
    cancel: CancelToken,
}

impl CrawlController<CsvCheckpoint> {
    /// Creates a controller writing to the configured CSV checkpoint
    pub fn from_config(config: Config, factory: Box<dyn SessionFactory>, options: RunOptions) -> Self {
        let store = CsvCheckpoint::new(
            config.output.checkpoint_path.clone(),
            config.crawler.page_size,
        );
        Self::new(config, factory, store, options)
    }
}

impl<S: RowSink + SnapshotLoader + Send> CrawlController<S> {
    /// Creates a controller over an arbitrary checkpoint store
    ///
    /// # Arguments
    ///
    /// * `config` - Validated configuration
    /// * `factory` - Creates live views for the session supervisor
    /// * `store` - Row sink and snapshot loader
    /// * `options` - Start page, end page and output toggles
    pub fn new(
        config: Config,
        factory: Box<dyn SessionFactory>,
        store: S,
        options: RunOptions,
    ) -> Self {
        let retry = RetryConfig::new(
            config.session.launch_retries,
            config.session.launch_backoff_ms,
        );
        let snapshots = (!options.checkpoint_only && config.output.export_snapshot)
            .then(|| SnapshotWriter::new(config.output.snapshot_path()));

        Self {
            sessions: SessionSupervisor::new(factory, retry),
            navigator: Navigator::new(NavigatorConfig::from_crawler(&config.crawler)),
            skip_log: SkipLog::new(config.output.skip_log_path()),
            snapshots,
            store,
            options,
            config,
            extractor: None,
            cancel: CancelToken::new(),
        }
    }

    /// Uses `extractor` instead of detecting one
    pub fn with_extractor(mut self, extractor: Box<dyn Extractor>) -> Self {
        self.extractor = Some(extractor);
        self
    }

    /// Handle for requesting a stop at the next page boundary
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Runs the crawl to completion
    ///
    /// # Returns
    ///
    /// * `Ok(CrawlReport)` - End page reached, data exhausted or cancelled
    /// * `Err(HarvestError)` - Unrecoverable session, navigation or
    ///   persistence failure; the checkpoint is left as last written
    pub async fn run(&mut self) -> Result<CrawlReport, HarvestError> {
        let result = self.drive().await;
        if let Err(e) = &result {
            tracing::error!("Crawl aborted: {}", e);
            self.sessions.close().await;
        }
        result
    }

    async fn drive(&mut self) -> Result<CrawlReport, HarvestError> {
        tracing::debug!("Phase {:?}", CrawlPhase::Init);
        let snapshot = self.store.load();
        let mut run = self.init(&snapshot).await?;

        let mut phase = CrawlPhase::Resuming;
        while !phase.is_terminal() {
            tracing::trace!("Page {}: {:?}", run.state.current_page(), phase);
            phase = match phase {
                CrawlPhase::Resuming => self.resume(&mut run, &snapshot).await,
                CrawlPhase::Navigating => self.navigate(&mut run).await?,
                CrawlPhase::Extracting => self.extract(&mut run).await?,
                CrawlPhase::Checkpointing => self.checkpoint(&mut run)?,
                CrawlPhase::Advancing => self.advance(&mut run).await,
                CrawlPhase::Finishing => self.finish(&mut run).await,
                CrawlPhase::Init | CrawlPhase::Done => CrawlPhase::Done,
            };
        }

        Ok(run.report)
    }

    async fn init(&mut self, snapshot: &CheckpointSnapshot) -> Result<Run, HarvestError> {
        let extractor = match self.extractor.take() {
            Some(extractor) => extractor,
            None => select_extractor(&self.config, &mut self.sessions).await?,
        };
        let mode = extractor.mode();
        let end_page = self.options.end_page.unwrap_or(self.config.crawler.end_page);

        tracing::info!(
            "Mode: {}, end page {}, {} records already checkpointed",
            mode,
            end_page,
            snapshot.len()
        );

        Ok(Run {
            state: CrawlState::new(1, end_page, mode),
            extractor,
            seen: snapshot.identifiers().map(str::to_string).collect(),
            pending: None,
            empty_streak: 0,
            finish: None,
            generation: self.sessions.generation(),
            baseline_records: snapshot.len(),
            started: Instant::now(),
            report: CrawlReport {
                mode,
                start_page: 1,
                last_page: None,
                pages_checkpointed: 0,
                records_appended: 0,
                duplicates_dropped: 0,
                skipped_pages: Vec::new(),
                session_recoveries: 0,
                finish_reason: FinishReason::EndPageReached,
            },
        })
    }

    /// Decides the first page to fetch
    ///
    /// Finishes straight away when the located page is the table's last.
    async fn resume(&mut self, run: &mut Run, snapshot: &CheckpointSnapshot) -> CrawlPhase {
        let end_page = run.state.end_page();
        let mut located = None;

        let start = if let Some(start) = self.options.start {
            tracing::info!("Starting at page {} (from {})", start.page, start.source);
            start.page
        } else if snapshot.is_empty() {
            tracing::info!("No checkpoint yet, starting at page 1");
            1
        } else if let Some((position, last_id)) = snapshot.last_identified() {
            let estimated = snapshot.page_of(position);
            let locator = ResumeLocator::new(self.config.crawler.resume_probe_limit, end_page);
            let mut probe = ExtractorProbe {
                extractor: &mut *run.extractor,
                sessions: &mut self.sessions,
                navigator: &self.navigator,
            };
            match locator.find(&mut probe, last_id, estimated).await {
                Some(found) => {
                    tracing::info!("Resuming after page {} at page {}", found, found + 1);
                    located = Some(found);
                    found + 1
                }
                None => {
                    tracing::warn!(
                        "Falling back to arithmetic resume at page {}",
                        snapshot.estimated_cursor
                    );
                    snapshot.estimated_cursor
                }
            }
        } else {
            tracing::warn!(
                "Checkpoint has no identifiers, resuming at page {}",
                snapshot.estimated_cursor
            );
            snapshot.estimated_cursor
        };

        run.state = CrawlState::new(start, end_page, run.state.mode());
        run.report.start_page = run.state.current_page();

        // The located page is still in view
        if let Some(found) = located {
            if run.state.mode().needs_navigation() && !run.state.is_past_end() {
                if let Some(session) = self.sessions.current() {
                    if let Ok(false) = session.has_next().await {
                        tracing::info!("Page {} is the last page, nothing left to fetch", found);
                        run.finish = Some(FinishReason::Exhausted);
                        return CrawlPhase::Finishing;
                    }
                }
            }
        }
        CrawlPhase::Navigating
    }

    async fn navigate(&mut self, run: &mut Run) -> Result<CrawlPhase, HarvestError> {
        if self.cancel.is_cancelled() {
            tracing::info!(
                "Cancellation requested, stopping before page {}",
                run.state.current_page()
            );
            run.finish = Some(FinishReason::Cancelled);
            return Ok(CrawlPhase::Finishing);
        }
        if run.state.is_past_end() {
            run.finish.get_or_insert(FinishReason::EndPageReached);
            return Ok(CrawlPhase::Finishing);
        }

        if run.state.mode().needs_navigation() {
            self.navigator
                .navigate(&mut self.sessions, run.state.current_page())
                .await?;
        }
        self.renew_after_recreation(run).await;
        Ok(CrawlPhase::Extracting)
    }

    async fn renew_after_recreation(&mut self, run: &mut Run) {
        let generation = self.sessions.generation();
        if generation == run.generation {
            return;
        }
        if run.generation > 0 {
            if let Err(e) = run.extractor.renew(&mut self.sessions).await {
                tracing::warn!("Could not refresh extractor credentials: {}", e);
            }
        }
        run.generation = generation;
    }

    async fn extract(&mut self, run: &mut Run) -> Result<CrawlPhase, HarvestError> {
        let page = run.state.current_page();
        let extracted = match run.extractor.extract_page(&mut self.sessions, page).await {
            Ok(extracted) => extracted,
            Err(e) => return self.extraction_failed(run, page, e).await,
        };

        if let Some(total) = extracted.total_records.filter(|&t| t > 0) {
            let page_size = u64::from(self.config.crawler.page_size.max(1));
            let last = total.div_ceil(page_size);
            run.state.clamp_end_page(u32::try_from(last).unwrap_or(u32::MAX));
        }

        if extracted.is_empty() {
            run.empty_streak += 1;
            if extracted.exhausted || run.empty_streak >= self.config.crawler.empty_page_limit {
                tracing::info!("Page {} is empty, no more data", page);
                run.finish = Some(FinishReason::Exhausted);
                return Ok(CrawlPhase::Finishing);
            }
            tracing::info!("Page {} came back empty, reading it again", page);
            tokio::time::sleep(self.config.crawler.retry_delay()).await;
            return Ok(CrawlPhase::Navigating);
        }

        run.empty_streak = 0;
        run.state.clear_failures();
        run.pending = Some(extracted);
        Ok(CrawlPhase::Checkpointing)
    }

    async fn extraction_failed(
        &mut self,
        run: &mut Run,
        page: u32,
        error: ExtractError,
    ) -> Result<CrawlPhase, HarvestError> {
        let attempt = run.state.record_failure();
        let limit = self.config.crawler.max_page_failures;
        tracing::warn!(
            "Extraction of page {} failed (attempt {}/{}): {}",
            page,
            attempt,
            limit,
            error
        );

        if self.options.debug_dump {
            self.dump_page(run, page, attempt).await;
        }

        if error.is_session_lost() {
            tracing::info!("Session lost on page {}, recreating", page);
            self.sessions.recreate().await?;
        } else if error.needs_renewal() {
            tracing::info!("Backend session expired on page {}, refreshing credentials", page);
            if let Err(e) = run.extractor.renew(&mut self.sessions).await {
                tracing::warn!("Could not refresh extractor credentials: {}", e);
            }
        }

        if attempt >= limit {
            self.skip_page(run, page, &error.to_string());
        } else {
            tokio::time::sleep(self.config.crawler.retry_delay()).await;
        }
        Ok(CrawlPhase::Navigating)
    }

    fn skip_page(&mut self, run: &mut Run, page: u32, reason: &str) {
        tracing::warn!("Skipping page {}: {}", page, reason);
        if let Err(e) = self.skip_log.record(page, reason) {
            tracing::error!("Could not record skipped page {}: {}", page, e);
        }
        run.report.skipped_pages.push(page);
        run.state.advance();
    }

    async fn dump_page(&mut self, run: &mut Run, page: u32, attempt: u32) {
        let Some(html) = run.extractor.debug_snapshot(&mut self.sessions).await else {
            return;
        };
        let dir = &self.config.output.debug_dir;
        let path = dir.join(format!("page_{}_attempt_{}.html", page, attempt));
        match std::fs::create_dir_all(dir).and_then(|_| std::fs::write(&path, html)) {
            Ok(()) => tracing::info!("Saved page HTML to {}", path.display()),
            Err(e) => tracing::warn!("Could not save page HTML to {}: {}", path.display(), e),
        }
    }

    fn checkpoint(&mut self, run: &mut Run) -> Result<CrawlPhase, HarvestError> {
        let page = run.state.current_page();
        let Some(extracted) = run.pending.as_ref() else {
            return Ok(CrawlPhase::Advancing);
        };

        let mut fresh = Vec::with_capacity(extracted.records.len());
        let mut duplicates = 0;
        for record in &extracted.records {
            match record.identifier() {
                Some(id) if !run.seen.insert(id.to_string()) => {
                    tracing::debug!("Dropping duplicate {} on page {}", id, page);
                    duplicates += 1;
                }
                _ => fresh.push(record.clone()),
            }
        }

        if !fresh.is_empty() {
            self.store.append(&fresh)?;
        }

        let report = &mut run.report;
        report.records_appended += fresh.len();
        report.duplicates_dropped += duplicates;
        report.pages_checkpointed += 1;
        report.last_page = Some(page);

        let minutes = run.started.elapsed().as_secs_f64() / 60.0;
        let rate = if minutes > 0.0 {
            report.pages_checkpointed as f64 / minutes
        } else {
            0.0
        };
        tracing::info!(
            "Page {}/{}: {} records ({} total, {:.1} pages/min)",
            page,
            run.state.end_page(),
            fresh.len(),
            run.baseline_records + report.records_appended,
            rate
        );

        let every = self.config.crawler.snapshot_every.max(1);
        if report.pages_checkpointed % every == 0 {
            self.write_snapshot();
        }

        Ok(CrawlPhase::Advancing)
    }

    async fn advance(&mut self, run: &mut Run) -> CrawlPhase {
        let finished_page = run.state.current_page();
        if run.pending.take().is_some_and(|page| page.exhausted) {
            tracing::info!("Source reported no rows after page {}", finished_page);
            run.finish = Some(FinishReason::Exhausted);
            return CrawlPhase::Finishing;
        }

        run.state.advance();
        if run.state.is_past_end() {
            run.finish = Some(FinishReason::EndPageReached);
            return CrawlPhase::Finishing;
        }

        if run.state.mode().needs_navigation() {
            if let Some(session) = self.sessions.current() {
                if let Ok(false) = session.has_next().await {
                    tracing::info!("No next page after page {}", finished_page);
                    run.finish = Some(FinishReason::Exhausted);
                    return CrawlPhase::Finishing;
                }
            }
        }

        CrawlPhase::Navigating
    }

    async fn finish(&mut self, run: &mut Run) -> CrawlPhase {
        self.sessions.close().await;
        self.write_snapshot();

        let report = &mut run.report;
        report.finish_reason = run.finish.unwrap_or(FinishReason::EndPageReached);
        report.session_recoveries = self.sessions.recoveries();

        tracing::info!(
            "Crawl finished ({}): {} pages, {} records appended, {} duplicates dropped, {} pages skipped in {:?}",
            report.finish_reason,
            report.pages_checkpointed,
            report.records_appended,
            report.duplicates_dropped,
            report.skipped_pages.len(),
            run.started.elapsed()
        );
        CrawlPhase::Done
    }

    /// Rebuilds the snapshot from the checkpoint; failures are only logged
    fn write_snapshot(&self) {
        let Some(writer) = &self.snapshots else {
            return;
        };
        let snapshot = self.store.load_written();
        let skipped = self.skip_log.entries().unwrap_or_else(|e| {
            tracing::warn!("Could not read skip log for snapshot: {}", e);
            Vec::new()
        });
        match writer.write(&snapshot, &skipped) {
            Ok(count) => tracing::info!(
                "Snapshot refreshed: {} records in {}",
                count,
                writer.path().display()
            ),
            Err(e) => tracing::warn!("Snapshot export failed: {}", e),
        }
    }
}
