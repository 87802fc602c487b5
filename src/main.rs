//! Greenbook-Harvest main entry point
//!
//! This is the command-line interface for the resumable table harvester.

use anyhow::Context;
use clap::Parser;
use greenbook_harvest::checkpoint::{CsvCheckpoint, SkipLog, SnapshotLoader};
use greenbook_harvest::config::{
    load_config_with_hash, start_page_override, validate, Config, StartPage,
};
use greenbook_harvest::crawler::{CrawlController, RunOptions};
use greenbook_harvest::session::ChromeFactory;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Greenbook-Harvest: a resumable extractor for paginated web tables
///
/// Walks every page of the product register, appending each page's rows
/// to a CSV checkpoint as soon as they are read. Interrupted runs pick up
/// where the checkpoint left off.
#[derive(Parser, Debug)]
#[command(name = "greenbook-harvest")]
#[command(version)]
#[command(about = "A resumable extractor for paginated web tables", long_about = None)]
struct Cli {
    /// Path to TOML configuration file (every key has a default)
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// First page to fetch; bypasses resume detection
    #[arg(long, value_name = "N")]
    start_page: Option<String>,

    /// Last page to fetch (inclusive)
    #[arg(long, value_name = "N", value_parser = clap::value_parser!(u32).range(1..))]
    end_page: Option<u32>,

    /// Checkpoint CSV path
    #[arg(short, long, value_name = "PATH")]
    output: Option<PathBuf>,

    /// Show the browser window
    #[arg(long)]
    visible: bool,

    /// Save page HTML whenever an extraction fails
    #[arg(long)]
    debug_dump: bool,

    /// Query the backend endpoint without launching a browser
    #[arg(long, conflicts_with = "no_api")]
    force_api: bool,

    /// Never query the backend endpoint, read the rendered table only
    #[arg(long, conflicts_with = "force_api")]
    no_api: bool,

    /// Write the CSV checkpoint only, skip the snapshot database
    #[arg(long)]
    checkpoint_only: bool,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,

    /// Validate config and show where the crawl would start without crawling
    #[arg(long, conflicts_with = "stats")]
    dry_run: bool,

    /// Show statistics of the existing checkpoint and exit
    #[arg(long, conflicts_with = "dry_run")]
    stats: bool,
}

impl Cli {
    /// Applies command-line overrides on top of the file configuration
    fn apply_overrides(&self, config: &mut Config) {
        if let Some(output) = &self.output {
            config.output.checkpoint_path = output.clone();
        }
        if let Some(end_page) = self.end_page {
            config.crawler.end_page = end_page;
        }
        if self.visible {
            config.session.headless = false;
        }
        if self.force_api {
            config.api.enabled = true;
            config.api.force = true;
        }
        if self.no_api {
            config.api.enabled = false;
        }
        if self.checkpoint_only {
            config.output.export_snapshot = false;
        }
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Setup logging based on verbosity
    setup_logging(cli.verbose, cli.quiet);

    if let Err(e) = run(cli).await {
        tracing::error!("{:#}", e);
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let mut config = match &cli.config {
        Some(path) => {
            tracing::info!("Loading configuration from: {}", path.display());
            let (config, hash) = load_config_with_hash(path)
                .with_context(|| format!("Failed to load configuration {}", path.display()))?;
            tracing::info!("Configuration loaded successfully (hash: {})", hash);
            config
        }
        None => {
            tracing::info!("No configuration file given, using defaults");
            Config::default()
        }
    };
    cli.apply_overrides(&mut config);
    validate(&config).context("Invalid configuration")?;

    let start = start_page_override(
        cli.start_page.as_deref(),
        &config.output.start_page_file,
    );

    if cli.dry_run {
        handle_dry_run(&config, start);
        Ok(())
    } else if cli.stats {
        handle_stats(&config)
    } else {
        handle_crawl(config, start, &cli).await
    }
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        // Only show errors
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("greenbook_harvest=info,warn"),
            1 => EnvFilter::new("greenbook_harvest=debug,info"),
            2 => EnvFilter::new("greenbook_harvest=trace,debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .init();
}

/// Handles the --dry-run mode: shows the resolved configuration and resume decision
fn handle_dry_run(config: &Config, start: Option<StartPage>) {
    println!("=== Greenbook-Harvest Dry Run ===\n");

    println!("Site:");
    println!("  URL: {}", config.site.url);
    println!("  Table: {}", config.site.table_selector);
    println!("  Rows: {}", config.site.row_selector);

    println!("\nCrawler:");
    println!("  Page size: {}", config.crawler.page_size);
    println!("  End page: {}", config.crawler.end_page);
    println!("  Max page failures: {}", config.crawler.max_page_failures);
    println!("  Resume probe limit: {}", config.crawler.resume_probe_limit);

    println!("\nSession:");
    println!("  Headless: {}", config.session.headless);
    println!("  Launch retries: {}", config.session.launch_retries);

    println!("\nBackend API:");
    println!("  Enabled: {}", config.api.enabled);
    println!("  Forced: {}", config.api.force);
    println!(
        "  Endpoint: {}",
        config.api.endpoint.as_deref().unwrap_or("(discover)")
    );

    println!("\nOutput:");
    println!("  Checkpoint: {}", config.output.checkpoint_path.display());
    println!("  Skip log: {}", config.output.skip_log_path().display());
    if config.output.export_snapshot {
        println!("  Snapshot: {}", config.output.snapshot_path().display());
    } else {
        println!("  Snapshot: disabled");
    }

    let store = CsvCheckpoint::new(
        config.output.checkpoint_path.clone(),
        config.crawler.page_size,
    );
    let snapshot = store.load();

    println!("\nResume:");
    println!("  Records in checkpoint: {}", snapshot.len());
    match (start, snapshot.last_identified()) {
        (Some(start), _) => println!("  Would start at page {} (from {})", start.page, start.source),
        (None, None) => println!("  Would start at page 1"),
        (None, Some((position, id))) => println!(
            "  Would look for {} around page {} (arithmetic resume: page {})",
            id,
            snapshot.page_of(position),
            snapshot.estimated_cursor
        ),
    }

    println!("\n✓ Configuration is valid");
}

/// Handles the --stats mode: shows statistics of the existing checkpoint
fn handle_stats(config: &Config) -> anyhow::Result<()> {
    use greenbook_harvest::output::{load_statistics, print_statistics};

    let store = CsvCheckpoint::new(
        config.output.checkpoint_path.clone(),
        config.crawler.page_size,
    );
    let skip_log = SkipLog::new(config.output.skip_log_path());

    let stats = load_statistics(&store, &skip_log)?;
    print_statistics(&stats);

    Ok(())
}

/// Handles the main crawl operation
async fn handle_crawl(config: Config, start: Option<StartPage>, cli: &Cli) -> anyhow::Result<()> {
    let factory = ChromeFactory::new(
        config.site.clone(),
        config.session.clone(),
        config.crawler.wait_timeout(),
        config.crawler.poll_interval(),
    );
    let options = RunOptions {
        start,
        end_page: cli.end_page,
        checkpoint_only: cli.checkpoint_only,
        debug_dump: cli.debug_dump,
    };

    let mut controller = CrawlController::from_config(config, Box::new(factory), options);

    let cancel = controller.cancel_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupt received, stopping after the current page");
            cancel.cancel();
        }
    });

    let report = controller.run().await.context("Crawl failed")?;

    println!("\n=== Crawl Summary ===\n");
    println!("Mode: {}", report.mode);
    println!("Finished: {}", report.finish_reason);
    println!("Start page: {}", report.start_page);
    match report.last_page {
        Some(page) => println!("Last page checkpointed: {}", page),
        None => println!("Last page checkpointed: none"),
    }
    println!("Pages checkpointed: {}", report.pages_checkpointed);
    println!("Records appended: {}", report.records_appended);
    println!("Duplicates dropped: {}", report.duplicates_dropped);
    println!("Session recoveries: {}", report.session_recoveries);
    if !report.skipped_pages.is_empty() {
        println!("Skipped pages: {:?}", report.skipped_pages);
    }

    Ok(())
}
