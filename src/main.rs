// Copyright 2026 Quarry Contributors
// SPDX-License-Identifier: Apache-2.0

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use tracing::info;

use quarry::batch::{BatchOptions, Scheduler};
use quarry::config::{ScrapeConfig, Viewport};
use quarry::extract::SelectorCascade;
use quarry::fetch::Fetcher;
use quarry::output::{FileSink, OutputFormat, RecordSink};
use quarry::record::{PageRecord, ProgressSnapshot};

#[derive(Parser)]
#[command(
    name = "quarry",
    about = "Quarry — resilient web page harvester",
    version,
    after_help = "URL files take one URL per line; blank lines and lines starting with '#' are skipped."
)]
struct Cli {
    /// URLs to scrape
    urls: Vec<String>,

    /// File containing URLs (one per line)
    #[arg(long, short = 'f')]
    file: Option<PathBuf>,

    /// Output directory
    #[arg(long, short = 'o', default_value = "./scraped_data")]
    output: PathBuf,

    /// Output format
    #[arg(long, default_value = "all")]
    format: OutputFormat,

    /// Base delay between requests in milliseconds
    #[arg(long, short = 'd', default_value = "3000")]
    delay: u64,

    /// Retry budget per fetch strategy
    #[arg(long, default_value = "5")]
    max_retries: u32,

    /// Drive every fetch through the headless browser
    #[arg(long, short = 'b')]
    browser: bool,

    /// Human behavior simulation (browser + extended delays)
    #[arg(long)]
    human: bool,

    /// Disable the browser fallback after anti-bot HTTP failures
    #[arg(long)]
    no_fallback: bool,

    /// Custom viewport size (e.g. 1920x1080)
    #[arg(long)]
    viewport: Option<Viewport>,

    /// Per-site selector cascade profile (JSON)
    #[arg(long)]
    selectors: Option<PathBuf>,

    /// Additional delay between batch items in milliseconds
    #[arg(long, default_value = "0")]
    batch_delay: u64,

    /// Stop the batch on the first per-URL failure
    #[arg(long)]
    stop_on_error: bool,

    /// Maximum concurrent requests (1 = sequential)
    #[arg(long, default_value = "1")]
    max_concurrent: usize,

    /// Disable the progress bar
    #[arg(long)]
    no_progress: bool,

    /// Enable verbose/debug logging
    #[arg(long, short)]
    verbose: bool,

    /// Suppress non-essential output
    #[arg(long, short)]
    quiet: bool,
}

/// File/console sink composition: every record goes to disk and ticks
/// the progress bar.
struct ConsoleSink {
    inner: FileSink,
    bar: Option<ProgressBar>,
    quiet: bool,
}

impl RecordSink for ConsoleSink {
    fn on_record(&self, record: &PageRecord) -> Result<()> {
        let result = self.inner.on_record(record);
        if let Some(bar) = &self.bar {
            bar.inc(1);
        }
        result
    }

    fn on_failure(&self, url: &str) {
        self.inner.on_failure(url);
        if let Some(bar) = &self.bar {
            bar.inc(1);
        }
    }

    fn on_batch_end(&self, results: &[PageRecord], failed: &[String]) -> Result<()> {
        if let Some(bar) = &self.bar {
            bar.finish_and_clear();
        }
        let outcome = self.inner.on_batch_end(results, failed);
        if !self.quiet {
            print_summary(results, failed);
        }
        outcome
    }

    fn on_progress(&self, snapshot: &ProgressSnapshot) -> Result<()> {
        self.inner.on_progress(snapshot)
    }
}

fn print_summary(results: &[PageRecord], failed: &[String]) {
    if results.is_empty() {
        println!("\nNo pages were successfully scraped.");
    } else {
        let words: usize = results.iter().map(|r| r.metadata.word_count).sum();
        let sections: usize = results.iter().map(|r| r.metadata.section_count).sum();
        println!("\nScraping completed.");
        println!("  Pages scraped: {}", results.len());
        println!("  Total words:   {words}");
        println!("  Total sections: {sections}");
    }
    if !failed.is_empty() {
        println!("  Failed URLs ({}):", failed.len());
        for url in failed {
            println!("    - {url}");
        }
    }
}

fn collect_urls(cli: &Cli) -> Result<Vec<String>> {
    let mut urls = cli.urls.clone();
    if let Some(path) = &cli.file {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read URL file {}", path.display()))?;
        urls.extend(
            content
                .lines()
                .map(str::trim)
                .filter(|line| !line.is_empty() && !line.starts_with('#'))
                .filter(|line| line.starts_with("http"))
                .map(str::to_string),
        );
    }
    Ok(urls)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose {
        "quarry=debug"
    } else if cli.quiet {
        "quarry=warn"
    } else {
        "quarry=info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(default_level.parse().context("bad log directive")?),
        )
        .init();

    let urls = collect_urls(&cli)?;
    if urls.is_empty() {
        bail!("no URLs to scrape; pass URLs directly or via --file");
    }
    info!("loaded {} URLs", urls.len());

    // Human mode implies slower pacing, matching how a person browses.
    let base_delay = if cli.human {
        Duration::from_millis(cli.delay.max(5000))
    } else {
        Duration::from_millis(cli.delay)
    };
    let batch_delay = if cli.human && cli.batch_delay == 0 {
        Duration::from_millis(3000)
    } else {
        Duration::from_millis(cli.batch_delay)
    };

    let cascade = match &cli.selectors {
        Some(path) => {
            let json = std::fs::read_to_string(path)
                .with_context(|| format!("failed to read selector profile {}", path.display()))?;
            SelectorCascade::from_json(&json)?
        }
        None => SelectorCascade::default(),
    };

    let config = ScrapeConfig {
        output_dir: cli.output.clone(),
        base_delay,
        max_retries: cli.max_retries,
        use_browser: cli.browser,
        human_mode: cli.human,
        browser_fallback: !cli.no_fallback,
        custom_viewport: cli.viewport,
        ..ScrapeConfig::default()
    };

    let bar = (!cli.no_progress && !cli.quiet).then(|| {
        let bar = ProgressBar::new(urls.len() as u64);
        bar.set_style(
            ProgressStyle::with_template(
                "Scraping [{bar:30}] {pos}/{len} {percent}% {eta}",
            )
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("█░ "),
        );
        bar
    });

    let sink = Arc::new(ConsoleSink {
        inner: FileSink::new(&config.output_dir, cli.format)?,
        bar,
        quiet: cli.quiet,
    });

    let fetcher = Arc::new(Fetcher::new(config));
    let stats = fetcher.identity_snapshot();
    info!("user agents available: {}", stats.agents_available);

    let scheduler = Scheduler::new(Arc::clone(&fetcher), Arc::new(cascade), sink);

    let options = BatchOptions {
        batch_delay,
        continue_on_error: !cli.stop_on_error,
        max_concurrent: cli.max_concurrent.max(1),
    };
    let outcome = scheduler.run(&urls, &options).await;

    fetcher.shutdown().await;

    if outcome.results.is_empty() {
        std::process::exit(1);
    }
    Ok(())
}
