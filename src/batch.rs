//! Batch scheduler: drives a URL list through fetch → extract.
//!
//! Two scheduling modes. Sequential walks the list one URL at a time
//! with a randomized pause between items — the stealthy default.
//! Concurrent partitions the list into fixed-size waves; a wave's
//! fetches are dispatched together and joined before the next wave
//! starts, so wave membership and wave order are deterministic even
//! though completion order within a wave is not.
//!
//! Every failure ends up in the failed list exactly once; nothing is
//! silently dropped.

use std::sync::Arc;
use std::time::Duration;

use rand::thread_rng;
use tracing::{info, warn};

use crate::error::FetchError;
use crate::extract::{self, SelectorCascade};
use crate::fetch::Fetcher;
use crate::output::RecordSink;
use crate::record::{PageRecord, ProgressSnapshot};
use crate::timing;

/// Batch processing options.
#[derive(Debug, Clone)]
pub struct BatchOptions {
    /// Fixed delay added on top of the natural inter-item pause.
    pub batch_delay: Duration,
    /// Keep going after a per-URL failure. When false the first failure
    /// aborts the rest of the batch (at wave granularity when
    /// concurrent).
    pub continue_on_error: bool,
    /// 1 = strictly sequential; above that, fixed-size concurrent waves.
    pub max_concurrent: usize,
}

impl Default for BatchOptions {
    fn default() -> Self {
        Self {
            batch_delay: Duration::ZERO,
            continue_on_error: true,
            max_concurrent: 1,
        }
    }
}

/// What a batch run produced.
#[derive(Debug)]
pub struct BatchOutcome {
    pub results: Vec<PageRecord>,
    pub failed: Vec<String>,
}

/// Drives URLs through the fetcher and extraction engine.
pub struct Scheduler {
    fetcher: Arc<Fetcher>,
    cascade: Arc<SelectorCascade>,
    sink: Arc<dyn RecordSink>,
}

impl Scheduler {
    pub fn new(
        fetcher: Arc<Fetcher>,
        cascade: Arc<SelectorCascade>,
        sink: Arc<dyn RecordSink>,
    ) -> Self {
        Self {
            fetcher,
            cascade,
            sink,
        }
    }

    /// Fetch and extract a single page.
    pub async fn scrape_page(&self, url: &str) -> Result<PageRecord, FetchError> {
        let outcome = self.fetcher.retrieve(url).await?;
        let method = outcome.method.to_string();

        // scraper's DOM types are !Send, so parsing runs off the async
        // worker threads.
        let cascade = Arc::clone(&self.cascade);
        let html = outcome.html;
        let source = url.to_string();
        let mut record =
            tokio::task::spawn_blocking(move || extract::extract(&html, &source, &cascade))
                .await
                .map_err(|e| FetchError::Transport {
                    url: url.to_string(),
                    reason: format!("extraction task failed: {e}"),
                })?;
        record.metadata.scraping_method = method;

        info!(
            "extracted ({}) \"{}\" ({} words, {} sections)",
            record.metadata.scraping_method,
            record.title,
            record.metadata.word_count,
            record.metadata.section_count
        );
        Ok(record)
    }

    /// Run the whole batch and report the consolidated outcome.
    pub async fn run(&self, urls: &[String], options: &BatchOptions) -> BatchOutcome {
        info!(
            "starting batch of {} URLs (max_concurrent={}, continue_on_error={})",
            urls.len(),
            options.max_concurrent,
            options.continue_on_error
        );

        let mut results = Vec::new();
        let mut failed = Vec::new();

        if options.max_concurrent <= 1 {
            self.run_sequential(urls, options, &mut results, &mut failed)
                .await;
        } else {
            self.run_waves(urls, options, &mut results, &mut failed)
                .await;
        }

        if let Err(e) = self.sink.on_batch_end(&results, &failed) {
            warn!("failed to write consolidated output: {e:#}");
        }
        let snapshot = ProgressSnapshot::new(
            urls.len(),
            results.iter().map(|r| r.url.clone()).collect(),
            failed.clone(),
        );
        if let Err(e) = self.sink.on_progress(&snapshot) {
            warn!("failed to persist progress snapshot: {e:#}");
        }

        if results.is_empty() && !urls.is_empty() {
            warn!("batch produced no results; all {} URLs failed", urls.len());
        } else {
            info!(
                "batch complete: {} scraped, {} failed",
                results.len(),
                failed.len()
            );
        }
        for url in &failed {
            warn!("failed URL: {url}");
        }

        BatchOutcome { results, failed }
    }

    async fn run_sequential(
        &self,
        urls: &[String],
        options: &BatchOptions,
        results: &mut Vec<PageRecord>,
        failed: &mut Vec<String>,
    ) {
        for (i, url) in urls.iter().enumerate() {
            info!("[{}/{}] processing {url}", i + 1, urls.len());
            match self.scrape_page(url).await {
                Ok(record) => {
                    if let Err(e) = self.sink.on_record(&record) {
                        warn!("failed to write record for {url}: {e:#}");
                    }
                    results.push(record);
                }
                Err(err) => {
                    warn!("failed {url}: {err}");
                    failed.push(url.clone());
                    self.sink.on_failure(url);
                    if !options.continue_on_error {
                        warn!("stopping batch after failure");
                        break;
                    }
                }
            }

            if i + 1 < urls.len() {
                self.pause_between(options).await;
            }
        }
    }

    async fn run_waves(
        &self,
        urls: &[String],
        options: &BatchOptions,
        results: &mut Vec<PageRecord>,
        failed: &mut Vec<String>,
    ) {
        let wave_count = urls.len().div_ceil(options.max_concurrent);
        for (wave_index, wave) in urls.chunks(options.max_concurrent).enumerate() {
            info!(
                "wave {}/{} ({} URLs)",
                wave_index + 1,
                wave_count,
                wave.len()
            );
            let outcomes = futures::future::join_all(wave.iter().map(|url| async move {
                (url, self.scrape_page(url).await)
            }))
            .await;

            let mut wave_failed = false;
            for (url, outcome) in outcomes {
                match outcome {
                    Ok(record) => {
                        if let Err(e) = self.sink.on_record(&record) {
                            warn!("failed to write record for {url}: {e:#}");
                        }
                        results.push(record);
                    }
                    Err(err) => {
                        warn!("failed {url}: {err}");
                        failed.push(url.clone());
                        self.sink.on_failure(url);
                        wave_failed = true;
                    }
                }
            }

            if wave_failed && !options.continue_on_error {
                warn!("stopping batch after failed wave");
                break;
            }
            if (wave_index + 1) * options.max_concurrent < urls.len() {
                self.pause_between(options).await;
            }
        }
    }

    async fn pause_between(&self, options: &BatchOptions) {
        let pause = {
            let mut rng = thread_rng();
            timing::inter_page_delay(self.fetcher_base_delay(), &mut rng)
        } + options.batch_delay;
        if !pause.is_zero() {
            info!("waiting {:.1}s before next item", pause.as_secs_f64());
            tokio::time::sleep(pause).await;
        }
    }

    fn fetcher_base_delay(&self) -> Duration {
        self.fetcher.config().base_delay
    }
}
