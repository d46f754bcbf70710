//! Fetch-and-persist ingestion loop
//!
//! Ids are processed strictly one after another:
//!
//! ```text
//! PENDING ─┬─ already stored ──────────────────────────► SKIPPED
//!          └─ fetch ─┬─ ok ─ insert ─┬─ ok ───────────────► STORED
//!                    │               └─ duplicate key ───► SKIPPED
//!                    └─ error ─────── failure log ───────► FAILED
//! ```
//!
//! The existence check runs before any request, so a rerun over the same input
//! only fetches ids that were never stored. Per-id failures are written to the
//! failure sink and never end the run; only an unreadable id source does.

use crate::client::ProductFetcher;
use crate::error::{FetchError, ItemError, Result};
use crate::failure_log::FailureSink;
use crate::store::RecordStore;
use chrono::{DateTime, Utc};
use indicatif::ProgressBar;
use prodsync_common::{FailureEntry, FailureKind, ProductId, ProductRecord};
use std::fmt;
use std::time::Duration;
use tracing::{debug, error, info, instrument, warn};

/// Tuning for one pipeline run
#[derive(Debug, Clone)]
pub struct PipelineOptions {
    /// Fetch attempts per id for transient failures (1 = no retry)
    pub max_attempts: u32,
    /// Backoff unit; attempt `n` waits `n × retry_backoff` before retrying
    pub retry_backoff: Duration,
    /// Stop after this many ids
    pub limit: Option<usize>,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            max_attempts: 1,
            retry_backoff: Duration::from_secs(2),
            limit: None,
        }
    }
}

/// Terminal state of one id
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemOutcome {
    Stored,
    Skipped,
    Failed(FailureKind),
}

/// Counts reported when a run reaches the end of its id source
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IngestSummary {
    pub total: u64,
    pub stored: u64,
    pub skipped: u64,
    pub failed: u64,
    pub not_found: u64,
    pub transient: u64,
    pub unknown: u64,
    pub duration_secs: f64,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl IngestSummary {
    fn new() -> Self {
        Self {
            started_at: Some(Utc::now()),
            ..Default::default()
        }
    }

    fn record(&mut self, outcome: ItemOutcome) {
        self.total += 1;
        match outcome {
            ItemOutcome::Stored => self.stored += 1,
            ItemOutcome::Skipped => self.skipped += 1,
            ItemOutcome::Failed(kind) => {
                self.failed += 1;
                match kind {
                    FailureKind::NotFound => self.not_found += 1,
                    FailureKind::Transient => self.transient += 1,
                    FailureKind::Duplicate | FailureKind::Unknown => self.unknown += 1,
                }
            },
        }
    }

    fn finish(&mut self) {
        let completed_at = Utc::now();
        if let Some(started_at) = self.started_at {
            self.duration_secs = (completed_at - started_at).num_milliseconds() as f64 / 1000.0;
        }
        self.completed_at = Some(completed_at);
    }
}

impl fmt::Display for IngestSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "========== Ingestion Summary ==========")?;
        writeln!(f, "Total ids:  {}", self.total)?;
        writeln!(f, "Stored:     {}", self.stored)?;
        writeln!(f, "Skipped:    {}", self.skipped)?;
        writeln!(
            f,
            "Failed:     {} (not found: {}, transient: {}, unknown: {})",
            self.failed, self.not_found, self.transient, self.unknown
        )?;
        writeln!(f, "Duration:   {:.1}s", self.duration_secs)?;
        write!(f, "=======================================")
    }
}

/// Sequential fetch-and-persist pipeline
pub struct IngestionPipeline<'a> {
    fetcher: &'a dyn ProductFetcher,
    store: &'a dyn RecordStore,
    failures: &'a dyn FailureSink,
    options: PipelineOptions,
    progress: ProgressBar,
}

impl<'a> IngestionPipeline<'a> {
    pub fn new(
        fetcher: &'a dyn ProductFetcher,
        store: &'a dyn RecordStore,
        failures: &'a dyn FailureSink,
        options: PipelineOptions,
    ) -> Self {
        Self {
            fetcher,
            store,
            failures,
            options,
            progress: ProgressBar::hidden(),
        }
    }

    /// Report progress on `progress`, one tick per id
    pub fn with_progress(mut self, progress: ProgressBar) -> Self {
        self.progress = progress;
        self
    }

    /// Process every id from `ids` in order
    ///
    /// Returns an error only when the id source itself fails.
    pub async fn run<I>(&self, ids: I) -> Result<IngestSummary>
    where
        I: IntoIterator<Item = Result<ProductId>>,
    {
        let mut summary = IngestSummary::new();
        let limit = self.options.limit.unwrap_or(usize::MAX);

        info!(
            max_attempts = self.options.max_attempts,
            limit = ?self.options.limit,
            "Starting ingestion run"
        );

        for id in ids.into_iter().take(limit) {
            let id = match id {
                Ok(id) => id,
                Err(e) => {
                    self.progress.abandon();
                    error!(error = %e, processed = summary.total, "Product id source failed");
                    return Err(e);
                },
            };

            let outcome = self.process(id).await;
            summary.record(outcome);
            self.progress.inc(1);
        }

        summary.finish();
        self.progress.finish_and_clear();

        info!(
            total = summary.total,
            stored = summary.stored,
            skipped = summary.skipped,
            failed = summary.failed,
            duration_secs = summary.duration_secs,
            "Ingestion run complete"
        );

        Ok(summary)
    }

    /// Drive one id to its terminal state
    #[instrument(skip_all, fields(product_id = %id))]
    pub async fn process(&self, id: ProductId) -> ItemOutcome {
        match self.store.exists(id).await {
            Ok(true) => {
                debug!("Already stored; skipping");
                return ItemOutcome::Skipped;
            },
            Ok(false) => {},
            Err(e) => return self.fail(id, e.into(), 0),
        }

        let (fetched, attempts) = self.fetch_with_retry(id).await;
        let record = match fetched {
            Ok(record) => record,
            Err(e) => return self.fail(id, e.into(), attempts),
        };

        match self.store.insert(&record).await.map_err(ItemError::from) {
            Ok(()) => {
                debug!(attempts, missing = ?record.missing_fields(), "Stored");
                ItemOutcome::Stored
            },
            Err(ItemError::Duplicate) => {
                debug!("Stored by a concurrent run; skipping");
                ItemOutcome::Skipped
            },
            Err(e) => self.fail(id, e, attempts),
        }
    }

    async fn fetch_with_retry(
        &self,
        id: ProductId,
    ) -> (std::result::Result<ProductRecord, FetchError>, u32) {
        let max_attempts = self.options.max_attempts.max(1);
        let mut attempt = 1;

        loop {
            match self.fetcher.fetch(id).await {
                Ok(record) => return (Ok(record), attempt),
                Err(e) if e.is_retryable() && attempt < max_attempts => {
                    warn!(attempt, max_attempts, error = %e, "Transient fetch failure, retrying");
                    tokio::time::sleep(self.options.retry_backoff * attempt).await;
                    attempt += 1;
                },
                Err(e) => return (Err(e), attempt),
            }
        }
    }

    fn fail(&self, id: ProductId, err: ItemError, attempts: u32) -> ItemOutcome {
        let kind = err.kind();
        debug!(kind = %kind, attempts, error = %err, "Failed");

        let entry = FailureEntry::new(id, kind, Some(err.to_string())).with_attempts(attempts);
        if let Err(e) = self.failures.record(&entry) {
            error!(error = %e, kind = %kind, "Failed to append failure entry");
        }

        ItemOutcome::Failed(kind)
    }
}
