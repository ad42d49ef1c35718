//! Sync orchestration.
//!
//! The read path (`collect_updates`) walks the catalog, keeps stale entries,
//! fetches their reviews and packs the joined set into transport pages. The
//! write path (`process_batch`) summarizes each entry and upserts its record
//! independently, so one entry's failure never affects its siblings.

use std::collections::HashMap;
use std::sync::Arc;

use futures::stream::{self, StreamExt};
use tracing::{Instrument, debug, info, info_span, warn};
use uuid::Uuid;

use crate::aggregate::ReviewAggregator;
use crate::batcher::SizeBoundedBatcher;
use crate::config::SyncConfig;
use crate::criteria::ReviewCriteriaFilter;
use crate::error::{ConfigError, EntrySyncError, RevsumError, SyncStep};
use crate::fetch::{CatalogSyncFetcher, ReviewFetcher};
use crate::paginator::CursorPaginator;
use crate::platform::CommercePlatform;
use crate::summarizer::ReviewSummarizer;
use crate::types::{EntryStage, EntryWithReviews, LinkedSummary, SummaryPayload};
use crate::upsert::SummaryUpsertSynchronizer;

/// Result of one read-path run.
#[derive(Debug, Clone, PartialEq)]
pub enum SyncOutcome {
    /// No catalog entry has reviews; nothing was fetched beyond the catalog.
    NoUpdates,
    /// Stale entries with their reviews, split into size-bounded pages.
    Updates {
        pages: Vec<Vec<EntryWithReviews>>,
        entries: usize,
    },
}

impl SyncOutcome {
    pub fn into_entries(self) -> Vec<EntryWithReviews> {
        match self {
            SyncOutcome::NoUpdates => Vec::new(),
            SyncOutcome::Updates { pages, .. } => pages.into_iter().flatten().collect(),
        }
    }
}

/// Per-entry results of a write-path batch.
#[derive(Debug, Default)]
pub struct BatchReport {
    pub succeeded: Vec<LinkedSummary>,
    pub failed: Vec<EntrySyncError>,
}

impl BatchReport {
    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }

    pub fn total(&self) -> usize {
        self.succeeded.len() + self.failed.len()
    }

    pub fn merge(&mut self, other: BatchReport) {
        self.succeeded.extend(other.succeeded);
        self.failed.extend(other.failed);
    }
}

/// Read path: stale entries joined with their reviews, packed into pages.
pub struct ReviewCollector<P: ?Sized> {
    catalog: CatalogSyncFetcher<P>,
    reviews: ReviewFetcher<P>,
    aggregator: ReviewAggregator,
    batcher: SizeBoundedBatcher,
}

impl<P: CommercePlatform + ?Sized> ReviewCollector<P> {
    /// Fails when `config` does not pass [`SyncConfig::validate`].
    pub fn new(platform: Arc<P>, config: &SyncConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let paginator = CursorPaginator::from_config(&config.pagination)?;
        Ok(Self {
            catalog: CatalogSyncFetcher::new(
                platform.clone(),
                paginator,
                ReviewCriteriaFilter::from_config(&config.criteria)?,
            ),
            reviews: ReviewFetcher::new(platform, paginator, config.write.entry_type_id.clone()),
            aggregator: ReviewAggregator::new(),
            batcher: SizeBoundedBatcher::from_config(&config.batching)?,
        })
    }

    /// Run the read path once.
    ///
    /// Any listing failure aborts the run; no partial result is returned.
    pub async fn collect_updates(&self) -> Result<SyncOutcome, RevsumError> {
        let run_id = Uuid::new_v4();
        let span = info_span!("collect_updates", run_id = %run_id);
        self.collect_inner().instrument(span).await
    }

    async fn collect_inner(&self) -> Result<SyncOutcome, RevsumError> {
        let projections = self.catalog.fetch().await?;
        if projections.is_empty() {
            info!("No new update on product reviews");
            return Ok(SyncOutcome::NoUpdates);
        }

        let ids: Vec<String> = projections.iter().map(|p| p.id.clone()).collect();
        for id in &ids {
            debug!(entry_id = %id, stage = ?EntryStage::FilteredIn, "Entry selected");
        }
        let reviews = self.reviews.fetch(&ids).await?;
        let joined = self.aggregator.join(projections, &reviews);
        let entries = joined.len();

        let pages = if self.batcher.exceeds_budget(&joined)? {
            self.batcher.pack(joined)?
        } else {
            vec![joined]
        };
        info!(
            entries,
            reviews = reviews.len(),
            pages = pages.len(),
            budget_kb = self.batcher.budget_kb(),
            "Collected review updates"
        );
        Ok(SyncOutcome::Updates { pages, entries })
    }
}

/// Read path plus the per-entry write path.
pub struct ReviewSyncPipeline<P: ?Sized, S: ?Sized> {
    collector: ReviewCollector<P>,
    aggregator: ReviewAggregator,
    summarizer: Arc<S>,
    upserter: SummaryUpsertSynchronizer<P>,
    concurrency: usize,
}

impl<P, S> ReviewSyncPipeline<P, S>
where
    P: CommercePlatform + ?Sized,
    S: ReviewSummarizer + ?Sized,
{
    /// Fails when `config` does not pass [`SyncConfig::validate`].
    pub fn new(
        platform: Arc<P>,
        summarizer: Arc<S>,
        config: &SyncConfig,
    ) -> Result<Self, ConfigError> {
        Ok(Self {
            collector: ReviewCollector::new(platform.clone(), config)?,
            aggregator: ReviewAggregator::new(),
            summarizer,
            upserter: SummaryUpsertSynchronizer::new(platform, &config.write),
            concurrency: config.write.concurrency,
        })
    }

    pub async fn collect_updates(&self) -> Result<SyncOutcome, RevsumError> {
        self.collector.collect_updates().await
    }

    /// Summarize one entry and write its record and attribute link.
    pub async fn process_entry(
        &self,
        entry: &EntryWithReviews,
    ) -> Result<LinkedSummary, EntrySyncError> {
        let entry_id = entry.id.as_str();
        if entry.reviews.is_empty() {
            return Err(EntrySyncError::new(
                entry_id,
                SyncStep::Validate,
                RevsumError::InvalidEntry {
                    message: "entry has no reviews".to_string(),
                },
            ));
        }

        let tally = self.aggregator.tally(&entry.reviews);
        let raw = self
            .summarizer
            .summarize(&entry.reviews)
            .await
            .map_err(|e| EntrySyncError::new(entry_id, SyncStep::Summarize, e))?;
        let payload = SummaryPayload::parse(&raw)
            .map_err(|e| EntrySyncError::new(entry_id, SyncStep::ParseSummary, e))?;
        debug!(
            entry_id,
            stage = ?EntryStage::Summarized,
            reviews = tally.total_review_count,
            "Summary parsed"
        );

        let linked = self
            .upserter
            .sync(entry_id, entry.version, tally, payload)
            .await?;
        debug!(
            entry_id,
            stage = ?EntryStage::AttributeLinked,
            record_id = %linked.record_id,
            "Entry synced"
        );
        Ok(linked)
    }

    /// Process entries concurrently, collecting each entry's outcome.
    ///
    /// Repeated identifiers run in successive waves, so no two writes for
    /// the same entry are in flight at once.
    pub async fn process_batch(&self, entries: Vec<EntryWithReviews>) -> BatchReport {
        let mut report = BatchReport::default();
        for wave in waves(entries) {
            let results: Vec<Result<LinkedSummary, EntrySyncError>> = stream::iter(wave)
                .map(|entry| async move { self.process_entry(&entry).await })
                .buffered(self.concurrency)
                .collect()
                .await;
            for result in results {
                match result {
                    Ok(linked) => report.succeeded.push(linked),
                    Err(e) => {
                        warn!(
                            entry_id = %e.entry_id,
                            step = %e.step,
                            stage = ?EntryStage::Failed,
                            error = %e.source,
                            "Entry sync failed"
                        );
                        report.failed.push(e);
                    }
                }
            }
        }
        info!(
            succeeded = report.succeeded.len(),
            failed = report.failed.len(),
            "Processed batch"
        );
        report
    }

    /// Read path followed by the write path for every collected entry.
    ///
    /// Returns `None` when there was nothing to update.
    pub async fn run(&self) -> Result<Option<BatchReport>, RevsumError> {
        match self.collect_updates().await? {
            SyncOutcome::NoUpdates => Ok(None),
            SyncOutcome::Updates { pages, .. } => {
                let mut report = BatchReport::default();
                for page in pages {
                    report.merge(self.process_batch(page).await);
                }
                Ok(Some(report))
            }
        }
    }
}

/// Split entries so that every wave holds each identifier at most once.
fn waves(entries: Vec<EntryWithReviews>) -> Vec<Vec<EntryWithReviews>> {
    let mut seen: HashMap<String, usize> = HashMap::new();
    let mut waves: Vec<Vec<EntryWithReviews>> = Vec::new();
    for entry in entries {
        let slot = seen.entry(entry.id.clone()).or_insert(0);
        let wave = *slot;
        *slot += 1;
        if waves.len() <= wave {
            waves.push(Vec::new());
        }
        waves[wave].push(entry);
    }
    waves
}
