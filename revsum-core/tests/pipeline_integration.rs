//! Integration tests for the review-summary sync.
//!
//! These run the full read and write paths against `InMemoryPlatform` and
//! `MockSummarizer`, covering the catalog scenarios the sync must handle.

use std::sync::Arc;

use pretty_assertions::assert_eq;
use revsum_core::config::SyncConfig;
use revsum_core::error::{PlatformError, RevsumError, SyncStep};
use revsum_core::pipeline::{ReviewSyncPipeline, SyncOutcome};
use revsum_core::platform::InMemoryPlatform;
use revsum_core::summarizer::MockSummarizer;
use revsum_core::types::{CatalogEntry, Review, ReviewStatistics, ReviewTarget, StoredSummary};

fn entry(id: &str, count: u64, average: f64, stored: Option<(u64, f64)>) -> CatalogEntry {
    CatalogEntry {
        id: id.to_string(),
        version: 1,
        review_statistics: ReviewStatistics {
            count,
            average_rating: average,
        },
        stored_summary: stored.map(|(c, a)| StoredSummary {
            referenced_summary_id: format!("legacy-{id}"),
            total_review_count_at_last_sync: c,
            average_rating_at_last_sync: a,
        }),
    }
}

fn review(id: &str, target: &str, rating: i32) -> Review {
    Review {
        id: id.to_string(),
        title: Some(format!("Title {id}")),
        text: Some(format!("Review text {id}")),
        rating: Some(rating),
        target: ReviewTarget {
            type_id: "product".to_string(),
            id: target.to_string(),
        },
    }
}

fn config() -> SyncConfig {
    let mut config = SyncConfig::default();
    config.pagination.page_limit = 2;
    config
}

/// Helper to build a pipeline over shared test doubles.
fn create_pipeline(
    platform: &Arc<InMemoryPlatform>,
    summarizer: &Arc<MockSummarizer>,
    config: &SyncConfig,
) -> ReviewSyncPipeline<InMemoryPlatform, MockSummarizer> {
    ReviewSyncPipeline::new(platform.clone(), summarizer.clone(), config).unwrap()
}

fn well_formed() -> Arc<MockSummarizer> {
    Arc::new(MockSummarizer::with_response(MockSummarizer::sample_payload()))
}

// --- Read path ---

#[tokio::test]
async fn test_no_entries_with_reviews_reports_no_updates() {
    let platform = Arc::new(InMemoryPlatform::with_data(
        vec![entry("a", 0, 0.0, None), entry("b", 0, 0.0, None)],
        vec![],
    ));
    let summarizer = well_formed();
    let pipeline = create_pipeline(&platform, &summarizer, &config());

    let outcome = pipeline.collect_updates().await.unwrap();
    assert_eq!(outcome, SyncOutcome::NoUpdates);
    assert!(platform.review_queries().is_empty());
}

#[tokio::test]
async fn test_fallback_keeps_whole_set_when_synced_entries_are_fresh() {
    let platform = Arc::new(InMemoryPlatform::with_data(
        vec![
            entry("p-1", 2, 4.5, None),
            entry("p-2", 1, 3.0, None),
            entry("p-3", 4, 4.25, Some((4, 4.25))),
        ],
        vec![
            review("r-1", "p-1", 5),
            review("r-2", "p-1", 4),
            review("r-3", "p-2", 3),
            review("r-4", "p-3", 4),
            review("r-5", "other", 1),
        ],
    ));
    let summarizer = well_formed();
    let pipeline = create_pipeline(&platform, &summarizer, &config());

    let outcome = pipeline.collect_updates().await.unwrap();
    let SyncOutcome::Updates { pages, entries } = outcome else {
        panic!("expected updates");
    };
    assert_eq!(entries, 3);
    assert_eq!(pages.len(), 1);
    let ids: Vec<&str> = pages[0].iter().map(|e| e.id.as_str()).collect();
    assert_eq!(ids, vec!["p-3", "p-2", "p-1"]);
    assert_eq!(pages[0][2].reviews.len(), 2);

    let scope = platform.review_queries()[0]
        .where_clause
        .as_ref()
        .unwrap()
        .to_string();
    assert_eq!(
        scope,
        r#"target(typeId="product" and id in ("p-3", "p-2", "p-1"))"#
    );
}

#[tokio::test]
async fn test_threshold_decides_staleness() {
    // Synced at 5 reviews with threshold 2: 8 is stale, 7 is not.
    let mut config = config();
    config.criteria.review_count_difference = 2;
    let platform = Arc::new(InMemoryPlatform::with_data(
        vec![
            entry("e-stale", 8, 4.0, Some((5, 4.0))),
            entry("e-fresh", 7, 4.0, Some((5, 4.0))),
            entry("e-moved", 7, 4.01, Some((5, 4.0))),
        ],
        vec![
            review("r-1", "e-stale", 4),
            review("r-2", "e-fresh", 4),
            review("r-3", "e-moved", 4),
        ],
    ));
    let summarizer = well_formed();
    let pipeline = create_pipeline(&platform, &summarizer, &config);

    let ids: Vec<String> = pipeline
        .collect_updates()
        .await
        .unwrap()
        .into_entries()
        .into_iter()
        .map(|e| e.id)
        .collect();
    assert_eq!(ids, vec!["e-stale", "e-moved"]);
}

#[tokio::test]
async fn test_large_result_set_is_split_into_pages() {
    let mut config = config();
    config.batching.page_budget_kb = 1.0;
    let entries: Vec<CatalogEntry> = (0..6)
        .map(|i| entry(&format!("p-{i}"), 3, 4.0, None))
        .collect();
    let reviews: Vec<Review> = (0..6)
        .flat_map(|i| (0..3).map(move |j| review(&format!("r-{i}-{j}"), &format!("p-{i}"), 4)))
        .collect();
    let platform = Arc::new(InMemoryPlatform::with_data(entries, reviews));
    let summarizer = well_formed();
    let pipeline = create_pipeline(&platform, &summarizer, &config);

    let SyncOutcome::Updates { pages, entries } = pipeline.collect_updates().await.unwrap() else {
        panic!("expected updates");
    };
    assert_eq!(entries, 6);
    assert!(pages.len() > 1);
    assert_eq!(pages.iter().map(Vec::len).sum::<usize>(), 6);
}

#[tokio::test]
async fn test_listing_failure_aborts_run() {
    let platform = Arc::new(InMemoryPlatform::with_data(
        vec![entry("p-1", 2, 4.0, None)],
        vec![],
    ));
    platform.fail_listings("connection reset");
    let summarizer = well_formed();
    let pipeline = create_pipeline(&platform, &summarizer, &config());

    let err = pipeline.collect_updates().await.unwrap_err();
    assert!(matches!(
        err,
        RevsumError::Platform(PlatformError::Transport { .. })
    ));
}

// --- Write path ---

#[tokio::test]
async fn test_full_run_links_every_entry() {
    let platform = Arc::new(InMemoryPlatform::with_data(
        vec![entry("p-1", 2, 4.5, None), entry("p-2", 1, 3.0, None)],
        vec![
            review("r-1", "p-1", 5),
            review("r-2", "p-1", 4),
            review("r-3", "p-2", 3),
        ],
    ));
    let summarizer = well_formed();
    let pipeline = create_pipeline(&platform, &summarizer, &config());

    let report = pipeline.run().await.unwrap().expect("updates");
    assert!(report.is_success());
    assert_eq!(report.succeeded.len(), 2);
    assert_eq!(summarizer.call_count(), 2);

    let (_, record) = platform.record("product-review-summary", "p-1").unwrap();
    assert_eq!(record.entry_id, "p-1");
    assert_eq!(record.total_review_count, 2);
    assert_eq!(record.last_average_point, 4.5);
    assert!(!record.is_confirmed);

    let stored = platform.entry("p-1").unwrap().stored_summary.unwrap();
    assert_eq!(stored.total_review_count_at_last_sync, 2);
}

#[tokio::test]
async fn test_second_run_reuses_records() {
    let platform = Arc::new(InMemoryPlatform::with_data(
        vec![entry("p-1", 2, 4.5, None)],
        vec![review("r-1", "p-1", 5), review("r-2", "p-1", 4)],
    ));
    let summarizer = well_formed();
    let pipeline = create_pipeline(&platform, &summarizer, &config());

    let entries = pipeline.collect_updates().await.unwrap().into_entries();
    let first = pipeline.process_batch(entries.clone()).await;
    assert!(first.is_success());

    // A refreshed snapshot carries the bumped entry version.
    let mut refreshed = entries;
    refreshed[0].version = platform.entry("p-1").unwrap().version;
    let second = pipeline.process_batch(refreshed).await;
    assert!(second.is_success());

    assert_eq!(first.succeeded[0].record_id, second.succeeded[0].record_id);
    assert_eq!(platform.record_count(), 1);
}

#[tokio::test]
async fn test_version_conflict_is_isolated() {
    let platform = Arc::new(InMemoryPlatform::with_data(
        vec![entry("p-1", 1, 4.0, None), entry("p-2", 1, 5.0, None)],
        vec![review("r-1", "p-1", 4), review("r-2", "p-2", 5)],
    ));
    let summarizer = well_formed();
    let pipeline = create_pipeline(&platform, &summarizer, &config());

    let entries = pipeline.collect_updates().await.unwrap().into_entries();
    // p-2 changes between the read and the write.
    platform.set_statistics(
        "p-2",
        ReviewStatistics {
            count: 2,
            average_rating: 4.5,
        },
    );

    let report = pipeline.process_batch(entries).await;
    assert_eq!(report.succeeded.len(), 1);
    assert_eq!(report.succeeded[0].entry_id, "p-1");
    assert_eq!(report.failed.len(), 1);
    let failure = &report.failed[0];
    assert_eq!(failure.entry_id, "p-2");
    assert_eq!(failure.step, SyncStep::LinkAttribute);
    assert!(failure.is_version_conflict());

    // The record stays behind; the entry is still unlinked and stale.
    assert!(platform.record("product-review-summary", "p-2").is_some());
    assert!(platform.entry("p-2").unwrap().stored_summary.is_none());
}

#[tokio::test]
async fn test_malformed_summary_skips_upsert_for_that_entry() {
    let platform = Arc::new(InMemoryPlatform::with_data(
        vec![entry("p-1", 1, 4.0, None), entry("p-2", 1, 5.0, None)],
        vec![review("r-1", "p-1", 4), review("r-2", "p-2", 5)],
    ));
    let summarizer = well_formed();
    // Entries are processed in descending id order: p-2 gets the broken summary.
    summarizer.queue_response(r#"{"summary":{"en":"Good"}}"#);
    let pipeline = create_pipeline(&platform, &summarizer, &config());

    let report = pipeline.run().await.unwrap().expect("updates");
    assert_eq!(report.failed.len(), 1);
    assert_eq!(report.failed[0].entry_id, "p-2");
    assert_eq!(report.failed[0].step, SyncStep::ParseSummary);
    assert!(platform.record("product-review-summary", "p-2").is_none());
    assert!(platform.record("product-review-summary", "p-1").is_some());
}

#[tokio::test]
async fn test_duplicate_entries_run_in_sequence() {
    let platform = Arc::new(InMemoryPlatform::with_data(
        vec![entry("p-1", 1, 4.0, None)],
        vec![review("r-1", "p-1", 4)],
    ));
    let summarizer = well_formed();
    let pipeline = create_pipeline(&platform, &summarizer, &config());

    let entries = pipeline.collect_updates().await.unwrap().into_entries();
    let doubled = vec![entries[0].clone(), entries[0].clone()];
    let report = pipeline.process_batch(doubled).await;

    // The second write carries the version the first one consumed.
    assert_eq!(report.succeeded.len(), 1);
    assert_eq!(report.failed.len(), 1);
    assert!(report.failed[0].is_version_conflict());
    assert_eq!(platform.record_count(), 1);
}
