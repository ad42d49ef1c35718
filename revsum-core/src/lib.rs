//! # Revsum Core
//!
//! Core library for the product review-summary sync.
//! Walks the commerce catalog with cursor pagination, selects entries whose
//! stored summary is stale, joins their reviews, packs the result into
//! size-bounded pages, and writes summaries back with an idempotent upsert.

pub mod aggregate;
pub mod batcher;
pub mod config;
pub mod criteria;
pub mod error;
pub mod fetch;
pub mod paginator;
pub mod pipeline;
pub mod platform;
pub mod query;
pub mod summarizer;
pub mod types;
pub mod upsert;

// Re-export commonly used types at the crate root.
pub use aggregate::ReviewAggregator;
pub use batcher::{SizeBoundedBatcher, estimate_size_kb};
pub use config::{SyncConfig, load_config};
pub use criteria::{ReviewCriteriaFilter, round_two};
pub use error::{
    ConfigError, EntrySyncError, PlatformError, Result, RevsumError, SummaryError, SyncStep,
};
pub use fetch::{CatalogSyncFetcher, ReviewFetcher};
pub use paginator::CursorPaginator;
pub use pipeline::{BatchReport, ReviewCollector, ReviewSyncPipeline, SyncOutcome};
pub use platform::{CommercePlatform, HttpPlatform, InMemoryPlatform};
pub use summarizer::{MockSummarizer, OpenAiSummarizer, ReviewSummarizer};
pub use types::{
    CatalogEntry, DisplayReview, EntryProjection, EntryStage, EntryWithReviews, LinkedSummary,
    Review, ReviewStatistics, ReviewTally, StoredSummary, SummaryPayload, SummaryRecord,
};
pub use upsert::SummaryUpsertSynchronizer;
