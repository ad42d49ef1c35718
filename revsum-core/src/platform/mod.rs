//! Commerce platform abstraction.
//!
//! The sync core only talks to the platform through [`CommercePlatform`]:
//! two paged listings, one keyed upsert, one versioned attribute write.
//! - `HttpPlatform`: the platform's REST API over `reqwest`.
//! - `InMemoryPlatform`: deterministic backend for tests and dry runs.

pub mod http;
pub mod memory;

use async_trait::async_trait;

use crate::error::PlatformError;
use crate::query::{ListingQuery, PagedResponse};
use crate::types::{AttributeLink, CatalogEntry, Review, StoredRecordRef, SummaryRecordDraft};

pub use http::HttpPlatform;
pub use memory::InMemoryPlatform;

#[async_trait]
pub trait CommercePlatform: Send + Sync {
    /// One page of catalog entries matching the query.
    async fn list_catalog_entries(
        &self,
        query: &ListingQuery,
    ) -> Result<PagedResponse<CatalogEntry>, PlatformError>;

    /// One page of reviews matching the query.
    async fn list_reviews(&self, query: &ListingQuery)
    -> Result<PagedResponse<Review>, PlatformError>;

    /// Create or replace the record stored under `{container, key}`.
    async fn upsert_summary_record(
        &self,
        draft: &SummaryRecordDraft,
    ) -> Result<StoredRecordRef, PlatformError>;

    /// Point an entry's summary attribute at a record.
    ///
    /// Fails with [`PlatformError::VersionConflict`] when `entry_version` is stale.
    async fn link_summary_attribute(&self, link: &AttributeLink) -> Result<(), PlatformError>;
}
