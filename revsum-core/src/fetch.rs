//! Read-path fetchers: catalog entries needing a new summary, and their reviews.

use std::collections::HashSet;
use std::sync::Arc;

use tracing::{debug, info};

use crate::criteria::ReviewCriteriaFilter;
use crate::error::PlatformError;
use crate::paginator::CursorPaginator;
use crate::platform::CommercePlatform;
use crate::query::{ListingQuery, Predicate, RangeFilter};
use crate::types::{EntryProjection, EntryStage, Review};

/// Expansion that inlines the summary record referenced by entry attributes.
pub const SUMMARY_EXPAND: &str = "masterVariant.attributes[*].value";

/// Pulls every entry with at least one review and narrows it to stale ones.
pub struct CatalogSyncFetcher<P: ?Sized> {
    platform: Arc<P>,
    paginator: CursorPaginator,
    filter: ReviewCriteriaFilter,
}

impl<P: CommercePlatform + ?Sized> CatalogSyncFetcher<P> {
    pub fn new(platform: Arc<P>, paginator: CursorPaginator, filter: ReviewCriteriaFilter) -> Self {
        Self {
            platform,
            paginator,
            filter,
        }
    }

    /// Projections of the entries whose summary must be refreshed.
    ///
    /// An empty result means no entry has reviews at all.
    pub async fn fetch(&self) -> Result<Vec<EntryProjection>, PlatformError> {
        let base = ListingQuery::new(self.paginator.limit())
            .with_filter(RangeFilter::has_reviews())
            .with_expand(SUMMARY_EXPAND);
        let platform = &self.platform;
        let candidates = self
            .paginator
            .collect(&base, |query| async move {
                platform.list_catalog_entries(&query).await
            })
            .await?;

        if candidates.is_empty() {
            info!("No catalog entries with reviews");
            return Ok(Vec::new());
        }

        let candidate_ids: Vec<String> = candidates.iter().map(|e| e.id.clone()).collect();
        for entry in &candidates {
            debug!(
                entry_id = %entry.id,
                stage = ?EntryStage::Candidate,
                reviews = entry.review_statistics.count,
                "Entry has reviews"
            );
        }
        let selected = self.filter.filter_set(candidates);
        let kept: HashSet<&str> = selected.iter().map(|e| e.id.as_str()).collect();
        for id in candidate_ids.iter().filter(|id| !kept.contains(id.as_str())) {
            debug!(entry_id = %id, stage = ?EntryStage::FilteredOut, "Entry summary is current");
        }
        info!(
            candidates = candidate_ids.len(),
            selected = selected.len(),
            "Filtered catalog entries by review criteria"
        );
        Ok(selected.iter().map(|e| e.projection()).collect())
    }
}

/// Pulls every review targeting a set of entries.
pub struct ReviewFetcher<P: ?Sized> {
    platform: Arc<P>,
    paginator: CursorPaginator,
    entry_type_id: String,
}

impl<P: CommercePlatform + ?Sized> ReviewFetcher<P> {
    pub fn new(
        platform: Arc<P>,
        paginator: CursorPaginator,
        entry_type_id: impl Into<String>,
    ) -> Self {
        Self {
            platform,
            paginator,
            entry_type_id: entry_type_id.into(),
        }
    }

    /// Scoping predicate: the given ids, or every entry of the type when empty.
    pub fn target_predicate(&self, entry_ids: &[String]) -> Predicate {
        Predicate::ReviewTarget {
            type_id: self.entry_type_id.clone(),
            ids: if entry_ids.is_empty() {
                None
            } else {
                Some(entry_ids.to_vec())
            },
        }
    }

    pub async fn fetch(&self, entry_ids: &[String]) -> Result<Vec<Review>, PlatformError> {
        let base = ListingQuery::new(self.paginator.limit())
            .with_where(self.target_predicate(entry_ids));
        let platform = &self.platform;
        let reviews = self
            .paginator
            .collect(&base, |query| async move { platform.list_reviews(&query).await })
            .await?;
        debug!(
            entries = entry_ids.len(),
            reviews = reviews.len(),
            "Fetched reviews"
        );
        Ok(reviews)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::InMemoryPlatform;
    use crate::types::{CatalogEntry, ReviewStatistics, ReviewTarget, StoredSummary};

    fn entry(id: &str, count: u64, stored: Option<u64>) -> CatalogEntry {
        CatalogEntry {
            id: id.into(),
            version: 2,
            review_statistics: ReviewStatistics {
                count,
                average_rating: 4.0,
            },
            stored_summary: stored.map(|c| StoredSummary {
                referenced_summary_id: "co".into(),
                total_review_count_at_last_sync: c,
                average_rating_at_last_sync: 4.0,
            }),
        }
    }

    fn review(id: &str, target: &str) -> Review {
        Review {
            id: id.into(),
            title: Some(format!("title {id}")),
            text: Some("text".into()),
            rating: Some(3),
            target: ReviewTarget {
                type_id: "product".into(),
                id: target.into(),
            },
        }
    }

    #[tokio::test]
    async fn test_catalog_fetch_uses_filter_and_expand() {
        let platform = Arc::new(InMemoryPlatform::with_data(
            vec![entry("a", 0, None), entry("b", 3, None), entry("c", 5, Some(5))],
            vec![],
        ));
        let fetcher = CatalogSyncFetcher::new(
            platform.clone(),
            CursorPaginator::new(1).unwrap(),
            ReviewCriteriaFilter::new(0),
        );
        let projections = fetcher.fetch().await.unwrap();
        let ids: Vec<&str> = projections.iter().map(|p| p.id.as_str()).collect();
        // "a" has no reviews; "c" is fresh but the fallback keeps the whole set.
        assert_eq!(ids, vec!["c", "b"]);

        let queries = platform.entry_queries();
        assert_eq!(queries.len(), 2);
        assert!(queries.iter().all(|q| q.expand.as_deref() == Some(SUMMARY_EXPAND)));
        assert!(queries.iter().all(|q| q.filter == Some(RangeFilter::has_reviews())));
    }

    #[tokio::test]
    async fn test_catalog_fetch_empty() {
        let platform = Arc::new(InMemoryPlatform::new());
        let fetcher = CatalogSyncFetcher::new(
            platform,
            CursorPaginator::new(10).unwrap(),
            ReviewCriteriaFilter::new(0),
        );
        assert!(fetcher.fetch().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_review_fetch_scoped_to_ids() {
        let platform = Arc::new(InMemoryPlatform::with_data(
            vec![],
            vec![review("r1", "a"), review("r2", "b"), review("r3", "c"), review("r4", "a")],
        ));
        let paginator = CursorPaginator::new(1).unwrap();
        let fetcher = ReviewFetcher::new(platform.clone(), paginator, "product");
        let reviews = fetcher.fetch(&["a".to_string(), "c".to_string()]).await.unwrap();
        let ids: Vec<&str> = reviews.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["r4", "r3", "r1"]);
    }

    #[tokio::test]
    async fn test_review_fetch_unconstrained_when_no_ids() {
        let platform = Arc::new(InMemoryPlatform::with_data(
            vec![],
            vec![review("r1", "a"), review("r2", "b")],
        ));
        let paginator = CursorPaginator::new(10).unwrap();
        let fetcher = ReviewFetcher::new(platform.clone(), paginator, "product");
        let reviews = fetcher.fetch(&[]).await.unwrap();
        assert_eq!(reviews.len(), 2);
        assert_eq!(
            platform.review_queries()[0]
                .where_clause
                .as_ref()
                .unwrap()
                .to_string(),
            r#"target(typeId="product")"#
        );
    }
}
