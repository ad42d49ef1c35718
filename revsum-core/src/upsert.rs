//! Write path: store an entry's summary record, then point the entry at it.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::config::WriteConfig;
use crate::error::{EntrySyncError, SyncStep};
use crate::platform::CommercePlatform;
use crate::types::{
    AttributeLink, EntryStage, LinkedSummary, ReviewTally, SummaryPayload, SummaryRecord,
    SummaryRecordDraft,
};

pub struct SummaryUpsertSynchronizer<P: ?Sized> {
    platform: Arc<P>,
    container: String,
    attribute_name: String,
    reference_type_id: String,
}

impl<P: CommercePlatform + ?Sized> SummaryUpsertSynchronizer<P> {
    pub fn new(platform: Arc<P>, config: &WriteConfig) -> Self {
        Self {
            platform,
            container: config.container.clone(),
            attribute_name: config.attribute_name.clone(),
            reference_type_id: config.reference_type_id.clone(),
        }
    }

    /// The keyed record written for `entry_id`. New records start unconfirmed.
    pub fn draft(
        &self,
        entry_id: &str,
        tally: ReviewTally,
        summary: SummaryPayload,
    ) -> SummaryRecordDraft {
        SummaryRecordDraft {
            container: self.container.clone(),
            key: entry_id.to_string(),
            value: SummaryRecord {
                entry_id: entry_id.to_string(),
                is_confirmed: false,
                summary,
                total_review_count: tally.total_review_count,
                last_average_point: tally.average_score,
            },
        }
    }

    /// Upsert the record keyed by `entry_id`, then link it at `entry_version`.
    ///
    /// A failed link leaves the upserted record in place; the entry stays
    /// stale and is picked up again by the next cycle.
    pub async fn sync(
        &self,
        entry_id: &str,
        entry_version: u64,
        tally: ReviewTally,
        summary: SummaryPayload,
    ) -> Result<LinkedSummary, EntrySyncError> {
        let draft = self.draft(entry_id, tally, summary);
        let stored = self
            .platform
            .upsert_summary_record(&draft)
            .await
            .map_err(|e| EntrySyncError::new(entry_id, SyncStep::UpsertRecord, e))?;
        debug!(
            entry_id,
            stage = ?EntryStage::RecordUpserted,
            record_id = %stored.id,
            record_version = stored.version,
            "Upserted summary record"
        );

        let link = AttributeLink {
            entry_id: entry_id.to_string(),
            entry_version,
            attribute_name: self.attribute_name.clone(),
            reference_type_id: self.reference_type_id.clone(),
            referenced_id: stored.id.clone(),
        };
        if let Err(e) = self.platform.link_summary_attribute(&link).await {
            warn!(
                entry_id,
                entry_version,
                record_id = %stored.id,
                error = %e,
                "Summary record written but attribute link failed"
            );
            return Err(EntrySyncError::new(entry_id, SyncStep::LinkAttribute, e));
        }

        Ok(LinkedSummary {
            entry_id: entry_id.to_string(),
            record_id: stored.id,
            tally,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{PlatformError, RevsumError};
    use crate::platform::InMemoryPlatform;
    use crate::summarizer::MockSummarizer;
    use crate::types::{CatalogEntry, ReviewStatistics};

    fn platform_with(id: &str, version: u64) -> Arc<InMemoryPlatform> {
        let platform = InMemoryPlatform::new();
        platform.insert_entry(CatalogEntry {
            id: id.into(),
            version,
            review_statistics: ReviewStatistics {
                count: 3,
                average_rating: 4.0,
            },
            stored_summary: None,
        });
        Arc::new(platform)
    }

    fn payload() -> SummaryPayload {
        SummaryPayload::parse(&MockSummarizer::sample_payload()).unwrap()
    }

    fn tally() -> ReviewTally {
        ReviewTally {
            total_review_count: 3,
            average_score: 4.33,
        }
    }

    #[test]
    fn test_draft_is_keyed_by_entry() {
        let sync = SummaryUpsertSynchronizer::new(platform_with("p-1", 1), &WriteConfig::default());
        let draft = sync.draft("p-1", tally(), payload());
        assert_eq!(draft.container, "product-review-summary");
        assert_eq!(draft.key, "p-1");
        assert_eq!(draft.value.entry_id, "p-1");
        assert!(!draft.value.is_confirmed);
        assert_eq!(draft.value.total_review_count, 3);
        assert_eq!(draft.value.last_average_point, 4.33);
    }

    #[tokio::test]
    async fn test_sync_upserts_and_links() {
        let platform = platform_with("p-1", 7);
        let sync = SummaryUpsertSynchronizer::new(platform.clone(), &WriteConfig::default());

        let linked = sync.sync("p-1", 7, tally(), payload()).await.unwrap();
        assert_eq!(linked.entry_id, "p-1");

        let entry = platform.entry("p-1").unwrap();
        let stored = entry.stored_summary.unwrap();
        assert_eq!(stored.referenced_summary_id, linked.record_id);
        assert_eq!(stored.total_review_count_at_last_sync, 3);
        assert_eq!(stored.average_rating_at_last_sync, 4.33);
    }

    #[tokio::test]
    async fn test_sync_twice_keeps_one_record() {
        let platform = platform_with("p-1", 1);
        let sync = SummaryUpsertSynchronizer::new(platform.clone(), &WriteConfig::default());

        let first = sync.sync("p-1", 1, tally(), payload()).await.unwrap();
        let second = sync.sync("p-1", 2, tally(), payload()).await.unwrap();
        assert_eq!(first.record_id, second.record_id);
        assert_eq!(platform.record_count(), 1);
    }

    #[tokio::test]
    async fn test_version_conflict_leaves_record() {
        let platform = platform_with("p-1", 5);
        let sync = SummaryUpsertSynchronizer::new(platform.clone(), &WriteConfig::default());

        let err = sync.sync("p-1", 4, tally(), payload()).await.unwrap_err();
        assert_eq!(err.step, SyncStep::LinkAttribute);
        assert!(err.is_version_conflict());
        assert!(matches!(
            err.source,
            RevsumError::Platform(PlatformError::VersionConflict { version: 4, .. })
        ));

        assert!(platform.record("product-review-summary", "p-1").is_some());
        assert!(platform.entry("p-1").unwrap().stored_summary.is_none());
    }
}
