//! In-memory commerce platform.
//!
//! Thread-safe via `Mutex`. Evaluates the typed predicate tree directly,
//! serves rows in descending-id order and enforces entry version
//! preconditions, so pipeline behavior can be exercised without a network.

use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;

use async_trait::async_trait;

use super::CommercePlatform;
use crate::error::PlatformError;
use crate::query::{ListingQuery, PagedResponse, Predicate, RangeFilter};
use crate::types::{
    AttributeLink, CatalogEntry, Identified, Review, ReviewStatistics, StoredRecordRef,
    StoredSummary, SummaryRecord, SummaryRecordDraft,
};

#[derive(Debug, Clone)]
struct StoredObject {
    id: String,
    version: u64,
    value: SummaryRecord,
}

#[derive(Debug, Default)]
struct State {
    entries: BTreeMap<String, CatalogEntry>,
    reviews: Vec<Review>,
    records: HashMap<(String, String), StoredObject>,
    next_record: u64,
    entry_queries: Vec<ListingQuery>,
    review_queries: Vec<ListingQuery>,
    listing_failure: Option<String>,
}

/// In-memory platform for tests and dry runs.
#[derive(Debug, Default)]
pub struct InMemoryPlatform {
    state: Mutex<State>,
}

impl InMemoryPlatform {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_data(entries: Vec<CatalogEntry>, reviews: Vec<Review>) -> Self {
        let platform = Self::new();
        {
            let mut state = platform.state.lock().unwrap();
            state.entries = entries.into_iter().map(|e| (e.id.clone(), e)).collect();
            state.reviews = reviews;
        }
        platform
    }

    pub fn insert_entry(&self, entry: CatalogEntry) {
        let mut state = self.state.lock().unwrap();
        state.entries.insert(entry.id.clone(), entry);
    }

    pub fn insert_review(&self, review: Review) {
        self.state.lock().unwrap().reviews.push(review);
    }

    /// Overwrite an entry's statistics, as the platform does when reviews change.
    pub fn set_statistics(&self, entry_id: &str, statistics: ReviewStatistics) {
        let mut state = self.state.lock().unwrap();
        if let Some(entry) = state.entries.get_mut(entry_id) {
            entry.review_statistics = statistics;
            entry.version += 1;
        }
    }

    /// Make every following listing call fail with a transport error.
    pub fn fail_listings(&self, message: impl Into<String>) {
        self.state.lock().unwrap().listing_failure = Some(message.into());
    }

    pub fn entry(&self, entry_id: &str) -> Option<CatalogEntry> {
        self.state.lock().unwrap().entries.get(entry_id).cloned()
    }

    /// The stored record under `{container, key}` with its id and version.
    pub fn record(&self, container: &str, key: &str) -> Option<(StoredRecordRef, SummaryRecord)> {
        let state = self.state.lock().unwrap();
        state
            .records
            .get(&(container.to_string(), key.to_string()))
            .map(|obj| {
                (
                    StoredRecordRef {
                        id: obj.id.clone(),
                        version: obj.version,
                        key: key.to_string(),
                    },
                    obj.value.clone(),
                )
            })
    }

    pub fn record_count(&self) -> usize {
        self.state.lock().unwrap().records.len()
    }

    /// Catalog listing queries issued so far, in order.
    pub fn entry_queries(&self) -> Vec<ListingQuery> {
        self.state.lock().unwrap().entry_queries.clone()
    }

    /// Review listing queries issued so far, in order.
    pub fn review_queries(&self) -> Vec<ListingQuery> {
        self.state.lock().unwrap().review_queries.clone()
    }
}

fn matches(predicate: &Predicate, id: &str, review: Option<&Review>) -> bool {
    match predicate {
        Predicate::IdBefore(cursor) => id < cursor.as_str(),
        Predicate::And(left, right) => matches(left, id, review) && matches(right, id, review),
        Predicate::ReviewTarget { type_id, ids } => review.is_some_and(|r| {
            r.target.type_id == *type_id
                && ids
                    .as_ref()
                    .is_none_or(|ids| ids.iter().any(|t| *t == r.target.id))
        }),
        // Free-form clauses are not interpreted in memory.
        Predicate::Raw(_) => true,
    }
}

fn passes_filter(filter: &RangeFilter, entry: &CatalogEntry) -> bool {
    match filter.path.as_str() {
        "reviewRatingStatistics.count" => filter.contains(entry.review_statistics.count as i64),
        _ => true,
    }
}

fn page<T: Identified + Clone>(mut rows: Vec<T>, limit: u32) -> PagedResponse<T> {
    rows.sort_by(|a, b| b.id().cmp(a.id()));
    let total = rows.len() as u64;
    rows.truncate(limit as usize);
    PagedResponse {
        offset: 0,
        count: rows.len() as u64,
        total,
        results: rows,
    }
}

#[async_trait]
impl CommercePlatform for InMemoryPlatform {
    async fn list_catalog_entries(
        &self,
        query: &ListingQuery,
    ) -> Result<PagedResponse<CatalogEntry>, PlatformError> {
        let mut state = self.state.lock().unwrap();
        state.entry_queries.push(query.clone());
        if let Some(message) = &state.listing_failure {
            return Err(PlatformError::Transport {
                message: message.clone(),
            });
        }
        let rows: Vec<CatalogEntry> = state
            .entries
            .values()
            .filter(|e| query.filter.as_ref().is_none_or(|f| passes_filter(f, e)))
            .filter(|e| {
                query
                    .where_clause
                    .as_ref()
                    .is_none_or(|p| matches(p, &e.id, None))
            })
            .cloned()
            .collect();
        Ok(page(rows, query.limit))
    }

    async fn list_reviews(
        &self,
        query: &ListingQuery,
    ) -> Result<PagedResponse<Review>, PlatformError> {
        let mut state = self.state.lock().unwrap();
        state.review_queries.push(query.clone());
        if let Some(message) = &state.listing_failure {
            return Err(PlatformError::Transport {
                message: message.clone(),
            });
        }
        let rows: Vec<Review> = state
            .reviews
            .iter()
            .filter(|r| {
                query
                    .where_clause
                    .as_ref()
                    .is_none_or(|p| matches(p, &r.id, Some(r)))
            })
            .cloned()
            .collect();
        Ok(page(rows, query.limit))
    }

    async fn upsert_summary_record(
        &self,
        draft: &SummaryRecordDraft,
    ) -> Result<StoredRecordRef, PlatformError> {
        let mut state = self.state.lock().unwrap();
        let slot = (draft.container.clone(), draft.key.clone());
        let stored = match state.records.get(&slot).cloned() {
            Some(existing) => StoredObject {
                id: existing.id,
                version: existing.version + 1,
                value: draft.value.clone(),
            },
            None => {
                state.next_record += 1;
                StoredObject {
                    id: format!("summary-{}", state.next_record),
                    version: 1,
                    value: draft.value.clone(),
                }
            }
        };
        let reference = StoredRecordRef {
            id: stored.id.clone(),
            version: stored.version,
            key: draft.key.clone(),
        };
        state.records.insert(slot, stored);
        Ok(reference)
    }

    async fn link_summary_attribute(&self, link: &AttributeLink) -> Result<(), PlatformError> {
        let mut state = self.state.lock().unwrap();
        let record = state
            .records
            .values()
            .find(|obj| obj.id == link.referenced_id)
            .map(|obj| obj.value.clone())
            .ok_or_else(|| PlatformError::Http {
                status: 400,
                body: format!("referenced record {} does not exist", link.referenced_id),
            })?;
        let entry = state
            .entries
            .get_mut(&link.entry_id)
            .ok_or_else(|| PlatformError::Http {
                status: 404,
                body: format!("entry {} not found", link.entry_id),
            })?;
        if entry.version != link.entry_version {
            return Err(PlatformError::VersionConflict {
                entry_id: link.entry_id.clone(),
                version: link.entry_version,
            });
        }
        entry.stored_summary = Some(StoredSummary {
            referenced_summary_id: link.referenced_id.clone(),
            total_review_count_at_last_sync: record.total_review_count,
            average_rating_at_last_sync: record.last_average_point,
        });
        entry.version += 1;
        Ok(())
    }
}
