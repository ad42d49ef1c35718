//! Descending-id cursor pagination over any listing endpoint.
//!
//! Each call is sorted `id desc` first, and every follow-up call narrows the
//! caller's predicate to `id < "<last seen id>"`. The walk ends when a
//! response reports `total == count`, i.e. the page held everything that
//! still matched. Pages are fetched strictly one after another because the
//! cursor for page N+1 is the last id of page N.

use std::future::Future;

use tracing::debug;

use crate::config::{MAX_PAGE_LIMIT, PaginationConfig};
use crate::error::{ConfigError, PlatformError};
use crate::query::{ID_DESC, ListingQuery, PagedResponse, Predicate};
use crate::types::Identified;

/// Walks a listing endpoint to exhaustion, accumulating every row in order.
#[derive(Debug, Clone, Copy)]
pub struct CursorPaginator {
    limit: u32,
}

impl CursorPaginator {
    /// `limit` must be within `1..=MAX_PAGE_LIMIT`.
    pub fn new(limit: u32) -> Result<Self, ConfigError> {
        if limit == 0 || limit > MAX_PAGE_LIMIT {
            return Err(ConfigError::Invalid {
                message: format!(
                    "pagination.page_limit must be in 1..={MAX_PAGE_LIMIT} (got {limit})"
                ),
            });
        }
        Ok(Self { limit })
    }

    pub fn from_config(config: &PaginationConfig) -> Result<Self, ConfigError> {
        Self::new(config.page_limit)
    }

    pub fn limit(&self) -> u32 {
        self.limit
    }

    /// Fetch every row matching `base`.
    ///
    /// `base.limit` is replaced by the paginator's limit and `id desc` is
    /// prepended to `base.sort`. Any error from `fetch` aborts the walk; no
    /// partial result is returned.
    pub async fn collect<T, F, Fut>(
        &self,
        base: &ListingQuery,
        mut fetch: F,
    ) -> Result<Vec<T>, PlatformError>
    where
        T: Identified,
        F: FnMut(ListingQuery) -> Fut,
        Fut: Future<Output = Result<PagedResponse<T>, PlatformError>>,
    {
        let mut sort = vec![ID_DESC.to_string()];
        sort.extend(base.sort.iter().filter(|s| s.as_str() != ID_DESC).cloned());

        let mut results: Vec<T> = Vec::new();
        let mut cursor: Option<String> = None;
        let mut page = 0usize;

        loop {
            let where_clause = match &cursor {
                Some(last_id) => Some(Predicate::cursor(last_id, base.where_clause.as_ref())),
                None => base.where_clause.clone(),
            };
            let query = ListingQuery {
                sort: sort.clone(),
                limit: self.limit,
                where_clause,
                filter: base.filter.clone(),
                expand: base.expand.clone(),
            };

            let response = fetch(query).await?;
            page += 1;
            debug!(
                page,
                count = response.count,
                total = response.total,
                accumulated = results.len(),
                "Fetched listing page"
            );

            let exhausted = response.total == response.count;
            if !exhausted && response.results.is_empty() {
                return Err(PlatformError::StalledPagination {
                    remaining: response.total,
                });
            }
            if let Some(last) = response.results.last() {
                cursor = Some(last.id().to_string());
            }
            results.extend(response.results);

            if exhausted {
                break;
            }
        }

        Ok(results)
    }
}
