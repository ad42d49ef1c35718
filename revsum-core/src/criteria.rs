//! Staleness criteria for stored review summaries.
//!
//! An entry is stale when it has never been summarized, when enough new
//! reviews arrived since the last sync, or when its average rating moved at
//! two-decimal precision. All rating comparisons go through [`to_cents`] so
//! float noise cannot flip the outcome.
//!
//! Rounding is half-up on the value as written, so `1.005` becomes `1.01`.
//! Rounding the binary double directly would give `1.00`; the stored
//! `lastAveragePoint` follows the decimal reading.

use crate::config::CriteriaConfig;
use crate::error::ConfigError;
use crate::types::CatalogEntry;

/// Round half-up to two decimals, returned as integer hundredths.
///
/// The nudge absorbs binary representation error (`1.005 * 100.0` is
/// `100.49999999999999`) so values written with two decimals round as written.
pub fn to_cents(value: f64) -> i64 {
    let scaled = value * 100.0;
    (scaled + scaled.signum() * 1e-9).round() as i64
}

/// Round half-up to two decimal places.
pub fn round_two(value: f64) -> f64 {
    to_cents(value) as f64 / 100.0
}

/// Decides whether an entry's stored summary still reflects its statistics.
#[derive(Debug, Clone, Copy)]
pub struct ReviewCriteriaFilter {
    review_count_difference: u64,
}

impl ReviewCriteriaFilter {
    pub fn new(review_count_difference: u64) -> Self {
        Self {
            review_count_difference,
        }
    }

    /// Build from config, rejecting a negative threshold.
    pub fn from_config(config: &CriteriaConfig) -> Result<Self, ConfigError> {
        let threshold = u64::try_from(config.review_count_difference).map_err(|_| {
            ConfigError::Invalid {
                message: format!(
                    "criteria.review_count_difference must be >= 0 (got {})",
                    config.review_count_difference
                ),
            }
        })?;
        Ok(Self::new(threshold))
    }

    /// Whether the entry needs a new summary.
    pub fn is_stale(&self, entry: &CatalogEntry) -> bool {
        let Some(stored) = &entry.stored_summary else {
            return true;
        };
        let stats = &entry.review_statistics;
        let grew = stats.count
            > stored
                .total_review_count_at_last_sync
                .saturating_add(self.review_count_difference);
        let moved = to_cents(stats.average_rating) != to_cents(stored.average_rating_at_last_sync);
        grew || moved
    }

    /// Apply the filter to a whole candidate set.
    ///
    /// Only entries that already carry a summary are checked first. When none
    /// of those is stale the full input is returned unchanged, never-synced
    /// entries included; otherwise the stale entries are returned in input
    /// order, never-synced ones counting as stale.
    pub fn filter_set(&self, entries: Vec<CatalogEntry>) -> Vec<CatalogEntry> {
        let any_synced_stale = entries
            .iter()
            .any(|e| e.stored_summary.is_some() && self.is_stale(e));
        if !any_synced_stale {
            return entries;
        }
        entries.into_iter().filter(|e| self.is_stale(e)).collect()
    }
}
