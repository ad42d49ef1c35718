//! Packs items into pages whose serialized size stays under a byte budget.
//!
//! Sizes are measured on compact JSON: a page of `n` items costs the two
//! brackets, the items, and `n - 1` separating commas.

use serde::Serialize;

use crate::config::BatchingConfig;
use crate::error::ConfigError;

const BYTES_PER_KB: f64 = 1024.0;

/// Size of `value` as compact JSON, in kilobytes.
pub fn estimate_size_kb<T: Serialize + ?Sized>(value: &T) -> Result<f64, serde_json::Error> {
    Ok(serde_json::to_vec(value)?.len() as f64 / BYTES_PER_KB)
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SizeBoundedBatcher {
    budget_kb: f64,
}

impl SizeBoundedBatcher {
    /// The budget must be a finite, positive number of kilobytes.
    pub fn new(budget_kb: f64) -> Result<Self, ConfigError> {
        if !(budget_kb.is_finite() && budget_kb > 0.0) {
            return Err(ConfigError::Invalid {
                message: format!(
                    "batching.page_budget_kb must be a positive number (got {budget_kb})"
                ),
            });
        }
        Ok(Self { budget_kb })
    }

    pub fn from_config(config: &BatchingConfig) -> Result<Self, ConfigError> {
        Self::new(config.page_budget_kb)
    }

    pub fn budget_kb(&self) -> f64 {
        self.budget_kb
    }

    /// Whether the whole collection, serialized as one array, exceeds the budget.
    pub fn exceeds_budget<T: Serialize>(&self, items: &[T]) -> Result<bool, serde_json::Error> {
        Ok(estimate_size_kb(items)? > self.budget_kb)
    }

    /// Split `items` into consecutive pages, preserving order.
    ///
    /// Each page holds at least one item. An item that alone exceeds the
    /// budget gets a page of its own.
    pub fn pack<T: Serialize>(&self, items: Vec<T>) -> Result<Vec<Vec<T>>, serde_json::Error> {
        let budget_bytes = self.budget_kb * BYTES_PER_KB;
        let mut pages = Vec::new();
        let mut page: Vec<T> = Vec::new();
        let mut page_bytes = 0usize;

        for item in items {
            let item_bytes = serde_json::to_vec(&item)?.len();
            if !page.is_empty() {
                let grown = page_bytes + 1 + item_bytes;
                if grown as f64 > budget_bytes {
                    pages.push(std::mem::take(&mut page));
                    page_bytes = 2 + item_bytes;
                } else {
                    page_bytes = grown;
                }
            } else {
                page_bytes = 2 + item_bytes;
            }
            page.push(item);
        }

        if !page.is_empty() {
            pages.push(page);
        }
        Ok(pages)
    }
}
