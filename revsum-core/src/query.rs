//! Listing queries and the predicate grammar understood by the platform.
//!
//! Predicates are built as a small typed tree and rendered to the platform's
//! string grammar only at the HTTP boundary, so in-memory backends can
//! evaluate them without parsing.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Sort key the cursor relies on; always the first sort key sent.
pub const ID_DESC: &str = "id desc";

/// A boolean predicate over listed resources.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Predicate {
    /// `id < "<value>"`, the pagination cursor.
    IdBefore(String),
    /// `<left> and (<right>)`.
    And(Box<Predicate>, Box<Predicate>),
    /// Reviews targeting resources of `type_id`, optionally restricted to `ids`.
    ReviewTarget {
        type_id: String,
        ids: Option<Vec<String>>,
    },
    /// Passed through verbatim.
    Raw(String),
}

impl Predicate {
    pub fn and(self, other: Predicate) -> Predicate {
        Predicate::And(Box::new(self), Box::new(other))
    }

    /// Narrow `base` to rows strictly before `last_id` in descending-id order.
    pub fn cursor(last_id: &str, base: Option<&Predicate>) -> Predicate {
        let cursor = Predicate::IdBefore(last_id.to_string());
        match base {
            Some(base) => cursor.and(base.clone()),
            None => cursor,
        }
    }
}

impl fmt::Display for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Predicate::IdBefore(id) => write!(f, "id < {}", quote(id)),
            Predicate::And(left, right) => write!(f, "{} and ({})", left, right),
            Predicate::ReviewTarget { type_id, ids: None } => {
                write!(f, "target(typeId={})", quote(type_id))
            }
            Predicate::ReviewTarget {
                type_id,
                ids: Some(ids),
            } => {
                let list = ids.iter().map(|id| quote(id)).collect::<Vec<_>>().join(", ");
                write!(f, "target(typeId={} and id in ({}))", quote(type_id), list)
            }
            Predicate::Raw(raw) => f.write_str(raw),
        }
    }
}

fn quote(value: &str) -> String {
    format!("\"{}\"", value.replace('\\', "\\\\").replace('"', "\\\""))
}

/// One side of a range filter; `None` renders as `*` (unbounded).
pub type RangeBound = Option<i64>;

/// `<path>: range(<low> to <high>)` search filter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RangeFilter {
    pub path: String,
    pub low: RangeBound,
    pub high: RangeBound,
}

impl RangeFilter {
    /// Entries with at least one review.
    pub fn has_reviews() -> Self {
        Self {
            path: "reviewRatingStatistics.count".to_string(),
            low: Some(1),
            high: None,
        }
    }

    pub fn contains(&self, value: i64) -> bool {
        self.low.is_none_or(|low| value >= low) && self.high.is_none_or(|high| value <= high)
    }
}

impl fmt::Display for RangeFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let bound = |b: RangeBound| b.map_or_else(|| "*".to_string(), |v| v.to_string());
        write!(
            f,
            "{}: range({} to {})",
            self.path,
            bound(self.low),
            bound(self.high)
        )
    }
}

/// Arguments of one listing call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListingQuery {
    pub sort: Vec<String>,
    pub limit: u32,
    pub where_clause: Option<Predicate>,
    pub filter: Option<RangeFilter>,
    pub expand: Option<String>,
}

impl ListingQuery {
    pub fn new(limit: u32) -> Self {
        Self {
            limit,
            ..Default::default()
        }
    }

    pub fn with_where(mut self, predicate: Predicate) -> Self {
        self.where_clause = Some(predicate);
        self
    }

    pub fn with_filter(mut self, filter: RangeFilter) -> Self {
        self.filter = Some(filter);
        self
    }

    pub fn with_expand(mut self, expand: impl Into<String>) -> Self {
        self.expand = Some(expand.into());
        self
    }

    /// Flatten into `(name, value)` pairs for a query string.
    pub fn to_query_pairs(&self) -> Vec<(&'static str, String)> {
        let mut pairs: Vec<(&'static str, String)> =
            self.sort.iter().map(|s| ("sort", s.clone())).collect();
        pairs.push(("limit", self.limit.to_string()));
        if let Some(predicate) = &self.where_clause {
            pairs.push(("where", predicate.to_string()));
        }
        if let Some(filter) = &self.filter {
            pairs.push(("filter", filter.to_string()));
        }
        if let Some(expand) = &self.expand {
            pairs.push(("expand", expand.clone()));
        }
        pairs
    }
}

/// One page of a listing response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PagedResponse<T> {
    #[serde(default)]
    pub offset: u64,
    pub count: u64,
    pub total: u64,
    pub results: Vec<T>,
}
