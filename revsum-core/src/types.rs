//! Fundamental types for catalog entries, reviews and summary records.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Anything with a stable string identifier the cursor can walk over.
pub trait Identified {
    fn id(&self) -> &str;
}

/// Aggregated review statistics the platform maintains per entry.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewStatistics {
    pub count: u64,
    pub average_rating: f64,
}

/// Snapshot stored alongside the summary the last time the entry was synced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredSummary {
    pub referenced_summary_id: String,
    pub total_review_count_at_last_sync: u64,
    pub average_rating_at_last_sync: f64,
}

/// A catalog entry as returned by the listing endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogEntry {
    pub id: String,
    /// Optimistic-concurrency token; every write against the entry must echo it.
    pub version: u64,
    #[serde(rename = "reviewRatingStatistics")]
    pub review_statistics: ReviewStatistics,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stored_summary: Option<StoredSummary>,
}

impl Identified for CatalogEntry {
    fn id(&self) -> &str {
        &self.id
    }
}

impl CatalogEntry {
    /// The reduced projection carried through the rest of the read path.
    pub fn projection(&self) -> EntryProjection {
        EntryProjection {
            id: self.id.clone(),
            version: self.version,
            review_statistics: self.review_statistics,
        }
    }
}

/// `{id, version, reviewRatingStatistics}` of an entry that needs a new summary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntryProjection {
    pub id: String,
    pub version: u64,
    #[serde(rename = "reviewRatingStatistics")]
    pub review_statistics: ReviewStatistics,
}

/// Reference from a review to the resource it is about.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewTarget {
    pub type_id: String,
    pub id: String,
}

/// A customer review. Read-only from this system's perspective.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Review {
    pub id: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub rating: Option<i32>,
    pub target: ReviewTarget,
}

impl Identified for Review {
    fn id(&self) -> &str {
        &self.id
    }
}

impl Review {
    /// Display-safe shape handed to the summarizer.
    pub fn to_display(&self) -> DisplayReview {
        DisplayReview {
            title: self.title.clone(),
            review: self.text.clone(),
            score: self.rating,
        }
    }
}

/// `{title, review, score}`: the only review fields that leave the system.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DisplayReview {
    pub title: Option<String>,
    pub review: Option<String>,
    pub score: Option<i32>,
}

/// An entry joined with its reviews: the unit of transport and of the write path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntryWithReviews {
    pub id: String,
    pub version: u64,
    #[serde(rename = "reviewRatingStatistics")]
    pub review_statistics: ReviewStatistics,
    pub reviews: Vec<DisplayReview>,
}

/// Locales every summary section must cover.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Locale {
    Tr,
    En,
    Fr,
    De,
    Nl,
}

impl Locale {
    pub const ALL: [Locale; 5] = [Locale::Tr, Locale::En, Locale::Fr, Locale::De, Locale::Nl];

    pub fn code(self) -> &'static str {
        match self {
            Locale::Tr => "tr",
            Locale::En => "en",
            Locale::Fr => "fr",
            Locale::De => "de",
            Locale::Nl => "nl",
        }
    }
}

impl fmt::Display for Locale {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// One text per supported locale.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalizedText {
    pub tr: String,
    pub en: String,
    pub fr: String,
    pub de: String,
    pub nl: String,
}

impl LocalizedText {
    pub fn get(&self, locale: Locale) -> &str {
        match locale {
            Locale::Tr => &self.tr,
            Locale::En => &self.en,
            Locale::Fr => &self.fr,
            Locale::De => &self.de,
            Locale::Nl => &self.nl,
        }
    }
}

/// Structured multi-locale summary produced by the external summarizer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SummaryPayload {
    pub summary: LocalizedText,
    pub common_positive: LocalizedText,
    pub common_negative: LocalizedText,
    pub notable_observation: LocalizedText,
}

/// Count and average computed from the reviews actually summarized.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewTally {
    pub total_review_count: u64,
    pub average_score: f64,
}

/// The value stored in the summary custom object, keyed by entry id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SummaryRecord {
    #[serde(rename = "productId")]
    pub entry_id: String,
    pub is_confirmed: bool,
    #[serde(rename = "summaryOfReview")]
    pub summary: SummaryPayload,
    pub total_review_count: u64,
    pub last_average_point: f64,
}

/// `{container, key, value}` sent to the platform's create-or-update endpoint.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SummaryRecordDraft {
    pub container: String,
    pub key: String,
    pub value: SummaryRecord,
}

/// What the platform returns after persisting a summary record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredRecordRef {
    pub id: String,
    pub version: u64,
    pub key: String,
}

/// Attribute write pointing an entry at its summary record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AttributeLink {
    pub entry_id: String,
    pub entry_version: u64,
    pub attribute_name: String,
    pub reference_type_id: String,
    pub referenced_id: String,
}

/// Successful terminal state of one entry on the write path.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LinkedSummary {
    pub entry_id: String,
    pub record_id: String,
    pub tally: ReviewTally,
}

/// Stages an entry moves through during one sync cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryStage {
    Candidate,
    FilteredIn,
    FilteredOut,
    Summarized,
    RecordUpserted,
    AttributeLinked,
    Failed,
}
