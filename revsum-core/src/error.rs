//! Error types for the review-summary sync core.
//!
//! Uses `thiserror` for public API error types with structured variants
//! covering the commerce platform, the summarizer, and configuration.
//! Per-entry write failures carry the entry identifier and the failing step.

use std::fmt;

/// Top-level error type for the sync core.
#[derive(Debug, thiserror::Error)]
pub enum RevsumError {
    #[error("Platform error: {0}")]
    Platform(#[from] PlatformError),

    #[error("Summary error: {0}")]
    Summary(#[from] SummaryError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid entry: {message}")]
    InvalidEntry { message: String },
}

/// Errors from the commerce platform (listing, upsert and attribute writes).
#[derive(Debug, thiserror::Error)]
pub enum PlatformError {
    #[error("Request failed: {message}")]
    Transport { message: String },

    #[error("HTTP {status}: {body}")]
    Http { status: u16, body: String },

    #[error("Response decode error: {message}")]
    Decode { message: String },

    #[error("Authentication failed: {message}")]
    Auth { message: String },

    #[error("Version conflict on entry {entry_id}: version {version} is stale")]
    VersionConflict { entry_id: String, version: u64 },

    #[error("Pagination stalled: page returned no rows while {remaining} remain")]
    StalledPagination { remaining: u64 },
}

/// Errors from the external summarizer and from validating its output.
#[derive(Debug, thiserror::Error)]
pub enum SummaryError {
    #[error("Summarizer request failed: {message}")]
    Request { message: String },

    #[error("Summarizer returned no content")]
    EmptyResponse,

    #[error("Summarizer output is not valid JSON: {message}")]
    InvalidJson { message: String },

    #[error("Malformed summary: missing or non-text field '{field}'")]
    Malformed { field: String },
}

/// Errors from the configuration system.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid configuration: {message}")]
    Invalid { message: String },

    #[error("Environment variable not set: {var}")]
    EnvVarMissing { var: String },

    #[error("Configuration load error: {message}")]
    Load { message: String },
}

/// The write-path step an entry was in when it failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncStep {
    Validate,
    Summarize,
    ParseSummary,
    UpsertRecord,
    LinkAttribute,
}

impl fmt::Display for SyncStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SyncStep::Validate => "validate",
            SyncStep::Summarize => "summarize",
            SyncStep::ParseSummary => "parse-summary",
            SyncStep::UpsertRecord => "upsert-record",
            SyncStep::LinkAttribute => "link-attribute",
        };
        f.write_str(name)
    }
}

/// A failure isolated to one catalog entry on the write path.
#[derive(Debug, thiserror::Error)]
#[error("entry {entry_id} failed at {step}: {source}")]
pub struct EntrySyncError {
    pub entry_id: String,
    pub step: SyncStep,
    #[source]
    pub source: RevsumError,
}

impl EntrySyncError {
    pub fn new(
        entry_id: impl Into<String>,
        step: SyncStep,
        source: impl Into<RevsumError>,
    ) -> Self {
        Self {
            entry_id: entry_id.into(),
            step,
            source: source.into(),
        }
    }

    /// Whether the entry failed on the version precondition of the link write.
    pub fn is_version_conflict(&self) -> bool {
        matches!(
            self.source,
            RevsumError::Platform(PlatformError::VersionConflict { .. })
        )
    }
}

/// A type alias for results using the top-level `RevsumError`.
pub type Result<T> = std::result::Result<T, RevsumError>;
