//! Configuration system for the review-summary sync.
//!
//! Uses `figment` for layered configuration: defaults -> user config file ->
//! workspace config file -> explicit file -> environment. Every component
//! receives its section explicitly at construction; nothing reads process
//! environment on its own.

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::ConfigError;

/// Largest page size the platform accepts for listing endpoints.
pub const MAX_PAGE_LIMIT: u32 = 500;

/// Top-level configuration for a sync run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SyncConfig {
    #[serde(default)]
    pub platform: PlatformConfig,
    #[serde(default)]
    pub pagination: PaginationConfig,
    #[serde(default)]
    pub criteria: CriteriaConfig,
    #[serde(default)]
    pub batching: BatchingConfig,
    #[serde(default)]
    pub summarizer: SummarizerConfig,
    #[serde(default)]
    pub write: WriteConfig,
}

/// Connection settings for the commerce platform API.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlatformConfig {
    /// Base URL of the platform HTTP API.
    pub api_url: String,
    /// Base URL of the platform OAuth server.
    pub auth_url: String,
    /// Project key appended to every API path.
    pub project_key: String,
    /// OAuth client id.
    pub client_id: String,
    /// OAuth client secret. Prefer `client_secret_env`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_secret: Option<String>,
    /// Environment variable holding the OAuth client secret.
    pub client_secret_env: String,
    /// Space-separated OAuth scopes; empty requests the client's defaults.
    #[serde(default)]
    pub scopes: String,
    /// Per-request timeout in seconds.
    pub timeout_secs: u64,
}

impl Default for PlatformConfig {
    fn default() -> Self {
        Self {
            api_url: "https://api.europe-west1.gcp.commercetools.com".to_string(),
            auth_url: "https://auth.europe-west1.gcp.commercetools.com".to_string(),
            project_key: String::new(),
            client_id: String::new(),
            client_secret: None,
            client_secret_env: "CTP_CLIENT_SECRET".to_string(),
            scopes: String::new(),
            timeout_secs: 30,
        }
    }
}

impl PlatformConfig {
    /// Resolve the client secret from config or the named environment variable.
    pub fn resolve_client_secret(&self) -> Result<String, ConfigError> {
        self.client_secret
            .clone()
            .or_else(|| std::env::var(&self.client_secret_env).ok())
            .ok_or_else(|| ConfigError::EnvVarMissing {
                var: self.client_secret_env.clone(),
            })
    }
}

/// Cursor pagination settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaginationConfig {
    /// Rows requested per listing call.
    pub page_limit: u32,
}

impl Default for PaginationConfig {
    fn default() -> Self {
        Self {
            page_limit: MAX_PAGE_LIMIT,
        }
    }
}

/// Staleness criteria for stored summaries.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CriteriaConfig {
    /// How many new reviews may accumulate before a summary is considered stale.
    pub review_count_difference: i64,
}

impl Default for CriteriaConfig {
    fn default() -> Self {
        Self {
            review_count_difference: 0,
        }
    }
}

/// Size-bounded batching of the collected dataset.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchingConfig {
    /// Page budget in kilobytes of serialized JSON.
    pub page_budget_kb: f64,
}

impl Default for BatchingConfig {
    fn default() -> Self {
        Self {
            page_budget_kb: 256.0,
        }
    }
}

/// Settings for the OpenAI-compatible summarizer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SummarizerConfig {
    pub model: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    /// Environment variable holding the API key.
    pub api_key_env: String,
    pub temperature: f32,
    pub timeout_secs: u64,
}

impl Default for SummarizerConfig {
    fn default() -> Self {
        Self {
            model: "gpt-4o".to_string(),
            base_url: None,
            api_key: None,
            api_key_env: "OPENAI_API_KEY".to_string(),
            temperature: 1.0,
            timeout_secs: 120,
        }
    }
}

impl SummarizerConfig {
    pub fn resolve_api_key(&self) -> Result<String, ConfigError> {
        self.api_key
            .clone()
            .or_else(|| std::env::var(&self.api_key_env).ok())
            .ok_or_else(|| ConfigError::EnvVarMissing {
                var: self.api_key_env.clone(),
            })
    }
}

/// Write-path settings: where summaries live and how they are linked.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WriteConfig {
    /// Custom-object container holding summary records.
    pub container: String,
    /// Catalog attribute pointing at the summary record.
    pub attribute_name: String,
    /// Reference type id written into the attribute value.
    pub reference_type_id: String,
    /// Type id of catalog entries as seen from reviews.
    pub entry_type_id: String,
    /// Entries processed concurrently on the write path.
    pub concurrency: usize,
}

impl Default for WriteConfig {
    fn default() -> Self {
        Self {
            container: "product-review-summary".to_string(),
            attribute_name: "product-review-summary".to_string(),
            reference_type_id: "key-value-document".to_string(),
            entry_type_id: "product".to_string(),
            concurrency: 4,
        }
    }
}

impl SyncConfig {
    /// Validate value ranges. Returns every problem found, not just the first.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut problems = Vec::new();

        if self.criteria.review_count_difference < 0 {
            problems.push(format!(
                "criteria.review_count_difference must be >= 0 (got {})",
                self.criteria.review_count_difference
            ));
        }
        if self.pagination.page_limit == 0 || self.pagination.page_limit > MAX_PAGE_LIMIT {
            problems.push(format!(
                "pagination.page_limit must be in 1..={} (got {})",
                MAX_PAGE_LIMIT, self.pagination.page_limit
            ));
        }
        if !(self.batching.page_budget_kb.is_finite() && self.batching.page_budget_kb > 0.0) {
            problems.push(format!(
                "batching.page_budget_kb must be a positive number (got {})",
                self.batching.page_budget_kb
            ));
        }
        if self.write.container.trim().is_empty() {
            problems.push("write.container must not be empty".to_string());
        }
        if self.write.attribute_name.trim().is_empty() {
            problems.push("write.attribute_name must not be empty".to_string());
        }
        if self.write.concurrency == 0 {
            problems.push("write.concurrency must be at least 1".to_string());
        }
        if !(0.0..=2.0).contains(&self.summarizer.temperature) {
            problems.push(format!(
                "summarizer.temperature must be within 0.0..=2.0 (got {})",
                self.summarizer.temperature
            ));
        }

        if problems.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Invalid {
                message: problems.join("; "),
            })
        }
    }
}

/// Load configuration from layered sources.
///
/// Priority (highest to lowest):
/// 1. Environment variables (prefixed with `REVSUM_`, nested with `__`)
/// 2. Explicit config file (`--config`)
/// 3. Workspace-local config (`.revsum/config.toml`)
/// 4. User config (`~/.config/revsum/config.toml`)
/// 5. Built-in defaults
pub fn load_config(
    workspace: Option<&Path>,
    explicit: Option<&Path>,
) -> Result<SyncConfig, ConfigError> {
    let mut figment = Figment::from(Serialized::defaults(SyncConfig::default()));

    if let Some(dirs) = directories::ProjectDirs::from("dev", "revsum", "revsum") {
        let user_config = dirs.config_dir().join("config.toml");
        if user_config.exists() {
            figment = figment.merge(Toml::file(&user_config));
        }
    }

    if let Some(ws) = workspace {
        let ws_config = ws.join(".revsum").join("config.toml");
        if ws_config.exists() {
            figment = figment.merge(Toml::file(&ws_config));
        }
    }

    if let Some(path) = explicit {
        if !path.exists() {
            return Err(ConfigError::Load {
                message: format!("config file not found: {}", path.display()),
            });
        }
        figment = figment.merge(Toml::file(path));
    }

    // REVSUM_CRITERIA__REVIEW_COUNT_DIFFERENCE, REVSUM_PLATFORM__PROJECT_KEY, ...
    figment = figment.merge(Env::prefixed("REVSUM_").split("__"));

    figment.extract().map_err(|e| ConfigError::Load {
        message: e.to_string(),
    })
}
