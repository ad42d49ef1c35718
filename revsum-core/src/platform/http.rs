//! REST implementation of the commerce platform.
//!
//! Authenticates with the OAuth2 client-credentials grant, caches the token
//! until shortly before expiry, and decodes wire records into the structured
//! types at this boundary.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use super::CommercePlatform;
use crate::config::{PlatformConfig, WriteConfig};
use crate::error::{ConfigError, PlatformError};
use crate::query::{ListingQuery, PagedResponse};
use crate::types::{
    AttributeLink, CatalogEntry, Review, ReviewStatistics, StoredRecordRef, StoredSummary,
    SummaryRecordDraft,
};

/// Tokens are refreshed this long before the server says they expire.
const TOKEN_EXPIRY_MARGIN_SECS: i64 = 60;

#[derive(Debug, Clone)]
struct AccessToken {
    value: String,
    expires_at: DateTime<Utc>,
}

impl AccessToken {
    fn is_fresh(&self, now: DateTime<Utc>) -> bool {
        now + chrono::Duration::seconds(TOKEN_EXPIRY_MARGIN_SECS) < self.expires_at
    }
}

/// Platform client over the REST API.
pub struct HttpPlatform {
    client: Client,
    api_url: String,
    auth_url: String,
    project_key: String,
    client_id: String,
    client_secret: String,
    scopes: String,
    attribute_name: String,
    token: Mutex<Option<AccessToken>>,
}

impl HttpPlatform {
    pub fn new(platform: &PlatformConfig, write: &WriteConfig) -> Result<Self, ConfigError> {
        if platform.project_key.is_empty() {
            return Err(ConfigError::Invalid {
                message: "platform.project_key is required".to_string(),
            });
        }
        let client_secret = platform.resolve_client_secret()?;
        let client = Client::builder()
            .timeout(Duration::from_secs(platform.timeout_secs))
            .build()
            .map_err(|e| ConfigError::Invalid {
                message: format!("HTTP client: {}", e),
            })?;

        Ok(Self {
            client,
            api_url: platform.api_url.trim_end_matches('/').to_string(),
            auth_url: platform.auth_url.trim_end_matches('/').to_string(),
            project_key: platform.project_key.clone(),
            client_id: platform.client_id.clone(),
            client_secret,
            scopes: platform.scopes.clone(),
            attribute_name: write.attribute_name.clone(),
            token: Mutex::new(None),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}/{}", self.api_url, self.project_key, path)
    }

    async fn bearer(&self) -> Result<String, PlatformError> {
        let mut cached = self.token.lock().await;
        if let Some(token) = cached.as_ref()
            && token.is_fresh(Utc::now())
        {
            return Ok(token.value.clone());
        }

        debug!(auth_url = %self.auth_url, "Requesting platform access token");
        let mut params = vec![("grant_type", "client_credentials")];
        if !self.scopes.is_empty() {
            params.push(("scope", self.scopes.as_str()));
        }
        let response = self
            .client
            .post(format!("{}/oauth/token", self.auth_url))
            .basic_auth(&self.client_id, Some(&self.client_secret))
            .form(&params)
            .send()
            .await
            .map_err(|e| PlatformError::Auth {
                message: format!("Token request failed: {}", e),
            })?;

        let status = response.status();
        let body = response.text().await.map_err(|e| PlatformError::Auth {
            message: format!("Failed to read token response: {}", e),
        })?;
        if !status.is_success() {
            return Err(PlatformError::Auth {
                message: format!("Token request rejected (HTTP {}): {}", status, body),
            });
        }

        let token = parse_token_response(&body, Utc::now())?;
        let value = token.value.clone();
        *cached = Some(token);
        Ok(value)
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &ListingQuery,
    ) -> Result<T, PlatformError> {
        let token = self.bearer().await?;
        let url = self.url(path);
        debug!(url = %url, limit = query.limit, "Listing request");
        let response = self
            .client
            .get(&url)
            .bearer_auth(token)
            .query(&query.to_query_pairs())
            .send()
            .await
            .map_err(|e| PlatformError::Transport {
                message: format!("GET {} failed: {}", path, e),
            })?;
        Self::read_json(response).await
    }

    async fn post_json<T: DeserializeOwned>(
        &self,
        path: &str,
        body: &Value,
    ) -> Result<T, PlatformError> {
        let token = self.bearer().await?;
        let response = self
            .client
            .post(self.url(path))
            .bearer_auth(token)
            .json(body)
            .send()
            .await
            .map_err(|e| PlatformError::Transport {
                message: format!("POST {} failed: {}", path, e),
            })?;
        Self::read_json(response).await
    }

    async fn read_json<T: DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, PlatformError> {
        let status = response.status();
        let body = response.text().await.map_err(|e| PlatformError::Transport {
            message: format!("Failed to read response body: {}", e),
        })?;
        if !status.is_success() {
            return Err(map_http_error(status, &body));
        }
        serde_json::from_str(&body).map_err(|e| PlatformError::Decode {
            message: format!("Invalid response JSON: {}", e),
        })
    }
}

fn map_http_error(status: StatusCode, body: &str) -> PlatformError {
    match status.as_u16() {
        401 | 403 => PlatformError::Auth {
            message: format!("HTTP {}: {}", status, body),
        },
        code => PlatformError::Http {
            status: code,
            body: body.to_string(),
        },
    }
}

/// A 409 on an attribute write means the entry moved past `version`.
fn map_link_error(entry_id: &str, version: u64, error: PlatformError) -> PlatformError {
    match error {
        PlatformError::Http { status: 409, body } => {
            warn!(entry_id, version, "Entry version conflict");
            debug!(body = %body, "Conflict response");
            PlatformError::VersionConflict {
                entry_id: entry_id.to_string(),
                version,
            }
        }
        other => other,
    }
}

fn parse_token_response(body: &str, now: DateTime<Utc>) -> Result<AccessToken, PlatformError> {
    let json: Value = serde_json::from_str(body).map_err(|e| PlatformError::Auth {
        message: format!("Invalid JSON in token response: {}", e),
    })?;
    let value = json["access_token"]
        .as_str()
        .ok_or_else(|| PlatformError::Auth {
            message: "Token response missing 'access_token'".to_string(),
        })?
        .to_string();
    let expires_in = json["expires_in"].as_i64().unwrap_or(3600);
    Ok(AccessToken {
        value,
        expires_at: now + chrono::Duration::seconds(expires_in),
    })
}

// ── Wire records ────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireProjection {
    id: String,
    version: u64,
    #[serde(default)]
    review_rating_statistics: Option<WireStatistics>,
    #[serde(default)]
    master_variant: Option<WireVariant>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireStatistics {
    #[serde(default)]
    average_rating: f64,
    #[serde(default)]
    count: u64,
}

#[derive(Debug, Default, Deserialize)]
struct WireVariant {
    #[serde(default)]
    attributes: Vec<WireAttribute>,
}

#[derive(Debug, Deserialize)]
struct WireAttribute {
    name: String,
    value: Value,
}

/// Decode a projection, reading the stored summary from the expanded reference.
fn decode_entry(
    wire: WireProjection,
    attribute_name: &str,
) -> Result<CatalogEntry, PlatformError> {
    let review_statistics = wire
        .review_rating_statistics
        .map(|s| ReviewStatistics {
            count: s.count,
            average_rating: s.average_rating,
        })
        .unwrap_or_default();

    let stored_summary = match wire
        .master_variant
        .unwrap_or_default()
        .attributes
        .into_iter()
        .find(|a| a.name == attribute_name)
    {
        Some(attribute) => Some(decode_stored_summary(&wire.id, &attribute.value)?),
        None => None,
    };

    Ok(CatalogEntry {
        id: wire.id,
        version: wire.version,
        review_statistics,
        stored_summary,
    })
}

fn decode_stored_summary(entry_id: &str, value: &Value) -> Result<StoredSummary, PlatformError> {
    let missing = |what: &str| PlatformError::Decode {
        message: format!("entry {}: summary attribute has no {}", entry_id, what),
    };
    let referenced_summary_id = value["id"].as_str().ok_or_else(|| missing("reference id"))?;
    // Present only when the listing expanded the reference.
    let record = value
        .get("obj")
        .and_then(|obj| obj.get("value"))
        .ok_or_else(|| missing("expanded record"))?;
    let total = record["totalReviewCount"]
        .as_u64()
        .ok_or_else(|| missing("totalReviewCount"))?;
    let average = record["lastAveragePoint"]
        .as_f64()
        .ok_or_else(|| missing("lastAveragePoint"))?;

    Ok(StoredSummary {
        referenced_summary_id: referenced_summary_id.to_string(),
        total_review_count_at_last_sync: total,
        average_rating_at_last_sync: average,
    })
}

#[async_trait]
impl CommercePlatform for HttpPlatform {
    async fn list_catalog_entries(
        &self,
        query: &ListingQuery,
    ) -> Result<PagedResponse<CatalogEntry>, PlatformError> {
        let page: PagedResponse<WireProjection> =
            self.get_json("product-projections/search", query).await?;
        let results = page
            .results
            .into_iter()
            .map(|wire| decode_entry(wire, &self.attribute_name))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(PagedResponse {
            offset: page.offset,
            count: page.count,
            total: page.total,
            results,
        })
    }

    async fn list_reviews(
        &self,
        query: &ListingQuery,
    ) -> Result<PagedResponse<Review>, PlatformError> {
        self.get_json("reviews", query).await
    }

    async fn upsert_summary_record(
        &self,
        draft: &SummaryRecordDraft,
    ) -> Result<StoredRecordRef, PlatformError> {
        let body = serde_json::to_value(draft).map_err(|e| PlatformError::Decode {
            message: format!("Cannot encode summary record: {}", e),
        })?;
        self.post_json("custom-objects", &body).await
    }

    async fn link_summary_attribute(&self, link: &AttributeLink) -> Result<(), PlatformError> {
        let body = json!({
            "version": link.entry_version,
            "actions": [{
                "action": "setAttributeInAllVariants",
                "name": link.attribute_name,
                "value": {
                    "typeId": link.reference_type_id,
                    "id": link.referenced_id,
                }
            }]
        });
        let path = format!("products/{}", link.entry_id);
        self.post_json::<Value>(&path, &body)
            .await
            .map(|_| ())
            .map_err(|e| map_link_error(&link.entry_id, link.entry_version, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wire(value: Value) -> WireProjection {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_decode_entry_without_summary() {
        let entry = decode_entry(
            wire(json!({
                "id": "p-1",
                "version": 3,
                "reviewRatingStatistics": { "averageRating": 4.25, "count": 4 },
                "masterVariant": { "attributes": [{ "name": "color", "value": "red" }] }
            })),
            "product-review-summary",
        )
        .unwrap();
        assert_eq!(entry.version, 3);
        assert_eq!(entry.review_statistics.count, 4);
        assert!(entry.stored_summary.is_none());
    }

    #[test]
    fn test_decode_entry_with_expanded_summary() {
        let entry = decode_entry(
            wire(json!({
                "id": "p-1",
                "version": 9,
                "reviewRatingStatistics": { "averageRating": 3.5, "count": 10 },
                "masterVariant": { "attributes": [{
                    "name": "product-review-summary",
                    "value": {
                        "typeId": "key-value-document",
                        "id": "co-7",
                        "obj": { "id": "co-7", "value": { "totalReviewCount": 8, "lastAveragePoint": 3.44 } }
                    }
                }]}
            })),
            "product-review-summary",
        )
        .unwrap();
        let stored = entry.stored_summary.unwrap();
        assert_eq!(stored.referenced_summary_id, "co-7");
        assert_eq!(stored.total_review_count_at_last_sync, 8);
        assert!((stored.average_rating_at_last_sync - 3.44).abs() < 1e-9);
    }

    #[test]
    fn test_decode_entry_unexpanded_reference_is_an_error() {
        let err = decode_entry(
            wire(json!({
                "id": "p-1",
                "version": 1,
                "masterVariant": { "attributes": [{
                    "name": "product-review-summary",
                    "value": { "typeId": "key-value-document", "id": "co-7" }
                }]}
            })),
            "product-review-summary",
        )
        .unwrap_err();
        assert!(err.to_string().contains("expanded record"));
    }

    #[test]
    fn test_decode_entry_missing_statistics_defaults() {
        let entry = decode_entry(wire(json!({ "id": "p-2", "version": 1 })), "x").unwrap();
        assert_eq!(entry.review_statistics, ReviewStatistics::default());
    }

    #[test]
    fn test_review_wire_shape() {
        let page: PagedResponse<Review> = serde_json::from_value(json!({
            "offset": 0, "count": 1, "total": 1,
            "results": [{
                "id": "r-1", "title": "Great", "text": "Works", "rating": 5,
                "target": { "typeId": "product", "id": "p-1" },
                "authorName": "someone"
            }]
        }))
        .unwrap();
        assert_eq!(page.results[0].target.id, "p-1");
        assert_eq!(page.results[0].rating, Some(5));
    }

    #[test]
    fn test_map_http_error() {
        assert!(matches!(
            map_http_error(StatusCode::UNAUTHORIZED, "nope"),
            PlatformError::Auth { .. }
        ));
        assert!(matches!(
            map_http_error(StatusCode::CONFLICT, "stale"),
            PlatformError::Http { status: 409, .. }
        ));
    }

    #[test]
    fn test_map_link_error_turns_conflict_into_version_conflict() {
        let conflict = map_http_error(StatusCode::CONFLICT, r#"{"statusCode":409}"#);
        match map_link_error("p-1", 7, conflict) {
            PlatformError::VersionConflict { entry_id, version } => {
                assert_eq!(entry_id, "p-1");
                assert_eq!(version, 7);
            }
            other => panic!("expected version conflict, got {other:?}"),
        }

        let server = map_http_error(StatusCode::INTERNAL_SERVER_ERROR, "boom");
        assert!(matches!(
            map_link_error("p-1", 7, server),
            PlatformError::Http { status: 500, .. }
        ));
        let auth = map_http_error(StatusCode::FORBIDDEN, "denied");
        assert!(matches!(map_link_error("p-1", 7, auth), PlatformError::Auth { .. }));
    }

    #[test]
    fn test_parse_token_response() {
        let now = Utc::now();
        let token =
            parse_token_response(r#"{"access_token":"abc","expires_in":172800}"#, now).unwrap();
        assert_eq!(token.value, "abc");
        assert!(token.is_fresh(now));
        assert!(!token.is_fresh(now + chrono::Duration::seconds(172_800 - 30)));
        assert!(parse_token_response(r#"{"expires_in":1}"#, now).is_err());
    }

    #[test]
    fn test_new_requires_project_key() {
        let platform = PlatformConfig {
            client_secret: Some("s".into()),
            ..Default::default()
        };
        assert!(HttpPlatform::new(&platform, &WriteConfig::default()).is_err());
    }
}
