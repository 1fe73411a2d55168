//! REST client for the HubSpot CRM API.
//!
//! Uses reqwest with Bearer token auth. Requests never retry here: a 429 is
//! classified as `RateLimited` (with the `Retry-After` hint) and the caller
//! decides what to do with it.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::RETRY_AFTER;
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::{json, Map, Value};

use super::properties::{property_names, TIMESTAMP_PROPERTY};
use super::HubSpotConfig;
use crate::engagements::source::CrmSource;
use crate::types::{EngagementKind, EntityKind, EntityRef};

/// Max ids one association search returns.
pub const SEARCH_LIMIT: usize = 100;

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

/// Errors from HubSpot API calls.
#[derive(Debug, thiserror::Error)]
pub enum HubSpotError {
    #[error("No HubSpot access token configured")]
    NoAccessToken,
    #[error("Missing HubSpot scope: {0}")]
    MissingScopes(String),
    #[error("HubSpot rate limit exceeded")]
    RateLimited { retry_after_secs: Option<u64> },
    #[error("HubSpot API error {status}: {message}")]
    Api { status: u16, message: String },
    #[error("HTTP: {0}")]
    Http(#[from] reqwest::Error),
    #[error("JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Invalid URL: {0}")]
    Url(#[from] url::ParseError),
}

/// Error body HubSpot returns on non-2xx responses.
#[derive(Debug, Default, Deserialize)]
struct ApiErrorBody {
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    category: Option<String>,
}

/// Map a non-success response to a typed error.
pub fn classify_error(status: u16, body: &str, retry_after: Option<&str>) -> HubSpotError {
    if status == StatusCode::TOO_MANY_REQUESTS.as_u16() {
        return HubSpotError::RateLimited {
            retry_after_secs: retry_after.and_then(|v| v.trim().parse::<u64>().ok()),
        };
    }

    let parsed: ApiErrorBody = serde_json::from_str(body).unwrap_or_default();
    let message = parsed
        .message
        .unwrap_or_else(|| body.chars().take(300).collect());

    if parsed.category.as_deref() == Some("MISSING_SCOPES") || status == 403 {
        return HubSpotError::MissingScopes(message);
    }

    HubSpotError::Api { status, message }
}

// ---------------------------------------------------------------------------
// Response parsing
// ---------------------------------------------------------------------------

/// Ids from an object search response: `{"results": [{"id": "..."}]}`.
pub fn parse_search_ids(data: &Value) -> Vec<String> {
    data.get("results")
        .and_then(Value::as_array)
        .map(|results| {
            results
                .iter()
                .filter_map(|r| id_text(r.get("id")?))
                .take(SEARCH_LIMIT)
                .collect()
        })
        .unwrap_or_default()
}

/// Ids from a v4 associations response: `{"results": [{"toObjectId": 123}]}`.
pub fn parse_association_ids(data: &Value) -> Vec<String> {
    data.get("results")
        .and_then(Value::as_array)
        .map(|results| {
            results
                .iter()
                .filter_map(|r| id_text(r.get("toObjectId")?))
                .collect()
        })
        .unwrap_or_default()
}

/// The `properties` object of a single-record response.
pub fn parse_properties(data: &Value) -> Map<String, Value> {
    data.get("properties")
        .and_then(Value::as_object)
        .cloned()
        .unwrap_or_default()
}

/// "First Last", or an em dash placeholder when both are blank.
pub fn display_name(first: Option<&str>, last: Option<&str>) -> String {
    let name = [first, last]
        .iter()
        .flatten()
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join(" ");
    if name.is_empty() {
        "—".to_string()
    } else {
        name
    }
}

fn id_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

pub struct HubSpotClient {
    client: reqwest::Client,
    access_token: String,
    base_url: url::Url,
}

impl HubSpotClient {
    pub fn new(config: &HubSpotConfig) -> Result<Self, HubSpotError> {
        let access_token = config
            .access_token
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .ok_or(HubSpotError::NoAccessToken)?
            .to_string();

        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .timeout(Duration::from_secs(config.request_timeout_secs.max(1)))
            .build()?;

        Ok(Self {
            client,
            access_token,
            base_url: url::Url::parse(&config.base_url)?,
        })
    }

    fn url(&self, path: &str) -> Result<url::Url, HubSpotError> {
        Ok(self.base_url.join(path)?)
    }

    async fn send_json(&self, request: reqwest::RequestBuilder) -> Result<Value, HubSpotError> {
        let resp = request.bearer_auth(&self.access_token).send().await?;

        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let retry_after = resp
                .headers()
                .get(RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string);
            let text = resp.text().await.unwrap_or_default();
            return Err(classify_error(status, &text, retry_after.as_deref()));
        }

        Ok(resp.json().await?)
    }

    /// Ids of `kind` records associated with the entity (up to 100).
    pub async fn search_associated_ids(
        &self,
        entity: &EntityRef,
        kind: EngagementKind,
    ) -> Result<Vec<String>, HubSpotError> {
        let url = self.url(&format!("/crm/v3/objects/{}/search", kind.object_type()))?;
        let association = match entity.kind {
            EntityKind::Contact => "associations.contact",
            EntityKind::Company => "associations.company",
        };
        let body = json!({
            "filterGroups": [{
                "filters": [{
                    "propertyName": association,
                    "operator": "EQ",
                    "value": entity.id,
                }]
            }],
            "properties": [TIMESTAMP_PROPERTY],
            "limit": SEARCH_LIMIT,
        });

        let data = self.send_json(self.client.post(url).json(&body)).await?;
        let ids = parse_search_ids(&data);
        if !ids.is_empty() {
            log::debug!(
                "HubSpot: found {} {} for {} {}",
                ids.len(),
                kind.object_type(),
                entity.kind,
                entity.id
            );
        }
        Ok(ids)
    }

    /// Full property bag for one engagement record.
    pub async fn get_engagement(
        &self,
        kind: EngagementKind,
        id: &str,
    ) -> Result<Map<String, Value>, HubSpotError> {
        let mut url = self.url(&format!("/crm/v3/objects/{}/{}", kind.object_type(), id))?;
        url.query_pairs_mut()
            .append_pair("properties", &property_names(kind).join(","));

        let data = self.send_json(self.client.get(url)).await?;
        Ok(parse_properties(&data))
    }

    /// Contact ids associated with a company, in upstream order.
    pub async fn company_contact_ids(&self, company_id: &str) -> Result<Vec<String>, HubSpotError> {
        let url = self.url(&format!(
            "/crm/v4/objects/companies/{}/associations/contacts",
            company_id
        ))?;
        let data = self.send_json(self.client.get(url)).await?;
        Ok(parse_association_ids(&data))
    }

    /// Display name for a contact.
    pub async fn contact_display_name(&self, contact_id: &str) -> Result<String, HubSpotError> {
        let mut url = self.url(&format!("/crm/v3/objects/contacts/{}", contact_id))?;
        url.query_pairs_mut()
            .append_pair("properties", "firstname,lastname");

        let data = self.send_json(self.client.get(url)).await?;
        let props = parse_properties(&data);
        Ok(display_name(
            props.get("firstname").and_then(Value::as_str),
            props.get("lastname").and_then(Value::as_str),
        ))
    }
}

#[async_trait]
impl CrmSource for HubSpotClient {
    async fn associated_ids(
        &self,
        entity: &EntityRef,
        kind: EngagementKind,
    ) -> Result<Vec<String>, HubSpotError> {
        self.search_associated_ids(entity, kind).await
    }

    async fn engagement_properties(
        &self,
        kind: EngagementKind,
        id: &str,
    ) -> Result<Map<String, Value>, HubSpotError> {
        self.get_engagement(kind, id).await
    }

    async fn company_contact_ids(&self, company_id: &str) -> Result<Vec<String>, HubSpotError> {
        HubSpotClient::company_contact_ids(self, company_id).await
    }

    async fn contact_name(&self, contact_id: &str) -> Result<String, HubSpotError> {
        self.contact_display_name(contact_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_missing_scopes() {
        let body = r#"{"status":"error","message":"This app hasn't been granted all required scopes","category":"MISSING_SCOPES"}"#;
        match classify_error(403, body, None) {
            HubSpotError::MissingScopes(msg) => assert!(msg.contains("scopes")),
            other => panic!("expected MissingScopes, got {:?}", other),
        }
    }

    #[test]
    fn test_classify_rate_limit_reads_retry_after() {
        match classify_error(429, "", Some("7")) {
            HubSpotError::RateLimited { retry_after_secs } => {
                assert_eq!(retry_after_secs, Some(7))
            }
            other => panic!("expected RateLimited, got {:?}", other),
        }
        match classify_error(429, "", Some("Wed, 21 Oct 2015 07:28:00 GMT")) {
            HubSpotError::RateLimited { retry_after_secs } => assert_eq!(retry_after_secs, None),
            other => panic!("expected RateLimited, got {:?}", other),
        }
    }

    #[test]
    fn test_classify_generic_error_keeps_status() {
        match classify_error(500, "<html>oops</html>", None) {
            HubSpotError::Api { status, message } => {
                assert_eq!(status, 500);
                assert_eq!(message, "<html>oops</html>");
            }
            other => panic!("expected Api, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_search_ids_skips_malformed_rows() {
        let data = json!({
            "total": 3,
            "results": [
                {"id": "101", "properties": {"hs_timestamp": "2024-01-01T00:00:00Z"}},
                {"properties": {}},
                {"id": 102}
            ]
        });
        assert_eq!(parse_search_ids(&data), vec!["101", "102"]);
        assert!(parse_search_ids(&json!({"unexpected": true})).is_empty());
    }

    #[test]
    fn test_parse_association_ids_accepts_numbers() {
        let data = json!({
            "results": [
                {"toObjectId": 501, "associationTypes": []},
                {"toObjectId": "502"}
            ]
        });
        assert_eq!(parse_association_ids(&data), vec!["501", "502"]);
    }

    #[test]
    fn test_display_name() {
        assert_eq!(display_name(Some("Ada"), Some("Lovelace")), "Ada Lovelace");
        assert_eq!(display_name(Some("Ada"), None), "Ada");
        assert_eq!(display_name(Some(" "), Some("")), "—");
        assert_eq!(display_name(None, None), "—");
    }

    #[test]
    fn test_new_requires_token() {
        let config = HubSpotConfig::default();
        assert!(matches!(
            HubSpotClient::new(&config),
            Err(HubSpotError::NoAccessToken)
        ));

        let config = HubSpotConfig {
            access_token: Some("pat-na1-test".into()),
            ..HubSpotConfig::default()
        };
        let client = HubSpotClient::new(&config).unwrap();
        assert_eq!(
            client.url("/crm/v3/objects/calls/search").unwrap().as_str(),
            "https://api.hubapi.com/crm/v3/objects/calls/search"
        );
    }
}
