//! HubSpot CRM integration.
//!
//! Thin REST client over the v3/v4 object APIs plus the per-kind property
//! schemas the engagement normalizer reads. Only the endpoints the engagement
//! pipeline needs are wrapped.

pub mod client;
pub mod properties;

use serde::{Deserialize, Serialize};

pub const DEFAULT_BASE_URL: &str = "https://api.hubapi.com";

/// HubSpot configuration stored in ~/.prospector/config.json.
///
/// `HUBSPOT_ACCESS_TOKEN` in the environment takes precedence over the file.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HubSpotConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_token: Option<String>,
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

fn default_base_url() -> String {
    DEFAULT_BASE_URL.to_string()
}

fn default_request_timeout_secs() -> u64 {
    15
}

impl Default for HubSpotConfig {
    fn default() -> Self {
        Self {
            access_token: None,
            base_url: default_base_url(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}
