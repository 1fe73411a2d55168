use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::engagements::summary::SummaryConfig;
use crate::engagements::EngagementsConfig;
use crate::hubspot::HubSpotConfig;

/// Configuration stored in ~/.prospector/config.json
///
/// Every section is optional; environment variables fill in credentials
/// (see `state::load_config`).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    #[serde(default)]
    pub hubspot: HubSpotConfig,
    #[serde(default)]
    pub summary: SummaryConfig,
    #[serde(default)]
    pub engagements: EngagementsConfig,
}

// =============================================================================
// Entities
// =============================================================================

/// CRM entity an engagement lookup is anchored on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    Contact,
    Company,
}

impl EntityKind {
    pub fn as_str(self) -> &'static str {
        match self {
            EntityKind::Contact => "contact",
            EntityKind::Company => "company",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "contact" | "contacts" => Some(EntityKind::Contact),
            "company" | "companies" => Some(EntityKind::Company),
            _ => None,
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A contact or company id in the CRM.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EntityRef {
    pub kind: EntityKind,
    pub id: String,
}

impl EntityRef {
    pub fn contact(id: impl Into<String>) -> Self {
        Self {
            kind: EntityKind::Contact,
            id: id.into(),
        }
    }

    pub fn company(id: impl Into<String>) -> Self {
        Self {
            kind: EntityKind::Company,
            id: id.into(),
        }
    }

    /// Cache key namespaced by entity kind so contact and company ids never collide.
    pub fn cache_key(&self) -> String {
        format!("{}:{}", self.kind.as_str(), self.id)
    }
}

// =============================================================================
// Engagements
// =============================================================================

/// The four engagement record kinds. Closed set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EngagementKind {
    Call,
    Email,
    Meeting,
    Note,
}

impl EngagementKind {
    /// Fan-out order; also the tie-break order within one contact.
    pub const ALL: [EngagementKind; 4] = [
        EngagementKind::Call,
        EngagementKind::Email,
        EngagementKind::Meeting,
        EngagementKind::Note,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            EngagementKind::Call => "call",
            EngagementKind::Email => "email",
            EngagementKind::Meeting => "meeting",
            EngagementKind::Note => "note",
        }
    }

    /// CRM object type path segment.
    pub fn object_type(self) -> &'static str {
        match self {
            EngagementKind::Call => "calls",
            EngagementKind::Email => "emails",
            EngagementKind::Meeting => "meetings",
            EngagementKind::Note => "notes",
        }
    }

    pub fn default_title(self) -> &'static str {
        match self {
            EngagementKind::Call => "Call",
            EngagementKind::Email => "Email",
            EngagementKind::Meeting => "Meeting",
            EngagementKind::Note => "Note",
        }
    }
}

impl fmt::Display for EngagementKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One normalized activity record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EngagementItem {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: EngagementKind,
    #[serde(with = "iso_millis")]
    pub timestamp: DateTime<Utc>,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub direction: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contact_name: Option<String>,
}

impl EngagementItem {
    /// Timestamp in the ISO-8601 form used on the wire and in prompts.
    pub fn timestamp_iso(&self) -> String {
        iso_millis::format(&self.timestamp)
    }

    /// Copy of this item attributed to a company contact.
    pub fn with_contact_name(&self, name: Option<&str>) -> Self {
        let mut tagged = self.clone();
        if let Some(name) = name {
            tagged.contact_name = Some(name.to_string());
        }
        tagged
    }
}

/// Consumer-facing result of an engagement lookup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EngagementsPayload {
    pub engagements: Vec<EngagementItem>,
    pub display_summaries: Vec<String>,
    pub context_summary: String,
}

/// RFC 3339 with millisecond precision and a `Z` suffix, e.g. `2024-03-01T15:04:05.000Z`.
pub mod iso_millis {
    use chrono::{DateTime, SecondsFormat, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn format(dt: &DateTime<Utc>) -> String {
        dt.to_rfc3339_opts(SecondsFormat::Millis, true)
    }

    pub fn serialize<S: Serializer>(dt: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&format(dt))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<DateTime<Utc>, D::Error> {
        let s = String::deserialize(deserializer)?;
        DateTime::parse_from_rfc3339(&s)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_cache_key_namespaces_entity_kinds() {
        assert_eq!(EntityRef::contact("42").cache_key(), "contact:42");
        assert_eq!(EntityRef::company("42").cache_key(), "company:42");
        assert_ne!(
            EntityRef::contact("42").cache_key(),
            EntityRef::company("42").cache_key()
        );
    }

    #[test]
    fn test_engagement_item_wire_shape() {
        let item = EngagementItem {
            id: "7".into(),
            kind: EngagementKind::Meeting,
            timestamp: Utc.with_ymd_and_hms(2024, 3, 1, 15, 4, 5).unwrap(),
            title: "Kickoff".into(),
            body: None,
            direction: None,
            duration: None,
            contact_name: Some("Ada Lovelace".into()),
        };

        let json = serde_json::to_value(&item).unwrap();
        assert_eq!(json["type"], "meeting");
        assert_eq!(json["timestamp"], "2024-03-01T15:04:05.000Z");
        assert_eq!(json["contactName"], "Ada Lovelace");
        assert!(json.get("body").is_none());

        let back: EngagementItem = serde_json::from_value(json).unwrap();
        assert_eq!(back, item);
    }

    #[test]
    fn test_entity_kind_parse() {
        assert_eq!(EntityKind::parse("Contact"), Some(EntityKind::Contact));
        assert_eq!(EntityKind::parse("companies"), Some(EntityKind::Company));
        assert_eq!(EntityKind::parse("deal"), None);
    }

    #[test]
    fn test_config_defaults_from_empty_json() {
        let config: Config = serde_json::from_str("{}").unwrap();
        assert_eq!(config.engagements.limit, 3);
        assert_eq!(config.engagements.cache_ttl_minutes, 15);
        assert!(config.hubspot.access_token.is_none());
    }
}
