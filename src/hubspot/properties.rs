//! Per-kind HubSpot property schemas for engagement records.
//!
//! Upstream field names live only here. HubSpot returns every property as a
//! string (or null), but numbers show up from older portals and imports, so
//! text fields accept any scalar and timestamps keep their raw shape for the
//! normalizer to interpret.

use serde::{Deserialize, Deserializer};
use serde_json::{Map, Value};

use crate::types::EngagementKind;

/// Properties requested per kind on the single-record GET.
pub fn property_names(kind: EngagementKind) -> &'static [&'static str] {
    match kind {
        EngagementKind::Call => &[
            "hs_timestamp",
            "hs_call_body",
            "hs_call_direction",
            "hs_call_duration",
        ],
        EngagementKind::Email => &[
            "hs_timestamp",
            "hs_email_direction",
            "hs_email_subject",
            "hs_email_text",
            "hs_email_html",
        ],
        EngagementKind::Meeting => &[
            "hs_timestamp",
            "hs_meeting_start_time",
            "hs_meeting_end_time",
            "hs_meeting_title",
            "hs_meeting_body",
        ],
        EngagementKind::Note => &[
            "hs_timestamp",
            "hs_created_date",
            "hs_lastmodifieddate",
            "hs_note_body",
        ],
    }
}

/// Canonical timestamp property, used as the search projection.
pub const TIMESTAMP_PROPERTY: &str = "hs_timestamp";

/// A timestamp exactly as the CRM sent it.
#[derive(Debug, Clone, PartialEq)]
pub enum RawTimestamp {
    Millis(i64),
    Float(f64),
    Text(String),
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct CallProperties {
    #[serde(default, deserialize_with = "opt_timestamp")]
    pub hs_timestamp: Option<RawTimestamp>,
    #[serde(default, deserialize_with = "opt_text")]
    pub hs_call_body: Option<String>,
    #[serde(default, deserialize_with = "opt_text")]
    pub hs_call_direction: Option<String>,
    #[serde(default, deserialize_with = "opt_text")]
    pub hs_call_duration: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct EmailProperties {
    #[serde(default, deserialize_with = "opt_timestamp")]
    pub hs_timestamp: Option<RawTimestamp>,
    #[serde(default, deserialize_with = "opt_text")]
    pub hs_email_direction: Option<String>,
    #[serde(default, deserialize_with = "opt_text")]
    pub hs_email_subject: Option<String>,
    #[serde(default, deserialize_with = "opt_text")]
    pub hs_email_text: Option<String>,
    #[serde(default, deserialize_with = "opt_text")]
    pub hs_email_html: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct MeetingProperties {
    #[serde(default, deserialize_with = "opt_timestamp")]
    pub hs_timestamp: Option<RawTimestamp>,
    #[serde(default, deserialize_with = "opt_timestamp")]
    pub hs_meeting_start_time: Option<RawTimestamp>,
    #[serde(default, deserialize_with = "opt_timestamp")]
    pub hs_meeting_end_time: Option<RawTimestamp>,
    #[serde(default, deserialize_with = "opt_text")]
    pub hs_meeting_title: Option<String>,
    #[serde(default, deserialize_with = "opt_text")]
    pub hs_meeting_body: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct NoteProperties {
    #[serde(default, deserialize_with = "opt_timestamp")]
    pub hs_timestamp: Option<RawTimestamp>,
    #[serde(default, deserialize_with = "opt_timestamp")]
    pub hs_created_date: Option<RawTimestamp>,
    #[serde(default, deserialize_with = "opt_timestamp")]
    pub hs_lastmodifieddate: Option<RawTimestamp>,
    #[serde(default, deserialize_with = "opt_text")]
    pub hs_note_body: Option<String>,
}

/// Typed property set for one engagement record.
#[derive(Debug, Clone, PartialEq)]
pub enum EngagementProperties {
    Call(CallProperties),
    Email(EmailProperties),
    Meeting(MeetingProperties),
    Note(NoteProperties),
}

impl EngagementProperties {
    /// Interpret a raw property bag as the schema for `kind`.
    pub fn from_bag(
        kind: EngagementKind,
        bag: Map<String, Value>,
    ) -> Result<Self, serde_json::Error> {
        let value = Value::Object(bag);
        Ok(match kind {
            EngagementKind::Call => Self::Call(serde_json::from_value(value)?),
            EngagementKind::Email => Self::Email(serde_json::from_value(value)?),
            EngagementKind::Meeting => Self::Meeting(serde_json::from_value(value)?),
            EngagementKind::Note => Self::Note(serde_json::from_value(value)?),
        })
    }

    pub fn kind(&self) -> EngagementKind {
        match self {
            Self::Call(_) => EngagementKind::Call,
            Self::Email(_) => EngagementKind::Email,
            Self::Meeting(_) => EngagementKind::Meeting,
            Self::Note(_) => EngagementKind::Note,
        }
    }

    /// Timestamp candidates in preference order.
    pub fn timestamp_candidates(&self) -> Vec<Option<&RawTimestamp>> {
        match self {
            Self::Call(p) => vec![p.hs_timestamp.as_ref()],
            Self::Email(p) => vec![p.hs_timestamp.as_ref()],
            Self::Meeting(p) => vec![p.hs_meeting_start_time.as_ref(), p.hs_timestamp.as_ref()],
            Self::Note(p) => vec![
                p.hs_created_date.as_ref(),
                p.hs_lastmodifieddate.as_ref(),
                p.hs_timestamp.as_ref(),
            ],
        }
    }
}

/// Any JSON scalar as text; null and blank strings become `None`.
fn opt_text<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<String>, D::Error> {
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(Value::String(s)) if !s.trim().is_empty() => Some(s),
        Some(Value::Number(n)) => Some(n.to_string()),
        Some(Value::Bool(b)) => Some(b.to_string()),
        _ => None,
    })
}

/// Timestamp in whatever shape it arrived; null and blank strings become `None`.
fn opt_timestamp<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<Option<RawTimestamp>, D::Error> {
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(Value::String(s)) if !s.trim().is_empty() => Some(RawTimestamp::Text(s)),
        Some(Value::Number(n)) => match n.as_i64() {
            Some(ms) => Some(RawTimestamp::Millis(ms)),
            None => n.as_f64().map(RawTimestamp::Float),
        },
        // Anything else is kept as text so the normalizer logs and substitutes it.
        Some(Value::Bool(b)) => Some(RawTimestamp::Text(b.to_string())),
        _ => None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn bag(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_meeting_prefers_start_time() {
        let props = EngagementProperties::from_bag(
            EngagementKind::Meeting,
            bag(json!({
                "hs_timestamp": "2024-01-01T00:00:00Z",
                "hs_meeting_start_time": "2024-02-01T10:00:00Z",
                "hs_meeting_title": "QBR"
            })),
        )
        .unwrap();

        let candidates = props.timestamp_candidates();
        assert_eq!(
            candidates[0],
            Some(&RawTimestamp::Text("2024-02-01T10:00:00Z".into()))
        );
        assert_eq!(props.kind(), EngagementKind::Meeting);
    }

    #[test]
    fn test_numeric_and_null_values_are_tolerated() {
        let props = EngagementProperties::from_bag(
            EngagementKind::Call,
            bag(json!({
                "hs_timestamp": 1709300000000i64,
                "hs_call_duration": 95,
                "hs_call_body": null,
                "hs_call_direction": ""
            })),
        )
        .unwrap();

        match props {
            EngagementProperties::Call(call) => {
                assert_eq!(call.hs_timestamp, Some(RawTimestamp::Millis(1709300000000)));
                assert_eq!(call.hs_call_duration.as_deref(), Some("95"));
                assert!(call.hs_call_body.is_none());
                assert!(call.hs_call_direction.is_none());
            }
            other => panic!("expected call properties, got {:?}", other),
        }
    }

    #[test]
    fn test_unknown_properties_are_ignored() {
        let props = EngagementProperties::from_bag(
            EngagementKind::Note,
            bag(json!({
                "hs_object_id": "12",
                "hs_note_body": "Follow up next week",
                "hs_lastmodifieddate": "2024-05-05T12:00:00.000Z"
            })),
        )
        .unwrap();

        let candidates = props.timestamp_candidates();
        assert_eq!(candidates.len(), 3);
        assert!(candidates[0].is_none());
        assert!(candidates[1].is_some());
    }

    #[test]
    fn test_property_lists_include_canonical_timestamp() {
        for kind in EngagementKind::ALL {
            assert!(property_names(kind).contains(&TIMESTAMP_PROPERTY));
        }
    }
}
