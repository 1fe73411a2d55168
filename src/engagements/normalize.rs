//! Timestamp and per-kind field normalization.
//!
//! All kind-specific defaulting lives here: title fallbacks, body source
//! preference, which timestamp property wins. Field names stay in
//! `hubspot::properties`.

use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};

use crate::hubspot::properties::{EngagementProperties, RawTimestamp};
use crate::types::EngagementItem;

/// Stored body length cap, in characters.
pub const MAX_BODY_CHARS: usize = 5000;

/// Parse a raw CRM timestamp.
///
/// Order: positive epoch milliseconds, then ISO-8601 text. Anything else,
/// absent values included, becomes `now` so an unparseable record ranks as
/// recent instead of sinking below every real record.
pub fn parse_timestamp(raw: Option<&RawTimestamp>, now: DateTime<Utc>) -> DateTime<Utc> {
    let Some(raw) = raw else {
        log::warn!("Engagements: timestamp is missing, using current time");
        return now;
    };

    let parsed = match raw {
        RawTimestamp::Millis(ms) => from_millis(*ms),
        RawTimestamp::Float(ms) => from_millis(ms.trunc() as i64),
        RawTimestamp::Text(text) => parse_text(text.trim()),
    };

    parsed.unwrap_or_else(|| {
        log::warn!("Engagements: failed to parse timestamp {:?}, using current time", raw);
        now
    })
}

fn from_millis(ms: i64) -> Option<DateTime<Utc>> {
    if ms <= 0 {
        return None;
    }
    Utc.timestamp_millis_opt(ms).single()
}

fn parse_text(text: &str) -> Option<DateTime<Utc>> {
    if !text.is_empty() && text.bytes().all(|b| b.is_ascii_digit()) {
        return text.parse::<i64>().ok().and_then(from_millis);
    }
    parse_iso(text).filter(|dt| dt.timestamp_millis() > 0)
}

/// ISO-8601 forms seen in CRM exports. Values without an offset read as UTC.
fn parse_iso(text: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Some(dt.with_timezone(&Utc));
    }
    // Offset without a colon: `2024-03-01T15:04:05.000+0000`
    if let Ok(dt) = DateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S%.f%z") {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S%.f") {
        return Some(Utc.from_utc_datetime(&dt));
    }
    NaiveDate::parse_from_str(text, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| Utc.from_utc_datetime(&dt))
}

/// First present candidate in the kind's fallback chain.
fn primary_timestamp(props: &EngagementProperties, now: DateTime<Utc>) -> DateTime<Utc> {
    let raw = props.timestamp_candidates().into_iter().flatten().next();
    parse_timestamp(raw, now)
}

fn truncate_chars(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((idx, _)) => text[..idx].to_string(),
        None => text.to_string(),
    }
}

/// Map one typed property set onto the canonical item.
pub fn normalize_engagement(
    id: &str,
    props: &EngagementProperties,
    now: DateTime<Utc>,
) -> EngagementItem {
    let kind = props.kind();
    let timestamp = primary_timestamp(props, now);

    let (title, body, direction, duration) = match props {
        EngagementProperties::Call(p) => {
            let title = match &p.hs_call_duration {
                Some(d) => format!("Call ({}s)", d),
                None => kind.default_title().to_string(),
            };
            (
                title,
                p.hs_call_body.clone(),
                p.hs_call_direction.clone(),
                p.hs_call_duration.clone(),
            )
        }
        EngagementProperties::Email(p) => (
            p.hs_email_subject
                .clone()
                .unwrap_or_else(|| kind.default_title().to_string()),
            p.hs_email_text.clone().or_else(|| p.hs_email_html.clone()),
            p.hs_email_direction.clone(),
            None,
        ),
        EngagementProperties::Meeting(p) => (
            p.hs_meeting_title
                .clone()
                .unwrap_or_else(|| kind.default_title().to_string()),
            p.hs_meeting_body.clone(),
            None,
            None,
        ),
        EngagementProperties::Note(p) => (
            kind.default_title().to_string(),
            p.hs_note_body.clone(),
            None,
            None,
        ),
    };

    EngagementItem {
        id: id.to_string(),
        kind,
        timestamp,
        title,
        body: body.map(|b| truncate_chars(&b, MAX_BODY_CHARS)),
        direction,
        duration,
        contact_name: None,
    }
}
