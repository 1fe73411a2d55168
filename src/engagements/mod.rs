//! Recent-engagement aggregation for contacts and companies.
//!
//! Flow per lookup: cache check, association resolution per kind, record
//! fetch and normalization, merge and rank, one summarization call, cache
//! write. `pipeline::EngagementPipeline` wires the pieces together.

pub mod aggregate;
pub mod cache;
pub mod clock;
pub mod context;
pub mod normalize;
pub mod pipeline;
pub mod source;
pub mod summary;

use serde::{Deserialize, Serialize};

pub use cache::{CacheEntry, CacheStatus, EngagementCache};
pub use clock::{Clock, ManualClock, SystemClock};
pub use context::build_context_from_engagements;
pub use pipeline::EngagementPipeline;
pub use source::CrmSource;
pub use summary::{SummaryError, SummaryProvider, SummaryResult};

pub const DEFAULT_LIMIT: usize = 3;
pub const MIN_LIMIT: usize = 1;
pub const MAX_LIMIT: usize = 20;

/// Clamp a requested result size into the supported range.
pub fn clamp_limit(limit: usize) -> usize {
    limit.clamp(MIN_LIMIT, MAX_LIMIT)
}

/// Upper bound on `cacheTtlMinutes` (one week).
pub const MAX_CACHE_TTL_MINUTES: i64 = 7 * 24 * 60;
/// Upper bound on `pipelineTimeoutSecs`.
pub const MAX_PIPELINE_TIMEOUT_SECS: u64 = 600;

/// Parse a limit from text, reading the leading integer (`"5abc"` is 5).
///
/// No leading integer, or zero, falls back to the default; anything else is
/// clamped.
pub fn parse_limit(raw: &str) -> usize {
    let text = raw.trim_start();
    let (negative, digits) = match text.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, text.strip_prefix('+').unwrap_or(text)),
    };
    let len = digits.bytes().take_while(u8::is_ascii_digit).count();
    let digits = &digits[..len];

    if digits.is_empty() || digits.bytes().all(|b| b == b'0') {
        return DEFAULT_LIMIT;
    }
    if negative {
        return MIN_LIMIT;
    }
    digits.parse::<usize>().map(clamp_limit).unwrap_or(MAX_LIMIT)
}

/// Aggregation tuning, under `engagements` in the config file.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EngagementsConfig {
    /// Engagements returned per lookup, clamped to 1..=20.
    #[serde(default = "default_limit")]
    pub limit: usize,
    #[serde(default = "default_cache_ttl_minutes")]
    pub cache_ttl_minutes: i64,
    /// Outbound CRM requests in flight at once across a lookup.
    #[serde(default = "default_max_concurrent_requests")]
    pub max_concurrent_requests: usize,
    /// Overall deadline for gathering and summarizing one lookup.
    #[serde(default = "default_pipeline_timeout_secs")]
    pub pipeline_timeout_secs: u64,
    /// Contacts of a company that are searched.
    #[serde(default = "default_company_contact_limit")]
    pub company_contact_limit: usize,
}

fn default_limit() -> usize {
    DEFAULT_LIMIT
}

fn default_cache_ttl_minutes() -> i64 {
    cache::DEFAULT_TTL_MINUTES
}

fn default_max_concurrent_requests() -> usize {
    8
}

fn default_pipeline_timeout_secs() -> u64 {
    30
}

fn default_company_contact_limit() -> usize {
    10
}

impl Default for EngagementsConfig {
    fn default() -> Self {
        Self {
            limit: default_limit(),
            cache_ttl_minutes: default_cache_ttl_minutes(),
            max_concurrent_requests: default_max_concurrent_requests(),
            pipeline_timeout_secs: default_pipeline_timeout_secs(),
            company_contact_limit: default_company_contact_limit(),
        }
    }
}

impl EngagementsConfig {
    pub fn effective_limit(&self) -> usize {
        clamp_limit(self.limit)
    }

    pub fn cache_ttl(&self) -> chrono::Duration {
        let minutes = self.cache_ttl_minutes.clamp(0, MAX_CACHE_TTL_MINUTES);
        chrono::Duration::try_minutes(minutes).unwrap_or_else(chrono::Duration::zero)
    }

    pub fn pipeline_timeout(&self) -> std::time::Duration {
        let secs = self.pipeline_timeout_secs.clamp(1, MAX_PIPELINE_TIMEOUT_SECS);
        std::time::Duration::from_secs(secs)
    }
}
