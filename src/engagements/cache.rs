//! In-memory engagement cache with TTL and single-flight coalescing.
//!
//! Entries expire lazily: a read past the TTL removes the entry and reports a
//! miss. Nothing evicts proactively; `purge_expired` exists for callers that
//! want to reclaim memory on their own schedule.

use std::future::Future;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use serde::Serialize;
use tokio::sync::Mutex;

use super::clock::Clock;
use crate::types::{EngagementItem, EngagementsPayload};

/// Default TTL for cached engagement lookups.
pub const DEFAULT_TTL_MINUTES: i64 = 15;

/// Memoized aggregation result for one entity.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheEntry {
    pub engagements: Vec<EngagementItem>,
    pub display_summaries: Vec<String>,
    pub context_summary: String,
    pub fetched_at: DateTime<Utc>,
}

impl CacheEntry {
    pub fn payload(&self) -> EngagementsPayload {
        EngagementsPayload {
            engagements: self.engagements.clone(),
            display_summaries: self.display_summaries.clone(),
            context_summary: self.context_summary.clone(),
        }
    }
}

/// How a lookup was satisfied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheStatus {
    /// Served from a live entry.
    Hit,
    /// Waited on a concurrent computation for the same key and reused its entry.
    Coalesced,
    /// Computed by this caller.
    Miss,
}

pub struct EngagementCache {
    entries: DashMap<String, CacheEntry>,
    in_flight: DashMap<String, Arc<Mutex<()>>>,
    ttl: Duration,
    clock: Arc<dyn Clock>,
}

impl EngagementCache {
    pub fn new(ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: DashMap::new(),
            in_flight: DashMap::new(),
            ttl,
            clock,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    fn is_expired(&self, entry: &CacheEntry, now: DateTime<Utc>) -> bool {
        now - entry.fetched_at > self.ttl
    }

    /// Live entry for `key`. Expired entries are removed by this read.
    pub fn get(&self, key: &str) -> Option<CacheEntry> {
        let now = self.clock.now();
        match self.entries.get(key) {
            Some(entry) if !self.is_expired(entry.value(), now) => {
                return Some(entry.value().clone())
            }
            Some(_) => {}
            None => return None,
        }

        // Re-check under the shard lock: a concurrent set may have refreshed it.
        if self
            .entries
            .remove_if(key, |_, entry| self.is_expired(entry, now))
            .is_some()
        {
            log::debug!("Engagements: cache entry {} expired", key);
        }
        None
    }

    /// Store `payload` stamped with the current time, replacing any prior entry.
    pub fn set(&self, key: &str, payload: EngagementsPayload) -> CacheEntry {
        let entry = CacheEntry {
            engagements: payload.engagements,
            display_summaries: payload.display_summaries,
            context_summary: payload.context_summary,
            fetched_at: self.clock.now(),
        };
        self.entries.insert(key.to_string(), entry.clone());
        entry
    }

    /// Cached entry for `key`, or the result of `compute` stored under it.
    ///
    /// Concurrent callers for the same cold key run `compute` once; the others
    /// wait and receive the stored entry. Errors are never stored, so a waiter
    /// that finds no entry after the leader failed computes for itself.
    pub async fn get_or_compute<F, Fut, E>(
        &self,
        key: &str,
        compute: F,
    ) -> Result<(CacheEntry, CacheStatus), E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<EngagementsPayload, E>>,
    {
        if let Some(entry) = self.get(key) {
            return Ok((entry, CacheStatus::Hit));
        }

        let gate = self
            .in_flight
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();

        let result = {
            let _guard = gate.lock().await;
            match self.get(key) {
                Some(entry) => Ok((entry, CacheStatus::Coalesced)),
                None => compute()
                    .await
                    .map(|payload| (self.set(key, payload), CacheStatus::Miss)),
            }
        };

        drop(gate);
        self.in_flight
            .remove_if(key, |_, gate| Arc::strong_count(gate) == 1);

        result
    }

    /// Drop every expired entry. Returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = self.clock.now();
        let before = self.entries.len();
        self.entries.retain(|_, entry| !self.is_expired(entry, now));
        before.saturating_sub(self.entries.len())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
