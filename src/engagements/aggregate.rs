//! Fan-out across kinds and contacts, then merge and rank.
//!
//! Gathering and ranking are split: the aggregator streams normalized items
//! into a `GatherSink` as they arrive, and `rank` orders whatever the sink
//! holds. That lets the pipeline stop gathering at its deadline and still
//! serve a correctly ranked partial set.

use std::collections::HashMap;
use std::sync::Arc;

use futures::future::join_all;
use futures::stream::{self, StreamExt};
use parking_lot::Mutex;
use tokio::sync::{Semaphore, SemaphorePermit};

use super::clock::Clock;
use super::source::{fetch_engagement, resolve_associations, CrmSource};
use crate::error::EngagementError;
use crate::hubspot::client::HubSpotError;
use crate::types::{EngagementItem, EngagementKind, EntityKind, EntityRef};

/// Fetch position: (contact index, kind index, resolver index).
pub type OrderKey = (usize, usize, usize);

/// A normalized item tagged with where it was fetched from.
#[derive(Debug, Clone)]
pub struct Gathered {
    pub order: OrderKey,
    pub item: EngagementItem,
}

/// Items collected so far by one aggregation.
///
/// Also remembers whether any CRM call was rate limited, so the pipeline can
/// tell "no history" apart from "nothing could be read".
#[derive(Debug, Default)]
pub struct GatherSink {
    items: Mutex<Vec<Gathered>>,
    rate_limited: Mutex<Option<Option<u64>>>,
}

impl GatherSink {
    pub fn push(&self, gathered: Gathered) {
        self.items.lock().push(gathered);
    }

    /// Record a skipped rate-limited call, keeping the longest retry hint.
    pub fn note_rate_limited(&self, retry_after_secs: Option<u64>) {
        let mut seen = self.rate_limited.lock();
        *seen = Some(match *seen {
            Some(prev) => prev.max(retry_after_secs),
            None => retry_after_secs,
        });
    }

    /// `Some(retry hint)` if any call was rate limited.
    pub fn rate_limited(&self) -> Option<Option<u64>> {
        *self.rate_limited.lock()
    }

    pub fn len(&self) -> usize {
        self.items.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.lock().is_empty()
    }

    pub fn take(&self) -> Vec<Gathered> {
        std::mem::take(&mut *self.items.lock())
    }
}

/// Items each contact contributes before the final truncation.
///
/// Companies ask every contact for twice the final limit so the company-wide
/// cut still has enough candidates.
pub fn per_contact_limit(kind: EntityKind, limit: usize) -> usize {
    match kind {
        EntityKind::Contact => limit,
        EntityKind::Company => limit.saturating_mul(2),
    }
}

/// Sort newest first, fetch order breaking ties, cap each contact at
/// `per_contact` items and the whole result at `limit`.
pub fn rank(mut gathered: Vec<Gathered>, limit: usize, per_contact: usize) -> Vec<EngagementItem> {
    gathered.sort_by(|a, b| {
        b.item
            .timestamp
            .cmp(&a.item.timestamp)
            .then_with(|| a.order.cmp(&b.order))
    });

    let mut taken: HashMap<usize, usize> = HashMap::new();
    gathered
        .into_iter()
        .filter(|g| {
            let count = taken.entry(g.order.0).or_default();
            *count += 1;
            *count <= per_contact
        })
        .take(limit)
        .map(|g| g.item)
        .collect()
}

pub struct Aggregator {
    source: Arc<dyn CrmSource>,
    clock: Arc<dyn Clock>,
    permits: Arc<Semaphore>,
    fetch_concurrency: usize,
    company_contact_limit: usize,
}

impl Aggregator {
    pub fn new(
        source: Arc<dyn CrmSource>,
        clock: Arc<dyn Clock>,
        max_concurrent_requests: usize,
        company_contact_limit: usize,
    ) -> Self {
        let max_concurrent_requests = max_concurrent_requests.max(1);
        Self {
            source,
            clock,
            permits: Arc::new(Semaphore::new(max_concurrent_requests)),
            fetch_concurrency: max_concurrent_requests,
            company_contact_limit,
        }
    }

    /// Every outbound CRM request holds one of these.
    async fn permit(&self) -> Option<SemaphorePermit<'_>> {
        self.permits.acquire().await.ok()
    }

    /// Gather every engagement for `entity` into `sink`.
    ///
    /// Only a missing credential is returned as an error. Rate-limited kinds
    /// and company contact lists are skipped and noted on the sink; per-record
    /// failures are dropped.
    pub async fn gather(
        &self,
        entity: &EntityRef,
        sink: &GatherSink,
    ) -> Result<(), EngagementError> {
        match entity.kind {
            EntityKind::Contact => self.gather_contact(0, &entity.id, None, sink).await,
            EntityKind::Company => self.gather_company(&entity.id, sink).await,
        }
    }

    async fn gather_contact(
        &self,
        contact_idx: usize,
        contact_id: &str,
        contact_name: Option<&str>,
        sink: &GatherSink,
    ) -> Result<(), EngagementError> {
        let contact = EntityRef::contact(contact_id);
        let per_kind = EngagementKind::ALL
            .iter()
            .enumerate()
            .map(|(kind_idx, &kind)| {
                self.gather_kind(&contact, kind, contact_idx, kind_idx, contact_name, sink)
            });

        join_all(per_kind).await.into_iter().collect::<Result<Vec<_>, _>>()?;
        Ok(())
    }

    async fn gather_kind(
        &self,
        contact: &EntityRef,
        kind: EngagementKind,
        contact_idx: usize,
        kind_idx: usize,
        contact_name: Option<&str>,
        sink: &GatherSink,
    ) -> Result<(), EngagementError> {
        let resolved = {
            let _permit = self.permit().await;
            resolve_associations(self.source.as_ref(), contact, kind).await
        };
        let ids = match resolved {
            Ok(ids) => ids,
            Err(EngagementError::RateLimited { retry_after_secs }) => {
                log::warn!(
                    "Engagements: rate limited searching {} for contact {} - skipping this kind",
                    kind.object_type(),
                    contact.id
                );
                sink.note_rate_limited(retry_after_secs);
                return Ok(());
            }
            Err(e) => return Err(e),
        };
        if ids.is_empty() {
            return Ok(());
        }

        let mut fetched = stream::iter(ids.iter().enumerate())
            .map(|(item_idx, id)| async move {
                let _permit = self.permit().await;
                let item = fetch_engagement(self.source.as_ref(), kind, id, self.clock.now()).await;
                (item_idx, item)
            })
            .buffer_unordered(self.fetch_concurrency);

        while let Some((item_idx, item)) = fetched.next().await {
            if let Some(item) = item {
                sink.push(Gathered {
                    order: (contact_idx, kind_idx, item_idx),
                    item: item.with_contact_name(contact_name),
                });
            }
        }
        Ok(())
    }

    async fn gather_company(
        &self,
        company_id: &str,
        sink: &GatherSink,
    ) -> Result<(), EngagementError> {
        let contact_ids = {
            let _permit = self.permit().await;
            match self.source.company_contact_ids(company_id).await {
                Ok(ids) => ids,
                Err(HubSpotError::NoAccessToken) => {
                    return Err(HubSpotError::NoAccessToken.into())
                }
                Err(HubSpotError::RateLimited { retry_after_secs }) => {
                    log::warn!(
                        "Engagements: rate limited listing contacts for company {}",
                        company_id
                    );
                    sink.note_rate_limited(retry_after_secs);
                    return Ok(());
                }
                Err(e) => {
                    log::error!(
                        "Engagements: failed to fetch contacts for company {}: {}",
                        company_id,
                        e
                    );
                    return Ok(());
                }
            }
        };

        let contact_ids: Vec<String> = contact_ids
            .into_iter()
            .take(self.company_contact_limit)
            .collect();
        log::debug!(
            "Engagements: company {} fanning out across {} contacts",
            company_id,
            contact_ids.len()
        );

        let per_contact = contact_ids.iter().enumerate().map(|(idx, contact_id)| async move {
            let name = self.contact_name(contact_id).await;
            self.gather_contact(idx, contact_id, name.as_deref(), sink).await
        });

        join_all(per_contact).await.into_iter().collect::<Result<Vec<_>, _>>()?;
        Ok(())
    }

    async fn contact_name(&self, contact_id: &str) -> Option<String> {
        let _permit = self.permit().await;
        match self.source.contact_name(contact_id).await {
            Ok(name) => Some(name),
            Err(e) => {
                log::warn!("Engagements: no display name for contact {}: {}", contact_id, e);
                None
            }
        }
    }
}
