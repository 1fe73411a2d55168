//! Per-lookup orchestration: cache, gather, rank, summarize, store.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::{timeout_at, Instant};

use super::aggregate::{per_contact_limit, rank, Aggregator, GatherSink};
use super::cache::{CacheStatus, EngagementCache};
use super::clock::{Clock, SystemClock};
use super::context::build_context_from_engagements;
use super::source::CrmSource;
use super::summary::{
    align_summaries, summarize_engagements, summarizer_from_config, SummaryError, SummaryProvider,
};
use super::{EngagementsConfig, MAX_PIPELINE_TIMEOUT_SECS};
use crate::error::EngagementError;
use crate::hubspot::client::HubSpotClient;
use crate::types::{Config, EngagementsPayload, EntityRef};

const MAX_PIPELINE_TIMEOUT: Duration = Duration::from_secs(MAX_PIPELINE_TIMEOUT_SECS);

pub struct EngagementPipeline {
    aggregator: Aggregator,
    summarizer: Arc<dyn SummaryProvider>,
    cache: EngagementCache,
    limit: usize,
    timeout: Duration,
}

impl EngagementPipeline {
    pub fn new(
        source: Arc<dyn CrmSource>,
        summarizer: Arc<dyn SummaryProvider>,
        clock: Arc<dyn Clock>,
        config: &EngagementsConfig,
    ) -> Self {
        Self {
            aggregator: Aggregator::new(
                source,
                clock.clone(),
                config.max_concurrent_requests,
                config.company_contact_limit,
            ),
            summarizer,
            cache: EngagementCache::new(config.cache_ttl(), clock),
            limit: config.effective_limit(),
            timeout: config.pipeline_timeout(),
        }
    }

    /// Production wiring: HubSpot source, configured summarizer, wall clock.
    ///
    /// Fails with `Configuration` when no HubSpot token is available.
    pub fn from_config(config: &Config) -> Result<Self, EngagementError> {
        let source = HubSpotClient::new(&config.hubspot)?;
        log::info!(
            "Engagements: pipeline ready (limit {}, ttl {}m)",
            config.engagements.effective_limit(),
            config.engagements.cache_ttl_minutes
        );
        Ok(Self::new(
            Arc::new(source),
            summarizer_from_config(&config.summary),
            Arc::new(SystemClock),
            &config.engagements,
        ))
    }

    pub fn cache(&self) -> &EngagementCache {
        &self.cache
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Recent engagements for a contact or company, with summaries.
    ///
    /// Served from cache while fresh. Concurrent cold lookups for the same
    /// entity share one computation.
    pub async fn engagements_for(
        &self,
        entity: &EntityRef,
    ) -> Result<EngagementsPayload, EngagementError> {
        if entity.id.trim().is_empty() {
            return Err(EngagementError::InvalidRequest(format!(
                "{} id is required",
                entity.kind
            )));
        }

        let key = entity.cache_key();
        let (entry, status) = self
            .cache
            .get_or_compute(&key, || self.compute(entity, &key))
            .await?;

        match status {
            CacheStatus::Hit => log::debug!("Engagements: {} HIT -> SERVED", key),
            CacheStatus::Coalesced => {
                log::debug!("Engagements: {} joined in-flight lookup -> SERVED", key)
            }
            CacheStatus::Miss => log::debug!("Engagements: {} CACHED -> SERVED", key),
        }
        Ok(entry.payload())
    }

    /// Chat-context text for an entity's engagement history.
    pub async fn context_for(&self, entity: &EntityRef) -> Result<String, EngagementError> {
        let payload = self.engagements_for(entity).await?;
        Ok(build_context_from_engagements(&payload.context_summary))
    }

    async fn compute(
        &self,
        entity: &EntityRef,
        key: &str,
    ) -> Result<EngagementsPayload, EngagementError> {
        let started = Instant::now();
        let deadline = started
            .checked_add(self.timeout)
            .unwrap_or_else(|| started + MAX_PIPELINE_TIMEOUT);
        log::debug!("Engagements: {} MISS -> RESOLVING", key);

        let sink = GatherSink::default();
        match timeout_at(deadline, self.aggregator.gather(entity, &sink)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                log::warn!("Engagements: lookup for {} failed: {}", key, e);
                return Err(e);
            }
            Err(_) => log::warn!(
                "Engagements: gathering for {} exceeded {:?}, serving {} items gathered so far",
                key,
                self.timeout,
                sink.len()
            ),
        }

        // Rate limited with nothing to show is not an empty history.
        if sink.is_empty() {
            if let Some(retry_after_secs) = sink.rate_limited() {
                log::warn!("Engagements: {} rate limited with nothing gathered", key);
                return Err(EngagementError::RateLimited { retry_after_secs });
            }
        }

        log::debug!("Engagements: {} NORMALIZING -> RANKING ({} items)", key, sink.len());
        let engagements = rank(
            sink.take(),
            self.limit,
            per_contact_limit(entity.kind, self.limit),
        );

        log::debug!("Engagements: {} RANKING -> SUMMARIZING", key);
        let outcome = timeout_at(
            deadline,
            summarize_engagements(self.summarizer.as_ref(), &engagements),
        )
        .await
        .unwrap_or(Err(SummaryError::Timeout));

        match &outcome {
            Ok(_) => {}
            Err(SummaryError::Disabled) => {}
            Err(e) => log::warn!("Engagements: summary unavailable for {}: {}", key, e),
        }

        let (display_summaries, context_summary) = align_summaries(outcome, engagements.len());
        log::debug!("Engagements: {} SUMMARIZING -> CACHED", key);

        Ok(EngagementsPayload {
            engagements,
            display_summaries,
            context_summary,
        })
    }
}
