//! CRM access seam plus the fail-soft resolver and fetcher built on it.
//!
//! `CrmSource` is what the aggregator talks to; `HubSpotClient` is the
//! production implementation and tests substitute in-memory fakes.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::{Map, Value};

use super::normalize::normalize_engagement;
use crate::error::EngagementError;
use crate::hubspot::client::HubSpotError;
use crate::hubspot::properties::EngagementProperties;
use crate::types::{EngagementItem, EngagementKind, EntityRef};

#[async_trait]
pub trait CrmSource: Send + Sync {
    /// Ids of `kind` records associated with the entity.
    async fn associated_ids(
        &self,
        entity: &EntityRef,
        kind: EngagementKind,
    ) -> Result<Vec<String>, HubSpotError>;

    /// Raw property bag of one engagement record.
    async fn engagement_properties(
        &self,
        kind: EngagementKind,
        id: &str,
    ) -> Result<Map<String, Value>, HubSpotError>;

    /// Contact ids associated with a company.
    async fn company_contact_ids(&self, company_id: &str) -> Result<Vec<String>, HubSpotError>;

    /// Display name for a contact.
    async fn contact_name(&self, contact_id: &str) -> Result<String, HubSpotError>;
}

/// Resolve associated record ids for one kind.
///
/// Missing scopes and ordinary upstream failures degrade to an empty set for
/// this kind only. A rate limit or missing credential is returned to the
/// caller, which decides between skipping the kind and failing the lookup.
pub async fn resolve_associations(
    source: &dyn CrmSource,
    entity: &EntityRef,
    kind: EngagementKind,
) -> Result<Vec<String>, EngagementError> {
    match source.associated_ids(entity, kind).await {
        Ok(ids) => Ok(ids),
        Err(HubSpotError::MissingScopes(msg)) => {
            log::warn!(
                "Engagements: missing HubSpot scope for {} - skipping this kind ({})",
                kind.object_type(),
                msg
            );
            Ok(Vec::new())
        }
        Err(e @ (HubSpotError::RateLimited { .. } | HubSpotError::NoAccessToken)) => Err(e.into()),
        Err(e) => {
            log::error!(
                "Engagements: failed to fetch {} associations for {} {}: {}",
                kind.object_type(),
                entity.kind,
                entity.id,
                e
            );
            Ok(Vec::new())
        }
    }
}

/// Fetch and normalize one record. Any failure drops the record.
pub async fn fetch_engagement(
    source: &dyn CrmSource,
    kind: EngagementKind,
    id: &str,
    now: DateTime<Utc>,
) -> Option<EngagementItem> {
    let bag = match source.engagement_properties(kind, id).await {
        Ok(bag) => bag,
        Err(e) => {
            log::error!(
                "Engagements: failed to fetch {} details for id {}: {}",
                kind.object_type(),
                id,
                e
            );
            return None;
        }
    };

    match EngagementProperties::from_bag(kind, bag) {
        Ok(props) => Some(normalize_engagement(id, &props, now)),
        Err(e) => {
            log::error!("Engagements: invalid {} properties for id {}: {}", kind, id, e);
            None
        }
    }
}
