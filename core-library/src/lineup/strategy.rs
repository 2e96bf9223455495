//! Per-lineup fetch strategy
//!
//! Every page type (feed, trending, search, favorites, artist tracks) shares
//! one [`LineupController`](super::LineupController); what differs is injected
//! as a [`LineupStrategy`].

use crate::cache::{AddOptions, NormalizedEntityCache};
use crate::error::{LibraryError, Result};
use crate::models::{Entity, Kind};
use async_trait::async_trait;
use bridge_traits::{ContentApiClient, EntityId, EntriesQuery, RawEntity};
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::sync::Arc;

/// Entities that survived processing, in page order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProcessedPage {
    pub entities: Vec<Entity>,
    pub deleted: usize,
}

/// Page-specific behavior injected into a lineup controller.
#[async_trait]
pub trait LineupStrategy: Send + Sync {
    /// Fetch one raw page.
    async fn get_entries(
        &self,
        offset: usize,
        limit: usize,
        payload: &Value,
    ) -> Result<Vec<RawEntity>>;

    /// Hydrate `{"kind", "id"}` references of one kind. Pages that never
    /// contain references can keep the default.
    async fn fetch_by_kind(&self, kind: Kind, _ids: &[EntityId]) -> Result<Vec<RawEntity>> {
        Err(LibraryError::InvalidEntity(format!(
            "strategy cannot hydrate {} references",
            kind
        )))
    }

    /// Filter the page and write it to the cache.
    fn process(
        &self,
        entities: Vec<Entity>,
        cache: &NormalizedEntityCache,
        remove_deleted: bool,
    ) -> ProcessedPage {
        filter_and_cache(entities, cache, remove_deleted)
    }

    /// Timestamp retained on the lineup entry.
    fn keep_metadata(&self, entity: &Entity) -> Option<DateTime<Utc>> {
        entity.timestamp("activity_timestamp")
    }

    /// Optional grouping key retained on the lineup entry.
    fn source_key(&self, _entity: &Entity) -> Option<String> {
        None
    }
}

fn owner_deactivated(entity: &Entity, cache: &NormalizedEntityCache) -> bool {
    if entity.embedded_user().is_some_and(|user| user.is_deactivated()) {
        return true;
    }

    entity
        .owner_id()
        .and_then(|owner| cache.get_one(Kind::Users, owner))
        .is_some_and(|user| user.is_deactivated())
}

fn marked_deleted_in_cache(entity: &Entity, cache: &NormalizedEntityCache) -> bool {
    cache
        .get_one(entity.kind, entity.id)
        .is_some_and(|cached| cached.flag("_marked_deleted"))
}

/// Default processing: cache embedded users, drop deleted entities and
/// entities of deactivated owners when asked, then merge the rest into the
/// cache.
pub fn filter_and_cache(
    entities: Vec<Entity>,
    cache: &NormalizedEntityCache,
    remove_deleted: bool,
) -> ProcessedPage {
    let users: Vec<Entity> = entities.iter().filter_map(Entity::embedded_user).collect();
    if !users.is_empty() {
        cache.add(Kind::Users, users, AddOptions::merge());
    }

    let total = entities.len();
    let kept: Vec<Entity> = entities
        .into_iter()
        .filter(|entity| {
            !remove_deleted
                || !(entity.is_deleted()
                    || owner_deactivated(entity, cache)
                    || marked_deleted_in_cache(entity, cache))
        })
        .collect();

    for kind in Kind::ALL {
        let batch: Vec<Entity> = kept.iter().filter(|e| e.kind == kind).cloned().collect();
        if !batch.is_empty() {
            cache.add(kind, batch, AddOptions::merge());
        }
    }

    ProcessedPage {
        deleted: total - kept.len(),
        entities: kept,
    }
}

/// Strategy that pages through one content API endpoint.
pub struct EndpointStrategy {
    client: Arc<dyn ContentApiClient>,
    endpoint: String,
    source_key_field: Option<String>,
}

impl EndpointStrategy {
    pub fn new(client: Arc<dyn ContentApiClient>, endpoint: impl Into<String>) -> Self {
        Self {
            client,
            endpoint: endpoint.into(),
            source_key_field: None,
        }
    }

    /// Retain the given entity field as each entry's source key.
    pub fn with_source_key_field(mut self, field: impl Into<String>) -> Self {
        self.source_key_field = Some(field.into());
        self
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl LineupStrategy for EndpointStrategy {
    async fn get_entries(
        &self,
        offset: usize,
        limit: usize,
        payload: &Value,
    ) -> Result<Vec<RawEntity>> {
        let query = EntriesQuery::new(self.endpoint.clone(), offset, limit, payload.clone());
        Ok(self.client.get_entries(&query).await?)
    }

    async fn fetch_by_kind(&self, kind: Kind, ids: &[EntityId]) -> Result<Vec<RawEntity>> {
        Ok(self.client.get_by_ids(kind.api_name(), ids).await?)
    }

    fn source_key(&self, entity: &Entity) -> Option<String> {
        let field = self.source_key_field.as_deref()?;
        match entity.field(field)? {
            Value::String(text) => Some(text.clone()),
            Value::Null => None,
            other => Some(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn entity(raw: Value) -> Entity {
        Entity::from_raw(raw).unwrap()
    }

    #[test]
    fn test_filter_and_cache_drops_deleted() {
        let cache = NormalizedEntityCache::new();
        let page = vec![
            entity(json!({"track_id": 1})),
            entity(json!({"track_id": 2, "is_delete": true})),
            entity(json!({"playlist_id": 3})),
        ];

        let processed = filter_and_cache(page, &cache, true);

        assert_eq!(processed.deleted, 1);
        assert_eq!(processed.entities.len(), 2);
        assert!(cache.contains(Kind::Tracks, 1));
        assert!(!cache.contains(Kind::Tracks, 2));
        assert!(cache.contains(Kind::Collections, 3));
    }

    #[test]
    fn test_deactivated_owner_is_removed() {
        let cache = NormalizedEntityCache::new();
        cache.add(
            Kind::Users,
            vec![Entity::new(Kind::Users, 9, json!({"user_id": 9, "is_deactivated": true}))],
            AddOptions::merge(),
        );

        let processed = filter_and_cache(
            vec![
                entity(json!({"track_id": 1, "owner_id": 9})),
                entity(json!({"playlist_id": 2, "playlist_owner_id": 4})),
            ],
            &cache,
            true,
        );

        assert_eq!(processed.deleted, 1);
        assert_eq!(processed.entities[0].id, 2);
    }

    #[test]
    fn test_keep_deleted_when_not_removing() {
        let cache = NormalizedEntityCache::new();
        let processed =
            filter_and_cache(vec![entity(json!({"track_id": 2, "is_delete": true}))], &cache, false);

        assert_eq!(processed.deleted, 0);
        assert!(cache.contains(Kind::Tracks, 2));
    }

    #[test]
    fn test_embedded_users_are_cached() {
        let cache = NormalizedEntityCache::new();
        filter_and_cache(
            vec![entity(json!({"track_id": 1, "user": {"user_id": 7, "handle": "dj"}}))],
            &cache,
            true,
        );

        assert_eq!(cache.get_one(Kind::Users, 7).unwrap().data["handle"], "dj");
    }
}
