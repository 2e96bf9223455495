//! Normalized entity cache
//!
//! One canonical copy of every entity the session has seen, keyed by kind
//! and id. Lineups and the playback queue hold ids only and resolve them
//! here.
//!
//! Writers only add or merge. Removal is a separate, explicit call that no
//! fetch path makes, so one lineup's fetch can never evict an entity another
//! lineup is reading.

use crate::models::{Entity, Kind};
use bridge_traits::EntityId;
use parking_lot::RwLock;
use serde_json::Value;
use std::collections::HashMap;
use tracing::trace;

/// How [`NormalizedEntityCache::add`] treats ids that are already cached.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AddOptions {
    /// Replace the cached blob instead of merging into it
    pub replace: bool,
    /// Leave cached entries untouched
    pub skip_if_exists: bool,
}

impl AddOptions {
    pub fn merge() -> Self {
        Self::default()
    }

    pub fn replace() -> Self {
        Self {
            replace: true,
            skip_if_exists: false,
        }
    }

    pub fn skip_if_exists() -> Self {
        Self {
            replace: false,
            skip_if_exists: true,
        }
    }
}

/// Shallow merge: top-level fields of `incoming` win.
fn merge_into(existing: &mut Value, incoming: Value) {
    match (existing, incoming) {
        (Value::Object(current), Value::Object(fields)) => {
            for (key, value) in fields {
                current.insert(key, value);
            }
        }
        (slot, incoming) => *slot = incoming,
    }
}

#[derive(Debug, Default)]
pub struct NormalizedEntityCache {
    entries: RwLock<HashMap<Kind, HashMap<EntityId, Entity>>>,
}

impl NormalizedEntityCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or merge `entities` under `kind`. Returns how many entries were
    /// written.
    pub fn add<I>(&self, kind: Kind, entities: I, options: AddOptions) -> usize
    where
        I: IntoIterator<Item = Entity>,
    {
        let mut entries = self.entries.write();
        let bucket = entries.entry(kind).or_default();
        let mut written = 0;

        for mut entity in entities {
            entity.kind = kind;
            match bucket.get_mut(&entity.id) {
                Some(_) if options.skip_if_exists => continue,
                Some(existing) if !options.replace => merge_into(&mut existing.data, entity.data),
                _ => {
                    bucket.insert(entity.id, entity);
                }
            }
            written += 1;
        }

        trace!(%kind, written, "Cache add");
        written
    }

    /// Cached entities for `ids`; missing ids are simply absent.
    pub fn get(&self, kind: Kind, ids: &[EntityId]) -> HashMap<EntityId, Entity> {
        let entries = self.entries.read();
        let Some(bucket) = entries.get(&kind) else {
            return HashMap::new();
        };

        ids.iter()
            .filter_map(|id| bucket.get(id).map(|entity| (*id, entity.clone())))
            .collect()
    }

    pub fn get_one(&self, kind: Kind, id: EntityId) -> Option<Entity> {
        self.entries
            .read()
            .get(&kind)
            .and_then(|bucket| bucket.get(&id))
            .cloned()
    }

    pub fn contains(&self, kind: Kind, id: EntityId) -> bool {
        self.entries
            .read()
            .get(&kind)
            .is_some_and(|bucket| bucket.contains_key(&id))
    }

    pub fn len(&self, kind: Kind) -> usize {
        self.entries.read().get(&kind).map_or(0, HashMap::len)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().values().all(HashMap::is_empty)
    }

    /// Explicitly drop entries. Returns how many were present.
    pub fn remove(&self, kind: Kind, ids: &[EntityId]) -> usize {
        let mut entries = self.entries.write();
        let Some(bucket) = entries.get_mut(&kind) else {
            return 0;
        };

        ids.iter().filter(|id| bucket.remove(id).is_some()).count()
    }

    /// Drop everything (session teardown).
    pub fn clear(&self) {
        self.entries.write().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn track(id: EntityId, data: Value) -> Entity {
        Entity::new(Kind::Tracks, id, data)
    }

    #[test]
    fn test_add_merges_by_default() {
        let cache = NormalizedEntityCache::new();
        cache.add(
            Kind::Tracks,
            vec![track(5, json!({"track_id": 5, "title": "a", "plays": 1}))],
            AddOptions::merge(),
        );
        cache.add(
            Kind::Tracks,
            vec![track(5, json!({"track_id": 5, "plays": 2}))],
            AddOptions::merge(),
        );

        let cached = cache.get_one(Kind::Tracks, 5).unwrap();
        assert_eq!(cached.data["title"], "a");
        assert_eq!(cached.data["plays"], 2);
    }

    #[test]
    fn test_replace_drops_old_fields() {
        let cache = NormalizedEntityCache::new();
        cache.add(Kind::Tracks, vec![track(5, json!({"title": "a"}))], AddOptions::merge());
        cache.add(Kind::Tracks, vec![track(5, json!({"plays": 2}))], AddOptions::replace());

        let cached = cache.get_one(Kind::Tracks, 5).unwrap();
        assert!(cached.data.get("title").is_none());
    }

    #[test]
    fn test_skip_if_exists_keeps_first_writer() {
        let cache = NormalizedEntityCache::new();

        let first = cache.add(
            Kind::Tracks,
            vec![track(5, json!({"title": "first", "genre": "jazz"}))],
            AddOptions::skip_if_exists(),
        );
        let second = cache.add(
            Kind::Tracks,
            vec![track(5, json!({"title": "second"}))],
            AddOptions::skip_if_exists(),
        );

        assert_eq!((first, second), (1, 0));
        let cached = cache.get_one(Kind::Tracks, 5).unwrap();
        assert_eq!(cached.data["title"], "first");
        assert_eq!(cached.data["genre"], "jazz");
    }

    #[test]
    fn test_get_omits_missing_ids() {
        let cache = NormalizedEntityCache::new();
        cache.add(Kind::Tracks, vec![track(1, json!({}))], AddOptions::merge());

        let found = cache.get(Kind::Tracks, &[1, 2]);
        assert_eq!(found.len(), 1);
        assert!(found.contains_key(&1));
        assert!(cache.get(Kind::Users, &[1]).is_empty());
    }

    #[test]
    fn test_kinds_are_separate_namespaces() {
        let cache = NormalizedEntityCache::new();
        cache.add(Kind::Tracks, vec![track(1, json!({}))], AddOptions::merge());

        assert!(cache.contains(Kind::Tracks, 1));
        assert!(!cache.contains(Kind::Collections, 1));
        assert_eq!(cache.len(Kind::Tracks), 1);
    }

    #[test]
    fn test_explicit_remove_and_clear() {
        let cache = NormalizedEntityCache::new();
        cache.add(
            Kind::Tracks,
            vec![track(1, json!({})), track(2, json!({}))],
            AddOptions::merge(),
        );

        assert_eq!(cache.remove(Kind::Tracks, &[1, 3]), 1);
        assert_eq!(cache.len(Kind::Tracks), 1);

        cache.clear();
        assert!(cache.is_empty());
    }
}
