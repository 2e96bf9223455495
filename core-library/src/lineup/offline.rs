//! Offline lineup source
//!
//! While the network is unreachable a lineup with an [`OfflineSource`] is
//! served from the tracks already on device instead of the content API.

use crate::error::Result;
use crate::models::{Entity, Kind};
use bridge_traits::{
    DownloadPredicate, LocalAssetStore, LocalEntry, OfflineDownloadRecord, FAVORITES_COLLECTION,
};
use chrono::{DateTime, Utc};
use std::cmp::Reverse;
use std::sync::Arc;
use tracing::debug;

/// Key local entries are sorted by, descending. Equal keys fall back to
/// ascending track id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OfflineSortKey {
    FavoriteCreatedAt,
    VerifiedAt,
    /// A timestamp field of the stored track metadata
    MetadataField(String),
}

impl OfflineSortKey {
    fn extract(&self, entry: &LocalEntry, entity: &Entity) -> Option<DateTime<Utc>> {
        match self {
            OfflineSortKey::FavoriteCreatedAt => entry.record.favorite_created_at,
            OfflineSortKey::VerifiedAt => entry.record.verified_at,
            OfflineSortKey::MetadataField(field) => entity.timestamp(field),
        }
    }
}

#[derive(Clone)]
pub struct OfflineSource {
    store: Arc<dyn LocalAssetStore>,
    predicate: DownloadPredicate,
    sort_key: OfflineSortKey,
}

impl OfflineSource {
    pub fn new(
        store: Arc<dyn LocalAssetStore>,
        predicate: DownloadPredicate,
        sort_key: OfflineSortKey,
    ) -> Self {
        Self {
            store,
            predicate,
            sort_key,
        }
    }

    /// Downloaded favorites, most recently favorited first.
    pub fn favorites(store: Arc<dyn LocalAssetStore>) -> Self {
        Self::new(
            store,
            Arc::new(|record: &OfflineDownloadRecord| record.has_reason_in(FAVORITES_COLLECTION)),
            OfflineSortKey::FavoriteCreatedAt,
        )
    }

    /// Tracks downloaded for one collection, newest first.
    pub fn collection(store: Arc<dyn LocalAssetStore>, collection_id: impl Into<String>) -> Self {
        let collection_id = collection_id.into();
        Self::new(
            store,
            Arc::new(move |record: &OfflineDownloadRecord| record.has_reason_in(&collection_id)),
            OfflineSortKey::MetadataField("created_at".to_string()),
        )
    }

    pub fn sort_key(&self) -> &OfflineSortKey {
        &self.sort_key
    }

    /// All matching local tracks, sorted.
    pub async fn load(&self) -> Result<Vec<Entity>> {
        let local = self.store.list_downloaded(Arc::clone(&self.predicate)).await?;

        let mut keyed: Vec<(Option<DateTime<Utc>>, Entity)> = local
            .into_iter()
            .map(|entry| {
                let entity = Entity::new(Kind::Tracks, entry.record.track_id, entry.metadata.clone());
                (self.sort_key.extract(&entry, &entity), entity)
            })
            .collect();

        keyed.sort_by_key(|(key, entity)| (Reverse(*key), entity.id));
        debug!(count = keyed.len(), sort_key = ?self.sort_key, "Loaded offline entries");

        Ok(keyed.into_iter().map(|(_, entity)| entity).collect())
    }
}

impl std::fmt::Debug for OfflineSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OfflineSource")
            .field("sort_key", &self.sort_key)
            .finish()
    }
}
