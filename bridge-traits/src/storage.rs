//! Local Asset Store Abstraction
//!
//! The on-device download subsystem is owned by the host. The engine lists
//! what is available offline, asks for (re)downloads and stamps verification
//! times; record durability is the store's job.

use crate::content::{EntityId, RawEntity};
use crate::error::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Collection id used for reasons that come from the user's favorites.
pub const FAVORITES_COLLECTION: &str = "favorites";

/// Why a track is kept on device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DownloadReasonKind {
    /// Downloaded as part of a collection (or the favorites pseudo-collection)
    Collection,
    /// Downloaded on its own
    Track,
}

/// One reason a track is on device.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DownloadReason {
    pub collection_id: String,
    #[serde(rename = "type")]
    pub kind: DownloadReasonKind,
}

impl DownloadReason {
    pub fn favorites() -> Self {
        Self {
            collection_id: FAVORITES_COLLECTION.to_string(),
            kind: DownloadReasonKind::Collection,
        }
    }

    pub fn collection(collection_id: impl Into<String>) -> Self {
        Self {
            collection_id: collection_id.into(),
            kind: DownloadReasonKind::Collection,
        }
    }

    pub fn is_favorites(&self) -> bool {
        self.collection_id == FAVORITES_COLLECTION
    }
}

/// Bookkeeping for one downloaded track.
///
/// Created when the download is queued. `verified_at` is refreshed by
/// staleness revalidation. The record is dropped once its last reason goes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OfflineDownloadRecord {
    pub track_id: EntityId,
    pub reasons: Vec<DownloadReason>,
    pub favorite_created_at: Option<DateTime<Utc>>,
    pub verified_at: Option<DateTime<Utc>>,
}

impl OfflineDownloadRecord {
    pub fn new(track_id: EntityId, reason: DownloadReason) -> Self {
        Self {
            track_id,
            reasons: vec![reason],
            favorite_created_at: None,
            verified_at: None,
        }
    }

    pub fn with_favorite_created_at(mut self, at: DateTime<Utc>) -> Self {
        self.favorite_created_at = Some(at);
        self
    }

    /// Adds a reason; duplicates are ignored.
    pub fn add_reason(&mut self, reason: DownloadReason) {
        if !self.reasons.contains(&reason) {
            self.reasons.push(reason);
        }
    }

    /// Removes a reason and returns `true` when no reason is left, meaning the
    /// record (and the local copy) should be removed.
    pub fn remove_reason(&mut self, reason: &DownloadReason) -> bool {
        self.reasons.retain(|r| r != reason);
        self.reasons.is_empty()
    }

    pub fn has_reason_in(&self, collection_id: &str) -> bool {
        self.reasons.iter().any(|r| r.collection_id == collection_id)
    }
}

/// A downloaded track together with the metadata stored next to it.
#[derive(Debug, Clone, PartialEq)]
pub struct LocalEntry {
    pub record: OfflineDownloadRecord,
    /// Track metadata as of download time (carries `updated_at`)
    pub metadata: RawEntity,
}

/// Predicate used to select downloaded entries.
pub type DownloadPredicate = Arc<dyn Fn(&OfflineDownloadRecord) -> bool + Send + Sync>;

/// Local asset store trait
///
/// Implemented by the host's download subsystem. The engine never downloads
/// or deletes files itself; it only issues requests.
#[async_trait::async_trait]
pub trait LocalAssetStore: Send + Sync {
    /// List downloaded tracks whose record matches `predicate`.
    async fn list_downloaded(&self, predicate: DownloadPredicate) -> Result<Vec<LocalEntry>>;

    /// Look up a single downloaded track.
    async fn get_local_track(&self, track_id: EntityId) -> Result<Option<LocalEntry>>;

    /// Queue a first download.
    async fn request_download(&self, track_id: EntityId) -> Result<()>;

    /// Queue a replacement download for a stale local copy.
    async fn redownload(&self, track_id: EntityId) -> Result<()>;

    /// Remove the local copy and its record.
    async fn remove_download(&self, track_id: EntityId) -> Result<()>;

    /// Persist a new `verified_at` stamp for the record.
    async fn mark_verified(&self, track_id: EntityId, verified_at: DateTime<Utc>) -> Result<()>;
}
