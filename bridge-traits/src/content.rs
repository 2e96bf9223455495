//! Content API Abstraction
//!
//! The engine never speaks the discovery-node wire protocol itself. Hosts
//! inject a [`ContentApiClient`] that returns raw entity blobs as JSON values;
//! the engine only reads ids, kinds, timestamps and deletion flags from them.

use crate::error::Result;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Numeric identifier of a track, collection or user.
pub type EntityId = u64;

/// Raw entity blob as returned by the content API.
///
/// Full entities carry `track_id`, `playlist_id` or `user_id`. A page may also
/// contain reference stubs of the form `{"kind": "track", "id": 7}` that the
/// lineup controller hydrates by kind. `null` marks an item the server could
/// not resolve.
pub type RawEntity = Value;

/// A page request against one content endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntriesQuery {
    /// Endpoint name understood by the host client (e.g. `"feed"`, `"trending"`)
    pub endpoint: String,
    pub offset: usize,
    pub limit: usize,
    /// Endpoint-specific parameters (user id, time range, search text, ...)
    pub payload: Value,
}

impl EntriesQuery {
    pub fn new(endpoint: impl Into<String>, offset: usize, limit: usize, payload: Value) -> Self {
        Self {
            endpoint: endpoint.into(),
            offset,
            limit,
            payload,
        }
    }
}

/// Content API client trait
///
/// # Errors
///
/// Implementations map transport failures to `BridgeError::Network`,
/// missing resources to `BridgeError::NotFound` and permission failures to
/// `BridgeError::Unauthorized`. Retry and timeout policy belong to the
/// implementation.
#[async_trait::async_trait]
pub trait ContentApiClient: Send + Sync {
    /// Fetch one page of raw entities.
    async fn get_entries(&self, query: &EntriesQuery) -> Result<Vec<RawEntity>>;

    /// Fetch full entities of one kind by id (`kind` is `"track"`,
    /// `"collection"` or `"user"`). Missing ids are simply absent.
    async fn get_by_ids(&self, kind: &str, ids: &[EntityId]) -> Result<Vec<RawEntity>>;

    /// Fetch the latest server metadata for a single track.
    ///
    /// Returns `Ok(None)` when the server no longer knows the track.
    async fn get_track(&self, track_id: EntityId) -> Result<Option<RawEntity>>;
}
