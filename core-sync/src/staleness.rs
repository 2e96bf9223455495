//! # Staleness Revalidator
//!
//! One task per downloaded track, tracked in a map keyed by track id. A
//! second `request` for a track that already has a task coalesces onto it.
//!
//! ## Task lifecycle
//!
//! ```text
//! request ──> wait for reachability ──> fetch local + server metadata ──> decide
//!                  ^                              │
//!                  └──── requeue (delay) <── reachability lost
//!
//! cancel / remove_download / shutdown ──> Cancelled (from any state)
//! ```
//!
//! Only the metadata fetch races reachability loss. Once both copies are in
//! hand the decision (and its single side effect) runs to completion, so a
//! stale track is redownloaded exactly once. A cancellation that lands while
//! the side effect is pending still reports `Cancelled`.
//!
//! A cancelled task keeps its map entry until it exits; a `request` for the
//! same track waits for it, so there is never more than one task per track.

use crate::error::{Result, SyncError};
use bridge_traits::{Clock, ContentApiClient, EntityId, LocalAssetStore, LocalEntry, RawEntity};
use core_async::sync::{CancellationToken, Mutex};
use core_async::time::sleep;
use core_library::models::parse_timestamp;
use core_library::Entity;
use core_runtime::config::StalenessConfig;
use core_runtime::events::{CoreEvent, EventBus, StalenessEvent, StalenessOutcome};
use core_runtime::ReachabilityMonitor;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

/// Identifier of one revalidation task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RevalidationId(Uuid);

impl RevalidationId {
    fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for RevalidationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Active revalidation tracking
#[derive(Clone)]
struct ActiveRevalidation {
    id: RevalidationId,
    cancellation_token: CancellationToken,
    /// Cancelled by the task itself once it has exited
    finished: CancellationToken,
}

impl ActiveRevalidation {
    fn new(cancellation_token: CancellationToken) -> Self {
        Self {
            id: RevalidationId::new(),
            cancellation_token,
            finished: CancellationToken::new(),
        }
    }

    fn is_live(&self) -> bool {
        !self.cancellation_token.is_cancelled()
    }
}

struct Inner {
    client: Arc<dyn ContentApiClient>,
    store: Arc<dyn LocalAssetStore>,
    reachability: ReachabilityMonitor,
    event_bus: EventBus,
    clock: Arc<dyn Clock>,
    config: StalenessConfig,
    active: Mutex<HashMap<EntityId, ActiveRevalidation>>,
    shutdown: CancellationToken,
}

/// Background freshness checks for downloaded tracks.
#[derive(Clone)]
pub struct StalenessRevalidator {
    inner: Arc<Inner>,
}

impl StalenessRevalidator {
    pub fn new(
        client: Arc<dyn ContentApiClient>,
        store: Arc<dyn LocalAssetStore>,
        reachability: ReachabilityMonitor,
        event_bus: EventBus,
        clock: Arc<dyn Clock>,
        config: StalenessConfig,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                client,
                store,
                reachability,
                event_bus,
                clock,
                config,
                active: Mutex::new(HashMap::new()),
                shutdown: CancellationToken::new(),
            }),
        }
    }

    /// Start revalidating `track_id`, or join the task already running for it.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::ShutDown`] after [`shutdown`](Self::shutdown).
    #[instrument(skip(self))]
    pub async fn request(&self, track_id: EntityId) -> Result<RevalidationId> {
        let (id, token, finished) = loop {
            if self.inner.shutdown.is_cancelled() {
                return Err(SyncError::ShutDown);
            }

            let exiting = {
                let mut active = self.inner.active.lock().await;
                match active.get(&track_id) {
                    Some(existing) if existing.is_live() => {
                        debug!(id = %existing.id, "Revalidation already in flight, coalescing");
                        return Ok(existing.id);
                    }
                    Some(existing) => existing.finished.clone(),
                    None => {
                        let active_revalidation =
                            ActiveRevalidation::new(self.inner.shutdown.child_token());
                        active.insert(track_id, active_revalidation.clone());
                        break (
                            active_revalidation.id,
                            active_revalidation.cancellation_token,
                            active_revalidation.finished,
                        );
                    }
                }
            };

            debug!("Waiting for cancelled revalidation to exit");
            exiting.cancelled().await;
        };

        let inner = Arc::clone(&self.inner);
        core_async::spawn(async move {
            let outcome = inner.run(track_id, token).await;

            {
                let mut active = inner.active.lock().await;
                if active.get(&track_id).is_some_and(|entry| entry.id == id) {
                    active.remove(&track_id);
                }
            }

            inner.publish_result(track_id, outcome);
            finished.cancel();
        });

        debug!(%id, "Started revalidation");
        Ok(id)
    }

    /// Cancel the task for `track_id`. Returns `false` when none was running.
    #[instrument(skip(self))]
    pub async fn cancel(&self, track_id: EntityId) -> bool {
        let active = self.inner.active.lock().await;
        match active.get(&track_id) {
            Some(existing) if existing.is_live() => {
                existing.cancellation_token.cancel();
                info!(id = %existing.id, "Cancelled revalidation");
                true
            }
            _ => false,
        }
    }

    /// Cancel any revalidation for `track_id` and ask the store to drop the
    /// download.
    #[instrument(skip(self))]
    pub async fn remove_download(&self, track_id: EntityId) -> Result<()> {
        self.cancel(track_id).await;
        self.inner.store.remove_download(track_id).await?;
        Ok(())
    }

    /// Track ids with a running, uncancelled task, ascending.
    pub async fn in_flight(&self) -> Vec<EntityId> {
        let mut ids: Vec<EntityId> = self
            .inner
            .active
            .lock()
            .await
            .iter()
            .filter(|(_, active)| active.is_live())
            .map(|(track_id, _)| *track_id)
            .collect();
        ids.sort_unstable();
        ids
    }

    pub async fn is_in_flight(&self, track_id: EntityId) -> bool {
        self.inner
            .active
            .lock()
            .await
            .get(&track_id)
            .is_some_and(ActiveRevalidation::is_live)
    }

    /// Cancel every task and refuse new requests. Tasks drop out of the map
    /// as they exit.
    pub async fn shutdown(&self) {
        let cancelled = {
            let active = self.inner.active.lock().await;
            let live = active.values().filter(|active| active.is_live()).count();
            self.inner.shutdown.cancel();
            live
        };
        info!(cancelled, "Staleness revalidator shut down");
    }
}

impl fmt::Debug for StalenessRevalidator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StalenessRevalidator")
            .field("config", &self.inner.config)
            .field("shut_down", &self.inner.shutdown.is_cancelled())
            .finish()
    }
}

/// Local and server copies of one track.
type Snapshot = (Option<LocalEntry>, Option<RawEntity>);

impl Inner {
    async fn run(&self, track_id: EntityId, token: CancellationToken) -> StalenessOutcome {
        loop {
            tokio::select! {
                biased;
                _ = token.cancelled() => return StalenessOutcome::Cancelled,
                _ = self.reachability.wait_for(true) => {}
            }

            let snapshot = tokio::select! {
                biased;
                _ = token.cancelled() => return StalenessOutcome::Cancelled,
                _ = self.reachability.wait_for(false) => None,
                fetched = self.fetch(track_id) => Some(fetched),
            };

            match snapshot {
                Some(Ok(snapshot)) => {
                    if token.is_cancelled() {
                        return StalenessOutcome::Cancelled;
                    }
                    return self.decide(track_id, snapshot, &token).await;
                }
                Some(Err(err)) => {
                    warn!(track_id, error = %err, "Revalidation lookup failed");
                    return StalenessOutcome::Failed {
                        message: err.to_string(),
                    };
                }
                None => {
                    debug!(track_id, "Reachability lost, requeueing revalidation");
                    self.event_bus
                        .emit(CoreEvent::Staleness(StalenessEvent::Requeued { track_id }))
                        .ok();

                    tokio::select! {
                        _ = token.cancelled() => return StalenessOutcome::Cancelled,
                        _ = sleep(self.config.requeue_delay) => {}
                    }
                }
            }
        }
    }

    async fn fetch(&self, track_id: EntityId) -> Result<Snapshot> {
        let local = self.store.get_local_track(track_id).await?;
        let server = self.client.get_track(track_id).await?;
        Ok((local, server))
    }

    async fn decide(
        &self,
        track_id: EntityId,
        (local, server): Snapshot,
        token: &CancellationToken,
    ) -> StalenessOutcome {
        let Some(local) = local else {
            debug!(track_id, "Download removed during revalidation");
            return StalenessOutcome::Cancelled;
        };

        let server = match server.map(Entity::from_raw).transpose() {
            Ok(Some(server)) => server,
            Ok(None) => return unplayable(track_id, "track no longer exists"),
            Err(err) => {
                return StalenessOutcome::Failed {
                    message: err.to_string(),
                }
            }
        };

        if let Some(reason) = unplayable_reason(&server) {
            return unplayable(track_id, reason);
        }

        let local_updated = local.metadata.get("updated_at").and_then(parse_timestamp);
        let stale = matches!(
            (server.updated_at(), local_updated),
            (Some(server_at), Some(local_at)) if server_at > local_at
        );

        if stale {
            info!(track_id, "Local copy is stale, requesting redownload");
            let redownload = self.store.redownload(track_id).await;
            if token.is_cancelled() {
                return StalenessOutcome::Cancelled;
            }
            return match redownload {
                Ok(()) => StalenessOutcome::RedownloadRequested,
                Err(err) => StalenessOutcome::Failed {
                    message: err.to_string(),
                },
            };
        }

        let verified_at = self.clock.now();
        let marked = self.store.mark_verified(track_id, verified_at).await;
        if token.is_cancelled() {
            debug!(track_id, "Revalidation cancelled while stamping");
            return StalenessOutcome::Cancelled;
        }
        match marked {
            Ok(()) => {
                debug!(track_id, %verified_at, "Local copy verified");
                StalenessOutcome::Verified {
                    verified_at: verified_at.to_rfc3339(),
                }
            }
            Err(err) => StalenessOutcome::Failed {
                message: err.to_string(),
            },
        }
    }

    fn publish_result(&self, track_id: EntityId, outcome: StalenessOutcome) {
        self.event_bus
            .emit(CoreEvent::Staleness(StalenessEvent::Result { track_id, outcome }))
            .ok();
    }
}

fn unplayable(track_id: EntityId, reason: &str) -> StalenessOutcome {
    warn!(track_id, reason, "Downloaded track is unplayable");
    StalenessOutcome::Unplayable {
        message: reason.to_string(),
    }
}

/// Deleted, unavailable, or stream-gated without access.
fn unplayable_reason(track: &Entity) -> Option<&'static str> {
    if track.is_deleted() {
        return Some("track was deleted");
    }
    if track.field("is_available").and_then(|v| v.as_bool()) == Some(false) {
        return Some("track is unavailable");
    }

    let gated = track
        .field("stream_conditions")
        .is_some_and(|conditions| !conditions.is_null());
    let can_stream = track
        .field("access")
        .and_then(|access| access.get("stream"))
        .and_then(|stream| stream.as_bool())
        .unwrap_or(true);
    if gated && !can_stream {
        return Some("stream is gated");
    }

    None
}
