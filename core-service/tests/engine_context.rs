//! End-to-end wiring through `EngineContext`.

use async_trait::async_trait;
use bridge_traits::error::Result as BridgeResult;
use bridge_traits::{
    ContentApiClient, DownloadPredicate, DownloadReason, EntityId, EntriesQuery, LocalAssetStore,
    LocalEntry, NetworkProbe, OfflineDownloadRecord, RawEntity,
};
use chrono::{DateTime, TimeZone, Utc};
use core_library::{FetchOutcome, Kind};
use core_playback::{PlaybackError, QueueSignal};
use core_runtime::config::EngineConfig;
use core_service::{CoreError, EngineContext, EngineDependencies, OfflineTarget};
use mockall::mock;
use serde_json::json;
use std::sync::{Arc, Mutex};

mock! {
    pub Client {}

    #[async_trait]
    impl ContentApiClient for Client {
        async fn get_entries(&self, query: &EntriesQuery) -> BridgeResult<Vec<RawEntity>>;
        async fn get_by_ids(&self, kind: &str, ids: &[EntityId]) -> BridgeResult<Vec<RawEntity>>;
        async fn get_track(&self, track_id: EntityId) -> BridgeResult<Option<RawEntity>>;
    }
}

struct FixedProbe(bool);

#[async_trait]
impl NetworkProbe for FixedProbe {
    async fn probe(&self, _url: &str) -> bool {
        self.0
    }
}

#[derive(Default)]
struct FavoritesStore {
    entries: Mutex<Vec<LocalEntry>>,
}

impl FavoritesStore {
    fn with(self, track_id: EntityId, favorited: DateTime<Utc>) -> Self {
        self.entries.lock().unwrap().push(LocalEntry {
            record: OfflineDownloadRecord::new(track_id, DownloadReason::favorites())
                .with_favorite_created_at(favorited),
            metadata: json!({"track_id": track_id}),
        });
        self
    }
}

#[async_trait]
impl LocalAssetStore for FavoritesStore {
    async fn list_downloaded(&self, predicate: DownloadPredicate) -> BridgeResult<Vec<LocalEntry>> {
        Ok(self
            .entries
            .lock()
            .unwrap()
            .iter()
            .filter(|entry| predicate(&entry.record))
            .cloned()
            .collect())
    }

    async fn get_local_track(&self, _track_id: EntityId) -> BridgeResult<Option<LocalEntry>> {
        Ok(None)
    }

    async fn request_download(&self, _track_id: EntityId) -> BridgeResult<()> {
        Ok(())
    }

    async fn redownload(&self, _track_id: EntityId) -> BridgeResult<()> {
        Ok(())
    }

    async fn remove_download(&self, _track_id: EntityId) -> BridgeResult<()> {
        Ok(())
    }

    async fn mark_verified(&self, _track_id: EntityId, _at: DateTime<Utc>) -> BridgeResult<()> {
        Ok(())
    }
}

fn config(reachable: bool) -> EngineConfig {
    EngineConfig::builder()
        .probe_url("https://discovery.example.org/health_check")
        .network_probe(Arc::new(FixedProbe(reachable)))
        .initially_reachable(reachable)
        .page_size(3)
        .build()
        .unwrap()
}

fn feed_client() -> MockClient {
    let mut client = MockClient::new();
    client
        .expect_get_entries()
        .withf(|query: &EntriesQuery| query.endpoint == "feed")
        .returning(|query| {
            Ok((query.offset..query.offset + query.limit)
                .map(|i| json!({"track_id": i as u64 + 1}))
                .collect())
        });
    client
}

#[tokio::test]
async fn lineup_feeds_the_queue() {
    let engine = EngineContext::new(config(true), EngineDependencies::new(Arc::new(feed_client())))
        .await
        .unwrap();
    let feed = engine.endpoint_lineup("feed", "feed", None);

    assert!(matches!(
        feed.fetch_more(json!({})).await,
        FetchOutcome::Fetched { appended: 3, .. }
    ));
    assert_eq!(engine.cache().len(Kind::Tracks), 3);

    let queue = engine.playback_queue();
    let uids = feed.lineup().uids();
    let signal = engine
        .load_queue_from_lineup(&queue, &feed, Some(uids[1].as_str()))
        .unwrap();

    assert_eq!(signal, QueueSignal::Moved { index: 1 });
    assert_eq!(queue.snapshot().source(), Some("feed"));
    assert_eq!(queue.next(true), QueueSignal::Moved { index: 2 });
    assert_eq!(queue.next(true), QueueSignal::Stop);

    engine.shutdown().await;
}

#[tokio::test]
async fn fetch_more_extends_the_queue_playing_that_lineup() {
    let engine = EngineContext::new(config(true), EngineDependencies::new(Arc::new(feed_client())))
        .await
        .unwrap();
    let feed = engine.endpoint_lineup("feed", "feed", None);
    let other = engine.endpoint_lineup("other", "feed", None);
    feed.fetch_more(json!({})).await;
    other.fetch_more(json!({})).await;

    let queue = engine.playback_queue();
    engine.load_queue_from_lineup(&queue, &feed, None).unwrap();

    let outcome = engine.fetch_more_into_queue(&feed, &queue, json!({})).await;
    assert!(matches!(outcome, FetchOutcome::Fetched { appended: 3, .. }));
    assert_eq!(queue.len(), 6);
    assert_eq!(queue.snapshot().order()[5].uid, feed.lineup().uids()[5]);
    assert_eq!(queue.current().map(|entry| entry.id), Some(1));

    engine.fetch_more_into_queue(&other, &queue, json!({})).await;
    assert_eq!(other.lineup().len(), 6);
    assert_eq!(queue.len(), 6);

    engine.shutdown().await;
}

#[tokio::test]
async fn queue_load_rejects_unknown_start_uid() {
    let engine = EngineContext::new(config(true), EngineDependencies::new(Arc::new(feed_client())))
        .await
        .unwrap();
    let feed = engine.endpoint_lineup("feed", "feed", None);
    let queue = engine.playback_queue();

    assert!(matches!(
        engine.load_queue_from_lineup(&queue, &feed, None),
        Err(CoreError::Playback(PlaybackError::EmptyLineup(_)))
    ));

    feed.fetch(0, 3, json!({})).await;
    assert!(matches!(
        engine.load_queue_from_lineup(&queue, &feed, Some("kind:TRACKS-id:99-source:feed")),
        Err(CoreError::Playback(PlaybackError::NotInLineup { .. }))
    ));
}

#[tokio::test]
async fn unreachable_favorites_come_from_downloads() {
    let mut client = MockClient::new();
    client.expect_get_entries().never();
    let store = FavoritesStore::default()
        .with(1, Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap())
        .with(2, Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap());
    let deps = EngineDependencies::new(Arc::new(client)).with_asset_store(Arc::new(store));
    let engine = EngineContext::new(config(false), deps).await.unwrap();

    let favorites = engine.endpoint_lineup("favorites", "favorites", Some(OfflineTarget::Favorites));

    assert_eq!(
        favorites.fetch(0, 10, json!({})).await,
        FetchOutcome::Offline { count: 2 }
    );
    let ids: Vec<_> = favorites.lineup().entries().iter().map(|e| e.id).collect();
    assert_eq!(ids, vec![1, 2]);
}

#[tokio::test]
async fn staleness_requires_store_and_flag() {
    let engine = EngineContext::new(config(true), EngineDependencies::new(Arc::new(MockClient::new())))
        .await
        .unwrap();
    assert!(matches!(
        engine.staleness_revalidator(),
        Err(CoreError::CapabilityMissing { .. })
    ));

    let disabled = EngineConfig::builder()
        .probe_url("https://discovery.example.org/health_check")
        .network_probe(Arc::new(FixedProbe(true)))
        .enable_staleness_revalidation(false)
        .build()
        .unwrap();
    let deps = EngineDependencies::new(Arc::new(MockClient::new()))
        .with_asset_store(Arc::new(FavoritesStore::default()));
    let engine = EngineContext::new(disabled, deps.clone()).await.unwrap();
    assert!(matches!(
        engine.staleness_revalidator(),
        Err(CoreError::FeatureDisabled(_))
    ));

    let engine = EngineContext::new(config(true), deps).await.unwrap();
    assert!(engine.staleness_revalidator().is_ok());
}

#[tokio::test]
async fn shutdown_clears_the_cache() {
    let engine = EngineContext::new(config(true), EngineDependencies::new(Arc::new(feed_client())))
        .await
        .unwrap();
    let feed = engine.endpoint_lineup("feed", "feed", None);
    feed.fetch(0, 3, json!({})).await;
    assert!(!engine.cache().is_empty());

    engine.shutdown().await;

    assert!(engine.cache().is_empty());
    let revalidation = engine.staleness_revalidator();
    assert!(revalidation.is_err());
}
