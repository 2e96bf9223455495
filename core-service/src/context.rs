//! Per-session engine wiring.

use crate::error::{CoreError, Result};
use bridge_traits::{Clock, ContentApiClient, LocalAssetStore};
use core_library::{
    EndpointStrategy, FetchOutcome, LineupController, LineupOptions, LineupStrategy,
    NormalizedEntityCache, OfflineSource,
};
use core_playback::{PlaybackQueue, QueueSignal};
use core_runtime::config::EngineConfig;
use core_runtime::events::{EventBus, EventStream};
use core_runtime::ReachabilityMonitor;
use core_sync::StalenessRevalidator;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info, instrument};

/// Host bridges the engine needs beyond what [`EngineConfig`] carries.
#[derive(Clone)]
pub struct EngineDependencies {
    pub content_client: Arc<dyn ContentApiClient>,
    /// On-device downloads; without one there is no offline fallback and no
    /// staleness revalidation.
    pub asset_store: Option<Arc<dyn LocalAssetStore>>,
}

impl EngineDependencies {
    pub fn new(content_client: Arc<dyn ContentApiClient>) -> Self {
        Self {
            content_client,
            asset_store: None,
        }
    }

    pub fn with_asset_store(mut self, store: Arc<dyn LocalAssetStore>) -> Self {
        self.asset_store = Some(store);
        self
    }
}

/// Which downloads back a lineup while unreachable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OfflineTarget {
    Favorites,
    Collection(String),
}

/// Everything one signed-in session shares.
///
/// Constructed once per session and torn down with [`shutdown`](Self::shutdown)
/// on sign-out.
pub struct EngineContext {
    config: EngineConfig,
    deps: EngineDependencies,
    event_bus: EventBus,
    cache: Arc<NormalizedEntityCache>,
    reachability: ReachabilityMonitor,
    staleness: Option<StalenessRevalidator>,
}

impl EngineContext {
    /// Start the reachability monitor (attaching the host network monitor
    /// when one is configured) and build the shared cache and event bus.
    #[instrument(skip_all)]
    pub async fn new(config: EngineConfig, deps: EngineDependencies) -> Result<Self> {
        let event_bus = EventBus::new(config.event_buffer_size);
        let reachability = ReachabilityMonitor::start(
            config.reachability.clone(),
            Arc::clone(&config.network_probe),
            event_bus.clone(),
        );

        if let Some(monitor) = &config.network_monitor {
            if let Err(err) = reachability.attach(Arc::clone(monitor)).await {
                reachability.shutdown();
                return Err(err.into());
            }
        }

        let staleness = match (&deps.asset_store, config.features.staleness_revalidation) {
            (Some(store), true) => Some(StalenessRevalidator::new(
                Arc::clone(&deps.content_client),
                Arc::clone(store),
                reachability.clone(),
                event_bus.clone(),
                Arc::clone(&config.clock),
                config.staleness,
            )),
            _ => None,
        };

        info!(
            reachable = reachability.is_reachable(),
            offline_store = deps.asset_store.is_some(),
            staleness = staleness.is_some(),
            "Engine context started"
        );

        Ok(Self {
            config,
            deps,
            event_bus,
            cache: Arc::new(NormalizedEntityCache::new()),
            reachability,
            staleness,
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn event_bus(&self) -> &EventBus {
        &self.event_bus
    }

    pub fn subscribe_events(&self) -> EventStream {
        EventStream::new(self.event_bus.subscribe())
    }

    pub fn cache(&self) -> &Arc<NormalizedEntityCache> {
        &self.cache
    }

    pub fn reachability(&self) -> &ReachabilityMonitor {
        &self.reachability
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.config.clock
    }

    /// Lineup options carrying the configured default page size.
    pub fn default_lineup_options(&self) -> LineupOptions {
        LineupOptions::default().with_page_size(self.config.lineup.page_size)
    }

    /// Controller for `prefix` driven by `strategy`.
    ///
    /// `offline` is honored only when the offline fallback feature is on and
    /// an asset store was provided.
    pub fn lineup_controller(
        &self,
        prefix: &str,
        strategy: Arc<dyn LineupStrategy>,
        options: Option<LineupOptions>,
        offline: Option<OfflineTarget>,
    ) -> LineupController {
        let controller = LineupController::new(
            prefix,
            strategy,
            Arc::clone(&self.cache),
            self.event_bus.clone(),
        )
        .with_options(options.unwrap_or_else(|| self.default_lineup_options()))
        .with_reachability(self.reachability.clone());

        match (offline, self.offline_store()) {
            (Some(target), Some(store)) => {
                let source = match target {
                    OfflineTarget::Favorites => OfflineSource::favorites(store),
                    OfflineTarget::Collection(id) => OfflineSource::collection(store, id),
                };
                controller.with_offline_source(source)
            }
            (Some(target), None) => {
                debug!(prefix, ?target, "Offline fallback unavailable for lineup");
                controller
            }
            (None, _) => controller,
        }
    }

    /// Controller paging through one content API endpoint.
    pub fn endpoint_lineup(
        &self,
        prefix: &str,
        endpoint: &str,
        offline: Option<OfflineTarget>,
    ) -> LineupController {
        let strategy = EndpointStrategy::new(Arc::clone(&self.deps.content_client), endpoint);
        self.lineup_controller(prefix, Arc::new(strategy), None, offline)
    }

    pub fn playback_queue(&self) -> PlaybackQueue {
        PlaybackQueue::new(Arc::clone(&self.cache), self.event_bus.clone())
    }

    /// Replace `queue` with the current entries of `controller`'s lineup.
    pub fn load_queue_from_lineup(
        &self,
        queue: &PlaybackQueue,
        controller: &LineupController,
        start_uid: Option<&str>,
    ) -> Result<QueueSignal> {
        Ok(queue.load_lineup(&controller.lineup(), start_uid)?)
    }

    /// Fetch the next page of `controller` and, when `queue` was loaded from
    /// that lineup, append the new entries to it.
    #[instrument(skip_all, fields(prefix = %controller.prefix()))]
    pub async fn fetch_more_into_queue(
        &self,
        controller: &LineupController,
        queue: &PlaybackQueue,
        payload: Value,
    ) -> FetchOutcome {
        let outcome = controller.fetch_more(payload).await;
        if let FetchOutcome::Fetched { appended, .. } = &outcome {
            let signal = queue.extend_from_lineup(&controller.lineup());
            debug!(appended, ?signal, "Extended queue from lineup");
        }
        outcome
    }

    /// The session's revalidator.
    ///
    /// # Errors
    ///
    /// `FeatureDisabled` when staleness revalidation is switched off and
    /// `CapabilityMissing` when no asset store was provided.
    pub fn staleness_revalidator(&self) -> Result<&StalenessRevalidator> {
        if !self.config.features.staleness_revalidation {
            return Err(CoreError::FeatureDisabled("staleness_revalidation"));
        }
        self.staleness.as_ref().ok_or_else(|| CoreError::CapabilityMissing {
            capability: "LocalAssetStore".to_string(),
            message: "staleness revalidation needs an asset store".to_string(),
        })
    }

    /// Stop background work and drop cached entities.
    #[instrument(skip(self))]
    pub async fn shutdown(&self) {
        if let Some(staleness) = &self.staleness {
            staleness.shutdown().await;
        }
        self.reachability.shutdown();
        self.cache.clear();
        info!("Engine context shut down");
    }

    fn offline_store(&self) -> Option<Arc<dyn LocalAssetStore>> {
        if !self.config.features.offline_fallback {
            return None;
        }
        self.deps.asset_store.clone()
    }
}

impl std::fmt::Debug for EngineContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineContext")
            .field("config", &self.config)
            .field("reachable", &self.reachability.is_reachable())
            .field("offline_store", &self.deps.asset_store.is_some())
            .finish()
    }
}
