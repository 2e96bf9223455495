//! Lineup fetch orchestration
//!
//! One [`LineupController`] per lineup instance. A fetch runs
//! fetch → hydrate references → process (filter + cache write) → apply, or the
//! offline path when reachability is down and an [`OfflineSource`] is set.
//!
//! At most one fetch is in flight per lineup; a second call is coalesced.
//! `reset()` bumps the lineup generation and cancels the in-flight fetch, and
//! every mutation checks the generation first, so an abandoned response can
//! never land in a reset lineup. A fetch future dropped before it settles
//! releases the in-flight slot and restores the previous status.
//!
//! Switching a populated lineup to local downloads goes through the same
//! reset (generation bump plus an `Idle` event) before the local set is
//! written, so entries only ever shrink via reset.

use super::offline::OfflineSource;
use super::strategy::LineupStrategy;
use super::{FetchOutcome, Lineup, LineupOptions, LineupStatus, PageEntry};
use crate::cache::{AddOptions, NormalizedEntityCache};
use crate::error::Result;
use crate::models::{Entity, Kind, PageItem};
use bridge_traits::EntityId;
use core_async::sync::CancellationToken;
use core_runtime::events::{CoreEvent, EventBus, LineupEvent};
use core_runtime::ReachabilityMonitor;
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::{debug, instrument, warn};

struct ControllerState {
    lineup: Lineup,
    generation: u64,
    in_flight: bool,
    token: CancellationToken,
}

impl ControllerState {
    fn reset(&mut self) {
        self.generation += 1;
        self.in_flight = false;
        self.token.cancel();
        self.token = CancellationToken::new();
        self.lineup.reset();
    }
}

/// Releases the in-flight slot when a fetch future is dropped mid-flight.
struct InFlightGuard<'a> {
    controller: &'a LineupController,
    generation: u64,
    restore: LineupStatus,
    armed: bool,
}

impl InFlightGuard<'_> {
    fn disarm(&mut self) {
        self.armed = false;
    }
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }

        let released = {
            let mut state = self.controller.state.lock();
            if state.generation == self.generation && state.in_flight {
                state.in_flight = false;
                state.lineup.set_status(self.restore);
                true
            } else {
                false
            }
        };

        if released {
            debug!(prefix = %self.controller.prefix, "Fetch dropped before completion");
            self.controller.publish();
        }
    }
}

enum Loaded {
    Online {
        page: Vec<PageEntry>,
        raw_len: usize,
        deleted: usize,
        nulls: usize,
    },
    Offline(Vec<PageEntry>),
}

pub struct LineupController {
    prefix: String,
    strategy: Arc<dyn LineupStrategy>,
    cache: Arc<NormalizedEntityCache>,
    event_bus: EventBus,
    options: LineupOptions,
    reachability: Option<ReachabilityMonitor>,
    offline_source: Option<OfflineSource>,
    state: Mutex<ControllerState>,
}

impl LineupController {
    pub fn new(
        prefix: impl Into<String>,
        strategy: Arc<dyn LineupStrategy>,
        cache: Arc<NormalizedEntityCache>,
        event_bus: EventBus,
    ) -> Self {
        let prefix = prefix.into();
        Self {
            state: Mutex::new(ControllerState {
                lineup: Lineup::new(prefix.clone()),
                generation: 0,
                in_flight: false,
                token: CancellationToken::new(),
            }),
            prefix,
            strategy,
            cache,
            event_bus,
            options: LineupOptions::default(),
            reachability: None,
            offline_source: None,
        }
    }

    pub fn with_options(mut self, options: LineupOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_reachability(mut self, reachability: ReachabilityMonitor) -> Self {
        self.reachability = Some(reachability);
        self
    }

    /// Serve this lineup from local downloads while unreachable.
    pub fn with_offline_source(mut self, source: OfflineSource) -> Self {
        self.offline_source = Some(source);
        self
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn options(&self) -> &LineupOptions {
        &self.options
    }

    /// Snapshot of the current lineup.
    pub fn lineup(&self) -> Lineup {
        self.state.lock().lineup.clone()
    }

    pub fn status(&self) -> LineupStatus {
        self.state.lock().lineup.status()
    }

    pub fn is_fetching(&self) -> bool {
        self.state.lock().in_flight
    }

    fn source(&self) -> &str {
        self.options.source.as_deref().unwrap_or(&self.prefix)
    }

    fn offline_active(&self) -> bool {
        self.offline_source.is_some()
            && self
                .reachability
                .as_ref()
                .is_some_and(|monitor| !monitor.is_reachable())
    }

    /// Fetch `limit` entries at `offset`.
    ///
    /// Never returns an error: failures move the lineup to `Error` and are
    /// reported as [`FetchOutcome::Failed`] plus a `FetchFailed` event.
    #[instrument(skip(self, payload), fields(prefix = %self.prefix))]
    pub async fn fetch(&self, offset: usize, limit: usize, payload: Value) -> FetchOutcome {
        let offline = self.offline_active();
        let (generation, token, restore, reset_first) = {
            let mut state = self.state.lock();
            if state.in_flight {
                debug!("Fetch already in flight, coalescing");
                return FetchOutcome::Coalesced;
            }
            let reset_first = offline && !state.lineup.is_empty();
            if reset_first {
                state.reset();
            }
            let restore = state.lineup.status();
            state.in_flight = true;
            state.lineup.set_status(LineupStatus::Loading);
            (state.generation, state.token.clone(), restore, reset_first)
        };
        let mut guard = InFlightGuard {
            controller: self,
            generation,
            restore,
            armed: true,
        };

        if reset_first {
            debug!("Resetting lineup to serve local downloads");
            self.emit_changed(Vec::new(), LineupStatus::Idle);
        }
        self.publish();

        let loaded = tokio::select! {
            _ = token.cancelled() => {
                debug!("Fetch cancelled by reset");
                return FetchOutcome::Abandoned;
            }
            loaded = async {
                if offline {
                    self.load_offline().await
                } else {
                    self.load_page(offset, limit, &payload).await
                }
            } => loaded,
        };

        let outcome = {
            let mut state = self.state.lock();
            if state.generation != generation {
                debug!("Discarding response for a reset lineup");
                return FetchOutcome::Abandoned;
            }
            state.in_flight = false;
            guard.disarm();

            match loaded {
                Ok(Loaded::Online {
                    page,
                    raw_len,
                    deleted,
                    nulls,
                }) => {
                    let dedupe = self.options.dedupe;
                    let appended = state.lineup.apply_page(offset, page, self.source(), dedupe);
                    state.lineup.complete_page(offset, raw_len, limit);
                    FetchOutcome::Fetched {
                        appended,
                        deleted,
                        nulls,
                    }
                }
                Ok(Loaded::Offline(page)) => {
                    let count = state.lineup.fill_offline(page, self.source());
                    FetchOutcome::Offline { count }
                }
                Err(err) => {
                    state.lineup.set_status(LineupStatus::Error);
                    FetchOutcome::Failed(err.to_string())
                }
            }
        };

        if let FetchOutcome::Failed(message) = &outcome {
            warn!(error = %message, "Lineup fetch failed");
            self.event_bus
                .emit(CoreEvent::Lineup(LineupEvent::FetchFailed {
                    prefix: self.prefix.clone(),
                    message: message.clone(),
                }))
                .ok();
        } else {
            debug!(?outcome, "Lineup fetch finished");
        }
        self.publish();

        outcome
    }

    /// Fetch the next page using the configured page size.
    pub async fn fetch_more(&self, payload: Value) -> FetchOutcome {
        let offset = {
            let state = self.state.lock();
            let lineup = &state.lineup;
            if !lineup.has_more() && lineup.status() == LineupStatus::Success {
                return FetchOutcome::Exhausted;
            }
            lineup.next_offset()
        };

        self.fetch(offset, self.options.page_size, payload).await
    }

    /// Clear the lineup and abandon any in-flight fetch. The cache is left
    /// untouched.
    pub fn reset(&self) {
        self.state.lock().reset();
        debug!(prefix = %self.prefix, "Lineup reset");
        self.publish();
    }

    fn publish(&self) {
        let (uids, status) = {
            let state = self.state.lock();
            (state.lineup.uids(), state.lineup.status())
        };
        self.emit_changed(uids, status);
    }

    fn emit_changed(&self, uids: Vec<String>, status: LineupStatus) {
        self.event_bus
            .emit(CoreEvent::Lineup(LineupEvent::Changed {
                prefix: self.prefix.clone(),
                uids,
                status,
            }))
            .ok();
    }

    fn to_page_entries(&self, entities: &[Entity]) -> Vec<PageEntry> {
        entities
            .iter()
            .map(|entity| PageEntry {
                kind: entity.kind,
                id: entity.id,
                activity_timestamp: self.strategy.keep_metadata(entity),
                source_key: self.strategy.source_key(entity),
            })
            .collect()
    }

    async fn load_page(&self, offset: usize, limit: usize, payload: &Value) -> Result<Loaded> {
        let raw = self.strategy.get_entries(offset, limit, payload).await?;
        let raw_len = raw.len();

        let items = raw
            .into_iter()
            .map(PageItem::classify)
            .collect::<Result<Vec<_>>>()?;

        let (entities, nulls) = self.resolve_references(items).await?;
        let processed = self
            .strategy
            .process(entities, &self.cache, self.options.remove_deleted);

        Ok(Loaded::Online {
            page: self.to_page_entries(&processed.entities),
            raw_len,
            deleted: processed.deleted,
            nulls,
        })
    }

    /// Hydrate references with one concurrent fetch per kind and put the
    /// results back in page order. Null slots and references the server
    /// could not hydrate are counted as nulls.
    async fn resolve_references(&self, items: Vec<PageItem>) -> Result<(Vec<Entity>, usize)> {
        let mut by_kind: BTreeMap<Kind, Vec<EntityId>> = BTreeMap::new();
        for item in &items {
            if let PageItem::Reference { kind, id } = item {
                by_kind.entry(*kind).or_default().push(*id);
            }
        }

        let mut hydrated: HashMap<(Kind, EntityId), Entity> = HashMap::new();
        if !by_kind.is_empty() {
            let fetches = by_kind.iter().map(|(kind, ids)| {
                let strategy = Arc::clone(&self.strategy);
                async move { strategy.fetch_by_kind(*kind, ids).await }
            });

            for raw in core_async::try_join_all(fetches).await?.into_iter().flatten() {
                let entity = Entity::from_raw(raw)?;
                hydrated.insert(entity.entry_key(), entity);
            }
        }

        let mut nulls = 0;
        let mut entities = Vec::with_capacity(items.len());
        for item in items {
            match item {
                PageItem::Full(entity) => entities.push(entity),
                PageItem::Reference { kind, id } => match hydrated.get(&(kind, id)) {
                    Some(entity) => entities.push(entity.clone()),
                    None => nulls += 1,
                },
                PageItem::Null => nulls += 1,
            }
        }

        Ok((entities, nulls))
    }

    async fn load_offline(&self) -> Result<Loaded> {
        let Some(source) = self.offline_source.as_ref() else {
            return Ok(Loaded::Offline(Vec::new()));
        };

        let entities = source.load().await?;
        self.cache
            .add(Kind::Tracks, entities.iter().cloned(), AddOptions::skip_if_exists());
        debug!(count = entities.len(), "Serving lineup from local downloads");

        Ok(Loaded::Offline(self.to_page_entries(&entities)))
    }
}

impl std::fmt::Debug for LineupController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LineupController")
            .field("prefix", &self.prefix)
            .field("options", &self.options)
            .field("offline_source", &self.offline_source)
            .finish()
    }
}
