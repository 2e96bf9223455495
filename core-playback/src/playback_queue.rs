//! Shared playback queue handle.

use crate::error::{PlaybackError, Result};
use crate::queue::{QueueEntry, QueueSignal, QueueState, RepeatMode};
use core_library::{Kind, Lineup, NormalizedEntityCache};
use core_runtime::events::{CoreEvent, EventBus, QueueEvent};
use parking_lot::RwLock;
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::sync::Arc;
use tracing::{debug, info};

struct Inner {
    state: QueueState,
    rng: StdRng,
}

/// Thread-safe queue.
///
/// Every operation runs under one write lock, so readers never see `index`
/// and `positions` out of step. A `QueueChanged` event follows each
/// operation that touched the state.
pub struct PlaybackQueue {
    inner: RwLock<Inner>,
    cache: Arc<NormalizedEntityCache>,
    event_bus: EventBus,
}

impl PlaybackQueue {
    pub fn new(cache: Arc<NormalizedEntityCache>, event_bus: EventBus) -> Self {
        Self::with_rng(cache, event_bus, StdRng::from_entropy())
    }

    /// Queue with a deterministic shuffle sequence.
    pub fn with_seed(cache: Arc<NormalizedEntityCache>, event_bus: EventBus, seed: u64) -> Self {
        Self::with_rng(cache, event_bus, StdRng::seed_from_u64(seed))
    }

    fn with_rng(cache: Arc<NormalizedEntityCache>, event_bus: EventBus, rng: StdRng) -> Self {
        Self {
            inner: RwLock::new(Inner {
                state: QueueState::new(),
                rng,
            }),
            cache,
            event_bus,
        }
    }

    /// Consistent copy of the whole state.
    pub fn snapshot(&self) -> QueueState {
        self.inner.read().state.clone()
    }

    pub fn current(&self) -> Option<QueueEntry> {
        self.inner.read().state.current().cloned()
    }

    pub fn len(&self) -> usize {
        self.inner.read().state.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().state.is_empty()
    }

    /// Entries whose track is missing from the cache or marked deleted are
    /// skipped by `next` / `previous`.
    pub fn is_playable(&self, entry: &QueueEntry) -> bool {
        entry.kind == Kind::Tracks
            && self
                .cache
                .get_one(Kind::Tracks, entry.id)
                .is_some_and(|track| !track.is_deleted())
    }

    pub fn load(
        &self,
        entries: Vec<QueueEntry>,
        start_index: usize,
        source: Option<String>,
    ) -> QueueSignal {
        info!(len = entries.len(), start_index, ?source, "Loading queue");
        self.mutate(|state, rng| state.load(entries, start_index, source, rng))
    }

    /// Load every entry of `lineup`, starting at `start_uid` (or the first
    /// entry).
    pub fn load_lineup(&self, lineup: &Lineup, start_uid: Option<&str>) -> Result<QueueSignal> {
        if lineup.is_empty() {
            return Err(PlaybackError::EmptyLineup(lineup.prefix().to_string()));
        }

        let start_index = match start_uid {
            Some(uid) => lineup
                .position_of(uid)
                .ok_or_else(|| PlaybackError::NotInLineup {
                    prefix: lineup.prefix().to_string(),
                    uid: uid.to_string(),
                })?,
            None => 0,
        };

        let entries = lineup.entries().iter().map(QueueEntry::from).collect();
        Ok(self.load(entries, start_index, Some(lineup.prefix().to_string())))
    }

    /// Advance. Pass `skip = false` when the current entry finished playing
    /// so [`RepeatMode::Single`] can replay it.
    pub fn next(&self, skip: bool) -> QueueSignal {
        self.mutate(|state, rng| state.next(rng, skip, |entry| self.is_playable(entry)))
    }

    pub fn previous(&self) -> QueueSignal {
        self.mutate(|state, rng| state.previous(rng, |entry| self.is_playable(entry)))
    }

    pub fn skip_to(&self, uid: &str) -> QueueSignal {
        self.mutate(|state, _| state.skip_to(uid))
    }

    pub fn toggle_shuffle(&self, enabled: bool) -> QueueSignal {
        self.mutate(|state, rng| state.toggle_shuffle(enabled, rng))
    }

    pub fn set_repeat(&self, mode: RepeatMode) -> QueueSignal {
        self.mutate(|state, _| state.set_repeat(mode))
    }

    pub fn append(&self, entries: Vec<QueueEntry>) -> QueueSignal {
        self.mutate(|state, rng| state.append(entries, rng))
    }

    /// Append the entries of `lineup` the queue does not hold yet, provided
    /// the queue was loaded from that lineup. Returns
    /// [`QueueSignal::NotInQueue`] and leaves the queue alone otherwise.
    pub fn extend_from_lineup(&self, lineup: &Lineup) -> QueueSignal {
        let entries: Vec<QueueEntry> = lineup.entries().iter().map(QueueEntry::from).collect();
        self.mutate(|state, rng| {
            if state.source() != Some(lineup.prefix()) {
                return QueueSignal::NotInQueue;
            }
            state.append(entries, rng)
        })
    }

    pub fn remove(&self, uid: &str) -> QueueSignal {
        self.mutate(|state, _| state.remove(uid))
    }

    /// Drop every entry, e.g. when playback stops.
    pub fn clear(&self) -> QueueSignal {
        self.load(Vec::new(), 0, None)
    }

    fn mutate<F>(&self, op: F) -> QueueSignal
    where
        F: FnOnce(&mut QueueState, &mut StdRng) -> QueueSignal,
    {
        let (signal, event) = {
            let mut guard = self.inner.write();
            let Inner { state, rng } = &mut *guard;
            let signal = op(state, rng);
            (signal, changed_event(state))
        };

        debug!(?signal, "Queue operation");
        if signal != QueueSignal::NotInQueue {
            self.event_bus.emit(CoreEvent::Queue(event)).ok();
        }
        signal
    }
}

fn changed_event(state: &QueueState) -> QueueEvent {
    QueueEvent::Changed {
        index: state.index(),
        overshot: state.overshot(),
        undershot: state.undershot(),
        current_uid: state.current().map(|entry| entry.uid.clone()),
    }
}

impl std::fmt::Debug for PlaybackQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.read();
        f.debug_struct("PlaybackQueue")
            .field("len", &inner.state.len())
            .field("index", &inner.state.index())
            .field("repeat", &inner.state.repeat())
            .field("shuffle", &inner.state.shuffle())
            .finish()
    }
}
