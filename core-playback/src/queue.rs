//! # Queue State
//!
//! Playback order derived from a lineup, with shuffle, repeat and boundary
//! handling. [`QueueState`] is a plain value: every operation takes `&mut self`
//! and returns a [`QueueSignal`] instead of failing, so the locked
//! [`PlaybackQueue`](crate::PlaybackQueue) can replace it atomically.
//!
//! ## Invariants
//!
//! - `index < order.len()` whenever the queue is non-empty
//! - `positions[order[i].uid] == i` for every `i`
//! - when shuffle is on, `shuffle_order` is a permutation of `0..len` and
//!   `shuffle_order[shuffle_index] == index`
//! - `overshot` / `undershot` are only set by an advance past the end (or a
//!   retreat past the start) under [`RepeatMode::None`] and only cleared by
//!   `load` and `skip_to`
//! - under [`RepeatMode::Single`] a `next` that is not a skip stays on the
//!   current entry wherever it is
//! - a forward wrap under [`RepeatMode::All`] with shuffle on never starts the
//!   new lap with the entry that just finished

use bridge_traits::EntityId;
use core_library::{Kind, LineupEntry};
use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::debug;

/// Repeat behavior at the ends of the queue.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RepeatMode {
    /// Stop at the ends
    #[default]
    None,
    /// Replay the current entry when it finishes; skips still move, and stay
    /// put at the ends
    Single,
    /// Wrap around (reshuffling forward wraps when shuffled)
    All,
}

/// What a queue operation did. Queue operations never fail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueueSignal {
    /// Moved to the entry at `index`
    Moved { index: usize },
    /// Wrapped around an end under [`RepeatMode::All`]
    Wrapped { index: usize },
    /// [`RepeatMode::Single`] kept the entry at `index`
    RepeatCurrent { index: usize },
    /// Reached an end under [`RepeatMode::None`]; playback should stop
    Stop,
    /// The uid is not in the queue
    NotInQueue,
    /// The queue is empty
    Empty,
    /// State changed without moving the index
    Updated,
}

/// One playable appearance of an entity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct QueueEntry {
    pub uid: String,
    pub id: EntityId,
    pub kind: Kind,
}

impl QueueEntry {
    pub fn new(uid: impl Into<String>, id: EntityId, kind: Kind) -> Self {
        Self {
            uid: uid.into(),
            id,
            kind,
        }
    }

    pub fn track(uid: impl Into<String>, id: EntityId) -> Self {
        Self::new(uid, id, Kind::Tracks)
    }
}

impl From<&LineupEntry> for QueueEntry {
    fn from(entry: &LineupEntry) -> Self {
        Self::new(entry.uid.clone(), entry.id, entry.kind)
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Direction {
    Forward,
    Backward,
}

/// Queue state machine.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueueState {
    order: Vec<QueueEntry>,
    positions: HashMap<String, usize>,
    index: usize,
    shuffle: bool,
    shuffle_order: Vec<usize>,
    shuffle_index: usize,
    repeat: RepeatMode,
    overshot: bool,
    undershot: bool,
    source: Option<String>,
}

impl QueueState {
    pub fn new() -> Self {
        Self::default()
    }

    // ------------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------------

    pub fn order(&self) -> &[QueueEntry] {
        &self.order
    }

    pub fn positions(&self) -> &HashMap<String, usize> {
        &self.positions
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn index(&self) -> Option<usize> {
        (!self.order.is_empty()).then_some(self.index)
    }

    pub fn current(&self) -> Option<&QueueEntry> {
        self.order.get(self.index)
    }

    pub fn position_of(&self, uid: &str) -> Option<usize> {
        self.positions.get(uid).copied()
    }

    pub fn shuffle(&self) -> bool {
        self.shuffle
    }

    pub fn shuffle_order(&self) -> &[usize] {
        &self.shuffle_order
    }

    pub fn shuffle_index(&self) -> usize {
        self.shuffle_index
    }

    pub fn repeat(&self) -> RepeatMode {
        self.repeat
    }

    pub fn overshot(&self) -> bool {
        self.overshot
    }

    pub fn undershot(&self) -> bool {
        self.undershot
    }

    /// Prefix of the lineup the queue was loaded from.
    pub fn source(&self) -> Option<&str> {
        self.source.as_deref()
    }

    // ------------------------------------------------------------------------
    // Operations
    // ------------------------------------------------------------------------

    /// Replace the queue.
    ///
    /// Repeated uids keep their first appearance. `start_index` refers to the
    /// given entries and is clamped to the last one.
    pub fn load<R: Rng + ?Sized>(
        &mut self,
        entries: Vec<QueueEntry>,
        start_index: usize,
        source: Option<String>,
        rng: &mut R,
    ) -> QueueSignal {
        let start_uid = entries
            .get(start_index.min(entries.len().saturating_sub(1)))
            .map(|entry| entry.uid.clone());

        self.order.clear();
        self.positions.clear();
        for entry in entries {
            if self.positions.contains_key(&entry.uid) {
                debug!(uid = %entry.uid, "Dropping repeated uid from queue");
                continue;
            }
            self.positions.insert(entry.uid.clone(), self.order.len());
            self.order.push(entry);
        }

        self.index = start_uid
            .and_then(|uid| self.position_of(&uid))
            .unwrap_or(0);
        self.overshot = false;
        self.undershot = false;
        self.source = source;

        if self.shuffle {
            self.shuffle_order = (0..self.order.len()).collect();
            self.shuffle_order.shuffle(rng);
            self.sync_shuffle_index();
        } else {
            self.shuffle_order.clear();
            self.shuffle_index = 0;
        }

        if self.order.is_empty() {
            QueueSignal::Empty
        } else {
            QueueSignal::Moved { index: self.index }
        }
    }

    /// Advance, skipping entries `is_playable` rejects.
    ///
    /// `skip` is true for a user skip and false when the current entry
    /// finished playing; only the latter repeats under [`RepeatMode::Single`].
    pub fn next<R, F>(&mut self, rng: &mut R, skip: bool, is_playable: F) -> QueueSignal
    where
        R: Rng + ?Sized,
        F: Fn(&QueueEntry) -> bool,
    {
        if !skip && self.repeat == RepeatMode::Single && !self.order.is_empty() {
            return QueueSignal::RepeatCurrent { index: self.index };
        }
        self.step(Direction::Forward, rng, is_playable)
    }

    /// Retreat, skipping entries `is_playable` rejects.
    pub fn previous<R, F>(&mut self, rng: &mut R, is_playable: F) -> QueueSignal
    where
        R: Rng + ?Sized,
        F: Fn(&QueueEntry) -> bool,
    {
        self.step(Direction::Backward, rng, is_playable)
    }

    pub fn skip_to(&mut self, uid: &str) -> QueueSignal {
        if self.order.is_empty() {
            return QueueSignal::Empty;
        }
        let Some(index) = self.position_of(uid) else {
            return QueueSignal::NotInQueue;
        };

        self.index = index;
        self.sync_shuffle_index();
        self.overshot = false;
        self.undershot = false;
        QueueSignal::Moved { index }
    }

    /// Enable or disable shuffle without changing the current entry.
    ///
    /// Enabling builds a fresh permutation in which the current entry keeps
    /// its linear position.
    pub fn toggle_shuffle<R: Rng + ?Sized>(&mut self, enabled: bool, rng: &mut R) -> QueueSignal {
        if self.order.is_empty() {
            self.shuffle = enabled;
            return QueueSignal::Empty;
        }
        if enabled == self.shuffle {
            return QueueSignal::Updated;
        }

        self.shuffle = enabled;
        if enabled {
            let mut rest: Vec<usize> = (0..self.order.len()).filter(|&i| i != self.index).collect();
            rest.shuffle(rng);
            rest.insert(self.index, self.index);
            self.shuffle_order = rest;
            self.shuffle_index = self.index;
        } else {
            // `index` already tracks the current entry in linear order
            self.shuffle_order.clear();
            self.shuffle_index = 0;
        }
        QueueSignal::Updated
    }

    pub fn set_repeat(&mut self, mode: RepeatMode) -> QueueSignal {
        self.repeat = mode;
        if self.order.is_empty() {
            QueueSignal::Empty
        } else {
            QueueSignal::Updated
        }
    }

    /// Add entries at the end of the queue.
    ///
    /// Uids already queued are dropped. With shuffle on, the new entries are
    /// spliced at random points of the not-yet-played part of the shuffle
    /// order.
    pub fn append<R: Rng + ?Sized>(&mut self, entries: Vec<QueueEntry>, rng: &mut R) -> QueueSignal {
        let was_empty = self.order.is_empty();
        let mut added = 0;

        for entry in entries {
            if self.positions.contains_key(&entry.uid) {
                continue;
            }
            let index = self.order.len();
            self.positions.insert(entry.uid.clone(), index);
            self.order.push(entry);
            added += 1;

            if self.shuffle {
                let at = if was_empty && index == 0 {
                    0
                } else {
                    rng.gen_range(self.shuffle_index + 1..=self.shuffle_order.len())
                };
                self.shuffle_order.insert(at, index);
            }
        }

        if self.order.is_empty() {
            return QueueSignal::Empty;
        }
        if was_empty {
            self.index = 0;
            self.sync_shuffle_index();
        }
        debug!(added, len = self.order.len(), "Appended to queue");
        QueueSignal::Updated
    }

    /// Remove one entry. When the current entry is removed the index moves to
    /// the entry that followed it (or the new last entry).
    pub fn remove(&mut self, uid: &str) -> QueueSignal {
        let Some(removed) = self.position_of(uid) else {
            return if self.order.is_empty() {
                QueueSignal::Empty
            } else {
                QueueSignal::NotInQueue
            };
        };

        self.order.remove(removed);
        self.rebuild_positions();

        if self.order.is_empty() {
            self.index = 0;
            self.shuffle_order.clear();
            self.shuffle_index = 0;
            return QueueSignal::Empty;
        }

        if removed < self.index {
            self.index -= 1;
        }
        self.index = self.index.min(self.order.len() - 1);

        if self.shuffle {
            self.shuffle_order.retain(|&i| i != removed);
            for i in &mut self.shuffle_order {
                if *i > removed {
                    *i -= 1;
                }
            }
            self.sync_shuffle_index();
        }
        QueueSignal::Updated
    }

    // ------------------------------------------------------------------------
    // Traversal
    // ------------------------------------------------------------------------

    fn cursor(&self) -> usize {
        if self.shuffle {
            self.shuffle_index
        } else {
            self.index
        }
    }

    fn index_at(&self, cursor: usize) -> usize {
        if self.shuffle {
            self.shuffle_order[cursor]
        } else {
            cursor
        }
    }

    fn sync_shuffle_index(&mut self) {
        if self.shuffle {
            self.shuffle_index = self
                .shuffle_order
                .iter()
                .position(|&i| i == self.index)
                .unwrap_or(0);
        }
    }

    fn rebuild_positions(&mut self) {
        self.positions = self
            .order
            .iter()
            .enumerate()
            .map(|(i, entry)| (entry.uid.clone(), i))
            .collect();
    }

    /// Walk one playable step in `direction`, wrapping at most once.
    fn step<R, F>(&mut self, direction: Direction, rng: &mut R, is_playable: F) -> QueueSignal
    where
        R: Rng + ?Sized,
        F: Fn(&QueueEntry) -> bool,
    {
        let len = self.order.len();
        if len == 0 {
            return QueueSignal::Empty;
        }

        let mut cursor = self.cursor();
        let mut wrapped = false;

        // One full lap plus the wrap itself visits every entry once
        for _ in 0..=len {
            let at_boundary = match direction {
                Direction::Forward => cursor + 1 >= len,
                Direction::Backward => cursor == 0,
            };

            if at_boundary {
                match self.repeat {
                    RepeatMode::None => return self.hit_boundary(direction),
                    RepeatMode::Single => return QueueSignal::RepeatCurrent { index: self.index },
                    RepeatMode::All if wrapped => break,
                    RepeatMode::All => {
                        wrapped = true;
                        cursor = match direction {
                            Direction::Forward => {
                                if self.shuffle {
                                    self.reshuffle_lap(rng);
                                }
                                0
                            }
                            Direction::Backward => len - 1,
                        };
                    }
                }
            } else {
                cursor = match direction {
                    Direction::Forward => cursor + 1,
                    Direction::Backward => cursor - 1,
                };
            }

            let index = self.index_at(cursor);
            if is_playable(&self.order[index]) {
                self.index = index;
                if self.shuffle {
                    self.shuffle_index = cursor;
                }
                return if wrapped {
                    QueueSignal::Wrapped { index }
                } else {
                    QueueSignal::Moved { index }
                };
            }
            debug!(uid = %self.order[index].uid, "Skipping unplayable queue entry");
        }

        // Nothing playable anywhere; only reachable under `All`, which never
        // overshoots
        self.sync_shuffle_index();
        QueueSignal::Stop
    }

    /// New permutation for the next lap that does not open with the entry
    /// that just finished.
    fn reshuffle_lap<R: Rng + ?Sized>(&mut self, rng: &mut R) {
        self.shuffle_order.shuffle(rng);
        let len = self.shuffle_order.len();
        if len > 1 && self.shuffle_order[0] == self.index {
            let swap = rng.gen_range(1..len);
            self.shuffle_order.swap(0, swap);
        }
    }

    fn hit_boundary(&mut self, direction: Direction) -> QueueSignal {
        match direction {
            Direction::Forward => self.overshot = true,
            Direction::Backward => self.undershot = true,
        }
        QueueSignal::Stop
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn entries(ids: &[EntityId]) -> Vec<QueueEntry> {
        ids.iter()
            .map(|id| QueueEntry::track(format!("kind:TRACKS-id:{}-source:feed", id), *id))
            .collect()
    }

    fn loaded(ids: &[EntityId], start: usize) -> (QueueState, StdRng) {
        let mut rng = StdRng::seed_from_u64(7);
        let mut state = QueueState::new();
        state.load(entries(ids), start, Some("feed".to_string()), &mut rng);
        (state, rng)
    }

    fn all(_: &QueueEntry) -> bool {
        true
    }

    #[test]
    fn test_load_clamps_start_index() {
        let (state, _) = loaded(&[1, 2, 3], 10);

        assert_eq!(state.index(), Some(2));
        assert_eq!(state.source(), Some("feed"));
    }

    #[test]
    fn test_load_drops_repeated_uids() {
        let mut rng = StdRng::seed_from_u64(1);
        let mut state = QueueState::new();
        let mut list = entries(&[1, 2]);
        list.push(list[0].clone());
        list.push(QueueEntry::track("kind:TRACKS-id:3-source:feed", 3));

        state.load(list, 3, None, &mut rng);

        assert_eq!(state.len(), 3);
        assert_eq!(state.current().unwrap().id, 3);
        assert_eq!(state.position_of("kind:TRACKS-id:3-source:feed"), Some(2));
    }

    #[test]
    fn test_empty_queue_signals() {
        let mut rng = StdRng::seed_from_u64(1);
        let mut state = QueueState::new();

        assert_eq!(state.next(&mut rng, true, all), QueueSignal::Empty);
        assert_eq!(state.previous(&mut rng, all), QueueSignal::Empty);
        assert_eq!(state.skip_to("missing"), QueueSignal::Empty);
        assert_eq!(state.toggle_shuffle(true, &mut rng), QueueSignal::Empty);
        assert_eq!(state.index(), None);
        assert!(!state.overshot());
    }

    #[test]
    fn test_repeat_single_stays_at_end() {
        let (mut state, mut rng) = loaded(&[1, 2], 1);
        state.set_repeat(RepeatMode::Single);

        assert_eq!(state.next(&mut rng, true, all), QueueSignal::RepeatCurrent { index: 1 });
        assert_eq!(state.index(), Some(1));
        assert!(!state.overshot());
    }

    #[test]
    fn test_repeat_single_skip_advances_mid_queue() {
        let (mut state, mut rng) = loaded(&[1, 2, 3], 0);
        state.set_repeat(RepeatMode::Single);

        assert_eq!(state.next(&mut rng, true, all), QueueSignal::Moved { index: 1 });
    }

    #[test]
    fn test_repeat_single_replays_finished_entry_mid_queue() {
        let (mut state, mut rng) = loaded(&[1, 2, 3], 0);
        state.set_repeat(RepeatMode::Single);

        assert_eq!(state.next(&mut rng, false, all), QueueSignal::RepeatCurrent { index: 0 });
        assert_eq!(state.index(), Some(0));
        assert!(!state.overshot());
    }

    #[test]
    fn test_finished_entry_advances_without_repeat_single() {
        let (mut state, mut rng) = loaded(&[1, 2, 3], 0);

        assert_eq!(state.next(&mut rng, false, all), QueueSignal::Moved { index: 1 });
    }

    #[test]
    fn test_previous_sets_undershot() {
        let (mut state, mut rng) = loaded(&[1, 2, 3], 0);

        assert_eq!(state.previous(&mut rng, all), QueueSignal::Stop);
        assert!(state.undershot());
        assert_eq!(state.index(), Some(0));
    }

    #[test]
    fn test_previous_wraps_under_repeat_all() {
        let (mut state, mut rng) = loaded(&[1, 2, 3], 0);
        state.set_repeat(RepeatMode::All);

        assert_eq!(state.previous(&mut rng, all), QueueSignal::Wrapped { index: 2 });
    }

    #[test]
    fn test_unplayable_entries_are_skipped() {
        let (mut state, mut rng) = loaded(&[1, 2, 3, 4], 0);
        let playable = |entry: &QueueEntry| entry.id != 2 && entry.id != 3;

        assert_eq!(state.next(&mut rng, true, playable), QueueSignal::Moved { index: 3 });
        assert_eq!(state.previous(&mut rng, playable), QueueSignal::Moved { index: 0 });
    }

    #[test]
    fn test_exhausted_by_unplayable_entries_overshoots() {
        let (mut state, mut rng) = loaded(&[1, 2, 3], 0);

        assert_eq!(state.next(&mut rng, true, |entry| entry.id == 1), QueueSignal::Stop);
        assert!(state.overshot());
        assert_eq!(state.index(), Some(0));
    }

    #[test]
    fn test_nothing_playable_under_repeat_all_stops() {
        let (mut state, mut rng) = loaded(&[1, 2, 3], 1);
        state.set_repeat(RepeatMode::All);
        state.toggle_shuffle(true, &mut rng);

        assert_eq!(state.next(&mut rng, true, |_| false), QueueSignal::Stop);
        assert_eq!(state.index(), Some(1));
        assert_eq!(state.shuffle_order()[state.shuffle_index()], 1);
        assert!(!state.overshot());
        assert!(!state.undershot());
    }

    #[test]
    fn test_shuffled_wrap_never_replays_finished_entry() {
        for seed in 0..200 {
            let mut rng = StdRng::seed_from_u64(seed);
            let mut state = QueueState::new();
            state.load(entries(&[1, 2, 3]), 0, None, &mut rng);
            state.set_repeat(RepeatMode::All);
            state.toggle_shuffle(true, &mut rng);
            let last = state.order()[state.shuffle_order()[2]].uid.clone();
            state.skip_to(&last);
            let finished = state.index();

            let signal = state.next(&mut rng, true, all);

            assert!(matches!(signal, QueueSignal::Wrapped { .. }), "seed {seed}");
            assert_ne!(state.index(), finished, "seed {seed}");
            assert_eq!(state.shuffle_index(), 0);
        }
    }

    #[test]
    fn test_enable_shuffle_keeps_current_position() {
        let (mut state, mut rng) = loaded(&[1, 2, 3, 4, 5], 2);

        state.toggle_shuffle(true, &mut rng);

        assert_eq!(state.shuffle_order()[2], 2);
        assert_eq!(state.shuffle_index(), 2);
        let mut sorted = state.shuffle_order().to_vec();
        sorted.sort_unstable();
        assert_eq!(sorted, vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn test_shuffled_traversal_visits_every_entry() {
        let (mut state, mut rng) = loaded(&[1, 2, 3, 4, 5], 0);
        state.toggle_shuffle(true, &mut rng);
        let first = state.order()[state.shuffle_order()[0]].uid.clone();
        state.skip_to(&first);

        let mut seen = vec![state.current().unwrap().id];
        while let QueueSignal::Moved { .. } = state.next(&mut rng, true, all) {
            seen.push(state.current().unwrap().id);
        }
        seen.sort_unstable();

        assert_eq!(seen, vec![1, 2, 3, 4, 5]);
        assert!(state.overshot());
    }

    #[test]
    fn test_append_to_shuffled_queue_lands_after_cursor() {
        let (mut state, mut rng) = loaded(&[1, 2, 3], 1);
        state.toggle_shuffle(true, &mut rng);
        let played = state.shuffle_order()[..=state.shuffle_index()].to_vec();

        state.append(entries(&[4, 5]), &mut rng);

        assert_eq!(state.len(), 5);
        assert_eq!(&state.shuffle_order()[..played.len()], played.as_slice());
        assert_eq!(state.shuffle_order()[state.shuffle_index()], state.index().unwrap());
        assert_eq!(state.shuffle_order().len(), 5);
    }

    #[test]
    fn test_append_to_empty_queue_starts_at_zero() {
        let mut rng = StdRng::seed_from_u64(3);
        let mut state = QueueState::new();
        state.toggle_shuffle(true, &mut rng);

        state.append(entries(&[8, 9]), &mut rng);

        assert_eq!(state.index(), Some(0));
        assert_eq!(state.shuffle_order()[state.shuffle_index()], 0);
    }

    #[test]
    fn test_remove_current_moves_to_following_entry() {
        let (mut state, _) = loaded(&[1, 2, 3], 1);

        state.remove("kind:TRACKS-id:2-source:feed");

        assert_eq!(state.current().unwrap().id, 3);
        assert_eq!(state.position_of("kind:TRACKS-id:3-source:feed"), Some(1));
        assert_eq!(state.remove("missing"), QueueSignal::NotInQueue);
    }

    #[test]
    fn test_remove_before_current_keeps_entry() {
        let (mut state, mut rng) = loaded(&[1, 2, 3], 2);
        state.toggle_shuffle(true, &mut rng);

        state.remove("kind:TRACKS-id:1-source:feed");

        assert_eq!(state.current().unwrap().id, 3);
        assert_eq!(state.shuffle_order().len(), 2);
        assert_eq!(state.shuffle_order()[state.shuffle_index()], state.index().unwrap());
    }
}
