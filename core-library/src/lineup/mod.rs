//! # Lineups
//!
//! A lineup is a named, paginated, ordered list of entity references plus its
//! fetch status. Entries hold ids only; the entities live in the
//! [`NormalizedEntityCache`](crate::cache::NormalizedEntityCache).
//!
//! ```text
//! Idle ──fetch──> Loading ──ok──> Success ──fetch more──> Loading
//!                    │                                       │
//!                    └──err──> Error ──fetch──> Loading <────┘
//!
//! reset: any state ──> Idle
//! ```
//!
//! - [`Lineup`] - entries and pagination state
//! - [`LineupController`] - fetch orchestration for one lineup
//! - [`LineupStrategy`] - per-page behavior injected into the controller
//! - [`OfflineSource`] - local-download fallback used while unreachable

mod controller;
mod offline;
mod strategy;

pub use controller::LineupController;
pub use core_runtime::events::LineupStatus;
pub use offline::{OfflineSortKey, OfflineSource};
pub use strategy::{filter_and_cache, EndpointStrategy, LineupStrategy, ProcessedPage};

use crate::models::{EntityUid, Kind, LineupEntry};
use bridge_traits::EntityId;
use chrono::{DateTime, Utc};
use core_runtime::config::DEFAULT_PAGE_SIZE;
use std::collections::HashSet;

/// Per-lineup behavior switches.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineupOptions {
    /// Page size used by `fetch_more`
    pub page_size: usize,
    /// Drop entries whose `kind:id` is already in the lineup
    pub dedupe: bool,
    /// Drop deleted entities and entities owned by deactivated users
    pub remove_deleted: bool,
    /// Source segment of generated uids; defaults to the lineup prefix
    pub source: Option<String>,
}

impl Default for LineupOptions {
    fn default() -> Self {
        Self {
            page_size: DEFAULT_PAGE_SIZE,
            dedupe: false,
            remove_deleted: true,
            source: None,
        }
    }
}

impl LineupOptions {
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size;
        self
    }

    pub fn with_dedupe(mut self, dedupe: bool) -> Self {
        self.dedupe = dedupe;
        self
    }

    pub fn with_remove_deleted(mut self, remove_deleted: bool) -> Self {
        self.remove_deleted = remove_deleted;
        self
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }
}

/// Result of one `fetch` call. Failures are reported here and through the
/// lineup status, never as an `Err`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchOutcome {
    /// A page was applied
    Fetched {
        appended: usize,
        /// Entities dropped as deleted or owned by deactivated users
        deleted: usize,
        /// Slots the server could not resolve
        nulls: usize,
    },
    /// The lineup was filled from local downloads
    Offline { count: usize },
    /// Another fetch was already in flight; nothing was requested
    Coalesced,
    /// The lineup was reset while this fetch was in flight
    Abandoned,
    /// `fetch_more` was called with nothing left to load
    Exhausted,
    Failed(String),
}

/// One resolved entity ready to become a lineup entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageEntry {
    pub kind: Kind,
    pub id: EntityId,
    pub activity_timestamp: Option<DateTime<Utc>>,
    pub source_key: Option<String>,
}

/// Entries and pagination state of one lineup.
#[derive(Debug, Clone, PartialEq)]
pub struct Lineup {
    prefix: String,
    entries: Vec<LineupEntry>,
    status: LineupStatus,
    next_offset: usize,
    has_more: bool,
}

impl Lineup {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            entries: Vec::new(),
            status: LineupStatus::Idle,
            next_offset: 0,
            has_more: true,
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn entries(&self) -> &[LineupEntry] {
        &self.entries
    }

    pub fn status(&self) -> LineupStatus {
        self.status
    }

    pub fn next_offset(&self) -> usize {
        self.next_offset
    }

    pub fn has_more(&self) -> bool {
        self.has_more
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn uids(&self) -> Vec<String> {
        self.entries.iter().map(|entry| entry.uid.clone()).collect()
    }

    pub fn position_of(&self, uid: &str) -> Option<usize> {
        self.entries.iter().position(|entry| entry.uid == uid)
    }

    pub(crate) fn reset(&mut self) {
        self.entries.clear();
        self.status = LineupStatus::Idle;
        self.next_offset = 0;
        self.has_more = true;
    }

    pub(crate) fn set_status(&mut self, status: LineupStatus) {
        self.status = status;
    }

    /// Apply a page fetched at `offset`.
    ///
    /// Entries at `offset..` are overwritten in place and the rest appended,
    /// so the lineup never shrinks. An overwritten entry keeps its uid when
    /// the new entity at that position is the same one. Returns how many
    /// entries the page contributed after dedupe.
    pub(crate) fn apply_page(
        &mut self,
        offset: usize,
        page: Vec<PageEntry>,
        source: &str,
        dedupe: bool,
    ) -> usize {
        let offset = offset.min(self.entries.len());

        let page = if dedupe {
            self.dedupe_page(offset, page)
        } else {
            page
        };

        let overwrite_end = (offset + page.len()).min(self.entries.len());
        let mut taken: HashSet<String> = self.entries[..offset]
            .iter()
            .chain(&self.entries[overwrite_end..])
            .map(|entry| entry.uid.clone())
            .collect();

        let count = page.len();
        for (i, item) in page.into_iter().enumerate() {
            let position = offset + i;
            let previous = self.entries.get(position);

            let uid = match previous {
                Some(prev)
                    if prev.entry_key() == (item.kind, item.id) && !taken.contains(&prev.uid) =>
                {
                    taken.insert(prev.uid.clone());
                    prev.uid.clone()
                }
                _ => EntityUid::allocate(item.kind, item.id, source, &mut taken),
            };

            let entry = LineupEntry {
                uid,
                id: item.id,
                kind: item.kind,
                activity_timestamp: item.activity_timestamp,
                source_key: item.source_key,
            };

            if position < self.entries.len() {
                self.entries[position] = entry;
            } else {
                self.entries.push(entry);
            }
        }

        count
    }

    /// Drop page entries already present outside the slots the page will
    /// overwrite. Dropping entries shortens the overwrite and exposes more of
    /// the tail, so this repeats until the kept set is stable.
    fn dedupe_page(&self, offset: usize, page: Vec<PageEntry>) -> Vec<PageEntry> {
        let mut kept = page;
        loop {
            let tail_start = (offset + kept.len()).min(self.entries.len());
            let mut seen: HashSet<(Kind, EntityId)> = self.entries[..offset]
                .iter()
                .chain(&self.entries[tail_start..])
                .map(LineupEntry::entry_key)
                .collect();

            let before = kept.len();
            kept.retain(|entry| seen.insert((entry.kind, entry.id)));
            if kept.len() == before {
                return kept;
            }
        }
    }

    /// Record pagination after a successful online page.
    pub(crate) fn complete_page(&mut self, offset: usize, raw_len: usize, limit: usize) {
        self.next_offset = self.next_offset.max(offset + raw_len);
        self.has_more = raw_len == limit;
        self.status = LineupStatus::Success;
    }

    /// Write the full local set from the front and end pagination. The
    /// controller resets a populated lineup first.
    pub(crate) fn fill_offline(&mut self, page: Vec<PageEntry>, source: &str) -> usize {
        let count = self.apply_page(0, page, source, true);
        self.next_offset = self.entries.len();
        self.has_more = false;
        self.status = LineupStatus::Success;
        count
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn track(id: EntityId) -> PageEntry {
        PageEntry {
            kind: Kind::Tracks,
            id,
            activity_timestamp: None,
            source_key: None,
        }
    }

    fn assert_unique_uids(lineup: &Lineup) {
        let uids: HashSet<_> = lineup.uids().into_iter().collect();
        assert_eq!(uids.len(), lineup.len());
    }

    #[test]
    fn test_new_lineup_is_idle() {
        let lineup = Lineup::new("feed");

        assert_eq!(lineup.status(), LineupStatus::Idle);
        assert!(lineup.has_more());
        assert_eq!(lineup.next_offset(), 0);
    }

    #[test]
    fn test_append_pages() {
        let mut lineup = Lineup::new("feed");

        lineup.apply_page(0, vec![track(1), track(2)], "feed", false);
        lineup.complete_page(0, 2, 2);
        lineup.apply_page(2, vec![track(3)], "feed", false);
        lineup.complete_page(2, 1, 2);

        assert_eq!(lineup.len(), 3);
        assert_eq!(lineup.next_offset(), 3);
        assert!(!lineup.has_more());
        assert_eq!(lineup.entries()[2].uid, "kind:TRACKS-id:3-source:feed");
    }

    #[test]
    fn test_repeated_id_gets_counted_uid() {
        let mut lineup = Lineup::new("feed");

        lineup.apply_page(0, vec![track(1), track(1)], "feed", false);

        assert_eq!(lineup.len(), 2);
        assert_eq!(lineup.entries()[1].uid, "kind:TRACKS-id:1-source:feed-count:1");
        assert_unique_uids(&lineup);
    }

    #[test]
    fn test_dedupe_drops_known_entries() {
        let mut lineup = Lineup::new("feed");

        lineup.apply_page(0, vec![track(1), track(2)], "feed", true);
        let added = lineup.apply_page(2, vec![track(2), track(3), track(3)], "feed", true);

        assert_eq!(added, 1);
        let ids: Vec<_> = lineup.entries().iter().map(|e| e.id).collect();
        assert_eq!(ids, vec![1, 2, 3]);
    }

    #[test]
    fn test_refetch_at_zero_never_shrinks() {
        let mut lineup = Lineup::new("feed");
        lineup.apply_page(0, vec![track(1), track(2), track(3)], "feed", false);
        let first_uid = lineup.entries()[0].uid.clone();

        lineup.apply_page(0, vec![track(1)], "feed", false);

        assert_eq!(lineup.len(), 3);
        assert_eq!(lineup.entries()[0].uid, first_uid);
        assert_unique_uids(&lineup);
    }

    #[test]
    fn test_overwrite_avoids_uid_collision_with_tail() {
        let mut lineup = Lineup::new("feed");
        lineup.apply_page(0, vec![track(1), track(2)], "feed", false);

        // Track 2 moved to the front; the tail still holds its old uid.
        lineup.apply_page(0, vec![track(2)], "feed", false);

        assert_eq!(lineup.len(), 2);
        assert_eq!(lineup.entries()[0].id, 2);
        assert_unique_uids(&lineup);
    }

    #[test]
    fn test_offset_past_end_appends() {
        let mut lineup = Lineup::new("feed");
        lineup.apply_page(10, vec![track(1)], "feed", false);

        assert_eq!(lineup.len(), 1);
    }

    #[test]
    fn test_dedupe_refetch_at_zero_respects_tail() {
        let mut lineup = Lineup::new("feed");
        lineup.apply_page(0, vec![track(1), track(2)], "feed", true);

        let added = lineup.apply_page(0, vec![track(2)], "feed", true);

        assert_eq!(added, 0);
        let ids: Vec<_> = lineup.entries().iter().map(|e| e.id).collect();
        assert_eq!(ids, vec![1, 2]);
        assert_unique_uids(&lineup);
    }

    #[test]
    fn test_dedupe_overwrite_keeps_new_entries() {
        let mut lineup = Lineup::new("feed");
        lineup.apply_page(0, vec![track(1), track(2), track(3)], "feed", true);

        let added = lineup.apply_page(0, vec![track(4), track(3)], "feed", true);

        assert_eq!(added, 1);
        let ids: Vec<_> = lineup.entries().iter().map(|e| e.id).collect();
        assert_eq!(ids, vec![4, 2, 3]);
    }

    #[test]
    fn test_fill_offline_ends_pagination() {
        let mut lineup = Lineup::new("favorites");

        let count = lineup.fill_offline(vec![track(1), track(2), track(1)], "favorites");

        assert_eq!(count, 2);
        assert_eq!(lineup.len(), 2);
        assert_eq!(lineup.next_offset(), 2);
        assert!(!lineup.has_more());
        assert_eq!(lineup.status(), LineupStatus::Success);
    }

    #[test]
    fn test_fill_offline_never_shrinks() {
        let mut lineup = Lineup::new("favorites");
        lineup.apply_page(0, vec![track(7), track(8), track(9)], "favorites", false);

        lineup.fill_offline(vec![track(1)], "favorites");

        assert_eq!(lineup.len(), 3);
        assert_eq!(lineup.entries()[0].id, 1);
    }

    #[test]
    fn test_reset() {
        let mut lineup = Lineup::new("feed");
        lineup.apply_page(0, vec![track(1)], "feed", false);
        lineup.complete_page(0, 1, 1);

        lineup.reset();

        assert!(lineup.is_empty());
        assert_eq!(lineup.status(), LineupStatus::Idle);
        assert!(lineup.has_more());
        assert_eq!(lineup.next_offset(), 0);
    }
}
