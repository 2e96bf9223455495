//! # Library Module
//!
//! Owns the session's normalized entity cache and the paginated lineups built
//! on top of it.
//!
//! ## Overview
//!
//! This module manages:
//! - Entity models, kinds and per-lineup unique ids ([`models`])
//! - The shared [`NormalizedEntityCache`] (add/merge only)
//! - [`Lineup`] state and the [`LineupController`] that fetches, processes,
//!   caches and appends pages, falling back to local downloads when offline

pub mod cache;
pub mod error;
pub mod lineup;
pub mod models;

pub use cache::{AddOptions, NormalizedEntityCache};
pub use error::{LibraryError, Result};
pub use lineup::{
    EndpointStrategy, FetchOutcome, Lineup, LineupController, LineupOptions, LineupStatus,
    LineupStrategy, OfflineSortKey, OfflineSource, ProcessedPage,
};
pub use models::{Entity, EntityUid, Kind, LineupEntry};
