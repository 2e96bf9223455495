//! # Download Staleness
//!
//! Keeps on-device downloads honest against the server.
//!
//! ## Overview
//!
//! The [`StalenessRevalidator`] runs one cancellable background task per
//! downloaded track. Each task:
//! - waits until the network is reachable
//! - fetches the server's current metadata for the track
//! - requests exactly one redownload when the server copy is newer, reports
//!   gone or gated tracks as unplayable, and otherwise stamps `verified_at`
//!
//! Losing reachability mid-flight requeues the task; removing the download
//! cancels it. Every finished task publishes a `StalenessResult` event.

pub mod error;
pub mod staleness;

pub use error::{Result, SyncError};
pub use staleness::{RevalidationId, StalenessRevalidator};
