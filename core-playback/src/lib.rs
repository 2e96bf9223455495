//! # Playback Queue
//!
//! Derives a playback order from a lineup and owns shuffle, repeat and
//! boundary state.
//!
//! ## Overview
//!
//! - [`QueueState`] - the pure state machine (`load`, `next`, `previous`,
//!   `skip_to`, `toggle_shuffle`, `set_repeat`, `append`, `remove`)
//! - [`PlaybackQueue`] - the shared handle: one write lock per operation,
//!   cache-backed skipping of deleted tracks and `QueueChanged` events
//!
//! The queue holds uid/id keys only. Whether an entry can be played is looked
//! up in the [`NormalizedEntityCache`](core_library::NormalizedEntityCache) at
//! traversal time.

pub mod error;
pub mod playback_queue;
pub mod queue;

pub use error::{PlaybackError, Result};
pub use playback_queue::PlaybackQueue;
pub use queue::{QueueEntry, QueueSignal, QueueState, RepeatMode};
