//! Workspace placeholder crate.
//!
//! This crate exists to expose shared feature flags that map to the individual
//! workspace crates (`core-service`, `core-playback`). Host applications can
//! depend on `lineup-engine-workspace` and enable the documented features
//! without wiring each crate individually.

#[cfg(feature = "desktop-shims")]
pub use core_service::{EngineContext, EngineDependencies};

#[cfg(feature = "playback")]
pub use core_playback::{PlaybackQueue, QueueSignal, RepeatMode};
