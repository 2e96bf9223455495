//! Core service façade.
//!
//! This crate wires host-provided bridge implementations (content API client,
//! local asset store, network probe and monitor, clock) into one per-session
//! [`EngineContext`]. The context owns the pieces every lineup and queue
//! shares: the normalized entity cache, the reachability monitor and the
//! event bus. Desktop hosts enable the `desktop-shims` feature, which lets
//! [`EngineConfig`](core_runtime::config::EngineConfig) fall back to the TCP
//! probe from `bridge-desktop`.
//!
//! ```rust,ignore
//! use core_runtime::config::EngineConfig;
//! use core_service::{EngineContext, EngineDependencies};
//!
//! let config = EngineConfig::builder()
//!     .probe_url("https://discovery.example.org/health_check")
//!     .build()?;
//! let engine = EngineContext::new(config, EngineDependencies::new(client)).await?;
//!
//! let feed = engine.endpoint_lineup("feed", "feed", None);
//! feed.fetch(0, 10, serde_json::json!({})).await;
//!
//! let queue = engine.playback_queue();
//! engine.load_queue_from_lineup(&queue, &feed, None)?;
//!
//! engine.shutdown().await;
//! ```

pub mod context;
pub mod error;

pub use context::{EngineContext, EngineDependencies, OfflineTarget};
pub use error::{CoreError, Result};
