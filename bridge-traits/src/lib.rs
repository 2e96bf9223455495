//! # Host Bridge Traits
//!
//! Capabilities the lineup engine needs but that each host platform provides.
//!
//! ## Traits
//!
//! ### Content & Storage
//! - [`ContentApiClient`](content::ContentApiClient) - Paged entity fetches and single-track lookups
//! - [`LocalAssetStore`](storage::LocalAssetStore) - Downloaded tracks, (re)download and removal requests
//!
//! ### Connectivity
//! - [`NetworkMonitor`](network::NetworkMonitor) - OS connectivity status and change stream
//! - [`NetworkProbe`](network::NetworkProbe) - Active reachability check
//!
//! ### Utilities
//! - [`Clock`](time::Clock) - Time source for deterministic testing
//! - [`LoggerSink`](time::LoggerSink) - Forward structured logs to host logging
//!
//! ## Error Handling
//!
//! All bridge traits use [`BridgeError`](error::BridgeError). Implementations
//! should map transport failures to `Network`, missing resources to `NotFound`
//! and permission failures to `Unauthorized` so the engine can classify them.
//!
//! ## Thread Safety
//!
//! All bridge traits require `Send + Sync`; the engine shares them across
//! tasks behind `Arc`.

pub mod content;
pub mod error;
pub mod network;
pub mod storage;
pub mod time;

pub use error::BridgeError;

pub use content::{ContentApiClient, EntityId, EntriesQuery, RawEntity};
pub use network::{NetworkChangeStream, NetworkInfo, NetworkMonitor, NetworkProbe, NetworkStatus, NetworkType};
pub use storage::{
    DownloadPredicate, DownloadReason, DownloadReasonKind, LocalAssetStore, LocalEntry,
    OfflineDownloadRecord, FAVORITES_COLLECTION,
};
pub use time::{Clock, ConsoleLogger, LogEntry, LogLevel, LoggerSink, ManualClock, SystemClock};
