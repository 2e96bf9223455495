//! # Desktop Bridge Implementations
//!
//! Default implementations of the connectivity bridges for desktop platforms
//! (macOS, Windows, Linux).
//!
//! - `TcpNetworkProbe`: `NetworkProbe` that opens a TCP connection to the
//!   probe URL's host
//! - `DesktopNetworkMonitor`: `NetworkMonitor` that polls a probe and emits
//!   status changes
//!
//! The content API client and the local asset store are always host-provided.
//!
//! ```ignore
//! use bridge_desktop::{DesktopNetworkMonitor, TcpNetworkProbe};
//! use std::sync::Arc;
//!
//! let probe = Arc::new(TcpNetworkProbe::default());
//! let monitor = Arc::new(DesktopNetworkMonitor::new("https://discovery.example.org/health_check"));
//! ```

mod network;

pub use network::{DesktopNetworkMonitor, TcpNetworkProbe};
