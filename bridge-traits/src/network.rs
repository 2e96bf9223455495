//! Network Monitoring Abstraction
//!
//! Provides OS-level connectivity signals and active reachability probes.

use crate::error::Result;

/// Network connection type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetworkType {
    Cellular,
    WiFi,
    Ethernet,
    Other,
}

/// Network connection status as reported by the host OS
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetworkStatus {
    /// Connected to network
    Connected,
    /// Not connected to any network
    Disconnected,
    /// Connection status unknown or indeterminate
    Indeterminate,
}

/// Network information
#[derive(Debug, Clone)]
pub struct NetworkInfo {
    pub status: NetworkStatus,
    pub network_type: Option<NetworkType>,
    /// Whether the connection is metered (has data limits/costs)
    pub is_metered: bool,
}

impl NetworkInfo {
    pub fn connected(network_type: NetworkType) -> Self {
        Self {
            status: NetworkStatus::Connected,
            network_type: Some(network_type),
            is_metered: matches!(network_type, NetworkType::Cellular),
        }
    }

    pub fn disconnected() -> Self {
        Self {
            status: NetworkStatus::Disconnected,
            network_type: None,
            is_metered: false,
        }
    }
}

/// Network monitor trait
///
/// Host-side view of connectivity. The OS signal alone is not trusted to mark
/// the engine offline: the reachability monitor treats anything other than
/// `Connected` as "possibly unreachable" and confirms it with a
/// [`NetworkProbe`].
///
/// # Platform Support
///
/// - **Desktop**: polling TCP connect (see `bridge-desktop`)
/// - **iOS**: Network framework, Reachability
/// - **Android**: ConnectivityManager
#[async_trait::async_trait]
pub trait NetworkMonitor: Send + Sync {
    /// Get current network information
    async fn get_network_info(&self) -> Result<NetworkInfo>;

    /// Check if currently connected to any network
    async fn is_connected(&self) -> bool {
        matches!(
            self.get_network_info().await,
            Ok(NetworkInfo {
                status: NetworkStatus::Connected,
                ..
            })
        )
    }

    /// Subscribe to network status changes
    ///
    /// Implementations should emit an event whenever the status changes.
    async fn subscribe_changes(&self) -> Result<Box<dyn NetworkChangeStream>>;
}

/// Stream of network status changes
#[async_trait::async_trait]
pub trait NetworkChangeStream: Send {
    /// Get the next network info update
    ///
    /// Returns `None` when the stream is closed.
    async fn next(&mut self) -> Option<NetworkInfo>;
}

/// Active reachability probe.
///
/// Issues a single lightweight request against `url` and reports whether a
/// response came back. Timeouts are the implementation's responsibility.
#[async_trait::async_trait]
pub trait NetworkProbe: Send + Sync {
    async fn probe(&self, url: &str) -> bool;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cellular_is_metered() {
        let info = NetworkInfo::connected(NetworkType::Cellular);

        assert_eq!(info.status, NetworkStatus::Connected);
        assert!(info.is_metered);
    }

    #[test]
    fn test_disconnected_has_no_type() {
        let info = NetworkInfo::disconnected();

        assert_eq!(info.status, NetworkStatus::Disconnected);
        assert!(info.network_type.is_none());
    }
}
