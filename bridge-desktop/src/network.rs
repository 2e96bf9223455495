//! Network Monitoring Implementation

use async_trait::async_trait;
use bridge_traits::{
    error::Result,
    network::{
        NetworkChangeStream, NetworkInfo, NetworkMonitor, NetworkProbe, NetworkStatus, NetworkType,
    },
};
use core_async::time::{sleep, timeout, Duration};
use std::sync::Arc;
use tracing::debug;

const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(5);
const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// `NetworkProbe` that treats a successful TCP connect to the URL's host as
/// reachable.
#[derive(Debug, Clone)]
pub struct TcpNetworkProbe {
    timeout: Duration,
}

impl TcpNetworkProbe {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

impl Default for TcpNetworkProbe {
    fn default() -> Self {
        Self::new(DEFAULT_PROBE_TIMEOUT)
    }
}

/// Extracts `host:port` from an `http(s)://host[:port]/path` URL.
fn socket_address(url: &str) -> Option<String> {
    let (default_port, rest) = if let Some(rest) = url.strip_prefix("https://") {
        (443, rest)
    } else if let Some(rest) = url.strip_prefix("http://") {
        (80, rest)
    } else {
        (443, url)
    };

    let authority = rest.split(['/', '?', '#']).next()?;
    if authority.is_empty() {
        return None;
    }

    if authority.contains(':') {
        Some(authority.to_string())
    } else {
        Some(format!("{}:{}", authority, default_port))
    }
}

#[async_trait]
impl NetworkProbe for TcpNetworkProbe {
    async fn probe(&self, url: &str) -> bool {
        let Some(address) = socket_address(url) else {
            debug!(url, "Probe URL has no host");
            return false;
        };

        let reachable = matches!(
            timeout(self.timeout, tokio::net::TcpStream::connect(address.as_str())).await,
            Ok(Ok(_))
        );
        debug!(%address, reachable, "Reachability probe finished");
        reachable
    }
}

/// Desktop network monitor implementation
///
/// Desktop platforms do not expose a portable reachability callback, so this
/// monitor polls a [`TcpNetworkProbe`] and reports transitions.
pub struct DesktopNetworkMonitor {
    probe: Arc<TcpNetworkProbe>,
    probe_url: String,
    poll_interval: Duration,
}

impl DesktopNetworkMonitor {
    pub fn new(probe_url: impl Into<String>) -> Self {
        Self {
            probe: Arc::new(TcpNetworkProbe::default()),
            probe_url: probe_url.into(),
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    async fn current_info(probe: &TcpNetworkProbe, url: &str) -> NetworkInfo {
        if probe.probe(url).await {
            // Desktop cannot tell WiFi from Ethernet without platform APIs
            NetworkInfo::connected(NetworkType::Other)
        } else {
            NetworkInfo::disconnected()
        }
    }
}

#[async_trait]
impl NetworkMonitor for DesktopNetworkMonitor {
    async fn get_network_info(&self) -> Result<NetworkInfo> {
        Ok(Self::current_info(&self.probe, &self.probe_url).await)
    }

    async fn subscribe_changes(&self) -> Result<Box<dyn NetworkChangeStream>> {
        Ok(Box::new(DesktopNetworkChangeStream {
            probe: Arc::clone(&self.probe),
            probe_url: self.probe_url.clone(),
            poll_interval: self.poll_interval,
            last_status: None,
        }))
    }
}

/// Network change stream that polls for changes
struct DesktopNetworkChangeStream {
    probe: Arc<TcpNetworkProbe>,
    probe_url: String,
    poll_interval: Duration,
    last_status: Option<NetworkStatus>,
}

#[async_trait]
impl NetworkChangeStream for DesktopNetworkChangeStream {
    async fn next(&mut self) -> Option<NetworkInfo> {
        loop {
            sleep(self.poll_interval).await;

            let info = DesktopNetworkMonitor::current_info(&self.probe, &self.probe_url).await;
            if self.last_status != Some(info.status) {
                self.last_status = Some(info.status);
                return Some(info);
            }
        }
    }
}
