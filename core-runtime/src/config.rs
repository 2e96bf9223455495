//! # Engine Configuration Module
//!
//! ## Overview
//!
//! The configuration system uses a builder pattern to construct an
//! [`EngineConfig`] holding every tunable and host bridge the engine needs.
//! It enforces fail-fast validation so a misconfigured session never starts.
//!
//! ## Required
//!
//! - `probe_url` - Endpoint used to confirm reachability before going offline
//! - `NetworkProbe` - Active reachability check (desktop default: TCP connect)
//!
//! ## Optional
//!
//! - `NetworkMonitor` - OS connectivity stream attached to the reachability monitor
//! - `Clock` - Time source for `verified_at` stamps (default: system clock)
//!
//! When the `desktop-shims` feature is enabled, a `TcpNetworkProbe` from
//! `bridge-desktop` is injected if no probe was provided.
//!
//! ## Usage
//!
//! ```ignore
//! use core_runtime::config::EngineConfig;
//! use std::time::Duration;
//!
//! let config = EngineConfig::builder()
//!     .probe_url("https://discovery.example.org/health_check")
//!     .page_size(25)
//!     .reachability_debounce(Duration::from_millis(2500))
//!     .build()?;
//! ```

use crate::error::{Error, Result};
use crate::events::DEFAULT_EVENT_BUFFER_SIZE;
use bridge_traits::{Clock, NetworkMonitor, NetworkProbe, SystemClock};
use core_async::time::Duration;
use std::sync::Arc;

pub const DEFAULT_PAGE_SIZE: usize = 10;
pub const MAX_PAGE_SIZE: usize = 500;
pub const DEFAULT_REACHABILITY_DEBOUNCE: Duration = Duration::from_millis(2500);
pub const DEFAULT_REACHABILITY_MAX_WAIT: Duration = Duration::from_millis(5000);
pub const DEFAULT_REQUEUE_DELAY: Duration = Duration::from_millis(500);

/// Defaults applied to every lineup unless its options override them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LineupDefaults {
    /// Page size used by `fetch_more`
    pub page_size: usize,
}

impl Default for LineupDefaults {
    fn default() -> Self {
        Self {
            page_size: DEFAULT_PAGE_SIZE,
        }
    }
}

/// Reachability debounce settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReachabilityConfig {
    /// Quiet period after the last "possibly unreachable" signal
    pub debounce: Duration,
    /// Upper bound between the first signal and the probe
    pub max_wait: Duration,
    pub probe_url: String,
    /// Reachability assumed before the first signal arrives
    pub initially_reachable: bool,
}

impl ReachabilityConfig {
    pub fn new(probe_url: impl Into<String>) -> Self {
        Self {
            debounce: DEFAULT_REACHABILITY_DEBOUNCE,
            max_wait: DEFAULT_REACHABILITY_MAX_WAIT,
            probe_url: probe_url.into(),
            initially_reachable: true,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.probe_url.is_empty() {
            return Err(Error::Config("Probe URL cannot be empty".to_string()));
        }

        if !self.probe_url.starts_with("http://") && !self.probe_url.starts_with("https://") {
            return Err(Error::Config(format!(
                "Probe URL must be http(s), got '{}'",
                self.probe_url
            )));
        }

        if self.debounce.is_zero() {
            return Err(Error::Config(
                "Reachability debounce must be greater than 0".to_string(),
            ));
        }

        if self.max_wait < self.debounce {
            return Err(Error::Config(
                "Reachability max wait must not be shorter than the debounce".to_string(),
            ));
        }

        Ok(())
    }
}

/// Staleness revalidation settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StalenessConfig {
    /// Pause before a requeued task starts waiting for reachability again
    pub requeue_delay: Duration,
}

impl Default for StalenessConfig {
    fn default() -> Self {
        Self {
            requeue_delay: DEFAULT_REQUEUE_DELAY,
        }
    }
}

/// Feature flags control optional engine behavior.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeatureFlags {
    /// Serve lineups with an `OfflineSource` from local downloads while unreachable
    pub offline_fallback: bool,
    /// Allow staleness revalidation tasks to be spawned
    pub staleness_revalidation: bool,
}

impl Default for FeatureFlags {
    fn default() -> Self {
        Self {
            offline_fallback: true,
            staleness_revalidation: true,
        }
    }
}

/// Engine configuration.
///
/// Use [`EngineConfig::builder`] to construct instances.
#[derive(Clone)]
pub struct EngineConfig {
    pub lineup: LineupDefaults,
    pub reachability: ReachabilityConfig,
    pub staleness: StalenessConfig,
    pub event_buffer_size: usize,
    pub features: FeatureFlags,
    pub network_probe: Arc<dyn NetworkProbe>,
    pub network_monitor: Option<Arc<dyn NetworkMonitor>>,
    pub clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for EngineConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineConfig")
            .field("lineup", &self.lineup)
            .field("reachability", &self.reachability)
            .field("staleness", &self.staleness)
            .field("event_buffer_size", &self.event_buffer_size)
            .field("features", &self.features)
            .field("network_probe", &"NetworkProbe { ... }")
            .field(
                "network_monitor",
                &self
                    .network_monitor
                    .as_ref()
                    .map(|_| "NetworkMonitor { ... }"),
            )
            .finish()
    }
}

impl EngineConfig {
    pub fn builder() -> EngineConfigBuilder {
        EngineConfigBuilder::default()
    }

    /// Validates the configuration.
    ///
    /// This checks:
    /// - Page size is within `1..=MAX_PAGE_SIZE`
    /// - Reachability settings are consistent
    /// - Event buffer is non-empty
    pub fn validate(&self) -> Result<()> {
        if self.lineup.page_size == 0 {
            return Err(Error::Config(
                "Page size must be greater than 0".to_string(),
            ));
        }

        if self.lineup.page_size > MAX_PAGE_SIZE {
            return Err(Error::Config(format!(
                "Page size exceeds maximum of {}",
                MAX_PAGE_SIZE
            )));
        }

        self.reachability.validate()?;

        if self.event_buffer_size == 0 {
            return Err(Error::Config(
                "Event buffer size must be greater than 0".to_string(),
            ));
        }

        if self.staleness.requeue_delay > Duration::from_secs(60) {
            return Err(Error::Config(
                "Requeue delay exceeds maximum of 60 seconds".to_string(),
            ));
        }

        Ok(())
    }
}

#[cfg(feature = "desktop-shims")]
fn provide_default_network_probe() -> Result<Arc<dyn NetworkProbe>> {
    use bridge_desktop::TcpNetworkProbe;

    let probe: Arc<dyn NetworkProbe> = Arc::new(TcpNetworkProbe::default());
    Ok(probe)
}

#[cfg(not(feature = "desktop-shims"))]
fn provide_default_network_probe() -> Result<Arc<dyn NetworkProbe>> {
    Err(Error::CapabilityMissing {
        capability: "NetworkProbe".to_string(),
        message: "NetworkProbe implementation is required to confirm reachability. \
                 Desktop: enable the 'desktop-shims' feature to use the default TcpNetworkProbe. \
                 Mobile: inject a probe backed by the platform HTTP stack."
            .to_string(),
    })
}

/// Builder for [`EngineConfig`].
#[derive(Default)]
pub struct EngineConfigBuilder {
    page_size: Option<usize>,
    probe_url: Option<String>,
    reachability_debounce: Option<Duration>,
    reachability_max_wait: Option<Duration>,
    initially_reachable: Option<bool>,
    requeue_delay: Option<Duration>,
    event_buffer_size: Option<usize>,
    features: FeatureFlags,
    network_probe: Option<Arc<dyn NetworkProbe>>,
    network_monitor: Option<Arc<dyn NetworkMonitor>>,
    clock: Option<Arc<dyn Clock>>,
}

impl EngineConfigBuilder {
    pub fn page_size(mut self, page_size: usize) -> Self {
        self.page_size = Some(page_size);
        self
    }

    /// Sets the URL probed before declaring the network unreachable.
    pub fn probe_url(mut self, url: impl Into<String>) -> Self {
        self.probe_url = Some(url.into());
        self
    }

    pub fn reachability_debounce(mut self, debounce: Duration) -> Self {
        self.reachability_debounce = Some(debounce);
        self
    }

    pub fn reachability_max_wait(mut self, max_wait: Duration) -> Self {
        self.reachability_max_wait = Some(max_wait);
        self
    }

    pub fn initially_reachable(mut self, reachable: bool) -> Self {
        self.initially_reachable = Some(reachable);
        self
    }

    pub fn requeue_delay(mut self, delay: Duration) -> Self {
        self.requeue_delay = Some(delay);
        self
    }

    pub fn event_buffer_size(mut self, size: usize) -> Self {
        self.event_buffer_size = Some(size);
        self
    }

    pub fn enable_offline_fallback(mut self, enabled: bool) -> Self {
        self.features.offline_fallback = enabled;
        self
    }

    pub fn enable_staleness_revalidation(mut self, enabled: bool) -> Self {
        self.features.staleness_revalidation = enabled;
        self
    }

    pub fn features(mut self, features: FeatureFlags) -> Self {
        self.features = features;
        self
    }

    pub fn network_probe(mut self, probe: Arc<dyn NetworkProbe>) -> Self {
        self.network_probe = Some(probe);
        self
    }

    pub fn network_monitor(mut self, monitor: Arc<dyn NetworkMonitor>) -> Self {
        self.network_monitor = Some(monitor);
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Builds the final `EngineConfig` instance.
    ///
    /// # Errors
    ///
    /// - `Error::Config` when the probe URL is missing or a value is out of range
    /// - `Error::CapabilityMissing` when no `NetworkProbe` is available
    pub fn build(self) -> Result<EngineConfig> {
        let probe_url = self.probe_url.ok_or_else(|| {
            Error::Config("Probe URL is required. Use .probe_url() to set it.".to_string())
        })?;

        let network_probe = match self.network_probe {
            Some(probe) => probe,
            None => provide_default_network_probe()?,
        };

        let mut reachability = ReachabilityConfig::new(probe_url);
        if let Some(debounce) = self.reachability_debounce {
            reachability.debounce = debounce;
        }
        if let Some(max_wait) = self.reachability_max_wait {
            reachability.max_wait = max_wait;
        }
        if let Some(reachable) = self.initially_reachable {
            reachability.initially_reachable = reachable;
        }

        let config = EngineConfig {
            lineup: LineupDefaults {
                page_size: self.page_size.unwrap_or(DEFAULT_PAGE_SIZE),
            },
            reachability,
            staleness: StalenessConfig {
                requeue_delay: self.requeue_delay.unwrap_or(DEFAULT_REQUEUE_DELAY),
            },
            event_buffer_size: self.event_buffer_size.unwrap_or(DEFAULT_EVENT_BUFFER_SIZE),
            features: self.features,
            network_probe,
            network_monitor: self.network_monitor,
            clock: self.clock.unwrap_or_else(|| Arc::new(SystemClock)),
        };

        config.validate()?;

        Ok(config)
    }
}
