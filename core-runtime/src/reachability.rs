//! # Reachability Monitor
//!
//! Process-wide "can we reach the content API" flag.
//!
//! The OS connectivity signal is noisy: it flips to "disconnected" during
//! Wi-Fi handoffs and captive portals. The monitor therefore treats an OS
//! "possibly unreachable" signal as a hint only:
//!
//! ```text
//!  PossiblyUnreachable ──> debounce (extends on every signal, capped at max_wait)
//!                              │
//!                              ▼
//!                         one probe ──fail──> reachable = false
//!                              │
//!                              └──ok────> reachable = true
//!
//!  Reachable ──> reachable = true immediately, pending check cancelled
//! ```
//!
//! Consumers read the current state with [`ReachabilityMonitor::is_reachable`]
//! or subscribe to changes with [`ReachabilityMonitor::subscribe`]. Every flip
//! is also published on the event bus as `ReachabilityEvent::Changed`.

use crate::config::ReachabilityConfig;
use crate::error::Result;
use crate::events::{CoreEvent, EventBus, ReachabilityEvent};
use crate::logging::strip_query;
use bridge_traits::{NetworkMonitor, NetworkProbe, NetworkStatus};
use core_async::sync::{mpsc, watch, CancellationToken};
use core_async::time::{sleep_until, Instant};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Connectivity hint delivered by the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReachabilitySignal {
    /// OS reports a usable connection
    Reachable,
    /// OS reports no connection or an indeterminate one
    PossiblyUnreachable,
}

impl From<NetworkStatus> for ReachabilitySignal {
    fn from(status: NetworkStatus) -> Self {
        match status {
            NetworkStatus::Connected => ReachabilitySignal::Reachable,
            NetworkStatus::Disconnected | NetworkStatus::Indeterminate => {
                ReachabilitySignal::PossiblyUnreachable
            }
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Command {
    Check,
    Cancel,
}

struct Inner {
    config: ReachabilityConfig,
    state: watch::Sender<bool>,
    /// Bumped on every `Reachable` signal; a probe result is dropped when the
    /// epoch moved while it was in flight.
    epoch: AtomicU64,
    commands: mpsc::UnboundedSender<Command>,
    event_bus: EventBus,
    shutdown: CancellationToken,
}

impl Inner {
    fn set_reachable(&self, reachable: bool) {
        let changed = self.state.send_if_modified(|current| {
            if *current == reachable {
                false
            } else {
                *current = reachable;
                true
            }
        });

        if changed {
            info!(reachable, "Reachability changed");
            self.event_bus
                .emit(CoreEvent::Reachability(ReachabilityEvent::Changed {
                    reachable,
                }))
                .ok();
        }
    }
}

/// Debounced, probe-confirmed reachability flag.
///
/// Cloning is cheap; all clones share the same state and worker.
#[derive(Clone)]
pub struct ReachabilityMonitor {
    inner: Arc<Inner>,
}

impl ReachabilityMonitor {
    /// Creates the monitor and spawns its debounce worker.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn start(
        config: ReachabilityConfig,
        probe: Arc<dyn NetworkProbe>,
        event_bus: EventBus,
    ) -> Self {
        let (state, _) = watch::channel(config.initially_reachable);
        let (commands, receiver) = mpsc::unbounded_channel();

        let inner = Arc::new(Inner {
            config,
            state,
            epoch: AtomicU64::new(0),
            commands,
            event_bus,
            shutdown: CancellationToken::new(),
        });

        core_async::spawn(run_worker(Arc::clone(&inner), probe, receiver));

        Self { inner }
    }

    pub fn is_reachable(&self) -> bool {
        *self.inner.state.borrow()
    }

    /// Subscribe to reachability changes. The receiver starts at the current
    /// value.
    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.inner.state.subscribe()
    }

    /// Feed one connectivity hint into the monitor.
    pub fn handle_signal(&self, signal: ReachabilitySignal) {
        debug!(?signal, "Reachability signal");

        match signal {
            ReachabilitySignal::Reachable => {
                self.inner.epoch.fetch_add(1, Ordering::SeqCst);
                self.inner.commands.send(Command::Cancel).ok();
                self.inner.set_reachable(true);
            }
            ReachabilitySignal::PossiblyUnreachable => {
                self.inner.commands.send(Command::Check).ok();
            }
        }
    }

    /// Resolves once reachability equals `reachable`. Returns immediately when
    /// it already does, and also returns if the monitor is dropped.
    pub async fn wait_for(&self, reachable: bool) {
        let mut receiver = self.subscribe();
        loop {
            if *receiver.borrow_and_update() == reachable {
                return;
            }
            if receiver.changed().await.is_err() {
                return;
            }
        }
    }

    /// Forward a host [`NetworkMonitor`]'s change stream into this monitor.
    ///
    /// The current status is applied first. The forwarding task ends when the
    /// stream closes or the monitor shuts down.
    pub async fn attach(&self, monitor: Arc<dyn NetworkMonitor>) -> Result<()> {
        let info = monitor.get_network_info().await?;
        self.handle_signal(info.status.into());

        let mut changes = monitor.subscribe_changes().await?;
        let this = self.clone();
        let token = self.inner.shutdown.clone();

        core_async::spawn(async move {
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    info = changes.next() => match info {
                        Some(info) => this.handle_signal(info.status.into()),
                        None => {
                            debug!("Network change stream closed");
                            break;
                        }
                    },
                }
            }
        });

        Ok(())
    }

    /// Stop the worker and any attached forwarding task.
    pub fn shutdown(&self) {
        self.inner.shutdown.cancel();
    }

    pub fn config(&self) -> &ReachabilityConfig {
        &self.inner.config
    }
}

impl std::fmt::Debug for ReachabilityMonitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReachabilityMonitor")
            .field("reachable", &self.is_reachable())
            .field("config", &self.inner.config)
            .finish()
    }
}

async fn run_worker(
    inner: Arc<Inner>,
    probe: Arc<dyn NetworkProbe>,
    mut commands: mpsc::UnboundedReceiver<Command>,
) {
    let debounce = inner.config.debounce;
    let max_wait = inner.config.max_wait;
    let token = inner.shutdown.clone();

    'idle: loop {
        let first_signal = tokio::select! {
            _ = token.cancelled() => break,
            command = commands.recv() => match command {
                Some(Command::Check) => Instant::now(),
                Some(Command::Cancel) => continue 'idle,
                None => break,
            },
        };

        let epoch = inner.epoch.load(Ordering::SeqCst);
        let hard_deadline = first_signal + max_wait;
        let mut deadline = (first_signal + debounce).min(hard_deadline);

        loop {
            tokio::select! {
                _ = token.cancelled() => break 'idle,
                _ = sleep_until(deadline) => break,
                command = commands.recv() => match command {
                    Some(Command::Check) => {
                        deadline = (Instant::now() + debounce).min(hard_deadline);
                    }
                    Some(Command::Cancel) => {
                        debug!("Pending reachability check cancelled");
                        continue 'idle;
                    }
                    None => break 'idle,
                },
            }
        }

        let url = inner.config.probe_url.as_str();
        let reachable = tokio::select! {
            _ = token.cancelled() => break,
            reachable = probe.probe(url) => reachable,
        };

        if inner.epoch.load(Ordering::SeqCst) != epoch {
            debug!("Discarding probe result superseded by a reachable signal");
            continue;
        }

        if reachable {
            debug!(url = strip_query(url), "Probe succeeded, staying reachable");
        } else {
            warn!(url = strip_query(url), "Probe failed, marking unreachable");
        }
        inner.set_reachable(reachable);
    }

    debug!("Reachability worker stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use bridge_traits::{BridgeError, NetworkChangeStream, NetworkInfo, NetworkType};
    use core_async::time::{sleep, Duration};
    use mockall::mock;
    use std::sync::Mutex;

    mock! {
        pub Probe {}

        #[async_trait]
        impl NetworkProbe for Probe {
            async fn probe(&self, url: &str) -> bool;
        }
    }

    /// Probe that records when it was called.
    struct RecordingProbe {
        result: bool,
        calls: Mutex<Vec<Instant>>,
    }

    impl RecordingProbe {
        fn new(result: bool) -> Arc<Self> {
            Arc::new(Self {
                result,
                calls: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl NetworkProbe for RecordingProbe {
        async fn probe(&self, _url: &str) -> bool {
            self.calls.lock().unwrap().push(Instant::now());
            self.result
        }
    }

    fn config() -> ReachabilityConfig {
        ReachabilityConfig::new("https://discovery.example.org/health_check")
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_probe_marks_unreachable_after_debounce() {
        let mut probe = MockProbe::new();
        probe.expect_probe().times(1).returning(|_| false);
        let bus = EventBus::new(10);
        let mut events = bus.subscribe();
        let monitor = ReachabilityMonitor::start(config(), Arc::new(probe), bus);

        monitor.handle_signal(ReachabilitySignal::PossiblyUnreachable);

        sleep(Duration::from_millis(2400)).await;
        assert!(monitor.is_reachable());

        sleep(Duration::from_millis(200)).await;
        assert!(!monitor.is_reachable());
        assert_eq!(
            events.recv().await.unwrap(),
            CoreEvent::Reachability(ReachabilityEvent::Changed { reachable: false })
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_successful_probe_keeps_reachable() {
        let mut probe = MockProbe::new();
        probe
            .expect_probe()
            .withf(|url| url == "https://discovery.example.org/health_check")
            .times(1)
            .returning(|_| true);
        let monitor = ReachabilityMonitor::start(config(), Arc::new(probe), EventBus::new(10));

        monitor.handle_signal(ReachabilitySignal::PossiblyUnreachable);
        sleep(Duration::from_secs(6)).await;

        assert!(monitor.is_reachable());
    }

    #[tokio::test(start_paused = true)]
    async fn test_repeated_signals_capped_by_max_wait() {
        let probe = RecordingProbe::new(false);
        let start = Instant::now();
        let monitor =
            ReachabilityMonitor::start(config(), probe.clone(), EventBus::new(10));

        monitor.handle_signal(ReachabilitySignal::PossiblyUnreachable);
        sleep(Duration::from_secs(2)).await;
        monitor.handle_signal(ReachabilitySignal::PossiblyUnreachable);
        sleep(Duration::from_secs(2)).await;
        monitor.handle_signal(ReachabilitySignal::PossiblyUnreachable);
        sleep(Duration::from_secs(3)).await;

        let calls = probe.calls.lock().unwrap().clone();
        assert_eq!(calls.len(), 1);
        let waited = calls[0] - start;
        assert!(waited >= Duration::from_secs(5) && waited < Duration::from_millis(5010));
        assert!(!monitor.is_reachable());
    }

    #[tokio::test(start_paused = true)]
    async fn test_reachable_signal_cancels_pending_check() {
        let mut probe = MockProbe::new();
        probe.expect_probe().never();
        let monitor = ReachabilityMonitor::start(config(), Arc::new(probe), EventBus::new(10));

        monitor.handle_signal(ReachabilitySignal::PossiblyUnreachable);
        sleep(Duration::from_secs(1)).await;
        monitor.handle_signal(ReachabilitySignal::Reachable);
        sleep(Duration::from_secs(10)).await;

        assert!(monitor.is_reachable());
    }

    #[tokio::test(start_paused = true)]
    async fn test_reachable_signal_flips_immediately() {
        let mut cfg = config();
        cfg.initially_reachable = false;
        let monitor =
            ReachabilityMonitor::start(cfg, RecordingProbe::new(false), EventBus::new(10));
        let mut changes = monitor.subscribe();
        assert!(!*changes.borrow_and_update());

        monitor.handle_signal(ReachabilitySignal::Reachable);

        assert!(monitor.is_reachable());
        assert!(changes.has_changed().unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_for_resolves_on_change() {
        let mut cfg = config();
        cfg.initially_reachable = false;
        let monitor =
            ReachabilityMonitor::start(cfg, RecordingProbe::new(false), EventBus::new(10));

        let waiter = {
            let monitor = monitor.clone();
            tokio::spawn(async move { monitor.wait_for(true).await })
        };
        tokio::task::yield_now().await;
        assert!(!waiter.is_finished());

        monitor.handle_signal(ReachabilitySignal::Reachable);
        waiter.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_stops_worker() {
        let mut probe = MockProbe::new();
        probe.expect_probe().never();
        let monitor = ReachabilityMonitor::start(config(), Arc::new(probe), EventBus::new(10));

        monitor.shutdown();
        tokio::task::yield_now().await;
        monitor.handle_signal(ReachabilitySignal::PossiblyUnreachable);
        sleep(Duration::from_secs(10)).await;

        assert!(monitor.is_reachable());
    }

    struct ChannelMonitor {
        initial: NetworkStatus,
        changes: Mutex<Option<mpsc::UnboundedReceiver<NetworkInfo>>>,
    }

    struct ChannelStream(mpsc::UnboundedReceiver<NetworkInfo>);

    #[async_trait]
    impl NetworkChangeStream for ChannelStream {
        async fn next(&mut self) -> Option<NetworkInfo> {
            self.0.recv().await
        }
    }

    #[async_trait]
    impl NetworkMonitor for ChannelMonitor {
        async fn get_network_info(&self) -> bridge_traits::error::Result<NetworkInfo> {
            Ok(match self.initial {
                NetworkStatus::Connected => NetworkInfo::connected(NetworkType::WiFi),
                _ => NetworkInfo::disconnected(),
            })
        }

        async fn subscribe_changes(
            &self,
        ) -> bridge_traits::error::Result<Box<dyn NetworkChangeStream>> {
            let receiver = self
                .changes
                .lock()
                .unwrap()
                .take()
                .ok_or_else(|| BridgeError::OperationFailed("already subscribed".into()))?;
            Ok(Box::new(ChannelStream(receiver)))
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_attach_forwards_host_changes() {
        let (sender, receiver) = mpsc::unbounded_channel();
        let host = Arc::new(ChannelMonitor {
            initial: NetworkStatus::Connected,
            changes: Mutex::new(Some(receiver)),
        });
        let probe = RecordingProbe::new(false);
        let monitor = ReachabilityMonitor::start(config(), probe.clone(), EventBus::new(10));

        monitor.attach(host).await.unwrap();
        sender.send(NetworkInfo::disconnected()).unwrap();
        sleep(Duration::from_secs(3)).await;

        assert_eq!(probe.calls.lock().unwrap().len(), 1);
        assert!(!monitor.is_reachable());

        sender
            .send(NetworkInfo::connected(NetworkType::Ethernet))
            .unwrap();
        sleep(Duration::from_millis(10)).await;
        assert!(monitor.is_reachable());
    }

    #[test]
    fn test_status_maps_to_signal() {
        assert_eq!(
            ReachabilitySignal::from(NetworkStatus::Connected),
            ReachabilitySignal::Reachable
        );
        assert_eq!(
            ReachabilitySignal::from(NetworkStatus::Indeterminate),
            ReachabilitySignal::PossiblyUnreachable
        );
    }
}
