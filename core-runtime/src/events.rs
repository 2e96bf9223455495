//! # Event Bus System
//!
//! Provides an event-driven architecture for the lineup engine using `tokio::sync::broadcast`.
//! Lineups, the playback queue, the reachability monitor and the staleness revalidator
//! publish typed events here; hosts subscribe to drive their UI.
//!
//! ## Overview
//!
//! The event bus system consists of:
//! - **Event Types**: Strongly-typed enum hierarchies for each engine component
//! - **EventBus**: Central broadcast channel for publishing events
//! - **EventStream**: Wrapper for consuming events with filtering
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────┐   emit   ┌───────────┐
//! │LineupController  ├─────────>│           │
//! └──────────────────┘          │           │
//! ┌──────────────────┐   emit   │ EventBus  │  subscribe  ┌────────────┐
//! │ PlaybackQueue    ├─────────>│ (broadcast├────────────>│    Host    │
//! └──────────────────┘          │  channel) │             └────────────┘
//! ┌──────────────────┐   emit   │           │
//! │Reachability/Sync ├─────────>│           │
//! └──────────────────┘          └───────────┘
//! ```
//!
//! ## Usage
//!
//! ```rust
//! use core_runtime::events::{CoreEvent, EventBus, ReachabilityEvent};
//!
//! let event_bus = EventBus::new(100);
//! let mut stream = event_bus.subscribe();
//!
//! event_bus
//!     .emit(CoreEvent::Reachability(ReachabilityEvent::Changed { reachable: false }))
//!     .ok();
//! assert!(stream.try_recv().is_ok());
//! ```
//!
//! ## Error Handling
//!
//! - **`RecvError::Lagged(n)`**: Subscriber was too slow and missed `n` events.
//!   This is non-fatal; the subscriber can continue receiving new events.
//! - **`RecvError::Closed`**: All senders have been dropped. This indicates shutdown.
//!
//! Emitting with no subscribers returns an error. Engine components ignore it
//! (`emit(..).ok()`); events are notifications, never the source of truth.

use core_async::sync::broadcast;
use serde::{Deserialize, Serialize};
use std::fmt;

pub use core_async::sync::broadcast::error::{RecvError, SendError};
pub use core_async::sync::broadcast::Receiver;

/// Default buffer size for the event bus channel.
///
/// Subscribers that can't keep up will receive `RecvError::Lagged`.
pub const DEFAULT_EVENT_BUFFER_SIZE: usize = 100;

// ============================================================================
// Core Event Types
// ============================================================================

/// Top-level event enum encompassing all event categories.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", content = "payload")]
pub enum CoreEvent {
    /// Paginated list events
    Lineup(LineupEvent),
    /// Playback queue events
    Queue(QueueEvent),
    /// Reachability transitions
    Reachability(ReachabilityEvent),
    /// Offline track revalidation events
    Staleness(StalenessEvent),
}

impl CoreEvent {
    /// Returns a human-readable description of the event.
    pub fn description(&self) -> &str {
        match self {
            CoreEvent::Lineup(e) => e.description(),
            CoreEvent::Queue(e) => e.description(),
            CoreEvent::Reachability(e) => e.description(),
            CoreEvent::Staleness(e) => e.description(),
        }
    }

    /// Returns the severity level of the event.
    pub fn severity(&self) -> EventSeverity {
        match self {
            CoreEvent::Lineup(LineupEvent::FetchFailed { .. }) => EventSeverity::Error,
            CoreEvent::Staleness(StalenessEvent::Result {
                outcome: StalenessOutcome::Failed { .. },
                ..
            }) => EventSeverity::Error,
            CoreEvent::Staleness(StalenessEvent::Result {
                outcome: StalenessOutcome::Unplayable { .. },
                ..
            }) => EventSeverity::Warning,
            CoreEvent::Reachability(ReachabilityEvent::Changed { reachable: false }) => {
                EventSeverity::Warning
            }
            CoreEvent::Reachability(_) => EventSeverity::Info,
            _ => EventSeverity::Debug,
        }
    }
}

/// Event severity levels for filtering and logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EventSeverity {
    Debug,
    Info,
    Warning,
    Error,
}

// ============================================================================
// Lineup Events
// ============================================================================

/// Load status of a lineup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LineupStatus {
    #[default]
    Idle,
    Loading,
    Success,
    Error,
}

/// Events published by lineup controllers.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event")]
pub enum LineupEvent {
    /// Entries or status of a lineup changed.
    Changed {
        /// Lineup prefix (e.g. `"feed"`)
        prefix: String,
        /// Entry uids in display order
        uids: Vec<String>,
        status: LineupStatus,
    },
    /// A page fetch failed and the lineup moved to `Error`.
    FetchFailed { prefix: String, message: String },
}

impl LineupEvent {
    fn description(&self) -> &str {
        match self {
            LineupEvent::Changed { .. } => "Lineup changed",
            LineupEvent::FetchFailed { .. } => "Lineup fetch failed",
        }
    }
}

// ============================================================================
// Queue Events
// ============================================================================

/// Events published by the playback queue.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event")]
pub enum QueueEvent {
    /// Queue position, order or flags changed.
    Changed {
        /// Position in the unshuffled order, `None` when empty
        index: Option<usize>,
        /// Advanced past the end with repeat off
        overshot: bool,
        /// Stepped back before the start with repeat off
        undershot: bool,
        current_uid: Option<String>,
    },
}

impl QueueEvent {
    fn description(&self) -> &str {
        match self {
            QueueEvent::Changed { .. } => "Queue changed",
        }
    }
}

// ============================================================================
// Reachability Events
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event")]
pub enum ReachabilityEvent {
    /// The engine-wide reachability flag flipped.
    Changed { reachable: bool },
}

impl ReachabilityEvent {
    fn description(&self) -> &str {
        match self {
            ReachabilityEvent::Changed { reachable: true } => "Network reachable",
            ReachabilityEvent::Changed { reachable: false } => "Network unreachable",
        }
    }
}

// ============================================================================
// Staleness Events
// ============================================================================

/// Final outcome of a single revalidation task.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum StalenessOutcome {
    /// Local copy is current; `verified_at` was stamped (RFC 3339).
    Verified { verified_at: String },
    /// Server copy is newer; a redownload was requested.
    RedownloadRequested,
    /// Track is gone, deleted or unavailable. The local copy was left alone.
    Unplayable { message: String },
    /// The server lookup failed.
    Failed { message: String },
    /// The task was cancelled before finishing.
    Cancelled,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event")]
pub enum StalenessEvent {
    /// A revalidation task finished.
    Result {
        track_id: u64,
        outcome: StalenessOutcome,
    },
    /// Reachability was lost mid-check; the task went back to waiting.
    Requeued { track_id: u64 },
}

impl StalenessEvent {
    fn description(&self) -> &str {
        match self {
            StalenessEvent::Result { .. } => "Track revalidation finished",
            StalenessEvent::Requeued { .. } => "Track revalidation requeued",
        }
    }
}

// ============================================================================
// Event Bus
// ============================================================================

/// Central event bus for publishing and subscribing to engine events.
///
/// Cloning the bus is cheap and every clone publishes into the same channel.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<CoreEvent>,
}

impl EventBus {
    /// Creates a new event bus with the specified buffer size.
    ///
    /// When a subscriber falls behind by more than `capacity` events, it will
    /// receive a `RecvError::Lagged` error.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publishes an event to all subscribers.
    ///
    /// Returns the number of subscribers that received the event, or an error
    /// if there are no active subscribers.
    pub fn emit(&self, event: CoreEvent) -> Result<usize, SendError<CoreEvent>> {
        self.sender.send(event)
    }

    /// Creates a new subscriber. Past events are not replayed.
    pub fn subscribe(&self) -> Receiver<CoreEvent> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_BUFFER_SIZE)
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("subscriber_count", &self.subscriber_count())
            .finish()
    }
}

// ============================================================================
// Event Stream Wrapper
// ============================================================================

type EventFilter = Box<dyn Fn(&CoreEvent) -> bool + Send + Sync>;

/// A wrapper around `broadcast::Receiver` with optional filtering.
///
/// ```rust
/// use core_runtime::events::{CoreEvent, EventBus, EventStream};
///
/// let event_bus = EventBus::new(100);
/// let queue_only = EventStream::new(event_bus.subscribe())
///     .filter(|event| matches!(event, CoreEvent::Queue(_)));
/// ```
pub struct EventStream {
    receiver: Receiver<CoreEvent>,
    filter: Option<EventFilter>,
}

impl EventStream {
    pub fn new(receiver: Receiver<CoreEvent>) -> Self {
        Self {
            receiver,
            filter: None,
        }
    }

    /// Only events that match `predicate` will be returned by `recv()`.
    pub fn filter<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&CoreEvent) -> bool + Send + Sync + 'static,
    {
        self.filter = Some(Box::new(predicate));
        self
    }

    /// Receives the next event that passes the filter (if any).
    ///
    /// # Errors
    ///
    /// Returns `RecvError::Lagged(n)` if the subscriber fell behind by `n` events.
    /// Returns `RecvError::Closed` if all senders have been dropped.
    pub async fn recv(&mut self) -> Result<CoreEvent, RecvError> {
        loop {
            let event = self.receiver.recv().await?;
            if self.matches(&event) {
                return Ok(event);
            }
        }
    }

    /// Attempts to receive an event without blocking.
    ///
    /// Returns `None` if no matching events are currently available.
    pub fn try_recv(&mut self) -> Option<Result<CoreEvent, RecvError>> {
        loop {
            match self.receiver.try_recv() {
                Ok(event) => {
                    if self.matches(&event) {
                        return Some(Ok(event));
                    }
                }
                Err(broadcast::error::TryRecvError::Empty) => return None,
                Err(broadcast::error::TryRecvError::Lagged(n)) => {
                    return Some(Err(RecvError::Lagged(n)))
                }
                Err(broadcast::error::TryRecvError::Closed) => return Some(Err(RecvError::Closed)),
            }
        }
    }

    fn matches(&self, event: &CoreEvent) -> bool {
        self.filter.as_ref().map_or(true, |filter| filter(event))
    }
}

impl fmt::Debug for EventStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventStream")
            .field("has_filter", &self.filter.is_some())
            .finish()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn changed(reachable: bool) -> CoreEvent {
        CoreEvent::Reachability(ReachabilityEvent::Changed { reachable })
    }

    #[tokio::test]
    async fn test_event_bus_subscription() {
        let bus = EventBus::new(10);
        assert_eq!(bus.subscriber_count(), 0);

        let _sub1 = bus.subscribe();
        let _sub2 = bus.subscribe();
        assert_eq!(bus.subscriber_count(), 2);
    }

    #[tokio::test]
    async fn test_event_emission_no_subscribers() {
        let bus = EventBus::new(10);

        assert!(bus.emit(changed(true)).is_err());
    }

    #[tokio::test]
    async fn test_multiple_subscribers_receive_same_event() {
        let bus = EventBus::new(10);
        let mut sub1 = bus.subscribe();
        let mut sub2 = bus.subscribe();

        let event = CoreEvent::Queue(QueueEvent::Changed {
            index: Some(2),
            overshot: false,
            undershot: false,
            current_uid: Some("kind:TRACKS-id:3-source:feed".to_string()),
        });
        assert_eq!(bus.emit(event.clone()).unwrap(), 2);

        assert_eq!(sub1.recv().await.unwrap(), event);
        assert_eq!(sub2.recv().await.unwrap(), event);
    }

    #[tokio::test]
    async fn test_cloned_bus_shares_channel() {
        let bus = EventBus::new(10);
        let clone = bus.clone();
        let mut sub = bus.subscribe();

        clone.emit(changed(false)).ok();

        assert_eq!(sub.recv().await.unwrap(), changed(false));
    }

    #[tokio::test]
    async fn test_event_stream_with_filter() {
        let bus = EventBus::new(10);
        let mut stream = EventStream::new(bus.subscribe())
            .filter(|event| matches!(event, CoreEvent::Staleness(_)));

        bus.emit(changed(true)).ok();
        let staleness = CoreEvent::Staleness(StalenessEvent::Requeued { track_id: 9 });
        bus.emit(staleness.clone()).ok();

        assert_eq!(stream.recv().await.unwrap(), staleness);
    }

    #[tokio::test]
    async fn test_try_recv_skips_filtered_events() {
        let bus = EventBus::new(10);
        let mut stream =
            EventStream::new(bus.subscribe()).filter(|event| matches!(event, CoreEvent::Lineup(_)));

        bus.emit(changed(true)).ok();
        assert!(stream.try_recv().is_none());
    }

    #[tokio::test]
    async fn test_lagged_subscriber() {
        let bus = EventBus::new(2);
        let mut sub = bus.subscribe();

        for _ in 0..5 {
            bus.emit(changed(true)).ok();
        }

        assert!(matches!(sub.recv().await, Err(RecvError::Lagged(_))));
    }

    #[test]
    fn test_event_severity() {
        let failed = CoreEvent::Lineup(LineupEvent::FetchFailed {
            prefix: "feed".to_string(),
            message: "timeout".to_string(),
        });
        assert_eq!(failed.severity(), EventSeverity::Error);
        assert_eq!(changed(false).severity(), EventSeverity::Warning);
        assert_eq!(changed(true).severity(), EventSeverity::Info);

        let requeued = CoreEvent::Staleness(StalenessEvent::Requeued { track_id: 1 });
        assert_eq!(requeued.severity(), EventSeverity::Debug);
        assert!(EventSeverity::Error > EventSeverity::Warning);
    }

    #[test]
    fn test_event_serialization() {
        let event = CoreEvent::Staleness(StalenessEvent::Result {
            track_id: 4,
            outcome: StalenessOutcome::RedownloadRequested,
        });

        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "Staleness");
        assert_eq!(json["payload"]["event"], "Result");
        assert_eq!(json["payload"]["outcome"]["outcome"], "redownload_requested");

        let back: CoreEvent = serde_json::from_value(json).unwrap();
        assert_eq!(back, event);
    }

    #[test]
    fn test_event_description() {
        assert_eq!(changed(false).description(), "Network unreachable");
    }
}
