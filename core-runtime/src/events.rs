//! # Event Bus System
//!
//! Decoupled notification between catalog components using
//! `tokio::sync::broadcast`.
//!
//! ## Overview
//!
//! - **Event Types**: [`CoreEvent`] wraps one enum per domain
//! - **EventBus**: central broadcast channel for publishing events
//! - **EventStream**: receiver wrapper with optional filtering
//!
//! ```text
//! ┌──────────────────┐  emit   ┌───────────┐  subscribe  ┌───────────────────┐
//! │ CatalogService   ├────────>│ EventBus  ├────────────>│ UncollectedWorker │
//! └──────────────────┘         │ (broadcast│             └───────────────────┘
//!                              │  channel) ├────────────> host subscribers
//!                              └───────────┘
//! ```
//!
//! The most important event is [`AuthorityEvent::InvolvementChanged`]: it is
//! the trigger that schedules an uncollected-works refresh for an authority.
//!
//! ## Usage
//!
//! ```rust
//! use core_runtime::events::{AuthorityEvent, CoreEvent, EventBus};
//!
//! let event_bus = EventBus::new(100);
//! let _subscriber = event_bus.subscribe();
//!
//! event_bus
//!     .emit(CoreEvent::Authority(AuthorityEvent::InvolvementChanged {
//!         authority_id: "authority-1".to_string(),
//!     }))
//!     .ok();
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::{RecvError, SendError};

pub use tokio::sync::broadcast::Receiver;

/// Default buffer size for the event bus channel.
///
/// Subscribers that fall further behind receive `RecvError::Lagged`.
pub const DEFAULT_EVENT_BUFFER_SIZE: usize = 100;

/// Top-level event published through the bus.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", content = "payload")]
pub enum CoreEvent {
    /// Collection structure and membership changes
    Collection(CollectionEvent),
    /// Authority involvement and uncollected-works maintenance
    Authority(AuthorityEvent),
}

impl CoreEvent {
    /// Returns a human-readable description of the event.
    pub fn description(&self) -> &str {
        match self {
            CoreEvent::Collection(e) => e.description(),
            CoreEvent::Authority(e) => e.description(),
        }
    }

    /// Returns the severity level of the event.
    pub fn severity(&self) -> EventSeverity {
        match self {
            CoreEvent::Authority(AuthorityEvent::UncollectedRefreshFailed { .. }) => {
                EventSeverity::Error
            }
            CoreEvent::Collection(CollectionEvent::Created { .. })
            | CoreEvent::Collection(CollectionEvent::Deleted { .. })
            | CoreEvent::Authority(AuthorityEvent::UncollectedRefreshed { .. }) => {
                EventSeverity::Info
            }
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

/// Events about collections and their ordered items.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event")]
pub enum CollectionEvent {
    /// A collection was created.
    Created {
        collection_id: String,
        title: String,
    },
    /// Title, subtitle, description or type changed.
    Updated { collection_id: String },
    /// A collection was removed together with every slot referencing it.
    Deleted { collection_id: String },
    /// Items were added, removed, retargeted or reordered.
    ItemsChanged { collection_id: String },
    /// An item moved from one collection to another.
    ItemTransplanted {
        item_id: String,
        from_collection_id: String,
        to_collection_id: String,
    },
    /// An explicit recalculation wrote a new cached count.
    CountRecalculated {
        collection_id: String,
        manifestations_count: i64,
    },
}

impl CollectionEvent {
    fn description(&self) -> &str {
        match self {
            CollectionEvent::Created { .. } => "Collection created",
            CollectionEvent::Updated { .. } => "Collection updated",
            CollectionEvent::Deleted { .. } => "Collection deleted",
            CollectionEvent::ItemsChanged { .. } => "Collection items changed",
            CollectionEvent::ItemTransplanted { .. } => "Item moved between collections",
            CollectionEvent::CountRecalculated { .. } => "Manifestation count recalculated",
        }
    }

    /// The collection this event concerns (the destination for transplants).
    pub fn collection_id(&self) -> &str {
        match self {
            CollectionEvent::Created { collection_id, .. }
            | CollectionEvent::Updated { collection_id }
            | CollectionEvent::Deleted { collection_id }
            | CollectionEvent::ItemsChanged { collection_id }
            | CollectionEvent::CountRecalculated { collection_id, .. } => collection_id,
            CollectionEvent::ItemTransplanted {
                to_collection_id, ..
            } => to_collection_id,
        }
    }
}

/// Events about authorities and their uncollected-works collection.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event")]
pub enum AuthorityEvent {
    /// The authority's involvements (or the publication state of one of its
    /// works) changed; its uncollected-works collection needs a refresh.
    InvolvementChanged { authority_id: String },
    /// A refresh completed.
    UncollectedRefreshed {
        authority_id: String,
        collection_id: String,
        added: u64,
        removed: u64,
    },
    /// A refresh gave up.
    UncollectedRefreshFailed {
        authority_id: String,
        message: String,
        attempts: u32,
    },
}

impl AuthorityEvent {
    fn description(&self) -> &str {
        match self {
            AuthorityEvent::InvolvementChanged { .. } => "Authority involvement changed",
            AuthorityEvent::UncollectedRefreshed { .. } => "Uncollected works refreshed",
            AuthorityEvent::UncollectedRefreshFailed { .. } => "Uncollected works refresh failed",
        }
    }

    pub fn authority_id(&self) -> &str {
        match self {
            AuthorityEvent::InvolvementChanged { authority_id }
            | AuthorityEvent::UncollectedRefreshed { authority_id, .. }
            | AuthorityEvent::UncollectedRefreshFailed { authority_id, .. } => authority_id,
        }
    }
}

/// Central event bus.
///
/// Cloning is cheap; every clone publishes into the same channel. Events are
/// not replayed to late subscribers.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<CoreEvent>,
}

impl EventBus {
    /// Creates a new event bus with the specified per-subscriber buffer.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publishes an event to all subscribers.
    ///
    /// Returns the number of subscribers that received the event, or an
    /// error if there are none.
    pub fn emit(&self, event: CoreEvent) -> Result<usize, SendError<CoreEvent>> {
        self.sender.send(event)
    }

    /// Creates a new receiver for all future events.
    pub fn subscribe(&self) -> Receiver<CoreEvent> {
        self.sender.subscribe()
    }

    /// Creates a new [`EventStream`] for all future events.
    pub fn stream(&self) -> EventStream {
        EventStream::new(self.subscribe())
    }

    /// Returns the number of active subscribers.
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

type EventFilter = Box<dyn Fn(&CoreEvent) -> bool + Send + Sync>;

/// A `broadcast::Receiver` with an optional filter.
///
/// ```rust
/// use core_runtime::events::{CoreEvent, EventBus};
///
/// let event_bus = EventBus::new(100);
/// let authority_events = event_bus
///     .stream()
///     .filter(|event| matches!(event, CoreEvent::Authority(_)));
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

    /// Only events matching `predicate` are returned by `recv()`.
    pub fn filter<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&CoreEvent) -> bool + Send + Sync + 'static,
    {
        self.filter = Some(Box::new(predicate));
        self
    }

    fn accepts(&self, event: &CoreEvent) -> bool {
        self.filter.as_ref().map_or(true, |filter| filter(event))
    }

    /// Receives the next event that passes the filter.
    ///
    /// # Errors
    ///
    /// `RecvError::Lagged(n)` if the subscriber fell behind by `n` events,
    /// `RecvError::Closed` once every sender is gone.
    pub async fn recv(&mut self) -> Result<CoreEvent, RecvError> {
        loop {
            let event = self.receiver.recv().await?;
            if self.accepts(&event) {
                return Ok(event);
            }
        }
    }

    /// Attempts to receive a matching event without waiting.
    ///
    /// Returns `None` if nothing is currently queued.
    pub fn try_recv(&mut self) -> Option<Result<CoreEvent, RecvError>> {
        loop {
            match self.receiver.try_recv() {
                Ok(event) => {
                    if self.accepts(&event) {
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
}

impl fmt::Debug for EventStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventStream")
            .field("has_filter", &self.filter.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn involvement(authority_id: &str) -> CoreEvent {
        CoreEvent::Authority(AuthorityEvent::InvolvementChanged {
            authority_id: authority_id.to_string(),
        })
    }

    #[tokio::test]
    async fn test_event_bus_subscription() {
        let bus = EventBus::new(10);
        assert_eq!(bus.subscriber_count(), 0);

        let _sub1 = bus.subscribe();
        let _sub2 = bus.stream();
        assert_eq!(bus.subscriber_count(), 2);
    }

    #[tokio::test]
    async fn test_event_emission_no_subscribers() {
        let bus = EventBus::new(10);
        assert!(bus.emit(involvement("a-1")).is_err());
    }

    #[tokio::test]
    async fn test_multiple_subscribers_receive_same_event() {
        let bus = EventBus::new(10);
        let mut sub1 = bus.subscribe();
        let mut sub2 = bus.subscribe();

        let event = CoreEvent::Collection(CollectionEvent::Created {
            collection_id: "c-1".to_string(),
            title: "Collected Poems".to_string(),
        });
        assert_eq!(bus.emit(event.clone()).unwrap(), 2);

        assert_eq!(sub1.recv().await.unwrap(), event);
        assert_eq!(sub2.recv().await.unwrap(), event);
    }

    #[tokio::test]
    async fn test_event_stream_with_filter() {
        let bus = EventBus::new(10);
        let mut stream = bus
            .stream()
            .filter(|event| matches!(event, CoreEvent::Authority(_)));

        bus.emit(CoreEvent::Collection(CollectionEvent::ItemsChanged {
            collection_id: "c-1".to_string(),
        }))
        .ok();
        bus.emit(involvement("a-1")).ok();

        assert_eq!(stream.recv().await.unwrap(), involvement("a-1"));
    }

    #[tokio::test]
    async fn test_lagged_subscriber() {
        let bus = EventBus::new(2);
        let mut stream = bus.stream();

        for i in 0..5 {
            bus.emit(involvement(&format!("a-{}", i))).ok();
        }

        assert!(matches!(stream.recv().await, Err(RecvError::Lagged(_))));
        // The stream keeps working after reporting the lag.
        assert!(stream.recv().await.is_ok());
    }

    #[tokio::test]
    async fn test_try_recv() {
        let bus = EventBus::new(10);
        let mut stream = bus.stream();
        assert!(stream.try_recv().is_none());

        bus.emit(involvement("a-1")).ok();
        assert_eq!(stream.try_recv().unwrap().unwrap(), involvement("a-1"));
    }

    #[test]
    fn test_event_severity_and_description() {
        let failed = CoreEvent::Authority(AuthorityEvent::UncollectedRefreshFailed {
            authority_id: "a-1".to_string(),
            message: "database is locked".to_string(),
            attempts: 5,
        });
        assert_eq!(failed.severity(), EventSeverity::Error);
        assert_eq!(failed.description(), "Uncollected works refresh failed");

        assert_eq!(involvement("a-1").severity(), EventSeverity::Debug);
    }

    #[test]
    fn test_event_accessors() {
        let moved = CollectionEvent::ItemTransplanted {
            item_id: "i-1".to_string(),
            from_collection_id: "c-1".to_string(),
            to_collection_id: "c-2".to_string(),
        };
        assert_eq!(moved.collection_id(), "c-2");

        let refreshed = AuthorityEvent::UncollectedRefreshed {
            authority_id: "a-1".to_string(),
            collection_id: "c-9".to_string(),
            added: 3,
            removed: 1,
        };
        assert_eq!(refreshed.authority_id(), "a-1");
    }

    #[test]
    fn test_event_serialization() {
        let event = CoreEvent::Collection(CollectionEvent::CountRecalculated {
            collection_id: "c-1".to_string(),
            manifestations_count: 42,
        });

        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"type\":\"Collection\""));
        assert!(json.contains("\"event\":\"CountRecalculated\""));

        let deserialized: CoreEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(deserialized, event);
    }
}
