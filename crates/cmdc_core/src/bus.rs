//! In-process event bus.
//!
//! Built on a `tokio::sync::broadcast` ring buffer. Publishing never waits
//! on subscribers: each subscriber reads from the shared buffer at its own
//! pace and, when it falls more than `capacity` events behind, the oldest
//! events it has not read are dropped (drop-oldest). The number of events a
//! subscription lost is tracked in [`Subscription::dropped`].
//!
//! Delivery is at-most-once and best-effort. A subscription only sees events
//! published after it was created; there is no replay.

use std::sync::Arc;

use futures::Stream;
use tokio::sync::broadcast;
use tracing::{trace, warn};

use crate::event::LifecycleEvent;
use crate::invocation::InvocationId;

/// Default number of buffered events per bus.
pub const DEFAULT_BUS_CAPACITY: usize = 256;

/// Which events a subscription receives.
#[derive(Clone, Default)]
pub enum EventFilter {
    #[default]
    All,
    /// Only events of one invocation
    Invocation(InvocationId),
    /// Arbitrary predicate
    Custom(Arc<dyn Fn(&LifecycleEvent) -> bool + Send + Sync>),
}

impl EventFilter {
    pub fn custom(predicate: impl Fn(&LifecycleEvent) -> bool + Send + Sync + 'static) -> Self {
        Self::Custom(Arc::new(predicate))
    }

    pub fn matches(&self, event: &LifecycleEvent) -> bool {
        match self {
            Self::All => true,
            Self::Invocation(id) => event.invocation_id() == id,
            Self::Custom(predicate) => predicate(event),
        }
    }
}

impl std::fmt::Debug for EventFilter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::All => write!(f, "All"),
            Self::Invocation(id) => write!(f, "Invocation({})", id),
            Self::Custom(_) => write!(f, "Custom(..)"),
        }
    }
}

/// Broadcast bus for lifecycle events.
#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<LifecycleEvent>,
    capacity: usize,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_BUS_CAPACITY)
    }
}

impl EventBus {
    /// Create a bus buffering up to `capacity` events per lagging subscriber.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let (sender, _) = broadcast::channel(capacity);
        Self { sender, capacity }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Publish an event to every current subscriber.
    ///
    /// Returns the number of subscribers the event was queued for.
    pub fn publish(&self, event: LifecycleEvent) -> usize {
        trace!(
            invocation_id = %event.invocation_id(),
            event = event.name(),
            "publishing event"
        );
        // Err only means nobody is listening
        self.sender.send(event).unwrap_or(0)
    }

    /// Subscribe with a filter.
    pub fn subscribe(&self, filter: EventFilter) -> Subscription {
        Subscription {
            receiver: self.sender.subscribe(),
            filter,
            dropped: 0,
        }
    }

    /// Subscribe to every event.
    pub fn subscribe_all(&self) -> Subscription {
        self.subscribe(EventFilter::All)
    }

    /// Subscribe to the events of one invocation.
    pub fn subscribe_invocation(&self, id: InvocationId) -> Subscription {
        self.subscribe(EventFilter::Invocation(id))
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

/// A live subscription to the bus.
#[derive(Debug)]
pub struct Subscription {
    receiver: broadcast::Receiver<LifecycleEvent>,
    filter: EventFilter,
    dropped: u64,
}

impl Subscription {
    /// Wait for the next matching event. `None` once the bus is gone.
    pub async fn recv(&mut self) -> Option<LifecycleEvent> {
        loop {
            match self.receiver.recv().await {
                Ok(event) if self.filter.matches(&event) => return Some(event),
                Ok(_) => continue,
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "subscriber lagged, oldest events dropped");
                    self.dropped += skipped;
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// Next matching event if one is already buffered.
    pub fn try_recv(&mut self) -> Option<LifecycleEvent> {
        loop {
            match self.receiver.try_recv() {
                Ok(event) if self.filter.matches(&event) => return Some(event),
                Ok(_) => continue,
                Err(broadcast::error::TryRecvError::Lagged(skipped)) => {
                    self.dropped += skipped;
                }
                Err(_) => return None,
            }
        }
    }

    /// Number of events this subscription lost to lag.
    pub fn dropped(&self) -> u64 {
        self.dropped
    }

    /// Turn the subscription into an endless stream of events.
    pub fn into_stream(self) -> impl Stream<Item = LifecycleEvent> + Send {
        futures::stream::unfold(self, |mut sub| async move {
            sub.recv().await.map(|event| (event, sub))
        })
    }
}
