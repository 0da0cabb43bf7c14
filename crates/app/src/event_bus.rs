//! In-process event bus: bridge events fanned out over a tokio broadcast
//! channel to subscribers that may only care about some event types.

use std::future::Future;

use tokio::sync::broadcast;

use hkbridge_domain::error::BridgeError;
use hkbridge_domain::event::{Event, EventType};

use crate::ports::EventPublisher;

/// Event bus shared by the reconciler, the migrator and the daemon's
/// listeners.
///
/// Publishing never fails: without subscribers the event is dropped.
pub struct InProcessEventBus {
    sender: broadcast::Sender<Event>,
}

impl InProcessEventBus {
    /// A bus keeping up to `capacity` events for its slowest subscriber.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Receive every event published from now on.
    #[must_use]
    pub fn subscribe(&self) -> EventSubscription {
        self.subscribe_to(&[])
    }

    /// Receive the events of the given types published from now on. An empty
    /// slice accepts every type.
    #[must_use]
    pub fn subscribe_to(&self, types: &[EventType]) -> EventSubscription {
        EventSubscription {
            receiver: self.sender.subscribe(),
            types: types.to_vec(),
        }
    }
}

impl EventPublisher for InProcessEventBus {
    fn publish(&self, event: Event) -> impl Future<Output = Result<(), BridgeError>> + Send {
        let event_type = event.event_type;
        let receivers = self.sender.send(event).unwrap_or(0);
        tracing::trace!(%event_type, receivers, "event published");
        async { Ok(()) }
    }
}

/// Receiving end of the bus.
pub struct EventSubscription {
    receiver: broadcast::Receiver<Event>,
    types: Vec<EventType>,
}

impl EventSubscription {
    /// Next accepted event, or `None` once the bus is gone.
    ///
    /// A subscriber that fell behind loses the oldest events; the loss is
    /// logged and reception continues with the oldest event still kept.
    pub async fn recv(&mut self) -> Option<Event> {
        loop {
            match self.receiver.recv().await {
                Ok(event) if self.accepts(&event) => return Some(event),
                Ok(_) => {}
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "event subscriber lagging behind");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    fn accepts(&self, event: &Event) -> bool {
        self.types.is_empty() || self.types.contains(&event.event_type)
    }
}
