//! EventBroadcaster - fan-out of scan events to live subscribers.
//!
//! Each subscriber owns an unbounded queue, so publishing never waits and a
//! slow reader still sees every event of a large scan. Only subscribers whose
//! receiver is gone are pruned.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use lanwatch_core::{EventPayload, ScanEvent};
use tokio::sync::mpsc;
use uuid::Uuid;

type Subscribers = HashMap<Uuid, mpsc::UnboundedSender<Arc<ScanEvent>>>;

#[derive(Default)]
pub struct EventBroadcaster {
    subscribers: Mutex<Subscribers>,
}

/// Receiving half of a subscription. Dropping it unsubscribes on the next
/// publish.
pub struct Subscription {
    id: Uuid,
    rx: mpsc::UnboundedReceiver<Arc<ScanEvent>>,
}

impl Subscription {
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Next event, or `None` once pruned or unsubscribed.
    pub async fn recv(&mut self) -> Option<Arc<ScanEvent>> {
        self.rx.recv().await
    }

    /// Next event if one is already queued.
    pub fn try_recv(&mut self) -> Option<Arc<ScanEvent>> {
        self.rx.try_recv().ok()
    }
}

impl EventBroadcaster {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Subscribers> {
        // Every critical section leaves the map consistent.
        self.subscribers
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn subscribe(&self) -> Subscription {
        let id = Uuid::new_v4();
        let (tx, rx) = mpsc::unbounded_channel();
        self.lock().insert(id, tx);
        tracing::info!(subscriber_id = %id, "Event subscriber registered");
        Subscription { id, rx }
    }

    pub fn unsubscribe(&self, id: &Uuid) {
        if self.lock().remove(id).is_some() {
            tracing::info!(subscriber_id = %id, "Event subscriber removed");
        }
    }

    /// Timestamp `payload` now and deliver it to every subscriber.
    /// Returns how many subscribers received it.
    pub fn publish(&self, payload: EventPayload) -> usize {
        let event = Arc::new(ScanEvent::new(payload));
        let mut subscribers = self.lock();
        let mut delivered = 0;

        subscribers.retain(|id, tx| match tx.send(Arc::clone(&event)) {
            Ok(()) => {
                delivered += 1;
                true
            }
            Err(_) => {
                tracing::debug!(subscriber_id = %id, "Subscriber gone, pruned");
                false
            }
        });

        tracing::debug!(event = event.name(), delivered, "Event published");
        delivered
    }

    pub fn subscriber_count(&self) -> usize {
        self.lock().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_delivery_preserves_publish_order() {
        let hub = EventBroadcaster::new();
        let mut sub = hub.subscribe();

        hub.publish(EventPayload::ScanStarted {});
        hub.publish(EventPayload::ScanFailed {
            error: "boom".to_string(),
        });

        assert_eq!(sub.recv().await.unwrap().name(), "scan_started");
        assert_eq!(sub.recv().await.unwrap().name(), "scan_failed");
    }

    #[tokio::test]
    async fn test_dropped_subscriber_is_pruned() {
        let hub = EventBroadcaster::new();
        let mut alive = hub.subscribe();
        let gone = hub.subscribe();
        drop(gone);

        assert_eq!(hub.publish(EventPayload::ScanStarted {}), 1);
        assert_eq!(hub.subscriber_count(), 1);
        assert!(alive.recv().await.is_some());
    }

    #[test]
    fn test_slow_subscriber_keeps_every_event() {
        let hub = EventBroadcaster::new();
        let mut fast = hub.subscribe();
        let mut slow = hub.subscribe();

        for _ in 0..1000 {
            assert_eq!(hub.publish(EventPayload::ScanStarted {}), 2);
            assert!(fast.try_recv().is_some());
        }
        hub.publish(EventPayload::ScanFailed {
            error: "boom".to_string(),
        });

        assert_eq!(hub.subscriber_count(), 2);
        let mut backlog = 0;
        let mut last = None;
        while let Some(event) = slow.try_recv() {
            backlog += 1;
            last = Some(event.name());
        }
        assert_eq!(backlog, 1001);
        assert_eq!(last, Some("scan_failed"));
    }

    #[test]
    fn test_unsubscribe() {
        let hub = EventBroadcaster::default();
        let sub = hub.subscribe();
        hub.unsubscribe(&sub.id());
        assert_eq!(hub.subscriber_count(), 0);
        assert_eq!(hub.publish(EventPayload::ScanStarted {}), 0);
    }
}
