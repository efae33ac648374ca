//! Event Bus
//!
//! Publishes committed events to subscribers (exporters, tests) after the
//! stream processor committed them. Subscribers that lag behind lose the
//! oldest events and catch up from the log.

use tokio::sync::broadcast;

/// Broadcasts values to every current subscriber
pub struct EventBus<E> {
    tx: broadcast::Sender<E>,
}

impl<E: Clone> EventBus<E> {
    /// Create a new EventBus
    ///
    /// # Arguments
    /// * `capacity` - Maximum number of events buffered per subscriber
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Publish an event to all subscribers
    ///
    /// # Returns
    /// Number of subscribers that received the event
    pub fn publish(&self, event: E) -> usize {
        self.tx.send(event).unwrap_or(0)
    }

    pub fn publish_batch(&self, events: impl IntoIterator<Item = E>) -> usize {
        events.into_iter().map(|event| self.publish(event)).sum()
    }

    /// Receive every event published from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<E> {
        self.tx.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl<E: Clone> Default for EventBus<E> {
    fn default() -> Self {
        Self::new(1024)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn publish_reaches_every_subscriber() {
        let bus = EventBus::new(10);
        let mut rx1 = bus.subscribe();
        let mut rx2 = bus.subscribe();

        assert_eq!(bus.publish(7i64), 2);
        assert_eq!(rx1.recv().await.unwrap(), 7);
        assert_eq!(rx2.recv().await.unwrap(), 7);
    }

    #[tokio::test]
    async fn late_subscriber_sees_only_new_events() {
        let bus = EventBus::new(10);
        assert_eq!(bus.publish(1i64), 0);

        let mut rx = bus.subscribe();
        assert_eq!(bus.publish_batch(vec![2, 3]), 2);
        assert_eq!(rx.recv().await.unwrap(), 2);
        assert_eq!(rx.recv().await.unwrap(), 3);
    }

    #[tokio::test]
    async fn dropped_subscriber_is_not_counted() {
        let bus = EventBus::new(10);
        let rx1 = bus.subscribe();
        let _rx2 = bus.subscribe();
        assert_eq!(bus.subscriber_count(), 2);

        drop(rx1);
        assert_eq!(bus.publish(1i64), 1);
    }
}
