//! In-process broadcast of domain events.

use chrono::{DateTime, Utc};
use tokio::sync::broadcast;

use super::event::{DomainEvent, EventEnvelope};

/// Default channel capacity.
pub const DEFAULT_EVENT_BUFFER: usize = 1024;

/// Fan-out of [`EventEnvelope`]s to any number of subscribers.
///
/// Publishing never waits: with no subscribers the event is dropped, and a lagging
/// subscriber loses the oldest events instead of holding up the publisher.
#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<EventEnvelope>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_BUFFER)
    }
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Subscribe to events published from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<EventEnvelope> {
        self.sender.subscribe()
    }

    /// Publish an event; returns the number of subscribers that received it.
    pub fn publish(&self, event: impl Into<DomainEvent>, occurred_at: DateTime<Utc>) -> usize {
        let envelope = EventEnvelope::new(event, occurred_at);
        let event_type = envelope.event_type();
        match self.sender.send(envelope) {
            Ok(receivers) => {
                tracing::trace!(event_type, receivers, "Published domain event");
                receivers
            }
            Err(_) => 0,
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::JobCreated;
    use crate::jobs::{JobId, JobType};

    fn created() -> JobCreated {
        JobCreated {
            job_id: JobId::new(),
            name: "sync".to_string(),
            schedule: "0 * * * *".to_string(),
            job_type: JobType::DataSync,
        }
    }

    #[tokio::test]
    async fn test_publish_reaches_subscribers() {
        let bus = EventBus::default();
        let mut rx = bus.subscribe();
        let event = created();

        assert_eq!(bus.publish(event.clone(), Utc::now()), 1);
        let received = rx.recv().await.unwrap();
        assert_eq!(received.event, DomainEvent::JobCreated(event));
        assert_eq!(received.event_type(), "JobCreated");
    }

    #[test]
    fn test_publish_without_subscribers_is_dropped() {
        let bus = EventBus::new(4);
        assert_eq!(bus.publish(created(), Utc::now()), 0);
    }

    #[tokio::test]
    async fn test_slow_subscriber_lags_instead_of_blocking() {
        let bus = EventBus::new(2);
        let mut rx = bus.subscribe();
        for _ in 0..5 {
            bus.publish(created(), Utc::now());
        }
        assert!(matches!(
            rx.recv().await,
            Err(broadcast::error::RecvError::Lagged(_))
        ));
    }
}
