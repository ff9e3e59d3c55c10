//! Subscriber registry and change messages
//!
//! Every subscriber owns an unbounded queue. Publishing never waits on a
//! consumer: a message is enqueued for each registered subscriber and a queue
//! whose receiving side is gone is removed once the pass is over.

use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::task::{Context, Poll};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio_stream::Stream;

/// Output category of a change message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Alerts,
    Emissions,
    Status,
}

impl Category {
    pub const ALL: [Category; 3] = [Category::Alerts, Category::Emissions, Category::Status];

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Alerts => "alerts",
            Category::Emissions => "emissions",
            Category::Status => "status",
        }
    }
}

/// Change notification delivered to subscribers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PublishedMessage {
    #[serde(rename = "type")]
    pub kind: Category,
    pub data: serde_json::Value,
    pub last_update: String,
}

/// Outcome of one broadcast
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BroadcastReport {
    pub delivered: u64,
    /// Subscribers removed because their receiver was gone
    pub dropped: u64,
}

#[derive(Debug, Default)]
struct RegistryInner {
    senders: Mutex<HashMap<u64, UnboundedSender<PublishedMessage>>>,
    next_id: AtomicU64,
}

/// Set of active subscribers, shared by the publisher and the transport
#[derive(Debug, Clone, Default)]
pub struct SubscriberRegistry {
    inner: Arc<RegistryInner>,
}

impl SubscriberRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn senders(&self) -> MutexGuard<'_, HashMap<u64, UnboundedSender<PublishedMessage>>> {
        self.inner
            .senders
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Register a subscriber; it receives only messages published from now on
    pub fn subscribe(&self) -> Subscription {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let (sender, receiver) = mpsc::unbounded_channel();
        self.senders().insert(id, sender);
        info!("Subscriber {} connected", id);

        Subscription {
            id,
            receiver,
            registry: self.clone(),
        }
    }

    /// Remove a subscriber, returning whether it was registered
    pub fn unsubscribe(&self, id: u64) -> bool {
        let removed = self.senders().remove(&id).is_some();
        if removed {
            info!("Subscriber {} disconnected", id);
        }
        removed
    }

    /// Enqueue a message for every subscriber
    ///
    /// Sends go to a copy of the registry taken up front. Subscribers whose
    /// queue is closed are collected during the pass and removed after it.
    pub fn broadcast(&self, message: &PublishedMessage) -> BroadcastReport {
        let targets: Vec<(u64, UnboundedSender<PublishedMessage>)> = self
            .senders()
            .iter()
            .map(|(id, sender)| (*id, sender.clone()))
            .collect();

        let mut report = BroadcastReport::default();
        let mut dead = Vec::new();

        for (id, sender) in targets {
            match sender.send(message.clone()) {
                Ok(()) => report.delivered += 1,
                Err(_) => dead.push(id),
            }
        }

        if !dead.is_empty() {
            let mut senders = self.senders();
            for id in dead {
                if senders.remove(&id).is_some() {
                    debug!("Removed dead subscriber {}", id);
                    report.dropped += 1;
                }
            }
        }

        report
    }

    pub fn subscriber_count(&self) -> usize {
        self.senders().len()
    }

    /// Remove every subscriber, ending their streams
    ///
    /// Queued messages are still delivered before each stream reports its
    /// end. Returns how many subscribers were removed.
    pub fn close_all(&self) -> usize {
        let closed: Vec<u64> = self.senders().drain().map(|(id, _)| id).collect();
        if !closed.is_empty() {
            info!("Closed {} subscriber stream(s)", closed.len());
        }
        closed.len()
    }
}

/// Receiving end of one subscription
///
/// Dropping it deregisters the subscriber, so a client that disconnects is
/// removed right away rather than on the next failed send.
#[derive(Debug)]
pub struct Subscription {
    id: u64,
    receiver: UnboundedReceiver<PublishedMessage>,
    registry: SubscriberRegistry,
}

impl Subscription {
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Wait for the next message; `None` once the subscriber was removed
    pub async fn recv(&mut self) -> Option<PublishedMessage> {
        self.receiver.recv().await
    }

    /// Take a queued message without waiting
    pub fn try_recv(&mut self) -> Option<PublishedMessage> {
        self.receiver.try_recv().ok()
    }
}

impl Stream for Subscription {
    type Item = PublishedMessage;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.receiver.poll_recv(cx)
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.registry.unsubscribe(self.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_stream::StreamExt;

    fn message(kind: Category) -> PublishedMessage {
        PublishedMessage {
            kind,
            data: serde_json::json!([]),
            last_update: "2024-01-01T00:00:00.000000Z".to_string(),
        }
    }

    #[test]
    fn test_message_wire_format() {
        let value = serde_json::to_value(message(Category::Status)).unwrap();
        assert_eq!(value["type"], "status");
        assert_eq!(value["data"], serde_json::json!([]));
        assert_eq!(value["last_update"], "2024-01-01T00:00:00.000000Z");
    }

    #[test]
    fn test_subscribe_and_broadcast() {
        let registry = SubscriberRegistry::new();
        let mut first = registry.subscribe();
        let mut second = registry.subscribe();
        assert_ne!(first.id(), second.id());
        assert_eq!(registry.subscriber_count(), 2);

        let report = registry.broadcast(&message(Category::Alerts));
        assert_eq!(report.delivered, 2);
        assert_eq!(report.dropped, 0);
        assert_eq!(first.try_recv().unwrap().kind, Category::Alerts);
        assert_eq!(second.try_recv().unwrap().kind, Category::Alerts);
        assert!(first.try_recv().is_none());
    }

    #[test]
    fn test_late_subscriber_sees_only_future_messages() {
        let registry = SubscriberRegistry::new();
        registry.broadcast(&message(Category::Alerts));

        let mut late = registry.subscribe();
        assert!(late.try_recv().is_none());

        registry.broadcast(&message(Category::Emissions));
        assert_eq!(late.try_recv().unwrap().kind, Category::Emissions);
    }

    #[test]
    fn test_drop_deregisters() {
        let registry = SubscriberRegistry::new();
        let subscription = registry.subscribe();
        let id = subscription.id();
        drop(subscription);

        assert_eq!(registry.subscriber_count(), 0);
        assert!(!registry.unsubscribe(id));
    }

    #[test]
    fn test_closed_queue_is_removed_without_affecting_others() {
        let registry = SubscriberRegistry::new();
        let mut healthy = registry.subscribe();
        let mut gone = registry.subscribe();
        // receiver closed while the subscription is still registered
        gone.receiver.close();

        let report = registry.broadcast(&message(Category::Status));
        assert_eq!(report.delivered, 1);
        assert_eq!(report.dropped, 1);
        assert_eq!(registry.subscriber_count(), 1);
        assert_eq!(healthy.try_recv().unwrap().kind, Category::Status);
    }

    #[tokio::test]
    async fn test_subscription_as_stream() {
        let registry = SubscriberRegistry::new();
        let mut subscription = registry.subscribe();

        registry.broadcast(&message(Category::Alerts));
        registry.broadcast(&message(Category::Status));

        assert_eq!(subscription.next().await.unwrap().kind, Category::Alerts);
        assert_eq!(subscription.recv().await.unwrap().kind, Category::Status);
    }

    #[tokio::test]
    async fn test_close_all_ends_streams() {
        let registry = SubscriberRegistry::new();
        let mut first = registry.subscribe();
        let mut second = registry.subscribe();
        registry.broadcast(&message(Category::Emissions));

        assert_eq!(registry.close_all(), 2);
        assert_eq!(registry.subscriber_count(), 0);

        // queued messages drain before the end of stream
        assert_eq!(first.next().await.unwrap().kind, Category::Emissions);
        assert!(first.next().await.is_none());
        assert_eq!(second.recv().await.unwrap().kind, Category::Emissions);
        assert!(second.recv().await.is_none());

        assert_eq!(registry.close_all(), 0);
    }
}
