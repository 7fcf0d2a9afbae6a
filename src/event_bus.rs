use std::sync::{
    Arc,
    Mutex,
    MutexGuard,
    Weak,
    atomic::{AtomicU64, Ordering},
};

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::trace;

use crate::{item_ref::ItemRef, news::NewsItem};

/// Entity types published on the bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    News,
    Feed,
    Label,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MutationKind {
    Updated,
    Deleted,
    /// Anything this version does not understand.
    #[serde(other)]
    Unknown,
}

/// One change to a news item, with its post-mutation snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MutationEvent {
    pub item_ref: ItemRef,
    pub kind: MutationKind,
    #[serde(default)]
    pub snapshot: Option<NewsItem>,
}

impl MutationEvent {
    pub fn updated(item: &NewsItem) -> Self {
        Self {
            item_ref: item.item_ref,
            kind: MutationKind::Updated,
            snapshot: Some(item.clone()),
        }
    }

    pub fn deleted(item_ref: ItemRef) -> Self {
        Self {
            item_ref,
            kind: MutationKind::Deleted,
            snapshot: None,
        }
    }
}

pub type EventBatch = Vec<MutationEvent>;

/// Source of mutation-event batches for one entity kind.
pub trait MutationBus: Send + Sync {
    fn subscribe(&self, entity: EntityKind) -> Subscription;
}

/// Receiving end of a bus subscription. Dropping it detaches.
#[derive(Debug)]
pub struct Subscription {
    id: u64,
    entity: EntityKind,
    receiver: mpsc::UnboundedReceiver<EventBatch>,
    bus: Weak<BusInner>,
}

impl Subscription {
    pub fn entity(&self) -> EntityKind {
        self.entity
    }

    /// Next batch, or `None` once the bus is gone.
    pub async fn recv(&mut self) -> Option<EventBatch> {
        self.receiver.recv().await
    }

    pub fn try_recv(&mut self) -> Option<EventBatch> {
        self.receiver.try_recv().ok()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(bus) = self.bus.upgrade() {
            bus.unsubscribe(self.id);
        }
    }
}

#[derive(Debug, Default)]
struct BusInner {
    next_id: AtomicU64,
    subscribers: Mutex<Vec<Subscriber>>,
}

#[derive(Debug)]
struct Subscriber {
    id: u64,
    entity: EntityKind,
    sender: mpsc::UnboundedSender<EventBatch>,
}

impl BusInner {
    fn subscribers(&self) -> MutexGuard<'_, Vec<Subscriber>> {
        // A panicking publisher cannot leave the list half-written.
        self.subscribers
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    fn unsubscribe(&self, id: u64) {
        self.subscribers().retain(|s| s.id != id);
    }
}

/// In-process mutation bus over unbounded tokio channels.
#[derive(Debug, Clone, Default)]
pub struct EventBus {
    inner: Arc<BusInner>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Deliver a batch to every subscriber of `entity`. Empty batches are
    /// not sent. Returns the number of subscribers reached.
    pub fn publish(&self, entity: EntityKind, batch: EventBatch) -> usize {
        if batch.is_empty() {
            return 0;
        }
        let mut subscribers = self.inner.subscribers();
        subscribers.retain(|s| !s.sender.is_closed());

        let mut delivered = 0;
        for sub in subscribers.iter().filter(|s| s.entity == entity) {
            if sub.sender.send(batch.clone()).is_ok() {
                delivered += 1;
            }
        }
        trace!(?entity, events = batch.len(), delivered, "published batch");
        delivered
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner.subscribers().len()
    }
}

impl MutationBus for EventBus {
    fn subscribe(&self, entity: EntityKind) -> Subscription {
        let (sender, receiver) = mpsc::unbounded_channel();
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        self.inner.subscribers().push(Subscriber {
            id,
            entity,
            sender,
        });
        Subscription {
            id,
            entity,
            receiver,
            bus: Arc::downgrade(&self.inner),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn publish_reaches_matching_subscribers_only() {
        let bus = EventBus::new();
        let mut news = bus.subscribe(EntityKind::News);
        let mut feeds = bus.subscribe(EntityKind::Feed);

        let item = NewsItem::new("feed", "a", "A", 0);
        assert_eq!(bus.publish(EntityKind::News, vec![MutationEvent::updated(&item)]), 1);

        let batch = news.try_recv().unwrap();
        assert_eq!(batch.len(), 1);
        assert_eq!(batch[0].item_ref, item.item_ref);
        assert!(feeds.try_recv().is_none());
    }

    #[test]
    fn dropping_subscription_detaches() {
        let bus = EventBus::new();
        let sub = bus.subscribe(EntityKind::News);
        assert_eq!(bus.subscriber_count(), 1);
        drop(sub);
        assert_eq!(bus.subscriber_count(), 0);
        assert_eq!(
            bus.publish(EntityKind::News, vec![MutationEvent::deleted(ItemRef::from_raw(1))]),
            0
        );
    }

    #[test]
    fn empty_batches_are_not_sent() {
        let bus = EventBus::new();
        let mut sub = bus.subscribe(EntityKind::News);
        assert_eq!(bus.publish(EntityKind::News, vec![]), 0);
        assert!(sub.try_recv().is_none());
    }

    #[test]
    fn unknown_kinds_deserialize() {
        let event: MutationEvent =
            serde_json::from_str(r#"{"item_ref":7,"kind":"archived"}"#).unwrap();
        assert_eq!(event.kind, MutationKind::Unknown);
        assert!(event.snapshot.is_none());
    }

    #[tokio::test]
    async fn recv_yields_batches_in_order() {
        let bus = EventBus::new();
        let mut sub = bus.subscribe(EntityKind::News);
        bus.publish(EntityKind::News, vec![MutationEvent::deleted(ItemRef::from_raw(1))]);
        bus.publish(EntityKind::News, vec![MutationEvent::deleted(ItemRef::from_raw(2))]);

        assert_eq!(sub.recv().await.unwrap()[0].item_ref, ItemRef::from_raw(1));
        assert_eq!(sub.recv().await.unwrap()[0].item_ref, ItemRef::from_raw(2));
    }
}
