//! Fan-out of scheduler and store notifications to observers.

use crate::common::ObserverId;
use crate::components::observer::{Delivery, NotificationFilter, NotificationHandler, Observer};
use crate::config::BusConfig;
use crate::notification::{Notification, SystemEvent};
use slotmap::SlotMap;
use std::sync::Arc;
use tokio::sync::{broadcast, RwLock};
use tracing::{trace, warn};

/// Publish/subscribe hub between the engine, the store and their observers.
///
/// Two kinds of listeners are supported: broadcast receivers from
/// [`subscribe`](Self::subscribe), which lag when they fall behind, and
/// callback observers, each with its own bounded queue. `publish` never waits
/// on either.
#[derive(Clone)]
pub struct NotificationBus {
    sender: broadcast::Sender<Notification>,
    observers: Arc<RwLock<SlotMap<ObserverId, Observer>>>,
    observer_capacity: usize,
}

impl NotificationBus {
    pub fn new(config: &BusConfig) -> Self {
        let (sender, _) = broadcast::channel(config.broadcast_capacity.max(1));
        Self {
            sender,
            observers: Arc::new(RwLock::new(SlotMap::with_key())),
            observer_capacity: config.observer_capacity,
        }
    }

    /// Delivers `notification` to every observer and subscriber.
    ///
    /// Filters run against a snapshot of the registry, with no lock held, so
    /// they may themselves register or remove observers.
    pub async fn publish(&self, notification: Notification) {
        let snapshot: Vec<(ObserverId, Observer)> = self
            .observers
            .read()
            .await
            .iter()
            .map(|(id, observer)| (id, observer.clone()))
            .collect();

        let mut closed = Vec::new();
        for (id, observer) in &snapshot {
            match observer.offer(&notification) {
                Delivery::Queued | Delivery::Skipped => {}
                Delivery::Dropped => warn!(
                    "Observer {:?} queue full; dropped {} notification ({} dropped so far).",
                    id,
                    notification.label(),
                    observer.dropped()
                ),
                Delivery::Closed => closed.push(*id),
            }
        }
        if !closed.is_empty() {
            let mut observers = self.observers.write().await;
            closed.retain(|id| observers.remove(*id).is_some());
        }
        trace!("Published {} notification.", notification.label());
        self.sender.send(notification).ok();

        for id in closed {
            self.sender
                .send(Notification::System(SystemEvent::ObserverRemoved { id }))
                .ok();
        }
    }

    /// Subscribes to the raw notification stream.
    pub fn subscribe(&self) -> broadcast::Receiver<Notification> {
        self.sender.subscribe()
    }

    /// Registers a callback run for every notification.
    ///
    /// # Returns
    /// An `ObserverId` which can be used to later remove this observer.
    pub async fn on_notification(
        &self,
        handler: impl FnMut(Notification) + Send + 'static,
    ) -> ObserverId {
        self.register(None, Box::new(handler)).await
    }

    /// Registers a callback run only for notifications accepted by `filter`.
    pub async fn on_notification_where(
        &self,
        filter: impl Fn(&Notification) -> bool + Send + Sync + 'static,
        handler: impl FnMut(Notification) + Send + 'static,
    ) -> ObserverId {
        self.register(Some(Arc::new(filter)), Box::new(handler))
            .await
    }

    async fn register(
        &self,
        filter: Option<NotificationFilter>,
        handler: NotificationHandler,
    ) -> ObserverId {
        let observer = Observer::spawn(self.observer_capacity, filter, handler);
        let id = self.observers.write().await.insert(observer);
        self.publish(Notification::System(SystemEvent::ObserverAdded { id }))
            .await;
        id
    }

    /// Removes an observer. Its queue is closed and its task winds down after
    /// draining what was already queued.
    ///
    /// Returns `true` if the observer was found and removed.
    pub async fn remove_observer(&self, id: ObserverId) -> bool {
        let was_removed = self.observers.write().await.remove(id).is_some();
        if was_removed {
            self.publish(Notification::System(SystemEvent::ObserverRemoved { id }))
                .await;
        }
        was_removed
    }

    pub async fn observer_count(&self) -> usize {
        self.observers.read().await.len()
    }
}

impl Default for NotificationBus {
    fn default() -> Self {
        Self::new(&BusConfig::default())
    }
}
