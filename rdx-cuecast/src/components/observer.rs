//! Callback observers that react to the notification stream.
//!
//! Each observer owns a bounded queue and a task draining it, so a slow
//! handler only ever delays itself.

use crate::notification::Notification;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc::{self, error::TrySendError};

/// Decides whether an observer is interested in a notification.
pub type NotificationFilter = Arc<dyn Fn(&Notification) -> bool + Send + Sync>;

/// Handles one notification at a time, on the observer's own task.
pub type NotificationHandler = Box<dyn FnMut(Notification) + Send>;

/// Result of offering a notification to an observer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Delivery {
    Queued,
    Skipped,
    Dropped,
    Closed,
}

/// A registered observer. Clones share the queue and the drop counter, so
/// the bus can offer to a snapshot taken outside its registry lock.
#[derive(Clone)]
pub(crate) struct Observer {
    filter: Option<NotificationFilter>,
    queue: mpsc::Sender<Notification>,
    dropped: Arc<AtomicU64>,
}

impl Observer {
    /// Creates the observer and spawns the task that feeds `handler`.
    pub(crate) fn spawn(
        capacity: usize,
        filter: Option<NotificationFilter>,
        mut handler: NotificationHandler,
    ) -> Self {
        let (queue, mut inbox) = mpsc::channel(capacity.max(1));
        tokio::spawn(async move {
            while let Some(notification) = inbox.recv().await {
                handler(notification);
            }
        });
        Self {
            filter,
            queue,
            dropped: Arc::default(),
        }
    }

    /// Notifications lost to a full queue so far.
    pub(crate) fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Queues a copy of `notification` without waiting for room.
    pub(crate) fn offer(&self, notification: &Notification) -> Delivery {
        if let Some(filter) = &self.filter {
            if !filter(notification) {
                return Delivery::Skipped;
            }
        }
        match self.queue.try_send(notification.clone()) {
            Ok(()) => Delivery::Queued,
            Err(TrySendError::Full(_)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                Delivery::Dropped
            }
            Err(TrySendError::Closed(_)) => Delivery::Closed,
        }
    }
}
