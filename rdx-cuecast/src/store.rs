//! The event store: the single owner of all scheduled events.

use crate::bus::NotificationBus;
use crate::common::EventId;
use crate::error::StoreError;
use crate::event::{Event, EventFields, EventPatch};
use crate::notification::{Notification, StoreChange};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info};

/// An event together with its insertion sequence number.
#[derive(Debug, Clone)]
struct Entry {
    seq: u64,
    event: Event,
}

#[derive(Debug, Default)]
struct StoreInner {
    entries: HashMap<EventId, Entry>,
    next_seq: u64,
    next_id: u64,
}

impl StoreInner {
    /// Hands out the next unused id. Once an imported id has pushed the
    /// counter to the end of the id space, the lowest free id is used.
    fn allocate_id(&mut self) -> EventId {
        let candidate = EventId(self.next_id);
        if !self.entries.contains_key(&candidate) {
            self.next_id = self.next_id.saturating_add(1);
            return candidate;
        }
        (0..=u64::MAX)
            .map(EventId)
            .find(|id| !self.entries.contains_key(id))
            .unwrap_or(candidate)
    }

    fn insert(&mut self, event: Event) {
        let seq = self.next_seq;
        self.next_seq += 1;
        // Keep the allocator ahead of any id that came from outside.
        self.next_id = self.next_id.max(event.id.0.saturating_add(1));
        self.entries.insert(event.id, Entry { seq, event });
    }

    /// Scheduled events ascending by time, then unscheduled ones; ties in
    /// insertion order.
    fn ordered(&self) -> Vec<Event> {
        let mut entries: Vec<&Entry> = self.entries.values().collect();
        entries.sort_by_key(|entry| {
            let at = entry.event.scheduled_at();
            (at.is_none(), at, entry.seq)
        });
        entries.into_iter().map(|entry| entry.event.clone()).collect()
    }
}

/// Thread-safe, cloneable handle to the event list.
///
/// Every operation is atomic and serialized with respect to the others.
/// Readers always get an owned, consistent snapshot. Successful mutations
/// publish `Notification::EventsChanged` after the lock has been released.
#[derive(Clone, Default)]
pub struct EventStore {
    inner: Arc<RwLock<StoreInner>>,
    bus: Option<NotificationBus>,
}

impl EventStore {
    /// Creates an empty store that does not publish anything.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty store that reports its mutations on `bus`.
    pub fn with_bus(bus: NotificationBus) -> Self {
        Self {
            inner: Arc::default(),
            bus: Some(bus),
        }
    }

    /// Inserts `event`.
    ///
    /// Fails with `DuplicateId` if an event with the same id is present.
    pub async fn add(&self, event: Event) -> Result<(), StoreError> {
        let id = event.id;
        let events = {
            let mut inner = self.inner.write().await;
            if inner.entries.contains_key(&id) {
                return Err(StoreError::DuplicateId(id));
            }
            inner.insert(event);
            inner.ordered()
        };
        debug!("Added event {}.", id);
        self.announce(StoreChange::Added(id), events).await;
        Ok(())
    }

    /// Allocates a fresh id for `fields` and inserts the resulting event.
    pub async fn create(&self, fields: EventFields) -> EventId {
        let (id, events) = {
            let mut inner = self.inner.write().await;
            let id = inner.allocate_id();
            inner.insert(Event::new(id, fields));
            (id, inner.ordered())
        };
        debug!("Created event {}.", id);
        self.announce(StoreChange::Added(id), events).await;
        id
    }

    /// Deletes the event with `id` and returns it.
    pub async fn remove(&self, id: EventId) -> Result<Event, StoreError> {
        let (removed, events) = {
            let mut inner = self.inner.write().await;
            let entry = inner.entries.remove(&id).ok_or(StoreError::NotFound(id))?;
            (entry.event, inner.ordered())
        };
        debug!("Removed event {}.", id);
        self.announce(StoreChange::Removed(id), events).await;
        Ok(removed)
    }

    /// Applies `patch` to the event with `id` and returns the updated event.
    /// The id and insertion order are never changed.
    pub async fn update(&self, id: EventId, patch: EventPatch) -> Result<Event, StoreError> {
        let (updated, events) = {
            let mut inner = self.inner.write().await;
            let entry = inner.entries.get_mut(&id).ok_or(StoreError::NotFound(id))?;
            patch.apply(&mut entry.event.fields);
            let updated = entry.event.clone();
            (updated, inner.ordered())
        };
        debug!("Updated event {}.", id);
        self.announce(StoreChange::Updated(id), events).await;
        Ok(updated)
    }

    pub async fn get(&self, id: EventId) -> Option<Event> {
        self.inner
            .read()
            .await
            .entries
            .get(&id)
            .map(|entry| entry.event.clone())
    }

    /// A consistent snapshot of all events in schedule order.
    pub async fn ordered_view(&self) -> Vec<Event> {
        self.inner.read().await.ordered()
    }

    /// Replaces the whole content with `events`, all or nothing.
    ///
    /// Insertion order follows the order of `events`. Fails with
    /// `DuplicateId` if the batch repeats an id, leaving the store untouched.
    pub async fn import_all(&self, events: Vec<Event>) -> Result<(), StoreError> {
        let mut seen = HashSet::with_capacity(events.len());
        if let Some(dup) = events.iter().find(|event| !seen.insert(event.id)) {
            return Err(StoreError::DuplicateId(dup.id));
        }

        let count = events.len();
        let ordered = {
            let mut inner = self.inner.write().await;
            inner.entries.clear();
            for event in events {
                inner.insert(event);
            }
            inner.ordered()
        };
        info!("Imported {} events.", count);
        self.announce(StoreChange::Imported { count }, ordered).await;
        Ok(())
    }

    /// Imports id-less records, giving each a fresh id. Returns the new ids in
    /// input order.
    pub async fn import_fields(&self, records: Vec<EventFields>) -> Vec<EventId> {
        let count = records.len();
        let (ids, ordered) = {
            let mut inner = self.inner.write().await;
            inner.entries.clear();
            let ids: Vec<EventId> = records
                .into_iter()
                .map(|fields| {
                    let id = inner.allocate_id();
                    inner.insert(Event::new(id, fields));
                    id
                })
                .collect();
            (ids, inner.ordered())
        };
        info!("Imported {} events.", count);
        self.announce(StoreChange::Imported { count }, ordered).await;
        ids
    }

    /// All events in schedule order, suitable for `import_all`.
    pub async fn export_all(&self) -> Vec<Event> {
        self.ordered_view().await
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.entries.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.entries.is_empty()
    }

    async fn announce(&self, change: StoreChange, events: Vec<Event>) {
        if let Some(bus) = &self.bus {
            bus.publish(Notification::EventsChanged {
                change,
                events: events.into(),
            })
            .await;
        }
    }
}
