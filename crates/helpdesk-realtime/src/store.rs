//! Bounded, newest-first notification list.
//!
//! [`NotificationStore`] is the plain data structure. [`SharedStore`] wraps it
//! for concurrent use and broadcasts a [`StoreChange`] after every mutation so
//! views can re-render.

use std::collections::VecDeque;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use helpdesk_core::NotificationId;
use parking_lot::RwLock;
use serde::Serialize;
use serde_json::{Map, Value};
use tokio::sync::broadcast;

use crate::protocol::{EventKind, NotificationEvent};

/// Default number of notifications kept in memory.
pub const DEFAULT_CAPACITY: usize = 50;

const CHANGE_BUFFER: usize = 256;

/// A received notification.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Notification {
    /// Locally assigned ID.
    pub id: NotificationId,
    /// Event type.
    pub kind: EventKind,
    /// Display text.
    pub message: String,
    /// Referenced ticket.
    pub ticket_id: Option<u64>,
    /// Event time, or arrival time when the server sent none.
    pub timestamp: DateTime<Utc>,
    /// Extra server-provided context.
    pub extra: Map<String, Value>,
    /// Whether the user has seen it.
    pub read: bool,
}

impl Notification {
    /// Materialize an event received at `now`.
    pub fn from_event(event: NotificationEvent, now: DateTime<Utc>) -> Self {
        Self {
            id: NotificationId::new(),
            kind: event.kind,
            message: event.message,
            ticket_id: event.ticket_id,
            timestamp: event.timestamp.unwrap_or(now),
            extra: event.extra,
            read: false,
        }
    }

    /// Ticket title, when the server included one.
    pub fn title(&self) -> Option<&str> {
        self.extra.get("title").and_then(Value::as_str)
    }
}

/// Which notifications to list.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ReadFilter {
    /// Everything.
    #[default]
    All,
    /// Only unread.
    Unread,
    /// Only read.
    Read,
}

impl ReadFilter {
    fn accepts(self, n: &Notification) -> bool {
        match self {
            Self::All => true,
            Self::Unread => !n.read,
            Self::Read => n.read,
        }
    }
}

/// The notification list and its unread counter.
#[derive(Debug, Clone)]
pub struct NotificationStore {
    items: VecDeque<Notification>,
    unread: usize,
    capacity: usize,
}

impl NotificationStore {
    /// Empty store keeping at most `capacity` entries (minimum 1).
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            items: VecDeque::with_capacity(capacity),
            unread: 0,
            capacity,
        }
    }

    /// Add an event received now.
    pub fn add(&mut self, event: NotificationEvent) -> Notification {
        self.add_at(event, Utc::now())
    }

    /// Add an event received at `now`. The entry goes to the front; the
    /// oldest entries past capacity are dropped.
    pub fn add_at(&mut self, event: NotificationEvent, now: DateTime<Utc>) -> Notification {
        let notification = Notification::from_event(event, now);
        self.items.push_front(notification.clone());
        self.unread += 1;
        while self.items.len() > self.capacity {
            if self.items.pop_back().is_some_and(|evicted| !evicted.read) {
                self.unread = self.unread.saturating_sub(1);
            }
        }
        notification
    }

    /// Mark one entry read. Returns `true` only if an unread entry flipped.
    pub fn mark_as_read(&mut self, id: &NotificationId) -> bool {
        match self.items.iter_mut().find(|n| &n.id == id) {
            Some(n) if !n.read => {
                n.read = true;
                self.unread = self.unread.saturating_sub(1);
                true
            }
            _ => false,
        }
    }

    /// Mark everything read.
    pub fn mark_all_as_read(&mut self) {
        for n in &mut self.items {
            n.read = true;
        }
        self.unread = 0;
    }

    /// Drop everything.
    pub fn clear(&mut self) {
        self.items.clear();
        self.unread = 0;
    }

    /// All entries, newest first.
    pub fn list(&self) -> Vec<Notification> {
        self.items.iter().cloned().collect()
    }

    /// Entries matching `filter`, newest first.
    pub fn filter(&self, filter: ReadFilter) -> Vec<Notification> {
        self.items
            .iter()
            .filter(|n| filter.accepts(n))
            .cloned()
            .collect()
    }

    /// Number of unread entries.
    pub fn unread_count(&self) -> usize {
        self.unread
    }

    /// Look up one entry.
    pub fn get(&self, id: &NotificationId) -> Option<&Notification> {
        self.items.iter().find(|n| &n.id == id)
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Whether the store is empty.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Maximum number of entries.
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl Default for NotificationStore {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

/// A mutation applied to a [`SharedStore`].
#[derive(Clone, Debug, PartialEq)]
pub enum StoreChange {
    /// A notification arrived.
    Added(Notification),
    /// One notification was marked read.
    Read(NotificationId),
    /// Everything was marked read.
    AllRead,
    /// The list was emptied.
    Cleared,
}

/// Thread-safe store handle. Clones share state.
#[derive(Clone)]
pub struct SharedStore {
    inner: Arc<RwLock<NotificationStore>>,
    changes: broadcast::Sender<StoreChange>,
}

impl SharedStore {
    /// Empty store with the given capacity.
    pub fn new(capacity: usize) -> Self {
        let (changes, _) = broadcast::channel(CHANGE_BUFFER);
        Self {
            inner: Arc::new(RwLock::new(NotificationStore::new(capacity))),
            changes,
        }
    }

    /// See [`NotificationStore::add`].
    pub fn add(&self, event: NotificationEvent) -> Notification {
        let notification = self.inner.write().add(event);
        let _ = self.changes.send(StoreChange::Added(notification.clone()));
        notification
    }

    /// See [`NotificationStore::mark_as_read`].
    pub fn mark_as_read(&self, id: &NotificationId) -> bool {
        let flipped = self.inner.write().mark_as_read(id);
        if flipped {
            let _ = self.changes.send(StoreChange::Read(id.clone()));
        }
        flipped
    }

    /// See [`NotificationStore::mark_all_as_read`].
    pub fn mark_all_as_read(&self) {
        self.inner.write().mark_all_as_read();
        let _ = self.changes.send(StoreChange::AllRead);
    }

    /// See [`NotificationStore::clear`].
    pub fn clear(&self) {
        self.inner.write().clear();
        let _ = self.changes.send(StoreChange::Cleared);
    }

    /// Snapshot, newest first.
    pub fn list(&self) -> Vec<Notification> {
        self.inner.read().list()
    }

    /// Filtered snapshot, newest first.
    pub fn filter(&self, filter: ReadFilter) -> Vec<Notification> {
        self.inner.read().filter(filter)
    }

    /// Unread counter.
    pub fn unread_count(&self) -> usize {
        self.inner.read().unread_count()
    }

    /// Copy of one entry.
    pub fn get(&self, id: &NotificationId) -> Option<Notification> {
        self.inner.read().get(id).cloned()
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.inner.read().len()
    }

    /// Whether the store is empty.
    pub fn is_empty(&self) -> bool {
        self.inner.read().is_empty()
    }

    /// Subscribe to mutations.
    pub fn subscribe(&self) -> broadcast::Receiver<StoreChange> {
        self.changes.subscribe()
    }
}

impl Default for SharedStore {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}
