//! Per-device cache of decoded fields with change detection.

use crate::types::{ChangeEvent, FieldValue};
use brick_bus::Port;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use parking_lot::{Mutex, MutexGuard};
use std::sync::{Arc, Weak};
use time::OffsetDateTime;
use tracing::debug;

/// Callback invoked for every change event, on the thread that detected it.
pub type Listener = Arc<dyn Fn(&ChangeEvent) + Send + Sync>;

#[derive(Default)]
struct Listeners {
    next_id: u64,
    entries: Vec<(u64, Listener)>,
}

#[derive(Default)]
struct Cache {
    values: BTreeMap<&'static str, FieldValue>,
    closed: bool,
}

/// Handle returned when registering a listener.
///
/// Dropping the handle leaves the listener registered; call
/// [`Subscription::unsubscribe`] to remove it.
#[derive(Debug)]
pub struct Subscription {
    id: u64,
    listeners: Weak<Mutex<Listeners>>,
}

impl Subscription {
    /// Remove the listener. Returns false if it was already gone (device
    /// disposed or unsubscribed before).
    pub fn unsubscribe(self) -> bool {
        let Some(listeners) = self.listeners.upgrade() else {
            return false;
        };
        let mut guard = listeners.lock();
        let before = guard.entries.len();
        guard.entries.retain(|(id, _)| *id != self.id);
        guard.entries.len() != before
    }
}

impl std::fmt::Debug for Listeners {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Listeners")
            .field("count", &self.entries.len())
            .finish()
    }
}

pub struct ChangeNotifier {
    port: Port,
    cache: Mutex<Cache>,
    listeners: Arc<Mutex<Listeners>>,
    closed: AtomicBool,
}

impl ChangeNotifier {
    pub fn new(port: Port) -> Self {
        Self {
            port,
            cache: Mutex::new(Cache::default()),
            listeners: Arc::new(Mutex::new(Listeners::default())),
            closed: AtomicBool::new(false),
        }
    }

    fn cache(&self) -> MutexGuard<'_, Cache> {
        self.cache.lock()
    }

    pub fn subscribe(&self, listener: Listener) -> Subscription {
        let mut guard = self.listeners.lock();
        guard.next_id += 1;
        let id = guard.next_id;
        if !self.is_closed() {
            guard.entries.push((id, listener));
        }
        Subscription {
            id,
            listeners: Arc::downgrade(&self.listeners),
        }
    }

    pub fn listener_count(&self) -> usize {
        self.listeners
            .lock()
            .entries
            .len()
    }

    /// Record a decoded value. Emits one event when it differs from the
    /// cached value. Returns whether an event was emitted.
    pub fn publish(&self, field: &'static str, value: FieldValue) -> bool {
        self.commit(vec![(field, value)], false) == 1
    }

    /// Record several fields decoded together. All fields land in the cache
    /// under one lock, so readers never see half a tick. Returns the number of
    /// events emitted.
    pub fn publish_all(&self, fields: Vec<(&'static str, FieldValue)>) -> usize {
        self.commit(fields, false)
    }

    /// Record a command-driven value and emit an event even if it is unchanged.
    pub fn force(&self, field: &'static str, value: FieldValue) -> bool {
        self.commit(vec![(field, value)], true) == 1
    }

    pub fn get(&self, field: &str) -> Option<FieldValue> {
        self.cache().values.get(field).cloned()
    }

    /// Consistent copy of every cached field.
    pub fn snapshot(&self) -> BTreeMap<&'static str, FieldValue> {
        self.cache().values.clone()
    }

    /// Freeze the cache and drop all listeners. Nothing is cached or emitted
    /// afterwards.
    pub fn close(&self) {
        let mut cache = self.cache();
        cache.closed = true;
        self.closed.store(true, Ordering::SeqCst);
        drop(cache);
        self.listeners
            .lock()
            .entries
            .clear();
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn commit(&self, fields: Vec<(&'static str, FieldValue)>, forced: bool) -> usize {
        let events = {
            let mut cache = self.cache();
            if cache.closed {
                return 0;
            }
            let at = OffsetDateTime::now_utc();
            let mut events = Vec::new();
            for (field, new) in fields {
                let old = cache.values.get(field).cloned();
                if !forced && old.as_ref() == Some(&new) {
                    continue;
                }
                cache.values.insert(field, new.clone());
                events.push(ChangeEvent {
                    port: self.port,
                    field,
                    old,
                    new,
                    at,
                });
            }
            events
        };
        self.deliver(&events);
        events.len()
    }

    fn deliver(&self, events: &[ChangeEvent]) {
        if events.is_empty() {
            return;
        }
        let listeners: Vec<Listener> = self
            .listeners
            .lock()
            .entries
            .iter()
            .map(|(_, l)| Arc::clone(l))
            .collect();
        for event in events {
            debug!(port = %event.port, field = event.field, new = %event.new, "field changed");
            for listener in &listeners {
                if self.is_closed() {
                    return;
                }
                listener(event);
            }
        }
    }
}
