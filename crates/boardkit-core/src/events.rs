//! In-process event bus between render surfaces and the editing session.

use crate::board::InstanceId;
use crate::grid::GridRect;
use std::collections::{HashMap, VecDeque};
use std::fmt::Debug;
use std::hash::Hash;

/// Default number of events kept per kind for replay.
pub const DEFAULT_HISTORY_CAPACITY: usize = 32;
/// Default cap on listeners per kind.
pub const DEFAULT_MAX_LISTENERS: usize = 64;

/// An event that can travel over an [`EventBus`].
pub trait BusEvent: Clone + Send + 'static {
    /// Discriminant used as the event name.
    type Kind: Copy + Eq + Hash + Debug + Send + 'static;

    fn kind(&self) -> Self::Kind;
}

/// Handle returned by [`EventBus::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(u64);

type Handler<E> = Box<dyn FnMut(&E) + Send>;
type Filter<E> = Box<dyn Fn(&E) -> bool + Send>;

/// How a listener is registered.
pub struct SubscribeOptions<E> {
    /// Higher runs first. Equal priorities run in subscription order.
    pub priority: i32,
    filter: Option<Filter<E>>,
    /// Drop the listener after its first invocation.
    pub once: bool,
    /// Owner tag for bulk removal with [`EventBus::unsubscribe_registrar`].
    pub registrar: Option<String>,
}

impl<E> Default for SubscribeOptions<E> {
    fn default() -> Self {
        Self {
            priority: 0,
            filter: None,
            once: false,
            registrar: None,
        }
    }
}

impl<E> SubscribeOptions<E> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    /// Only invoke the handler for events matching `filter`.
    pub fn filter(mut self, filter: impl Fn(&E) -> bool + Send + 'static) -> Self {
        self.filter = Some(Box::new(filter));
        self
    }

    pub fn once(mut self) -> Self {
        self.once = true;
        self
    }

    pub fn registrar(mut self, tag: impl Into<String>) -> Self {
        self.registrar = Some(tag.into());
        self
    }
}

struct Listener<E> {
    id: SubscriptionId,
    priority: i32,
    handler: Handler<E>,
    filter: Option<Filter<E>>,
    once: bool,
    registrar: Option<String>,
}

/// Synchronous publish/subscribe keyed by event kind.
pub struct EventBus<E: BusEvent> {
    listeners: HashMap<E::Kind, Vec<Listener<E>>>,
    history: HashMap<E::Kind, VecDeque<E>>,
    emitted: HashMap<E::Kind, u64>,
    history_capacity: usize,
    max_listeners: usize,
    next_id: u64,
}

impl<E: BusEvent> Default for EventBus<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: BusEvent> EventBus<E> {
    pub fn new() -> Self {
        Self::with_limits(DEFAULT_HISTORY_CAPACITY, DEFAULT_MAX_LISTENERS)
    }

    /// Create a bus keeping `history_capacity` events per kind (0 disables history)
    /// and accepting at most `max_listeners` listeners per kind.
    pub fn with_limits(history_capacity: usize, max_listeners: usize) -> Self {
        Self {
            listeners: HashMap::new(),
            history: HashMap::new(),
            emitted: HashMap::new(),
            history_capacity,
            max_listeners,
            next_id: 0,
        }
    }

    /// Register a handler for one event kind.
    ///
    /// Returns `None` if the kind already has `max_listeners` listeners.
    pub fn subscribe(
        &mut self,
        kind: E::Kind,
        handler: impl FnMut(&E) + Send + 'static,
        options: SubscribeOptions<E>,
    ) -> Option<SubscriptionId> {
        let listeners = self.listeners.entry(kind).or_default();
        if listeners.len() >= self.max_listeners {
            log::warn!(
                "Listener limit ({}) reached for {:?}, subscription rejected",
                self.max_listeners,
                kind
            );
            return None;
        }

        self.next_id += 1;
        let id = SubscriptionId(self.next_id);
        let listener = Listener {
            id,
            priority: options.priority,
            handler: Box::new(handler),
            filter: options.filter,
            once: options.once,
            registrar: options.registrar,
        };
        // Insert after every listener of equal or higher priority.
        let index = listeners.partition_point(|l| l.priority >= listener.priority);
        listeners.insert(index, listener);
        Some(id)
    }

    /// Remove one listener. Returns false if it was not registered.
    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        for listeners in self.listeners.values_mut() {
            if let Some(index) = listeners.iter().position(|l| l.id == id) {
                listeners.remove(index);
                return true;
            }
        }
        false
    }

    /// Remove every listener registered under `tag`. Returns how many were removed.
    pub fn unsubscribe_registrar(&mut self, tag: &str) -> usize {
        let mut removed = 0;
        for listeners in self.listeners.values_mut() {
            let before = listeners.len();
            listeners.retain(|l| l.registrar.as_deref() != Some(tag));
            removed += before - listeners.len();
        }
        removed
    }

    /// Dispatch an event to the listeners of its kind.
    ///
    /// Returns the number of handlers invoked.
    pub fn publish(&mut self, event: E) -> usize {
        let kind = event.kind();
        *self.emitted.entry(kind).or_insert(0) += 1;

        let mut invoked = 0;
        if let Some(listeners) = self.listeners.get_mut(&kind) {
            let mut spent = Vec::new();
            for listener in listeners.iter_mut() {
                if let Some(filter) = &listener.filter {
                    if !filter(&event) {
                        continue;
                    }
                }
                (listener.handler)(&event);
                invoked += 1;
                if listener.once {
                    spent.push(listener.id);
                }
            }
            listeners.retain(|l| !spent.contains(&l.id));
        }
        log::debug!("Published {:?} to {} handlers", kind, invoked);

        if self.history_capacity > 0 {
            let history = self.history.entry(kind).or_default();
            if history.len() == self.history_capacity {
                history.pop_front();
            }
            history.push_back(event);
        }
        invoked
    }

    /// Recent events of one kind, oldest first.
    pub fn history(&self, kind: E::Kind) -> Vec<E> {
        self.history
            .get(&kind)
            .map(|events| events.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn listener_count(&self, kind: E::Kind) -> usize {
        self.listeners.get(&kind).map_or(0, Vec::len)
    }

    /// Number of events published so far, per kind.
    pub fn stats(&self) -> HashMap<E::Kind, u64> {
        self.emitted.clone()
    }

    /// Drop all listeners, history and counters.
    pub fn clear(&mut self) {
        self.listeners.clear();
        self.history.clear();
        self.emitted.clear();
    }
}

/// Kinds of [`EditorEvent`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    GeometryProposed,
    SelectionChanged,
    RemoveRequested,
    ItemAdded,
    ItemRemoved,
    GeometryApplied,
    GeometryRejected,
    ConfigChanged,
    DataChanged,
    BoardLoaded,
}

/// Events exchanged between render surfaces and the editing session.
///
/// Surfaces publish proposals (`GeometryProposed`, `RemoveRequested`,
/// `SelectionChanged`); the session publishes what it actually applied.
#[derive(Debug, Clone, PartialEq)]
pub enum EditorEvent {
    GeometryProposed {
        instance_id: InstanceId,
        geometry: GridRect,
    },
    SelectionChanged {
        instance_ids: Vec<InstanceId>,
    },
    RemoveRequested {
        instance_id: InstanceId,
    },
    ItemAdded {
        instance_id: InstanceId,
        type_id: String,
    },
    ItemRemoved {
        instance_id: InstanceId,
    },
    GeometryApplied {
        instance_id: InstanceId,
        geometry: GridRect,
    },
    GeometryRejected {
        instance_id: InstanceId,
        reason: String,
    },
    ConfigChanged {
        instance_id: InstanceId,
    },
    DataChanged {
        instance_id: InstanceId,
    },
    BoardLoaded {
        board_id: String,
    },
}

impl BusEvent for EditorEvent {
    type Kind = EventKind;

    fn kind(&self) -> EventKind {
        match self {
            EditorEvent::GeometryProposed { .. } => EventKind::GeometryProposed,
            EditorEvent::SelectionChanged { .. } => EventKind::SelectionChanged,
            EditorEvent::RemoveRequested { .. } => EventKind::RemoveRequested,
            EditorEvent::ItemAdded { .. } => EventKind::ItemAdded,
            EditorEvent::ItemRemoved { .. } => EventKind::ItemRemoved,
            EditorEvent::GeometryApplied { .. } => EventKind::GeometryApplied,
            EditorEvent::GeometryRejected { .. } => EventKind::GeometryRejected,
            EditorEvent::ConfigChanged { .. } => EventKind::ConfigChanged,
            EditorEvent::DataChanged { .. } => EventKind::DataChanged,
            EditorEvent::BoardLoaded { .. } => EventKind::BoardLoaded,
        }
    }
}
