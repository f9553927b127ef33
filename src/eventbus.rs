//! Fan-out of accepted [`DeviceEvent`]s to diagnostics and telemetry listeners.
//!
//! Listeners only observe. Nothing registered here can influence scan or dwell state; the
//! engine publishes an event after it has validated it and before it routes it.

use crate::event::{DeviceEvent, EventKind};
use std::collections::HashMap;
use tokio::sync::broadcast;
use tracing::debug;

/// Trait for reacting to device events.
pub trait EventListener: Send {
    fn on_event(&mut self, event: &DeviceEvent);
}

/// Determines which kinds of events a listener wants to receive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventFilter {
    All,
    InputOnly,
    /// Status, battery, and error events.
    LifecycleOnly,
    Custom(fn(&DeviceEvent) -> bool),
}

impl EventFilter {
    pub fn accepts(&self, event: &DeviceEvent) -> bool {
        match self {
            EventFilter::All => true,
            EventFilter::InputOnly => event.kind() == EventKind::Input,
            EventFilter::LifecycleOnly => event.kind() != EventKind::Input,
            EventFilter::Custom(f) => f(event),
        }
    }
}

struct ListenerEntry {
    listener: Box<dyn EventListener>,
    enabled: bool,
    filter: EventFilter,
    /// Only events from this device id, when set.
    tag: Option<String>,
}

#[derive(Default)]
pub struct EventBus {
    next_id: u64,
    listeners: HashMap<u64, ListenerEntry>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a listener with a filter and optional device tag. Returns its id.
    pub fn add_listener(
        &mut self,
        listener: impl EventListener + 'static,
        filter: EventFilter,
        tag: Option<String>,
    ) -> u64 {
        let id = self.next_id;
        self.listeners.insert(
            id,
            ListenerEntry {
                listener: Box::new(listener),
                enabled: true,
                filter,
                tag,
            },
        );
        self.next_id += 1;
        id
    }

    pub fn enable(&mut self, id: u64) {
        if let Some(entry) = self.listeners.get_mut(&id) {
            entry.enabled = true;
        }
    }

    /// Mutes a listener without removing it.
    pub fn disable(&mut self, id: u64) {
        if let Some(entry) = self.listeners.get_mut(&id) {
            entry.enabled = false;
        }
    }

    pub fn remove_listener(&mut self, id: u64) -> bool {
        self.listeners.remove(&id).is_some()
    }

    pub fn len(&self) -> usize {
        self.listeners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.listeners.is_empty()
    }

    pub fn emit(&mut self, event: &DeviceEvent) {
        for entry in self.listeners.values_mut() {
            if !entry.enabled {
                continue;
            }
            if let Some(ref wanted) = entry.tag {
                if event.device_id() != wanted {
                    continue;
                }
            }
            if entry.filter.accepts(event) {
                entry.listener.on_event(event);
            }
        }
    }

    pub fn emit_all(&mut self, events: &[DeviceEvent]) {
        for event in events {
            self.emit(event);
        }
    }
}

/// Wraps a listener and forwards only events matching a predicate.
pub struct FilteredListener {
    predicate: Box<dyn Fn(&DeviceEvent) -> bool + Send + Sync>,
    inner: Box<dyn EventListener>,
}

impl FilteredListener {
    pub fn new(
        predicate: impl Fn(&DeviceEvent) -> bool + Send + Sync + 'static,
        inner: impl EventListener + 'static,
    ) -> Self {
        Self {
            predicate: Box::new(predicate),
            inner: Box::new(inner),
        }
    }
}

impl EventListener for FilteredListener {
    fn on_event(&mut self, event: &DeviceEvent) {
        if (self.predicate)(event) {
            self.inner.on_event(event);
        }
    }
}

/// Logs every event at debug level.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingListener;

impl EventListener for TracingListener {
    fn on_event(&mut self, event: &DeviceEvent) {
        debug!(
            device = event.device_id(),
            kind = ?event.kind(),
            ts = event.timestamp_ms(),
            "{:?}",
            event.payload()
        );
    }
}

/// Republishes events on a tokio broadcast channel.
///
/// Lagging receivers lose the oldest events; a send with no receivers is not an error.
pub struct BroadcastListener {
    tx: broadcast::Sender<DeviceEvent>,
}

impl BroadcastListener {
    pub fn new(tx: broadcast::Sender<DeviceEvent>) -> Self {
        Self { tx }
    }
}

impl EventListener for BroadcastListener {
    fn on_event(&mut self, event: &DeviceEvent) {
        let _ = self.tx.send(event.clone());
    }
}
