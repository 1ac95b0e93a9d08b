//! Event Bus - central pub/sub system for verification events
//!
//! Dispatch is synchronous: `emit` enriches the payload, records it in the
//! per-type history ring (when recording), then invokes every listener for
//! the event's type followed by every wildcard listener, in registration
//! order, on the caller's thread. Listener panics are caught and logged so
//! one misbehaving listener never stops the others.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, error};

use super::types::{Event, EventContext, EventPayload, EventType};

/// Default number of events retained per event type
pub const DEFAULT_MAX_HISTORY_SIZE: usize = 1000;

/// Listener callback invoked for every matching event
pub type Listener = Arc<dyn Fn(&Event) + Send + Sync>;

/// What a listener is attached to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Topic {
    /// One specific event type
    Type(EventType),
    /// Every event (`*`)
    Any,
}

impl From<EventType> for Topic {
    fn from(event_type: EventType) -> Self {
        Topic::Type(event_type)
    }
}

struct ListenerEntry {
    id: u64,
    listener: Listener,
    once: bool,
}

struct HistoryEntry {
    sequence: u64,
    event: Event,
}

#[derive(Default)]
struct BusState {
    listeners: HashMap<EventType, Vec<ListenerEntry>>,
    wildcard: Vec<ListenerEntry>,
    history: HashMap<EventType, VecDeque<HistoryEntry>>,
    recording: bool,
    next_listener_id: u64,
    next_sequence: u64,
}

impl BusState {
    fn add_listener(&mut self, topic: Topic, listener: Listener, once: bool) -> u64 {
        self.next_listener_id += 1;
        let entry = ListenerEntry {
            id: self.next_listener_id,
            listener,
            once,
        };
        match topic {
            Topic::Type(event_type) => self.listeners.entry(event_type).or_default().push(entry),
            Topic::Any => self.wildcard.push(entry),
        }
        self.next_listener_id
    }

    fn remove_listener(&mut self, topic: Topic, id: u64) -> bool {
        let entries = match topic {
            Topic::Type(event_type) => match self.listeners.get_mut(&event_type) {
                Some(entries) => entries,
                None => return false,
            },
            Topic::Any => &mut self.wildcard,
        };
        let before = entries.len();
        entries.retain(|entry| entry.id != id);
        before != entries.len()
    }

    fn record(&mut self, event: &Event, max_size: usize) {
        self.next_sequence += 1;
        let ring = self.history.entry(event.event_type).or_default();
        ring.push_back(HistoryEntry {
            sequence: self.next_sequence,
            event: event.clone(),
        });
        while ring.len() > max_size {
            ring.pop_front();
        }
    }

    /// Collect the listeners for one dispatch: type-specific first, then
    /// wildcard. One-shot listeners are detached here so they fire at most
    /// once even under concurrent emission.
    fn dispatch_list(&mut self, event_type: EventType) -> Vec<(u64, Listener)> {
        let mut out = Vec::new();
        if let Some(entries) = self.listeners.get_mut(&event_type) {
            out.extend(entries.iter().map(|e| (e.id, e.listener.clone())));
            entries.retain(|e| !e.once);
        }
        out.extend(self.wildcard.iter().map(|e| (e.id, e.listener.clone())));
        self.wildcard.retain(|e| !e.once);
        out
    }
}

/// Handle returned by [`EventBus::on`]; `unsubscribe` detaches exactly
/// the listener it was created for
#[must_use = "dropping a Subscription leaves the listener attached; call unsubscribe() to detach"]
pub struct Subscription {
    id: u64,
    topic: Topic,
    state: Weak<Mutex<BusState>>,
}

impl Subscription {
    /// Detach the listener. Safe to call more than once.
    pub fn unsubscribe(&self) {
        debug!(id = self.id, topic = ?self.topic, "Subscription::unsubscribe: called");
        if let Some(state) = self.state.upgrade() {
            let removed = lock(&state).remove_listener(self.topic, self.id);
            debug!(id = self.id, removed, "Subscription::unsubscribe: done");
        }
    }

    pub fn topic(&self) -> Topic {
        self.topic
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("topic", &self.topic)
            .finish()
    }
}

/// Derived view over the recorded history
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EventStatistics {
    pub total_events: usize,
    pub events_by_type: BTreeMap<EventType, usize>,
    pub oldest_event: Option<DateTime<Utc>>,
    pub newest_event: Option<DateTime<Utc>>,
}

/// Central event bus for verification activity
///
/// Construct one per process (or per test) and share it as `Arc<EventBus>`.
pub struct EventBus {
    state: Arc<Mutex<BusState>>,
    max_history_size: usize,
}

fn lock(state: &Mutex<BusState>) -> MutexGuard<'_, BusState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

impl EventBus {
    /// Create a new event bus keeping at most `max_history_size` events per type
    pub fn new(max_history_size: usize) -> Self {
        debug!(max_history_size, "EventBus::new: creating event bus");
        Self {
            state: Arc::new(Mutex::new(BusState::default())),
            max_history_size,
        }
    }

    /// Create a new event bus with the default history size
    pub fn with_default_history() -> Self {
        Self::new(DEFAULT_MAX_HISTORY_SIZE)
    }

    pub fn max_history_size(&self) -> usize {
        self.max_history_size
    }

    /// Emit an event with generated id and timestamp
    pub fn emit(&self, event_type: EventType, payload: impl Into<EventPayload>) -> Event {
        self.emit_with_context(event_type, payload, EventContext::default())
    }

    /// Emit an event with caller-supplied base fields
    ///
    /// Returns the enriched event as it was delivered.
    pub fn emit_with_context(
        &self,
        event_type: EventType,
        payload: impl Into<EventPayload>,
        context: EventContext,
    ) -> Event {
        let event = Event::enrich(event_type, payload.into(), context);
        debug!(
            %event_type,
            event_id = %event.event_id,
            adapter = %event.adapter(),
            "EventBus::emit"
        );

        let listeners = {
            let mut state = lock(&self.state);
            if state.recording {
                state.record(&event, self.max_history_size);
            }
            state.dispatch_list(event_type)
        };

        for (id, listener) in listeners {
            if let Err(panic) = panic::catch_unwind(AssertUnwindSafe(|| listener(&event))) {
                error!(
                    listener_id = id,
                    %event_type,
                    error = panic_message(&*panic),
                    "EventBus::emit: listener panicked"
                );
            }
        }

        event
    }

    /// Attach a listener to one event type or to every event
    pub fn on<F>(&self, topic: impl Into<Topic>, listener: F) -> Subscription
    where
        F: Fn(&Event) + Send + Sync + 'static,
    {
        self.attach(topic.into(), Arc::new(listener), false)
    }

    /// Attach a listener that detaches itself after its first invocation
    pub fn once<F>(&self, topic: impl Into<Topic>, listener: F) -> Subscription
    where
        F: Fn(&Event) + Send + Sync + 'static,
    {
        self.attach(topic.into(), Arc::new(listener), true)
    }

    fn attach(&self, topic: Topic, listener: Listener, once: bool) -> Subscription {
        let id = lock(&self.state).add_listener(topic, listener, once);
        debug!(id, ?topic, once, "EventBus::attach: listener added");
        Subscription {
            id,
            topic,
            state: Arc::downgrade(&self.state),
        }
    }

    /// Detach a listener by its subscription handle
    pub fn off(&self, subscription: &Subscription) {
        subscription.unsubscribe();
    }

    /// Remove every listener for one topic, or all listeners when `None`
    pub fn remove_all_listeners(&self, topic: Option<Topic>) {
        debug!(?topic, "EventBus::remove_all_listeners: called");
        let mut state = lock(&self.state);
        match topic {
            Some(Topic::Type(event_type)) => {
                state.listeners.remove(&event_type);
            }
            Some(Topic::Any) => state.wildcard.clear(),
            None => {
                state.listeners.clear();
                state.wildcard.clear();
            }
        }
    }

    /// Number of listeners attached to a topic
    pub fn listener_count(&self, topic: impl Into<Topic>) -> usize {
        let state = lock(&self.state);
        match topic.into() {
            Topic::Type(event_type) => state.listeners.get(&event_type).map_or(0, Vec::len),
            Topic::Any => state.wildcard.len(),
        }
    }

    /// Enable history recording
    pub fn start_recording(&self) {
        debug!("EventBus::start_recording: called");
        lock(&self.state).recording = true;
    }

    /// Disable history recording; live dispatch continues
    pub fn stop_recording(&self) {
        debug!("EventBus::stop_recording: called");
        lock(&self.state).recording = false;
    }

    pub fn is_recording(&self) -> bool {
        lock(&self.state).recording
    }

    /// Recorded events
    ///
    /// For one type, events come back oldest first. Without a type, every
    /// recorded event is merged and returned newest first.
    pub fn get_history(&self, event_type: Option<EventType>) -> Vec<Event> {
        let state = lock(&self.state);
        match event_type {
            Some(event_type) => state
                .history
                .get(&event_type)
                .map(|ring| ring.iter().map(|entry| entry.event.clone()).collect())
                .unwrap_or_default(),
            None => {
                let mut entries: Vec<&HistoryEntry> = state.history.values().flatten().collect();
                entries.sort_by(|a, b| {
                    b.event
                        .timestamp
                        .cmp(&a.event.timestamp)
                        .then_with(|| b.sequence.cmp(&a.sequence))
                });
                entries.into_iter().map(|entry| entry.event.clone()).collect()
            }
        }
    }

    /// Drop recorded events for one type, or all of them
    pub fn clear_history(&self, event_type: Option<EventType>) {
        debug!(?event_type, "EventBus::clear_history: called");
        let mut state = lock(&self.state);
        match event_type {
            Some(event_type) => {
                state.history.remove(&event_type);
            }
            None => state.history.clear(),
        }
    }

    /// Counts and time bounds over the recorded history
    pub fn get_statistics(&self) -> EventStatistics {
        let state = lock(&self.state);
        let mut stats = EventStatistics::default();
        for (event_type, ring) in &state.history {
            if ring.is_empty() {
                continue;
            }
            stats.total_events += ring.len();
            stats.events_by_type.insert(*event_type, ring.len());
            for entry in ring {
                let ts = entry.event.timestamp;
                if stats.oldest_event.is_none_or(|oldest| ts < oldest) {
                    stats.oldest_event = Some(ts);
                }
                if stats.newest_event.is_none_or(|newest| ts > newest) {
                    stats.newest_event = Some(ts);
                }
            }
        }
        stats
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::with_default_history()
    }
}

/// Create an event bus wrapped in an Arc for shared ownership
pub fn create_event_bus(max_history_size: usize) -> Arc<EventBus> {
    Arc::new(EventBus::new(max_history_size))
}

/// Best-effort text of a caught panic payload
pub(crate) fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
