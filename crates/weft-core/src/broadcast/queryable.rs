//! Broadcaster that records events for later inspection.

use std::sync::Arc;

use parking_lot::Mutex;

use super::{Broadcaster, Event, EventKind, SharedBroadcaster};
use crate::syntax::{downcast, Syntax, SyntaxRef};

/// Records every event, in order, and optionally relays it onward.
///
/// Mostly useful in tests and tooling: nothing is dropped or reordered.
#[derive(Default)]
pub struct QueryableBroadcaster {
    events: Mutex<Vec<Event>>,
    relay: Option<SharedBroadcaster>,
}

impl QueryableBroadcaster {
    /// A recording stage with nothing after it.
    pub fn new() -> Self {
        Self::default()
    }

    /// A recording stage that relays to `relay` after recording.
    pub fn relaying(relay: SharedBroadcaster) -> Self {
        Self {
            events: Mutex::new(Vec::new()),
            relay: Some(relay),
        }
    }

    /// Every recorded event.
    pub fn all(&self) -> Vec<Event> {
        self.events.lock().clone()
    }

    /// Units of every recorded creation event.
    pub fn created(&self) -> Vec<SyntaxRef> {
        self.events
            .lock()
            .iter()
            .filter(|e| e.kind() == EventKind::Created)
            .map(|e| Arc::clone(e.unit()))
            .collect()
    }

    /// Number of recorded creation events.
    pub fn created_count(&self) -> usize {
        self.events
            .lock()
            .iter()
            .filter(|e| e.kind() == EventKind::Created)
            .count()
    }

    /// Every created unit of type `T`, in broadcast order.
    pub fn find<T: Syntax>(&self) -> Vec<Arc<T>> {
        self.created().iter().filter_map(downcast::<T>).collect()
    }

    /// The created unit of type `T`, if exactly one was broadcast.
    pub fn find_only<T: Syntax>(&self) -> Option<Arc<T>> {
        let mut found = self.find::<T>();
        if found.len() == 1 { found.pop() } else { None }
    }

    /// Forget everything recorded so far.
    pub fn clear(&self) {
        self.events.lock().clear();
    }
}

impl Broadcaster for QueryableBroadcaster {
    fn broadcast(&self, event: Event) {
        self.events.lock().push(event.clone());
        if let Some(relay) = &self.relay {
            relay.broadcast(event);
        }
    }
}
