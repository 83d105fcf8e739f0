//! Broadcaster that retains history and replays it on demand.

use parking_lot::Mutex;

use super::{Broadcaster, Event, EventKind, SharedBroadcaster};

/// Retains every event without forwarding it.
///
/// [`visit_created`](Self::visit_created) and
/// [`visit_changed`](Self::visit_changed) replay a snapshot of the history
/// through the relay. Events that arrive during a replay (because a
/// subscriber reacted by creating more units) are retained but not
/// replayed in the same pass.
pub struct VisitingBroadcaster {
    created: Mutex<Vec<Event>>,
    changed: Mutex<Vec<Event>>,
    relay: SharedBroadcaster,
}

impl VisitingBroadcaster {
    /// Create a visiting stage that replays into `relay`.
    pub fn new(relay: SharedBroadcaster) -> Self {
        Self {
            created: Mutex::new(Vec::new()),
            changed: Mutex::new(Vec::new()),
            relay,
        }
    }

    /// Replay every retained creation event.
    pub fn visit_created(&self) {
        let snapshot = self.created.lock().clone();
        tracing::debug!(target: "weft_core::broadcast", count = snapshot.len(), "replaying created events");
        for event in snapshot {
            self.relay.broadcast(event);
        }
    }

    /// Replay every retained change event.
    pub fn visit_changed(&self) {
        let snapshot = self.changed.lock().clone();
        tracing::debug!(target: "weft_core::broadcast", count = snapshot.len(), "replaying changed events");
        for event in snapshot {
            self.relay.broadcast(event);
        }
    }

    /// Number of retained creation events.
    pub fn created_len(&self) -> usize {
        self.created.lock().len()
    }

    /// Number of retained change events.
    pub fn changed_len(&self) -> usize {
        self.changed.lock().len()
    }
}

impl Broadcaster for VisitingBroadcaster {
    fn broadcast(&self, event: Event) {
        match event.kind() {
            EventKind::Created => self.created.lock().push(event),
            EventKind::Changed => self.changed.lock().push(event),
        }
    }
}
