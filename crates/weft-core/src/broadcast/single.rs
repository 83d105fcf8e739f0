//! Broadcaster that captures a single unit of a requested type.

use std::sync::Arc;

use parking_lot::Mutex;

use super::{Broadcaster, Event, EventKind};
use crate::syntax::{downcast, Syntax};

/// Accepts the first created unit of type `T` and drops everything else.
///
/// Used by sub-parses that must hand exactly one structured value back to
/// their caller without leaking their other broadcasts into the main
/// stream. Every unit seen here is reset to its unbroadcasted state so it
/// can still be announced properly once it joins a real tree.
pub struct SingleInterestBroadcaster<T: Syntax> {
    captured: Mutex<Option<Arc<T>>>,
}

impl<T: Syntax> SingleInterestBroadcaster<T> {
    /// Create an empty capture.
    pub fn new() -> Self {
        Self {
            captured: Mutex::new(None),
        }
    }

    /// The captured unit, if one was broadcast.
    pub fn broadcasted(&self) -> Option<Arc<T>> {
        self.captured.lock().clone()
    }
}

impl<T: Syntax> Default for SingleInterestBroadcaster<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Syntax> Broadcaster for SingleInterestBroadcaster<T> {
    fn broadcast(&self, event: Event) {
        event.unit().meta().reset_broadcast();
        if event.kind() != EventKind::Created {
            return;
        }
        let mut captured = self.captured.lock();
        if captured.is_none() {
            *captured = downcast::<T>(event.unit());
        }
    }
}
