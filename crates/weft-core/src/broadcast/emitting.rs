//! Terminal broadcaster that dispatches to plugin subscriptions.

use std::sync::{Arc, Weak};

use super::{Broadcaster, Event, SharedBroadcaster};
use crate::emitter::Emitter;

/// Hands every event to an [`Emitter`], then forwards it to `next`.
///
/// Forwarding lets outer layers (a visiting or queryable broadcaster)
/// observe every event after dispatch.
pub struct EmittingBroadcaster {
    emitter: Arc<Emitter>,
    next: Option<SharedBroadcaster>,
    this: Weak<EmittingBroadcaster>,
}

impl EmittingBroadcaster {
    /// Create a terminal stage with nothing after it.
    pub fn new(emitter: Arc<Emitter>) -> Arc<Self> {
        Self::build(emitter, None)
    }

    /// Create a terminal stage that forwards to `next` after dispatching.
    pub fn with_next(emitter: Arc<Emitter>, next: SharedBroadcaster) -> Arc<Self> {
        Self::build(emitter, Some(next))
    }

    fn build(emitter: Arc<Emitter>, next: Option<SharedBroadcaster>) -> Arc<Self> {
        Arc::new_cyclic(|this| Self {
            emitter,
            next,
            this: this.clone(),
        })
    }

    /// The emitter this stage dispatches to.
    pub fn emitter(&self) -> &Arc<Emitter> {
        &self.emitter
    }
}

impl Broadcaster for EmittingBroadcaster {
    fn broadcast(&self, event: Event) {
        // Units broadcast directly to this stage (without a back-reference)
        // hand their children back here.
        if let Some(this) = self.this.upgrade() {
            let fallback: SharedBroadcaster = this;
            self.emitter.emit(&event, &fallback);
        }
        if let Some(next) = &self.next {
            next.broadcast(event);
        }
    }
}
