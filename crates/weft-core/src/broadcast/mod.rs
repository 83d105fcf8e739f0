//! The broadcaster chain.
//!
//! Every "unit created" or "unit changed" notification flows through a
//! linear pipeline of [`Broadcaster`] decorators before it reaches plugin
//! subscriptions. Each variant wraps the next one:
//!
//! - [`EmittingBroadcaster`] - Terminal stage, hands events to the [`Emitter`](crate::Emitter)
//! - [`QueuingBroadcaster`] - FIFO queue that defers re-entrant broadcasts and supports pausing
//! - [`VisitingBroadcaster`] - Retains history and replays it on demand
//! - [`QueryableBroadcaster`] - Records everything for later inspection
//! - [`SingleInterestBroadcaster`] - Captures exactly one unit of a requested type
//!
//! A typical request chain is `Queuing -> Emitting -> Visiting`.
//!
//! # Example
//!
//! ```ignore
//! let queryable = Arc::new(QueryableBroadcaster::new());
//! let queuing: SharedBroadcaster = Arc::new(QueuingBroadcaster::new(queryable.clone()));
//! broadcast_unit(&unit, &queuing);
//! assert_eq!(queryable.created_count(), 1);
//! ```

mod emitting;
mod queryable;
mod queuing;
mod single;
mod visiting;

pub use emitting::EmittingBroadcaster;
pub use queryable::QueryableBroadcaster;
pub use queuing::{QueueState, QueuingBroadcaster};
pub use single::SingleInterestBroadcaster;
pub use visiting::VisitingBroadcaster;

use std::fmt;
use std::sync::Arc;

use crate::syntax::{Status, SyntaxRef};

/// What happened to the unit carried by an [`Event`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// The unit was created (parsed or synthesized).
    Created,
    /// The unit was mutated after its creation was broadcast.
    Changed,
}

/// A broadcast notification: an event kind paired with the unit it concerns.
#[derive(Clone)]
pub struct Event {
    kind: EventKind,
    unit: SyntaxRef,
}

impl Event {
    /// A creation event.
    pub fn created(unit: SyntaxRef) -> Self {
        Self {
            kind: EventKind::Created,
            unit,
        }
    }

    /// A change event.
    pub fn changed(unit: SyntaxRef) -> Self {
        Self {
            kind: EventKind::Changed,
            unit,
        }
    }

    /// The event kind.
    pub fn kind(&self) -> EventKind {
        self.kind
    }

    /// The unit this event concerns.
    pub fn unit(&self) -> &SyntaxRef {
        &self.unit
    }
}

impl fmt::Debug for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Event")
            .field("kind", &self.kind)
            .field("unit", &self.unit.kind())
            .field("id", &self.unit.meta().id())
            .finish()
    }
}

/// A stage in the broadcaster chain.
///
/// Implementations never fail for a well-formed event. Subscriber failures
/// are caught by the emitter and reported to the error manager.
pub trait Broadcaster: Send + Sync {
    /// Deliver `event` toward final dispatch.
    fn broadcast(&self, event: Event);
}

/// Shared handle to a broadcaster chain stage.
pub type SharedBroadcaster = Arc<dyn Broadcaster>;

/// Announce `unit` (if it has not been announced yet) and then its children.
///
/// The unit remembers `broadcaster` so it can announce children added later.
/// Units that were already broadcast are not announced again, but their
/// children are still visited so that late-added descendants are picked up.
pub fn broadcast_unit(unit: &SyntaxRef, broadcaster: &SharedBroadcaster) {
    let meta = unit.meta();
    if meta.transition(Status::Unbroadcasted, Status::Queued) {
        meta.attach_broadcaster(broadcaster);
        tracing::trace!(
            target: "weft_core::broadcast",
            kind = unit.kind(),
            id = %meta.id(),
            "broadcasting unit"
        );
        broadcaster.broadcast(Event::created(Arc::clone(unit)));
    }
    unit.propagate_broadcast(broadcaster);
}
