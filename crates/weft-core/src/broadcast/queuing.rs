//! FIFO broadcaster that defers re-entrant broadcasts.

use std::collections::VecDeque;

use parking_lot::Mutex;

use super::{Broadcaster, Event, SharedBroadcaster};

/// State of a [`QueuingBroadcaster`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueState {
    /// Idle; the next broadcast is forwarded immediately.
    Ready,
    /// Enqueue only; nothing is forwarded until [`QueuingBroadcaster::resume`].
    Paused,
    /// Currently forwarding queued events.
    Draining,
}

struct QueueInner {
    queue: VecDeque<Event>,
    state: QueueState,
    /// `pause()` was called mid-drain; becomes `Paused` once the queue empties.
    pause_requested: bool,
}

/// A broadcaster that always enqueues, and forwards in FIFO order.
///
/// A broadcast issued while this broadcaster is already forwarding (for
/// example by a reworker that creates a unit in response to another unit)
/// is enqueued rather than forwarded inline. It is delivered after the
/// event that caused it has been fully forwarded, which keeps synthesized
/// units in the same relative order as units read from the source.
pub struct QueuingBroadcaster {
    inner: Mutex<QueueInner>,
    relay: SharedBroadcaster,
}

impl QueuingBroadcaster {
    /// Create a queuing stage in front of `relay`.
    pub fn new(relay: SharedBroadcaster) -> Self {
        Self {
            inner: Mutex::new(QueueInner {
                queue: VecDeque::new(),
                state: QueueState::Ready,
                pause_requested: false,
            }),
            relay,
        }
    }

    /// Current state.
    pub fn state(&self) -> QueueState {
        self.inner.lock().state
    }

    /// Number of events waiting to be forwarded.
    pub fn pending(&self) -> usize {
        self.inner.lock().queue.len()
    }

    /// Stop forwarding; subsequent broadcasts are only enqueued.
    ///
    /// When called while draining, the pause takes effect once the current
    /// drain has emptied the queue.
    pub fn pause(&self) {
        let mut inner = self.inner.lock();
        match inner.state {
            QueueState::Draining => inner.pause_requested = true,
            _ => inner.state = QueueState::Paused,
        }
        tracing::trace!(target: "weft_core::broadcast", state = ?inner.state, "queue paused");
    }

    /// Forward everything queued so far, then return to [`QueueState::Ready`].
    ///
    /// Calling this while draining cancels a pending pause.
    pub fn resume(&self) {
        {
            let mut inner = self.inner.lock();
            match inner.state {
                QueueState::Paused => inner.state = QueueState::Draining,
                QueueState::Draining => {
                    inner.pause_requested = false;
                    return;
                }
                QueueState::Ready => return,
            }
        }
        tracing::trace!(target: "weft_core::broadcast", "queue resumed");
        self.drain();
    }

    fn drain(&self) {
        loop {
            // The lock must be released before forwarding: the relay may
            // broadcast back into this queue.
            let next = {
                let mut inner = self.inner.lock();
                match inner.queue.pop_front() {
                    Some(event) => event,
                    None => {
                        inner.state = if std::mem::take(&mut inner.pause_requested) {
                            QueueState::Paused
                        } else {
                            QueueState::Ready
                        };
                        return;
                    }
                }
            };
            self.relay.broadcast(next);
        }
    }
}

impl Broadcaster for QueuingBroadcaster {
    fn broadcast(&self, event: Event) {
        {
            let mut inner = self.inner.lock();
            inner.queue.push_back(event);
            if inner.state != QueueState::Ready {
                return;
            }
            inner.state = QueueState::Draining;
        }
        self.drain();
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::testing::{Probe, Recorder};

    #[test]
    fn forwards_immediately_when_ready() {
        let recorder = Arc::new(Recorder::default());
        let queue = QueuingBroadcaster::new(recorder.clone());

        queue.broadcast(Event::created(Probe::named("a")));

        assert_eq!(recorder.names(), vec!["a"]);
        assert_eq!(queue.state(), QueueState::Ready);
    }

    #[test]
    fn pause_resume_is_fifo() {
        let recorder = Arc::new(Recorder::default());
        let queue = QueuingBroadcaster::new(recorder.clone());

        queue.pause();
        for name in ["e1", "e2", "e3"] {
            queue.broadcast(Event::created(Probe::named(name)));
        }
        assert!(recorder.names().is_empty());
        assert_eq!(queue.pending(), 3);

        queue.resume();
        queue.broadcast(Event::created(Probe::named("e4")));

        assert_eq!(recorder.names(), vec!["e1", "e2", "e3", "e4"]);
        assert_eq!(queue.state(), QueueState::Ready);
    }

    #[test]
    fn reentrant_broadcast_is_deferred() {
        // A relay that broadcasts a follow-up event back into the queue the
        // first time it sees "parent".
        struct Echo {
            queue: parking_lot::Mutex<Option<Arc<QueuingBroadcaster>>>,
            recorder: Arc<Recorder>,
        }

        impl Broadcaster for Echo {
            fn broadcast(&self, event: Event) {
                let name = Probe::name_of(event.unit());
                self.recorder.broadcast(event);
                if name == "parent" {
                    let queue = self.queue.lock().clone();
                    if let Some(queue) = queue {
                        queue.broadcast(Event::created(Probe::named("child")));
                        // Not yet delivered: we are still forwarding "parent".
                        assert_eq!(self.recorder.names(), vec!["parent"]);
                    }
                }
            }
        }

        let recorder = Arc::new(Recorder::default());
        let echo = Arc::new(Echo {
            queue: parking_lot::Mutex::new(None),
            recorder: recorder.clone(),
        });
        let queue = Arc::new(QueuingBroadcaster::new(echo.clone()));
        *echo.queue.lock() = Some(queue.clone());

        queue.broadcast(Event::created(Probe::named("parent")));
        queue.broadcast(Event::created(Probe::named("sibling")));

        assert_eq!(recorder.names(), vec!["parent", "child", "sibling"]);
    }

    #[test]
    fn pause_while_draining_applies_after_drain() {
        struct Pauser {
            queue: parking_lot::Mutex<Option<Arc<QueuingBroadcaster>>>,
            recorder: Arc<Recorder>,
        }

        impl Broadcaster for Pauser {
            fn broadcast(&self, event: Event) {
                let name = Probe::name_of(event.unit());
                self.recorder.broadcast(event);
                if name == "first" {
                    let queue = self.queue.lock().clone();
                    if let Some(queue) = queue {
                        queue.broadcast(Event::created(Probe::named("second")));
                        queue.pause();
                        assert_eq!(queue.state(), QueueState::Draining);
                    }
                }
            }
        }

        let recorder = Arc::new(Recorder::default());
        let pauser = Arc::new(Pauser {
            queue: parking_lot::Mutex::new(None),
            recorder: recorder.clone(),
        });
        let queue = Arc::new(QueuingBroadcaster::new(pauser.clone()));
        *pauser.queue.lock() = Some(queue.clone());

        queue.broadcast(Event::created(Probe::named("first")));

        // The in-flight drain finished delivering "second" before pausing.
        assert_eq!(recorder.names(), vec!["first", "second"]);
        assert_eq!(queue.state(), QueueState::Paused);

        queue.broadcast(Event::created(Probe::named("third")));
        assert_eq!(recorder.names().len(), 2);

        queue.resume();
        assert_eq!(recorder.names(), vec!["first", "second", "third"]);
    }
}
