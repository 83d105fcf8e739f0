//! Subscription dispatch.
//!
//! The [`Emitter`] sits at the end of the broadcaster chain (behind an
//! [`EmittingBroadcaster`](crate::EmittingBroadcaster)) and turns each
//! event into calls on the matching plugin subscriptions.
//!
//! For a created unit in the [`Phase::Process`] phase the order is:
//!
//! 1. refine, only when some subscription targets a type or capability that
//!    exists once the unit is refined
//! 2. observe
//! 3. rework, stopping early if a reworker destroyed the unit
//!
//! Validators run in [`Phase::Validate`], when the driver replays the
//! settled tree. Within a category subscriptions run in plugin
//! registration order.
//!
//! A failing or panicking handler is reported to the [`ErrorManager`] as a
//! plugin error and dispatch moves on, unless the manager rethrows, in
//! which case nothing more is dispatched.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};

use crate::broadcast::{Event, EventKind, SharedBroadcaster};
use crate::error::Error;
use crate::error_manager::{ErrorLevel, ErrorManager};
use crate::refine::MasterRefiner;
use crate::subscription::{Category, PluginContext, Subscription, Subscriptions};
use crate::syntax::{Status, Syntax, SyntaxRef};

/// Which subscriptions the emitter currently dispatches to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Phase {
    /// Refine, observe and rework newly created units.
    #[default]
    Process,
    /// Validate settled units.
    Validate,
}

/// Dispatch lists for one concrete unit type.
#[derive(Default)]
struct Resolved {
    refine: bool,
    observe: Vec<Subscription>,
    rework: Vec<Subscription>,
    validate: Vec<Subscription>,
    observe_changes: Vec<Subscription>,
    rework_changes: Vec<Subscription>,
}

/// Routes broadcast events to plugin subscriptions.
pub struct Emitter {
    subscriptions: RwLock<Vec<Subscription>>,
    cache: RwLock<HashMap<TypeId, Arc<Resolved>>>,
    phase: Mutex<Phase>,
    refiner: Arc<MasterRefiner>,
    errors: Arc<ErrorManager>,
}

impl Emitter {
    /// Create an emitter with no subscriptions.
    pub fn new(refiner: Arc<MasterRefiner>, errors: Arc<ErrorManager>) -> Self {
        Self {
            subscriptions: RwLock::new(Vec::new()),
            cache: RwLock::new(HashMap::new()),
            phase: Mutex::new(Phase::Process),
            refiner,
            errors,
        }
    }

    /// Add a plugin's subscriptions and refiners after those already
    /// attached.
    pub fn attach<P: Send + Sync + 'static>(&self, subscriptions: Subscriptions<P>) {
        let (entries, refiners) = subscriptions.into_parts();
        tracing::debug!(
            target: "weft_core::emitter",
            subscriptions = entries.len(),
            refiners = refiners.len(),
            "attaching subscriptions"
        );
        self.subscriptions.write().extend(entries);
        self.refiner.register(refiners);
        self.cache.write().clear();
    }

    /// Number of attached subscriptions (refiners excluded).
    pub fn subscription_count(&self) -> usize {
        self.subscriptions.read().len()
    }

    /// The current phase.
    pub fn phase(&self) -> Phase {
        *self.phase.lock()
    }

    /// Switch phase.
    pub fn set_phase(&self, phase: Phase) {
        tracing::debug!(target: "weft_core::emitter", ?phase, "switching phase");
        *self.phase.lock() = phase;
    }

    /// The refiner shared with subscriptions.
    pub fn refiner(&self) -> &Arc<MasterRefiner> {
        &self.refiner
    }

    /// The error sink.
    pub fn errors(&self) -> &Arc<ErrorManager> {
        &self.errors
    }

    /// Dispatch `event`.
    ///
    /// Handlers receive the broadcaster that announced the unit, or
    /// `fallback` for units that were handed to the chain directly.
    #[tracing::instrument(
        skip_all,
        target = "weft_core::emitter",
        level = "trace",
        fields(event = ?event.kind(), kind = event.unit().kind(), id = %event.unit().meta().id())
    )]
    pub fn emit(&self, event: &Event, fallback: &SharedBroadcaster) {
        if self.errors.is_aborted() {
            return;
        }
        let unit = event.unit();
        let owned = unit.meta().broadcaster();
        let cx = PluginContext {
            broadcaster: owned.as_ref().unwrap_or(fallback),
            errors: &self.errors,
            refiner: &self.refiner,
        };
        let resolved = self.resolve(unit.as_ref());

        match (event.kind(), self.phase()) {
            (EventKind::Created, Phase::Process) => self.process(unit, &resolved, &cx),
            (EventKind::Created, Phase::Validate) => {
                if !unit.is_settled() {
                    tracing::trace!(
                        target: "weft_core::emitter",
                        "unit left the tree, skipping validation"
                    );
                    return;
                }
                self.dispatch(unit, &resolved.validate, &cx, false);
            }
            (EventKind::Changed, Phase::Process) => {
                self.dispatch(unit, &resolved.observe_changes, &cx, false);
                self.dispatch(unit, &resolved.rework_changes, &cx, true);
            }
            (EventKind::Changed, Phase::Validate) => {}
        }
    }

    fn process(&self, unit: &SyntaxRef, resolved: &Resolved, cx: &PluginContext<'_>) {
        let meta = unit.meta();
        let claimed = meta.transition(Status::Queued, Status::Processing)
            || meta.transition(Status::Unbroadcasted, Status::Processing);
        if !claimed {
            tracing::trace!(
                target: "weft_core::emitter",
                status = ?meta.status(),
                "unit already dispatched"
            );
            return;
        }

        self.refiner.adopt(unit.as_ref());
        if resolved.refine
            && let Err(err) = self.refiner.refine(unit, Some(cx.broadcaster))
        {
            self.errors.report_error(ErrorLevel::Fatal, err);
        }

        self.dispatch(unit, &resolved.observe, cx, false);
        self.dispatch(unit, &resolved.rework, cx, true);
        meta.set_status(Status::Broadcasted);
    }

    fn dispatch(
        &self,
        unit: &SyntaxRef,
        subscriptions: &[Subscription],
        cx: &PluginContext<'_>,
        stop_when_destroyed: bool,
    ) {
        for subscription in subscriptions {
            if self.errors.is_aborted() {
                return;
            }
            if stop_when_destroyed && is_destroyed(unit.as_ref()) {
                tracing::trace!(target: "weft_core::emitter", "unit destroyed, skipping rework");
                return;
            }

            let outcome = panic::catch_unwind(AssertUnwindSafe(|| (subscription.handler)(unit, cx)));
            let cause = match outcome {
                Ok(Ok(())) => continue,
                Ok(Err(err)) => err.to_string(),
                Err(payload) => panic_message(payload.as_ref()),
            };
            let error = Error::plugin(subscription.plugin, subscription.method, cause);
            self.errors.report_error(ErrorLevel::Fatal, error);
        }
    }

    fn resolve(&self, unit: &dyn Syntax) -> Arc<Resolved> {
        let type_id = unit.unit_type_id();
        if let Some(resolved) = self.cache.read().get(&type_id) {
            return Arc::clone(resolved);
        }

        let refined_interests = unit
            .as_refinable()
            .map(|refinable| refinable.refined_interests())
            .unwrap_or_default();

        let mut resolved = Resolved::default();
        for subscription in self.subscriptions.read().iter() {
            if refined_interests.contains(&subscription.interest) {
                resolved.refine = true;
            }
            if !subscription.interest.matches(unit) {
                continue;
            }
            let list = match (subscription.event, subscription.category) {
                (EventKind::Created, Category::Observe) => &mut resolved.observe,
                (EventKind::Created, Category::Rework) => &mut resolved.rework,
                (EventKind::Created, Category::Validate) => &mut resolved.validate,
                (EventKind::Changed, Category::Observe) => &mut resolved.observe_changes,
                (EventKind::Changed, Category::Rework) => &mut resolved.rework_changes,
                (EventKind::Changed, Category::Validate) => continue,
            };
            list.push(subscription.clone());
        }

        tracing::trace!(
            target: "weft_core::emitter",
            kind = unit.kind(),
            refine = resolved.refine,
            observe = resolved.observe.len(),
            rework = resolved.rework.len(),
            validate = resolved.validate.len(),
            "resolved subscriptions"
        );
        let resolved = Arc::new(resolved);
        self.cache.write().insert(type_id, Arc::clone(&resolved));
        resolved
    }
}

fn is_destroyed(unit: &dyn Syntax) -> bool {
    unit.as_groupable().is_some_and(|g| g.is_destroyed())
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        format!("panicked: {message}")
    } else if let Some(message) = payload.downcast_ref::<String>() {
        format!("panicked: {message}")
    } else {
        "panicked".to_string()
    }
}

impl fmt::Debug for Emitter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Emitter")
            .field("subscriptions", &self.subscription_count())
            .field("phase", &self.phase())
            .finish()
    }
}

static_assertions::assert_impl_all!(Emitter: Send, Sync);
