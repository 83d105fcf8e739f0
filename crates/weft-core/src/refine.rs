//! On-demand refinement of raw syntax.
//!
//! A unit with deferred structure (a selector string, a declaration value,
//! an at-rule expression or block) starts out holding its unparsed
//! [`RawSpan`]. The first time something needs its structured form, the
//! [`MasterRefiner`] runs the refiners registered for the unit's concrete
//! type, in registration order:
//!
//! - [`Refinement::Full`] - the unit is completely expanded; stop
//! - [`Refinement::Partial`] - part of the unit was expanded; keep trying
//! - [`Refinement::None`] - this refiner does not apply; try the next one
//!
//! Refinement runs at most once per unit. The outcome (including a failure)
//! is memoized in the unit's [`RefineState`] and returned to every later
//! caller without invoking any refiner again.

use std::any::{Any, TypeId};
use std::fmt;
use std::sync::{Arc, Weak};

use parking_lot::{Mutex, RwLock};

use crate::broadcast::{broadcast_unit, SharedBroadcaster};
use crate::error::Result;
use crate::subscription::Interest;
use crate::syntax::{SourcePosition, Syntax, SyntaxRef};

/// Outcome of running refiners over a unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Refinement {
    /// The unit is fully expanded; its raw form is no longer used.
    Full,
    /// Only part of the unit was expanded.
    Partial,
    /// Nothing was expanded.
    None,
}

impl Refinement {
    /// Whether any part of the unit was expanded.
    pub fn is_refined(&self) -> bool {
        !matches!(self, Self::None)
    }
}

/// The original unparsed text of a unit, with where it started.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawSpan {
    text: String,
    position: SourcePosition,
}

impl RawSpan {
    /// Create a raw span.
    pub fn new(text: impl Into<String>, position: SourcePosition) -> Self {
        Self {
            text: text.into(),
            position,
        }
    }

    /// The raw text exactly as read.
    pub fn text(&self) -> &str {
        &self.text
    }

    /// The raw text without surrounding whitespace.
    pub fn trimmed(&self) -> &str {
        self.text.trim()
    }

    /// Where the span started.
    pub fn position(&self) -> SourcePosition {
        self.position
    }
}

/// Raw or refined content of a unit.
#[derive(Debug, Clone)]
pub enum Content<R> {
    /// Unparsed source text.
    Raw(RawSpan),
    /// Structured form.
    Refined(R),
}

impl<R> Content<R> {
    /// Whether the content is still raw.
    pub fn is_raw(&self) -> bool {
        matches!(self, Self::Raw(_))
    }

    /// The raw span, if still raw.
    pub fn raw(&self) -> Option<&RawSpan> {
        match self {
            Self::Raw(raw) => Some(raw),
            Self::Refined(_) => None,
        }
    }

    /// The structured form, if refined.
    pub fn refined(&self) -> Option<&R> {
        match self {
            Self::Raw(_) => None,
            Self::Refined(refined) => Some(refined),
        }
    }
}

#[derive(Debug, Clone)]
enum RefineStatus {
    Pending,
    InProgress,
    Done(Refinement),
    Failed(crate::Error),
}

/// Memo of a unit's refinement attempt.
pub struct RefineState {
    status: Mutex<RefineStatus>,
}

impl RefineState {
    /// State for a unit read from source: refinement has not been attempted.
    pub fn pending() -> Self {
        Self {
            status: Mutex::new(RefineStatus::Pending),
        }
    }

    /// State for a unit built programmatically: already fully refined.
    pub fn refined() -> Self {
        Self {
            status: Mutex::new(RefineStatus::Done(Refinement::Full)),
        }
    }

    /// Whether refinement succeeded for at least part of the unit.
    pub fn is_refined(&self) -> bool {
        matches!(&*self.status.lock(), RefineStatus::Done(r) if r.is_refined())
    }

    /// Whether refinement has been attempted (or is in progress).
    pub fn is_attempted(&self) -> bool {
        !matches!(&*self.status.lock(), RefineStatus::Pending)
    }

    /// The memoized outcome, if refinement has finished.
    pub fn outcome(&self) -> Option<Result<Refinement>> {
        match &*self.status.lock() {
            RefineStatus::Done(r) => Some(Ok(*r)),
            RefineStatus::Failed(err) => Some(Err(err.clone())),
            RefineStatus::Pending | RefineStatus::InProgress => None,
        }
    }

    /// Record `outcome` for a unit whose content was replaced by code, so
    /// refiners never run over it. Has no effect once refinement started.
    pub fn settle(&self, outcome: Refinement) {
        let mut status = self.status.lock();
        if matches!(&*status, RefineStatus::Pending) {
            *status = RefineStatus::Done(outcome);
        }
    }

    /// Claim the right to refine. Returns the memoized outcome if someone
    /// already did (a re-entrant request while in progress sees `None`).
    fn begin(&self) -> Option<Result<Refinement>> {
        let mut status = self.status.lock();
        match &*status {
            RefineStatus::Pending => {
                *status = RefineStatus::InProgress;
                None
            }
            RefineStatus::InProgress => Some(Ok(Refinement::None)),
            RefineStatus::Done(r) => Some(Ok(*r)),
            RefineStatus::Failed(err) => Some(Err(err.clone())),
        }
    }

    fn finish(&self, outcome: &Result<Refinement>) {
        *self.status.lock() = match outcome {
            Ok(r) => RefineStatus::Done(*r),
            Err(err) => RefineStatus::Failed(err.clone()),
        };
    }
}

impl Default for RefineState {
    fn default() -> Self {
        Self::pending()
    }
}

impl fmt::Debug for RefineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("RefineState").field(&*self.status.lock()).finish()
    }
}

/// A unit that can hold raw content and be expanded on demand.
pub trait Refinable: Syntax {
    /// The unit's refinement memo.
    fn refine_state(&self) -> &RefineState;

    /// Interests that only exist once this unit is refined.
    ///
    /// When any subscription targets one of these, the emitter refines the
    /// unit before notifying observers.
    fn refined_interests(&self) -> Vec<Interest>;
}

pub(crate) type RefineHandler =
    Arc<dyn Fn(&SyntaxRef, &RefineContext<'_>) -> Result<Refinement> + Send + Sync>;

/// A refiner registered through [`Subscriptions::refine`](crate::Subscriptions::refine).
pub(crate) struct RefinerEntry {
    pub(crate) plugin: &'static str,
    pub(crate) method: &'static str,
    pub(crate) target: TypeId,
    pub(crate) handler: RefineHandler,
}

/// What a refiner gets to work with.
pub struct RefineContext<'a> {
    broadcaster: Option<&'a SharedBroadcaster>,
    refiner: &'a MasterRefiner,
}

impl<'a> RefineContext<'a> {
    /// The broadcaster that delivered the unit being refined, if any.
    pub fn broadcaster(&self) -> Option<&'a SharedBroadcaster> {
        self.broadcaster
    }

    /// The refiner running this refinement.
    pub fn refiner(&self) -> &'a MasterRefiner {
        self.refiner
    }

    /// Announce a unit built by the refiner through the same broadcaster
    /// that delivered its parent.
    ///
    /// Without a broadcaster (the parent has not been announced yet) this
    /// only adopts the unit; it is announced later with its parent.
    pub fn broadcast(&self, unit: &SyntaxRef) {
        self.refiner.adopt(unit.as_ref());
        if let Some(broadcaster) = self.broadcaster {
            broadcast_unit(unit, broadcaster);
        }
    }

    /// Let `unit` be refined later by this refiner.
    pub fn adopt(&self, unit: &dyn Syntax) {
        self.refiner.adopt(unit);
    }
}

/// Runs the registered refiners over units, at most once per unit.
pub struct MasterRefiner {
    refiners: RwLock<Vec<Arc<RefinerEntry>>>,
    this: Weak<MasterRefiner>,
}

impl MasterRefiner {
    /// Create a refiner with nothing registered.
    pub fn new() -> Arc<Self> {
        Arc::new_cyclic(|this| Self {
            refiners: RwLock::new(Vec::new()),
            this: this.clone(),
        })
    }

    pub(crate) fn register(&self, entries: Vec<RefinerEntry>) {
        self.refiners.write().extend(entries.into_iter().map(Arc::new));
    }

    /// Number of registered refiners.
    pub fn refiner_count(&self) -> usize {
        self.refiners.read().len()
    }

    /// Whether any refiner targets `type_id`.
    pub fn has_refiner_for(&self, type_id: TypeId) -> bool {
        self.refiners.read().iter().any(|e| e.target == type_id)
    }

    /// Give `unit` a back-reference to this refiner so its own accessors can
    /// trigger refinement later.
    pub fn adopt(&self, unit: &dyn Syntax) {
        if unit.as_refinable().is_some() {
            unit.meta().attach_refiner(self.this.clone());
        }
    }

    /// Refine `unit`, or return the memoized outcome.
    ///
    /// Children built by refiners are announced through `broadcaster`, or
    /// through the unit's own broadcaster when none is given.
    #[tracing::instrument(
        skip_all,
        target = "weft_core::refine",
        level = "trace",
        fields(kind = unit.kind(), id = %unit.meta().id())
    )]
    pub fn refine(
        &self,
        unit: &SyntaxRef,
        broadcaster: Option<&SharedBroadcaster>,
    ) -> Result<Refinement> {
        let Some(refinable) = unit.as_refinable() else {
            return Ok(Refinement::None);
        };
        let state = refinable.refine_state();
        if let Some(memo) = state.begin() {
            return memo;
        }

        let target = Any::type_id(unit.as_any());
        let candidates: Vec<Arc<RefinerEntry>> = self
            .refiners
            .read()
            .iter()
            .filter(|entry| entry.target == target)
            .cloned()
            .collect();

        let owned = match broadcaster {
            Some(_) => None,
            None => unit.meta().broadcaster(),
        };
        let context = RefineContext {
            broadcaster: broadcaster.or(owned.as_ref()),
            refiner: self,
        };

        let mut outcome = Ok(Refinement::None);
        for entry in candidates {
            match (entry.handler)(unit, &context) {
                Ok(Refinement::Full) => {
                    outcome = Ok(Refinement::Full);
                    break;
                }
                Ok(Refinement::Partial) => outcome = Ok(Refinement::Partial),
                Ok(Refinement::None) => {}
                Err(err) => {
                    tracing::debug!(
                        target: "weft_core::refine",
                        plugin = entry.plugin,
                        method = entry.method,
                        error = %err,
                        "refinement failed"
                    );
                    outcome = Err(err);
                    break;
                }
            }
        }

        state.finish(&outcome);
        tracing::trace!(target: "weft_core::refine", outcome = ?outcome, "refinement finished");
        outcome
    }
}

impl fmt::Debug for MasterRefiner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MasterRefiner")
            .field("refiners", &self.refiner_count())
            .finish()
    }
}

/// Refine `unit` through the refiner it was adopted by.
///
/// Units without a refiner keep their raw form; this returns
/// [`Refinement::None`] for them without recording an attempt, so they can
/// still be refined once a refiner adopts them.
pub fn refine_unit(unit: &SyntaxRef) -> Result<Refinement> {
    if let Some(state) = unit.as_refinable().map(Refinable::refine_state)
        && let Some(memo) = state.outcome()
    {
        return memo;
    }
    match unit.meta().refiner() {
        Some(refiner) => refiner.refine(unit, None),
        None => Ok(Refinement::None),
    }
}
