//! The syntax unit contract shared by every node in a weft tree.
//!
//! Every node (selectors, declarations, at-rules, and any custom node a
//! plugin defines) implements [`Syntax`]. The trait carries:
//!
//! - identity: a process-unique [`UnitId`] and a [`SourcePosition`]
//! - broadcast [`Status`], so a unit is announced at most once per creation
//! - non-owning back-references to the broadcaster that delivered it and to
//!   the refiner that can expand it
//! - a set of [`Capability`] tags that subscriptions can match against
//!
//! Concrete node types hold a [`SyntaxMeta`] and use [`impl_syntax_basics!`]
//! for the type-erasure plumbing.
//!
//! # Related Modules
//!
//! - [`crate::broadcast`] - How units are announced
//! - [`crate::refine`] - How raw units are expanded
//! - [`crate::collection`] - Ordered sibling storage

use std::any::{Any, TypeId};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::{Mutex, RwLock};

use crate::broadcast::{Broadcaster, SharedBroadcaster};
use crate::collection::Groupable;
use crate::refine::{MasterRefiner, Refinable};

/// Shared, type-erased handle to a syntax unit.
pub type SyntaxRef = Arc<dyn Syntax>;

/// A process-unique identifier for a syntax unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct UnitId(u64);

impl UnitId {
    fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }

    /// Convert the id to a raw u64 value.
    #[inline]
    pub fn as_raw(self) -> u64 {
        self.0
    }
}

impl fmt::Display for UnitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Where a unit came from in the source text.
///
/// Lines and columns are 1-indexed. Units created by plugin code carry
/// [`SourcePosition::SYNTHETIC`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SourcePosition {
    line: u32,
    column: u32,
}

impl SourcePosition {
    /// Sentinel position for dynamically created units.
    pub const SYNTHETIC: Self = Self { line: 0, column: 0 };

    /// Create a position from a 1-indexed line and column.
    pub fn new(line: u32, column: u32) -> Self {
        Self { line, column }
    }

    /// The 1-indexed line, or 0 for synthetic units.
    pub fn line(&self) -> u32 {
        self.line
    }

    /// The 1-indexed column, or 0 for synthetic units.
    pub fn column(&self) -> u32 {
        self.column
    }

    /// Whether this is the synthetic sentinel.
    pub fn is_synthetic(&self) -> bool {
        *self == Self::SYNTHETIC
    }
}

impl fmt::Display for SourcePosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_synthetic() {
            write!(f, "(synthetic)")
        } else {
            write!(f, "line {}, column {}", self.line, self.column)
        }
    }
}

/// Broadcast progress of a single unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Status {
    /// Not yet announced to any broadcaster.
    Unbroadcasted,
    /// Handed to a broadcaster, waiting for dispatch.
    Queued,
    /// Currently being dispatched to subscribers.
    Processing,
    /// Dispatch completed.
    Broadcasted,
}

/// A capability tag that subscriptions can declare interest in.
///
/// The core defines the three capabilities every node layer needs. Node
/// crates define their own with [`Capability::new`] (for example a
/// "statement" or "term" supertype).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Capability(&'static str);

impl Capability {
    /// The unit can be serialized by a writer.
    pub const WRITABLE: Self = Self("writable");
    /// The unit can hold raw content that is expanded on demand.
    pub const REFINABLE: Self = Self("refinable");
    /// The unit lives inside a [`SyntaxCollection`](crate::SyntaxCollection).
    pub const GROUPABLE: Self = Self("groupable");

    /// Define a new capability tag.
    pub const fn new(name: &'static str) -> Self {
        Self(name)
    }

    /// The capability name.
    pub fn name(&self) -> &'static str {
        self.0
    }
}

/// Identity and bookkeeping shared by all syntax units.
pub struct SyntaxMeta {
    id: UnitId,
    position: SourcePosition,
    status: Mutex<Status>,
    comments: RwLock<Vec<String>>,
    broadcaster: RwLock<Option<Weak<dyn Broadcaster>>>,
    refiner: RwLock<Option<Weak<MasterRefiner>>>,
}

impl SyntaxMeta {
    /// Metadata for a unit parsed at the given position.
    pub fn new(position: SourcePosition) -> Self {
        Self {
            id: UnitId::next(),
            position,
            status: Mutex::new(Status::Unbroadcasted),
            comments: RwLock::new(Vec::new()),
            broadcaster: RwLock::new(None),
            refiner: RwLock::new(None),
        }
    }

    /// Metadata for a unit created by plugin code.
    pub fn synthetic() -> Self {
        Self::new(SourcePosition::SYNTHETIC)
    }

    /// The unit's unique id.
    pub fn id(&self) -> UnitId {
        self.id
    }

    /// The unit's source position.
    pub fn position(&self) -> SourcePosition {
        self.position
    }

    /// The unit's broadcast status.
    pub fn status(&self) -> Status {
        *self.status.lock()
    }

    /// Overwrite the broadcast status.
    pub fn set_status(&self, status: Status) {
        *self.status.lock() = status;
    }

    /// Move from `from` to `to`, returning `false` if the unit was not in `from`.
    pub fn transition(&self, from: Status, to: Status) -> bool {
        let mut status = self.status.lock();
        if *status == from {
            *status = to;
            true
        } else {
            false
        }
    }

    /// Comments attached to the unit.
    pub fn comments(&self) -> Vec<String> {
        self.comments.read().clone()
    }

    /// Attach a comment.
    pub fn add_comment(&self, comment: impl Into<String>) {
        self.comments.write().push(comment.into());
    }

    /// Replace all comments.
    pub fn set_comments(&self, comments: Vec<String>) {
        *self.comments.write() = comments;
    }

    /// Remember the broadcaster that announced this unit.
    pub fn attach_broadcaster(&self, broadcaster: &SharedBroadcaster) {
        *self.broadcaster.write() = Some(Arc::downgrade(broadcaster));
    }

    /// The broadcaster that announced this unit, if it is still alive.
    pub fn broadcaster(&self) -> Option<SharedBroadcaster> {
        self.broadcaster.read().as_ref().and_then(Weak::upgrade)
    }

    /// Return the unit to its never-broadcast state.
    pub fn reset_broadcast(&self) {
        *self.broadcaster.write() = None;
        self.set_status(Status::Unbroadcasted);
    }

    /// Remember the refiner able to expand this unit.
    pub fn attach_refiner(&self, refiner: Weak<MasterRefiner>) {
        *self.refiner.write() = Some(refiner);
    }

    /// The refiner able to expand this unit, if any.
    pub fn refiner(&self) -> Option<Arc<MasterRefiner>> {
        self.refiner.read().as_ref().and_then(Weak::upgrade)
    }
}

impl fmt::Debug for SyntaxMeta {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SyntaxMeta")
            .field("id", &self.id)
            .field("position", &self.position)
            .field("status", &self.status())
            .finish()
    }
}

/// The base contract for every node in a syntax tree.
pub trait Syntax: Any + Send + Sync + fmt::Debug {
    /// Shared identity and bookkeeping.
    fn meta(&self) -> &SyntaxMeta;

    /// A short human-readable node kind, e.g. `"declaration"`.
    fn kind(&self) -> &'static str;

    /// Capability tags advertised by this node type.
    fn capabilities(&self) -> &'static [Capability] {
        &[]
    }

    /// Whether this unit advertises `capability`.
    fn has_capability(&self, capability: Capability) -> bool {
        self.capabilities().contains(&capability)
    }

    /// Upcast to `Any` for downcasting by reference.
    fn as_any(&self) -> &dyn Any;

    /// Upcast to `Any` for downcasting by `Arc`.
    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync>;

    /// Erase the concrete type.
    fn into_syntax(self: Arc<Self>) -> SyntaxRef;

    /// The refinable view of this unit, if it supports lazy expansion.
    fn as_refinable(&self) -> Option<&dyn Refinable> {
        None
    }

    /// The groupable view of this unit, if it lives in a collection.
    fn as_groupable(&self) -> Option<&dyn Groupable> {
        None
    }

    /// Direct children, in document order.
    fn children(&self) -> Vec<SyntaxRef> {
        Vec::new()
    }

    /// The unit this one hangs off: the parent of its collection, or the
    /// unit holding it in a dedicated slot.
    fn owner(&self) -> Option<SyntaxRef> {
        self.as_groupable().and_then(|groupable| groupable.parent())
    }

    /// Whether the unit is still held where it was placed. Destroyed and
    /// replaced units are not.
    fn is_attached(&self) -> bool {
        self.as_groupable()
            .is_none_or(|groupable| !groupable.is_destroyed() && groupable.group().is_some())
    }

    /// Broadcast this unit's children (and associate its collections with
    /// `broadcaster`). Called after the unit itself was broadcast.
    fn propagate_broadcast(&self, broadcaster: &SharedBroadcaster) {
        let _ = broadcaster;
    }
}

impl dyn Syntax {
    /// The concrete type id of the unit.
    pub fn unit_type_id(&self) -> TypeId {
        Any::type_id(self.as_any())
    }

    /// Whether the unit is a `T`.
    pub fn is<T: Syntax>(&self) -> bool {
        self.as_any().is::<T>()
    }

    /// Borrow the unit as a `T`.
    pub fn downcast_ref<T: Syntax>(&self) -> Option<&T> {
        self.as_any().downcast_ref::<T>()
    }

    /// Whether the unit and all of its owners are still attached, i.e. the
    /// unit is part of the tree rooted at its topmost owner.
    pub fn is_settled(&self) -> bool {
        if !self.is_attached() {
            return false;
        }
        let mut owner = self.owner();
        while let Some(unit) = owner {
            if !unit.is_attached() {
                return false;
            }
            owner = unit.owner();
        }
        true
    }

    /// Whether the unit's refinable view reports it as already refined.
    pub fn is_refined(&self) -> bool {
        self.as_refinable().is_none_or(|r| r.refine_state().is_refined())
    }
}

/// Downcast a shared unit to its concrete type.
pub fn downcast<T: Syntax>(unit: &SyntaxRef) -> Option<Arc<T>> {
    Arc::clone(unit).into_any().downcast::<T>().ok()
}

/// Implements the type-erasure methods of [`Syntax`] for a struct with a
/// `meta: SyntaxMeta` field.
///
/// ```ignore
/// impl Syntax for Comment {
///     weft_core::impl_syntax_basics!();
///     fn kind(&self) -> &'static str { "comment" }
/// }
/// ```
#[macro_export]
macro_rules! impl_syntax_basics {
    () => {
        fn meta(&self) -> &$crate::syntax::SyntaxMeta {
            &self.meta
        }

        fn as_any(&self) -> &dyn ::std::any::Any {
            self
        }

        fn into_any(
            self: ::std::sync::Arc<Self>,
        ) -> ::std::sync::Arc<dyn ::std::any::Any + Send + Sync> {
            self
        }

        fn into_syntax(self: ::std::sync::Arc<Self>) -> $crate::syntax::SyntaxRef {
            self
        }
    };
}

static_assertions::assert_impl_all!(SyntaxMeta: Send, Sync);

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug)]
    struct Marker {
        meta: SyntaxMeta,
    }

    impl Syntax for Marker {
        crate::impl_syntax_basics!();

        fn kind(&self) -> &'static str {
            "marker"
        }

        fn capabilities(&self) -> &'static [Capability] {
            &[Capability::WRITABLE]
        }
    }

    #[test]
    fn unit_ids_are_unique() {
        let a = SyntaxMeta::synthetic();
        let b = SyntaxMeta::synthetic();
        assert_ne!(a.id(), b.id());
    }

    #[test]
    fn synthetic_position_display() {
        assert_eq!(SourcePosition::SYNTHETIC.to_string(), "(synthetic)");
        assert_eq!(SourcePosition::new(3, 7).to_string(), "line 3, column 7");
    }

    #[test]
    fn status_transition_only_from_expected_state() {
        let meta = SyntaxMeta::synthetic();
        assert!(meta.transition(Status::Unbroadcasted, Status::Queued));
        assert!(!meta.transition(Status::Unbroadcasted, Status::Queued));
        assert_eq!(meta.status(), Status::Queued);
    }

    #[test]
    fn downcast_and_capabilities() {
        let unit: SyntaxRef = Arc::new(Marker {
            meta: SyntaxMeta::new(SourcePosition::new(1, 1)),
        });
        assert!(unit.is::<Marker>());
        assert!(unit.has_capability(Capability::WRITABLE));
        assert!(!unit.has_capability(Capability::GROUPABLE));
        assert!(downcast::<Marker>(&unit).is_some());
        assert!(unit.is_refined());
    }
}
