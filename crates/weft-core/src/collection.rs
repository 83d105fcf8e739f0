//! Ordered sibling storage.
//!
//! A [`SyntaxCollection`] holds the children of one parent in document order.
//! Plugins routinely insert siblings while the collection is being walked,
//! so iteration is cursor based rather than snapshot based: each step looks
//! up where the previously yielded member sits *now* and moves one past it.
//! Members appended ahead of the cursor are therefore visited in the same
//! pass, members inserted behind it are not visited twice, and a removed
//! member does not make the cursor skip its successor.
//!
//! When a collection is associated with a broadcaster, every inserted unit
//! is announced (with its subtree) through it.
//!
//! Members that implement [`Groupable`] keep a weak link back to their
//! collection, which gives them `parent()`, `destroy()` and sibling
//! navigation without owning anything.

use std::any::Any;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::RwLock;

use crate::broadcast::{broadcast_unit, Broadcaster, SharedBroadcaster};
use crate::error::{Error, Result};
use crate::syntax::{Syntax, SyntaxRef, UnitId};

/// Type-erased view of a [`SyntaxCollection`], as seen from its members.
pub trait Group: Send + Sync {
    /// The unit owning this collection, if it is still alive.
    fn parent(&self) -> Option<SyntaxRef>;

    /// Number of members.
    fn len(&self) -> usize;

    /// Whether the collection is empty.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Position of the member with `id`.
    fn index_of(&self, id: UnitId) -> Option<usize>;

    /// Remove the member with `id`, returning it.
    fn remove_id(&self, id: UnitId) -> Option<SyntaxRef>;

    /// Upcast for downcasting to the concrete collection type.
    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync>;
}

/// The back-link a groupable unit keeps to its collection.
#[derive(Default)]
pub struct GroupLink {
    group: RwLock<Option<Weak<dyn Group>>>,
    destroyed: AtomicBool,
}

impl GroupLink {
    /// A link for a unit that is not in any collection yet.
    pub fn new() -> Self {
        Self::default()
    }

    /// The collection the unit belongs to, if any.
    pub fn group(&self) -> Option<Arc<dyn Group>> {
        self.group.read().as_ref().and_then(Weak::upgrade)
    }

    fn attach(&self, group: Weak<dyn Group>) {
        *self.group.write() = Some(group);
        self.destroyed.store(false, Ordering::Release);
    }

    fn detach(&self) {
        *self.group.write() = None;
    }

    /// Whether the unit was removed through [`Groupable::destroy`].
    pub fn is_destroyed(&self) -> bool {
        self.destroyed.load(Ordering::Acquire)
    }
}

impl fmt::Debug for GroupLink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GroupLink")
            .field("attached", &self.group().is_some())
            .field("destroyed", &self.is_destroyed())
            .finish()
    }
}

/// A unit that lives inside a [`SyntaxCollection`].
pub trait Groupable: Syntax {
    /// The unit's back-link.
    fn group_link(&self) -> &GroupLink;

    /// The collection holding this unit.
    fn group(&self) -> Option<Arc<dyn Group>> {
        self.group_link().group()
    }

    /// The unit owning the collection holding this unit.
    fn parent(&self) -> Option<SyntaxRef> {
        self.group().and_then(|group| group.parent())
    }

    /// Position among its siblings.
    fn index(&self) -> Option<usize> {
        self.group().and_then(|group| group.index_of(self.meta().id()))
    }

    /// Whether this is the first sibling.
    fn is_first(&self) -> bool {
        self.index() == Some(0)
    }

    /// Whether this is the last sibling.
    fn is_last(&self) -> bool {
        match self.group() {
            Some(group) => group
                .index_of(self.meta().id())
                .is_some_and(|index| index + 1 == group.len()),
            None => false,
        }
    }

    /// Remove the unit from its collection.
    ///
    /// Returns `false` if the unit was not in a collection.
    fn destroy(&self) -> bool {
        let link = self.group_link();
        let removed = link
            .group()
            .and_then(|group| group.remove_id(self.meta().id()))
            .is_some();
        link.detach();
        link.destroyed.store(true, Ordering::Release);
        removed
    }

    /// Whether [`destroy`](Groupable::destroy) was called since the unit was
    /// last inserted.
    fn is_destroyed(&self) -> bool {
        self.group_link().is_destroyed()
    }
}

/// The typed collection holding `unit`, if it is a `SyntaxCollection<T>`.
pub fn group_of<T: ?Sized + Syntax>(unit: &dyn Groupable) -> Option<Arc<SyntaxCollection<T>>> {
    unit.group()?.into_any().downcast::<SyntaxCollection<T>>().ok()
}

/// Ordered, mutable storage for sibling units.
pub struct SyntaxCollection<T: ?Sized + Syntax> {
    members: RwLock<Vec<Arc<T>>>,
    parent: Option<Weak<dyn Syntax>>,
    broadcaster: RwLock<Option<Weak<dyn Broadcaster>>>,
    this: Weak<SyntaxCollection<T>>,
}

impl<T: ?Sized + Syntax> SyntaxCollection<T> {
    /// An empty collection owned by `parent`.
    pub fn new(parent: Weak<dyn Syntax>) -> Arc<Self> {
        Self::build(Some(parent))
    }

    /// An empty collection with no owner.
    pub fn detached() -> Arc<Self> {
        Self::build(None)
    }

    fn build(parent: Option<Weak<dyn Syntax>>) -> Arc<Self> {
        Arc::new_cyclic(|this| Self {
            members: RwLock::new(Vec::new()),
            parent,
            broadcaster: RwLock::new(None),
            this: this.clone(),
        })
    }

    /// Number of members.
    pub fn len(&self) -> usize {
        self.members.read().len()
    }

    /// Whether there are no members.
    pub fn is_empty(&self) -> bool {
        self.members.read().is_empty()
    }

    /// The first member.
    pub fn first(&self) -> Option<Arc<T>> {
        self.members.read().first().cloned()
    }

    /// The last member.
    pub fn last(&self) -> Option<Arc<T>> {
        self.members.read().last().cloned()
    }

    /// The member at `index`.
    pub fn get(&self, index: usize) -> Option<Arc<T>> {
        self.members.read().get(index).cloned()
    }

    /// A snapshot of the current members.
    pub fn to_vec(&self) -> Vec<Arc<T>> {
        self.members.read().clone()
    }

    /// The current members as type-erased units.
    pub fn units(&self) -> Vec<SyntaxRef> {
        self.to_vec().into_iter().map(|m| m.into_syntax()).collect()
    }

    /// Position of the member with `id`.
    pub fn position(&self, id: UnitId) -> Option<usize> {
        self.members.read().iter().position(|m| m.meta().id() == id)
    }

    /// The member following `unit`.
    pub fn next(&self, unit: &T) -> Option<Arc<T>> {
        let members = self.members.read();
        let index = members.iter().position(|m| m.meta().id() == unit.meta().id())?;
        members.get(index + 1).cloned()
    }

    /// The member preceding `unit`.
    pub fn previous(&self, unit: &T) -> Option<Arc<T>> {
        let members = self.members.read();
        let index = members.iter().position(|m| m.meta().id() == unit.meta().id())?;
        index.checked_sub(1).and_then(|i| members.get(i).cloned())
    }

    /// A live cursor over the members.
    pub fn iter(&self) -> Iter<'_, T> {
        Iter {
            collection: self,
            last: None,
            position: 0,
        }
    }

    /// Add `unit` at the end.
    pub fn append(&self, unit: Arc<T>) {
        self.insert_with(unit, |members| members.len());
    }

    /// Add `unit` at the front.
    pub fn prepend(&self, unit: Arc<T>) {
        self.insert_with(unit, |_| 0);
    }

    /// Append every unit, in order.
    pub fn append_all(&self, units: impl IntoIterator<Item = Arc<T>>) {
        for unit in units {
            self.append(unit);
        }
    }

    /// Insert `unit` immediately before `anchor`.
    pub fn insert_before(&self, anchor: &T, unit: Arc<T>) -> Result<()> {
        let anchor_id = anchor.meta().id();
        self.insert_relative(anchor_id, unit, 0, "insert before")
    }

    /// Insert `unit` immediately after `anchor`.
    pub fn insert_after(&self, anchor: &T, unit: Arc<T>) -> Result<()> {
        let anchor_id = anchor.meta().id();
        self.insert_relative(anchor_id, unit, 1, "insert after")
    }

    /// Put `replacement` where `existing` is and remove `existing`.
    pub fn replace(&self, existing: &T, replacement: Arc<T>) -> Result<()> {
        let id = existing.meta().id();
        self.insert_relative(id, replacement, 0, "replace")?;
        self.remove_id(id);
        Self::mark_removed(existing);
        Ok(())
    }

    /// Remove `unit`. Returns `false` if it was not a member.
    pub fn remove(&self, unit: &T) -> bool {
        let removed = self.remove_id(unit.meta().id()).is_some();
        if removed {
            Self::mark_removed(unit);
        }
        removed
    }

    /// Remove every member.
    pub fn clear(&self) {
        let drained = std::mem::take(&mut *self.members.write());
        for member in &drained {
            Self::mark_removed(member.as_ref());
        }
    }

    /// The broadcaster announcing insertions, if one is associated.
    pub fn broadcaster(&self) -> Option<SharedBroadcaster> {
        self.broadcaster.read().as_ref().and_then(Weak::upgrade)
    }

    /// Associate a broadcaster without announcing current members.
    pub fn set_broadcaster(&self, broadcaster: &SharedBroadcaster) {
        *self.broadcaster.write() = Some(Arc::downgrade(broadcaster));
    }

    /// Associate `broadcaster` and announce every member (and its subtree)
    /// that has not been announced yet.
    ///
    /// Members inserted while this runs are announced by the insertion
    /// itself and are still visited by the walk, which never re-announces.
    pub fn propagate_broadcast(&self, broadcaster: &SharedBroadcaster) {
        self.set_broadcaster(broadcaster);
        for member in self.iter() {
            broadcast_unit(&member.into_syntax(), broadcaster);
        }
    }

    fn insert_relative(
        &self,
        anchor: UnitId,
        unit: Arc<T>,
        offset: usize,
        operation: &'static str,
    ) -> Result<()> {
        if self.position(anchor).is_none() {
            return Err(Error::Detached { operation });
        }
        let mut missing = false;
        self.insert_with(unit, |members| {
            match members.iter().position(|m| m.meta().id() == anchor) {
                Some(index) => index + offset,
                None => {
                    missing = true;
                    members.len()
                }
            }
        });
        if missing {
            tracing::warn!(
                target: "weft_core::collection",
                operation,
                "anchor vanished during insertion, appended instead"
            );
        }
        Ok(())
    }

    fn insert_with(&self, unit: Arc<T>, index: impl FnOnce(&[Arc<T>]) -> usize) {
        self.adopt(unit.as_ref());
        {
            let mut members = self.members.write();
            let at = index(members.as_slice()).min(members.len());
            members.insert(at, Arc::clone(&unit));
        }
        if let Some(broadcaster) = self.broadcaster() {
            broadcast_unit(&unit.into_syntax(), &broadcaster);
        }
    }

    /// Move `unit` out of any collection it currently belongs to and link
    /// it to this one.
    fn adopt(&self, unit: &T) {
        let Some(groupable) = unit.as_groupable() else {
            return;
        };
        let link = groupable.group_link();
        if let Some(previous) = link.group() {
            previous.remove_id(unit.meta().id());
        }
        let this: Weak<dyn Group> = self.this.clone();
        link.attach(this);
    }

    fn mark_removed(unit: &T) {
        if let Some(groupable) = unit.as_groupable() {
            groupable.group_link().detach();
        }
    }
}

impl<T: ?Sized + Syntax> Group for SyntaxCollection<T> {
    fn parent(&self) -> Option<SyntaxRef> {
        self.parent.as_ref().and_then(Weak::upgrade)
    }

    fn len(&self) -> usize {
        SyntaxCollection::len(self)
    }

    fn index_of(&self, id: UnitId) -> Option<usize> {
        self.position(id)
    }

    fn remove_id(&self, id: UnitId) -> Option<SyntaxRef> {
        let mut members = self.members.write();
        let index = members.iter().position(|m| m.meta().id() == id)?;
        Some(members.remove(index).into_syntax())
    }

    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }
}

impl<T: ?Sized + Syntax> fmt::Debug for SyntaxCollection<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.members.read().iter()).finish()
    }
}

/// Cursor over a [`SyntaxCollection`] that tolerates mutation.
pub struct Iter<'a, T: ?Sized + Syntax> {
    collection: &'a SyntaxCollection<T>,
    last: Option<UnitId>,
    position: usize,
}

impl<T: ?Sized + Syntax> Iterator for Iter<'_, T> {
    type Item = Arc<T>;

    fn next(&mut self) -> Option<Arc<T>> {
        let members = self.collection.members.read();
        let start = match self.last {
            None => 0,
            Some(last) => members
                .iter()
                .position(|m| m.meta().id() == last)
                .map_or(self.position, |index| index + 1),
        };
        let item = members.get(start).cloned()?;
        self.position = start;
        self.last = Some(item.meta().id());
        Some(item)
    }
}

impl<'a, T: ?Sized + Syntax> IntoIterator for &'a SyntaxCollection<T> {
    type Item = Arc<T>;
    type IntoIter = Iter<'a, T>;

    fn into_iter(self) -> Iter<'a, T> {
        self.iter()
    }
}
