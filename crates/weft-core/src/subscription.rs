//! Explicit subscription tables.
//!
//! Plugins declare what they want to hear about in
//! [`Plugin::subscribe`](crate::Plugin::subscribe) by calling methods on a
//! [`Subscriptions`] builder. Each call records a category, an interest
//! (a concrete unit type or a [`Capability`]) and a handler closure. The
//! emitter turns the combined tables into per-type dispatch lists once and
//! caches them.
//!
//! ```ignore
//! impl Plugin for MarginTop {
//!     fn subscribe(&self, subs: &mut Subscriptions<Self>) {
//!         subs.rework(|plugin, declaration: &Arc<Declaration>, cx| {
//!             plugin.copy_margin(declaration, cx)
//!         });
//!     }
//! }
//! ```

use std::any::{type_name, type_name_of_val, TypeId};
use std::fmt;
use std::sync::Arc;

use crate::broadcast::{broadcast_unit, Event, EventKind, SharedBroadcaster};
use crate::error::Result;
use crate::error_manager::{ErrorLevel, ErrorManager};
use crate::refine::{MasterRefiner, RefineContext, RefineHandler, RefinerEntry, Refinement};
use crate::syntax::{downcast, Capability, Syntax, SyntaxRef};

/// When a subscription runs relative to the others for the same unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Category {
    /// Read-only notification.
    Observe,
    /// May mutate the tree and create units.
    Rework,
    /// Runs over settled units and reports findings.
    Validate,
}

/// What a subscription matches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Interest {
    /// Exactly one concrete unit type.
    Type { id: TypeId, name: &'static str },
    /// Every unit advertising the capability.
    Capability(Capability),
}

impl Interest {
    /// Interest in the concrete type `T`.
    pub fn of<T: Syntax>() -> Self {
        Self::Type {
            id: TypeId::of::<T>(),
            name: type_name::<T>(),
        }
    }

    /// Interest in every unit with `capability`.
    pub fn capability(capability: Capability) -> Self {
        Self::Capability(capability)
    }

    /// Whether `unit` is eligible.
    pub fn matches(&self, unit: &dyn Syntax) -> bool {
        match self {
            Self::Type { id, .. } => unit.unit_type_id() == *id,
            Self::Capability(capability) => unit.has_capability(*capability),
        }
    }
}

impl fmt::Display for Interest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Type { name, .. } => f.write_str(name),
            Self::Capability(capability) => write!(f, "capability `{}`", capability.name()),
        }
    }
}

/// Error type subscription handlers may return.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Result of a subscription handler.
pub type PluginResult = std::result::Result<(), BoxError>;

pub(crate) type Handler =
    Arc<dyn Fn(&SyntaxRef, &PluginContext<'_>) -> PluginResult + Send + Sync>;

fn erase<F>(handler: F) -> Handler
where
    F: Fn(&SyntaxRef, &PluginContext<'_>) -> PluginResult + Send + Sync + 'static,
{
    Arc::new(handler)
}

fn erase_refiner<F>(handler: F) -> RefineHandler
where
    F: Fn(&SyntaxRef, &RefineContext<'_>) -> Result<Refinement> + Send + Sync + 'static,
{
    Arc::new(handler)
}

/// One registered subscription.
#[derive(Clone)]
pub struct Subscription {
    pub(crate) plugin: &'static str,
    pub(crate) method: &'static str,
    pub(crate) category: Category,
    pub(crate) event: EventKind,
    pub(crate) interest: Interest,
    pub(crate) handler: Handler,
}

impl Subscription {
    /// The plugin type name.
    pub fn plugin(&self) -> &'static str {
        self.plugin
    }

    /// The handler's type name.
    pub fn method(&self) -> &'static str {
        self.method
    }

    /// The subscription category.
    pub fn category(&self) -> Category {
        self.category
    }

    /// The event kind this subscription hears.
    pub fn event(&self) -> EventKind {
        self.event
    }

    /// What this subscription matches.
    pub fn interest(&self) -> Interest {
        self.interest
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("plugin", &self.plugin)
            .field("category", &self.category)
            .field("event", &self.event)
            .field("interest", &self.interest)
            .finish()
    }
}

/// Builder collecting one plugin's subscriptions.
pub struct Subscriptions<P> {
    plugin: Arc<P>,
    entries: Vec<Subscription>,
    refiners: Vec<RefinerEntry>,
}

impl<P: Send + Sync + 'static> Subscriptions<P> {
    pub(crate) fn new(plugin: Arc<P>) -> Self {
        Self {
            plugin,
            entries: Vec::new(),
            refiners: Vec::new(),
        }
    }

    pub(crate) fn into_parts(self) -> (Vec<Subscription>, Vec<RefinerEntry>) {
        (self.entries, self.refiners)
    }

    /// Number of subscriptions recorded so far, refiners included.
    pub fn len(&self) -> usize {
        self.entries.len() + self.refiners.len()
    }

    /// Whether nothing was recorded.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn typed<T, F>(&mut self, category: Category, event: EventKind, handler: F)
    where
        T: Syntax,
        F: Fn(&P, &Arc<T>, &PluginContext<'_>) -> PluginResult + Send + Sync + 'static,
    {
        let method = type_name_of_val(&handler);
        let plugin = Arc::clone(&self.plugin);
        let erased = erase(move |unit, cx| match downcast::<T>(unit) {
            Some(typed) => handler(plugin.as_ref(), &typed, cx),
            None => Ok(()),
        });
        self.push(category, event, Interest::of::<T>(), method, erased);
    }

    fn erased<F>(&mut self, category: Category, event: EventKind, capability: Capability, handler: F)
    where
        F: Fn(&P, &SyntaxRef, &PluginContext<'_>) -> PluginResult + Send + Sync + 'static,
    {
        let method = type_name_of_val(&handler);
        let plugin = Arc::clone(&self.plugin);
        let erased = erase(move |unit, cx| handler(plugin.as_ref(), unit, cx));
        self.push(category, event, Interest::Capability(capability), method, erased);
    }

    fn push(
        &mut self,
        category: Category,
        event: EventKind,
        interest: Interest,
        method: &'static str,
        handler: Handler,
    ) {
        self.entries.push(Subscription {
            plugin: type_name::<P>(),
            method,
            category,
            event,
            interest,
            handler,
        });
    }

    /// Observe the creation of every `T`.
    pub fn observe<T, F>(&mut self, handler: F) -> &mut Self
    where
        T: Syntax,
        F: Fn(&P, &Arc<T>, &PluginContext<'_>) -> PluginResult + Send + Sync + 'static,
    {
        self.typed(Category::Observe, EventKind::Created, handler);
        self
    }

    /// Rework every created `T`.
    pub fn rework<T, F>(&mut self, handler: F) -> &mut Self
    where
        T: Syntax,
        F: Fn(&P, &Arc<T>, &PluginContext<'_>) -> PluginResult + Send + Sync + 'static,
    {
        self.typed(Category::Rework, EventKind::Created, handler);
        self
    }

    /// Validate every settled `T`.
    pub fn validate<T, F>(&mut self, handler: F) -> &mut Self
    where
        T: Syntax,
        F: Fn(&P, &Arc<T>, &PluginContext<'_>) -> PluginResult + Send + Sync + 'static,
    {
        self.typed(Category::Validate, EventKind::Created, handler);
        self
    }

    /// Observe every change announced for a `T`.
    pub fn observe_changes<T, F>(&mut self, handler: F) -> &mut Self
    where
        T: Syntax,
        F: Fn(&P, &Arc<T>, &PluginContext<'_>) -> PluginResult + Send + Sync + 'static,
    {
        self.typed(Category::Observe, EventKind::Changed, handler);
        self
    }

    /// Rework every change announced for a `T`.
    pub fn rework_changes<T, F>(&mut self, handler: F) -> &mut Self
    where
        T: Syntax,
        F: Fn(&P, &Arc<T>, &PluginContext<'_>) -> PluginResult + Send + Sync + 'static,
    {
        self.typed(Category::Rework, EventKind::Changed, handler);
        self
    }

    /// Observe the creation of every unit advertising `capability`.
    pub fn observe_all<F>(&mut self, capability: Capability, handler: F) -> &mut Self
    where
        F: Fn(&P, &SyntaxRef, &PluginContext<'_>) -> PluginResult + Send + Sync + 'static,
    {
        self.erased(Category::Observe, EventKind::Created, capability, handler);
        self
    }

    /// Rework every created unit advertising `capability`.
    pub fn rework_all<F>(&mut self, capability: Capability, handler: F) -> &mut Self
    where
        F: Fn(&P, &SyntaxRef, &PluginContext<'_>) -> PluginResult + Send + Sync + 'static,
    {
        self.erased(Category::Rework, EventKind::Created, capability, handler);
        self
    }

    /// Validate every settled unit advertising `capability`.
    pub fn validate_all<F>(&mut self, capability: Capability, handler: F) -> &mut Self
    where
        F: Fn(&P, &SyntaxRef, &PluginContext<'_>) -> PluginResult + Send + Sync + 'static,
    {
        self.erased(Category::Validate, EventKind::Created, capability, handler);
        self
    }

    /// Register a refiner for raw units of type `T`.
    pub fn refine<T, F>(&mut self, handler: F) -> &mut Self
    where
        T: Syntax,
        F: Fn(&P, &Arc<T>, &RefineContext<'_>) -> Result<Refinement> + Send + Sync + 'static,
    {
        let method = type_name_of_val(&handler);
        let plugin = Arc::clone(&self.plugin);
        self.refiners.push(RefinerEntry {
            plugin: type_name::<P>(),
            method,
            target: TypeId::of::<T>(),
            handler: erase_refiner(move |unit, cx| match downcast::<T>(unit) {
                Some(typed) => handler(plugin.as_ref(), &typed, cx),
                None => Ok(Refinement::None),
            }),
        });
        self
    }
}

/// What a subscription handler gets to work with.
pub struct PluginContext<'a> {
    pub(crate) broadcaster: &'a SharedBroadcaster,
    pub(crate) errors: &'a ErrorManager,
    pub(crate) refiner: &'a Arc<MasterRefiner>,
}

impl<'a> PluginContext<'a> {
    /// The broadcaster that delivered the current unit.
    pub fn broadcaster(&self) -> &'a SharedBroadcaster {
        self.broadcaster
    }

    /// Announce a unit created by the plugin (and its subtree).
    pub fn broadcast(&self, unit: &SyntaxRef) {
        broadcast_unit(unit, self.broadcaster);
    }

    /// Announce that `unit` changed.
    pub fn changed(&self, unit: &SyntaxRef) {
        self.broadcaster.broadcast(Event::changed(Arc::clone(unit)));
    }

    /// Force refinement of `unit`.
    pub fn refine(&self, unit: &SyntaxRef) -> Result<Refinement> {
        self.refiner.refine(unit, Some(self.broadcaster))
    }

    /// The refiner of the current request.
    pub fn refiner(&self) -> &'a Arc<MasterRefiner> {
        self.refiner
    }

    /// The request's error sink.
    pub fn errors(&self) -> &'a ErrorManager {
        self.errors
    }

    /// Report a warning about `unit`.
    pub fn warn(&self, unit: &SyntaxRef, message: impl Into<String>) {
        self.errors.report(ErrorLevel::Warning, unit, message);
    }

    /// Report a fatal finding about `unit`.
    pub fn fatal(&self, unit: &SyntaxRef, message: impl Into<String>) {
        self.errors.report(ErrorLevel::Fatal, unit, message);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{Item, Probe};

    struct Noop;

    #[test]
    fn interest_matching() {
        let probe = Probe::named("a");
        assert!(Interest::of::<Probe>().matches(probe.as_ref()));
        assert!(!Interest::of::<Item>().matches(probe.as_ref()));
        assert!(Interest::capability(Capability::WRITABLE).matches(probe.as_ref()));
        assert!(!Interest::capability(Capability::GROUPABLE).matches(probe.as_ref()));
    }

    #[test]
    fn builder_records_identity() {
        let mut subs = Subscriptions::new(Arc::new(Noop));
        subs.observe(|_: &Noop, _: &Arc<Probe>, _| Ok(()))
            .validate_all(Capability::WRITABLE, |_: &Noop, _, _| Ok(()));
        let (entries, refiners) = subs.into_parts();
        assert_eq!(entries.len(), 2);
        assert!(refiners.is_empty());
        assert!(entries[0].plugin().ends_with("Noop"));
        assert_eq!(entries[0].category(), Category::Observe);
        assert_eq!(entries[1].interest(), Interest::Capability(Capability::WRITABLE));
        assert!(entries[0].method().contains("builder_records_identity"));
    }
}
