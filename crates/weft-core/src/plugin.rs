//! Plugins and their registry.
//!
//! A plugin is any `Send + Sync` type implementing [`Plugin`]. The
//! [`PluginRegistry`] keeps exactly one instance per plugin type for the
//! lifetime of a request. Activating a plugin:
//!
//! 1. stores the instance (so plugins that depend back on it find it)
//! 2. attaches its subscriptions to the emitter
//! 3. calls its [`Plugin::dependencies`] hook, which may require more plugins
//!
//! Dispatch order follows activation order. A plugin that must run after a
//! dependency's rework should require that dependency explicitly.
//!
//! ```ignore
//! let mut registry = PluginRegistry::new(emitter);
//! registry.require::<StandardRefiners>()?;
//! registry.register(MarginTop::default())?;
//! ```

use std::any::{type_name, Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use slotmap::{new_key_type, SlotMap};

use crate::broadcast::SharedBroadcaster;
use crate::emitter::Emitter;
use crate::error::{Error, Result};
use crate::subscription::Subscriptions;

new_key_type! {
    /// Identifier of an activated plugin.
    pub struct PluginId;
}

/// A processing plugin.
///
/// Every hook has a default, so a plugin implements only what it needs.
pub trait Plugin: Send + Sync + 'static {
    /// Require the plugins this one depends on.
    fn dependencies(&self, registry: &mut PluginRegistry) -> Result<()> {
        let _ = registry;
        Ok(())
    }

    /// Declare subscriptions and refiners.
    fn subscribe(&self, subscriptions: &mut Subscriptions<Self>)
    where
        Self: Sized,
    {
        let _ = subscriptions;
    }

    /// Called once after all broadcasting has settled.
    fn post_process(&self, cx: &PostProcessContext<'_>) -> Result<()> {
        let _ = cx;
        Ok(())
    }
}

struct PluginEntry {
    name: &'static str,
    instance: Arc<dyn Any + Send + Sync>,
    hooks: Arc<dyn Plugin>,
}

/// What a post-process hook gets to work with.
pub struct PostProcessContext<'a> {
    registry: &'a PluginRegistry,
    broadcaster: &'a SharedBroadcaster,
}

impl<'a> PostProcessContext<'a> {
    /// The registry, for looking up other plugins.
    pub fn registry(&self) -> &'a PluginRegistry {
        self.registry
    }

    /// The request's broadcaster, for announcing late units.
    pub fn broadcaster(&self) -> &'a SharedBroadcaster {
        self.broadcaster
    }

    /// Look up another plugin.
    pub fn retrieve<P: Plugin>(&self) -> Option<Arc<P>> {
        self.registry.retrieve::<P>()
    }
}

/// One instance per plugin type, in activation order.
pub struct PluginRegistry {
    entries: SlotMap<PluginId, PluginEntry>,
    by_type: HashMap<TypeId, PluginId>,
    order: Vec<PluginId>,
    emitter: Arc<Emitter>,
}

impl PluginRegistry {
    /// An empty registry attaching subscriptions to `emitter`.
    pub fn new(emitter: Arc<Emitter>) -> Self {
        Self {
            entries: SlotMap::with_key(),
            by_type: HashMap::new(),
            order: Vec::new(),
            emitter,
        }
    }

    /// The emitter subscriptions are attached to.
    pub fn emitter(&self) -> &Arc<Emitter> {
        &self.emitter
    }

    /// Get the `P` instance, creating it with `P::default()` if needed.
    pub fn require<P: Plugin + Default>(&mut self) -> Result<Arc<P>> {
        self.require_with(|| Ok(P::default()))
    }

    /// Get the `P` instance, creating it with `factory` if needed.
    pub fn require_with<P, F>(&mut self, factory: F) -> Result<Arc<P>>
    where
        P: Plugin,
        F: FnOnce() -> Result<P>,
    {
        if let Some(existing) = self.retrieve::<P>() {
            return Ok(existing);
        }
        let instance = factory().map_err(|err| {
            Error::configuration(format!(
                "failed to construct plugin `{}`: {err}",
                type_name::<P>()
            ))
        })?;
        self.activate(Arc::new(instance))
    }

    /// Get the `P` instance, which must already be registered.
    ///
    /// Use for requirements that cannot be default-constructed.
    pub fn require_registered<P: Plugin>(&self) -> Result<Arc<P>> {
        self.retrieve::<P>().ok_or_else(|| {
            Error::configuration(format!(
                "plugin `{}` is required but was never registered and has no factory",
                type_name::<P>()
            ))
        })
    }

    /// Register a configured instance. Fails if `P` is already active.
    pub fn register<P: Plugin>(&mut self, instance: P) -> Result<Arc<P>> {
        if self.contains::<P>() {
            return Err(Error::configuration(format!(
                "plugin `{}` is already registered",
                type_name::<P>()
            )));
        }
        self.activate(Arc::new(instance))
    }

    /// Look up the `P` instance.
    pub fn retrieve<P: Plugin>(&self) -> Option<Arc<P>> {
        let id = self.by_type.get(&TypeId::of::<P>())?;
        let entry = self.entries.get(*id)?;
        Arc::clone(&entry.instance).downcast::<P>().ok()
    }

    /// Whether `P` is active.
    pub fn contains<P: Plugin>(&self) -> bool {
        self.by_type.contains_key(&TypeId::of::<P>())
    }

    /// Number of active plugins.
    pub fn len(&self) -> usize {
        self.order.len()
    }

    /// Whether no plugin is active.
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Plugin type names in activation order.
    pub fn plugins(&self) -> Vec<&'static str> {
        self.order
            .iter()
            .filter_map(|id| self.entries.get(*id))
            .map(|entry| entry.name)
            .collect()
    }

    /// Run every plugin's post-process hook once, in activation order.
    ///
    /// Stops at the first failing hook.
    pub fn post_process(&self, broadcaster: &SharedBroadcaster) -> Result<()> {
        let cx = PostProcessContext {
            registry: self,
            broadcaster,
        };
        for id in &self.order {
            let Some(entry) = self.entries.get(*id) else {
                continue;
            };
            tracing::debug!(target: "weft_core::plugin", plugin = entry.name, "post-processing");
            entry.hooks.post_process(&cx)?;
        }
        Ok(())
    }

    fn activate<P: Plugin>(&mut self, plugin: Arc<P>) -> Result<Arc<P>> {
        let name = type_name::<P>();
        let instance: Arc<dyn Any + Send + Sync> = plugin.clone();
        let hooks: Arc<dyn Plugin> = plugin.clone();
        let id = self.entries.insert(PluginEntry {
            name,
            instance,
            hooks,
        });
        self.by_type.insert(TypeId::of::<P>(), id);
        self.order.push(id);
        tracing::debug!(target: "weft_core::plugin", plugin = name, "activating plugin");

        let mut subscriptions = Subscriptions::new(Arc::clone(&plugin));
        plugin.subscribe(&mut subscriptions);
        self.emitter.attach(subscriptions);

        plugin.dependencies(self)?;
        Ok(plugin)
    }
}

impl fmt::Debug for PluginRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PluginRegistry")
            .field("plugins", &self.plugins())
            .finish()
    }
}
