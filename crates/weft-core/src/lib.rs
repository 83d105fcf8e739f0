//! Core engine for weft.
//!
//! This crate provides the event broadcast and lazy refinement machinery the
//! weft CSS pipeline is built on:
//!
//! - **Syntax Units**: Identity, source position and broadcast status shared by every node
//! - **Syntax Collections**: Ordered siblings that tolerate mutation while being walked
//! - **Broadcaster Chain**: Queuing, replaying and capturing decorators over a terminal emitter
//! - **Subscription Dispatch**: Routing of created/changed units to plugin handlers by interest
//! - **Refiner Protocol**: At-most-once, on-demand expansion of raw units
//! - **Plugin Registry**: One instance per plugin type, dependencies activated on demand
//! - **Error Manager**: Accumulated, summarized plugin faults and validation findings
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use weft_core::{
//!     broadcast_unit, EmittingBroadcaster, Emitter, ErrorManager, MasterRefiner, Plugin,
//!     PluginRegistry, QueuingBroadcaster, SharedBroadcaster, Subscriptions,
//! };
//!
//! #[derive(Default)]
//! struct Counter;
//!
//! impl Plugin for Counter {
//!     fn subscribe(&self, subs: &mut Subscriptions<Self>) {
//!         subs.observe(|_, declaration: &Arc<Declaration>, _| {
//!             println!("saw {}", declaration.property());
//!             Ok(())
//!         });
//!     }
//! }
//!
//! let emitter = Arc::new(Emitter::new(MasterRefiner::new(), Arc::new(ErrorManager::new())));
//! let mut registry = PluginRegistry::new(Arc::clone(&emitter));
//! registry.require::<Counter>()?;
//!
//! let chain: SharedBroadcaster =
//!     Arc::new(QueuingBroadcaster::new(EmittingBroadcaster::new(emitter)));
//! broadcast_unit(&declaration, &chain);
//! ```

pub mod broadcast;
pub mod collection;
pub mod emitter;
mod error;
pub mod error_manager;
pub mod logging;
pub mod plugin;
pub mod refine;
pub mod subscription;
pub mod syntax;

#[cfg(test)]
mod testing;

pub use broadcast::{
    broadcast_unit, Broadcaster, EmittingBroadcaster, Event, EventKind, QueryableBroadcaster,
    QueueState, QueuingBroadcaster, SharedBroadcaster, SingleInterestBroadcaster,
    VisitingBroadcaster,
};
pub use collection::{group_of, Group, GroupLink, Groupable, SyntaxCollection};
pub use emitter::{Emitter, Phase};
pub use error::{Error, Result};
pub use error_manager::{ErrorCategory, ErrorLevel, ErrorManager, ErrorReport, ReportSource};
pub use logging::{PerfSpan, SyntaxTreeDebug, TreeFormatOptions, TreeStyle};
pub use plugin::{Plugin, PluginId, PluginRegistry, PostProcessContext};
pub use refine::{
    refine_unit, Content, MasterRefiner, RawSpan, Refinable, RefineContext, RefineState,
    Refinement,
};
pub use subscription::{
    BoxError, Category, Interest, PluginContext, PluginResult, Subscription, Subscriptions,
};
pub use syntax::{
    downcast, Capability, SourcePosition, Status, Syntax, SyntaxMeta, SyntaxRef, UnitId,
};
