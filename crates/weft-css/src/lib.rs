//! CSS processing on top of the weft engine.
//!
//! This crate provides everything needed to run plugins over stylesheets:
//!
//! - **Syntax Tree**: Rules, at-rules, selectors, declarations and value terms
//! - **Grammar**: A `cssparser`-based reader producing raw units, and the
//!   sub-parsers that refine them on demand
//! - **Writer**: Compressed, inline and verbose output
//! - **Pipeline**: Parse, broadcast, post-process, validate and write in one call
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use weft_css::prelude::*;
//!
//! #[derive(Default)]
//! struct MarginTop;
//!
//! impl Plugin for MarginTop {
//!     fn subscribe(&self, subs: &mut Subscriptions<Self>) {
//!         subs.rework(|_, declaration: &Arc<Declaration>, _| {
//!             if declaration.is_property("margin") {
//!                 declaration.prepend(declaration.duplicate_as("margin-top"))?;
//!             }
//!             Ok(())
//!         });
//!     }
//! }
//!
//! let output = Pipeline::builder()
//!     .require::<MarginTop>()
//!     .build()
//!     .process(".left { margin: 0 }")?;
//! assert_eq!(output.css(), ".left{margin-top:0;margin:0}");
//! ```

pub mod ast;
pub mod grammar;
pub mod pipeline;
pub mod plugins;
pub mod refiners;
pub mod writer;

pub use weft_core::{Error, Result};

pub use pipeline::{Output, Pipeline, PipelineBuilder, PipelineConfig};
pub use writer::{to_css, StyleWriter, Writable, WriterMode};

/// Prelude module with commonly used types.
pub mod prelude {
    pub use crate::ast::{
        enclosing, AtRule, AtRuleBlock, AtRuleExpression, BlockItems, Declaration, PropertyValue,
        Rule, Selector, SelectorPart, Statement, Stylesheet, Term,
    };
    pub use crate::plugins::AutoRefine;
    pub use crate::writer::{to_css, Writable, WriterMode};
    pub use crate::{Output, Pipeline, PipelineConfig};
    pub use weft_core::{
        Capability, Error, ErrorLevel, Groupable, Plugin, PluginContext, PluginResult,
        Refinement, Result, Subscriptions, Syntax, SyntaxRef,
    };
}
