//! Logging and debugging facilities for weft.
//!
//! This module provides:
//! - Target and span names for filtering `tracing` output by subsystem
//! - Debug visualization of syntax trees
//! - Performance spans for timing processing stages
//!
//! # Tracing Integration
//!
//! weft instruments dispatch and refinement with the `tracing` crate. To see
//! logs, install a subscriber in the application or test:
//!
//! ```ignore
//! tracing_subscriber::fmt()
//!     .with_max_level(tracing::Level::TRACE)
//!     .init();
//! ```
//!
//! # Debug Visualization
//!
//! ```ignore
//! use weft_core::logging::SyntaxTreeDebug;
//!
//! println!("{}", SyntaxTreeDebug::new().format_tree(&stylesheet));
//! ```

use std::fmt::Write as FmtWrite;

use crate::syntax::{Status, SyntaxRef};

/// Span names used throughout weft for tracing.
pub mod span_names {
    /// A whole processing request.
    pub const PIPELINE: &str = "weft::pipeline";
    /// The validation replay.
    pub const VALIDATE: &str = "weft::validate";
}

/// Target names for log filtering.
///
/// Use these with `tracing` directives to filter logs by subsystem.
pub mod targets {
    /// Core engine target.
    pub const CORE: &str = "weft_core";
    /// Broadcaster chain target.
    pub const BROADCAST: &str = "weft_core::broadcast";
    /// Sibling collections target.
    pub const COLLECTION: &str = "weft_core::collection";
    /// Subscription dispatch target.
    pub const EMITTER: &str = "weft_core::emitter";
    /// Refiner protocol target.
    pub const REFINE: &str = "weft_core::refine";
    /// Plugin registry target.
    pub const PLUGIN: &str = "weft_core::plugin";
    /// Error sink target.
    pub const ERRORS: &str = "weft_core::errors";
    /// Performance spans target.
    pub const PERF: &str = "weft::perf";
}

/// Style options for syntax tree visualization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TreeStyle {
    /// ASCII characters for tree branches.
    Ascii,
    /// Unicode box-drawing characters.
    #[default]
    Unicode,
    /// Compact dash-prefixed lines.
    Compact,
}

/// Configuration for syntax tree debug output.
#[derive(Debug, Clone)]
pub struct TreeFormatOptions {
    /// The style of tree visualization.
    pub style: TreeStyle,
    /// Whether to show unit ids.
    pub show_ids: bool,
    /// Whether to show source positions.
    pub show_positions: bool,
    /// Whether to show broadcast status and refinement.
    pub show_status: bool,
    /// Maximum depth to traverse (None for unlimited).
    pub max_depth: Option<usize>,
    /// Indent size for each level.
    pub indent_size: usize,
}

impl Default for TreeFormatOptions {
    fn default() -> Self {
        Self {
            style: TreeStyle::default(),
            show_ids: true,
            show_positions: true,
            show_status: false,
            max_depth: None,
            indent_size: 2,
        }
    }
}

impl TreeFormatOptions {
    /// Options for detailed debugging output.
    pub fn detailed() -> Self {
        Self {
            show_status: true,
            ..Default::default()
        }
    }

    /// Options for minimal output: unit kinds only.
    pub fn minimal() -> Self {
        Self {
            show_ids: false,
            show_positions: false,
            show_status: false,
            ..Default::default()
        }
    }
}

/// Renders a syntax tree as indented text.
///
/// Walking uses [`Syntax::children`](crate::Syntax::children), so raw units
/// show up as leaves until they are refined. Formatting never triggers
/// refinement.
#[derive(Debug, Clone, Default)]
pub struct SyntaxTreeDebug {
    options: TreeFormatOptions,
}

impl SyntaxTreeDebug {
    /// A visualizer with default options.
    pub fn new() -> Self {
        Self::default()
    }

    /// A visualizer with custom options.
    pub fn with_options(options: TreeFormatOptions) -> Self {
        Self { options }
    }

    /// Format the tree rooted at `root`.
    pub fn format_tree(&self, root: &SyntaxRef) -> String {
        let mut output = String::new();
        self.format_into(root, 0, true, &mut output);
        output
    }

    fn format_into(&self, unit: &SyntaxRef, depth: usize, is_last: bool, output: &mut String) {
        if self.options.max_depth.is_some_and(|max| depth > max) {
            return;
        }

        output.push_str(&self.build_prefix(depth, is_last));
        output.push_str(unit.kind());

        let meta = unit.meta();
        if self.options.show_ids {
            let _ = write!(output, " [{}]", meta.id());
        }
        if self.options.show_positions && !meta.position().is_synthetic() {
            let _ = write!(output, " @{}:{}", meta.position().line(), meta.position().column());
        }
        if self.options.show_status {
            let status = match meta.status() {
                Status::Unbroadcasted => "unbroadcasted",
                Status::Queued => "queued",
                Status::Processing => "processing",
                Status::Broadcasted => "broadcasted",
            };
            let refined = if unit.is_refined() { "" } else { ", raw" };
            let _ = write!(output, " ({status}{refined})");
        }
        output.push('\n');

        let children = unit.children();
        let count = children.len();
        for (i, child) in children.iter().enumerate() {
            self.format_into(child, depth + 1, i + 1 == count, output);
        }
    }

    fn build_prefix(&self, depth: usize, is_last: bool) -> String {
        if depth == 0 {
            return String::new();
        }

        let (branch, corner, end) = match self.options.style {
            TreeStyle::Ascii => ("|", "+--", "`--"),
            TreeStyle::Unicode => ("\u{2502}", "\u{251c}\u{2500}\u{2500}", "\u{2514}\u{2500}\u{2500}"),
            TreeStyle::Compact => ("", "-", "-"),
        };

        let mut prefix = String::new();
        for _ in 0..(depth - 1) {
            prefix.push_str(branch);
            prefix.extend(std::iter::repeat_n(' ', self.options.indent_size));
        }
        prefix.push_str(if is_last { end } else { corner });
        prefix.push(' ');
        prefix
    }
}

/// A guard that keeps a tracing span entered until dropped.
///
/// Useful for timing a processing stage.
#[derive(Debug)]
pub struct PerfSpan {
    _span: tracing::span::EnteredSpan,
}

impl PerfSpan {
    /// Enter a new performance span.
    pub fn new(name: &'static str) -> Self {
        let span = tracing::info_span!(target: "weft::perf", "perf", operation = name);
        Self {
            _span: span.entered(),
        }
    }
}
