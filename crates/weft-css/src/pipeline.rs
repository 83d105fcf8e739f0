//! The processing pipeline.
//!
//! One [`Pipeline::process`] call is one request: a fresh error manager,
//! refiner, emitter and plugin registry are created, the source is parsed
//! and broadcast statement by statement, plugins post-process, validators
//! run over a replay of every created unit, and the tree is written.

use std::fmt;
use std::path::Path;
use std::sync::Arc;

use weft_core::logging::span_names;
use weft_core::{
    broadcast_unit, EmittingBroadcaster, Emitter, Error, ErrorLevel, ErrorManager, MasterRefiner,
    Phase, PerfSpan, Plugin, PluginRegistry, QueuingBroadcaster, Result, SharedBroadcaster,
    Syntax, VisitingBroadcaster,
};

use crate::ast::Stylesheet;
use crate::grammar;
use crate::refiners::StandardRefiners;
use crate::writer::{to_css, WriterMode};

type PluginInstaller = Arc<dyn Fn(&mut PluginRegistry) -> Result<()> + Send + Sync>;

/// Settings for a [`Pipeline`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PipelineConfig {
    /// How the output is formatted.
    pub mode: WriterMode,
    /// Abort at the first fatal report instead of accumulating.
    pub rethrow_fatal: bool,
    /// Run validators after processing.
    pub validate: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            mode: WriterMode::default(),
            rethrow_fatal: false,
            validate: true,
        }
    }
}

/// Processes stylesheets through a fixed set of plugins.
///
/// A pipeline is reusable; plugins are instantiated anew for every
/// request.
///
/// # Example
///
/// ```ignore
/// let output = Pipeline::builder()
///     .mode(WriterMode::Verbose)
///     .require::<MyPlugin>()
///     .build()
///     .process(".a { color: red }")?;
/// println!("{}", output.css());
/// ```
#[derive(Clone, Default)]
pub struct Pipeline {
    config: PipelineConfig,
    plugins: Vec<PluginInstaller>,
}

impl Pipeline {
    /// A pipeline with default settings and only the standard refiners.
    pub fn new() -> Self {
        Self::default()
    }

    /// A pipeline with `config` and only the standard refiners.
    pub fn with_config(config: PipelineConfig) -> Self {
        Self {
            config,
            plugins: Vec::new(),
        }
    }

    /// Start configuring a pipeline.
    pub fn builder() -> PipelineBuilder {
        PipelineBuilder::default()
    }

    /// The pipeline's settings.
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Process `css`.
    ///
    /// Parse errors and plugin faults are accumulated in the output's
    /// error manager. Only plugin installation failures, and any fatal
    /// report when `rethrow_fatal` is set, are returned as errors.
    #[tracing::instrument(skip_all, target = "weft_css::pipeline", fields(bytes = css.len()))]
    pub fn process(&self, css: &str) -> Result<Output> {
        let _perf = PerfSpan::new(span_names::PIPELINE);

        let errors = Arc::new(ErrorManager::new());
        errors.set_rethrow_fatal(self.config.rethrow_fatal);
        let refiner = MasterRefiner::new();
        let emitter = Arc::new(Emitter::new(refiner, Arc::clone(&errors)));

        let visiting = Arc::new(VisitingBroadcaster::new(EmittingBroadcaster::new(
            Arc::clone(&emitter),
        )));
        let chain: SharedBroadcaster = Arc::new(QueuingBroadcaster::new(
            EmittingBroadcaster::with_next(Arc::clone(&emitter), visiting.clone()),
        ));

        let mut registry = PluginRegistry::new(Arc::clone(&emitter));
        for install in &self.plugins {
            install(&mut registry)?;
        }
        registry.require::<StandardRefiners>()?;
        tracing::debug!(
            target: "weft_css::pipeline",
            plugins = ?registry.plugins(),
            subscriptions = emitter.subscription_count(),
            "plugins installed"
        );

        let stylesheet = Stylesheet::new();
        broadcast_unit(&Arc::clone(&stylesheet).into_syntax(), &chain);
        let parse_errors = grammar::parse_stylesheet(css, |statement| stylesheet.append(statement));
        for error in parse_errors {
            errors.report_error(ErrorLevel::Fatal, error);
        }
        abort_if_needed(&errors)?;

        registry.post_process(&chain)?;
        abort_if_needed(&errors)?;

        if self.config.validate {
            let _validate = PerfSpan::new(span_names::VALIDATE);
            emitter.set_phase(Phase::Validate);
            visiting.visit_created();
            abort_if_needed(&errors)?;
        }

        let css = to_css(stylesheet.as_ref(), self.config.mode);
        tracing::debug!(
            target: "weft_css::pipeline",
            statements = stylesheet.len(),
            errors = errors.has_errors(),
            bytes = css.len(),
            "request finished"
        );
        Ok(Output {
            stylesheet,
            css,
            errors,
            registry,
        })
    }

    /// Read and process the stylesheet at `path`.
    pub fn process_file(&self, path: impl AsRef<Path>) -> Result<Output> {
        let path = path.as_ref();
        let css = std::fs::read_to_string(path).map_err(|e| Error::io(path, e))?;
        self.process(&css)
    }
}

impl fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pipeline")
            .field("config", &self.config)
            .field("plugins", &self.plugins.len())
            .finish()
    }
}

fn abort_if_needed(errors: &ErrorManager) -> Result<()> {
    match errors.abort_error() {
        Some(error) => {
            tracing::debug!(target: "weft_css::pipeline", error = %error, "request aborted");
            Err(error)
        }
        None => Ok(()),
    }
}

/// Builder for [`Pipeline`].
#[derive(Default)]
pub struct PipelineBuilder {
    config: PipelineConfig,
    plugins: Vec<PluginInstaller>,
}

impl PipelineBuilder {
    /// Replace all settings.
    pub fn config(mut self, config: PipelineConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the output format.
    pub fn mode(mut self, mode: WriterMode) -> Self {
        self.config.mode = mode;
        self
    }

    /// Abort at the first fatal report.
    pub fn rethrow_fatal(mut self, rethrow: bool) -> Self {
        self.config.rethrow_fatal = rethrow;
        self
    }

    /// Run validators after processing.
    pub fn validate(mut self, validate: bool) -> Self {
        self.config.validate = validate;
        self
    }

    /// Install plugins with `install` at the start of every request.
    ///
    /// Installers run in the order they were added, before the standard
    /// refiners.
    pub fn plugin<F>(mut self, install: F) -> Self
    where
        F: Fn(&mut PluginRegistry) -> Result<()> + Send + Sync + 'static,
    {
        self.plugins.push(Arc::new(install));
        self
    }

    /// Install a default-constructed `P` for every request.
    pub fn require<P: Plugin + Default>(self) -> Self {
        self.plugin(|registry| registry.require::<P>().map(drop))
    }

    /// Finish configuring.
    pub fn build(self) -> Pipeline {
        Pipeline {
            config: self.config,
            plugins: self.plugins,
        }
    }
}

impl fmt::Debug for PipelineBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PipelineBuilder")
            .field("config", &self.config)
            .field("plugins", &self.plugins.len())
            .finish()
    }
}

/// The result of one request.
pub struct Output {
    stylesheet: Arc<Stylesheet>,
    css: String,
    errors: Arc<ErrorManager>,
    registry: PluginRegistry,
}

impl Output {
    /// The processed tree.
    pub fn stylesheet(&self) -> &Arc<Stylesheet> {
        &self.stylesheet
    }

    /// The written stylesheet.
    pub fn css(&self) -> &str {
        &self.css
    }

    /// Take the written stylesheet.
    pub fn into_css(self) -> String {
        self.css
    }

    /// Everything reported during the request.
    pub fn errors(&self) -> &ErrorManager {
        &self.errors
    }

    /// Whether any fatal report was raised.
    pub fn has_errors(&self) -> bool {
        self.errors.has_errors()
    }

    /// A readable summary of every report.
    pub fn summarize(&self) -> String {
        self.errors.summarize()
    }

    /// The request's instance of plugin `P`, for reading its state.
    pub fn plugin<P: Plugin>(&self) -> Option<Arc<P>> {
        self.registry.retrieve::<P>()
    }
}

impl fmt::Debug for Output {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Output")
            .field("css", &self.css)
            .field("errors", &self.errors)
            .field("plugins", &self.registry.plugins())
            .finish()
    }
}

static_assertions::assert_impl_all!(Pipeline: Send, Sync);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = PipelineConfig::default();
        assert_eq!(config.mode, WriterMode::Compressed);
        assert!(config.validate);
        assert!(!config.rethrow_fatal);
    }

    #[test]
    fn builder_sets_config() {
        let pipeline = Pipeline::builder()
            .mode(WriterMode::Verbose)
            .rethrow_fatal(true)
            .validate(false)
            .build();
        assert_eq!(
            *pipeline.config(),
            PipelineConfig {
                mode: WriterMode::Verbose,
                rethrow_fatal: true,
                validate: false,
            }
        );
    }

    #[test]
    fn untouched_input_is_rewritten() {
        let output = Pipeline::new()
            .process(" .a  { color : red }\n\n@media print{.b{c:d}}")
            .expect("processed");
        assert!(!output.has_errors());
        assert_eq!(output.css(), ".a{color:red} @media print{.b{c:d}}");
        assert_eq!(output.stylesheet().len(), 2);
    }

    #[test]
    fn parse_errors_are_reported() {
        let output = Pipeline::new().process(".a{:x} .b{c:d}").expect("processed");
        assert!(output.has_errors());
        assert_eq!(output.css(), ".b{c:d}");
        assert!(output.summarize().contains("line 1, column 4"));
    }

    #[test]
    fn parse_errors_abort_in_rethrow_mode() {
        let result = Pipeline::builder().rethrow_fatal(true).build().process(".a{:x}");
        assert!(matches!(result, Err(Error::Aborted { .. })));
    }

    #[test]
    fn failing_installer_is_returned() {
        let result = Pipeline::builder()
            .plugin(|_| Err(Error::configuration("missing setting")))
            .build()
            .process(".a{b:c}");
        assert!(matches!(result, Err(Error::Configuration { .. })));
    }
}
