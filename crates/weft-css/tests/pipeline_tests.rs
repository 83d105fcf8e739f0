//! Pipeline configuration, output formats and error propagation.

use std::io::Write;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use weft_core::{
    Error, Plugin, PluginContext, PluginResult, PostProcessContext, Result, Subscriptions,
};
use weft_css::ast::{Declaration, Rule};
use weft_css::plugins::AutoRefine;
use weft_css::{Pipeline, PipelineConfig, WriterMode};

const SHEET: &str = "/* intro */\n.a,.b{color:red;margin:0}\n@media print{.c{top:0}}";

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::TRACE)
        .try_init();
}

#[test]
fn compressed_output() {
    init_tracing();
    let output = Pipeline::new().process(SHEET).expect("processed");
    assert_eq!(output.css(), ".a,.b{color:red;margin:0} @media print{.c{top:0}}");
}

#[test]
fn inline_output() {
    let output = Pipeline::builder()
        .mode(WriterMode::Inline)
        .build()
        .process(SHEET)
        .expect("processed");
    assert_eq!(
        output.css(),
        ".a, .b { color: red; margin: 0; }\n@media print { .c{top:0} }"
    );
}

#[test]
fn verbose_output_keeps_comments() {
    let output = Pipeline::builder()
        .mode(WriterMode::Verbose)
        .build()
        .process(SHEET)
        .expect("processed");
    assert_eq!(
        output.css(),
        "/*intro*/\n.a, .b {\n  color: red;\n  margin: 0;\n}\n\n@media print { .c{top:0} }"
    );
}

#[test]
fn verbose_output_of_refined_tree() {
    init_tracing();
    let output = Pipeline::builder()
        .config(PipelineConfig {
            mode: WriterMode::Verbose,
            ..PipelineConfig::default()
        })
        .plugin(|registry| registry.register(AutoRefine::all()).map(drop))
        .build()
        .process("@media screen,print{p{color:red}}")
        .expect("processed");
    assert_eq!(
        output.css(),
        "@media screen, print {\n  p {\n    color: red;\n  }\n}"
    );
}

#[test]
fn empty_input() {
    let output = Pipeline::new().process("  \n").expect("processed");
    assert!(output.stylesheet().is_empty());
    assert_eq!(output.css(), "");
    assert!(!output.has_errors());
}

#[test]
fn process_file_reads_the_stylesheet() {
    let mut file = tempfile::NamedTempFile::new().expect("temp file");
    file.write_all(b".a { color: red }").expect("written");

    let output = Pipeline::new().process_file(file.path()).expect("processed");
    assert_eq!(output.into_css(), ".a{color:red}");
}

#[test]
fn missing_file_is_an_io_error() {
    let dir = tempfile::tempdir().expect("temp dir");
    let result = Pipeline::new().process_file(dir.path().join("missing.css"));
    assert!(matches!(result, Err(Error::Io { .. })));
}

/// Fails on every `color` declaration.
#[derive(Default)]
struct RejectColor;

impl Plugin for RejectColor {
    fn subscribe(&self, subscriptions: &mut Subscriptions<Self>) {
        subscriptions.rework(Self::reject);
    }
}

impl RejectColor {
    fn reject(&self, declaration: &Arc<Declaration>, _: &PluginContext<'_>) -> PluginResult {
        if declaration.is_property("color") {
            return Err("colors are not allowed".into());
        }
        Ok(())
    }
}

#[test]
fn plugin_faults_accumulate() {
    let output = Pipeline::builder()
        .require::<RejectColor>()
        .build()
        .process(".a{color:red} .b{color:blue;top:0}")
        .expect("processed");

    assert!(output.has_errors());
    assert_eq!(output.errors().reports().len(), 2);
    assert!(output.summarize().contains("colors are not allowed"));
    assert_eq!(output.css(), ".a{color:red} .b{color:blue;top:0}");
}

#[test]
fn plugin_faults_abort_in_rethrow_mode() {
    let result = Pipeline::builder()
        .require::<RejectColor>()
        .rethrow_fatal(true)
        .build()
        .process(".a{color:red} .b{color:blue}");
    assert!(matches!(result, Err(Error::Aborted { .. })));
}

/// Counts rules, and records the count once everything settled.
#[derive(Default)]
struct Summary {
    rules: AtomicUsize,
    at_post_process: AtomicUsize,
}

impl Plugin for Summary {
    fn subscribe(&self, subscriptions: &mut Subscriptions<Self>) {
        subscriptions.observe(Self::rule);
    }

    fn post_process(&self, _: &PostProcessContext<'_>) -> Result<()> {
        let rules = self.rules.load(Ordering::SeqCst);
        self.at_post_process.store(rules, Ordering::SeqCst);
        Ok(())
    }
}

impl Summary {
    fn rule(&self, _: &Arc<Rule>, _: &PluginContext<'_>) -> PluginResult {
        self.rules.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[test]
fn post_process_runs_after_broadcasting() {
    let output = Pipeline::builder()
        .require::<Summary>()
        .build()
        .process(".a{b:c} .d{e:f} .g{h:i}")
        .expect("processed");

    let summary = output.plugin::<Summary>().expect("registered");
    assert_eq!(summary.at_post_process.load(Ordering::SeqCst), 3);
}

#[test]
fn pipelines_are_reusable() {
    let pipeline = Pipeline::builder().require::<Summary>().build();
    let first = pipeline.process(".a{b:c}").expect("processed");
    let second = pipeline.process(".a{b:c} .d{e:f}").expect("processed");

    let count = |output: &weft_css::Output| {
        output
            .plugin::<Summary>()
            .map(|summary| summary.rules.load(Ordering::SeqCst))
    };
    assert_eq!(count(&first), Some(1));
    assert_eq!(count(&second), Some(2));
}
