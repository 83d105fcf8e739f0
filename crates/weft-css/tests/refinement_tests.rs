//! Lazy, at-most-once refinement through the pipeline.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use weft_core::{
    downcast, Plugin, PluginContext, PluginRegistry, PluginResult, RefineContext, Refinement,
    Result, Subscriptions, Syntax,
};
use weft_css::ast::{AtRule, AtRuleExpression, Declaration, KeywordValue, Rule};
use weft_css::plugins::AutoRefine;
use weft_css::{Output, Pipeline};

/// Counts declaration refinements and leaves the work to the standard
/// refiners.
#[derive(Default)]
struct CountingRefiner {
    calls: AtomicUsize,
}

impl Plugin for CountingRefiner {
    fn subscribe(&self, subscriptions: &mut Subscriptions<Self>) {
        subscriptions.refine(Self::count);
    }
}

impl CountingRefiner {
    fn count(&self, _: &Arc<Declaration>, _: &RefineContext<'_>) -> Result<Refinement> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(Refinement::None)
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[derive(Default)]
struct Keywords {
    seen: AtomicUsize,
}

impl Plugin for Keywords {
    fn dependencies(&self, registry: &mut PluginRegistry) -> Result<()> {
        registry.require::<CountingRefiner>().map(drop)
    }

    fn subscribe(&self, subscriptions: &mut Subscriptions<Self>) {
        subscriptions.observe(Self::keyword);
    }
}

impl Keywords {
    fn keyword(&self, _: &Arc<KeywordValue>, _: &PluginContext<'_>) -> PluginResult {
        self.seen.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

fn declarations(output: &Output) -> Vec<Arc<Declaration>> {
    let statement = output.stylesheet().statements().first().expect("statement");
    let rule = downcast::<Rule>(&statement.into_syntax()).expect("a rule");
    rule.declarations().to_vec()
}

#[test]
fn nothing_is_refined_without_interest() {
    let output = Pipeline::builder()
        .require::<CountingRefiner>()
        .build()
        .process(".a{color:red;margin:0 auto}")
        .expect("processed");

    let counter = output.plugin::<CountingRefiner>().expect("registered");
    assert_eq!(counter.calls(), 0);
    assert!(declarations(&output).iter().all(|d| d.raw_value().is_some()));
}

#[test]
fn accessors_refine_on_demand_once() {
    let output = Pipeline::builder()
        .require::<CountingRefiner>()
        .build()
        .process(".a{color:red;margin:0 auto}")
        .expect("processed");
    let counter = output.plugin::<CountingRefiner>().expect("registered");
    let margin = declarations(&output).pop().expect("margin");

    let value = margin.value().expect("parses").expect("refined");
    assert_eq!(value.terms().len(), 2);
    assert!(margin.value().is_ok());
    assert_eq!(counter.calls(), 1);
}

#[test]
fn interest_in_terms_refines_every_declaration_once() {
    let output = Pipeline::builder()
        .require::<Keywords>()
        .plugin(|registry| registry.register(AutoRefine::all()).map(drop))
        .build()
        .process(".a{color:red;margin:0 auto}")
        .expect("processed");

    let counter = output.plugin::<CountingRefiner>().expect("dependency");
    assert_eq!(counter.calls(), 2);

    for declaration in declarations(&output) {
        declaration.value().expect("parses");
        declaration.value().expect("parses");
    }
    assert_eq!(counter.calls(), 2);

    let keywords = output.plugin::<Keywords>().expect("registered");
    assert_eq!(keywords.seen.load(Ordering::SeqCst), 2);
}

#[test]
fn failures_are_cached_and_reported_once() {
    let output = Pipeline::builder()
        .require::<Keywords>()
        .build()
        .process(".a{color:[red]}")
        .expect("processed");

    assert!(output.has_errors());
    assert_eq!(output.errors().reports().len(), 1);

    let declaration = declarations(&output).pop().expect("declaration");
    assert!(declaration.value().is_err());
    let counter = output.plugin::<CountingRefiner>().expect("dependency");
    assert_eq!(counter.calls(), 1);
}

#[derive(Default)]
struct Expressions;

impl Plugin for Expressions {
    fn subscribe(&self, subscriptions: &mut Subscriptions<Self>) {
        subscriptions.observe(Self::expression);
    }
}

impl Expressions {
    fn expression(&self, _: &Arc<AtRuleExpression>, _: &PluginContext<'_>) -> PluginResult {
        Ok(())
    }
}

#[test]
fn at_rules_refine_partially() {
    let output = Pipeline::builder()
        .require::<Expressions>()
        .build()
        .process("@media print{.a{b:c}}")
        .expect("processed");

    let statement = output.stylesheet().statements().first().expect("statement");
    let at_rule = downcast::<AtRule>(&statement.into_syntax()).expect("an at-rule");
    assert!(at_rule.raw_expression().is_none());
    assert!(at_rule.raw_block().is_none());
    assert_eq!(at_rule.refine().expect("cached"), Refinement::Partial);
    assert_eq!(output.css(), "@media print{.a{b:c}}");
}
