//! End-to-end scenarios through the full pipeline.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use weft_core::{
    downcast, group_of, Groupable, Plugin, PluginContext, PluginResult, Subscriptions, Syntax,
    SyntaxRef,
};
use weft_css::ast::{
    enclosing, Declaration, KeywordValue, NumericalValue, Rule, Selector, SelectorPart,
};
use weft_css::{to_css, Pipeline, WriterMode};

/// Prepends a `margin-top` copy of every `margin` declaration.
#[derive(Default)]
struct MarginTop;

impl Plugin for MarginTop {
    fn subscribe(&self, subscriptions: &mut Subscriptions<Self>) {
        subscriptions.rework(Self::split);
    }
}

impl MarginTop {
    fn split(&self, declaration: &Arc<Declaration>, _: &PluginContext<'_>) -> PluginResult {
        if declaration.is_property("margin") {
            declaration.prepend(declaration.duplicate_as("margin-top"))?;
        }
        Ok(())
    }
}

/// Counts numbers and declarations per rule, keyed by the rule's selectors.
#[derive(Default)]
struct Counter {
    numbers: Mutex<HashMap<String, usize>>,
    declarations: Mutex<HashMap<String, usize>>,
}

impl Plugin for Counter {
    fn subscribe(&self, subscriptions: &mut Subscriptions<Self>) {
        subscriptions
            .observe(Self::number)
            .observe(Self::declaration);
    }
}

impl Counter {
    fn number(&self, number: &Arc<NumericalValue>, _: &PluginContext<'_>) -> PluginResult {
        if let Some(rule) = rule_of(&Arc::clone(number).into_syntax()) {
            *self.numbers.lock().entry(rule).or_default() += 1;
        }
        Ok(())
    }

    fn declaration(&self, declaration: &Arc<Declaration>, _: &PluginContext<'_>) -> PluginResult {
        if let Some(rule) = rule_of(&Arc::clone(declaration).into_syntax()) {
            *self.declarations.lock().entry(rule).or_default() += 1;
        }
        Ok(())
    }

    fn numbers_in(&self, rule: &str) -> usize {
        self.numbers.lock().get(rule).copied().unwrap_or(0)
    }

    fn declarations_in(&self, rule: &str) -> usize {
        self.declarations.lock().get(rule).copied().unwrap_or(0)
    }
}

fn rule_of(unit: &SyntaxRef) -> Option<String> {
    let mut current = enclosing(unit)?;
    loop {
        if let Some(rule) = downcast::<Rule>(&current) {
            let selectors: Vec<String> = rule
                .selectors()
                .iter()
                .map(|selector| to_css(&*selector, WriterMode::Compressed))
                .collect();
            return Some(selectors.join(","));
        }
        current = enclosing(&current)?;
    }
}

#[test]
fn margin_top_is_synthesized_in_order() {
    let output = Pipeline::builder()
        .require::<MarginTop>()
        .require::<Counter>()
        .build()
        .process(".left{margin:0} .a,.b{color:red}")
        .expect("processed");

    assert!(!output.has_errors(), "{}", output.summarize());
    assert_eq!(output.css(), ".left{margin-top:0;margin:0} .a,.b{color:red}");

    let counter = output.plugin::<Counter>().expect("counter registered");
    assert_eq!(counter.numbers_in(".left"), 2);
    assert_eq!(counter.numbers_in(".a,.b"), 0);
    assert_eq!(counter.declarations_in(".left"), 2);
    assert_eq!(counter.declarations_in(".a,.b"), 1);
}

#[test]
fn synthesized_declaration_is_a_sibling() {
    let output = Pipeline::builder()
        .require::<MarginTop>()
        .build()
        .process(".left{margin:0 auto}")
        .expect("processed");

    let statement = output.stylesheet().statements().first().expect("rule");
    let rule = downcast::<Rule>(&statement.into_syntax()).expect("a rule");
    let properties: Vec<String> = rule
        .declarations()
        .iter()
        .map(|declaration| declaration.property().to_string())
        .collect();
    assert_eq!(properties, ["margin-top", "margin"]);

    let synthesized = rule.declarations().first().expect("declaration");
    assert!(synthesized.meta().position().is_synthetic());
}

/// Rejects selectors that end with a combinator.
#[derive(Default)]
struct TrailingCombinator;

impl Plugin for TrailingCombinator {
    fn subscribe(&self, subscriptions: &mut Subscriptions<Self>) {
        subscriptions.validate(Self::check);
    }
}

impl TrailingCombinator {
    fn check(&self, selector: &Arc<Selector>, cx: &PluginContext<'_>) -> PluginResult {
        let Some(parts) = selector.parts()? else {
            return Ok(());
        };
        if parts.last().is_some_and(|part| part.is_combinator()) {
            cx.fatal(
                &Arc::clone(selector).into_syntax(),
                "selector ends with a combinator",
            );
        }
        Ok(())
    }
}

#[test]
fn trailing_combinator_is_reported_at_the_selector() {
    let output = Pipeline::builder()
        .require::<TrailingCombinator>()
        .build()
        .process(".a > {color:red}")
        .expect("processed");

    assert!(output.has_errors());
    let summary = output.summarize();
    assert!(summary.contains("selector ends with a combinator"), "{summary}");
    assert!(summary.contains("line 1, column 1"), "{summary}");
}

#[test]
fn complete_selectors_pass_validation() {
    let output = Pipeline::builder()
        .require::<TrailingCombinator>()
        .build()
        .process(".a > b {color:red}\n.c ~ .d {top:0}")
        .expect("processed");

    assert!(!output.has_errors(), "{}", output.summarize());
}

#[test]
fn validation_can_be_switched_off() {
    let output = Pipeline::builder()
        .require::<TrailingCombinator>()
        .validate(false)
        .build()
        .process(".a > {color:red}")
        .expect("processed");

    assert!(!output.has_errors());
    assert_eq!(output.css(), ".a >{color:red}");
}

/// Removes every `color` declaration.
#[derive(Default)]
struct DropColor;

impl Plugin for DropColor {
    fn subscribe(&self, subscriptions: &mut Subscriptions<Self>) {
        subscriptions.rework(Self::drop_color);
    }
}

impl DropColor {
    fn drop_color(&self, declaration: &Arc<Declaration>, _: &PluginContext<'_>) -> PluginResult {
        if declaration.is_property("color") {
            declaration.destroy();
        }
        Ok(())
    }
}

/// Swaps every `color` declaration for a `background-color` one.
#[derive(Default)]
struct RenameColor;

impl Plugin for RenameColor {
    fn subscribe(&self, subscriptions: &mut Subscriptions<Self>) {
        subscriptions.rework(Self::rename);
    }
}

impl RenameColor {
    fn rename(&self, declaration: &Arc<Declaration>, _: &PluginContext<'_>) -> PluginResult {
        if declaration.is_property("color")
            && let Some(siblings) = group_of::<Declaration>(declaration.as_ref())
        {
            siblings.replace(declaration, declaration.duplicate_as("background-color"))?;
        }
        Ok(())
    }
}

/// Rejects `color` declarations and the keywords in their values.
#[derive(Default)]
struct NoColor;

impl Plugin for NoColor {
    fn subscribe(&self, subscriptions: &mut Subscriptions<Self>) {
        subscriptions
            .validate(Self::declaration)
            .validate(Self::keyword);
    }
}

impl NoColor {
    fn declaration(&self, declaration: &Arc<Declaration>, cx: &PluginContext<'_>) -> PluginResult {
        if declaration.is_property("color") {
            cx.fatal(&Arc::clone(declaration).into_syntax(), "color not allowed");
        }
        Ok(())
    }

    fn keyword(&self, keyword: &Arc<KeywordValue>, cx: &PluginContext<'_>) -> PluginResult {
        let unit = Arc::clone(keyword).into_syntax();
        let in_color = enclosing(&unit)
            .and_then(|value| enclosing(&value))
            .and_then(|owner| downcast::<Declaration>(&owner))
            .is_some_and(|declaration| declaration.is_property("color"));
        if in_color {
            cx.fatal(&unit, "color keyword not allowed");
        }
        Ok(())
    }
}

#[test]
fn validators_reject_color_left_in_place() {
    let output = Pipeline::builder()
        .require::<NoColor>()
        .build()
        .process(".a{color:red;top:0}")
        .expect("processed");

    assert_eq!(output.errors().reports().len(), 2, "{}", output.summarize());
}

#[test]
fn destroyed_units_are_not_validated() {
    let output = Pipeline::builder()
        .require::<DropColor>()
        .require::<NoColor>()
        .build()
        .process(".a{color:red;top:0}")
        .expect("processed");

    assert_eq!(output.css(), ".a{top:0}");
    assert!(!output.has_errors(), "{}", output.summarize());
}

#[test]
fn replaced_units_are_not_validated() {
    let output = Pipeline::builder()
        .require::<RenameColor>()
        .require::<NoColor>()
        .build()
        .process(".a{color:red;top:0}")
        .expect("processed");

    assert_eq!(output.css(), ".a{background-color:red;top:0}");
    assert!(!output.has_errors(), "{}", output.summarize());
}
