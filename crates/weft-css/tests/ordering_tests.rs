//! Delivery order of parsed and synthesized units.

use std::sync::Arc;

use parking_lot::Mutex;
use weft_core::{
    downcast, Capability, Plugin, PluginContext, PluginResult, Subscriptions, Syntax, SyntaxRef,
};
use weft_css::ast::{
    enclosing, AtRule, AtRuleExpression, ClassSelector, Declaration, NumericalValue,
    PropertyValue, Rule, Selector, Stylesheet,
};
use weft_css::{to_css, Pipeline, WriterMode};

/// Prepends a copy of every at-rule read from source.
#[derive(Default)]
struct CopyAtRules;

impl Plugin for CopyAtRules {
    fn subscribe(&self, subscriptions: &mut Subscriptions<Self>) {
        subscriptions.rework(Self::copy);
    }
}

impl CopyAtRules {
    fn copy(&self, at_rule: &Arc<AtRule>, _: &PluginContext<'_>) -> PluginResult {
        if !at_rule.meta().position().is_synthetic() {
            at_rule.prepend(at_rule.duplicate())?;
        }
        Ok(())
    }
}

/// Records the kind of every unit under an at-rule, split by whether the
/// at-rule is a copy.
#[derive(Default)]
struct Sequence {
    originals: Mutex<Vec<&'static str>>,
    copies: Mutex<Vec<&'static str>>,
    expressions: Mutex<usize>,
}

impl Plugin for Sequence {
    fn subscribe(&self, subscriptions: &mut Subscriptions<Self>) {
        subscriptions
            .observe(Self::expression)
            .observe_all(Capability::WRITABLE, Self::record);
    }
}

impl Sequence {
    fn expression(&self, _: &Arc<AtRuleExpression>, _: &PluginContext<'_>) -> PluginResult {
        *self.expressions.lock() += 1;
        Ok(())
    }

    fn record(&self, unit: &SyntaxRef, _: &PluginContext<'_>) -> PluginResult {
        let Some(at_rule) = top_level(unit).and_then(|top| downcast::<AtRule>(&top)) else {
            return Ok(());
        };
        let pass = if at_rule.meta().position().is_synthetic() {
            &self.copies
        } else {
            &self.originals
        };
        pass.lock().push(unit.kind());
        Ok(())
    }
}

/// The top-level statement containing `unit`.
fn top_level(unit: &SyntaxRef) -> Option<SyntaxRef> {
    let mut current = Arc::clone(unit);
    loop {
        let parent = enclosing(&current)?;
        if parent.is::<Stylesheet>() {
            return Some(current);
        }
        current = parent;
    }
}

#[test]
fn copies_are_observed_like_originals() {
    let output = Pipeline::builder()
        .require::<CopyAtRules>()
        .require::<Sequence>()
        .build()
        .process(
            "@media screen{.a{color:red}}\n\
             .b{margin:0}\n\
             @media print{.c{top:0;left:0} .d{top:1px}}",
        )
        .expect("processed");

    assert!(!output.has_errors(), "{}", output.summarize());
    assert_eq!(output.stylesheet().len(), 5);

    let sequence = output.plugin::<Sequence>().expect("registered");
    let originals = sequence.originals.lock().clone();
    let copies = sequence.copies.lock().clone();
    assert!(!originals.is_empty());
    assert_eq!(originals.first(), Some(&"at-rule"));
    assert_eq!(originals, copies);
    assert_eq!(*sequence.expressions.lock(), 4);
}

/// Appends a `.x` rule after every rule read from source.
#[derive(Default)]
struct AppendRule;

impl Plugin for AppendRule {
    fn subscribe(&self, subscriptions: &mut Subscriptions<Self>) {
        subscriptions.rework(Self::append);
    }
}

impl AppendRule {
    fn append(&self, rule: &Arc<Rule>, _: &PluginContext<'_>) -> PluginResult {
        if rule.meta().position().is_synthetic() {
            return Ok(());
        }
        let top = PropertyValue::new(vec![NumericalValue::new(0.0, None)]);
        rule.append(Rule::with(
            vec![Selector::from_parts(vec![ClassSelector::new("x")])],
            vec![Declaration::new("top", top)],
        ))?;
        Ok(())
    }
}

#[derive(Default)]
struct RuleOrder {
    seen: Mutex<Vec<String>>,
}

impl Plugin for RuleOrder {
    fn subscribe(&self, subscriptions: &mut Subscriptions<Self>) {
        subscriptions.observe(Self::rule);
    }
}

impl RuleOrder {
    fn rule(&self, rule: &Arc<Rule>, _: &PluginContext<'_>) -> PluginResult {
        self.seen.lock().push(to_css(&**rule, WriterMode::Compressed));
        Ok(())
    }
}

#[test]
fn synthesized_sibling_precedes_later_source() {
    let output = Pipeline::builder()
        .require::<AppendRule>()
        .require::<RuleOrder>()
        .build()
        .process(".a{top:0} .b{top:0}")
        .expect("processed");

    assert_eq!(output.css(), ".a{top:0} .x{top:0} .b{top:0} .x{top:0}");
    let order = output.plugin::<RuleOrder>().expect("registered");
    assert_eq!(
        *order.seen.lock(),
        [".a{top:0}", ".x{top:0}", ".b{top:0}", ".x{top:0}"]
    );
}
