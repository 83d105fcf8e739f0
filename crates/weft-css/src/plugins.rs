//! Bundled plugins.

use std::sync::Arc;

use weft_core::{ErrorLevel, Plugin, PluginContext, PluginResult, Subscriptions, Syntax};

use crate::ast::{AtRule, Declaration, Selector};

/// Refines units as soon as they are created instead of on demand.
///
/// Useful when the written output should be normalized even where no
/// plugin looks at the refined form. Failures are reported once, as the
/// refinement error itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AutoRefine {
    selectors: bool,
    declarations: bool,
    at_rules: bool,
}

impl AutoRefine {
    /// Refine selectors, declarations and at-rules.
    pub fn all() -> Self {
        Self {
            selectors: true,
            declarations: true,
            at_rules: true,
        }
    }

    /// Refine selectors only.
    pub fn selectors() -> Self {
        Self {
            selectors: true,
            declarations: false,
            at_rules: false,
        }
    }

    /// Refine declarations only.
    pub fn declarations() -> Self {
        Self {
            selectors: false,
            declarations: true,
            at_rules: false,
        }
    }

    /// Refine at-rules only.
    pub fn at_rules() -> Self {
        Self {
            selectors: false,
            declarations: false,
            at_rules: true,
        }
    }
}

impl Default for AutoRefine {
    fn default() -> Self {
        Self::all()
    }
}

impl Plugin for AutoRefine {
    fn subscribe(&self, subscriptions: &mut Subscriptions<Self>) {
        if self.selectors {
            subscriptions.observe(force::<Selector>);
        }
        if self.declarations {
            subscriptions.observe(force::<Declaration>);
        }
        if self.at_rules {
            subscriptions.observe(force::<AtRule>);
        }
    }
}

fn force<T: Syntax>(_: &AutoRefine, unit: &Arc<T>, cx: &PluginContext<'_>) -> PluginResult {
    let attempted = unit
        .as_refinable()
        .is_some_and(|r| r.refine_state().is_attempted());
    if attempted {
        return Ok(());
    }
    if let Err(err) = cx.refine(&Arc::clone(unit).into_syntax()) {
        cx.errors().report_error(ErrorLevel::Fatal, err);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Pipeline, WriterMode};

    #[test]
    fn refines_everything_when_requested() {
        let output = Pipeline::builder()
            .mode(WriterMode::Inline)
            .plugin(|registry| registry.register(AutoRefine::all()).map(drop))
            .build()
            .process("a  >  b{margin:0   auto}")
            .expect("processed");

        let rule = output.stylesheet().statements().first().expect("statement");
        assert!(rule.children().iter().all(|unit| unit.is_refined()));
        assert_eq!(output.css(), "a > b { margin: 0 auto; }");
    }

    #[test]
    fn selective_refinement_leaves_the_rest_raw() {
        let output = Pipeline::builder()
            .plugin(|registry| registry.register(AutoRefine::selectors()).map(drop))
            .build()
            .process(".a{color:red}")
            .expect("processed");

        let rule = output.stylesheet().statements().first().expect("statement");
        let kinds: Vec<(&str, bool)> = rule
            .children()
            .iter()
            .map(|unit| (unit.kind(), unit.is_refined()))
            .collect();
        assert_eq!(kinds, [("selector", true), ("declaration", false)]);
    }

    #[test]
    fn parse_failures_are_reported_once() {
        let output = Pipeline::builder()
            .plugin(|registry| registry.register(AutoRefine::declarations()).map(drop))
            .build()
            .process(".a{color:[red]}")
            .expect("processed");

        assert!(output.has_errors());
        assert_eq!(output.errors().reports().len(), 1);
    }
}
