//! Refiners that expand raw selectors, declaration values and at-rules.

use std::sync::Arc;

use weft_core::{
    Plugin, RefineContext, Refinement, Result, Subscriptions, Syntax, SyntaxRef,
};

use crate::ast::{AtRule, AtRuleExpression, BlockItems, Declaration, PropertyValue, Selector};
use crate::grammar;

/// The refiners every pipeline installs.
///
/// Each refiner runs at most once per unit, either because a subscription
/// needs the refined form or because code asked for it through an accessor
/// such as [`Selector::parts`].
#[derive(Debug, Default)]
pub struct StandardRefiners;

impl Plugin for StandardRefiners {
    fn subscribe(&self, subscriptions: &mut Subscriptions<Self>) {
        subscriptions
            .refine(Self::selector)
            .refine(Self::declaration)
            .refine(Self::at_rule_expression)
            .refine(Self::at_rule_block);
    }
}

impl StandardRefiners {
    fn selector(&self, selector: &Arc<Selector>, cx: &RefineContext<'_>) -> Result<Refinement> {
        let Some(span) = selector.raw_span() else {
            return Ok(Refinement::None);
        };
        let parts = selector.set_parts(grammar::parse_selector_parts(&span)?);
        adopt_all(cx, &parts.units());
        if let Some(broadcaster) = cx.broadcaster() {
            parts.propagate_broadcast(broadcaster);
        }
        Ok(Refinement::Full)
    }

    fn declaration(
        &self,
        declaration: &Arc<Declaration>,
        cx: &RefineContext<'_>,
    ) -> Result<Refinement> {
        let Some(span) = declaration.raw_value() else {
            return Ok(Refinement::None);
        };
        let value = PropertyValue::at(grammar::parse_terms(&span)?, span.position());
        declaration.set_value(Arc::clone(&value));
        cx.broadcast(&value.into_syntax());
        Ok(Refinement::Full)
    }

    fn at_rule_expression(
        &self,
        at_rule: &Arc<AtRule>,
        cx: &RefineContext<'_>,
    ) -> Result<Refinement> {
        let Some(span) = at_rule.raw_expression() else {
            return Ok(Refinement::None);
        };
        let expression = AtRuleExpression::at(grammar::parse_expression(&span)?, span.position());
        at_rule.set_expression(Arc::clone(&expression));
        cx.broadcast(&expression.into_syntax());
        Ok(Refinement::Partial)
    }

    fn at_rule_block(&self, at_rule: &Arc<AtRule>, cx: &RefineContext<'_>) -> Result<Refinement> {
        let Some(span) = at_rule.raw_block() else {
            return Ok(Refinement::None);
        };
        let items = if grammar::block_holds_declarations(at_rule.name()) {
            BlockItems::Declarations(grammar::parse_declarations(&span)?)
        } else {
            BlockItems::Statements(grammar::parse_statements(&span)?)
        };
        let block = at_rule.set_block(items);
        adopt_all(cx, &block.units());
        if let Some(broadcaster) = cx.broadcaster() {
            block.propagate_broadcast(broadcaster);
        }
        Ok(Refinement::Partial)
    }
}

/// Let `units` and their descendants be refined on demand, even when
/// nothing announces them.
fn adopt_all(cx: &RefineContext<'_>, units: &[SyntaxRef]) {
    for unit in units {
        cx.adopt(unit.as_ref());
        adopt_all(cx, &unit.children());
    }
}
