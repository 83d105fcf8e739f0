//! At-rules: `@media`, `@font-face`, `@import` and the like.
//!
//! An at-rule has two independently refined portions: the expression
//! between the name and the block, and the block itself. Each refiner
//! expands one portion and reports [`Refinement::Partial`].

use std::sync::{Arc, Weak};

use parking_lot::RwLock;
use weft_core::{
    broadcast_unit, refine_unit, Capability, Content, GroupLink, Groupable, Interest, RawSpan,
    Refinable, RefineState, Refinement, Result, SharedBroadcaster, SourcePosition, Syntax,
    SyntaxCollection, SyntaxMeta, SyntaxRef,
};

use super::{siblings, Declaration, Statement, STATEMENT};
use crate::writer::{StyleWriter, Writable};

/// The refined block of an at-rule.
#[derive(Debug, Clone)]
pub enum AtRuleBlock {
    /// Nested rules and at-rules, as in `@media`.
    Statements(Arc<SyntaxCollection<dyn Statement>>),
    /// Declarations, as in `@font-face`.
    Declarations(Arc<SyntaxCollection<Declaration>>),
}

impl AtRuleBlock {
    /// The block's members as shared units.
    pub fn units(&self) -> Vec<SyntaxRef> {
        match self {
            Self::Statements(statements) => statements.units(),
            Self::Declarations(declarations) => declarations.units(),
        }
    }

    /// Announce the block's members through `broadcaster`.
    pub fn propagate_broadcast(&self, broadcaster: &SharedBroadcaster) {
        match self {
            Self::Statements(statements) => statements.propagate_broadcast(broadcaster),
            Self::Declarations(declarations) => declarations.propagate_broadcast(broadcaster),
        }
    }

    fn write(&self, writer: &mut StyleWriter) {
        match self {
            Self::Statements(statements) => writer.write_statements(&statements.to_vec()),
            Self::Declarations(declarations) => writer.write_declarations(&declarations.to_vec()),
        }
    }
}

/// Members for a new at-rule block.
#[derive(Debug)]
pub enum BlockItems {
    /// Nested statements.
    Statements(Vec<Arc<dyn Statement>>),
    /// Declarations.
    Declarations(Vec<Arc<Declaration>>),
}

impl BlockItems {
    fn into_block(self, owner: Weak<dyn Syntax>) -> AtRuleBlock {
        match self {
            Self::Statements(items) => {
                let list = SyntaxCollection::new(owner);
                list.append_all(items);
                AtRuleBlock::Statements(list)
            }
            Self::Declarations(items) => {
                let list = SyntaxCollection::new(owner);
                list.append_all(items);
                AtRuleBlock::Declarations(list)
            }
        }
    }
}

/// An `@name expression { block }` or `@name expression;` statement.
#[derive(Debug)]
pub struct AtRule {
    meta: SyntaxMeta,
    link: GroupLink,
    state: RefineState,
    name: String,
    expression: RwLock<Option<Content<Arc<AtRuleExpression>>>>,
    block: RwLock<Option<Content<AtRuleBlock>>>,
    this: Weak<AtRule>,
}

impl AtRule {
    /// An at-rule read from source with unparsed portions.
    pub fn raw(
        name: impl Into<String>,
        expression: Option<RawSpan>,
        block: Option<RawSpan>,
        position: SourcePosition,
    ) -> Arc<Self> {
        let name = name.into();
        Arc::new_cyclic(|this: &Weak<AtRule>| Self {
            meta: SyntaxMeta::new(position),
            link: GroupLink::new(),
            state: RefineState::pending(),
            name,
            expression: RwLock::new(expression.map(Content::Raw)),
            block: RwLock::new(block.map(Content::Raw)),
            this: this.clone(),
        })
    }

    /// A refined at-rule built by code.
    pub fn new(
        name: impl Into<String>,
        expression: Option<Arc<AtRuleExpression>>,
        block: Option<BlockItems>,
    ) -> Arc<Self> {
        let name = name.into();
        Arc::new_cyclic(|this: &Weak<AtRule>| {
            let owner: Weak<dyn Syntax> = this.clone();
            if let Some(expression) = &expression {
                expression.set_owner(this.clone());
            }
            Self {
                meta: SyntaxMeta::synthetic(),
                link: GroupLink::new(),
                state: RefineState::refined(),
                name,
                expression: RwLock::new(expression.map(Content::Refined)),
                block: RwLock::new(block.map(|items| Content::Refined(items.into_block(owner)))),
                this: this.clone(),
            }
        })
    }

    /// The name without `@`.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether the at-rule has a `{}` block.
    pub fn has_block(&self) -> bool {
        self.block.read().is_some()
    }

    /// The unparsed expression, while still raw.
    pub fn raw_expression(&self) -> Option<RawSpan> {
        self.expression.read().as_ref().and_then(|c| c.raw().cloned())
    }

    /// The unparsed block content, while still raw.
    pub fn raw_block(&self) -> Option<RawSpan> {
        self.block.read().as_ref().and_then(|c| c.raw().cloned())
    }

    /// Refine both portions if that has not been attempted yet.
    pub fn refine(&self) -> Result<Refinement> {
        match self.this.upgrade() {
            Some(this) => refine_unit(&this.into_syntax()),
            None => Ok(Refinement::None),
        }
    }

    /// The refined expression, refining first if needed.
    pub fn expression(&self) -> Result<Option<Arc<AtRuleExpression>>> {
        self.refine()?;
        Ok(self.refined_expression())
    }

    /// The refined block, refining first if needed.
    pub fn block(&self) -> Result<Option<AtRuleBlock>> {
        self.refine()?;
        Ok(self.refined_block())
    }

    /// The refined expression, without triggering refinement.
    pub fn refined_expression(&self) -> Option<Arc<AtRuleExpression>> {
        self.expression.read().as_ref().and_then(|c| c.refined().cloned())
    }

    /// The refined block, without triggering refinement.
    pub fn refined_block(&self) -> Option<AtRuleBlock> {
        self.block.read().as_ref().and_then(|c| c.refined().cloned())
    }

    /// Replace the expression. Not announced.
    pub fn set_expression(&self, expression: Arc<AtRuleExpression>) {
        expression.set_owner(self.this.clone());
        *self.expression.write() = Some(Content::Refined(expression));
        self.settle_if_complete();
    }

    /// Replace the block content, returning the new block. Not announced.
    pub fn set_block(&self, items: BlockItems) -> AtRuleBlock {
        let owner: Weak<dyn Syntax> = self.this.clone();
        let block = items.into_block(owner);
        *self.block.write() = Some(Content::Refined(block.clone()));
        self.settle_if_complete();
        block
    }

    fn settle_if_complete(&self) {
        let expression_raw = self.expression.read().as_ref().is_some_and(Content::is_raw);
        let block_raw = self.block.read().as_ref().is_some_and(Content::is_raw);
        if !expression_raw && !block_raw {
            self.state.settle(Refinement::Full);
        }
    }

    /// Insert `statement` before this at-rule.
    pub fn prepend(&self, statement: Arc<dyn Statement>) -> Result<()> {
        siblings::<dyn Statement>(self, "prepend")?.insert_before(self, statement)
    }

    /// Insert `statement` after this at-rule.
    pub fn append(&self, statement: Arc<dyn Statement>) -> Result<()> {
        siblings::<dyn Statement>(self, "append")?.insert_after(self, statement)
    }

    /// A deep copy with a synthetic position. Raw portions stay raw and
    /// are refined again when the copy is.
    pub fn duplicate(&self) -> Arc<AtRule> {
        let expression = self.expression.read().clone();
        let block = self.block.read().clone();
        let refined = self.state.is_attempted()
            && !expression.as_ref().is_some_and(Content::is_raw)
            && !block.as_ref().is_some_and(Content::is_raw);

        Arc::new_cyclic(|this: &Weak<AtRule>| {
            let owner: Weak<dyn Syntax> = this.clone();
            let expression = expression.map(|content| match content {
                Content::Raw(span) => Content::Raw(span),
                Content::Refined(expression) => {
                    let copy = expression.duplicate();
                    copy.set_owner(this.clone());
                    Content::Refined(copy)
                }
            });
            let block = block.map(|content| match content {
                Content::Raw(span) => Content::Raw(span),
                Content::Refined(block) => Content::Refined(duplicate_block(&block, owner)),
            });
            Self {
                meta: SyntaxMeta::synthetic(),
                link: GroupLink::new(),
                state: if refined {
                    RefineState::refined()
                } else {
                    RefineState::pending()
                },
                name: self.name.clone(),
                expression: RwLock::new(expression),
                block: RwLock::new(block),
                this: this.clone(),
            }
        })
    }
}

fn duplicate_block(block: &AtRuleBlock, owner: Weak<dyn Syntax>) -> AtRuleBlock {
    let items = match block {
        AtRuleBlock::Statements(statements) => {
            BlockItems::Statements(statements.iter().map(|s| s.duplicate()).collect())
        }
        AtRuleBlock::Declarations(declarations) => {
            BlockItems::Declarations(declarations.iter().map(|d| d.duplicate()).collect())
        }
    };
    items.into_block(owner)
}

impl Syntax for AtRule {
    weft_core::impl_syntax_basics!();

    fn kind(&self) -> &'static str {
        "at-rule"
    }

    fn capabilities(&self) -> &'static [Capability] {
        &[
            Capability::WRITABLE,
            Capability::REFINABLE,
            Capability::GROUPABLE,
            STATEMENT,
        ]
    }

    fn as_refinable(&self) -> Option<&dyn Refinable> {
        Some(self)
    }

    fn as_groupable(&self) -> Option<&dyn Groupable> {
        Some(self)
    }

    fn children(&self) -> Vec<SyntaxRef> {
        let mut children: Vec<SyntaxRef> = self
            .refined_expression()
            .map(|e| e.into_syntax())
            .into_iter()
            .collect();
        if let Some(block) = self.refined_block() {
            children.extend(block.units());
        }
        children
    }

    fn propagate_broadcast(&self, broadcaster: &SharedBroadcaster) {
        if let Some(expression) = self.refined_expression() {
            broadcast_unit(&expression.into_syntax(), broadcaster);
        }
        if let Some(block) = self.refined_block() {
            block.propagate_broadcast(broadcaster);
        }
    }
}

impl Refinable for AtRule {
    fn refine_state(&self) -> &RefineState {
        &self.state
    }

    fn refined_interests(&self) -> Vec<Interest> {
        vec![Interest::of::<AtRuleExpression>()]
    }
}

impl Groupable for AtRule {
    fn group_link(&self) -> &GroupLink {
        &self.link
    }
}

impl Statement for AtRule {
    fn duplicate(&self) -> Arc<dyn Statement> {
        AtRule::duplicate(self)
    }
}

impl Writable for AtRule {
    fn write(&self, writer: &mut StyleWriter) {
        writer.write_char('@');
        writer.write_str(&self.name);
        if let Some(expression) = &*self.expression.read() {
            writer.write_char(' ');
            match expression {
                Content::Raw(span) => writer.write_raw(span),
                Content::Refined(expression) => expression.write(writer),
            }
        }
        match &*self.block.read() {
            None => writer.write_char(';'),
            Some(Content::Raw(span)) => writer.write_raw_block(span),
            Some(Content::Refined(block)) => block.write(writer),
        }
    }
}

/// The refined expression of an at-rule: its comma-separated segments with
/// whitespace normalized, e.g. `screen and (min-width: 40em)`.
#[derive(Debug)]
pub struct AtRuleExpression {
    meta: SyntaxMeta,
    segments: Vec<String>,
    owner: RwLock<Option<Weak<AtRule>>>,
}

impl AtRuleExpression {
    /// An expression built by code.
    pub fn new(segments: Vec<String>) -> Arc<Self> {
        Self::at(segments, SourcePosition::SYNTHETIC)
    }

    /// An expression read at `position`.
    pub fn at(segments: Vec<String>, position: SourcePosition) -> Arc<Self> {
        Arc::new(Self {
            meta: SyntaxMeta::new(position),
            segments,
            owner: RwLock::new(None),
        })
    }

    /// The comma-separated segments.
    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    /// The at-rule this expression belongs to.
    pub fn at_rule(&self) -> Option<Arc<AtRule>> {
        self.owner.read().as_ref().and_then(Weak::upgrade)
    }

    /// A copy with a synthetic position and no owner.
    pub fn duplicate(&self) -> Arc<AtRuleExpression> {
        Self::new(self.segments.clone())
    }

    fn set_owner(&self, owner: Weak<AtRule>) {
        *self.owner.write() = Some(owner);
    }
}

impl Syntax for AtRuleExpression {
    weft_core::impl_syntax_basics!();

    fn kind(&self) -> &'static str {
        "at-rule-expression"
    }

    fn capabilities(&self) -> &'static [Capability] {
        &[Capability::WRITABLE]
    }

    fn owner(&self) -> Option<SyntaxRef> {
        self.at_rule().map(|a| a.into_syntax())
    }

    fn is_attached(&self) -> bool {
        self.at_rule()
            .and_then(|a| a.refined_expression())
            .is_some_and(|expression| expression.meta().id() == self.meta().id())
    }
}

impl Writable for AtRuleExpression {
    fn write(&self, writer: &mut StyleWriter) {
        for (i, segment) in self.segments.iter().enumerate() {
            if i > 0 {
                writer.comma();
            }
            writer.write_str(segment);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{KeywordValue, PropertyValue, Rule, Selector, TypeSelector};
    use crate::writer::{to_css, WriterMode};

    fn media() -> Arc<AtRule> {
        let rule = Rule::with(
            vec![Selector::from_parts(vec![TypeSelector::new("p")])],
            vec![Declaration::new(
                "color",
                PropertyValue::new(vec![KeywordValue::new("red")]),
            )],
        );
        AtRule::new(
            "media",
            Some(AtRuleExpression::new(vec!["screen".into(), "print".into()])),
            Some(BlockItems::Statements(vec![rule])),
        )
    }

    #[test]
    fn writes_refined_portions() {
        let at_rule = media();
        assert_eq!(
            to_css(at_rule.as_ref(), WriterMode::Compressed),
            "@media screen,print{p{color:red}}"
        );
        assert_eq!(
            to_css(at_rule.as_ref(), WriterMode::Inline),
            "@media screen, print { p { color: red; } }"
        );
        assert_eq!(
            to_css(at_rule.as_ref(), WriterMode::Verbose),
            "@media screen, print {\n  p {\n    color: red;\n  }\n}"
        );
    }

    #[test]
    fn blockless_at_rule_ends_with_semicolon() {
        let import = AtRule::raw(
            "import",
            Some(RawSpan::new("url(a.css)  screen", SourcePosition::new(1, 9))),
            None,
            SourcePosition::new(1, 1),
        );
        assert_eq!(
            to_css(import.as_ref(), WriterMode::Compressed),
            "@import url(a.css) screen;"
        );
        assert!(!import.has_block());
    }

    #[test]
    fn expression_knows_its_at_rule() {
        let at_rule = media();
        let expression = at_rule.refined_expression().expect("refined");
        assert!(expression.at_rule().is_some_and(|a| Arc::ptr_eq(&a, &at_rule)));
    }

    #[test]
    fn setting_both_portions_settles_refinement() {
        let at_rule = AtRule::raw(
            "font-face",
            None,
            Some(RawSpan::new("font-family: x", SourcePosition::new(1, 12))),
            SourcePosition::new(1, 1),
        );
        assert!(!at_rule.refine_state().is_attempted());
        at_rule.set_block(BlockItems::Declarations(Vec::new()));
        assert!(at_rule.refine_state().is_refined());
    }

    #[test]
    fn duplicate_of_raw_stays_raw() {
        let at_rule = AtRule::raw(
            "media",
            Some(RawSpan::new("screen", SourcePosition::new(1, 8))),
            Some(RawSpan::new(".a{b:c}", SourcePosition::new(1, 16))),
            SourcePosition::new(1, 1),
        );
        let copy = at_rule.duplicate();
        assert!(copy.raw_expression().is_some());
        assert!(copy.raw_block().is_some());
        assert!(!copy.refine_state().is_attempted());
        assert_eq!(
            to_css(copy.as_ref(), WriterMode::Compressed),
            "@media screen{.a{b:c}}"
        );
    }

    #[test]
    fn duplicate_of_refined_copies_block() {
        let copy = media().duplicate();
        let Some(AtRuleBlock::Statements(statements)) = copy.refined_block() else {
            panic!("expected a statement block");
        };
        assert_eq!(statements.len(), 1);
        let nested = statements.first().expect("statement");
        assert!(nested.parent().is_some_and(|p| p.meta().id() == copy.meta().id()));
    }
}
