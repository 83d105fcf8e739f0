use std::sync::{Arc, Weak};

use weft_core::{
    Capability, GroupLink, Groupable, Result, SharedBroadcaster, SourcePosition, Syntax,
    SyntaxCollection, SyntaxMeta, SyntaxRef,
};

use super::{siblings, Declaration, Selector, Statement, STATEMENT};
use crate::writer::{StyleWriter, Writable};

/// A style rule: `selectors { declarations }`.
#[derive(Debug)]
pub struct Rule {
    meta: SyntaxMeta,
    link: GroupLink,
    selectors: Arc<SyntaxCollection<Selector>>,
    declarations: Arc<SyntaxCollection<Declaration>>,
}

impl Rule {
    /// An empty rule built by code.
    pub fn new() -> Arc<Self> {
        Self::at(SourcePosition::SYNTHETIC)
    }

    /// An empty rule starting at `position`.
    pub fn at(position: SourcePosition) -> Arc<Self> {
        Arc::new_cyclic(|this: &Weak<Rule>| {
            let owner: Weak<dyn Syntax> = this.clone();
            Self {
                meta: SyntaxMeta::new(position),
                link: GroupLink::new(),
                selectors: SyntaxCollection::new(owner.clone()),
                declarations: SyntaxCollection::new(owner),
            }
        })
    }

    /// A rule built by code from selectors and declarations.
    pub fn with(selectors: Vec<Arc<Selector>>, declarations: Vec<Arc<Declaration>>) -> Arc<Self> {
        let rule = Self::new();
        rule.selectors.append_all(selectors);
        rule.declarations.append_all(declarations);
        rule
    }

    /// The rule's selectors.
    pub fn selectors(&self) -> &Arc<SyntaxCollection<Selector>> {
        &self.selectors
    }

    /// The rule's declarations.
    pub fn declarations(&self) -> &Arc<SyntaxCollection<Declaration>> {
        &self.declarations
    }

    /// Insert `statement` before this rule.
    pub fn prepend(&self, statement: Arc<dyn Statement>) -> Result<()> {
        siblings::<dyn Statement>(self, "prepend")?.insert_before(self, statement)
    }

    /// Insert `statement` after this rule.
    pub fn append(&self, statement: Arc<dyn Statement>) -> Result<()> {
        siblings::<dyn Statement>(self, "append")?.insert_after(self, statement)
    }
}

impl Syntax for Rule {
    weft_core::impl_syntax_basics!();

    fn kind(&self) -> &'static str {
        "rule"
    }

    fn capabilities(&self) -> &'static [Capability] {
        &[Capability::WRITABLE, Capability::GROUPABLE, STATEMENT]
    }

    fn as_groupable(&self) -> Option<&dyn Groupable> {
        Some(self)
    }

    fn children(&self) -> Vec<SyntaxRef> {
        let mut children = self.selectors.units();
        children.extend(self.declarations.units());
        children
    }

    fn propagate_broadcast(&self, broadcaster: &SharedBroadcaster) {
        self.selectors.propagate_broadcast(broadcaster);
        self.declarations.propagate_broadcast(broadcaster);
    }
}

impl Groupable for Rule {
    fn group_link(&self) -> &GroupLink {
        &self.link
    }
}

impl Statement for Rule {
    fn is_writable(&self) -> bool {
        !self.selectors.is_empty() && !self.declarations.is_empty()
    }

    fn duplicate(&self) -> Arc<dyn Statement> {
        Rule::with(
            self.selectors.iter().map(|s| s.duplicate()).collect(),
            self.declarations.iter().map(|d| d.duplicate()).collect(),
        )
    }
}

impl Writable for Rule {
    fn write(&self, writer: &mut StyleWriter) {
        for (i, selector) in self.selectors.iter().enumerate() {
            if i > 0 {
                writer.comma();
            }
            selector.write(writer);
        }
        writer.write_declarations(&self.declarations.to_vec());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{ClassSelector, KeywordValue, PropertyValue, Stylesheet};
    use crate::writer::{to_css, WriterMode};

    fn color_rule() -> Arc<Rule> {
        let value = PropertyValue::new(vec![KeywordValue::new("red")]);
        Rule::with(
            vec![Selector::from_parts(vec![ClassSelector::new("a")])],
            vec![Declaration::new("color", value)],
        )
    }

    #[test]
    fn writable_needs_selector_and_declaration() {
        assert!(!Rule::new().is_writable());
        assert!(color_rule().is_writable());

        let selectors_only = Rule::with(
            vec![Selector::from_parts(vec![ClassSelector::new("a")])],
            Vec::new(),
        );
        assert!(!selectors_only.is_writable());
    }

    #[test]
    fn writes_in_each_mode() {
        let rule = color_rule();
        assert_eq!(to_css(rule.as_ref(), WriterMode::Compressed), ".a{color:red}");
        assert_eq!(to_css(rule.as_ref(), WriterMode::Inline), ".a { color: red; }");
        assert_eq!(
            to_css(rule.as_ref(), WriterMode::Verbose),
            ".a {\n  color: red;\n}"
        );
    }

    #[test]
    fn sibling_insertion_requires_a_group() {
        let rule = color_rule();
        assert!(rule.prepend(Rule::new()).is_err());

        let sheet = Stylesheet::new();
        sheet.append(Arc::clone(&rule) as Arc<dyn Statement>);
        rule.prepend(color_rule()).expect("attached");
        rule.append(Rule::new()).expect("attached");
        assert_eq!(sheet.len(), 3);
        assert_eq!(rule.index(), Some(1));
    }

    #[test]
    fn duplicate_is_detached_and_synthetic() {
        let rule = color_rule();
        let copy = rule.duplicate();
        assert!(copy.parent().is_none());
        assert!(copy.meta().position().is_synthetic());
        assert_ne!(copy.meta().id(), rule.meta().id());
        assert_eq!(to_css(copy.as_ref(), WriterMode::Compressed), ".a{color:red}");
    }
}
