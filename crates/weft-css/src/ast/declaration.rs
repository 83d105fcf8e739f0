//! Declarations and their values.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::RwLock;
use weft_core::{
    broadcast_unit, refine_unit, Capability, Content, GroupLink, Groupable, Interest, RawSpan,
    Refinable, RefineState, Refinement, Result, SharedBroadcaster, SourcePosition, Syntax,
    SyntaxCollection, SyntaxMeta, SyntaxRef,
};

use super::term::write_terms;
use super::{
    siblings, FunctionValue, HexColorValue, KeywordValue, NumericalValue, OperatorTerm,
    StringValue, Term, UrlValue, TERM,
};
use crate::writer::{StyleWriter, Writable};

/// A `property: value` pair.
///
/// The property name is always available. The value starts raw when read
/// from source and becomes a [`PropertyValue`] once refined.
#[derive(Debug)]
pub struct Declaration {
    meta: SyntaxMeta,
    link: GroupLink,
    state: RefineState,
    property: String,
    important: AtomicBool,
    value: RwLock<Content<Arc<PropertyValue>>>,
    this: Weak<Declaration>,
}

impl Declaration {
    /// A declaration read from source with an unparsed value.
    pub fn raw(
        property: impl Into<String>,
        value: RawSpan,
        important: bool,
        position: SourcePosition,
    ) -> Arc<Self> {
        Self::build(
            property.into(),
            SyntaxMeta::new(position),
            RefineState::pending(),
            important,
            Content::Raw(value),
        )
    }

    /// A refined declaration built by code.
    pub fn new(property: impl Into<String>, value: Arc<PropertyValue>) -> Arc<Self> {
        Self::build(
            property.into(),
            SyntaxMeta::synthetic(),
            RefineState::refined(),
            false,
            Content::Refined(value),
        )
    }

    fn build(
        property: String,
        meta: SyntaxMeta,
        state: RefineState,
        important: bool,
        value: Content<Arc<PropertyValue>>,
    ) -> Arc<Self> {
        Arc::new_cyclic(|this: &Weak<Declaration>| {
            if let Content::Refined(value) = &value {
                value.set_owner(this.clone());
            }
            Self {
                meta,
                link: GroupLink::new(),
                state,
                property,
                important: AtomicBool::new(important),
                value: RwLock::new(value),
                this: this.clone(),
            }
        })
    }

    /// The property name as written.
    pub fn property(&self) -> &str {
        &self.property
    }

    /// Whether the property name matches `name`, ignoring ASCII case.
    pub fn is_property(&self, name: &str) -> bool {
        self.property.eq_ignore_ascii_case(name)
    }

    /// Whether the declaration carries `!important`.
    pub fn is_important(&self) -> bool {
        self.important.load(Ordering::Acquire)
    }

    /// Set or clear `!important`.
    pub fn set_important(&self, important: bool) {
        self.important.store(important, Ordering::Release);
    }

    /// The unparsed value, while still raw.
    pub fn raw_value(&self) -> Option<RawSpan> {
        self.value.read().raw().cloned()
    }

    /// Refine the value if that has not been attempted yet.
    pub fn refine(&self) -> Result<Refinement> {
        match self.this.upgrade() {
            Some(this) => refine_unit(&this.into_syntax()),
            None => Ok(Refinement::None),
        }
    }

    /// The structured value, refining first if needed.
    ///
    /// `None` when no refiner could expand the value.
    pub fn value(&self) -> Result<Option<Arc<PropertyValue>>> {
        self.refine()?;
        Ok(self.refined_value())
    }

    /// The structured value, without triggering refinement.
    pub fn refined_value(&self) -> Option<Arc<PropertyValue>> {
        self.value.read().refined().cloned()
    }

    /// Replace the value.
    ///
    /// The value is not announced; the caller broadcasts it if the
    /// declaration already was.
    pub fn set_value(&self, value: Arc<PropertyValue>) {
        value.set_owner(self.this.clone());
        *self.value.write() = Content::Refined(value);
        self.state.settle(Refinement::Full);
    }

    /// Replace the value and announce it through the declaration's
    /// broadcaster, if it has one.
    pub fn replace_value(&self, value: Arc<PropertyValue>) {
        self.set_value(Arc::clone(&value));
        if let Some(broadcaster) = self.meta.broadcaster() {
            broadcast_unit(&value.into_syntax(), &broadcaster);
        }
    }

    /// Insert `declaration` before this one.
    pub fn prepend(&self, declaration: Arc<Declaration>) -> Result<()> {
        siblings::<Declaration>(self, "prepend")?.insert_before(self, declaration)
    }

    /// Insert `declaration` after this one.
    pub fn append(&self, declaration: Arc<Declaration>) -> Result<()> {
        siblings::<Declaration>(self, "append")?.insert_after(self, declaration)
    }

    /// A deep copy with a synthetic position. A raw value stays raw.
    pub fn duplicate(&self) -> Arc<Declaration> {
        self.duplicate_as(self.property.clone())
    }

    /// A deep copy under a different property name.
    pub fn duplicate_as(&self, property: impl Into<String>) -> Arc<Declaration> {
        let (state, value) = match &*self.value.read() {
            Content::Raw(span) => (RefineState::pending(), Content::Raw(span.clone())),
            Content::Refined(value) => (RefineState::refined(), Content::Refined(value.duplicate())),
        };
        Self::build(
            property.into(),
            SyntaxMeta::synthetic(),
            state,
            self.is_important(),
            value,
        )
    }
}

impl Syntax for Declaration {
    weft_core::impl_syntax_basics!();

    fn kind(&self) -> &'static str {
        "declaration"
    }

    fn capabilities(&self) -> &'static [Capability] {
        &[
            Capability::WRITABLE,
            Capability::REFINABLE,
            Capability::GROUPABLE,
        ]
    }

    fn as_refinable(&self) -> Option<&dyn Refinable> {
        Some(self)
    }

    fn as_groupable(&self) -> Option<&dyn Groupable> {
        Some(self)
    }

    fn children(&self) -> Vec<SyntaxRef> {
        self.refined_value()
            .map(|value| vec![value.into_syntax()])
            .unwrap_or_default()
    }

    fn propagate_broadcast(&self, broadcaster: &SharedBroadcaster) {
        if let Some(value) = self.refined_value() {
            broadcast_unit(&value.into_syntax(), broadcaster);
        }
    }
}

impl Refinable for Declaration {
    fn refine_state(&self) -> &RefineState {
        &self.state
    }

    fn refined_interests(&self) -> Vec<Interest> {
        vec![
            Interest::of::<PropertyValue>(),
            Interest::capability(TERM),
            Interest::of::<KeywordValue>(),
            Interest::of::<NumericalValue>(),
            Interest::of::<StringValue>(),
            Interest::of::<HexColorValue>(),
            Interest::of::<FunctionValue>(),
            Interest::of::<UrlValue>(),
            Interest::of::<OperatorTerm>(),
        ]
    }
}

impl Groupable for Declaration {
    fn group_link(&self) -> &GroupLink {
        &self.link
    }
}

impl Writable for Declaration {
    fn write(&self, writer: &mut StyleWriter) {
        writer.write_str(&self.property);
        writer.write_char(':');
        writer.space();
        match &*self.value.read() {
            Content::Raw(span) => writer.write_raw(span),
            Content::Refined(value) => value.write(writer),
        }
        if self.is_important() {
            writer.space();
            writer.write_str("!important");
        }
    }
}

/// The refined value of a declaration: an ordered list of terms.
#[derive(Debug)]
pub struct PropertyValue {
    meta: SyntaxMeta,
    terms: Arc<SyntaxCollection<dyn Term>>,
    owner: RwLock<Option<Weak<Declaration>>>,
}

impl PropertyValue {
    /// A value built by code.
    pub fn new(terms: Vec<Arc<dyn Term>>) -> Arc<Self> {
        Self::at(terms, SourcePosition::SYNTHETIC)
    }

    /// A value read at `position`.
    pub fn at(terms: Vec<Arc<dyn Term>>, position: SourcePosition) -> Arc<Self> {
        Arc::new_cyclic(|this: &Weak<PropertyValue>| {
            let owner: Weak<dyn Syntax> = this.clone();
            let list = SyntaxCollection::new(owner);
            list.append_all(terms);
            Self {
                meta: SyntaxMeta::new(position),
                terms: list,
                owner: RwLock::new(None),
            }
        })
    }

    /// The terms, separators included.
    pub fn terms(&self) -> &Arc<SyntaxCollection<dyn Term>> {
        &self.terms
    }

    /// The declaration this value belongs to.
    pub fn declaration(&self) -> Option<Arc<Declaration>> {
        self.owner.read().as_ref().and_then(Weak::upgrade)
    }

    /// A deep copy with a synthetic position and no owner.
    pub fn duplicate(&self) -> Arc<PropertyValue> {
        Self::new(self.terms.iter().map(|term| term.duplicate()).collect())
    }

    fn set_owner(&self, owner: Weak<Declaration>) {
        *self.owner.write() = Some(owner);
    }
}

impl Syntax for PropertyValue {
    weft_core::impl_syntax_basics!();

    fn kind(&self) -> &'static str {
        "property-value"
    }

    fn capabilities(&self) -> &'static [Capability] {
        &[Capability::WRITABLE]
    }

    fn children(&self) -> Vec<SyntaxRef> {
        self.terms.units()
    }

    fn owner(&self) -> Option<SyntaxRef> {
        self.declaration().map(|d| d.into_syntax())
    }

    fn is_attached(&self) -> bool {
        self.declaration()
            .and_then(|d| d.refined_value())
            .is_some_and(|value| value.meta().id() == self.meta().id())
    }

    fn propagate_broadcast(&self, broadcaster: &SharedBroadcaster) {
        self.terms.propagate_broadcast(broadcaster);
    }
}

impl Writable for PropertyValue {
    fn write(&self, writer: &mut StyleWriter) {
        write_terms(&self.terms, writer);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::writer::{to_css, WriterMode};

    fn margin() -> Arc<Declaration> {
        let value = PropertyValue::new(vec![
            NumericalValue::new(0.0, None),
            KeywordValue::new("auto"),
        ]);
        Declaration::new("margin", value)
    }

    #[test]
    fn writes_important_per_mode() {
        let declaration = margin();
        declaration.set_important(true);
        assert_eq!(
            to_css(declaration.as_ref(), WriterMode::Compressed),
            "margin:0 auto!important"
        );
        assert_eq!(
            to_css(declaration.as_ref(), WriterMode::Inline),
            "margin: 0 auto !important"
        );
    }

    #[test]
    fn raw_value_is_written_trimmed() {
        let declaration = Declaration::raw(
            "color",
            RawSpan::new(" red  ", SourcePosition::new(1, 8)),
            false,
            SourcePosition::new(1, 2),
        );
        assert_eq!(to_css(declaration.as_ref(), WriterMode::Inline), "color: red");
        assert!(declaration.refined_value().is_none());
    }

    #[test]
    fn value_knows_its_declaration() {
        let declaration = margin();
        let value = declaration.refined_value().expect("refined");
        let owner = value.declaration().expect("owner");
        assert!(Arc::ptr_eq(&owner, &declaration));
    }

    #[test]
    fn duplicate_as_renames_and_copies_terms() {
        let original = margin();
        let copy = original.duplicate_as("margin-top");
        assert_eq!(copy.property(), "margin-top");
        assert_eq!(to_css(copy.as_ref(), WriterMode::Compressed), "margin-top:0 auto");

        let copied = copy.refined_value().expect("refined");
        let source = original.refined_value().expect("refined");
        assert!(!Arc::ptr_eq(&copied, &source));
        assert!(copied.declaration().is_some_and(|d| Arc::ptr_eq(&d, &copy)));
    }

    #[test]
    fn duplicate_of_raw_stays_raw() {
        let declaration = Declaration::raw(
            "color",
            RawSpan::new("red", SourcePosition::new(1, 8)),
            true,
            SourcePosition::new(1, 2),
        );
        let copy = declaration.duplicate();
        assert!(copy.raw_value().is_some());
        assert!(copy.is_important());
        assert!(!copy.refine_state().is_attempted());
    }

    #[test]
    fn set_value_on_raw_declaration_settles_it() {
        let declaration = Declaration::raw(
            "color",
            RawSpan::new("red", SourcePosition::new(1, 8)),
            false,
            SourcePosition::new(1, 2),
        );
        declaration.set_value(PropertyValue::new(vec![KeywordValue::new("blue")]));
        assert!(declaration.refine_state().is_refined());
        assert_eq!(to_css(declaration.as_ref(), WriterMode::Compressed), "color:blue");
    }

    #[test]
    fn sibling_insertion() {
        let rule = crate::ast::Rule::with(Vec::new(), vec![margin()]);
        let first = rule.declarations().first().expect("declaration");
        first.prepend(first.duplicate_as("margin-top")).expect("attached");
        let names: Vec<String> = rule
            .declarations()
            .iter()
            .map(|d| d.property().to_string())
            .collect();
        assert_eq!(names, ["margin-top", "margin"]);
    }
}
