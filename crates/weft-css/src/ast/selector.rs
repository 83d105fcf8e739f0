//! Selectors and the parts a refined selector is made of.

use std::sync::{Arc, Weak};

use parking_lot::RwLock;
use weft_core::{
    refine_unit, Capability, Content, GroupLink, Groupable, Interest, RawSpan, Refinable,
    RefineState, Refinement, Result, SharedBroadcaster, SourcePosition, Syntax, SyntaxCollection,
    SyntaxMeta, SyntaxRef,
};

use super::{siblings, SELECTOR_PART};
use crate::writer::{StyleWriter, Writable};

type Parts = Arc<SyntaxCollection<dyn SelectorPart>>;

/// One complex selector of a rule (the rule `.a, .b {}` has two).
///
/// Read from source, a selector holds its raw text until something needs
/// its parts. Built by code, it is refined from the start.
#[derive(Debug)]
pub struct Selector {
    meta: SyntaxMeta,
    link: GroupLink,
    state: RefineState,
    content: RwLock<Content<Parts>>,
    this: Weak<Selector>,
}

impl Selector {
    /// A raw selector read from source.
    pub fn raw(span: RawSpan) -> Arc<Self> {
        let meta = SyntaxMeta::new(span.position());
        Self::build(meta, RefineState::pending(), |_| Content::Raw(span))
    }

    /// A refined selector built by code.
    pub fn from_parts(parts: Vec<Arc<dyn SelectorPart>>) -> Arc<Self> {
        Self::build(SyntaxMeta::synthetic(), RefineState::refined(), |owner| {
            Content::Refined(part_list(owner, parts))
        })
    }

    fn build(
        meta: SyntaxMeta,
        state: RefineState,
        content: impl FnOnce(Weak<dyn Syntax>) -> Content<Parts>,
    ) -> Arc<Self> {
        Arc::new_cyclic(|this: &Weak<Selector>| {
            let owner: Weak<dyn Syntax> = this.clone();
            Self {
                meta,
                link: GroupLink::new(),
                state,
                content: RwLock::new(content(owner)),
                this: this.clone(),
            }
        })
    }

    /// The unparsed text, while the selector is still raw.
    pub fn raw_span(&self) -> Option<RawSpan> {
        self.content.read().raw().cloned()
    }

    /// Refine the selector if that has not been attempted yet.
    pub fn refine(&self) -> Result<Refinement> {
        match self.this.upgrade() {
            Some(this) => refine_unit(&this.into_syntax()),
            None => Ok(Refinement::None),
        }
    }

    /// The selector's parts, refining first if needed.
    ///
    /// `None` when no refiner could expand the selector.
    pub fn parts(&self) -> Result<Option<Parts>> {
        self.refine()?;
        Ok(self.refined_parts())
    }

    /// The parts, without triggering refinement.
    pub fn refined_parts(&self) -> Option<Parts> {
        self.content.read().refined().cloned()
    }

    /// Replace the content with `parts`, returning the new part list.
    ///
    /// The parts are not announced; a refiner should propagate the returned
    /// collection through its broadcaster.
    pub fn set_parts(&self, parts: Vec<Arc<dyn SelectorPart>>) -> Parts {
        let owner: Weak<dyn Syntax> = self.this.clone();
        let list = part_list(owner, parts);
        *self.content.write() = Content::Refined(Arc::clone(&list));
        self.state.settle(Refinement::Full);
        list
    }

    /// Insert `selector` before this one.
    pub fn prepend(&self, selector: Arc<Selector>) -> Result<()> {
        siblings::<Selector>(self, "prepend")?.insert_before(self, selector)
    }

    /// Insert `selector` after this one.
    pub fn append(&self, selector: Arc<Selector>) -> Result<()> {
        siblings::<Selector>(self, "append")?.insert_after(self, selector)
    }

    /// A deep copy with a synthetic position. A raw selector stays raw.
    pub fn duplicate(&self) -> Arc<Selector> {
        match &*self.content.read() {
            Content::Raw(span) => {
                let span = span.clone();
                Self::build(SyntaxMeta::synthetic(), RefineState::pending(), |_| {
                    Content::Raw(span)
                })
            }
            Content::Refined(parts) => {
                Self::from_parts(parts.iter().map(|part| part.duplicate()).collect())
            }
        }
    }
}

fn part_list(owner: Weak<dyn Syntax>, parts: Vec<Arc<dyn SelectorPart>>) -> Parts {
    let list = SyntaxCollection::new(owner);
    list.append_all(parts);
    list
}

impl Syntax for Selector {
    weft_core::impl_syntax_basics!();

    fn kind(&self) -> &'static str {
        "selector"
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
        self.refined_parts().map(|p| p.units()).unwrap_or_default()
    }

    fn propagate_broadcast(&self, broadcaster: &SharedBroadcaster) {
        if let Some(parts) = self.refined_parts() {
            parts.propagate_broadcast(broadcaster);
        }
    }
}

impl Refinable for Selector {
    fn refine_state(&self) -> &RefineState {
        &self.state
    }

    fn refined_interests(&self) -> Vec<Interest> {
        vec![
            Interest::capability(SELECTOR_PART),
            Interest::of::<TypeSelector>(),
            Interest::of::<UniversalSelector>(),
            Interest::of::<ClassSelector>(),
            Interest::of::<IdSelector>(),
            Interest::of::<PseudoSelector>(),
            Interest::of::<AttributeSelector>(),
            Interest::of::<Combinator>(),
        ]
    }
}

impl Groupable for Selector {
    fn group_link(&self) -> &GroupLink {
        &self.link
    }
}

impl Writable for Selector {
    fn write(&self, writer: &mut StyleWriter) {
        match &*self.content.read() {
            Content::Raw(span) => writer.write_raw(span),
            Content::Refined(parts) => {
                for part in parts.iter() {
                    part.write(writer);
                }
            }
        }
    }
}

/// A piece of a refined selector.
pub trait SelectorPart: Groupable + Writable {
    /// Whether this part joins two compound selectors.
    fn is_combinator(&self) -> bool {
        false
    }

    /// A copy with a synthetic position.
    fn duplicate(&self) -> Arc<dyn SelectorPart>;
}

/// An element name, e.g. `p`.
#[derive(Debug)]
pub struct TypeSelector {
    meta: SyntaxMeta,
    link: GroupLink,
    name: String,
}

impl TypeSelector {
    /// Create a type selector built by code.
    pub fn new(name: impl Into<String>) -> Arc<Self> {
        Self::at(name, SourcePosition::SYNTHETIC)
    }

    /// Create a type selector read at `position`.
    pub fn at(name: impl Into<String>, position: SourcePosition) -> Arc<Self> {
        Arc::new(Self {
            meta: SyntaxMeta::new(position),
            link: GroupLink::new(),
            name: name.into(),
        })
    }

    /// The element name.
    pub fn name(&self) -> &str {
        &self.name
    }
}

leaf_unit!(TypeSelector, "type-selector", SELECTOR_PART);

impl SelectorPart for TypeSelector {
    fn duplicate(&self) -> Arc<dyn SelectorPart> {
        Self::new(self.name.clone())
    }
}

impl Writable for TypeSelector {
    fn write(&self, writer: &mut StyleWriter) {
        writer.write_str(&self.name);
    }
}

/// The `*` selector.
#[derive(Debug)]
pub struct UniversalSelector {
    meta: SyntaxMeta,
    link: GroupLink,
}

impl UniversalSelector {
    /// Create a universal selector built by code.
    pub fn new() -> Arc<Self> {
        Self::at(SourcePosition::SYNTHETIC)
    }

    /// Create a universal selector read at `position`.
    pub fn at(position: SourcePosition) -> Arc<Self> {
        Arc::new(Self {
            meta: SyntaxMeta::new(position),
            link: GroupLink::new(),
        })
    }
}

leaf_unit!(UniversalSelector, "universal-selector", SELECTOR_PART);

impl SelectorPart for UniversalSelector {
    fn duplicate(&self) -> Arc<dyn SelectorPart> {
        Self::new()
    }
}

impl Writable for UniversalSelector {
    fn write(&self, writer: &mut StyleWriter) {
        writer.write_char('*');
    }
}

/// A `.class` selector.
#[derive(Debug)]
pub struct ClassSelector {
    meta: SyntaxMeta,
    link: GroupLink,
    name: String,
}

impl ClassSelector {
    /// Create a class selector built by code.
    pub fn new(name: impl Into<String>) -> Arc<Self> {
        Self::at(name, SourcePosition::SYNTHETIC)
    }

    /// Create a class selector read at `position`.
    pub fn at(name: impl Into<String>, position: SourcePosition) -> Arc<Self> {
        Arc::new(Self {
            meta: SyntaxMeta::new(position),
            link: GroupLink::new(),
            name: name.into(),
        })
    }

    /// The class name without the dot.
    pub fn name(&self) -> &str {
        &self.name
    }
}

leaf_unit!(ClassSelector, "class-selector", SELECTOR_PART);

impl SelectorPart for ClassSelector {
    fn duplicate(&self) -> Arc<dyn SelectorPart> {
        Self::new(self.name.clone())
    }
}

impl Writable for ClassSelector {
    fn write(&self, writer: &mut StyleWriter) {
        writer.write_char('.');
        writer.write_str(&self.name);
    }
}

/// An `#id` selector.
#[derive(Debug)]
pub struct IdSelector {
    meta: SyntaxMeta,
    link: GroupLink,
    name: String,
}

impl IdSelector {
    /// Create an id selector built by code.
    pub fn new(name: impl Into<String>) -> Arc<Self> {
        Self::at(name, SourcePosition::SYNTHETIC)
    }

    /// Create an id selector read at `position`.
    pub fn at(name: impl Into<String>, position: SourcePosition) -> Arc<Self> {
        Arc::new(Self {
            meta: SyntaxMeta::new(position),
            link: GroupLink::new(),
            name: name.into(),
        })
    }

    /// The id without the hash.
    pub fn name(&self) -> &str {
        &self.name
    }
}

leaf_unit!(IdSelector, "id-selector", SELECTOR_PART);

impl SelectorPart for IdSelector {
    fn duplicate(&self) -> Arc<dyn SelectorPart> {
        Self::new(self.name.clone())
    }
}

impl Writable for IdSelector {
    fn write(&self, writer: &mut StyleWriter) {
        writer.write_char('#');
        writer.write_str(&self.name);
    }
}

/// A pseudo-class (`:hover`, `:nth-child(2n)`) or pseudo-element (`::before`).
#[derive(Debug)]
pub struct PseudoSelector {
    meta: SyntaxMeta,
    link: GroupLink,
    name: String,
    element: bool,
    argument: Option<String>,
}

impl PseudoSelector {
    /// A pseudo-class built by code.
    pub fn class(name: impl Into<String>) -> Arc<Self> {
        Self::at(name, false, None, SourcePosition::SYNTHETIC)
    }

    /// A pseudo-element built by code.
    pub fn element(name: impl Into<String>) -> Arc<Self> {
        Self::at(name, true, None, SourcePosition::SYNTHETIC)
    }

    /// A pseudo selector read at `position`.
    pub fn at(
        name: impl Into<String>,
        element: bool,
        argument: Option<String>,
        position: SourcePosition,
    ) -> Arc<Self> {
        Arc::new(Self {
            meta: SyntaxMeta::new(position),
            link: GroupLink::new(),
            name: name.into(),
            element,
            argument,
        })
    }

    /// The name without colons.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether this is a pseudo-element (`::`).
    pub fn is_element(&self) -> bool {
        self.element
    }

    /// The raw argument of a functional pseudo-class.
    pub fn argument(&self) -> Option<&str> {
        self.argument.as_deref()
    }
}

leaf_unit!(PseudoSelector, "pseudo-selector", SELECTOR_PART);

impl SelectorPart for PseudoSelector {
    fn duplicate(&self) -> Arc<dyn SelectorPart> {
        Self::at(
            self.name.clone(),
            self.element,
            self.argument.clone(),
            SourcePosition::SYNTHETIC,
        )
    }
}

impl Writable for PseudoSelector {
    fn write(&self, writer: &mut StyleWriter) {
        writer.write_str(if self.element { "::" } else { ":" });
        writer.write_str(&self.name);
        if let Some(argument) = &self.argument {
            writer.write_char('(');
            writer.write_str(argument);
            writer.write_char(')');
        }
    }
}

/// An attribute selector, e.g. `[href]` or `[type="text"]`.
#[derive(Debug)]
pub struct AttributeSelector {
    meta: SyntaxMeta,
    link: GroupLink,
    name: String,
    matcher: Option<(String, String)>,
}

impl AttributeSelector {
    /// A presence test built by code.
    pub fn new(name: impl Into<String>) -> Arc<Self> {
        Self::at(name, None, SourcePosition::SYNTHETIC)
    }

    /// An attribute selector read at `position`. `matcher` is the operator
    /// (`=`, `~=`, `|=`, `^=`, `$=`, `*=`) and value.
    pub fn at(
        name: impl Into<String>,
        matcher: Option<(String, String)>,
        position: SourcePosition,
    ) -> Arc<Self> {
        Arc::new(Self {
            meta: SyntaxMeta::new(position),
            link: GroupLink::new(),
            name: name.into(),
            matcher,
        })
    }

    /// The attribute name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The match operator, if any.
    pub fn operator(&self) -> Option<&str> {
        self.matcher.as_ref().map(|(op, _)| op.as_str())
    }

    /// The value compared against, if any.
    pub fn value(&self) -> Option<&str> {
        self.matcher.as_ref().map(|(_, value)| value.as_str())
    }
}

leaf_unit!(AttributeSelector, "attribute-selector", SELECTOR_PART);

impl SelectorPart for AttributeSelector {
    fn duplicate(&self) -> Arc<dyn SelectorPart> {
        Self::at(self.name.clone(), self.matcher.clone(), SourcePosition::SYNTHETIC)
    }
}

impl Writable for AttributeSelector {
    fn write(&self, writer: &mut StyleWriter) {
        writer.write_char('[');
        writer.write_str(&self.name);
        if let Some((operator, value)) = &self.matcher {
            writer.write_str(operator);
            writer.write_char('"');
            writer.write_str(&value.replace('"', "\\\""));
            writer.write_char('"');
        }
        writer.write_char(']');
    }
}

/// How a combinator relates the compound selectors around it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CombinatorKind {
    /// Whitespace.
    Descendant,
    /// `>`
    Child,
    /// `+`
    AdjacentSibling,
    /// `~`
    GeneralSibling,
}

impl CombinatorKind {
    fn symbol(self) -> Option<char> {
        match self {
            Self::Descendant => None,
            Self::Child => Some('>'),
            Self::AdjacentSibling => Some('+'),
            Self::GeneralSibling => Some('~'),
        }
    }
}

/// A combinator between two compound selectors.
#[derive(Debug)]
pub struct Combinator {
    meta: SyntaxMeta,
    link: GroupLink,
    kind: CombinatorKind,
}

impl Combinator {
    /// A combinator built by code.
    pub fn new(kind: CombinatorKind) -> Arc<Self> {
        Self::at(kind, SourcePosition::SYNTHETIC)
    }

    /// A combinator read at `position`.
    pub fn at(kind: CombinatorKind, position: SourcePosition) -> Arc<Self> {
        Arc::new(Self {
            meta: SyntaxMeta::new(position),
            link: GroupLink::new(),
            kind,
        })
    }

    /// The combinator kind.
    pub fn combinator(&self) -> CombinatorKind {
        self.kind
    }
}

leaf_unit!(Combinator, "combinator", SELECTOR_PART);

impl SelectorPart for Combinator {
    fn is_combinator(&self) -> bool {
        true
    }

    fn duplicate(&self) -> Arc<dyn SelectorPart> {
        Self::new(self.kind)
    }
}

impl Writable for Combinator {
    fn write(&self, writer: &mut StyleWriter) {
        match self.kind.symbol() {
            None => writer.write_char(' '),
            Some(symbol) => {
                writer.space();
                writer.write_char(symbol);
                writer.space();
            }
        }
    }
}
