//! CSS syntax node types.
//!
//! The tree mirrors a stylesheet's structure:
//!
//! - [`Stylesheet`] holds top-level [`Statement`]s
//! - [`Rule`] holds [`Selector`]s and [`Declaration`]s
//! - [`AtRule`] holds an optional [`AtRuleExpression`] and an optional block
//! - a refined [`Selector`] holds [`SelectorPart`]s
//! - a refined [`Declaration`] holds a [`PropertyValue`] made of [`Term`]s
//!
//! Selectors, declaration values and at-rule portions start out raw and are
//! refined on demand (see [`weft_core::refine`]).

use std::sync::Arc;

use weft_core::{
    group_of, Capability, Error, Groupable, Result, Syntax, SyntaxCollection, SyntaxRef,
};

use crate::writer::Writable;

/// Implements [`Syntax`] and [`Groupable`] for a leaf node with `meta` and
/// `link` fields.
macro_rules! leaf_unit {
    ($ty:ty, $kind:literal, $($capability:expr),+ $(,)?) => {
        impl weft_core::Syntax for $ty {
            weft_core::impl_syntax_basics!();

            fn kind(&self) -> &'static str {
                $kind
            }

            fn capabilities(&self) -> &'static [weft_core::Capability] {
                &[
                    weft_core::Capability::WRITABLE,
                    weft_core::Capability::GROUPABLE,
                    $($capability),+
                ]
            }

            fn as_groupable(&self) -> Option<&dyn weft_core::Groupable> {
                Some(self)
            }
        }

        impl weft_core::Groupable for $ty {
            fn group_link(&self) -> &weft_core::GroupLink {
                &self.link
            }
        }
    };
}

mod at_rule;
mod declaration;
mod rule;
mod selector;
mod stylesheet;
mod term;

pub use at_rule::{AtRule, AtRuleBlock, AtRuleExpression, BlockItems};
pub use declaration::{Declaration, PropertyValue};
pub use rule::Rule;
pub use selector::{
    AttributeSelector, ClassSelector, Combinator, CombinatorKind, IdSelector, PseudoSelector,
    Selector, SelectorPart, TypeSelector, UniversalSelector,
};
pub use stylesheet::Stylesheet;
pub use term::{
    FunctionValue, HexColorValue, KeywordValue, NumericalValue, OperatorTerm, StringValue, Term,
    UrlValue,
};

/// Advertised by every top-level or nested statement.
pub const STATEMENT: Capability = Capability::new("statement");
/// Advertised by every piece of a refined selector.
pub const SELECTOR_PART: Capability = Capability::new("selector-part");
/// Advertised by every piece of a refined property value.
pub const TERM: Capability = Capability::new("term");

/// A rule, at-rule or plugin-defined statement.
pub trait Statement: Groupable + Writable {
    /// Whether the writer should emit this statement at all.
    fn is_writable(&self) -> bool {
        true
    }

    /// A deep copy with a synthetic position. Raw portions stay raw.
    fn duplicate(&self) -> Arc<dyn Statement>;
}

/// The collection holding `unit`, typed as `T`.
pub(crate) fn siblings<T: ?Sized + Syntax>(
    unit: &dyn Groupable,
    operation: &'static str,
) -> Result<Arc<SyntaxCollection<T>>> {
    group_of::<T>(unit).ok_or(Error::Detached { operation })
}

/// The unit that owns `unit`: the parent of a grouped unit, the declaration
/// of a property value, or the at-rule of an expression.
pub fn enclosing(unit: &SyntaxRef) -> Option<SyntaxRef> {
    unit.owner()
}

static_assertions::assert_impl_all!(Stylesheet: Send, Sync);
static_assertions::assert_impl_all!(Rule: Send, Sync);
static_assertions::assert_impl_all!(Declaration: Send, Sync);
static_assertions::assert_impl_all!(AtRule: Send, Sync);
