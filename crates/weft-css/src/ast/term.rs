//! Terms: the pieces of a refined property value.

use std::sync::{Arc, Weak};

use weft_core::{
    Capability, GroupLink, Groupable, SharedBroadcaster, SourcePosition, Syntax, SyntaxCollection,
    SyntaxMeta, SyntaxRef,
};

use super::TERM;
use crate::writer::{StyleWriter, Writable};

/// A piece of a property value.
pub trait Term: Groupable + Writable {
    /// The separator character, for [`OperatorTerm`]s.
    fn operator(&self) -> Option<char> {
        None
    }

    /// A deep copy with a synthetic position.
    fn duplicate(&self) -> Arc<dyn Term>;
}

/// Write `terms` with the spacing CSS values use: a space between adjacent
/// terms, none around `/`, and an optional space after `,`.
pub(crate) fn write_terms(terms: &SyntaxCollection<dyn Term>, writer: &mut StyleWriter) {
    let mut previous: Option<Option<char>> = None;
    for term in terms.iter() {
        let operator = term.operator();
        if let Some(before) = previous {
            match (before, operator) {
                (_, Some(',' | '/')) | (Some('/'), _) => {}
                (Some(','), _) => writer.space(),
                _ => writer.write_char(' '),
            }
        }
        term.write(writer);
        previous = Some(operator);
    }
}

/// An identifier, e.g. `red` or `auto`.
#[derive(Debug)]
pub struct KeywordValue {
    meta: SyntaxMeta,
    link: GroupLink,
    keyword: String,
}

impl KeywordValue {
    /// A keyword built by code.
    pub fn new(keyword: impl Into<String>) -> Arc<Self> {
        Self::at(keyword, SourcePosition::SYNTHETIC)
    }

    /// A keyword read at `position`.
    pub fn at(keyword: impl Into<String>, position: SourcePosition) -> Arc<Self> {
        Arc::new(Self {
            meta: SyntaxMeta::new(position),
            link: GroupLink::new(),
            keyword: keyword.into(),
        })
    }

    /// The identifier.
    pub fn keyword(&self) -> &str {
        &self.keyword
    }
}

leaf_unit!(KeywordValue, "keyword", TERM);

impl Term for KeywordValue {
    fn duplicate(&self) -> Arc<dyn Term> {
        Self::new(self.keyword.clone())
    }
}

impl Writable for KeywordValue {
    fn write(&self, writer: &mut StyleWriter) {
        writer.write_str(&self.keyword);
    }
}

/// A number, percentage or dimension, e.g. `0`, `50%`, `1.5em`.
#[derive(Debug)]
pub struct NumericalValue {
    meta: SyntaxMeta,
    link: GroupLink,
    value: f32,
    unit: Option<String>,
    source: Option<String>,
}

impl NumericalValue {
    /// A number built by code.
    pub fn new(value: f32, unit: Option<&str>) -> Arc<Self> {
        Arc::new(Self {
            meta: SyntaxMeta::synthetic(),
            link: GroupLink::new(),
            value,
            unit: unit.map(str::to_string),
            source: None,
        })
    }

    /// A number read at `position`; `source` is its exact text, kept for
    /// writing.
    pub fn at(
        value: f32,
        unit: Option<String>,
        source: impl Into<String>,
        position: SourcePosition,
    ) -> Arc<Self> {
        Arc::new(Self {
            meta: SyntaxMeta::new(position),
            link: GroupLink::new(),
            value,
            unit,
            source: Some(source.into()),
        })
    }

    /// The numeric part (`50` for `50%`).
    pub fn value(&self) -> f32 {
        self.value
    }

    /// The unit, `%` for percentages.
    pub fn unit(&self) -> Option<&str> {
        self.unit.as_deref()
    }
}

leaf_unit!(NumericalValue, "number", TERM);

impl Term for NumericalValue {
    fn duplicate(&self) -> Arc<dyn Term> {
        Arc::new(Self {
            meta: SyntaxMeta::synthetic(),
            link: GroupLink::new(),
            value: self.value,
            unit: self.unit.clone(),
            source: self.source.clone(),
        })
    }
}

impl Writable for NumericalValue {
    fn write(&self, writer: &mut StyleWriter) {
        match &self.source {
            Some(source) => writer.write_str(source),
            None => {
                writer.write_str(&self.value.to_string());
                if let Some(unit) = &self.unit {
                    writer.write_str(unit);
                }
            }
        }
    }
}

/// A quoted string.
#[derive(Debug)]
pub struct StringValue {
    meta: SyntaxMeta,
    link: GroupLink,
    value: String,
}

impl StringValue {
    /// A string built by code.
    pub fn new(value: impl Into<String>) -> Arc<Self> {
        Self::at(value, SourcePosition::SYNTHETIC)
    }

    /// A string read at `position`.
    pub fn at(value: impl Into<String>, position: SourcePosition) -> Arc<Self> {
        Arc::new(Self {
            meta: SyntaxMeta::new(position),
            link: GroupLink::new(),
            value: value.into(),
        })
    }

    /// The unquoted content.
    pub fn value(&self) -> &str {
        &self.value
    }
}

leaf_unit!(StringValue, "string", TERM);

impl Term for StringValue {
    fn duplicate(&self) -> Arc<dyn Term> {
        Self::new(self.value.clone())
    }
}

impl Writable for StringValue {
    fn write(&self, writer: &mut StyleWriter) {
        writer.write_char('"');
        writer.write_str(&self.value.replace('\\', "\\\\").replace('"', "\\\""));
        writer.write_char('"');
    }
}

/// A hash color, e.g. `#fff`.
#[derive(Debug)]
pub struct HexColorValue {
    meta: SyntaxMeta,
    link: GroupLink,
    hex: String,
}

impl HexColorValue {
    /// A color built by code, without the `#`.
    pub fn new(hex: impl Into<String>) -> Arc<Self> {
        Self::at(hex, SourcePosition::SYNTHETIC)
    }

    /// A color read at `position`.
    pub fn at(hex: impl Into<String>, position: SourcePosition) -> Arc<Self> {
        Arc::new(Self {
            meta: SyntaxMeta::new(position),
            link: GroupLink::new(),
            hex: hex.into(),
        })
    }

    /// The digits without the `#`.
    pub fn hex(&self) -> &str {
        &self.hex
    }
}

leaf_unit!(HexColorValue, "hex-color", TERM);

impl Term for HexColorValue {
    fn duplicate(&self) -> Arc<dyn Term> {
        Self::new(self.hex.clone())
    }
}

impl Writable for HexColorValue {
    fn write(&self, writer: &mut StyleWriter) {
        writer.write_char('#');
        writer.write_str(&self.hex);
    }
}

/// A `url(...)` reference.
#[derive(Debug)]
pub struct UrlValue {
    meta: SyntaxMeta,
    link: GroupLink,
    url: String,
}

impl UrlValue {
    /// A url built by code.
    pub fn new(url: impl Into<String>) -> Arc<Self> {
        Self::at(url, SourcePosition::SYNTHETIC)
    }

    /// A url read at `position`.
    pub fn at(url: impl Into<String>, position: SourcePosition) -> Arc<Self> {
        Arc::new(Self {
            meta: SyntaxMeta::new(position),
            link: GroupLink::new(),
            url: url.into(),
        })
    }

    /// The referenced location.
    pub fn url(&self) -> &str {
        &self.url
    }
}

leaf_unit!(UrlValue, "url", TERM);

impl Term for UrlValue {
    fn duplicate(&self) -> Arc<dyn Term> {
        Self::new(self.url.clone())
    }
}

impl Writable for UrlValue {
    fn write(&self, writer: &mut StyleWriter) {
        writer.write_str("url(");
        if self.url.contains(|c: char| c.is_whitespace() || matches!(c, '(' | ')' | '\'' | '"')) {
            writer.write_char('"');
            writer.write_str(&self.url.replace('"', "\\\""));
            writer.write_char('"');
        } else {
            writer.write_str(&self.url);
        }
        writer.write_char(')');
    }
}

/// A separator between terms: `,`, `/`, or an arithmetic operator.
#[derive(Debug)]
pub struct OperatorTerm {
    meta: SyntaxMeta,
    link: GroupLink,
    symbol: char,
}

impl OperatorTerm {
    /// A separator built by code.
    pub fn new(symbol: char) -> Arc<Self> {
        Self::at(symbol, SourcePosition::SYNTHETIC)
    }

    /// A separator read at `position`.
    pub fn at(symbol: char, position: SourcePosition) -> Arc<Self> {
        Arc::new(Self {
            meta: SyntaxMeta::new(position),
            link: GroupLink::new(),
            symbol,
        })
    }

    /// The separator character.
    pub fn symbol(&self) -> char {
        self.symbol
    }
}

leaf_unit!(OperatorTerm, "operator", TERM);

impl Term for OperatorTerm {
    fn operator(&self) -> Option<char> {
        Some(self.symbol)
    }

    fn duplicate(&self) -> Arc<dyn Term> {
        Self::new(self.symbol)
    }
}

impl Writable for OperatorTerm {
    fn write(&self, writer: &mut StyleWriter) {
        writer.write_char(self.symbol);
    }
}

/// A function call, e.g. `rgba(0, 0, 0, .5)`.
#[derive(Debug)]
pub struct FunctionValue {
    meta: SyntaxMeta,
    link: GroupLink,
    name: String,
    arguments: Arc<SyntaxCollection<dyn Term>>,
}

impl FunctionValue {
    /// A function built by code.
    pub fn new(name: impl Into<String>, arguments: Vec<Arc<dyn Term>>) -> Arc<Self> {
        Self::at(name, arguments, SourcePosition::SYNTHETIC)
    }

    /// A function read at `position`.
    pub fn at(
        name: impl Into<String>,
        arguments: Vec<Arc<dyn Term>>,
        position: SourcePosition,
    ) -> Arc<Self> {
        let name = name.into();
        Arc::new_cyclic(|this: &Weak<FunctionValue>| {
            let owner: Weak<dyn Syntax> = this.clone();
            let list = SyntaxCollection::new(owner);
            list.append_all(arguments);
            Self {
                meta: SyntaxMeta::new(position),
                link: GroupLink::new(),
                name,
                arguments: list,
            }
        })
    }

    /// The function name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The arguments, separators included.
    pub fn arguments(&self) -> &Arc<SyntaxCollection<dyn Term>> {
        &self.arguments
    }
}

impl Syntax for FunctionValue {
    weft_core::impl_syntax_basics!();

    fn kind(&self) -> &'static str {
        "function"
    }

    fn capabilities(&self) -> &'static [Capability] {
        &[Capability::WRITABLE, Capability::GROUPABLE, TERM]
    }

    fn as_groupable(&self) -> Option<&dyn Groupable> {
        Some(self)
    }

    fn children(&self) -> Vec<SyntaxRef> {
        self.arguments.units()
    }

    fn propagate_broadcast(&self, broadcaster: &SharedBroadcaster) {
        self.arguments.propagate_broadcast(broadcaster);
    }
}

impl Groupable for FunctionValue {
    fn group_link(&self) -> &GroupLink {
        &self.link
    }
}

impl Term for FunctionValue {
    fn duplicate(&self) -> Arc<dyn Term> {
        let arguments = self.arguments.iter().map(|a| a.duplicate()).collect();
        Self::new(self.name.clone(), arguments)
    }
}

impl Writable for FunctionValue {
    fn write(&self, writer: &mut StyleWriter) {
        writer.write_str(&self.name);
        writer.write_char('(');
        write_terms(&self.arguments, writer);
        writer.write_char(')');
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::writer::{to_css, WriterMode};

    fn rgba() -> Arc<FunctionValue> {
        FunctionValue::new(
            "rgba",
            vec![
                NumericalValue::new(0.0, None),
                OperatorTerm::new(','),
                NumericalValue::new(0.5, None),
            ],
        )
    }

    #[test]
    fn function_arguments_follow_comma_spacing() {
        assert_eq!(to_css(rgba().as_ref(), WriterMode::Compressed), "rgba(0,0.5)");
        assert_eq!(to_css(rgba().as_ref(), WriterMode::Inline), "rgba(0, 0.5)");
    }

    #[test]
    fn parsed_numbers_keep_their_source_text() {
        let number = NumericalValue::at(50.0, Some("%".into()), "50%", SourcePosition::new(1, 9));
        assert_eq!(to_css(number.as_ref(), WriterMode::Compressed), "50%");
        assert_eq!(number.unit(), Some("%"));

        let built = NumericalValue::new(10.0, Some("px"));
        assert_eq!(to_css(built.as_ref(), WriterMode::Compressed), "10px");
    }

    #[test]
    fn strings_are_requoted() {
        let string = StringValue::new("a\"b");
        assert_eq!(to_css(string.as_ref(), WriterMode::Compressed), "\"a\\\"b\"");
    }

    #[test]
    fn urls_are_quoted_only_when_needed() {
        assert_eq!(to_css(UrlValue::new("a.png").as_ref(), WriterMode::Compressed), "url(a.png)");
        assert_eq!(
            to_css(UrlValue::new("a b.png").as_ref(), WriterMode::Compressed),
            "url(\"a b.png\")"
        );
    }

    #[test]
    fn function_duplicate_owns_new_arguments() {
        let original = rgba();
        let copy = original.duplicate();
        assert_eq!(to_css(copy.as_ref(), WriterMode::Compressed), "rgba(0,0.5)");
        let first = original.arguments().first().expect("argument");
        assert!(first.parent().is_some_and(|p| p.meta().id() == original.meta().id()));
    }
}
