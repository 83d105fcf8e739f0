//! Tokenization and parsing, built on `cssparser`.
//!
//! Top-level parsing is shallow: [`parse_stylesheet`] produces rules and
//! at-rules whose selectors, declaration values and at-rule portions are
//! kept as [`RawSpan`]s. The remaining functions expand those spans on
//! behalf of the refiners in [`crate::refiners`].
//!
//! Positions are 1-based lines and columns in the original document. Spans
//! parsed later keep their own start position, so nested positions stay
//! absolute.

use std::mem;
use std::sync::Arc;

use cssparser::{
    BasicParseErrorKind, Delimiter, ParseError, ParseErrorKind, Parser, ParserInput,
    SourceLocation, ToCss, Token,
};
use weft_core::{
    broadcast_unit, Error, RawSpan, Result, SharedBroadcaster, SingleInterestBroadcaster,
    SourcePosition, Syntax,
};

use crate::ast::{
    AtRule, AttributeSelector, ClassSelector, Combinator, CombinatorKind, Declaration,
    FunctionValue, HexColorValue, IdSelector, KeywordValue, NumericalValue, OperatorTerm,
    PseudoSelector, Rule, Selector, SelectorPart, Statement, StringValue, Term, TypeSelector,
    UniversalSelector, UrlValue,
};
use crate::writer::collapse_whitespace;

type ParseResult<'i, T> = std::result::Result<T, ParseError<'i, Error>>;

/// At-rules whose block holds declarations instead of statements.
const DECLARATION_BLOCKS: &[&str] = &[
    "font-face",
    "page",
    "viewport",
    "counter-style",
    "property",
    "font-palette-values",
];

/// Where a parsed text starts in the document.
#[derive(Debug, Clone, Copy)]
struct Origin(SourcePosition);

impl Origin {
    fn document() -> Self {
        Self(SourcePosition::new(1, 1))
    }

    fn of(span: &RawSpan) -> Self {
        Self(span.position())
    }

    /// Translate a `cssparser` location (0-based line, 1-based column).
    fn at(self, location: SourceLocation) -> SourcePosition {
        if self.0.is_synthetic() {
            SourcePosition::SYNTHETIC
        } else if location.line == 0 {
            SourcePosition::new(self.0.line(), self.0.column() + location.column - 1)
        } else {
            SourcePosition::new(self.0.line() + location.line, location.column)
        }
    }

    fn error<'i>(self, location: SourceLocation, message: impl Into<String>) -> ParseError<'i, Error> {
        location.new_custom_error(Error::parse(message, self.at(location)))
    }
}

fn into_error(error: ParseError<'_, Error>, origin: Origin) -> Error {
    let position = origin.at(error.location);
    match error.kind {
        ParseErrorKind::Custom(error) => error,
        ParseErrorKind::Basic(BasicParseErrorKind::UnexpectedToken(token)) => {
            Error::parse(format!("unexpected `{}`", token.to_css_string()), position)
        }
        ParseErrorKind::Basic(BasicParseErrorKind::EndOfInput) => {
            Error::parse("unexpected end of input", position)
        }
        ParseErrorKind::Basic(other) => Error::parse(format!("{other:?}"), position),
    }
}

/// Run `parse` over the text of `span`, which must consume all of it.
fn parse_span<T>(
    span: &RawSpan,
    parse: impl for<'i, 't> FnOnce(&mut Parser<'i, 't>, Origin) -> ParseResult<'i, T>,
) -> Result<T> {
    let origin = Origin::of(span);
    let mut input = ParserInput::new(span.text());
    let mut parser = Parser::new(&mut input);
    let result = parser
        .parse_entirely(|p| parse(p, origin))
        .map_err(|err| into_error(err, origin));
    result
}

/// Consume the rest of the (delimited) input and return it as a span
/// starting at its first non-whitespace token.
fn capture<'i>(parser: &mut Parser<'i, '_>, origin: Origin) -> ParseResult<'i, RawSpan> {
    parser.skip_whitespace();
    let location = parser.current_source_location();
    let start = parser.position();
    while parser.next_including_whitespace_and_comments().is_ok() {}
    let text = parser.slice_from(start).trim_end();
    Ok(RawSpan::new(text, origin.at(location)))
}

enum Trivia {
    Skip,
    Comment(String),
    Item,
}

/// Skip whitespace, comments and stray semicolons, collecting comment text.
/// Returns whether another item follows.
fn next_item(parser: &mut Parser<'_, '_>, comments: &mut Vec<String>) -> bool {
    loop {
        let state = parser.state();
        let step = match parser.next_including_whitespace_and_comments() {
            Err(_) => return false,
            Ok(Token::WhiteSpace(_) | Token::CDO | Token::CDC | Token::Semicolon) => Trivia::Skip,
            Ok(Token::Comment(text)) => Trivia::Comment(text.trim().to_string()),
            Ok(_) => Trivia::Item,
        };
        match step {
            Trivia::Skip => {}
            Trivia::Comment(text) => comments.push(text),
            Trivia::Item => {
                parser.reset(&state);
                return true;
            }
        }
    }
}

/// Parse a whole stylesheet, handing each top-level statement to `emit` in
/// document order.
///
/// A statement that fails to parse is skipped; its error is returned and
/// parsing resumes with the next statement. Comments preceding a statement
/// are attached to it.
pub fn parse_stylesheet(css: &str, mut emit: impl FnMut(Arc<dyn Statement>)) -> Vec<Error> {
    let origin = Origin::document();
    let mut input = ParserInput::new(css);
    let mut parser = Parser::new(&mut input);
    let mut errors = Vec::new();
    let mut comments = Vec::new();

    while next_item(&mut parser, &mut comments) {
        match statement(&mut parser, origin) {
            Ok(statement) => {
                statement.meta().set_comments(mem::take(&mut comments));
                emit(statement);
            }
            Err(err) => {
                let error = into_error(err, origin);
                tracing::warn!(target: "weft_css::grammar", error = %error, "skipping statement");
                comments.clear();
                errors.push(error);
            }
        }
    }
    errors
}

fn statement<'i>(parser: &mut Parser<'i, '_>, origin: Origin) -> ParseResult<'i, Arc<dyn Statement>> {
    let location = parser.current_source_location();
    let state = parser.state();
    let name = match parser.next()? {
        Token::AtKeyword(name) => Some(name.to_string()),
        _ => None,
    };
    match name {
        Some(name) => at_rule(parser, name, origin.at(location), origin),
        None => {
            parser.reset(&state);
            rule(parser, location, origin)
        }
    }
}

fn at_rule<'i>(
    parser: &mut Parser<'i, '_>,
    name: String,
    position: SourcePosition,
    origin: Origin,
) -> ParseResult<'i, Arc<dyn Statement>> {
    let expression = parser.parse_until_before(
        Delimiter::Semicolon | Delimiter::CurlyBracketBlock,
        |p| capture(p, origin),
    )?;
    let expression = Some(expression).filter(|span| !span.text().is_empty());

    let opens_block = matches!(parser.next(), Ok(Token::CurlyBracketBlock));
    let block = if opens_block {
        Some(parser.parse_nested_block(|p| capture(p, origin))?)
    } else {
        None
    };
    Ok(AtRule::raw(name, expression, block, position))
}

fn rule<'i>(
    parser: &mut Parser<'i, '_>,
    location: SourceLocation,
    origin: Origin,
) -> ParseResult<'i, Arc<dyn Statement>> {
    let selectors = parser.parse_until_before(Delimiter::CurlyBracketBlock, |p| {
        p.parse_comma_separated(|p| raw_selector(p, origin))
    })?;

    let brace = parser.current_source_location();
    if !matches!(parser.next(), Ok(Token::CurlyBracketBlock)) {
        return Err(origin.error(brace, "expected `{` after selectors"));
    }
    let declarations = parser.parse_nested_block(|p| declaration_list(p, origin))?;

    let rule = Rule::at(origin.at(location));
    rule.selectors().append_all(selectors);
    rule.declarations().append_all(declarations);
    Ok(rule)
}

fn raw_selector<'i>(parser: &mut Parser<'i, '_>, origin: Origin) -> ParseResult<'i, Arc<Selector>> {
    let span = capture(parser, origin)?;
    if span.text().is_empty() {
        let location = parser.current_source_location();
        return Err(origin.error(location, "empty selector"));
    }
    Ok(Selector::raw(span))
}

fn statement_list<'i>(
    parser: &mut Parser<'i, '_>,
    origin: Origin,
) -> ParseResult<'i, Vec<Arc<dyn Statement>>> {
    let mut statements = Vec::new();
    let mut comments = Vec::new();
    while next_item(parser, &mut comments) {
        let statement = statement(parser, origin)?;
        statement.meta().set_comments(mem::take(&mut comments));
        statements.push(statement);
    }
    Ok(statements)
}

fn declaration_list<'i>(
    parser: &mut Parser<'i, '_>,
    origin: Origin,
) -> ParseResult<'i, Vec<Arc<Declaration>>> {
    let mut declarations = Vec::new();
    let mut comments = Vec::new();
    while next_item(parser, &mut comments) {
        let declaration =
            parser.parse_until_after(Delimiter::Semicolon, |p| declaration(p, origin))?;
        declaration.meta().set_comments(mem::take(&mut comments));
        declarations.push(declaration);
    }
    Ok(declarations)
}

fn declaration<'i>(parser: &mut Parser<'i, '_>, origin: Origin) -> ParseResult<'i, Arc<Declaration>> {
    let location = parser.current_source_location();
    let property = parser.expect_ident()?.to_string();
    parser.expect_colon()?;

    let span = capture(parser, origin)?;
    let (value, important) = split_important(span.text());
    if value.is_empty() {
        return Err(origin.error(location, format!("missing value for `{property}`")));
    }
    Ok(Declaration::raw(
        property,
        RawSpan::new(value, span.position()),
        important,
        origin.at(location),
    ))
}

/// Split a trailing `!important` off a declaration value.
fn split_important(text: &str) -> (&str, bool) {
    const IMPORTANT: &str = "important";

    let trimmed = text.trim_end();
    let cut = trimmed.len().saturating_sub(IMPORTANT.len());
    if let (Some(head), Some(tail)) = (trimmed.get(..cut), trimmed.get(cut..))
        && tail.eq_ignore_ascii_case(IMPORTANT)
        && let Some(value) = head.trim_end().strip_suffix('!')
    {
        return (value.trim_end(), true);
    }
    (trimmed, false)
}

fn selector_parts<'i>(
    parser: &mut Parser<'i, '_>,
    origin: Origin,
) -> ParseResult<'i, Vec<Arc<dyn SelectorPart>>> {
    let mut parts: Vec<Arc<dyn SelectorPart>> = Vec::new();
    let mut whitespace: Option<SourcePosition> = None;
    let start = parser.current_source_location();

    loop {
        let location = parser.current_source_location();
        let token = match parser.next_including_whitespace() {
            Ok(token) => token.clone(),
            Err(_) => break,
        };
        let position = origin.at(location);

        let combinator = match &token {
            Token::WhiteSpace(_) => {
                if whitespace.is_none() {
                    whitespace = Some(position);
                }
                continue;
            }
            Token::Delim('>') => Some(CombinatorKind::Child),
            Token::Delim('+') => Some(CombinatorKind::AdjacentSibling),
            Token::Delim('~') => Some(CombinatorKind::GeneralSibling),
            _ => None,
        };
        let follows_compound = parts.last().is_some_and(|part| !part.is_combinator());

        if let Some(kind) = combinator {
            if !follows_compound {
                return Err(origin.error(location, "combinator without a preceding selector"));
            }
            whitespace = None;
            parts.push(Combinator::at(kind, position));
            continue;
        }

        if let Some(gap) = whitespace.take()
            && follows_compound
        {
            parts.push(Combinator::at(CombinatorKind::Descendant, gap));
        }
        parts.push(simple_selector(parser, token, location, origin)?);
    }

    if parts.is_empty() {
        return Err(origin.error(start, "empty selector"));
    }
    Ok(parts)
}

fn simple_selector<'i>(
    parser: &mut Parser<'i, '_>,
    token: Token<'i>,
    location: SourceLocation,
    origin: Origin,
) -> ParseResult<'i, Arc<dyn SelectorPart>> {
    let position = origin.at(location);
    let part: Arc<dyn SelectorPart> = match token {
        Token::Ident(name) => TypeSelector::at(name.to_string(), position),
        Token::Delim('*') => UniversalSelector::at(position),
        Token::Delim('.') => ClassSelector::at(adjacent_ident(parser)?, position),
        Token::IDHash(name) => IdSelector::at(name.to_string(), position),
        Token::Colon => pseudo(parser, position, origin)?,
        Token::SquareBracketBlock => parser.parse_nested_block(|p| attribute(p, position))?,
        other => return Err(location.new_unexpected_token_error(other)),
    };
    Ok(part)
}

/// An identifier immediately following the previous token.
fn adjacent_ident<'i>(parser: &mut Parser<'i, '_>) -> ParseResult<'i, String> {
    let location = parser.current_source_location();
    match parser.next_including_whitespace()? {
        Token::Ident(name) => Ok(name.to_string()),
        other => Err(location.new_unexpected_token_error(other.clone())),
    }
}

fn pseudo<'i>(
    parser: &mut Parser<'i, '_>,
    position: SourcePosition,
    origin: Origin,
) -> ParseResult<'i, Arc<dyn SelectorPart>> {
    let location = parser.current_source_location();
    let mut token = parser.next_including_whitespace()?.clone();
    let element = matches!(token, Token::Colon);
    if element {
        token = parser.next_including_whitespace()?.clone();
    }
    match token {
        Token::Ident(name) => Ok(PseudoSelector::at(name.to_string(), element, None, position)),
        Token::Function(name) => {
            let argument = parser.parse_nested_block(|p| capture(p, origin))?;
            Ok(PseudoSelector::at(
                name.to_string(),
                element,
                Some(collapse_whitespace(argument.text())),
                position,
            ))
        }
        other => Err(location.new_unexpected_token_error(other)),
    }
}

fn attribute<'i>(
    parser: &mut Parser<'i, '_>,
    position: SourcePosition,
) -> ParseResult<'i, Arc<dyn SelectorPart>> {
    let name = parser.expect_ident()?.to_string();

    let location = parser.current_source_location();
    let operator = match parser.next() {
        Err(_) => return Ok(AttributeSelector::at(name, None, position)),
        Ok(Token::Delim('=')) => "=",
        Ok(Token::IncludeMatch) => "~=",
        Ok(Token::DashMatch) => "|=",
        Ok(Token::PrefixMatch) => "^=",
        Ok(Token::SuffixMatch) => "$=",
        Ok(Token::SubstringMatch) => "*=",
        Ok(other) => return Err(location.new_unexpected_token_error(other.clone())),
    };

    let location = parser.current_source_location();
    let value = match parser.next()? {
        Token::Ident(value) | Token::QuotedString(value) => value.to_string(),
        other => return Err(location.new_unexpected_token_error(other.clone())),
    };
    Ok(AttributeSelector::at(
        name,
        Some((operator.to_string(), value)),
        position,
    ))
}

fn terms<'i>(parser: &mut Parser<'i, '_>, origin: Origin) -> ParseResult<'i, Vec<Arc<dyn Term>>> {
    let mut parsed = Vec::new();
    loop {
        parser.skip_whitespace();
        let location = parser.current_source_location();
        let start = parser.position();
        let token = match parser.next() {
            Ok(token) => token.clone(),
            Err(_) => break,
        };
        let position = origin.at(location);

        let term: Arc<dyn Term> = match token {
            Token::Ident(keyword) => KeywordValue::at(keyword.to_string(), position),
            Token::Number { value, .. } => {
                NumericalValue::at(value, None, parser.slice_from(start), position)
            }
            Token::Percentage { unit_value, .. } => NumericalValue::at(
                unit_value * 100.0,
                Some("%".to_string()),
                parser.slice_from(start),
                position,
            ),
            Token::Dimension { value, unit, .. } => NumericalValue::at(
                value,
                Some(unit.to_string()),
                parser.slice_from(start),
                position,
            ),
            Token::QuotedString(text) => StringValue::at(text.to_string(), position),
            Token::Hash(hex) | Token::IDHash(hex) => HexColorValue::at(hex.to_string(), position),
            Token::UnquotedUrl(url) => UrlValue::at(url.to_string(), position),
            Token::Function(name) if name.eq_ignore_ascii_case("url") => {
                UrlValue::at(parser.parse_nested_block(url_argument)?, position)
            }
            Token::Function(name) => {
                let arguments = parser.parse_nested_block(|p| terms(p, origin))?;
                FunctionValue::at(name.to_string(), arguments, position)
            }
            Token::Comma => OperatorTerm::at(',', position),
            Token::Delim(symbol @ ('/' | '+' | '-' | '*')) => OperatorTerm::at(symbol, position),
            other => return Err(location.new_unexpected_token_error(other)),
        };
        parsed.push(term);
    }
    Ok(parsed)
}

fn url_argument<'i>(parser: &mut Parser<'i, '_>) -> ParseResult<'i, String> {
    Ok(parser.expect_string()?.to_string())
}

fn expression_segments<'i>(
    parser: &mut Parser<'i, '_>,
    origin: Origin,
) -> ParseResult<'i, Vec<String>> {
    parser.parse_comma_separated(|p| expression_segment(p, origin))
}

fn expression_segment<'i>(parser: &mut Parser<'i, '_>, origin: Origin) -> ParseResult<'i, String> {
    let span = capture(parser, origin)?;
    Ok(collapse_whitespace(span.text()))
}

/// Parse a raw selector into its parts.
pub fn parse_selector_parts(span: &RawSpan) -> Result<Vec<Arc<dyn SelectorPart>>> {
    parse_span(span, selector_parts)
}

/// Parse a raw declaration value into terms.
pub fn parse_terms(span: &RawSpan) -> Result<Vec<Arc<dyn Term>>> {
    let terms = parse_span(span, terms)?;
    if terms.is_empty() {
        return Err(Error::parse("empty value", span.position()));
    }
    Ok(terms)
}

/// Parse a raw at-rule expression into its comma-separated segments.
pub fn parse_expression(span: &RawSpan) -> Result<Vec<String>> {
    parse_span(span, expression_segments)
}

/// Parse a raw at-rule block holding nested statements.
pub fn parse_statements(span: &RawSpan) -> Result<Vec<Arc<dyn Statement>>> {
    parse_span(span, statement_list)
}

/// Parse a raw at-rule block holding declarations.
pub fn parse_declarations(span: &RawSpan) -> Result<Vec<Arc<Declaration>>> {
    parse_span(span, declaration_list)
}

/// Whether the block of an at-rule named `name` holds declarations
/// (`@font-face`, `@page`, ...) rather than statements. Vendor prefixes are
/// ignored.
pub fn block_holds_declarations(name: &str) -> bool {
    let name = name.to_ascii_lowercase();
    let unprefixed = match name.strip_prefix('-') {
        Some(rest) => rest.split_once('-').map_or(rest, |(_, tail)| tail),
        None => &name,
    };
    DECLARATION_BLOCKS.contains(&unprefixed)
}

/// Parse `css` and return its first rule.
pub fn parse_rule(css: &str) -> Result<Arc<Rule>> {
    let capture = Arc::new(SingleInterestBroadcaster::<Rule>::new());
    let broadcaster: SharedBroadcaster = capture.clone();
    let errors = parse_stylesheet(css, |statement| {
        broadcast_unit(&statement.into_syntax(), &broadcaster);
    });
    if let Some(error) = errors.into_iter().next() {
        return Err(error);
    }
    capture
        .broadcasted()
        .ok_or_else(|| Error::parse("no rule found", SourcePosition::new(1, 1)))
}

/// Parse `css` as a declaration list and return its first declaration.
pub fn parse_declaration(css: &str) -> Result<Arc<Declaration>> {
    let capture = Arc::new(SingleInterestBroadcaster::<Declaration>::new());
    let broadcaster: SharedBroadcaster = capture.clone();
    let span = RawSpan::new(css, SourcePosition::new(1, 1));
    for declaration in parse_declarations(&span)? {
        broadcast_unit(&declaration.into_syntax(), &broadcaster);
    }
    capture
        .broadcasted()
        .ok_or_else(|| Error::parse("no declaration found", SourcePosition::new(1, 1)))
}
