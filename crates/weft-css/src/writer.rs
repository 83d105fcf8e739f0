//! Serializing syntax trees back to CSS text.
//!
//! Every node implements [`Writable`]. Formatting decisions that depend on
//! the [`WriterMode`] (optional whitespace, block layout, statement
//! separators) live in [`StyleWriter`] so node types only say *what* to
//! write.
//!
//! ```ignore
//! use weft_css::writer::{to_css, WriterMode};
//!
//! let css = to_css(stylesheet.as_ref(), WriterMode::Inline);
//! ```

use std::sync::Arc;

use weft_core::{RawSpan, Syntax};

use crate::ast::{Declaration, Statement};

/// How much optional whitespace the writer emits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum WriterMode {
    /// No optional whitespace; top-level statements separated by a space.
    #[default]
    Compressed,
    /// One statement per line, with spaces after `:` and `,`.
    Inline,
    /// Indented multi-line blocks, comments preserved.
    Verbose,
}

/// A node that can be written as CSS.
pub trait Writable {
    /// Append this node to `writer`.
    fn write(&self, writer: &mut StyleWriter);
}

/// Accumulates CSS text.
#[derive(Debug)]
pub struct StyleWriter {
    mode: WriterMode,
    out: String,
    depth: usize,
}

impl StyleWriter {
    /// Create an empty writer.
    pub fn new(mode: WriterMode) -> Self {
        Self {
            mode,
            out: String::new(),
            depth: 0,
        }
    }

    /// The output mode.
    pub fn mode(&self) -> WriterMode {
        self.mode
    }

    /// Whether optional whitespace is dropped.
    pub fn is_compressed(&self) -> bool {
        self.mode == WriterMode::Compressed
    }

    /// Append text verbatim.
    pub fn write_str(&mut self, text: &str) {
        self.out.push_str(text);
    }

    /// Append one character.
    pub fn write_char(&mut self, c: char) {
        self.out.push(c);
    }

    /// Append a space unless compressed.
    pub fn space(&mut self) {
        if !self.is_compressed() {
            self.out.push(' ');
        }
    }

    /// Append a list separator (`,` and optional space).
    pub fn comma(&mut self) {
        self.out.push(',');
        self.space();
    }

    /// Append unparsed source text: trimmed, and whitespace-collapsed when
    /// compressed.
    pub fn write_raw(&mut self, raw: &RawSpan) {
        if self.is_compressed() {
            let collapsed = collapse_whitespace(raw.text());
            self.out.push_str(&collapsed);
        } else {
            self.out.push_str(raw.trimmed());
        }
    }

    /// Append any writable node.
    pub fn write_unit<W: Writable + ?Sized>(&mut self, unit: &W) {
        unit.write(self);
    }

    /// Append a `{ ... }` block of declarations.
    pub fn write_declarations(&mut self, declarations: &[Arc<Declaration>]) {
        if declarations.is_empty() {
            self.empty_block();
            return;
        }
        match self.mode {
            WriterMode::Compressed => {
                self.out.push('{');
                for (i, declaration) in declarations.iter().enumerate() {
                    if i > 0 {
                        self.out.push(';');
                    }
                    declaration.write(self);
                }
                self.out.push('}');
            }
            WriterMode::Inline => {
                self.out.push_str(" { ");
                for (i, declaration) in declarations.iter().enumerate() {
                    if i > 0 {
                        self.out.push(' ');
                    }
                    declaration.write(self);
                    self.out.push(';');
                }
                self.out.push_str(" }");
            }
            WriterMode::Verbose => {
                self.out.push_str(" {\n");
                self.depth += 1;
                for declaration in declarations {
                    self.write_comments(&declaration.meta().comments());
                    self.indent();
                    declaration.write(self);
                    self.out.push_str(";\n");
                }
                self.depth -= 1;
                self.indent();
                self.out.push('}');
            }
        }
    }

    /// Append a `{ ... }` block of nested statements.
    pub fn write_statements(&mut self, statements: &[Arc<dyn Statement>]) {
        let statements: Vec<&Arc<dyn Statement>> =
            statements.iter().filter(|s| s.is_writable()).collect();
        if statements.is_empty() {
            self.empty_block();
            return;
        }
        match self.mode {
            WriterMode::Compressed => {
                self.out.push('{');
                for statement in statements {
                    statement.write(self);
                }
                self.out.push('}');
            }
            WriterMode::Inline => {
                self.out.push_str(" { ");
                for (i, statement) in statements.into_iter().enumerate() {
                    if i > 0 {
                        self.out.push(' ');
                    }
                    statement.write(self);
                }
                self.out.push_str(" }");
            }
            WriterMode::Verbose => {
                self.out.push_str(" {\n");
                self.depth += 1;
                for statement in statements {
                    self.write_comments(&statement.meta().comments());
                    self.indent();
                    statement.write(self);
                    self.out.push('\n');
                }
                self.depth -= 1;
                self.indent();
                self.out.push('}');
            }
        }
    }

    /// Append a block whose content was never parsed.
    pub fn write_raw_block(&mut self, raw: &RawSpan) {
        if raw.trimmed().is_empty() {
            self.empty_block();
        } else if self.is_compressed() {
            self.out.push('{');
            self.write_raw(raw);
            self.out.push('}');
        } else {
            self.out.push_str(" { ");
            self.write_raw(raw);
            self.out.push_str(" }");
        }
    }

    /// Append the top-level statements of a stylesheet.
    pub fn write_top_level(&mut self, statements: &[Arc<dyn Statement>]) {
        let separator = match self.mode {
            WriterMode::Compressed => " ",
            WriterMode::Inline => "\n",
            WriterMode::Verbose => "\n\n",
        };
        let writable = statements.iter().filter(|s| s.is_writable());
        for (i, statement) in writable.enumerate() {
            if i > 0 {
                self.out.push_str(separator);
            }
            self.write_comments(&statement.meta().comments());
            statement.write(self);
        }
    }

    /// The text written so far.
    pub fn as_str(&self) -> &str {
        &self.out
    }

    /// Consume the writer, returning the text.
    pub fn finish(self) -> String {
        self.out
    }

    fn write_comments(&mut self, comments: &[String]) {
        if self.mode != WriterMode::Verbose {
            return;
        }
        for comment in comments {
            self.indent();
            self.out.push_str("/*");
            self.out.push_str(comment);
            self.out.push_str("*/\n");
        }
    }

    fn empty_block(&mut self) {
        if self.is_compressed() {
            self.out.push_str("{}");
        } else {
            self.out.push_str(" {}");
        }
    }

    fn indent(&mut self) {
        for _ in 0..self.depth {
            self.out.push_str("  ");
        }
    }
}

/// Write `unit` as a standalone string.
pub fn to_css<W: Writable + ?Sized>(unit: &W, mode: WriterMode) -> String {
    let mut writer = StyleWriter::new(mode);
    unit.write(&mut writer);
    writer.finish()
}

/// Trim and replace every whitespace run with a single space.
pub(crate) fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use weft_core::SourcePosition;

    #[test]
    fn raw_text_is_collapsed_only_when_compressed() {
        let raw = RawSpan::new("  a   >\n b ", SourcePosition::new(1, 1));

        let mut compressed = StyleWriter::new(WriterMode::Compressed);
        compressed.write_raw(&raw);
        assert_eq!(compressed.finish(), "a > b");

        let mut inline = StyleWriter::new(WriterMode::Inline);
        inline.write_raw(&raw);
        assert_eq!(inline.finish(), "a   >\n b");
    }

    #[test]
    fn comma_spacing_follows_mode() {
        let mut compressed = StyleWriter::new(WriterMode::Compressed);
        compressed.write_str("a");
        compressed.comma();
        compressed.write_str("b");
        assert_eq!(compressed.as_str(), "a,b");

        let mut verbose = StyleWriter::new(WriterMode::Verbose);
        verbose.write_str("a");
        verbose.comma();
        verbose.write_str("b");
        assert_eq!(verbose.as_str(), "a, b");
    }

    #[test]
    fn empty_raw_block() {
        let raw = RawSpan::new("   ", SourcePosition::new(1, 1));
        let mut writer = StyleWriter::new(WriterMode::Compressed);
        writer.write_raw_block(&raw);
        assert_eq!(writer.finish(), "{}");
    }
}
