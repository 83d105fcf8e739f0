//! The root node.

use std::sync::{Arc, Weak};

use weft_core::{
    Capability, SharedBroadcaster, SourcePosition, Syntax, SyntaxCollection, SyntaxMeta, SyntaxRef,
};

use super::Statement;
use crate::writer::{StyleWriter, Writable};

/// A whole stylesheet: an ordered list of top-level statements.
#[derive(Debug)]
pub struct Stylesheet {
    meta: SyntaxMeta,
    statements: Arc<SyntaxCollection<dyn Statement>>,
}

impl Stylesheet {
    /// Create an empty stylesheet.
    pub fn new() -> Arc<Self> {
        Arc::new_cyclic(|this: &Weak<Stylesheet>| {
            let owner: Weak<dyn Syntax> = this.clone();
            Self {
                meta: SyntaxMeta::new(SourcePosition::new(1, 1)),
                statements: SyntaxCollection::new(owner),
            }
        })
    }

    /// The top-level statements.
    pub fn statements(&self) -> &Arc<SyntaxCollection<dyn Statement>> {
        &self.statements
    }

    /// Append a statement, announcing it if the stylesheet was broadcast.
    pub fn append(&self, statement: Arc<dyn Statement>) {
        self.statements.append(statement);
    }

    /// Number of top-level statements.
    pub fn len(&self) -> usize {
        self.statements.len()
    }

    /// Whether the stylesheet has no statements.
    pub fn is_empty(&self) -> bool {
        self.statements.is_empty()
    }
}

impl Syntax for Stylesheet {
    weft_core::impl_syntax_basics!();

    fn kind(&self) -> &'static str {
        "stylesheet"
    }

    fn capabilities(&self) -> &'static [Capability] {
        &[Capability::WRITABLE]
    }

    fn children(&self) -> Vec<SyntaxRef> {
        self.statements.units()
    }

    fn propagate_broadcast(&self, broadcaster: &SharedBroadcaster) {
        self.statements.propagate_broadcast(broadcaster);
    }
}

impl Writable for Stylesheet {
    fn write(&self, writer: &mut StyleWriter) {
        writer.write_top_level(&self.statements.to_vec());
    }
}
