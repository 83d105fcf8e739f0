//! Shared fixtures for unit tests.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::broadcast::{Broadcaster, Event};
use crate::collection::{GroupLink, Groupable};
use crate::error::Result;
use crate::refine::{Refinable, RefineContext, RefineState, Refinement};
use crate::subscription::Interest;
use crate::syntax::{Capability, SourcePosition, Syntax, SyntaxMeta, SyntaxRef};

/// A minimal named unit.
#[derive(Debug)]
pub struct Probe {
    meta: SyntaxMeta,
    pub name: String,
}

impl Probe {
    pub fn new(name: &str) -> Arc<Self> {
        Arc::new(Self {
            meta: SyntaxMeta::synthetic(),
            name: name.to_string(),
        })
    }

    pub fn named(name: &str) -> SyntaxRef {
        Self::new(name)
    }

    pub fn name_of(unit: &SyntaxRef) -> String {
        unit.downcast_ref::<Probe>()
            .map(|p| p.name.clone())
            .unwrap_or_else(|| unit.kind().to_string())
    }
}

impl Syntax for Probe {
    crate::impl_syntax_basics!();

    fn kind(&self) -> &'static str {
        "probe"
    }

    fn capabilities(&self) -> &'static [Capability] {
        &[Capability::WRITABLE]
    }
}

/// A terminal broadcaster that remembers what it saw.
#[derive(Default)]
pub struct Recorder {
    events: Mutex<Vec<Event>>,
}

impl Recorder {
    pub fn names(&self) -> Vec<String> {
        self.events
            .lock()
            .iter()
            .map(|e| Probe::name_of(e.unit()))
            .collect()
    }
}

impl Broadcaster for Recorder {
    fn broadcast(&self, event: Event) {
        self.events.lock().push(event);
    }
}

/// A named unit that lives in collections.
#[derive(Debug)]
pub struct Item {
    meta: SyntaxMeta,
    link: GroupLink,
    pub name: String,
}

impl Item {
    pub fn new(name: &str) -> Arc<Self> {
        Arc::new(Self {
            meta: SyntaxMeta::synthetic(),
            link: GroupLink::new(),
            name: name.to_string(),
        })
    }
}

impl Syntax for Item {
    crate::impl_syntax_basics!();

    fn kind(&self) -> &'static str {
        "item"
    }

    fn capabilities(&self) -> &'static [Capability] {
        &[Capability::GROUPABLE]
    }

    fn as_groupable(&self) -> Option<&dyn Groupable> {
        Some(self)
    }
}

impl Groupable for Item {
    fn group_link(&self) -> &GroupLink {
        &self.link
    }
}

/// A raw unit whose refined form is one [`Probe`] per word.
#[derive(Debug)]
pub struct Sentence {
    meta: SyntaxMeta,
    state: RefineState,
    text: String,
    words: Mutex<Vec<Arc<Probe>>>,
}

impl Sentence {
    pub fn raw(text: &str) -> SyntaxRef {
        Arc::new(Self {
            meta: SyntaxMeta::new(SourcePosition::new(1, 1)),
            state: RefineState::pending(),
            text: text.to_string(),
            words: Mutex::new(Vec::new()),
        })
    }

    pub fn split(&self, cx: &RefineContext<'_>) -> Result<Refinement> {
        if self.text.trim().is_empty() {
            return Err(crate::Error::parse("empty sentence", self.meta.position()));
        }
        for word in self.text.split_whitespace() {
            let word = Probe::new(word);
            self.words.lock().push(Arc::clone(&word));
            cx.broadcast(&word.into_syntax());
        }
        Ok(Refinement::Full)
    }

    pub fn word_count(&self) -> usize {
        self.words.lock().len()
    }
}

impl Syntax for Sentence {
    crate::impl_syntax_basics!();

    fn kind(&self) -> &'static str {
        "sentence"
    }

    fn capabilities(&self) -> &'static [Capability] {
        &[Capability::REFINABLE]
    }

    fn as_refinable(&self) -> Option<&dyn Refinable> {
        Some(self)
    }

    fn children(&self) -> Vec<SyntaxRef> {
        self.words.lock().iter().map(|w| Arc::clone(w).into_syntax()).collect()
    }
}

impl Refinable for Sentence {
    fn refine_state(&self) -> &RefineState {
        &self.state
    }

    fn refined_interests(&self) -> Vec<Interest> {
        vec![Interest::of::<Probe>()]
    }
}
