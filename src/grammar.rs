//! The host-facing grammar builder: accumulates DSL source fragments and
//! registered lexicons/callbacks, then compiles everything into a
//! [`Soft`] transducer in one shot.

use crate::ast::compile_ast;
use crate::attribute::{AttributeRegistry, CallbackSpec};
use crate::dsl::Parser;
use crate::error::CompileError;
use crate::lexicon::registry::WordSet;
use crate::lexicon::{LexiconId, LexiconRegistry};
use crate::runtime::actions::Action;
use crate::soft::{Predicate, Soft};
use std::rc::Rc;

/// Accumulates grammar source text plus registered lexicons and callback
/// attributes; `compile` parses and lowers everything registered so far
/// into a transducer. A `Grammar` is consumed by `compile` — builders are
/// meant to be assembled once per grammar, not mutated afterward.
#[derive(Default)]
pub struct Grammar<Env> {
    config: Vec<String>,
    lexicon_registry: LexiconRegistry,
    attribute_registry: AttributeRegistry<Env>,
}

impl<Env: 'static> Grammar<Env> {
    pub fn new() -> Self {
        Self {
            config: Vec::new(),
            lexicon_registry: LexiconRegistry::new(),
            attribute_registry: AttributeRegistry::new(),
        }
    }

    /// Appends a fragment of DSL source text.
    pub fn register_text(&mut self, fragment: &str) {
        self.config.push(fragment.to_string());
    }

    /// Registers a word list as a lexicon, returning an id that can be
    /// interpolated into later DSL text as `:id`. `alias` gives it a stable,
    /// DSL-identifier-shaped name; without one an opaque auto id is used.
    pub fn register_words(&mut self, words: Vec<String>, alias: Option<&str>) -> LexiconId {
        self.lexicon_registry.new_from_words(WordSet::Words(words), alias)
    }

    /// Registers a word-to-attribute map as a lexicon; see [`Self::register_words`].
    pub fn register_attributed_words(
        &mut self,
        words: Vec<(String, crate::value::Value)>,
        alias: Option<&str>,
    ) -> LexiconId {
        self.lexicon_registry
            .new_from_words(WordSet::Attributed(words), alias)
    }

    /// Registers a callback, returning the attribute id referenced from DSL
    /// text as `%id`.
    pub fn register_callback(&mut self, spec: CallbackSpec<Env>, alias: Option<&str>) -> String {
        self.attribute_registry.new(spec, alias)
    }

    fn config_text(&self) -> String {
        self.config.join("\n")
    }

    /// Parses and lowers the accumulated configuration into a transducer,
    /// materializing every lexicon reachable from a compiled symbol
    /// transition.
    pub fn compile(mut self) -> Result<(Soft<Action<Env>>, Rc<LexiconRegistry>), CompileError> {
        let source = self.config_text();
        let rules = Parser::parse(&source, &mut self.lexicon_registry, &mut self.attribute_registry)?;
        let soft = compile_ast(rules)?;

        let predicates = soft
            .symbol_transitions
            .values()
            .filter_map(|t| match &t.predicate {
                Predicate::Lexicon(name) => Some(name.clone()),
                Predicate::BatchSeparator => None,
            })
            .collect::<Vec<_>>();
        self.lexicon_registry.compile(predicates)?;

        Ok((soft, Rc::new(self.lexicon_registry)))
    }
}
