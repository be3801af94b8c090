use super::{Lexicon, LexiconUnion};
use crate::error::CompileError;
use crate::value::Value;
use std::cell::Cell;
use std::collections::{HashMap, HashSet};

pub type LexiconId = String;

const INLINE_PREFIX: &str = "___";

/// The `+`/`-` sign of one term of a compound lexicon expression
/// (`c1 + c2 - c3 ...`, evaluated left to right).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sign {
    Union,
    Difference,
}

/// Words to register as a new lexicon: either a bare word set (each word's
/// attribute defaults to itself) or an explicit word-to-attribute map.
pub enum WordSet {
    Words(Vec<String>),
    Attributed(Vec<(String, Value)>),
}

enum LexiconSymbol {
    WordSet(Vec<String>),
    AttributedWordSet(Vec<(String, Value)>),
    Reference(String),
    Compound(Vec<(Sign, String)>),
}

/// Registers lexicon literals, aliases and compound expressions during DSL
/// ingestion, validates and materializes them once at grammar compile time.
#[derive(Default)]
pub struct LexiconRegistry {
    symbols: HashMap<LexiconId, LexiconSymbol>,
    lexicons: HashMap<LexiconId, Lexicon>,
    vars: HashSet<String>,
    references: HashSet<String>,
    next_id: Cell<u64>,
}

impl LexiconRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn new_id(&self) -> LexiconId {
        let n = self.next_id.get();
        self.next_id.set(n + 1);
        format!("{INLINE_PREFIX}{n}")
    }

    /// Records that `name` must resolve to a defined lexicon by compile time
    /// (used for bare `:name` references appearing inside grammar rules,
    /// as distinct from lexicon-expression aliasing).
    pub fn reference(&mut self, name: &str) {
        self.references.insert(name.to_string());
    }

    /// Registers `identifier` as an alias for lexicon `ref_name`.
    pub fn assign(&mut self, identifier: &str, ref_name: &str) -> LexiconId {
        self.vars.insert(identifier.to_string());
        self.register_lexicon(LexiconSymbol::Reference(ref_name.to_string()), Some(identifier))
    }

    pub fn new_from_words(&mut self, words: WordSet, alias: Option<&str>) -> LexiconId {
        let symbol = match words {
            WordSet::Words(w) => LexiconSymbol::WordSet(w),
            WordSet::Attributed(w) => LexiconSymbol::AttributedWordSet(w),
        };
        self.register_lexicon(symbol, alias)
    }

    pub fn new_compound(&mut self, components: Vec<(Sign, String)>) -> LexiconId {
        self.register_lexicon(LexiconSymbol::Compound(components), None)
    }

    fn register_lexicon(&mut self, symbol: LexiconSymbol, alias: Option<&str>) -> LexiconId {
        match alias {
            Some(alias) => {
                assert!(!alias.starts_with(INLINE_PREFIX));
                self.symbols.insert(alias.to_string(), symbol);
                alias.to_string()
            }
            None => {
                let id = self.new_id();
                self.symbols.insert(id.clone(), symbol);
                id
            }
        }
    }

    /// Returns the materialized attribute for `word` in lexicon `name`,
    /// falling back to the word itself (see [`Lexicon::attribute`]).
    pub fn attribute(&self, name: &str, word: &str) -> Value {
        self.lexicons[name].attribute(word)
    }

    pub fn get_union(&self, names: &[String]) -> LexiconUnion<'_> {
        LexiconUnion::new(names.iter().map(|n| &self.lexicons[n]).collect())
    }

    pub fn get(&self, name: &str) -> &Lexicon {
        &self.lexicons[name]
    }

    fn deps(&self, name: &str, visited: &mut HashSet<String>, out: &mut HashSet<String>) -> Result<(), CompileError> {
        if !visited.insert(name.to_string()) {
            return Ok(());
        }
        let symbol = self
            .symbols
            .get(name)
            .ok_or_else(|| CompileError::UndefinedLexicon(name.to_string()))?;
        match symbol {
            LexiconSymbol::Reference(r) => {
                if self.vars.contains(r) {
                    out.insert(r.clone());
                }
                self.deps(r, visited, out)?;
            }
            LexiconSymbol::Compound(components) => {
                for (_, child) in components {
                    if self.vars.contains(child) {
                        out.insert(child.clone());
                    }
                    self.deps(child, visited, out)?;
                }
            }
            LexiconSymbol::WordSet(_) | LexiconSymbol::AttributedWordSet(_) => {}
        }
        Ok(())
    }

    /// Flattens references and applies compound operators left-to-right,
    /// without validating the result (callers check non-emptiness and the
    /// alphabet constraint once a concrete [`Lexicon`] is built).
    fn words_and_attributes(&self, name: &str) -> Result<(HashSet<String>, HashMap<String, Value>), CompileError> {
        let symbol = self
            .symbols
            .get(name)
            .ok_or_else(|| CompileError::UndefinedLexicon(name.to_string()))?;
        match symbol {
            LexiconSymbol::WordSet(words) => Ok((words.iter().cloned().collect(), HashMap::new())),
            LexiconSymbol::AttributedWordSet(words) => Ok((
                words.iter().map(|(w, _)| w.clone()).collect(),
                words.iter().cloned().collect(),
            )),
            LexiconSymbol::Reference(r) => {
                if let Some(lex) = self.lexicons.get(r) {
                    Ok((
                        lex.words().cloned().collect(),
                        lex.words()
                            .map(|w| (w.clone(), lex.attribute(w)))
                            .collect(),
                    ))
                } else {
                    self.words_and_attributes(r)
                }
            }
            LexiconSymbol::Compound(components) => {
                let mut words = HashSet::new();
                let mut attributes = HashMap::new();
                for (sign, child) in components {
                    let (child_words, child_attrs) = self.words_and_attributes(child)?;
                    match sign {
                        Sign::Difference => {
                            for w in &child_words {
                                words.remove(w);
                                attributes.remove(w);
                            }
                        }
                        Sign::Union => {
                            words.extend(child_words);
                            attributes.extend(child_attrs);
                        }
                    }
                }
                Ok((words, attributes))
            }
        }
    }

    /// Finalizes the registry: validates references and cycles, then
    /// materializes every named variable and every predicate lexicon named
    /// by a compiled symbol transition.
    pub fn compile(&mut self, predicates: impl IntoIterator<Item = String>) -> Result<(), CompileError> {
        for r in &self.references {
            if !self.symbols.contains_key(r) {
                return Err(CompileError::UndefinedLexicon(r.clone()));
            }
        }

        let mut dependence: HashMap<String, HashSet<String>> = HashMap::new();
        for var in &self.vars {
            let mut out = HashSet::new();
            self.deps(var, &mut HashSet::new(), &mut out)?;
            dependence.insert(var.clone(), out);
        }
        let dependence = crate::util::transitive_closure(dependence);
        for (var, deps) in &dependence {
            if deps.contains(var) {
                return Err(CompileError::CircularLexiconDefinition(var.clone()));
            }
        }

        let mut vars: Vec<&String> = self.vars.iter().collect();
        vars.sort_by_key(|v| dependence.get(*v).map(|d| d.len()).unwrap_or(0));
        for var in vars {
            let (words, attrs) = self.words_and_attributes(var)?;
            let lex = Lexicon::new(words, attrs).map_err(|e| rename_invalid(e, var))?;
            self.lexicons.insert(var.clone(), lex);
        }

        for pred in predicates {
            if self.lexicons.contains_key(&pred) {
                continue;
            }
            let (words, attrs) = self.words_and_attributes(&pred)?;
            let lex = Lexicon::new(words, attrs).map_err(|e| rename_invalid(e, &pred))?;
            self.lexicons.insert(pred, lex);
        }

        Ok(())
    }
}

fn rename_invalid(err: CompileError, name: &str) -> CompileError {
    match err {
        CompileError::InvalidLexicon { reason, .. } => CompileError::InvalidLexicon {
            name: name.to_string(),
            reason,
        },
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn undefined_reference_is_an_error() {
        let mut reg = LexiconRegistry::new();
        reg.reference("missing");
        let err = reg.compile(std::iter::empty()).unwrap_err();
        assert!(matches!(err, CompileError::UndefinedLexicon(_)));
    }

    #[test]
    fn circular_alias_is_detected() {
        let mut reg = LexiconRegistry::new();
        reg.assign("a", "b");
        reg.assign("b", "a");
        let err = reg.compile(std::iter::empty()).unwrap_err();
        assert!(matches!(err, CompileError::CircularLexiconDefinition(_)));
    }

    #[test]
    fn compound_union_and_difference() {
        let mut reg = LexiconRegistry::new();
        reg.new_from_words(WordSet::Words(vec!["a".into(), "b".into()]), Some("base"));
        reg.new_from_words(WordSet::Words(vec!["b".into(), "c".into()]), Some("extra"));
        let id = reg.new_compound(vec![
            (Sign::Union, "base".into()),
            (Sign::Union, "extra".into()),
            (Sign::Difference, "extra".into()),
        ]);
        reg.compile([id.clone()]).unwrap();
        let lex = reg.get(&id);
        assert!(lex.contains("a"));
        assert!(!lex.contains("b"));
        assert!(!lex.contains("c"));
    }
}
