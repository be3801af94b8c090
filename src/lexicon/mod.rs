//! Lexicon data structure: sets of words with per-character transitions and
//! per-word attribute values, plus their union (used for frontier
//! membership tests during path-tree stepping and beam search).

pub mod registry;

pub use registry::{LexiconId, LexiconRegistry, Sign, WordSet};

use crate::error::CompileError;
use crate::value::Value;
use std::collections::{HashMap, HashSet};

const ALPHABET: &str = "abcdefghijklmnopqrstuvwxyz'";

fn is_in_alphabet(word: &str) -> bool {
    word.chars().all(|c| ALPHABET.contains(c))
}

/// A finite non-empty set of non-empty lowercase words, each carrying an
/// attribute value (defaulting to the word itself), plus a prefix
/// transition table used to drive CTC beam search character-by-character.
#[derive(Debug, Clone)]
pub struct Lexicon {
    words: HashSet<String>,
    attributes: HashMap<String, Value>,
    transitions: HashMap<String, HashSet<char>>,
}

impl Lexicon {
    pub fn new(words: HashSet<String>, attributes: HashMap<String, Value>) -> Result<Self, CompileError> {
        if words.iter().any(|w| w.is_empty()) {
            return Err(CompileError::InvalidLexicon {
                name: String::new(),
                reason: "lexicon cannot contain the empty string".into(),
            });
        }
        for word in &words {
            if !is_in_alphabet(word) {
                return Err(CompileError::InvalidLexicon {
                    name: String::new(),
                    reason: format!("word '{word}' contains characters outside [a-z']"),
                });
            }
        }

        let transitions = build_transitions(&words);
        Ok(Self {
            words,
            attributes,
            transitions,
        })
    }

    pub fn contains(&self, word: &str) -> bool {
        self.words.contains(word)
    }

    pub fn is_prefix(&self, prefix: &str) -> bool {
        prefix.is_empty() || self.transitions.contains_key(prefix)
    }

    pub fn transitions(&self, prefix: &str) -> impl Iterator<Item = char> + '_ {
        self.transitions
            .get(prefix)
            .into_iter()
            .flat_map(|set| set.iter().copied())
    }

    pub fn attribute(&self, word: &str) -> Value {
        self.attributes
            .get(word)
            .cloned()
            .unwrap_or_else(|| Value::Word(word.to_string()))
    }

    pub fn words(&self) -> impl Iterator<Item = &String> {
        self.words.iter()
    }
}

/// Builds the per-prefix single-character transition table for `words`,
/// using the shortest-distinguishing-suffix trick from the source
/// implementation: a transition `prefix -> c` is only recorded the first
/// time `prefix + c` is reachable, walking each word from longest prefix to
/// shortest so redundant inner transitions are skipped.
fn build_transitions(words: &HashSet<String>) -> HashMap<String, HashSet<char>> {
    let mut transitions: HashMap<String, HashSet<char>> = HashMap::new();
    transitions.entry(String::new()).or_default();

    for word in words {
        let chars: Vec<char> = word.chars().collect();
        if transitions.contains_key(word) {
            continue;
        }
        transitions.entry(word.clone()).or_default();

        for end in (0..chars.len()).rev() {
            let prefix: String = chars[..end].iter().collect();
            let extension = chars[end];
            if let Some(set) = transitions.get(&prefix) {
                if set.contains(&extension) {
                    break;
                }
            }
            transitions.entry(prefix).or_default().insert(extension);
        }
    }

    transitions
}

/// A read-only view over several lexicons combined via set union; this is
/// what the path-tree frontier consults via `AbstractLexicon`-style queries
/// (membership, prefix-existence, single-character transitions).
pub struct LexiconUnion<'a> {
    lexicons: Vec<&'a Lexicon>,
}

impl<'a> LexiconUnion<'a> {
    pub fn new(lexicons: Vec<&'a Lexicon>) -> Self {
        Self { lexicons }
    }

    pub fn contains(&self, word: &str) -> bool {
        self.lexicons.iter().any(|lex| lex.contains(word))
    }

    pub fn is_prefix(&self, prefix: &str) -> bool {
        prefix.is_empty() || self.lexicons.iter().any(|lex| lex.is_prefix(prefix))
    }

    pub fn transitions(&self, prefix: &str) -> HashSet<char> {
        self.lexicons
            .iter()
            .filter(|lex| lex.is_prefix(prefix))
            .flat_map(|lex| lex.transitions(prefix))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lex(words: &[&str]) -> Lexicon {
        Lexicon::new(words.iter().map(|w| w.to_string()).collect(), HashMap::new()).unwrap()
    }

    #[test]
    fn rejects_empty_word() {
        let err = Lexicon::new(
            ["".to_string()].into_iter().collect(),
            HashMap::new(),
        )
        .unwrap_err();
        assert!(matches!(err, CompileError::InvalidLexicon { .. }));
    }

    #[test]
    fn rejects_out_of_alphabet() {
        let err = Lexicon::new(
            ["Hello".to_string()].into_iter().collect(),
            HashMap::new(),
        )
        .unwrap_err();
        assert!(matches!(err, CompileError::InvalidLexicon { .. }));
    }

    #[test]
    fn transitions_expose_single_character_extensions() {
        let l = lex(&["cat", "car"]);
        assert!(l.is_prefix("ca"));
        let next: HashSet<char> = l.transitions("ca").collect();
        assert_eq!(next, ['t', 'r'].into_iter().collect());
    }

    #[test]
    fn attribute_defaults_to_word() {
        let l = lex(&["hello"]);
        assert_eq!(l.attribute("hello"), Value::Word("hello".into()));
    }

    #[test]
    fn union_membership_and_prefix() {
        let a = lex(&["hello"]);
        let b = lex(&["world"]);
        let union = LexiconUnion::new(vec![&a, &b]);
        assert!(union.contains("hello"));
        assert!(union.contains("world"));
        assert!(!union.contains("goodbye"));
        assert!(union.is_prefix("wor"));
    }
}
