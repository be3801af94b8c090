//! CTC prefix-beam search, constrained to only ever complete a word the
//! grammar's current frontier actually accepts.

use crate::lexicon::LexiconRegistry;
use crate::runtime::actions::Action;
use crate::runtime::path_tree::{
    batch_separator_transition, predicate_transitions, step_tree, transition_from_word, PathLeaves,
};
use crate::runtime::token_encoding::TokenEncoding;
use crate::soft::Soft;
use crate::util::{logadd, top_n_indices, NEG_INFINITY};
use std::collections::HashMap;

pub type TokenWord = Vec<u32>;

/// The forward/backward-style split CTC keeps per hypothesis: the
/// probability mass ending in a blank versus not, combined on demand via
/// [`Self::total_probability`].
#[derive(Debug, Clone, Copy)]
pub struct HypothesisProbabilities {
    pub blank: f64,
    pub no_blank: f64,
}

impl HypothesisProbabilities {
    pub fn initial() -> Self {
        Self {
            blank: NEG_INFINITY,
            no_blank: 0.0,
        }
    }

    pub fn new() -> Self {
        Self {
            blank: NEG_INFINITY,
            no_blank: NEG_INFINITY,
        }
    }

    pub fn total_probability(&self) -> f64 {
        logadd(&[self.no_blank, self.blank])
    }

    pub fn propose_blank(&mut self, last: &Self, p: f64) {
        self.blank = logadd(&[self.blank, p + last.blank, p + last.no_blank]);
    }

    pub fn propose_last_token_unchanged(&mut self, last: &Self, p: f64) {
        self.no_blank = logadd(&[self.no_blank, p + last.no_blank]);
    }

    pub fn propose_last_token_extended(&mut self, last: &Self, p: f64) {
        self.no_blank = logadd(&[self.no_blank, p + last.blank]);
    }

    pub fn propose_new_char(&mut self, last: &Self, p: f64) {
        self.no_blank = logadd(&[self.no_blank, p + last.blank, p + last.no_blank]);
    }
}

/// A beam-search hypothesis: the token word completed so far (one entry per
/// grammar word already accepted) and the token prefix of the word in
/// progress.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct Hypothesis {
    pub prefix: TokenWord,
    pub completed: Vec<TokenWord>,
}

impl Hypothesis {
    pub fn empty() -> Self {
        Self::default()
    }

    fn transition(&self) -> Self {
        let mut completed = self.completed.clone();
        completed.push(self.prefix.clone());
        Self {
            prefix: Vec::new(),
            completed,
        }
    }

    fn extend_current_prefix(&self, token: u32) -> Self {
        let mut prefix = self.prefix.clone();
        prefix.push(token);
        Self {
            prefix,
            completed: self.completed.clone(),
        }
    }
}

fn last_token(token_encoding: &TokenEncoding, hyp: &Hypothesis) -> u32 {
    *hyp.prefix.last().unwrap_or(&token_encoding.space)
}

struct Cache<'a> {
    lexicon_registry: &'a LexiconRegistry,
    lexicons: HashMap<Vec<TokenWord>, Vec<String>>,
}

impl<'a> Cache<'a> {
    fn prefix_complete(&self, token_encoding: &TokenEncoding, hyp: &Hypothesis) -> bool {
        let names = &self.lexicons[&hyp.completed];
        let union = self.lexicon_registry.get_union(names);
        let word = token_encoding.decode(&hyp.prefix);
        union.contains(&word)
    }

    fn token_proposals(&self, token_encoding: &TokenEncoding, hyp: &Hypothesis) -> Vec<u32> {
        let names = &self.lexicons[&hyp.completed];
        let union = self.lexicon_registry.get_union(names);
        let word = token_encoding.decode(&hyp.prefix);
        union
            .transitions(&word)
            .into_iter()
            .map(|c| token_encoding.encode(&c.to_string())[0])
            .collect()
    }

    fn valid_prediction(&self, token_encoding: &TokenEncoding, hyp: &Hypothesis) -> bool {
        self.prefix_complete(token_encoding, hyp) || hyp.prefix.is_empty()
    }
}

/// Result of a completed beam search: the decoded words, the winning
/// hypothesis' total log-probability, and the grammar frontier after
/// consuming them. A `None` result ("bad end") means no hypothesis survived
/// to a grammar-valid completion.
pub struct BeamSearchResult<Env> {
    pub words: Vec<String>,
    pub log_probability: f64,
    pub leaves: PathLeaves<Env>,
}

/// Runs CTC prefix-beam search over `ctc_output` (one row of per-token
/// log-probabilities per frame), constraining word completions to those the
/// grammar frontier accepts at each step.
pub fn beam_search<Env>(
    soft: &Soft<Action<Env>>,
    lexicon_registry: &LexiconRegistry,
    initial_leaves: PathLeaves<Env>,
    ctc_output: &[Vec<f64>],
    token_encoding: &TokenEncoding,
    beam_width: usize,
    n_token_proposals: usize,
) -> Option<BeamSearchResult<Env>> {
    let mut grammar_states: HashMap<Vec<TokenWord>, PathLeaves<Env>> = HashMap::new();
    let mut cache = Cache {
        lexicon_registry,
        lexicons: HashMap::new(),
    };

    let leaves = initial_leaves;
    let names = predicate_transitions(soft, &leaves);
    cache.lexicons.insert(Vec::new(), names);
    grammar_states.insert(Vec::new(), leaves);

    let mut sorted_beam: Vec<(Hypothesis, HypothesisProbabilities)> =
        vec![(Hypothesis::empty(), HypothesisProbabilities::initial())];

    let last = ctc_output.len().saturating_sub(1);
    for (i, frame) in ctc_output.iter().enumerate() {
        let top_tokens = top_n_indices(frame, n_token_proposals);
        let mut next_beam: HashMap<Hypothesis, HypothesisProbabilities> = HashMap::new();

        for (hyp, probs) in &sorted_beam {
            let blank = token_encoding.blank as usize;
            if top_tokens.contains(&blank) {
                next_beam
                    .entry(hyp.clone())
                    .or_insert_with(HypothesisProbabilities::new)
                    .propose_blank(probs, frame[blank]);
            }

            let lt = last_token(token_encoding, hyp) as usize;
            if top_tokens.contains(&lt) {
                next_beam
                    .entry(hyp.clone())
                    .or_insert_with(HypothesisProbabilities::new)
                    .propose_last_token_unchanged(probs, frame[lt]);
            }

            let space = token_encoding.space as usize;
            if top_tokens.contains(&space) && cache.prefix_complete(token_encoding, hyp) {
                let next_hyp = hyp.transition();
                if !grammar_states.contains_key(&next_hyp.completed) {
                    let word = token_encoding.decode(&hyp.prefix);
                    let leaves = transition_from_word(
                        soft,
                        |lexicon, w| lexicon_registry.get(lexicon).contains(w),
                        &grammar_states[&hyp.completed],
                        &word,
                    );
                    let leaves = step_tree(soft, leaves);
                    let names = predicate_transitions(soft, &leaves);
                    cache.lexicons.insert(next_hyp.completed.clone(), names);
                    grammar_states.insert(next_hyp.completed.clone(), leaves);
                }
                next_beam
                    .entry(next_hyp.clone())
                    .or_insert_with(HypothesisProbabilities::new)
                    .propose_new_char(probs, frame[space]);
            }

            for token in cache.token_proposals(token_encoding, hyp) {
                if top_tokens.contains(&(token as usize)) {
                    let next_hyp = hyp.extend_current_prefix(token);
                    let entry = next_beam
                        .entry(next_hyp)
                        .or_insert_with(HypothesisProbabilities::new);
                    if token == last_token(token_encoding, hyp) {
                        entry.propose_last_token_extended(probs, frame[token as usize]);
                    } else {
                        entry.propose_new_char(probs, frame[token as usize]);
                    }
                }
            }
        }

        if next_beam.is_empty() {
            return None;
        }

        let mut beam: Vec<(Hypothesis, HypothesisProbabilities)> = next_beam.into_iter().collect();
        beam.sort_by(|a, b| b.1.total_probability().partial_cmp(&a.1.total_probability()).unwrap());
        if i != last {
            beam.truncate(beam_width);
        }
        sorted_beam = beam;
    }

    for (hyp, probs) in &sorted_beam {
        if !cache.valid_prediction(token_encoding, hyp) {
            continue;
        }

        let mut hyp = hyp.clone();
        if cache.prefix_complete(token_encoding, &hyp) {
            let next_hyp = hyp.transition();
            if !grammar_states.contains_key(&next_hyp.completed) {
                let word = token_encoding.decode(&hyp.prefix);
                let leaves = transition_from_word(
                    soft,
                    |lexicon, w| lexicon_registry.get(lexicon).contains(w),
                    &grammar_states[&hyp.completed],
                    &word,
                );
                let leaves = step_tree(soft, leaves);
                let names = predicate_transitions(soft, &leaves);
                cache.lexicons.insert(next_hyp.completed.clone(), names);
                grammar_states.insert(next_hyp.completed.clone(), leaves);
            }
            hyp = next_hyp;
        }

        let leaves = grammar_states[&hyp.completed].clone();
        let leaves = batch_separator_transition(soft, &leaves);
        let leaves = step_tree(soft, leaves);
        if leaves.is_empty() {
            continue;
        }

        let words = hyp.completed.iter().map(|t| token_encoding.decode(t)).collect();
        return Some(BeamSearchResult {
            words,
            log_probability: probs.total_probability(),
            leaves,
        });
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hypothesis_probabilities_combine_via_logadd() {
        let a = HypothesisProbabilities::initial();
        assert_eq!(a.total_probability(), 0.0);
    }

    #[test]
    fn transition_moves_prefix_into_completed() {
        let hyp = Hypothesis::empty().extend_current_prefix(3).transition();
        assert_eq!(hyp.completed, vec![vec![3]]);
        assert!(hyp.prefix.is_empty());
    }
}
