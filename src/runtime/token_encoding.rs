//! Maps CTC output matrix columns ("tokens") to characters and back.

use std::collections::{HashMap, HashSet};

const DEFAULT_ALPHABET: &str = " abcdefghijklmnopqrstuvwxyz'.";

/// A token is a column index into a CTC output frame. Column `blank`
/// ("`.`" by convention here, not the more common empty/epsilon symbol) is
/// the CTC blank; `space` separates words within a hypothesis.
#[derive(Debug, Clone)]
pub struct TokenEncoding {
    token_to_char: HashMap<u32, char>,
    char_to_token: HashMap<char, u32>,
    pub space: u32,
    pub blank: u32,
}

impl TokenEncoding {
    pub fn from_char_to_token(char_to_token: HashMap<char, u32>) -> Self {
        let token_to_char = char_to_token.iter().map(|(c, t)| (*t, *c)).collect();
        let space = char_to_token[&' '];
        let blank = char_to_token[&'.'];
        Self {
            token_to_char,
            char_to_token,
            space,
            blank,
        }
    }

    /// Builds the encoding from the default alphabet `" a..z'."`, in index
    /// order — the layout a model trained against this vocabulary would
    /// emit.
    pub fn default_alphabet() -> Self {
        let char_to_token = DEFAULT_ALPHABET
            .chars()
            .enumerate()
            .map(|(i, c)| (c, i as u32))
            .collect();
        Self::from_char_to_token(char_to_token)
    }

    pub fn n_tokens(&self) -> usize {
        self.token_to_char.len()
    }

    pub fn encode(&self, s: &str) -> Vec<u32> {
        s.chars().map(|c| self.char_to_token[&c]).collect()
    }

    pub fn decode(&self, tokens: &[u32]) -> String {
        tokens.iter().map(|t| self.token_to_char[t]).collect()
    }

    /// Greedily decodes a CTC output matrix (one row of per-token
    /// probabilities per frame) by taking the argmax token each frame, then
    /// collapsing repeats and dropping blanks.
    pub fn greedy_decode(&self, ctc: &[Vec<f64>]) -> String {
        let tokens: Vec<u32> = ctc
            .iter()
            .map(|frame| {
                frame
                    .iter()
                    .enumerate()
                    .max_by(|a, b| a.1.partial_cmp(b.1).unwrap())
                    .map(|(i, _)| i as u32)
                    .unwrap_or(self.blank)
            })
            .collect();
        squash(&self.decode(&tokens), '.')
    }

    pub fn ignored_tokens(&self) -> HashSet<u32> {
        let known: HashSet<char> = DEFAULT_ALPHABET.chars().collect();
        self.char_to_token
            .iter()
            .filter(|(c, _)| !known.contains(c))
            .map(|(_, t)| *t)
            .collect()
    }
}

/// Collapses consecutive duplicate characters, then drops every occurrence
/// of `drop`.
fn squash(s: &str, drop: char) -> String {
    let mut out = String::new();
    let mut last: Option<char> = None;
    for c in s.chars() {
        if Some(c) != last {
            out.push(c);
        }
        last = Some(c);
    }
    out.chars().filter(|c| *c != drop).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_decode_round_trip() {
        let enc = TokenEncoding::default_alphabet();
        let tokens = enc.encode("cat");
        assert_eq!(enc.decode(&tokens), "cat");
    }

    #[test]
    fn squash_collapses_repeats_and_drops_blank() {
        assert_eq!(squash("ccaa..tt", '.'), "cat");
    }

    #[test]
    fn greedy_decode_picks_argmax_each_frame() {
        let enc = TokenEncoding::default_alphabet();
        let c = enc.char_to_token[&'c'] as usize;
        let dot = enc.char_to_token[&'.'] as usize;
        let mut frame_c = vec![0.0; enc.n_tokens()];
        frame_c[c] = 10.0;
        let mut frame_blank = vec![0.0; enc.n_tokens()];
        frame_blank[dot] = 10.0;
        let ctc = vec![frame_c.clone(), frame_c, frame_blank];
        assert_eq!(enc.greedy_decode(&ctc), "c");
    }

    fn one_hot(enc: &TokenEncoding, token: u32) -> Vec<f64> {
        let mut frame = vec![0.0; enc.n_tokens()];
        frame[token as usize] = 10.0;
        frame
    }

    /// Builds a CTC frame matrix whose greedy decode reproduces `s` exactly:
    /// one one-hot frame per character, with a blank frame inserted between
    /// two equal consecutive characters so `squash` doesn't collapse them.
    fn simulate_ctc(enc: &TokenEncoding, s: &str) -> Vec<Vec<f64>> {
        let chars: Vec<char> = s.chars().collect();
        let mut frames = Vec::new();
        for (i, c) in chars.iter().enumerate() {
            if i > 0 && chars[i - 1] == *c {
                frames.push(one_hot(enc, enc.blank));
            }
            frames.push(one_hot(enc, enc.char_to_token[c]));
        }
        frames
    }

    proptest::proptest! {
        #[test]
        fn encode_decode_round_trip_prop(s in "[ a-z']{0,20}") {
            let enc = TokenEncoding::default_alphabet();
            let tokens = enc.encode(&s);
            proptest::prop_assert_eq!(enc.decode(&tokens), s);
        }

        #[test]
        fn greedy_decode_reproduces_source_string(s in "[a-z']{1,20}") {
            let enc = TokenEncoding::default_alphabet();
            let ctc = simulate_ctc(&enc, &s);
            proptest::prop_assert_eq!(enc.greedy_decode(&ctc), s);
        }
    }
}
