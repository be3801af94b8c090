mod code;
mod position;

use once_cell::unsync::OnceCell;
use std::collections::HashMap;

/// A line/column location within a grammar source string.
#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq)]
pub struct Position {
    pub line: usize,
    pub column: usize,
}

/// A grammar source string, with lazily-computed line-break offsets so
/// byte positions reported by the lexer can be translated into
/// human-readable [`Position`]s on demand.
pub struct Code<'c> {
    pub value: &'c [u8],
    line_breaks: OnceCell<Vec<usize>>,
}

/// The running maximum-probability total across `−∞`-safe log-probabilities.
pub const NEG_INFINITY: f64 = f64::NEG_INFINITY;

/// `logadd(a, b, ...) = log(sum(exp(a_i)))`, computed in a numerically stable
/// way by factoring out the maximum argument. All-`−∞` inputs return `−∞`
/// rather than `NaN`.
pub fn logadd(values: &[f64]) -> f64 {
    if values.iter().all(|v| *v == NEG_INFINITY) {
        return NEG_INFINITY;
    }
    let max = values.iter().cloned().fold(NEG_INFINITY, f64::max);
    let sum: f64 = values.iter().map(|v| (v - max).exp()).sum();
    max + sum.ln()
}

/// Indices of the `n` largest items, ties broken by original order.
pub fn top_n_indices(items: &[f64], n: usize) -> std::collections::HashSet<usize> {
    let mut indexed: Vec<(usize, f64)> = items.iter().cloned().enumerate().collect();
    indexed.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
    indexed.into_iter().take(n).map(|(i, _)| i).collect()
}

/// In-place reflexive transitive closure of an adjacency relation.
///
/// Used both for the lexicon reference/compound dependency graph and for
/// the nonterminal dependency graph: a name that can reach itself through
/// the closure indicates a cycle.
pub fn transitive_closure(mut relation: HashMap<String, std::collections::HashSet<String>>) -> HashMap<String, std::collections::HashSet<String>> {
    let mut last_size = usize::MAX;
    let mut size: usize = relation.values().map(|v| v.len()).sum();

    while size != last_size {
        let snapshot = relation.clone();
        for (_, children) in relation.iter_mut() {
            let additions: Vec<std::collections::HashSet<String>> = children
                .iter()
                .filter_map(|child| snapshot.get(child).cloned())
                .collect();
            for addition in additions {
                children.extend(addition);
            }
        }
        last_size = size;
        size = relation.values().map(|v| v.len()).sum();
    }

    relation
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn logadd_of_all_neg_infinity_is_neg_infinity() {
        assert_eq!(logadd(&[NEG_INFINITY, NEG_INFINITY]), NEG_INFINITY);
    }

    #[test]
    fn logadd_matches_hand_computation() {
        let got = logadd(&[0.0, 0.0]);
        assert!((got - 2f64.ln()).abs() < 1e-9);
    }

    #[test]
    fn transitive_closure_detects_self_reachability() {
        let mut rel = HashMap::new();
        rel.insert("a".to_string(), ["b"].iter().map(|s| s.to_string()).collect());
        rel.insert("b".to_string(), ["a"].iter().map(|s| s.to_string()).collect());
        let closed = transitive_closure(rel);
        assert!(closed["a"].contains("a"));
        assert!(closed["b"].contains("b"));
    }

    #[test]
    fn transitive_closure_acyclic_chain_has_no_self_loop() {
        let mut rel = HashMap::new();
        rel.insert("a".to_string(), ["b"].iter().map(|s| s.to_string()).collect());
        rel.insert("b".to_string(), ["c"].iter().map(|s| s.to_string()).collect());
        rel.insert("c".to_string(), std::collections::HashSet::new());
        let closed = transitive_closure(rel);
        assert!(!closed["a"].contains("a"));
        assert!(closed["a"].contains("c"));
    }
}
