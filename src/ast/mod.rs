//! The typed abstract syntax tree grammars are lowered to before compiling
//! to a [`crate::soft::Soft`] transducer. This is the heart of the crate:
//! every DSL construct bottoms out in one of these node kinds, and each
//! knows how to compile itself, whether it can match the empty utterance,
//! and which nonterminals it depends on.

use crate::attribute::CallbackSpec;
use crate::error::CompileError;
use crate::runtime::actions::{
    self, consume_word, invoke_attribute, named_capture, positional_capture, push_immutable,
    push_mutable_closure, push_mutable_list, sequence, snoc, snoc_closure_namespace, Action,
};
use crate::soft::{Predicate, Soft, StateId};
use crate::value::{CaptureKey, Value};
use std::collections::{HashMap, HashSet};

pub type Rules<Env> = HashMap<String, Ast<Env>>;

/// One node of the grammar AST, generic over the host environment type
/// threaded through attribute callbacks.
pub enum Ast<Env> {
    Cat(Vec<Ast<Env>>),
    Alt(Vec<Ast<Env>>),
    Nonterminal(String),
    AttributedExpression {
        expression: Box<Ast<Env>>,
        callback: CallbackSpec<Env>,
        capture_keys: HashSet<CaptureKey>,
        /// True for an inline `unit -> attr` action: the callback always
        /// runs for effect only, regardless of the enclosing context's
        /// `with_return` demand.
        void: bool,
    },
    Lexicon(String),
    PositionalCapture {
        child: Box<Ast<Env>>,
        position: u32,
    },
    NamedCapture {
        child: Box<Ast<Env>>,
        alias: String,
    },
    Null,
    Closure {
        child: Box<Ast<Env>>,
        capture_keys: HashSet<CaptureKey>,
    },
    PositiveClosure {
        child: Box<Ast<Env>>,
        capture_keys: HashSet<CaptureKey>,
    },
    Maybe(Box<Ast<Env>>),
    WithinUtteranceExpression(Box<Ast<Env>>),
}

impl<Env: 'static> Ast<Env> {
    pub fn nullable(&self, rules: &Rules<Env>) -> bool {
        match self {
            Ast::Cat(children) => children.iter().all(|c| c.nullable(rules)),
            Ast::Alt(children) => children.iter().any(|c| c.nullable(rules)),
            Ast::Nonterminal(name) => rules[name].nullable(rules),
            Ast::AttributedExpression { expression, .. } => expression.nullable(rules),
            Ast::Lexicon(_) => false,
            Ast::PositionalCapture { child, .. } => child.nullable(rules),
            Ast::NamedCapture { child, .. } => child.nullable(rules),
            Ast::Null => true,
            Ast::Closure { .. } => true,
            Ast::PositiveClosure { child, .. } => child.nullable(rules),
            Ast::Maybe(_) => true,
            Ast::WithinUtteranceExpression(child) => child.nullable(rules),
        }
    }

    pub fn nonterminal_dependencies(&self) -> HashSet<String> {
        match self {
            Ast::Cat(children) | Ast::Alt(children) => children
                .iter()
                .flat_map(|c| c.nonterminal_dependencies())
                .collect(),
            Ast::Nonterminal(name) => [name.clone()].into_iter().collect(),
            Ast::AttributedExpression { expression, .. } => expression.nonterminal_dependencies(),
            Ast::Lexicon(_) | Ast::Null => HashSet::new(),
            Ast::PositionalCapture { child, .. }
            | Ast::NamedCapture { child, .. }
            | Ast::Closure { child, .. }
            | Ast::PositiveClosure { child, .. }
            | Ast::Maybe(child)
            | Ast::WithinUtteranceExpression(child) => child.nonterminal_dependencies(),
        }
    }

    /// Every node in this subtree, pre-order, for the whole-grammar
    /// validation pass in [`compile_ast`].
    pub fn iter_nodes(&self) -> Vec<&Ast<Env>> {
        let mut out = vec![self];
        match self {
            Ast::Cat(children) | Ast::Alt(children) => {
                for c in children {
                    out.extend(c.iter_nodes());
                }
            }
            Ast::Nonterminal(_) | Ast::Lexicon(_) | Ast::Null => {}
            Ast::AttributedExpression { expression, .. } => out.extend(expression.iter_nodes()),
            Ast::PositionalCapture { child, .. }
            | Ast::NamedCapture { child, .. }
            | Ast::Closure { child, .. }
            | Ast::PositiveClosure { child, .. }
            | Ast::Maybe(child)
            | Ast::WithinUtteranceExpression(child) => out.extend(child.iter_nodes()),
        }
        out
    }

    /// Checks that this attributed expression's capture keys and callback
    /// arity agree: positional keys must be exactly `1..=max`, the callback
    /// must take exactly as many non-`env` parameters as there are capture
    /// keys, and every named parameter must correspond to a named capture.
    fn validate_attribution(
        callback: &CallbackSpec<Env>,
        capture_keys: &HashSet<CaptureKey>,
    ) -> Result<(), CompileError> {
        let int_keys: HashSet<u32> = capture_keys
            .iter()
            .filter_map(|k| match k {
                CaptureKey::Positional(n) => Some(*n),
                _ => None,
            })
            .collect();
        if !int_keys.is_empty() {
            let max_key = *int_keys.iter().max().unwrap();
            let expected: HashSet<u32> = (1..=max_key).collect();
            if int_keys != expected {
                return Err(CompileError::Config(
                    "attribute signature does not match captures".into(),
                ));
            }
        }
        if callback.arity() != capture_keys.len() {
            return Err(CompileError::Config(
                "incorrect number of attribute args".into(),
            ));
        }
        let named_keys: HashSet<&str> = capture_keys
            .iter()
            .filter_map(|k| match k {
                CaptureKey::Named(n) => Some(n.as_str()),
                _ => None,
            })
            .collect();
        if !named_keys.is_subset(&callback.named_params()) {
            return Err(CompileError::Config(
                "named captures with no corresponding attribute arg".into(),
            ));
        }
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    fn compile(
        &self,
        soft: &mut Soft<Action<Env>>,
        rules: &Rules<Env>,
        initial: StateId,
        final_: StateId,
        within_utterance: bool,
        with_return: bool,
    ) -> Result<(), CompileError> {
        match self {
            Ast::Cat(children) => {
                let mut initial = initial;
                if with_return {
                    initial = soft.add_skip_transition(initial, Some(push_mutable_list()));
                }
                for child in children {
                    if !within_utterance && !child.nullable(rules) {
                        initial = soft.add_batch_separator_reflection(initial);
                    }
                    let child_final = soft.new_state();
                    child.compile(soft, rules, initial, child_final, within_utterance, with_return)?;
                    initial = if with_return {
                        soft.add_skip_transition(child_final, Some(snoc()))
                    } else {
                        child_final
                    };
                }
                soft.add_skip_transition_to(initial, final_, None);
            }
            Ast::Alt(children) => {
                let mut initial = initial;
                if !within_utterance && !children.iter().all(|c| c.nullable(rules)) {
                    initial = soft.add_batch_separator_reflection(initial);
                }
                let states = soft.add_choice_transitions(initial, children.len());
                for (child, state) in children.iter().zip(states) {
                    child.compile(soft, rules, state, final_, within_utterance, with_return)?;
                }
            }
            Ast::Nonterminal(name) => {
                rules[name].compile(soft, rules, initial, final_, within_utterance, with_return)?;
            }
            Ast::AttributedExpression {
                expression,
                callback,
                capture_keys,
                void,
            } => {
                let penultimate = soft.new_state();
                let initial = soft.add_skip_transition(initial, Some(actions::push_namespace(capture_keys.clone())));
                expression.compile(soft, rules, initial, penultimate, within_utterance, true)?;
                soft.add_skip_transition_to(
                    penultimate,
                    final_,
                    Some(invoke_attribute(callback.clone(), with_return && !void)),
                );
            }
            Ast::Lexicon(predicate) => {
                let initial = if !within_utterance {
                    soft.add_batch_separator_reflection(initial)
                } else {
                    initial
                };
                soft.add_symbol_transition_to(
                    initial,
                    final_,
                    Predicate::lexicon(predicate.clone()),
                    Some(consume_word(predicate.clone(), with_return)),
                );
            }
            Ast::PositionalCapture { child, position } => {
                if !with_return {
                    return Err(CompileError::Config(format!(
                        "capture @{position} occurs where no attribute consumes its value"
                    )));
                }
                let intermediate = soft.new_state();
                child.compile(soft, rules, initial, intermediate, within_utterance, with_return)?;
                soft.add_skip_transition_to(intermediate, final_, Some(positional_capture(*position)));
            }
            Ast::NamedCapture { child, alias } => {
                if !with_return {
                    return Err(CompileError::Config(format!(
                        "capture @{alias} occurs where no attribute consumes its value"
                    )));
                }
                let intermediate = soft.new_state();
                child.compile(soft, rules, initial, intermediate, within_utterance, with_return)?;
                soft.add_skip_transition_to(intermediate, final_, Some(named_capture(alias.clone())));
            }
            Ast::Null => {
                soft.add_skip_transition_to(initial, final_, Some(push_immutable(Value::None)));
            }
            Ast::Closure { child, capture_keys } => {
                if !with_return {
                    let states = soft.add_choice_transitions(initial, 2);
                    let (loop_state, exit_state) = (states[0], states[1]);
                    soft.add_skip_transition_to(exit_state, final_, None);
                    let loop_state = if within_utterance {
                        loop_state
                    } else {
                        soft.add_batch_separator_reflection(loop_state)
                    };
                    child.compile(soft, rules, loop_state, initial, within_utterance, with_return)?;
                } else {
                    let state2 = soft.add_skip_transition(initial, Some(push_mutable_closure()));
                    let states = soft.add_choice_transitions(state2, 2);
                    let (loop_state, exit_state) = (states[0], states[1]);
                    soft.add_skip_transition_to(exit_state, final_, None);
                    let loop_state = if within_utterance {
                        loop_state
                    } else {
                        soft.add_batch_separator_reflection(loop_state)
                    };
                    let state4 = soft.add_skip_transition(loop_state, Some(actions::push_namespace(capture_keys.clone())));
                    let state5 = soft.new_state();
                    child.compile(soft, rules, state4, state5, within_utterance, with_return)?;
                    soft.add_skip_transition_to(
                        state5,
                        state2,
                        Some(sequence(vec![snoc(), snoc_closure_namespace()])),
                    );
                }
            }
            Ast::Maybe(child) => {
                let mut initial = initial;
                if !within_utterance && !child.nullable(rules) {
                    initial = soft.add_batch_separator_reflection(initial);
                }
                let states = soft.add_choice_transitions(initial, 2);
                let skip_output = if with_return { Some(push_immutable(Value::None)) } else { None };
                soft.add_skip_transition_to(states[1], final_, skip_output);
                child.compile(soft, rules, states[0], final_, within_utterance, with_return)?;
            }
            Ast::PositiveClosure { child, capture_keys } => {
                if !with_return {
                    let second = if !within_utterance {
                        soft.add_batch_separator_reflection(initial)
                    } else {
                        soft.add_skip_transition(initial, None)
                    };
                    let penultimate = soft.new_state();
                    child.compile(soft, rules, second, penultimate, within_utterance, with_return)?;
                    let states = soft.add_choice_transitions(penultimate, 2);
                    soft.add_skip_transition_to(states[0], initial, None);
                    soft.add_skip_transition_to(states[1], final_, None);
                } else {
                    let initial = soft.add_skip_transition(initial, Some(push_mutable_closure()));
                    let second = if !within_utterance {
                        soft.add_batch_separator_reflection(initial)
                    } else {
                        soft.add_skip_transition(initial, None)
                    };
                    let child_initial =
                        soft.add_skip_transition(second, Some(actions::push_namespace(capture_keys.clone())));
                    let child_final = soft.new_state();
                    child.compile(soft, rules, child_initial, child_final, within_utterance, with_return)?;
                    let penultimate = soft.add_skip_transition(
                        child_final,
                        Some(sequence(vec![snoc(), snoc_closure_namespace()])),
                    );
                    let states = soft.add_choice_transitions(penultimate, 2);
                    soft.add_skip_transition_to(states[0], initial, None);
                    soft.add_skip_transition_to(states[1], final_, None);
                }
            }
            Ast::WithinUtteranceExpression(child) => {
                child.compile(soft, rules, initial, final_, true, with_return)?;
            }
        }
        Ok(())
    }
}

/// Validates a complete rule set (undefined/circular nonterminals,
/// non-nullable closure children, attribute arity) and compiles its `start`
/// rule into a fresh transducer.
pub fn compile_ast<Env: 'static>(rules: Rules<Env>) -> Result<Soft<Action<Env>>, CompileError> {
    let mut dependencies: HashMap<String, HashSet<String>> = rules
        .iter()
        .map(|(name, ast)| (name.clone(), ast.nonterminal_dependencies()))
        .collect();

    for deps in dependencies.values() {
        for nt in deps {
            if !rules.contains_key(nt) {
                return Err(CompileError::UndefinedNonterminal(nt.clone()));
            }
        }
    }

    dependencies = crate::util::transitive_closure(dependencies);
    for (name, deps) in &dependencies {
        if deps.contains(name) {
            return Err(CompileError::CircularNonterminal(name.clone()));
        }
    }

    for top in rules.values() {
        for node in top.iter_nodes() {
            match node {
                Ast::Closure { child, .. } | Ast::PositiveClosure { child, .. } => {
                    if child.nullable(&rules) {
                        return Err(CompileError::Config(
                            "closures cannot have nullable children".into(),
                        ));
                    }
                }
                Ast::AttributedExpression {
                    callback,
                    capture_keys,
                    ..
                } => {
                    Ast::validate_attribution(callback, capture_keys)?;
                }
                _ => {}
            }
        }
    }

    if !rules.contains_key("start") {
        return Err(CompileError::Config("no 'start' nonterminal defined".into()));
    }

    let mut soft = Soft::new();
    let initial = soft.initial;
    let final_ = soft.new_state();
    rules["start"].compile(&mut soft, &rules, initial, final_, false, false)?;
    Ok(soft)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attribute::ParamSpec;
    use std::rc::Rc;

    fn const_callback(arity: usize) -> CallbackSpec<()> {
        CallbackSpec {
            params: (0..arity).map(|_| ParamSpec::Positional).collect(),
            func: Rc::new(|_, args| Ok(Value::List(args.to_vec()))),
        }
    }

    #[test]
    fn compiles_a_single_lexicon_rule() {
        let mut rules: Rules<()> = HashMap::new();
        rules.insert("start".into(), Ast::Lexicon("greetings".into()));
        let soft = compile_ast(rules).unwrap();
        assert!(soft.is_skip_state(soft.initial) || soft.is_symbol_state(soft.initial));
    }

    #[test]
    fn undefined_nonterminal_is_rejected() {
        let mut rules: Rules<()> = HashMap::new();
        rules.insert("start".into(), Ast::Nonterminal("missing".into()));
        let err = compile_ast(rules).unwrap_err();
        assert!(matches!(err, CompileError::UndefinedNonterminal(_)));
    }

    #[test]
    fn circular_nonterminal_is_rejected() {
        let mut rules: Rules<()> = HashMap::new();
        rules.insert("start".into(), Ast::Nonterminal("looped".into()));
        rules.insert("looped".into(), Ast::Nonterminal("start".into()));
        let err = compile_ast(rules).unwrap_err();
        assert!(matches!(err, CompileError::CircularNonterminal(_)));
    }

    #[test]
    fn closure_over_nullable_child_is_rejected() {
        let mut rules: Rules<()> = HashMap::new();
        rules.insert(
            "start".into(),
            Ast::Closure {
                child: Box::new(Ast::Null),
                capture_keys: HashSet::new(),
            },
        );
        let err = compile_ast(rules).unwrap_err();
        assert!(matches!(err, CompileError::Config(_)));
    }

    #[test]
    fn attribute_arity_mismatch_is_rejected() {
        let mut rules: Rules<()> = HashMap::new();
        rules.insert(
            "start".into(),
            Ast::AttributedExpression {
                expression: Box::new(Ast::Lexicon("numbers".into())),
                callback: const_callback(2),
                capture_keys: [CaptureKey::Positional(1)].into_iter().collect(),
                void: false,
            },
        );
        let err = compile_ast(rules).unwrap_err();
        assert!(matches!(err, CompileError::Config(_)));
    }

    #[test]
    fn capture_with_no_enclosing_attribute_is_rejected() {
        let mut rules: Rules<()> = HashMap::new();
        rules.insert(
            "start".into(),
            Ast::Cat(vec![
                Ast::NamedCapture {
                    child: Box::new(Ast::Lexicon("hello".into())),
                    alias: "x".into(),
                },
                Ast::Lexicon("world".into()),
            ]),
        );
        let err = compile_ast(rules).unwrap_err();
        assert!(matches!(err, CompileError::Config(_)));
    }
}
