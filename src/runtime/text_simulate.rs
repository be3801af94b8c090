//! Word-by-word text simulation and the action executor that drives a
//! grammar's side effects as the path tree advances.

use crate::error::{ExecError, RuntimeError};
use crate::lexicon::LexiconRegistry;
use crate::runtime::actions::{Action, ActionContext};
use crate::runtime::path_tree::{
    batch_separator_transition, initial_path_leaves, simplify, step_tree, transition_from_word, PathLeaves,
};
use crate::soft::Soft;
use crate::value::{Namespace, Value};
use std::collections::VecDeque;

fn assert_valid_transition<Env>(
    soft: &Soft<Action<Env>>,
    lexicon_registry: &LexiconRegistry,
    path_leaves: &PathLeaves<Env>,
    word: &str,
) -> Result<(), RuntimeError> {
    let names = crate::runtime::path_tree::predicate_transitions(soft, path_leaves);
    let union = lexicon_registry.get_union(&names);
    if !union.contains(word) {
        return Err(RuntimeError::InvalidWordTransition(word.to_string()));
    }
    Ok(())
}

/// Steps the path tree word by word through `utterance`, finishing with a
/// batch-separator transition so any trailing optional separator is
/// consumed. Returns the leftover word queue (non-empty only if the
/// grammar's frontier rejected a word partway through) and the resulting
/// leaves.
pub fn text_simulate<Env>(
    soft: &Soft<Action<Env>>,
    initial_leaves: PathLeaves<Env>,
    lexicon_registry: &LexiconRegistry,
    utterance: &str,
) -> Result<(VecDeque<String>, PathLeaves<Env>), RuntimeError> {
    let words: VecDeque<String> = utterance.split_whitespace().map(str::to_string).collect();
    let mut path_leaves = initial_leaves;
    if !words.is_empty() {
        path_leaves = step_tree(soft, path_leaves);
        for word in &words {
            assert_valid_transition(soft, lexicon_registry, &path_leaves, word)?;
            path_leaves = transition_from_word(
                soft,
                |lexicon, w| lexicon_registry.get(lexicon).contains(w),
                &path_leaves,
                word,
            );
            path_leaves = step_tree(soft, path_leaves);
        }
        path_leaves = batch_separator_transition(soft, &path_leaves);
        path_leaves = step_tree(soft, path_leaves);
    }
    Ok((words, path_leaves))
}

pub fn initial_leaves<Env>(soft: &Soft<Action<Env>>) -> PathLeaves<Env> {
    initial_path_leaves(soft)
}

/// Drives the value/namespace stacks as the action queue accumulated by
/// [`simplify`] is executed, holding the host environment for the lifetime
/// of the grammar session.
pub struct Executor<Env> {
    lexicon_registry: std::rc::Rc<LexiconRegistry>,
    env: Env,
    words: VecDeque<String>,
    value_stack: Vec<Value>,
    namespace_stack: Vec<Namespace>,
}

impl<Env> Executor<Env> {
    pub fn new(lexicon_registry: std::rc::Rc<LexiconRegistry>, env: Env) -> Self {
        Self {
            lexicon_registry,
            env,
            words: VecDeque::new(),
            value_stack: Vec::new(),
            namespace_stack: Vec::new(),
        }
    }

    pub fn env(&self) -> &Env {
        &self.env
    }

    pub fn env_mut(&mut self) -> &mut Env {
        &mut self.env
    }

    pub fn value_stack(&self) -> &[Value] {
        &self.value_stack
    }

    /// Extends the word queue with `new_words` and runs `output` in order.
    /// An [`ExecError::AttributeFailed`] is logged and swallowed (matching
    /// the source executor's handling of attribute callback exceptions);
    /// any other action error is unreachable in this crate's action set
    /// today but is still surfaced rather than silently dropped.
    pub fn eat(&mut self, new_words: impl IntoIterator<Item = String>, output: VecDeque<Action<Env>>) {
        self.words.extend(new_words);
        let registry = self.lexicon_registry.clone();
        let attribute = |lexicon: &str, word: &str| registry.attribute(lexicon, word);

        for action in output {
            let mut ctx = ActionContext {
                value_stack: &mut self.value_stack,
                namespace_stack: &mut self.namespace_stack,
                env: &mut self.env,
                words: &mut self.words,
                attribute: &attribute,
            };
            if let Err(err) = action(&mut ctx) {
                match err {
                    ExecError::AttributeFailed(msg) => {
                        tracing::error!(error = %msg, "attribute callback failed");
                    }
                }
            }
        }
    }
}

/// Convenience wrapper combining [`text_simulate`] and [`simplify`]/[`Executor::eat`]
/// for the common "feed one utterance, collect resulting values" path.
pub fn simulate_utterance<Env>(
    soft: &Soft<Action<Env>>,
    path_leaves: PathLeaves<Env>,
    lexicon_registry: &LexiconRegistry,
    executor: &mut Executor<Env>,
    utterance: &str,
) -> Result<PathLeaves<Env>, RuntimeError> {
    let (words, leaves) = text_simulate(soft, path_leaves, lexicon_registry, utterance)?;
    let (leaves, output) = simplify(leaves);
    executor.eat(words, output);
    Ok(leaves)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[derive(Clone, Default)]
    struct SharedBuf(Arc<Mutex<Vec<u8>>>);

    impl std::io::Write for SharedBuf {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }
        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    impl<'a> tracing_subscriber::fmt::MakeWriter<'a> for SharedBuf {
        type Writer = SharedBuf;
        fn make_writer(&'a self) -> Self::Writer {
            self.clone()
        }
    }

    /// A failing attribute callback logs via `tracing::error!` and is
    /// swallowed; actions queued after it in the same batch still run.
    #[test]
    fn attribute_failure_is_logged_and_execution_continues() {
        let buf = SharedBuf::default();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(buf.clone())
            .with_ansi(false)
            .finish();

        let failing: Action<()> = crate::runtime::actions::invoke_attribute(
            crate::attribute::CallbackSpec {
                params: vec![],
                func: std::rc::Rc::new(|_env, _args| Err("boom".to_string())),
            },
            false,
        );
        let marker_ran = std::rc::Rc::new(std::cell::RefCell::new(false));
        let marker_ran_clone = marker_ran.clone();
        let marker: Action<()> = std::rc::Rc::new(move |_ctx| {
            *marker_ran_clone.borrow_mut() = true;
            Ok(())
        });

        let registry = std::rc::Rc::new(LexiconRegistry::new());
        let mut executor: Executor<()> = Executor::new(registry, ());
        // `invoke_attribute` expects a namespace on the stack to pop.
        executor
            .namespace_stack
            .push(crate::value::fresh_namespace(&std::collections::HashSet::new()));
        executor.value_stack.push(Value::None);

        tracing::subscriber::with_default(subscriber, || {
            executor.eat(Vec::new(), VecDeque::from(vec![failing, marker]));
        });

        assert!(*marker_ran.borrow(), "action after the failing one must still run");
        let logged = String::from_utf8(buf.0.lock().unwrap().clone()).unwrap();
        assert!(logged.contains("attribute callback failed"));
        assert!(logged.contains("boom"));
    }
}
