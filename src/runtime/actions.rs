//! Executor-side primitives: small closures attached to [`crate::soft::Soft`]
//! transition outputs, run in order as the path tree advances.

use crate::attribute::CallbackSpec;
use crate::error::ExecError;
use crate::value::{CaptureKey, ClosureValue, Namespace, Value};
use std::collections::{HashSet, VecDeque};
use std::rc::Rc;

/// The mutable state an [`Action`] is run against: the value and namespace
/// stacks, the host environment, the remaining word queue, and a lexicon
/// attribute lookup (kept as a borrowed closure so actions don't need a
/// lifetime parameter of their own).
pub struct ActionContext<'a, Env> {
    pub value_stack: &'a mut Vec<Value>,
    pub namespace_stack: &'a mut Vec<Namespace>,
    pub env: &'a mut Env,
    pub words: &'a mut VecDeque<String>,
    pub attribute: &'a dyn Fn(&str, &str) -> Value,
}

pub type Action<Env> = Rc<dyn Fn(&mut ActionContext<'_, Env>) -> Result<(), ExecError>>;

pub fn push_immutable<Env: 'static>(value: Value) -> Action<Env> {
    Rc::new(move |ctx| {
        ctx.value_stack.push(value.clone());
        Ok(())
    })
}

pub fn push_mutable_list<Env: 'static>() -> Action<Env> {
    Rc::new(|ctx| {
        ctx.value_stack.push(Value::List(Vec::new()));
        Ok(())
    })
}

pub fn push_mutable_closure<Env: 'static>() -> Action<Env> {
    Rc::new(|ctx| {
        ctx.value_stack.push(Value::Closure(ClosureValue::new()));
        Ok(())
    })
}

/// Pops the stack-top value and appends it to the value now on top (a `Cat`
/// or closure accumulator previously pushed by `push_mutable_*`).
pub fn snoc<Env: 'static>() -> Action<Env> {
    Rc::new(|ctx| {
        let value = ctx.value_stack.pop().expect("snoc on empty value stack");
        ctx.value_stack
            .last_mut()
            .expect("snoc with no accumulator beneath it")
            .push(value);
        Ok(())
    })
}

/// Pops the top namespace and appends it to the closure value now on top of
/// the value stack, recording one iteration's captures.
pub fn snoc_closure_namespace<Env: 'static>() -> Action<Env> {
    Rc::new(|ctx| {
        let namespace = ctx
            .namespace_stack
            .pop()
            .expect("snoc_closure_namespace with no namespace pushed");
        match ctx.value_stack.last_mut() {
            Some(Value::Closure(c)) => c.captures.push(namespace),
            _ => panic!("snoc_closure_namespace on a non-closure accumulator"),
        }
        Ok(())
    })
}

pub fn push_namespace<Env: 'static>(keys: HashSet<CaptureKey>) -> Action<Env> {
    Rc::new(move |ctx| {
        ctx.namespace_stack
            .push(crate::value::fresh_namespace(&keys));
        Ok(())
    })
}

pub fn sequence<Env: 'static>(actions: Vec<Action<Env>>) -> Action<Env> {
    Rc::new(move |ctx| {
        for action in &actions {
            action(ctx)?;
        }
        Ok(())
    })
}

/// Pops the value stack top (the placeholder `Cat` intermediate value) and
/// stores the current stack-top value under `position` in the top
/// namespace, leaving the stack untouched otherwise.
pub fn positional_capture<Env: 'static>(position: u32) -> Action<Env> {
    Rc::new(move |ctx| {
        let value = ctx
            .value_stack
            .last()
            .expect("positional capture with empty value stack")
            .clone();
        ctx.namespace_stack
            .last_mut()
            .expect("positional capture with no namespace pushed")
            .insert(CaptureKey::Positional(position), value);
        Ok(())
    })
}

pub fn named_capture<Env: 'static>(alias: String) -> Action<Env> {
    Rc::new(move |ctx| {
        let value = ctx
            .value_stack
            .last()
            .expect("named capture with empty value stack")
            .clone();
        ctx.namespace_stack
            .last_mut()
            .expect("named capture with no namespace pushed")
            .insert(CaptureKey::Named(alias.clone()), value);
        Ok(())
    })
}

/// Pops a word off the queue and, if the enclosing expression needs a
/// return value, pushes its attribute under `lexicon`.
pub fn consume_word<Env: 'static>(lexicon: String, with_return: bool) -> Action<Env> {
    Rc::new(move |ctx| {
        let word = ctx
            .words
            .pop_front()
            .expect("consume_word with no word queued");
        if with_return {
            ctx.value_stack.push((ctx.attribute)(&lexicon, &word));
        }
        Ok(())
    })
}

/// Pops the top namespace, resolves it into the callback's argument list per
/// its [`crate::attribute::ParamSpec`] plan, and invokes it; a callback
/// error becomes [`ExecError::AttributeFailed`], which the executor logs and
/// swallows rather than propagating.
pub fn invoke_attribute<Env: 'static>(spec: CallbackSpec<Env>, with_return: bool) -> Action<Env> {
    use crate::attribute::ParamSpec;
    Rc::new(move |ctx| {
        ctx.value_stack.pop();
        let namespace = ctx
            .namespace_stack
            .pop()
            .expect("invoke_attribute with no namespace pushed");

        let mut args = Vec::with_capacity(spec.arity());
        let mut positional = 1u32;
        for param in &spec.params {
            match param {
                ParamSpec::Env => {}
                ParamSpec::Named(name) => {
                    let value = namespace
                        .get(&CaptureKey::Named(name.clone()))
                        .cloned()
                        .unwrap_or(Value::None);
                    args.push(value);
                }
                ParamSpec::Positional => {
                    let value = namespace
                        .get(&CaptureKey::Positional(positional))
                        .cloned()
                        .unwrap_or(Value::None);
                    args.push(value);
                    positional += 1;
                }
            }
        }

        let result = (spec.func)(ctx.env, &args).map_err(ExecError::AttributeFailed)?;
        if with_return {
            ctx.value_stack.push(result);
        }
        Ok(())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;

    fn run<Env>(action: &Action<Env>, ctx: &mut ActionContext<'_, Env>) {
        action(ctx).unwrap();
    }

    #[test]
    fn push_then_snoc_builds_a_list() {
        let mut value_stack = Vec::new();
        let mut namespace_stack = Vec::new();
        let mut words = VecDeque::new();
        let mut env = ();
        let attribute = |_l: &str, w: &str| Value::Word(w.to_string());
        let mut ctx = ActionContext {
            value_stack: &mut value_stack,
            namespace_stack: &mut namespace_stack,
            env: &mut env,
            words: &mut words,
            attribute: &attribute,
        };

        run(&push_mutable_list::<()>(), &mut ctx);
        run(&push_immutable::<()>(Value::Int(1)), &mut ctx);
        run(&snoc::<()>(), &mut ctx);
        run(&push_immutable::<()>(Value::Int(2)), &mut ctx);
        run(&snoc::<()>(), &mut ctx);

        assert_eq!(
            value_stack,
            vec![Value::List(vec![Value::Int(1), Value::Int(2)])]
        );
    }

    #[test]
    fn consume_word_pulls_attribute_from_lexicon() {
        let mut value_stack = Vec::new();
        let mut namespace_stack = Vec::new();
        let mut words: VecDeque<String> = ["cat".to_string()].into();
        let mut env = ();
        let attribute = |l: &str, w: &str| Value::Word(format!("{l}:{w}"));
        let mut ctx = ActionContext {
            value_stack: &mut value_stack,
            namespace_stack: &mut namespace_stack,
            env: &mut env,
            words: &mut words,
            attribute: &attribute,
        };

        run(&consume_word::<()>("animals".into(), true), &mut ctx);
        assert_eq!(value_stack, vec![Value::Word("animals:cat".into())]);
        assert!(words.is_empty());
    }
}
