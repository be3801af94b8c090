//! Runtime values produced by lexicon attribute lookups and attribute
//! callbacks, and the capture namespaces that collect them.

use std::collections::HashMap;
use std::fmt;

/// A value living on the executor's value stack.
///
/// This is the statically-typed stand-in for the host language's "whatever
/// the callback returns": words contribute their attribute (by default the
/// word itself), attribute callbacks contribute whatever [`Value`] they
/// build, and `Cat`/`Closure` nodes contribute lists of the above.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    None,
    Word(String),
    Int(i64),
    List(Vec<Value>),
    Closure(ClosureValue),
}

impl Value {
    pub fn as_word(&self) -> Option<&str> {
        match self {
            Value::Word(w) => Some(w),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(items) => Some(items),
            Value::Closure(c) => Some(&c.items),
            _ => None,
        }
    }

    /// Appends `value` to this list-like value (a `List` or a `ClosureValue`
    /// in progress). Panics if this value is not list-like; this mirrors the
    /// source grammar's invariant that `snoc` is only ever compiled where
    /// the stack top was pushed by `push_mutable`.
    pub fn push(&mut self, value: Value) {
        match self {
            Value::List(items) => items.push(value),
            Value::Closure(c) => c.items.push(value),
            _ => panic!("snoc on a non-list value"),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::None => write!(f, "None"),
            Value::Word(w) => write!(f, "{w}"),
            Value::Int(n) => write!(f, "{n}"),
            Value::List(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{item}")?;
                }
                write!(f, "]")
            }
            Value::Closure(c) => write!(f, "{}", Value::List(c.items.clone())),
        }
    }
}

/// A closure/positive-closure value: the per-iteration collected values,
/// together with a parallel list of the per-iteration capture namespaces
/// (populated by `snoc_closure_namespace`).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ClosureValue {
    pub items: Vec<Value>,
    pub captures: Vec<Namespace>,
}

impl ClosureValue {
    pub fn new() -> Self {
        Self::default()
    }
}

/// A capture key: either a positional slot (`@N`) or a named slot (`@name`).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CaptureKey {
    Positional(u32),
    Named(String),
}

impl fmt::Display for CaptureKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CaptureKey::Positional(n) => write!(f, "@{n}"),
            CaptureKey::Named(name) => write!(f, "@{name}"),
        }
    }
}

/// A capture namespace: every key declared at scope entry maps to `None`
/// until a `PositionalCapture`/`NamedCapture` action fills it in.
pub type Namespace = HashMap<CaptureKey, Value>;

/// Builds a namespace with every key mapped to `Value::None`.
pub fn fresh_namespace(keys: &std::collections::HashSet<CaptureKey>) -> Namespace {
    keys.iter().map(|k| (k.clone(), Value::None)).collect()
}
