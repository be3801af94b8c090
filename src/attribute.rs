//! Attribute registry: name-to-callback mapping with alias resolution.
//!
//! A callback's formal parameters can't be introspected in Rust the way
//! the source implementation introspects a Python function's signature, so
//! the host supplies the parameter list explicitly at registration time
//! (see [`ParamSpec`]); this is the static-typing adaptation called for in
//! the design notes.

use crate::error::CompileError;
use crate::value::Value;
use std::cell::Cell;
use std::collections::{HashMap, HashSet};
use std::rc::Rc;

/// One formal parameter of a registered callback, in declaration order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParamSpec {
    /// The reserved `env` parameter: excluded from arity counting and from
    /// the argument slice passed to the callback (env is threaded
    /// separately).
    Env,
    Named(String),
    /// A positional slot; consumed in declaration order against `@1, @2, ...`.
    Positional,
}

/// A registered callback together with its formal parameter plan.
pub struct CallbackSpec<Env> {
    pub params: Vec<ParamSpec>,
    pub func: Rc<dyn Fn(&mut Env, &[Value]) -> Result<Value, String>>,
}

impl<Env> Clone for CallbackSpec<Env> {
    fn clone(&self) -> Self {
        Self {
            params: self.params.clone(),
            func: self.func.clone(),
        }
    }
}

impl<Env> CallbackSpec<Env> {
    /// The number of non-`env` parameters — the value an attributed
    /// expression's capture-key set must match in size.
    pub fn arity(&self) -> usize {
        self.params.iter().filter(|p| **p != ParamSpec::Env).count()
    }

    pub fn named_params(&self) -> HashSet<&str> {
        self.params
            .iter()
            .filter_map(|p| match p {
                ParamSpec::Named(n) => Some(n.as_str()),
                _ => None,
            })
            .collect()
    }
}

pub type AttributeId = String;

const INLINE_PREFIX: &str = "___a";

enum Entry<Env> {
    Callback(CallbackSpec<Env>),
    Alias(String),
}

/// Name-to-callback registry with alias resolution, mirroring
/// [`crate::lexicon::LexiconRegistry`]'s two-phase register/compile split.
pub struct AttributeRegistry<Env> {
    entries: HashMap<AttributeId, Entry<Env>>,
    next_id: Cell<u64>,
    resolved: bool,
}

impl<Env> Default for AttributeRegistry<Env> {
    fn default() -> Self {
        Self {
            entries: HashMap::new(),
            next_id: Cell::new(0),
            resolved: false,
        }
    }
}

impl<Env> AttributeRegistry<Env> {
    pub fn new() -> Self {
        Self::default()
    }

    fn new_id(&self) -> AttributeId {
        let n = self.next_id.get();
        self.next_id.set(n + 1);
        format!("{INLINE_PREFIX}{n}")
    }

    /// Registers a new callback, optionally under an explicit name.
    pub fn new(&mut self, spec: CallbackSpec<Env>, alias: Option<&str>) -> AttributeId {
        let id = match alias {
            Some(a) => a.to_string(),
            None => self.new_id(),
        };
        self.entries.insert(id.clone(), Entry::Callback(spec));
        id
    }

    /// Records that `alias` should resolve (transitively) to `target`.
    pub fn alias(&mut self, alias: &str, target: &str) {
        self.entries
            .insert(alias.to_string(), Entry::Alias(target.to_string()));
    }

    fn resolve_one(&self, name: &str, visited: &mut HashSet<String>) -> Result<CallbackSpec<Env>, CompileError> {
        if !visited.insert(name.to_string()) {
            return Err(CompileError::CircularAttributeDefinition(name.to_string()));
        }
        match self.entries.get(name) {
            Some(Entry::Callback(spec)) => Ok(spec.clone()),
            Some(Entry::Alias(target)) => self.resolve_one(target, visited),
            None => Err(CompileError::UndefinedAttribute(name.to_string())),
        }
    }

    /// Walks every alias to its concrete callback, detecting cycles and
    /// undefined targets.
    pub fn resolve(&mut self) -> Result<(), CompileError> {
        let alias_names: Vec<String> = self
            .entries
            .iter()
            .filter_map(|(k, v)| matches!(v, Entry::Alias(_)).then(|| k.clone()))
            .collect();
        for name in alias_names {
            let resolved = self.resolve_one(&name, &mut HashSet::new())?;
            self.entries.insert(name, Entry::Callback(resolved));
        }
        self.resolved = true;
        Ok(())
    }

    /// Looks up the concrete callback for `name`, resolving aliases first
    /// if [`Self::resolve`] hasn't run yet.
    pub fn get(&mut self, name: &str) -> Result<CallbackSpec<Env>, CompileError> {
        if !self.resolved {
            self.resolve()?;
        }
        match self.entries.get(name) {
            Some(Entry::Callback(spec)) => Ok(spec.clone()),
            Some(Entry::Alias(_)) => unreachable!("aliases are resolved away by resolve()"),
            None => Err(CompileError::UndefinedAttribute(name.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec(params: Vec<ParamSpec>) -> CallbackSpec<()> {
        CallbackSpec {
            params,
            func: Rc::new(|_, _| Ok(Value::None)),
        }
    }

    #[test]
    fn resolves_alias_chain() {
        let mut reg: AttributeRegistry<()> = AttributeRegistry::new();
        let id = reg.new(spec(vec![]), Some("real"));
        reg.alias("nick", "real");
        let resolved = reg.get("nick").unwrap();
        assert_eq!(resolved.arity(), 0);
        assert_eq!(id, "real");
    }

    #[test]
    fn detects_alias_cycle() {
        let mut reg: AttributeRegistry<()> = AttributeRegistry::new();
        reg.alias("a", "b");
        reg.alias("b", "a");
        let err = reg.resolve().unwrap_err();
        assert!(matches!(err, CompileError::CircularAttributeDefinition(_)));
    }

    #[test]
    fn undefined_attribute_errors() {
        let mut reg: AttributeRegistry<()> = AttributeRegistry::new();
        let err = reg.get("missing").unwrap_err();
        assert!(matches!(err, CompileError::UndefinedAttribute(_)));
    }

    #[test]
    fn arity_excludes_env() {
        let s = spec(vec![ParamSpec::Env, ParamSpec::Named("x".into()), ParamSpec::Positional]);
        assert_eq!(s.arity(), 2);
        assert_eq!(s.named_params(), ["x"].into_iter().collect());
    }
}
