//! Error taxonomy for grammar compilation and runtime stepping.
//!
//! Compile-time failures are grouped under [`CompileError`]; they are all
//! surfaced synchronously from [`crate::grammar::Grammar::compile`] and are
//! never retried. Runtime failures ([`RuntimeError`], [`ExecError`]) arise
//! while driving an already-compiled [`crate::soft::Soft`].

use thiserror::Error;

/// Errors raised while parsing and compiling a grammar source into a [`crate::soft::Soft`].
#[derive(Debug, Error)]
pub enum CompileError {
    #[error("syntax error: {0}")]
    Syntax(String),

    #[error("config error: {0}")]
    Config(String),

    #[error("lexicon :{0} is not defined")]
    UndefinedLexicon(String),

    #[error("circular definition for lexicon :{0}")]
    CircularLexiconDefinition(String),

    #[error("invalid lexicon :{name}: {reason}")]
    InvalidLexicon { name: String, reason: String },

    #[error("attribute %{0} is not defined")]
    UndefinedAttribute(String),

    #[error("circular definition for attribute %{0}")]
    CircularAttributeDefinition(String),

    #[error("nonterminal !{0} is not defined")]
    UndefinedNonterminal(String),

    #[error("circular definition for nonterminal !{0}")]
    CircularNonterminal(String),

    #[error("invalid grammar argument: {0}")]
    InvalidGrammarArgument(String),
}

/// Errors raised while driving the path-tree from text input.
#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("word '{0}' is not accepted at the current frontier")]
    InvalidWordTransition(String),
}

/// Errors surfaced from the action executor.
#[derive(Debug, Error)]
pub enum ExecError {
    /// A user attribute callback failed. The executor logs this and keeps
    /// executing the remaining queued actions.
    #[error("attribute callback failed: {0}")]
    AttributeFailed(String),
}
