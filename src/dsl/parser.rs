//! Recursive-descent parser for the grammar DSL, producing a typed AST
//! directly: lexicon and attribute declarations are registered into their
//! respective registries as they're encountered, sugar forms are desugared
//! in place, and capture keys are gathered per attributed/closure scope —
//! all in one pass, rather than the separate parse/desugar/lower stages a
//! dynamically-typed host affords.

use crate::ast::{Ast, Rules};
use crate::attribute::AttributeRegistry;
use crate::dsl::lexer::{tokenize, Token, TokenKind};
use crate::error::CompileError;
use crate::lexicon::registry::{Sign, WordSet};
use crate::lexicon::LexiconRegistry;
use crate::util::Code;
use crate::value::CaptureKey;
use std::collections::HashSet;

pub struct Parser<'r, Env> {
    tokens: Vec<Token>,
    pos: usize,
    lexicons: &'r mut LexiconRegistry,
    attributes: &'r mut AttributeRegistry<Env>,
    rules: Rules<Env>,
    /// Capture keys gathered for the innermost attributed/closure scope
    /// currently being parsed; pushed on entry, popped (and attached to the
    /// node) on exit.
    capture_scopes: Vec<HashSet<CaptureKey>>,
}

impl<'r, Env: 'static> Parser<'r, Env> {
    pub fn parse(
        source: &str,
        lexicons: &'r mut LexiconRegistry,
        attributes: &'r mut AttributeRegistry<Env>,
    ) -> Result<Rules<Env>, CompileError> {
        if source.trim().is_empty() {
            return Err(CompileError::Syntax("empty grammar source".into()));
        }
        let code = Code::from(source);
        let tokens = tokenize(&code)?;
        let mut parser = Parser {
            tokens,
            pos: 0,
            lexicons,
            attributes,
            rules: Rules::new(),
            capture_scopes: Vec::new(),
        };
        parser.parse_program()?;
        if !parser.rules.contains_key("start") {
            return Err(CompileError::Config("no 'start' nonterminal defined".into()));
        }
        Ok(parser.rules)
    }

    fn peek(&self) -> &TokenKind {
        &self.tokens[self.pos].kind
    }

    fn advance(&mut self) -> TokenKind {
        let kind = self.tokens[self.pos].kind.clone();
        if self.pos + 1 < self.tokens.len() {
            self.pos += 1;
        }
        kind
    }

    fn expect(&mut self, kind: &TokenKind) -> Result<(), CompileError> {
        if self.peek() == kind {
            self.advance();
            Ok(())
        } else {
            Err(CompileError::Syntax(format!(
                "expected {:?} at {}, found {:?}",
                kind,
                self.tokens[self.pos].position,
                self.peek()
            )))
        }
    }

    fn expect_ident(&mut self) -> Result<String, CompileError> {
        match self.advance() {
            TokenKind::Ident(name) => Ok(name),
            other => Err(CompileError::Syntax(format!("expected identifier, found {other:?}"))),
        }
    }

    fn at_eof(&self) -> bool {
        matches!(self.peek(), TokenKind::Eof)
    }

    fn parse_program(&mut self) -> Result<(), CompileError> {
        while !self.at_eof() {
            self.parse_assignment()?;
        }
        Ok(())
    }

    fn parse_assignment(&mut self) -> Result<(), CompileError> {
        match self.peek().clone() {
            TokenKind::Bang => self.parse_nonterminal_assignment(),
            TokenKind::Colon => self.parse_lexicon_assignment(),
            TokenKind::Percent => self.parse_attribute_assignment(),
            other => Err(CompileError::Syntax(format!("expected an assignment, found {other:?}"))),
        }
    }

    fn parse_nonterminal_assignment(&mut self) -> Result<(), CompileError> {
        self.expect(&TokenKind::Bang)?;
        let name = self.expect_ident()?;
        let within_utterance = match self.peek() {
            TokenKind::Eq => {
                self.advance();
                false
            }
            TokenKind::TildeEq => {
                self.advance();
                true
            }
            other => {
                return Err(CompileError::Syntax(format!(
                    "expected '=' or '~=' after !{name}, found {other:?}"
                )))
            }
        };

        let mut expr = self.parse_expr()?;
        if within_utterance {
            expr = Ast::WithinUtteranceExpression(Box::new(expr));
        }

        if *self.peek() == TokenKind::Arrow {
            self.advance();
            expr = self.parse_attributed_wrap(expr)?;
        }

        self.rules.insert(name, expr);
        Ok(())
    }

    fn parse_lexicon_assignment(&mut self) -> Result<(), CompileError> {
        self.expect(&TokenKind::Colon)?;
        let name = self.expect_ident()?;
        self.expect(&TokenKind::Eq)?;
        self.parse_lex_expr(Some(name))?;
        Ok(())
    }

    /// `lex-expr := lex-term (("+"|"-") lex-term)*`; a single term with no
    /// operator registers directly as that alias, a compound expression
    /// registers as a new compound pointing at the already-named operands.
    fn parse_lex_expr(&mut self, alias: Option<String>) -> Result<String, CompileError> {
        let first = self.expect_ident()?;
        let mut terms = vec![(Sign::Union, first)];
        loop {
            match self.peek() {
                TokenKind::Plus => {
                    self.advance();
                    terms.push((Sign::Union, self.expect_ident()?));
                }
                TokenKind::Minus => {
                    self.advance();
                    terms.push((Sign::Difference, self.expect_ident()?));
                }
                _ => break,
            }
        }

        if terms.len() == 1 {
            let (_, target) = terms.into_iter().next().unwrap();
            match alias {
                Some(alias) => Ok(self.lexicons.assign(&alias, &target)),
                None => {
                    self.lexicons.reference(&target);
                    Ok(target)
                }
            }
        } else {
            for (_, name) in &terms {
                self.lexicons.reference(name);
            }
            let id = self.lexicons.new_compound(terms);
            if let Some(alias) = alias {
                Ok(self.lexicons.assign(&alias, &id))
            } else {
                Ok(id)
            }
        }
    }

    fn parse_attribute_assignment(&mut self) -> Result<(), CompileError> {
        self.expect(&TokenKind::Percent)?;
        let name = self.expect_ident()?;
        self.expect(&TokenKind::Eq)?;
        self.expect(&TokenKind::Percent)?;
        let target = self.expect_ident()?;
        self.attributes.alias(&name, &target);
        Ok(())
    }

    fn parse_expr(&mut self) -> Result<Ast<Env>, CompileError> {
        self.parse_alt()
    }

    fn parse_alt(&mut self) -> Result<Ast<Env>, CompileError> {
        let mut children = vec![self.parse_cat()?];
        while *self.peek() == TokenKind::Pipe {
            self.advance();
            children.push(self.parse_cat()?);
        }
        Ok(if children.len() == 1 {
            children.pop().unwrap()
        } else {
            Ast::Alt(children)
        })
    }

    fn parse_cat(&mut self) -> Result<Ast<Env>, CompileError> {
        let mut children = vec![self.parse_unit()?];
        while self.starts_unit() {
            children.push(self.parse_unit()?);
        }
        Ok(if children.len() == 1 {
            children.pop().unwrap()
        } else {
            Ast::Cat(children)
        })
    }

    fn starts_unit(&self) -> bool {
        matches!(
            self.peek(),
            TokenKind::Ident(_)
                | TokenKind::Colon
                | TokenKind::Bang
                | TokenKind::Underscore
                | TokenKind::LAngle
                | TokenKind::LAngleStar
                | TokenKind::LBracket
                | TokenKind::Tilde
                | TokenKind::LParen
        )
    }

    fn parse_unit(&mut self) -> Result<Ast<Env>, CompileError> {
        let mut node = self.parse_term()?;

        if *self.peek() == TokenKind::At {
            self.advance();
            node = match self.advance() {
                TokenKind::Int(n) => {
                    self.record_capture(CaptureKey::Positional(n));
                    Ast::PositionalCapture {
                        child: Box::new(node),
                        position: n,
                    }
                }
                TokenKind::Ident(name) => {
                    self.record_capture(CaptureKey::Named(name.clone()));
                    Ast::NamedCapture {
                        child: Box::new(node),
                        alias: name,
                    }
                }
                other => {
                    return Err(CompileError::Syntax(format!(
                        "expected an integer or identifier after '@', found {other:?}"
                    )))
                }
            };
        }

        if *self.peek() == TokenKind::ThinArrow {
            self.advance();
            node = self.parse_void_attributed_wrap(node)?;
        }

        Ok(node)
    }

    fn record_capture(&mut self, key: CaptureKey) {
        if let Some(scope) = self.capture_scopes.last_mut() {
            scope.insert(key);
        }
    }

    fn parse_term(&mut self) -> Result<Ast<Env>, CompileError> {
        match self.peek().clone() {
            TokenKind::Underscore => {
                self.advance();
                Ok(Ast::Null)
            }
            TokenKind::Colon => {
                self.advance();
                let name = self.expect_ident()?;
                self.lexicons.reference(&name);
                Ok(Ast::Lexicon(name))
            }
            TokenKind::Bang => {
                self.advance();
                let name = self.expect_ident()?;
                Ok(Ast::Nonterminal(name))
            }
            TokenKind::Ident(word) => {
                self.advance();
                let id = self.lexicons.new_from_words(WordSet::Words(vec![word]), None);
                Ok(Ast::Lexicon(id))
            }
            TokenKind::Tilde => {
                self.advance();
                let child = self.parse_unit()?;
                Ok(Ast::WithinUtteranceExpression(Box::new(child)))
            }
            TokenKind::LParen => {
                self.advance();
                let inner = self.parse_expr()?;
                self.expect(&TokenKind::RParen)?;
                Ok(inner)
            }
            TokenKind::LBracket => {
                self.advance();
                let inner = self.parse_expr()?;
                self.expect(&TokenKind::RBracket)?;
                Ok(Ast::Maybe(Box::new(inner)))
            }
            TokenKind::LAngle => {
                self.advance();
                self.capture_scopes.push(HashSet::new());
                let inner = self.parse_expr()?;
                self.expect(&TokenKind::RAngle)?;
                let capture_keys = self.capture_scopes.pop().unwrap();
                Ok(Ast::PositiveClosure {
                    child: Box::new(inner),
                    capture_keys,
                })
            }
            TokenKind::LAngleStar => {
                self.advance();
                self.capture_scopes.push(HashSet::new());
                let inner = self.parse_expr()?;
                self.expect(&TokenKind::RAngle)?;
                let capture_keys = self.capture_scopes.pop().unwrap();
                Ok(Ast::Closure {
                    child: Box::new(inner),
                    capture_keys,
                })
            }
            other => Err(CompileError::Syntax(format!("unexpected token {other:?}"))),
        }
    }

    /// `!n = E => A`: wraps `E` in an attributed expression over the
    /// capture keys gathered while parsing `E`, resolving `A` against the
    /// attribute registry and applying the omitted-capture desugaring when
    /// no explicit captures were written but the callback takes exactly
    /// one argument.
    fn parse_attributed_wrap(&mut self, expr: Ast<Env>) -> Result<Ast<Env>, CompileError> {
        // The capture scope for a whole-rule `=> A` wrap spans everything
        // already parsed in `expr`; since expr was parsed at top level
        // (no enclosing scope pushed), gather its capture keys directly.
        let capture_keys = gather_capture_keys(&expr);
        self.build_attributed(expr, capture_keys, false)
    }

    fn parse_void_attributed_wrap(&mut self, expr: Ast<Env>) -> Result<Ast<Env>, CompileError> {
        let capture_keys = gather_capture_keys(&expr);
        self.build_attributed(expr, capture_keys, true)
    }

    fn build_attributed(
        &mut self,
        expr: Ast<Env>,
        mut capture_keys: HashSet<CaptureKey>,
        void: bool,
    ) -> Result<Ast<Env>, CompileError> {
        self.expect(&TokenKind::Percent)?;
        let name = self.expect_ident()?;
        let callback = self.attributes.get(&name)?;

        let expr = if capture_keys.is_empty() && callback.arity() == 1 {
            capture_keys.insert(CaptureKey::Positional(1));
            Ast::PositionalCapture {
                child: Box::new(expr),
                position: 1,
            }
        } else {
            expr
        };

        Ok(Ast::AttributedExpression {
            expression: Box::new(expr),
            callback,
            capture_keys,
            void,
        })
    }
}

/// Capture keys reachable from `node` without crossing a nested
/// attributed-expression, closure, or positive-closure boundary (those
/// already carry their own gathered set).
fn gather_capture_keys<Env>(node: &Ast<Env>) -> HashSet<CaptureKey> {
    let mut out = HashSet::new();
    gather_into(node, &mut out);
    out
}

fn gather_into<Env>(node: &Ast<Env>, out: &mut HashSet<CaptureKey>) {
    match node {
        Ast::Cat(children) | Ast::Alt(children) => {
            for c in children {
                gather_into(c, out);
            }
        }
        Ast::PositionalCapture { child, position } => {
            out.insert(CaptureKey::Positional(*position));
            gather_into(child, out);
        }
        Ast::NamedCapture { child, alias } => {
            out.insert(CaptureKey::Named(alias.clone()));
            gather_into(child, out);
        }
        Ast::Maybe(child) | Ast::WithinUtteranceExpression(child) => gather_into(child, out),
        Ast::AttributedExpression { .. } | Ast::Closure { .. } | Ast::PositiveClosure { .. } => {}
        Ast::Nonterminal(_) | Ast::Lexicon(_) | Ast::Null => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attribute::{CallbackSpec, ParamSpec};
    use crate::value::Value;
    use std::rc::Rc;

    fn parse(src: &str) -> Result<Rules<()>, CompileError> {
        let mut lexicons = LexiconRegistry::new();
        let mut attributes: AttributeRegistry<()> = AttributeRegistry::new();
        Parser::parse(src, &mut lexicons, &mut attributes)
    }

    #[test]
    fn parses_a_simple_cat() {
        let rules = parse("!start = hello world").unwrap();
        assert!(matches!(rules["start"], Ast::Cat(_)));
    }

    #[test]
    fn rejects_empty_source() {
        let err = parse("").unwrap_err();
        assert!(matches!(err, CompileError::Syntax(_)));
    }

    #[test]
    fn rejects_missing_start() {
        let err = parse("!other = hello").unwrap_err();
        assert!(matches!(err, CompileError::Config(_)));
    }

    #[test]
    fn gathers_positional_captures_for_attribute_wrap() {
        let mut lexicons = LexiconRegistry::new();
        let mut attributes: AttributeRegistry<()> = AttributeRegistry::new();
        attributes.new(
            CallbackSpec {
                params: vec![ParamSpec::Positional, ParamSpec::Positional],
                func: Rc::new(|_, args| Ok(Value::List(args.to_vec()))),
            },
            Some("cb"),
        );
        let rules = Parser::parse("!start = hello@1 world@2 => %cb", &mut lexicons, &mut attributes).unwrap();
        match &rules["start"] {
            Ast::AttributedExpression { capture_keys, .. } => {
                assert_eq!(
                    capture_keys.clone(),
                    [CaptureKey::Positional(1), CaptureKey::Positional(2)]
                        .into_iter()
                        .collect()
                );
            }
            _ => panic!("expected an attributed expression"),
        }
    }

    #[test]
    fn desugars_omitted_capture_for_single_arg_callback() {
        let mut lexicons = LexiconRegistry::new();
        let mut attributes: AttributeRegistry<()> = AttributeRegistry::new();
        attributes.new(
            CallbackSpec {
                params: vec![ParamSpec::Positional],
                func: Rc::new(|_, args| Ok(args[0].clone())),
            },
            Some("cb"),
        );
        let rules = Parser::parse("!start = hello world => %cb", &mut lexicons, &mut attributes).unwrap();
        match &rules["start"] {
            Ast::AttributedExpression { expression, capture_keys, .. } => {
                assert!(matches!(**expression, Ast::PositionalCapture { .. }));
                assert_eq!(capture_keys.len(), 1);
            }
            _ => panic!("expected an attributed expression"),
        }
    }
}
