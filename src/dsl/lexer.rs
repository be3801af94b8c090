//! Tokenizer for the grammar DSL source text.

use crate::error::CompileError;
use crate::util::{Code, Position};
use once_cell::sync::Lazy;
use regex::Regex;

#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    Bang,       // !
    Colon,      // :
    Percent,    // %
    At,         // @
    Tilde,      // ~
    TildeEq,    // ~=
    Eq,         // =
    Arrow,      // =>
    ThinArrow,  // ->
    Pipe,       // |
    Plus,       // +
    Minus,      // -
    LParen,
    RParen,
    LAngle,     // <
    LAngleStar, // <*
    RAngle,     // >
    LBracket,
    RBracket,
    Underscore,
    Ident(String),
    Int(u32),
    Eof,
}

#[derive(Debug, Clone)]
pub struct Token {
    pub kind: TokenKind,
    pub position: Position,
}

static IDENT: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[a-z][a-z0-9_']*").unwrap());
static INT: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[0-9]+").unwrap());

/// Tokenizes `code`, stripping whitespace and `//` line comments between
/// tokens.
pub fn tokenize(code: &Code<'_>) -> Result<Vec<Token>, CompileError> {
    let src = std::str::from_utf8(code.value).map_err(|e| CompileError::Syntax(e.to_string()))?;
    let mut tokens = Vec::new();
    let mut i = 0usize;

    loop {
        while i < src.len() {
            let rest = &src[i..];
            if rest.starts_with("//") {
                let end = rest.find('\n').map(|n| i + n).unwrap_or(src.len());
                i = end;
            } else if rest.starts_with(char::is_whitespace) {
                i += 1;
            } else {
                break;
            }
        }
        if i >= src.len() {
            tokens.push(Token {
                kind: TokenKind::Eof,
                position: code.obtain_position(i),
            });
            break;
        }

        let position = code.obtain_position(i);
        let rest = &src[i..];
        let (kind, len) = lex_one(rest).ok_or_else(|| {
            CompileError::Syntax(format!("unexpected character at {position}"))
        })?;
        i += len;
        tokens.push(Token { kind, position });
    }

    Ok(tokens)
}

fn lex_one(rest: &str) -> Option<(TokenKind, usize)> {
    if let Some(stripped) = rest.strip_prefix("~=") {
        let _ = stripped;
        return Some((TokenKind::TildeEq, 2));
    }
    if rest.starts_with("=>") {
        return Some((TokenKind::Arrow, 2));
    }
    if rest.starts_with("->") {
        return Some((TokenKind::ThinArrow, 2));
    }
    if rest.starts_with("<*") {
        return Some((TokenKind::LAngleStar, 2));
    }

    let mut chars = rest.chars();
    let c = chars.next()?;
    let single = match c {
        '!' => Some(TokenKind::Bang),
        ':' => Some(TokenKind::Colon),
        '%' => Some(TokenKind::Percent),
        '@' => Some(TokenKind::At),
        '~' => Some(TokenKind::Tilde),
        '=' => Some(TokenKind::Eq),
        '|' => Some(TokenKind::Pipe),
        '+' => Some(TokenKind::Plus),
        '-' => Some(TokenKind::Minus),
        '(' => Some(TokenKind::LParen),
        ')' => Some(TokenKind::RParen),
        '<' => Some(TokenKind::LAngle),
        '>' => Some(TokenKind::RAngle),
        '[' => Some(TokenKind::LBracket),
        ']' => Some(TokenKind::RBracket),
        '_' if rest.len() == 1 || !rest.as_bytes().get(1).is_some_and(|b| b.is_ascii_alphanumeric()) => {
            Some(TokenKind::Underscore)
        }
        _ => None,
    };
    if let Some(kind) = single {
        return Some((kind, 1));
    }

    if let Some(m) = IDENT.find(rest) {
        return Some((TokenKind::Ident(m.as_str().to_string()), m.end()));
    }
    if let Some(m) = INT.find(rest) {
        return Some((TokenKind::Int(m.as_str().parse().unwrap()), m.end()));
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(src: &str) -> Vec<TokenKind> {
        let code = Code::from(src);
        tokenize(&code).unwrap().into_iter().map(|t| t.kind).collect()
    }

    #[test]
    fn tokenizes_a_simple_assignment() {
        assert_eq!(
            kinds("!start = hello world"),
            vec![
                TokenKind::Bang,
                TokenKind::Ident("start".into()),
                TokenKind::Eq,
                TokenKind::Ident("hello".into()),
                TokenKind::Ident("world".into()),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn strips_line_comments() {
        assert_eq!(
            kinds("!start = hello // a greeting\n"),
            vec![
                TokenKind::Bang,
                TokenKind::Ident("start".into()),
                TokenKind::Eq,
                TokenKind::Ident("hello".into()),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn recognizes_multi_char_operators() {
        assert_eq!(
            kinds("!n ~= a => %cb"),
            vec![
                TokenKind::Bang,
                TokenKind::Ident("n".into()),
                TokenKind::TildeEq,
                TokenKind::Ident("a".into()),
                TokenKind::Arrow,
                TokenKind::Percent,
                TokenKind::Ident("cb".into()),
                TokenKind::Eof,
            ]
        );
    }
}
