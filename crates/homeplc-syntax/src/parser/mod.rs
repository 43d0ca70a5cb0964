//! Recursive descent parser for script programs.
//!
//! The parser works on the non-trivia token stream and stops at the first
//! error; scripts are loaded at startup, where any error is fatal anyway.

mod expr;
mod literal;
mod stmt;

use smol_str::SmolStr;
use text_size::{TextRange, TextSize};
use thiserror::Error;

use crate::ast::{Script, TypeName, VarDecl};
use crate::lexer::{Lexer, Token, TokenKind};

pub use literal::{parse_int_literal, parse_real_literal, parse_time_literal};

/// Syntax error with its position in the source.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message} at line {line}, column {column}")]
pub struct ParseError {
    pub message: SmolStr,
    pub range: TextRange,
    pub line: u32,
    pub column: u32,
}

/// Parse a complete script.
pub fn parse(source: &str) -> Result<Script, ParseError> {
    let mut parser = Parser::new(source);
    parser.script()
}

pub(crate) struct Parser<'src> {
    source: &'src str,
    tokens: Vec<Token>,
    pos: usize,
}

impl<'src> Parser<'src> {
    fn new(source: &'src str) -> Self {
        let mut tokens: Vec<Token> = Lexer::new(source)
            .filter(|token| !token.kind.is_trivia())
            .collect();
        let end = TextSize::of(source);
        tokens.push(Token::new(TokenKind::Eof, TextRange::empty(end)));
        Self {
            source,
            tokens,
            pos: 0,
        }
    }

    fn script(&mut self) -> Result<Script, ParseError> {
        let mut vars = Vec::new();
        while self.at(TokenKind::KwVar) {
            self.var_block(&mut vars)?;
        }
        let body = self.block(&[TokenKind::Eof])?;
        self.expect(TokenKind::Eof)?;
        Ok(Script { vars, body })
    }

    fn var_block(&mut self, vars: &mut Vec<VarDecl>) -> Result<(), ParseError> {
        self.expect(TokenKind::KwVar)?;
        while !self.at(TokenKind::KwEndVar) {
            let start = self.current().range.start();
            let name_token = self.expect(TokenKind::Ident)?;
            let name = SmolStr::new(self.text(name_token));
            if vars.iter().any(|var| var.name.eq_ignore_ascii_case(&name)) {
                return Err(self.error_at(
                    name_token.range,
                    format!("duplicate variable '{name}'"),
                ));
            }
            self.expect(TokenKind::Colon)?;
            let type_token = self.expect(TokenKind::Ident)?;
            let ty = TypeName::parse(self.text(type_token)).ok_or_else(|| {
                self.error_at(
                    type_token.range,
                    format!("unknown type '{}'", self.text(type_token)),
                )
            })?;
            let init = if self.eat(TokenKind::Assign) {
                if ty.is_function_block() {
                    return Err(self.error_here("function block instances take no initializer"));
                }
                Some(self.literal()?)
            } else {
                None
            };
            let end = self.expect(TokenKind::Semicolon)?.range.end();
            vars.push(VarDecl {
                name,
                ty,
                init,
                range: TextRange::new(start, end),
            });
        }
        self.expect(TokenKind::KwEndVar)?;
        self.eat(TokenKind::Semicolon);
        Ok(())
    }

    fn current(&self) -> Token {
        self.tokens[self.pos]
    }

    fn nth(&self, n: usize) -> TokenKind {
        self.tokens
            .get(self.pos + n)
            .map_or(TokenKind::Eof, |token| token.kind)
    }

    fn at(&self, kind: TokenKind) -> bool {
        self.current().kind == kind
    }

    fn bump(&mut self) -> Token {
        let token = self.current();
        if token.kind != TokenKind::Eof {
            self.pos += 1;
        }
        token
    }

    fn eat(&mut self, kind: TokenKind) -> bool {
        if self.at(kind) {
            self.bump();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, kind: TokenKind) -> Result<Token, ParseError> {
        if self.at(kind) {
            return Ok(self.bump());
        }
        Err(self.error_here(format!(
            "expected {}, found {}",
            kind.describe(),
            self.current().kind.describe()
        )))
    }

    fn previous_end(&self) -> TextSize {
        self.pos
            .checked_sub(1)
            .map_or(TextSize::from(0), |idx| self.tokens[idx].range.end())
    }

    fn text(&self, token: Token) -> &'src str {
        &self.source[token.range]
    }

    fn error_here(&self, message: impl Into<String>) -> ParseError {
        self.error_at(self.current().range, message)
    }

    fn error_at(&self, range: TextRange, message: impl Into<String>) -> ParseError {
        let (line, column) = line_col(self.source, range.start());
        ParseError {
            message: SmolStr::new(message.into()),
            range,
            line,
            column,
        }
    }
}

/// 1-based line and column of a byte offset.
#[must_use]
pub fn line_col(source: &str, offset: TextSize) -> (u32, u32) {
    let offset = usize::from(offset).min(source.len());
    let before = &source[..offset];
    let line = before.matches('\n').count() + 1;
    let column = before
        .rfind('\n')
        .map_or(before.chars().count(), |idx| before[idx + 1..].chars().count())
        + 1;
    (line as u32, column as u32)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::Literal;

    #[test]
    fn parses_declarations_with_initializers() {
        let script = parse(
            "VAR\n  state : INT := 2;\n  limit : TIME := T#30s;\n  edge : R_TRIG;\nEND_VAR",
        )
        .expect("parse");
        assert_eq!(script.vars.len(), 3);
        assert_eq!(script.vars[0].ty, TypeName::Int);
        assert_eq!(script.vars[0].init, Some(Literal::Int(2)));
        assert_eq!(script.vars[1].init, Some(Literal::Time(30_000_000_000)));
        assert_eq!(script.vars[2].ty, TypeName::RTrig);
        assert!(script.body.is_empty());
    }

    #[test]
    fn rejects_duplicate_variables() {
        let err = parse("VAR a : BOOL; A : INT; END_VAR").unwrap_err();
        assert!(err.message.contains("duplicate variable"));
        assert_eq!(err.line, 1);
    }

    #[test]
    fn rejects_unknown_types() {
        let err = parse("VAR\n  a : STRING;\nEND_VAR").unwrap_err();
        assert_eq!(err.line, 2);
        assert_eq!(err.column, 7);
        assert!(err.to_string().contains("unknown type 'STRING'"));
    }

    #[test]
    fn line_col_counts_from_one() {
        assert_eq!(line_col("ab\ncd", TextSize::from(4)), (2, 2));
        assert_eq!(line_col("ab", TextSize::from(0)), (1, 1));
    }
}
