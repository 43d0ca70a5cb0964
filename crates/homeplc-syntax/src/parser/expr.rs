//! Expression grammar.
//!
//! Precedence, lowest first: OR, XOR, AND/&, comparison, + -, * / MOD,
//! unary - NOT, primary.

use smol_str::SmolStr;

use crate::ast::{BinaryOp, Expr, Literal, Scope, UnaryOp};
use crate::lexer::TokenKind;

use super::{parse_int_literal, parse_real_literal, parse_time_literal, ParseError, Parser};

impl Parser<'_> {
    pub(super) fn expr(&mut self) -> Result<Expr, ParseError> {
        self.binary_level(0)
    }

    fn binary_level(&mut self, level: usize) -> Result<Expr, ParseError> {
        if level == LEVELS.len() {
            return self.unary();
        }
        let mut left = self.binary_level(level + 1)?;
        while let Some(op) = operator_at(level, self.current().kind) {
            self.bump();
            let right = self.binary_level(level + 1)?;
            left = Expr::Binary {
                op,
                left: Box::new(left),
                right: Box::new(right),
            };
        }
        Ok(left)
    }

    fn unary(&mut self) -> Result<Expr, ParseError> {
        let op = match self.current().kind {
            TokenKind::Minus => UnaryOp::Neg,
            TokenKind::KwNot => UnaryOp::Not,
            _ => return self.primary(),
        };
        self.bump();
        let expr = self.unary()?;
        Ok(Expr::Unary {
            op,
            expr: Box::new(expr),
        })
    }

    fn primary(&mut self) -> Result<Expr, ParseError> {
        let token = self.current();
        let text = self.text(token);
        match token.kind {
            TokenKind::KwTrue => {
                self.bump();
                Ok(Expr::Literal(Literal::Bool(true)))
            }
            TokenKind::KwFalse => {
                self.bump();
                Ok(Expr::Literal(Literal::Bool(false)))
            }
            TokenKind::IntLiteral => {
                let value = parse_int_literal(text)
                    .ok_or_else(|| self.error_here(format!("invalid integer '{text}'")))?;
                self.bump();
                Ok(Expr::Literal(Literal::Int(value)))
            }
            TokenKind::RealLiteral => {
                let value = parse_real_literal(text)
                    .ok_or_else(|| self.error_here(format!("invalid real '{text}'")))?;
                self.bump();
                Ok(Expr::Literal(Literal::Real(value)))
            }
            TokenKind::TimeLiteral => {
                let value = parse_time_literal(text)
                    .ok_or_else(|| self.error_here(format!("invalid time '{text}'")))?;
                self.bump();
                Ok(Expr::Literal(Literal::Time(value)))
            }
            TokenKind::LParen => {
                self.bump();
                let inner = self.expr()?;
                self.expect(TokenKind::RParen)?;
                Ok(inner)
            }
            TokenKind::Ident => self.name_expr(),
            _ => Err(self.error_here(format!(
                "expected expression, found {}",
                token.kind.describe()
            ))),
        }
    }

    fn name_expr(&mut self) -> Result<Expr, ParseError> {
        let token = self.bump();
        let text = self.text(token);
        if let Some(scope) = table_scope(text) {
            if self.at(TokenKind::Dot) {
                self.bump();
                let field = self.expect(TokenKind::Ident)?;
                return Ok(Expr::Table {
                    scope,
                    name: SmolStr::new(self.text(field)),
                });
            }
        }
        if text.eq_ignore_ascii_case("NOW") && !self.at(TokenKind::Dot) {
            return Ok(Expr::Now);
        }
        if self.eat(TokenKind::Dot) {
            let field = self.expect(TokenKind::Ident)?;
            return Ok(Expr::Member {
                instance: SmolStr::new(text),
                field: SmolStr::new(self.text(field).to_ascii_uppercase()),
            });
        }
        Ok(Expr::Name(SmolStr::new(text)))
    }
}

/// `IN` / `OUT` prefixes address the variable table.
pub(super) fn table_scope(text: &str) -> Option<Scope> {
    if text.eq_ignore_ascii_case("IN") {
        Some(Scope::Input)
    } else if text.eq_ignore_ascii_case("OUT") {
        Some(Scope::Output)
    } else {
        None
    }
}

const LEVELS: [&[(TokenKind, BinaryOp)]; 6] = [
    &[(TokenKind::KwOr, BinaryOp::Or)],
    &[(TokenKind::KwXor, BinaryOp::Xor)],
    &[
        (TokenKind::KwAnd, BinaryOp::And),
        (TokenKind::Ampersand, BinaryOp::And),
    ],
    &[
        (TokenKind::Eq, BinaryOp::Eq),
        (TokenKind::Neq, BinaryOp::Ne),
        (TokenKind::Lt, BinaryOp::Lt),
        (TokenKind::LtEq, BinaryOp::Le),
        (TokenKind::Gt, BinaryOp::Gt),
        (TokenKind::GtEq, BinaryOp::Ge),
    ],
    &[
        (TokenKind::Plus, BinaryOp::Add),
        (TokenKind::Minus, BinaryOp::Sub),
    ],
    &[
        (TokenKind::Star, BinaryOp::Mul),
        (TokenKind::Slash, BinaryOp::Div),
        (TokenKind::KwMod, BinaryOp::Mod),
    ],
];

fn operator_at(level: usize, kind: TokenKind) -> Option<BinaryOp> {
    LEVELS[level]
        .iter()
        .find(|(token, _)| *token == kind)
        .map(|(_, op)| *op)
}

#[cfg(test)]
mod tests {
    use crate::ast::{BinaryOp, Expr, Literal, Scope, Stmt, UnaryOp};
    use crate::parser::parse;

    fn value_of(source: &str) -> Expr {
        let script = parse(&format!("x := {source};")).expect("parse");
        match script.body.into_iter().next() {
            Some(Stmt::Assign { value, .. }) => value,
            other => panic!("unexpected statement {other:?}"),
        }
    }

    #[test]
    fn and_binds_tighter_than_or() {
        let expr = value_of("a OR b AND c");
        let Expr::Binary { op, right, .. } = expr else {
            panic!("expected binary");
        };
        assert_eq!(op, BinaryOp::Or);
        assert!(matches!(
            *right,
            Expr::Binary {
                op: BinaryOp::And,
                ..
            }
        ));
    }

    #[test]
    fn not_applies_to_the_nearest_operand() {
        let expr = value_of("NOT a AND b");
        let Expr::Binary { op, left, .. } = expr else {
            panic!("expected binary");
        };
        assert_eq!(op, BinaryOp::And);
        assert!(matches!(
            *left,
            Expr::Unary {
                op: UnaryOp::Not,
                ..
            }
        ));
    }

    #[test]
    fn table_members_and_now() {
        assert_eq!(
            value_of("in.input_up"),
            Expr::Table {
                scope: Scope::Input,
                name: "input_up".into()
            }
        );
        assert_eq!(value_of("now"), Expr::Now);
        assert_eq!(
            value_of("edge.q"),
            Expr::Member {
                instance: "edge".into(),
                field: "Q".into()
            }
        );
    }

    #[test]
    fn time_arithmetic_parses_left_to_right() {
        let expr = value_of("NOW - since >= T#30s");
        let Expr::Binary { op, right, .. } = expr else {
            panic!("expected binary");
        };
        assert_eq!(op, BinaryOp::Ge);
        assert_eq!(*right, Expr::Literal(Literal::Time(30_000_000_000)));
    }
}
