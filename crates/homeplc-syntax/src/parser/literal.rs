//! Literal decoding.

use crate::ast::Literal;
use crate::lexer::TokenKind;

use super::{ParseError, Parser};

const NANOS_PER_MILLI: f64 = 1_000_000.0;

impl Parser<'_> {
    /// Literal constant, optionally negated (declaration initializers).
    pub(super) fn literal(&mut self) -> Result<Literal, ParseError> {
        let negative = self.eat(TokenKind::Minus);
        let token = self.current();
        let text = self.text(token);
        let literal = match token.kind {
            TokenKind::KwTrue if !negative => Literal::Bool(true),
            TokenKind::KwFalse if !negative => Literal::Bool(false),
            TokenKind::IntLiteral => {
                let value = parse_int_literal(text)
                    .ok_or_else(|| self.error_here(format!("invalid integer '{text}'")))?;
                Literal::Int(if negative { -value } else { value })
            }
            TokenKind::RealLiteral => {
                let value = parse_real_literal(text)
                    .ok_or_else(|| self.error_here(format!("invalid real '{text}'")))?;
                Literal::Real(if negative { -value } else { value })
            }
            TokenKind::TimeLiteral => {
                let value = parse_time_literal(text)
                    .ok_or_else(|| self.error_here(format!("invalid time '{text}'")))?;
                Literal::Time(if negative { -value } else { value })
            }
            _ => return Err(self.error_here("expected literal")),
        };
        self.bump();
        Ok(literal)
    }
}

/// Decode `42`, `1_000`, `16#FF` and `2#1010`.
#[must_use]
pub fn parse_int_literal(text: &str) -> Option<i64> {
    let cleaned: String = text.chars().filter(|ch| *ch != '_').collect();
    if let Some(hex) = cleaned.strip_prefix("16#") {
        return i64::from_str_radix(hex, 16).ok();
    }
    if let Some(bin) = cleaned.strip_prefix("2#") {
        return i64::from_str_radix(bin, 2).ok();
    }
    cleaned.parse::<i64>().ok()
}

/// Decode `3.14` and `1.0E3`.
#[must_use]
pub fn parse_real_literal(text: &str) -> Option<f64> {
    let cleaned: String = text.chars().filter(|ch| *ch != '_').collect();
    cleaned.parse::<f64>().ok()
}

/// Decode `T#1m30s`, `TIME#100ms`, `T#1.5s` into nanoseconds.
#[must_use]
pub fn parse_time_literal(text: &str) -> Option<i64> {
    let (_, body) = text.split_once('#')?;
    let body = body.to_ascii_lowercase();
    let mut rest = body.as_str();
    let mut total_ms = 0.0_f64;
    let mut parts = 0;
    while !rest.is_empty() {
        rest = rest.strip_prefix('_').unwrap_or(rest);
        let number_len = rest
            .find(|ch: char| !(ch.is_ascii_digit() || ch == '.'))
            .unwrap_or(rest.len());
        let number: f64 = rest[..number_len].parse().ok()?;
        rest = &rest[number_len..];
        let unit_len = rest
            .find(|ch: char| !ch.is_ascii_alphabetic())
            .unwrap_or(rest.len());
        let factor = match &rest[..unit_len] {
            "ms" => 1.0,
            "s" => 1_000.0,
            "m" => 60_000.0,
            "h" => 3_600_000.0,
            "d" => 86_400_000.0,
            _ => return None,
        };
        rest = &rest[unit_len..];
        total_ms += number * factor;
        parts += 1;
    }
    if parts == 0 {
        return None;
    }
    Some((total_ms * NANOS_PER_MILLI).round() as i64)
}
