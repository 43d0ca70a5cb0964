//! Token definitions for the homeplc Structured Text dialect.
//!
//! Keywords are case-insensitive, as in IEC 61131-3. Trivia (whitespace and
//! comments) is produced as tokens so ranges stay lossless; the parser skips it.

use logos::Logos;

fn lex_block_comment(lex: &mut logos::Lexer<TokenKind>) -> bool {
    let mut depth = 1usize;
    let bytes = lex.remainder().as_bytes();
    let mut i = 0usize;

    while i + 1 < bytes.len() {
        if bytes[i] == b'(' && bytes[i + 1] == b'*' {
            depth += 1;
            i += 2;
            continue;
        }
        if bytes[i] == b'*' && bytes[i + 1] == b')' {
            depth -= 1;
            i += 2;
            if depth == 0 {
                lex.bump(i);
                return true;
            }
            continue;
        }
        i += 1;
    }

    lex.bump(bytes.len());
    false
}

/// All token kinds of the script language.
#[derive(Logos, Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[repr(u16)]
pub enum TokenKind {
    // =========================================================================
    // TRIVIA
    // =========================================================================
    /// Whitespace (spaces, tabs, newlines)
    #[regex(r"[ \t\r\n]+")]
    Whitespace,

    /// Single-line comment: // ...
    #[regex(r"//[^\r\n]*", allow_greedy = true)]
    LineComment,

    /// Block comment: (* ... *), nesting allowed.
    #[token("(*", lex_block_comment)]
    BlockComment,

    // =========================================================================
    // PUNCTUATION
    // =========================================================================
    /// `;`
    #[token(";")]
    Semicolon,

    /// `:`
    #[token(":")]
    Colon,

    /// `,`
    #[token(",")]
    Comma,

    /// `.`
    #[token(".")]
    Dot,

    /// `(`
    #[token("(")]
    LParen,

    /// `)`
    #[token(")")]
    RParen,

    // =========================================================================
    // OPERATORS
    // =========================================================================
    /// `:=`
    #[token(":=")]
    Assign,

    /// `=`
    #[token("=")]
    Eq,

    /// `<>`
    #[token("<>")]
    Neq,

    /// `<`
    #[token("<")]
    Lt,

    /// `<=`
    #[token("<=")]
    LtEq,

    /// `>`
    #[token(">")]
    Gt,

    /// `>=`
    #[token(">=")]
    GtEq,

    /// `+`
    #[token("+")]
    Plus,

    /// `-`
    #[token("-")]
    Minus,

    /// `*`
    #[token("*")]
    Star,

    /// `/`
    #[token("/")]
    Slash,

    /// `&` (alias for AND)
    #[token("&")]
    Ampersand,

    // =========================================================================
    // KEYWORDS
    // =========================================================================
    /// `VAR`
    #[token("VAR", ignore(case))]
    KwVar,

    /// `END_VAR`
    #[token("END_VAR", ignore(case))]
    KwEndVar,

    /// `IF`
    #[token("IF", ignore(case))]
    KwIf,

    /// `THEN`
    #[token("THEN", ignore(case))]
    KwThen,

    /// `ELSIF`
    #[token("ELSIF", ignore(case))]
    KwElsif,

    /// `ELSE`
    #[token("ELSE", ignore(case))]
    KwElse,

    /// `END_IF`
    #[token("END_IF", ignore(case))]
    KwEndIf,

    /// `CASE`
    #[token("CASE", ignore(case))]
    KwCase,

    /// `OF`
    #[token("OF", ignore(case))]
    KwOf,

    /// `END_CASE`
    #[token("END_CASE", ignore(case))]
    KwEndCase,

    /// `AND`
    #[token("AND", ignore(case))]
    KwAnd,

    /// `OR`
    #[token("OR", ignore(case))]
    KwOr,

    /// `XOR`
    #[token("XOR", ignore(case))]
    KwXor,

    /// `NOT`
    #[token("NOT", ignore(case))]
    KwNot,

    /// `MOD`
    #[token("MOD", ignore(case))]
    KwMod,

    /// `TRUE`
    #[token("TRUE", ignore(case))]
    KwTrue,

    /// `FALSE`
    #[token("FALSE", ignore(case))]
    KwFalse,

    // =========================================================================
    // LITERALS
    // =========================================================================
    /// Integer literal: 42, 1_000, 16#FF, 2#1010
    #[regex(r"[0-9]([0-9]|_[0-9])*")]
    #[regex(r"16#[0-9A-Fa-f]([0-9A-Fa-f]|_[0-9A-Fa-f])*")]
    #[regex(r"2#[01]([01]|_[01])*")]
    IntLiteral,

    /// Real literal: 3.14, 1.0E10
    #[regex(r"[0-9]([0-9]|_[0-9])*\.[0-9]([0-9]|_[0-9])*([eE][+-]?[0-9]+)?")]
    RealLiteral,

    /// Time literal: T#30s, TIME#1m30s, T#1.5s
    #[regex(
        r"(?:T|TIME)#(?:[0-9]+(?:\.[0-9]+)?(?:ms|s|m|h|d))(?:_?(?:[0-9]+(?:\.[0-9]+)?(?:ms|s|m|h|d)))*",
        ignore(case)
    )]
    TimeLiteral,

    // =========================================================================
    // IDENTIFIERS
    // =========================================================================
    /// Identifier: starts with letter or underscore.
    #[regex(r"[A-Za-z_][A-Za-z0-9_]*")]
    Ident,

    // =========================================================================
    // SPECIAL
    // =========================================================================
    /// Unrecognized input.
    #[default]
    Error,

    /// End of input (never produced by logos, used by the parser).
    Eof,
}

impl TokenKind {
    /// Returns true for whitespace and comments.
    #[must_use]
    pub fn is_trivia(self) -> bool {
        matches!(
            self,
            Self::Whitespace | Self::LineComment | Self::BlockComment
        )
    }

    /// Returns true for reserved words.
    #[must_use]
    pub fn is_keyword(self) -> bool {
        matches!(
            self,
            Self::KwVar
                | Self::KwEndVar
                | Self::KwIf
                | Self::KwThen
                | Self::KwElsif
                | Self::KwElse
                | Self::KwEndIf
                | Self::KwCase
                | Self::KwOf
                | Self::KwEndCase
                | Self::KwAnd
                | Self::KwOr
                | Self::KwXor
                | Self::KwNot
                | Self::KwMod
                | Self::KwTrue
                | Self::KwFalse
        )
    }

    /// Human-readable description used in parse errors.
    #[must_use]
    pub fn describe(self) -> &'static str {
        match self {
            Self::Whitespace => "whitespace",
            Self::LineComment | Self::BlockComment => "comment",
            Self::Semicolon => "';'",
            Self::Colon => "':'",
            Self::Comma => "','",
            Self::Dot => "'.'",
            Self::LParen => "'('",
            Self::RParen => "')'",
            Self::Assign => "':='",
            Self::Eq => "'='",
            Self::Neq => "'<>'",
            Self::Lt => "'<'",
            Self::LtEq => "'<='",
            Self::Gt => "'>'",
            Self::GtEq => "'>='",
            Self::Plus => "'+'",
            Self::Minus => "'-'",
            Self::Star => "'*'",
            Self::Slash => "'/'",
            Self::Ampersand => "'&'",
            Self::KwVar => "VAR",
            Self::KwEndVar => "END_VAR",
            Self::KwIf => "IF",
            Self::KwThen => "THEN",
            Self::KwElsif => "ELSIF",
            Self::KwElse => "ELSE",
            Self::KwEndIf => "END_IF",
            Self::KwCase => "CASE",
            Self::KwOf => "OF",
            Self::KwEndCase => "END_CASE",
            Self::KwAnd => "AND",
            Self::KwOr => "OR",
            Self::KwXor => "XOR",
            Self::KwNot => "NOT",
            Self::KwMod => "MOD",
            Self::KwTrue => "TRUE",
            Self::KwFalse => "FALSE",
            Self::IntLiteral => "integer literal",
            Self::RealLiteral => "real literal",
            Self::TimeLiteral => "time literal",
            Self::Ident => "identifier",
            Self::Error => "invalid token",
            Self::Eof => "end of input",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<TokenKind> {
        TokenKind::lexer(source)
            .map(|kind| kind.unwrap_or(TokenKind::Error))
            .filter(|kind| !kind.is_trivia())
            .collect()
    }

    #[test]
    fn keywords_ignore_case() {
        assert_eq!(
            kinds("if Then ELSIF end_if"),
            vec![
                TokenKind::KwIf,
                TokenKind::KwThen,
                TokenKind::KwElsif,
                TokenKind::KwEndIf
            ]
        );
    }

    #[test]
    fn nested_block_comments_are_one_token() {
        assert_eq!(
            kinds("a (* outer (* inner *) outer *) b"),
            vec![TokenKind::Ident, TokenKind::Ident]
        );
    }

    #[test]
    fn time_literals() {
        assert_eq!(
            kinds("T#30s t#100ms TIME#1m30s T#1.5s"),
            vec![TokenKind::TimeLiteral; 4]
        );
    }

    #[test]
    fn operators() {
        assert_eq!(
            kinds(":= = <> < <= > >= + - * / &"),
            vec![
                TokenKind::Assign,
                TokenKind::Eq,
                TokenKind::Neq,
                TokenKind::Lt,
                TokenKind::LtEq,
                TokenKind::Gt,
                TokenKind::GtEq,
                TokenKind::Plus,
                TokenKind::Minus,
                TokenKind::Star,
                TokenKind::Slash,
                TokenKind::Ampersand
            ]
        );
    }
}
