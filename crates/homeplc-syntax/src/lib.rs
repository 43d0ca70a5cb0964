//! `homeplc-syntax` - Lexer, parser, and syntax tree for homeplc script programs.
//!
//! Script programs are written in a small Structured Text dialect:
//!
//! - **Declarations**: `VAR ... END_VAR` blocks of persistent locals and
//!   function block instances (`R_TRIG`, `F_TRIG`, `TON`)
//! - **Statements**: assignment, `IF`/`ELSIF`/`ELSE`, `CASE` and function
//!   block calls
//! - **Table access**: `IN.name` reads an input, `OUT.name` reads or writes an
//!   output, `NOW` is the cycle timestamp
//!
//! # Example
//!
//! ```
//! use homeplc_syntax::{parse, ast::Stmt};
//!
//! let script = parse("OUT.lamp := IN.button AND NOT OUT.lamp;").unwrap();
//! assert!(matches!(script.body[0], Stmt::Assign { .. }));
//! assert_eq!(script.assigned_outputs(), vec!["lamp"]);
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![allow(clippy::module_name_repetitions)]

/// Syntax tree types.
pub mod ast;
/// Tokenizer.
pub mod lexer;
/// Recursive descent parser.
pub mod parser;

pub use lexer::{lex, Lexer, Token, TokenKind};
pub use parser::{parse, ParseError};
