//! Statement grammar.

use smol_str::SmolStr;
use text_size::TextRange;

use crate::ast::{CaseLabel, Scope, Stmt, Target};
use crate::lexer::TokenKind;

use super::expr::table_scope;
use super::{parse_int_literal, ParseError, Parser};

impl Parser<'_> {
    /// Statements up to (not including) one of `terminators`.
    pub(super) fn block(&mut self, terminators: &[TokenKind]) -> Result<Vec<Stmt>, ParseError> {
        let mut stmts = Vec::new();
        while !terminators.contains(&self.current().kind) {
            if self.at(TokenKind::Eof) {
                return Err(self.error_here(format!(
                    "unexpected end of input, expected {}",
                    terminators[0].describe()
                )));
            }
            if self.eat(TokenKind::Semicolon) {
                continue;
            }
            stmts.push(self.stmt()?);
        }
        Ok(stmts)
    }

    fn stmt(&mut self) -> Result<Stmt, ParseError> {
        match self.current().kind {
            TokenKind::KwIf => self.if_stmt(),
            TokenKind::KwCase => self.case_stmt(),
            TokenKind::Ident if self.nth(1) == TokenKind::LParen => self.call_stmt(),
            TokenKind::Ident => self.assign_stmt(),
            kind => Err(self.error_here(format!(
                "expected statement, found {}",
                kind.describe()
            ))),
        }
    }

    fn if_stmt(&mut self) -> Result<Stmt, ParseError> {
        let start = self.expect(TokenKind::KwIf)?.range.start();
        let condition = self.expr()?;
        self.expect(TokenKind::KwThen)?;
        let branch_end = [TokenKind::KwElsif, TokenKind::KwElse, TokenKind::KwEndIf];
        let then_block = self.block(&branch_end)?;
        let mut else_if = Vec::new();
        while self.eat(TokenKind::KwElsif) {
            let cond = self.expr()?;
            self.expect(TokenKind::KwThen)?;
            else_if.push((cond, self.block(&branch_end)?));
        }
        let else_block = if self.eat(TokenKind::KwElse) {
            self.block(&[TokenKind::KwEndIf])?
        } else {
            Vec::new()
        };
        self.expect(TokenKind::KwEndIf)?;
        self.eat(TokenKind::Semicolon);
        Ok(Stmt::If {
            condition,
            then_block,
            else_if,
            else_block,
            range: TextRange::new(start, self.previous_end()),
        })
    }

    fn case_stmt(&mut self) -> Result<Stmt, ParseError> {
        let start = self.expect(TokenKind::KwCase)?.range.start();
        let selector = self.expr()?;
        self.expect(TokenKind::KwOf)?;
        let mut branches = Vec::new();
        while self.at_case_label() {
            let mut labels = vec![self.case_label()?];
            while self.eat(TokenKind::Comma) {
                labels.push(self.case_label()?);
            }
            self.expect(TokenKind::Colon)?;
            let block = self.case_block()?;
            branches.push((labels, block));
        }
        let else_block = if self.eat(TokenKind::KwElse) {
            self.block(&[TokenKind::KwEndCase])?
        } else {
            Vec::new()
        };
        self.expect(TokenKind::KwEndCase)?;
        self.eat(TokenKind::Semicolon);
        Ok(Stmt::Case {
            selector,
            branches,
            else_block,
            range: TextRange::new(start, self.previous_end()),
        })
    }

    fn at_case_label(&self) -> bool {
        match self.current().kind {
            TokenKind::IntLiteral => true,
            TokenKind::Minus => self.nth(1) == TokenKind::IntLiteral,
            _ => false,
        }
    }

    fn case_block(&mut self) -> Result<Vec<Stmt>, ParseError> {
        let mut stmts = Vec::new();
        while !self.at_case_label() && !self.at(TokenKind::KwElse) && !self.at(TokenKind::KwEndCase)
        {
            if self.at(TokenKind::Eof) {
                return Err(self.error_here("unexpected end of input, expected END_CASE"));
            }
            if self.eat(TokenKind::Semicolon) {
                continue;
            }
            stmts.push(self.stmt()?);
        }
        Ok(stmts)
    }

    fn case_label(&mut self) -> Result<CaseLabel, ParseError> {
        let lower = self.case_int()?;
        if self.at(TokenKind::Dot) && self.nth(1) == TokenKind::Dot {
            self.bump();
            self.bump();
            let upper = self.case_int()?;
            return Ok(CaseLabel::Range(lower, upper));
        }
        Ok(CaseLabel::Single(lower))
    }

    fn case_int(&mut self) -> Result<i64, ParseError> {
        let negative = self.eat(TokenKind::Minus);
        let token = self.expect(TokenKind::IntLiteral)?;
        let text = self.text(token);
        let value = parse_int_literal(text)
            .ok_or_else(|| self.error_at(token.range, format!("invalid integer '{text}'")))?;
        Ok(if negative { -value } else { value })
    }

    fn call_stmt(&mut self) -> Result<Stmt, ParseError> {
        let name_token = self.expect(TokenKind::Ident)?;
        let start = name_token.range.start();
        let instance = SmolStr::new(self.text(name_token));
        self.expect(TokenKind::LParen)?;
        let mut args = Vec::new();
        if !self.at(TokenKind::RParen) {
            loop {
                let param = self.expect(TokenKind::Ident)?;
                let param = SmolStr::new(self.text(param).to_ascii_uppercase());
                self.expect(TokenKind::Assign)?;
                args.push((param, self.expr()?));
                if !self.eat(TokenKind::Comma) {
                    break;
                }
            }
        }
        self.expect(TokenKind::RParen)?;
        let end = self.expect(TokenKind::Semicolon)?.range.end();
        Ok(Stmt::Call {
            instance,
            args,
            range: TextRange::new(start, end),
        })
    }

    fn assign_stmt(&mut self) -> Result<Stmt, ParseError> {
        let name_token = self.expect(TokenKind::Ident)?;
        let start = name_token.range.start();
        let text = self.text(name_token);
        let target = match table_scope(text) {
            Some(scope) if self.at(TokenKind::Dot) => {
                self.bump();
                let field = self.expect(TokenKind::Ident)?;
                let name = SmolStr::new(self.text(field));
                match scope {
                    Scope::Output => Target::Output(name),
                    Scope::Input => {
                        return Err(self.error_at(
                            TextRange::new(start, field.range.end()),
                            format!("input '{name}' is read-only"),
                        ))
                    }
                }
            }
            _ => {
                if self.at(TokenKind::Dot) {
                    return Err(self.error_here("function block outputs cannot be assigned"));
                }
                Target::Local(SmolStr::new(text))
            }
        };
        self.expect(TokenKind::Assign)?;
        let value = self.expr()?;
        let end = self.expect(TokenKind::Semicolon)?.range.end();
        Ok(Stmt::Assign {
            target,
            value,
            range: TextRange::new(start, end),
        })
    }
}

#[cfg(test)]
mod tests {
    use crate::ast::{CaseLabel, Stmt, Target};
    use crate::parser::parse;

    #[test]
    fn if_elsif_else_chain() {
        let script = parse(
            "IF a THEN x := 1; ELSIF b THEN x := 2; ELSIF c THEN x := 3; ELSE x := 4; END_IF;",
        )
        .expect("parse");
        let Stmt::If {
            then_block,
            else_if,
            else_block,
            ..
        } = &script.body[0]
        else {
            panic!("expected IF");
        };
        assert_eq!(then_block.len(), 1);
        assert_eq!(else_if.len(), 2);
        assert_eq!(else_block.len(), 1);
    }

    #[test]
    fn case_with_ranges_and_lists() {
        let script = parse(
            "CASE state OF\n  0: x := 1;\n  1..2, 5: x := 2; y := 3;\n  -1: x := 0;\nELSE x := 9;\nEND_CASE",
        )
        .expect("parse");
        let Stmt::Case {
            branches,
            else_block,
            ..
        } = &script.body[0]
        else {
            panic!("expected CASE");
        };
        assert_eq!(branches.len(), 3);
        assert_eq!(
            branches[1].0,
            vec![CaseLabel::Range(1, 2), CaseLabel::Single(5)]
        );
        assert_eq!(branches[1].1.len(), 2);
        assert_eq!(branches[2].0, vec![CaseLabel::Single(-1)]);
        assert_eq!(else_block.len(), 1);
    }

    #[test]
    fn function_block_call_arguments() {
        let script = parse("edge(clk := IN.button);").expect("parse");
        let Stmt::Call { instance, args, .. } = &script.body[0] else {
            panic!("expected call");
        };
        assert_eq!(instance, "edge");
        assert_eq!(args.len(), 1);
        assert_eq!(args[0].0, "CLK");
    }

    #[test]
    fn output_assignment_target() {
        let script = parse("OUT.lamp := TRUE;").expect("parse");
        assert!(matches!(
            &script.body[0],
            Stmt::Assign { target: Target::Output(name), .. } if name == "lamp"
        ));
        assert_eq!(script.assigned_outputs(), vec!["lamp"]);
    }

    #[test]
    fn inputs_are_read_only() {
        let err = parse("IN.button := TRUE;").unwrap_err();
        assert!(err.message.contains("read-only"));
    }

    #[test]
    fn missing_end_if_is_reported() {
        let err = parse("IF a THEN x := 1;").unwrap_err();
        assert!(err.message.contains("end of input"));
    }
}
