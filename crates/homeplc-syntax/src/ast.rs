//! Abstract syntax tree for script programs.

#![allow(missing_docs)]

use smol_str::SmolStr;
use text_size::TextRange;

/// A parsed script: persistent declarations followed by the cycle body.
#[derive(Debug, Clone, PartialEq)]
pub struct Script {
    pub vars: Vec<VarDecl>,
    pub body: Vec<Stmt>,
}

/// `name : TYPE [:= literal];`
#[derive(Debug, Clone, PartialEq)]
pub struct VarDecl {
    pub name: SmolStr,
    pub ty: TypeName,
    pub init: Option<Literal>,
    pub range: TextRange,
}

/// Declarable types: elementary values and built-in function blocks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeName {
    Bool,
    Int,
    Real,
    Time,
    RTrig,
    FTrig,
    Ton,
}

impl TypeName {
    /// Resolve a type identifier (case-insensitive).
    #[must_use]
    pub fn parse(text: &str) -> Option<Self> {
        match text.to_ascii_uppercase().as_str() {
            "BOOL" => Some(Self::Bool),
            "INT" | "DINT" | "LINT" => Some(Self::Int),
            "REAL" | "LREAL" => Some(Self::Real),
            "TIME" => Some(Self::Time),
            "R_TRIG" => Some(Self::RTrig),
            "F_TRIG" => Some(Self::FTrig),
            "TON" => Some(Self::Ton),
            _ => None,
        }
    }

    /// True for function block types, which hold state and are called.
    #[must_use]
    pub fn is_function_block(self) -> bool {
        matches!(self, Self::RTrig | Self::FTrig | Self::Ton)
    }
}

/// Literal constants. Time literals are stored in nanoseconds.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Literal {
    Bool(bool),
    Int(i64),
    Real(f64),
    Time(i64),
}

/// Variable-table namespace addressed from a script.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    /// `IN.name`
    Input,
    /// `OUT.name`
    Output,
}

/// Unary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Neg,
    Not,
}

/// Binary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    And,
    Or,
    Xor,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

/// Expression node.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Literal(Literal),
    /// A declared local variable.
    Name(SmolStr),
    /// The cycle timestamp.
    Now,
    /// `IN.name` or `OUT.name`.
    Table { scope: Scope, name: SmolStr },
    /// Function block output, e.g. `edge.Q`.
    Member { instance: SmolStr, field: SmolStr },
    Unary {
        op: UnaryOp,
        expr: Box<Expr>,
    },
    Binary {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
}

/// Assignment target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    Local(SmolStr),
    Output(SmolStr),
}

/// CASE label.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaseLabel {
    Single(i64),
    Range(i64, i64),
}

/// Statement node.
#[derive(Debug, Clone, PartialEq)]
pub enum Stmt {
    Assign {
        target: Target,
        value: Expr,
        range: TextRange,
    },
    If {
        condition: Expr,
        then_block: Vec<Stmt>,
        else_if: Vec<(Expr, Vec<Stmt>)>,
        else_block: Vec<Stmt>,
        range: TextRange,
    },
    Case {
        selector: Expr,
        branches: Vec<(Vec<CaseLabel>, Vec<Stmt>)>,
        else_block: Vec<Stmt>,
        range: TextRange,
    },
    /// Function block invocation `inst(IN := expr, ...)`.
    Call {
        instance: SmolStr,
        args: Vec<(SmolStr, Expr)>,
        range: TextRange,
    },
}

impl Stmt {
    #[must_use]
    pub fn range(&self) -> TextRange {
        match self {
            Stmt::Assign { range, .. }
            | Stmt::If { range, .. }
            | Stmt::Case { range, .. }
            | Stmt::Call { range, .. } => *range,
        }
    }
}

impl Script {
    /// Names of every table output this script assigns, in first-seen order.
    #[must_use]
    pub fn assigned_outputs(&self) -> Vec<SmolStr> {
        let mut names = Vec::new();
        collect_outputs(&self.body, &mut names);
        names
    }
}

fn collect_outputs(block: &[Stmt], names: &mut Vec<SmolStr>) {
    for stmt in block {
        match stmt {
            Stmt::Assign {
                target: Target::Output(name),
                ..
            } => {
                if !names.contains(name) {
                    names.push(name.clone());
                }
            }
            Stmt::Assign { .. } | Stmt::Call { .. } => {}
            Stmt::If {
                then_block,
                else_if,
                else_block,
                ..
            } => {
                collect_outputs(then_block, names);
                for (_, block) in else_if {
                    collect_outputs(block, names);
                }
                collect_outputs(else_block, names);
            }
            Stmt::Case {
                branches,
                else_block,
                ..
            } => {
                for (_, block) in branches {
                    collect_outputs(block, names);
                }
                collect_outputs(else_block, names);
            }
        }
    }
}
