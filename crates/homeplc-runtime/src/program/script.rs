//! Structured Text script programs.
//!
//! A script is parsed once, then every name in it is resolved: locals to
//! slots, `IN.`/`OUT.` references to table keys and function block members to
//! typed fields. Execution walks the resolved tree each cycle.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use homeplc_syntax::ast::{
    BinaryOp, CaseLabel, Expr, Literal, Scope, Script, Stmt, Target, TypeName, UnaryOp,
};
use homeplc_syntax::parser::line_col;
use smol_str::SmolStr;
use text_size::TextRange;

use crate::error::RuntimeError;
use crate::library::{FTrig, RTrig, TimerOutput, Ton};
use crate::table::{Namespace, VarKey, VariableTable};
use crate::value::{Duration, Value, ValueKind};

use super::Program;

/// Values a script computes with. `Time` never reaches the table.
#[derive(Debug, Clone, Copy, PartialEq)]
enum ScriptValue {
    Bool(bool),
    Int(i64),
    Real(f64),
    Time(Duration),
}

impl ScriptValue {
    fn type_name(self) -> &'static str {
        match self {
            Self::Bool(_) => "BOOL",
            Self::Int(_) => "INT",
            Self::Real(_) => "REAL",
            Self::Time(_) => "TIME",
        }
    }

    fn from_literal(literal: Literal) -> Self {
        match literal {
            Literal::Bool(value) => Self::Bool(value),
            Literal::Int(value) => Self::Int(value),
            Literal::Real(value) => Self::Real(value),
            Literal::Time(nanos) => Self::Time(Duration::from_nanos(nanos)),
        }
    }

    fn default_for(ty: TypeName) -> Self {
        match ty {
            TypeName::Int => Self::Int(0),
            TypeName::Real => Self::Real(0.0),
            TypeName::Time => Self::Time(Duration::ZERO),
            TypeName::Bool | TypeName::RTrig | TypeName::FTrig | TypeName::Ton => {
                Self::Bool(false)
            }
        }
    }

    /// Store `self` into a slot of type `ty`, widening INT to REAL.
    fn coerce_to(self, ty: TypeName) -> Option<Self> {
        match (ty, self) {
            (TypeName::Bool, Self::Bool(_))
            | (TypeName::Int, Self::Int(_))
            | (TypeName::Real, Self::Real(_))
            | (TypeName::Time, Self::Time(_)) => Some(self),
            #[allow(clippy::cast_precision_loss)]
            (TypeName::Real, Self::Int(value)) => Some(Self::Real(value as f64)),
            _ => None,
        }
    }
}

impl From<Value> for ScriptValue {
    fn from(value: Value) -> Self {
        match value {
            Value::Bool(value) => Self::Bool(value),
            Value::Int(value) => Self::Int(value),
            Value::Real(value) => Self::Real(value),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FbParam {
    Clk,
    In,
    Pt,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FbField {
    Q,
    Et,
}

#[derive(Debug)]
enum Slot {
    Value { ty: TypeName, value: ScriptValue },
    RTrig { block: RTrig, clk: bool, q: bool },
    FTrig { block: FTrig, clk: bool, q: bool },
    Ton {
        block: Ton,
        input: bool,
        pt: Duration,
        out: TimerOutput,
    },
}

impl Slot {
    fn new(ty: TypeName, init: Option<ScriptValue>) -> Self {
        match ty {
            TypeName::RTrig => Self::RTrig {
                block: RTrig::new(),
                clk: false,
                q: false,
            },
            TypeName::FTrig => Self::FTrig {
                block: FTrig::new(),
                clk: false,
                q: false,
            },
            TypeName::Ton => Self::Ton {
                block: Ton::new(),
                input: false,
                pt: Duration::ZERO,
                out: TimerOutput {
                    q: false,
                    et: Duration::ZERO,
                },
            },
            TypeName::Bool | TypeName::Int | TypeName::Real | TypeName::Time => Self::Value {
                ty,
                value: init.unwrap_or_else(|| ScriptValue::default_for(ty)),
            },
        }
    }
}

#[derive(Debug)]
enum Operand {
    Const(ScriptValue),
    Local(usize),
    Now,
    Table(VarKey),
    Member { slot: usize, field: FbField },
    Unary { op: UnaryOp, expr: Box<Operand> },
    Binary {
        op: BinaryOp,
        left: Box<Operand>,
        right: Box<Operand>,
    },
}

#[derive(Debug)]
enum Op {
    AssignLocal { slot: usize, value: Operand },
    AssignOutput { key: VarKey, value: Operand },
    If {
        branches: Vec<(Operand, Vec<Op>)>,
        else_block: Vec<Op>,
    },
    Case {
        selector: Operand,
        branches: Vec<(Vec<CaseLabel>, Vec<Op>)>,
        else_block: Vec<Op>,
    },
    Call {
        slot: usize,
        args: Vec<(FbParam, Operand)>,
    },
}

/// A loaded script bound to one variable table.
#[derive(Debug)]
pub struct ScriptProgram {
    name: SmolStr,
    table: Arc<VariableTable>,
    slots: Vec<Slot>,
    body: Vec<Op>,
    outputs: Vec<SmolStr>,
}

impl ScriptProgram {
    /// Read, parse and resolve a script file. The program is named after the
    /// file stem.
    pub fn load(path: &Path, table: Arc<VariableTable>) -> Result<Self, RuntimeError> {
        let name = path
            .file_stem()
            .map_or_else(|| path.display().to_string(), |stem| stem.to_string_lossy().into_owned());
        let source = std::fs::read_to_string(path).map_err(|err| RuntimeError::ScriptLoad {
            program: SmolStr::new(&name),
            message: SmolStr::new(format!("failed to read {}: {err}", path.display())),
        })?;
        Self::from_source(name, &source, table)
    }

    pub fn from_source(
        name: impl Into<SmolStr>,
        source: &str,
        table: Arc<VariableTable>,
    ) -> Result<Self, RuntimeError> {
        let name = name.into();
        let script = homeplc_syntax::parse(source).map_err(|err| RuntimeError::ScriptLoad {
            program: name.clone(),
            message: SmolStr::new(err.to_string()),
        })?;
        let resolver = Resolver::new(&name, source, &table, &script)?;
        let body = resolver.block(&script.body)?;
        let Resolver { slots, .. } = resolver;
        tracing::debug!(program = %name, locals = slots.len(), "script loaded");
        Ok(Self {
            outputs: script.assigned_outputs(),
            name,
            table,
            slots,
            body,
        })
    }

    fn run_block(&mut self, block: &[Op], now: Duration) -> Result<(), RuntimeError> {
        for op in block {
            self.run(op, now)?;
        }
        Ok(())
    }

    fn run(&mut self, op: &Op, now: Duration) -> Result<(), RuntimeError> {
        match op {
            Op::AssignLocal { slot, value } => {
                let value = self.eval(value, now)?;
                let Slot::Value { ty, value: stored } = &mut self.slots[*slot] else {
                    return Err(script_fault("assignment to function block instance"));
                };
                *stored = value.coerce_to(*ty).ok_or_else(|| {
                    script_fault(format!(
                        "cannot assign {} to a {} variable",
                        value.type_name(),
                        type_label(*ty)
                    ))
                })?;
                Ok(())
            }
            Op::AssignOutput { key, value } => {
                let value = self.eval(value, now)?;
                self.write_output(*key, value)
            }
            Op::If {
                branches,
                else_block,
            } => {
                for (condition, block) in branches {
                    if self.condition(condition, now)? {
                        return self.run_block(block, now);
                    }
                }
                self.run_block(else_block, now)
            }
            Op::Case {
                selector,
                branches,
                else_block,
            } => {
                let selector = match self.eval(selector, now)? {
                    ScriptValue::Int(value) => value,
                    other => {
                        return Err(script_fault(format!(
                            "CASE selector must be INT, got {}",
                            other.type_name()
                        )))
                    }
                };
                for (labels, block) in branches {
                    if labels.iter().any(|label| label_matches(*label, selector)) {
                        return self.run_block(block, now);
                    }
                }
                self.run_block(else_block, now)
            }
            Op::Call { slot, args } => {
                let mut values = Vec::with_capacity(args.len());
                for (param, arg) in args {
                    values.push((*param, self.eval(arg, now)?));
                }
                self.call(*slot, &values, now)
            }
        }
    }

    fn call(
        &mut self,
        slot: usize,
        args: &[(FbParam, ScriptValue)],
        now: Duration,
    ) -> Result<(), RuntimeError> {
        match &mut self.slots[slot] {
            Slot::RTrig { block, clk, q } => {
                for (_, value) in args {
                    *clk = expect_bool(*value, "CLK")?;
                }
                *q = block.step(*clk);
            }
            Slot::FTrig { block, clk, q } => {
                for (_, value) in args {
                    *clk = expect_bool(*value, "CLK")?;
                }
                *q = block.step(*clk);
            }
            Slot::Ton {
                block,
                input,
                pt,
                out,
            } => {
                for (param, value) in args {
                    match (param, value) {
                        (FbParam::In, value) => *input = expect_bool(*value, "IN")?,
                        (FbParam::Pt, ScriptValue::Time(value)) => *pt = *value,
                        (_, other) => {
                            return Err(script_fault(format!(
                                "PT must be TIME, got {}",
                                other.type_name()
                            )))
                        }
                    }
                }
                *out = block.step(*input, *pt, now);
            }
            Slot::Value { .. } => return Err(script_fault("call of a non function block")),
        }
        Ok(())
    }

    fn write_output(&self, key: VarKey, value: ScriptValue) -> Result<(), RuntimeError> {
        let kind = self.table.kind_of_key(key)?;
        let value = match (kind, value) {
            (ValueKind::Bool, ScriptValue::Bool(value)) => Value::Bool(value),
            (ValueKind::Int, ScriptValue::Int(value)) => Value::Int(value),
            (ValueKind::Real, ScriptValue::Real(value)) => Value::Real(value),
            #[allow(clippy::cast_precision_loss)]
            (ValueKind::Real, ScriptValue::Int(value)) => Value::Real(value as f64),
            (_, ScriptValue::Time(_)) => {
                return Err(script_fault(format!(
                    "TIME cannot be stored in '{}'",
                    self.table.qualified_key(key)
                )))
            }
            (expected, ScriptValue::Bool(_)) => {
                return Err(mismatch(&self.table, key, expected, ValueKind::Bool))
            }
            (expected, ScriptValue::Int(_)) => {
                return Err(mismatch(&self.table, key, expected, ValueKind::Int))
            }
            (expected, ScriptValue::Real(_)) => {
                return Err(mismatch(&self.table, key, expected, ValueKind::Real))
            }
        };
        self.table.set_by_key(key, value)
    }

    fn condition(&self, operand: &Operand, now: Duration) -> Result<bool, RuntimeError> {
        match self.eval(operand, now)? {
            ScriptValue::Bool(value) => Ok(value),
            other => Err(script_fault(format!(
                "condition must be BOOL, got {}",
                other.type_name()
            ))),
        }
    }

    fn eval(&self, operand: &Operand, now: Duration) -> Result<ScriptValue, RuntimeError> {
        match operand {
            Operand::Const(value) => Ok(*value),
            Operand::Now => Ok(ScriptValue::Time(now)),
            Operand::Table(key) => self.table.get_by_key(*key).map(ScriptValue::from),
            Operand::Local(slot) => match &self.slots[*slot] {
                Slot::Value { value, .. } => Ok(*value),
                _ => Err(script_fault("function block used as a value")),
            },
            Operand::Member { slot, field } => match (&self.slots[*slot], field) {
                (Slot::RTrig { q, .. } | Slot::FTrig { q, .. }, FbField::Q) => {
                    Ok(ScriptValue::Bool(*q))
                }
                (Slot::Ton { out, .. }, FbField::Q) => Ok(ScriptValue::Bool(out.q)),
                (Slot::Ton { out, .. }, FbField::Et) => Ok(ScriptValue::Time(out.et)),
                _ => Err(script_fault("invalid function block member")),
            },
            Operand::Unary { op, expr } => unary(*op, self.eval(expr, now)?),
            Operand::Binary { op, left, right } => {
                let left = self.eval(left, now)?;
                let right = self.eval(right, now)?;
                binary(*op, left, right)
            }
        }
    }
}

impl Program for ScriptProgram {
    fn name(&self) -> &str {
        &self.name
    }

    fn execute(&mut self, now: Duration) -> Result<(), RuntimeError> {
        let body = std::mem::take(&mut self.body);
        let result = self.run_block(&body, now);
        self.body = body;
        result
    }

    fn written_outputs(&self) -> Vec<SmolStr> {
        self.outputs.clone()
    }
}

fn label_matches(label: CaseLabel, selector: i64) -> bool {
    match label {
        CaseLabel::Single(value) => value == selector,
        CaseLabel::Range(low, high) => (low..=high).contains(&selector),
    }
}

fn unary(op: UnaryOp, value: ScriptValue) -> Result<ScriptValue, RuntimeError> {
    match (op, value) {
        (UnaryOp::Not, ScriptValue::Bool(value)) => Ok(ScriptValue::Bool(!value)),
        (UnaryOp::Neg, ScriptValue::Int(value)) => value
            .checked_neg()
            .map(ScriptValue::Int)
            .ok_or(RuntimeError::Overflow),
        (UnaryOp::Neg, ScriptValue::Real(value)) => Ok(ScriptValue::Real(-value)),
        (UnaryOp::Neg, ScriptValue::Time(value)) => value
            .as_nanos()
            .checked_neg()
            .map(|nanos| ScriptValue::Time(Duration::from_nanos(nanos)))
            .ok_or(RuntimeError::Overflow),
        (op, value) => Err(script_fault(format!(
            "operator {op:?} does not apply to {}",
            value.type_name()
        ))),
    }
}

#[allow(clippy::cast_precision_loss)]
fn binary(op: BinaryOp, left: ScriptValue, right: ScriptValue) -> Result<ScriptValue, RuntimeError> {
    use ScriptValue::{Bool, Int, Real, Time};

    let unsupported = || {
        script_fault(format!(
            "operator {op:?} does not apply to {} and {}",
            left.type_name(),
            right.type_name()
        ))
    };
    let value = match (op, left, right) {
        (BinaryOp::And, Bool(a), Bool(b)) => Bool(a && b),
        (BinaryOp::Or, Bool(a), Bool(b)) => Bool(a || b),
        (BinaryOp::Xor, Bool(a), Bool(b)) => Bool(a ^ b),

        (BinaryOp::Add, Int(a), Int(b)) => Int(a.checked_add(b).ok_or(RuntimeError::Overflow)?),
        (BinaryOp::Sub, Int(a), Int(b)) => Int(a.checked_sub(b).ok_or(RuntimeError::Overflow)?),
        (BinaryOp::Mul, Int(a), Int(b)) => Int(a.checked_mul(b).ok_or(RuntimeError::Overflow)?),
        (BinaryOp::Div, Int(a), Int(b)) => {
            if b == 0 {
                return Err(RuntimeError::DivisionByZero);
            }
            Int(a.checked_div(b).ok_or(RuntimeError::Overflow)?)
        }
        (BinaryOp::Mod, Int(a), Int(b)) => {
            if b == 0 {
                return Err(RuntimeError::ModuloByZero);
            }
            Int(a.checked_rem(b).ok_or(RuntimeError::Overflow)?)
        }

        (BinaryOp::Add | BinaryOp::Sub | BinaryOp::Mul | BinaryOp::Div, Real(_) | Int(_), Real(_) | Int(_)) => {
            let (a, b) = (as_real(left), as_real(right));
            match op {
                BinaryOp::Add => Real(a + b),
                BinaryOp::Sub => Real(a - b),
                BinaryOp::Mul => Real(a * b),
                _ => {
                    if b == 0.0 {
                        return Err(RuntimeError::DivisionByZero);
                    }
                    Real(a / b)
                }
            }
        }

        (BinaryOp::Add, Time(a), Time(b)) => Time(a.checked_add(b).ok_or(RuntimeError::Overflow)?),
        (BinaryOp::Sub, Time(a), Time(b)) => Time(a.checked_sub(b).ok_or(RuntimeError::Overflow)?),
        (BinaryOp::Mul, Time(a), Int(b)) | (BinaryOp::Mul, Int(b), Time(a)) => Time(
            Duration::from_nanos(a.as_nanos().checked_mul(b).ok_or(RuntimeError::Overflow)?),
        ),
        (BinaryOp::Div, Time(a), Int(b)) => {
            if b == 0 {
                return Err(RuntimeError::DivisionByZero);
            }
            Time(Duration::from_nanos(
                a.as_nanos().checked_div(b).ok_or(RuntimeError::Overflow)?,
            ))
        }

        (BinaryOp::Eq | BinaryOp::Ne, Bool(a), Bool(b)) => {
            Bool(if op == BinaryOp::Eq { a == b } else { a != b })
        }
        (BinaryOp::Eq | BinaryOp::Ne | BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge, _, _) => {
            let ordering = match (left, right) {
                (Int(a), Int(b)) => a.cmp(&b),
                (Time(a), Time(b)) => a.cmp(&b),
                (Real(_) | Int(_), Real(_) | Int(_)) => as_real(left)
                    .partial_cmp(&as_real(right))
                    .ok_or_else(|| script_fault("comparison with NaN"))?,
                _ => return Err(unsupported()),
            };
            Bool(match op {
                BinaryOp::Eq => ordering.is_eq(),
                BinaryOp::Ne => ordering.is_ne(),
                BinaryOp::Lt => ordering.is_lt(),
                BinaryOp::Le => ordering.is_le(),
                BinaryOp::Gt => ordering.is_gt(),
                _ => ordering.is_ge(),
            })
        }
        _ => return Err(unsupported()),
    };
    Ok(value)
}

#[allow(clippy::cast_precision_loss)]
fn as_real(value: ScriptValue) -> f64 {
    match value {
        ScriptValue::Int(value) => value as f64,
        ScriptValue::Real(value) => value,
        ScriptValue::Bool(_) | ScriptValue::Time(_) => f64::NAN,
    }
}

fn expect_bool(value: ScriptValue, param: &str) -> Result<bool, RuntimeError> {
    match value {
        ScriptValue::Bool(value) => Ok(value),
        other => Err(script_fault(format!(
            "{param} must be BOOL, got {}",
            other.type_name()
        ))),
    }
}

fn mismatch(table: &VariableTable, key: VarKey, expected: ValueKind, found: ValueKind) -> RuntimeError {
    RuntimeError::KindMismatch {
        name: table.qualified_key(key),
        expected,
        found,
    }
}

fn type_label(ty: TypeName) -> &'static str {
    match ty {
        TypeName::Bool => "BOOL",
        TypeName::Int => "INT",
        TypeName::Real => "REAL",
        TypeName::Time => "TIME",
        TypeName::RTrig => "R_TRIG",
        TypeName::FTrig => "F_TRIG",
        TypeName::Ton => "TON",
    }
}

fn script_fault(msg: impl Into<String>) -> RuntimeError {
    RuntimeError::ScriptRuntime(SmolStr::new(msg.into()))
}

/// Binds the names of a parsed script.
struct Resolver<'a> {
    program: &'a str,
    source: &'a str,
    table: &'a VariableTable,
    locals: HashMap<SmolStr, (usize, TypeName)>,
    slots: Vec<Slot>,
}

impl<'a> Resolver<'a> {
    fn new(
        program: &'a str,
        source: &'a str,
        table: &'a VariableTable,
        script: &Script,
    ) -> Result<Self, RuntimeError> {
        let mut resolver = Self {
            program,
            source,
            table,
            locals: HashMap::new(),
            slots: Vec::with_capacity(script.vars.len()),
        };
        for var in &script.vars {
            let key = local_key(&var.name);
            if resolver.locals.contains_key(&key) {
                return Err(resolver.error(var.range, format!("duplicate variable '{}'", var.name)));
            }
            let init = match var.init {
                None => None,
                Some(_) if var.ty.is_function_block() => {
                    return Err(resolver.error(
                        var.range,
                        format!("function block '{}' cannot be initialised", var.name),
                    ))
                }
                Some(literal) => {
                    let value = ScriptValue::from_literal(literal);
                    Some(value.coerce_to(var.ty).ok_or_else(|| {
                        resolver.error(
                            var.range,
                            format!(
                                "initial value of '{}' is {}, expected {}",
                                var.name,
                                value.type_name(),
                                type_label(var.ty)
                            ),
                        )
                    })?)
                }
            };
            resolver.locals.insert(key, (resolver.slots.len(), var.ty));
            resolver.slots.push(Slot::new(var.ty, init));
        }
        Ok(resolver)
    }

    fn block(&self, block: &[Stmt]) -> Result<Vec<Op>, RuntimeError> {
        block.iter().map(|stmt| self.stmt(stmt)).collect()
    }

    fn stmt(&self, stmt: &Stmt) -> Result<Op, RuntimeError> {
        let range = stmt.range();
        match stmt {
            Stmt::Assign { target, value, .. } => {
                let value = self.expr(value, range)?;
                match target {
                    Target::Local(name) => {
                        let (slot, ty) = self.local(name, range)?;
                        if ty.is_function_block() {
                            return Err(self.error(
                                range,
                                format!("function block '{name}' cannot be assigned"),
                            ));
                        }
                        Ok(Op::AssignLocal { slot, value })
                    }
                    Target::Output(name) => Ok(Op::AssignOutput {
                        key: self.table_key(Namespace::Outputs, name)?,
                        value,
                    }),
                }
            }
            Stmt::If {
                condition,
                then_block,
                else_if,
                else_block,
                ..
            } => {
                let mut branches = Vec::with_capacity(1 + else_if.len());
                branches.push((self.expr(condition, range)?, self.block(then_block)?));
                for (condition, block) in else_if {
                    branches.push((self.expr(condition, range)?, self.block(block)?));
                }
                Ok(Op::If {
                    branches,
                    else_block: self.block(else_block)?,
                })
            }
            Stmt::Case {
                selector,
                branches,
                else_block,
                ..
            } => {
                let branches = branches
                    .iter()
                    .map(|(labels, block)| Ok((labels.clone(), self.block(block)?)))
                    .collect::<Result<Vec<_>, RuntimeError>>()?;
                Ok(Op::Case {
                    selector: self.expr(selector, range)?,
                    branches,
                    else_block: self.block(else_block)?,
                })
            }
            Stmt::Call { instance, args, .. } => {
                let (slot, ty) = self.local(instance, range)?;
                let mut resolved = Vec::with_capacity(args.len());
                for (param, arg) in args {
                    let param = match (ty, param.as_str()) {
                        (TypeName::RTrig | TypeName::FTrig, "CLK") => FbParam::Clk,
                        (TypeName::Ton, "IN") => FbParam::In,
                        (TypeName::Ton, "PT") => FbParam::Pt,
                        (ty, _) if !ty.is_function_block() => {
                            return Err(self.error(
                                range,
                                format!("'{instance}' is not a function block"),
                            ))
                        }
                        (ty, param) => {
                            return Err(self.error(
                                range,
                                format!("{} has no input '{param}'", type_label(ty)),
                            ))
                        }
                    };
                    resolved.push((param, self.expr(arg, range)?));
                }
                if !ty.is_function_block() {
                    return Err(self.error(range, format!("'{instance}' is not a function block")));
                }
                Ok(Op::Call {
                    slot,
                    args: resolved,
                })
            }
        }
    }

    fn expr(&self, expr: &Expr, range: TextRange) -> Result<Operand, RuntimeError> {
        Ok(match expr {
            Expr::Literal(literal) => Operand::Const(ScriptValue::from_literal(*literal)),
            Expr::Now => Operand::Now,
            Expr::Name(name) => {
                let (slot, ty) = self.local(name, range)?;
                if ty.is_function_block() {
                    return Err(self.error(
                        range,
                        format!("function block '{name}' used as a value"),
                    ));
                }
                Operand::Local(slot)
            }
            Expr::Table { scope, name } => {
                let namespace = match scope {
                    Scope::Input => Namespace::Inputs,
                    Scope::Output => Namespace::Outputs,
                };
                Operand::Table(self.table_key(namespace, name)?)
            }
            Expr::Member { instance, field } => {
                let (slot, ty) = self.local(instance, range)?;
                let field = match (ty, field.to_ascii_uppercase().as_str()) {
                    (TypeName::RTrig | TypeName::FTrig | TypeName::Ton, "Q") => FbField::Q,
                    (TypeName::Ton, "ET") => FbField::Et,
                    _ => {
                        return Err(self.error(
                            range,
                            format!("'{instance}' has no output '{field}'"),
                        ))
                    }
                };
                Operand::Member { slot, field }
            }
            Expr::Unary { op, expr } => Operand::Unary {
                op: *op,
                expr: Box::new(self.expr(expr, range)?),
            },
            Expr::Binary { op, left, right } => Operand::Binary {
                op: *op,
                left: Box::new(self.expr(left, range)?),
                right: Box::new(self.expr(right, range)?),
            },
        })
    }

    fn local(&self, name: &str, range: TextRange) -> Result<(usize, TypeName), RuntimeError> {
        self.locals
            .get(&local_key(name))
            .copied()
            .ok_or_else(|| self.error(range, format!("undeclared variable '{name}'")))
    }

    fn table_key(&self, namespace: Namespace, name: &str) -> Result<VarKey, RuntimeError> {
        self.table
            .key(namespace, name)
            .map_err(|_| RuntimeError::UnboundVariable(SmolStr::new(format!("{namespace}.{name}"))))
    }

    fn error(&self, range: TextRange, message: String) -> RuntimeError {
        let (line, column) = line_col(self.source, range.start());
        RuntimeError::ScriptLoad {
            program: SmolStr::new(self.program),
            message: SmolStr::new(format!("{message} at line {line}, column {column}")),
        }
    }
}

fn local_key(name: &str) -> SmolStr {
    SmolStr::new(name.to_ascii_lowercase())
}
