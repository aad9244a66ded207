//! Expression nodes: the closed set of element kinds a postfix program is
//! built from. Each node knows how to evaluate itself against a value stack
//! and how to serialise itself for the native file format.

use std::fmt;

use crate::cell_pos::{self, col_to_letters, CellPos};
use crate::cell::CellValue;
use crate::error::{BadReference, EvalError};
use crate::sheet::Sheet;
use crate::value::Value;

use super::functions;
use super::program::EvalPath;

/// Binary operators, in the surface syntax of formulas.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Pow,
    Lt,
    Le,
    Gt,
    Ge,
    Eq,
    Ne,
}

impl BinOp {
    pub fn symbol(self) -> &'static str {
        match self {
            BinOp::Add => "+",
            BinOp::Sub => "-",
            BinOp::Mul => "*",
            BinOp::Div => "/",
            BinOp::Pow => "^",
            BinOp::Lt => "<",
            BinOp::Le => "<=",
            BinOp::Gt => ">",
            BinOp::Ge => ">=",
            BinOp::Eq => "=",
            BinOp::Ne => "<>",
        }
    }

    pub fn from_symbol(symbol: &str) -> Option<BinOp> {
        Some(match symbol {
            "+" => BinOp::Add,
            "-" => BinOp::Sub,
            "*" => BinOp::Mul,
            "/" => BinOp::Div,
            "^" => BinOp::Pow,
            "<" => BinOp::Lt,
            "<=" => BinOp::Le,
            ">" => BinOp::Gt,
            ">=" => BinOp::Ge,
            "=" => BinOp::Eq,
            "<>" => BinOp::Ne,
            _ => return None,
        })
    }
}

/// Unary operators. Negation is the only one the surface syntax has.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UnOp {
    Neg,
}

impl UnOp {
    pub fn symbol(self) -> &'static str {
        match self {
            UnOp::Neg => "-",
        }
    }

    pub fn from_symbol(symbol: &str) -> Option<UnOp> {
        match symbol {
            "-" => Some(UnOp::Neg),
            _ => None,
        }
    }
}

/// A formula-level cell reference: a position plus per-axis absolute flags.
///
/// The only mutable node state in the whole model, and only through
/// [`relocate`](CellRef::relocate), which the copy engine calls on a fresh
/// clone, never on a node shared with a stored program.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CellRef {
    pub col: u32,
    pub row: u64,
    pub col_abs: bool,
    pub row_abs: bool,
}

impl CellRef {
    pub fn parse(text: &str) -> Result<CellRef, BadReference> {
        let parsed = cell_pos::parse_ref(text)?;
        Ok(CellRef {
            col: parsed.pos.col,
            row: parsed.pos.row,
            col_abs: parsed.col_abs,
            row_abs: parsed.row_abs,
        })
    }

    pub fn pos(&self) -> CellPos {
        CellPos::new(self.col, self.row)
    }

    /// Shift the relative components by a copy offset; absolute components
    /// stay pinned.
    pub fn relocate(&mut self, dc: i64, dr: i64) {
        if !self.col_abs {
            self.col = (self.col as i64 + dc) as u32;
        }
        if !self.row_abs {
            self.row = (self.row as i64 + dr) as u64;
        }
    }
}

impl fmt::Display for CellRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}{}{}{}",
            if self.col_abs { "$" } else { "" },
            col_to_letters(self.col),
            if self.row_abs { "$" } else { "" },
            self.row
        )
    }
}

/// One element of a postfix expression program.
#[derive(Clone, Debug, PartialEq)]
pub enum Node {
    Number(f64),
    Text(String),
    Ref(CellRef),
    /// Raw `A1:B2` text; parsed when a function consumes it.
    Range(String),
    Unary(UnOp),
    Binary(BinOp),
    Call { name: String, argc: usize },
}

impl Node {
    /// Execute this node against the value stack.
    pub(crate) fn evaluate(
        &self,
        stack: &mut Vec<Value>,
        sheet: &Sheet,
        path: &mut EvalPath,
    ) -> Result<(), EvalError> {
        match self {
            Node::Number(n) => stack.push(Value::Number(*n)),
            Node::Text(s) => stack.push(Value::Text(s.clone())),
            Node::Range(r) => stack.push(Value::Text(r.clone())),
            Node::Ref(cell_ref) => {
                let value = deref(cell_ref, sheet, path)?;
                stack.push(value);
            }
            Node::Unary(op) => {
                let value = stack.pop().ok_or(EvalError::StackImbalance)?;
                let Value::Number(n) = value else {
                    return Err(EvalError::TypeMismatch);
                };
                match op {
                    UnOp::Neg => stack.push(Value::Number(-n)),
                }
            }
            Node::Binary(op) => {
                let right = stack.pop().ok_or(EvalError::StackImbalance)?;
                let left = stack.pop().ok_or(EvalError::StackImbalance)?;
                stack.push(apply_binary(*op, left, right)?);
            }
            Node::Call { name, argc } => functions::call(name, *argc, stack, sheet, path)?,
        }
        Ok(())
    }
}

/// Resolve a reference to a value. Literals are read straight off the
/// sheet; a program target is run with the reference's id on the path, and
/// a failing nested program resolves to `Empty`. The failure is absorbed
/// here, not propagated; downstream operators then reject the empty
/// operand on their own terms.
fn deref(cell_ref: &CellRef, sheet: &Sheet, path: &mut EvalPath) -> Result<Value, EvalError> {
    let id = cell_ref.pos().id();
    match sheet.cell(id) {
        None | Some(CellValue::Empty) => Err(EvalError::EmptyRef),
        Some(CellValue::Number(n)) => Ok(Value::Number(*n)),
        Some(CellValue::Text(s)) => Ok(Value::Text(s.clone())),
        Some(CellValue::Program(program)) => {
            if !path.insert(id) {
                return Err(EvalError::Cycle);
            }
            let value = program.run(sheet, path).unwrap_or(Value::Empty);
            path.remove(&id);
            Ok(value)
        }
    }
}

fn apply_binary(op: BinOp, left: Value, right: Value) -> Result<Value, EvalError> {
    match op {
        BinOp::Add => match (left, right) {
            (Value::Number(a), Value::Number(b)) => Ok(Value::Number(a + b)),
            (Value::Empty, _) | (_, Value::Empty) => Err(EvalError::TypeMismatch),
            (l, r) => Ok(Value::Text(format!("{}{}", concat_text(l), concat_text(r)))),
        },
        BinOp::Sub | BinOp::Mul | BinOp::Div | BinOp::Pow => {
            let (Value::Number(a), Value::Number(b)) = (left, right) else {
                return Err(EvalError::TypeMismatch);
            };
            let n = match op {
                BinOp::Sub => a - b,
                BinOp::Mul => a * b,
                BinOp::Pow => a.powf(b),
                BinOp::Div => {
                    if b == 0.0 {
                        return Err(EvalError::DivByZero);
                    }
                    a / b
                }
                _ => unreachable!(),
            };
            Ok(Value::Number(n))
        }
        BinOp::Lt | BinOp::Le | BinOp::Gt | BinOp::Ge | BinOp::Eq | BinOp::Ne => {
            // Comparisons are strict; the tolerant matching in the test
            // suite is a test concern only.
            let holds = match (&left, &right) {
                (Value::Number(a), Value::Number(b)) => match op {
                    BinOp::Lt => a < b,
                    BinOp::Le => a <= b,
                    BinOp::Gt => a > b,
                    BinOp::Ge => a >= b,
                    BinOp::Eq => a == b,
                    BinOp::Ne => a != b,
                    _ => unreachable!(),
                },
                (Value::Text(a), Value::Text(b)) => match op {
                    BinOp::Lt => a < b,
                    BinOp::Le => a <= b,
                    BinOp::Gt => a > b,
                    BinOp::Ge => a >= b,
                    BinOp::Eq => a == b,
                    BinOp::Ne => a != b,
                    _ => unreachable!(),
                },
                _ => return Err(EvalError::TypeMismatch),
            };
            Ok(Value::Number(if holds { 1.0 } else { 0.0 }))
        }
    }
}

fn concat_text(value: Value) -> String {
    match value {
        Value::Number(n) => n.to_string(),
        Value::Text(s) => s,
        Value::Empty => String::new(),
    }
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Node::Number(n) => write!(f, "Constant {}", n),
            Node::Text(s) => write!(f, "String {}", quoted(s)),
            Node::Ref(cell_ref) => write!(f, "Reference {}", cell_ref),
            Node::Range(range) => write!(f, "Range {}", range),
            Node::Unary(op) => write!(f, "UnaryOperation {}", op.symbol()),
            Node::Binary(op) => write!(f, "BinaryOperation {}", op.symbol()),
            Node::Call { name, argc } => write!(f, "Function {} {}", name, argc),
        }
    }
}

/// Quote a string for the save format: wrapped in `"`, inner quotes doubled.
pub fn quoted(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + 2);
    out.push('"');
    for ch in text.chars() {
        if ch == '"' {
            out.push('"');
        }
        out.push(ch);
    }
    out.push('"');
    out
}
