//! Builder interface between the formula parser and the expression model.
//!
//! The parser never constructs nodes itself: it announces what it saw, in
//! postfix order, to an [`ExprBuilder`]. [`ProgramBuilder`] is the engine's
//! sink, turning the event stream into a [`Program`].

use crate::error::BadReference;

use super::node::{BinOp, CellRef, Node, UnOp};
use super::program::Program;

/// Event sink a formula parser drives while reading an expression.
/// Each event appends one node to the program under construction.
pub trait ExprBuilder {
    fn op_add(&mut self);
    fn op_sub(&mut self);
    fn op_mul(&mut self);
    fn op_div(&mut self);
    fn op_pow(&mut self);
    fn op_neg(&mut self);
    fn op_eq(&mut self);
    fn op_ne(&mut self);
    fn op_lt(&mut self);
    fn op_le(&mut self);
    fn op_gt(&mut self);
    fn op_ge(&mut self);
    fn val_number(&mut self, value: f64);
    fn val_string(&mut self, value: String);
    fn val_reference(&mut self, text: &str);
    fn val_range(&mut self, text: &str);
    fn func_call(&mut self, name: &str, argc: usize);
}

/// Collects builder events into a [`Program`].
///
/// A malformed reference poisons the builder; the error surfaces from
/// [`finish`](ProgramBuilder::finish), and later events are still accepted
/// so the parser does not need a bail-out path.
#[derive(Debug, Default)]
pub struct ProgramBuilder {
    nodes: Vec<Node>,
    error: Option<BadReference>,
}

impl ProgramBuilder {
    pub fn new() -> ProgramBuilder {
        ProgramBuilder::default()
    }

    pub fn finish(self) -> Result<Program, BadReference> {
        match self.error {
            Some(err) => Err(err),
            None => Ok(Program::from_nodes(self.nodes)),
        }
    }

    fn binary(&mut self, op: BinOp) {
        self.nodes.push(Node::Binary(op));
    }
}

impl ExprBuilder for ProgramBuilder {
    fn op_add(&mut self) {
        self.binary(BinOp::Add);
    }

    fn op_sub(&mut self) {
        self.binary(BinOp::Sub);
    }

    fn op_mul(&mut self) {
        self.binary(BinOp::Mul);
    }

    fn op_div(&mut self) {
        self.binary(BinOp::Div);
    }

    fn op_pow(&mut self) {
        self.binary(BinOp::Pow);
    }

    fn op_neg(&mut self) {
        self.nodes.push(Node::Unary(UnOp::Neg));
    }

    fn op_eq(&mut self) {
        self.binary(BinOp::Eq);
    }

    fn op_ne(&mut self) {
        self.binary(BinOp::Ne);
    }

    fn op_lt(&mut self) {
        self.binary(BinOp::Lt);
    }

    fn op_le(&mut self) {
        self.binary(BinOp::Le);
    }

    fn op_gt(&mut self) {
        self.binary(BinOp::Gt);
    }

    fn op_ge(&mut self) {
        self.binary(BinOp::Ge);
    }

    fn val_number(&mut self, value: f64) {
        self.nodes.push(Node::Number(value));
    }

    fn val_string(&mut self, value: String) {
        self.nodes.push(Node::Text(value));
    }

    fn val_reference(&mut self, text: &str) {
        match CellRef::parse(text) {
            Ok(cell_ref) => self.nodes.push(Node::Ref(cell_ref)),
            Err(err) => {
                if self.error.is_none() {
                    self.error = Some(err);
                }
            }
        }
    }

    fn val_range(&mut self, text: &str) {
        self.nodes.push(Node::Range(text.to_string()));
    }

    fn func_call(&mut self, name: &str, argc: usize) {
        self.nodes.push(Node::Call {
            name: name.to_string(),
            argc,
        });
    }
}
