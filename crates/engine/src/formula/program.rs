use std::rc::Rc;

use rustc_hash::FxHashSet;

use crate::error::EvalError;
use crate::sheet::Sheet;
use crate::value::Value;

use super::node::Node;

/// Ids of the cells currently being evaluated, for cycle detection.
/// Owned by the sheet and threaded through every evaluation call.
pub(crate) type EvalPath = FxHashSet<u64>;

/// A compiled formula: expression nodes in postfix order.
///
/// Nodes are held behind `Rc` so a rectangle copy can share every immutable
/// node with the source program and clone only the `Ref` nodes it rewrites.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Program {
    nodes: Vec<Rc<Node>>,
}

impl Program {
    pub fn from_nodes(nodes: Vec<Node>) -> Program {
        Program {
            nodes: nodes.into_iter().map(Rc::new).collect(),
        }
    }

    /// Nodes in program order.
    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.iter().map(|node| node.as_ref())
    }

    /// Run the program against a fresh value stack. Exactly one value must
    /// remain at the end; the first node failure aborts the run.
    pub(crate) fn run(&self, sheet: &Sheet, path: &mut EvalPath) -> Result<Value, EvalError> {
        let mut stack = Vec::new();
        for node in &self.nodes {
            node.evaluate(&mut stack, sheet, path)?;
        }
        match (stack.pop(), stack.is_empty()) {
            (Some(value), true) => Ok(value),
            _ => Err(EvalError::StackImbalance),
        }
    }

    /// Deep copy for a rectangle move: `Ref` nodes are cloned and shifted
    /// by `(dc, dr)`, every other kind is shared with the source.
    pub(crate) fn relocated(&self, dc: i64, dr: i64) -> Program {
        let nodes = self
            .nodes
            .iter()
            .map(|node| match node.as_ref() {
                Node::Ref(cell_ref) => {
                    let mut moved = *cell_ref;
                    moved.relocate(dc, dr);
                    Rc::new(Node::Ref(moved))
                }
                _ => Rc::clone(node),
            })
            .collect();
        Program { nodes }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::formula::node::{BinOp, CellRef};

    fn run(program: &Program) -> Result<Value, EvalError> {
        let sheet = Sheet::new();
        let mut path = EvalPath::default();
        program.run(&sheet, &mut path)
    }

    #[test]
    fn test_run_simple_postfix() {
        // 2 3 + -> 5
        let program = Program::from_nodes(vec![
            Node::Number(2.0),
            Node::Number(3.0),
            Node::Binary(BinOp::Add),
        ]);
        assert_eq!(run(&program), Ok(Value::Number(5.0)));
    }

    #[test]
    fn test_run_rejects_leftover_values() {
        let program = Program::from_nodes(vec![Node::Number(1.0), Node::Number(2.0)]);
        assert_eq!(run(&program), Err(EvalError::StackImbalance));
    }

    #[test]
    fn test_run_rejects_empty_program() {
        assert_eq!(run(&Program::default()), Err(EvalError::StackImbalance));
    }

    #[test]
    fn test_run_rejects_missing_operands() {
        let program = Program::from_nodes(vec![Node::Number(1.0), Node::Binary(BinOp::Add)]);
        assert_eq!(run(&program), Err(EvalError::StackImbalance));
    }

    #[test]
    fn test_relocated_shares_immutable_nodes() {
        let program = Program::from_nodes(vec![
            Node::Ref(CellRef::parse("A1").unwrap()),
            Node::Number(5.0),
            Node::Binary(BinOp::Add),
        ]);
        let moved = program.relocated(1, 2);

        // The constant and the operator are the same allocation; the
        // reference is a fresh, shifted node.
        assert!(!Rc::ptr_eq(&program.nodes[0], &moved.nodes[0]));
        assert!(Rc::ptr_eq(&program.nodes[1], &moved.nodes[1]));
        assert!(Rc::ptr_eq(&program.nodes[2], &moved.nodes[2]));
        assert_eq!(*moved.nodes[0], Node::Ref(CellRef::parse("B3").unwrap()));
        // The source program is untouched.
        assert_eq!(*program.nodes[0], Node::Ref(CellRef::parse("A1").unwrap()));
    }
}
