//! The sheet store: cell state keyed by position id, on-demand evaluation
//! with cycle detection, rectangle copy with reference relocation.

use std::cell::RefCell;

use rustc_hash::FxHashMap;

use crate::cell::CellValue;
use crate::cell_pos::CellPos;
use crate::error::{EvalError, ParseError};
use crate::formula::builder::ProgramBuilder;
use crate::formula::parser;
use crate::formula::program::{EvalPath, Program};
use crate::value::Value;

/// A single spreadsheet.
///
/// Values are computed on query, never cached: `get_value` always evaluates
/// against the current cell states.
#[derive(Debug, Clone, Default)]
pub struct Sheet {
    cells: FxHashMap<u64, CellValue>,
    /// Ids of cells on the active evaluation chain; cleared around every
    /// `get_value` so a failed query cannot poison the next one.
    eval_path: RefCell<EvalPath>,
}

impl Sheet {
    pub fn new() -> Sheet {
        Sheet::default()
    }

    /// Number of stored cells, explicit empties included.
    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// Set a cell from raw input. Empty input clears the cell, input
    /// starting with `=` is compiled to a program, anything else is decoded
    /// as a literal. Returns `false` when a formula fails to parse; the
    /// cell is cleared in that case, and nothing else changes.
    pub fn set_cell(&mut self, pos: CellPos, contents: &str) -> bool {
        let value = if contents.starts_with('=') {
            match compile_formula(contents) {
                Ok(program) => CellValue::Program(program),
                Err(reason) => {
                    log::debug!("rejecting formula {contents:?} for {pos}: {reason}");
                    self.cells.insert(pos.id(), CellValue::Empty);
                    return false;
                }
            }
        } else {
            CellValue::decode_literal(contents)
        };
        self.cells.insert(pos.id(), value);
        true
    }

    /// Evaluate a cell. Literals come back as stored; a program is run
    /// against the current sheet state. Every evaluation failure, cycles
    /// included, reports `Empty`.
    pub fn get_value(&self, pos: CellPos) -> Value {
        let mut path = self.eval_path.borrow_mut();
        path.clear();
        let value = match self.cells.get(&pos.id()) {
            Some(CellValue::Number(n)) => Value::Number(*n),
            Some(CellValue::Text(s)) => Value::Text(s.clone()),
            Some(CellValue::Program(program)) => {
                path.insert(pos.id());
                match program.run(self, &mut path) {
                    Ok(value) => value,
                    Err(EvalError::Cycle) => {
                        log::debug!("cyclic dependency while evaluating {pos}");
                        Value::Empty
                    }
                    Err(_) => Value::Empty,
                }
            }
            Some(CellValue::Empty) | None => Value::Empty,
        };
        path.clear();
        value
    }

    /// Copy a `w × h` rectangle from `src` to `dst`. Programs are
    /// deep-copied with the relative components of their references shifted
    /// by `dst − src`; unset sources clear the destination. Reads complete
    /// before the first write, so overlapping rectangles behave as if
    /// copied through a disjoint staging area.
    pub fn copy_rect(&mut self, dst: CellPos, src: CellPos, w: usize, h: usize) {
        let (dc, dr) = dst.offset_from(src);
        let mut staged = Vec::with_capacity(w * h);
        for y in 0..h {
            for x in 0..w {
                let from = src.shift(x as i64, y as i64);
                let to = dst.shift(x as i64, y as i64);
                let value = match self.cells.get(&from.id()) {
                    Some(CellValue::Program(program)) => {
                        CellValue::Program(program.relocated(dc, dr))
                    }
                    Some(other) => other.clone(),
                    None => CellValue::Empty,
                };
                staged.push((to.id(), value));
            }
        }
        for (id, value) in staged {
            self.cells.insert(id, value);
        }
    }

    /// Stored state of a cell, if any.
    pub fn cell(&self, id: u64) -> Option<&CellValue> {
        self.cells.get(&id)
    }

    /// Iterate over stored cells in arbitrary order.
    pub fn entries(&self) -> impl Iterator<Item = (u64, &CellValue)> {
        self.cells.iter().map(|(id, value)| (*id, value))
    }

    /// Insert a cell state directly by id, bypassing parsing. This is the
    /// persistence layer's rebuild path.
    pub fn insert_entry(&mut self, id: u64, value: CellValue) {
        self.cells.insert(id, value);
    }
}

fn compile_formula(contents: &str) -> Result<Program, ParseError> {
    let mut builder = ProgramBuilder::new();
    parser::parse_expression(contents, &mut builder)?;
    Ok(builder.finish()?)
}
