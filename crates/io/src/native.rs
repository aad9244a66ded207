//! Native sheet format: a line-oriented text dump guarded by a checksum.
//!
//! ```text
//! CHECKSUM 1954
//! 4294967297, 10
//! 4294967298, "note"
//! 8589934593, [Reference A1, Constant 5, BinaryOperation +]
//! 12884901889, undefined
//! ```
//!
//! The header carries the wrapping-u64 sum of every byte that follows it,
//! newlines included. A cell line is the position id, `", "`, then one of:
//! `undefined`, a decimal number, a `"`-quoted string (inner quotes
//! doubled), or a bracketed node list in program order. `load` recomputes
//! the checksum before reparsing anything and rejects the stream on any
//! disagreement.

use std::fs::File;
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::Path;

use thiserror::Error;

use gridcore_engine::cell::CellValue;
use gridcore_engine::formula::node::{quoted, BinOp, CellRef, Node, UnOp};
use gridcore_engine::formula::program::Program;
use gridcore_engine::sheet::Sheet;

#[derive(Debug, Error)]
pub enum SaveError {
    #[error("write failed: {0}")]
    Io(#[from] io::Error),
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("read failed: {0}")]
    Io(#[from] io::Error),
    #[error("missing or malformed CHECKSUM header")]
    BadHeader,
    #[error("checksum mismatch: declared {declared}, computed {computed}")]
    ChecksumMismatch { declared: u64, computed: u64 },
    #[error("malformed cell on line {line}")]
    BadCell { line: usize },
}

/// Write a sheet to a byte sink. Cells are emitted sorted by id, so equal
/// sheets produce identical bytes.
pub fn save<W: Write>(sheet: &Sheet, mut out: W) -> Result<(), SaveError> {
    let mut entries: Vec<_> = sheet.entries().collect();
    entries.sort_by_key(|(id, _)| *id);

    let mut data = String::new();
    for (id, value) in entries {
        data.push_str(&id.to_string());
        data.push_str(", ");
        data.push_str(&format_cell(value));
        data.push('\n');
    }

    write!(out, "CHECKSUM {}\n{}", checksum(&data), data)?;
    out.flush()?;
    Ok(())
}

/// Read a sheet back from a byte source, verifying the checksum first.
pub fn load<R: Read>(mut input: R) -> Result<Sheet, LoadError> {
    let mut text = String::new();
    input.read_to_string(&mut text)?;

    let (header, data) = text.split_once('\n').ok_or(LoadError::BadHeader)?;
    let declared = header
        .strip_prefix("CHECKSUM ")
        .and_then(|n| n.trim().parse::<u64>().ok())
        .ok_or(LoadError::BadHeader)?;
    let computed = checksum(data);
    if declared != computed {
        log::warn!("sheet checksum mismatch: declared {declared}, computed {computed}");
        return Err(LoadError::ChecksumMismatch { declared, computed });
    }

    let mut sheet = Sheet::new();
    for (index, line) in data.lines().enumerate() {
        // Line numbers are 1-based and count the header.
        let bad = || LoadError::BadCell { line: index + 2 };
        let (id, cell) = line.split_once(", ").ok_or_else(bad)?;
        let id: u64 = id.parse().map_err(|_| bad())?;
        let value = parse_cell(cell).ok_or_else(bad)?;
        sheet.insert_entry(id, value);
    }
    Ok(sheet)
}

pub fn save_file(sheet: &Sheet, path: &Path) -> Result<(), SaveError> {
    let file = File::create(path)?;
    save(sheet, BufWriter::new(file))
}

pub fn load_file(path: &Path) -> Result<Sheet, LoadError> {
    let file = File::open(path)?;
    load(BufReader::new(file))
}

/// Wrapping sum of the data region's bytes.
fn checksum(data: &str) -> u64 {
    data.bytes().fold(0u64, |acc, b| acc.wrapping_add(b as u64))
}

fn format_cell(value: &CellValue) -> String {
    match value {
        CellValue::Empty => "undefined".to_string(),
        CellValue::Number(n) => n.to_string(),
        CellValue::Text(s) => quoted(s),
        CellValue::Program(program) => {
            let nodes: Vec<String> = program.nodes().map(|node| node.to_string()).collect();
            format!("[{}]", nodes.join(", "))
        }
    }
}

fn parse_cell(text: &str) -> Option<CellValue> {
    if text == "undefined" {
        return Some(CellValue::Empty);
    }
    if text.starts_with('"') {
        return unquote(text).map(CellValue::Text);
    }
    if let Some(body) = text.strip_prefix('[') {
        let body = body.strip_suffix(']')?;
        let mut nodes = Vec::new();
        for item in split_items(body) {
            nodes.push(parse_node(item)?);
        }
        return Some(CellValue::Program(Program::from_nodes(nodes)));
    }
    text.parse::<f64>().ok().map(CellValue::Number)
}

fn parse_node(text: &str) -> Option<Node> {
    let (kind, rest) = text.split_once(' ')?;
    match kind {
        "Constant" => rest.parse::<f64>().ok().map(Node::Number),
        "Reference" => CellRef::parse(rest).ok().map(Node::Ref),
        // Kept raw; range validity is an evaluation-time concern.
        "Range" => rest.contains(':').then(|| Node::Range(rest.to_string())),
        "UnaryOperation" => UnOp::from_symbol(rest).map(Node::Unary),
        "BinaryOperation" => BinOp::from_symbol(rest).map(Node::Binary),
        "String" => unquote(rest).map(Node::Text),
        "Function" => {
            let (name, argc) = rest.rsplit_once(' ')?;
            let argc = argc.parse::<usize>().ok()?;
            if name.is_empty() {
                return None;
            }
            Some(Node::Call {
                name: name.to_string(),
                argc,
            })
        }
        _ => None,
    }
}

/// Decode a quoted string: `"` delimits, a doubled `""` is a literal quote,
/// and the closing quote must end the text.
fn unquote(text: &str) -> Option<String> {
    let body = text.strip_prefix('"')?;
    let mut out = String::with_capacity(body.len());
    let mut chars = body.chars();
    loop {
        match chars.next()? {
            '"' => match chars.next() {
                Some('"') => out.push('"'),
                None => return Some(out),
                Some(_) => return None,
            },
            ch => out.push(ch),
        }
    }
}

/// Split a program body at `, ` boundaries, ignoring commas inside quoted
/// strings (doubled quotes re-enter the quoted state immediately, so they
/// keep the tracking honest).
fn split_items(body: &str) -> Vec<&str> {
    let mut items = Vec::new();
    let mut start = 0;
    let mut in_quotes = false;
    for (i, b) in body.bytes().enumerate() {
        match b {
            b'"' => in_quotes = !in_quotes,
            b',' if !in_quotes => {
                items.push(body[start..i].trim());
                start = i + 1;
            }
            _ => {}
        }
    }
    if !body.is_empty() {
        items.push(body[start..].trim());
    }
    items
}
