//! Range functions: `sum`, `count`, `min`, `max`, `countval` and `if`.
//!
//! Dispatch happens at evaluation time on the stored function name, so
//! persisted programs round-trip even when the name is unknown; the error
//! only surfaces when such a cell is queried.

use crate::cell::CellValue;
use crate::cell_pos::CellPos;
use crate::error::EvalError;
use crate::sheet::Sheet;
use crate::value::Value;

use super::program::EvalPath;

/// Pop `argc` operands, dispatch on `name`, push the one result.
pub(crate) fn call(
    name: &str,
    argc: usize,
    stack: &mut Vec<Value>,
    sheet: &Sheet,
    path: &mut EvalPath,
) -> Result<(), EvalError> {
    if stack.len() < argc {
        return Err(EvalError::StackImbalance);
    }
    // split_off keeps stack order, which is parse order for arguments.
    let args = stack.split_off(stack.len() - argc);

    let value = match name {
        "sum" | "count" | "min" | "max" => {
            let [range]: [Value; 1] = take_args(args, name)?;
            let (start, end) = range_bounds(&range)?;
            match name {
                "sum" => sum(sheet, start, end, path)?,
                "count" => count(sheet, start, end, path),
                "min" => extremum(sheet, start, end, path, true)?,
                _ => extremum(sheet, start, end, path, false)?,
            }
        }
        "countval" => {
            let [needle, range]: [Value; 2] = take_args(args, name)?;
            let (start, end) = range_bounds(&range)?;
            countval(&needle, sheet, start, end, path)
        }
        "if" => {
            let [cond, then, otherwise]: [Value; 3] = take_args(args, name)?;
            let Value::Number(cond) = cond else {
                return Err(EvalError::TypeMismatch);
            };
            // Both branches were already evaluated; this only selects.
            if cond != 0.0 {
                then
            } else {
                otherwise
            }
        }
        _ => return Err(EvalError::UnknownFunction(name.to_string())),
    };

    stack.push(value);
    Ok(())
}

fn take_args<const N: usize>(args: Vec<Value>, name: &str) -> Result<[Value; N], EvalError> {
    <[Value; N]>::try_from(args).map_err(|_| EvalError::ArityMismatch(name.to_string()))
}

/// The range argument arrives as the literal text a `Range` node pushed.
fn range_bounds(arg: &Value) -> Result<(CellPos, CellPos), EvalError> {
    let Value::Text(text) = arg else {
        return Err(EvalError::TypeMismatch);
    };
    parse_range(text)
}

/// Split `A1:B2` at the colon, strip `$`, parse both endpoints.
fn parse_range(text: &str) -> Result<(CellPos, CellPos), EvalError> {
    let bad = || EvalError::BadRange(text.to_string());
    let (start, end) = text.split_once(':').ok_or_else(bad)?;
    let start = CellPos::parse(&start.replace('$', "")).map_err(|_| bad())?;
    let end = CellPos::parse(&end.replace('$', "")).map_err(|_| bad())?;
    Ok((start, end))
}

/// Rectangle walk in row-major order, endpoints taken verbatim.
fn cells_in(start: CellPos, end: CellPos) -> impl Iterator<Item = CellPos> {
    (start.row..=end.row)
        .flat_map(move |row| (start.col..=end.col).map(move |col| CellPos::new(col, row)))
}

/// Value a range function sees for one cell: literals directly, programs
/// run on the spot (guarded against re-entering a cell already on the
/// path), anything unresolvable as `Empty`.
fn resolve(sheet: &Sheet, pos: CellPos, path: &mut EvalPath) -> Value {
    match sheet.cell(pos.id()) {
        Some(CellValue::Number(n)) => Value::Number(*n),
        Some(CellValue::Text(s)) => Value::Text(s.clone()),
        Some(CellValue::Program(program)) => {
            let id = pos.id();
            if !path.insert(id) {
                return Value::Empty;
            }
            let value = program.run(sheet, path).unwrap_or(Value::Empty);
            path.remove(&id);
            value
        }
        Some(CellValue::Empty) | None => Value::Empty,
    }
}

fn sum(
    sheet: &Sheet,
    start: CellPos,
    end: CellPos,
    path: &mut EvalPath,
) -> Result<Value, EvalError> {
    let mut total = 0.0;
    let mut any = false;
    for pos in cells_in(start, end) {
        if let Value::Number(n) = resolve(sheet, pos, path) {
            total += n;
            any = true;
        }
    }
    if any {
        Ok(Value::Number(total))
    } else {
        Err(EvalError::EmptyRange)
    }
}

fn count(sheet: &Sheet, start: CellPos, end: CellPos, path: &mut EvalPath) -> Value {
    let mut n = 0u64;
    for pos in cells_in(start, end) {
        if !resolve(sheet, pos, path).is_empty() {
            n += 1;
        }
    }
    Value::Number(n as f64)
}

fn extremum(
    sheet: &Sheet,
    start: CellPos,
    end: CellPos,
    path: &mut EvalPath,
    pick_min: bool,
) -> Result<Value, EvalError> {
    let mut best: Option<f64> = None;
    for pos in cells_in(start, end) {
        if let Value::Number(n) = resolve(sheet, pos, path) {
            best = Some(match best {
                None => n,
                Some(b) => {
                    if (pick_min && n < b) || (!pick_min && n > b) {
                        n
                    } else {
                        b
                    }
                }
            });
        }
    }
    best.map(Value::Number).ok_or(EvalError::EmptyRange)
}

/// Strict-equality count: number against number, text against text; mixed
/// types and empties never match.
fn countval(
    needle: &Value,
    sheet: &Sheet,
    start: CellPos,
    end: CellPos,
    path: &mut EvalPath,
) -> Value {
    let mut n = 0u64;
    for pos in cells_in(start, end) {
        let matched = match (needle, &resolve(sheet, pos, path)) {
            (Value::Number(a), Value::Number(b)) => a == b,
            (Value::Text(a), Value::Text(b)) => a == b,
            _ => false,
        };
        if matched {
            n += 1;
        }
    }
    Value::Number(n as f64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sheet::Sheet;

    fn sheet_with(cells: &[(&str, &str)]) -> Sheet {
        let mut sheet = Sheet::new();
        for (pos, contents) in cells {
            assert!(sheet.set_cell(CellPos::parse(pos).unwrap(), contents));
        }
        sheet
    }

    fn apply(sheet: &Sheet, name: &str, args: Vec<Value>) -> Result<Value, EvalError> {
        let mut stack = args;
        let argc = stack.len();
        let mut path = EvalPath::default();
        call(name, argc, &mut stack, sheet, &mut path)?;
        Ok(stack.pop().unwrap_or(Value::Empty))
    }

    fn range(text: &str) -> Value {
        Value::Text(text.to_string())
    }

    #[test]
    fn test_sum_over_literals_and_programs() {
        let sheet = sheet_with(&[("A1", "10"), ("A2", "=A1*2"), ("A3", "text"), ("B1", "5")]);
        assert_eq!(
            apply(&sheet, "sum", vec![range("A1:B3")]),
            Ok(Value::Number(35.0))
        );
    }

    #[test]
    fn test_sum_with_no_numeric_values_fails() {
        let sheet = sheet_with(&[("A1", "text")]);
        assert_eq!(
            apply(&sheet, "sum", vec![range("A1:B2")]),
            Err(EvalError::EmptyRange)
        );
    }

    #[test]
    fn test_sum_requires_range_text() {
        let sheet = Sheet::new();
        assert_eq!(
            apply(&sheet, "sum", vec![Value::Number(1.0)]),
            Err(EvalError::TypeMismatch)
        );
    }

    #[test]
    fn test_sum_arity() {
        let sheet = Sheet::new();
        assert_eq!(
            apply(&sheet, "sum", vec![range("A1:B2"), Value::Number(1.0)]),
            Err(EvalError::ArityMismatch("sum".to_string()))
        );
    }

    #[test]
    fn test_count_skips_empty_and_failed() {
        let sheet = sheet_with(&[
            ("A1", "10"),
            ("A2", "text"),
            ("A3", ""),
            ("A4", "=B9"),
            ("A5", "=A1+1"),
        ]);
        // A3 is stored empty, A4 fails (reference to an empty cell); both
        // are not counted.
        assert_eq!(
            apply(&sheet, "count", vec![range("A1:A6")]),
            Ok(Value::Number(3.0))
        );
    }

    #[test]
    fn test_min_max() {
        let sheet = sheet_with(&[("A1", "4"), ("A2", "-2"), ("A3", "=A1*10"), ("A4", "x")]);
        assert_eq!(
            apply(&sheet, "min", vec![range("A1:A4")]),
            Ok(Value::Number(-2.0))
        );
        assert_eq!(
            apply(&sheet, "max", vec![range("A1:A4")]),
            Ok(Value::Number(40.0))
        );
    }

    #[test]
    fn test_min_over_empty_range_fails() {
        let sheet = Sheet::new();
        assert_eq!(
            apply(&sheet, "min", vec![range("A1:C3")]),
            Err(EvalError::EmptyRange)
        );
    }

    #[test]
    fn test_countval_matches_strictly() {
        let sheet = sheet_with(&[("A1", "10"), ("A2", "10"), ("B1", "=5+5"), ("B2", "ten")]);
        assert_eq!(
            apply(
                &sheet,
                "countval",
                vec![Value::Number(10.0), range("A1:B2")]
            ),
            Ok(Value::Number(3.0))
        );
        assert_eq!(
            apply(
                &sheet,
                "countval",
                vec![Value::Text("ten".into()), range("A1:B2")]
            ),
            Ok(Value::Number(1.0))
        );
        // Mismatched types never match.
        assert_eq!(
            apply(
                &sheet,
                "countval",
                vec![Value::Text("10".into()), range("A1:B2")]
            ),
            Ok(Value::Number(0.0))
        );
    }

    #[test]
    fn test_if_selects_without_reevaluating() {
        let sheet = Sheet::new();
        assert_eq!(
            apply(
                &sheet,
                "if",
                vec![Value::Number(2.0), Value::Number(1.0), Value::Number(0.0)]
            ),
            Ok(Value::Number(1.0))
        );
        assert_eq!(
            apply(
                &sheet,
                "if",
                vec![Value::Number(0.0), Value::Number(1.0), Value::Text("no".into())]
            ),
            Ok(Value::Text("no".into()))
        );
    }

    #[test]
    fn test_if_condition_must_be_numeric() {
        let sheet = Sheet::new();
        assert_eq!(
            apply(
                &sheet,
                "if",
                vec![Value::Text("1".into()), Value::Number(1.0), Value::Number(0.0)]
            ),
            Err(EvalError::TypeMismatch)
        );
    }

    #[test]
    fn test_unknown_function() {
        let sheet = Sheet::new();
        assert_eq!(
            apply(&sheet, "median", vec![range("A1:A2")]),
            Err(EvalError::UnknownFunction("median".to_string()))
        );
    }

    #[test]
    fn test_malformed_range() {
        let sheet = Sheet::new();
        assert_eq!(
            apply(&sheet, "sum", vec![range("A1")]),
            Err(EvalError::BadRange("A1".to_string()))
        );
        assert_eq!(
            apply(&sheet, "sum", vec![range("A1:xyz")]),
            Err(EvalError::BadRange("A1:xyz".to_string()))
        );
    }

    #[test]
    fn test_dollars_in_range_are_stripped() {
        let sheet = sheet_with(&[("B3", "1"), ("B4", "11")]);
        assert_eq!(
            apply(&sheet, "sum", vec![range("$B$3:$B$4")]),
            Ok(Value::Number(12.0))
        );
    }

    #[test]
    fn test_inverted_range_iterates_nothing() {
        let sheet = sheet_with(&[("A1", "1")]);
        assert_eq!(
            apply(&sheet, "count", vec![range("B2:A1")]),
            Ok(Value::Number(0.0))
        );
    }
}
