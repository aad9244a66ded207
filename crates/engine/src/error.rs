//! Error types for the engine.

use thiserror::Error;

/// Failure to parse an `A1`-style cell reference.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid cell reference {0:?}")]
pub struct BadReference(pub String);

/// Reasons a formula fails to parse.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ParseError {
    #[error("formula must start with '='")]
    MissingEquals,
    #[error("empty formula")]
    EmptyFormula,
    #[error("unterminated string literal")]
    UnterminatedString,
    #[error("malformed number {0:?}")]
    BadNumber(String),
    #[error(transparent)]
    BadReference(#[from] BadReference),
    #[error("unexpected character {0:?}")]
    UnexpectedChar(char),
    #[error("unexpected end of formula")]
    UnexpectedEnd,
    #[error("unexpected token: {0}")]
    UnexpectedToken(String),
    #[error("trailing input after expression")]
    TrailingInput,
}

/// Reasons expression evaluation fails.
///
/// Every variant collapses to an empty value at the cell boundary; callers
/// of `Sheet::get_value` only ever observe `Value::Empty`.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EvalError {
    #[error("reference to an empty cell")]
    EmptyRef,
    #[error("cyclic dependency detected")]
    Cycle,
    #[error("operand type mismatch")]
    TypeMismatch,
    #[error("division by zero")]
    DivByZero,
    #[error("wrong argument count for {0}")]
    ArityMismatch(String),
    #[error("unknown function {0:?}")]
    UnknownFunction(String),
    #[error("malformed range {0:?}")]
    BadRange(String),
    #[error("no numeric values in range")]
    EmptyRange,
    #[error("expression did not reduce to a single value")]
    StackImbalance,
}
