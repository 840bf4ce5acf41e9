//! Formula errors

use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq)]
pub enum FormulaError {
    #[error("unexpected character '{ch}' at position {pos}")]
    UnexpectedChar { ch: char, pos: usize },
    #[error("malformed number at position {pos}")]
    BadNumber { pos: usize },
    #[error("unexpected token '{0}'")]
    UnexpectedToken(String),
    #[error("unexpected end of formula")]
    UnexpectedEnd,
    #[error("division by zero")]
    DivisionByZero,
    #[error("modulo by zero")]
    ModuloByZero,
    #[error("square root of negative value")]
    SqrtOfNegative,
    #[error("logarithm of non-positive value")]
    LogNonPositive,
    #[error("unknown variable '{0}'")]
    UnknownVariable(String),
    #[error("unknown function '{0}'")]
    UnknownFunction(String),
    #[error("{name} expects {expected} argument(s), got {got}")]
    BadArity { name: String, expected: usize, got: usize },
}
