//! Evaluation context
//!
//! The engine resolves variables and non-builtin functions through a
//! `FormulaContext`. The strategy runtime supplies one backed by live
//! market state; tests use `MapContext`.

use crate::error::FormulaError;
use std::collections::HashMap;

/// A resolved function argument.
#[derive(Debug, Clone, PartialEq)]
pub enum ArgValue {
    Number(f64),
    Symbol(String),
}

impl ArgValue {
    pub fn as_number(&self) -> Option<f64> {
        match self {
            ArgValue::Number(n) => Some(*n),
            ArgValue::Symbol(_) => None,
        }
    }

    pub fn as_symbol(&self) -> Option<&str> {
        match self {
            ArgValue::Symbol(s) => Some(s),
            ArgValue::Number(_) => None,
        }
    }
}

pub trait FormulaContext {
    fn variable(&self, name: &str) -> Option<f64>;

    /// Non-builtin function dispatch (indicator reads, custom functions).
    fn call(&self, name: &str, args: &[ArgValue]) -> Result<f64, FormulaError> {
        let _ = args;
        Err(FormulaError::UnknownFunction(name.to_string()))
    }
}

/// Context with no variables and no functions.
pub struct EmptyContext;

impl FormulaContext for EmptyContext {
    fn variable(&self, _name: &str) -> Option<f64> {
        None
    }
}

/// Fixed variable table, mainly for tests and one-off evaluation.
#[derive(Default)]
pub struct MapContext {
    vars: HashMap<String, f64>,
}

impl MapContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: &str, value: f64) -> Self {
        self.vars.insert(name.to_string(), value);
        self
    }

    pub fn set(&mut self, name: &str, value: f64) {
        self.vars.insert(name.to_string(), value);
    }
}

impl FormulaContext for MapContext {
    fn variable(&self, name: &str) -> Option<f64> {
        self.vars.get(name).copied()
    }
}
