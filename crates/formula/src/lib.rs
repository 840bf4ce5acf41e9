//! Arka Formula
//!
//! The formula language used by strategy conditions and computed series:
//! arithmetic, comparisons, short-circuit boolean logic, a ternary operator
//! and function calls, evaluated against a `FormulaContext`. Parsed ASTs
//! are cached, so evaluating the same source on every tick parses once.

pub mod ast;
pub mod context;
mod error;
mod eval;
pub mod parser;
mod token;

pub use ast::{Arg, BinaryOp, Expr, UnaryOp};
pub use context::{ArgValue, EmptyContext, FormulaContext, MapContext};
pub use error::FormulaError;

use dashmap::DashMap;
use std::sync::Arc;

/// Parse-once evaluate-many entry point.
#[derive(Default)]
pub struct FormulaEngine {
    cache: DashMap<String, Arc<Expr>>,
}

impl FormulaEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse `source`, reusing the cached AST when available.
    pub fn parse(&self, source: &str) -> Result<Arc<Expr>, FormulaError> {
        if let Some(cached) = self.cache.get(source) {
            return Ok(cached.clone());
        }
        let expr = Arc::new(parser::parse(source)?);
        self.cache.insert(source.to_string(), expr.clone());
        Ok(expr)
    }

    /// Evaluate `source` against `ctx`. An empty formula evaluates to 0.
    pub fn evaluate(&self, source: &str, ctx: &dyn FormulaContext) -> Result<f64, FormulaError> {
        if source.trim().is_empty() {
            return Ok(0.0);
        }
        let expr = self.parse(source)?;
        eval::evaluate(&expr, ctx)
    }

    /// Syntax check without evaluation.
    pub fn validate(&self, source: &str) -> Result<(), FormulaError> {
        if source.trim().is_empty() {
            return Ok(());
        }
        self.parse(source).map(|_| ())
    }

    pub fn cached_formulas(&self) -> usize {
        self.cache.len()
    }
}

/// Evaluate a pre-parsed expression.
pub fn evaluate_expr(expr: &Expr, ctx: &dyn FormulaContext) -> Result<f64, FormulaError> {
    eval::evaluate(expr, ctx)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_formula_is_zero() {
        let engine = FormulaEngine::new();
        assert_eq!(engine.evaluate("", &EmptyContext).unwrap(), 0.0);
        assert_eq!(engine.evaluate("  ", &EmptyContext).unwrap(), 0.0);
        assert!(engine.validate("").is_ok());
    }

    #[test]
    fn test_cache_hit() {
        let engine = FormulaEngine::new();
        let a = engine.parse("1 + 2").unwrap();
        let b = engine.parse("1 + 2").unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(engine.cached_formulas(), 1);
    }

    #[test]
    fn test_validate_catches_syntax_errors() {
        let engine = FormulaEngine::new();
        assert!(engine.validate("1 + 2 > x").is_ok());
        assert!(engine.validate("1 +").is_err());
        assert!(engine.validate("a ? b").is_err());
    }

    #[test]
    fn test_evaluate_through_engine() {
        let engine = FormulaEngine::new();
        let ctx = MapContext::new().with("ltp", 101.0);
        assert_eq!(engine.evaluate("ltp > 100 ? 98.0 : 99.5", &ctx).unwrap(), 98.0);
    }
}
