//! Formula evaluation
//!
//! Numbers only: comparisons and boolean operators produce 1.0 / 0.0, a
//! value is truthy when non-zero. `&&` and `||` short-circuit, so a guarded
//! division like `b != 0 && a / b > 2` never divides by zero.

use crate::ast::{Arg, BinaryOp, Expr, UnaryOp};
use crate::context::{ArgValue, FormulaContext};
use crate::error::FormulaError;

fn truthy(x: f64) -> bool {
    x != 0.0
}

fn boolean(b: bool) -> f64 {
    if b { 1.0 } else { 0.0 }
}

pub fn evaluate(expr: &Expr, ctx: &dyn FormulaContext) -> Result<f64, FormulaError> {
    match expr {
        Expr::Number(n) => Ok(*n),
        Expr::Variable(name) => {
            ctx.variable(name).ok_or_else(|| FormulaError::UnknownVariable(name.clone()))
        }
        Expr::Unary { op, operand } => {
            let v = evaluate(operand, ctx)?;
            Ok(match op {
                UnaryOp::Negate => -v,
                UnaryOp::Not => boolean(!truthy(v)),
            })
        }
        Expr::Binary { op: BinaryOp::And, left, right } => {
            if !truthy(evaluate(left, ctx)?) {
                return Ok(0.0);
            }
            Ok(boolean(truthy(evaluate(right, ctx)?)))
        }
        Expr::Binary { op: BinaryOp::Or, left, right } => {
            if truthy(evaluate(left, ctx)?) {
                return Ok(1.0);
            }
            Ok(boolean(truthy(evaluate(right, ctx)?)))
        }
        Expr::Binary { op, left, right } => {
            let l = evaluate(left, ctx)?;
            let r = evaluate(right, ctx)?;
            match op {
                BinaryOp::Add => Ok(l + r),
                BinaryOp::Sub => Ok(l - r),
                BinaryOp::Mul => Ok(l * r),
                BinaryOp::Div => {
                    if r == 0.0 {
                        Err(FormulaError::DivisionByZero)
                    } else {
                        Ok(l / r)
                    }
                }
                BinaryOp::Mod => {
                    if r == 0.0 {
                        Err(FormulaError::ModuloByZero)
                    } else {
                        Ok(l % r)
                    }
                }
                BinaryOp::Pow => Ok(l.powf(r)),
                BinaryOp::Lt => Ok(boolean(l < r)),
                BinaryOp::Le => Ok(boolean(l <= r)),
                BinaryOp::Gt => Ok(boolean(l > r)),
                BinaryOp::Ge => Ok(boolean(l >= r)),
                BinaryOp::Eq => Ok(boolean(l == r)),
                BinaryOp::Ne => Ok(boolean(l != r)),
                BinaryOp::And | BinaryOp::Or => unreachable!("handled above"),
            }
        }
        Expr::Ternary { cond, then, otherwise } => {
            if truthy(evaluate(cond, ctx)?) {
                evaluate(then, ctx)
            } else {
                evaluate(otherwise, ctx)
            }
        }
        Expr::Call { name, args } => call(name, args, ctx),
    }
}

fn call(name: &str, args: &[Arg], ctx: &dyn FormulaContext) -> Result<f64, FormulaError> {
    let mut values = Vec::with_capacity(args.len());
    for arg in args {
        values.push(match arg {
            Arg::Expr(e) => ArgValue::Number(evaluate(e, ctx)?),
            Arg::Symbol(s) => ArgValue::Symbol(s.clone()),
        });
    }

    let unary = |f: fn(f64) -> Result<f64, FormulaError>| {
        let [v] = values.as_slice() else {
            return Err(FormulaError::BadArity {
                name: name.to_string(),
                expected: 1,
                got: values.len(),
            });
        };
        match v.as_number() {
            Some(n) => f(n),
            None => Err(FormulaError::UnknownVariable(format!("{name} argument"))),
        }
    };
    let binary = |f: fn(f64, f64) -> f64| {
        let [a, b] = values.as_slice() else {
            return Err(FormulaError::BadArity {
                name: name.to_string(),
                expected: 2,
                got: values.len(),
            });
        };
        match (a.as_number(), b.as_number()) {
            (Some(a), Some(b)) => Ok(f(a, b)),
            _ => Err(FormulaError::UnknownVariable(format!("{name} argument"))),
        }
    };

    let ternary3 = |f: fn(f64, f64, f64) -> f64| {
        let [a, b, c] = values.as_slice() else {
            return Err(FormulaError::BadArity {
                name: name.to_string(),
                expected: 3,
                got: values.len(),
            });
        };
        match (a.as_number(), b.as_number(), c.as_number()) {
            (Some(a), Some(b), Some(c)) => Ok(f(a, b, c)),
            _ => Err(FormulaError::UnknownVariable(format!("{name} argument"))),
        }
    };

    match name {
        "ABS" => unary(|x| Ok(x.abs())),
        "SQRT" => unary(|x| {
            if x < 0.0 { Err(FormulaError::SqrtOfNegative) } else { Ok(x.sqrt()) }
        }),
        "LOG" => unary(|x| {
            if x <= 0.0 { Err(FormulaError::LogNonPositive) } else { Ok(x.ln()) }
        }),
        "EXP" => unary(|x| Ok(x.exp())),
        "FLOOR" => unary(|x| Ok(x.floor())),
        "CEIL" => unary(|x| Ok(x.ceil())),
        "ROUND" => unary(|x| Ok(x.round())),
        "MIN" => binary(f64::min),
        "MAX" => binary(f64::max),
        "POW" => binary(f64::powf),
        // max-then-min keeps an inverted range from panicking
        "CLAMP" => ternary3(|x, lo, hi| x.max(lo).min(hi)),
        "IF" => ternary3(|c, a, b| if truthy(c) { a } else { b }),
        _ => ctx.call(name, &values),
    }
}
