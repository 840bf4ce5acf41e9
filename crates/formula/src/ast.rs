//! Formula AST

use std::collections::BTreeSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Negate,
    Not,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Pow,
    Lt,
    Le,
    Gt,
    Ge,
    Eq,
    Ne,
    And,
    Or,
}

/// A function argument. A bare identifier in argument position is a symbol
/// reference handed to the function by name, not a variable lookup:
/// `RSI(NSE.RELIANCE, 14)` names the instrument, it does not read a
/// variable.
#[derive(Debug, Clone, PartialEq)]
pub enum Arg {
    Expr(Expr),
    Symbol(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Number(f64),
    Variable(String),
    Unary { op: UnaryOp, operand: Box<Expr> },
    Binary { op: BinaryOp, left: Box<Expr>, right: Box<Expr> },
    Ternary { cond: Box<Expr>, then: Box<Expr>, otherwise: Box<Expr> },
    Call { name: String, args: Vec<Arg> },
}

impl Expr {
    /// Every variable name the expression reads, sorted and deduplicated.
    pub fn variables(&self) -> BTreeSet<String> {
        let mut out = BTreeSet::new();
        self.walk_variables(&mut out);
        out
    }

    fn walk_variables(&self, out: &mut BTreeSet<String>) {
        match self {
            Expr::Number(_) => {}
            Expr::Variable(name) => {
                out.insert(name.clone());
            }
            Expr::Unary { operand, .. } => operand.walk_variables(out),
            Expr::Binary { left, right, .. } => {
                left.walk_variables(out);
                right.walk_variables(out);
            }
            Expr::Ternary { cond, then, otherwise } => {
                cond.walk_variables(out);
                then.walk_variables(out);
                otherwise.walk_variables(out);
            }
            Expr::Call { args, .. } => {
                for arg in args {
                    if let Arg::Expr(e) = arg {
                        e.walk_variables(out);
                    }
                }
            }
        }
    }

    /// Every function name called, sorted and deduplicated.
    pub fn functions(&self) -> BTreeSet<String> {
        let mut out = BTreeSet::new();
        self.walk_functions(&mut out);
        out
    }

    fn walk_functions(&self, out: &mut BTreeSet<String>) {
        match self {
            Expr::Number(_) | Expr::Variable(_) => {}
            Expr::Unary { operand, .. } => operand.walk_functions(out),
            Expr::Binary { left, right, .. } => {
                left.walk_functions(out);
                right.walk_functions(out);
            }
            Expr::Ternary { cond, then, otherwise } => {
                cond.walk_functions(out);
                then.walk_functions(out);
                otherwise.walk_functions(out);
            }
            Expr::Call { name, args } => {
                out.insert(name.clone());
                for arg in args {
                    if let Arg::Expr(e) = arg {
                        e.walk_functions(out);
                    }
                }
            }
        }
    }
}
