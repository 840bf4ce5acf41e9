//! Condition trees
//!
//! Entry and exit conditions are trees of comparisons joined by and/or
//! groups. Comparison operands are either literal numbers or prefixed keys
//! resolved by the runtime (`P_` price fields, `I_` indicator outputs,
//! `C_` candle fields, `R_` runtime state, `F_` named formulas, `G_`
//! greeks, `S_` parameters, `T_` time of day).
//!
//! Crossover operators are edge-triggered: they compare the previous tick's
//! operand pair with the current one, so a condition that is continuously
//! true fires exactly once at the crossing.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A comparison operand: a literal or a resolvable key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Operand {
    Constant(f64),
    Key(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompareOp {
    Gt,
    Lt,
    Gte,
    Lte,
    Eq,
    Neq,
    CrossesAbove,
    CrossesBelow,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Logic {
    And,
    Or,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ConditionNode {
    Compare { left: Operand, op: CompareOp, right: Operand },
    Group { logic: Logic, #[serde(default)] children: Vec<ConditionNode> },
}

/// Previous operand pairs for crossover comparisons, keyed per compare
/// node. Lives per strategy instance.
#[derive(Debug, Default)]
pub struct CrossoverState {
    prev: HashMap<String, (f64, f64)>,
}

impl CrossoverState {
    pub fn reset(&mut self) {
        self.prev.clear();
    }
}

fn node_key(left: &Operand, op: CompareOp, right: &Operand) -> String {
    format!("{left:?}|{op:?}|{right:?}")
}

impl ConditionNode {
    /// Evaluate against an operand resolver. An unresolvable operand makes
    /// its comparison false, never true.
    ///
    /// Group semantics: `And` requires every child and is false when empty;
    /// `Or` requires any child.
    pub fn evaluate(
        &self,
        resolve: &mut dyn FnMut(&Operand) -> Option<f64>,
        crossings: &mut CrossoverState,
    ) -> bool {
        match self {
            ConditionNode::Group { logic: Logic::And, children } => {
                // all() on empty is true; an empty AND must not fire
                !children.is_empty()
                    && children.iter().all(|c| c.evaluate(resolve, crossings))
            }
            ConditionNode::Group { logic: Logic::Or, children } => {
                children.iter().any(|c| c.evaluate(resolve, crossings))
            }
            ConditionNode::Compare { left, op, right } => {
                let (Some(l), Some(r)) = (resolve(left), resolve(right)) else {
                    return false;
                };
                match op {
                    CompareOp::Gt => l > r,
                    CompareOp::Lt => l < r,
                    CompareOp::Gte => l >= r,
                    CompareOp::Lte => l <= r,
                    CompareOp::Eq => (l - r).abs() < f64::EPSILON,
                    CompareOp::Neq => (l - r).abs() >= f64::EPSILON,
                    CompareOp::CrossesAbove | CompareOp::CrossesBelow => {
                        let key = node_key(left, *op, right);
                        // first sight seeds with the current pair: no edge
                        let (pl, pr) = *crossings.prev.entry(key).or_insert((l, r));
                        let fired = match op {
                            CompareOp::CrossesAbove => pl <= pr && l > r,
                            _ => pl >= pr && l < r,
                        };
                        let key = node_key(left, *op, right);
                        crossings.prev.insert(key, (l, r));
                        fired
                    }
                }
            }
        }
    }

    /// Every key the tree resolves, for subscription planning.
    pub fn keys(&self) -> Vec<String> {
        let mut out = Vec::new();
        self.collect_keys(&mut out);
        out.sort();
        out.dedup();
        out
    }

    fn collect_keys(&self, out: &mut Vec<String>) {
        match self {
            ConditionNode::Group { children, .. } => {
                for c in children {
                    c.collect_keys(out);
                }
            }
            ConditionNode::Compare { left, right, .. } => {
                for operand in [left, right] {
                    if let Operand::Key(k) = operand {
                        out.push(k.clone());
                    }
                }
            }
        }
    }
}
