//! Strategy lifecycle states
//!
//! The supervisor moves each strategy through a small state machine.
//! Start is legal from `Created`, `Stopped` and `Paused`; pause only from
//! `Running`; stop from `Running` and `Paused`; delete only from
//! `Stopped`. `Error` is reachable from anywhere and recovers through
//! stop.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyState {
    Created,
    Running,
    Paused,
    Stopped,
    Error,
    Deleted,
}

impl StrategyState {
    pub fn as_str(&self) -> &'static str {
        match self {
            StrategyState::Created => "created",
            StrategyState::Running => "running",
            StrategyState::Paused => "paused",
            StrategyState::Stopped => "stopped",
            StrategyState::Error => "error",
            StrategyState::Deleted => "deleted",
        }
    }

    /// Whether moving to `to` is a legal transition.
    pub fn can_transition(&self, to: StrategyState) -> bool {
        use StrategyState::*;
        match (self, to) {
            (Deleted, _) => false,
            (_, Error) => true,
            (Created | Stopped | Paused, Running) => true,
            (Running, Paused) => true,
            (Running | Paused | Error, Stopped) => true,
            (Stopped, Deleted) => true,
            _ => false,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, StrategyState::Deleted)
    }
}

impl std::fmt::Display for StrategyState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
