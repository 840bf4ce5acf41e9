//! Strategy events and the order sink

use arka_core::{OrderRequest, OrderSide};
use std::sync::Arc;

/// Why a position was closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitReason {
    Signal,
    StopLoss,
    Target,
    TrailingStop,
    DailyLoss,
    TimeExit,
    Manual,
}

impl ExitReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExitReason::Signal => "signal",
            ExitReason::StopLoss => "stop_loss",
            ExitReason::Target => "target",
            ExitReason::TrailingStop => "trailing_stop",
            ExitReason::DailyLoss => "daily_loss",
            ExitReason::TimeExit => "time_exit",
            ExitReason::Manual => "manual",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum StrategyEvent {
    Entry { token: u32, side: OrderSide, quantity: u32, price: f64 },
    Exit { token: u32, reason: ExitReason, price: f64, pnl: f64 },
    /// Trading halted for the day; only an operator restart resumes.
    RiskHalt { reason: String },
    ParamUpdated { key: String, value: f64 },
}

pub type EventCallback = Arc<dyn Fn(&StrategyEvent) + Send + Sync>;

/// Receives emitted orders. The composition root routes these to the order
/// gateway; tests collect them.
pub trait OrderSink: Send + Sync {
    fn submit(&self, order: &OrderRequest);
}
