//! Arka Strategy
//!
//! Template-driven strategy execution: JSON templates bind symbol slots,
//! indicators, parameters and condition trees; the runtime evaluates them
//! tick by tick and emits order requests for each trade slot through a
//! sink. Risk limits are checked before signals on every tick.

pub mod condition;
pub mod context;
pub mod events;
pub mod pricing;
pub mod runtime;
pub mod template;

pub use condition::{CompareOp, ConditionNode, CrossoverState, Logic, Operand};
pub use context::{LiveFormulaContext, PortfolioView};
pub use events::{EventCallback, ExitReason, OrderSink, StrategyEvent};
pub use runtime::{
    PositionLeg, PositionState, REENTRY_COOLDOWN_SECS, StrategyError, StrategyMetrics,
    StrategyRuntime,
};
pub use template::{
    IndicatorDef, OrderPolicy, ParamTrigger, ParameterDef, PricingMode, RiskPolicy,
    StrategyTemplate, SymbolDefinition, SymbolRole,
};
