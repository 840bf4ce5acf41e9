//! Arka Analytics
//!
//! Derived values computed from live market state: incremental technical
//! indicators fed by completed candles, and the option greeks service
//! (Black-Scholes pricing, implied-volatility solving, throttled
//! recalculation).

pub mod greeks;
pub mod indicators;

pub use greeks::{
    BasePriceMode, GreeksConfig, GreeksResult, GreeksService, GreeksSink, IvSolver, OptionGreeks,
};
pub use indicators::{IndicatorEngine, IndicatorError, IndicatorKind, PriceField};
