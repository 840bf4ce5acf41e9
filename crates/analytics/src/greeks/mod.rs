//! Option greeks and implied volatility
//!
//! Black-Scholes closed forms, a Newton-Raphson IV solver with a Brent
//! bracketing fallback, trading-day time to expiry, and the throttled
//! recalculation service that ties them to live market state.

pub mod black_scholes;
pub mod expiry;
pub mod iv;
pub mod service;

pub use black_scholes::OptionGreeks;
pub use iv::{IvError, IvSolver};
pub use service::{BasePriceMode, GreeksConfig, GreeksResult, GreeksService, GreeksSink};
