//! Live formula context
//!
//! Bridges the formula language to live market state across a strategy's
//! symbol slots. Market and greeks functions take an optional slot id as
//! their first argument (`LTP(TRADE_1)`, `IV(REF_1)`) and default to the
//! primary slot; indicator functions resolve against the indicator engine;
//! portfolio functions aggregate over the open legs.

use crate::template::SymbolDefinition;
use arka_analytics::{IndicatorEngine, IndicatorKind};
use arka_core::UnifiedState;
use arka_formula::{ArgValue, FormulaContext, FormulaError};
use arka_ports::SnapshotSource;
use std::collections::HashMap;

/// Default period for indicator functions called without one.
pub const DEFAULT_INDICATOR_PERIOD: u32 = 14;

pub fn is_indicator_function(name: &str) -> bool {
    indicator_binding(name, &[]).is_some()
}

/// `(registered id, output key, kind)` behind an indicator function call.
/// `nums` are the call's numeric arguments in order; absent ones take the
/// conventional defaults. The id is shared by every output of one
/// underlying indicator, so `MACD(12, 26)` and `MACD_SIGNAL(12, 26)` read
/// the same registration.
pub fn indicator_binding(name: &str, nums: &[f64]) -> Option<(String, String, IndicatorKind)> {
    let num = |i: usize, d: f64| nums.get(i).copied().unwrap_or(d) as usize;
    match name {
        "SMA" | "EMA" | "RSI" | "ATR" | "ADX" => {
            let period = num(0, f64::from(DEFAULT_INDICATOR_PERIOD));
            let kind = match name {
                "SMA" => IndicatorKind::Sma { period },
                "EMA" => IndicatorKind::Ema { period },
                "RSI" => IndicatorKind::Rsi { period },
                "ATR" => IndicatorKind::Atr { period },
                _ => IndicatorKind::Adx { period },
            };
            let id = format!("{name}_{period}");
            Some((id.clone(), id, kind))
        }
        "OBV" => Some(("OBV".to_string(), "OBV".to_string(), IndicatorKind::Obv)),
        "MACD" | "MACD_SIGNAL" => {
            let fast = num(0, 12.0);
            let slow = num(1, 26.0);
            let signal = num(2, 9.0);
            let id = format!("MACD_{fast}_{slow}");
            let key = if name == "MACD_SIGNAL" { format!("{id}_SIGNAL") } else { id.clone() };
            Some((id, key, IndicatorKind::Macd { fast, slow, signal }))
        }
        "BBANDS_UPPER" | "BBANDS_MIDDLE" | "BBANDS_LOWER" => {
            let period = num(0, 20.0);
            let multiplier = nums.get(1).copied().unwrap_or(2.0);
            let id = format!("BB_{period}");
            let suffix = match name {
                "BBANDS_UPPER" => "_UPPER",
                "BBANDS_MIDDLE" => "_MIDDLE",
                _ => "_LOWER",
            };
            Some((id.clone(), format!("{id}{suffix}"), IndicatorKind::Bollinger { period, multiplier }))
        }
        "STOCH_K" | "STOCH_D" => {
            let k_period = num(0, 14.0);
            let d_period = num(1, 3.0);
            let id = format!("STOCH_{k_period}_{d_period}");
            let suffix = if name == "STOCH_D" { "_D" } else { "_K" };
            Some((id.clone(), format!("{id}{suffix}"), IndicatorKind::Stochastic { k_period, d_period }))
        }
        _ => None,
    }
}

fn market_value(name: &str, snap: &UnifiedState) -> Option<f64> {
    Some(match name {
        "LTP" => snap.ltp,
        "OPEN" => snap.open,
        "HIGH" => snap.high,
        "LOW" => snap.low,
        "CLOSE" => snap.prev_close,
        "VOLUME" => snap.volume as f64,
        "BID" => snap.best_bid(),
        "ASK" => snap.best_ask(),
        "CHANGE_PCT" => snap.percent_change,
        // session volume-weighted average price off the touchline
        "VWAP" => snap.average_price,
        // stored as a fraction, surfaced in percent
        "IV" => snap.implied_volatility * 100.0,
        "DELTA" => snap.delta,
        "GAMMA" => snap.gamma,
        "THETA" => snap.theta,
        "VEGA" => snap.vega,
        "RHO" => snap.rho,
        _ => return None,
    })
}

/// Aggregates over the strategy's open legs, computed by the runtime per
/// evaluation.
#[derive(Debug, Clone, Copy, Default)]
pub struct PortfolioView {
    /// Realized plus open PnL.
    pub mtm: f64,
    /// Signed entry premium of the open legs, buys positive.
    pub net_premium: f64,
    /// Quantity-weighted delta of the open legs.
    pub net_delta: f64,
}

pub struct LiveFormulaContext<'a> {
    pub params: &'a HashMap<String, f64>,
    pub indicators: &'a IndicatorEngine,
    pub snapshots: &'a dyn SnapshotSource,
    pub symbols: &'a [SymbolDefinition],
    pub primary: &'a SymbolDefinition,
    pub portfolio: PortfolioView,
}

impl LiveFormulaContext<'_> {
    /// The slot a call addresses: its symbol first argument, or the primary
    /// slot when the call has none. An unknown slot id resolves to nothing.
    fn slot(&self, args: &[ArgValue]) -> Option<&SymbolDefinition> {
        match args.first().and_then(ArgValue::as_symbol) {
            Some(slot) => {
                let found = self.symbols.iter().find(|s| s.slot == slot);
                if found.is_none() {
                    log::warn!("formula references unknown symbol slot '{slot}'");
                }
                found
            }
            None => Some(self.primary),
        }
    }

    fn snapshot_of(&self, sym: &SymbolDefinition) -> UnifiedState {
        self.snapshots.snapshot(sym.segment, sym.token)
    }
}

impl FormulaContext for LiveFormulaContext<'_> {
    /// Bare variables read the primary slot; parameters and raw indicator
    /// output keys resolve after them.
    fn variable(&self, name: &str) -> Option<f64> {
        let snap = self.snapshot_of(self.primary);
        match name {
            "ltp" => Some(snap.ltp),
            "open" => Some(snap.open),
            "high" => Some(snap.high),
            "low" => Some(snap.low),
            "close" => Some(snap.prev_close),
            "atp" => Some(snap.average_price),
            "volume" => Some(snap.volume as f64),
            "bid" => Some(snap.best_bid()),
            "ask" => Some(snap.best_ask()),
            "spread" => Some(snap.spread()),
            "oi" => Some(snap.open_interest as f64),
            "iv" => Some(snap.implied_volatility * 100.0),
            "delta" => Some(snap.delta),
            "gamma" => Some(snap.gamma),
            "vega" => Some(snap.vega),
            "theta" => Some(snap.theta),
            "rho" => Some(snap.rho),
            _ => {
                if let Some(v) = self.params.get(name) {
                    return Some(*v);
                }
                // fall through to indicator outputs by raw id
                self.indicators.value(
                    self.primary.segment,
                    self.primary.token,
                    self.primary.timeframe,
                    name,
                )
            }
        }
    }

    fn call(&self, name: &str, args: &[ArgValue]) -> Result<f64, FormulaError> {
        match name {
            "MTM" => return Ok(self.portfolio.mtm),
            "NET_PREMIUM" => return Ok(self.portfolio.net_premium),
            "NET_DELTA" => return Ok(self.portfolio.net_delta),
            _ => {}
        }

        let Some(sym) = self.slot(args) else {
            return Ok(0.0);
        };
        if let Some(value) = market_value(name, &self.snapshot_of(sym)) {
            return Ok(value);
        }

        let nums: Vec<f64> = args.iter().filter_map(ArgValue::as_number).collect();
        if let Some((id, key, _)) = indicator_binding(name, &nums) {
            if !self.indicators.is_registered(sym.segment, sym.token, sym.timeframe, &id) {
                return Err(FormulaError::UnknownVariable(id));
            }
            // registered but not warmed up yet
            return Ok(self
                .indicators
                .value(sym.segment, sym.token, sym.timeframe, &key)
                .unwrap_or(0.0));
        }
        Err(FormulaError::UnknownFunction(name.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::template::SymbolRole;
    use arka_core::{Segment, Timeframe};
    use arka_formula::FormulaEngine;
    use std::sync::RwLock;

    const OPTION_TOKEN: u32 = 49600;
    const SPOT_TOKEN: u32 = 26000;

    struct StubMarket {
        state: RwLock<HashMap<u32, UnifiedState>>,
    }

    impl StubMarket {
        fn new() -> Self {
            Self { state: RwLock::new(HashMap::new()) }
        }

        fn with<F: FnOnce(&mut UnifiedState)>(&self, token: u32, f: F) {
            let mut map = self.state.write().unwrap();
            let s = map.entry(token).or_insert_with(UnifiedState::sentinel);
            s.token = token;
            f(s);
        }
    }

    impl SnapshotSource for StubMarket {
        fn snapshot(&self, _segment: Segment, token: u32) -> UnifiedState {
            self.state
                .read()
                .unwrap()
                .get(&token)
                .cloned()
                .unwrap_or_else(UnifiedState::sentinel)
        }
    }

    fn symbol(slot: &str, token: u32, role: SymbolRole) -> SymbolDefinition {
        SymbolDefinition {
            slot: slot.to_string(),
            label: String::new(),
            role,
            segment: Segment::NseFo,
            token,
            timeframe: Timeframe::M5,
            entry_side: None,
        }
    }

    struct Fixture {
        market: StubMarket,
        indicators: IndicatorEngine,
        symbols: Vec<SymbolDefinition>,
        params: HashMap<String, f64>,
        portfolio: PortfolioView,
    }

    impl Fixture {
        fn new() -> Self {
            let market = StubMarket::new();
            market.with(OPTION_TOKEN, |s| {
                s.ltp = 100.0;
                s.implied_volatility = 0.28;
                s.delta = 0.55;
                s.rho = 1.5;
            });
            market.with(SPOT_TOKEN, |s| {
                s.ltp = 22_050.0;
                s.percent_change = 0.45;
            });
            Self {
                market,
                indicators: IndicatorEngine::new(),
                symbols: vec![
                    symbol("TRADE_1", OPTION_TOKEN, SymbolRole::Trade),
                    symbol("REF_1", SPOT_TOKEN, SymbolRole::Reference),
                ],
                params: HashMap::new(),
                portfolio: PortfolioView::default(),
            }
        }

        fn eval(&self, source: &str) -> Result<f64, FormulaError> {
            let ctx = LiveFormulaContext {
                params: &self.params,
                indicators: &self.indicators,
                snapshots: &self.market,
                symbols: &self.symbols,
                primary: &self.symbols[0],
                portfolio: self.portfolio,
            };
            FormulaEngine::new().evaluate(source, &ctx)
        }
    }

    #[test]
    fn test_market_functions_select_slot() {
        let f = Fixture::new();
        // unqualified calls read the primary slot
        assert_eq!(f.eval("LTP()").unwrap(), 100.0);
        assert_eq!(f.eval("LTP(TRADE_1)").unwrap(), 100.0);
        assert_eq!(f.eval("LTP(REF_1)").unwrap(), 22_050.0);
        assert!((f.eval("CHANGE_PCT(REF_1)").unwrap() - 0.45).abs() < 1e-9);
        assert!((f.eval("RHO(TRADE_1)").unwrap() - 1.5).abs() < 1e-9);
    }

    #[test]
    fn test_iv_ternary_picks_branch_per_slot() {
        let f = Fixture::new();
        let source = "IV(TRADE_1) > 25 ? LTP(TRADE_1) * 0.98 : LTP(TRADE_1) * 0.95";
        assert!((f.eval(source).unwrap() - 98.0).abs() < 1e-9);

        f.market.with(OPTION_TOKEN, |s| s.implied_volatility = 0.20);
        assert!((f.eval(source).unwrap() - 95.0).abs() < 1e-9);
    }

    #[test]
    fn test_unknown_slot_evaluates_to_zero() {
        let f = Fixture::new();
        assert_eq!(f.eval("LTP(TRADE_9)").unwrap(), 0.0);
    }

    #[test]
    fn test_portfolio_functions() {
        let mut f = Fixture::new();
        f.portfolio = PortfolioView { mtm: 350.0, net_premium: -5_250.0, net_delta: 0.12 };
        assert_eq!(f.eval("MTM()").unwrap(), 350.0);
        assert_eq!(f.eval("NET_PREMIUM()").unwrap(), -5_250.0);
        assert!((f.eval("NET_DELTA() * 100").unwrap() - 12.0).abs() < 1e-9);
    }

    #[test]
    fn test_indicator_function_requires_registration() {
        let f = Fixture::new();
        assert_eq!(
            f.eval("RSI(7)"),
            Err(FormulaError::UnknownVariable("RSI_7".to_string()))
        );

        f.indicators
            .register(Segment::NseFo, OPTION_TOKEN, Timeframe::M5, "RSI_7", IndicatorKind::Rsi { period: 7 })
            .unwrap();
        // registered but no completed bars yet
        assert_eq!(f.eval("RSI(7)").unwrap(), 0.0);
    }

    #[test]
    fn test_macd_signal_shares_registration() {
        let (id, key, _) = indicator_binding("MACD_SIGNAL", &[12.0, 26.0, 9.0]).unwrap();
        assert_eq!(id, "MACD_12_26");
        assert_eq!(key, "MACD_12_26_SIGNAL");
        let (id, key, _) = indicator_binding("MACD", &[]).unwrap();
        assert_eq!(id, "MACD_12_26");
        assert_eq!(key, "MACD_12_26");
        assert_eq!(indicator_binding("BBANDS_LOWER", &[20.0]).unwrap().1, "BB_20_LOWER");
        assert_eq!(indicator_binding("STOCH_D", &[]).unwrap().1, "STOCH_14_3_D");
    }

    #[test]
    fn test_unknown_function_errors() {
        let f = Fixture::new();
        assert_eq!(
            f.eval("WOBBLE(3)"),
            Err(FormulaError::UnknownFunction("WOBBLE".to_string()))
        );
    }
}
