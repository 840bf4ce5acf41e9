//! Throttled greeks recalculation
//!
//! One service instance covers every registered option. Recalculation is
//! driven three ways:
//!   - option ticks, throttled per contract unless `calculate_on_every_feed`
//!   - underlying ticks, which refresh only recently-traded options; a
//!     periodic sweep picks up the illiquid rest
//!   - a slow time tick, which refreshes everything as time decay moves
//!
//! The last solved IV per contract seeds the next solve, and also seeds the
//! bid/ask IV solves of the same pass. Results leave through `GreeksSink`;
//! the service never holds a lock while publishing.

use crate::greeks::black_scholes as bs;
use crate::greeks::expiry;
use crate::greeks::iv::{IvError, IvSolver};
use arka_clock::Clock;
use arka_core::{ContractInfo, OptionKind, Segment};
use arka_ports::{ContractRepository, SnapshotSource};
use chrono::{DateTime, NaiveDate, Utc};
use dashmap::DashMap;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum GreeksError {
    #[error("contract {segment}:{token} is not an option")]
    NotAnOption { segment: Segment, token: u32 },
    #[error("contract {segment}:{token} has no expiry")]
    NoExpiry { segment: Segment, token: u32 },
}

/// Which instrument carries the underlying price for an option.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BasePriceMode {
    /// Cash leg only.
    Cash,
    /// Nearest-expiry future, cash as the fallback when no future trades.
    #[default]
    Future,
}

/// Tuning for the recalculation service.
#[derive(Debug, Clone, Copy)]
pub struct GreeksConfig {
    pub risk_free_rate: f64,
    /// Continuous dividend yield applied to the underlying.
    pub dividend_yield: f64,
    pub base_price_mode: BasePriceMode,
    /// Minimum gap between recalcs for one contract on option ticks.
    pub throttle_ms: i64,
    /// Bypass the throttle entirely.
    pub calculate_on_every_feed: bool,
    pub tolerance: f64,
    pub max_iterations: u32,
    /// Slow refresh period; catches pure time decay.
    pub time_tick_secs: u64,
    /// An option with no tick for this long is illiquid.
    pub illiquid_threshold_secs: i64,
    /// Period of the illiquid-option sweep.
    pub illiquid_sweep_secs: u64,
}

impl Default for GreeksConfig {
    fn default() -> Self {
        Self {
            risk_free_rate: 0.065,
            dividend_yield: 0.0,
            base_price_mode: BasePriceMode::Future,
            throttle_ms: 1000,
            calculate_on_every_feed: false,
            tolerance: 1e-6,
            max_iterations: 100,
            time_tick_secs: 60,
            illiquid_threshold_secs: 30,
            illiquid_sweep_secs: 30,
        }
    }
}

/// One completed recalculation, as handed to the sink.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct GreeksResult {
    pub iv: f64,
    pub bid_iv: f64,
    pub ask_iv: f64,
    pub delta: f64,
    pub gamma: f64,
    pub vega: f64,
    pub theta: f64,
    pub rho: f64,
    pub theoretical_price: f64,
    pub ts_millis: i64,
}

/// Receives every completed recalculation. The price store write-back
/// implements this in the composition root.
pub trait GreeksSink: Send + Sync {
    fn publish_greeks(&self, segment: Segment, token: u32, result: &GreeksResult);

    /// A recalculation that could not produce a result: expired contract,
    /// unresolved underlying, or a solver failure.
    fn calculation_failed(&self, _segment: Segment, _token: u32, _reason: &str) {}
}

struct OptionMeta {
    kind: OptionKind,
    strike: f64,
    expiry: NaiveDate,
    symbol: String,
    asset_token: i64,
}

#[derive(Clone, Copy, Default)]
struct CacheEntry {
    iv: f64,
    last_calc_ms: i64,
    last_tick_ms: i64,
    /// Prices at the last completed calc; unchanged inputs skip the solve.
    last_option_price: f64,
    last_underlying_price: f64,
}

pub struct GreeksService {
    snapshots: Arc<dyn SnapshotSource>,
    contracts: Arc<dyn ContractRepository>,
    clock: Arc<dyn Clock>,
    sink: Arc<dyn GreeksSink>,
    config: GreeksConfig,
    solver: IvSolver,
    options: DashMap<(Segment, u32), OptionMeta>,
    by_symbol: DashMap<String, HashSet<(Segment, u32)>>,
    cache: DashMap<(Segment, u32), CacheEntry>,
}

impl GreeksService {
    pub fn new(
        snapshots: Arc<dyn SnapshotSource>,
        contracts: Arc<dyn ContractRepository>,
        clock: Arc<dyn Clock>,
        sink: Arc<dyn GreeksSink>,
        config: GreeksConfig,
    ) -> Self {
        Self {
            snapshots,
            contracts,
            clock,
            sink,
            solver: IvSolver::new(config.tolerance, config.max_iterations),
            config,
            options: DashMap::new(),
            by_symbol: DashMap::new(),
            cache: DashMap::new(),
        }
    }

    /// Track an option contract. Idempotent per `(segment, token)`.
    pub fn register_option(&self, contract: &ContractInfo) -> Result<(), GreeksError> {
        let key = (contract.segment, contract.token);
        let Some(kind) = contract.option_kind else {
            return Err(GreeksError::NotAnOption { segment: key.0, token: key.1 });
        };
        let Some(expiry) = contract.expiry else {
            return Err(GreeksError::NoExpiry { segment: key.0, token: key.1 });
        };
        self.options.insert(
            key,
            OptionMeta {
                kind,
                strike: contract.strike,
                expiry,
                symbol: contract.symbol.clone(),
                asset_token: contract.asset_token,
            },
        );
        self.by_symbol.entry(contract.symbol.clone()).or_default().insert(key);
        Ok(())
    }

    pub fn unregister_option(&self, segment: Segment, token: u32) {
        if let Some((_, meta)) = self.options.remove(&(segment, token)) {
            if let Some(mut set) = self.by_symbol.get_mut(&meta.symbol) {
                set.remove(&(segment, token));
            }
        }
        self.cache.remove(&(segment, token));
    }

    pub fn tracked_options(&self) -> usize {
        self.options.len()
    }

    /// Option tick entry point. Throttled per contract.
    pub fn on_option_tick(&self, segment: Segment, token: u32) {
        let key = (segment, token);
        if !self.options.contains_key(&key) {
            return;
        }
        let now_ms = self.clock.now_millis();
        {
            let mut entry = self.cache.entry(key).or_default();
            entry.last_tick_ms = now_ms;
            if !self.config.calculate_on_every_feed
                && now_ms - entry.last_calc_ms < self.config.throttle_ms
            {
                return;
            }
        }
        self.recalculate(segment, token, now_ms, false);
    }

    /// Underlying tick entry point: refresh only the options that traded
    /// recently. The illiquid sweep covers the rest.
    pub fn on_underlying_tick(&self, symbol: &str) {
        let Some(keys) = self.by_symbol.get(symbol).map(|s| s.clone()) else {
            return;
        };
        let now_ms = self.clock.now_millis();
        let threshold_ms = self.config.illiquid_threshold_secs * 1000;
        for (segment, token) in keys {
            let entry = self.cache.get(&(segment, token)).map(|e| *e).unwrap_or_default();
            if now_ms - entry.last_tick_ms >= threshold_ms {
                continue;
            }
            if !self.config.calculate_on_every_feed
                && now_ms - entry.last_calc_ms < self.config.throttle_ms
            {
                continue;
            }
            self.recalculate(segment, token, now_ms, false);
        }
    }

    /// Periodic pass over options the underlying path skipped.
    pub fn sweep_illiquid(&self) {
        let now_ms = self.clock.now_millis();
        let threshold_ms = self.config.illiquid_threshold_secs * 1000;
        let keys: Vec<(Segment, u32)> = self.options.iter().map(|e| *e.key()).collect();
        for (segment, token) in keys {
            let entry = self.cache.get(&(segment, token)).map(|e| *e).unwrap_or_default();
            if now_ms - entry.last_tick_ms < threshold_ms {
                continue;
            }
            self.recalculate(segment, token, now_ms, false);
        }
    }

    /// Slow time tick: everything moves with theta even without trades.
    pub fn force_recalculate_all(&self) {
        let now_ms = self.clock.now_millis();
        let keys: Vec<(Segment, u32)> = self.options.iter().map(|e| *e.key()).collect();
        for (segment, token) in keys {
            self.recalculate(segment, token, now_ms, true);
        }
    }

    /// Spawn the sweep and time-tick timers on the current tokio runtime.
    pub fn spawn_timers(self: &Arc<Self>) -> Vec<tokio::task::JoinHandle<()>> {
        let sweeper = self.clone();
        let sweep_period = Duration::from_secs(self.config.illiquid_sweep_secs);
        let sweep = tokio::spawn(async move {
            let mut tick = tokio::time::interval(sweep_period);
            loop {
                tick.tick().await;
                sweeper.sweep_illiquid();
            }
        });

        let refresher = self.clone();
        let refresh_period = Duration::from_secs(self.config.time_tick_secs);
        let refresh = tokio::spawn(async move {
            let mut tick = tokio::time::interval(refresh_period);
            loop {
                tick.tick().await;
                refresher.force_recalculate_all();
            }
        });

        vec![sweep, refresh]
    }

    /// Live underlying price per the configured base price mode.
    fn underlying_price(&self, segment: Segment, meta: &OptionMeta) -> f64 {
        if self.config.base_price_mode == BasePriceMode::Future {
            if let Some(fut) = self.contracts.next_expiry_future_token(&meta.symbol, segment) {
                let ltp = self.snapshots.ltp(segment, fut);
                if ltp > 0.0 {
                    return ltp;
                }
            }
        }
        let cash_segment = match segment {
            Segment::BseFo => Segment::BseCm,
            _ => Segment::NseCm,
        };
        let cash_token = if meta.asset_token > 0 {
            Some(meta.asset_token as u32)
        } else {
            self.contracts.asset_token_for_symbol(&meta.symbol)
        };
        cash_token.map_or(0.0, |t| self.snapshots.ltp(cash_segment, t))
    }

    /// `force` bypasses the unchanged-price skip; the time tick uses it so
    /// pure decay still refreshes.
    fn recalculate(&self, segment: Segment, token: u32, now_ms: i64, force: bool) {
        let key = (segment, token);
        // Copy the metadata out so no map lock is held during the solve
        // and publish.
        let Some(meta) = self.options.get(&key).map(|m| OptionMeta {
            kind: m.kind,
            strike: m.strike,
            expiry: m.expiry,
            symbol: m.symbol.clone(),
            asset_token: m.asset_token,
        }) else {
            return;
        };

        let now: DateTime<Utc> = self.clock.now();
        if expiry::has_expired(now, meta.expiry) {
            self.sink.calculation_failed(segment, token, "expired");
            return;
        }

        let snap = self.snapshots.snapshot(segment, token);
        if !snap.is_initialized() || snap.ltp <= 0.0 {
            return;
        }
        let spot = self.underlying_price(segment, &meta);
        if spot <= 0.0 {
            self.sink.calculation_failed(segment, token, "no underlying price");
            return;
        }

        // Throttle elapsed but nothing moved: the previous result stands.
        if !force
            && !self.config.calculate_on_every_feed
            && let Some(entry) = self.cache.get(&key)
            && entry.last_calc_ms > 0
            && entry.last_option_price == snap.ltp
            && entry.last_underlying_price == spot
        {
            return;
        }

        let t = expiry::time_to_expiry(now, meta.expiry);
        let r = self.config.risk_free_rate;
        let fwd_spot = spot * (-self.config.dividend_yield * t).exp();

        let seed = self.cache.get(&key).map(|e| e.iv).filter(|iv| *iv > 0.0);
        let solved =
            match self.solver.solve(meta.kind, fwd_spot, meta.strike, t, r, snap.ltp, seed) {
                Ok(sol) => sol,
                Err(IvError::NotCalculable(reason)) => {
                    self.sink.calculation_failed(segment, token, reason);
                    return;
                }
                Err(e) => {
                    self.sink.calculation_failed(segment, token, &e.to_string());
                    return;
                }
            };

        let g = bs::greeks(meta.kind, fwd_spot, meta.strike, t, r, solved.sigma);

        // Quote IVs reuse the freshly solved IV as seed; failures fall back
        // to the trade IV rather than publishing zero.
        let side_iv = |price: f64| {
            if price <= 0.0 {
                return solved.sigma;
            }
            self.solver
                .solve(meta.kind, fwd_spot, meta.strike, t, r, price, Some(solved.sigma))
                .map(|s| s.sigma)
                .unwrap_or(solved.sigma)
        };
        let bid_iv = side_iv(snap.best_bid());
        let ask_iv = side_iv(snap.best_ask());

        let result = GreeksResult {
            iv: solved.sigma,
            bid_iv,
            ask_iv,
            delta: g.delta,
            gamma: g.gamma,
            vega: g.vega,
            theta: g.theta,
            rho: g.rho,
            theoretical_price: g.price,
            ts_millis: now_ms,
        };

        self.cache
            .entry(key)
            .and_modify(|e| {
                e.iv = solved.sigma;
                e.last_calc_ms = now_ms;
                e.last_option_price = snap.ltp;
                e.last_underlying_price = spot;
            })
            .or_insert(CacheEntry {
                iv: solved.sigma,
                last_calc_ms: now_ms,
                last_tick_ms: 0,
                last_option_price: snap.ltp,
                last_underlying_price: spot,
            });

        self.sink.publish_greeks(segment, token, &result);
    }
}
