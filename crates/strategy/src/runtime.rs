//! Strategy runtime
//!
//! Executes one bound template against live ticks. The per-tick pipeline,
//! in order: every-tick parameters, risk checks on the open position,
//! entry evaluation, exit evaluation. A firing entry places one order per
//! trade slot, each on its configured side; exits close every open leg.
//! Entries are blocked while an exit is in flight, after the entry signal
//! has fired, inside the re-entry cooldown, and once the daily trade limit
//! is reached. A daily-loss breach force-exits and halts the strategy for
//! the day.

use crate::condition::{ConditionNode, CrossoverState, Operand};
use crate::context::{LiveFormulaContext, PortfolioView, indicator_binding, is_indicator_function};
use crate::events::{EventCallback, ExitReason, OrderSink, StrategyEvent};
use crate::pricing;
use crate::template::{ParamTrigger, StrategyTemplate, SymbolDefinition};
use arka_analytics::{IndicatorEngine, IndicatorError, IndicatorKind, PriceField};
use arka_clock::Clock;
use arka_core::{Candle, OrderRequest, OrderSide, Segment, Timeframe, UnifiedState};
use arka_formula::{Arg, Expr, FormulaEngine, FormulaError};
use arka_market::CandleAggregator;
use arka_ports::SnapshotSource;
use chrono::{FixedOffset, Timelike};
use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use thiserror::Error;

/// Seconds after an exit before a new entry may fire.
pub const REENTRY_COOLDOWN_SECS: i64 = 5;

/// Seconds between square-off time checks.
const TIME_EXIT_CHECK_SECS: i64 = 5;

#[derive(Debug, Error)]
pub enum StrategyError {
    #[error("invalid template: {0}")]
    InvalidTemplate(String),
    #[error(transparent)]
    Formula(#[from] FormulaError),
    #[error(transparent)]
    Indicator(#[from] IndicatorError),
}

/// One open order leg on a trade slot.
#[derive(Debug, Clone, PartialEq)]
pub struct PositionLeg {
    pub slot: String,
    pub segment: Segment,
    pub token: u32,
    pub side: OrderSide,
    pub quantity: u32,
    pub entry_price: f64,
}

/// Position and counters for one runtime. `entry_price` and `quantity`
/// mirror the first leg for the primary-slot risk checks.
#[derive(Debug, Clone, Default)]
pub struct PositionState {
    pub has_position: bool,
    pub entry_price: f64,
    pub quantity: u32,
    pub legs: Vec<PositionLeg>,
    pub entry_signal_fired: bool,
    pub exit_in_progress: bool,
    pub trailing_armed: bool,
    /// Best price seen since the trailing stop armed.
    pub best_price: f64,
    pub last_exit_ms: i64,
    pub trades_today: u32,
    pub realized_pnl: f64,
    pub halted: bool,
}

/// Point-in-time metrics for the supervisor's ticker.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct StrategyMetrics {
    pub ltp: f64,
    pub unrealized_pnl: f64,
    pub realized_pnl: f64,
    pub trades_today: u32,
    pub has_position: bool,
    pub entry_price: f64,
    pub halted: bool,
}

pub struct StrategyRuntime {
    template: StrategyTemplate,
    /// Resolved once at bind; the slot unqualified reads go to.
    primary: SymbolDefinition,
    formulas: Arc<FormulaEngine>,
    snapshots: Arc<dyn SnapshotSource>,
    indicators: Arc<IndicatorEngine>,
    candles: Arc<CandleAggregator>,
    clock: Arc<dyn Clock>,
    orders: Arc<dyn OrderSink>,
    events: Option<EventCallback>,
    params: RwLock<HashMap<String, f64>>,
    position: Mutex<PositionState>,
    crossings: Mutex<CrossoverState>,
    /// Last evaluation instant per `OnSchedule` parameter, epoch millis.
    schedule: Mutex<HashMap<String, i64>>,
    last_time_exit_check_ms: AtomicI64,
}

impl StrategyRuntime {
    /// Bind a template: validate its symbol slots and formulas, register
    /// its indicators (with `{{param}}` placeholders resolved) and the
    /// indicators its formulas invoke, and start candle tracking for every
    /// bound symbol.
    #[allow(clippy::too_many_arguments)]
    pub fn bind(
        template: StrategyTemplate,
        formulas: Arc<FormulaEngine>,
        snapshots: Arc<dyn SnapshotSource>,
        indicators: Arc<IndicatorEngine>,
        candles: Arc<CandleAggregator>,
        clock: Arc<dyn Clock>,
        orders: Arc<dyn OrderSink>,
        events: Option<EventCallback>,
    ) -> Result<Self, StrategyError> {
        if template.order.quantity == 0 {
            return Err(StrategyError::InvalidTemplate("order quantity is zero".to_string()));
        }
        let Some(primary) = template.primary().cloned() else {
            return Err(StrategyError::InvalidTemplate("no symbols bound".to_string()));
        };
        for (i, sym) in template.symbols.iter().enumerate() {
            if template.symbols[..i].iter().any(|s| s.slot == sym.slot) {
                return Err(StrategyError::InvalidTemplate(format!(
                    "duplicate symbol slot '{}'",
                    sym.slot
                )));
            }
            candles.track(sym.segment, sym.token, sym.timeframe);
        }

        let mut params = HashMap::new();
        for p in &template.parameters {
            params.insert(p.key.clone(), p.value);
        }

        for def in &template.indicators {
            let sym = resolve_slot(&template, def.symbol.as_deref(), &primary)?;
            let timeframe = def
                .timeframe
                .as_deref()
                .map(|s| {
                    Timeframe::parse(s).ok_or_else(|| {
                        StrategyError::InvalidTemplate(format!("bad timeframe '{s}'"))
                    })
                })
                .transpose()?
                .unwrap_or(sym.timeframe);
            let kind = indicator_kind(&template, def)?;
            let field = def
                .price_field
                .as_deref()
                .map(|s| {
                    PriceField::parse(s).ok_or_else(|| {
                        StrategyError::InvalidTemplate(format!("bad price field '{s}'"))
                    })
                })
                .transpose()?
                .unwrap_or_default();
            candles.track(sym.segment, sym.token, timeframe);
            indicators.register_with_field(sym.segment, sym.token, timeframe, &def.id, kind, field)?;
        }

        // Validate every formula and auto-register the indicators they
        // call, on whichever slot each call addresses.
        for source in template.formulas.values() {
            let expr = formulas.parse(source)?;
            for (name, slot, nums) in indicator_calls(&expr) {
                let sym = resolve_slot(&template, slot.as_deref(), &primary)?;
                let Some((id, _, kind)) = indicator_binding(&name, &nums) else {
                    continue;
                };
                if indicators.is_registered(sym.segment, sym.token, sym.timeframe, &id) {
                    continue;
                }
                candles.track(sym.segment, sym.token, sym.timeframe);
                indicators.register(sym.segment, sym.token, sym.timeframe, &id, kind)?;
            }
        }

        let runtime = Self {
            template,
            primary,
            formulas,
            snapshots,
            indicators,
            candles,
            clock,
            orders,
            events,
            params: RwLock::new(params),
            position: Mutex::new(PositionState::default()),
            crossings: Mutex::new(CrossoverState::default()),
            schedule: Mutex::new(HashMap::new()),
            last_time_exit_check_ms: AtomicI64::new(0),
        };
        runtime.run_params(ParamTrigger::OnceAtStart);
        Ok(runtime)
    }

    pub fn template(&self) -> &StrategyTemplate {
        &self.template
    }

    pub fn segment(&self) -> Segment {
        self.primary.segment
    }

    pub fn token(&self) -> u32 {
        self.primary.token
    }

    /// True when the tick belongs to any bound symbol.
    pub fn watches(&self, segment: Segment, token: u32) -> bool {
        self.template.symbols.iter().any(|s| s.segment == segment && s.token == token)
    }

    pub fn params(&self) -> HashMap<String, f64> {
        self.params.read().unwrap().clone()
    }

    /// Overwrite one parameter. Lock enforcement happens in the
    /// supervisor; the runtime applies whatever it is told.
    pub fn set_param(&self, key: &str, value: f64) {
        self.params.write().unwrap().insert(key.to_string(), value);
        self.emit(StrategyEvent::ParamUpdated { key: key.to_string(), value });
    }

    pub fn metrics(&self) -> StrategyMetrics {
        let snap = self.snapshots.snapshot(self.segment(), self.token());
        let pos = self.position.lock().unwrap();
        StrategyMetrics {
            ltp: snap.ltp,
            unrealized_pnl: self.open_pnl(&pos),
            realized_pnl: pos.realized_pnl,
            trades_today: pos.trades_today,
            has_position: pos.has_position,
            entry_price: pos.entry_price,
            halted: pos.halted,
        }
    }

    pub fn position(&self) -> PositionState {
        self.position.lock().unwrap().clone()
    }

    /// Clear daily counters at session start.
    pub fn reset_daily(&self) {
        let mut pos = self.position.lock().unwrap();
        pos.trades_today = 0;
        pos.realized_pnl = 0.0;
        pos.halted = false;
        drop(pos);
        self.crossings.lock().unwrap().reset();
    }

    /// Per-tick pipeline.
    pub fn on_tick(&self) {
        if self.position.lock().unwrap().halted {
            return;
        }
        let snap = self.snapshots.snapshot(self.segment(), self.token());
        if !snap.is_initialized() || snap.ltp <= 0.0 {
            return;
        }

        self.run_params(ParamTrigger::EveryTick);

        // Risk before signals: a breached limit exits regardless of what
        // the exit condition says.
        {
            let mut pos = self.position.lock().unwrap();
            if pos.has_position && !pos.exit_in_progress {
                let breach = self.risk_breach(&mut pos, snap.ltp);
                drop(pos);
                if let Some(reason) = breach {
                    self.exit_position(reason);
                    if reason == ExitReason::DailyLoss {
                        self.halt("daily loss limit breached");
                    }
                    return;
                }
            }
        }

        // The entry tree is evaluated even when entry is blocked so its
        // crossover state tracks the market; a crossing during a block is
        // consumed, not deferred.
        let entry_fired = self.condition_true(self.template.entry.as_ref(), &snap);
        if entry_fired && self.entry_allowed() {
            self.enter_position();
            return;
        }

        let pos = self.position.lock().unwrap();
        let may_exit = pos.has_position && !pos.exit_in_progress;
        drop(pos);
        if may_exit && self.condition_true(self.template.exit.as_ref(), &snap) {
            self.exit_position(ExitReason::Signal);
        }
    }

    /// Candle-close hook: recompute `OnCandleClose` parameters whose
    /// timeframe filter matches.
    pub fn on_candle_close(&self, timeframe: Timeframe, _candle: &Candle) {
        if self.position.lock().unwrap().halted {
            return;
        }
        for p in &self.template.parameters {
            if p.trigger != ParamTrigger::OnCandleClose {
                continue;
            }
            let wanted = p
                .timeframe
                .as_deref()
                .and_then(Timeframe::parse)
                .unwrap_or(self.primary.timeframe);
            if wanted == timeframe {
                self.eval_param(&p.key, &p.formula);
            }
        }
    }

    /// Timer hook, expected roughly once per second: scheduled parameters
    /// and the square-off check.
    pub fn on_timer(&self) {
        if self.position.lock().unwrap().halted {
            return;
        }
        let now_ms = self.clock.now_millis();

        for p in &self.template.parameters {
            if p.trigger != ParamTrigger::OnSchedule {
                continue;
            }
            let due = {
                let mut schedule = self.schedule.lock().unwrap();
                let last = schedule.entry(p.key.clone()).or_insert(0);
                if now_ms - *last >= (p.schedule_secs as i64) * 1000 {
                    *last = now_ms;
                    true
                } else {
                    false
                }
            };
            if due {
                self.eval_param(&p.key, &p.formula);
            }
        }

        let last_check = self.last_time_exit_check_ms.load(Ordering::Relaxed);
        if now_ms - last_check >= TIME_EXIT_CHECK_SECS * 1000 {
            self.last_time_exit_check_ms.store(now_ms, Ordering::Relaxed);
            self.check_time_exit();
        }
    }

    /// Close any open position and stop trading; used by the supervisor on
    /// stop and delete.
    pub fn square_off(&self, reason: ExitReason) {
        let pos = self.position.lock().unwrap();
        let open = pos.has_position && !pos.exit_in_progress;
        drop(pos);
        if open {
            self.exit_position(reason);
        }
    }

    // ---------------------------------------------------------------------

    fn entry_allowed(&self) -> bool {
        let pos = self.position.lock().unwrap();
        if pos.has_position || pos.entry_signal_fired || pos.exit_in_progress {
            return false;
        }
        if let Some(max) = self.template.risk.max_daily_trades
            && pos.trades_today >= max
        {
            return false;
        }
        if pos.last_exit_ms > 0 {
            let now_ms = self.clock.now_millis();
            if now_ms - pos.last_exit_ms < REENTRY_COOLDOWN_SECS * 1000 {
                return false;
            }
        }
        true
    }

    fn condition_true(&self, node: Option<&ConditionNode>, snap: &UnifiedState) -> bool {
        let Some(node) = node else {
            return false;
        };
        let params = self.params.read().unwrap().clone();
        let mut crossings = self.crossings.lock().unwrap();
        let mut resolve = |operand: &Operand| self.resolve_operand(operand, snap, &params);
        node.evaluate(&mut resolve, &mut crossings)
    }

    /// Place one entry order per trade slot; slots without a live price
    /// are skipped. One firing signal counts as one trade.
    fn enter_position(&self) {
        let quantity = self.template.order.quantity;
        let mut legs = Vec::new();
        for sym in self.template.trade_slots() {
            let snap = self.snapshots.snapshot(sym.segment, sym.token);
            if !snap.is_initialized() || snap.ltp <= 0.0 {
                log::warn!("{}: {} has no price, leg skipped", self.template.name, sym.slot);
                continue;
            }
            let side = sym.entry_side();
            let order = self.build_order(sym.segment, sym.token, side, quantity, &snap);
            self.orders.submit(&order);
            log::info!(
                "{} entry {:?} {}@{} on {} ({}:{})",
                self.template.name,
                side,
                quantity,
                snap.ltp,
                sym.slot,
                sym.segment,
                sym.token
            );
            self.emit(StrategyEvent::Entry { token: sym.token, side, quantity, price: snap.ltp });
            legs.push(PositionLeg {
                slot: sym.slot.clone(),
                segment: sym.segment,
                token: sym.token,
                side,
                quantity,
                entry_price: snap.ltp,
            });
        }
        if legs.is_empty() {
            return;
        }

        {
            let mut pos = self.position.lock().unwrap();
            pos.has_position = true;
            pos.entry_signal_fired = true;
            pos.entry_price = legs[0].entry_price;
            pos.quantity = quantity;
            pos.trades_today += 1;
            pos.legs = legs;
        }
        self.run_params(ParamTrigger::OnEntry);
    }

    /// Close every open leg at its own market.
    fn exit_position(&self, reason: ExitReason) {
        let legs = {
            let mut pos = self.position.lock().unwrap();
            if !pos.has_position || pos.exit_in_progress {
                return;
            }
            pos.exit_in_progress = true;
            pos.legs.clone()
        };

        let mut total_pnl = 0.0;
        for leg in &legs {
            let snap = self.snapshots.snapshot(leg.segment, leg.token);
            let exit_price = if snap.ltp > 0.0 { snap.ltp } else { leg.entry_price };
            let order =
                self.build_order(leg.segment, leg.token, leg.side.opposite(), leg.quantity, &snap);
            self.orders.submit(&order);
            let pnl = leg_pnl(leg, exit_price);
            total_pnl += pnl;
            log::info!(
                "{} exit ({}) {}@{} on {} pnl {:.2}",
                self.template.name,
                reason.as_str(),
                leg.quantity,
                exit_price,
                leg.slot,
                pnl
            );
            self.emit(StrategyEvent::Exit { token: leg.token, reason, price: exit_price, pnl });
        }

        {
            let mut pos = self.position.lock().unwrap();
            pos.realized_pnl += total_pnl;
            pos.has_position = false;
            pos.entry_signal_fired = false;
            pos.exit_in_progress = false;
            pos.entry_price = 0.0;
            pos.quantity = 0;
            pos.legs.clear();
            pos.trailing_armed = false;
            pos.best_price = 0.0;
            pos.last_exit_ms = self.clock.now_millis();
        }
        self.run_params(ParamTrigger::OnExit);
    }

    fn halt(&self, reason: &str) {
        self.position.lock().unwrap().halted = true;
        log::warn!("{} halted: {reason}", self.template.name);
        self.emit(StrategyEvent::RiskHalt { reason: reason.to_string() });
    }

    fn build_order(
        &self,
        segment: Segment,
        token: u32,
        side: OrderSide,
        quantity: u32,
        snap: &UnifiedState,
    ) -> OrderRequest {
        let limit = pricing::limit_price(self.template.order.pricing, side, snap);
        let mut order = match limit {
            Some(price) => OrderRequest::limit(segment, token, side, quantity, price),
            None => OrderRequest::market(segment, token, side, quantity),
        };
        order.product_type = self.template.order.product_type.clone();
        order
    }

    /// Open PnL summed over the legs at their live prices.
    fn open_pnl(&self, pos: &PositionState) -> f64 {
        pos.legs
            .iter()
            .map(|leg| leg_pnl(leg, self.snapshots.snapshot(leg.segment, leg.token).ltp))
            .sum()
    }

    /// Daily loss over all legs, then percent checks on the primary leg.
    /// The move percent is sign-inverted for short entries so a rising
    /// price on a short reads as adverse. Mutates the position's trailing
    /// bookkeeping.
    fn risk_breach(&self, pos: &mut PositionState, ltp: f64) -> Option<ExitReason> {
        let risk = &self.template.risk;
        let side = self.primary.entry_side();

        if let Some(max_loss) = risk.max_daily_loss_rs {
            let total = pos.realized_pnl + self.open_pnl(pos);
            if total < -max_loss {
                return Some(ExitReason::DailyLoss);
            }
        }
        if pos.entry_price > 0.0 {
            let move_pct =
                (ltp - pos.entry_price) / pos.entry_price * 100.0 * side.sign();
            if let Some(sl) = risk.stop_loss_pct
                && move_pct <= -sl
            {
                return Some(ExitReason::StopLoss);
            }
            if let Some(target) = risk.target_pct
                && move_pct >= target
            {
                return Some(ExitReason::Target);
            }
            if let (Some(trigger), Some(amount)) =
                (risk.trailing_trigger_pct, risk.trailing_amount_pct)
            {
                if !pos.trailing_armed && move_pct >= trigger {
                    pos.trailing_armed = true;
                    pos.best_price = ltp;
                }
                if pos.trailing_armed {
                    if (ltp - pos.best_price) * side.sign() > 0.0 {
                        pos.best_price = ltp;
                    }
                    let retrace_pct =
                        (pos.best_price - ltp) / pos.best_price * 100.0 * side.sign();
                    if retrace_pct >= amount {
                        return Some(ExitReason::TrailingStop);
                    }
                }
            }
        }
        None
    }

    fn check_time_exit(&self) {
        let Some(spec) = self.template.risk.time_exit.as_deref() else {
            return;
        };
        let Some(exit_minutes) = parse_hhmm(spec) else {
            return;
        };
        let ist = FixedOffset::east_opt(5 * 3600 + 1800).expect("IST offset");
        let now = self.clock.now().with_timezone(&ist);
        let now_minutes = now.hour() * 60 + now.minute();
        if now_minutes < exit_minutes {
            return;
        }
        let pos = self.position.lock().unwrap();
        let open = pos.has_position && !pos.exit_in_progress;
        drop(pos);
        if open {
            self.exit_position(ExitReason::TimeExit);
        }
    }

    fn run_params(&self, trigger: ParamTrigger) {
        for p in &self.template.parameters {
            if p.trigger == trigger {
                self.eval_param(&p.key, &p.formula);
            }
        }
    }

    fn formula_context<'a>(&'a self, params: &'a HashMap<String, f64>) -> LiveFormulaContext<'a> {
        LiveFormulaContext {
            params,
            indicators: &self.indicators,
            snapshots: self.snapshots.as_ref(),
            symbols: &self.template.symbols,
            primary: &self.primary,
            portfolio: self.portfolio_view(),
        }
    }

    fn portfolio_view(&self) -> PortfolioView {
        let pos = self.position.lock().unwrap();
        let mut net_premium = 0.0;
        let mut net_delta = 0.0;
        for leg in &pos.legs {
            let snap = self.snapshots.snapshot(leg.segment, leg.token);
            let signed_qty = f64::from(leg.quantity) * leg.side.sign();
            net_premium += leg.entry_price * signed_qty;
            net_delta += snap.delta * signed_qty;
        }
        PortfolioView { mtm: pos.realized_pnl + self.open_pnl(&pos), net_premium, net_delta }
    }

    fn eval_param(&self, key: &str, formula: &str) {
        if formula.trim().is_empty() {
            return;
        }
        let params = self.params.read().unwrap().clone();
        let ctx = self.formula_context(&params);
        match self.formulas.evaluate(formula, &ctx) {
            Ok(value) => {
                self.params.write().unwrap().insert(key.to_string(), value);
            }
            Err(e) => log::debug!("{} param {key}: {e}", self.template.name),
        }
    }

    fn resolve_operand(
        &self,
        operand: &Operand,
        snap: &UnifiedState,
        params: &HashMap<String, f64>,
    ) -> Option<f64> {
        let key = match operand {
            Operand::Constant(n) => return Some(*n),
            Operand::Key(k) => k.as_str(),
        };
        // A `@slot` suffix reads the field off another bound symbol:
        // `P_LTP@REF_1`, `I_RSI_MAIN@REF_1`. Unqualified keys read the
        // primary slot.
        let (key, slot) = match key.split_once('@') {
            Some((base, slot)) => (base, Some(slot)),
            None => (key, None),
        };
        let sym: &SymbolDefinition = match slot {
            Some(s) => self.template.symbol(s)?,
            None => &self.primary,
        };
        let owned;
        let snap = match slot {
            Some(_) => {
                owned = self.snapshots.snapshot(sym.segment, sym.token);
                &owned
            }
            None => snap,
        };

        if let Some(field) = key.strip_prefix("P_") {
            return match field {
                "LTP" => Some(snap.ltp),
                "OPEN" => Some(snap.open),
                "HIGH" => Some(snap.high),
                "LOW" => Some(snap.low),
                "CLOSE" => Some(snap.prev_close),
                "ATP" => Some(snap.average_price),
                "VOLUME" => Some(snap.volume as f64),
                "BID" => Some(snap.best_bid()),
                "ASK" => Some(snap.best_ask()),
                "SPREAD" => Some(snap.spread()),
                "CHANGE_PCT" => Some(snap.percent_change),
                _ => None,
            };
        }
        if let Some(id) = key.strip_prefix("I_") {
            return self.indicators.value(sym.segment, sym.token, sym.timeframe, id);
        }
        if let Some(field) = key.strip_prefix("C_") {
            let last = self
                .candles
                .recent(sym.segment, sym.token, sym.timeframe, 1)
                .into_iter()
                .next()?;
            return match field {
                "OPEN" => Some(last.open),
                "HIGH" => Some(last.high),
                "LOW" => Some(last.low),
                "CLOSE" => Some(last.close),
                "VOLUME" => Some(last.volume as f64),
                "OI" => Some(last.open_interest as f64),
                _ => None,
            };
        }
        if let Some(field) = key.strip_prefix("R_") {
            let pos = self.position.lock().unwrap();
            return match field {
                "PNL" => Some(self.open_pnl(&pos)),
                "REALIZED_PNL" => Some(pos.realized_pnl),
                "ENTRY_PRICE" => Some(pos.entry_price),
                "QTY" => Some(f64::from(pos.quantity)),
                "TRADES" => Some(f64::from(pos.trades_today)),
                _ => None,
            };
        }
        if let Some(name) = key.strip_prefix("F_") {
            let source = self.template.formulas.get(name)?;
            let ctx = self.formula_context(params);
            return self.formulas.evaluate(source, &ctx).ok();
        }
        if let Some(field) = key.strip_prefix("G_") {
            return match field {
                // stored as a fraction, surfaced in percent
                "IV" => Some(snap.implied_volatility * 100.0),
                "DELTA" => Some(snap.delta),
                "GAMMA" => Some(snap.gamma),
                "VEGA" => Some(snap.vega),
                "THETA" => Some(snap.theta),
                "RHO" => Some(snap.rho),
                "THEO" => Some(snap.theoretical_price),
                "OI" => Some(snap.open_interest as f64),
                _ => None,
            };
        }
        if let Some(name) = key.strip_prefix("S_") {
            return params.get(name).copied();
        }
        if let Some(field) = key.strip_prefix("T_") {
            let ist = FixedOffset::east_opt(5 * 3600 + 1800).expect("IST offset");
            let now = self.clock.now().with_timezone(&ist);
            return match field {
                // HH*100 + MM, comparable against literals like 1515
                "HHMM" => Some(f64::from(now.hour() * 100 + now.minute())),
                "EPOCH" => Some(self.clock.now_secs() as f64),
                _ => None,
            };
        }
        key.parse().ok()
    }

    fn emit(&self, event: StrategyEvent) {
        if let Some(cb) = &self.events {
            cb(&event);
        }
    }
}

fn leg_pnl(leg: &PositionLeg, ltp: f64) -> f64 {
    if leg.entry_price <= 0.0 || ltp <= 0.0 {
        return 0.0;
    }
    (ltp - leg.entry_price) * f64::from(leg.quantity) * leg.side.sign()
}

fn parse_hhmm(spec: &str) -> Option<u32> {
    let (h, m) = spec.split_once(':')?;
    let h: u32 = h.trim().parse().ok()?;
    let m: u32 = m.trim().parse().ok()?;
    (h < 24 && m < 60).then_some(h * 60 + m)
}

fn resolve_slot<'a>(
    template: &'a StrategyTemplate,
    slot: Option<&str>,
    primary: &'a SymbolDefinition,
) -> Result<&'a SymbolDefinition, StrategyError> {
    match slot {
        Some(s) => template
            .symbol(s)
            .ok_or_else(|| StrategyError::InvalidTemplate(format!("unknown symbol slot '{s}'"))),
        None => Ok(primary),
    }
}

/// Build an `IndicatorKind` from a template definition, resolving
/// `{{param}}` placeholders in its numeric fields.
fn indicator_kind(
    template: &StrategyTemplate,
    def: &crate::template::IndicatorDef,
) -> Result<IndicatorKind, StrategyError> {
    let num = |field: &Option<String>, default: f64| {
        template.resolve_placeholder(field.as_deref(), default) as usize
    };
    let period = num(&def.period, 14.0);
    let kind = match def.kind.to_ascii_uppercase().as_str() {
        "SMA" => IndicatorKind::Sma { period },
        "EMA" => IndicatorKind::Ema { period },
        "RSI" => IndicatorKind::Rsi { period },
        "MACD" => IndicatorKind::Macd {
            fast: num(&def.fast, 12.0),
            slow: num(&def.slow, 26.0),
            signal: num(&def.signal, 9.0),
        },
        "BB" => IndicatorKind::Bollinger {
            period: num(&def.period, 20.0),
            multiplier: def.multiplier.unwrap_or(2.0),
        },
        "ATR" => IndicatorKind::Atr { period },
        "STOCH" => IndicatorKind::Stochastic {
            k_period: num(&def.k_period, 14.0),
            d_period: num(&def.d_period, 3.0),
        },
        "ADX" => IndicatorKind::Adx { period },
        "OBV" => IndicatorKind::Obv,
        "VOLUME" => IndicatorKind::Volume { period },
        other => {
            return Err(StrategyError::InvalidTemplate(format!(
                "unknown indicator kind '{other}'"
            )));
        }
    };
    Ok(kind)
}

/// `(name, slot, numeric args)` of every indicator function a formula
/// calls.
fn indicator_calls(expr: &Expr) -> Vec<(String, Option<String>, Vec<f64>)> {
    let mut out = Vec::new();
    walk_calls(expr, &mut out);
    out
}

fn walk_calls(expr: &Expr, out: &mut Vec<(String, Option<String>, Vec<f64>)>) {
    match expr {
        Expr::Number(_) | Expr::Variable(_) => {}
        Expr::Unary { operand, .. } => walk_calls(operand, out),
        Expr::Binary { left, right, .. } => {
            walk_calls(left, out);
            walk_calls(right, out);
        }
        Expr::Ternary { cond, then, otherwise } => {
            walk_calls(cond, out);
            walk_calls(then, out);
            walk_calls(otherwise, out);
        }
        Expr::Call { name, args } => {
            if is_indicator_function(name) {
                let slot = args.first().and_then(|a| match a {
                    Arg::Symbol(s) => Some(s.clone()),
                    Arg::Expr(_) => None,
                });
                let nums = args
                    .iter()
                    .filter_map(|a| match a {
                        Arg::Expr(Expr::Number(n)) => Some(*n),
                        _ => None,
                    })
                    .collect();
                out.push((name.clone(), slot, nums));
            }
            for arg in args {
                if let Arg::Expr(e) = arg {
                    walk_calls(e, out);
                }
            }
        }
    }
}
