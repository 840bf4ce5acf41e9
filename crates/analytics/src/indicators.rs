//! Incremental technical indicators
//!
//! Indicators update from completed candles only, one O(1) step per bar.
//! Each registered indicator publishes one or more output keys derived from
//! its id: `MACD_1` publishes `MACD_1`, `MACD_1_SIGNAL` and `MACD_1_HIST`;
//! Bollinger publishes `_UPPER`/`_MIDDLE`/`_LOWER`; Stochastic `_K`/`_D`;
//! Volume adds `_AVG`. Outputs appear only once the indicator is ready.
//!
//! Smoothing follows the standard constructions: EMA is SMA-seeded with
//! alpha 2/(n+1), RSI and ATR use Wilder smoothing, the MACD signal line is
//! seeded with the first MACD value, Bollinger uses population standard
//! deviation.

use arka_core::{Candle, Segment, Timeframe};
use dashmap::DashMap;
use std::collections::{HashMap, VecDeque};
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum IndicatorError {
    #[error("indicator id already registered: {0}")]
    DuplicateId(String),
    #[error("invalid period {period} for {kind}")]
    InvalidPeriod { kind: &'static str, period: usize },
}

/// Which candle price a price-driven indicator reads. Range-based
/// indicators (ATR, Stochastic, ADX) always use the full bar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PriceField {
    Open,
    High,
    Low,
    #[default]
    Close,
    /// (high + low) / 2
    Hl2,
    /// (high + low + close) / 3
    Hlc3,
    /// (open + high + low + close) / 4
    Ohlc4,
}

impl PriceField {
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "open" => Some(PriceField::Open),
            "high" => Some(PriceField::High),
            "low" => Some(PriceField::Low),
            "close" => Some(PriceField::Close),
            "hl2" => Some(PriceField::Hl2),
            "hlc3" => Some(PriceField::Hlc3),
            "ohlc4" => Some(PriceField::Ohlc4),
            _ => None,
        }
    }

    pub fn extract(&self, candle: &Candle) -> f64 {
        match self {
            PriceField::Open => candle.open,
            PriceField::High => candle.high,
            PriceField::Low => candle.low,
            PriceField::Close => candle.close,
            PriceField::Hl2 => (candle.high + candle.low) / 2.0,
            PriceField::Hlc3 => (candle.high + candle.low + candle.close) / 3.0,
            PriceField::Ohlc4 => (candle.open + candle.high + candle.low + candle.close) / 4.0,
        }
    }
}

/// Indicator family plus its parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum IndicatorKind {
    Sma { period: usize },
    Ema { period: usize },
    Rsi { period: usize },
    Macd { fast: usize, slow: usize, signal: usize },
    Bollinger { period: usize, multiplier: f64 },
    Atr { period: usize },
    Stochastic { k_period: usize, d_period: usize },
    Adx { period: usize },
    Obv,
    Volume { period: usize },
}

impl IndicatorKind {
    fn name(&self) -> &'static str {
        match self {
            IndicatorKind::Sma { .. } => "SMA",
            IndicatorKind::Ema { .. } => "EMA",
            IndicatorKind::Rsi { .. } => "RSI",
            IndicatorKind::Macd { .. } => "MACD",
            IndicatorKind::Bollinger { .. } => "BB",
            IndicatorKind::Atr { .. } => "ATR",
            IndicatorKind::Stochastic { .. } => "STOCH",
            IndicatorKind::Adx { .. } => "ADX",
            IndicatorKind::Obv => "OBV",
            IndicatorKind::Volume { .. } => "VOLUME",
        }
    }

    fn validate(&self) -> Result<(), IndicatorError> {
        let bad = |period| IndicatorError::InvalidPeriod { kind: self.name(), period };
        match *self {
            IndicatorKind::Sma { period }
            | IndicatorKind::Ema { period }
            | IndicatorKind::Rsi { period }
            | IndicatorKind::Atr { period }
            | IndicatorKind::Adx { period }
            | IndicatorKind::Volume { period } => {
                if period == 0 {
                    return Err(bad(period));
                }
            }
            IndicatorKind::Macd { fast, slow, signal } => {
                if fast == 0 || slow == 0 || signal == 0 || fast >= slow {
                    return Err(bad(fast.min(slow).min(signal)));
                }
            }
            IndicatorKind::Bollinger { period, .. } => {
                if period < 2 {
                    return Err(bad(period));
                }
            }
            IndicatorKind::Stochastic { k_period, d_period } => {
                if k_period == 0 || d_period == 0 {
                    return Err(bad(k_period.min(d_period)));
                }
            }
            IndicatorKind::Obv => {}
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Per-kind incremental state
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default)]
struct SmaState {
    window: VecDeque<f64>,
    sum: f64,
}

impl SmaState {
    fn update(&mut self, period: usize, x: f64) -> Option<f64> {
        self.window.push_back(x);
        self.sum += x;
        if self.window.len() > period {
            // Pushed above, never empty here.
            if let Some(old) = self.window.pop_front() {
                self.sum -= old;
            }
        }
        (self.window.len() == period).then(|| self.sum / period as f64)
    }
}

#[derive(Debug, Clone, Default)]
struct EmaState {
    value: Option<f64>,
    seed_sum: f64,
    seed_count: usize,
}

impl EmaState {
    fn update(&mut self, period: usize, x: f64) -> Option<f64> {
        match self.value {
            Some(v) => {
                let alpha = 2.0 / (period as f64 + 1.0);
                let next = v + alpha * (x - v);
                self.value = Some(next);
                Some(next)
            }
            None => {
                self.seed_sum += x;
                self.seed_count += 1;
                if self.seed_count == period {
                    let seed = self.seed_sum / period as f64;
                    self.value = Some(seed);
                    Some(seed)
                } else {
                    None
                }
            }
        }
    }

    /// EMA seeded with the first observation instead of an SMA warm-up.
    fn update_seeded(&mut self, period: usize, x: f64) -> f64 {
        let next = match self.value {
            Some(v) => v + 2.0 / (period as f64 + 1.0) * (x - v),
            None => x,
        };
        self.value = Some(next);
        next
    }
}

#[derive(Debug, Clone, Default)]
struct RsiState {
    prev_close: Option<f64>,
    avg_gain: f64,
    avg_loss: f64,
    changes: usize,
}

impl RsiState {
    fn update(&mut self, period: usize, close: f64) -> Option<f64> {
        let prev = match self.prev_close.replace(close) {
            Some(p) => p,
            None => return None,
        };
        let change = close - prev;
        let gain = change.max(0.0);
        let loss = (-change).max(0.0);
        let n = period as f64;

        self.changes += 1;
        if self.changes <= period {
            // Simple averages over the first `period` changes.
            self.avg_gain += gain / n;
            self.avg_loss += loss / n;
            if self.changes < period {
                return None;
            }
        } else {
            self.avg_gain = (self.avg_gain * (n - 1.0) + gain) / n;
            self.avg_loss = (self.avg_loss * (n - 1.0) + loss) / n;
        }

        if self.avg_loss < 1e-10 {
            return Some(100.0);
        }
        let rs = self.avg_gain / self.avg_loss;
        Some(100.0 - 100.0 / (1.0 + rs))
    }
}

#[derive(Debug, Clone, Default)]
struct MacdState {
    fast: EmaState,
    slow: EmaState,
    signal: EmaState,
}

impl MacdState {
    /// Returns `(macd, signal, histogram)` once the slow leg is ready.
    fn update(
        &mut self,
        fast: usize,
        slow: usize,
        signal: usize,
        close: f64,
    ) -> Option<(f64, f64, f64)> {
        let f = self.fast.update(fast, close);
        let s = self.slow.update(slow, close);
        let (f, s) = (f?, s?);
        let macd = f - s;
        let sig = self.signal.update_seeded(signal, macd);
        Some((macd, sig, macd - sig))
    }
}

#[derive(Debug, Clone, Default)]
struct BollingerState {
    window: VecDeque<f64>,
}

impl BollingerState {
    /// Returns `(upper, middle, lower)` with population standard deviation.
    fn update(&mut self, period: usize, multiplier: f64, close: f64) -> Option<(f64, f64, f64)> {
        self.window.push_back(close);
        if self.window.len() > period {
            self.window.pop_front();
        }
        if self.window.len() < period {
            return None;
        }
        let n = period as f64;
        let mean = self.window.iter().sum::<f64>() / n;
        let var = self.window.iter().map(|x| (x - mean) * (x - mean)).sum::<f64>() / n;
        let band = multiplier * var.sqrt();
        Some((mean + band, mean, mean - band))
    }
}

#[derive(Debug, Clone, Default)]
struct AtrState {
    prev_close: Option<f64>,
    value: Option<f64>,
    tr_sum: f64,
    tr_count: usize,
}

impl AtrState {
    fn update(&mut self, period: usize, candle: &Candle) -> Option<f64> {
        let prev = match self.prev_close.replace(candle.close) {
            Some(p) => p,
            None => return None,
        };
        let tr = candle.true_range(prev);
        let n = period as f64;
        match self.value {
            Some(v) => {
                let next = (v * (n - 1.0) + tr) / n;
                self.value = Some(next);
                Some(next)
            }
            None => {
                self.tr_sum += tr;
                self.tr_count += 1;
                if self.tr_count == period {
                    let seed = self.tr_sum / n;
                    self.value = Some(seed);
                    Some(seed)
                } else {
                    None
                }
            }
        }
    }
}

#[derive(Debug, Clone, Default)]
struct StochasticState {
    window: VecDeque<(f64, f64)>,
    d: EmaState,
}

impl StochasticState {
    /// Returns `(%K, %D)`; %K is 50 when the window has no range.
    fn update(&mut self, k_period: usize, d_period: usize, candle: &Candle) -> Option<(f64, f64)> {
        self.window.push_back((candle.high, candle.low));
        if self.window.len() > k_period {
            self.window.pop_front();
        }
        if self.window.len() < k_period {
            return None;
        }
        let highest = self.window.iter().map(|(h, _)| *h).fold(f64::MIN, f64::max);
        let lowest = self.window.iter().map(|(_, l)| *l).fold(f64::MAX, f64::min);
        let range = highest - lowest;
        let k = if range < 1e-10 { 50.0 } else { (candle.close - lowest) / range * 100.0 };
        let d = self.d.update_seeded(d_period, k);
        Some((k, d))
    }
}

#[derive(Debug, Clone, Default)]
struct AdxState {
    prev: Option<Candle>,
    tr_sm: f64,
    plus_sm: f64,
    minus_sm: f64,
    bars: usize,
    adx: Option<f64>,
    dx_sum: f64,
    dx_count: usize,
}

impl AdxState {
    fn update(&mut self, period: usize, candle: &Candle) -> Option<f64> {
        let prev = match self.prev.replace(*candle) {
            Some(p) => p,
            None => return None,
        };
        let tr = candle.true_range(prev.close);
        let up = candle.high - prev.high;
        let down = prev.low - candle.low;
        let plus_dm = if up > down && up > 0.0 { up } else { 0.0 };
        let minus_dm = if down > up && down > 0.0 { down } else { 0.0 };

        let n = period as f64;
        self.bars += 1;
        if self.bars <= period {
            self.tr_sm += tr;
            self.plus_sm += plus_dm;
            self.minus_sm += minus_dm;
            if self.bars < period {
                return None;
            }
        } else {
            self.tr_sm = self.tr_sm - self.tr_sm / n + tr;
            self.plus_sm = self.plus_sm - self.plus_sm / n + plus_dm;
            self.minus_sm = self.minus_sm - self.minus_sm / n + minus_dm;
        }

        if self.tr_sm < 1e-10 {
            return self.adx;
        }
        let plus_di = 100.0 * self.plus_sm / self.tr_sm;
        let minus_di = 100.0 * self.minus_sm / self.tr_sm;
        let di_sum = plus_di + minus_di;
        let dx = if di_sum < 1e-10 { 0.0 } else { 100.0 * (plus_di - minus_di).abs() / di_sum };

        match self.adx {
            Some(v) => {
                let next = (v * (n - 1.0) + dx) / n;
                self.adx = Some(next);
            }
            None => {
                self.dx_sum += dx;
                self.dx_count += 1;
                if self.dx_count == period {
                    self.adx = Some(self.dx_sum / n);
                }
            }
        }
        self.adx
    }
}

#[derive(Debug, Clone, Default)]
struct ObvState {
    prev_close: Option<f64>,
    obv: f64,
}

impl ObvState {
    fn update(&mut self, candle: &Candle) -> f64 {
        if let Some(prev) = self.prev_close.replace(candle.close) {
            if candle.close > prev {
                self.obv += candle.volume as f64;
            } else if candle.close < prev {
                self.obv -= candle.volume as f64;
            }
        } else {
            self.obv = candle.volume as f64;
        }
        self.obv
    }
}

enum IndicatorState {
    Sma(SmaState),
    Ema(EmaState),
    Rsi(RsiState),
    Macd(MacdState),
    Bollinger(BollingerState),
    Atr(AtrState),
    Stochastic(StochasticState),
    Adx(AdxState),
    Obv(ObvState),
    Volume(SmaState),
}

impl IndicatorState {
    fn for_kind(kind: IndicatorKind) -> Self {
        match kind {
            IndicatorKind::Sma { .. } => IndicatorState::Sma(SmaState::default()),
            IndicatorKind::Ema { .. } => IndicatorState::Ema(EmaState::default()),
            IndicatorKind::Rsi { .. } => IndicatorState::Rsi(RsiState::default()),
            IndicatorKind::Macd { .. } => IndicatorState::Macd(MacdState::default()),
            IndicatorKind::Bollinger { .. } => IndicatorState::Bollinger(BollingerState::default()),
            IndicatorKind::Atr { .. } => IndicatorState::Atr(AtrState::default()),
            IndicatorKind::Stochastic { .. } => {
                IndicatorState::Stochastic(StochasticState::default())
            }
            IndicatorKind::Adx { .. } => IndicatorState::Adx(AdxState::default()),
            IndicatorKind::Obv => IndicatorState::Obv(ObvState::default()),
            IndicatorKind::Volume { .. } => IndicatorState::Volume(SmaState::default()),
        }
    }
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

type SeriesKey = (Segment, u32, Timeframe);

struct Registered {
    kind: IndicatorKind,
    field: PriceField,
    state: IndicatorState,
}

#[derive(Default)]
struct SeriesIndicators {
    indicators: HashMap<String, Registered>,
    outputs: HashMap<String, f64>,
}

/// Per-series indicator registry and output table.
///
/// `on_candle` is called with each completed bar for a series; `value` reads
/// an output key. Keys reference the indicator id plus the suffixes listed
/// in the module docs.
#[derive(Default)]
pub struct IndicatorEngine {
    series: DashMap<SeriesKey, SeriesIndicators>,
}

impl IndicatorEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(
        &self,
        segment: Segment,
        token: u32,
        timeframe: Timeframe,
        id: &str,
        kind: IndicatorKind,
    ) -> Result<(), IndicatorError> {
        self.register_with_field(segment, token, timeframe, id, kind, PriceField::Close)
    }

    /// Register with an explicit candle price field.
    pub fn register_with_field(
        &self,
        segment: Segment,
        token: u32,
        timeframe: Timeframe,
        id: &str,
        kind: IndicatorKind,
        field: PriceField,
    ) -> Result<(), IndicatorError> {
        kind.validate()?;
        let mut series = self.series.entry((segment, token, timeframe)).or_default();
        if series.indicators.contains_key(id) {
            return Err(IndicatorError::DuplicateId(id.to_string()));
        }
        series.indicators.insert(
            id.to_string(),
            Registered { kind, field, state: IndicatorState::for_kind(kind) },
        );
        Ok(())
    }

    pub fn remove(&self, segment: Segment, token: u32, timeframe: Timeframe, id: &str) {
        if let Some(mut series) = self.series.get_mut(&(segment, token, timeframe)) {
            series.indicators.remove(id);
            let prefix = format!("{id}_");
            series.outputs.retain(|k, _| k != id && !k.starts_with(&prefix));
        }
    }

    /// Drop every indicator for a series.
    pub fn clear_series(&self, segment: Segment, token: u32, timeframe: Timeframe) {
        self.series.remove(&(segment, token, timeframe));
    }

    /// Advance every indicator on the series by one completed bar.
    pub fn on_candle(&self, segment: Segment, token: u32, timeframe: Timeframe, candle: &Candle) {
        let Some(mut series) = self.series.get_mut(&(segment, token, timeframe)) else {
            return;
        };
        let series = &mut *series;
        for (id, reg) in series.indicators.iter_mut() {
            Self::step(id, reg, candle, &mut series.outputs);
        }
    }

    fn step(id: &str, reg: &mut Registered, candle: &Candle, out: &mut HashMap<String, f64>) {
        let price = reg.field.extract(candle);
        match (&reg.kind, &mut reg.state) {
            (IndicatorKind::Sma { period }, IndicatorState::Sma(s)) => {
                if let Some(v) = s.update(*period, price) {
                    out.insert(id.to_string(), v);
                }
            }
            (IndicatorKind::Ema { period }, IndicatorState::Ema(s)) => {
                if let Some(v) = s.update(*period, price) {
                    out.insert(id.to_string(), v);
                }
            }
            (IndicatorKind::Rsi { period }, IndicatorState::Rsi(s)) => {
                if let Some(v) = s.update(*period, price) {
                    out.insert(id.to_string(), v);
                }
            }
            (IndicatorKind::Macd { fast, slow, signal }, IndicatorState::Macd(s)) => {
                if let Some((macd, sig, hist)) = s.update(*fast, *slow, *signal, price) {
                    out.insert(id.to_string(), macd);
                    out.insert(format!("{id}_SIGNAL"), sig);
                    out.insert(format!("{id}_HIST"), hist);
                }
            }
            (IndicatorKind::Bollinger { period, multiplier }, IndicatorState::Bollinger(s)) => {
                if let Some((upper, middle, lower)) = s.update(*period, *multiplier, price) {
                    out.insert(format!("{id}_UPPER"), upper);
                    out.insert(format!("{id}_MIDDLE"), middle);
                    out.insert(format!("{id}_LOWER"), lower);
                }
            }
            (IndicatorKind::Atr { period }, IndicatorState::Atr(s)) => {
                if let Some(v) = s.update(*period, candle) {
                    out.insert(id.to_string(), v);
                }
            }
            (IndicatorKind::Stochastic { k_period, d_period }, IndicatorState::Stochastic(s)) => {
                if let Some((k, d)) = s.update(*k_period, *d_period, candle) {
                    out.insert(format!("{id}_K"), k);
                    out.insert(format!("{id}_D"), d);
                }
            }
            (IndicatorKind::Adx { period }, IndicatorState::Adx(s)) => {
                if let Some(v) = s.update(*period, candle) {
                    out.insert(id.to_string(), v);
                }
            }
            (IndicatorKind::Obv, IndicatorState::Obv(s)) => {
                out.insert(id.to_string(), s.update(candle));
            }
            (IndicatorKind::Volume { period }, IndicatorState::Volume(s)) => {
                out.insert(id.to_string(), candle.volume as f64);
                if let Some(avg) = s.update(*period, candle.volume as f64) {
                    out.insert(format!("{id}_AVG"), avg);
                }
            }
            // States are constructed from the kind in `register`.
            _ => unreachable!("indicator kind/state mismatch"),
        }
    }

    /// Read an output key; `None` until the indicator is ready.
    pub fn value(
        &self,
        segment: Segment,
        token: u32,
        timeframe: Timeframe,
        key: &str,
    ) -> Option<f64> {
        self.series
            .get(&(segment, token, timeframe))
            .and_then(|s| s.outputs.get(key).copied())
    }

    pub fn is_registered(&self, segment: Segment, token: u32, timeframe: Timeframe, id: &str) -> bool {
        self.series
            .get(&(segment, token, timeframe))
            .is_some_and(|s| s.indicators.contains_key(id))
    }
}
