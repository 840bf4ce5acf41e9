//! Clock-aligned candle aggregation
//!
//! Every tick feeds all tracked timeframes for its instrument. Bars open at
//! timestamps aligned to the timeframe duration; a tick whose aligned window
//! is newer than the building bar closes that bar, appends it to the ring,
//! and fires the completion callbacks before the new bar is seeded.
//!
//! Volume on the touchline feed is cumulative for the day, so per-bar volume
//! is the delta against the last seen cumulative figure. Ticker fills carry
//! the fill quantity directly.

use arka_clock::Clock;
use arka_core::{Candle, MAX_CANDLE_HISTORY, Segment, Timeframe, UnifiedUpdate, UpdateBody};
use dashmap::DashMap;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};

/// Invoked with each completed bar. Runs synchronously on the tick thread.
pub type CandleCallback =
    Arc<dyn Fn(Segment, u32, Timeframe, &Candle) + Send + Sync>;

type SeriesKey = (Segment, u32, Timeframe);

/// In-progress bar plus cumulative-volume tracking for one series.
struct Builder {
    current: Option<Candle>,
    /// Last cumulative day volume seen on a touchline, for delta volume.
    /// The first observation only sets the baseline; pre-tracking volume
    /// must not land in the first bar.
    last_cumulative_volume: Option<u64>,
    last_open_interest: u64,
}

impl Builder {
    fn new() -> Self {
        Self { current: None, last_cumulative_volume: None, last_open_interest: 0 }
    }
}

/// Multi-timeframe OHLCV aggregation across all instruments.
pub struct CandleAggregator {
    clock: Arc<dyn Clock>,
    builders: DashMap<SeriesKey, Builder>,
    series: DashMap<SeriesKey, VecDeque<Candle>>,
    callbacks: RwLock<Vec<CandleCallback>>,
    /// Serializes completion emission so bars arrive at callbacks in order.
    emit_lock: Mutex<()>,
    bars_completed: AtomicU64,
}

impl CandleAggregator {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            builders: DashMap::new(),
            series: DashMap::new(),
            callbacks: RwLock::new(Vec::new()),
            emit_lock: Mutex::new(()),
            bars_completed: AtomicU64::new(0),
        }
    }

    /// Register a completed-bar callback. Callbacks cannot be removed; the
    /// aggregator lives for the process.
    pub fn on_complete(&self, callback: CandleCallback) {
        self.callbacks.write().unwrap().push(callback);
    }

    /// Begin building bars for a series. Idempotent.
    pub fn track(&self, segment: Segment, token: u32, timeframe: Timeframe) {
        let key = (segment, token, timeframe);
        self.builders.entry(key).or_insert_with(Builder::new);
        self.series.entry(key).or_default();
    }

    pub fn is_tracked(&self, segment: Segment, token: u32, timeframe: Timeframe) -> bool {
        self.builders.contains_key(&(segment, token, timeframe))
    }

    /// Stop tracking and drop the history for a series.
    pub fn untrack(&self, segment: Segment, token: u32, timeframe: Timeframe) {
        let key = (segment, token, timeframe);
        self.builders.remove(&key);
        self.series.remove(&key);
    }

    pub fn bars_completed(&self) -> u64 {
        self.bars_completed.load(Ordering::Relaxed)
    }

    /// Completed bars, oldest first. Empty when untracked.
    pub fn history(&self, segment: Segment, token: u32, timeframe: Timeframe) -> Vec<Candle> {
        self.series
            .get(&(segment, token, timeframe))
            .map(|s| s.iter().copied().collect())
            .unwrap_or_default()
    }

    /// The most recent completed bars, oldest first, up to `n`.
    pub fn recent(
        &self,
        segment: Segment,
        token: u32,
        timeframe: Timeframe,
        n: usize,
    ) -> Vec<Candle> {
        self.series
            .get(&(segment, token, timeframe))
            .map(|s| s.iter().rev().take(n).rev().copied().collect())
            .unwrap_or_default()
    }

    /// The bar under construction, if a tick has opened one.
    pub fn building(&self, segment: Segment, token: u32, timeframe: Timeframe) -> Option<Candle> {
        self.builders.get(&(segment, token, timeframe)).and_then(|b| b.current)
    }

    /// Feed one normalized update into every tracked timeframe for its
    /// instrument. Non-price updates are ignored.
    pub fn apply(&self, update: &UnifiedUpdate) {
        let Some(ltp) = update.ltp() else {
            return;
        };
        if ltp <= 0.0 {
            return;
        }
        let ts = self.clock.now_secs();
        for timeframe in Timeframe::ALL {
            let key = (update.segment, update.token, timeframe);
            if !self.builders.contains_key(&key) {
                continue;
            }
            self.apply_to_series(key, update, ltp, ts);
        }
    }

    fn apply_to_series(&self, key: SeriesKey, update: &UnifiedUpdate, ltp: f64, ts: i64) {
        let window = key.2.window_start(ts);
        let mut completed: Option<Candle> = None;

        if let Some(mut builder) = self.builders.get_mut(&key) {
            // Close the old bar before touching the new window.
            if let Some(current) = builder.current {
                if window > current.timestamp {
                    completed = Some(current);
                    builder.current = None;
                }
            }

            // Volume and OI deltas come off the builder before the bar is
            // borrowed mutably below.
            let volume_delta = match &update.body {
                UpdateBody::Touchline(t) => {
                    let delta = builder
                        .last_cumulative_volume
                        .filter(|last| t.volume >= *last)
                        .map_or(0, |last| t.volume - last);
                    builder.last_cumulative_volume = Some(t.volume);
                    delta
                }
                UpdateBody::Ticker(t) => {
                    if t.open_interest > 0 {
                        builder.last_open_interest = t.open_interest as u64;
                    }
                    u64::from(t.fill_volume)
                }
                _ => 0,
            };
            let open_interest = builder.last_open_interest;

            let bar = builder.current.get_or_insert_with(|| Candle::seed(window, ltp));
            bar.high = bar.high.max(ltp);
            bar.low = bar.low.min(ltp);
            bar.close = ltp;
            bar.volume += volume_delta;
            bar.open_interest = open_interest;
        }

        if let Some(bar) = completed {
            self.emit(key, bar);
        }
    }

    fn emit(&self, key: SeriesKey, bar: Candle) {
        let _guard = self.emit_lock.lock().unwrap();
        if let Some(mut series) = self.series.get_mut(&key) {
            if series.len() == MAX_CANDLE_HISTORY {
                series.pop_front();
            }
            series.push_back(bar);
        }
        self.bars_completed.fetch_add(1, Ordering::Relaxed);
        log::trace!(
            "{}:{} {} bar closed o={} h={} l={} c={} v={}",
            key.0,
            key.1,
            key.2,
            bar.open,
            bar.high,
            bar.low,
            bar.close,
            bar.volume
        );
        let callbacks = self.callbacks.read().unwrap().clone();
        for cb in callbacks {
            cb(key.0, key.1, key.2, &bar);
        }
    }

    /// Force-close the building bar for every tracked series whose window
    /// has passed. Called at session end so the final bar is not lost.
    pub fn flush(&self) {
        let keys: Vec<SeriesKey> = self.builders.iter().map(|e| *e.key()).collect();
        for key in keys {
            let completed = self
                .builders
                .get_mut(&key)
                .and_then(|mut builder| builder.current.take());
            if let Some(bar) = completed {
                self.emit(key, bar);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arka_clock::ManualClock;
    use arka_core::TouchlineUpdate;

    fn touchline(ltp: f64, volume: u64) -> UnifiedUpdate {
        UnifiedUpdate::new(
            Segment::NseFo,
            49508,
            UpdateBody::Touchline(TouchlineUpdate { ltp, volume, ..Default::default() }),
        )
    }

    fn setup() -> (Arc<ManualClock>, CandleAggregator) {
        // 09:15:00 IST on some day, aligned maths only need epoch seconds.
        let clock = Arc::new(ManualClock::at_epoch_secs(1_700_000_100));
        let agg = CandleAggregator::new(clock.clone());
        agg.track(Segment::NseFo, 49508, Timeframe::M1);
        (clock, agg)
    }

    #[test]
    fn test_bar_opens_aligned_and_tracks_ohlc() {
        let (_clock, agg) = setup();
        agg.apply(&touchline(100.0, 10));
        agg.apply(&touchline(105.0, 25));
        agg.apply(&touchline(98.0, 40));

        let bar = agg.building(Segment::NseFo, 49508, Timeframe::M1).unwrap();
        assert_eq!(bar.timestamp, 1_700_000_100); // already aligned to :00
        assert_eq!(bar.open, 100.0);
        assert_eq!(bar.high, 105.0);
        assert_eq!(bar.low, 98.0);
        assert_eq!(bar.close, 98.0);
        // first tick establishes the baseline, deltas follow
        assert_eq!(bar.volume, 30);
    }

    #[test]
    fn test_window_cross_completes_bar() {
        let (clock, agg) = setup();
        let closed = Arc::new(Mutex::new(Vec::new()));
        let closed2 = closed.clone();
        agg.on_complete(Arc::new(move |_, _, tf, bar| {
            closed2.lock().unwrap().push((tf, *bar));
        }));

        agg.apply(&touchline(100.0, 10));
        agg.apply(&touchline(101.0, 20));
        clock.advance_secs(60);
        agg.apply(&touchline(102.0, 30));

        let closed = closed.lock().unwrap();
        assert_eq!(closed.len(), 1);
        let (tf, bar) = closed[0];
        assert_eq!(tf, Timeframe::M1);
        assert_eq!(bar.close, 101.0);
        assert_eq!(bar.volume, 10);

        let building = agg.building(Segment::NseFo, 49508, Timeframe::M1).unwrap();
        assert_eq!(building.timestamp, 1_700_000_160);
        assert_eq!(building.open, 102.0);
        assert_eq!(building.volume, 10);
    }

    #[test]
    fn test_history_capped() {
        let (clock, agg) = setup();
        for i in 0..(MAX_CANDLE_HISTORY as u64 + 10) {
            agg.apply(&touchline(100.0 + i as f64, i));
            clock.advance_secs(60);
        }
        // 510 ticks close 509 bars; the ring keeps the newest 500
        let history = agg.history(Segment::NseFo, 49508, Timeframe::M1);
        assert_eq!(history.len(), MAX_CANDLE_HISTORY);
        assert_eq!(history[0].close, 109.0);
    }

    #[test]
    fn test_multiple_timeframes_from_one_tick() {
        let (clock, agg) = setup();
        agg.track(Segment::NseFo, 49508, Timeframe::M5);
        agg.apply(&touchline(100.0, 5));
        clock.advance_secs(60);
        agg.apply(&touchline(101.0, 9));

        // the 1m bar closed; the 5m bar is still building
        assert_eq!(agg.history(Segment::NseFo, 49508, Timeframe::M1).len(), 1);
        assert!(agg.history(Segment::NseFo, 49508, Timeframe::M5).is_empty());
        let m5 = agg.building(Segment::NseFo, 49508, Timeframe::M5).unwrap();
        assert_eq!(m5.close, 101.0);
    }

    #[test]
    fn test_ticker_fills_and_open_interest() {
        let (_clock, agg) = setup();
        let tick = |fill_price, fill_volume, open_interest| {
            UnifiedUpdate::new(
                Segment::NseFo,
                49508,
                UpdateBody::Ticker(arka_core::TickerUpdate {
                    fill_price,
                    fill_volume,
                    open_interest,
                    ..Default::default()
                }),
            )
        };
        // the opening tick seeds the bar and carries its fill and OI
        agg.apply(&tick(100.0, 10, 5000));
        agg.apply(&tick(101.0, 15, 5100));
        // zero OI on a fill keeps the last known figure
        agg.apply(&tick(102.0, 5, 0));

        let bar = agg.building(Segment::NseFo, 49508, Timeframe::M1).unwrap();
        assert_eq!(bar.open, 100.0);
        assert_eq!(bar.volume, 30);
        assert_eq!(bar.open_interest, 5100);
    }

    #[test]
    fn test_untracked_instrument_ignored() {
        let (_clock, agg) = setup();
        let other = UnifiedUpdate::new(
            Segment::NseFo,
            50_000,
            UpdateBody::Touchline(TouchlineUpdate { ltp: 5.0, ..Default::default() }),
        );
        agg.apply(&other);
        assert!(agg.building(Segment::NseFo, 50_000, Timeframe::M1).is_none());
    }

    #[test]
    fn test_flush_emits_partial_bar() {
        let (_clock, agg) = setup();
        agg.apply(&touchline(100.0, 10));
        agg.flush();
        let history = agg.history(Segment::NseFo, 49508, Timeframe::M1);
        assert_eq!(history.len(), 1);
        assert!(agg.building(Segment::NseFo, 49508, Timeframe::M1).is_none());
    }

    #[test]
    fn test_recent_returns_tail() {
        let (clock, agg) = setup();
        for i in 0..5u64 {
            agg.apply(&touchline(100.0 + i as f64, i));
            clock.advance_secs(60);
        }
        // ticks 0..4 close four bars; the fifth is still building
        let tail = agg.recent(Segment::NseFo, 49508, Timeframe::M1, 2);
        assert_eq!(tail.len(), 2);
        assert_eq!(tail[0].close, 102.0);
        assert_eq!(tail[1].close, 103.0);
    }
}
