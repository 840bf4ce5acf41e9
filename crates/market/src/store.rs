//! Segment price stores
//!
//! One fixed-size dense array per segment, indexed by
//! `token - min_token`, guarded by a single `RwLock`. Writers (one
//! receiver thread per feed) hold the exclusive lock for the duration of an
//! `apply_*`; readers copy one `UnifiedState` under the shared lock.
//!
//! The copy returned by `snapshot` is the unit of consistency. No method
//! ever hands out a reference into the locked array.

use arka_clock::Clock;
use arka_core::{
    ClosePriceUpdate, ContractInfo, DepthUpdate, IndexUpdate, InstrumentKind, LppUpdate,
    OpenInterestUpdate, Segment, TickerUpdate, TouchlineUpdate, UnifiedState, UnifiedUpdate,
    UpdateBody,
};
use arka_ports::{SnapshotSource, StoreError};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

/// Token range for one segment store.
#[derive(Debug, Clone, Copy)]
pub struct StoreConfig {
    pub min_token: u32,
    pub max_token: u32,
}

impl StoreConfig {
    pub fn for_segment(segment: Segment) -> Self {
        let (min_token, max_token) = segment.default_token_range();
        Self { min_token, max_token }
    }

    pub fn capacity(&self) -> usize {
        (self.max_token - self.min_token + 1) as usize
    }
}

/// Dense live store for one segment.
pub struct SegmentStore {
    segment: Segment,
    config: StoreConfig,
    slots: RwLock<Vec<UnifiedState>>,
    /// Index-name lookup for broadcasts that carry no token (NSE 7207/7203).
    index_tokens: RwLock<HashMap<String, u32>>,
    initialized: RwLock<bool>,
    ignored_updates: AtomicU64,
    clock: Arc<dyn Clock>,
}

impl SegmentStore {
    pub fn new(segment: Segment, config: StoreConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            segment,
            config,
            slots: RwLock::new(Vec::new()),
            index_tokens: RwLock::new(HashMap::new()),
            initialized: RwLock::new(false),
            ignored_updates: AtomicU64::new(0),
            clock,
        }
    }

    pub fn segment(&self) -> Segment {
        self.segment
    }

    /// Updates dropped for out-of-range or uninitialized tokens.
    pub fn ignored_updates(&self) -> u64 {
        self.ignored_updates.load(Ordering::Relaxed)
    }

    /// One-time slot allocation from the segment's master token list.
    /// Fills the static section of each slot; index instruments also feed
    /// the name lookup used by token-less index broadcasts.
    pub fn initialize(&self, contracts: &[ContractInfo]) -> Result<(), StoreError> {
        let mut initialized = self.initialized.write().unwrap();
        if *initialized {
            return Err(StoreError::AlreadyInitialized(self.segment));
        }

        let mut slots = self.slots.write().unwrap();
        *slots = vec![UnifiedState::sentinel(); self.config.capacity()];

        let mut names = self.index_tokens.write().unwrap();
        let mut installed = 0usize;
        for c in contracts {
            let Some(idx) = self.index_of(c.token) else {
                log::warn!(
                    "{}: master token {} outside {}..={}",
                    self.segment,
                    c.token,
                    self.config.min_token,
                    self.config.max_token
                );
                continue;
            };
            let slot = &mut slots[idx];
            slot.token = c.token;
            slot.segment_code = self.segment.code();
            slot.symbol = c.symbol.clone();
            slot.display_name = c.display_name.clone();
            slot.lot_size = c.lot_size;
            slot.tick_size = c.tick_size;
            slot.strike = c.strike;
            slot.option_type = c.option_kind.map(|k| k.code()).unwrap_or("XX").to_string();
            slot.instrument_type = match c.kind {
                InstrumentKind::Equity => 0,
                InstrumentKind::Index => 1,
                InstrumentKind::Option => 2,
                InstrumentKind::Future => 3,
            };
            slot.asset_token = c.asset_token;
            if let Some(expiry) = c.expiry {
                slot.expiry = expiry.format("%d%b%Y").to_string().to_uppercase();
            }
            if c.kind == InstrumentKind::Index {
                names.insert(c.display_name.to_uppercase(), c.token);
                names.insert(c.symbol.to_uppercase(), c.token);
            }
            installed += 1;
        }

        *initialized = true;
        log::info!("{}: initialized {} of {} slots", self.segment, installed, slots.len());
        Ok(())
    }

    fn index_of(&self, token: u32) -> Option<usize> {
        if token < self.config.min_token || token > self.config.max_token {
            return None;
        }
        Some((token - self.config.min_token) as usize)
    }

    /// Copy-out read. Out-of-range or uninitialized tokens return the
    /// zeroed sentinel.
    pub fn snapshot(&self, token: u32) -> UnifiedState {
        let Some(idx) = self.index_of(token) else {
            return UnifiedState::sentinel();
        };
        let slots = self.slots.read().unwrap();
        match slots.get(idx) {
            Some(slot) if slot.is_initialized() => slot.clone(),
            _ => UnifiedState::sentinel(),
        }
    }

    /// Apply one normalized update. Unknown tokens are counted, not errors.
    pub fn apply(&self, update: &UnifiedUpdate) {
        let token = match &update.body {
            // Token-less index broadcasts resolve through the name map.
            UpdateBody::Index(ix) if update.token == 0 => {
                match self.index_tokens.read().unwrap().get(&ix.name.to_uppercase()) {
                    Some(t) => *t,
                    None => {
                        self.ignored_updates.fetch_add(1, Ordering::Relaxed);
                        return;
                    }
                }
            }
            UpdateBody::IndustryIndex(ix) => {
                match self.index_tokens.read().unwrap().get(&ix.name.to_uppercase()) {
                    Some(t) => *t,
                    None => {
                        self.ignored_updates.fetch_add(1, Ordering::Relaxed);
                        return;
                    }
                }
            }
            // Session state applies to the venue, not a token.
            UpdateBody::SessionState(_) => 0,
            _ => update.token,
        };

        if let UpdateBody::SessionState(s) = &update.body {
            log::info!("{}: session status {}", self.segment, s.trading_status);
            return;
        }

        let Some(idx) = self.index_of(token) else {
            self.ignored_updates.fetch_add(1, Ordering::Relaxed);
            return;
        };

        let ts_ns = self.clock.now_nanos();
        let mut slots = self.slots.write().unwrap();
        let Some(slot) = slots.get_mut(idx).filter(|s| s.is_initialized()) else {
            self.ignored_updates.fetch_add(1, Ordering::Relaxed);
            return;
        };

        match &update.body {
            UpdateBody::Touchline(t) => apply_touchline(slot, t),
            UpdateBody::Depth(d) => apply_depth(slot, d),
            UpdateBody::Ticker(t) => apply_ticker(slot, t),
            UpdateBody::Lpp(l) => apply_lpp(slot, l),
            UpdateBody::Index(ix) => apply_index(slot, ix),
            UpdateBody::IndustryIndex(ix) => {
                slot.ltp = ix.value;
            }
            UpdateBody::ClosePrice(c) => apply_close(slot, c),
            UpdateBody::OpenInterest(oi) => apply_open_interest(slot, oi),
            UpdateBody::SessionState(_) => unreachable!("handled above"),
        }

        // Exchanges are authoritative: out-of-order packets are applied
        // as-is, but the stamp still advances.
        slot.last_packet_ts_ns = slot.last_packet_ts_ns.max(ts_ns);
        slot.update_count += 1;
    }

    /// Greeks write-back from the greeks service.
    #[allow(clippy::too_many_arguments)]
    pub fn apply_greeks(
        &self,
        token: u32,
        iv: f64,
        bid_iv: f64,
        ask_iv: f64,
        delta: f64,
        gamma: f64,
        vega: f64,
        theta: f64,
        rho: f64,
        theoretical_price: f64,
        ts_millis: i64,
    ) {
        let Some(idx) = self.index_of(token) else {
            self.ignored_updates.fetch_add(1, Ordering::Relaxed);
            return;
        };
        let mut slots = self.slots.write().unwrap();
        let Some(slot) = slots.get_mut(idx).filter(|s| s.is_initialized()) else {
            self.ignored_updates.fetch_add(1, Ordering::Relaxed);
            return;
        };
        slot.implied_volatility = iv;
        slot.bid_iv = bid_iv;
        slot.ask_iv = ask_iv;
        slot.delta = delta;
        slot.gamma = gamma;
        slot.vega = vega;
        slot.theta = theta;
        slot.rho = rho;
        slot.theoretical_price = theoretical_price;
        slot.greeks_calculated = true;
        slot.last_greeks_update_time = ts_millis;
    }
}

fn apply_touchline(slot: &mut UnifiedState, t: &TouchlineUpdate) {
    slot.ltp = t.ltp;
    slot.open = t.open;
    slot.high = t.high;
    slot.low = t.low;
    slot.prev_close = t.prev_close;
    slot.average_price = t.average_price;
    slot.volume = t.volume;
    if t.turnover > 0.0 {
        slot.turnover = t.turnover;
    }
    slot.last_trade_qty = t.last_trade_qty;
    slot.last_trade_time = t.last_trade_time;
    slot.net_change = t.net_change;
    slot.net_change_indicator = t.net_change_indicator;
    slot.percent_change = if t.prev_close > 0.0 { t.net_change / t.prev_close * 100.0 } else { 0.0 };
    slot.total_buy_qty = t.total_buy_qty;
    slot.total_sell_qty = t.total_sell_qty;
    slot.trading_status = t.trading_status;
    slot.book_type = t.book_type;
}

fn apply_depth(slot: &mut UnifiedState, d: &DepthUpdate) {
    slot.bids = d.bids;
    slot.asks = d.asks;
    slot.total_buy_qty = d.total_buy_qty;
    slot.total_sell_qty = d.total_sell_qty;
}

fn apply_ticker(slot: &mut UnifiedState, t: &TickerUpdate) {
    slot.ltp = t.fill_price;
    slot.last_trade_qty = t.fill_volume;
    let prev_oi = slot.open_interest;
    slot.open_interest = t.open_interest;
    if prev_oi > 0 {
        slot.open_interest_change = t.open_interest - prev_oi;
    }
}

fn apply_lpp(slot: &mut UnifiedState, l: &LppUpdate) {
    slot.upper_circuit = l.upper_band;
    slot.lower_circuit = l.lower_band;
}

fn apply_index(slot: &mut UnifiedState, ix: &IndexUpdate) {
    slot.ltp = ix.value;
    slot.open = ix.open;
    slot.high = ix.high;
    slot.low = ix.low;
    slot.prev_close = ix.close;
    slot.percent_change = ix.percent_change;
    slot.net_change = if ix.close > 0.0 { ix.value - ix.close } else { 0.0 };
    slot.net_change_indicator = ix.net_change_indicator;
}

fn apply_close(slot: &mut UnifiedState, c: &ClosePriceUpdate) {
    slot.prev_close = c.close;
}

fn apply_open_interest(slot: &mut UnifiedState, oi: &OpenInterestUpdate) {
    let prev = slot.open_interest;
    slot.open_interest = oi.open_interest;
    slot.open_interest_change = if oi.oi_change != 0 {
        oi.oi_change
    } else if prev > 0 {
        oi.open_interest - prev
    } else {
        0
    };
}

/// The four segment stores behind one facade.
pub struct PriceStore {
    stores: HashMap<Segment, SegmentStore>,
}

impl PriceStore {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        let mut stores = HashMap::new();
        for segment in Segment::ALL {
            stores.insert(
                segment,
                SegmentStore::new(segment, StoreConfig::for_segment(segment), clock.clone()),
            );
        }
        Self { stores }
    }

    pub fn with_config(clock: Arc<dyn Clock>, configs: &[(Segment, StoreConfig)]) -> Self {
        let mut store = Self::new(clock.clone());
        for (segment, config) in configs {
            store.stores.insert(*segment, SegmentStore::new(*segment, *config, clock.clone()));
        }
        store
    }

    pub fn segment_store(&self, segment: Segment) -> &SegmentStore {
        // The map is populated for every segment in `new`.
        &self.stores[&segment]
    }

    pub fn initialize(
        &self,
        segment: Segment,
        contracts: &[ContractInfo],
    ) -> Result<(), StoreError> {
        self.segment_store(segment).initialize(contracts)
    }

    pub fn apply(&self, update: &UnifiedUpdate) {
        self.segment_store(update.segment).apply(update);
    }

    #[allow(clippy::too_many_arguments)]
    pub fn apply_greeks(
        &self,
        segment: Segment,
        token: u32,
        iv: f64,
        bid_iv: f64,
        ask_iv: f64,
        delta: f64,
        gamma: f64,
        vega: f64,
        theta: f64,
        rho: f64,
        theoretical_price: f64,
        ts_millis: i64,
    ) {
        self.segment_store(segment).apply_greeks(
            token,
            iv,
            bid_iv,
            ask_iv,
            delta,
            gamma,
            vega,
            theta,
            rho,
            theoretical_price,
            ts_millis,
        );
    }
}

impl SnapshotSource for PriceStore {
    fn snapshot(&self, segment: Segment, token: u32) -> UnifiedState {
        self.segment_store(segment).snapshot(token)
    }
}
