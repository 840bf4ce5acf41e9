//! Unified per-instrument state
//!
//! One contiguous record per `(segment, token)` — the single source of truth
//! for live market data. The price store hands out copies of this record;
//! a snapshot with `token == 0` is the sentinel for "not initialized".

use crate::segment::Segment;
use serde::{Deserialize, Serialize};

/// Depth levels per side.
pub const DEPTH_LEVELS: usize = 5;

/// One order book level.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct DepthLevel {
    pub price: f64,
    pub quantity: u32,
    pub orders: u16,
}

impl DepthLevel {
    pub fn new(price: f64, quantity: u32, orders: u16) -> Self {
        Self { price, quantity, orders }
    }

    pub fn is_empty(&self) -> bool {
        self.price == 0.0 && self.quantity == 0
    }
}

/// Live unified state for one instrument.
///
/// Field groups mirror the exchange feeds: identity/static (filled once at
/// initialization), dynamic price, depth, derivatives, status and
/// diagnostics. Prices are natural units (rupees); quantities unsigned.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UnifiedState {
    // Identity & static
    pub token: u32,
    pub segment_code: i32,
    pub symbol: String,
    pub display_name: String,
    pub lot_size: u32,
    pub tick_size: f64,
    /// Expiry in DDMMMYYYY form; empty for cash instruments.
    pub expiry: String,
    pub strike: f64,
    /// "CE", "PE" or "XX".
    pub option_type: String,
    pub instrument_type: i32,
    /// Underlying reference token; <= 0 when resolved by symbol.
    pub asset_token: i64,

    // Dynamic price
    pub ltp: f64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub prev_close: f64,
    pub average_price: f64,
    pub volume: u64,
    pub turnover: f64,
    pub last_trade_qty: u32,
    pub last_trade_time: i64,
    pub net_change: f64,
    pub percent_change: f64,
    /// '+' / '-' / ' ' as sent by the exchange.
    pub net_change_indicator: char,

    // Depth
    pub bids: [DepthLevel; DEPTH_LEVELS],
    pub asks: [DepthLevel; DEPTH_LEVELS],
    pub total_buy_qty: f64,
    pub total_sell_qty: f64,

    // Derivatives
    pub open_interest: i64,
    pub open_interest_change: i64,
    pub implied_volatility: f64,
    pub bid_iv: f64,
    pub ask_iv: f64,
    pub delta: f64,
    pub gamma: f64,
    pub vega: f64,
    pub theta: f64,
    pub rho: f64,
    pub theoretical_price: f64,
    pub greeks_calculated: bool,
    pub last_greeks_update_time: i64,

    // Status & limits
    pub trading_status: u16,
    pub book_type: u16,
    pub upper_circuit: f64,
    pub lower_circuit: f64,

    // Diagnostics
    pub last_packet_ts_ns: i64,
    pub update_count: u64,
}

impl UnifiedState {
    /// Empty sentinel returned for uninitialized or out-of-range tokens.
    pub fn sentinel() -> Self {
        Self { net_change_indicator: ' ', ..Self::default() }
    }

    pub fn is_initialized(&self) -> bool {
        self.token != 0
    }

    pub fn segment(&self) -> Option<Segment> {
        Segment::from_code(self.segment_code)
    }

    pub fn best_bid(&self) -> f64 {
        self.bids[0].price
    }

    pub fn best_ask(&self) -> f64 {
        self.asks[0].price
    }

    /// Best-ask minus best-bid; 0 when either side is empty.
    pub fn spread(&self) -> f64 {
        if self.bids[0].is_empty() || self.asks[0].is_empty() {
            0.0
        } else {
            self.asks[0].price - self.bids[0].price
        }
    }
}
