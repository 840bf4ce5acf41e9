//! Normalized feed updates
//!
//! The wire decoder turns every exchange message into one or more
//! `UnifiedUpdate` records. Each message kind carries only the fields the
//! exchange populates in that message — the store applies them without
//! touching fields the kind does not own.

use crate::segment::Segment;
use crate::state::{DEPTH_LEVELS, DepthLevel};
use serde::{Deserialize, Serialize};

/// Message kind discriminant, useful for routing and counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum UpdateKind {
    Touchline,
    Depth,
    Ticker,
    Lpp,
    Index,
    IndustryIndex,
    SessionState,
    ClosePrice,
    OpenInterest,
}

/// Last-trade + OHLC + status field set.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TouchlineUpdate {
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
    pub net_change_indicator: char,
    pub total_buy_qty: f64,
    pub total_sell_qty: f64,
    pub trading_status: u16,
    pub book_type: u16,
}

/// Five-level order book on both sides.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DepthUpdate {
    pub bids: [DepthLevel; DEPTH_LEVELS],
    pub asks: [DepthLevel; DEPTH_LEVELS],
    pub total_buy_qty: f64,
    pub total_sell_qty: f64,
}

impl DepthUpdate {
    /// True when no level on either side carries data.
    pub fn is_empty(&self) -> bool {
        self.bids.iter().all(DepthLevel::is_empty) && self.asks.iter().all(DepthLevel::is_empty)
    }
}

/// Fill-by-fill ticker record with open interest.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TickerUpdate {
    pub fill_price: f64,
    pub fill_volume: u32,
    pub open_interest: i64,
    pub day_hi_oi: i64,
    pub day_lo_oi: i64,
    pub market_type: u16,
}

/// Circuit-limit (price protection) bands.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LppUpdate {
    pub upper_band: f64,
    pub lower_band: f64,
}

/// Broadcast index record; values arrive x100 and are scaled at decode.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IndexUpdate {
    pub name: String,
    pub value: f64,
    pub high: f64,
    pub low: f64,
    pub open: f64,
    pub close: f64,
    pub percent_change: f64,
    pub yearly_high: f64,
    pub yearly_low: f64,
    pub up_moves: u32,
    pub down_moves: u32,
    pub market_cap: f64,
    pub net_change_indicator: char,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IndustryIndexUpdate {
    pub name: String,
    pub value: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionStateUpdate {
    pub trading_status: u16,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClosePriceUpdate {
    pub close: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OpenInterestUpdate {
    pub open_interest: i64,
    pub oi_value: f64,
    pub oi_change: i64,
}

/// Tagged payload of a normalized update.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum UpdateBody {
    Touchline(TouchlineUpdate),
    Depth(DepthUpdate),
    Ticker(TickerUpdate),
    Lpp(LppUpdate),
    Index(IndexUpdate),
    IndustryIndex(IndustryIndexUpdate),
    SessionState(SessionStateUpdate),
    ClosePrice(ClosePriceUpdate),
    OpenInterest(OpenInterestUpdate),
}

/// One normalized record emitted by the wire decoder.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnifiedUpdate {
    pub segment: Segment,
    pub token: u32,
    pub body: UpdateBody,
}

impl UnifiedUpdate {
    pub fn new(segment: Segment, token: u32, body: UpdateBody) -> Self {
        Self { segment, token, body }
    }

    pub fn kind(&self) -> UpdateKind {
        match &self.body {
            UpdateBody::Touchline(_) => UpdateKind::Touchline,
            UpdateBody::Depth(_) => UpdateKind::Depth,
            UpdateBody::Ticker(_) => UpdateKind::Ticker,
            UpdateBody::Lpp(_) => UpdateKind::Lpp,
            UpdateBody::Index(_) => UpdateKind::Index,
            UpdateBody::IndustryIndex(_) => UpdateKind::IndustryIndex,
            UpdateBody::SessionState(_) => UpdateKind::SessionState,
            UpdateBody::ClosePrice(_) => UpdateKind::ClosePrice,
            UpdateBody::OpenInterest(_) => UpdateKind::OpenInterest,
        }
    }

    /// Last traded price when the body carries one.
    pub fn ltp(&self) -> Option<f64> {
        match &self.body {
            UpdateBody::Touchline(t) => Some(t.ltp),
            UpdateBody::Ticker(t) => Some(t.fill_price),
            _ => None,
        }
    }
}
