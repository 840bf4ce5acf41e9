//! BSE broadcast decoding
//!
//! BSE CM and F&O share the NFCAST message family. The 36-byte packet header
//! and all body fields are little-endian; prices arrive in paise.
//!
//! Handled message types:
//! - 2020/2021  market picture (touchline + 5x5 depth + circuit bands)
//! - 2014       close price
//! - 2015       open interest
//! - 2012       index snapshot

use crate::bytes::Wire;
use crate::error::FeedError;
use arka_core::{
    ClosePriceUpdate, DEPTH_LEVELS, DepthLevel, DepthUpdate, IndexUpdate, LppUpdate,
    OpenInterestUpdate, Segment, TouchlineUpdate, UnifiedUpdate, UpdateBody,
};

/// Packet header length.
const HEADER_LEN: usize = 36;
/// Message type offset inside the header.
const MSG_TYPE_OFFSET: usize = 8;

const MT_MARKET_PICTURE: u16 = 2020;
const MT_MARKET_PICTURE_COMPLEX: u16 = 2021;
const MT_CLOSE_PRICE: u16 = 2014;
const MT_OPEN_INTEREST: u16 = 2015;
const MT_INDEX: u16 = 2012;

fn paise(v: i32) -> f64 {
    v as f64 / 100.0
}

/// Decode one BSE datagram into normalized updates.
///
/// `segment` must be `BseCm` or `BseFo`.
pub fn decode(segment: Segment, buf: &[u8]) -> Result<Vec<UnifiedUpdate>, FeedError> {
    let w = Wire::new(segment.as_str(), buf);
    w.require(HEADER_LEN)?;
    let msg_type = w.u16_le(MSG_TYPE_OFFSET)?;

    match msg_type {
        MT_MARKET_PICTURE | MT_MARKET_PICTURE_COMPLEX => decode_market_picture(segment, &w),
        MT_CLOSE_PRICE => decode_close_price(segment, &w),
        MT_OPEN_INTEREST => decode_open_interest(segment, &w),
        MT_INDEX => decode_index(segment, &w),
        other => {
            log::trace!("{}: skipping message type {}", segment, other);
            Ok(Vec::new())
        }
    }
}

/// 2020/2021 market picture: 264-byte record slots after the header,
/// terminated by a zero token or the end of the datagram.
fn decode_market_picture(segment: Segment, w: &Wire) -> Result<Vec<UnifiedUpdate>, FeedError> {
    const RECORD_LEN: usize = 264;

    let mut out = Vec::new();
    let mut b = HEADER_LEN;
    while b + RECORD_LEN <= w.len() {
        let token = w.i32_le(b)?;
        if token <= 0 {
            break;
        }
        let token = token as u32;

        let ltp = paise(w.i32_le(b + 36)?);
        let prev_close = paise(w.i32_le(b + 8)?);
        let net_change = if prev_close > 0.0 { ltp - prev_close } else { 0.0 };

        let touchline = TouchlineUpdate {
            ltp,
            open: paise(w.i32_le(b + 4)?),
            high: paise(w.i32_le(b + 12)?),
            low: paise(w.i32_le(b + 16)?),
            prev_close,
            average_price: paise(w.i32_le(b + 84)?),
            volume: w.i32_le(b + 24)?.max(0) as u64,
            turnover: paise(w.i32_le(b + 28)?),
            last_trade_qty: 0,
            last_trade_time: 0,
            net_change,
            net_change_indicator: if net_change < 0.0 { '-' } else { '+' },
            total_buy_qty: w.i32_le(b + 64)? as f64,
            total_sell_qty: w.i32_le(b + 68)? as f64,
            trading_status: 0,
            book_type: 0,
        };

        let mut depth = DepthUpdate {
            total_buy_qty: touchline.total_buy_qty,
            total_sell_qty: touchline.total_sell_qty,
            ..Default::default()
        };
        // Depth block at record offset 104: bid/ask entries interleaved,
        // 16 bytes each (price, quantity, flags).
        for i in 0..DEPTH_LEVELS * 2 {
            let e = b + 104 + i * 16;
            let level = DepthLevel::new(
                paise(w.i32_le(e)?),
                w.i32_le(e + 4)?.max(0) as u32,
                0,
            );
            if i % 2 == 0 {
                depth.bids[i / 2] = level;
            } else {
                depth.asks[i / 2] = level;
            }
        }

        let lpp = LppUpdate {
            upper_band: paise(w.i32_le(b + 80)?),
            lower_band: paise(w.i32_le(b + 76)?),
        };

        out.push(UnifiedUpdate::new(segment, token, UpdateBody::Touchline(touchline)));
        if !depth.is_empty() {
            out.push(UnifiedUpdate::new(segment, token, UpdateBody::Depth(depth)));
        }
        if lpp.upper_band > 0.0 || lpp.lower_band > 0.0 {
            out.push(UnifiedUpdate::new(segment, token, UpdateBody::Lpp(lpp)));
        }

        b += RECORD_LEN;
    }
    Ok(out)
}

/// 2014 close price: 8-byte {token, close} records until a zero token.
fn decode_close_price(segment: Segment, w: &Wire) -> Result<Vec<UnifiedUpdate>, FeedError> {
    const RECORD_LEN: usize = 8;

    let mut out = Vec::new();
    let mut b = HEADER_LEN;
    while b + RECORD_LEN <= w.len() {
        let token = w.i32_le(b)?;
        if token <= 0 {
            break;
        }
        let update = ClosePriceUpdate { close: paise(w.i32_le(b + 4)?) };
        out.push(UnifiedUpdate::new(segment, token as u32, UpdateBody::ClosePrice(update)));
        b += RECORD_LEN;
    }
    Ok(out)
}

/// 2015 open interest: declared record count at header offset 32,
/// 34-byte records.
fn decode_open_interest(segment: Segment, w: &Wire) -> Result<Vec<UnifiedUpdate>, FeedError> {
    const RECORD_LEN: usize = 34;

    let count = w.u16_le(32)? as usize;
    w.require(HEADER_LEN + count * RECORD_LEN)?;

    let mut out = Vec::with_capacity(count);
    for r in 0..count {
        let b = HEADER_LEN + r * RECORD_LEN;
        let token = w.i32_le(b)?;
        if token <= 0 {
            continue;
        }
        let update = OpenInterestUpdate {
            open_interest: w.i64_le(b + 4)?,
            oi_value: w.i64_le(b + 12)? as f64 / 100.0,
            oi_change: w.i32_le(b + 20)? as i64,
        };
        out.push(UnifiedUpdate::new(segment, token as u32, UpdateBody::OpenInterest(update)));
    }
    Ok(out)
}

/// 2012 index: 120-byte slots keyed by index token.
///
/// BSE indices carry a token, unlike the NSE 7207 broadcast; percent change
/// is derived from ltp vs close since the wire does not carry it.
fn decode_index(segment: Segment, w: &Wire) -> Result<Vec<UnifiedUpdate>, FeedError> {
    const RECORD_LEN: usize = 120;

    let mut out = Vec::new();
    let mut b = HEADER_LEN;
    while b + RECORD_LEN <= w.len() {
        let token = w.i32_le(b)?;
        if token <= 0 {
            break;
        }

        let value = paise(w.i32_le(b + 24)?);
        let close = paise(w.i32_le(b + 28)?);
        let percent_change =
            if close > 0.0 { (value - close) / close * 100.0 } else { 0.0 };

        let update = IndexUpdate {
            name: String::new(),
            value,
            high: paise(w.i32_le(b + 16)?),
            low: paise(w.i32_le(b + 20)?),
            open: paise(w.i32_le(b + 12)?),
            close,
            percent_change,
            net_change_indicator: if percent_change < 0.0 { '-' } else { '+' },
            ..Default::default()
        };
        out.push(UnifiedUpdate::new(segment, token as u32, UpdateBody::Index(update)));
        b += RECORD_LEN;
    }
    Ok(out)
}
