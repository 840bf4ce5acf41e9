//! NSE broadcast decoding
//!
//! NSE CM and F&O share the 7xxx broadcast family. All multi-byte fields are
//! big-endian; prices arrive in paise and index values scaled x100.
//!
//! Handled transaction codes:
//! - 7200  touchline + market-by-price depth
//! - 7208  depth-only snapshot, up to 2 tokens per packet
//! - 7202  ticker with open interest, up to 17 records
//! - 7207  broadcast indices, up to 6 records
//! - 7203  industry indices, up to 17 records
//! - 7220  price protection (circuit) bands, up to 25 records
//! - 7206  system information (market session status)
//!
//! Other codes in the family are administrative and skipped.

use crate::bytes::Wire;
use crate::error::FeedError;
use arka_core::{
    DEPTH_LEVELS, DepthLevel, DepthUpdate, IndexUpdate, IndustryIndexUpdate, LppUpdate, Segment,
    SessionStateUpdate, TickerUpdate, TouchlineUpdate, UnifiedUpdate, UpdateBody,
};

/// Broadcast header length.
const HEADER_LEN: usize = 40;
/// Transaction code offset inside the header.
const TRANS_CODE_OFFSET: usize = 10;

const TC_MBO_MBP: i16 = 7200;
const TC_ONLY_MBP: i16 = 7208;
const TC_TICKER: i16 = 7202;
const TC_INDICES: i16 = 7207;
const TC_INDUSTRY_INDICES: i16 = 7203;
const TC_LPP_RANGE: i16 = 7220;
const TC_SYSTEM_INFO: i16 = 7206;

fn paise(v: u32) -> f64 {
    v as f64 / 100.0
}

fn signed_paise(v: i32) -> f64 {
    v as f64 / 100.0
}

/// Index values are broadcast x100.
fn index_points(v: i32) -> f64 {
    v as f64 / 100.0
}

/// Decode one NSE datagram into normalized updates.
///
/// `segment` must be `NseCm` or `NseFo`; both venues speak the same
/// broadcast family.
pub fn decode(segment: Segment, buf: &[u8]) -> Result<Vec<UnifiedUpdate>, FeedError> {
    let w = Wire::new(segment.as_str(), buf);
    w.require(HEADER_LEN)?;
    let trans_code = w.i16_be(TRANS_CODE_OFFSET)?;

    match trans_code {
        TC_MBO_MBP => decode_7200(segment, &w),
        TC_ONLY_MBP => decode_7208(segment, &w),
        TC_TICKER => decode_7202(segment, &w),
        TC_INDICES => decode_7207(segment, &w),
        TC_INDUSTRY_INDICES => decode_7203(segment, &w),
        TC_LPP_RANGE => decode_7220(segment, &w),
        TC_SYSTEM_INFO => decode_7206(segment, &w),
        other => {
            log::trace!("{}: skipping transaction code {}", segment, other);
            Ok(Vec::new())
        }
    }
}

/// 7200 MS_BCAST_MBO_MBP: one token, touchline + 5x5 depth + totals + OHLC.
fn decode_7200(segment: Segment, w: &Wire) -> Result<Vec<UnifiedUpdate>, FeedError> {
    w.require(409)?;

    let token = w.i32_be(40)? as u32;
    let indicator = w.char_at(56)?;
    let net_change_mag = paise(w.u32_be(57)?);
    let net_change = if indicator == '-' { -net_change_mag } else { net_change_mag };

    let touchline = TouchlineUpdate {
        ltp: paise(w.u32_be(52)?),
        open: paise(w.u32_be(397)?),
        high: paise(w.u32_be(401)?),
        low: paise(w.u32_be(405)?),
        prev_close: paise(w.u32_be(393)?),
        average_price: paise(w.u32_be(69)?),
        volume: w.u32_be(48)? as u64,
        turnover: 0.0,
        last_trade_qty: w.u32_be(61)?,
        last_trade_time: w.i32_be(65)? as i64,
        net_change,
        net_change_indicator: indicator,
        total_buy_qty: w.f64_be(375)?,
        total_sell_qty: w.f64_be(383)?,
        trading_status: w.u16_be(46)?,
        book_type: w.u16_be(44)?,
    };

    let mut depth = DepthUpdate {
        total_buy_qty: touchline.total_buy_qty,
        total_sell_qty: touchline.total_sell_qty,
        ..Default::default()
    };
    // Ten 10-byte MBP records at 275: first five bids, next five asks.
    for i in 0..DEPTH_LEVELS * 2 {
        let base = 275 + i * 10;
        let level = DepthLevel::new(paise(w.u32_be(base + 4)?), w.u32_be(base)?, w.u16_be(base + 8)?);
        if i < DEPTH_LEVELS {
            depth.bids[i] = level;
        } else {
            depth.asks[i - DEPTH_LEVELS] = level;
        }
    }

    let mut out = vec![UnifiedUpdate::new(segment, token, UpdateBody::Touchline(touchline))];
    // An all-zero book must not clobber depth installed by a 7208.
    if !depth.is_empty() {
        out.push(UnifiedUpdate::new(segment, token, UpdateBody::Depth(depth)));
    }
    Ok(out)
}

/// 7208 MS_BCAST_ONLY_MBP: up to two 214-byte records.
fn decode_7208(segment: Segment, w: &Wire) -> Result<Vec<UnifiedUpdate>, FeedError> {
    const MAX_RECORDS: usize = 2;
    const RECORD_LEN: usize = 214;
    const FIRST: usize = 42;

    let count = w.u16_be(40)? as usize;
    if count > MAX_RECORDS {
        return Err(FeedError::protocol(
            segment.as_str(),
            40,
            format!("7208 record count {count} exceeds {MAX_RECORDS}"),
        ));
    }
    w.require(FIRST + count * RECORD_LEN)?;

    let mut out = Vec::with_capacity(count * 2);
    for r in 0..count {
        let b = FIRST + r * RECORD_LEN;
        let token = w.i32_be(b)? as u32;
        let indicator = w.char_at(b + 16)?;
        let net_change = signed_paise(w.i32_be(b + 18)?);

        let touchline = TouchlineUpdate {
            ltp: paise(w.u32_be(b + 12)?),
            open: paise(w.u32_be(b + 202)?),
            high: paise(w.u32_be(b + 206)?),
            low: paise(w.u32_be(b + 210)?),
            prev_close: paise(w.u32_be(b + 198)?),
            average_price: paise(w.u32_be(b + 30)?),
            volume: w.u32_be(b + 8)? as u64,
            turnover: 0.0,
            last_trade_qty: w.u32_be(b + 22)?,
            last_trade_time: w.i32_be(b + 26)? as i64,
            net_change,
            net_change_indicator: indicator,
            total_buy_qty: w.f64_be(b + 180)?,
            total_sell_qty: w.f64_be(b + 188)?,
            trading_status: w.u16_be(b + 6)?,
            book_type: w.u16_be(b + 4)?,
        };

        let mut depth = DepthUpdate {
            total_buy_qty: touchline.total_buy_qty,
            total_sell_qty: touchline.total_sell_qty,
            ..Default::default()
        };
        // Ten 12-byte MBP_INFORMATION entries at record offset 56.
        for i in 0..DEPTH_LEVELS * 2 {
            let e = b + 56 + i * 12;
            let level =
                DepthLevel::new(paise(w.u32_be(e + 4)?), w.u32_be(e)?, w.u16_be(e + 8)?);
            if i < DEPTH_LEVELS {
                depth.bids[i] = level;
            } else {
                depth.asks[i - DEPTH_LEVELS] = level;
            }
        }

        out.push(UnifiedUpdate::new(segment, token, UpdateBody::Touchline(touchline)));
        out.push(UnifiedUpdate::new(segment, token, UpdateBody::Depth(depth)));
    }
    Ok(out)
}

/// 7202 ticker: up to 17 26-byte records with open interest.
fn decode_7202(segment: Segment, w: &Wire) -> Result<Vec<UnifiedUpdate>, FeedError> {
    const MAX_RECORDS: usize = 17;
    const RECORD_LEN: usize = 26;
    const FIRST: usize = 42;

    let count = w.u16_be(40)? as usize;
    if count > MAX_RECORDS {
        return Err(FeedError::protocol(
            segment.as_str(),
            40,
            format!("7202 record count {count} exceeds {MAX_RECORDS}"),
        ));
    }
    w.require(FIRST + count * RECORD_LEN)?;

    let mut out = Vec::with_capacity(count);
    for r in 0..count {
        let b = FIRST + r * RECORD_LEN;
        let ticker = TickerUpdate {
            fill_price: paise(w.u32_be(b + 6)?),
            fill_volume: w.u32_be(b + 10)?,
            open_interest: w.u32_be(b + 14)? as i64,
            day_hi_oi: w.u32_be(b + 18)? as i64,
            day_lo_oi: w.u32_be(b + 22)? as i64,
            market_type: w.u16_be(b + 4)?,
        };
        out.push(UnifiedUpdate::new(segment, w.u32_be(b)?, UpdateBody::Ticker(ticker)));
    }
    Ok(out)
}

/// 7207 broadcast indices: up to 6 71-byte MS_INDICES records.
///
/// Indices carry no token on the wire; updates are emitted with `token = 0`
/// and the index name, which the store resolves against its metadata.
fn decode_7207(segment: Segment, w: &Wire) -> Result<Vec<UnifiedUpdate>, FeedError> {
    const MAX_RECORDS: usize = 6;
    const RECORD_LEN: usize = 71;
    const FIRST: usize = 42;

    let count = w.u16_be(40)? as usize;
    if count > MAX_RECORDS {
        return Err(FeedError::protocol(
            segment.as_str(),
            40,
            format!("7207 record count {count} exceeds {MAX_RECORDS}"),
        ));
    }
    w.require(FIRST + count * RECORD_LEN)?;

    let mut out = Vec::with_capacity(count);
    for r in 0..count {
        let b = FIRST + r * RECORD_LEN;
        let index = IndexUpdate {
            name: w.fixed_str(b, 21)?,
            value: index_points(w.i32_be(b + 21)?),
            high: index_points(w.i32_be(b + 25)?),
            low: index_points(w.i32_be(b + 29)?),
            open: index_points(w.i32_be(b + 33)?),
            close: index_points(w.i32_be(b + 37)?),
            percent_change: index_points(w.i32_be(b + 41)?),
            yearly_high: index_points(w.i32_be(b + 45)?),
            yearly_low: index_points(w.i32_be(b + 49)?),
            up_moves: w.u32_be(b + 53)?,
            down_moves: w.u32_be(b + 57)?,
            market_cap: w.f64_be(b + 61)?,
            net_change_indicator: w.char_at(b + 69)?,
        };
        out.push(UnifiedUpdate::new(segment, 0, UpdateBody::Index(index)));
    }
    Ok(out)
}

/// 7203 industry indices: up to 17 25-byte records.
fn decode_7203(segment: Segment, w: &Wire) -> Result<Vec<UnifiedUpdate>, FeedError> {
    const MAX_RECORDS: usize = 17;
    const RECORD_LEN: usize = 25;
    const FIRST: usize = 42;

    let count = w.u16_be(40)? as usize;
    if count > MAX_RECORDS {
        return Err(FeedError::protocol(
            segment.as_str(),
            40,
            format!("7203 record count {count} exceeds {MAX_RECORDS}"),
        ));
    }
    w.require(FIRST + count * RECORD_LEN)?;

    let mut out = Vec::with_capacity(count);
    for r in 0..count {
        let b = FIRST + r * RECORD_LEN;
        let update = IndustryIndexUpdate {
            name: w.fixed_str(b, 21)?,
            value: index_points(w.i32_be(b + 21)?),
        };
        out.push(UnifiedUpdate::new(segment, 0, UpdateBody::IndustryIndex(update)));
    }
    Ok(out)
}

/// 7220 price protection ranges: up to 25 12-byte records.
fn decode_7220(segment: Segment, w: &Wire) -> Result<Vec<UnifiedUpdate>, FeedError> {
    const MAX_RECORDS: usize = 25;
    const RECORD_LEN: usize = 12;
    const FIRST: usize = 44;

    let count = w.u32_be(40)? as usize;
    if count > MAX_RECORDS {
        return Err(FeedError::protocol(
            segment.as_str(),
            40,
            format!("7220 record count {count} exceeds {MAX_RECORDS}"),
        ));
    }
    w.require(FIRST + count * RECORD_LEN)?;

    let mut out = Vec::with_capacity(count);
    for r in 0..count {
        let b = FIRST + r * RECORD_LEN;
        let lpp = LppUpdate {
            upper_band: paise(w.u32_be(b + 4)?),
            lower_band: paise(w.u32_be(b + 8)?),
        };
        out.push(UnifiedUpdate::new(segment, w.u32_be(b)?, UpdateBody::Lpp(lpp)));
    }
    Ok(out)
}

/// 7206 system information: normal market session status.
fn decode_7206(segment: Segment, w: &Wire) -> Result<Vec<UnifiedUpdate>, FeedError> {
    w.require(42)?;
    let session = SessionStateUpdate { trading_status: w.u16_be(40)? };
    Ok(vec![UnifiedUpdate::new(segment, 0, UpdateBody::SessionState(session))])
}

#[cfg(test)]
mod tests {
    use super::*;
    use arka_core::UpdateKind;

    fn header(trans_code: i16, len: usize) -> Vec<u8> {
        let mut buf = vec![0u8; len];
        buf[TRANS_CODE_OFFSET..TRANS_CODE_OFFSET + 2].copy_from_slice(&trans_code.to_be_bytes());
        buf
    }

    fn put_u32(buf: &mut [u8], off: usize, v: u32) {
        buf[off..off + 4].copy_from_slice(&v.to_be_bytes());
    }

    fn put_u16(buf: &mut [u8], off: usize, v: u16) {
        buf[off..off + 2].copy_from_slice(&v.to_be_bytes());
    }

    #[test]
    fn test_7200_touchline() {
        let mut buf = header(TC_MBO_MBP, 410);
        put_u32(&mut buf, 40, 49508);
        put_u32(&mut buf, 52, 2_205_025); // 22050.25 in paise
        put_u32(&mut buf, 48, 1_200_000);
        put_u32(&mut buf, 397, 2_200_000); // open 22000.00
        buf[56] = b'+';

        let updates = decode(Segment::NseFo, &buf).unwrap();
        assert_eq!(updates.len(), 1); // zero depth suppressed
        assert_eq!(updates[0].token, 49508);
        match &updates[0].body {
            UpdateBody::Touchline(t) => {
                assert!((t.ltp - 22050.25).abs() < 1e-9);
                assert!((t.open - 22000.0).abs() < 1e-9);
                assert_eq!(t.volume, 1_200_000);
            }
            other => panic!("expected touchline, got {other:?}"),
        }
    }

    #[test]
    fn test_7200_with_depth_emits_two_updates() {
        let mut buf = header(TC_MBO_MBP, 410);
        put_u32(&mut buf, 40, 49508);
        put_u32(&mut buf, 52, 100_00);
        // first bid level: qty 75, price 99.95, 3 orders
        put_u32(&mut buf, 275, 75);
        put_u32(&mut buf, 279, 9995);
        put_u16(&mut buf, 283, 3);

        let updates = decode(Segment::NseFo, &buf).unwrap();
        assert_eq!(updates.len(), 2);
        match &updates[1].body {
            UpdateBody::Depth(d) => {
                assert_eq!(d.bids[0].quantity, 75);
                assert!((d.bids[0].price - 99.95).abs() < 1e-9);
                assert_eq!(d.bids[0].orders, 3);
                assert!(d.asks[0].is_empty());
            }
            other => panic!("expected depth, got {other:?}"),
        }
    }

    #[test]
    fn test_7208_record_count_limit() {
        let mut buf = header(TC_ONLY_MBP, 470);
        put_u16(&mut buf, 40, 3);
        assert!(decode(Segment::NseFo, &buf).is_err());
    }

    #[test]
    fn test_7202_ticker() {
        let mut buf = header(TC_TICKER, 42 + 26);
        put_u16(&mut buf, 40, 1);
        put_u32(&mut buf, 42, 59182);
        put_u32(&mut buf, 48, 1_850_50); // fill price
        put_u32(&mut buf, 52, 25);
        put_u32(&mut buf, 56, 4_500_000); // OI

        let updates = decode(Segment::NseFo, &buf).unwrap();
        assert_eq!(updates.len(), 1);
        assert_eq!(updates[0].kind(), UpdateKind::Ticker);
        match &updates[0].body {
            UpdateBody::Ticker(t) => {
                assert!((t.fill_price - 1850.50).abs() < 1e-9);
                assert_eq!(t.fill_volume, 25);
                assert_eq!(t.open_interest, 4_500_000);
            }
            other => panic!("expected ticker, got {other:?}"),
        }
    }

    #[test]
    fn test_7207_index_scaling() {
        let mut buf = header(TC_INDICES, 42 + 71);
        put_u16(&mut buf, 40, 1);
        buf[42..42 + 8].copy_from_slice(b"NIFTY 50");
        buf[42 + 21..42 + 25].copy_from_slice(&2_205_012i32.to_be_bytes());

        let updates = decode(Segment::NseCm, &buf).unwrap();
        assert_eq!(updates.len(), 1);
        match &updates[0].body {
            UpdateBody::Index(i) => {
                assert_eq!(i.name, "NIFTY 50");
                assert!((i.value - 22050.12).abs() < 1e-9);
            }
            other => panic!("expected index, got {other:?}"),
        }
    }

    #[test]
    fn test_7220_lpp() {
        let mut buf = header(TC_LPP_RANGE, 44 + 12);
        put_u32(&mut buf, 40, 1);
        put_u32(&mut buf, 44, 49508);
        put_u32(&mut buf, 48, 2_310_000);
        put_u32(&mut buf, 52, 1_890_000);

        let updates = decode(Segment::NseFo, &buf).unwrap();
        match &updates[0].body {
            UpdateBody::Lpp(l) => {
                assert!((l.upper_band - 23100.0).abs() < 1e-9);
                assert!((l.lower_band - 18900.0).abs() < 1e-9);
            }
            other => panic!("expected lpp, got {other:?}"),
        }
    }

    #[test]
    fn test_unknown_transcode_skipped() {
        let buf = header(6511, 64);
        assert!(decode(Segment::NseFo, &buf).unwrap().is_empty());
    }

    #[test]
    fn test_truncated_datagram_rejected() {
        let buf = header(TC_MBO_MBP, 100);
        assert!(decode(Segment::NseFo, &buf).is_err());
    }
}
