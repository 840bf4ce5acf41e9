//! Limit price formation
//!
//! Prices are formed from the live book, rounded to the instrument tick
//! and clamped into the exchange price protection band when one is known.
//! An empty book falls back to the last traded price.

use crate::template::PricingMode;
use arka_core::{OrderSide, UnifiedState};

/// Ticks added beyond the far touch for aggressive pricing.
pub const PRICE_BUFFER_TICKS: f64 = 2.0;

/// Tick when the contract master carries none.
pub const DEFAULT_TICK_SIZE: f64 = 0.05;

fn round_to_tick(price: f64, tick: f64) -> f64 {
    // Snap to paise precision so fp artifacts (100.05000000000001) don't
    // leak into emitted limit prices.
    ((price / tick).round() * tick * 100.0).round() / 100.0
}

fn clamp_to_band(price: f64, snap: &UnifiedState) -> f64 {
    let mut p = price;
    if snap.lower_circuit > 0.0 {
        p = p.max(snap.lower_circuit);
    }
    if snap.upper_circuit > 0.0 {
        p = p.min(snap.upper_circuit);
    }
    p
}

/// Limit price for `mode`; `None` means send a market order.
pub fn limit_price(mode: PricingMode, side: OrderSide, snap: &UnifiedState) -> Option<f64> {
    if mode == PricingMode::Market {
        return None;
    }
    let tick = if snap.tick_size > 0.0 { snap.tick_size } else { DEFAULT_TICK_SIZE };
    let bid = snap.best_bid();
    let ask = snap.best_ask();

    let raw = if bid <= 0.0 || ask <= 0.0 {
        snap.ltp
    } else {
        match (mode, side) {
            (PricingMode::Passive, OrderSide::Buy) => bid,
            (PricingMode::Passive, OrderSide::Sell) => ask,
            (PricingMode::Aggressive, OrderSide::Buy) => ask + PRICE_BUFFER_TICKS * tick,
            (PricingMode::Aggressive, OrderSide::Sell) => bid - PRICE_BUFFER_TICKS * tick,
            (PricingMode::Smart, _) => {
                let spread = ask - bid;
                if spread <= PRICE_BUFFER_TICKS * tick {
                    // tight book: just cross
                    match side {
                        OrderSide::Buy => ask + PRICE_BUFFER_TICKS * tick,
                        OrderSide::Sell => bid - PRICE_BUFFER_TICKS * tick,
                    }
                } else {
                    (bid + ask) / 2.0
                }
            }
            (PricingMode::Market, _) => unreachable!("handled above"),
        }
    };

    if raw <= 0.0 {
        return None;
    }
    let price = clamp_to_band(round_to_tick(raw, tick), snap);
    (price > 0.0).then_some(price)
}

#[cfg(test)]
mod tests {
    use super::*;
    use arka_core::DepthLevel;

    fn book(bid: f64, ask: f64, ltp: f64) -> UnifiedState {
        let mut s = UnifiedState::sentinel();
        s.token = 1;
        s.ltp = ltp;
        s.tick_size = 0.05;
        if bid > 0.0 {
            s.bids[0] = DepthLevel::new(bid, 100, 1);
        }
        if ask > 0.0 {
            s.asks[0] = DepthLevel::new(ask, 100, 1);
        }
        s
    }

    #[test]
    fn test_market_mode_has_no_price() {
        let snap = book(99.95, 100.05, 100.0);
        assert_eq!(limit_price(PricingMode::Market, OrderSide::Buy, &snap), None);
    }

    #[test]
    fn test_passive_joins_touch() {
        let snap = book(99.95, 100.05, 100.0);
        assert_eq!(limit_price(PricingMode::Passive, OrderSide::Buy, &snap), Some(99.95));
        assert_eq!(limit_price(PricingMode::Passive, OrderSide::Sell, &snap), Some(100.05));
    }

    #[test]
    fn test_aggressive_crosses_with_buffer() {
        let snap = book(99.95, 100.05, 100.0);
        // ask + 2 ticks
        let p = limit_price(PricingMode::Aggressive, OrderSide::Buy, &snap).unwrap();
        assert!((p - 100.15).abs() < 1e-9);
        let p = limit_price(PricingMode::Aggressive, OrderSide::Sell, &snap).unwrap();
        assert!((p - 99.85).abs() < 1e-9);
    }

    #[test]
    fn test_smart_mid_on_wide_spread() {
        let snap = book(99.0, 101.0, 100.0);
        let p = limit_price(PricingMode::Smart, OrderSide::Buy, &snap).unwrap();
        assert!((p - 100.0).abs() < 1e-9);

        // tight spread crosses instead
        let snap = book(99.95, 100.0, 100.0);
        let p = limit_price(PricingMode::Smart, OrderSide::Buy, &snap).unwrap();
        assert!((p - 100.10).abs() < 1e-9);
    }

    #[test]
    fn test_empty_book_falls_back_to_ltp() {
        let snap = book(0.0, 0.0, 100.0);
        assert_eq!(limit_price(PricingMode::Passive, OrderSide::Buy, &snap), Some(100.0));
        let snap = book(0.0, 0.0, 0.0);
        assert_eq!(limit_price(PricingMode::Passive, OrderSide::Buy, &snap), None);
    }

    #[test]
    fn test_band_clamp() {
        let mut snap = book(99.95, 100.05, 100.0);
        snap.upper_circuit = 100.10;
        snap.lower_circuit = 99.90;
        let p = limit_price(PricingMode::Aggressive, OrderSide::Buy, &snap).unwrap();
        assert!((p - 100.10).abs() < 1e-9);
        let p = limit_price(PricingMode::Aggressive, OrderSide::Sell, &snap).unwrap();
        assert!((p - 99.90).abs() < 1e-9);
    }

    #[test]
    fn test_rounding_to_tick() {
        let snap = book(99.0, 101.07, 100.0);
        // mid 100.035 rounds to 100.05
        let p = limit_price(PricingMode::Smart, OrderSide::Buy, &snap).unwrap();
        assert!((p - 100.05).abs() < 1e-9);
    }
}
