//! End-to-end pipeline scenarios: raw datagrams in, snapshots, candles,
//! indicators, greeks and strategy orders out.

use arka_analytics::greeks::black_scholes;
use arka_analytics::IvSolver;
use arka_clock::ManualClock;
use arka_ports::SnapshotSource;
use arka_core::{
    ContractInfo, InstrumentKind, OptionKind, OrderRequest, Segment, TouchlineUpdate,
    UnifiedUpdate, UpdateBody,
};
use arka_analytics::IndicatorEngine;
use arka_core::Timeframe;
use arka_formula::FormulaEngine;
use arka_runner::app::App;
use arka_runner::config::RunnerConfig;
use arka_runner::contracts::StaticContracts;
use arka_strategy::{
    LiveFormulaContext, OrderSink, PortfolioView, StrategyTemplate, SymbolDefinition, SymbolRole,
};
use arka_supervisor::{InMemoryRepository, StrategyState};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

// 2026-03-02 09:40 IST, a Monday inside market hours
const START_EPOCH: i64 = 1_772_424_600;

const FUTURE_TOKEN: u32 = 49508;
const OPTION_TOKEN: u32 = 49600;
const CASH_TOKEN: u32 = 26000;

#[derive(Default)]
struct CollectingSink {
    orders: Mutex<Vec<OrderRequest>>,
}

impl OrderSink for CollectingSink {
    fn submit(&self, order: &OrderRequest) {
        self.orders.lock().unwrap().push(order.clone());
    }
}

fn contract(
    token: u32,
    segment: Segment,
    symbol: &str,
    kind: InstrumentKind,
    option_kind: Option<OptionKind>,
    strike: f64,
    expiry: Option<&str>,
) -> ContractInfo {
    ContractInfo {
        token,
        segment,
        symbol: symbol.to_string(),
        display_name: symbol.to_string(),
        kind,
        option_kind,
        strike,
        expiry: expiry.and_then(ContractInfo::parse_expiry),
        lot_size: 50,
        tick_size: 0.05,
        asset_token: 0,
    }
}

fn nifty_masters() -> Vec<ContractInfo> {
    vec![
        contract(CASH_TOKEN, Segment::NseCm, "NIFTY", InstrumentKind::Index, None, 0.0, None),
        contract(
            FUTURE_TOKEN,
            Segment::NseFo,
            "NIFTY",
            InstrumentKind::Future,
            None,
            0.0,
            Some("27MAR2026"),
        ),
        contract(
            OPTION_TOKEN,
            Segment::NseFo,
            "NIFTY",
            InstrumentKind::Option,
            Some(OptionKind::Call),
            22000.0,
            Some("27MAR2026"),
        ),
    ]
}

struct Fixture {
    app: App,
    clock: Arc<ManualClock>,
    sink: Arc<CollectingSink>,
}

fn fixture() -> Fixture {
    let config: RunnerConfig = serde_json::from_str(
        r#"{
            "feeds": [
                { "segment": "NseFo", "multicast_address": "239.60.60.44", "port": 10844 }
            ]
        }"#,
    )
    .unwrap();
    let clock = Arc::new(ManualClock::at_epoch_secs(START_EPOCH));
    let sink = Arc::new(CollectingSink::default());
    let app = App::build(
        &config,
        Arc::new(StaticContracts::new(nifty_masters())),
        clock.clone(),
        sink.clone(),
        Arc::new(InMemoryRepository::new()),
    );
    Fixture { app, clock, sink }
}

fn touchline(segment: Segment, token: u32, ltp: f64, volume: u64) -> UnifiedUpdate {
    UnifiedUpdate::new(
        segment,
        token,
        UpdateBody::Touchline(TouchlineUpdate { ltp, volume, ..Default::default() }),
    )
}

// ---------------------------------------------------------------------------
// datagram builders

fn put_u16(buf: &mut [u8], off: usize, v: u16) {
    buf[off..off + 2].copy_from_slice(&v.to_be_bytes());
}

fn put_u32(buf: &mut [u8], off: usize, v: u32) {
    buf[off..off + 4].copy_from_slice(&v.to_be_bytes());
}

fn nse_header(trans_code: i16, len: usize) -> Vec<u8> {
    let mut buf = vec![0u8; len];
    buf[10..12].copy_from_slice(&trans_code.to_be_bytes());
    buf
}

/// 7200 touchline-only datagram (zero depth).
fn datagram_7200(token: u32, ltp_paise: u32, volume: u32) -> Vec<u8> {
    let mut buf = nse_header(7200, 410);
    put_u32(&mut buf, 40, token);
    put_u32(&mut buf, 48, volume);
    put_u32(&mut buf, 52, ltp_paise);
    buf[56] = b'+';
    buf
}

/// 7208 one-record depth snapshot with a populated first bid level.
fn datagram_7208(token: u32, ltp_paise: u32, bid_paise: u32, bid_qty: u32) -> Vec<u8> {
    let mut buf = nse_header(7208, 42 + 214);
    put_u16(&mut buf, 40, 1);
    let b = 42;
    put_u32(&mut buf, b, token);
    put_u32(&mut buf, b + 12, ltp_paise);
    buf[b + 16] = b'+';
    // first bid MBP entry
    put_u32(&mut buf, b + 56, bid_qty);
    put_u32(&mut buf, b + 60, bid_paise);
    put_u16(&mut buf, b + 64, 2);
    buf
}

// ---------------------------------------------------------------------------

#[test]
fn test_7200_touchline_reaches_snapshot() {
    let f = fixture();
    f.app.on_datagram(Segment::NseFo, &datagram_7200(FUTURE_TOKEN, 2_205_025, 1_200_000));

    let snap = f.app.store.snapshot(Segment::NseFo, FUTURE_TOKEN);
    assert!((snap.ltp - 22050.25).abs() < 1e-9);
    assert_eq!(snap.volume, 1_200_000);
    assert_eq!(snap.symbol, "NIFTY");
}

#[test]
fn test_depth_survives_zero_book_touchline() {
    let f = fixture();
    // depth installed by a 7208
    f.app.on_datagram(Segment::NseFo, &datagram_7208(FUTURE_TOKEN, 2_205_000, 2_204_900, 75));
    let snap = f.app.store.snapshot(Segment::NseFo, FUTURE_TOKEN);
    assert!((snap.best_bid() - 22049.0).abs() < 1e-9);

    // a later 7200 with an all-zero book must not clobber it
    f.app.on_datagram(Segment::NseFo, &datagram_7200(FUTURE_TOKEN, 2_205_025, 1_000));
    let snap = f.app.store.snapshot(Segment::NseFo, FUTURE_TOKEN);
    assert!((snap.best_bid() - 22049.0).abs() < 1e-9);
    assert!((snap.ltp - 22050.25).abs() < 1e-9);
}

fn rsi_template() -> StrategyTemplate {
    StrategyTemplate::from_json(
        r#"{
            "id": "tpl-rsi",
            "name": "rsi crossover",
            "symbols": [
                { "slot": "TRADE_1", "role": "Trade", "segment": "NseFo",
                  "token": 49508, "timeframe": "1m" }
            ],
            "indicators": [
                { "id": "RSI_MAIN", "kind": "RSI", "period": "2" }
            ],
            "entry": {
                "type": "compare",
                "left": "I_RSI_MAIN",
                "op": "crosses_above",
                "right": 30
            },
            "order": { "quantity": 50 }
        }"#,
    )
    .unwrap()
}

#[test]
fn test_rsi_crossover_entry_fires_once() {
    let f = fixture();
    let id = f.app.deploy(rsi_template()).unwrap();
    f.app.supervisor.start(&id).unwrap();

    // one closed 1m candle per price; declines drive RSI to 0, rises to 100
    let prices = [100.0, 99.0, 98.0, 97.0, 96.0, 97.5, 98.5, 99.5, 100.5, 101.5];
    let mut volume = 0;
    for price in prices {
        volume += 10;
        f.app.process_update(&touchline(Segment::NseFo, FUTURE_TOKEN, price, volume));
        f.clock.advance_secs(60);
    }
    // flush the final bar through the pipeline
    f.app.process_update(&touchline(Segment::NseFo, FUTURE_TOKEN, 101.5, volume + 10));

    let orders = f.sink.orders.lock().unwrap();
    assert_eq!(orders.len(), 1, "crossover must fire exactly once");
    assert_eq!(orders[0].token, FUTURE_TOKEN);
    assert_eq!(orders[0].quantity, 50);
}

#[test]
fn test_daily_loss_breach_stops_instance() {
    let f = fixture();
    let mut template = rsi_template();
    template.risk.max_daily_loss_rs = Some(1000.0);
    let id = f.app.deploy(template).unwrap();
    f.app.supervisor.start(&id).unwrap();

    let prices = [100.0, 99.0, 98.0, 97.0, 96.0, 97.5, 98.5, 99.5, 100.5, 101.5];
    let mut volume = 0;
    for price in prices {
        volume += 10;
        f.app.process_update(&touchline(Segment::NseFo, FUTURE_TOKEN, price, volume));
        f.clock.advance_secs(60);
    }
    f.app.process_update(&touchline(Segment::NseFo, FUTURE_TOKEN, 101.5, volume + 10));
    assert_eq!(f.sink.orders.lock().unwrap().len(), 1, "entry expected before the drawdown");

    // entry filled near 99.5 x50: the drop to 76.5 loses over 1000
    f.app.process_update(&touchline(Segment::NseFo, FUTURE_TOKEN, 76.5, volume + 20));
    assert_eq!(f.sink.orders.lock().unwrap().len(), 2, "forced exit expected");

    f.app.supervisor.poll();
    assert_eq!(f.app.supervisor.state(&id).unwrap(), StrategyState::Stopped);

    // stopped: further ticks produce no orders
    f.app.process_update(&touchline(Segment::NseFo, FUTURE_TOKEN, 101.5, volume + 30));
    assert_eq!(f.sink.orders.lock().unwrap().len(), 2);
}

#[test]
fn test_option_greeks_written_back_to_store() {
    let f = fixture();
    // underlying future trades at 22100, option premium consistent with
    // roughly 18 vol
    f.app.process_update(&touchline(Segment::NseFo, FUTURE_TOKEN, 22_100.0, 100));

    let t = 19.0 / 252.0; // about the trading days to the 27MAR2026 expiry
    let fair = black_scholes::price(OptionKind::Call, 22_100.0, 22_000.0, t, 0.065, 0.18);
    f.app.process_update(&touchline(Segment::NseFo, OPTION_TOKEN, fair, 10));

    let snap = f.app.store.snapshot(Segment::NseFo, OPTION_TOKEN);
    assert!(snap.greeks_calculated, "option tick must trigger a greeks calc");
    assert!(snap.implied_volatility > 0.10 && snap.implied_volatility < 0.40);
    assert!(snap.delta > 0.4 && snap.delta < 0.75);
    assert!(snap.theta < 0.0);
}

#[test]
fn test_iv_solver_figures() {
    let solver = IvSolver::new(1e-6, 100);
    let (s, k, t, r) = (22_000.0, 22_000.0, 30.0 / 365.0, 0.065);
    let price = black_scholes::price(OptionKind::Call, s, k, t, r, 0.18);

    let solution = solver.solve(OptionKind::Call, s, k, t, r, price, None).unwrap();
    assert!((solution.sigma - 0.18).abs() < 1e-4);
    assert!(solution.iterations <= 20, "took {} iterations", solution.iterations);
    assert!(solution.sigma > 0.10 && solution.sigma < 0.40);

    let greeks = black_scholes::greeks(OptionKind::Call, s, k, t, r, solution.sigma);
    assert!(greeks.delta > 0.5 && greeks.delta < 0.65);
    assert!(greeks.theta < 0.0);
}

#[test]
fn test_formula_ternary_over_option_slot() {
    let f = fixture();
    f.app.process_update(&touchline(Segment::NseFo, OPTION_TOKEN, 100.0, 10));
    // iv 28%, delta 0.55
    f.app.store.apply_greeks(
        Segment::NseFo,
        OPTION_TOKEN,
        0.28,
        0.27,
        0.29,
        0.55,
        0.001,
        12.0,
        -8.0,
        1.5,
        101.0,
        START_EPOCH * 1000,
    );

    let symbols = vec![SymbolDefinition {
        slot: "TRADE_1".to_string(),
        label: String::new(),
        role: SymbolRole::Trade,
        segment: Segment::NseFo,
        token: OPTION_TOKEN,
        timeframe: Timeframe::M1,
        entry_side: None,
    }];
    let params = HashMap::new();
    let indicators = IndicatorEngine::new();
    let ctx = LiveFormulaContext {
        params: &params,
        indicators: &indicators,
        snapshots: f.app.store.as_ref(),
        symbols: &symbols,
        primary: &symbols[0],
        portfolio: PortfolioView::default(),
    };

    let engine = FormulaEngine::new();
    let source = "IV(TRADE_1) > 25 ? LTP(TRADE_1) * 0.98 : LTP(TRADE_1) * 0.95";
    let value = engine.evaluate(source, &ctx).unwrap();
    assert!((value - 98.0).abs() < 1e-9);

    // iv below the threshold takes the discount branch
    f.app.store.apply_greeks(
        Segment::NseFo,
        OPTION_TOKEN,
        0.20,
        0.19,
        0.21,
        0.55,
        0.001,
        12.0,
        -8.0,
        1.5,
        101.0,
        START_EPOCH * 1000,
    );
    let value = engine.evaluate(source, &ctx).unwrap();
    assert!((value - 95.0).abs() < 1e-9);
}

#[test]
fn test_retire_revokes_subscriptions() {
    let f = fixture();
    let id = f.app.deploy(rsi_template()).unwrap();
    assert_eq!(f.app.router.subscriber_count(Segment::NseFo, FUTURE_TOKEN), 1);

    f.app.supervisor.start(&id).unwrap();
    f.app.supervisor.stop(&id).unwrap();
    f.app.retire(&id).unwrap();
    assert_eq!(f.app.router.subscriber_count(Segment::NseFo, FUTURE_TOKEN), 0);
}
