//! Composition root
//!
//! Builds and wires the whole pipeline: decoders feed the price store, the
//! store's applied updates fan out through the tick router, the candle
//! aggregator closes bars into the indicator engine and the supervisor,
//! and the greeks service writes its results back into the store. One
//! `App` owns every singleton for the process lifetime.

use crate::config::RunnerConfig;
use crate::contracts::StaticContracts;
use arka_analytics::{GreeksResult, GreeksService, GreeksSink, IndicatorEngine};
use arka_clock::Clock;
use arka_core::{InstrumentKind, Segment, UnifiedUpdate};
use arka_feed::FeedDecoder;
use arka_formula::FormulaEngine;
use arka_market::{CandleAggregator, OwnerId, PriceStore, TickRouter};
use arka_ports::ContractRepository;
use arka_strategy::{OrderSink, StrategyTemplate};
use arka_supervisor::{Services, StrategyRepository, Supervisor, SupervisorError};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

/// Writes solved greeks back into the unified price store.
struct StoreGreeksSink {
    store: Arc<PriceStore>,
}

impl GreeksSink for StoreGreeksSink {
    fn publish_greeks(&self, segment: Segment, token: u32, result: &GreeksResult) {
        self.store.apply_greeks(
            segment,
            token,
            result.iv,
            result.bid_iv,
            result.ask_iv,
            result.delta,
            result.gamma,
            result.vega,
            result.theta,
            result.rho,
            result.theoretical_price,
            result.ts_millis,
        );
    }

    fn calculation_failed(&self, segment: Segment, token: u32, reason: &str) {
        log::debug!("greeks {segment}:{token}: {reason}");
    }
}

/// Default order sink: orders are logged and go nowhere. A live gateway
/// replaces this at construction.
pub struct LoggingOrderSink;

impl OrderSink for LoggingOrderSink {
    fn submit(&self, order: &arka_core::OrderRequest) {
        log::info!(
            "order requested: {} {:?} x{} on {}:{} limit {:?}",
            order.side.as_str(),
            order.order_type,
            order.quantity,
            order.segment,
            order.token,
            order.limit_price
        );
    }
}

pub struct App {
    pub clock: Arc<dyn Clock>,
    pub contracts: Arc<StaticContracts>,
    pub store: Arc<PriceStore>,
    pub router: Arc<TickRouter>,
    pub candles: Arc<CandleAggregator>,
    pub indicators: Arc<IndicatorEngine>,
    pub formulas: Arc<FormulaEngine>,
    pub greeks: Arc<GreeksService>,
    pub supervisor: Arc<Supervisor>,
    decoders: HashMap<Segment, FeedDecoder>,
    greeks_enabled: bool,
    /// Router owner per strategy id, for owner-scoped revocation.
    owners: Mutex<HashMap<String, OwnerId>>,
    next_owner: AtomicU64,
}

impl App {
    pub fn build(
        config: &RunnerConfig,
        contracts: Arc<StaticContracts>,
        clock: Arc<dyn Clock>,
        orders: Arc<dyn OrderSink>,
        repository: Arc<dyn StrategyRepository>,
    ) -> Self {
        let store = Arc::new(PriceStore::new(clock.clone()));
        for segment in Segment::ALL {
            let masters = contracts.segment_contracts(segment);
            if masters.is_empty() {
                continue;
            }
            if let Err(e) = store.initialize(segment, &masters) {
                log::error!("store init {segment}: {e}");
            }
        }

        let router = Arc::new(TickRouter::new());
        let candles = Arc::new(CandleAggregator::new(clock.clone()));
        let indicators = Arc::new(IndicatorEngine::new());
        let formulas = Arc::new(FormulaEngine::new());

        let greeks = Arc::new(GreeksService::new(
            store.clone(),
            contracts.clone(),
            clock.clone(),
            Arc::new(StoreGreeksSink { store: store.clone() }),
            config.greeks.to_config(),
        ));
        let greeks_enabled = config.greeks.enabled;
        if greeks_enabled {
            let mut registered = 0usize;
            for option in contracts.options() {
                match greeks.register_option(option) {
                    Ok(()) => registered += 1,
                    Err(e) => log::warn!("greeks registration: {e}"),
                }
            }
            log::info!("greeks tracking {registered} options");
        }

        let supervisor = Arc::new(Supervisor::new(
            Services {
                formulas: formulas.clone(),
                snapshots: store.clone(),
                indicators: indicators.clone(),
                candles: candles.clone(),
                clock: clock.clone(),
                orders,
            },
            repository,
        ));

        // Completed bars feed the indicator engine first, then strategies;
        // a strategy reading I_ keys on candle close sees fresh values.
        let cb_indicators = indicators.clone();
        let cb_supervisor = Arc::downgrade(&supervisor);
        candles.on_complete(Arc::new(move |segment, token, timeframe, candle| {
            cb_indicators.on_candle(segment, token, timeframe, candle);
            if let Some(supervisor) = cb_supervisor.upgrade() {
                supervisor.handle_candle_close(segment, token, timeframe, candle);
            }
        }));

        let mut decoders = HashMap::new();
        for feed in &config.feeds {
            if feed.enabled {
                decoders.insert(feed.segment, FeedDecoder::new(feed.segment));
            }
        }

        Self {
            clock,
            contracts,
            store,
            router,
            candles,
            indicators,
            formulas,
            greeks,
            supervisor,
            decoders,
            greeks_enabled,
            owners: Mutex::new(HashMap::new()),
            next_owner: AtomicU64::new(1),
        }
    }

    /// Receiver-loop entry for one raw datagram.
    pub fn on_datagram(&self, segment: Segment, datagram: &[u8]) {
        let Some(decoder) = self.decoders.get(&segment) else {
            return;
        };
        for update in decoder.decode(datagram) {
            self.process_update(&update);
        }
    }

    /// Synchronous tick pipeline: store, router, candles, greeks.
    pub fn process_update(&self, update: &UnifiedUpdate) {
        self.store.apply(update);
        self.router.publish(update);
        self.candles.apply(update);

        if self.greeks_enabled && update.ltp().is_some() {
            if let Some(contract) = self.contracts.contract(update.segment, update.token) {
                match contract.kind {
                    InstrumentKind::Option => {
                        self.greeks.on_option_tick(update.segment, update.token);
                    }
                    InstrumentKind::Equity | InstrumentKind::Index | InstrumentKind::Future => {
                        self.greeks.on_underlying_tick(&contract.symbol);
                    }
                }
            }
        }
    }

    /// Create a strategy from a template and subscribe every bound symbol
    /// to the router under one dedicated owner.
    pub fn deploy(&self, template: StrategyTemplate) -> Result<String, SupervisorError> {
        let symbols = template.symbols.clone();
        let id = self.supervisor.create(template)?;

        let owner = self.next_owner.fetch_add(1, Ordering::Relaxed);
        for sym in &symbols {
            let supervisor = Arc::downgrade(&self.supervisor);
            self.router.subscribe(
                owner,
                sym.segment,
                sym.token,
                Arc::new(move |update| {
                    if let Some(supervisor) = supervisor.upgrade() {
                        supervisor.handle_tick(update.segment, update.token);
                    }
                }),
            );
        }
        self.owners.lock().unwrap().insert(id.clone(), owner);
        Ok(id)
    }

    /// Stop, delete, and revoke the strategy's router subscriptions.
    pub fn retire(&self, id: &str) -> Result<(), SupervisorError> {
        match self.supervisor.stop(id) {
            // already stopped is fine; delete enforces the rest
            Ok(()) | Err(SupervisorError::InvalidTransition { .. }) => {}
            Err(e) => return Err(e),
        }
        self.supervisor.delete(id)?;
        if let Some(owner) = self.owners.lock().unwrap().remove(id) {
            let revoked = self.router.revoke_owner(owner);
            log::debug!("strategy {id}: revoked {revoked} subscriptions");
        }
        Ok(())
    }

    /// Spawn the periodic background tasks on the current tokio runtime.
    pub fn spawn_background(&self) -> Vec<tokio::task::JoinHandle<()>> {
        let mut handles = Vec::new();
        if self.greeks_enabled {
            handles.extend(self.greeks.spawn_timers());
        }
        handles.push(self.supervisor.spawn_metrics_ticker());
        handles
    }
}
