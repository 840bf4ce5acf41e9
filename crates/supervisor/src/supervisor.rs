//! Strategy supervisor
//!
//! Owns every strategy instance: binds templates into runtimes, drives the
//! lifecycle state machine, fans market events into running strategies and
//! publishes state changes, strategy events and periodic metrics on a
//! broadcast channel. Parameter edits on locked keys are rejected while
//! the strategy runs.

use crate::repository::{StrategyRecord, StrategyRepository};
use crate::state::StrategyState;
use arka_analytics::IndicatorEngine;
use arka_clock::Clock;
use arka_core::{Candle, Segment, Timeframe};
use arka_formula::FormulaEngine;
use arka_market::CandleAggregator;
use arka_ports::{RepositoryError, SnapshotSource};
use arka_strategy::{
    ExitReason, OrderSink, StrategyError, StrategyEvent, StrategyMetrics, StrategyRuntime,
    StrategyTemplate,
};
use dashmap::DashMap;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::broadcast;
use uuid::Uuid;

/// Metrics and scheduled-parameter cadence.
pub const METRICS_INTERVAL_MS: u64 = 500;

const EVENT_CHANNEL_CAPACITY: usize = 256;

#[derive(Debug, Error)]
pub enum SupervisorError {
    #[error("strategy not found: {0}")]
    NotFound(String),
    #[error("strategy {id}: illegal transition {from} -> {to}")]
    InvalidTransition { id: String, from: StrategyState, to: StrategyState },
    #[error("strategy {id}: parameter '{key}' is locked while running")]
    LockedParameter { id: String, key: String },
    #[error("strategy {id}: unknown parameter '{key}'")]
    UnknownParameter { id: String, key: String },
    #[error(transparent)]
    Strategy(#[from] StrategyError),
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

#[derive(Debug, Clone)]
pub enum SupervisorEvent {
    StateChanged { id: String, from: StrategyState, to: StrategyState },
    Metrics { id: String, metrics: StrategyMetrics },
    Strategy { id: String, event: StrategyEvent },
}

struct Managed {
    runtime: Arc<StrategyRuntime>,
    record: Mutex<StrategyRecord>,
}

/// Everything a runtime binds against, shared by all strategies.
pub struct Services {
    pub formulas: Arc<FormulaEngine>,
    pub snapshots: Arc<dyn SnapshotSource>,
    pub indicators: Arc<IndicatorEngine>,
    pub candles: Arc<CandleAggregator>,
    pub clock: Arc<dyn Clock>,
    pub orders: Arc<dyn OrderSink>,
}

pub struct Supervisor {
    services: Services,
    repository: Arc<dyn StrategyRepository>,
    strategies: DashMap<String, Arc<Managed>>,
    events: broadcast::Sender<SupervisorEvent>,
}

impl Supervisor {
    pub fn new(services: Services, repository: Arc<dyn StrategyRepository>) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self { services, repository, strategies: DashMap::new(), events }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SupervisorEvent> {
        self.events.subscribe()
    }

    /// Bind a template into a new strategy instance. The instance starts
    /// in `Created` and must be started explicitly.
    pub fn create(&self, template: StrategyTemplate) -> Result<String, SupervisorError> {
        let id = Uuid::new_v4().to_string();
        let now = self.services.clock.now();
        let record = StrategyRecord {
            id: id.clone(),
            template: template.clone(),
            state: StrategyState::Created,
            created_at: now,
            last_state_change: now,
        };
        let runtime = self.bind_runtime(&id, template)?;
        self.repository.save(&record)?;
        self.strategies.insert(id.clone(), Arc::new(Managed { runtime, record: Mutex::new(record) }));
        log::info!("strategy {id} created");
        Ok(id)
    }

    /// Rebind every persisted strategy. Instances that were running or
    /// paused come back stopped; their positions did not survive the
    /// restart.
    pub fn restore(&self) -> Result<usize, SupervisorError> {
        let mut restored = 0;
        for mut record in self.repository.load_all()? {
            if record.state.is_terminal() {
                continue;
            }
            if matches!(record.state, StrategyState::Running | StrategyState::Paused) {
                log::warn!("strategy {} was {} at shutdown, restoring as stopped", record.id, record.state);
                record.state = StrategyState::Stopped;
                record.last_state_change = self.services.clock.now();
                self.repository.save(&record)?;
            }
            let runtime = self.bind_runtime(&record.id, record.template.clone())?;
            self.strategies
                .insert(record.id.clone(), Arc::new(Managed { runtime, record: Mutex::new(record) }));
            restored += 1;
        }
        Ok(restored)
    }

    pub fn start(&self, id: &str) -> Result<(), SupervisorError> {
        self.transition(id, StrategyState::Running)
    }

    pub fn pause(&self, id: &str) -> Result<(), SupervisorError> {
        self.transition(id, StrategyState::Paused)
    }

    /// Resume a paused strategy. Only legal from `Paused`.
    pub fn resume(&self, id: &str) -> Result<(), SupervisorError> {
        let state = self.state(id)?;
        if state != StrategyState::Paused {
            return Err(SupervisorError::InvalidTransition {
                id: id.to_string(),
                from: state,
                to: StrategyState::Running,
            });
        }
        self.transition(id, StrategyState::Running)
    }

    /// Stop a strategy, squaring off any open position first.
    pub fn stop(&self, id: &str) -> Result<(), SupervisorError> {
        let managed = self.managed(id)?;
        managed.runtime.square_off(ExitReason::Manual);
        self.transition(id, StrategyState::Stopped)
    }

    /// Remove a stopped strategy and its persisted document.
    pub fn delete(&self, id: &str) -> Result<(), SupervisorError> {
        self.transition(id, StrategyState::Deleted)?;
        self.strategies.remove(id);
        self.repository.delete(id)?;
        log::info!("strategy {id} deleted");
        Ok(())
    }

    pub fn state(&self, id: &str) -> Result<StrategyState, SupervisorError> {
        Ok(self.managed(id)?.record.lock().unwrap().state)
    }

    pub fn metrics(&self, id: &str) -> Result<StrategyMetrics, SupervisorError> {
        Ok(self.managed(id)?.runtime.metrics())
    }

    pub fn strategy_ids(&self) -> Vec<String> {
        self.strategies.iter().map(|e| e.key().clone()).collect()
    }

    /// Apply parameter edits. Locked parameters reject edits while the
    /// strategy runs; every accepted edit is persisted so it survives a
    /// restart.
    pub fn modify_parameters(
        &self,
        id: &str,
        updates: &HashMap<String, f64>,
    ) -> Result<(), SupervisorError> {
        let managed = self.managed(id)?;
        let mut record = managed.record.lock().unwrap();
        let running = record.state == StrategyState::Running;

        for key in updates.keys() {
            let Some(def) = record.template.parameter(key) else {
                return Err(SupervisorError::UnknownParameter {
                    id: id.to_string(),
                    key: key.clone(),
                });
            };
            if running && def.locked {
                return Err(SupervisorError::LockedParameter {
                    id: id.to_string(),
                    key: key.clone(),
                });
            }
        }

        for (key, value) in updates {
            managed.runtime.set_param(key, *value);
            if let Some(def) = record.template.parameters.iter_mut().find(|p| &p.key == key) {
                def.value = *value;
            }
        }
        self.repository.save(&record)?;
        Ok(())
    }

    /// Fan a tick into every running strategy with a slot bound to the
    /// instrument.
    pub fn handle_tick(&self, segment: Segment, token: u32) {
        for entry in self.strategies.iter() {
            let managed = entry.value();
            if !managed.runtime.watches(segment, token) {
                continue;
            }
            if managed.record.lock().unwrap().state == StrategyState::Running {
                managed.runtime.on_tick();
            }
        }
    }

    /// Fan a completed candle into every running strategy bound to the
    /// instrument.
    pub fn handle_candle_close(
        &self,
        segment: Segment,
        token: u32,
        timeframe: Timeframe,
        candle: &Candle,
    ) {
        for entry in self.strategies.iter() {
            let managed = entry.value();
            if !managed.runtime.watches(segment, token) {
                continue;
            }
            if managed.record.lock().unwrap().state == StrategyState::Running {
                managed.runtime.on_candle_close(timeframe, candle);
            }
        }
    }

    /// One metrics-ticker pass: timers then metrics for every running
    /// strategy. A runtime halted by its daily-loss limit is moved to
    /// `Stopped` here.
    pub fn poll(&self) {
        let mut halted = Vec::new();
        for entry in self.strategies.iter() {
            let managed = entry.value();
            if managed.record.lock().unwrap().state != StrategyState::Running {
                continue;
            }
            managed.runtime.on_timer();
            let metrics = managed.runtime.metrics();
            if metrics.halted {
                halted.push(entry.key().clone());
            }
            let _ = self
                .events
                .send(SupervisorEvent::Metrics { id: entry.key().clone(), metrics });
        }
        for id in halted {
            if let Err(e) = self.transition(&id, StrategyState::Stopped) {
                log::error!("stopping halted strategy {id}: {e}");
            }
        }
    }

    /// Spawn the 500ms metrics ticker on the current tokio runtime.
    pub fn spawn_metrics_ticker(self: &Arc<Self>) -> tokio::task::JoinHandle<()> {
        let supervisor = Arc::clone(self);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_millis(METRICS_INTERVAL_MS));
            loop {
                interval.tick().await;
                supervisor.poll();
            }
        })
    }

    // ---------------------------------------------------------------------

    fn managed(&self, id: &str) -> Result<Arc<Managed>, SupervisorError> {
        self.strategies
            .get(id)
            .map(|e| Arc::clone(e.value()))
            .ok_or_else(|| SupervisorError::NotFound(id.to_string()))
    }

    fn transition(&self, id: &str, to: StrategyState) -> Result<(), SupervisorError> {
        let managed = self.managed(id)?;
        let mut record = managed.record.lock().unwrap();
        let from = record.state;
        if !from.can_transition(to) {
            return Err(SupervisorError::InvalidTransition { id: id.to_string(), from, to });
        }
        record.state = to;
        record.last_state_change = self.services.clock.now();
        self.repository.save(&record)?;
        drop(record);

        log::info!("strategy {id}: {from} -> {to}");
        let _ = self.events.send(SupervisorEvent::StateChanged { id: id.to_string(), from, to });
        Ok(())
    }

    fn bind_runtime(
        &self,
        id: &str,
        template: StrategyTemplate,
    ) -> Result<Arc<StrategyRuntime>, SupervisorError> {
        let events = self.events.clone();
        let event_id = id.to_string();
        let callback: arka_strategy::EventCallback = Arc::new(move |event: &StrategyEvent| {
            let _ = events.send(SupervisorEvent::Strategy {
                id: event_id.clone(),
                event: event.clone(),
            });
        });
        let runtime = StrategyRuntime::bind(
            template,
            Arc::clone(&self.services.formulas),
            Arc::clone(&self.services.snapshots),
            Arc::clone(&self.services.indicators),
            Arc::clone(&self.services.candles),
            Arc::clone(&self.services.clock),
            Arc::clone(&self.services.orders),
            Some(callback),
        )?;
        Ok(Arc::new(runtime))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::InMemoryRepository;
    use arka_clock::ManualClock;
    use arka_core::{OrderRequest, UnifiedState};
    use std::sync::RwLock;

    const TOKEN: u32 = 101;

    struct StubMarket {
        state: RwLock<UnifiedState>,
    }

    impl StubMarket {
        fn new(ltp: f64) -> Self {
            let mut s = UnifiedState::sentinel();
            s.token = TOKEN;
            s.ltp = ltp;
            Self { state: RwLock::new(s) }
        }

        fn set_ltp(&self, ltp: f64) {
            self.state.write().unwrap().ltp = ltp;
        }
    }

    impl SnapshotSource for StubMarket {
        fn snapshot(&self, _segment: Segment, _token: u32) -> UnifiedState {
            self.state.read().unwrap().clone()
        }
    }

    #[derive(Default)]
    struct CollectingSink {
        orders: Mutex<Vec<OrderRequest>>,
    }

    impl OrderSink for CollectingSink {
        fn submit(&self, order: &OrderRequest) {
            self.orders.lock().unwrap().push(order.clone());
        }
    }

    fn template_json() -> StrategyTemplate {
        StrategyTemplate::from_json(
            r#"{
                "id": "tpl",
                "name": "crossing",
                "symbols": [
                    { "slot": "TRADE_1", "role": "Trade", "segment": "NseFo",
                      "token": 101, "timeframe": "1m" }
                ],
                "parameters": [
                    { "key": "level", "value": 100, "trigger": "manual", "locked": true },
                    { "key": "offset", "value": 1, "trigger": "manual" }
                ],
                "entry": {
                    "type": "compare",
                    "left": "P_LTP",
                    "op": "crosses_above",
                    "right": "S_level"
                },
                "order": { "quantity": 10 }
            }"#,
        )
        .unwrap()
    }

    struct Fixture {
        supervisor: Arc<Supervisor>,
        market: Arc<StubMarket>,
        sink: Arc<CollectingSink>,
        repository: Arc<InMemoryRepository>,
    }

    fn fixture() -> Fixture {
        let market = Arc::new(StubMarket::new(95.0));
        let sink = Arc::new(CollectingSink::default());
        let repository = Arc::new(InMemoryRepository::new());
        let clock = Arc::new(ManualClock::at_epoch_secs(1_772_424_600));
        let services = Services {
            formulas: Arc::new(FormulaEngine::new()),
            snapshots: market.clone(),
            indicators: Arc::new(IndicatorEngine::new()),
            candles: Arc::new(CandleAggregator::new(clock.clone())),
            clock,
            orders: sink.clone(),
        };
        let supervisor = Arc::new(Supervisor::new(services, repository.clone()));
        Fixture { supervisor, market, sink, repository }
    }

    #[test]
    fn test_lifecycle_flow() {
        let f = fixture();
        let id = f.supervisor.create(template_json()).unwrap();
        assert_eq!(f.supervisor.state(&id).unwrap(), StrategyState::Created);

        f.supervisor.start(&id).unwrap();
        assert_eq!(f.supervisor.state(&id).unwrap(), StrategyState::Running);

        f.supervisor.pause(&id).unwrap();
        f.supervisor.resume(&id).unwrap();
        f.supervisor.stop(&id).unwrap();
        assert_eq!(f.supervisor.state(&id).unwrap(), StrategyState::Stopped);

        f.supervisor.delete(&id).unwrap();
        assert!(matches!(f.supervisor.state(&id), Err(SupervisorError::NotFound(_))));
        assert!(f.repository.load(&id).is_err());
    }

    #[test]
    fn test_resume_only_from_paused() {
        let f = fixture();
        let id = f.supervisor.create(template_json()).unwrap();
        assert!(matches!(
            f.supervisor.resume(&id),
            Err(SupervisorError::InvalidTransition { .. })
        ));
        f.supervisor.start(&id).unwrap();
        assert!(matches!(
            f.supervisor.resume(&id),
            Err(SupervisorError::InvalidTransition { .. })
        ));
        f.supervisor.pause(&id).unwrap();
        f.supervisor.resume(&id).unwrap();
        assert_eq!(f.supervisor.state(&id).unwrap(), StrategyState::Running);
    }

    #[test]
    fn test_delete_requires_stopped() {
        let f = fixture();
        let id = f.supervisor.create(template_json()).unwrap();
        f.supervisor.start(&id).unwrap();
        assert!(matches!(
            f.supervisor.delete(&id),
            Err(SupervisorError::InvalidTransition { .. })
        ));
        f.supervisor.stop(&id).unwrap();
        f.supervisor.delete(&id).unwrap();
    }

    #[test]
    fn test_ticks_only_reach_running_strategies() {
        let f = fixture();
        let id = f.supervisor.create(template_json()).unwrap();

        // created, not running: crossing is ignored
        f.market.set_ltp(95.0);
        f.supervisor.handle_tick(Segment::NseFo, TOKEN);
        f.market.set_ltp(105.0);
        f.supervisor.handle_tick(Segment::NseFo, TOKEN);
        assert_eq!(f.sink.orders.lock().unwrap().len(), 0);

        f.supervisor.start(&id).unwrap();
        f.market.set_ltp(95.0);
        f.supervisor.handle_tick(Segment::NseFo, TOKEN);
        f.market.set_ltp(105.0);
        f.supervisor.handle_tick(Segment::NseFo, TOKEN);
        assert_eq!(f.sink.orders.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_locked_parameter_rejected_while_running() {
        let f = fixture();
        let id = f.supervisor.create(template_json()).unwrap();
        f.supervisor.start(&id).unwrap();

        let updates = HashMap::from([("level".to_string(), 120.0)]);
        assert!(matches!(
            f.supervisor.modify_parameters(&id, &updates),
            Err(SupervisorError::LockedParameter { .. })
        ));

        // unlocked parameter is fine while running
        let updates = HashMap::from([("offset".to_string(), 2.0)]);
        f.supervisor.modify_parameters(&id, &updates).unwrap();

        // locked parameter is editable once stopped, and persists
        f.supervisor.stop(&id).unwrap();
        let updates = HashMap::from([("level".to_string(), 120.0)]);
        f.supervisor.modify_parameters(&id, &updates).unwrap();
        let record = f.repository.load(&id).unwrap();
        assert_eq!(record.template.parameter("level").unwrap().value, 120.0);
    }

    #[test]
    fn test_unknown_parameter_rejected() {
        let f = fixture();
        let id = f.supervisor.create(template_json()).unwrap();
        let updates = HashMap::from([("missing".to_string(), 1.0)]);
        assert!(matches!(
            f.supervisor.modify_parameters(&id, &updates),
            Err(SupervisorError::UnknownParameter { .. })
        ));
    }

    #[test]
    fn test_state_change_events() {
        let f = fixture();
        let mut rx = f.supervisor.subscribe();
        let id = f.supervisor.create(template_json()).unwrap();
        f.supervisor.start(&id).unwrap();

        let event = rx.try_recv().unwrap();
        match event {
            SupervisorEvent::StateChanged { id: event_id, from, to } => {
                assert_eq!(event_id, id);
                assert_eq!(from, StrategyState::Created);
                assert_eq!(to, StrategyState::Running);
            }
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[test]
    fn test_restore_brings_running_back_stopped() {
        let f = fixture();
        let id = f.supervisor.create(template_json()).unwrap();
        f.supervisor.start(&id).unwrap();

        // a fresh supervisor over the same repository simulates a restart
        let market = Arc::new(StubMarket::new(95.0));
        let clock = Arc::new(ManualClock::at_epoch_secs(1_772_424_600));
        let services = Services {
            formulas: Arc::new(FormulaEngine::new()),
            snapshots: market,
            indicators: Arc::new(IndicatorEngine::new()),
            candles: Arc::new(CandleAggregator::new(clock.clone())),
            clock,
            orders: Arc::new(CollectingSink::default()),
        };
        let restarted = Supervisor::new(services, f.repository.clone());
        assert_eq!(restarted.restore().unwrap(), 1);
        assert_eq!(restarted.state(&id).unwrap(), StrategyState::Stopped);
        assert_eq!(f.repository.load(&id).unwrap().state, StrategyState::Stopped);
    }

    #[tokio::test]
    async fn test_metrics_ticker_publishes() {
        let f = fixture();
        let id = f.supervisor.create(template_json()).unwrap();
        f.supervisor.start(&id).unwrap();
        let mut rx = f.supervisor.subscribe();

        let handle = f.supervisor.spawn_metrics_ticker();
        let event = tokio::time::timeout(Duration::from_secs(2), async {
            loop {
                if let Ok(SupervisorEvent::Metrics { id: event_id, metrics }) = rx.recv().await {
                    return (event_id, metrics);
                }
            }
        })
        .await
        .unwrap();
        handle.abort();

        assert_eq!(event.0, id);
        assert_eq!(event.1.ltp, 95.0);
        assert!(!event.1.has_position);
    }
}
