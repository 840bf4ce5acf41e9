//! Arka demo binary
//!
//! Boots the full pipeline from a JSON config. Without feed endpoints it
//! falls back to a synthetic tick source so the pipeline can be observed
//! end to end: ticks, candles, indicators, strategy events and metrics.

use arka_clock::SystemClock;
use arka_runner::app::{App, LoggingOrderSink};
use arka_runner::config::RunnerConfig;
use arka_runner::contracts::StaticContracts;
use arka_runner::synthetic::SyntheticFeed;
use arka_strategy::StrategyTemplate;
use arka_supervisor::{JsonFileRepository, SupervisorEvent};
use std::sync::Arc;
use std::time::Duration;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let config_path = std::env::args().nth(1).unwrap_or_else(|| "arka.json".to_string());
    let config = match RunnerConfig::load(&config_path) {
        Ok(c) => c,
        Err(e) => {
            log::warn!("{e}; using defaults");
            RunnerConfig::default()
        }
    };

    let contracts = match &config.contracts_file {
        Some(path) => Arc::new(StaticContracts::load(path)?),
        None => Arc::new(StaticContracts::empty()),
    };

    let repository = Arc::new(JsonFileRepository::new(&config.strategies_dir)?);
    let app = App::build(
        &config,
        contracts,
        Arc::new(SystemClock),
        Arc::new(LoggingOrderSink),
        repository,
    );

    let restored = app.supervisor.restore()?;
    if restored > 0 {
        log::info!("restored {restored} persisted strategies");
    }

    for path in &config.templates {
        let json = std::fs::read_to_string(path)?;
        let template = StrategyTemplate::from_json(&json)?;
        let id = app.deploy(template)?;
        app.supervisor.start(&id)?;
        log::info!("deployed and started strategy {id} from {}", path.display());
    }

    let mut events = app.supervisor.subscribe();
    tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            match event {
                SupervisorEvent::StateChanged { id, from, to } => {
                    log::info!("strategy {id}: {from} -> {to}");
                }
                SupervisorEvent::Strategy { id, event } => {
                    log::info!("strategy {id}: {event:?}");
                }
                SupervisorEvent::Metrics { .. } => {}
            }
        }
    });

    let _background = app.spawn_background();

    if config.feeds.is_empty() {
        log::info!("no feed endpoints configured, running synthetic walk");
        run_synthetic(&app).await;
    } else {
        // Multicast receive loops are deployment-specific; the demo binary
        // only exercises the synthetic path.
        log::warn!("feed endpoints configured but no receiver attached in the demo binary");
        tokio::signal::ctrl_c().await?;
    }

    Ok(())
}

async fn run_synthetic(app: &App) {
    let mut feed = SyntheticFeed::new(42);
    feed.add_instrument(arka_core::Segment::NseFo, 49508, 22050.25);

    let mut ticker = tokio::time::interval(Duration::from_millis(100));
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                for update in feed.next_updates() {
                    app.process_update(&update);
                }
            }
            _ = tokio::signal::ctrl_c() => {
                log::info!("shutting down");
                break;
            }
        }
    }
}
