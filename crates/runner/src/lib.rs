//! Arka Runner
//!
//! Process wiring: configuration, contract masters, the composition root
//! that connects decoders, store, router, candles, indicators, greeks and
//! the supervisor, and a synthetic tick source for demos and tests.

pub mod app;
pub mod config;
pub mod contracts;
pub mod synthetic;

pub use app::{App, LoggingOrderSink};
pub use config::{ConfigError, FeedEndpoint, GreeksOptions, RunnerConfig};
pub use contracts::StaticContracts;
pub use synthetic::SyntheticFeed;
