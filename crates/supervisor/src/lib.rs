//! Arka Supervisor
//!
//! Lifecycle management over strategy runtimes: a state machine per
//! strategy, persistence of templates and states, locked-parameter
//! enforcement and a periodic metrics ticker.

pub mod repository;
pub mod state;
pub mod supervisor;

pub use repository::{InMemoryRepository, JsonFileRepository, StrategyRecord, StrategyRepository};
pub use state::StrategyState;
pub use supervisor::{
    METRICS_INTERVAL_MS, Services, Supervisor, SupervisorError, SupervisorEvent,
};
