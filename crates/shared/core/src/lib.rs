//! Arka Core Domain
//!
//! Pure domain types for the Arka trading pipeline.
//! This crate contains no async, no I/O, and is 100% unit testable.

pub mod candle;
pub mod contract;
pub mod order;
pub mod segment;
pub mod state;
pub mod update;

// Re-export commonly used types at crate root
pub use candle::{Candle, MAX_CANDLE_HISTORY, Timeframe};
pub use contract::{ContractInfo, InstrumentKind, OptionKind};
pub use order::{OrderRequest, OrderSide, OrderType};
pub use segment::Segment;
pub use state::{DEPTH_LEVELS, DepthLevel, UnifiedState};
pub use update::{
    ClosePriceUpdate, DepthUpdate, IndexUpdate, IndustryIndexUpdate, LppUpdate,
    OpenInterestUpdate, SessionStateUpdate, TickerUpdate, TouchlineUpdate, UnifiedUpdate,
    UpdateBody, UpdateKind,
};
