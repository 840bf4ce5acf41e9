//! Arka Market
//!
//! The live market state layer: segment-partitioned price stores with
//! snapshot-only access, the per-token tick router, and the candle
//! aggregator. Everything here sits on the receiver-thread tick path and
//! must stay short and non-blocking.

pub mod candles;
pub mod router;
pub mod store;

pub use candles::{CandleAggregator, CandleCallback};
pub use router::{OwnerId, SubscriptionId, TickCallback, TickRouter};
pub use store::{PriceStore, SegmentStore, StoreConfig};
