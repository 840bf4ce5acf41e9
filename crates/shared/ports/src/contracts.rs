//! Contract metadata port

use arka_core::{ContractInfo, Segment};

/// Lookup of static contract data loaded from exchange master files.
pub trait ContractRepository: Send + Sync {
    fn contract(&self, segment: Segment, token: u32) -> Option<ContractInfo>;

    /// Spot/cash token carrying the live price of `symbol`, if known.
    /// Index options (NIFTY, BANKNIFTY) have `asset_token <= 0` and resolve
    /// their underlying this way.
    fn asset_token_for_symbol(&self, symbol: &str) -> Option<u32>;

    /// Token of the nearest-expiry future on `symbol` in `segment`.
    fn next_expiry_future_token(&self, symbol: &str, segment: Segment) -> Option<u32>;
}
