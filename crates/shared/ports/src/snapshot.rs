//! Snapshot access port

use arka_core::{Segment, UnifiedState};

/// Read-only access to live unified state.
///
/// The returned copy is the unit of consistency: implementations must never
/// hand out references into their locked storage. Uninitialized or
/// out-of-range tokens yield the zeroed sentinel (`token == 0`).
pub trait SnapshotSource: Send + Sync {
    fn snapshot(&self, segment: Segment, token: u32) -> UnifiedState;

    /// Convenience: last traded price, 0.0 when unknown.
    fn ltp(&self, segment: Segment, token: u32) -> f64 {
        self.snapshot(segment, token).ltp
    }
}
