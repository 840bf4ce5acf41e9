//! Feed decode errors

use thiserror::Error;

#[derive(Error, Debug)]
pub enum FeedError {
    /// Malformed datagram. The receiver loop drops the packet, counts it
    /// and continues; this never propagates past the feed boundary.
    #[error("{feed} protocol error at offset {offset}: {reason}")]
    Protocol { feed: &'static str, offset: usize, reason: String },
}

impl FeedError {
    pub fn protocol(feed: &'static str, offset: usize, reason: impl Into<String>) -> Self {
        FeedError::Protocol { feed, offset, reason: reason.into() }
    }
}
