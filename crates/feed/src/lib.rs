//! Arka Feed
//!
//! Pure wire decoders for the four exchange multicast feeds. Decoding takes
//! a datagram and yields normalized `UnifiedUpdate` records; it performs no
//! I/O and no locking, so one decoder can be driven from a dedicated
//! receiver thread per feed.
//!
//! A malformed datagram yields a `FeedError::Protocol`; the caller drops the
//! packet and continues. `FeedDecoder::decode` wraps that policy with drop
//! counters.

pub mod bse;
mod bytes;
mod error;
pub mod nse;

pub use error::FeedError;

use arka_core::{Segment, UnifiedUpdate};
use std::sync::atomic::{AtomicU64, Ordering};

/// Decode statistics for one feed.
#[derive(Debug, Default)]
pub struct DecodeStats {
    pub datagrams: AtomicU64,
    pub records: AtomicU64,
    pub dropped: AtomicU64,
}

impl DecodeStats {
    pub fn datagrams(&self) -> u64 {
        self.datagrams.load(Ordering::Relaxed)
    }

    pub fn records(&self) -> u64 {
        self.records.load(Ordering::Relaxed)
    }

    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

/// Stateful decoder for one feed: segment dispatch plus drop accounting.
pub struct FeedDecoder {
    segment: Segment,
    stats: DecodeStats,
}

impl FeedDecoder {
    pub fn new(segment: Segment) -> Self {
        Self { segment, stats: DecodeStats::default() }
    }

    pub fn segment(&self) -> Segment {
        self.segment
    }

    pub fn stats(&self) -> &DecodeStats {
        &self.stats
    }

    /// Decode a datagram, returning the protocol error on failure.
    pub fn try_decode(&self, buf: &[u8]) -> Result<Vec<UnifiedUpdate>, FeedError> {
        match self.segment {
            Segment::NseCm | Segment::NseFo => nse::decode(self.segment, buf),
            Segment::BseCm | Segment::BseFo => bse::decode(self.segment, buf),
        }
    }

    /// Receiver-loop entry: decode, count, and swallow protocol errors.
    /// A bad datagram is logged and dropped; the stream continues.
    pub fn decode(&self, buf: &[u8]) -> Vec<UnifiedUpdate> {
        self.stats.datagrams.fetch_add(1, Ordering::Relaxed);
        match self.try_decode(buf) {
            Ok(updates) => {
                self.stats.records.fetch_add(updates.len() as u64, Ordering::Relaxed);
                updates
            }
            Err(e) => {
                self.stats.dropped.fetch_add(1, Ordering::Relaxed);
                log::warn!("{}: dropped datagram: {}", self.segment, e);
                Vec::new()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dropped_datagram_counted() {
        let decoder = FeedDecoder::new(Segment::NseFo);
        // Too short for even the broadcast header.
        assert!(decoder.decode(&[0u8; 8]).is_empty());
        assert_eq!(decoder.stats().dropped(), 1);
        assert_eq!(decoder.stats().datagrams(), 1);
    }

    #[test]
    fn test_record_accounting() {
        let decoder = FeedDecoder::new(Segment::NseFo);
        let mut buf = vec![0u8; 410];
        buf[10..12].copy_from_slice(&7200i16.to_be_bytes());
        buf[40..44].copy_from_slice(&49508i32.to_be_bytes());
        buf[52..56].copy_from_slice(&100_00u32.to_be_bytes());

        let updates = decoder.decode(&buf);
        assert_eq!(updates.len(), 1);
        assert_eq!(decoder.stats().records(), 1);
        assert_eq!(decoder.stats().dropped(), 0);
    }
}
