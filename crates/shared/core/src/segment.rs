//! Market segments
//!
//! Every instrument is identified by a `(segment, token)` pair. Tokens are
//! dense within a segment, so each segment carries a default token range used
//! to size the price store.

use serde::{Deserialize, Serialize};

/// The four market venues.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Segment {
    NseCm,
    NseFo,
    BseCm,
    BseFo,
}

impl Segment {
    pub const ALL: [Segment; 4] = [Segment::NseCm, Segment::NseFo, Segment::BseCm, Segment::BseFo];

    /// Exchange-assigned numeric segment code.
    pub fn code(&self) -> i32 {
        match self {
            Segment::NseCm => 1,
            Segment::NseFo => 2,
            Segment::BseCm => 11,
            Segment::BseFo => 12,
        }
    }

    pub fn from_code(code: i32) -> Option<Segment> {
        match code {
            1 => Some(Segment::NseCm),
            2 => Some(Segment::NseFo),
            11 => Some(Segment::BseCm),
            12 => Some(Segment::BseFo),
            _ => None,
        }
    }

    /// Default dense token range `(min, max)` inclusive.
    ///
    /// NSE F&O tokens live in 35000..=250000; the other venues carry wider
    /// legacy ranges. Stores may override these via configuration.
    pub fn default_token_range(&self) -> (u32, u32) {
        match self {
            Segment::NseCm => (1, 100_000),
            Segment::NseFo => (35_000, 250_000),
            Segment::BseCm => (500_000, 600_000),
            Segment::BseFo => (800_000, 900_000),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Segment::NseCm => "NSE_CM",
            Segment::NseFo => "NSE_FO",
            Segment::BseCm => "BSE_CM",
            Segment::BseFo => "BSE_FO",
        }
    }

    pub fn is_derivatives(&self) -> bool {
        matches!(self, Segment::NseFo | Segment::BseFo)
    }
}

impl std::fmt::Display for Segment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
