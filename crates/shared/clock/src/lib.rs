//! Arka Clock
//!
//! Time source abstraction. Candle windows, greeks throttling,
//! time-to-expiry and the time-exit rule all read the clock through this
//! trait so tests can drive time deterministically.

mod manual;
mod system;

pub use manual::ManualClock;
pub use system::SystemClock;

use chrono::{DateTime, Utc};

/// Source of "now".
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;

    fn now_millis(&self) -> i64 {
        self.now().timestamp_millis()
    }

    fn now_secs(&self) -> i64 {
        self.now().timestamp()
    }

    fn now_nanos(&self) -> i64 {
        self.now().timestamp_nanos_opt().unwrap_or(i64::MAX)
    }
}
