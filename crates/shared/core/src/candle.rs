//! Candles and timeframes

use serde::{Deserialize, Serialize};

/// Completed bars retained per `(segment, token, timeframe)` series.
pub const MAX_CANDLE_HISTORY: usize = 500;

/// OHLCV bar over a fixed time window.
///
/// `timestamp` is the window start in epoch seconds, aligned to the
/// timeframe duration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    pub timestamp: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: u64,
    pub open_interest: u64,
}

impl Candle {
    /// Seed a new bar from the first tick of a window.
    pub fn seed(timestamp: i64, price: f64) -> Self {
        Self {
            timestamp,
            open: price,
            high: price,
            low: price,
            close: price,
            volume: 0,
            open_interest: 0,
        }
    }

    /// True range against the previous close.
    pub fn true_range(&self, prev_close: f64) -> f64 {
        let hl = self.high - self.low;
        let hc = (self.high - prev_close).abs();
        let lc = (self.low - prev_close).abs();
        hl.max(hc).max(lc)
    }
}

/// Named bar duration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Timeframe {
    M1,
    M3,
    M5,
    M15,
    M30,
    H1,
    D1,
    W1,
}

impl Timeframe {
    pub const ALL: [Timeframe; 8] = [
        Timeframe::M1,
        Timeframe::M3,
        Timeframe::M5,
        Timeframe::M15,
        Timeframe::M30,
        Timeframe::H1,
        Timeframe::D1,
        Timeframe::W1,
    ];

    pub fn duration_secs(&self) -> i64 {
        match self {
            Timeframe::M1 => 60,
            Timeframe::M3 => 180,
            Timeframe::M5 => 300,
            Timeframe::M15 => 900,
            Timeframe::M30 => 1800,
            Timeframe::H1 => 3600,
            Timeframe::D1 => 86_400,
            Timeframe::W1 => 604_800,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Timeframe::M1 => "1m",
            Timeframe::M3 => "3m",
            Timeframe::M5 => "5m",
            Timeframe::M15 => "15m",
            Timeframe::M30 => "30m",
            Timeframe::H1 => "1h",
            Timeframe::D1 => "1d",
            Timeframe::W1 => "1w",
        }
    }

    /// Parse a timeframe name, accepting the loose forms templates use:
    /// `"D"`/`"d"` for daily, `"W"`/`"w"` for weekly, and bare minute
    /// counts such as `"5"` or `"15"`.
    pub fn parse(s: &str) -> Option<Timeframe> {
        let norm = match s {
            "D" | "d" => "1d".to_string(),
            "W" | "w" => "1w".to_string(),
            other if !other.is_empty() && other.chars().all(|c| c.is_ascii_digit()) => {
                format!("{other}m")
            }
            other => other.to_string(),
        };
        match norm.as_str() {
            "1m" => Some(Timeframe::M1),
            "3m" => Some(Timeframe::M3),
            "5m" => Some(Timeframe::M5),
            "15m" => Some(Timeframe::M15),
            "30m" => Some(Timeframe::M30),
            "1h" | "60m" => Some(Timeframe::H1),
            "1d" => Some(Timeframe::D1),
            "1w" => Some(Timeframe::W1),
            _ => None,
        }
    }

    /// Window start for a tick timestamp (epoch seconds).
    pub fn window_start(&self, ts_secs: i64) -> i64 {
        let d = self.duration_secs();
        (ts_secs / d) * d
    }
}

impl std::fmt::Display for Timeframe {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<String> for Timeframe {
    type Error = String;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Timeframe::parse(&s).ok_or_else(|| format!("unknown timeframe: {s}"))
    }
}

impl From<Timeframe> for String {
    fn from(tf: Timeframe) -> String {
        tf.as_str().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_normalization() {
        assert_eq!(Timeframe::parse("5"), Some(Timeframe::M5));
        assert_eq!(Timeframe::parse("D"), Some(Timeframe::D1));
        assert_eq!(Timeframe::parse("w"), Some(Timeframe::W1));
        assert_eq!(Timeframe::parse("1h"), Some(Timeframe::H1));
        assert_eq!(Timeframe::parse("7x"), None);
    }

    #[test]
    fn test_window_alignment() {
        let tf = Timeframe::M5;
        // 10:03:20 falls into the 10:00 window
        let ts = 10 * 3600 + 3 * 60 + 20;
        assert_eq!(tf.window_start(ts), 10 * 3600);
        // boundary tick opens a new window
        assert_eq!(tf.window_start(10 * 3600 + 300), 10 * 3600 + 300);
    }

    #[test]
    fn test_true_range() {
        let c = Candle { timestamp: 0, open: 10.0, high: 12.0, low: 9.0, close: 11.0, volume: 0, open_interest: 0 };
        assert!((c.true_range(13.0) - 4.0).abs() < 1e-9);
        assert!((c.true_range(10.5) - 3.0).abs() < 1e-9);
    }
}
