//! Runner configuration
//!
//! One JSON document configures the process: per-segment feed endpoints,
//! greeks options, the contract master file and the strategy persistence
//! directory. Every field has a default so an empty document is a valid
//! configuration.

use arka_analytics::{BasePriceMode, GreeksConfig};
use arka_core::Segment;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config {path}: {source}")]
    Io { path: PathBuf, source: std::io::Error },
    #[error("cannot parse config {path}: {source}")]
    Parse { path: PathBuf, source: serde_json::Error },
}

/// One multicast feed endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedEndpoint {
    pub segment: Segment,
    #[serde(default = "default_true")]
    pub enabled: bool,
    pub multicast_address: String,
    pub port: u16,
}

fn default_true() -> bool {
    true
}

/// Greeks options as they appear in the config document.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GreeksOptions {
    pub enabled: bool,
    pub risk_free_rate: f64,
    pub dividend_yield: f64,
    /// "future" uses the nearest future with a cash fallback; "cash" reads
    /// the cash leg only.
    pub base_price_mode: String,
    pub throttle_ms: i64,
    pub calculate_on_every_feed: bool,
    pub iv_tolerance: f64,
    pub iv_max_iterations: u32,
    pub time_tick_interval_sec: u64,
    pub illiquid_threshold_sec: i64,
    pub illiquid_update_interval_sec: u64,
}

impl Default for GreeksOptions {
    fn default() -> Self {
        let d = GreeksConfig::default();
        Self {
            enabled: true,
            risk_free_rate: d.risk_free_rate,
            dividend_yield: d.dividend_yield,
            base_price_mode: "future".to_string(),
            throttle_ms: d.throttle_ms,
            calculate_on_every_feed: d.calculate_on_every_feed,
            iv_tolerance: d.tolerance,
            iv_max_iterations: d.max_iterations,
            time_tick_interval_sec: d.time_tick_secs,
            illiquid_threshold_sec: d.illiquid_threshold_secs,
            illiquid_update_interval_sec: d.illiquid_sweep_secs,
        }
    }
}

impl GreeksOptions {
    pub fn to_config(&self) -> GreeksConfig {
        GreeksConfig {
            risk_free_rate: self.risk_free_rate,
            dividend_yield: self.dividend_yield,
            base_price_mode: if self.base_price_mode.eq_ignore_ascii_case("cash") {
                BasePriceMode::Cash
            } else {
                BasePriceMode::Future
            },
            throttle_ms: self.throttle_ms,
            calculate_on_every_feed: self.calculate_on_every_feed,
            tolerance: self.iv_tolerance,
            max_iterations: self.iv_max_iterations,
            time_tick_secs: self.time_tick_interval_sec,
            illiquid_threshold_secs: self.illiquid_threshold_sec,
            illiquid_sweep_secs: self.illiquid_update_interval_sec,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RunnerConfig {
    pub feeds: Vec<FeedEndpoint>,
    pub greeks: GreeksOptions,
    /// Contract master JSON; `None` starts with empty stores.
    pub contracts_file: Option<PathBuf>,
    /// Strategy persistence directory.
    pub strategies_dir: PathBuf,
    /// Templates deployed at startup.
    pub templates: Vec<PathBuf>,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            feeds: Vec::new(),
            greeks: GreeksOptions::default(),
            contracts_file: None,
            strategies_dir: PathBuf::from("strategies"),
            templates: Vec::new(),
        }
    }
}

impl RunnerConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)
            .map_err(|source| ConfigError::Io { path: path.to_path_buf(), source })?;
        serde_json::from_str(&json)
            .map_err(|source| ConfigError::Parse { path: path.to_path_buf(), source })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_document_is_valid() {
        let config: RunnerConfig = serde_json::from_str("{}").unwrap();
        assert!(config.feeds.is_empty());
        assert_eq!(config.greeks.risk_free_rate, 0.065);
        assert_eq!(config.greeks.throttle_ms, 1000);
        assert!(config.greeks.enabled);
        assert_eq!(config.strategies_dir, PathBuf::from("strategies"));
    }

    #[test]
    fn test_partial_overrides() {
        let config: RunnerConfig = serde_json::from_str(
            r#"{
                "feeds": [
                    { "segment": "NseFo", "multicast_address": "239.60.60.44", "port": 10844 }
                ],
                "greeks": {
                    "throttle_ms": 250,
                    "calculate_on_every_feed": true,
                    "base_price_mode": "cash",
                    "dividend_yield": 0.012
                }
            }"#,
        )
        .unwrap();
        assert_eq!(config.feeds.len(), 1);
        assert!(config.feeds[0].enabled);
        let greeks = config.greeks.to_config();
        assert_eq!(greeks.throttle_ms, 250);
        assert!(greeks.calculate_on_every_feed);
        assert_eq!(greeks.base_price_mode, BasePriceMode::Cash);
        assert_eq!(greeks.dividend_yield, 0.012);
        // untouched options keep their defaults
        assert_eq!(greeks.max_iterations, 100);
    }

    #[test]
    fn test_base_price_mode_defaults_to_future() {
        let config: RunnerConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config.greeks.to_config().base_price_mode, BasePriceMode::Future);
    }
}
