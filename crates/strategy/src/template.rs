//! Strategy templates
//!
//! A template is the JSON document a strategy instance is created from:
//! the bound symbol slots, indicator definitions, parameters with their
//! recompute triggers, entry and exit condition trees, the order policy and
//! the risk policy. Templates are data; the runtime gives them behavior.

use crate::condition::ConditionNode;
use arka_core::{OrderSide, Segment, Timeframe};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Default recompute period for `OnSchedule` parameters.
pub const DEFAULT_SCHEDULE_SECS: u64 = 300;

fn default_schedule_secs() -> u64 {
    DEFAULT_SCHEDULE_SECS
}

fn default_product_type() -> String {
    "NRML".to_string()
}

/// When a parameter's formula is re-evaluated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParamTrigger {
    EveryTick,
    OnCandleClose,
    OnEntry,
    OnExit,
    OnceAtStart,
    OnSchedule,
    /// Frozen at its configured value; only an operator edit changes it.
    Manual,
}

/// One named parameter. `formula` recomputes the value on `trigger`;
/// a `Manual` parameter keeps `value` as given.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParameterDef {
    pub key: String,
    #[serde(default)]
    pub value: f64,
    #[serde(default)]
    pub formula: String,
    pub trigger: ParamTrigger,
    /// Locked parameters reject edits while the strategy runs.
    #[serde(default)]
    pub locked: bool,
    #[serde(default = "default_schedule_secs")]
    pub schedule_secs: u64,
    /// Candle-close trigger filter; `None` accepts the strategy timeframe.
    #[serde(default)]
    pub timeframe: Option<String>,
}

/// Indicator definition. Numeric fields accept `{{param}}` placeholders
/// resolved against the parameter table at bind time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndicatorDef {
    pub id: String,
    /// SMA, EMA, RSI, MACD, BB, ATR, STOCH, ADX, OBV, VOLUME.
    pub kind: String,
    /// Symbol slot this indicator runs on; `None` uses the primary slot.
    #[serde(default)]
    pub symbol: Option<String>,
    #[serde(default)]
    pub period: Option<String>,
    #[serde(default)]
    pub fast: Option<String>,
    #[serde(default)]
    pub slow: Option<String>,
    #[serde(default)]
    pub signal: Option<String>,
    #[serde(default)]
    pub k_period: Option<String>,
    #[serde(default)]
    pub d_period: Option<String>,
    #[serde(default)]
    pub multiplier: Option<f64>,
    /// Candle price the indicator reads: open, high, low, close, hl2,
    /// hlc3, ohlc4. Defaults to close.
    #[serde(default)]
    pub price_field: Option<String>,
    /// Override of the strategy timeframe for this indicator.
    #[serde(default)]
    pub timeframe: Option<String>,
}

/// How limit prices are formed for emitted orders.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PricingMode {
    Market,
    /// Join the near touch.
    Passive,
    /// Cross the far touch with a tick buffer.
    Aggressive,
    /// Mid when the spread is wide, aggressive when it is tight.
    Smart,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderPolicy {
    pub quantity: u32,
    #[serde(default = "OrderPolicy::default_pricing")]
    pub pricing: PricingMode,
    #[serde(default = "default_product_type")]
    pub product_type: String,
}

impl OrderPolicy {
    fn default_pricing() -> PricingMode {
        PricingMode::Market
    }
}

/// Hard limits checked before signals. All optional; absent means
/// unchecked.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RiskPolicy {
    #[serde(default)]
    pub max_daily_trades: Option<u32>,
    #[serde(default)]
    pub max_daily_loss_rs: Option<f64>,
    /// Adverse move percent that forces an exit.
    #[serde(default)]
    pub stop_loss_pct: Option<f64>,
    /// Favorable move percent that takes profit.
    #[serde(default)]
    pub target_pct: Option<f64>,
    /// Unrealized profit percent that arms the trailing stop.
    #[serde(default)]
    pub trailing_trigger_pct: Option<f64>,
    /// Retrace percent from the best price that closes an armed position.
    #[serde(default)]
    pub trailing_amount_pct: Option<f64>,
    /// Square-off time of day, `HH:MM` IST.
    #[serde(default)]
    pub time_exit: Option<String>,
}

/// What a symbol slot is for: `Reference` slots only feed conditions and
/// formulas, `Trade` slots also receive entry and exit orders.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SymbolRole {
    Reference,
    Trade,
}

/// One bound instrument, addressed from conditions and formulas by its
/// slot id (`TRADE_1`, `REF_1`, ...).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SymbolDefinition {
    pub slot: String,
    #[serde(default)]
    pub label: String,
    pub role: SymbolRole,
    pub segment: Segment,
    pub token: u32,
    pub timeframe: Timeframe,
    /// Entry direction for a `Trade` slot; exits take the opposite side.
    /// Absent defaults to Buy.
    #[serde(default)]
    pub entry_side: Option<OrderSide>,
}

impl SymbolDefinition {
    pub fn entry_side(&self) -> OrderSide {
        self.entry_side.unwrap_or(OrderSide::Buy)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StrategyTemplate {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub symbols: Vec<SymbolDefinition>,
    #[serde(default)]
    pub indicators: Vec<IndicatorDef>,
    #[serde(default)]
    pub parameters: Vec<ParameterDef>,
    /// Named formulas referenced from conditions as `F_<name>`.
    #[serde(default)]
    pub formulas: HashMap<String, String>,
    #[serde(default)]
    pub entry: Option<ConditionNode>,
    #[serde(default)]
    pub exit: Option<ConditionNode>,
    pub order: OrderPolicy,
    #[serde(default)]
    pub risk: RiskPolicy,
}

impl StrategyTemplate {
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    pub fn parameter(&self, key: &str) -> Option<&ParameterDef> {
        self.parameters.iter().find(|p| p.key == key)
    }

    pub fn symbol(&self, slot: &str) -> Option<&SymbolDefinition> {
        self.symbols.iter().find(|s| s.slot == slot)
    }

    /// The slot unqualified conditions and formulas read: the first `Trade`
    /// slot, or the first slot when none trades.
    pub fn primary(&self) -> Option<&SymbolDefinition> {
        self.symbols
            .iter()
            .find(|s| s.role == SymbolRole::Trade)
            .or_else(|| self.symbols.first())
    }

    /// Slots that receive orders, in template order.
    pub fn trade_slots(&self) -> impl Iterator<Item = &SymbolDefinition> {
        self.symbols.iter().filter(|s| s.role == SymbolRole::Trade)
    }

    /// Resolve a `{{param}}` placeholder or literal numeric field against
    /// the parameter table. Unresolvable fields fall back to `default`.
    pub fn resolve_placeholder(&self, field: Option<&str>, default: f64) -> f64 {
        let Some(raw) = field else {
            return default;
        };
        let raw = raw.trim();
        if let Some(name) = raw.strip_prefix("{{").and_then(|s| s.strip_suffix("}}")) {
            return self.parameter(name.trim()).map_or(default, |p| p.value);
        }
        raw.parse().unwrap_or(default)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TEMPLATE: &str = r#"{
        "id": "tpl-rsi-1",
        "name": "RSI crossover",
        "symbols": [
            { "slot": "TRADE_1", "role": "Trade", "segment": "NseFo",
              "token": 49508, "timeframe": "5m" }
        ],
        "indicators": [
            { "id": "RSI_MAIN", "kind": "RSI", "period": "{{period}}" }
        ],
        "parameters": [
            { "key": "period", "value": 14, "trigger": "manual", "locked": true },
            { "key": "threshold", "value": 30, "trigger": "manual" }
        ],
        "entry": {
            "type": "compare",
            "left": "I_RSI_MAIN",
            "op": "crosses_above",
            "right": "S_threshold"
        },
        "order": { "quantity": 50, "pricing": "passive" },
        "risk": { "max_daily_trades": 5, "stop_loss_pct": 1.5, "time_exit": "15:15" }
    }"#;

    #[test]
    fn test_template_round_trip() {
        let t = StrategyTemplate::from_json(TEMPLATE).unwrap();
        assert_eq!(t.symbols.len(), 1);
        assert_eq!(t.symbols[0].token, 49508);
        assert_eq!(t.symbols[0].timeframe, Timeframe::M5);
        assert_eq!(t.symbols[0].entry_side(), OrderSide::Buy);
        assert_eq!(t.order.pricing, PricingMode::Passive);
        assert_eq!(t.risk.max_daily_trades, Some(5));
        assert!(t.exit.is_none());

        let json = t.to_json().unwrap();
        let back = StrategyTemplate::from_json(&json).unwrap();
        assert_eq!(back.id, t.id);
        assert_eq!(back.parameters.len(), 2);
    }

    #[test]
    fn test_symbol_slots_and_roles() {
        let json = r#"{
            "id": "tpl-pair-1",
            "name": "Index-led option entry",
            "symbols": [
                { "slot": "REF_1", "label": "NIFTY spot", "role": "Reference",
                  "segment": "NseCm", "token": 26000, "timeframe": "1m" },
                { "slot": "TRADE_1", "label": "22000 CE", "role": "Trade",
                  "segment": "NseFo", "token": 49600, "timeframe": "5m",
                  "entry_side": "Buy" },
                { "slot": "TRADE_2", "label": "22000 PE", "role": "Trade",
                  "segment": "NseFo", "token": 49601, "timeframe": "5m",
                  "entry_side": "Sell" }
            ],
            "order": { "quantity": 75 }
        }"#;
        let t = StrategyTemplate::from_json(json).unwrap();
        assert_eq!(t.symbols.len(), 3);
        assert_eq!(t.symbol("REF_1").unwrap().role, SymbolRole::Reference);
        assert_eq!(t.symbol("REF_1").unwrap().label, "NIFTY spot");
        // primary is the first Trade slot, not the first symbol
        assert_eq!(t.primary().unwrap().slot, "TRADE_1");
        let trades: Vec<&str> = t.trade_slots().map(|s| s.slot.as_str()).collect();
        assert_eq!(trades, vec!["TRADE_1", "TRADE_2"]);
        assert_eq!(t.symbol("TRADE_2").unwrap().entry_side(), OrderSide::Sell);
        assert!(t.symbol("TRADE_9").is_none());
    }

    #[test]
    fn test_reference_only_template_has_primary() {
        let json = r#"{
            "id": "tpl-watch",
            "name": "Watch only",
            "symbols": [
                { "slot": "REF_1", "role": "Reference", "segment": "NseCm",
                  "token": 26000, "timeframe": "1m" }
            ],
            "order": { "quantity": 1 }
        }"#;
        let t = StrategyTemplate::from_json(json).unwrap();
        assert_eq!(t.primary().unwrap().slot, "REF_1");
        assert_eq!(t.trade_slots().count(), 0);
    }

    #[test]
    fn test_placeholder_resolution() {
        let t = StrategyTemplate::from_json(TEMPLATE).unwrap();
        assert_eq!(t.resolve_placeholder(Some("{{period}}"), 14.0), 14.0);
        assert_eq!(t.resolve_placeholder(Some("{{ threshold }}"), 14.0), 30.0);
        assert_eq!(t.resolve_placeholder(Some("21"), 14.0), 21.0);
        assert_eq!(t.resolve_placeholder(Some("{{missing}}"), 14.0), 14.0);
        assert_eq!(t.resolve_placeholder(None, 14.0), 14.0);
    }

    #[test]
    fn test_schedule_default() {
        let json = r#"{ "key": "x", "trigger": "on_schedule" }"#;
        let p: ParameterDef = serde_json::from_str(json).unwrap();
        assert_eq!(p.schedule_secs, DEFAULT_SCHEDULE_SECS);
        assert!(!p.locked);
    }
}
