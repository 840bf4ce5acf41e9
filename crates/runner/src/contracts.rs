//! Static contract repository
//!
//! Loads the exchange contract masters from a JSON document and serves
//! lookups behind the `ContractRepository` port. Underlying resolution for
//! index derivatives goes by symbol: the cash-segment equity or index
//! record with the same symbol carries the spot price.

use arka_core::{ContractInfo, InstrumentKind, Segment};
use arka_ports::ContractRepository;
use std::collections::HashMap;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ContractLoadError {
    #[error("cannot read contract master {0}: {1}")]
    Io(String, std::io::Error),
    #[error("cannot parse contract master {0}: {1}")]
    Parse(String, serde_json::Error),
}

pub struct StaticContracts {
    by_key: HashMap<(Segment, u32), ContractInfo>,
    /// Cash token per symbol, from equity/index records in the CM segments.
    cash_by_symbol: HashMap<String, u32>,
}

impl StaticContracts {
    pub fn new(contracts: Vec<ContractInfo>) -> Self {
        let mut by_key = HashMap::new();
        let mut cash_by_symbol = HashMap::new();
        for c in contracts {
            if matches!(c.kind, InstrumentKind::Equity | InstrumentKind::Index)
                && matches!(c.segment, Segment::NseCm | Segment::BseCm)
            {
                cash_by_symbol.entry(c.symbol.to_uppercase()).or_insert(c.token);
            }
            by_key.insert((c.segment, c.token), c);
        }
        Self { by_key, cash_by_symbol }
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ContractLoadError> {
        let path = path.as_ref();
        let display = path.display().to_string();
        let json = std::fs::read_to_string(path)
            .map_err(|e| ContractLoadError::Io(display.clone(), e))?;
        let contracts: Vec<ContractInfo> =
            serde_json::from_str(&json).map_err(|e| ContractLoadError::Parse(display, e))?;
        log::info!("loaded {} contracts", contracts.len());
        Ok(Self::new(contracts))
    }

    pub fn empty() -> Self {
        Self::new(Vec::new())
    }

    pub fn segment_contracts(&self, segment: Segment) -> Vec<ContractInfo> {
        self.by_key.values().filter(|c| c.segment == segment).cloned().collect()
    }

    pub fn options(&self) -> impl Iterator<Item = &ContractInfo> {
        self.by_key.values().filter(|c| c.is_option())
    }

    pub fn len(&self) -> usize {
        self.by_key.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_key.is_empty()
    }
}

impl ContractRepository for StaticContracts {
    fn contract(&self, segment: Segment, token: u32) -> Option<ContractInfo> {
        self.by_key.get(&(segment, token)).cloned()
    }

    fn asset_token_for_symbol(&self, symbol: &str) -> Option<u32> {
        self.cash_by_symbol.get(&symbol.to_uppercase()).copied()
    }

    fn next_expiry_future_token(&self, symbol: &str, segment: Segment) -> Option<u32> {
        self.by_key
            .values()
            .filter(|c| {
                c.segment == segment
                    && c.kind == InstrumentKind::Future
                    && c.symbol.eq_ignore_ascii_case(symbol)
                    && c.expiry.is_some()
            })
            .min_by_key(|c| c.expiry)
            .map(|c| c.token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arka_core::OptionKind;
    use chrono::NaiveDate;

    fn contract(
        token: u32,
        segment: Segment,
        symbol: &str,
        kind: InstrumentKind,
        expiry: Option<&str>,
    ) -> ContractInfo {
        ContractInfo {
            token,
            segment,
            symbol: symbol.to_string(),
            display_name: symbol.to_string(),
            kind,
            option_kind: (kind == InstrumentKind::Option).then_some(OptionKind::Call),
            strike: 0.0,
            expiry: expiry.and_then(ContractInfo::parse_expiry),
            lot_size: 1,
            tick_size: 0.05,
            asset_token: 0,
        }
    }

    #[test]
    fn test_cash_resolution_by_symbol() {
        let repo = StaticContracts::new(vec![
            contract(2885, Segment::NseCm, "RELIANCE", InstrumentKind::Equity, None),
            contract(26000, Segment::NseCm, "NIFTY", InstrumentKind::Index, None),
        ]);
        assert_eq!(repo.asset_token_for_symbol("NIFTY"), Some(26000));
        assert_eq!(repo.asset_token_for_symbol("nifty"), Some(26000));
        assert_eq!(repo.asset_token_for_symbol("TCS"), None);
    }

    #[test]
    fn test_nearest_expiry_future() {
        let repo = StaticContracts::new(vec![
            contract(40_200, Segment::NseFo, "NIFTY", InstrumentKind::Future, Some("30APR2026")),
            contract(40_100, Segment::NseFo, "NIFTY", InstrumentKind::Future, Some("27MAR2026")),
            contract(40_300, Segment::NseFo, "BANKNIFTY", InstrumentKind::Future, Some("27MAR2026")),
        ]);
        assert_eq!(repo.next_expiry_future_token("NIFTY", Segment::NseFo), Some(40_100));
        assert_eq!(repo.next_expiry_future_token("NIFTY", Segment::BseFo), None);
    }

    #[test]
    fn test_expiry_parse_in_load_path() {
        let expect = NaiveDate::from_ymd_opt(2026, 3, 27);
        let c = contract(1, Segment::NseFo, "X", InstrumentKind::Future, Some("27MAR2026"));
        assert_eq!(c.expiry, expect);
    }
}
