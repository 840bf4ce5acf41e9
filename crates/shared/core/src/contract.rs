//! Contract metadata
//!
//! Static instrument data loaded from the exchange master files. The greeks
//! service and strategy bindings consult this through the
//! `ContractRepository` port.

use crate::segment::Segment;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum InstrumentKind {
    Equity,
    Index,
    Future,
    Option,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OptionKind {
    Call,
    Put,
}

impl OptionKind {
    pub fn from_code(code: &str) -> Option<OptionKind> {
        match code {
            "CE" => Some(OptionKind::Call),
            "PE" => Some(OptionKind::Put),
            _ => None,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            OptionKind::Call => "CE",
            OptionKind::Put => "PE",
        }
    }
}

/// Static contract record for one `(segment, token)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContractInfo {
    pub token: u32,
    pub segment: Segment,
    /// Underlying symbol name, e.g. "NIFTY" or "RELIANCE".
    pub symbol: String,
    pub display_name: String,
    pub kind: InstrumentKind,
    pub option_kind: Option<OptionKind>,
    pub strike: f64,
    pub expiry: Option<NaiveDate>,
    pub lot_size: u32,
    pub tick_size: f64,
    /// Underlying token; <= 0 for index derivatives (resolve by symbol).
    pub asset_token: i64,
}

impl ContractInfo {
    pub fn is_option(&self) -> bool {
        self.kind == InstrumentKind::Option
    }

    pub fn is_call(&self) -> bool {
        self.option_kind == Some(OptionKind::Call)
    }

    /// Parse the master-file expiry forms: `27MAR2026`, `27-MAR-2026`,
    /// `2026-03-27`, `27/03/2026`.
    pub fn parse_expiry(s: &str) -> Option<NaiveDate> {
        const FORMATS: [&str; 4] = ["%d%b%Y", "%d-%b-%Y", "%Y-%m-%d", "%d/%m/%Y"];
        FORMATS.iter().find_map(|fmt| NaiveDate::parse_from_str(s, fmt).ok())
    }
}
