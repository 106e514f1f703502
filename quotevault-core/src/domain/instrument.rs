use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Market classifier. Equities and exchange-traded funds are served by
/// different provider endpoints and cached under separate roots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Market {
    Equity,
    Fund,
}

impl Market {
    pub fn as_str(&self) -> &'static str {
        match self {
            Market::Equity => "equity",
            Market::Fund => "fund",
        }
    }
}

impl fmt::Display for Market {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Market {
    type Err = InstrumentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "equity" | "stock" => Ok(Market::Equity),
            "fund" | "etf" => Ok(Market::Fund),
            other => Err(InstrumentError::UnknownMarket(other.to_string())),
        }
    }
}

/// A tradable instrument: exchange code plus market classifier.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Instrument {
    pub code: String,
    pub market: Market,
}

impl Instrument {
    /// Create an instrument, rejecting codes that cannot name a file.
    pub fn new(code: impl Into<String>, market: Market) -> Result<Self, InstrumentError> {
        let code = code.into();
        if code.is_empty() || !code.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(InstrumentError::InvalidCode(code));
        }
        Ok(Self { code, market })
    }

    pub fn equity(code: impl Into<String>) -> Result<Self, InstrumentError> {
        Self::new(code, Market::Equity)
    }

    pub fn fund(code: impl Into<String>) -> Result<Self, InstrumentError> {
        Self::new(code, Market::Fund)
    }

    /// Shanghai or Shenzhen A-share main, SME or ChiNext board equity.
    /// STAR, Beijing and B-share codes are excluded, as are all funds.
    pub fn is_a_share(&self) -> bool {
        self.market == Market::Equity && is_a_share_code(&self.code)
    }
}

/// Code prefixes of the A-share boards kept in the equity universe.
pub const A_SHARE_PREFIXES: [&str; 10] = [
    "600", "601", "603", "605", "000", "001", "002", "003", "300", "301",
];

pub(crate) fn is_a_share_code(code: &str) -> bool {
    code.len() == 6 && A_SHARE_PREFIXES.iter().any(|p| code.starts_with(p))
}

impl fmt::Display for Instrument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.market, self.code)
    }
}

/// One row of a market-wide spot snapshot.
///
/// `last_price` is `None` when the provider publishes no price, which means
/// the instrument is suspended or delisted for the session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpotQuote {
    pub code: String,
    pub name: String,
    pub market: Market,
    pub last_price: Option<f64>,
}

impl SpotQuote {
    /// True when the instrument traded with a usable price.
    pub fn is_tradable(&self) -> bool {
        self.last_price.is_some_and(|p| p.is_finite() && p > 0.0)
    }

    /// True for equity quotes on an A-share board; see [`Instrument::is_a_share`].
    pub fn is_a_share(&self) -> bool {
        self.market == Market::Equity && is_a_share_code(&self.code)
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum InstrumentError {
    #[error("invalid instrument code '{0}'")]
    InvalidCode(String),

    #[error("unknown market '{0}' (expected equity or fund)")]
    UnknownMarket(String),
}
