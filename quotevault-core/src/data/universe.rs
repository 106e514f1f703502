//! Universe: the instrument lists a batch runs over.
//!
//! Stored as TOML with one code list per market:
//!
//! ```toml
//! equities = ["600000", "000001"]
//! funds = ["510300"]
//! ```
//!
//! or built from a live spot snapshot, keeping only tradable rows.

use crate::domain::{Instrument, InstrumentError, Market, SpotQuote};
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum UniverseError {
    #[error("read universe file {path}: {reason}")]
    Read { path: String, reason: String },

    #[error("parse universe TOML: {0}")]
    Parse(String),

    #[error(transparent)]
    Instrument(#[from] InstrumentError),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Universe {
    #[serde(default)]
    pub equities: Vec<String>,
    #[serde(default)]
    pub funds: Vec<String>,
}

impl Universe {
    pub fn from_file(path: &Path) -> Result<Self, UniverseError> {
        let content = std::fs::read_to_string(path).map_err(|e| UniverseError::Read {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self, UniverseError> {
        toml::from_str(content).map_err(|e| UniverseError::Parse(e.to_string()))
    }

    pub fn to_toml(&self) -> Result<String, UniverseError> {
        toml::to_string_pretty(self).map_err(|e| UniverseError::Parse(e.to_string()))
    }

    /// Build from spot snapshots. Quotes without a usable price (suspended,
    /// delisted) are left out, and equities are limited to the A-share boards.
    pub fn from_spot<'a>(quotes: impl IntoIterator<Item = &'a SpotQuote>) -> Self {
        let mut universe = Self::default();
        for quote in quotes.into_iter().filter(|q| q.is_tradable()) {
            match quote.market {
                Market::Equity if quote.is_a_share() => {
                    universe.equities.push(quote.code.clone())
                }
                Market::Equity => {}
                Market::Fund => universe.funds.push(quote.code.clone()),
            }
        }
        universe.equities.sort();
        universe.equities.dedup();
        universe.funds.sort();
        universe.funds.dedup();
        universe
    }

    /// Keep only one market's list.
    pub fn only(mut self, market: Market) -> Self {
        match market {
            Market::Equity => self.funds.clear(),
            Market::Fund => self.equities.clear(),
        }
        self
    }

    /// Validated instruments, equities first.
    pub fn instruments(&self) -> Result<Vec<Instrument>, UniverseError> {
        let equities = self.equities.iter().map(|c| Instrument::equity(c.as_str()));
        let funds = self.funds.iter().map(|c| Instrument::fund(c.as_str()));
        equities
            .chain(funds)
            .map(|r| r.map_err(UniverseError::from))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.equities.len() + self.funds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
