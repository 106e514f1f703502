//! Bar: the fundamental market data unit.

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

/// One time-stamped observation for a single instrument.
///
/// `timestamp` is exchange-local time. Daily bars carry midnight of the
/// session date. Volume is stored in the provider's unit (lots); the
/// share-unit view lives on [`AnnotatedBar`].
///
/// Fields that some endpoints do not publish are `Option` rather than NaN.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    pub timestamp: NaiveDateTime,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
    pub turnover: Option<f64>,
    pub amplitude: Option<f64>,
    pub pct_change: Option<f64>,
    pub change_amount: Option<f64>,
    pub turnover_rate: Option<f64>,
}

impl Bar {
    /// A bar with only the OHLCV columns populated.
    pub fn ohlcv(
        timestamp: NaiveDateTime,
        open: f64,
        high: f64,
        low: f64,
        close: f64,
        volume: f64,
    ) -> Self {
        Self {
            timestamp,
            open,
            high,
            low,
            close,
            volume,
            turnover: None,
            amplitude: None,
            pct_change: None,
            change_amount: None,
            turnover_rate: None,
        }
    }

    /// Session date of this bar.
    pub fn date(&self) -> NaiveDate {
        self.timestamp.date()
    }

    /// Prices are finite and positive and volume is finite and non-negative.
    ///
    /// High/low ordering is deliberately not checked: providers publish
    /// adjusted series where rounding can invert them by a tick.
    pub fn is_well_formed(&self) -> bool {
        [self.open, self.high, self.low, self.close]
            .iter()
            .all(|p| p.is_finite() && *p > 0.0)
            && self.volume.is_finite()
            && self.volume >= 0.0
    }
}

/// A bar after derived-field computation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnnotatedBar {
    pub bar: Bar,
    /// Volume in shares (provider lots × 100).
    pub volume_shares: f64,
    /// Close-to-close rate of change in percent. 0 for the first row.
    pub p_change: f64,
}
