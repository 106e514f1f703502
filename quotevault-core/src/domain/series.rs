//! Series identity (kind, adjustment, partition) and the cached row-set.

use super::bar::Bar;
use super::instrument::Instrument;
use chrono::{Datelike, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Granularity of a series.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SeriesKind {
    Daily,
    Minute,
}

impl SeriesKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SeriesKind::Daily => "daily",
            SeriesKind::Minute => "minute",
        }
    }
}

impl fmt::Display for SeriesKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SeriesKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "daily" | "day" => Ok(SeriesKind::Daily),
            "minute" | "min" | "1m" => Ok(SeriesKind::Minute),
            other => Err(format!("unknown series kind '{other}' (expected daily or minute)")),
        }
    }
}

/// Price-adjustment convention. Each mode has its own cache entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AdjustmentMode {
    /// Raw, unadjusted prices.
    None,
    /// Forward-adjusted ("qfq"): history rescaled to today's price level.
    #[default]
    Forward,
    /// Backward-adjusted ("hfq"): today rescaled to the listing price level.
    Backward,
}

impl AdjustmentMode {
    /// Short tag used in cache file names.
    pub fn tag(&self) -> &'static str {
        match self {
            AdjustmentMode::None => "raw",
            AdjustmentMode::Forward => "qfq",
            AdjustmentMode::Backward => "hfq",
        }
    }
}

impl FromStr for AdjustmentMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "none" | "raw" | "" => Ok(AdjustmentMode::None),
            "forward" | "qfq" => Ok(AdjustmentMode::Forward),
            "backward" | "hfq" => Ok(AdjustmentMode::Backward),
            other => Err(format!("unknown adjustment mode '{other}'")),
        }
    }
}

/// Calendar month used to partition minute series.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct YearMonth {
    pub year: i32,
    pub month: u32,
}

impl YearMonth {
    pub fn of(date: NaiveDate) -> Self {
        Self {
            year: date.year(),
            month: date.month(),
        }
    }

    /// True if `ts` falls inside this month.
    pub fn contains(&self, ts: NaiveDateTime) -> bool {
        ts.year() == self.year && ts.month() == self.month
    }
}

impl fmt::Display for YearMonth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}{:02}", self.year, self.month)
    }
}

impl FromStr for YearMonth {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.len() != 6 || !s.chars().all(|c| c.is_ascii_digit()) {
            return Err(format!("invalid month '{s}' (expected YYYYMM)"));
        }
        let year: i32 = s[..4].parse().map_err(|e| format!("invalid year in '{s}': {e}"))?;
        let month: u32 = s[4..].parse().map_err(|e| format!("invalid month in '{s}': {e}"))?;
        if !(1..=12).contains(&month) {
            return Err(format!("month out of range in '{s}'"));
        }
        Ok(Self { year, month })
    }
}

/// Identity of one cached series.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SeriesKey {
    pub instrument: Instrument,
    pub kind: SeriesKind,
    pub adjustment: AdjustmentMode,
    /// Set for minute series only.
    pub month: Option<YearMonth>,
}

impl SeriesKey {
    pub fn daily(instrument: Instrument, adjustment: AdjustmentMode) -> Self {
        Self {
            instrument,
            kind: SeriesKind::Daily,
            adjustment,
            month: None,
        }
    }

    pub fn minute(instrument: Instrument, adjustment: AdjustmentMode, month: YearMonth) -> Self {
        Self {
            instrument,
            kind: SeriesKind::Minute,
            adjustment,
            month: Some(month),
        }
    }
}

impl fmt::Display for SeriesKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.instrument, self.kind, self.adjustment.tag())?;
        if let Some(month) = self.month {
            write!(f, "/{month}")?;
        }
        Ok(())
    }
}

/// Bars for one key, strictly increasing by timestamp with no duplicates.
///
/// The invariant is established by [`CachedSeries::from_bars`] and preserved
/// by the merge engine; there is no other way to build one.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CachedSeries {
    bars: Vec<Bar>,
}

impl CachedSeries {
    /// Sort (stable) and drop repeated timestamps, keeping the first.
    pub fn from_bars(mut bars: Vec<Bar>) -> Self {
        bars.sort_by_key(|b| b.timestamp);
        bars.dedup_by_key(|b| b.timestamp);
        Self { bars }
    }

    /// Caller guarantees strict ordering.
    pub(crate) fn from_sorted(bars: Vec<Bar>) -> Self {
        debug_assert!(bars.windows(2).all(|w| w[0].timestamp < w[1].timestamp));
        Self { bars }
    }

    pub fn bars(&self) -> &[Bar] {
        &self.bars
    }

    pub fn into_bars(self) -> Vec<Bar> {
        self.bars
    }

    pub fn len(&self) -> usize {
        self.bars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bars.is_empty()
    }

    pub fn first_timestamp(&self) -> Option<NaiveDateTime> {
        self.bars.first().map(|b| b.timestamp)
    }

    pub fn last_timestamp(&self) -> Option<NaiveDateTime> {
        self.bars.last().map(|b| b.timestamp)
    }
}
