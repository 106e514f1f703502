//! Column mapping from provider rows to typed bars.
//!
//! Providers hand back positional, loosely-typed rows. A [`ColumnMap`]
//! declares which position carries which field; every row is checked against
//! it and rows that do not fit are rejected rather than coerced.

use crate::domain::Bar;
use chrono::{NaiveDate, NaiveDateTime};
use thiserror::Error;
use tracing::warn;

/// A bar field a provider column can map onto.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    Timestamp,
    Open,
    High,
    Low,
    Close,
    Volume,
    Turnover,
    Amplitude,
    PctChange,
    ChangeAmount,
    TurnoverRate,
    /// Column present in the payload but not stored.
    Skip,
}

impl Field {
    fn name(&self) -> &'static str {
        match self {
            Field::Timestamp => "timestamp",
            Field::Open => "open",
            Field::High => "high",
            Field::Low => "low",
            Field::Close => "close",
            Field::Volume => "volume",
            Field::Turnover => "turnover",
            Field::Amplitude => "amplitude",
            Field::PctChange => "pct_change",
            Field::ChangeAmount => "change_amount",
            Field::TurnoverRate => "turnover_rate",
            Field::Skip => "skip",
        }
    }
}

const REQUIRED: [Field; 6] = [
    Field::Timestamp,
    Field::Open,
    Field::High,
    Field::Low,
    Field::Close,
    Field::Volume,
];

#[derive(Debug, Error, PartialEq)]
pub enum RowError {
    #[error("layout is missing required column '{0}'")]
    LayoutMissing(&'static str),

    #[error("layout maps column '{0}' more than once")]
    LayoutDuplicate(&'static str),

    #[error("expected {expected} columns, found {found}")]
    WrongArity { expected: usize, found: usize },

    #[error("unparseable timestamp '{0}'")]
    BadTimestamp(String),

    #[error("column '{field}' has unparseable value '{value}'")]
    BadNumber { field: &'static str, value: String },

    #[error("row failed sanity checks (non-positive price or negative volume)")]
    NotWellFormed,
}

/// Positional layout of a provider row.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnMap {
    fields: Vec<Field>,
}

impl ColumnMap {
    /// Build a layout. Each required field must appear exactly once and no
    /// stored field may appear twice.
    pub fn new(fields: Vec<Field>) -> Result<Self, RowError> {
        for required in REQUIRED {
            if !fields.contains(&required) {
                return Err(RowError::LayoutMissing(required.name()));
            }
        }
        for (i, f) in fields.iter().enumerate() {
            if *f != Field::Skip && fields[..i].contains(f) {
                return Err(RowError::LayoutDuplicate(f.name()));
            }
        }
        Ok(Self { fields })
    }

    /// Eastmoney kline layout (`fields2=f51..f61`):
    /// date, open, close, high, low, volume, turnover, amplitude,
    /// pct change, change amount, turnover rate.
    pub fn eastmoney_daily() -> Self {
        Self {
            fields: vec![
                Field::Timestamp,
                Field::Open,
                Field::Close,
                Field::High,
                Field::Low,
                Field::Volume,
                Field::Turnover,
                Field::Amplitude,
                Field::PctChange,
                Field::ChangeAmount,
                Field::TurnoverRate,
            ],
        }
    }

    /// Eastmoney trends layout (`fields2=f51..f58`):
    /// time, open, close, high, low, volume, turnover, average price.
    pub fn eastmoney_minute() -> Self {
        Self {
            fields: vec![
                Field::Timestamp,
                Field::Open,
                Field::Close,
                Field::High,
                Field::Low,
                Field::Volume,
                Field::Turnover,
                Field::Skip,
            ],
        }
    }

    pub fn width(&self) -> usize {
        self.fields.len()
    }

    /// Map one row of cells.
    pub fn map_row(&self, cells: &[&str]) -> Result<Bar, RowError> {
        if cells.len() != self.fields.len() {
            return Err(RowError::WrongArity {
                expected: self.fields.len(),
                found: cells.len(),
            });
        }

        let mut timestamp = None;
        let mut bar = Bar::ohlcv(NaiveDateTime::default(), 0.0, 0.0, 0.0, 0.0, 0.0);

        for (field, raw) in self.fields.iter().zip(cells) {
            let raw = raw.trim();
            match field {
                Field::Timestamp => timestamp = Some(parse_timestamp(raw)?),
                Field::Open => bar.open = required(*field, raw)?,
                Field::High => bar.high = required(*field, raw)?,
                Field::Low => bar.low = required(*field, raw)?,
                Field::Close => bar.close = required(*field, raw)?,
                Field::Volume => bar.volume = required(*field, raw)?,
                Field::Turnover => bar.turnover = optional(*field, raw)?,
                Field::Amplitude => bar.amplitude = optional(*field, raw)?,
                Field::PctChange => bar.pct_change = optional(*field, raw)?,
                Field::ChangeAmount => bar.change_amount = optional(*field, raw)?,
                Field::TurnoverRate => bar.turnover_rate = optional(*field, raw)?,
                Field::Skip => {}
            }
        }

        // Layout validation guarantees a timestamp column.
        bar.timestamp = timestamp.ok_or(RowError::LayoutMissing("timestamp"))?;

        if !bar.is_well_formed() {
            return Err(RowError::NotWellFormed);
        }
        Ok(bar)
    }

    /// Map delimited text lines, dropping (and logging) rows that do not fit.
    pub fn map_lines<'a, I>(&self, symbol: &str, lines: I, delimiter: char) -> Vec<Bar>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut bars = Vec::new();
        let mut dropped = 0usize;

        for (row, line) in lines.into_iter().enumerate() {
            let cells: Vec<&str> = line.split(delimiter).collect();
            match self.map_row(&cells) {
                Ok(bar) => bars.push(bar),
                Err(e) => {
                    dropped += 1;
                    warn!(symbol, row, error = %e, "dropping malformed provider row");
                }
            }
        }

        if dropped > 0 {
            warn!(symbol, dropped, kept = bars.len(), "provider rows rejected by column map");
        }
        bars
    }
}

fn parse_timestamp(raw: &str) -> Result<NaiveDateTime, RowError> {
    for fmt in ["%Y-%m-%d %H:%M:%S", "%Y-%m-%d %H:%M"] {
        if let Ok(ts) = NaiveDateTime::parse_from_str(raw, fmt) {
            return Ok(ts);
        }
    }
    for fmt in ["%Y-%m-%d", "%Y%m%d"] {
        if let Ok(d) = NaiveDate::parse_from_str(raw, fmt) {
            return Ok(d.and_time(chrono::NaiveTime::MIN));
        }
    }
    Err(RowError::BadTimestamp(raw.to_string()))
}

fn required(field: Field, raw: &str) -> Result<f64, RowError> {
    optional(field, raw)?.ok_or_else(|| RowError::BadNumber {
        field: field.name(),
        value: raw.to_string(),
    })
}

/// Empty cells and the provider's "-" placeholder mean "not published".
fn optional(field: Field, raw: &str) -> Result<Option<f64>, RowError> {
    if raw.is_empty() || raw == "-" {
        return Ok(None);
    }
    match raw.parse::<f64>() {
        Ok(v) if v.is_finite() => Ok(Some(v)),
        _ => Err(RowError::BadNumber {
            field: field.name(),
            value: raw.to_string(),
        }),
    }
}
