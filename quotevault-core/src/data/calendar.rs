//! Trading calendar.
//!
//! The engine only asks two questions of a calendar: is this date a session,
//! and which session came before it. Both implementations here are plain
//! date sets; the engine never computes holidays itself.

use chrono::{Datelike, Duration, NaiveDate, Weekday};
use serde::Deserialize;
use std::collections::BTreeSet;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CalendarError {
    #[error("calendar has no session before {0}")]
    NoPriorSession(NaiveDate),

    #[error("calendar does not cover {date} (last known session {last})")]
    OutOfRange { date: NaiveDate, last: NaiveDate },

    #[error("calendar is empty")]
    Empty,

    #[error("calendar file: {0}")]
    Load(String),
}

/// Source of trading-session knowledge.
pub trait TradingCalendar: Send + Sync {
    fn is_trading_day(&self, date: NaiveDate) -> Result<bool, CalendarError>;

    /// The most recent session strictly before `date`.
    fn previous_trading_session(&self, date: NaiveDate) -> Result<NaiveDate, CalendarError>;
}

/// Calendar backed by an explicit list of session dates.
#[derive(Debug, Clone, Default)]
pub struct SessionCalendar {
    sessions: BTreeSet<NaiveDate>,
}

#[derive(Debug, Deserialize)]
struct SessionRecord {
    trade_date: NaiveDate,
}

impl SessionCalendar {
    pub fn new(sessions: impl IntoIterator<Item = NaiveDate>) -> Self {
        Self {
            sessions: sessions.into_iter().collect(),
        }
    }

    /// Load from a CSV file with a `trade_date` column (YYYY-MM-DD).
    pub fn from_csv(path: &Path) -> Result<Self, CalendarError> {
        let mut reader = csv::Reader::from_path(path)
            .map_err(|e| CalendarError::Load(format!("{}: {e}", path.display())))?;
        let mut sessions = BTreeSet::new();
        for record in reader.deserialize::<SessionRecord>() {
            let record =
                record.map_err(|e| CalendarError::Load(format!("{}: {e}", path.display())))?;
            sessions.insert(record.trade_date);
        }
        if sessions.is_empty() {
            return Err(CalendarError::Empty);
        }
        Ok(Self { sessions })
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    fn last(&self) -> Result<NaiveDate, CalendarError> {
        self.sessions.last().copied().ok_or(CalendarError::Empty)
    }

    fn check_range(&self, date: NaiveDate) -> Result<(), CalendarError> {
        let last = self.last()?;
        if date > last {
            return Err(CalendarError::OutOfRange { date, last });
        }
        Ok(())
    }
}

impl TradingCalendar for SessionCalendar {
    fn is_trading_day(&self, date: NaiveDate) -> Result<bool, CalendarError> {
        self.check_range(date)?;
        Ok(self.sessions.contains(&date))
    }

    fn previous_trading_session(&self, date: NaiveDate) -> Result<NaiveDate, CalendarError> {
        self.check_range(date)?;
        self.sessions
            .range(..date)
            .next_back()
            .copied()
            .ok_or(CalendarError::NoPriorSession(date))
    }
}

/// Monday–Friday minus a holiday list. Used when no session file is
/// configured; it never fails.
#[derive(Debug, Clone, Default)]
pub struct WeekdayCalendar {
    holidays: BTreeSet<NaiveDate>,
}

impl WeekdayCalendar {
    pub fn new(holidays: impl IntoIterator<Item = NaiveDate>) -> Self {
        Self {
            holidays: holidays.into_iter().collect(),
        }
    }

    fn is_session(&self, date: NaiveDate) -> bool {
        !matches!(date.weekday(), Weekday::Sat | Weekday::Sun) && !self.holidays.contains(&date)
    }
}

impl TradingCalendar for WeekdayCalendar {
    fn is_trading_day(&self, date: NaiveDate) -> Result<bool, CalendarError> {
        Ok(self.is_session(date))
    }

    fn previous_trading_session(&self, date: NaiveDate) -> Result<NaiveDate, CalendarError> {
        let mut day = date - Duration::days(1);
        // A holiday list never blanks out a whole year.
        for _ in 0..366 {
            if self.is_session(day) {
                return Ok(day);
            }
            day -= Duration::days(1);
        }
        Err(CalendarError::NoPriorSession(date))
    }
}
