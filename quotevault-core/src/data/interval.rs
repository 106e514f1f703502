//! Deciding what range to fetch for a series.

use super::cache::CacheStore;
use super::calendar::TradingCalendar;
use crate::domain::SeriesKey;
use chrono::{Datelike, Months, NaiveDate};
use std::fmt;
use std::sync::Arc;
use tracing::warn;

/// Why a plan was chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlanReason {
    /// Nothing cached for the key.
    NoCache,
    /// Cache covers every session before `as_of`.
    UpToDate,
    /// Cache ends before the previous session.
    Stale,
    /// Calendar could not answer; fetch everything.
    CalendarUnavailable,
}

impl fmt::Display for PlanReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            PlanReason::NoCache => "no cache",
            PlanReason::UpToDate => "up to date",
            PlanReason::Stale => "stale",
            PlanReason::CalendarUnavailable => "calendar unavailable",
        })
    }
}

/// What to fetch for one series.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchPlan {
    /// First date to request.
    pub start: NaiveDate,
    /// Last date to request (the as-of date).
    pub end: NaiveDate,
    /// When true only the incremental tail is fetched and merged onto the cache.
    pub use_cache: bool,
    /// Whether `end` is itself a session. A calendar error counts as yes.
    pub as_of_is_session: bool,
    pub reason: PlanReason,
}

/// Turns "what is cached" plus "what day is it" into a [`FetchPlan`].
#[derive(Clone)]
pub struct IntervalResolver {
    calendar: Arc<dyn TradingCalendar>,
    history_years: u32,
}

impl fmt::Debug for IntervalResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IntervalResolver")
            .field("history_years", &self.history_years)
            .finish_non_exhaustive()
    }
}

impl IntervalResolver {
    pub fn new(calendar: Arc<dyn TradingCalendar>, history_years: u32) -> Self {
        Self {
            calendar,
            history_years,
        }
    }

    /// Start of a full-history fetch for `as_of`.
    pub fn history_start(&self, as_of: NaiveDate) -> NaiveDate {
        as_of
            .checked_sub_months(Months::new(12 * self.history_years))
            .unwrap_or_else(|| NaiveDate::from_ymd_opt(as_of.year(), 1, 1).unwrap_or(as_of))
    }

    /// Plan from the last cached session date.
    pub fn plan(&self, cached_through: Option<NaiveDate>, as_of: NaiveDate) -> FetchPlan {
        let as_of_is_session = self.calendar.is_trading_day(as_of).unwrap_or_else(|e| {
            warn!(%as_of, error = %e, "calendar failed; treating as-of as a session");
            true
        });

        let full = |reason| FetchPlan {
            start: self.history_start(as_of),
            end: as_of,
            use_cache: false,
            as_of_is_session,
            reason,
        };

        let Some(last) = cached_through else {
            return full(PlanReason::NoCache);
        };

        match self.calendar.previous_trading_session(as_of) {
            Ok(prev) if last >= prev => FetchPlan {
                start: as_of,
                end: as_of,
                use_cache: true,
                as_of_is_session,
                reason: PlanReason::UpToDate,
            },
            Ok(_) => full(PlanReason::Stale),
            Err(e) => {
                warn!(%as_of, error = %e, "calendar failed; falling back to full history");
                full(PlanReason::CalendarUnavailable)
            }
        }
    }

    /// Plan for a cache key, consulting the store's sidecar.
    pub fn resolve_range(
        &self,
        cache: &CacheStore,
        key: &SeriesKey,
        as_of: NaiveDate,
    ) -> FetchPlan {
        self.plan(cache.cached_through(key).map(|ts| ts.date()), as_of)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::cache::CacheConfig;
    use crate::data::calendar::{CalendarError, SessionCalendar};
    use crate::domain::{AdjustmentMode, Bar, CachedSeries, Instrument};

    fn d(m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, m, day).unwrap()
    }

    struct BrokenCalendar;

    impl TradingCalendar for BrokenCalendar {
        fn is_trading_day(&self, _date: NaiveDate) -> Result<bool, CalendarError> {
            Err(CalendarError::Load("offline".into()))
        }

        fn previous_trading_session(&self, _date: NaiveDate) -> Result<NaiveDate, CalendarError> {
            Err(CalendarError::Load("offline".into()))
        }
    }

    fn resolver() -> IntervalResolver {
        // 2024-10-01..07 is a holiday week.
        let cal = SessionCalendar::new([d(9, 27), d(9, 30), d(10, 8), d(10, 9), d(10, 10)]);
        IntervalResolver::new(Arc::new(cal), 3)
    }

    #[test]
    fn up_to_date_cache_fetches_only_as_of() {
        let plan = resolver().plan(Some(d(9, 30)), d(10, 8));
        assert!(plan.use_cache);
        assert_eq!(plan.start, d(10, 8));
        assert_eq!(plan.reason, PlanReason::UpToDate);
        assert!(plan.as_of_is_session);
    }

    #[test]
    fn stale_cache_fetches_full_history() {
        let plan = resolver().plan(Some(d(9, 27)), d(10, 9));
        assert!(!plan.use_cache);
        assert_eq!(plan.start, NaiveDate::from_ymd_opt(2021, 10, 9).unwrap());
        assert_eq!(plan.reason, PlanReason::Stale);
    }

    #[test]
    fn missing_cache_fetches_full_history() {
        let plan = resolver().plan(None, d(10, 10));
        assert!(!plan.use_cache);
        assert_eq!(plan.reason, PlanReason::NoCache);
        assert_eq!(plan.end, d(10, 10));
    }

    #[test]
    fn non_session_as_of_is_flagged() {
        let plan = resolver().plan(Some(d(9, 30)), d(10, 3));
        assert!(!plan.as_of_is_session);
        assert!(plan.use_cache);
    }

    #[test]
    fn calendar_failure_falls_back_to_history() {
        let r = IntervalResolver::new(Arc::new(BrokenCalendar), 2);
        let plan = r.plan(Some(d(10, 9)), d(10, 10));
        assert!(!plan.use_cache);
        assert!(plan.as_of_is_session);
        assert_eq!(plan.reason, PlanReason::CalendarUnavailable);
        assert_eq!(plan.start, NaiveDate::from_ymd_opt(2022, 10, 10).unwrap());
    }

    #[test]
    fn history_start_handles_leap_day() {
        let r = IntervalResolver::new(Arc::new(BrokenCalendar), 1);
        assert_eq!(r.history_start(d(2, 29)), NaiveDate::from_ymd_opt(2023, 2, 28).unwrap());
    }

    #[test]
    fn resolve_range_reads_the_store() {
        let dir = tempfile::tempdir().unwrap();
        let store = CacheStore::open(CacheConfig::new(dir.path())).unwrap();
        let key = SeriesKey::daily(Instrument::equity("600000").unwrap(), AdjustmentMode::Forward);

        let r = resolver();
        assert_eq!(r.resolve_range(&store, &key, d(10, 8)).reason, PlanReason::NoCache);

        let ts = d(9, 30).and_hms_opt(0, 0, 0).unwrap();
        let series = CachedSeries::from_bars(vec![Bar::ohlcv(ts, 1.0, 1.0, 1.0, 1.0, 1.0)]);
        store.write(&key, &series).unwrap();
        assert_eq!(r.resolve_range(&store, &key, d(10, 8)).reason, PlanReason::UpToDate);
    }
}
