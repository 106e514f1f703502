//! Per-instrument fetch pipeline.
//!
//! One pipeline runs to completion on one worker:
//! `Pending → Resolving → Fetching → Merging → Persisting → Annotated`,
//! or `Failed` from Resolving, Fetching or Persisting. Merging cannot fail.

use chrono::NaiveDate;
use quotevault_core::data::{
    annotate, merge, AnnotatedSeries, BarProvider, CacheStore, DataError, IntervalResolver,
    MergeMode, RetryPolicy,
};
use quotevault_core::domain::{
    AdjustmentMode, Bar, CachedSeries, Instrument, SeriesKey, SeriesKind, YearMonth,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info};

/// Where a pipeline is, or where it stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PipelineStage {
    Pending,
    Resolving,
    Fetching,
    Merging,
    Persisting,
    Annotated,
    Failed,
}

impl fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            PipelineStage::Pending => "pending",
            PipelineStage::Resolving => "resolving",
            PipelineStage::Fetching => "fetching",
            PipelineStage::Merging => "merging",
            PipelineStage::Persisting => "persisting",
            PipelineStage::Annotated => "annotated",
            PipelineStage::Failed => "failed",
        })
    }
}

/// Terminal failure of one instrument: the stage it failed in and why.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("failed while {stage}: {reason}")]
pub struct PipelineFailure {
    pub stage: PipelineStage,
    pub reason: String,
}

impl PipelineFailure {
    pub fn new(stage: PipelineStage, reason: impl Into<String>) -> Self {
        Self {
            stage,
            reason: reason.into(),
        }
    }
}

pub type InstrumentOutcome = Result<AnnotatedSeries, PipelineFailure>;

/// Everything a pipeline needs, borrowed from the batch runner.
pub struct Pipeline<'a> {
    pub provider: &'a dyn BarProvider,
    pub cache: &'a CacheStore,
    pub resolver: &'a IntervalResolver,
    pub retry: RetryPolicy,
    pub intraday_delay: Duration,
}

impl Pipeline<'_> {
    /// Run one instrument end to end.
    pub fn run(
        &self,
        instrument: &Instrument,
        kind: SeriesKind,
        adjustment: AdjustmentMode,
        as_of: NaiveDate,
    ) -> InstrumentOutcome {
        match kind {
            SeriesKind::Daily => self.run_daily(instrument, adjustment, as_of),
            SeriesKind::Minute => self.run_minute(instrument, adjustment, as_of),
        }
    }

    /// Provider call under the retry policy. Permanent errors stop early.
    fn fetch<F>(&self, op: F) -> Result<Vec<Bar>, PipelineFailure>
    where
        F: FnMut() -> Result<Vec<Bar>, DataError>,
    {
        self.retry
            .execute_when(op, DataError::is_retryable)
            .map_err(|e| PipelineFailure::new(PipelineStage::Fetching, e.to_string()))
    }

    fn persist(&self, key: &SeriesKey, series: &CachedSeries) -> Result<(), PipelineFailure> {
        self.retry
            .execute_when(|| self.cache.write(key, series), DataError::is_retryable)
            .map_err(|e| PipelineFailure::new(PipelineStage::Persisting, e.to_string()))
    }

    fn run_daily(
        &self,
        instrument: &Instrument,
        adjustment: AdjustmentMode,
        as_of: NaiveDate,
    ) -> InstrumentOutcome {
        let key = SeriesKey::daily(instrument.clone(), adjustment);

        // Resolving
        let cached = self.cache.read(&key).unwrap_or_default();
        let plan = self
            .resolver
            .plan(cached.last_timestamp().map(|ts| ts.date()), as_of);
        debug!(
            key = %key,
            stage = %PipelineStage::Resolving,
            reason = %plan.reason,
            start = %plan.start,
            cached = cached.len(),
            "fetch plan"
        );

        // Fetching
        let (fresh, mode) = if plan.use_cache && !cached.is_empty() {
            if plan.as_of_is_session {
                let rows =
                    self.fetch(|| self.provider.fetch_latest_day(instrument, as_of, adjustment))?;
                // Only the most recent cached day may be replaced. A rerun for
                // an earlier date can fill a gap but never rewrites a row.
                let is_latest = cached
                    .last_timestamp()
                    .is_some_and(|ts| ts.date() <= as_of);
                let mode = if is_latest {
                    MergeMode::RefreshSession(as_of)
                } else {
                    MergeMode::AppendOnly
                };
                (rows, mode)
            } else {
                debug!(key = %key, %as_of, "as-of is not a session; nothing to fetch");
                (Vec::new(), MergeMode::AppendOnly)
            }
        } else {
            let rows = self.fetch(|| {
                let rows = self
                    .provider
                    .fetch_daily(instrument, plan.start, plan.end, adjustment)?;
                if rows.is_empty() {
                    return Err(DataError::EmptyResponse {
                        symbol: instrument.code.clone(),
                    });
                }
                Ok(rows)
            })?;
            (rows, MergeMode::AppendOnly)
        };

        // Merging
        let fetched = fresh.len();
        let outcome = merge(&cached, fresh, mode);

        // Persisting
        if outcome.changed() {
            self.persist(&key, &outcome.series)?;
        }
        info!(
            key = %key,
            fetched,
            appended = outcome.appended,
            replaced = outcome.replaced,
            dropped = outcome.dropped,
            rows = outcome.series.len(),
            "daily series updated"
        );

        Ok(annotate(&outcome.series))
    }

    fn run_minute(
        &self,
        instrument: &Instrument,
        adjustment: AdjustmentMode,
        as_of: NaiveDate,
    ) -> InstrumentOutcome {
        let as_of_month = YearMonth::of(as_of);

        // Fetching: the provider only serves a recent window, so there is no
        // range to resolve. Every call is followed by the rate-limit pause.
        let fresh = self.fetch(|| {
            let result = self.provider.fetch_intraday_minute(instrument, adjustment);
            if !self.intraday_delay.is_zero() {
                std::thread::sleep(self.intraday_delay);
            }
            result
        })?;

        let mut by_month: BTreeMap<YearMonth, Vec<Bar>> = BTreeMap::new();
        for bar in fresh {
            by_month.entry(YearMonth::of(bar.date())).or_default().push(bar);
        }

        let mut current = None;
        for (month, rows) in by_month {
            let key = SeriesKey::minute(instrument.clone(), adjustment, month);
            let cached = self.cache.read(&key).unwrap_or_default();
            let outcome = merge(&cached, rows, MergeMode::AppendOnly);
            if outcome.changed() {
                self.persist(&key, &outcome.series)?;
            }
            debug!(
                key = %key,
                appended = outcome.appended,
                dropped = outcome.dropped,
                rows = outcome.series.len(),
                "minute partition merged"
            );
            if month == as_of_month {
                current = Some(outcome.series);
            }
        }

        let current = current.unwrap_or_else(|| {
            let key = SeriesKey::minute(instrument.clone(), adjustment, as_of_month);
            self.cache.read(&key).unwrap_or_default()
        });
        Ok(annotate(&current))
    }
}
