//! Merging freshly fetched bars into a cached series.
//!
//! Cached rows are authoritative: a fresh row whose timestamp already exists
//! is discarded, except on the session day named by
//! [`MergeMode::RefreshSession`], where the fresh row replaces the cached one.
//! Nothing is ever removed from the cached side.

use crate::domain::{Bar, CachedSeries};
use chrono::NaiveDate;
use std::cmp::Ordering;
use tracing::warn;

/// How timestamp collisions between cached and fresh rows are resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeMode {
    /// Keep every cached row; fresh rows only fill new timestamps.
    AppendOnly,
    /// As `AppendOnly`, but fresh rows dated on this session day overwrite
    /// cached rows with the same timestamp.
    RefreshSession(NaiveDate),
}

/// Result of a merge plus what it did.
#[derive(Debug, Clone, PartialEq)]
pub struct MergeOutcome {
    pub series: CachedSeries,
    /// Fresh rows at timestamps not previously cached.
    pub appended: usize,
    /// Cached rows overwritten with different content on the refresh day.
    pub replaced: usize,
    /// Fresh rows discarded: malformed, repeated within the batch, or
    /// colliding with a cached row outside the refresh day.
    pub dropped: usize,
}

impl MergeOutcome {
    /// True when the merged series differs from the cached input.
    pub fn changed(&self) -> bool {
        self.appended > 0 || self.replaced > 0
    }
}

/// Merge `fresh` into `cached`.
///
/// The output is strictly increasing by timestamp and contains every cached
/// row (verbatim unless replaced on the refresh day).
pub fn merge(cached: &CachedSeries, fresh: Vec<Bar>, mode: MergeMode) -> MergeOutcome {
    let fresh_total = fresh.len();
    let mut malformed = 0usize;
    let valid: Vec<Bar> = fresh
        .into_iter()
        .filter(|b| {
            let ok = b.is_well_formed();
            if !ok {
                malformed += 1;
            }
            ok
        })
        .collect();
    if malformed > 0 {
        warn!(malformed, "dropping malformed fresh rows before merge");
    }

    // Stable sort + dedup keeps the first occurrence of each timestamp.
    let fresh = CachedSeries::from_bars(valid);
    let mut dropped = fresh_total - fresh.len();

    if cached.is_empty() {
        let appended = fresh.len();
        return MergeOutcome {
            series: fresh,
            appended,
            replaced: 0,
            dropped,
        };
    }

    let refresh_day = match mode {
        MergeMode::AppendOnly => None,
        MergeMode::RefreshSession(day) => Some(day),
    };

    let old = cached.bars();
    let new = fresh.into_bars();
    let mut out = Vec::with_capacity(old.len() + new.len());
    let mut appended = 0usize;
    let mut replaced = 0usize;

    let mut old_iter = old.iter().peekable();
    let mut new_iter = new.into_iter().peekable();

    loop {
        let order = match (old_iter.peek(), new_iter.peek()) {
            (Some(o), Some(n)) => o.timestamp.cmp(&n.timestamp),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => break,
        };

        match order {
            Ordering::Less => {
                if let Some(o) = old_iter.next() {
                    out.push(o.clone());
                }
            }
            Ordering::Greater => {
                if let Some(n) = new_iter.next() {
                    appended += 1;
                    out.push(n);
                }
            }
            Ordering::Equal => {
                if let (Some(o), Some(n)) = (old_iter.next(), new_iter.next()) {
                    if refresh_day == Some(n.date()) {
                        if *o != n {
                            replaced += 1;
                        }
                        out.push(n);
                    } else {
                        dropped += 1;
                        out.push(o.clone());
                    }
                }
            }
        }
    }

    MergeOutcome {
        series: CachedSeries::from_sorted(out),
        appended,
        replaced,
        dropped,
    }
}
