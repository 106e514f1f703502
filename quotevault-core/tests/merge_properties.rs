//! Property tests for merge invariants.
//!
//! Uses proptest to verify:
//! 1. Ordering: merged output is strictly increasing by timestamp
//! 2. Preservation: every cached row survives verbatim outside the refresh day
//! 3. Idempotence: merging the same fresh rows twice changes nothing the second time
//! 4. Monotonicity: the merged series never shrinks and covers the union of timestamps

use chrono::{Duration, NaiveDate, NaiveDateTime};
use proptest::prelude::*;
use quotevault_core::data::{annotate, merge, MergeMode};
use quotevault_core::domain::{Bar, CachedSeries};
use std::collections::BTreeSet;

// ── Strategies (proptest) ────────────────────────────────────────────

fn base() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2024, 1, 1)
        .unwrap()
        .and_hms_opt(0, 0, 0)
        .unwrap()
}

fn arb_price() -> impl Strategy<Value = f64> {
    (1.0..500.0_f64).prop_map(|p| (p * 100.0).round() / 100.0)
}

/// A bar on one of the first 60 days of 2024.
fn arb_bar() -> impl Strategy<Value = Bar> {
    (0..60i64, arb_price(), 0.0..1e6_f64).prop_map(|(day, close, volume)| {
        Bar::ohlcv(
            base() + Duration::days(day),
            close,
            close * 1.01,
            close * 0.99,
            close,
            volume.round(),
        )
    })
}

fn arb_bars() -> impl Strategy<Value = Vec<Bar>> {
    prop::collection::vec(arb_bar(), 0..40)
}

fn arb_mode() -> impl Strategy<Value = MergeMode> {
    prop_oneof![
        Just(MergeMode::AppendOnly),
        (0..60i64).prop_map(|d| MergeMode::RefreshSession((base() + Duration::days(d)).date())),
    ]
}

fn timestamps(series: &CachedSeries) -> BTreeSet<NaiveDateTime> {
    series.bars().iter().map(|b| b.timestamp).collect()
}

// ── Invariants ───────────────────────────────────────────────────────

proptest! {
    #[test]
    fn output_is_strictly_increasing(
        cached in arb_bars(),
        fresh in arb_bars(),
        mode in arb_mode(),
    ) {
        let cached = CachedSeries::from_bars(cached);
        let outcome = merge(&cached, fresh, mode);
        for w in outcome.series.bars().windows(2) {
            prop_assert!(w[0].timestamp < w[1].timestamp);
        }
    }

    #[test]
    fn cached_rows_are_preserved(cached in arb_bars(), fresh in arb_bars(), mode in arb_mode()) {
        let cached = CachedSeries::from_bars(cached);
        let outcome = merge(&cached, fresh, mode);
        let refresh_day = match mode {
            MergeMode::RefreshSession(d) => Some(d),
            MergeMode::AppendOnly => None,
        };

        for old in cached.bars() {
            let merged = outcome.series.bars().iter().find(|b| b.timestamp == old.timestamp);
            prop_assert!(merged.is_some(), "cached row {} disappeared", old.timestamp);
            if refresh_day != Some(old.date()) {
                prop_assert_eq!(merged.unwrap(), old);
            }
        }
    }

    #[test]
    fn merge_is_idempotent(cached in arb_bars(), fresh in arb_bars(), mode in arb_mode()) {
        let cached = CachedSeries::from_bars(cached);
        let once = merge(&cached, fresh.clone(), mode);
        let twice = merge(&once.series, fresh, mode);
        prop_assert_eq!(&twice.series, &once.series);
        prop_assert!(!twice.changed());
    }

    #[test]
    fn merge_covers_union_of_timestamps(
        cached in arb_bars(),
        fresh in arb_bars(),
        mode in arb_mode(),
    ) {
        let cached = CachedSeries::from_bars(cached);
        let fresh_ts: BTreeSet<_> = fresh.iter().map(|b| b.timestamp).collect();
        let outcome = merge(&cached, fresh, mode);

        let expected: BTreeSet<_> = timestamps(&cached).union(&fresh_ts).copied().collect();
        prop_assert_eq!(timestamps(&outcome.series), expected);
        prop_assert!(outcome.series.len() >= cached.len());
        prop_assert_eq!(outcome.series.len(), cached.len() + outcome.appended);
    }

    #[test]
    fn annotation_starts_at_zero_and_is_finite(cached in arb_bars()) {
        let series = CachedSeries::from_bars(cached);
        let annotated = annotate(&series);
        prop_assert_eq!(annotated.len(), series.len());
        if let Some(first) = annotated.bars().first() {
            prop_assert_eq!(first.p_change, 0.0);
        }
        for row in annotated.bars() {
            prop_assert!(row.p_change.is_finite());
            prop_assert_eq!(row.volume_shares, row.bar.volume * 100.0);
        }
    }
}

#[test]
fn full_history_into_empty_cache_equals_sorted_fresh() {
    let fresh: Vec<Bar> = (0..10)
        .rev()
        .map(|d| Bar::ohlcv(base() + Duration::days(d), 10.0, 10.5, 9.5, 10.0, 100.0))
        .collect();
    let outcome = merge(&CachedSeries::default(), fresh.clone(), MergeMode::AppendOnly);

    let mut expected = fresh;
    expected.sort_by_key(|b| b.timestamp);
    assert_eq!(outcome.series.bars(), expected.as_slice());
}
