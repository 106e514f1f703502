//! Derived fields computed on read.
//!
//! Nothing here touches the cache; the stored series keeps provider values
//! and every consumer gets the annotated view through [`annotate`].

use crate::domain::{AnnotatedBar, Bar, CachedSeries};
use serde::{Deserialize, Serialize};

/// Provider volume is quoted in lots of 100 shares.
pub const SHARES_PER_LOT: f64 = 100.0;

/// A cached series with derived fields attached.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnnotatedSeries {
    bars: Vec<AnnotatedBar>,
}

impl AnnotatedSeries {
    pub fn bars(&self) -> &[AnnotatedBar] {
        &self.bars
    }

    pub fn len(&self) -> usize {
        self.bars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bars.is_empty()
    }

    pub fn last(&self) -> Option<&AnnotatedBar> {
        self.bars.last()
    }

    /// The last `n` rows (or all of them if shorter).
    pub fn tail(&self, n: usize) -> &[AnnotatedBar] {
        &self.bars[self.bars.len().saturating_sub(n)..]
    }
}

/// Attach percent change and share volume to every row.
pub fn annotate(series: &CachedSeries) -> AnnotatedSeries {
    AnnotatedSeries {
        bars: annotate_bars(series.bars()),
    }
}

/// Annotate an ordered slice of bars.
///
/// `p_change` is the one-period rate of change of close in percent. The
/// first row has no predecessor and gets 0; a non-finite result (previous
/// close 0) is also 0.
pub fn annotate_bars(bars: &[Bar]) -> Vec<AnnotatedBar> {
    let mut prev_close: Option<f64> = None;
    bars.iter()
        .map(|bar| {
            let p_change = match prev_close {
                Some(prev) => {
                    let roc = (bar.close - prev) / prev * 100.0;
                    if roc.is_finite() {
                        roc
                    } else {
                        0.0
                    }
                }
                None => 0.0,
            };
            prev_close = Some(bar.close);
            AnnotatedBar {
                bar: bar.clone(),
                volume_shares: bar.volume * SHARES_PER_LOT,
                p_change,
            }
        })
        .collect()
}
