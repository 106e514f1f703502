//! Progress callbacks for batch runs.

use crate::pipeline::InstrumentOutcome;
use quotevault_core::domain::Instrument;
use tracing::{debug, info, warn};

/// Progress callback for multi-instrument batches.
///
/// Called from pool workers, so implementations must be thread-safe and
/// callbacks for different instruments may interleave.
pub trait BatchProgress: Send + Sync {
    /// Called when a pipeline starts.
    fn on_start(&self, instrument: &Instrument, total: usize);

    /// Called when a pipeline finishes. `completed` counts finished
    /// pipelines including this one.
    fn on_complete(
        &self,
        instrument: &Instrument,
        completed: usize,
        total: usize,
        outcome: &InstrumentOutcome,
    );

    /// Called once when every pipeline has finished.
    fn on_batch_complete(&self, succeeded: usize, failed: usize, total: usize);
}

/// Reports progress through `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogProgress;

impl BatchProgress for LogProgress {
    fn on_start(&self, instrument: &Instrument, total: usize) {
        debug!(code = %instrument.code, market = %instrument.market, total, "pipeline started");
    }

    fn on_complete(
        &self,
        instrument: &Instrument,
        completed: usize,
        total: usize,
        outcome: &InstrumentOutcome,
    ) {
        match outcome {
            Ok(series) => info!(
                code = %instrument.code,
                rows = series.len(),
                completed,
                total,
                "instrument done"
            ),
            Err(failure) => warn!(
                code = %instrument.code,
                stage = %failure.stage,
                reason = %failure.reason,
                completed,
                total,
                "instrument failed"
            ),
        }
    }

    fn on_batch_complete(&self, succeeded: usize, failed: usize, total: usize) {
        info!(succeeded, failed, total, "batch complete");
    }
}
