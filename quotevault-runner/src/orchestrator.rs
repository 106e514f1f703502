//! Batch orchestrator: runs one pipeline per instrument on a worker pool.
//!
//! The pool is private to the batch (built on entry, dropped on return) and
//! sized by `EngineConfig::workers`. Instrument failures are collected into
//! the report; only setup problems surface as `BatchError`.

use crate::config::{ConfigError, EngineConfig};
use crate::pipeline::{InstrumentOutcome, Pipeline, PipelineFailure, PipelineStage};
use crate::progress::{BatchProgress, LogProgress};
use chrono::NaiveDate;
use quotevault_core::data::{
    AnnotatedSeries, BarProvider, CacheStore, DataError, IntervalResolver, TradingCalendar,
};
use quotevault_core::domain::{AdjustmentMode, Instrument, SeriesKind};
use rayon::prelude::*;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::info;

/// Errors that stop a batch before any instrument runs.
#[derive(Debug, Error)]
pub enum BatchError {
    #[error("cache: {0}")]
    Cache(#[from] DataError),

    #[error("config: {0}")]
    Config(#[from] ConfigError),

    #[error("failed to build worker pool: {0}")]
    Pool(String),
}

/// One batch: which instruments, which series, as of which day.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchRequest {
    pub instruments: Vec<Instrument>,
    pub kind: SeriesKind,
    pub adjustment: AdjustmentMode,
    pub as_of: NaiveDate,
}

/// Per-instrument outcomes plus counts.
#[derive(Debug)]
pub struct BatchReport {
    pub outcomes: BTreeMap<Instrument, InstrumentOutcome>,
    pub succeeded: usize,
    pub failed: usize,
    pub elapsed: Duration,
}

impl BatchReport {
    pub fn total(&self) -> usize {
        self.outcomes.len()
    }

    pub fn all_succeeded(&self) -> bool {
        self.failed == 0
    }

    pub fn series(&self, instrument: &Instrument) -> Option<&AnnotatedSeries> {
        self.outcomes.get(instrument).and_then(|o| o.as_ref().ok())
    }

    pub fn failures(&self) -> impl Iterator<Item = (&Instrument, &PipelineFailure)> {
        self.outcomes
            .iter()
            .filter_map(|(inst, outcome)| outcome.as_ref().err().map(|f| (inst, f)))
    }
}

/// Owns the provider, cache and resolver shared by every pipeline.
pub struct BatchRunner {
    provider: Arc<dyn BarProvider>,
    cache: CacheStore,
    resolver: IntervalResolver,
    config: EngineConfig,
}

impl BatchRunner {
    /// Open the cache and wire the pieces together.
    pub fn new(
        config: EngineConfig,
        provider: Arc<dyn BarProvider>,
        calendar: Arc<dyn TradingCalendar>,
    ) -> Result<Self, BatchError> {
        config.validate()?;
        let cache = CacheStore::open(config.cache_config())?;
        let resolver = IntervalResolver::new(calendar, config.history_years);
        Ok(Self {
            provider,
            cache,
            resolver,
            config,
        })
    }

    /// As [`BatchRunner::new`], with the calendar the config names.
    pub fn from_config(
        config: EngineConfig,
        provider: Arc<dyn BarProvider>,
    ) -> Result<Self, BatchError> {
        let calendar = config.load_calendar()?;
        Self::new(config, provider, calendar)
    }

    pub fn cache(&self) -> &CacheStore {
        &self.cache
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Run a batch, logging progress.
    pub fn run_batch(&self, request: &BatchRequest) -> Result<BatchReport, BatchError> {
        self.run_batch_with(request, &LogProgress, None)
    }

    /// Run a batch with a progress sink and an optional cancel flag.
    ///
    /// The deadline and the cancel flag are checked when each pipeline
    /// starts; a running pipeline is never interrupted.
    pub fn run_batch_with(
        &self,
        request: &BatchRequest,
        progress: &dyn BatchProgress,
        cancel: Option<&AtomicBool>,
    ) -> Result<BatchReport, BatchError> {
        let started = Instant::now();
        let deadline = self.config.batch_timeout().map(|t| started + t);

        let mut instruments = request.instruments.clone();
        instruments.sort();
        instruments.dedup();
        let total = instruments.len();

        info!(
            total,
            kind = %request.kind,
            adjustment = request.adjustment.tag(),
            as_of = %request.as_of,
            provider = self.provider.name(),
            workers = self.config.workers,
            "batch started"
        );

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.config.workers)
            .thread_name(|i| format!("quotevault-worker-{i}"))
            .build()
            .map_err(|e| BatchError::Pool(e.to_string()))?;

        let pipeline = Pipeline {
            provider: self.provider.as_ref(),
            cache: &self.cache,
            resolver: &self.resolver,
            retry: self.config.retry,
            intraday_delay: self.config.intraday_delay(),
        };
        let completed = AtomicUsize::new(0);

        let results: Vec<(Instrument, InstrumentOutcome)> = pool.install(|| {
            instruments
                .par_iter()
                .map(|instrument| {
                    progress.on_start(instrument, total);

                    let outcome = if cancel.is_some_and(|f| f.load(Ordering::Relaxed)) {
                        Err(PipelineFailure::new(PipelineStage::Resolving, "batch cancelled"))
                    } else if deadline.is_some_and(|d| Instant::now() >= d) {
                        Err(PipelineFailure::new(
                            PipelineStage::Resolving,
                            "batch deadline exceeded",
                        ))
                    } else {
                        pipeline.run(instrument, request.kind, request.adjustment, request.as_of)
                    };

                    let done = completed.fetch_add(1, Ordering::Relaxed) + 1;
                    progress.on_complete(instrument, done, total, &outcome);
                    (instrument.clone(), outcome)
                })
                .collect()
        });

        let failed = results.iter().filter(|(_, o)| o.is_err()).count();
        let succeeded = results.len() - failed;
        progress.on_batch_complete(succeeded, failed, total);

        Ok(BatchReport {
            outcomes: results.into_iter().collect(),
            succeeded,
            failed,
            elapsed: started.elapsed(),
        })
    }
}
