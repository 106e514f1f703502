//! QuoteVault Runner: batch orchestration over the core data layer.
//!
//! This crate builds on `quotevault-core` to provide:
//! - Engine configuration loaded from TOML
//! - Per-instrument pipelines (resolve, fetch, merge, persist, annotate)
//! - A batch runner on a private worker pool with deadline and cancellation
//! - Progress reporting through `tracing`

pub mod config;
pub mod orchestrator;
pub mod pipeline;
pub mod progress;

pub use config::{ConfigError, EngineConfig};
pub use orchestrator::{BatchError, BatchReport, BatchRequest, BatchRunner};
pub use pipeline::{InstrumentOutcome, Pipeline, PipelineFailure, PipelineStage};
pub use progress::{BatchProgress, LogProgress};

#[cfg(test)]
mod send_sync_checks {
    use super::*;

    fn assert_send<T: Send>() {}
    fn assert_sync<T: Sync>() {}

    #[test]
    fn config_is_send_sync() {
        assert_send::<EngineConfig>();
        assert_sync::<EngineConfig>();
    }

    #[test]
    fn batch_runner_is_send_sync() {
        assert_send::<BatchRunner>();
        assert_sync::<BatchRunner>();
    }

    #[test]
    fn batch_report_is_send_sync() {
        assert_send::<BatchReport>();
        assert_sync::<BatchReport>();
    }

    #[test]
    fn pipeline_failure_is_send_sync() {
        assert_send::<PipelineFailure>();
        assert_sync::<PipelineFailure>();
    }

    #[test]
    fn log_progress_is_send_sync() {
        assert_send::<LogProgress>();
        assert_sync::<LogProgress>();
    }
}
