//! Data provider trait and structured error types.
//!
//! The BarProvider trait abstracts over price sources (Eastmoney HTTP, test
//! doubles) so the fetch engine can be driven and mocked without knowing the
//! wire protocol. Providers do not retry and do not touch the cache; both
//! concerns sit above this trait.

use crate::domain::{AdjustmentMode, Bar, Instrument, Market, SpotQuote};
use chrono::NaiveDate;
use std::path::PathBuf;
use thiserror::Error;

/// Structured error types for data operations.
#[derive(Debug, Error)]
pub enum DataError {
    #[error("network unreachable: {0}")]
    NetworkUnreachable(String),

    #[error("rate limited by provider (retry after {retry_after_secs}s)")]
    RateLimited { retry_after_secs: u64 },

    #[error("response format changed: {0}")]
    ResponseFormatChanged(String),

    #[error("symbol not found: {symbol}")]
    SymbolNotFound { symbol: String },

    #[error("provider returned no rows for {symbol} where history was expected")]
    EmptyResponse { symbol: String },

    #[error("hard stop: data provider has blocked requests (circuit breaker tripped)")]
    CircuitBreakerTripped,

    #[error("cache error: {0}")]
    CacheError(String),

    #[error("cache root {path} is unusable: {reason}")]
    CacheRootUnavailable { path: PathBuf, reason: String },

    #[error("parquet I/O error: {0}")]
    ParquetError(String),

    #[error("data error: {0}")]
    Other(String),
}

impl DataError {
    /// Whether another attempt could plausibly succeed.
    ///
    /// Unknown symbols, a tripped breaker and an unusable cache root do not
    /// change between attempts.
    pub fn is_retryable(&self) -> bool {
        !matches!(
            self,
            DataError::SymbolNotFound { .. }
                | DataError::CircuitBreakerTripped
                | DataError::CacheRootUnavailable { .. }
        )
    }
}

/// Trait for bar providers.
///
/// An `Ok` with no rows means the provider legitimately has nothing (for
/// example same-day data before the publish cutoff). Faults are `Err`.
pub trait BarProvider: Send + Sync {
    /// Human-readable name of this provider.
    fn name(&self) -> &str;

    /// Daily bars over `[start, end]`, both inclusive.
    fn fetch_daily(
        &self,
        instrument: &Instrument,
        start: NaiveDate,
        end: NaiveDate,
        adjustment: AdjustmentMode,
    ) -> Result<Vec<Bar>, DataError>;

    /// The provider's recent 1-minute window (typically the last few sessions).
    fn fetch_intraday_minute(
        &self,
        instrument: &Instrument,
        adjustment: AdjustmentMode,
    ) -> Result<Vec<Bar>, DataError>;

    /// The daily bar for one session only.
    fn fetch_latest_day(
        &self,
        instrument: &Instrument,
        date: NaiveDate,
        adjustment: AdjustmentMode,
    ) -> Result<Vec<Bar>, DataError> {
        self.fetch_daily(instrument, date, date, adjustment)
    }

    /// Market-wide spot snapshot, used to build a tradable universe.
    fn fetch_spot(&self, market: Market) -> Result<Vec<SpotQuote>, DataError>;

    /// Check if the provider is currently available (not blocked).
    fn is_available(&self) -> bool;
}
