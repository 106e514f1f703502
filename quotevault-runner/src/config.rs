//! Engine configuration loaded from TOML.
//!
//! Every field has a default, so an empty file (or no file) is a valid
//! configuration:
//!
//! ```toml
//! cache_dir = "cache"
//! compression = "zstd"
//! adjustment = "forward"
//! history_years = 3
//! workers = 8
//! intraday_delay_ms = 300
//! batch_timeout_secs = 3600
//! calendar_file = "calendar/sessions.csv"
//!
//! [retry]
//! max_attempts = 3
//! delay_ms = 2000
//! ```

use quotevault_core::data::{
    CacheCompression, CacheConfig, CalendarError, RetryPolicy, SessionCalendar, TradingCalendar,
    WeekdayCalendar,
};
use quotevault_core::domain::AdjustmentMode;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("read config file {path}: {reason}")]
    Read { path: PathBuf, reason: String },

    #[error("parse config TOML: {0}")]
    Parse(String),

    #[error("invalid config: {0}")]
    Invalid(String),

    #[error("trading calendar: {0}")]
    Calendar(#[from] CalendarError),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub cache_dir: PathBuf,
    pub compression: CacheCompression,
    pub adjustment: AdjustmentMode,
    /// Look-back for full-history fetches.
    pub history_years: u32,
    /// Worker threads per batch.
    pub workers: usize,
    pub retry: RetryPolicy,
    /// Pause after every intraday provider call.
    pub intraday_delay_ms: u64,
    /// Wall-clock budget for a batch; instruments not started in time fail.
    pub batch_timeout_secs: Option<u64>,
    /// CSV of session dates (`trade_date` column). Weekdays when absent.
    pub calendar_file: Option<PathBuf>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            cache_dir: PathBuf::from("cache"),
            compression: CacheCompression::default(),
            adjustment: AdjustmentMode::default(),
            history_years: 3,
            workers: 8,
            retry: RetryPolicy::default(),
            intraday_delay_ms: 300,
            batch_timeout_secs: None,
            calendar_file: None,
        }
    }
}

impl EngineConfig {
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.workers == 0 {
            return Err(ConfigError::Invalid("workers must be at least 1".into()));
        }
        if self.history_years == 0 {
            return Err(ConfigError::Invalid("history_years must be at least 1".into()));
        }
        if self.retry.max_attempts == 0 {
            return Err(ConfigError::Invalid("retry.max_attempts must be at least 1".into()));
        }
        Ok(())
    }

    pub fn cache_config(&self) -> CacheConfig {
        CacheConfig {
            root: self.cache_dir.clone(),
            compression: self.compression,
        }
    }

    pub fn intraday_delay(&self) -> Duration {
        Duration::from_millis(self.intraday_delay_ms)
    }

    pub fn batch_timeout(&self) -> Option<Duration> {
        self.batch_timeout_secs.map(Duration::from_secs)
    }

    /// The configured calendar: the session file when set, weekdays otherwise.
    pub fn load_calendar(&self) -> Result<Arc<dyn TradingCalendar>, ConfigError> {
        match &self.calendar_file {
            Some(path) => Ok(Arc::new(SessionCalendar::from_csv(path)?)),
            None => Ok(Arc::new(WeekdayCalendar::default())),
        }
    }
}
