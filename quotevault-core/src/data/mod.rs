//! Data layer: providers, column mapping, calendar, cache, merge, derived fields.

pub mod cache;
pub mod calendar;
pub mod circuit_breaker;
pub mod columns;
pub mod derive;
pub mod eastmoney;
pub mod interval;
pub mod merge;
pub mod provider;
pub mod retry;
pub mod universe;

pub use cache::{CacheCompression, CacheConfig, CacheMeta, CacheStore};
pub use calendar::{CalendarError, SessionCalendar, TradingCalendar, WeekdayCalendar};
pub use circuit_breaker::{BreakerState, CircuitBreaker};
pub use columns::{ColumnMap, Field, RowError};
pub use derive::{annotate, annotate_bars, AnnotatedSeries, SHARES_PER_LOT};
pub use eastmoney::EastmoneyProvider;
pub use interval::{FetchPlan, IntervalResolver, PlanReason};
pub use merge::{merge, MergeMode, MergeOutcome};
pub use provider::{BarProvider, DataError};
pub use retry::RetryPolicy;
pub use universe::{Universe, UniverseError};
