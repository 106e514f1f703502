//! Domain types for quotevault

pub mod bar;
pub mod instrument;
pub mod series;

pub use bar::{AnnotatedBar, Bar};
pub use instrument::{A_SHARE_PREFIXES, Instrument, InstrumentError, Market, SpotQuote};
pub use series::{AdjustmentMode, CachedSeries, SeriesKey, SeriesKind, YearMonth};
