//! Parquet series cache with Hive-style partitioning.
//!
//! Layout:
//! - daily:  `{root}/market={market}/kind=daily/{code}_{adj}.parquet`
//! - minute: `{root}/market={market}/kind=minute/month={YYYYMM}/{code}_{adj}.parquet`
//!
//! Features:
//! - Atomic writes (write to .tmp, fsync, rename into place)
//! - Compressed Parquet (zstd unless configured otherwise)
//! - Corrupt files are quarantined ({filename}.{stamp}.quarantined) and read as absent
//! - Metadata sidecar per key (hash, timestamp range, row count)
//!
//! The store never deletes rows. Writes replace a whole file with a series
//! the merge engine produced from the previous contents.

use super::provider::DataError;
use crate::domain::{
    AdjustmentMode, Bar, CachedSeries, Instrument, SeriesKey, SeriesKind, YearMonth,
};
use chrono::{DateTime, NaiveDateTime};
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, error, warn};

/// Parquet compression codec for series files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheCompression {
    #[default]
    Zstd,
    Snappy,
    Uncompressed,
}

impl CacheCompression {
    fn to_parquet(self) -> ParquetCompression {
        match self {
            CacheCompression::Zstd => ParquetCompression::Zstd(None),
            CacheCompression::Snappy => ParquetCompression::Snappy,
            CacheCompression::Uncompressed => ParquetCompression::Uncompressed,
        }
    }
}

/// Construction parameters for [`CacheStore`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheConfig {
    pub root: PathBuf,
    #[serde(default)]
    pub compression: CacheCompression,
}

impl CacheConfig {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            compression: CacheCompression::default(),
        }
    }
}

/// Metadata sidecar for a cached series.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheMeta {
    pub instrument: Instrument,
    pub kind: SeriesKind,
    pub adjustment: AdjustmentMode,
    pub month: Option<YearMonth>,
    pub first: NaiveDateTime,
    pub last: NaiveDateTime,
    pub bar_count: usize,
    pub data_hash: String,
    pub cached_at: NaiveDateTime,
}

/// The on-disk series cache.
#[derive(Debug, Clone)]
pub struct CacheStore {
    config: CacheConfig,
}

impl CacheStore {
    /// Open the cache, creating the root directory.
    ///
    /// Failure here is fatal for a batch: there is nowhere to persist to.
    pub fn open(config: CacheConfig) -> Result<Self, DataError> {
        fs::create_dir_all(&config.root).map_err(|e| DataError::CacheRootUnavailable {
            path: config.root.clone(),
            reason: e.to_string(),
        })?;
        if !config.root.is_dir() {
            return Err(DataError::CacheRootUnavailable {
                path: config.root.clone(),
                reason: "not a directory".into(),
            });
        }
        Ok(Self { config })
    }

    /// Root directory of the cache.
    pub fn root(&self) -> &Path {
        &self.config.root
    }

    /// Directory holding the files for a key.
    fn partition_dir(&self, key: &SeriesKey) -> PathBuf {
        let mut dir = self
            .config
            .root
            .join(format!("market={}", key.instrument.market))
            .join(format!("kind={}", key.kind));
        if let Some(month) = key.month {
            dir = dir.join(format!("month={month}"));
        }
        dir
    }

    fn file_stem(key: &SeriesKey) -> String {
        format!("{}_{}", key.instrument.code, key.adjustment.tag())
    }

    /// Path to the Parquet file for a key.
    pub fn data_path(&self, key: &SeriesKey) -> PathBuf {
        self.partition_dir(key)
            .join(format!("{}.parquet", Self::file_stem(key)))
    }

    /// Path to the metadata sidecar for a key.
    fn meta_path(&self, key: &SeriesKey) -> PathBuf {
        self.partition_dir(key)
            .join(format!("{}.meta.json", Self::file_stem(key)))
    }

    /// Load the cached series for a key.
    ///
    /// Returns `None` when nothing is cached. An unreadable file is
    /// quarantined, logged and also reported as `None`, so the caller falls
    /// back to a full-history fetch.
    pub fn read(&self, key: &SeriesKey) -> Option<CachedSeries> {
        let path = self.data_path(key);
        if !path.is_file() {
            return None;
        }

        match load_and_validate_parquet(&path) {
            Ok(bars) => {
                let raw_len = bars.len();
                let series = CachedSeries::from_bars(bars);
                if series.len() != raw_len {
                    warn!(
                        key = %key,
                        dropped = raw_len - series.len(),
                        "cache file had duplicate timestamps; keeping first occurrence"
                    );
                }
                Some(series)
            }
            Err(e) => {
                let quarantine = quarantine_path(&path);
                warn!(
                    key = %key,
                    path = %path.display(),
                    quarantine = %quarantine.display(),
                    error = %e,
                    "quarantining corrupt cache file"
                );
                if let Err(rename_err) = fs::rename(&path, &quarantine) {
                    error!(
                        key = %key,
                        path = %path.display(),
                        error = %rename_err,
                        "failed to quarantine corrupt cache file"
                    );
                }
                match fs::remove_file(self.meta_path(key)) {
                    Ok(()) => {}
                    Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
                    Err(err) => warn!(key = %key, error = %err, "failed to remove cache sidecar"),
                }
                None
            }
        }
    }

    /// Persist a whole series for a key, replacing any previous version.
    pub fn write(&self, key: &SeriesKey, series: &CachedSeries) -> Result<(), DataError> {
        let (first, last) = match (series.first_timestamp(), series.last_timestamp()) {
            (Some(first), Some(last)) => (first, last),
            _ => return Err(DataError::CacheError("no bars to cache".into())),
        };

        let dir = self.partition_dir(key);
        fs::create_dir_all(&dir)
            .map_err(|e| DataError::CacheError(format!("failed to create dir: {e}")))?;

        let mut df = bars_to_dataframe(series.bars())?;
        let path = self.data_path(key);
        let tmp_path = path.with_extension("parquet.tmp");

        write_parquet(&mut df, &tmp_path, self.config.compression)?;
        rename_into_place(&tmp_path, &path)?;

        let meta = CacheMeta {
            instrument: key.instrument.clone(),
            kind: key.kind,
            adjustment: key.adjustment,
            month: key.month,
            first,
            last,
            bar_count: series.len(),
            data_hash: blake3::hash(
                &serde_json::to_vec(series.bars())
                    .map_err(|e| DataError::CacheError(format!("hash serialization: {e}")))?,
            )
            .to_hex()
            .to_string(),
            cached_at: chrono::Local::now().naive_local(),
        };
        let meta_json = serde_json::to_string_pretty(&meta)
            .map_err(|e| DataError::CacheError(format!("meta serialization: {e}")))?;
        let meta_path = self.meta_path(key);
        let meta_tmp = meta_path.with_extension("json.tmp");
        fs::write(&meta_tmp, meta_json)
            .map_err(|e| DataError::CacheError(format!("meta write: {e}")))?;
        rename_into_place(&meta_tmp, &meta_path)?;

        debug!(key = %key, rows = series.len(), "cache written");
        Ok(())
    }

    /// Metadata sidecar for a key, if present and readable.
    pub fn meta(&self, key: &SeriesKey) -> Option<CacheMeta> {
        let content = fs::read_to_string(self.meta_path(key)).ok()?;
        serde_json::from_str(&content).ok()
    }

    /// Timestamp of the newest cached bar.
    ///
    /// Reads the sidecar; falls back to the data file when the sidecar is
    /// missing (e.g. a crash between the two renames).
    pub fn cached_through(&self, key: &SeriesKey) -> Option<NaiveDateTime> {
        match self.meta(key) {
            Some(meta) => Some(meta.last),
            None => self.read(key).and_then(|s| s.last_timestamp()),
        }
    }

    /// All readable sidecars under the root, sorted by instrument then partition.
    pub fn entries(&self) -> Vec<CacheMeta> {
        let mut metas = Vec::new();
        let mut stack = vec![self.config.root.clone()];

        while let Some(dir) = stack.pop() {
            let Ok(entries) = fs::read_dir(&dir) else {
                continue;
            };
            for entry in entries.flatten() {
                let path = entry.path();
                if path.is_dir() {
                    stack.push(path);
                } else if path
                    .file_name()
                    .and_then(|n| n.to_str())
                    .is_some_and(|n| n.ends_with(".meta.json"))
                {
                    match fs::read_to_string(&path)
                        .ok()
                        .and_then(|c| serde_json::from_str::<CacheMeta>(&c).ok())
                    {
                        Some(meta) => metas.push(meta),
                        None => warn!(path = %path.display(), "unreadable cache sidecar"),
                    }
                }
            }
        }

        metas.sort_by(|a, b| {
            (&a.instrument, a.kind.as_str(), a.adjustment.tag(), a.month).cmp(&(
                &b.instrument,
                b.kind.as_str(),
                b.adjustment.tag(),
                b.month,
            ))
        });
        metas
    }
}

fn rename_into_place(tmp_path: &Path, path: &Path) -> Result<(), DataError> {
    fs::rename(tmp_path, path).map_err(|e| {
        // Clean up temp file on rename failure
        let _ = fs::remove_file(tmp_path);
        DataError::CacheError(format!("atomic rename failed: {e}"))
    })
}

// ── Parquet I/O helpers ─────────────────────────────────────────────

const COLUMNS: [&str; 11] = [
    "timestamp",
    "open",
    "high",
    "low",
    "close",
    "volume",
    "turnover",
    "amplitude",
    "pct_change",
    "change_amount",
    "turnover_rate",
];

fn to_epoch_secs(ts: NaiveDateTime) -> i64 {
    ts.and_utc().timestamp()
}

fn from_epoch_secs(secs: i64) -> Option<NaiveDateTime> {
    DateTime::from_timestamp(secs, 0).map(|dt| dt.naive_utc())
}

/// Convert bars to a Polars DataFrame.
fn bars_to_dataframe(bars: &[Bar]) -> Result<DataFrame, DataError> {
    let timestamps: Vec<i64> = bars.iter().map(|b| to_epoch_secs(b.timestamp)).collect();
    let opens: Vec<f64> = bars.iter().map(|b| b.open).collect();
    let highs: Vec<f64> = bars.iter().map(|b| b.high).collect();
    let lows: Vec<f64> = bars.iter().map(|b| b.low).collect();
    let closes: Vec<f64> = bars.iter().map(|b| b.close).collect();
    let volumes: Vec<f64> = bars.iter().map(|b| b.volume).collect();
    let turnovers: Vec<Option<f64>> = bars.iter().map(|b| b.turnover).collect();
    let amplitudes: Vec<Option<f64>> = bars.iter().map(|b| b.amplitude).collect();
    let pct_changes: Vec<Option<f64>> = bars.iter().map(|b| b.pct_change).collect();
    let change_amounts: Vec<Option<f64>> = bars.iter().map(|b| b.change_amount).collect();
    let turnover_rates: Vec<Option<f64>> = bars.iter().map(|b| b.turnover_rate).collect();

    DataFrame::new(vec![
        Column::new("timestamp".into(), timestamps),
        Column::new("open".into(), opens),
        Column::new("high".into(), highs),
        Column::new("low".into(), lows),
        Column::new("close".into(), closes),
        Column::new("volume".into(), volumes),
        Column::new("turnover".into(), turnovers),
        Column::new("amplitude".into(), amplitudes),
        Column::new("pct_change".into(), pct_changes),
        Column::new("change_amount".into(), change_amounts),
        Column::new("turnover_rate".into(), turnover_rates),
    ])
    .map_err(|e| DataError::ParquetError(format!("dataframe creation: {e}")))
}

/// Timestamped quarantine name next to `path`. Earlier quarantined copies
/// are never overwritten.
fn quarantine_path(path: &Path) -> PathBuf {
    let stamp = chrono::Local::now().format("%Y%m%dT%H%M%S%3f");
    let base = path.with_extension(format!("parquet.{stamp}.quarantined"));
    if !base.exists() {
        return base;
    }
    (1u32..)
        .map(|n| path.with_extension(format!("parquet.{stamp}-{n}.quarantined")))
        .find(|candidate| !candidate.exists())
        .unwrap_or(base)
}

/// Write a DataFrame to a Parquet file and flush it to disk.
fn write_parquet(
    df: &mut DataFrame,
    path: &Path,
    compression: CacheCompression,
) -> Result<(), DataError> {
    let mut file =
        fs::File::create(path).map_err(|e| DataError::ParquetError(format!("create file: {e}")))?;
    ParquetWriter::new(&mut file)
        .with_compression(compression.to_parquet())
        .finish(df)
        .map_err(|e| DataError::ParquetError(format!("write parquet: {e}")))?;
    file.sync_all()
        .map_err(|e| DataError::ParquetError(format!("fsync: {e}")))?;
    Ok(())
}

/// Load a Parquet file and validate its integrity.
fn load_and_validate_parquet(path: &Path) -> Result<Vec<Bar>, DataError> {
    let file = fs::File::open(path).map_err(|e| DataError::ParquetError(format!("open: {e}")))?;
    let df = ParquetReader::new(file)
        .finish()
        .map_err(|e| DataError::ParquetError(format!("read: {e}")))?;

    if df.height() == 0 {
        return Err(DataError::CacheError("empty parquet file".into()));
    }

    for col_name in &COLUMNS {
        if df.column(col_name).is_err() {
            return Err(DataError::CacheError(format!("missing column '{col_name}'")));
        }
    }

    dataframe_to_bars(&df)
}

/// Convert a DataFrame back to bars.
fn dataframe_to_bars(df: &DataFrame) -> Result<Vec<Bar>, DataError> {
    let f64_col = |name: &str| -> Result<Float64Chunked, DataError> {
        df.column(name)
            .and_then(|c| c.f64().cloned())
            .map_err(|e| DataError::ParquetError(format!("{name} column: {e}")))
    };

    let ts_ca = df
        .column("timestamp")
        .and_then(|c| c.i64().cloned())
        .map_err(|e| DataError::ParquetError(format!("timestamp column: {e}")))?;
    let open_ca = f64_col("open")?;
    let high_ca = f64_col("high")?;
    let low_ca = f64_col("low")?;
    let close_ca = f64_col("close")?;
    let vol_ca = f64_col("volume")?;
    let turnover_ca = f64_col("turnover")?;
    let amplitude_ca = f64_col("amplitude")?;
    let pct_ca = f64_col("pct_change")?;
    let change_ca = f64_col("change_amount")?;
    let rate_ca = f64_col("turnover_rate")?;

    let n = df.height();
    let mut bars = Vec::with_capacity(n);
    let missing = |name: &str, i: usize| DataError::ParquetError(format!("null {name} at row {i}"));

    for i in 0..n {
        let secs = ts_ca.get(i).ok_or_else(|| missing("timestamp", i))?;
        let timestamp = from_epoch_secs(secs)
            .ok_or_else(|| DataError::ParquetError(format!("timestamp out of range at row {i}")))?;

        bars.push(Bar {
            timestamp,
            open: open_ca.get(i).ok_or_else(|| missing("open", i))?,
            high: high_ca.get(i).ok_or_else(|| missing("high", i))?,
            low: low_ca.get(i).ok_or_else(|| missing("low", i))?,
            close: close_ca.get(i).ok_or_else(|| missing("close", i))?,
            volume: vol_ca.get(i).ok_or_else(|| missing("volume", i))?,
            turnover: turnover_ca.get(i),
            amplitude: amplitude_ca.get(i),
            pct_change: pct_ca.get(i),
            change_amount: change_ca.get(i),
            turnover_rate: rate_ca.get(i),
        });
    }

    Ok(bars)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn ts(y: i32, m: u32, d: u32, h: u32, min: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d)
            .unwrap()
            .and_hms_opt(h, min, 0)
            .unwrap()
    }

    fn sample_series() -> CachedSeries {
        let mut first = Bar::ohlcv(ts(2024, 1, 2, 0, 0), 10.0, 10.4, 9.9, 10.2, 1000.0);
        first.turnover = Some(1_020_000.0);
        first.pct_change = Some(1.5);
        let second = Bar::ohlcv(ts(2024, 1, 3, 0, 0), 10.2, 10.6, 10.1, 10.5, 1100.0);
        CachedSeries::from_bars(vec![first, second])
    }

    fn daily_key(code: &str) -> SeriesKey {
        SeriesKey::daily(Instrument::equity(code).unwrap(), AdjustmentMode::Forward)
    }

    fn open_store(dir: &Path) -> CacheStore {
        CacheStore::open(CacheConfig::new(dir)).unwrap()
    }

    #[test]
    fn write_and_read_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(dir.path());
        let key = daily_key("600000");

        store.write(&key, &sample_series()).unwrap();
        let loaded = store.read(&key).unwrap();

        assert_eq!(loaded, sample_series());
        assert_eq!(loaded.bars()[0].turnover, Some(1_020_000.0));
        assert_eq!(loaded.bars()[1].pct_change, None);
    }

    #[test]
    fn read_missing_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(dir.path());
        assert!(store.read(&daily_key("000001")).is_none());
        assert!(store.cached_through(&daily_key("000001")).is_none());
    }

    #[test]
    fn layout_is_partitioned() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(dir.path());

        let daily = daily_key("600000");
        assert_eq!(
            store.data_path(&daily),
            dir.path().join("market=equity/kind=daily/600000_qfq.parquet")
        );

        let minute = SeriesKey::minute(
            Instrument::fund("510300").unwrap(),
            AdjustmentMode::Forward,
            "202410".parse().unwrap(),
        );
        assert_eq!(
            store.data_path(&minute),
            dir.path()
                .join("market=fund/kind=minute/month=202410/510300_qfq.parquet")
        );
    }

    #[test]
    fn adjustment_modes_do_not_share_entries() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(dir.path());
        let inst = Instrument::equity("600000").unwrap();

        store
            .write(&SeriesKey::daily(inst.clone(), AdjustmentMode::Forward), &sample_series())
            .unwrap();
        assert!(store
            .read(&SeriesKey::daily(inst, AdjustmentMode::None))
            .is_none());
    }

    #[test]
    fn corrupt_file_is_quarantined_and_reads_as_none() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(dir.path());
        let key = daily_key("600000");
        store.write(&key, &sample_series()).unwrap();

        let path = store.data_path(&key);
        fs::write(&path, b"definitely not parquet").unwrap();

        assert!(store.read(&key).is_none());
        assert!(!path.exists());
        assert_eq!(quarantined_files(&path).len(), 1);
        assert!(store.meta(&key).is_none());
    }

    fn quarantined_files(path: &Path) -> Vec<String> {
        let prefix = format!("{}.", path.file_name().unwrap().to_string_lossy());
        fs::read_dir(path.parent().unwrap())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .filter(|n| n.starts_with(&prefix) && n.ends_with(".quarantined"))
            .collect()
    }

    #[test]
    fn repeated_corruption_keeps_every_quarantined_copy() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(dir.path());
        let key = daily_key("600000");
        let path = store.data_path(&key);

        store.write(&key, &sample_series()).unwrap();
        fs::write(&path, b"first bad file").unwrap();
        assert!(store.read(&key).is_none());

        store.write(&key, &sample_series()).unwrap();
        fs::write(&path, b"second bad file").unwrap();
        assert!(store.read(&key).is_none());

        let mut contents: Vec<Vec<u8>> = quarantined_files(&path)
            .iter()
            .map(|n| fs::read(path.with_file_name(n)).unwrap())
            .collect();
        contents.sort();
        assert_eq!(contents, vec![b"first bad file".to_vec(), b"second bad file".to_vec()]);
    }

    #[test]
    fn write_leaves_no_temp_files() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(dir.path());
        let key = daily_key("600000");
        store.write(&key, &sample_series()).unwrap();
        store.write(&key, &sample_series()).unwrap();

        let names: Vec<String> = fs::read_dir(store.data_path(&key).parent().unwrap())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert!(names.iter().all(|n| !n.ends_with(".tmp")), "{names:?}");
        assert_eq!(names.len(), 2);
    }

    #[test]
    fn empty_series_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(dir.path());
        assert!(store
            .write(&daily_key("600000"), &CachedSeries::default())
            .is_err());
    }

    #[test]
    fn meta_tracks_range_and_hash() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(dir.path());
        let key = daily_key("600000");
        store.write(&key, &sample_series()).unwrap();

        let meta = store.meta(&key).unwrap();
        assert_eq!(meta.bar_count, 2);
        assert_eq!(meta.first, ts(2024, 1, 2, 0, 0));
        assert_eq!(meta.last, ts(2024, 1, 3, 0, 0));
        assert_eq!(meta.data_hash.len(), 64);
        assert_eq!(store.cached_through(&key), Some(ts(2024, 1, 3, 0, 0)));
    }

    #[test]
    fn cached_through_falls_back_to_data_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(dir.path());
        let key = daily_key("600000");
        store.write(&key, &sample_series()).unwrap();
        fs::remove_file(store.meta_path(&key)).unwrap();

        assert_eq!(store.cached_through(&key), Some(ts(2024, 1, 3, 0, 0)));
    }

    #[test]
    fn entries_lists_every_partition() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(dir.path());
        let fund = Instrument::fund("510300").unwrap();

        store.write(&daily_key("600000"), &sample_series()).unwrap();
        for month in ["202409", "202410"] {
            let month = month.parse().unwrap();
            let key = SeriesKey::minute(fund.clone(), AdjustmentMode::Forward, month);
            store.write(&key, &sample_series()).unwrap();
        }

        let entries = store.entries();
        assert_eq!(entries.len(), 3);
        assert_eq!(entries[0].month, Some("202409".parse().unwrap()));
        assert_eq!(entries[1].month, Some("202410".parse().unwrap()));
        assert_eq!(entries[2].instrument.code, "600000");
        assert_eq!(entries[2].kind, SeriesKind::Daily);
    }

    #[test]
    fn open_fails_when_root_is_a_file() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let err = CacheStore::open(CacheConfig::new(file.path())).unwrap_err();
        assert!(matches!(err, DataError::CacheRootUnavailable { .. }));
    }

    #[test]
    fn uncompressed_codec_roundtrips() {
        let dir = tempfile::tempdir().unwrap();
        let store = CacheStore::open(CacheConfig {
            root: dir.path().to_path_buf(),
            compression: CacheCompression::Uncompressed,
        })
        .unwrap();
        let key = daily_key("000001");
        store.write(&key, &sample_series()).unwrap();
        assert_eq!(store.read(&key).unwrap(), sample_series());
    }
}
