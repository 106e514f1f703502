//! QuoteVault CLI: fetch batches, inspect the cache, print series.
//!
//! Commands:
//! - `fetch`: bring a universe's daily or minute series up to date
//! - `cache status`: list cached series with ranges and row counts
//! - `show`: print the annotated tail of one cached series

use anyhow::{bail, Context, Result};
use chrono::{Local, NaiveDate};
use clap::{Parser, Subcommand};
use quotevault_core::data::{
    annotate, BarProvider, CacheStore, CircuitBreaker, EastmoneyProvider, RetryPolicy, Universe,
};
use quotevault_core::domain::{AdjustmentMode, Market, SeriesKey, SeriesKind, YearMonth};
use quotevault_runner::{BatchRequest, BatchRunner, EngineConfig};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "quotevault",
    about = "QuoteVault: incremental fetch-and-cache for daily and intraday price bars"
)]
struct Cli {
    /// Emit logs as JSON lines.
    #[arg(long, global = true, default_value_t = false)]
    json_logs: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch and cache series for a universe.
    Fetch {
        /// Series kind: daily or minute.
        #[arg(long, default_value = "daily")]
        kind: String,

        /// Market filter: equity, fund or all.
        #[arg(long, default_value = "all")]
        market: String,

        /// Universe TOML file (`equities = [...]`, `funds = [...]`).
        #[arg(long, conflicts_with = "spot")]
        universe: Option<PathBuf>,

        /// Build the universe from the provider's live spot list.
        #[arg(long, default_value_t = false)]
        spot: bool,

        /// As-of date (YYYY-MM-DD). Defaults to today.
        #[arg(long)]
        date: Option<String>,

        /// Adjustment mode: none, qfq or hfq. Defaults to the config value.
        #[arg(long)]
        adjustment: Option<String>,

        /// Engine config TOML.
        #[arg(long)]
        config: Option<PathBuf>,

        /// Cache directory (overrides the config).
        #[arg(long)]
        cache_dir: Option<PathBuf>,
    },
    /// Cache management commands.
    Cache {
        #[command(subcommand)]
        action: CacheAction,
    },
    /// Print the annotated tail of a cached series.
    Show {
        /// Instrument code.
        code: String,

        /// Market: equity or fund.
        #[arg(long, default_value = "equity")]
        market: String,

        /// Series kind: daily or minute.
        #[arg(long, default_value = "daily")]
        kind: String,

        /// Minute partition (YYYYMM). Defaults to the current month.
        #[arg(long)]
        month: Option<String>,

        /// Adjustment mode: none, qfq or hfq. Defaults to the config value.
        #[arg(long)]
        adjustment: Option<String>,

        /// Number of rows to print.
        #[arg(long, default_value_t = 10)]
        tail: usize,

        /// Engine config TOML.
        #[arg(long)]
        config: Option<PathBuf>,

        /// Cache directory (overrides the config).
        #[arg(long)]
        cache_dir: Option<PathBuf>,
    },
}

#[derive(Subcommand)]
enum CacheAction {
    /// List cached series with date ranges and row counts.
    Status {
        /// Engine config TOML.
        #[arg(long)]
        config: Option<PathBuf>,

        /// Cache directory (overrides the config).
        #[arg(long)]
        cache_dir: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.json_logs);

    match cli.command {
        Commands::Fetch {
            kind,
            market,
            universe,
            spot,
            date,
            adjustment,
            config,
            cache_dir,
        } => {
            let config = load_config(config.as_deref(), cache_dir)?;
            run_fetch(config, &kind, &market, universe.as_deref(), spot, date, adjustment)
        }
        Commands::Cache { action } => match action {
            CacheAction::Status { config, cache_dir } => {
                let config = load_config(config.as_deref(), cache_dir)?;
                run_cache_status(&config)
            }
        },
        Commands::Show {
            code,
            market,
            kind,
            month,
            adjustment,
            tail,
            config,
            cache_dir,
        } => {
            let config = load_config(config.as_deref(), cache_dir)?;
            run_show(&config, &code, &market, &kind, month, adjustment, tail)
        }
    }
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn load_config(path: Option<&Path>, cache_dir: Option<PathBuf>) -> Result<EngineConfig> {
    let mut config = match path {
        Some(path) => EngineConfig::from_file(path)?,
        None => EngineConfig::default(),
    };
    if let Some(dir) = cache_dir {
        config.cache_dir = dir;
    }
    Ok(config)
}

fn parse_kind(s: &str) -> Result<SeriesKind> {
    s.parse().map_err(anyhow::Error::msg)
}

fn parse_adjustment(s: Option<String>, config: &EngineConfig) -> Result<AdjustmentMode> {
    match s {
        Some(s) => s.parse().map_err(anyhow::Error::msg),
        None => Ok(config.adjustment),
    }
}

/// `all` means no filter.
fn parse_market_filter(s: &str) -> Result<Option<Market>> {
    if s.eq_ignore_ascii_case("all") {
        return Ok(None);
    }
    Ok(Some(s.parse()?))
}

fn parse_date(s: Option<String>) -> Result<NaiveDate> {
    match s {
        Some(s) => NaiveDate::parse_from_str(&s, "%Y-%m-%d")
            .with_context(|| format!("invalid date '{s}' (expected YYYY-MM-DD)")),
        None => Ok(Local::now().date_naive()),
    }
}

fn run_fetch(
    config: EngineConfig,
    kind: &str,
    market: &str,
    universe_file: Option<&Path>,
    spot: bool,
    date: Option<String>,
    adjustment: Option<String>,
) -> Result<()> {
    let kind = parse_kind(kind)?;
    let market = parse_market_filter(market)?;
    let as_of = parse_date(date)?;
    let adjustment = parse_adjustment(adjustment, &config)?;

    let breaker = Arc::new(CircuitBreaker::default_provider());
    let provider: Arc<dyn BarProvider> = Arc::new(EastmoneyProvider::new(breaker)?);

    let universe = match (universe_file, spot) {
        (Some(path), _) => Universe::from_file(path)?,
        (None, true) => spot_universe(provider.as_ref(), market, config.retry)?,
        (None, false) => bail!("pass --universe FILE or --spot"),
    };
    let universe = match market {
        Some(m) => universe.only(m),
        None => universe,
    };
    let instruments = universe.instruments()?;
    if instruments.is_empty() {
        bail!("universe is empty");
    }

    let runner = BatchRunner::from_config(config, provider)?;
    let report = runner.run_batch(&BatchRequest {
        instruments,
        kind,
        adjustment,
        as_of,
    })?;

    println!();
    println!("=== Fetch Summary ===");
    println!("Kind:       {kind}");
    println!("As of:      {as_of}");
    println!("Adjustment: {}", adjustment.tag());
    println!("Succeeded:  {}/{}", report.succeeded, report.total());
    println!("Failed:     {}", report.failed);
    println!("Elapsed:    {:.1}s", report.elapsed.as_secs_f64());
    if report.failed > 0 {
        println!();
        println!("{:<16} {:<12} Reason", "Instrument", "Stage");
        println!("{}", "-".repeat(60));
        for (instrument, failure) in report.failures() {
            println!(
                "{:<16} {:<12} {}",
                instrument.to_string(),
                failure.stage.to_string(),
                failure.reason
            );
        }
    }
    Ok(())
}

fn spot_universe(
    provider: &dyn BarProvider,
    market: Option<Market>,
    retry: RetryPolicy,
) -> Result<Universe> {
    let markets = match market {
        Some(m) => vec![m],
        None => vec![Market::Equity, Market::Fund],
    };
    let mut quotes = Vec::new();
    for m in markets {
        let snapshot = retry.execute(|| provider.fetch_spot(m))?;
        info!(market = %m, rows = snapshot.len(), "spot snapshot fetched");
        quotes.extend(snapshot);
    }
    Ok(Universe::from_spot(&quotes))
}

fn run_cache_status(config: &EngineConfig) -> Result<()> {
    let store = CacheStore::open(config.cache_config())?;
    let entries = store.entries();
    if entries.is_empty() {
        println!("Cache is empty: {}", store.root().display());
        return Ok(());
    }

    println!("Cache: {}", store.root().display());
    println!("Series: {}", entries.len());
    println!();
    println!(
        "{:<16} {:<7} {:<4} {:<7} {:<35} {:>7}  Cached At",
        "Instrument", "Kind", "Adj", "Month", "Range", "Bars"
    );
    println!("{}", "-".repeat(100));
    for meta in &entries {
        let month = meta.month.map(|m| m.to_string()).unwrap_or_else(|| "-".into());
        println!(
            "{:<16} {:<7} {:<4} {:<7} {:<35} {:>7}  {}",
            meta.instrument.to_string(),
            meta.kind.as_str(),
            meta.adjustment.tag(),
            month,
            format!("{} .. {}", meta.first, meta.last),
            meta.bar_count,
            meta.cached_at.format("%Y-%m-%d %H:%M:%S"),
        );
    }
    Ok(())
}

fn run_show(
    config: &EngineConfig,
    code: &str,
    market: &str,
    kind: &str,
    month: Option<String>,
    adjustment: Option<String>,
    tail: usize,
) -> Result<()> {
    let market: Market = market.parse()?;
    let instrument = quotevault_core::domain::Instrument::new(code, market)?;
    let adjustment = parse_adjustment(adjustment, config)?;
    let key = match parse_kind(kind)? {
        SeriesKind::Daily => SeriesKey::daily(instrument, adjustment),
        SeriesKind::Minute => {
            let month = match month {
                Some(m) => m.parse::<YearMonth>().map_err(anyhow::Error::msg)?,
                None => YearMonth::of(Local::now().date_naive()),
            };
            SeriesKey::minute(instrument, adjustment, month)
        }
    };

    let store = CacheStore::open(config.cache_config())?;
    let Some(series) = store.read(&key) else {
        bail!("nothing cached for {key}");
    };
    let annotated = annotate(&series);

    println!("{key} ({} rows)", annotated.len());
    println!(
        "{:<20} {:>10} {:>10} {:>10} {:>10} {:>14} {:>8}",
        "Timestamp", "Open", "High", "Low", "Close", "Volume", "Chg%"
    );
    println!("{}", "-".repeat(88));
    for row in annotated.tail(tail) {
        println!(
            "{:<20} {:>10.3} {:>10.3} {:>10.3} {:>10.3} {:>14.0} {:>8.2}",
            row.bar.timestamp.format("%Y-%m-%d %H:%M"),
            row.bar.open,
            row.bar.high,
            row.bar.low,
            row.bar.close,
            row.volume_shares,
            row.p_change,
        );
    }
    Ok(())
}
