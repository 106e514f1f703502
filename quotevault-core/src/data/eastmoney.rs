//! Eastmoney push API provider.
//!
//! Three endpoints are used: `kline/get` for daily bars, `trends2/get` for
//! the recent 1-minute window and `clist/get` for the market-wide spot list.
//! Bar payloads are comma-joined strings and go through a [`ColumnMap`].
//!
//! The provider makes exactly one request per call. Retrying is the
//! caller's job; the shared circuit breaker is the only state here.

use super::circuit_breaker::CircuitBreaker;
use super::columns::ColumnMap;
use super::provider::{BarProvider, DataError};
use crate::domain::{AdjustmentMode, Bar, Instrument, Market, SpotQuote};
use chrono::NaiveDate;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

const KLINE_URL: &str = "https://push2his.eastmoney.com/api/qt/stock/kline/get";
const TRENDS_URL: &str = "https://push2his.eastmoney.com/api/qt/stock/trends2/get";
const SPOT_URL: &str = "https://push2.eastmoney.com/api/qt/clist/get";
const UT: &str = "7eea3edcaed734bea9cbfc24409ed989";

const EQUITY_FILTER: &str = "m:0+t:6,m:0+t:80,m:1+t:2,m:1+t:23,m:0+t:81+s:2048";
const FUND_FILTER: &str = "b:MK0021,b:MK0022,b:MK0023,b:MK0024";

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    data: Option<T>,
}

#[derive(Debug, Deserialize)]
struct KlineData {
    #[serde(default)]
    klines: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct TrendsData {
    #[serde(default)]
    trends: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct SpotData {
    #[serde(default)]
    diff: Vec<SpotRow>,
}

#[derive(Debug, Deserialize)]
struct SpotRow {
    f12: String,
    #[serde(default)]
    f14: String,
    /// Number, or the string "-" when the instrument has not traded.
    #[serde(default)]
    f2: serde_json::Value,
}

/// Exchange prefix for a code: Shanghai is `1.`, Shenzhen/Beijing `0.`.
fn secid(code: &str) -> String {
    let exchange = match code.as_bytes().first() {
        Some(b'5' | b'6' | b'9') => 1,
        _ => 0,
    };
    format!("{exchange}.{code}")
}

fn fqt(adjustment: AdjustmentMode) -> u8 {
    match adjustment {
        AdjustmentMode::None => 0,
        AdjustmentMode::Forward => 1,
        AdjustmentMode::Backward => 2,
    }
}

/// Eastmoney bar provider.
pub struct EastmoneyProvider {
    client: reqwest::blocking::Client,
    circuit_breaker: Arc<CircuitBreaker>,
    daily_map: ColumnMap,
    minute_map: ColumnMap,
}

impl EastmoneyProvider {
    pub fn new(circuit_breaker: Arc<CircuitBreaker>) -> Result<Self, DataError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(30))
            .user_agent("Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36")
            .build()
            .map_err(|e| DataError::Other(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            circuit_breaker,
            daily_map: ColumnMap::eastmoney_daily(),
            minute_map: ColumnMap::eastmoney_minute(),
        })
    }

    fn kline_url(
        instrument: &Instrument,
        start: NaiveDate,
        end: NaiveDate,
        adj: AdjustmentMode,
    ) -> String {
        format!(
            "{KLINE_URL}?fields1=f1,f2,f3,f4,f5,f6\
             &fields2=f51,f52,f53,f54,f55,f56,f57,f58,f59,f60,f61\
             &ut={UT}&klt=101&fqt={}&secid={}&beg={}&end={}",
            fqt(adj),
            secid(&instrument.code),
            start.format("%Y%m%d"),
            end.format("%Y%m%d"),
        )
    }

    fn trends_url(instrument: &Instrument) -> String {
        format!(
            "{TRENDS_URL}?fields1=f1,f2,f3,f4,f5,f6,f7,f8,f9,f10,f11,f12,f13\
             &fields2=f51,f52,f53,f54,f55,f56,f57,f58\
             &ut={UT}&ndays=5&iscr=0&secid={}",
            secid(&instrument.code),
        )
    }

    fn spot_url(market: Market) -> String {
        let filter = match market {
            Market::Equity => EQUITY_FILTER,
            Market::Fund => FUND_FILTER,
        };
        format!(
            "{SPOT_URL}?pn=1&pz=50000&po=1&np=1&ut=bd1d9ddb04089700cf9c27f6f7426281\
             &fltt=2&invt=2&fid=f12&fs={filter}&fields=f12,f14,f2"
        )
    }

    /// One GET with status mapping onto the circuit breaker.
    fn get_text(&self, url: &str, symbol: &str) -> Result<String, DataError> {
        if !self.circuit_breaker.is_allowed() {
            return Err(DataError::CircuitBreakerTripped);
        }

        debug!(symbol, url, "eastmoney request");
        let resp = self
            .client
            .get(url)
            .send()
            .map_err(|e| DataError::NetworkUnreachable(format!("{symbol}: {e}")))?;
        let status = resp.status();

        if status == reqwest::StatusCode::FORBIDDEN {
            self.circuit_breaker.trip();
            return Err(DataError::CircuitBreakerTripped);
        }

        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            self.circuit_breaker.record_failure();
            let retry_after = resp
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<u64>().ok())
                .unwrap_or(60);
            return Err(DataError::RateLimited {
                retry_after_secs: retry_after,
            });
        }

        if status.is_server_error() {
            self.circuit_breaker.record_failure();
            return Err(DataError::NetworkUnreachable(format!("HTTP {status} for {symbol}")));
        }

        if !status.is_success() {
            return Err(DataError::Other(format!("HTTP {status} for {symbol}")));
        }

        let body = resp
            .text()
            .map_err(|e| DataError::NetworkUnreachable(format!("{symbol}: body read: {e}")))?;
        self.circuit_breaker.record_success();
        Ok(body)
    }
}

/// Parse a `kline/get` body.
///
/// `data: null` means the exchange does not know the code; an empty
/// `klines` list is a legitimate "no rows".
pub(crate) fn parse_klines(
    symbol: &str,
    body: &str,
    map: &ColumnMap,
) -> Result<Vec<Bar>, DataError> {
    let envelope: Envelope<KlineData> = serde_json::from_str(body)
        .map_err(|e| {
            DataError::ResponseFormatChanged(format!("kline response for {symbol}: {e}"))
        })?;
    let data = envelope.data.ok_or_else(|| DataError::SymbolNotFound {
        symbol: symbol.to_string(),
    })?;
    Ok(map.map_lines(symbol, data.klines.iter().map(String::as_str), ','))
}

/// Parse a `trends2/get` body.
pub(crate) fn parse_trends(
    symbol: &str,
    body: &str,
    map: &ColumnMap,
) -> Result<Vec<Bar>, DataError> {
    let envelope: Envelope<TrendsData> = serde_json::from_str(body)
        .map_err(|e| {
            DataError::ResponseFormatChanged(format!("trends response for {symbol}: {e}"))
        })?;
    let data = envelope.data.ok_or_else(|| DataError::SymbolNotFound {
        symbol: symbol.to_string(),
    })?;
    Ok(map.map_lines(symbol, data.trends.iter().map(String::as_str), ','))
}

/// Parse a `clist/get` body. Rows without a numeric price keep `None`.
pub(crate) fn parse_spot(market: Market, body: &str) -> Result<Vec<SpotQuote>, DataError> {
    let envelope: Envelope<SpotData> = serde_json::from_str(body)
        .map_err(|e| DataError::ResponseFormatChanged(format!("spot response: {e}")))?;
    let rows = envelope.data.map(|d| d.diff).unwrap_or_default();

    Ok(rows
        .into_iter()
        .map(|row| SpotQuote {
            code: row.f12,
            name: row.f14,
            market,
            last_price: row.f2.as_f64(),
        })
        .collect())
}

impl BarProvider for EastmoneyProvider {
    fn name(&self) -> &str {
        "eastmoney"
    }

    fn fetch_daily(
        &self,
        instrument: &Instrument,
        start: NaiveDate,
        end: NaiveDate,
        adjustment: AdjustmentMode,
    ) -> Result<Vec<Bar>, DataError> {
        let url = Self::kline_url(instrument, start, end, adjustment);
        let body = self.get_text(&url, &instrument.code)?;
        parse_klines(&instrument.code, &body, &self.daily_map)
    }

    /// The trends endpoint only serves unadjusted prices; `adjustment` only
    /// selects the cache entry.
    fn fetch_intraday_minute(
        &self,
        instrument: &Instrument,
        _adjustment: AdjustmentMode,
    ) -> Result<Vec<Bar>, DataError> {
        let url = Self::trends_url(instrument);
        let body = self.get_text(&url, &instrument.code)?;
        parse_trends(&instrument.code, &body, &self.minute_map)
    }

    fn fetch_spot(&self, market: Market) -> Result<Vec<SpotQuote>, DataError> {
        let body = self.get_text(&Self::spot_url(market), market.as_str())?;
        parse_spot(market, &body)
    }

    fn is_available(&self) -> bool {
        self.circuit_breaker.is_allowed()
    }
}
