use std::time::Duration;

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, warn};

use common::{Candle, Error, MarketDataSource, Result, Ticker, Timeframe};

const BASE_URL: &str = "https://fapi.binance.com";

const KLINES_TIMEOUT: Duration = Duration::from_secs(10);
const TICKERS_TIMEOUT: Duration = Duration::from_secs(15);
const DERIVATIVES_TIMEOUT: Duration = Duration::from_secs(5);
/// Attempts per klines request; each HTTP 429 waits 1s, 2s, 4s.
const KLINES_ATTEMPTS: u32 = 3;

/// Prices below this are treated as dead instruments.
const MIN_PRICE: f64 = 0.000001;

/// Leveraged tokens: BTCUP, ETHDOWN, BNBBULL, BTC3L, ...
static LEVERAGED: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(UP|DOWN|BULL|BEAR|[2-9]L|[2-9]S|HEDGE|HALF)USDT$").expect("static pattern compiles")
});
static STABLECOIN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(USDC|BUSD|TUSD|FDUSD|USDP|DAI|FRAX|LUSD|SUSD|USDD|USTC|GUSD)").expect("static pattern compiles")
});
const BLACKLIST: [&str; 5] = ["LUNA2USDT", "LUNCUSDT", "LUNAUSDT", "USDTUSDT", "BCCUSDT"];

/// Public USDT-M futures market data. No credentials required.
pub struct BinanceFuturesClient {
    http: Client,
    base_url: String,
}

impl BinanceFuturesClient {
    pub fn new() -> Result<Self> {
        Self::with_base_url(BASE_URL)
    }

    pub fn with_base_url(base_url: impl Into<String>) -> Result<Self> {
        let http = Client::builder()
            .use_rustls_tls()
            .build()
            .map_err(|e| Error::Http(e.to_string()))?;
        Ok(Self {
            http,
            base_url: base_url.into(),
        })
    }

    async fn get(&self, path: &str, query: &[(&str, String)], timeout: Duration) -> Result<(StatusCode, String)> {
        let url = format!("{}{path}", self.base_url);
        let resp = self
            .http
            .get(&url)
            .query(query)
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| Error::Http(e.to_string()))?;
        let status = resp.status();
        let body = resp.text().await.map_err(|e| Error::Http(e.to_string()))?;
        Ok((status, body))
    }
}

#[async_trait]
impl MarketDataSource for BinanceFuturesClient {
    async fn candles(&self, symbol: &str, timeframe: Timeframe, limit: usize) -> Result<Vec<Candle>> {
        let query = [
            ("symbol", symbol.to_string()),
            ("interval", timeframe.as_str().to_string()),
            ("limit", limit.to_string()),
        ];

        for attempt in 0..KLINES_ATTEMPTS {
            let (status, body) = self.get("/fapi/v1/klines", &query, KLINES_TIMEOUT).await?;
            if status == StatusCode::TOO_MANY_REQUESTS {
                let wait = Duration::from_secs(1 << attempt);
                warn!(symbol, attempt = attempt + 1, wait_s = wait.as_secs(), "Klines rate limited");
                tokio::time::sleep(wait).await;
                continue;
            }
            if !status.is_success() {
                return Err(Error::Exchange(format!("HTTP {status}: {body}")));
            }
            let candles = parse_klines(&body)?;
            debug!(symbol, timeframe = %timeframe, count = candles.len(), "Fetched klines");
            return Ok(candles);
        }
        Err(Error::RateLimited(format!("klines {symbol} {timeframe}")))
    }

    async fn tickers(&self, min_quote_volume: f64) -> Result<Vec<Ticker>> {
        let (status, body) = self.get("/fapi/v1/ticker/24hr", &[], TICKERS_TIMEOUT).await?;
        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(Error::RateLimited("ticker/24hr".into()));
        }
        if !status.is_success() {
            return Err(Error::Exchange(format!("HTTP {status}: {body}")));
        }
        let tickers = parse_tickers(&body, min_quote_volume)?;
        debug!(count = tickers.len(), min_quote_volume, "Fetched tickers");
        Ok(tickers)
    }

    async fn funding_rate(&self, symbol: &str) -> Option<f64> {
        let query = [("symbol", symbol.to_string())];
        match self.get("/fapi/v1/premiumIndex", &query, DERIVATIVES_TIMEOUT).await {
            Ok((status, body)) if status.is_success() => parse_funding(&body),
            Ok((status, _)) => {
                debug!(symbol, %status, "Funding rate unavailable");
                None
            }
            Err(e) => {
                debug!(symbol, error = %e, "Funding rate unavailable");
                None
            }
        }
    }

    async fn open_interest_change(&self, symbol: &str, period: Timeframe, points: usize) -> Option<f64> {
        let query = [
            ("symbol", symbol.to_string()),
            ("period", period.as_str().to_string()),
            ("limit", points.to_string()),
        ];
        match self.get("/futures/data/openInterestHist", &query, DERIVATIVES_TIMEOUT).await {
            Ok((status, body)) if status.is_success() => parse_oi_change(&body),
            Ok((status, _)) => {
                debug!(symbol, %status, "Open interest unavailable");
                None
            }
            Err(e) => {
                debug!(symbol, error = %e, "Open interest unavailable");
                None
            }
        }
    }
}

// ─── Parsing ──────────────────────────────────────────────────────────────────

fn number(v: &Value) -> Option<f64> {
    match v {
        Value::String(s) => s.parse().ok(),
        Value::Number(n) => n.as_f64(),
        _ => None,
    }
}

/// Kline rows are positional arrays: open time (ms), open, high, low, close,
/// volume, then fields this crate does not use.
pub fn parse_klines(body: &str) -> Result<Vec<Candle>> {
    let rows: Vec<Vec<Value>> = serde_json::from_str(body).map_err(|e| Error::Exchange(format!("klines: {e}")))?;
    rows.iter()
        .map(|row| {
            let field = |i: usize| row.get(i).and_then(number);
            let (Some(ms), Some(open), Some(high), Some(low), Some(close), Some(volume)) =
                (row.first().and_then(Value::as_i64), field(1), field(2), field(3), field(4), field(5))
            else {
                return Err(Error::Exchange(format!("malformed kline row: {row:?}")));
            };
            let open_time = Utc
                .timestamp_millis_opt(ms)
                .single()
                .ok_or_else(|| Error::Exchange(format!("bad kline time {ms}")))?;
            Ok(Candle {
                open_time,
                open,
                high,
                low,
                close,
                volume,
            })
        })
        .collect()
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawTicker {
    symbol: String,
    #[serde(default)]
    last_price: String,
    #[serde(default)]
    quote_volume: String,
    #[serde(default)]
    price_change_percent: String,
}

/// Whether a symbol is a plain USDT contract worth scanning.
pub fn is_eligible(symbol: &str) -> bool {
    symbol.ends_with("USDT")
        && !BLACKLIST.contains(&symbol)
        && !LEVERAGED.is_match(symbol)
        && !STABLECOIN.is_match(symbol)
}

/// Eligible tickers with at least `min_quote_volume`, by volume descending.
pub fn parse_tickers(body: &str, min_quote_volume: f64) -> Result<Vec<Ticker>> {
    let raw: Vec<RawTicker> = serde_json::from_str(body).map_err(|e| Error::Exchange(format!("tickers: {e}")))?;
    let mut out: Vec<Ticker> = raw
        .into_iter()
        .filter(|t| is_eligible(&t.symbol))
        .filter_map(|t| {
            let quote_volume = t.quote_volume.parse().unwrap_or(0.0);
            let last_price = t.last_price.parse().unwrap_or(0.0);
            (quote_volume >= min_quote_volume && last_price >= MIN_PRICE).then(|| Ticker {
                symbol: t.symbol,
                last_price,
                quote_volume,
                price_change_pct: t.price_change_percent.parse().unwrap_or(0.0),
            })
        })
        .collect();
    out.sort_by(|a, b| b.quote_volume.total_cmp(&a.quote_volume));
    Ok(out)
}

/// `lastFundingRate` as a percentage.
pub fn parse_funding(body: &str) -> Option<f64> {
    let v: Value = serde_json::from_str(body).ok()?;
    let rate = v.as_object()?.get("lastFundingRate").and_then(number)?;
    Some(rate * 100.0)
}

/// Percent change from the first to the last `sumOpenInterest` sample.
pub fn parse_oi_change(body: &str) -> Option<f64> {
    let v: Value = serde_json::from_str(body).ok()?;
    let samples: Vec<f64> = v
        .as_array()?
        .iter()
        .filter_map(|s| s.get("sumOpenInterest").and_then(number))
        .collect();
    let (&first, &last) = (samples.first()?, samples.last()?);
    if samples.len() < 2 || first == 0.0 {
        return None;
    }
    Some(((last - first) / first * 100.0 * 100.0).round() / 100.0)
}
