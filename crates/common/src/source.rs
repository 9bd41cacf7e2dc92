use async_trait::async_trait;

use crate::{Candle, Result, Ticker, Timeframe};

/// Abstraction over the market data provider.
///
/// `BinanceFuturesClient` in `crates/engine` implements this against the
/// public futures REST API. Tests substitute in-memory fakes.
#[async_trait]
pub trait MarketDataSource: Send + Sync {
    /// The most recent `limit` candles for `symbol`, oldest first.
    async fn candles(&self, symbol: &str, timeframe: Timeframe, limit: usize)
        -> Result<Vec<Candle>>;

    /// Tradeable instruments with at least `min_quote_volume` 24h volume,
    /// sorted by volume descending.
    async fn tickers(&self, min_quote_volume: f64) -> Result<Vec<Ticker>>;

    /// Latest funding rate in percent. `None` on any failure.
    async fn funding_rate(&self, symbol: &str) -> Option<f64>;

    /// Percent change of open interest across the last `points` samples
    /// of `period`. `None` on any failure.
    async fn open_interest_change(
        &self,
        symbol: &str,
        period: Timeframe,
        points: usize,
    ) -> Option<f64>;
}

/// Outbound alert channel. Delivery is best-effort.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, message: &str) -> Result<()>;
}
