use tracing::{debug, warn};

use common::{Candle, MarketContext, MarketDataSource, Result, Sentiment, Timeframe, Trend};

use crate::indicators::{round2, smart_round, sma};

/// Instrument whose state stands in for the whole market.
pub const REFERENCE_SYMBOL: &str = "BTCUSDT";

/// Percent 24h move that turns a bearish or bullish H4 into DUMP or PUMP.
const SHOCK_PCT: f64 = 3.0;
/// H1 bars in a day.
const DAY_BARS: usize = 24;

/// Fetch the reference instrument and classify the market.
///
/// Never fails: any fetch error yields an UNKNOWN context carrying the error.
pub async fn market_context(source: &dyn MarketDataSource) -> MarketContext {
    let fetched = tokio::try_join!(
        source.candles(REFERENCE_SYMBOL, Timeframe::D1, 50),
        source.candles(REFERENCE_SYMBOL, Timeframe::H4, 100),
        source.candles(REFERENCE_SYMBOL, Timeframe::H1, 50),
    );
    match fetched.and_then(|(d1, h4, h1)| classify(&d1, &h4, &h1)) {
        Ok(context) => {
            debug!(
                sentiment = %context.sentiment,
                daily = %context.daily_trend,
                h4 = %context.h4_trend,
                "Market context"
            );
            context
        }
        Err(e) => {
            warn!(error = %e, "Market context unavailable");
            MarketContext::unknown(e.to_string())
        }
    }
}

/// Classify already-fetched reference candles.
pub fn classify(d1: &[Candle], h4: &[Candle], h1: &[Candle]) -> Result<MarketContext> {
    let Some(last) = h1.last() else {
        return Err(common::Error::Other(format!(
            "no {} candles for {REFERENCE_SYMBOL}",
            Timeframe::H1
        )));
    };
    let price = last.close;

    let change_24h = if h1.len() > DAY_BARS {
        let base = h1[h1.len() - 1 - DAY_BARS].close;
        if base > 0.0 {
            (price - base) / base * 100.0
        } else {
            0.0
        }
    } else {
        0.0
    };

    let daily_trend = trend(d1, price);
    let h4_trend = trend(h4, price);
    let sentiment = sentiment(daily_trend, h4_trend, change_24h);

    Ok(MarketContext {
        price: Some(smart_round(price)),
        change_24h: Some(round2(change_24h)),
        daily_trend,
        h4_trend,
        sentiment,
        note: format!("BTC {sentiment}: D1 {daily_trend}, H4 {h4_trend}, 24h {change_24h:+.2}%"),
    })
}

/// BULL above both SMA34 and SMA89, BEAR below both, NEUTRAL otherwise.
fn trend(candles: &[Candle], price: f64) -> Trend {
    let closes: Vec<f64> = candles.iter().map(|c| c.close).collect();
    let fast = sma(&closes, 34).last().copied().flatten();
    let slow = sma(&closes, 89).last().copied().flatten();
    match (fast, slow) {
        (Some(f), Some(s)) if price > f && price > s => Trend::Bull,
        (Some(f), Some(s)) if price < f && price < s => Trend::Bear,
        _ => Trend::Neutral,
    }
}

pub fn sentiment(daily: Trend, h4: Trend, change_24h: f64) -> Sentiment {
    match (daily, h4) {
        (Trend::Bull, Trend::Bull) => Sentiment::RiskOn,
        (Trend::Bear, Trend::Bear) => Sentiment::RiskOff,
        (_, Trend::Bear) if change_24h < -SHOCK_PCT => Sentiment::Dump,
        (_, Trend::Bull) if change_24h > SHOCK_PCT => Sentiment::Pump,
        _ => Sentiment::Neutral,
    }
}
