use common::{finite_or_zero, Bias, Candle, FastState, Slope, Structure, TimeframeDiagnostics};

use crate::indicators::moving::defined_tail;
use crate::indicators::{round2, slope, sma, structure_of, CandleTable};

/// Rows compared by the MA slope classifier.
const MA_SLOPE_ROWS: usize = 5;
/// Rows compared by the fast-timeframe slope check.
const FAST_SLOPE_ROWS: usize = 3;
/// Candles voted on by the fast-timeframe state.
const FAST_VOTE_CANDLES: usize = 5;

/// Bias of `price` against two reference MAs. A missing slow MA is neutral.
pub fn bias(price: f64, ma_fast: f64, ma_slow: Option<f64>) -> Bias {
    match ma_slow {
        Some(slow) if price > ma_fast && price > slow => Bias::Long,
        Some(slow) if price < ma_fast && price < slow => Bias::Short,
        _ => Bias::Neutral,
    }
}

/// Everything the decision skeleton reads from one timeframe.
#[derive(Debug, Clone)]
pub struct FrameReading {
    pub bias: Bias,
    pub ma_fast: f64,
    pub ma_slow: Option<f64>,
    pub ma_long: Option<f64>,
    pub above_fast: bool,
    pub below_fast: bool,
    pub above_slow: bool,
    pub below_slow: bool,
    pub slope_fast: Slope,
    pub slope_slow: Slope,
    pub crossed_up_fast: bool,
    pub crossed_down_fast: bool,
    pub crossed_up_slow: bool,
    pub crossed_down_slow: bool,
    pub structure: Structure,
    pub volume_ratio: f64,
    pub last: Candle,
    pub distance_pct: f64,
}

impl FrameReading {
    /// Read a prepared, non-empty table against the evaluation price.
    pub fn read(table: &CandleTable, price: f64, structure_lookback: usize) -> Self {
        let ma_fast = table.ma_fast_last().unwrap_or(price);
        let ma_slow = table.ma_slow_last();
        let last = table.last().copied().unwrap_or(Candle {
            open_time: Default::default(),
            open: price,
            high: price,
            low: price,
            close: price,
            volume: 0.0,
        });

        let (crossed_up_fast, crossed_down_fast) = crossing(table, |i| Some(table.ma_fast[i]));
        let (crossed_up_slow, crossed_down_slow) = crossing(table, |i| table.ma_slow[i]);

        let distance_pct = if ma_fast > 0.0 {
            (price - ma_fast) / ma_fast * 100.0
        } else {
            0.0
        };

        Self {
            bias: bias(price, ma_fast, ma_slow),
            ma_fast,
            ma_slow,
            ma_long: table.ma_long_last(),
            above_fast: price > ma_fast,
            below_fast: price < ma_fast,
            above_slow: ma_slow.is_some_and(|s| price > s),
            below_slow: ma_slow.is_some_and(|s| price < s),
            slope_fast: slope(&table.ma_fast, MA_SLOPE_ROWS),
            slope_slow: slope(&defined_tail(&table.ma_slow), MA_SLOPE_ROWS),
            crossed_up_fast,
            crossed_down_fast,
            crossed_up_slow,
            crossed_down_slow,
            structure: structure_of(&table.candles, structure_lookback),
            volume_ratio: table.volume_ratio_last(),
            last,
            distance_pct,
        }
    }

    pub fn diagnostics(&self, table: &CandleTable) -> TimeframeDiagnostics {
        TimeframeDiagnostics {
            timeframe: table.timeframe,
            bias: self.bias,
            structure: self.structure,
            close: finite_or_zero(self.last.close),
            ma_fast: finite_or_zero(self.ma_fast),
            ma_slow: self.ma_slow.map(finite_or_zero),
            ma_long: self.ma_long.map(finite_or_zero),
            slope_fast: self.slope_fast,
            slope_slow: self.slope_slow,
            crossed_up: self.crossed_up_fast,
            crossed_down: self.crossed_down_fast,
            volume_ratio: round2(finite_or_zero(self.volume_ratio)),
            distance_pct: round2(finite_or_zero(self.distance_pct)),
        }
    }
}

/// Whether the last close crossed the MA given by `ma` on the last candle.
fn crossing(table: &CandleTable, ma: impl Fn(usize) -> Option<f64>) -> (bool, bool) {
    let n = table.len();
    if n < 2 {
        return (false, false);
    }
    let (prev, last) = (&table.candles[n - 2], &table.candles[n - 1]);
    match (ma(n - 2), ma(n - 1)) {
        (Some(prev_ma), Some(last_ma)) => (
            prev.close <= prev_ma && last.close > last_ma,
            prev.close >= prev_ma && last.close < last_ma,
        ),
        _ => (false, false),
    }
}

/// State of the fastest timeframe relative to `lean`, with a short note.
///
/// Confirmed when price holds above MA7 and MA25, the fast MA is rising and
/// most of the last five candles agree; counter when four of five disagree;
/// pullback when the MA turns against the lean or price loses MA25.
pub fn fast_state(table: &CandleTable, lean: Bias) -> (FastState, String) {
    let tf = table.timeframe;
    if lean == Bias::Neutral || table.is_empty() {
        return (FastState::Neutral, format!("{tf} no directional lean"));
    }

    let closes = table.closes();
    let price = table.close();
    let ma7 = sma(&closes, 7).last().copied().flatten().unwrap_or(price);
    let ma25 = sma(&closes, 25).last().copied().flatten().unwrap_or(price);
    let trend = slope(&table.ma_fast, FAST_SLOPE_ROWS);

    let recent = table.tail(FAST_VOTE_CANDLES);
    let bulls = recent.iter().filter(|c| c.is_bullish()).count();
    let bears = recent.iter().filter(|c| c.is_bearish()).count();

    let (with, against, holds_short, holds_mid, rising, falling) = match lean {
        Bias::Long => (bulls, bears, price > ma7, price > ma25, Slope::Up, Slope::Down),
        _ => (bears, bulls, price < ma7, price < ma25, Slope::Down, Slope::Up),
    };
    let side = if lean == Bias::Long { "above" } else { "below" };

    if holds_short && holds_mid && trend == rising && with >= 3 {
        (
            FastState::Confirmed,
            format!("{tf} confirmed: {side} MA7/MA25, slope {trend}, {with}/{FAST_VOTE_CANDLES} candles agree"),
        )
    } else if against >= 4 {
        (
            FastState::Counter,
            format!("{tf} counter-move: {against}/{FAST_VOTE_CANDLES} candles against the trend"),
        )
    } else if trend == falling || !holds_mid {
        (FastState::Pullback, format!("{tf} pulling back, slope {trend}"))
    } else {
        (FastState::Forming, format!("{tf} forming, slope {trend}, {with}/{FAST_VOTE_CANDLES} candles agree"))
    }
}
