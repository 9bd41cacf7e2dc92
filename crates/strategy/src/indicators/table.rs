use serde::{Deserialize, Serialize};

use common::{Candle, Timeframe};

use super::moving::{ema, rolling_mean, sma};

pub const ATR_PERIOD: usize = 14;
pub const VOLUME_PERIOD: usize = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MaKind {
    Simple,
    Exponential,
}

/// The pair (plus optional long-term) of reference moving averages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MaSpec {
    pub kind: MaKind,
    pub fast: usize,
    pub slow: usize,
    pub long: Option<usize>,
}

impl MaSpec {
    pub const SMA_34_89_200: MaSpec = MaSpec {
        kind: MaKind::Simple,
        fast: 34,
        slow: 89,
        long: Some(200),
    };

    pub const EMA_9_21: MaSpec = MaSpec {
        kind: MaKind::Exponential,
        fast: 9,
        slow: 21,
        long: None,
    };

    pub fn fast_label(&self) -> String {
        self.label(self.fast)
    }

    pub fn slow_label(&self) -> String {
        self.label(self.slow)
    }

    fn label(&self, period: usize) -> String {
        match self.kind {
            MaKind::Simple => format!("MA{period}"),
            MaKind::Exponential => format!("EMA{period}"),
        }
    }
}

/// A candle series with its derived columns, computed once and then read-only.
///
/// Rows before the fast MA becomes available are dropped, so every row has a
/// fast MA. The slow and long MAs may still be warming up.
#[derive(Debug, Clone)]
pub struct CandleTable {
    pub timeframe: Timeframe,
    pub candles: Vec<Candle>,
    pub ma_fast: Vec<f64>,
    pub ma_slow: Vec<Option<f64>>,
    pub ma_long: Vec<Option<f64>>,
    /// Rolling mean of `high - low`.
    pub atr: Vec<f64>,
    /// Volume over its rolling mean; 0 when the mean is 0.
    pub volume_ratio: Vec<f64>,
}

impl CandleTable {
    pub fn prepare(timeframe: Timeframe, candles: Vec<Candle>, spec: &MaSpec) -> Self {
        let closes: Vec<f64> = candles.iter().map(|c| c.close).collect();

        let (ma_fast, ma_slow): (Vec<Option<f64>>, Vec<Option<f64>>) = match spec.kind {
            MaKind::Simple => (sma(&closes, spec.fast), sma(&closes, spec.slow)),
            MaKind::Exponential => (
                ema(&closes, spec.fast).into_iter().map(Some).collect(),
                ema(&closes, spec.slow).into_iter().map(Some).collect(),
            ),
        };
        let ma_long = match spec.long {
            Some(period) => sma(&closes, period),
            None => vec![None; closes.len()],
        };

        let ranges: Vec<f64> = candles.iter().map(|c| c.high - c.low).collect();
        let atr = rolling_mean(&ranges, ATR_PERIOD, 1);

        let volumes: Vec<f64> = candles.iter().map(|c| c.volume).collect();
        let volume_avg = rolling_mean(&volumes, VOLUME_PERIOD, 1);

        let skip = ma_fast.iter().take_while(|v| v.is_none()).count();

        let volume_ratio = volumes
            .iter()
            .zip(&volume_avg)
            .skip(skip)
            .map(|(v, avg)| match avg {
                Some(avg) if *avg > 0.0 => v / avg,
                _ => 0.0,
            })
            .collect();

        Self {
            timeframe,
            candles: candles[skip..].to_vec(),
            ma_fast: ma_fast[skip..].iter().map(|v| v.unwrap_or_default()).collect(),
            ma_slow: ma_slow[skip..].to_vec(),
            ma_long: ma_long[skip..].to_vec(),
            atr: atr[skip..].iter().map(|v| v.unwrap_or_default()).collect(),
            volume_ratio,
        }
    }

    pub fn len(&self) -> usize {
        self.candles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candles.is_empty()
    }

    pub fn last(&self) -> Option<&Candle> {
        self.candles.last()
    }

    pub fn close(&self) -> f64 {
        self.last().map(|c| c.close).unwrap_or_default()
    }

    pub fn closes(&self) -> Vec<f64> {
        self.candles.iter().map(|c| c.close).collect()
    }

    /// The last `n` candles (all of them when shorter).
    pub fn tail(&self, n: usize) -> &[Candle] {
        &self.candles[self.len().saturating_sub(n)..]
    }

    pub fn ma_fast_last(&self) -> Option<f64> {
        self.ma_fast.last().copied()
    }

    pub fn ma_slow_last(&self) -> Option<f64> {
        self.ma_slow.last().copied().flatten()
    }

    pub fn ma_long_last(&self) -> Option<f64> {
        self.ma_long.last().copied().flatten()
    }

    pub fn atr_last(&self) -> f64 {
        self.atr.last().copied().unwrap_or_default()
    }

    pub fn volume_ratio_last(&self) -> f64 {
        self.volume_ratio.last().copied().unwrap_or_default()
    }

    /// Highest high and lowest low of the last `n` candles.
    pub fn range(&self, n: usize) -> Option<(f64, f64)> {
        let tail = self.tail(n);
        if tail.is_empty() {
            return None;
        }
        let high = tail.iter().map(|c| c.high).fold(f64::NEG_INFINITY, f64::max);
        let low = tail.iter().map(|c| c.low).fold(f64::INFINITY, f64::min);
        Some((high, low))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn series(n: usize) -> Vec<Candle> {
        (0..n)
            .map(|i| {
                let close = 100.0 + i as f64;
                Candle {
                    open_time: Utc.timestamp_opt(1_700_000_000 + i as i64 * 3600, 0).unwrap(),
                    open: close - 0.5,
                    high: close + 1.0,
                    low: close - 1.0,
                    close,
                    volume: if i % 2 == 0 { 10.0 } else { 30.0 },
                }
            })
            .collect()
    }

    #[test]
    fn sma_table_drops_warmup_rows() {
        let table = CandleTable::prepare(Timeframe::H4, series(100), &MaSpec::SMA_34_89_200);
        // MA34 needs 17 values, so the first 16 rows go.
        assert_eq!(table.len(), 84);
        assert_eq!(table.candles[0].close, 116.0);
        assert_eq!(table.ma_fast.len(), 84);
        assert!(table.ma_slow_last().is_some());
        assert!(table.ma_long_last().is_some());
    }

    #[test]
    fn ema_table_keeps_every_row() {
        let table = CandleTable::prepare(Timeframe::M15, series(40), &MaSpec::EMA_9_21);
        assert_eq!(table.len(), 40);
        assert!(table.ma_long_last().is_none());
    }

    #[test]
    fn atr_is_mean_range() {
        let table = CandleTable::prepare(Timeframe::H1, series(60), &MaSpec::SMA_34_89_200);
        assert!((table.atr_last() - 2.0).abs() < 1e-9);
    }

    #[test]
    fn volume_ratio_alternates_around_one() {
        let table = CandleTable::prepare(Timeframe::H1, series(60), &MaSpec::SMA_34_89_200);
        // 59 is odd: volume 30 against a mean of 20.
        assert!((table.volume_ratio_last() - 1.5).abs() < 1e-9);
    }

    #[test]
    fn range_covers_tail() {
        let table = CandleTable::prepare(Timeframe::H1, series(60), &MaSpec::EMA_9_21);
        let (high, low) = table.range(10).unwrap();
        assert_eq!(high, 160.0);
        assert_eq!(low, 149.0);
    }

    #[test]
    fn too_short_series_is_empty() {
        let table = CandleTable::prepare(Timeframe::D1, series(10), &MaSpec::SMA_34_89_200);
        assert!(table.is_empty());
        assert_eq!(table.close(), 0.0);
    }

    #[test]
    fn labels_follow_kind() {
        assert_eq!(MaSpec::SMA_34_89_200.fast_label(), "MA34");
        assert_eq!(MaSpec::EMA_9_21.slow_label(), "EMA21");
    }
}
