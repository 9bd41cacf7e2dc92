use chrono::{DateTime, Utc};
use serde::Serialize;

use common::{Candle, Structure};

/// How many of the most recent swing points the structure classifier looks at.
pub const STRUCTURE_POINTS: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SwingPoint {
    pub index: usize,
    pub time: DateTime<Utc>,
    pub price: f64,
}

/// Local extremes: candle `i` is a swing high when its high is the maximum of
/// the window `[i - lookback, i + lookback]` (swing lows mirrored).
/// Candles closer than `lookback` to either end are never swing points.
pub fn find_swings(candles: &[Candle], lookback: usize) -> (Vec<SwingPoint>, Vec<SwingPoint>) {
    let mut highs = Vec::new();
    let mut lows = Vec::new();
    if lookback == 0 || candles.len() <= 2 * lookback {
        return (highs, lows);
    }

    for i in lookback..candles.len() - lookback {
        let window = &candles[i - lookback..=i + lookback];
        let max_high = window.iter().map(|c| c.high).fold(f64::NEG_INFINITY, f64::max);
        let min_low = window.iter().map(|c| c.low).fold(f64::INFINITY, f64::min);
        let c = &candles[i];
        if c.high == max_high {
            highs.push(SwingPoint { index: i, time: c.open_time, price: c.high });
        }
        if c.low == min_low {
            lows.push(SwingPoint { index: i, time: c.open_time, price: c.low });
        }
    }
    (highs, lows)
}

/// Classify the last [`STRUCTURE_POINTS`] swing highs and lows.
///
/// Strictly rising highs and lows is an uptrend, strictly falling both a
/// downtrend; anything else, or fewer than two points of either, is sideways.
pub fn classify_structure(highs: &[f64], lows: &[f64]) -> Structure {
    let highs = &highs[highs.len().saturating_sub(STRUCTURE_POINTS)..];
    let lows = &lows[lows.len().saturating_sub(STRUCTURE_POINTS)..];
    if highs.len() < 2 || lows.len() < 2 {
        return Structure::Sideways;
    }

    let rising = |s: &[f64]| s.windows(2).all(|w| w[1] > w[0]);
    let falling = |s: &[f64]| s.windows(2).all(|w| w[1] < w[0]);

    if rising(highs) && rising(lows) {
        Structure::Uptrend
    } else if falling(highs) && falling(lows) {
        Structure::Downtrend
    } else {
        Structure::Sideways
    }
}

/// Swing detection followed by classification.
pub fn structure_of(candles: &[Candle], lookback: usize) -> Structure {
    let (highs, lows) = find_swings(candles, lookback);
    let highs: Vec<f64> = highs.iter().map(|p| p.price).collect();
    let lows: Vec<f64> = lows.iter().map(|p| p.price).collect();
    classify_structure(&highs, &lows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn candle(i: i64, high: f64, low: f64) -> Candle {
        Candle {
            open_time: Utc.timestamp_opt(1_700_000_000 + i * 3600, 0).unwrap(),
            open: (high + low) / 2.0,
            high,
            low,
            close: (high + low) / 2.0,
            volume: 1.0,
        }
    }

    #[test]
    fn rising_points_are_uptrend() {
        assert_eq!(classify_structure(&[10.0, 12.0, 14.0], &[5.0, 6.0, 7.0]), Structure::Uptrend);
    }

    #[test]
    fn falling_points_are_downtrend() {
        assert_eq!(classify_structure(&[14.0, 12.0, 10.0], &[7.0, 6.0, 5.0]), Structure::Downtrend);
    }

    #[test]
    fn mixed_points_are_sideways() {
        assert_eq!(classify_structure(&[10.0, 12.0, 11.0], &[5.0, 6.0, 7.0]), Structure::Sideways);
    }

    #[test]
    fn single_point_is_sideways() {
        assert_eq!(classify_structure(&[10.0], &[5.0, 6.0]), Structure::Sideways);
        assert_eq!(classify_structure(&[], &[]), Structure::Sideways);
    }

    #[test]
    fn only_last_three_points_count() {
        // An old lower high does not break a fresh run of higher highs.
        let highs = [20.0, 10.0, 12.0, 14.0];
        let lows = [1.0, 5.0, 6.0, 7.0];
        assert_eq!(classify_structure(&highs, &lows), Structure::Uptrend);
    }

    #[test]
    fn peak_in_middle_is_swing_high() {
        let candles: Vec<Candle> = [1.0, 2.0, 5.0, 2.0, 1.0]
            .iter()
            .enumerate()
            .map(|(i, &h)| candle(i as i64, h, h - 0.5))
            .collect();
        let (highs, lows) = find_swings(&candles, 2);
        assert_eq!(highs.len(), 1);
        assert_eq!(highs[0].index, 2);
        assert_eq!(highs[0].price, 5.0);
        assert!(lows.is_empty());
    }

    #[test]
    fn short_series_has_no_swings() {
        let candles: Vec<Candle> = (0..4).map(|i| candle(i, 2.0, 1.0)).collect();
        let (highs, lows) = find_swings(&candles, 2);
        assert!(highs.is_empty() && lows.is_empty());
    }

    #[test]
    fn zigzag_up_is_uptrend() {
        let highs = [10.0, 8.0, 12.0, 10.0, 14.0, 12.0, 16.0, 14.0, 18.0];
        let candles: Vec<Candle> = highs
            .iter()
            .enumerate()
            .map(|(i, &h)| candle(i as i64, h, h - 3.0))
            .collect();
        assert_eq!(structure_of(&candles, 1), Structure::Uptrend);
    }
}
