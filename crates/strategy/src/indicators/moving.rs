use common::Slope;

/// Percent change beyond which an MA is considered to be rising or falling.
pub const SLOPE_THRESHOLD_PCT: f64 = 0.15;

/// Rolling mean over `window` values, defined once `min_periods` values are
/// available (shorter windows at the start of the series are allowed).
pub fn rolling_mean(values: &[f64], window: usize, min_periods: usize) -> Vec<Option<f64>> {
    let window = window.max(1);
    let min_periods = min_periods.clamp(1, window);
    (0..values.len())
        .map(|i| {
            let start = (i + 1).saturating_sub(window);
            let slice = &values[start..=i];
            (slice.len() >= min_periods).then(|| slice.iter().sum::<f64>() / slice.len() as f64)
        })
        .collect()
}

/// Simple moving average, available after `max(1, period / 2)` values.
pub fn sma(values: &[f64], period: usize) -> Vec<Option<f64>> {
    rolling_mean(values, period, (period / 2).max(1))
}

/// Exponential moving average seeded with the first value.
pub fn ema(values: &[f64], period: usize) -> Vec<f64> {
    let alpha = 2.0 / (period.max(1) as f64 + 1.0);
    let mut out = Vec::with_capacity(values.len());
    let mut prev = match values.first() {
        Some(&v) => v,
        None => return out,
    };
    for &v in values {
        prev = alpha * v + (1.0 - alpha) * prev;
        out.push(prev);
    }
    out
}

/// Classify the relative change between the last value and the value `n - 1`
/// rows earlier. Too-short input is `Flat`.
pub fn slope(series: &[f64], n: usize) -> Slope {
    if n < 2 || series.len() < n {
        return Slope::Flat;
    }
    let last = series[series.len() - 1];
    let prev = series[series.len() - n];
    if prev == 0.0 || !prev.is_finite() || !last.is_finite() {
        return Slope::Flat;
    }
    let change = (last - prev) / prev * 100.0;
    if change > SLOPE_THRESHOLD_PCT {
        Slope::Up
    } else if change < -SLOPE_THRESHOLD_PCT {
        Slope::Down
    } else {
        Slope::Flat
    }
}

/// The trailing run of defined values of an optional series.
pub fn defined_tail(series: &[Option<f64>]) -> Vec<f64> {
    let mut tail: Vec<f64> = series.iter().rev().map_while(|v| *v).collect();
    tail.reverse();
    tail
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sma_uses_half_period_minimum() {
        let values: Vec<f64> = (1..=10).map(f64::from).collect();
        let out = sma(&values, 4);
        assert_eq!(out[0], None);
        assert_eq!(out[1], Some(1.5));
        assert_eq!(out[3], Some(2.5));
        assert_eq!(out[9], Some(8.5));
    }

    #[test]
    fn rolling_mean_with_min_one_is_always_defined() {
        let out = rolling_mean(&[2.0, 4.0, 6.0], 20, 1);
        assert_eq!(out, vec![Some(2.0), Some(3.0), Some(4.0)]);
    }

    #[test]
    fn ema_of_constant_is_constant() {
        let out = ema(&[5.0; 30], 9);
        assert!(out.iter().all(|v| (v - 5.0).abs() < 1e-12));
    }

    #[test]
    fn ema_tracks_rising_series_from_below() {
        let values: Vec<f64> = (0..50).map(f64::from).collect();
        let out = ema(&values, 9);
        assert!(out[49] < 49.0 && out[49] > 40.0);
    }

    #[test]
    fn slope_thresholds() {
        assert_eq!(slope(&[100.0, 100.1, 100.2, 100.3, 100.4], 5), Slope::Up);
        assert_eq!(slope(&[100.0, 99.9, 99.8, 99.7, 99.6], 5), Slope::Down);
        assert_eq!(slope(&[100.0, 100.0, 100.0, 100.0, 100.1], 5), Slope::Flat);
        assert_eq!(slope(&[100.0, 120.0], 5), Slope::Flat);
    }

    #[test]
    fn defined_tail_skips_warmup() {
        assert_eq!(defined_tail(&[None, None, Some(1.0), Some(2.0)]), vec![1.0, 2.0]);
        assert!(defined_tail(&[Some(1.0), None]).is_empty());
    }
}
