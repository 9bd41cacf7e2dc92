use common::{VolatilityReading, VolatilityState};

use super::round_to;

/// Number of trailing ATR values the current ATR is compared against.
pub const VOLATILITY_WINDOW: usize = 60;

/// Compare the latest ATR with its trailing average.
///
/// Ratios below `compress` or above `expand` leave the regime abnormal, which
/// costs one point of risk adjustment in the decision engine.
pub fn volatility_regime(atr: &[f64], compress: f64, expand: f64) -> VolatilityReading {
    let Some(&current) = atr.last() else {
        return VolatilityReading {
            ratio: 1.0,
            state: VolatilityState::Normal,
            note: "ATR unavailable".into(),
        };
    };

    let average = if atr.len() >= VOLATILITY_WINDOW {
        let tail = &atr[atr.len() - VOLATILITY_WINDOW..];
        tail.iter().sum::<f64>() / tail.len() as f64
    } else {
        current
    };
    let ratio = if average > 0.0 { current / average } else { 1.0 };
    let ratio = round_to(ratio, 2);

    let (state, note) = if ratio < compress {
        (VolatilityState::Compress, format!("ATR compressed ({ratio}x average), breakout risk"))
    } else if ratio > expand {
        (VolatilityState::Expand, format!("ATR expanded ({ratio}x average), stops likely to be hit"))
    } else {
        (VolatilityState::Normal, format!("ATR normal ({ratio}x average)"))
    };

    VolatilityReading { ratio, state, note }
}

/// Percent gap between the two reference MAs when `price` sits inside the
/// band they form (with a 0.2% margin). Narrow bands under 0.5% are ignored.
pub fn no_trade_zone(price: f64, ma_a: f64, ma_b: f64) -> Option<f64> {
    let lo = ma_a.min(ma_b);
    let hi = ma_a.max(ma_b);
    if lo <= 0.0 {
        return None;
    }
    let gap_pct = (hi - lo) / lo * 100.0;
    let inside = price >= lo * 0.998 && price <= hi * 1.002;
    (inside && gap_pct >= 0.5).then_some(gap_pct)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_history_compares_with_itself() {
        let reading = volatility_regime(&[1.0, 2.0, 3.0], 0.6, 1.8);
        assert_eq!(reading.ratio, 1.0);
        assert_eq!(reading.state, VolatilityState::Normal);
    }

    #[test]
    fn spike_is_expansion() {
        let mut atr = vec![1.0; 59];
        atr.push(10.0);
        let reading = volatility_regime(&atr, 0.6, 1.8);
        assert_eq!(reading.state, VolatilityState::Expand);
    }

    #[test]
    fn quiet_tail_is_compression() {
        let mut atr = vec![2.0; 59];
        atr.push(0.5);
        let reading = volatility_regime(&atr, 0.6, 1.8);
        assert_eq!(reading.state, VolatilityState::Compress);
    }

    #[test]
    fn empty_atr_is_normal() {
        assert_eq!(volatility_regime(&[], 0.5, 2.0).state, VolatilityState::Normal);
    }

    #[test]
    fn price_between_wide_mas_is_no_trade() {
        let gap = no_trade_zone(101.0, 100.0, 102.0).unwrap();
        assert!((gap - 2.0).abs() < 1e-9);
    }

    #[test]
    fn narrow_band_is_tradeable() {
        assert_eq!(no_trade_zone(100.1, 100.0, 100.2), None);
    }

    #[test]
    fn price_outside_band_is_tradeable() {
        assert_eq!(no_trade_zone(110.0, 100.0, 102.0), None);
        assert_eq!(no_trade_zone(90.0, 100.0, 102.0), None);
    }
}
