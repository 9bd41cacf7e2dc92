/// RSI (Relative Strength Index) with Wilder smoothing.
///
/// Used by the scalp variant as a momentum filter on the confirmation timeframe.
#[derive(Debug, Clone)]
pub struct RsiIndicator {
    pub period: usize,
    pub overbought: f64,
    pub oversold: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RsiZone {
    Overbought,
    Oversold,
    Neutral,
}

impl RsiIndicator {
    pub fn new(period: usize, overbought: f64, oversold: f64) -> Self {
        Self {
            period: period.max(2),
            overbought,
            oversold,
        }
    }

    /// RSI of the last close (oldest first). `None` with fewer than
    /// `period + 1` values.
    pub fn compute(&self, closes: &[f64]) -> Option<f64> {
        if closes.len() < self.period + 1 {
            return None;
        }

        let changes: Vec<f64> = closes.windows(2).map(|w| w[1] - w[0]).collect();
        let (seed, rest) = changes.split_at(self.period);
        let n = self.period as f64;

        let mut avg_gain = seed.iter().filter(|&&c| c > 0.0).sum::<f64>() / n;
        let mut avg_loss = seed.iter().filter(|&&c| c < 0.0).map(|c| c.abs()).sum::<f64>() / n;

        for &change in rest {
            avg_gain = (avg_gain * (n - 1.0) + change.max(0.0)) / n;
            avg_loss = (avg_loss * (n - 1.0) + (-change).max(0.0)) / n;
        }

        if avg_loss == 0.0 {
            return Some(100.0);
        }
        let rs = avg_gain / avg_loss;
        Some(100.0 - 100.0 / (1.0 + rs))
    }

    pub fn zone(&self, value: f64) -> RsiZone {
        if value >= self.overbought {
            RsiZone::Overbought
        } else if value <= self.oversold {
            RsiZone::Oversold
        } else {
            RsiZone::Neutral
        }
    }
}
