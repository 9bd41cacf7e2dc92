use common::{Timeframe, Variant};

use crate::indicators::MaSpec;

/// Which of the three timeframes a rule reads from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Layer {
    Trend,
    Confirm,
    Fast,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameSpec {
    pub timeframe: Timeframe,
    /// Candles requested from the data source.
    pub candles: usize,
}

impl FrameSpec {
    const fn new(timeframe: Timeframe, candles: usize) -> Self {
        Self { timeframe, candles }
    }
}

/// Stop below the recent low (above the recent high for shorts), padded by a
/// fraction of ATR and kept within a percentage band around entry.
#[derive(Debug, Clone, PartialEq)]
pub struct StopRule {
    pub layer: Layer,
    pub window: usize,
    pub atr_buffer: f64,
    pub min_pct: f64,
    pub max_pct: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TargetRule {
    pub layer: Layer,
    /// Candles searched for swing targets.
    pub window: usize,
    pub swing_lookback: usize,
    /// First target must sit between these distances from entry.
    pub min_pct: f64,
    pub max_pct: f64,
    /// Fallback target is `entry ± atr * atr_multiple` of this layer.
    pub atr_layer: Layer,
    pub atr_multiple: f64,
    /// Candles whose range drives the extension and optimal-entry levels.
    pub ext_window: usize,
    /// Minimum gap between the first and second target.
    pub ext_gap_pct: f64,
    pub cap_1272_pct: f64,
    pub cap_1618_pct: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RsiFilter {
    pub period: usize,
    pub long_zone: (f64, f64),
    pub short_zone: (f64, f64),
    pub overbought: f64,
    pub oversold: f64,
}

/// Verdict of a record that stands aside (direction WAIT) without
/// failing the R:R gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StandAside {
    /// The checklist verdict applies unchanged.
    Checklist,
    /// Always WAIT: nothing to reject, just nothing to take yet.
    Wait,
}

/// Everything that distinguishes one variant from another. The decision
/// skeleton itself is shared.
#[derive(Debug, Clone, PartialEq)]
pub struct VariantParams {
    pub variant: Variant,
    pub trend: FrameSpec,
    pub confirm: FrameSpec,
    pub fast: FrameSpec,
    pub averages: MaSpec,
    /// Minimum rows left in every table after indicator warm-up.
    pub min_rows: usize,

    pub high_score: u32,
    pub medium_score: u32,
    /// MEDIUM confidence counts as a failed check rather than an open one.
    pub medium_confidence_fails: bool,
    pub stand_aside: StandAside,

    /// Swing lookback used for trend and confirmation structure.
    pub structure_lookback: usize,
    pub momentum_layer: Layer,
    pub volume_confirm: f64,
    pub zone_layer: Layer,
    pub zone_window: usize,
    /// Retracement ratios bounding the pullback zone.
    pub zone: (f64, f64),
    pub rsi: Option<RsiFilter>,
    /// Warn when price is further than this from the trend fast MA.
    pub far_from_ma_pct: Option<f64>,

    pub volatility_layer: Layer,
    pub compress: f64,
    pub expand: f64,
    /// Funding (percent) against the trade beyond which confidence is cut.
    pub funding_extreme: f64,
    /// Funding (percent) in favour of the trade worth a note.
    pub funding_favourable: f64,
    /// Open-interest change (percent) against the trade that vetoes it, inclusive.
    pub oi_block_pct: f64,

    pub stop: StopRule,
    pub target: TargetRule,
    pub optimal_entry: bool,
    /// Anything below this R:R is never directional.
    pub min_rr: f64,
}

impl VariantParams {
    pub fn for_variant(variant: Variant) -> Self {
        match variant {
            Variant::Position => Self::position(),
            Variant::Swing => Self::swing(),
            Variant::Scalp => Self::scalp(),
        }
    }

    pub fn frames(&self) -> [FrameSpec; 3] {
        [self.trend, self.confirm, self.fast]
    }

    pub fn frame(&self, layer: Layer) -> FrameSpec {
        match layer {
            Layer::Trend => self.trend,
            Layer::Confirm => self.confirm,
            Layer::Fast => self.fast,
        }
    }

    /// D1 trend, H4 confirmation, H1 timing.
    pub fn position() -> Self {
        Self {
            variant: Variant::Position,
            trend: FrameSpec::new(Timeframe::D1, 300),
            confirm: FrameSpec::new(Timeframe::H4, 300),
            fast: FrameSpec::new(Timeframe::H1, 150),
            averages: MaSpec::SMA_34_89_200,
            min_rows: 10,
            high_score: 5,
            medium_score: 3,
            medium_confidence_fails: true,
            stand_aside: StandAside::Checklist,
            structure_lookback: 5,
            momentum_layer: Layer::Fast,
            volume_confirm: 1.3,
            zone_layer: Layer::Fast,
            zone_window: 60,
            zone: (0.5, 0.618),
            rsi: None,
            far_from_ma_pct: Some(8.0),
            volatility_layer: Layer::Confirm,
            compress: 0.6,
            expand: 1.8,
            funding_extreme: 0.05,
            funding_favourable: 0.03,
            oi_block_pct: 3.0,
            stop: StopRule {
                layer: Layer::Fast,
                window: 20,
                atr_buffer: 0.5,
                min_pct: 1.0,
                max_pct: 4.0,
            },
            target: TargetRule {
                layer: Layer::Confirm,
                window: 30,
                swing_lookback: 3,
                min_pct: 2.0,
                max_pct: 15.0,
                atr_layer: Layer::Fast,
                atr_multiple: 3.0,
                ext_window: 60,
                ext_gap_pct: 0.5,
                cap_1272_pct: 40.0,
                cap_1618_pct: 50.0,
            },
            optimal_entry: true,
            min_rr: 1.0,
        }
    }

    /// H4 trend, H1 confirmation, M15 timing.
    pub fn swing() -> Self {
        Self {
            variant: Variant::Swing,
            trend: FrameSpec::new(Timeframe::H4, 200),
            confirm: FrameSpec::new(Timeframe::H1, 200),
            fast: FrameSpec::new(Timeframe::M15, 100),
            averages: MaSpec::SMA_34_89_200,
            min_rows: 10,
            high_score: 5,
            medium_score: 3,
            medium_confidence_fails: false,
            stand_aside: StandAside::Wait,
            structure_lookback: 5,
            momentum_layer: Layer::Confirm,
            volume_confirm: 1.3,
            zone_layer: Layer::Confirm,
            zone_window: 20,
            zone: (0.5, 0.618),
            rsi: None,
            far_from_ma_pct: None,
            volatility_layer: Layer::Trend,
            compress: 0.6,
            expand: 1.8,
            funding_extreme: 0.05,
            funding_favourable: 0.03,
            oi_block_pct: 3.0,
            stop: StopRule {
                layer: Layer::Confirm,
                window: 20,
                atr_buffer: 0.5,
                min_pct: 2.0,
                max_pct: 3.0,
            },
            target: TargetRule {
                layer: Layer::Confirm,
                window: 20,
                swing_lookback: 2,
                min_pct: 1.5,
                max_pct: 10.0,
                atr_layer: Layer::Confirm,
                atr_multiple: 2.5,
                ext_window: 20,
                ext_gap_pct: 0.5,
                cap_1272_pct: 30.0,
                cap_1618_pct: 40.0,
            },
            optimal_entry: false,
            min_rr: 1.0,
        }
    }

    /// H1 trend, M15 confirmation, M5 timing, EMA-based.
    pub fn scalp() -> Self {
        Self {
            variant: Variant::Scalp,
            trend: FrameSpec::new(Timeframe::H1, 100),
            confirm: FrameSpec::new(Timeframe::M15, 150),
            fast: FrameSpec::new(Timeframe::M5, 100),
            averages: MaSpec::EMA_9_21,
            min_rows: 20,
            high_score: 5,
            medium_score: 3,
            medium_confidence_fails: false,
            stand_aside: StandAside::Wait,
            structure_lookback: 3,
            momentum_layer: Layer::Confirm,
            volume_confirm: 1.5,
            zone_layer: Layer::Confirm,
            zone_window: 30,
            zone: (0.382, 0.618),
            rsi: Some(RsiFilter {
                period: 14,
                long_zone: (40.0, 70.0),
                short_zone: (30.0, 60.0),
                overbought: 75.0,
                oversold: 25.0,
            }),
            far_from_ma_pct: None,
            volatility_layer: Layer::Confirm,
            compress: 0.5,
            expand: 2.0,
            funding_extreme: 0.05,
            funding_favourable: 0.03,
            oi_block_pct: 3.0,
            stop: StopRule {
                layer: Layer::Confirm,
                window: 30,
                atr_buffer: 0.3,
                min_pct: 0.8,
                max_pct: 1.5,
            },
            target: TargetRule {
                layer: Layer::Confirm,
                window: 30,
                swing_lookback: 2,
                min_pct: 0.8,
                max_pct: 6.0,
                atr_layer: Layer::Confirm,
                atr_multiple: 2.0,
                ext_window: 30,
                ext_gap_pct: 0.3,
                cap_1272_pct: 20.0,
                cap_1618_pct: 25.0,
            },
            optimal_entry: false,
            min_rr: 1.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timeframe_triples() {
        let tfs = |p: VariantParams| p.frames().map(|f| f.timeframe);
        assert_eq!(tfs(VariantParams::position()), [Timeframe::D1, Timeframe::H4, Timeframe::H1]);
        assert_eq!(tfs(VariantParams::swing()), [Timeframe::H4, Timeframe::H1, Timeframe::M15]);
        assert_eq!(tfs(VariantParams::scalp()), [Timeframe::H1, Timeframe::M15, Timeframe::M5]);
    }

    #[test]
    fn stop_bands_are_ordered() {
        for variant in Variant::ALL {
            let p = VariantParams::for_variant(variant);
            assert!(p.stop.min_pct < p.stop.max_pct, "{variant}");
            assert!(p.target.min_pct < p.target.max_pct, "{variant}");
            assert!(p.medium_score < p.high_score, "{variant}");
        }
    }

    #[test]
    fn only_position_fails_medium_confidence() {
        assert!(VariantParams::position().medium_confidence_fails);
        assert_eq!(VariantParams::position().stand_aside, StandAside::Checklist);
        for p in [VariantParams::swing(), VariantParams::scalp()] {
            assert!(!p.medium_confidence_fails, "{}", p.variant);
            assert_eq!(p.stand_aside, StandAside::Wait, "{}", p.variant);
        }
    }
}
