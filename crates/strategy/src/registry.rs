use tracing::info;

use common::Variant;

use crate::config::StrategyFileConfig;
use crate::engine::{LayeredStrategy, VariantParams};
use crate::Strategy;

/// Holds one strategy instance per variant.
pub struct StrategyRegistry {
    position: Box<dyn Strategy>,
    swing: Box<dyn Strategy>,
    scalp: Box<dyn Strategy>,
}

impl StrategyRegistry {
    /// Build the registry from built-in parameters plus file overrides.
    pub fn from_config(file_cfg: &StrategyFileConfig) -> Self {
        let build = |variant: Variant| -> Box<dyn Strategy> {
            let mut params = VariantParams::for_variant(variant);
            file_cfg.overrides(variant).apply(&mut params);
            info!(
                variant = %variant,
                trend = %params.trend.timeframe,
                confirm = %params.confirm.timeframe,
                fast = %params.fast.timeframe,
                high = params.high_score,
                medium = params.medium_score,
                "Registered strategy"
            );
            Box::new(LayeredStrategy::new(params))
        };

        Self {
            position: build(Variant::Position),
            swing: build(Variant::Swing),
            scalp: build(Variant::Scalp),
        }
    }

    pub fn get(&self, variant: Variant) -> &dyn Strategy {
        match variant {
            Variant::Position => self.position.as_ref(),
            Variant::Swing => self.swing.as_ref(),
            Variant::Scalp => self.scalp.as_ref(),
        }
    }
}

impl Default for StrategyRegistry {
    fn default() -> Self {
        Self::from_config(&StrategyFileConfig::default())
    }
}
