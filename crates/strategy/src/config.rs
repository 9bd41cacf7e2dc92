use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use common::{Error, Result, Variant};

use crate::engine::VariantParams;

/// Optional per-variant threshold overrides (TOML).
///
/// Example `config/strategies.toml`:
/// ```toml
/// [position]
/// high_score = 5
/// medium_score = 3
///
/// [scalp]
/// volume_confirm = 1.5
/// min_rr = 1.2
/// ```
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct StrategyFileConfig {
    pub position: ThresholdOverrides,
    pub swing: ThresholdOverrides,
    pub scalp: ThresholdOverrides,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct ThresholdOverrides {
    pub high_score: Option<u32>,
    pub medium_score: Option<u32>,
    pub volume_confirm: Option<f64>,
    pub funding_extreme: Option<f64>,
    pub funding_favourable: Option<f64>,
    pub oi_block_pct: Option<f64>,
    pub min_rr: Option<f64>,
}

impl ThresholdOverrides {
    pub fn apply(&self, params: &mut VariantParams) {
        if let Some(v) = self.high_score {
            params.high_score = v;
        }
        if let Some(v) = self.medium_score {
            params.medium_score = v;
        }
        if let Some(v) = self.volume_confirm {
            params.volume_confirm = v;
        }
        if let Some(v) = self.funding_extreme {
            params.funding_extreme = v;
        }
        if let Some(v) = self.funding_favourable {
            params.funding_favourable = v;
        }
        if let Some(v) = self.oi_block_pct {
            params.oi_block_pct = v;
        }
        if let Some(v) = self.min_rr {
            params.min_rr = v;
        }
    }
}

impl StrategyFileConfig {
    /// Load from a TOML file. A missing or malformed file falls back to the
    /// built-in thresholds.
    pub fn load(path: &str) -> Self {
        let content = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) => {
                info!(path, error = %e, "No strategy overrides, using built-in thresholds");
                return Self::default();
            }
        };
        Self::parse(&content).unwrap_or_else(|e| {
            warn!(path, error = %e, "Ignoring malformed strategy config");
            Self::default()
        })
    }

    pub fn parse(content: &str) -> Result<Self> {
        let cfg: Self = toml::from_str(content).map_err(|e| Error::Config(e.to_string()))?;
        for variant in Variant::ALL {
            let o = cfg.overrides(variant);
            if let (Some(high), Some(medium)) = (o.high_score, o.medium_score) {
                if medium > high {
                    return Err(Error::Config(format!(
                        "{variant}: medium_score {medium} above high_score {high}"
                    )));
                }
            }
        }
        Ok(cfg)
    }

    pub fn overrides(&self, variant: Variant) -> &ThresholdOverrides {
        match variant {
            Variant::Position => &self.position,
            Variant::Swing => &self.swing,
            Variant::Scalp => &self.scalp,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_is_all_defaults() {
        let cfg = StrategyFileConfig::parse("").unwrap();
        assert_eq!(cfg.swing, ThresholdOverrides::default());
    }

    #[test]
    fn overrides_apply_only_what_is_set() {
        let cfg = StrategyFileConfig::parse("[swing]\nmin_rr = 1.4\nvolume_confirm = 1.6\n").unwrap();
        let mut params = VariantParams::swing();
        cfg.overrides(Variant::Swing).apply(&mut params);
        assert_eq!(params.min_rr, 1.4);
        assert_eq!(params.volume_confirm, 1.6);
        assert_eq!(params.high_score, 5);
    }

    #[test]
    fn inverted_cutoffs_rejected() {
        let err = StrategyFileConfig::parse("[position]\nhigh_score = 2\nmedium_score = 4\n");
        assert!(matches!(err, Err(Error::Config(_))));
    }

    #[test]
    fn unknown_key_rejected() {
        assert!(StrategyFileConfig::parse("[scalp]\nhigh = 3\n").is_err());
    }

    #[test]
    fn missing_file_falls_back() {
        let cfg = StrategyFileConfig::load("/nonexistent/strategies.toml");
        assert_eq!(cfg.position, ThresholdOverrides::default());
    }
}
