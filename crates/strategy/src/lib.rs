pub mod config;
pub mod context;
pub mod engine;
pub mod indicators;
pub mod registry;

pub use config::{StrategyFileConfig, ThresholdOverrides};
pub use engine::{Analyzer, Evaluator, LayeredStrategy, MarketSnapshot, VariantParams};
pub use registry::StrategyRegistry;

use chrono::{DateTime, Utc};
use common::{Result, SignalRecord, Variant};

/// All strategy variants must satisfy this trait.
pub trait Strategy: Send + Sync {
    fn variant(&self) -> Variant;

    /// Tunables of this variant, including the candle sets it needs.
    fn params(&self) -> &VariantParams;

    /// Decide on one snapshot. Pure: no I/O, no clock reads.
    ///
    /// Returns `Error::InsufficientHistory` when any timeframe is too short
    /// after indicator warm-up.
    fn decide(&self, symbol: &str, snapshot: MarketSnapshot, now: DateTime<Utc>) -> Result<SignalRecord>;
}
