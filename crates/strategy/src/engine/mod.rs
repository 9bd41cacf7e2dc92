//! The layered decision skeleton shared by every variant.
//!
//! A decision reads three timeframes (trend, confirmation, timing), scores
//! the confluence of their conditions, applies risk vetoes and derives trade
//! levels. Variants differ only in their [`VariantParams`].

pub mod checklist;
pub mod decision;
pub mod frame;
pub mod levels;
pub mod params;

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::debug;

use common::{Candle, MarketContext, MarketDataSource, Result, SignalRecord, Timeframe, Variant};

pub use decision::decide;
pub use params::{Layer, StandAside, VariantParams};

use crate::context::market_context;
use crate::registry::StrategyRegistry;
use crate::Strategy;

/// Open-interest samples compared for the change percentage.
const OI_POINTS: usize = 25;

/// Everything one decision needs, fetched up front.
#[derive(Debug, Clone, Default)]
pub struct MarketSnapshot {
    pub trend: Vec<Candle>,
    pub confirm: Vec<Candle>,
    pub fast: Vec<Candle>,
    pub funding_rate: Option<f64>,
    pub oi_change: Option<f64>,
    pub context: MarketContext,
}

/// A variant driven by the shared skeleton.
pub struct LayeredStrategy {
    params: VariantParams,
}

impl LayeredStrategy {
    pub fn new(params: VariantParams) -> Self {
        Self { params }
    }
}

impl Strategy for LayeredStrategy {
    fn variant(&self) -> Variant {
        self.params.variant
    }

    fn params(&self) -> &VariantParams {
        &self.params
    }

    fn decide(&self, symbol: &str, snapshot: MarketSnapshot, now: DateTime<Utc>) -> Result<SignalRecord> {
        decide(&self.params, symbol, snapshot, now)
    }
}

/// Produces a signal record for one instrument under one variant.
#[async_trait]
pub trait Analyzer: Send + Sync {
    async fn evaluate(&self, symbol: &str, variant: Variant) -> Result<SignalRecord>;
}

/// Fetches a snapshot from the data source and runs the registered strategy.
pub struct Evaluator {
    source: Arc<dyn MarketDataSource>,
    registry: Arc<StrategyRegistry>,
}

impl Evaluator {
    pub fn new(source: Arc<dyn MarketDataSource>, registry: Arc<StrategyRegistry>) -> Self {
        Self { source, registry }
    }

    /// Fetch the three candle sets, funding, open interest and market context
    /// concurrently. Candle failures abort; the rest degrade to unknown.
    pub async fn snapshot(&self, symbol: &str, params: &VariantParams) -> Result<MarketSnapshot> {
        let source = self.source.as_ref();
        let [trend, confirm, fast] = params.frames();
        let (candles, funding_rate, oi_change, context) = tokio::join!(
            async {
                tokio::try_join!(
                    source.candles(symbol, trend.timeframe, trend.candles),
                    source.candles(symbol, confirm.timeframe, confirm.candles),
                    source.candles(symbol, fast.timeframe, fast.candles),
                )
            },
            source.funding_rate(symbol),
            source.open_interest_change(symbol, Timeframe::H1, OI_POINTS),
            market_context(source),
        );
        let (trend, confirm, fast) = candles?;
        Ok(MarketSnapshot {
            trend,
            confirm,
            fast,
            funding_rate,
            oi_change,
            context,
        })
    }
}

#[async_trait]
impl Analyzer for Evaluator {
    async fn evaluate(&self, symbol: &str, variant: Variant) -> Result<SignalRecord> {
        let strategy = self.registry.get(variant);
        let snapshot = self.snapshot(symbol, strategy.params()).await?;
        let record = strategy.decide(symbol, snapshot, Utc::now())?;
        debug!(
            symbol,
            variant = %variant,
            direction = %record.direction,
            confidence = %record.confidence,
            "Evaluated"
        );
        Ok(record)
    }
}
