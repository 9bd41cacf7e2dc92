use std::sync::Arc;

use futures_util::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use common::{Candle, Confidence, Direction, MarketDataSource, Result, Timeframe};

use crate::store::{HistoryEntry, HistoryStore};

/// H1 candles fetched per replayed signal.
pub const REPLAY_CANDLES: usize = 200;
/// Signals replayed concurrently.
const REPLAY_CONCURRENCY: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Outcome {
    Win,
    Loss,
    Open,
    Error,
}

impl std::fmt::Display for Outcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Outcome::Win => write!(f, "WIN"),
            Outcome::Loss => write!(f, "LOSS"),
            Outcome::Open => write!(f, "OPEN"),
            Outcome::Error => write!(f, "ERROR"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BacktestResult {
    #[serde(flatten)]
    pub entry: HistoryEntry,
    pub outcome: Outcome,
    pub note: String,
    /// H1 candles until the outcome (all later candles while still open).
    pub bars: Option<usize>,
    pub pnl_r: Option<f64>,
    pub unrealized_pct: Option<f64>,
    pub unrealized_r: Option<f64>,
    pub exit_price: Option<f64>,
}

impl BacktestResult {
    fn error(entry: &HistoryEntry, note: impl Into<String>) -> Self {
        Self {
            entry: entry.clone(),
            outcome: Outcome::Error,
            note: note.into(),
            bars: None,
            pnl_r: None,
            unrealized_pct: None,
            unrealized_r: None,
            exit_price: None,
        }
    }
}

fn round(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    let rounded = (value * factor).round() / factor;
    if rounded.is_finite() {
        rounded
    } else {
        0.0
    }
}

/// Walk `candles` forward from the signal and report which level was hit
/// first. A candle touching both counts as a win.
pub fn replay(entry: &HistoryEntry, candles: &[Candle]) -> BacktestResult {
    let long = match entry.direction {
        Direction::Long => true,
        Direction::Short => false,
        Direction::Wait => return BacktestResult::error(entry, "Signal has no direction"),
    };
    let Some(latest) = candles.last() else {
        return BacktestResult::error(entry, "No candles available");
    };

    let later: Vec<&Candle> = candles.iter().filter(|c| c.open_time > entry.time).collect();

    for (i, c) in later.iter().enumerate() {
        let (hit_stop, hit_target) = if long {
            (c.low <= entry.stop_loss, c.high >= entry.take_profit_1)
        } else {
            (c.high >= entry.stop_loss, c.low <= entry.take_profit_1)
        };
        let bars = i + 1;
        if hit_target {
            let pnl_r = if entry.stop_pct > 0.0 {
                round(entry.tp1_pct / entry.stop_pct, 2)
            } else {
                0.0
            };
            return BacktestResult {
                entry: entry.clone(),
                outcome: Outcome::Win,
                note: format!("TP1 hit after {bars} H1 candles"),
                bars: Some(bars),
                pnl_r: Some(pnl_r),
                unrealized_pct: None,
                unrealized_r: None,
                exit_price: Some(entry.take_profit_1),
            };
        }
        if hit_stop {
            return BacktestResult {
                entry: entry.clone(),
                outcome: Outcome::Loss,
                note: format!("Stop hit after {bars} H1 candles"),
                bars: Some(bars),
                pnl_r: Some(-1.0),
                unrealized_pct: None,
                unrealized_r: None,
                exit_price: Some(entry.stop_loss),
            };
        }
    }

    let last_close = later.last().map_or(latest.close, |c| c.close);
    let unrealized_pct = if entry.entry > 0.0 {
        let raw = (last_close - entry.entry) / entry.entry * 100.0;
        round(if long { raw } else { -raw }, 2)
    } else {
        0.0
    };
    let unrealized_r = (entry.stop_pct > 0.0).then(|| round(unrealized_pct / entry.stop_pct, 2));
    let note = if later.is_empty() {
        format!("No candles after the signal, latest price {last_close} ({unrealized_pct:+.2}%)")
    } else {
        format!("Still open at {last_close} ({unrealized_pct:+.2}%)")
    };

    BacktestResult {
        entry: entry.clone(),
        outcome: Outcome::Open,
        note,
        bars: Some(later.len()),
        pnl_r: None,
        unrealized_pct: Some(unrealized_pct),
        unrealized_r,
        exit_price: Some(last_close),
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BacktestSummary {
    pub total: usize,
    pub closed: usize,
    pub wins: usize,
    pub losses: usize,
    pub opens: usize,
    pub errors: usize,
    /// Percent of closed trades that won.
    pub win_rate: f64,
    pub total_r: f64,
    pub avg_r: f64,
    pub avg_win_r: f64,
    pub avg_loss_r: f64,
    pub expectancy: f64,
    pub avg_bars_win: Option<f64>,
    pub avg_bars_loss: Option<f64>,
}

pub fn summarize(results: &[BacktestResult]) -> BacktestSummary {
    let of = |o: Outcome| results.iter().filter(move |r| r.outcome == o);
    let wins: Vec<&BacktestResult> = of(Outcome::Win).collect();
    let losses: Vec<&BacktestResult> = of(Outcome::Loss).collect();
    let closed = wins.len() + losses.len();

    let mean = |xs: &[f64]| -> Option<f64> {
        (!xs.is_empty()).then(|| xs.iter().sum::<f64>() / xs.len() as f64)
    };
    let r_of = |set: &[&BacktestResult]| -> Vec<f64> { set.iter().filter_map(|r| r.pnl_r).collect() };
    let bars_of = |set: &[&BacktestResult]| -> Vec<f64> {
        set.iter().filter_map(|r| r.bars).map(|b| b as f64).collect()
    };

    let win_r = r_of(&wins);
    let loss_r = r_of(&losses);
    let all_r: Vec<f64> = win_r.iter().chain(&loss_r).copied().collect();
    let avg_win_r = mean(&win_r).unwrap_or(0.0);
    let avg_loss_r = mean(&loss_r).unwrap_or(0.0);

    let (win_rate, expectancy) = if closed > 0 {
        let w = wins.len() as f64 / closed as f64;
        let l = losses.len() as f64 / closed as f64;
        (round(w * 100.0, 1), round(w * avg_win_r + l * avg_loss_r, 2))
    } else {
        (0.0, 0.0)
    };

    BacktestSummary {
        total: results.len(),
        closed,
        wins: wins.len(),
        losses: losses.len(),
        opens: of(Outcome::Open).count(),
        errors: of(Outcome::Error).count(),
        win_rate,
        total_r: round(all_r.iter().sum(), 2),
        avg_r: round(mean(&all_r).unwrap_or(0.0), 2),
        avg_win_r: round(avg_win_r, 2),
        avg_loss_r: round(avg_loss_r, 2),
        expectancy,
        avg_bars_win: mean(&bars_of(&wins)).map(|v| round(v, 1)),
        avg_bars_loss: mean(&bars_of(&losses)).map(|v| round(v, 1)),
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ConfidenceFilter {
    All,
    Low,
    Medium,
    #[default]
    High,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum DirectionFilter {
    #[default]
    All,
    Long,
    Short,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BacktestFilter {
    pub confidence: ConfidenceFilter,
    pub direction: DirectionFilter,
}

impl BacktestFilter {
    pub fn admits(&self, entry: &HistoryEntry) -> bool {
        let confidence = match self.confidence {
            ConfidenceFilter::All => true,
            ConfidenceFilter::Low => entry.confidence == Confidence::Low,
            ConfidenceFilter::Medium => entry.confidence == Confidence::Medium,
            ConfidenceFilter::High => entry.confidence == Confidence::High,
        };
        let direction = match self.direction {
            DirectionFilter::All => true,
            DirectionFilter::Long => entry.direction == Direction::Long,
            DirectionFilter::Short => entry.direction == Direction::Short,
        };
        confidence && direction
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BacktestReport {
    pub results: Vec<BacktestResult>,
    pub summary: BacktestSummary,
}

/// Replays recorded signals against the candles that followed them.
pub struct Backtester {
    source: Arc<dyn MarketDataSource>,
    store: Arc<HistoryStore>,
}

impl Backtester {
    pub fn new(source: Arc<dyn MarketDataSource>, store: Arc<HistoryStore>) -> Self {
        Self { source, store }
    }

    pub async fn run(&self, filter: BacktestFilter) -> Result<BacktestReport> {
        let entries: Vec<HistoryEntry> = self
            .store
            .list()
            .await?
            .into_iter()
            .filter(|e| filter.admits(e))
            .collect();

        let results: Vec<BacktestResult> = stream::iter(entries)
            .map(|entry| async move {
                match self.source.candles(&entry.symbol, Timeframe::H1, REPLAY_CANDLES).await {
                    Ok(candles) => replay(&entry, &candles),
                    Err(e) => {
                        warn!(symbol = %entry.symbol, error = %e, "Backtest fetch failed");
                        BacktestResult::error(&entry, e.to_string())
                    }
                }
            })
            .buffered(REPLAY_CONCURRENCY)
            .collect()
            .await;

        let summary = summarize(&results);
        info!(
            total = summary.total,
            wins = summary.wins,
            losses = summary.losses,
            win_rate = summary.win_rate,
            total_r = summary.total_r,
            "Backtest finished"
        );
        Ok(BacktestReport { results, summary })
    }
}
