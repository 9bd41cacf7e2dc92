pub mod backtest;
pub mod store;

pub use backtest::{
    replay, summarize, BacktestFilter, BacktestReport, BacktestResult, BacktestSummary, Backtester,
    ConfidenceFilter, DirectionFilter, Outcome,
};
pub use store::{is_duplicate, DedupPolicy, HistoryEntry, HistoryStore, RecordOutcome};
