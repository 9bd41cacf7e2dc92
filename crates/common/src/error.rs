use thiserror::Error;

use crate::Timeframe;

#[derive(Debug, Error)]
pub enum Error {
    /// Not enough candles left after indicator warm-up. Never retried.
    #[error("Insufficient history for {symbol} {timeframe}: have {have} candles, need {need}")]
    InsufficientHistory {
        symbol: String,
        timeframe: Timeframe,
        have: usize,
        need: usize,
    },

    #[error("Rate limited by data source: {0}")]
    RateLimited(String),

    #[error("HTTP error: {0}")]
    Http(String),

    #[error("Exchange API error: {0}")]
    Exchange(String),

    #[error("Corrupt persisted state: {0}")]
    CorruptState(String),

    #[error("A market scan is already running")]
    ScanConflict,

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

impl Error {
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, Error::RateLimited(_))
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
