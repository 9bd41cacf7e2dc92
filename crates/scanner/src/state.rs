use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use common::{SignalRecord, Ticker, Variant};

/// One retained scan result: the signal plus the ticker stats it came from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanHit {
    pub volume_24h: f64,
    pub price_change_pct: f64,
    #[serde(flatten)]
    pub signal: SignalRecord,
}

impl ScanHit {
    pub fn new(signal: SignalRecord, ticker: &Ticker) -> Self {
        Self {
            volume_24h: ticker.quote_volume,
            price_change_pct: ticker.price_change_pct,
            signal,
        }
    }
}

/// What one worker reports back to the scan owner.
#[derive(Debug)]
pub enum UnitOutcome {
    Hit(Box<ScanHit>),
    /// Evaluated but not directional or below the R:R floor.
    Filtered { symbol: String },
    Failed { symbol: String, error: String },
    /// Not evaluated because the scan was cancelled.
    Skipped { symbol: String },
}

/// Process-wide scan state. Only the scan owner task writes it.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScanState {
    pub scan_id: Option<Uuid>,
    pub variant: Variant,
    pub running: bool,
    pub progress: usize,
    pub total: usize,
    pub results: Vec<ScanHit>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub error: Option<String>,
}

/// [`ScanState`] without the result list.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScanStatus {
    pub scan_id: Option<Uuid>,
    pub variant: Variant,
    pub running: bool,
    pub progress: usize,
    pub total: usize,
    pub result_count: usize,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub error: Option<String>,
}

impl From<&ScanState> for ScanStatus {
    fn from(s: &ScanState) -> Self {
        Self {
            scan_id: s.scan_id,
            variant: s.variant,
            running: s.running,
            progress: s.progress,
            total: s.total,
            result_count: s.results.len(),
            started_at: s.started_at,
            finished_at: s.finished_at,
            error: s.error.clone(),
        }
    }
}

/// Best first: confidence tier, then score, then R:R.
pub fn rank(hits: &mut [ScanHit]) {
    hits.sort_by(|a, b| {
        let (a, b) = (&a.signal, &b.signal);
        b.confidence
            .cmp(&a.confidence)
            .then(b.score.cmp(&a.score))
            .then(b.levels.risk_reward.total_cmp(&a.levels.risk_reward))
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::{Confidence, Direction};

    fn hit(symbol: &str, confidence: Confidence, score: u32, rr: f64) -> ScanHit {
        let mut signal = SignalRecord {
            symbol: symbol.into(),
            direction: Direction::Long,
            confidence,
            score,
            ..SignalRecord::default()
        };
        signal.levels.risk_reward = rr;
        ScanHit {
            volume_24h: 1e7,
            price_change_pct: 1.0,
            signal,
        }
    }

    #[test]
    fn ranks_by_tier_then_score_then_rr() {
        let mut hits = vec![
            hit("A", Confidence::Medium, 9, 3.0),
            hit("B", Confidence::High, 5, 1.2),
            hit("C", Confidence::High, 6, 1.1),
            hit("D", Confidence::High, 5, 2.5),
        ];
        rank(&mut hits);
        let order: Vec<&str> = hits.iter().map(|h| h.signal.symbol.as_str()).collect();
        assert_eq!(order, ["C", "D", "B", "A"]);
    }

    #[test]
    fn hit_serialises_flat() {
        let json = serde_json::to_value(hit("X", Confidence::High, 5, 2.0)).unwrap();
        assert_eq!(json["symbol"], "X");
        assert_eq!(json["volume_24h"], 1e7);
    }
}
