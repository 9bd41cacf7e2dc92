use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use common::{Bias, Confidence, Direction, Result, SignalRecord, Variant, Verdict};

/// Rows kept after every append.
pub const MAX_ENTRIES: usize = 200;
/// Recent rows compared against a new signal.
const DEDUP_SCAN: i64 = 100;

/// The persisted projection of a directional signal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub time: DateTime<Utc>,
    pub symbol: String,
    pub variant: Variant,
    pub direction: Direction,
    pub confidence: Confidence,
    pub price: f64,
    pub entry: f64,
    pub stop_loss: f64,
    pub stop_pct: f64,
    pub take_profit_1: f64,
    pub tp1_pct: f64,
    pub take_profit_2: f64,
    pub risk_reward: f64,
    pub trend_bias: Bias,
    pub confirm_bias: Bias,
    pub score: u32,
    pub verdict: Verdict,
}

impl From<&SignalRecord> for HistoryEntry {
    fn from(r: &SignalRecord) -> Self {
        Self {
            time: r.timestamp,
            symbol: r.symbol.clone(),
            variant: r.variant,
            direction: r.direction,
            confidence: r.confidence,
            price: r.price,
            entry: r.levels.entry,
            stop_loss: r.levels.stop_loss,
            stop_pct: r.levels.stop_pct,
            take_profit_1: r.levels.take_profit_1,
            tp1_pct: r.levels.tp1_pct,
            take_profit_2: r.levels.take_profit_2,
            risk_reward: r.levels.risk_reward,
            trend_bias: r.trend.bias,
            confirm_bias: r.confirm.bias,
            score: r.score,
            verdict: r.verdict,
        }
    }
}

/// Two signals are the same trade idea when they share symbol and direction,
/// fall within `window` of each other and enter within `tolerance` (fraction).
#[derive(Debug, Clone, Copy)]
pub struct DedupPolicy {
    pub window: Duration,
    pub tolerance: f64,
}

impl Default for DedupPolicy {
    fn default() -> Self {
        Self {
            window: Duration::hours(2),
            tolerance: 0.01,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordOutcome {
    Appended,
    Duplicate,
    NotDirectional,
}

/// Whether `candidate` repeats one of `recent`.
pub fn is_duplicate(candidate: &HistoryEntry, recent: &[HistoryEntry], policy: DedupPolicy) -> bool {
    let cutoff = candidate.time - policy.window;
    recent.iter().any(|h| {
        h.time >= cutoff
            && h.symbol == candidate.symbol
            && h.direction == candidate.direction
            && h.entry > 0.0
            && (candidate.entry - h.entry).abs() / h.entry <= policy.tolerance
    })
}

/// Bounded signal log in SQLite. Appends are serialised so the duplicate
/// check and the insert see the same table.
pub struct HistoryStore {
    pool: SqlitePool,
    write_lock: Mutex<()>,
    max_entries: usize,
    dedup: DedupPolicy,
}

impl HistoryStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self {
            pool,
            write_lock: Mutex::new(()),
            max_entries: MAX_ENTRIES,
            dedup: DedupPolicy::default(),
        }
    }

    pub fn with_limits(mut self, max_entries: usize, dedup: DedupPolicy) -> Self {
        self.max_entries = max_entries;
        self.dedup = dedup;
        self
    }

    /// Append `signal` unless it is non-directional or a duplicate.
    pub async fn record(&self, signal: &SignalRecord) -> Result<RecordOutcome> {
        if !signal.is_directional() {
            return Ok(RecordOutcome::NotDirectional);
        }
        let entry = HistoryEntry::from(signal);
        let direction = entry.direction.to_string();

        let _guard = self.write_lock.lock().await;

        let recent: Vec<String> = sqlx::query_scalar(
            "SELECT payload FROM signal_history
             WHERE symbol = ? AND direction = ?
             ORDER BY id DESC LIMIT ?",
        )
        .bind(&entry.symbol)
        .bind(&direction)
        .bind(DEDUP_SCAN)
        .fetch_all(&self.pool)
        .await?;
        let recent = parse_rows(recent);

        if is_duplicate(&entry, &recent, self.dedup) {
            debug!(symbol = %entry.symbol, direction = %entry.direction, "Duplicate signal skipped");
            return Ok(RecordOutcome::Duplicate);
        }

        let payload = serde_json::to_string(&entry)?;
        sqlx::query(
            "INSERT INTO signal_history (symbol, direction, entry, created_at, payload)
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(&entry.symbol)
        .bind(&direction)
        .bind(entry.entry)
        .bind(entry.time.to_rfc3339())
        .bind(&payload)
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "DELETE FROM signal_history WHERE id NOT IN
             (SELECT id FROM signal_history ORDER BY id DESC LIMIT ?)",
        )
        .bind(self.max_entries as i64)
        .execute(&self.pool)
        .await?;

        info!(
            symbol = %entry.symbol,
            direction = %entry.direction,
            confidence = %entry.confidence,
            entry = entry.entry,
            "Signal recorded"
        );
        Ok(RecordOutcome::Appended)
    }

    /// All entries, oldest first.
    pub async fn list(&self) -> Result<Vec<HistoryEntry>> {
        let rows: Vec<String> = sqlx::query_scalar("SELECT payload FROM signal_history ORDER BY id ASC")
            .fetch_all(&self.pool)
            .await?;
        Ok(parse_rows(rows))
    }

    pub async fn clear(&self) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let removed = sqlx::query("DELETE FROM signal_history")
            .execute(&self.pool)
            .await?
            .rows_affected();
        info!(removed, "History cleared");
        Ok(())
    }
}

/// Decode payload rows, skipping any that no longer parse.
fn parse_rows(rows: Vec<String>) -> Vec<HistoryEntry> {
    rows.into_iter()
        .filter_map(|payload| match serde_json::from_str(&payload) {
            Ok(entry) => Some(entry),
            Err(e) => {
                warn!(error = %e, "Skipping unreadable history row");
                None
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn entry(symbol: &str, direction: Direction, entry: f64, minutes: i64) -> HistoryEntry {
        let base = Utc.with_ymd_and_hms(2025, 1, 1, 12, 0, 0).unwrap();
        HistoryEntry {
            time: base + Duration::minutes(minutes),
            symbol: symbol.into(),
            variant: Variant::Position,
            direction,
            confidence: Confidence::High,
            price: entry,
            entry,
            stop_loss: entry * 0.98,
            stop_pct: 2.0,
            take_profit_1: entry * 1.04,
            tp1_pct: 4.0,
            take_profit_2: entry * 1.06,
            risk_reward: 2.0,
            trend_bias: Bias::Long,
            confirm_bias: Bias::Long,
            score: 6,
            verdict: Verdict::Go,
        }
    }

    #[test]
    fn same_idea_within_window_is_duplicate() {
        let policy = DedupPolicy::default();
        let recent = vec![entry("BTCUSDT", Direction::Long, 50_000.0, 0)];

        // +0.6% thirty minutes later
        assert!(is_duplicate(&entry("BTCUSDT", Direction::Long, 50_300.0, 30), &recent, policy));
        // +4% is a new idea
        assert!(!is_duplicate(&entry("BTCUSDT", Direction::Long, 52_000.0, 30), &recent, policy));
    }

    #[test]
    fn window_symbol_and_direction_all_matter() {
        let policy = DedupPolicy::default();
        let recent = vec![entry("BTCUSDT", Direction::Long, 50_000.0, 0)];

        assert!(!is_duplicate(&entry("BTCUSDT", Direction::Long, 50_000.0, 121), &recent, policy));
        assert!(!is_duplicate(&entry("BTCUSDT", Direction::Short, 50_000.0, 10), &recent, policy));
        assert!(!is_duplicate(&entry("ETHUSDT", Direction::Long, 50_000.0, 10), &recent, policy));
    }
}
