use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use tracing::{info, warn};
use uuid::Uuid;

use common::{Error, Result, Variant};

use crate::state::{ScanHit, ScanState};

/// Persists the last completed scan so results survive a restart.
#[derive(Clone)]
pub struct SnapshotStore {
    pool: SqlitePool,
}

impl SnapshotStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn save(&self, state: &ScanState) -> Result<()> {
        let (Some(scan_id), Some(finished_at)) = (state.scan_id, state.finished_at) else {
            return Err(Error::Other("only completed scans are persisted".into()));
        };
        let results = serde_json::to_string(&state.results)?;
        sqlx::query(
            "INSERT OR REPLACE INTO scan_snapshot (id, scan_id, variant, total, finished_at, results)
             VALUES (1, ?, ?, ?, ?, ?)",
        )
        .bind(scan_id.to_string())
        .bind(state.variant.to_string())
        .bind(state.total as i64)
        .bind(finished_at.to_rfc3339())
        .bind(results)
        .execute(&self.pool)
        .await?;
        info!(scan_id = %scan_id, results = state.results.len(), "Scan snapshot saved");
        Ok(())
    }

    /// The last completed scan, if one is stored and readable.
    pub async fn load(&self) -> Result<Option<ScanState>> {
        let row: Option<(String, String, i64, String, String)> = sqlx::query_as(
            "SELECT scan_id, variant, total, finished_at, results FROM scan_snapshot WHERE id = 1",
        )
        .fetch_optional(&self.pool)
        .await?;
        let Some((scan_id, variant, total, finished_at, results)) = row else {
            return Ok(None);
        };

        match decode(&scan_id, &variant, &finished_at, &results) {
            Ok((scan_id, variant, finished_at, results)) => Ok(Some(ScanState {
                scan_id: Some(scan_id),
                variant,
                running: false,
                progress: total.max(0) as usize,
                total: total.max(0) as usize,
                results,
                started_at: None,
                finished_at: Some(finished_at),
                error: None,
            })),
            Err(e) => {
                warn!(error = %e, "Ignoring unreadable scan snapshot");
                Ok(None)
            }
        }
    }
}

fn decode(
    scan_id: &str,
    variant: &str,
    finished_at: &str,
    results: &str,
) -> Result<(Uuid, Variant, DateTime<Utc>, Vec<ScanHit>)> {
    let corrupt = |what: &str, e: &dyn std::fmt::Display| Error::CorruptState(format!("{what}: {e}"));
    let scan_id = Uuid::parse_str(scan_id).map_err(|e| corrupt("scan_id", &e))?;
    let variant = variant.parse::<Variant>()?;
    let finished_at = DateTime::parse_from_rfc3339(finished_at)
        .map_err(|e| corrupt("finished_at", &e))?
        .with_timezone(&Utc);
    let results = serde_json::from_str(results).map_err(|e| corrupt("results", &e))?;
    Ok((scan_id, variant, finished_at, results))
}
