use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::RwLock;
use tracing::{info, warn};

use crate::{Confidence, Error, Result, Variant};

/// Minimum confidence a recorded signal needs before an alert goes out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "UPPERCASE")]
pub enum AlertThreshold {
    All,
    #[default]
    Medium,
    High,
}

impl AlertThreshold {
    pub fn admits(&self, confidence: Confidence) -> bool {
        match self {
            AlertThreshold::All => true,
            AlertThreshold::Medium => confidence >= Confidence::Medium,
            AlertThreshold::High => confidence == Confidence::High,
        }
    }
}

/// Operator-editable settings, persisted as JSON.
///
/// Every field has a default so that older or partial files still load.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Watch list evaluated on every scheduler cycle.
    pub symbols: Vec<String>,
    pub interval_minutes: u64,
    pub alert_confidence: AlertThreshold,
    /// Minimum R:R for a recorded signal to be sent as an alert.
    pub alert_rr: f64,
    /// Minimum R:R for market-scan HIGH signals to be recorded and alerted.
    pub rr_ratio: f64,
    /// Variant used by the scheduler and by requests that do not name one.
    pub strategy: Variant,
    /// Minimum 24h quote volume (USDT) for the scan universe.
    pub scan_min_volume: f64,
    pub scan_workers: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            symbols: vec!["BTCUSDT".into(), "ETHUSDT".into(), "SOLUSDT".into()],
            interval_minutes: 30,
            alert_confidence: AlertThreshold::Medium,
            alert_rr: 1.5,
            rr_ratio: 1.5,
            strategy: Variant::Position,
            scan_min_volume: 5_000_000.0,
            scan_workers: 3,
        }
    }
}

/// Settings file plus the in-memory copy handed to the rest of the process.
pub struct SettingsStore {
    path: PathBuf,
    current: RwLock<Settings>,
}

impl SettingsStore {
    /// Load settings from `path`. A missing file yields defaults; an unreadable
    /// or malformed file is logged and also yields defaults.
    pub async fn load(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref().to_path_buf();
        let settings = match tokio::fs::read_to_string(&path).await {
            Ok(raw) => match serde_json::from_str::<Settings>(&raw) {
                Ok(s) => {
                    info!(path = %path.display(), "Settings loaded");
                    s
                }
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Settings file is corrupt, using defaults");
                    Settings::default()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!(path = %path.display(), "No settings file, using defaults");
                Settings::default()
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Settings file unreadable, using defaults");
                Settings::default()
            }
        };

        Self {
            path,
            current: RwLock::new(settings),
        }
    }

    pub async fn get(&self) -> Settings {
        self.current.read().await.clone()
    }

    /// Merge a partial JSON object over the current settings and persist.
    /// Keys not present in `patch` keep their current values.
    pub async fn update(&self, patch: Value) -> Result<Settings> {
        let Value::Object(patch) = patch else {
            return Err(Error::Config("settings update must be a JSON object".into()));
        };

        let mut current = self.current.write().await;
        let mut merged = serde_json::to_value(&*current)?;
        if let Value::Object(fields) = &mut merged {
            for (key, value) in patch {
                fields.insert(key, value);
            }
        }
        let updated: Settings = serde_json::from_value(merged)
            .map_err(|e| Error::Config(format!("invalid settings: {e}")))?;

        self.persist(&updated).await?;
        *current = updated.clone();
        info!(path = %self.path.display(), "Settings updated");
        Ok(updated)
    }

    async fn persist(&self, settings: &Settings) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }
        let body = serde_json::to_string_pretty(settings)?;
        tokio::fs::write(&self.path, body).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn alert_threshold_admits_by_tier() {
        assert!(AlertThreshold::All.admits(Confidence::Low));
        assert!(AlertThreshold::Medium.admits(Confidence::Medium));
        assert!(!AlertThreshold::Medium.admits(Confidence::Low));
        assert!(!AlertThreshold::High.admits(Confidence::Medium));
    }

    #[test]
    fn partial_file_fills_defaults() {
        let s: Settings = serde_json::from_str(r#"{"symbols":["XRPUSDT"]}"#).unwrap();
        assert_eq!(s.symbols, vec!["XRPUSDT".to_string()]);
        assert_eq!(s.interval_minutes, 30);
        assert_eq!(s.strategy, Variant::Position);
    }

    #[tokio::test]
    async fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let store = SettingsStore::load(dir.path().join("settings.json")).await;
        assert_eq!(store.get().await, Settings::default());
    }

    #[tokio::test]
    async fn corrupt_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, "{not json").unwrap();
        let store = SettingsStore::load(&path).await;
        assert_eq!(store.get().await, Settings::default());
    }

    #[tokio::test]
    async fn update_merges_and_persists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("settings.json");
        let store = SettingsStore::load(&path).await;

        let updated = store
            .update(json!({"interval_minutes": 15, "strategy": "swing"}))
            .await
            .unwrap();
        assert_eq!(updated.interval_minutes, 15);
        assert_eq!(updated.strategy, Variant::Swing);
        assert_eq!(updated.symbols, Settings::default().symbols);

        let reloaded = SettingsStore::load(&path).await;
        assert_eq!(reloaded.get().await, updated);
    }

    #[tokio::test]
    async fn invalid_update_keeps_previous_settings() {
        let dir = tempfile::tempdir().unwrap();
        let store = SettingsStore::load(dir.path().join("settings.json")).await;

        let err = store.update(json!({"interval_minutes": "soon"})).await;
        assert!(matches!(err, Err(Error::Config(_))));
        assert_eq!(store.get().await.interval_minutes, 30);

        assert!(store.update(json!([1, 2])).await.is_err());
    }
}
