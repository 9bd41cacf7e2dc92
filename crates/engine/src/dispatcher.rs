use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{error, info, warn};

use common::{Notifier, Result, SettingsStore, SignalRecord};
use history::{HistoryStore, RecordOutcome};

use crate::alert::format_alert;

/// What happened to one dispatched signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatch {
    /// Recorded and an alert was delivered.
    Alerted,
    /// Recorded; below the alert confidence or R:R, or no notifier configured.
    Recorded,
    /// Not recorded (duplicate or non-directional).
    Dropped(RecordOutcome),
}

/// Receives signals from the scheduler, records them in history and alerts.
///
/// This is the only component that writes signal history or sends alerts.
pub struct SignalDispatcher {
    signal_rx: mpsc::Receiver<SignalRecord>,
    history: Arc<HistoryStore>,
    settings: Arc<SettingsStore>,
    notifier: Option<Arc<dyn Notifier>>,
}

impl SignalDispatcher {
    pub fn new(
        signal_rx: mpsc::Receiver<SignalRecord>,
        history: Arc<HistoryStore>,
        settings: Arc<SettingsStore>,
        notifier: Option<Arc<dyn Notifier>>,
    ) -> Self {
        Self {
            signal_rx,
            history,
            settings,
            notifier,
        }
    }

    /// Run the dispatcher loop. Call from `tokio::spawn`.
    pub async fn run(mut self) {
        info!(alerts = self.notifier.is_some(), "SignalDispatcher running");
        while let Some(signal) = self.signal_rx.recv().await {
            if let Err(e) = self.dispatch(&signal).await {
                error!(symbol = %signal.symbol, error = %e, "Failed to record signal");
            }
        }
        warn!("SignalDispatcher: signal channel closed");
    }

    pub async fn dispatch(&self, signal: &SignalRecord) -> Result<Dispatch> {
        let outcome = self.history.record(signal).await?;
        if outcome != RecordOutcome::Appended {
            return Ok(Dispatch::Dropped(outcome));
        }
        let settings = self.settings.get().await;
        let Some(notifier) = &self.notifier else {
            return Ok(Dispatch::Recorded);
        };
        let admitted = settings.alert_confidence.admits(signal.confidence)
            && signal.levels.risk_reward >= settings.alert_rr;
        if !admitted {
            return Ok(Dispatch::Recorded);
        }

        match notifier.notify(&format_alert(signal)).await {
            Ok(()) => {
                info!(symbol = %signal.symbol, confidence = %signal.confidence, "Alert sent");
                Ok(Dispatch::Alerted)
            }
            Err(e) => {
                warn!(symbol = %signal.symbol, error = %e, "Alert delivery failed");
                Ok(Dispatch::Recorded)
            }
        }
    }
}
