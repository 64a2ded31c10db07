//! Periodic scan for remote-access tools.
//!
//! The monitor polls a [`ProcessInventory`] on an interval and raises a
//! security alert plus a notification only on the clean -> detected edge.
//! A device that stays compromised does not re-alert on every poll.

pub mod platform;
pub mod signatures;
pub mod types;

use std::collections::BTreeSet;
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::Utc;
use serde_json::json;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::alerts::{AlertKind, AlertStore, NewAlert};
use crate::config::MonitorConfig;
use crate::error::{FraudGuardError, Result};

pub use platform::{
    ChannelNotificationSink, LogNotificationSink, NotificationSink, ProcessInventory,
    SystemProcessInventory,
};
pub use signatures::{builtin_signatures, Signature};
pub use types::{DetectionResult, MonitorState, Notification, Severity};

struct Inner {
    inventory: Arc<dyn ProcessInventory>,
    sink: Arc<dyn NotificationSink>,
    alerts: Arc<AlertStore>,
    signatures: Vec<Signature>,
    config: MonitorConfig,
    state: Mutex<MonitorState>,
}

struct Schedule {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

pub struct ThreatMonitor {
    inner: Arc<Inner>,
    schedule: Mutex<Option<Schedule>>,
}

impl ThreatMonitor {
    pub fn new(
        inventory: Arc<dyn ProcessInventory>,
        sink: Arc<dyn NotificationSink>,
        alerts: Arc<AlertStore>,
        config: MonitorConfig,
    ) -> Self {
        Self::with_signatures(inventory, sink, alerts, config, builtin_signatures())
    }

    pub fn with_signatures(
        inventory: Arc<dyn ProcessInventory>,
        sink: Arc<dyn NotificationSink>,
        alerts: Arc<AlertStore>,
        config: MonitorConfig,
        signatures: Vec<Signature>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                inventory,
                sink,
                alerts,
                signatures,
                config,
                state: Mutex::new(MonitorState::default()),
            }),
            schedule: Mutex::new(None),
        }
    }

    pub fn state(&self) -> MonitorState {
        self.inner.state().clone()
    }

    pub fn last_result(&self) -> Option<DetectionResult> {
        self.inner.state().last_result.clone()
    }

    /// Display names from the last poll, empty before the first one.
    pub fn detected_apps(&self) -> Vec<String> {
        self.last_result()
            .map(|r| r.detected_apps)
            .unwrap_or_default()
    }

    pub fn is_running(&self) -> bool {
        self.inner.state().running
    }

    /// Begin polling: once now, then every `poll_interval`. Calling it while
    /// already running does nothing. Must be called inside a tokio runtime.
    pub fn start(&self) {
        let mut schedule = self
            .schedule
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if schedule.is_some() {
            debug!("Threat monitor already running");
            return;
        }

        self.inner.state().running = true;
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(poll_loop(self.inner.clone(), cancel.clone()));
        *schedule = Some(Schedule { cancel, handle });
        info!(
            "Threat monitor started (every {}s)",
            self.inner.config.poll_interval_secs
        );
    }

    /// Stop polling. Returns once the loop has exited; a poll that was
    /// already in flight finishes and records its result but raises nothing.
    pub async fn stop(&self) {
        let schedule = self
            .schedule
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
        self.inner.state().running = false;

        let Some(Schedule { cancel, handle }) = schedule else {
            return;
        };
        cancel.cancel();
        if let Err(e) = handle.await {
            warn!("Threat monitor task ended abnormally: {}", e);
        }
        info!("Threat monitor stopped");
    }

    /// Poll once outside the schedule and act on the edge, running or not.
    pub async fn force_check(&self) -> Result<DetectionResult> {
        let result = self.inner.poll().await?;
        if self.inner.record(&result, true) {
            self.inner.raise(&result).await?;
        }
        Ok(result)
    }
}

impl Inner {
    fn state(&self) -> MutexGuard<'_, MonitorState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    async fn poll(&self) -> Result<DetectionResult> {
        let processes = self.inventory.running_processes().await?;
        let mut detected: BTreeSet<String> =
            signatures::match_processes(&self.signatures, &processes);

        if self.config.check_installed_packages {
            for sig in self.signatures.iter().filter(|s| s.is_package_id()) {
                if detected.contains(&sig.display_name) {
                    continue;
                }
                if self.inventory.is_package_installed(&sig.pattern).await? {
                    detected.insert(sig.display_name.clone());
                }
            }
        }

        let observed_processes = processes
            .into_iter()
            .take(self.config.observed_process_cap)
            .collect();
        let detected_apps: Vec<String> = detected.into_iter().collect();
        Ok(DetectionResult {
            is_detected: !detected_apps.is_empty(),
            detected_apps,
            observed_processes,
            observed_at: Utc::now(),
        })
    }

    /// Store the result and report whether it is a new detection that should
    /// be acted on.
    fn record(&self, result: &DetectionResult, forced: bool) -> bool {
        let mut state = self.state();
        let was_detected = state
            .last_result
            .as_ref()
            .map(|r| r.is_detected)
            .unwrap_or(false);
        state.last_result = Some(result.clone());
        result.is_detected && !was_detected && (forced || state.running)
    }

    async fn raise(&self, result: &DetectionResult) -> Result<()> {
        let apps = result.detected_apps.join(", ");
        warn!("Remote access tool detected: {}", apps);

        let alert = NewAlert::new(
            AlertKind::Security,
            "Remote access app detected",
            format!("{} is running on this device", apps),
        )
        .with_payload(json!({
            "detectedApps": result.detected_apps,
            "observedProcesses": result.observed_processes,
        }))
        .at(result.observed_at);

        let store = self.alerts.clone();
        tokio::task::spawn_blocking(move || store.append(alert))
            .await
            .map_err(|e| FraudGuardError::Storage(format!("Alert write task failed: {}", e)))??;

        self.sink
            .notify(Notification::remote_access(&result.detected_apps))
            .await
    }
}

async fn poll_loop(inner: Arc<Inner>, cancel: CancellationToken) {
    let mut ticker = tokio::time::interval(inner.config.poll_interval());
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                match tokio::time::timeout(inner.config.poll_timeout(), inner.poll()).await {
                    Ok(Ok(result)) => {
                        if inner.record(&result, false) {
                            if let Err(e) = inner.raise(&result).await {
                                error!("Failed to raise threat alert: {}", e);
                            }
                        }
                    }
                    Ok(Err(e)) => warn!("Threat poll failed, skipping: {}", e),
                    Err(_) => warn!(
                        "Threat poll timed out (> {}s), skipping",
                        inner.config.poll_timeout_secs
                    ),
                }
            }
            _ = cancel.cancelled() => {
                debug!("Threat monitor loop shutting down");
                break;
            }
        }
    }
}
