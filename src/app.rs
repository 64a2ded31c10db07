//! Process-wide context: every component built once from a [`Config`].

use std::sync::Arc;

use tracing::info;

use crate::alerts::{Alert, AlertStore, NewAlert};
use crate::api::{DeviceInfo, GuardedApiClient};
use crate::config::Config;
use crate::credentials::CredentialStore;
use crate::error::{FraudGuardError, Result};
use crate::monitor::{NotificationSink, ProcessInventory, SystemProcessInventory, ThreatMonitor};
use crate::session::{RemoteAuthBackend, SessionManager};
use crate::transport::{ApiTransport, HttpTransport};

/// Platform-facing pieces the app is assembled from.
pub struct AppParts {
    pub credentials: CredentialStore,
    pub auth_transport: Arc<dyn ApiTransport>,
    pub api_transport: Arc<dyn ApiTransport>,
    pub inventory: Arc<dyn ProcessInventory>,
    pub sink: Arc<dyn NotificationSink>,
}

pub struct App {
    pub config: Config,
    pub session: Arc<SessionManager>,
    pub api: GuardedApiClient,
    pub alerts: Arc<AlertStore>,
    pub monitor: Arc<ThreatMonitor>,
}

impl App {
    /// Build the app against the real OS vault, HTTP and process table.
    pub fn bootstrap(config: Config, sink: Arc<dyn NotificationSink>) -> Result<Self> {
        let timeout = config.network.request_timeout();
        let agent = config.network.user_agent.clone();
        let parts = AppParts {
            credentials: CredentialStore::new(&config.storage.keyring_service)?,
            auth_transport: Arc::new(HttpTransport::new(
                &config.network.auth_base_url,
                timeout,
                &agent,
            )?),
            api_transport: Arc::new(HttpTransport::new(
                &config.network.api_base_url,
                timeout,
                &agent,
            )?),
            inventory: Arc::new(SystemProcessInventory::new()),
            sink,
        };
        Self::from_parts(config, parts)
    }

    /// Wire the components together and run the start-up checks: the alert
    /// database must answer a count and the credential vault must be
    /// readable. Either failing aborts start-up.
    pub fn from_parts(config: Config, parts: AppParts) -> Result<Self> {
        let alerts = Arc::new(AlertStore::new(&config.storage.alerts_db_path()?)?);
        let stored_alerts = alerts.count()?;

        let backend = Arc::new(RemoteAuthBackend::new(parts.auth_transport));
        let session = Arc::new(SessionManager::new(
            parts.credentials,
            backend,
            config.auth.clone(),
        )?);
        let api = GuardedApiClient::new(parts.api_transport, session.clone());
        let monitor = Arc::new(ThreatMonitor::new(
            parts.inventory,
            parts.sink,
            alerts.clone(),
            config.monitor.clone(),
        ));

        info!(
            "App ready: {} stored alerts, auth state {:?}",
            stored_alerts,
            session.state()
        );
        Ok(Self {
            config,
            session,
            api,
            alerts,
            monitor,
        })
    }

    /// Device facts for SMS analysis, fed by the monitor's last result.
    pub fn device_info(&self) -> DeviceInfo {
        DeviceInfo {
            screen_sharing_apps_detected: self.monitor.detected_apps(),
            ..DeviceInfo::default()
        }
    }

    /// Append to the alert log without blocking the runtime.
    pub async fn record_alert(&self, alert: NewAlert) -> Result<Alert> {
        let store = self.alerts.clone();
        tokio::task::spawn_blocking(move || store.append(alert))
            .await
            .map_err(|e| FraudGuardError::Storage(format!("Alert write task failed: {}", e)))?
    }

    pub async fn shutdown(&self) {
        self.monitor.stop().await;
    }
}
