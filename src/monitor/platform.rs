//! Platform capabilities the monitor depends on.

use async_trait::async_trait;
use sysinfo::System;
use tokio::sync::mpsc;
use tracing::{info, warn};

use super::types::{Notification, Severity};
use crate::error::{FraudGuardError, Result};

#[async_trait]
pub trait ProcessInventory: Send + Sync {
    /// Identifiers (process names, package ids) of everything running.
    async fn running_processes(&self) -> Result<Vec<String>>;

    /// Whether a package is installed, for platforms that can answer it.
    async fn is_package_installed(&self, _package_id: &str) -> Result<bool> {
        Ok(false)
    }
}

#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn notify(&self, notification: Notification) -> Result<()>;
}

/// Process inventory of the host via sysinfo.
#[derive(Debug, Default)]
pub struct SystemProcessInventory;

impl SystemProcessInventory {
    pub fn new() -> Self {
        Self
    }
}

fn scan_processes() -> Vec<String> {
    let mut sys = System::new();
    sys.refresh_processes();
    let mut names: Vec<String> = Vec::new();
    for process in sys.processes().values() {
        names.push(process.name().to_string());
        if let Some(arg0) = process.cmd().first() {
            if !arg0.is_empty() && arg0 != process.name() {
                names.push(arg0.clone());
            }
        }
    }
    names.sort();
    names.dedup();
    names
}

#[async_trait]
impl ProcessInventory for SystemProcessInventory {
    async fn running_processes(&self) -> Result<Vec<String>> {
        let names = tokio::task::spawn_blocking(scan_processes)
            .await
            .map_err(|e| FraudGuardError::PermissionDenied(format!("Process scan failed: {}", e)))?;
        // Our own process is always visible unless listing is blocked.
        if names.is_empty() {
            warn!("Process list came back empty");
            return Err(FraudGuardError::PermissionDenied(
                "Process list is not readable".to_string(),
            ));
        }
        Ok(names)
    }
}

/// Forwards notifications over a channel to whatever delivers them.
#[derive(Clone)]
pub struct ChannelNotificationSink {
    tx: mpsc::Sender<Notification>,
}

impl ChannelNotificationSink {
    pub fn new(buffer: usize) -> (Self, mpsc::Receiver<Notification>) {
        let (tx, rx) = mpsc::channel(buffer.max(1));
        (Self { tx }, rx)
    }
}

#[async_trait]
impl NotificationSink for ChannelNotificationSink {
    async fn notify(&self, notification: Notification) -> Result<()> {
        self.tx.send(notification).await.map_err(|_| {
            FraudGuardError::Validation("Notification receiver has been dropped".to_string())
        })
    }
}

/// Writes notifications to the log.
#[derive(Debug, Default)]
pub struct LogNotificationSink;

#[async_trait]
impl NotificationSink for LogNotificationSink {
    async fn notify(&self, notification: Notification) -> Result<()> {
        match notification.severity {
            Severity::Info => info!("{}: {}", notification.title, notification.body),
            Severity::Warning | Severity::Critical => warn!(
                "[{}] {}: {}",
                notification.severity, notification.title, notification.body
            ),
        }
        Ok(())
    }
}
