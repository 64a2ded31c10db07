use std::fmt;

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Outcome of one inventory poll.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DetectionResult {
    pub is_detected: bool,
    /// Display names, de-duplicated and sorted.
    pub detected_apps: Vec<String>,
    /// First few process identifiers seen, for diagnostics.
    pub observed_processes: Vec<String>,
    pub observed_at: DateTime<Utc>,
}

impl DetectionResult {
    pub fn clean(observed_processes: Vec<String>) -> Self {
        Self {
            is_detected: false,
            detected_apps: Vec::new(),
            observed_processes,
            observed_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MonitorState {
    pub running: bool,
    pub last_result: Option<DetectionResult>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Critical,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Severity::Info => "info",
            Severity::Warning => "warning",
            Severity::Critical => "critical",
        };
        f.write_str(s)
    }
}

/// A user-visible notification raised by the monitor.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Notification {
    pub title: String,
    pub body: String,
    pub severity: Severity,
}

impl Notification {
    /// Notification for a fresh remote-access detection.
    pub fn remote_access(apps: &[String]) -> Self {
        Self {
            title: "Remote access app detected".to_string(),
            body: format!(
                "{} is running on this device. Never share your screen or OTPs while it is active.",
                apps.join(", ")
            ),
            severity: Severity::Critical,
        }
    }
}
