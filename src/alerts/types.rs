use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::FraudGuardError;

/// What raised an alert.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertKind {
    Security,
    Url,
    Sms,
    Transaction,
    Qr,
}

impl AlertKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertKind::Security => "security",
            AlertKind::Url => "url",
            AlertKind::Sms => "sms",
            AlertKind::Transaction => "transaction",
            AlertKind::Qr => "qr",
        }
    }
}

impl fmt::Display for AlertKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AlertKind {
    type Err = FraudGuardError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "security" => Ok(AlertKind::Security),
            "url" => Ok(AlertKind::Url),
            "sms" => Ok(AlertKind::Sms),
            "transaction" => Ok(AlertKind::Transaction),
            "qr" => Ok(AlertKind::Qr),
            other => Err(FraudGuardError::Validation(format!("Unknown alert kind: {}", other))),
        }
    }
}

/// A stored alert. Never modified after it is appended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Alert {
    /// ULID; sorts by creation time.
    pub id: String,
    pub kind: AlertKind,
    pub title: String,
    pub summary: String,
    pub payload: Value,
    pub created_at: DateTime<Utc>,
}

/// An alert not yet written to the store.
#[derive(Debug, Clone, PartialEq)]
pub struct NewAlert {
    pub kind: AlertKind,
    pub title: String,
    pub summary: String,
    pub payload: Value,
    /// Stamped with the current time on append when absent.
    pub created_at: Option<DateTime<Utc>>,
}

impl NewAlert {
    pub fn new(kind: AlertKind, title: impl Into<String>, summary: impl Into<String>) -> Self {
        Self {
            kind,
            title: title.into(),
            summary: summary.into(),
            payload: Value::Null,
            created_at: None,
        }
    }

    pub fn with_payload(mut self, payload: Value) -> Self {
        self.payload = payload;
        self
    }

    pub fn at(mut self, created_at: DateTime<Utc>) -> Self {
        self.created_at = Some(created_at);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_string_round_trip() {
        for kind in [
            AlertKind::Security,
            AlertKind::Url,
            AlertKind::Sms,
            AlertKind::Transaction,
            AlertKind::Qr,
        ] {
            assert_eq!(kind.as_str().parse::<AlertKind>().unwrap(), kind);
        }
        assert!("phishing".parse::<AlertKind>().is_err());
    }

    #[test]
    fn test_kind_serializes_lowercase() {
        assert_eq!(serde_json::to_value(AlertKind::Transaction).unwrap(), "transaction");
    }
}
