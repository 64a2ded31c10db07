//! Request and response bodies for the analysis backend.
//!
//! Field names follow the backend's snake_case JSON. Everything the backend
//! fills in with a default is `#[serde(default)]` here so older or newer
//! servers still decode.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::alerts::{AlertKind, NewAlert};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
    Critical,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FraudType {
    Phishing,
    Malware,
    FakeUpi,
    SmsScam,
    Impersonation,
    SocialEngineering,
    FakeWebsite,
    UnauthorizedTransaction,
    QrCodeFraud,
    FakePaymentForm,
    RedirectFraud,
    ScreenSharingScam,
    SimSwapFraud,
    /// A type this client does not know yet.
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UrlAnalysisRequest {
    pub url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    /// Where the URL was found (email, SMS, QR_CODE...).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub qr_code_data: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page_title: Option<String>,
}

impl UrlAnalysisRequest {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UrlAnalysisResponse {
    pub url: String,
    pub risk_level: RiskLevel,
    pub risk_score: f64,
    pub is_safe: bool,
    #[serde(default)]
    pub fraud_indicators: Vec<String>,
    #[serde(default)]
    pub detected_fraud_types: Vec<FraudType>,
    #[serde(default)]
    pub recommendations: Vec<String>,
    /// Naive UTC timestamp as sent by the server.
    #[serde(default)]
    pub analysis_timestamp: Option<String>,
    #[serde(default)]
    pub details: Option<Value>,
    #[serde(default)]
    pub qr_code_analysis: Option<Value>,
    #[serde(default)]
    pub domain_risk_factors: Option<Vec<String>>,
}

/// Device security facts sent along with SMS analysis.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeviceInfo {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_id: Option<String>,
    #[serde(default)]
    pub is_new_device: bool,
    #[serde(default)]
    pub sim_changed_recently: bool,
    /// Display names from the threat monitor's last result.
    #[serde(default)]
    pub screen_sharing_apps_detected: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub os_version: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SmsAnalysisRequest {
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sender: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device_info: Option<DeviceInfo>,
    #[serde(default)]
    pub sender_is_contact: bool,
    #[serde(default)]
    pub is_unusual_time: bool,
}

impl SmsAnalysisRequest {
    pub fn new(message: impl Into<String>, sender: Option<String>) -> Self {
        Self {
            message: message.into(),
            sender,
            ..Self::default()
        }
    }

    pub fn with_device_info(mut self, device_info: DeviceInfo) -> Self {
        self.device_info = Some(device_info);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SmsAnalysisResponse {
    pub message: String,
    #[serde(default)]
    pub sender: Option<String>,
    pub risk_level: RiskLevel,
    pub risk_score: f64,
    pub is_safe: bool,
    #[serde(default)]
    pub fraud_indicators: Vec<String>,
    #[serde(default)]
    pub detected_fraud_types: Vec<FraudType>,
    #[serde(default)]
    pub extracted_urls: Vec<String>,
    #[serde(default)]
    pub extracted_upi_ids: Vec<String>,
    #[serde(default)]
    pub recommendations: Vec<String>,
    #[serde(default)]
    pub device_security_alerts: Vec<String>,
    #[serde(default)]
    pub screen_sharing_warning: Option<String>,
    #[serde(default)]
    pub analysis_timestamp: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TransactionDetails {
    pub amount: f64,
    pub recipient_upi: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recipient_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transaction_note: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub app_name: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TransactionAnalysisRequest {
    pub transaction: TransactionDetails,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(default)]
    pub is_new_payee: bool,
    #[serde(default)]
    pub is_unusual_amount: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionAnalysisResponse {
    pub transaction: TransactionDetails,
    pub risk_level: RiskLevel,
    pub risk_score: f64,
    pub is_safe: bool,
    #[serde(default)]
    pub fraud_indicators: Vec<String>,
    #[serde(default)]
    pub detected_fraud_types: Vec<FraudType>,
    #[serde(default)]
    pub warnings: Vec<String>,
    #[serde(default)]
    pub recommendations: Vec<String>,
    #[serde(default)]
    pub similar_fraud_reports: u32,
    #[serde(default)]
    pub recipient_trust_score: Option<f64>,
    #[serde(default)]
    pub analysis_timestamp: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QrAnalysisRequest {
    /// Raw decoded QR payload, e.g. `upi://pay?pa=...`.
    pub qr_data: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QrAnalysisResponse {
    pub qr_data: String,
    pub risk_level: RiskLevel,
    pub risk_score: f64,
    pub is_safe: bool,
    /// `upi`, `url`, `text`... as classified by the server.
    #[serde(default)]
    pub content_type: Option<String>,
    #[serde(default)]
    pub fraud_indicators: Vec<String>,
    #[serde(default)]
    pub detected_fraud_types: Vec<FraudType>,
    #[serde(default)]
    pub recommendations: Vec<String>,
    #[serde(default)]
    pub details: Option<Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DashboardStats {
    #[serde(default, alias = "totalScans")]
    pub total_scans: u64,
    #[serde(default, alias = "threatsBlocked")]
    pub threats_blocked: u64,
    #[serde(default, alias = "safeItems")]
    pub safe_items: u64,
    /// Scan counts keyed by risk level.
    #[serde(default, alias = "riskBreakdown")]
    pub risk_breakdown: BTreeMap<String, u64>,
    #[serde(default, alias = "recentAlerts")]
    pub recent_alerts: Vec<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    #[serde(default)]
    pub id: Option<String>,
    /// `url`, `sms`, `transaction` or `qr`.
    #[serde(alias = "type")]
    pub kind: String,
    #[serde(default)]
    pub target: Option<String>,
    #[serde(default)]
    pub risk_level: Option<RiskLevel>,
    #[serde(default)]
    pub risk_score: Option<f64>,
    #[serde(default)]
    pub timestamp: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnalysisHistory {
    #[serde(default, alias = "items", alias = "entries")]
    pub history: Vec<HistoryEntry>,
    #[serde(default)]
    pub total: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserFeedback {
    pub user_id: String,
    /// URL, UPI id, phone number or domain.
    pub entity_id: String,
    pub entity_type: String,
    /// `safe`, `fraud` or `unsure`.
    pub feedback: String,
    pub original_risk_score: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedbackResponse {
    pub message: String,
    #[serde(default)]
    pub entity_added_to_whitelist: bool,
    #[serde(default)]
    pub entity_added_to_blacklist: bool,
    #[serde(default)]
    pub learning_applied: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserInfo {
    pub user_id: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub roles: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthStatus {
    pub status: String,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub services: BTreeMap<String, bool>,
}

impl HealthStatus {
    pub fn is_healthy(&self) -> bool {
        self.status.eq_ignore_ascii_case("healthy") || self.status.eq_ignore_ascii_case("ok")
    }
}

fn summarize(indicators: &[String], recommendations: &[String]) -> String {
    indicators
        .first()
        .or_else(|| recommendations.first())
        .cloned()
        .unwrap_or_else(|| "Flagged as unsafe".to_string())
}

fn alert_payload(risk_level: RiskLevel, risk_score: f64, extra: Value) -> Value {
    let mut payload = Map::new();
    payload.insert("riskLevel".to_string(), json!(risk_level));
    payload.insert("riskScore".to_string(), json!(risk_score));
    if let Value::Object(extra) = extra {
        payload.extend(extra);
    }
    Value::Object(payload)
}

impl UrlAnalysisResponse {
    /// An alert for the local log when the server flagged the URL.
    pub fn to_alert(&self) -> Option<NewAlert> {
        if self.is_safe {
            return None;
        }
        Some(
            NewAlert::new(
                AlertKind::Url,
                format!("Unsafe link: {}", self.url),
                summarize(&self.fraud_indicators, &self.recommendations),
            )
            .with_payload(alert_payload(
                self.risk_level,
                self.risk_score,
                json!({ "url": self.url, "fraudTypes": self.detected_fraud_types }),
            )),
        )
    }
}

impl SmsAnalysisResponse {
    pub fn to_alert(&self) -> Option<NewAlert> {
        if self.is_safe {
            return None;
        }
        let from = self.sender.as_deref().unwrap_or("unknown sender");
        Some(
            NewAlert::new(
                AlertKind::Sms,
                format!("Suspicious SMS from {}", from),
                summarize(&self.fraud_indicators, &self.recommendations),
            )
            .with_payload(alert_payload(
                self.risk_level,
                self.risk_score,
                json!({
                    "sender": self.sender,
                    "urls": self.extracted_urls,
                    "upiIds": self.extracted_upi_ids,
                }),
            )),
        )
    }
}

impl TransactionAnalysisResponse {
    pub fn to_alert(&self) -> Option<NewAlert> {
        if self.is_safe {
            return None;
        }
        let mut indicators = self.warnings.clone();
        indicators.extend(self.fraud_indicators.iter().cloned());
        Some(
            NewAlert::new(
                AlertKind::Transaction,
                format!(
                    "Risky payment of {:.2} to {}",
                    self.transaction.amount, self.transaction.recipient_upi
                ),
                summarize(&indicators, &self.recommendations),
            )
            .with_payload(alert_payload(
                self.risk_level,
                self.risk_score,
                json!({
                    "recipientUpi": self.transaction.recipient_upi,
                    "amount": self.transaction.amount,
                }),
            )),
        )
    }
}

impl QrAnalysisResponse {
    pub fn to_alert(&self) -> Option<NewAlert> {
        if self.is_safe {
            return None;
        }
        Some(
            NewAlert::new(
                AlertKind::Qr,
                "Unsafe QR code",
                summarize(&self.fraud_indicators, &self.recommendations),
            )
            .with_payload(alert_payload(
                self.risk_level,
                self.risk_score,
                json!({ "qrData": self.qr_data, "contentType": self.content_type }),
            )),
        )
    }
}
