//! Authenticated client for the analysis backend.
//!
//! Every guarded call follows the same template: take a valid token from the
//! [`SessionManager`], attach it as a bearer credential, send, then classify
//! the response into exactly one outcome. A 401/403 tears the session down so
//! the UI falls back to the login screen.

pub mod types;

use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::error::{FraudGuardError, Result};
use crate::session::SessionManager;
use crate::transport::{ApiRequest, ApiResponse, ApiTransport};

pub use types::{
    AnalysisHistory, DashboardStats, DeviceInfo, FeedbackResponse, FraudType, HealthStatus,
    HistoryEntry, QrAnalysisRequest, QrAnalysisResponse, RiskLevel, SmsAnalysisRequest,
    SmsAnalysisResponse, TransactionAnalysisRequest, TransactionAnalysisResponse,
    TransactionDetails, UrlAnalysisRequest, UrlAnalysisResponse, UserFeedback, UserInfo,
};

pub const DEFAULT_HISTORY_LIMIT: usize = 50;

pub struct GuardedApiClient {
    transport: Arc<dyn ApiTransport>,
    session: Arc<SessionManager>,
}

impl GuardedApiClient {
    pub fn new(transport: Arc<dyn ApiTransport>, session: Arc<SessionManager>) -> Self {
        Self { transport, session }
    }

    pub async fn analyze_url(&self, request: &UrlAnalysisRequest) -> Result<UrlAnalysisResponse> {
        info!("Analyzing URL: {}", request.url);
        self.guarded(ApiRequest::post("/analyze/url", to_body(request)?)).await
    }

    pub async fn analyze_sms(&self, request: &SmsAnalysisRequest) -> Result<SmsAnalysisResponse> {
        info!(
            "Analyzing SMS from {}",
            request.sender.as_deref().unwrap_or("unknown sender")
        );
        self.guarded(ApiRequest::post("/analyze/sms", to_body(request)?)).await
    }

    pub async fn analyze_transaction(
        &self,
        request: &TransactionAnalysisRequest,
    ) -> Result<TransactionAnalysisResponse> {
        info!(
            "Analyzing transaction of {:.2} to {}",
            request.transaction.amount, request.transaction.recipient_upi
        );
        self.guarded(ApiRequest::post("/analyze/transaction", to_body(request)?))
            .await
    }

    pub async fn analyze_qr(&self, request: &QrAnalysisRequest) -> Result<QrAnalysisResponse> {
        info!("Analyzing QR payload");
        self.guarded(ApiRequest::post("/analyze/qr", to_body(request)?)).await
    }

    pub async fn get_dashboard_stats(&self) -> Result<DashboardStats> {
        self.guarded(ApiRequest::get("/dashboard")).await
    }

    pub async fn get_analysis_history(&self, limit: Option<usize>) -> Result<AnalysisHistory> {
        let limit = limit.unwrap_or(DEFAULT_HISTORY_LIMIT);
        self.guarded(ApiRequest::get("/history").query("limit", limit))
            .await
    }

    pub async fn submit_feedback(&self, feedback: &UserFeedback) -> Result<FeedbackResponse> {
        info!(
            "Submitting '{}' feedback for {}",
            feedback.feedback, feedback.entity_type
        );
        self.guarded(ApiRequest::post("/feedback", to_body(feedback)?)).await
    }

    pub async fn current_user(&self) -> Result<UserInfo> {
        self.guarded(ApiRequest::get("/user/me")).await
    }

    /// Backend liveness. Needs no session and never touches it.
    pub async fn backend_health(&self) -> Result<HealthStatus> {
        let response = self.transport.send(ApiRequest::get("/health")).await?;
        if !response.is_success() {
            return Err(server_error("/health", &response));
        }
        decode("/health", &response)
    }

    async fn guarded<T: DeserializeOwned>(&self, request: ApiRequest) -> Result<T> {
        let token = self.session.valid_token().await?;
        let path = request.path.clone();

        let response = self.transport.send(request.bearer(token.clone())).await?;

        if response.is_success() {
            return decode(&path, &response);
        }
        if response.is_auth_failure() {
            let message = response.error_message();
            warn!("{} returned {}: {}", path, response.status, message);
            self.session
                .invalidate_if_current(&token, &format!("{} from {}", response.status, path))
                .await;
            return Err(FraudGuardError::auth(message));
        }
        Err(server_error(&path, &response))
    }
}

fn to_body<T: Serialize>(value: &T) -> Result<Value> {
    serde_json::to_value(value)
        .map_err(|e| FraudGuardError::Validation(format!("Failed to encode request: {}", e)))
}

fn decode<T: DeserializeOwned>(path: &str, response: &ApiResponse) -> Result<T> {
    serde_json::from_str(&response.body).map_err(|e| {
        warn!("Undecodable {} response from {}: {}", response.status, path, e);
        FraudGuardError::Server {
            status: response.status,
            message: format!("Invalid response from {}: {}", path, e),
        }
    })
}

fn server_error(path: &str, response: &ApiResponse) -> FraudGuardError {
    let message = response.error_message();
    debug!("{} failed with {}: {}", path, response.status, message);
    FraudGuardError::Server {
        status: response.status,
        message,
    }
}
