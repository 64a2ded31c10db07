//! Client for the auth server's token endpoints.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{info, warn};

use crate::credentials::types::token_fingerprint;
use crate::error::{FraudGuardError, Result};
use crate::transport::{ApiRequest, ApiResponse, ApiTransport};

pub const VERIFY_PATH: &str = "/auth/verify";
pub const REFRESH_PATH: &str = "/auth/refresh";
pub const LOGOUT_PATH: &str = "/auth/logout";

/// User claims returned by `/auth/verify`.
///
/// The auth server has used several spellings for the same claim over time
/// and some deployments send more than one of them at once, so each spelling
/// is read separately and the first non-empty one wins.
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(from = "WireClaims")]
pub struct UserClaims {
    pub user_id: Option<String>,
    pub email: Option<String>,
    pub display_name: Option<String>,
    pub roles: Vec<String>,
    /// Expiry as unix seconds.
    pub exp: Option<i64>,
    /// Some deployments hand back a normalized token on verify.
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
}

impl UserClaims {
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.exp.and_then(|secs| Utc.timestamp_opt(secs, 0).single())
    }
}

#[derive(Deserialize)]
struct WireClaims {
    #[serde(default, rename = "userId")]
    user_id_camel: Option<Value>,
    #[serde(default, rename = "user_id")]
    user_id_snake: Option<Value>,
    #[serde(default)]
    id: Option<Value>,
    #[serde(default)]
    email: Option<String>,
    #[serde(default, rename = "displayName")]
    display_name_camel: Option<String>,
    #[serde(default, rename = "display_name")]
    display_name_snake: Option<String>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    roles: Option<Vec<String>>,
    #[serde(default)]
    exp: Option<i64>,
    #[serde(default, rename = "accessToken")]
    access_token_camel: Option<String>,
    #[serde(default, rename = "access_token")]
    access_token_snake: Option<String>,
    #[serde(default)]
    token: Option<String>,
    #[serde(default, rename = "refreshToken")]
    refresh_token_camel: Option<String>,
    #[serde(default, rename = "refresh_token")]
    refresh_token_snake: Option<String>,
}

fn id_text(value: Option<Value>) -> Option<String> {
    match value? {
        Value::String(s) if !s.trim().is_empty() => Some(s),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn first_text(candidates: [Option<String>; 3]) -> Option<String> {
    candidates
        .into_iter()
        .flatten()
        .find(|s| !s.trim().is_empty())
}

impl From<WireClaims> for UserClaims {
    fn from(wire: WireClaims) -> Self {
        Self {
            user_id: id_text(wire.user_id_camel)
                .or_else(|| id_text(wire.user_id_snake))
                .or_else(|| id_text(wire.id)),
            email: wire.email,
            display_name: first_text([
                wire.display_name_camel,
                wire.display_name_snake,
                wire.name,
            ]),
            roles: wire.roles.unwrap_or_default(),
            exp: wire.exp,
            access_token: first_text([
                wire.access_token_camel,
                wire.access_token_snake,
                wire.token,
            ]),
            refresh_token: first_text([wire.refresh_token_camel, wire.refresh_token_snake, None]),
        }
    }
}

/// Body of a successful `/auth/refresh`.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(try_from = "WireRefresh")]
pub struct RefreshedToken {
    pub access_token: String,
    pub refresh_token: Option<String>,
    /// Lifetime in seconds.
    pub expires_in: Option<i64>,
    pub expires_at: Option<DateTime<Utc>>,
}

#[derive(Deserialize)]
struct WireRefresh {
    #[serde(default, rename = "accessToken")]
    access_token_camel: Option<String>,
    #[serde(default, rename = "access_token")]
    access_token_snake: Option<String>,
    #[serde(default)]
    token: Option<String>,
    #[serde(default, rename = "refreshToken")]
    refresh_token_camel: Option<String>,
    #[serde(default, rename = "refresh_token")]
    refresh_token_snake: Option<String>,
    #[serde(default, rename = "expiresIn")]
    expires_in_camel: Option<i64>,
    #[serde(default, rename = "expires_in")]
    expires_in_snake: Option<i64>,
    #[serde(default, rename = "expiresAt")]
    expires_at_camel: Option<DateTime<Utc>>,
    #[serde(default, rename = "expires_at")]
    expires_at_snake: Option<DateTime<Utc>>,
}

impl TryFrom<WireRefresh> for RefreshedToken {
    type Error = String;

    fn try_from(wire: WireRefresh) -> std::result::Result<Self, Self::Error> {
        let access_token = first_text([
            wire.access_token_camel,
            wire.access_token_snake,
            wire.token,
        ])
        .ok_or_else(|| "missing access token".to_string())?;
        Ok(Self {
            access_token,
            refresh_token: first_text([wire.refresh_token_camel, wire.refresh_token_snake, None]),
            expires_in: wire.expires_in_camel.or(wire.expires_in_snake),
            expires_at: wire.expires_at_camel.or(wire.expires_at_snake),
        })
    }
}

impl RefreshedToken {
    /// When the refreshed token expires. A lifetime the clock cannot
    /// represent is a malformed response, not a panic.
    pub fn resolve_expiry(&self, now: DateTime<Utc>, fallback_ttl_secs: i64) -> Result<DateTime<Utc>> {
        if let Some(at) = self.expires_at {
            return Ok(at);
        }
        let secs = self.expires_in.unwrap_or(fallback_ttl_secs);
        Duration::try_seconds(secs)
            .and_then(|lifetime| now.checked_add_signed(lifetime))
            .ok_or_else(|| {
                warn!("Refresh response carries an out-of-range lifetime: {}s", secs);
                FraudGuardError::Server {
                    status: 200,
                    message: format!("Invalid refresh response: lifetime {}s is out of range", secs),
                }
            })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum TokenVerdict {
    Accepted(UserClaims),
    Rejected(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum RefreshVerdict {
    Refreshed(RefreshedToken),
    Rejected(String),
}

/// The auth server as seen by the session manager.
///
/// Transport failures come back as `Err(Network)`; a definitive "no" from the
/// server is a `Rejected` verdict, not an error.
#[async_trait]
pub trait AuthBackend: Send + Sync {
    async fn verify(&self, token: &str) -> Result<TokenVerdict>;
    async fn refresh(&self, refresh_token: &str) -> Result<RefreshVerdict>;
    async fn revoke(&self, token: &str) -> Result<()>;
}

/// [`AuthBackend`] over HTTP.
pub struct RemoteAuthBackend {
    transport: Arc<dyn ApiTransport>,
}

impl RemoteAuthBackend {
    pub fn new(transport: Arc<dyn ApiTransport>) -> Self {
        Self { transport }
    }
}

fn unexpected_status(endpoint: &str, response: &ApiResponse) -> FraudGuardError {
    let message = response.error_message();
    warn!(
        "Auth server returned {} for {}: {}",
        response.status, endpoint, message
    );
    FraudGuardError::Server {
        status: response.status,
        message,
    }
}

#[async_trait]
impl AuthBackend for RemoteAuthBackend {
    async fn verify(&self, token: &str) -> Result<TokenVerdict> {
        info!("Verifying token {} with auth server", token_fingerprint(token));
        let request = ApiRequest::post(VERIFY_PATH, json!({ "token": token })).bearer(token);
        let response = self.transport.send(request).await?;

        if response.is_success() {
            let claims: UserClaims = serde_json::from_str(&response.body).map_err(|e| {
                FraudGuardError::Server {
                    status: response.status,
                    message: format!("Invalid verify response: {}", e),
                }
            })?;
            info!(
                "Token verified for user: {}",
                claims.user_id.as_deref().unwrap_or("unknown")
            );
            return Ok(TokenVerdict::Accepted(claims));
        }
        if response.is_auth_failure() {
            warn!("Invalid or expired token {}", token_fingerprint(token));
            return Ok(TokenVerdict::Rejected(response.error_message()));
        }
        Err(unexpected_status(VERIFY_PATH, &response))
    }

    async fn refresh(&self, refresh_token: &str) -> Result<RefreshVerdict> {
        info!("Refreshing access token");
        let request = ApiRequest::post(REFRESH_PATH, json!({ "refreshToken": refresh_token }));
        let response = self.transport.send(request).await?;

        if response.is_success() {
            let refreshed: RefreshedToken = serde_json::from_str(&response.body).map_err(|e| {
                FraudGuardError::Server {
                    status: response.status,
                    message: format!("Invalid refresh response: {}", e),
                }
            })?;
            return Ok(RefreshVerdict::Refreshed(refreshed));
        }
        if response.is_auth_failure() {
            warn!("Refresh token rejected ({})", response.status);
            return Ok(RefreshVerdict::Rejected(response.error_message()));
        }
        Err(unexpected_status(REFRESH_PATH, &response))
    }

    async fn revoke(&self, token: &str) -> Result<()> {
        let request = ApiRequest::post(LOGOUT_PATH, json!({})).bearer(token);
        let response = self.transport.send(request).await?;
        if response.is_success() || response.is_auth_failure() {
            return Ok(());
        }
        Err(unexpected_status(LOGOUT_PATH, &response))
    }
}
