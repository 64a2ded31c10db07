//! The single seam through which HTTP leaves the process.
//!
//! Higher layers build an [`ApiRequest`], hand it to an [`ApiTransport`] and
//! get back the raw status and body. Only transport-level failures (timeout,
//! DNS, refused connection) are errors here; every HTTP status, including
//! 401 and 500, comes back as an [`ApiResponse`] for the caller to classify.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, warn};
use url::Url;

use crate::error::{FraudGuardError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    Get,
    Post,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ApiRequest {
    pub method: HttpMethod,
    /// Path relative to the transport's base URL, e.g. `/analyze/url`.
    pub path: String,
    pub bearer: Option<String>,
    pub query: Vec<(String, String)>,
    pub body: Option<Value>,
}

impl ApiRequest {
    pub fn get(path: impl Into<String>) -> Self {
        Self {
            method: HttpMethod::Get,
            path: path.into(),
            bearer: None,
            query: Vec::new(),
            body: None,
        }
    }

    pub fn post(path: impl Into<String>, body: Value) -> Self {
        Self {
            method: HttpMethod::Post,
            path: path.into(),
            bearer: None,
            query: Vec::new(),
            body: Some(body),
        }
    }

    pub fn bearer(mut self, token: impl Into<String>) -> Self {
        self.bearer = Some(token.into());
        self
    }

    pub fn query(mut self, key: &str, value: impl ToString) -> Self {
        self.query.push((key.to_string(), value.to_string()));
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ApiResponse {
    pub status: u16,
    pub body: String,
}

impl ApiResponse {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    pub fn json(status: u16, body: &Value) -> Self {
        Self::new(status, body.to_string())
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn is_auth_failure(&self) -> bool {
        self.status == 401 || self.status == 403
    }

    /// Human-readable error text: FastAPI `detail`, an `error` field, or the
    /// raw body truncated to 200 characters.
    pub fn error_message(&self) -> String {
        if let Ok(json) = serde_json::from_str::<Value>(&self.body) {
            for key in ["detail", "error", "message"] {
                match json.get(key) {
                    Some(Value::String(s)) => return s.clone(),
                    Some(other) if !other.is_null() => return other.to_string(),
                    _ => {}
                }
            }
        }
        let trimmed = self.body.trim();
        if trimmed.is_empty() {
            return reqwest::StatusCode::from_u16(self.status)
                .ok()
                .and_then(|s| s.canonical_reason())
                .unwrap_or("Unknown")
                .to_string();
        }
        if trimmed.chars().count() > 200 {
            let head: String = trimmed.chars().take(200).collect();
            format!("{}...", head)
        } else {
            trimmed.to_string()
        }
    }
}

#[async_trait]
pub trait ApiTransport: Send + Sync {
    /// Send a request. `Err` is always [`FraudGuardError::Network`].
    async fn send(&self, request: ApiRequest) -> Result<ApiResponse>;
}

/// reqwest-backed transport rooted at a base URL.
pub struct HttpTransport {
    client: reqwest::Client,
    base_url: Url,
}

impl HttpTransport {
    /// Build a transport with a bounded per-request timeout.
    pub fn new(base_url: &str, timeout: Duration, user_agent: &str) -> Result<Self> {
        let base_url = Url::parse(base_url)
            .map_err(|e| FraudGuardError::Config(format!("Invalid base URL '{}': {}", base_url, e)))?;
        let client = reqwest::Client::builder()
            .user_agent(user_agent)
            .timeout(timeout)
            .build()
            .map_err(|e| FraudGuardError::Config(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self { client, base_url })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn endpoint(&self, path: &str) -> Url {
        let mut url = self.base_url.clone();
        let joined = format!(
            "{}/{}",
            url.path().trim_end_matches('/'),
            path.trim_start_matches('/')
        );
        url.set_path(&joined);
        url
    }
}

#[async_trait]
impl ApiTransport for HttpTransport {
    async fn send(&self, request: ApiRequest) -> Result<ApiResponse> {
        let url = self.endpoint(&request.path);
        debug!("{:?} {}", request.method, url);

        let mut builder = match request.method {
            HttpMethod::Get => self.client.get(url.clone()),
            HttpMethod::Post => self.client.post(url.clone()),
        };
        if let Some(token) = &request.bearer {
            builder = builder.bearer_auth(token);
        }
        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let response = builder.send().await.map_err(|e| {
            let msg = if e.is_timeout() {
                format!("Request to {} timed out", url)
            } else if e.is_connect() {
                format!("Cannot connect to {}: {}", url, e)
            } else {
                format!("Request to {} failed: {}", url, e)
            };
            warn!("{}", msg);
            FraudGuardError::Network(msg)
        })?;

        let status = response.status().as_u16();
        let body = response.text().await.map_err(|e| {
            warn!("Failed to read response body from {}: {}", url, e);
            FraudGuardError::Network(format!("Failed to read response body: {}", e))
        })?;

        Ok(ApiResponse { status, body })
    }
}
