use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The locally held proof of authentication.
///
/// A session is stored and cleared as a whole; there is no partially
/// populated form of it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    pub expires_at: DateTime<Utc>,
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub display_name: Option<String>,
}

impl Session {
    pub fn new(access_token: impl Into<String>, expires_at: DateTime<Utc>) -> Self {
        Self {
            access_token: access_token.into(),
            refresh_token: None,
            expires_at,
            user_id: None,
            email: None,
            display_name: None,
        }
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }

    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }

    /// A session is usable when it carries a token and has not expired.
    pub fn is_valid(&self) -> bool {
        !self.access_token.trim().is_empty() && !self.is_expired()
    }

    /// Short, log-safe identifier for the access token.
    pub fn token_fingerprint(&self) -> String {
        token_fingerprint(&self.access_token)
    }
}

/// Last four characters of a token, for log lines that must never carry
/// the full credential.
pub fn token_fingerprint(token: &str) -> String {
    let chars: Vec<char> = token.chars().collect();
    if chars.len() <= 4 {
        return "****".to_string();
    }
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("…{}", tail)
}
