use thiserror::Error;

#[derive(Debug, Error)]
pub enum FraudGuardError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Authentication error: {message}")]
    Auth { message: String, is_auth_error: bool },

    #[error("Network error: {0}")]
    Network(String),

    #[error("Server error ({status}): {message}")]
    Server { status: u16, message: String },

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Config error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, FraudGuardError>;

impl FraudGuardError {
    /// Auth failure the UI should answer by routing to login.
    pub fn auth(message: impl Into<String>) -> Self {
        FraudGuardError::Auth {
            message: message.into(),
            is_auth_error: true,
        }
    }

    pub fn is_auth_error(&self) -> bool {
        matches!(
            self,
            FraudGuardError::Auth {
                is_auth_error: true,
                ..
            }
        )
    }

    /// Whether offering "retry" makes sense instead of "log in again".
    pub fn is_retryable(&self) -> bool {
        match self {
            FraudGuardError::Network(_) => true,
            FraudGuardError::Server { status, .. } => *status >= 500,
            _ => false,
        }
    }
}

impl From<FraudGuardError> for String {
    fn from(err: FraudGuardError) -> Self {
        err.to_string()
    }
}

impl From<rusqlite::Error> for FraudGuardError {
    fn from(err: rusqlite::Error) -> Self {
        FraudGuardError::Storage(err.to_string())
    }
}
