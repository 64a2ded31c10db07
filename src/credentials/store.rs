use keyring::Entry;
use tracing::{info, warn};

use super::types::Session;
use crate::error::{FraudGuardError, Result};

const ACCOUNT: &str = "fraudguard";

/// Session storage backed by the OS credential vault.
///
/// The whole session is serialized into one vault entry, so a save is a
/// single write and readers never see a half-written session. The vault
/// keeps it encrypted at rest: Keychain on macOS, Credential Manager on
/// Windows, and on Linux the Secret Service with the kernel keyring as a
/// cache, so a stored session survives logout and reboot.
///
/// The JSON is stored as raw bytes rather than a password string. Credential
/// Manager caps a secret at 2560 bytes (a password at half that once it is
/// widened to UTF-16); a session over the cap fails to save with a
/// `Storage` error and the previous session is left in place.
pub struct CredentialStore {
    entry: Entry,
    service: String,
}

impl CredentialStore {
    /// Open the vault entry for the given service name.
    pub fn new(service: &str) -> Result<Self> {
        let entry = Entry::new(service, ACCOUNT).map_err(|e| {
            warn!("Failed to create keyring entry for {}: {}", service, e);
            FraudGuardError::Storage(e.to_string())
        })?;
        Ok(Self {
            entry,
            service: service.to_string(),
        })
    }

    /// Wrap an already constructed entry (e.g. one with a mock credential).
    pub fn with_entry(entry: Entry) -> Self {
        Self {
            entry,
            service: "custom".to_string(),
        }
    }

    pub fn save(&self, session: &Session) -> Result<()> {
        if session.access_token.trim().is_empty() {
            return Err(FraudGuardError::Validation(
                "Refusing to store a session without an access token".to_string(),
            ));
        }
        let json = serde_json::to_string(session)
            .map_err(|e| FraudGuardError::Storage(format!("Failed to serialize session: {}", e)))?;
        self.entry.set_secret(json.as_bytes()).map_err(|e| match e {
            keyring::Error::TooLong(_, limit) => {
                warn!(
                    "Session for {} is {} bytes, over the vault limit of {}",
                    self.service,
                    json.len(),
                    limit
                );
                FraudGuardError::Storage(format!(
                    "Session is too large for the credential vault ({} bytes, limit {})",
                    json.len(),
                    limit
                ))
            }
            e => {
                warn!("Failed to store session for {}: {}", self.service, e);
                FraudGuardError::Storage(e.to_string())
            }
        })?;
        info!(
            "Stored session {} (expires {})",
            session.token_fingerprint(),
            session.expires_at
        );
        Ok(())
    }

    pub fn load(&self) -> Result<Option<Session>> {
        match self.entry.get_secret() {
            Ok(bytes) => {
                let session: Session = serde_json::from_slice(&bytes).map_err(|e| {
                    warn!("Stored session for {} is unreadable: {}", self.service, e);
                    FraudGuardError::Storage(format!("Stored session is corrupt: {}", e))
                })?;
                Ok(Some(session))
            }
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(e) => {
                warn!("Failed to read session for {}: {}", self.service, e);
                Err(FraudGuardError::Storage(e.to_string()))
            }
        }
    }

    /// True iff a session is stored and has not expired.
    pub fn is_logged_in(&self) -> Result<bool> {
        Ok(self.load()?.map(|s| s.is_valid()).unwrap_or(false))
    }

    /// Delete the stored session. Clearing an empty store is a no-op.
    pub fn clear(&self) -> Result<()> {
        match self.entry.delete_credential() {
            Ok(()) => {
                info!("Cleared stored session for {}", self.service);
                Ok(())
            }
            Err(keyring::Error::NoEntry) => Ok(()),
            Err(e) => {
                warn!("Failed to clear session for {}: {}", self.service, e);
                Err(FraudGuardError::Storage(e.to_string()))
            }
        }
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::{fail_next, fail_next_with, mock_store};
    use super::*;
    use chrono::{Duration, Utc};

    fn full_session() -> Session {
        Session {
            access_token: "access-123".to_string(),
            refresh_token: Some("refresh-456".to_string()),
            expires_at: Utc::now() + Duration::hours(2),
            user_id: Some("user-1".to_string()),
            email: Some("a@example.com".to_string()),
            display_name: Some("Asha".to_string()),
        }
    }

    #[test]
    fn test_save_then_load_round_trip() {
        let store = mock_store();
        let session = full_session();

        store.save(&session).unwrap();
        let loaded = store.load().unwrap().unwrap();
        assert_eq!(loaded, session);
        assert!(store.is_logged_in().unwrap());
    }

    #[test]
    fn test_load_empty_store_is_none() {
        let store = mock_store();
        assert!(store.load().unwrap().is_none());
        assert!(!store.is_logged_in().unwrap());
    }

    #[test]
    fn test_clear_then_not_logged_in() {
        let store = mock_store();
        store.save(&full_session()).unwrap();

        store.clear().unwrap();
        assert!(!store.is_logged_in().unwrap());
        assert!(store.load().unwrap().is_none());
    }

    #[test]
    fn test_clear_empty_store_is_ok() {
        let store = mock_store();
        store.clear().unwrap();
        store.clear().unwrap();
    }

    #[test]
    fn test_expired_session_not_logged_in() {
        let store = mock_store();
        let mut session = full_session();
        session.expires_at = Utc::now() - Duration::minutes(5);

        store.save(&session).unwrap();
        assert!(store.load().unwrap().is_some());
        assert!(!store.is_logged_in().unwrap());
    }

    #[test]
    fn test_save_replaces_previous_session() {
        let store = mock_store();
        store.save(&full_session()).unwrap();

        let replacement = Session::new("other-token", Utc::now() + Duration::hours(1));
        store.save(&replacement).unwrap();

        let loaded = store.load().unwrap().unwrap();
        assert_eq!(loaded.access_token, "other-token");
        assert!(loaded.refresh_token.is_none());
        assert!(loaded.email.is_none());
    }

    #[test]
    fn test_save_rejects_blank_token() {
        let store = mock_store();
        let session = Session::new("  ", Utc::now() + Duration::hours(1));
        let err = store.save(&session).unwrap_err();
        assert!(matches!(err, FraudGuardError::Validation(_)));
        assert!(store.load().unwrap().is_none());
    }

    #[test]
    fn test_vault_failure_is_storage_error_not_logged_out() {
        let store = mock_store();
        store.save(&full_session()).unwrap();

        fail_next(&store, "vault locked");
        let err = store.is_logged_in().unwrap_err();
        assert!(matches!(err, FraudGuardError::Storage(_)));

        // The failure was transient; the session is still there.
        assert!(store.is_logged_in().unwrap());
    }

    #[test]
    fn test_corrupt_entry_is_storage_error() {
        let store = mock_store();
        store.entry.set_password("{not json").unwrap();
        let err = store.load().unwrap_err();
        assert!(err.to_string().contains("corrupt"));
    }

    #[test]
    fn test_clear_failure_propagates() {
        let store = mock_store();
        store.save(&full_session()).unwrap();
        fail_next(&store, "vault locked");
        assert!(matches!(store.clear(), Err(FraudGuardError::Storage(_))));
    }

    #[test]
    fn test_oversized_session_keeps_previous() {
        let store = mock_store();
        store.save(&full_session()).unwrap();

        fail_next_with(&store, keyring::Error::TooLong("secret".to_string(), 2560));
        let mut big = full_session();
        big.access_token = "x".repeat(4000);
        let err = store.save(&big).unwrap_err();
        assert!(matches!(err, FraudGuardError::Storage(_)));
        assert!(err.to_string().contains("too large"));

        assert_eq!(store.load().unwrap().unwrap().access_token, "access-123");
    }
}
