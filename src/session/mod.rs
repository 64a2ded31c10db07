//! Session lifecycle: login, refresh, logout and forced invalidation.
//!
//! `SessionManager` is the only owner of [`AuthState`]. The UI observes it
//! through [`SessionManager::subscribe`] and routes to the login screen when
//! it flips to `LoggedOut`.

pub mod backend;

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use tokio::sync::{broadcast, watch, Mutex};
use tracing::{debug, info, warn};

use crate::config::AuthConfig;
use crate::credentials::types::token_fingerprint;
use crate::credentials::{CredentialStore, Session};
use crate::error::{FraudGuardError, Result};

pub use backend::{AuthBackend, RefreshVerdict, RemoteAuthBackend, TokenVerdict, UserClaims};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthState {
    LoggedOut,
    Authenticating,
    LoggedIn,
    Expired,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    SignedIn,
    Refreshed,
    SignedOut,
    /// The session was torn down because the server no longer accepts it.
    Invalidated { reason: String },
}

const EVENT_CAPACITY: usize = 32;

pub struct SessionManager {
    store: CredentialStore,
    backend: Arc<dyn AuthBackend>,
    config: AuthConfig,
    state: watch::Sender<AuthState>,
    events: broadcast::Sender<SessionEvent>,
    refresh_lock: Mutex<()>,
}

/// Restores the pre-login state if a login future is dropped before it
/// finishes, so an abandoned attempt never leaves `Authenticating` behind.
struct LoginAttempt<'a> {
    state: &'a watch::Sender<AuthState>,
    previous: AuthState,
    finished: bool,
}

impl LoginAttempt<'_> {
    fn finish(mut self, next: AuthState) {
        self.state.send_replace(next);
        self.finished = true;
    }

    fn abort(self) {
        let previous = self.previous;
        self.finish(previous);
    }
}

impl Drop for LoginAttempt<'_> {
    fn drop(&mut self) {
        if !self.finished {
            self.state.send_replace(self.previous);
        }
    }
}

impl SessionManager {
    /// Build the manager. The initial state comes from the credential store
    /// and nowhere else; a store that cannot be read is an error here rather
    /// than a silent "logged out".
    pub fn new(store: CredentialStore, backend: Arc<dyn AuthBackend>, config: AuthConfig) -> Result<Self> {
        let initial = if store.is_logged_in()? {
            AuthState::LoggedIn
        } else {
            AuthState::LoggedOut
        };
        info!("Session manager starting in state {:?}", initial);

        let (state, _) = watch::channel(initial);
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Ok(Self {
            store,
            backend,
            config,
            state,
            events,
            refresh_lock: Mutex::new(()),
        })
    }

    pub fn state(&self) -> AuthState {
        *self.state.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<AuthState> {
        self.state.subscribe()
    }

    pub fn events(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    pub fn credentials(&self) -> &CredentialStore {
        &self.store
    }

    pub fn is_logged_in(&self) -> Result<bool> {
        self.store.is_logged_in()
    }

    pub fn current_session(&self) -> Result<Option<Session>> {
        self.store.load()
    }

    fn emit(&self, event: SessionEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }

    fn begin_login(&self) -> Result<LoginAttempt<'_>> {
        let mut previous = None;
        self.state.send_if_modified(|current| {
            if *current == AuthState::Authenticating {
                return false;
            }
            previous = Some(*current);
            *current = AuthState::Authenticating;
            true
        });
        let previous = previous.ok_or_else(|| {
            warn!("Rejected login: another login is already in progress");
            FraudGuardError::Validation("A login is already in progress".to_string())
        })?;
        Ok(LoginAttempt {
            state: &self.state,
            previous: if previous == AuthState::Expired {
                AuthState::LoggedOut
            } else {
                previous
            },
            finished: false,
        })
    }

    /// Verify a manually entered token and, if the server accepts it,
    /// store it as the current session.
    pub async fn login_with_token(&self, token: &str) -> Result<Session> {
        let token = token.trim();
        if token.is_empty() {
            return Err(FraudGuardError::Validation("Token cannot be empty".to_string()));
        }

        let attempt = self.begin_login()?;
        info!("Logging in with token {}", token_fingerprint(token));

        let claims = match self.backend.verify(token).await {
            Ok(TokenVerdict::Accepted(claims)) => claims,
            Ok(TokenVerdict::Rejected(reason)) => {
                attempt.abort();
                warn!("Login rejected: {}", reason);
                return Err(FraudGuardError::auth(format!("Token rejected: {}", reason)));
            }
            Err(e) => {
                attempt.abort();
                warn!("Login failed: {}", e);
                return Err(e);
            }
        };

        let session = match self.session_from_claims(token, claims) {
            Ok(session) => session,
            Err(e) => {
                attempt.abort();
                return Err(e);
            }
        };
        if let Err(e) = self.store.save(&session) {
            attempt.abort();
            return Err(e);
        }

        attempt.finish(AuthState::LoggedIn);
        self.emit(SessionEvent::SignedIn);
        info!(
            "Logged in as {}",
            session.user_id.as_deref().unwrap_or("unknown user")
        );
        Ok(session)
    }

    fn session_from_claims(&self, token: &str, claims: UserClaims) -> Result<Session> {
        let expires_at = match claims.expires_at() {
            Some(at) => at,
            None => self.fallback_expiry()?,
        };
        Ok(Session {
            access_token: claims
                .access_token
                .clone()
                .filter(|t| !t.trim().is_empty())
                .unwrap_or_else(|| token.to_string()),
            refresh_token: claims.refresh_token.clone(),
            expires_at,
            user_id: claims.user_id,
            email: claims.email,
            display_name: claims.display_name,
        })
    }

    fn fallback_expiry(&self) -> Result<DateTime<Utc>> {
        let ttl = self.config.session_ttl_secs;
        Duration::try_seconds(ttl)
            .and_then(|lifetime| Utc::now().checked_add_signed(lifetime))
            .ok_or_else(|| FraudGuardError::Config(format!("auth.session_ttl_secs {} is out of range", ttl)))
    }

    /// Ask the auth server whether a token is currently valid. Does not touch
    /// local state.
    pub async fn verify_token(&self, token: &str) -> Result<bool> {
        if token.trim().is_empty() {
            return Ok(false);
        }
        match self.backend.verify(token.trim()).await? {
            TokenVerdict::Accepted(_) => Ok(true),
            TokenVerdict::Rejected(_) => Ok(false),
        }
    }

    /// Exchange the stored refresh token for a new access token.
    ///
    /// Returns `Ok(false)` when there is nothing to refresh or the server
    /// rejects the refresh token; deciding whether to log out is left to the
    /// caller. Transport failures are `Err(Network)`.
    pub async fn refresh_token(&self) -> Result<bool> {
        let _guard = self.refresh_lock.lock().await;
        Ok(self.refresh_locked().await?.is_some())
    }

    async fn refresh_locked(&self) -> Result<Option<Session>> {
        let Some(session) = self.store.load()? else {
            debug!("No session to refresh");
            return Ok(None);
        };
        let Some(refresh_token) = session.refresh_token.clone() else {
            debug!("Session has no refresh token");
            return Ok(None);
        };

        match self.backend.refresh(&refresh_token).await? {
            RefreshVerdict::Refreshed(token) => {
                let expires_at = token.resolve_expiry(Utc::now(), self.config.session_ttl_secs)?;
                let refreshed = Session {
                    expires_at,
                    access_token: token.access_token,
                    refresh_token: token.refresh_token.or(Some(refresh_token)),
                    ..session
                };
                self.store.save(&refreshed)?;
                self.state.send_replace(AuthState::LoggedIn);
                self.emit(SessionEvent::Refreshed);
                info!("Refreshed session {}", refreshed.token_fingerprint());
                Ok(Some(refreshed))
            }
            RefreshVerdict::Rejected(reason) => {
                warn!("Refresh rejected: {}", reason);
                Ok(None)
            }
        }
    }

    /// Pre-flight for guarded calls: the current access token if the session
    /// is usable.
    ///
    /// An expired session moves to `Expired` and is refreshed when possible.
    /// If it cannot be refreshed the session is invalidated and an auth error
    /// returned. A transport failure while refreshing is returned as-is and
    /// does not log the user out.
    pub async fn valid_token(&self) -> Result<String> {
        let _guard = self.refresh_lock.lock().await;

        let Some(session) = self.store.load()? else {
            self.state.send_if_modified(|s| {
                let changed = *s != AuthState::LoggedOut && *s != AuthState::Authenticating;
                if changed {
                    *s = AuthState::LoggedOut;
                }
                changed
            });
            return Err(FraudGuardError::auth("Not logged in"));
        };

        if session.is_valid() {
            return Ok(session.access_token);
        }

        info!("Session {} has expired", session.token_fingerprint());
        self.state.send_replace(AuthState::Expired);

        if session.refresh_token.is_some() {
            let attempts = self.config.refresh_attempts.max(1);
            let mut last_network_error = None;
            for attempt in 1..=attempts {
                match self.refresh_locked().await {
                    Ok(Some(refreshed)) => return Ok(refreshed.access_token),
                    Ok(None) => {
                        last_network_error = None;
                        break;
                    }
                    Err(e @ FraudGuardError::Network(_)) => {
                        warn!("Refresh attempt {}/{} failed: {}", attempt, attempts, e);
                        last_network_error = Some(e);
                    }
                    Err(e) => return Err(e),
                }
            }
            if let Some(e) = last_network_error {
                return Err(e);
            }
        }

        self.invalidate_locked("Session expired");
        Err(FraudGuardError::auth("Session expired"))
    }

    /// Tear down the local session because the server no longer accepts it.
    pub async fn invalidate(&self, reason: &str) {
        let _guard = self.refresh_lock.lock().await;
        self.invalidate_locked(reason);
    }

    /// Like [`invalidate`](Self::invalidate), but only if `token` is still the
    /// stored access token. A rejection that arrives after the user has
    /// signed in again must not tear down the newer session. Returns whether
    /// the session was invalidated.
    pub async fn invalidate_if_current(&self, token: &str, reason: &str) -> bool {
        let _guard = self.refresh_lock.lock().await;
        match self.store.load() {
            Ok(Some(session)) if session.access_token == token => {
                self.invalidate_locked(reason);
                true
            }
            Ok(_) => {
                debug!(
                    "Ignoring stale rejection for {}: {}",
                    token_fingerprint(token),
                    reason
                );
                false
            }
            Err(e) => {
                warn!("Could not read session while handling rejection: {}", e);
                self.invalidate_locked(reason);
                true
            }
        }
    }

    fn invalidate_locked(&self, reason: &str) {
        warn!("Invalidating session: {}", reason);
        if let Err(e) = self.store.clear() {
            warn!("Failed to clear credentials during invalidation: {}", e);
        }
        self.state.send_replace(AuthState::LoggedOut);
        self.emit(SessionEvent::Invalidated {
            reason: reason.to_string(),
        });
    }

    /// Log out. Always succeeds locally; the server-side revoke runs in the
    /// background and its outcome is only logged.
    pub async fn sign_out(&self) {
        let token = match self.store.load() {
            Ok(session) => session.map(|s| s.access_token),
            Err(e) => {
                warn!("Could not read session before sign-out: {}", e);
                None
            }
        };

        if let Err(e) = self.store.clear() {
            warn!("Failed to clear credentials during sign-out: {}", e);
        }
        self.state.send_replace(AuthState::LoggedOut);
        self.emit(SessionEvent::SignedOut);
        info!("Signed out");

        if let Some(token) = token {
            let backend = self.backend.clone();
            tokio::spawn(async move {
                if let Err(e) = backend.revoke(&token).await {
                    debug!("Server-side revoke failed: {}", e);
                }
            });
        }
    }
}


#[cfg(test)]
mod tests {
    use super::backend::RefreshedToken;
    use super::test_support::FakeAuthBackend;
    use super::*;
    use crate::credentials::store::test_support::{fail_next, mock_store};

    fn manager_with(backend: Arc<FakeAuthBackend>) -> SessionManager {
        SessionManager::new(mock_store(), backend, AuthConfig::default()).unwrap()
    }

    fn expired_session(refresh: Option<&str>) -> Session {
        Session {
            access_token: "old-access".to_string(),
            refresh_token: refresh.map(|r| r.to_string()),
            expires_at: Utc::now() - Duration::minutes(1),
            user_id: Some("user-1".to_string()),
            email: None,
            display_name: None,
        }
    }

    fn drain(rx: &mut broadcast::Receiver<SessionEvent>) -> Vec<SessionEvent> {
        let mut out = Vec::new();
        while let Ok(event) = rx.try_recv() {
            out.push(event);
        }
        out
    }

    #[tokio::test]
    async fn test_initial_state_logged_out_on_empty_store() {
        let manager = manager_with(Arc::new(FakeAuthBackend::new()));
        assert_eq!(manager.state(), AuthState::LoggedOut);
    }

    #[tokio::test]
    async fn test_initial_state_from_stored_session() {
        let store = mock_store();
        store
            .save(&Session::new("stored", Utc::now() + Duration::hours(1)))
            .unwrap();
        let manager =
            SessionManager::new(store, Arc::new(FakeAuthBackend::new()), AuthConfig::default()).unwrap();
        assert_eq!(manager.state(), AuthState::LoggedIn);
    }

    #[tokio::test]
    async fn test_initial_state_storage_failure_is_error() {
        let store = mock_store();
        fail_next(&store, "vault locked");
        let result = SessionManager::new(store, Arc::new(FakeAuthBackend::new()), AuthConfig::default());
        assert!(matches!(result, Err(FraudGuardError::Storage(_))));
    }

    #[tokio::test]
    async fn test_blank_token_rejected_without_network() {
        let backend = Arc::new(FakeAuthBackend::new());
        let manager = manager_with(backend.clone());

        for token in ["", "   ", "\t\n"] {
            let err = manager.login_with_token(token).await.unwrap_err();
            assert!(matches!(err, FraudGuardError::Validation(_)));
        }
        assert_eq!(backend.verify_count(), 0);
        assert_eq!(manager.state(), AuthState::LoggedOut);
    }

    #[tokio::test]
    async fn test_login_success_stores_session() {
        let backend = Arc::new(FakeAuthBackend::accepting(&["valid-token"]));
        let manager = manager_with(backend.clone());
        let mut events = manager.events();

        let session = manager.login_with_token("  valid-token ").await.unwrap();
        assert_eq!(session.access_token, "valid-token");
        assert_eq!(session.user_id.as_deref(), Some("user-1"));
        assert_eq!(manager.state(), AuthState::LoggedIn);
        assert!(manager.is_logged_in().unwrap());
        assert_eq!(manager.current_session().unwrap().unwrap(), session);
        assert_eq!(drain(&mut events), vec![SessionEvent::SignedIn]);
    }

    #[tokio::test]
    async fn test_login_uses_exp_claim() {
        let backend = Arc::new(FakeAuthBackend::new());
        backend.script_verify(Ok(TokenVerdict::Accepted(UserClaims {
            exp: Some(4102444800),
            refresh_token: Some("r-1".to_string()),
            ..UserClaims::default()
        })));
        let manager = manager_with(backend);

        let session = manager.login_with_token("t").await.unwrap();
        assert_eq!(session.expires_at.timestamp(), 4102444800);
        assert_eq!(session.refresh_token.as_deref(), Some("r-1"));
    }

    #[tokio::test]
    async fn test_login_rejected_is_auth_error_and_logged_out() {
        let backend = Arc::new(FakeAuthBackend::accepting(&[]));
        let manager = manager_with(backend);

        let err = manager.login_with_token("nope").await.unwrap_err();
        assert!(err.is_auth_error());
        assert_eq!(manager.state(), AuthState::LoggedOut);
        assert!(manager.current_session().unwrap().is_none());
    }

    #[tokio::test]
    async fn test_login_network_failure_is_network_error() {
        let backend = Arc::new(FakeAuthBackend::new());
        backend.script_verify(Err(FraudGuardError::Network("timed out".to_string())));
        let manager = manager_with(backend);

        let err = manager.login_with_token("t").await.unwrap_err();
        assert!(matches!(err, FraudGuardError::Network(_)));
        assert!(!err.is_auth_error());
        assert_eq!(manager.state(), AuthState::LoggedOut);
        assert!(manager.current_session().unwrap().is_none());
    }

    #[tokio::test]
    async fn test_second_login_rejected_while_authenticating() {
        let manager = manager_with(Arc::new(FakeAuthBackend::accepting(&["t"])));
        let attempt = manager.begin_login().unwrap();
        assert_eq!(manager.state(), AuthState::Authenticating);

        let err = manager.login_with_token("t").await.unwrap_err();
        assert!(matches!(err, FraudGuardError::Validation(_)));

        drop(attempt);
        assert_eq!(manager.state(), AuthState::LoggedOut);
        manager.login_with_token("t").await.unwrap();
        assert_eq!(manager.state(), AuthState::LoggedIn);
    }

    #[tokio::test]
    async fn test_verify_token_does_not_mutate_state() {
        let backend = Arc::new(FakeAuthBackend::accepting(&["good"]));
        let manager = manager_with(backend.clone());

        assert!(manager.verify_token("good").await.unwrap());
        assert!(!manager.verify_token("bad").await.unwrap());
        assert!(!manager.verify_token("  ").await.unwrap());
        assert_eq!(backend.verify_count(), 2);
        assert_eq!(manager.state(), AuthState::LoggedOut);
        assert!(manager.current_session().unwrap().is_none());
    }

    #[tokio::test]
    async fn test_refresh_success_updates_store() {
        let backend = Arc::new(FakeAuthBackend::new());
        backend.script_refresh(Ok(RefreshVerdict::Refreshed(RefreshedToken {
            access_token: "fresh".to_string(),
            refresh_token: None,
            expires_in: Some(600),
            expires_at: None,
        })));
        let manager = manager_with(backend);
        manager.credentials().save(&expired_session(Some("r-1"))).unwrap();

        assert!(manager.refresh_token().await.unwrap());
        let session = manager.current_session().unwrap().unwrap();
        assert_eq!(session.access_token, "fresh");
        assert_eq!(session.refresh_token.as_deref(), Some("r-1"));
        assert_eq!(session.user_id.as_deref(), Some("user-1"));
        assert!(session.is_valid());
        assert_eq!(manager.state(), AuthState::LoggedIn);
    }

    #[tokio::test]
    async fn test_refresh_rejected_returns_false_and_keeps_session() {
        let backend = Arc::new(FakeAuthBackend::new());
        backend.script_refresh(Ok(RefreshVerdict::Rejected("expired".to_string())));
        let manager = manager_with(backend);
        manager.credentials().save(&expired_session(Some("r-1"))).unwrap();

        assert!(!manager.refresh_token().await.unwrap());
        assert!(manager.current_session().unwrap().is_some());
    }

    #[tokio::test]
    async fn test_refresh_without_refresh_token_is_false() {
        let backend = Arc::new(FakeAuthBackend::new());
        let manager = manager_with(backend.clone());
        manager.credentials().save(&expired_session(None)).unwrap();

        assert!(!manager.refresh_token().await.unwrap());
        assert_eq!(backend.refresh_count(), 0);
    }

    #[tokio::test]
    async fn test_valid_token_returns_current_token() {
        let manager = manager_with(Arc::new(FakeAuthBackend::accepting(&["live"])));
        manager.login_with_token("live").await.unwrap();
        assert_eq!(manager.valid_token().await.unwrap(), "live");
    }

    #[tokio::test]
    async fn test_valid_token_without_session_is_auth_error() {
        let manager = manager_with(Arc::new(FakeAuthBackend::new()));
        let err = manager.valid_token().await.unwrap_err();
        assert!(err.is_auth_error());
    }

    #[tokio::test]
    async fn test_valid_token_expired_without_refresh_logs_out() {
        let backend = Arc::new(FakeAuthBackend::new());
        let manager = manager_with(backend.clone());
        manager.credentials().save(&expired_session(None)).unwrap();
        let mut events = manager.events();

        let err = manager.valid_token().await.unwrap_err();
        assert!(err.is_auth_error());
        assert_eq!(manager.state(), AuthState::LoggedOut);
        assert!(manager.current_session().unwrap().is_none());
        assert_eq!(backend.refresh_count(), 0);
        assert_eq!(
            drain(&mut events),
            vec![SessionEvent::Invalidated {
                reason: "Session expired".to_string()
            }]
        );
    }

    #[tokio::test]
    async fn test_valid_token_expired_refreshes() {
        let backend = Arc::new(FakeAuthBackend::new());
        backend.script_refresh(Ok(RefreshVerdict::Refreshed(RefreshedToken {
            access_token: "fresh".to_string(),
            refresh_token: Some("r-2".to_string()),
            expires_in: Some(600),
            expires_at: None,
        })));
        let manager = manager_with(backend);
        manager.credentials().save(&expired_session(Some("r-1"))).unwrap();

        assert_eq!(manager.valid_token().await.unwrap(), "fresh");
        assert_eq!(manager.state(), AuthState::LoggedIn);
        let session = manager.current_session().unwrap().unwrap();
        assert_eq!(session.refresh_token.as_deref(), Some("r-2"));
    }

    #[tokio::test]
    async fn test_valid_token_refresh_network_failure_keeps_session() {
        let backend = Arc::new(FakeAuthBackend::new());
        backend.script_refresh(Err(FraudGuardError::Network("offline".to_string())));
        let manager = manager_with(backend.clone());
        manager.credentials().save(&expired_session(Some("r-1"))).unwrap();

        let err = manager.valid_token().await.unwrap_err();
        assert!(matches!(err, FraudGuardError::Network(_)));
        assert_eq!(manager.state(), AuthState::Expired);
        assert!(manager.current_session().unwrap().is_some());
        assert_eq!(backend.refresh_count(), 1);
    }

    #[tokio::test]
    async fn test_valid_token_retries_network_failure_when_configured() {
        let backend = Arc::new(FakeAuthBackend::new());
        backend.script_refresh(Err(FraudGuardError::Network("offline".to_string())));
        backend.script_refresh(Ok(RefreshVerdict::Refreshed(RefreshedToken {
            access_token: "second-try".to_string(),
            refresh_token: None,
            expires_in: Some(600),
            expires_at: None,
        })));
        let config = AuthConfig {
            refresh_attempts: 2,
            ..AuthConfig::default()
        };
        let manager = SessionManager::new(mock_store(), backend.clone(), config).unwrap();
        manager.credentials().save(&expired_session(Some("r-1"))).unwrap();

        assert_eq!(manager.valid_token().await.unwrap(), "second-try");
        assert_eq!(backend.refresh_count(), 2);
    }

    #[tokio::test]
    async fn test_valid_token_refresh_rejected_logs_out() {
        let backend = Arc::new(FakeAuthBackend::new());
        backend.script_refresh(Ok(RefreshVerdict::Rejected("revoked".to_string())));
        let manager = manager_with(backend);
        manager.credentials().save(&expired_session(Some("r-1"))).unwrap();

        let err = manager.valid_token().await.unwrap_err();
        assert!(err.is_auth_error());
        assert_eq!(manager.state(), AuthState::LoggedOut);
        assert!(!manager.is_logged_in().unwrap());
    }

    #[tokio::test]
    async fn test_sign_out_clears_and_notifies() {
        let backend = Arc::new(FakeAuthBackend::accepting(&["t"]));
        let manager = manager_with(backend);
        manager.login_with_token("t").await.unwrap();
        let mut state_rx = manager.subscribe();
        let mut events = manager.events();

        manager.sign_out().await;
        assert_eq!(*state_rx.borrow_and_update(), AuthState::LoggedOut);
        assert!(!manager.is_logged_in().unwrap());
        assert_eq!(drain(&mut events), vec![SessionEvent::SignedOut]);
    }

    #[tokio::test]
    async fn test_sign_out_succeeds_when_store_fails() {
        let manager = manager_with(Arc::new(FakeAuthBackend::accepting(&["t"])));
        manager.login_with_token("t").await.unwrap();

        fail_next(manager.credentials(), "vault locked");
        manager.sign_out().await;
        assert_eq!(manager.state(), AuthState::LoggedOut);
    }

    #[tokio::test]
    async fn test_sign_out_when_logged_out_is_fine() {
        let manager = manager_with(Arc::new(FakeAuthBackend::new()));
        manager.sign_out().await;
        manager.sign_out().await;
        assert_eq!(manager.state(), AuthState::LoggedOut);
    }

    #[tokio::test]
    async fn test_invalidate_emits_once() {
        let manager = manager_with(Arc::new(FakeAuthBackend::accepting(&["t"])));
        manager.login_with_token("t").await.unwrap();
        let mut events = manager.events();

        manager.invalidate("401 from /analyze/url").await;
        assert_eq!(manager.state(), AuthState::LoggedOut);
        assert!(!manager.is_logged_in().unwrap());
        assert_eq!(
            drain(&mut events),
            vec![SessionEvent::Invalidated {
                reason: "401 from /analyze/url".to_string()
            }]
        );
    }

    #[tokio::test]
    async fn test_sign_out_revokes_in_background() {
        let backend = Arc::new(FakeAuthBackend::accepting(&["t"]));
        let manager = manager_with(backend.clone());
        manager.login_with_token("t").await.unwrap();

        manager.sign_out().await;
        for _ in 0..10 {
            if backend.revoke_count() > 0 {
                break;
            }
            tokio::task::yield_now().await;
        }
        assert_eq!(backend.revoke_count(), 1);
        assert_eq!(manager.state(), AuthState::LoggedOut);
        assert!(!manager.is_logged_in().unwrap());
    }

    #[tokio::test]
    async fn test_sign_out_without_session_skips_revoke() {
        let backend = Arc::new(FakeAuthBackend::new());
        let manager = manager_with(backend.clone());
        manager.sign_out().await;
        tokio::task::yield_now().await;
        assert_eq!(backend.revoke_count(), 0);
    }

    #[tokio::test]
    async fn test_invalidate_if_current_ignores_replaced_token() {
        let backend = Arc::new(FakeAuthBackend::accepting(&["token-a", "token-b"]));
        let manager = manager_with(backend);
        manager.login_with_token("token-a").await.unwrap();
        manager.sign_out().await;
        manager.login_with_token("token-b").await.unwrap();
        let mut events = manager.events();

        assert!(!manager.invalidate_if_current("token-a", "401 from /dashboard").await);
        assert_eq!(manager.state(), AuthState::LoggedIn);
        assert_eq!(manager.current_session().unwrap().unwrap().access_token, "token-b");
        assert!(drain(&mut events).is_empty());

        assert!(manager.invalidate_if_current("token-b", "401 from /dashboard").await);
        assert_eq!(manager.state(), AuthState::LoggedOut);
        assert!(!manager.is_logged_in().unwrap());
    }

    #[tokio::test]
    async fn test_login_with_out_of_range_ttl_fails_cleanly() {
        let config = AuthConfig {
            session_ttl_secs: i64::MAX,
            ..AuthConfig::default()
        };
        let manager =
            SessionManager::new(mock_store(), Arc::new(FakeAuthBackend::accepting(&["t"])), config)
                .unwrap();

        let err = manager.login_with_token("t").await.unwrap_err();
        assert!(matches!(err, FraudGuardError::Config(_)));
        assert_eq!(manager.state(), AuthState::LoggedOut);
        assert!(manager.current_session().unwrap().is_none());
    }

    #[tokio::test]
    async fn test_refresh_with_out_of_range_lifetime_keeps_session() {
        let backend = Arc::new(FakeAuthBackend::new());
        backend.script_refresh(Ok(RefreshVerdict::Refreshed(RefreshedToken {
            access_token: "fresh".to_string(),
            refresh_token: None,
            expires_in: Some(i64::MAX / 10),
            expires_at: None,
        })));
        let manager = manager_with(backend);
        manager.credentials().save(&expired_session(Some("r-1"))).unwrap();

        let err = manager.valid_token().await.unwrap_err();
        assert!(matches!(err, FraudGuardError::Server { status: 200, .. }));
        let session = manager.current_session().unwrap().unwrap();
        assert_eq!(session.access_token, "old-access");
    }
}
