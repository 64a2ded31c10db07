pub mod alerts;
pub mod api;
pub mod app;
pub mod config;
pub mod credentials;
pub mod error;
pub mod monitor;
pub mod session;
pub mod transport;

pub use alerts::{Alert, AlertKind, AlertStore, NewAlert};
pub use api::GuardedApiClient;
pub use app::{App, AppParts};
pub use config::Config;
pub use credentials::{CredentialStore, Session};
pub use error::{FraudGuardError, Result};
pub use monitor::{DetectionResult, MonitorState, Notification, ThreatMonitor};
pub use session::{AuthState, SessionEvent, SessionManager};

/// Install the global tracing subscriber. `RUST_LOG` overrides the default
/// `info` level. Safe to call more than once.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .try_init();
}
