use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use fraudguard::monitor::ChannelNotificationSink;
use fraudguard::{App, Config};
use tracing::{info, warn};

const NOTIFICATION_BUFFER: usize = 16;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    fraudguard::init_tracing();

    let config = match std::env::args().nth(1).map(PathBuf::from) {
        Some(path) => Config::load(&path).with_context(|| format!("Loading {:?}", path))?,
        None => Config::load_default().context("Loading default config")?,
    };

    let (sink, mut notifications) = ChannelNotificationSink::new(NOTIFICATION_BUFFER);
    let app = App::bootstrap(config, Arc::new(sink)).context("Failed to start FraudGuard")?;
    let mut auth_state = app.session.subscribe();

    app.monitor.start();
    info!("FraudGuard running, press Ctrl-C to stop");

    loop {
        tokio::select! {
            Some(notification) = notifications.recv() => {
                warn!("[{}] {}: {}", notification.severity, notification.title, notification.body);
            }
            Ok(()) = auth_state.changed() => {
                info!("Auth state is now {:?}", *auth_state.borrow_and_update());
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Shutting down");
                break;
            }
        }
    }

    app.shutdown().await;
    Ok(())
}
